//! Version-control collaborator: supplies unified diff text for one file.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use super::InvalidationError;

/// Which changes to diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffRange {
    /// `from..to`; `to` defaults to the working tree.
    Commits { from: String, to: Option<String> },
    /// Every commit since a date git understands (`2024-05-01`, `2.weeks`).
    Since(String),
}

pub trait DiffSource: Send + Sync {
    fn diff(&self, path: &Path, range: &DiffRange) -> Result<String, InvalidationError>;
}

/// Shells out to `git` inside `repo`.
#[derive(Debug, Clone)]
pub struct GitDiffSource {
    repo: PathBuf,
}

impl GitDiffSource {
    pub fn new(repo: impl Into<PathBuf>) -> Self {
        Self { repo: repo.into() }
    }

    fn args(path: &Path, range: &DiffRange) -> Vec<String> {
        let path = path.to_string_lossy().into_owned();
        match range {
            DiffRange::Commits { from, to } => {
                let revs = match to {
                    Some(to) => format!("{from}..{to}"),
                    None => from.clone(),
                };
                vec!["diff".into(), "--unified=3".into(), revs, "--".into(), path]
            }
            DiffRange::Since(date) => vec![
                "log".into(),
                "-p".into(),
                "--reverse".into(),
                "--format=".into(),
                format!("--since={date}"),
                "--".into(),
                path,
            ],
        }
    }
}

impl DiffSource for GitDiffSource {
    fn diff(&self, path: &Path, range: &DiffRange) -> Result<String, InvalidationError> {
        let args = Self::args(path, range);
        debug!(repo = %self.repo.display(), ?args, "running git");
        let output = Command::new("git")
            .arg("-C")
            .arg(&self.repo)
            .args(&args)
            .output()
            .map_err(InvalidationError::GitSpawn)?;
        if !output.status.success() {
            return Err(InvalidationError::Git {
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Diff text held in memory, for callers that already have it.
#[derive(Debug, Clone, Default)]
pub struct FixedDiffSource(pub String);

impl DiffSource for FixedDiffSource {
    fn diff(&self, _path: &Path, _range: &DiffRange) -> Result<String, InvalidationError> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_args() {
        let args = GitDiffSource::args(
            Path::new("dict/glossary.txt"),
            &DiffRange::Commits {
                from: "v1.0".into(),
                to: Some("HEAD".into()),
            },
        );
        assert_eq!(args, vec!["diff", "--unified=3", "v1.0..HEAD", "--", "dict/glossary.txt"]);

        let args = GitDiffSource::args(Path::new("g.txt"), &DiffRange::Since("2024-05-01".into()));
        assert!(args.contains(&"--since=2024-05-01".to_string()));
        assert_eq!(args[0], "log");
    }

    #[test]
    fn test_git_failure_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = GitDiffSource::new(dir.path());
        let result = source.diff(
            Path::new("missing.txt"),
            &DiffRange::Commits {
                from: "HEAD~1".into(),
                to: None,
            },
        );
        assert!(result.is_err());
    }
}
