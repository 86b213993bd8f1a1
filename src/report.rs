//! Run reporting: the untranslated-items report for follow-up tooling, and
//! the issue reporter that receives configuration problems.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// One entry left in its source text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UntranslatedItem {
    #[serde(rename = "mod")]
    pub mod_name: String,
    pub file: String,
    pub key: String,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct UntranslatedReport {
    items: Mutex<Vec<UntranslatedItem>>,
}

impl UntranslatedReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &self,
        mod_name: &str,
        file: &str,
        key: &str,
        reason: impl Into<String>,
    ) {
        let item = UntranslatedItem {
            mod_name: mod_name.to_string(),
            file: file.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        };
        warn!(mod_name = %item.mod_name, file = %item.file, key = %item.key, reason = %item.reason, "entry left untranslated");
        self.items.lock().push(item);
    }

    pub fn items(&self) -> Vec<UntranslatedItem> {
        self.items.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Write the report as pretty JSON, replacing any previous report.
    pub fn write_json(&self, path: &Path) -> std::io::Result<()> {
        let items = self.items();
        let json = serde_json::to_string_pretty(&items).map_err(std::io::Error::other)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        info!(path = %path.display(), items = items.len(), "untranslated report written");
        Ok(())
    }
}

/// A problem that skips a unit of work without aborting the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub unit: String,
    pub title: String,
    pub detail: String,
}

/// External tracker for problems that need a human.
pub trait IssueReporter: Send + Sync {
    fn report(&self, issue: Issue);
}

/// Reports issues to the log.
#[derive(Debug, Default)]
pub struct TracingIssueReporter;

impl IssueReporter for TracingIssueReporter {
    fn report(&self, issue: Issue) {
        warn!(unit = %issue.unit, title = %issue.title, detail = %issue.detail, "issue reported");
    }
}

/// Keeps issues in memory, for inspection after a run.
#[derive(Debug, Default)]
pub struct CollectingIssueReporter {
    issues: Mutex<Vec<Issue>>,
}

impl CollectingIssueReporter {
    pub fn issues(&self) -> Vec<Issue> {
        self.issues.lock().clone()
    }
}

impl IssueReporter for CollectingIssueReporter {
    fn report(&self, issue: Issue) {
        self.issues.lock().push(issue);
    }
}

/// File name relative to `root` for reports, falling back to the full path.
pub fn display_relative(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .map(PathBuf::from)
        .unwrap_or_else(|_| path.to_path_buf())
        .to_string_lossy()
        .replace('\\', "/")
}
