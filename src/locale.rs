//! Locale file model and line-format codec.
//!
//! ```text
//! l_english:
//!   key:0 "text" # integrity-tag
//! ```
//!
//! Rules kept on every write:
//! - entries with empty text are never emitted (and are dropped on read),
//! - the section header is always emitted, even with no entries below it,
//! - bare `"` inside text is escaped as `\"`; an already escaped quote is left alone,
//! - a leading UTF-8 BOM is preserved (the games refuse files without one).

use std::collections::HashMap;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use thiserror::Error;
use tracing::{debug, warn};

const BOM: char = '\u{feff}';

#[derive(Debug, Error)]
pub enum LocaleError {
    #[error("locale IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("line {line}: {reason}")]
    Malformed { line: usize, reason: String },
    #[error("missing section header")]
    MissingHeader,
}

/// One `key: "text" # tag` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocaleEntry {
    pub key: String,
    /// The optional `:0` digit some games write after the key.
    pub version: Option<u32>,
    pub text: String,
    pub tag: Option<String>,
}

impl LocaleEntry {
    pub fn new(key: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            version: None,
            text: escape_quotes(&text.into()),
            tag: None,
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }
}

/// A parsed locale file: one section header followed by ordered entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocaleFile {
    pub bom: bool,
    pub header: String,
    pub entries: Vec<LocaleEntry>,
}

impl LocaleFile {
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            bom: true,
            header: header.into(),
            entries: Vec::new(),
        }
    }

    /// Parse locale text. Comment and blank lines are dropped.
    pub fn parse(text: &str) -> Result<Self, LocaleError> {
        let (bom, body) = match text.strip_prefix(BOM) {
            Some(rest) => (true, rest),
            None => (false, text),
        };

        let mut header: Option<String> = None;
        let mut entries: Vec<LocaleEntry> = Vec::new();
        let mut seen: HashMap<String, usize> = HashMap::new();

        for (idx, raw_line) in body.lines().enumerate() {
            let line_no = idx + 1;
            let trimmed = raw_line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            if header.is_none() {
                match parse_header(trimmed) {
                    Some(h) => {
                        header = Some(h);
                        continue;
                    }
                    None => {
                        return Err(LocaleError::Malformed {
                            line: line_no,
                            reason: "entry before section header".into(),
                        })
                    }
                }
            }

            let entry = parse_entry(trimmed, line_no)?;
            if entry.text.is_empty() {
                continue;
            }
            if let Some(&pos) = seen.get(&entry.key) {
                warn!(key = %entry.key, line = line_no, "duplicate locale key, keeping last value");
                entries[pos] = entry;
            } else {
                seen.insert(entry.key.clone(), entries.len());
                entries.push(entry);
            }
        }

        let header = header.ok_or(LocaleError::MissingHeader)?;
        Ok(Self { bom, header, entries })
    }

    /// Serialize back to the line format.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        if self.bom {
            out.push(BOM);
        }
        out.push_str(&self.header);
        out.push_str(":\n");
        for entry in &self.entries {
            if entry.text.is_empty() {
                continue;
            }
            out.push_str("  ");
            out.push_str(&entry.key);
            out.push(':');
            if let Some(v) = entry.version {
                out.push_str(&v.to_string());
            }
            out.push_str(" \"");
            out.push_str(&escape_quotes(&entry.text));
            out.push('"');
            if let Some(tag) = &entry.tag {
                out.push_str(" # ");
                out.push_str(tag);
            }
            out.push('\n');
        }
        out
    }

    pub fn load(path: &Path) -> Result<Self, LocaleError> {
        let text = std::fs::read_to_string(path).map_err(|source| LocaleError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Load if the file exists; a missing file is `Ok(None)`.
    pub fn load_optional(path: &Path) -> Result<Option<Self>, LocaleError> {
        if !path.exists() {
            return Ok(None);
        }
        Self::load(path).map(Some)
    }

    /// Write via a sibling temp file and rename, so readers never see a torn file.
    pub fn save_atomic(&self, path: &Path) -> Result<(), LocaleError> {
        let io_err = |source| LocaleError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let mut tmp_name = path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);
        {
            let mut file = std::fs::File::create(&tmp_path).map_err(io_err)?;
            file.write_all(self.to_text().as_bytes()).map_err(io_err)?;
            file.sync_all().map_err(io_err)?;
        }
        std::fs::rename(&tmp_path, path).map_err(io_err)?;
        debug!(path = %path.display(), entries = self.entries.len(), "locale file written");
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&LocaleEntry> {
        self.entries.iter().find(|e| e.key == key)
    }

    /// Key → entry lookup table.
    pub fn index(&self) -> HashMap<&str, &LocaleEntry> {
        self.entries.iter().map(|e| (e.key.as_str(), e)).collect()
    }
}

fn parse_header(trimmed: &str) -> Option<String> {
    let name = trimmed.strip_suffix(':')?;
    if name.is_empty() || name.contains(|c: char| c.is_whitespace() || c == '"' || c == ':') {
        return None;
    }
    Some(name.to_string())
}

fn parse_entry(trimmed: &str, line: usize) -> Result<LocaleEntry, LocaleError> {
    let malformed = |reason: &str| LocaleError::Malformed {
        line,
        reason: reason.to_string(),
    };

    let colon = trimmed.find(':').ok_or_else(|| malformed("missing ':' after key"))?;
    let key = trimmed[..colon].trim();
    if key.is_empty() || key.contains(char::is_whitespace) {
        return Err(malformed("invalid key"));
    }

    let rest = &trimmed[colon + 1..];
    let digits_len = rest.chars().take_while(char::is_ascii_digit).count();
    let version = if digits_len > 0 {
        rest[..digits_len].parse::<u32>().ok()
    } else {
        None
    };
    let rest = rest[digits_len..].trim_start();

    let body = rest
        .strip_prefix('"')
        .ok_or_else(|| malformed("value must start with '\"'"))?;
    let close = body
        .rfind('"')
        .ok_or_else(|| malformed("unterminated value"))?;
    let raw_text = &body[..close];
    let tail = body[close + 1..].trim();

    let tag = tail
        .strip_prefix('#')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string);

    Ok(LocaleEntry {
        key: key.to_string(),
        version,
        text: escape_quotes(raw_text),
        tag,
    })
}

/// Escape bare `"` as `\"`; quotes already preceded by a backslash are kept.
pub fn escape_quotes(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev_backslash = false;
    for c in text.chars() {
        if c == '"' && !prev_backslash {
            out.push('\\');
        }
        out.push(c);
        prev_backslash = c == '\\' && !prev_backslash;
    }
    out
}

/// Map a source file name to its target-language counterpart:
/// `events_l_english.yml` → `events_l_korean.yml`.
pub fn target_file_name(source_name: &str, source_lang: &str, target_lang: &str) -> String {
    let needle = format!("l_{source_lang}");
    match source_name.rfind(&needle) {
        Some(pos) => format!(
            "{}l_{}{}",
            &source_name[..pos],
            target_lang,
            &source_name[pos + needle.len()..]
        ),
        None => source_name.to_string(),
    }
}

/// Header for a target file given the source header.
pub fn target_header(source_header: &str, source_lang: &str, target_lang: &str) -> String {
    if source_header == format!("l_{source_lang}") {
        format!("l_{target_lang}")
    } else {
        source_header.to_string()
    }
}

/// Every `*_l_<lang>.yml` file under `root`, sorted for a stable processing order.
pub fn find_locale_files(root: &Path, lang: &str) -> Vec<PathBuf> {
    let suffix = format!("_l_{lang}.yml");
    let mut found = Vec::new();
    for result in WalkBuilder::new(root)
        .hidden(false)
        .git_ignore(true)
        .git_exclude(true)
        .follow_links(false)
        .build()
    {
        let entry = match result {
            Ok(entry) => entry,
            Err(err) => {
                debug!(?err, "failed to read directory entry");
                continue;
            }
        };
        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
            continue;
        }
        let matches = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.ends_with(&suffix));
        if matches {
            found.push(entry.into_path());
        }
    }
    found.sort();
    found
}

/// Path of the target file mirroring `source_file` under `target_root`.
pub fn target_path(
    source_root: &Path,
    target_root: &Path,
    source_file: &Path,
    source_lang: &str,
    target_lang: &str,
) -> Option<PathBuf> {
    let relative = source_file.strip_prefix(source_root).ok()?;
    let name = relative.file_name()?.to_str()?;
    let mapped = target_file_name(name, source_lang, target_lang);
    Some(target_root.join(relative.with_file_name(mapped)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SAMPLE: &str = "\u{feff}l_english:\n # comment\n  greeting:0 \"Welcome to [GetTitle]\" # abc123\n  empty:0 \"\"\n  plain: \"No tag here\"\n";

    #[test]
    fn test_parse_sample() {
        let file = LocaleFile::parse(SAMPLE).unwrap();
        assert!(file.bom);
        assert_eq!(file.header, "l_english");
        assert_eq!(file.entries.len(), 2);
        let greeting = file.get("greeting").unwrap();
        assert_eq!(greeting.version, Some(0));
        assert_eq!(greeting.text, "Welcome to [GetTitle]");
        assert_eq!(greeting.tag.as_deref(), Some("abc123"));
        let plain = file.get("plain").unwrap();
        assert_eq!(plain.version, None);
        assert_eq!(plain.tag, None);
    }

    #[test]
    fn test_empty_values_are_omitted() {
        let file = LocaleFile::parse(SAMPLE).unwrap();
        assert!(file.get("empty").is_none());
        let text = file.to_text();
        assert!(!text.contains("empty"));
    }

    #[test]
    fn test_header_emitted_without_entries() {
        let file = LocaleFile::new("l_korean");
        assert_eq!(file.to_text(), "\u{feff}l_korean:\n");
    }

    #[test]
    fn test_quotes_escaped_once() {
        assert_eq!(escape_quotes(r#"He said "hi""#), r#"He said \"hi\""#);
        assert_eq!(escape_quotes(r#"He said \"hi\""#), r#"He said \"hi\""#);
        let entry = LocaleEntry::new("k", r#"a "b" \"c\""#);
        assert_eq!(entry.text, r#"a \"b\" \"c\""#);
    }

    #[test]
    fn test_inner_quotes_survive_parse() {
        let file = LocaleFile::parse("l_english:\n k: \"say \"hi\" now\" # t1\n").unwrap();
        let entry = file.get("k").unwrap();
        assert_eq!(entry.text, r#"say \"hi\" now"#);
        assert_eq!(entry.tag.as_deref(), Some("t1"));
    }

    #[test]
    fn test_hash_inside_text_is_not_a_tag() {
        let file = LocaleFile::parse("l_english:\n k: \"#bold Big#! text\"\n").unwrap();
        let entry = file.get("k").unwrap();
        assert_eq!(entry.text, "#bold Big#! text");
        assert_eq!(entry.tag, None);
    }

    #[test]
    fn test_entry_before_header_is_error() {
        let err = LocaleFile::parse("k: \"v\"\nl_english:\n").unwrap_err();
        assert!(matches!(err, LocaleError::Malformed { line: 1, .. }));
    }

    #[test]
    fn test_missing_header_is_error() {
        assert!(matches!(
            LocaleFile::parse("# only a comment\n"),
            Err(LocaleError::MissingHeader)
        ));
    }

    #[test]
    fn test_duplicate_key_keeps_last() {
        let file = LocaleFile::parse("l_english:\n k: \"one\"\n k: \"two\"\n").unwrap();
        assert_eq!(file.entries.len(), 1);
        assert_eq!(file.get("k").unwrap().text, "two");
    }

    #[test]
    fn test_target_names() {
        assert_eq!(
            target_file_name("events_l_english.yml", "english", "korean"),
            "events_l_korean.yml"
        );
        assert_eq!(target_header("l_english", "english", "korean"), "l_korean");
    }

    #[test]
    fn test_save_atomic_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("a_l_korean.yml");
        let mut file = LocaleFile::new("l_korean");
        file.entries.push(LocaleEntry::new("k", "값").with_tag("ff00"));
        file.save_atomic(&path).unwrap();
        let loaded = LocaleFile::load(&path).unwrap();
        assert_eq!(loaded, file);
        assert!(!dir.path().join("nested").join("a_l_korean.yml.tmp").exists());
    }

    #[test]
    fn test_find_locale_files_and_target_path() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("english");
        std::fs::create_dir_all(src.join("sub")).unwrap();
        std::fs::write(src.join("b_l_english.yml"), "l_english:\n").unwrap();
        std::fs::write(src.join("sub").join("a_l_english.yml"), "l_english:\n").unwrap();
        std::fs::write(src.join("notes.txt"), "x").unwrap();
        std::fs::write(src.join("c_l_german.yml"), "l_german:\n").unwrap();

        let found = find_locale_files(&src, "english");
        assert_eq!(found, vec![src.join("b_l_english.yml"), src.join("sub").join("a_l_english.yml")]);

        let out = dir.path().join("korean");
        assert_eq!(
            target_path(&src, &out, &found[1], "english", "korean"),
            Some(out.join("sub").join("a_l_korean.yml"))
        );
    }

    fn arb_entry() -> impl Strategy<Value = (String, Option<u32>, String, Option<String>)> {
        (
            "[a-z][a-z0-9_.]{0,12}",
            proptest::option::of(0u32..3),
            "[^\r\n\u{feff}]{1,30}",
            proptest::option::of("[0-9a-f]{6,16}"),
        )
    }

    proptest! {
        #[test]
        fn parse_stringify_parse_is_stable(entries in proptest::collection::vec(arb_entry(), 0..8)) {
            let mut text = String::from("l_english:\n");
            for (key, version, value, tag) in &entries {
                text.push_str(&format!(" {}:{} \"{}\"", key, version.map(|v| v.to_string()).unwrap_or_default(), value));
                if let Some(tag) = tag {
                    text.push_str(&format!(" # {tag}"));
                }
                text.push('\n');
            }
            if let Ok(first) = LocaleFile::parse(&text) {
                let second = LocaleFile::parse(&first.to_text()).unwrap();
                prop_assert_eq!(first, second);
            }
        }
    }
}
