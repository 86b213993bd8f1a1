//! Dictionary loading and matching.
//! A dictionary file holds named blocks of `"term" = "translation"` pairs:
//!
//! ```text
//! # resources
//! glossary = {
//!     "Energy Credits" = "에너지 크레딧"
//! }
//! stellaris_proper_nouns = {
//!     "Blorg" = "블로그"
//! }
//! ```
//!
//! Blocks named `*glossary` are the general glossary, blocks named
//! `*proper_nouns` hold proper nouns. A block may carry a game prefix
//! (`hoi4_glossary`); prefixed blocks for another game are ignored.
//! Both sections are unioned into one lookup table that still remembers
//! which section each term came from.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;
use tracing::debug;

use super::GlossaryEntry;
use crate::domain::GameDomain;

static SECTION_OPEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_]*)\s*=\s*\{\s*(?:#.*)?$").expect("static regex")
});

static PAIR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*"((?:[^"\\]|\\.)*)"\s*=\s*"((?:[^"\\]|\\.)*)"\s*(?:#.*)?$"#).expect("static regex")
});

#[derive(Debug, Error)]
pub enum DictionaryError {
    #[error("dictionary IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("dictionary line {line}: {reason}")]
    Malformed { line: usize, reason: String },
}

/// Which named section a term belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DictionaryCategory {
    GeneralGlossary,
    ProperNoun,
}

impl DictionaryCategory {
    /// Category of a block by its declared name, ignoring any game prefix.
    pub fn from_section_name(name: &str) -> Option<Self> {
        if name.ends_with("proper_nouns") {
            Some(DictionaryCategory::ProperNoun)
        } else if name.ends_with("glossary") {
            Some(DictionaryCategory::GeneralGlossary)
        } else {
            None
        }
    }
}

/// Whether a block named `name` applies to `domain`.
fn section_applies(name: &str, domain: GameDomain) -> bool {
    let Some(category) = DictionaryCategory::from_section_name(name) else {
        return false;
    };
    let base = match category {
        DictionaryCategory::ProperNoun => "proper_nouns",
        DictionaryCategory::GeneralGlossary => "glossary",
    };
    let prefix = &name[..name.len() - base.len()];
    if prefix.is_empty() || prefix == "general_" {
        return true;
    }
    prefix.strip_suffix('_').is_some_and(|game| {
        game.parse::<GameDomain>().is_ok_and(|d| d == domain)
    })
}

/// Name of the block a line opens, if it opens one.
pub(crate) fn section_open(line: &str) -> Option<&str> {
    SECTION_OPEN
        .captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// `"term" = "translation"` pair on a line, unescaped.
pub(crate) fn parse_pair(line: &str) -> Option<(String, String)> {
    let caps = PAIR.captures(line)?;
    Some((unescape(&caps[1]), unescape(&caps[2])))
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
                continue;
            }
        }
        out.push(c);
    }
    out
}

#[derive(Debug, Clone)]
struct Term {
    source: String,
    target: String,
    in_glossary: bool,
    in_proper_nouns: bool,
}

/// Loaded dictionary for one game.
#[derive(Debug, Clone, Default)]
pub struct Dictionary {
    terms: HashMap<String, Term>,
}

impl Dictionary {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn load(path: &Path, domain: GameDomain) -> Result<Self, DictionaryError> {
        let text = std::fs::read_to_string(path).map_err(|source| DictionaryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let dict = Self::parse(&text, domain)?;
        debug!(path = %path.display(), terms = dict.len(), "dictionary loaded");
        Ok(dict)
    }

    pub fn parse(text: &str, domain: GameDomain) -> Result<Self, DictionaryError> {
        let mut dict = Self::default();
        // (category, applies) of the block being read
        let mut current: Option<(Option<DictionaryCategory>, bool)> = None;

        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some(name) = section_open(raw) {
                if current.is_some() {
                    return Err(DictionaryError::Malformed {
                        line: line_no,
                        reason: format!("block {name} opened inside another block"),
                    });
                }
                current = Some((
                    DictionaryCategory::from_section_name(name),
                    section_applies(name, domain),
                ));
                continue;
            }
            if line.starts_with('}') {
                if current.take().is_none() {
                    return Err(DictionaryError::Malformed {
                        line: line_no,
                        reason: "unmatched closing brace".into(),
                    });
                }
                continue;
            }
            let Some((source, target)) = parse_pair(raw) else {
                return Err(DictionaryError::Malformed {
                    line: line_no,
                    reason: format!("expected \"term\" = \"translation\", got {line}"),
                });
            };
            match current {
                Some((Some(category), true)) => dict.insert(source, target, category),
                Some(_) => {}
                None => {
                    return Err(DictionaryError::Malformed {
                        line: line_no,
                        reason: "term outside of any block".into(),
                    })
                }
            }
        }
        if current.is_some() {
            return Err(DictionaryError::Malformed {
                line: text.lines().count(),
                reason: "unterminated block".into(),
            });
        }
        Ok(dict)
    }

    /// Add a term. A term defined in both sections keeps its glossary value.
    pub fn insert(&mut self, source: String, target: String, category: DictionaryCategory) {
        let term = self
            .terms
            .entry(source.to_lowercase())
            .or_insert_with(|| Term {
                source: source.clone(),
                target: target.clone(),
                in_glossary: false,
                in_proper_nouns: false,
            });
        match category {
            DictionaryCategory::GeneralGlossary => {
                if !term.in_glossary {
                    term.source = source;
                    term.target = target;
                }
                term.in_glossary = true;
            }
            DictionaryCategory::ProperNoun => term.in_proper_nouns = true,
        }
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Mapped value of a term (case-insensitive).
    pub fn lookup(&self, term: &str) -> Option<&str> {
        self.terms
            .get(&term.trim().to_lowercase())
            .map(|t| t.target.as_str())
    }

    /// True when the term is known only from the proper-noun section.
    pub fn is_proper_noun_only(&self, term: &str) -> bool {
        self.terms
            .get(&term.trim().to_lowercase())
            .is_some_and(|t| t.in_proper_nouns && !t.in_glossary)
    }

    /// Dictionary value for a source that is exactly one term.
    pub fn replacement(&self, source_text: &str) -> Option<&str> {
        self.lookup(source_text)
    }

    /// General-glossary entries whose term appears in `text` (case-insensitive).
    /// Proper nouns are left out; they are too noisy as hints.
    pub fn hints_for(&self, text: &str) -> Vec<GlossaryEntry> {
        let text_lower = text.to_lowercase();
        let mut hints: Vec<GlossaryEntry> = self
            .terms
            .iter()
            .filter(|(key, t)| t.in_glossary && text_lower.contains(key.as_str()))
            .map(|(_, t)| GlossaryEntry {
                source: t.source.clone(),
                target: t.target.clone(),
            })
            .collect();
        hints.sort_by(|a, b| a.source.cmp(&b.source));
        hints
    }
}
