//! Source-text normalization and cache-key composition.
//! Two sources that differ only in surrounding or repeated whitespace share
//! one cache entry.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use super::TranslationMode;
use crate::domain::GameDomain;

static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t\u{00A0}]+").expect("static regex"));

/// Trim and collapse horizontal whitespace runs to a single space.
/// Escaped newlines (`\n`) are content and are left alone.
pub fn normalize_source(text: &str) -> String {
    WHITESPACE_RUN.replace_all(text.trim(), " ").into_owned()
}

/// Domain-scoped cache key: `<domain>:<mode prefix><normalized text>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(domain: GameDomain, mode: TranslationMode, source_text: &str) -> Self {
        Self(format!(
            "{}:{}{}",
            domain.as_str(),
            mode.cache_prefix(),
            normalize_source(source_text)
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// blake3 digest used to index the in-memory level.
    pub fn digest(&self) -> [u8; 32] {
        *blake3::hash(self.0.as_bytes()).as_bytes()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
