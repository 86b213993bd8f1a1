//! Translation layer: the external translator contract plus the dictionary,
//! cache-key normalization and the two-level content cache.

pub mod cache;
pub mod glossary;
pub mod mock;
pub mod normalize;
pub mod sqlite_cache;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{GameDomain, TargetLanguage};

/// A dictionary pair offered to the translator as a hint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlossaryEntry {
    pub source: String,
    pub target: String,
}

/// Which translation flavour an entry gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TranslationMode {
    #[default]
    Standard,
    /// Sound-alike rendering of proper nouns.
    Transliteration,
}

impl TranslationMode {
    /// Prefix that separates this mode's cache entries from the default ones.
    pub fn cache_prefix(self) -> &'static str {
        match self {
            TranslationMode::Standard => "",
            TranslationMode::Transliteration => "transliteration:",
        }
    }
}

impl fmt::Display for TranslationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranslationMode::Standard => f.write_str("standard"),
            TranslationMode::Transliteration => f.write_str("transliteration"),
        }
    }
}

/// A candidate the validator turned down.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedAttempt {
    pub candidate: String,
    pub reason: String,
}

/// Feedback handed back to the translator on a retranslation attempt.
/// Grows by one rejected attempt per retry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RetryContext {
    /// 1-based number of the attempt being made.
    pub attempt: u32,
    /// Oldest first.
    pub rejected: Vec<RejectedAttempt>,
}

impl RetryContext {
    /// Record a rejection and move on to the next attempt.
    pub fn push(&mut self, candidate: impl Into<String>, reason: impl Into<String>) {
        self.rejected.push(RejectedAttempt {
            candidate: candidate.into(),
            reason: reason.into(),
        });
        self.attempt = self.rejected.len() as u32 + 1;
    }

    /// The most recent rejection.
    pub fn last(&self) -> Option<&RejectedAttempt> {
        self.rejected.last()
    }
}

/// One entry to translate.
#[derive(Debug, Clone, Serialize)]
pub struct TranslateRequest {
    pub key: String,
    pub text: String,
    pub domain: GameDomain,
    pub target: TargetLanguage,
    pub mode: TranslationMode,
    pub hints: Vec<GlossaryEntry>,
    pub retry: Option<RetryContext>,
}

impl TranslateRequest {
    pub fn new(
        key: impl Into<String>,
        text: impl Into<String>,
        domain: GameDomain,
        target: TargetLanguage,
    ) -> Self {
        Self {
            key: key.into(),
            text: text.into(),
            domain,
            target,
            mode: TranslationMode::Standard,
            hints: Vec::new(),
            retry: None,
        }
    }

    pub fn with_mode(mut self, mode: TranslationMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_hints(mut self, hints: Vec<GlossaryEntry>) -> Self {
        self.hints = hints;
        self
    }

    pub fn with_retry(mut self, retry: RetryContext) -> Self {
        self.retry = Some(retry);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranslateError {
    /// The service refused the content on policy grounds. Never retried.
    #[error("content refused: {0}")]
    ContentRefused(String),
    /// Rate limit, 5xx, timeout and similar.
    #[error("transient service error: {0}")]
    Transient(String),
    #[error("translator error: {0}")]
    Fatal(String),
}

impl TranslateError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, TranslateError::Transient(_))
    }
}

/// Adapter for a translation backend.
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, request: &TranslateRequest) -> Result<String, TranslateError>;

    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_is_retryable() {
        assert!(TranslateError::Transient("429".into()).is_retryable());
        assert!(!TranslateError::ContentRefused("policy".into()).is_retryable());
        assert!(!TranslateError::Fatal("bad key".into()).is_retryable());
    }

    #[test]
    fn test_request_builder() {
        let mut retry = RetryContext::default();
        retry.push("안녕", "too short");
        let req = TranslateRequest::new("k", "Hello", GameDomain::Stellaris, TargetLanguage::Korean)
            .with_mode(TranslationMode::Transliteration)
            .with_retry(retry);
        assert_eq!(req.mode.cache_prefix(), "transliteration:");
        assert_eq!(req.retry.as_ref().map(|r| r.attempt), Some(2));
        assert!(req.hints.is_empty());
    }

    #[test]
    fn test_retry_context_keeps_every_rejection() {
        let mut retry = RetryContext::default();
        retry.push("first", "missing $VALUE$");
        retry.push("second", "contains meta phrase");
        assert_eq!(retry.attempt, 3);
        let candidates: Vec<&str> = retry.rejected.iter().map(|r| r.candidate.as_str()).collect();
        assert_eq!(candidates, vec!["first", "second"]);
        assert_eq!(retry.last().map(|r| r.reason.as_str()), Some("contains meta phrase"));
    }
}
