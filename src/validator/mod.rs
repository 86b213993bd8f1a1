//! Structural validation of candidate translations.
//!
//! `Validator::validate` is pure and total: it never panics on UTF-8 input and
//! reports every violated rule at once, so the reason list can be fed back to
//! the translator on the next attempt.

pub mod rules;
pub mod scanner;

use std::fmt;

use thiserror::Error;

use crate::config::ValidatorConfig;
use crate::domain::TargetLanguage;
use crate::translate::TranslationMode;

/// One broken rule.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Violation {
    #[error("translation is empty")]
    Empty,
    #[error("mixed delimiters in `{fragment}`")]
    CrossedDelimiters { fragment: String },
    #[error("unbalanced square brackets: {open} '[' vs {close} ']'")]
    UnbalancedBrackets { open: usize, close: usize },
    #[error("contains meta phrase \"{phrase}\"")]
    Boilerplate { phrase: String },
    #[error("identifier `{identifier}` must be kept verbatim")]
    MissingIdentifier { identifier: String },
    #[error("game function `{token}` is missing or its structure changed")]
    MissingGameToken { token: String },
    #[error("game function `{token}` contains translated text outside its string literals")]
    TranslatedGameToken { token: String },
    #[error("template token `{token}` is missing")]
    MissingTemplateToken { token: String },
    #[error("text style keyword `#{keyword}` is missing")]
    MissingStyleKeyword { keyword: String },
    #[error("text style keyword `#{keyword}` was translated")]
    TranslatedStyleKeyword { keyword: String },
    #[error("text was returned untranslated")]
    Untranslated,
    #[error("transliteration must be a single line")]
    MultiLine,
    #[error("transliteration length {candidate_chars} is out of proportion to source length {source_chars}")]
    LengthRatio {
        source_chars: usize,
        candidate_chars: usize,
    },
}

/// All violations found for one candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationFailure {
    pub violations: Vec<Violation>,
}

impl ValidationFailure {
    pub fn has(&self, pred: impl Fn(&Violation) -> bool) -> bool {
        self.violations.iter().any(pred)
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, v) in self.violations.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{v}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationFailure {}

pub type Verdict = Result<(), ValidationFailure>;

fn verdict(violations: Vec<Violation>) -> Verdict {
    if violations.is_empty() {
        Ok(())
    } else {
        Err(ValidationFailure { violations })
    }
}

/// Rule set bound to one target language.
#[derive(Debug, Clone)]
pub struct Validator {
    target: TargetLanguage,
    boilerplate_phrases: Vec<String>,
    boilerplate_exceptions: Vec<String>,
    reject_untranslated: bool,
    transliteration_min_ratio: f64,
    transliteration_max_ratio: f64,
}

impl Validator {
    pub fn new(target: TargetLanguage, config: &ValidatorConfig) -> Self {
        Self {
            target,
            boilerplate_phrases: config.boilerplate_phrases.clone(),
            boilerplate_exceptions: config.boilerplate_exceptions.clone(),
            reject_untranslated: config.reject_untranslated,
            transliteration_min_ratio: config.transliteration_min_ratio,
            transliteration_max_ratio: config.transliteration_max_ratio,
        }
    }

    /// Dispatch on translation mode.
    pub fn validate_for(&self, mode: TranslationMode, source: &str, candidate: &str) -> Verdict {
        match mode {
            TranslationMode::Standard => self.validate(source, candidate),
            TranslationMode::Transliteration => self.validate_transliteration(source, candidate),
        }
    }

    /// Full structural check of `candidate` as a translation of `source`.
    pub fn validate(&self, source: &str, candidate: &str) -> Verdict {
        verdict(self.structural(source, candidate, self.reject_untranslated))
    }

    /// Check a transliterated proper noun: short, single line, proportional length.
    /// Sources carrying template tokens also get the structural rules.
    pub fn validate_transliteration(&self, source: &str, candidate: &str) -> Verdict {
        let mut out = Vec::new();
        if candidate.trim().is_empty() {
            out.push(Violation::Empty);
            return verdict(out);
        }
        if candidate.contains('\n') || candidate.contains("\\n") {
            out.push(Violation::MultiLine);
        }
        rules::boilerplate(
            source,
            candidate,
            &self.boilerplate_phrases,
            &self.boilerplate_exceptions,
            &mut out,
        );

        let source_chars = source.trim().chars().count();
        let candidate_chars = candidate.trim().chars().count();
        if source_chars > 0 {
            let ratio = candidate_chars as f64 / source_chars as f64;
            if ratio < self.transliteration_min_ratio || ratio > self.transliteration_max_ratio {
                out.push(Violation::LengthRatio {
                    source_chars,
                    candidate_chars,
                });
            }
        }

        if scanner::scan(source).tokens.iter().any(|t| t.kind.is_template()) {
            for v in self.structural(source, candidate, false) {
                if !out.contains(&v) {
                    out.push(v);
                }
            }
        }
        verdict(out)
    }

    fn structural(&self, source: &str, candidate: &str, check_untranslated: bool) -> Vec<Violation> {
        let mut out = Vec::new();
        if candidate.trim().is_empty() {
            out.push(Violation::Empty);
            return out;
        }

        let src = scanner::scan(source);
        let cand = scanner::scan(candidate);

        rules::crossed_delimiters(&src, &cand, &mut out);
        let balanced = rules::bracket_balance(&src, &cand, &mut out);
        rules::boilerplate(
            source,
            candidate,
            &self.boilerplate_phrases,
            &self.boilerplate_exceptions,
            &mut out,
        );
        rules::identifiers(&src, candidate, &mut out);
        if balanced {
            rules::bracket_tokens(&src, &cand, self.target, &mut out);
        }
        rules::template_tokens(&src, &cand, &mut out);
        rules::style_keywords(&src, &cand, self.target, &mut out);
        if check_untranslated {
            rules::untranslated(&src, candidate, &mut out);
        }
        out
    }
}
