//! Dictionary invalidation analyzer.
//! When dictionary terms change, translated entries whose source mentions a
//! changed term lose their integrity tag so the next pipeline run retranslates
//! them. Three cases are spared: translations that are only template tokens,
//! translations that already equal the new dictionary value (these are
//! stamped as confirmed), and matches on proper nouns, per the configured
//! policy.

pub mod diff;
pub mod vcs;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::config::{ModConfig, ProperNounPolicy};
use crate::locale::{self, LocaleError, LocaleFile};
use crate::memo::content_hash;
use crate::translate::glossary::{Dictionary, DictionaryCategory};
use crate::validator::scanner::has_free_text;

pub use diff::{find_changed_terms, InvalidationFinding, SectionRef};
pub use vcs::{DiffRange, DiffSource, FixedDiffSource, GitDiffSource};

#[derive(Debug, Error)]
pub enum InvalidationError {
    #[error("failed to run git: {0}")]
    GitSpawn(#[source] std::io::Error),
    #[error("git exited with {status:?}: {stderr}")]
    Git { status: Option<i32>, stderr: String },
    #[error(transparent)]
    Locale(#[from] LocaleError),
    #[error("source dir {0} does not exist")]
    MissingSourceDir(PathBuf),
}

/// What happened to one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryAction {
    /// No changed term in the source.
    Untouched,
    /// Translation is only template tokens.
    SkippedTokensOnly,
    /// Translation equals the new dictionary value; tag refreshed.
    Confirmed,
    /// Matched terms are proper nouns.
    SkippedProperNoun,
    /// Tag stripped.
    Invalidated,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvalidationSummary {
    pub files_scanned: usize,
    pub files_rewritten: usize,
    pub invalidated: usize,
    pub confirmed: usize,
    pub skipped_tokens_only: usize,
    pub skipped_proper_nouns: usize,
}

impl InvalidationSummary {
    fn count(&mut self, action: EntryAction) {
        match action {
            EntryAction::Untouched => {}
            EntryAction::SkippedTokensOnly => self.skipped_tokens_only += 1,
            EntryAction::Confirmed => self.confirmed += 1,
            EntryAction::SkippedProperNoun => self.skipped_proper_nouns += 1,
            EntryAction::Invalidated => self.invalidated += 1,
        }
    }

    fn merge(&mut self, other: &InvalidationSummary) {
        self.files_scanned += other.files_scanned;
        self.files_rewritten += other.files_rewritten;
        self.invalidated += other.invalidated;
        self.confirmed += other.confirmed;
        self.skipped_tokens_only += other.skipped_tokens_only;
        self.skipped_proper_nouns += other.skipped_proper_nouns;
    }
}

pub struct Invalidator {
    dictionary: Arc<Dictionary>,
    policy: ProperNounPolicy,
    source_lang: String,
    target_lang: String,
}

impl Invalidator {
    pub fn new(
        dictionary: Arc<Dictionary>,
        policy: ProperNounPolicy,
        source_lang: impl Into<String>,
        target_lang: impl Into<String>,
    ) -> Self {
        Self {
            dictionary,
            policy,
            source_lang: source_lang.into(),
            target_lang: target_lang.into(),
        }
    }

    /// Diff the dictionary file and return the terms that changed.
    pub fn changed_terms(
        &self,
        source: &dyn DiffSource,
        dictionary_path: &Path,
        range: &DiffRange,
    ) -> Result<Vec<InvalidationFinding>, InvalidationError> {
        let text = source.diff(dictionary_path, range)?;
        let found = find_changed_terms(&text);
        info!(path = %dictionary_path.display(), changed = found.len(), "dictionary changes found");
        Ok(found)
    }

    fn is_proper_noun(&self, finding: &InvalidationFinding) -> bool {
        match finding.section {
            SectionRef::Known(category) => category == DictionaryCategory::ProperNoun,
            SectionRef::RequiresLookup => self.dictionary.is_proper_noun_only(&finding.term),
        }
    }

    /// Decide one entry given its source text and stored translation.
    pub fn classify(&self, source_text: &str, translation: &str, changed: &[InvalidationFinding]) -> EntryAction {
        let source_lower = source_text.to_lowercase();
        let matched: Vec<&InvalidationFinding> = changed
            .iter()
            .filter(|f| !f.term.is_empty() && source_lower.contains(&f.term.to_lowercase()))
            .collect();
        if matched.is_empty() {
            return EntryAction::Untouched;
        }
        if !has_free_text(translation) {
            return EntryAction::SkippedTokensOnly;
        }
        let confirmed = matched
            .iter()
            .any(|f| self.dictionary.lookup(&f.term) == Some(translation.trim()));
        if confirmed {
            return EntryAction::Confirmed;
        }
        let spared = match self.policy {
            ProperNounPolicy::Every => matched.iter().all(|f| self.is_proper_noun(f)),
            ProperNounPolicy::Any => matched.iter().any(|f| self.is_proper_noun(f)),
        };
        if spared {
            EntryAction::SkippedProperNoun
        } else {
            EntryAction::Invalidated
        }
    }

    /// Apply the policy to every tagged entry of `target`, using `source` for
    /// the source texts. Returns the summary for this file.
    pub fn invalidate(
        &self,
        source: &LocaleFile,
        target: &mut LocaleFile,
        changed: &[InvalidationFinding],
    ) -> InvalidationSummary {
        let sources = source.index();
        let mut summary = InvalidationSummary {
            files_scanned: 1,
            ..InvalidationSummary::default()
        };
        for entry in target.entries.iter_mut() {
            if entry.tag.is_none() {
                continue;
            }
            let Some(src) = sources.get(entry.key.as_str()) else {
                continue;
            };
            let action = self.classify(&src.text, &entry.text, changed);
            match action {
                EntryAction::Confirmed => entry.tag = Some(content_hash(&src.text)),
                EntryAction::Invalidated => entry.tag = None,
                _ => {}
            }
            if action != EntryAction::Untouched {
                debug!(key = %entry.key, ?action, "invalidation decision");
            }
            summary.count(action);
        }
        summary
    }

    /// Run over every target file of a mod, rewriting only files that changed.
    pub fn invalidate_mod(
        &self,
        mod_config: &ModConfig,
        changed: &[InvalidationFinding],
    ) -> Result<InvalidationSummary, InvalidationError> {
        if !mod_config.source_dir.is_dir() {
            return Err(InvalidationError::MissingSourceDir(mod_config.source_dir.clone()));
        }
        let mut total = InvalidationSummary::default();
        if changed.is_empty() {
            return Ok(total);
        }
        for source_path in locale::find_locale_files(&mod_config.source_dir, &self.source_lang) {
            let Some(target_path) = locale::target_path(
                &mod_config.source_dir,
                &mod_config.target_dir,
                &source_path,
                &self.source_lang,
                &self.target_lang,
            ) else {
                continue;
            };
            let Some(mut target) = LocaleFile::load_optional(&target_path)? else {
                continue;
            };
            let source = LocaleFile::load(&source_path)?;
            let before = target.clone();
            let mut summary = self.invalidate(&source, &mut target, changed);
            if target != before {
                target.save_atomic(&target_path)?;
                summary.files_rewritten = 1;
            }
            total.merge(&summary);
        }
        info!(
            mod_name = %mod_config.name,
            invalidated = total.invalidated,
            confirmed = total.confirmed,
            skipped_proper_nouns = total.skipped_proper_nouns,
            files_rewritten = total.files_rewritten,
            "invalidation finished"
        );
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::GameDomain;
    use crate::locale::LocaleEntry;

    fn dictionary() -> Arc<Dictionary> {
        let text = "glossary = {\n  \"ok\" = \"좋다\"\n  \"Fleet\" = \"함대\"\n}\nproper_nouns = {\n  \"man\" = \"맨\"\n}\n";
        Arc::new(Dictionary::parse(text, GameDomain::Stellaris).unwrap())
    }

    fn invalidator(policy: ProperNounPolicy) -> Invalidator {
        Invalidator::new(dictionary(), policy, "english", "korean")
    }

    fn finding(term: &str, section: SectionRef) -> InvalidationFinding {
        InvalidationFinding {
            term: term.into(),
            section,
        }
    }

    #[test]
    fn test_glossary_match_strips_tag_proper_noun_keeps_it() {
        let mut source = LocaleFile::new("l_english");
        source.entries.push(LocaleEntry::new("a", "This is ok"));
        source.entries.push(LocaleEntry::new("b", "This man is good"));
        let mut target = LocaleFile::new("l_korean");
        target.entries.push(LocaleEntry::new("a", "이것은 좋다").with_tag("abc123"));
        target.entries.push(LocaleEntry::new("b", "이 남자는 좋다").with_tag("def456"));

        let changed = vec![
            finding("ok", SectionRef::Known(DictionaryCategory::GeneralGlossary)),
            finding("man", SectionRef::RequiresLookup),
        ];
        let summary = invalidator(ProperNounPolicy::Every).invalidate(&source, &mut target, &changed);

        assert_eq!(target.get("a").unwrap().tag, None);
        assert_eq!(target.get("b").unwrap().tag.as_deref(), Some("def456"));
        assert_eq!(summary.invalidated, 1);
        assert_eq!(summary.skipped_proper_nouns, 1);
    }

    #[test]
    fn test_token_only_translation_skipped() {
        let inv = invalidator(ProperNounPolicy::Every);
        let changed = vec![finding("Fleet", SectionRef::Known(DictionaryCategory::GeneralGlossary))];
        assert_eq!(
            inv.classify("[Root.GetFleet]", "[Root.GetFleet]", &changed),
            EntryAction::SkippedTokensOnly
        );
    }

    #[test]
    fn test_dictionary_value_confirms() {
        let mut source = LocaleFile::new("l_english");
        source.entries.push(LocaleEntry::new("f", "Fleet"));
        let mut target = LocaleFile::new("l_korean");
        target.entries.push(LocaleEntry::new("f", "함대").with_tag("stale"));
        let changed = vec![finding("Fleet", SectionRef::RequiresLookup)];
        let summary = invalidator(ProperNounPolicy::Every).invalidate(&source, &mut target, &changed);
        assert_eq!(summary.confirmed, 1);
        assert_eq!(target.get("f").unwrap().tag, Some(content_hash("Fleet")));
    }

    #[test]
    fn test_policy_every_versus_any() {
        let changed = vec![
            finding("ok", SectionRef::Known(DictionaryCategory::GeneralGlossary)),
            finding("man", SectionRef::Known(DictionaryCategory::ProperNoun)),
        ];
        let source = "The man is ok";
        let translation = "그 남자는 괜찮다";
        assert_eq!(
            invalidator(ProperNounPolicy::Every).classify(source, translation, &changed),
            EntryAction::Invalidated
        );
        assert_eq!(
            invalidator(ProperNounPolicy::Any).classify(source, translation, &changed),
            EntryAction::SkippedProperNoun
        );
    }

    #[test]
    fn test_untagged_and_unmatched_entries_untouched() {
        let mut source = LocaleFile::new("l_english");
        source.entries.push(LocaleEntry::new("a", "This is ok"));
        source.entries.push(LocaleEntry::new("c", "Nothing here"));
        let mut target = LocaleFile::new("l_korean");
        target.entries.push(LocaleEntry::new("a", "This is ok"));
        target.entries.push(LocaleEntry::new("c", "여기 없음").with_tag("t"));
        let changed = vec![finding("ok", SectionRef::Known(DictionaryCategory::GeneralGlossary))];
        let before = target.clone();
        let summary = invalidator(ProperNounPolicy::Every).invalidate(&source, &mut target, &changed);
        assert_eq!(target, before);
        assert_eq!(summary.invalidated, 0);
    }

    #[test]
    fn test_invalidate_mod_rewrites_changed_files_only() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        let out = dir.path().join("out");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::create_dir_all(&out).unwrap();
        std::fs::write(src.join("a_l_english.yml"), "\u{feff}l_english:\n  k: \"This is ok\"\n").unwrap();
        std::fs::write(src.join("b_l_english.yml"), "\u{feff}l_english:\n  k: \"Unrelated\"\n").unwrap();
        std::fs::write(out.join("a_l_korean.yml"), "\u{feff}l_korean:\n  k: \"이것은 좋다\" # abc123\n").unwrap();
        let untouched = "\u{feff}l_korean:\n  k: \"무관\" # abc123\n";
        std::fs::write(out.join("b_l_korean.yml"), untouched).unwrap();

        let mod_config = ModConfig {
            name: "m".into(),
            source_dir: src,
            target_dir: out.clone(),
            version_strategy: "latest".into(),
        };
        let changed = vec![finding("ok", SectionRef::Known(DictionaryCategory::GeneralGlossary))];
        let summary = invalidator(ProperNounPolicy::Every)
            .invalidate_mod(&mod_config, &changed)
            .unwrap();

        assert_eq!(summary.invalidated, 1);
        assert_eq!(summary.files_scanned, 2);
        assert_eq!(summary.files_rewritten, 1);
        let a = LocaleFile::load(&out.join("a_l_korean.yml")).unwrap();
        assert_eq!(a.get("k").unwrap().tag, None);
        assert_eq!(std::fs::read_to_string(out.join("b_l_korean.yml")).unwrap(), untouched);
    }

    #[test]
    fn test_changed_terms_from_fixed_diff() {
        let diff = FixedDiffSource("@@ -1,2 +1,3 @@\n glossary = {\n+  \"ok\" = \"좋다\"\n }\n".into());
        let found = invalidator(ProperNounPolicy::Every)
            .changed_terms(&diff, Path::new("dictionary.txt"), &DiffRange::Since("1.week".into()))
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].term, "ok");
    }
}
