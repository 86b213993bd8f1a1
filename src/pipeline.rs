//! Orchestrator: walks each mod's source locale files and produces the
//! target-language files.
//!
//! Per entry: memo decision → dictionary replacement → cache (re-validated)
//! → queued translator call with retry context → validation → cache write.
//! Entries that cannot be translated keep their source text with no tag and
//! are recorded in the untranslated report. Output is flushed atomically every
//! `flush_every` new entries. A file that cannot be read or written is
//! reported and the mod moves on. A cache failure ends the current file after
//! flushing its processed prefix. A timeout or a queue failure flushes the
//! prefix and stops the run.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::cancellation::{DeadlineCheck, RunDeadline};
use crate::config::{EngineConfig, ModConfig};
use crate::domain::{GameDomain, TargetLanguage};
use crate::locale::{self, LocaleEntry, LocaleError, LocaleFile};
use crate::memo::{content_hash, decide, Decision};
use crate::report::{display_relative, Issue, IssueReporter, UntranslatedReport};
use crate::scheduler::{QueueError, TaskQueue};
use crate::translate::cache::ContentCache;
use crate::translate::glossary::Dictionary;
use crate::translate::normalize::CacheKey;
use crate::translate::sqlite_cache::CacheError;
use crate::translate::{RetryContext, TranslateRequest, TranslationMode, Translator};
use crate::validator::scanner::has_free_text;
use crate::validator::Validator;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Locale(#[from] LocaleError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// How processing of a file ended.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FileStatus {
    #[default]
    Completed,
    /// Deadline reached; the processed prefix was written.
    TimedOut,
    /// Translation queue failed; the processed prefix was written.
    Aborted(String),
    /// Content cache failed; the processed prefix was written.
    StorageFailed(String),
    /// Source unreadable or output unwritable; nothing usable was produced.
    Failed(String),
}

impl FileStatus {
    /// Whether no further file of the run should be processed.
    pub fn stops_run(&self) -> bool {
        matches!(self, FileStatus::TimedOut | FileStatus::Aborted(_))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileOutcome {
    pub file: String,
    pub skipped: usize,
    pub cache_hits: usize,
    pub dictionary_hits: usize,
    pub translated: usize,
    /// Sources with nothing to translate, copied as they are.
    pub verbatim: usize,
    pub failed: usize,
    pub status: FileStatus,
}

impl FileOutcome {
    /// Entries whose stored result changed in this pass.
    pub fn changed(&self) -> usize {
        self.cache_hits + self.dictionary_hits + self.translated + self.verbatim + self.failed
    }
}

#[derive(Debug, Clone, Default)]
pub struct ModOutcome {
    pub name: String,
    pub files: Vec<FileOutcome>,
    pub orphans_removed: usize,
}

impl ModOutcome {
    pub fn stopped(&self) -> bool {
        self.files.iter().any(|f| f.status.stops_run())
    }

    pub fn translated(&self) -> usize {
        self.files.iter().map(|f| f.translated).sum()
    }

    pub fn failed(&self) -> usize {
        self.files.iter().map(|f| f.failed).sum()
    }
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub mods: Vec<ModOutcome>,
    pub skipped_mods: Vec<String>,
    pub stopped_early: bool,
}

/// Result of resolving one entry.
enum Resolution {
    Stored { text: String, source: Source },
    Untranslated { reason: String },
}

#[derive(Debug, Clone, Copy)]
enum Source {
    Dictionary,
    Cache,
    Translator,
    Verbatim,
}

pub struct Pipeline {
    domain: GameDomain,
    source_lang: String,
    target: TargetLanguage,
    max_attempts: u32,
    check_interval: usize,
    flush_every: usize,
    transliteration_suffixes: Vec<String>,
    report_path: Option<PathBuf>,
    dictionary: Arc<Dictionary>,
    validator: Validator,
    cache: Arc<ContentCache>,
    queue: TaskQueue<String>,
    translator: Arc<dyn Translator>,
    report: Arc<UntranslatedReport>,
    issues: Arc<dyn IssueReporter>,
    deadline: RunDeadline,
}

impl Pipeline {
    /// Build a pipeline. Spawns the queue worker, so it must be called inside a
    /// tokio runtime. The run deadline starts counting now.
    pub fn new(
        config: &EngineConfig,
        dictionary: Arc<Dictionary>,
        cache: Arc<ContentCache>,
        translator: Arc<dyn Translator>,
        issues: Arc<dyn IssueReporter>,
    ) -> Self {
        Self {
            domain: config.domain,
            source_lang: config.source_language.as_str().to_string(),
            target: config.target_language,
            max_attempts: config.pipeline.max_translation_attempts.max(1),
            check_interval: config.pipeline.timeout_check_interval,
            flush_every: config.pipeline.flush_every.max(1),
            transliteration_suffixes: config.pipeline.transliteration_key_suffixes.clone(),
            report_path: config.pipeline.report_path.clone(),
            dictionary,
            validator: Validator::new(config.target_language, &config.validator),
            cache,
            queue: TaskQueue::new(&config.queue),
            translator,
            report: Arc::new(UntranslatedReport::new()),
            issues,
            deadline: RunDeadline::new(config.pipeline.timeout()),
        }
    }

    /// Load the dictionary and open the content cache named in `config`.
    /// A missing or broken dictionary falls back to an empty one.
    pub fn from_config(
        config: &EngineConfig,
        translator: Arc<dyn Translator>,
        issues: Arc<dyn IssueReporter>,
    ) -> Result<Self, PipelineError> {
        let dictionary = match &config.dictionary_path {
            Some(path) => Dictionary::load(path, config.domain).unwrap_or_else(|e| {
                warn!(error = %e, "dictionary load failed, using empty");
                Dictionary::empty()
            }),
            None => Dictionary::empty(),
        };
        let cache = ContentCache::open(&config.cache)?;
        info!(
            domain = %config.domain,
            target = %config.target_language,
            translator = translator.name(),
            terms = dictionary.len(),
            "pipeline ready"
        );
        Ok(Self::new(config, Arc::new(dictionary), Arc::new(cache), translator, issues))
    }

    /// Cancelling this deadline stops the run at the next entry check.
    pub fn deadline(&self) -> &RunDeadline {
        &self.deadline
    }

    pub fn report(&self) -> &Arc<UntranslatedReport> {
        &self.report
    }

    fn mode_for(&self, key: &str) -> TranslationMode {
        if self.transliteration_suffixes.iter().any(|s| key.ends_with(s.as_str())) {
            TranslationMode::Transliteration
        } else {
            TranslationMode::Standard
        }
    }

    /// Process every configured mod. Mods with bad configuration are reported
    /// and skipped; a timeout or queue failure stops the run.
    pub async fn run(&self, mods: &[ModConfig]) -> RunSummary {
        let mut summary = RunSummary::default();
        for mod_config in mods {
            if let Err(e) = mod_config.check() {
                warn!(mod_name = %mod_config.name, error = %e, "skipping mod");
                self.issues.report(Issue {
                    unit: mod_config.name.clone(),
                    title: "invalid mod configuration".into(),
                    detail: e.to_string(),
                });
                summary.skipped_mods.push(mod_config.name.clone());
                continue;
            }
            match self.process_mod(mod_config).await {
                Ok(outcome) => {
                    let stopped = outcome.stopped();
                    summary.mods.push(outcome);
                    if stopped {
                        summary.stopped_early = true;
                        break;
                    }
                }
                Err(e) => {
                    error!(mod_name = %mod_config.name, error = %e, "mod failed");
                    self.issues.report(Issue {
                        unit: mod_config.name.clone(),
                        title: "mod processing failed".into(),
                        detail: e.to_string(),
                    });
                    summary.skipped_mods.push(mod_config.name.clone());
                }
            }
        }
        if let Some(path) = &self.report_path {
            if let Err(e) = self.report.write_json(path) {
                error!(path = %path.display(), error = %e, "failed to write untranslated report");
            }
        }
        info!(
            mods = summary.mods.len(),
            skipped = summary.skipped_mods.len(),
            untranslated = self.report.len(),
            stopped_early = summary.stopped_early,
            "run finished"
        );
        summary
    }

    /// Process all source files of one mod, after removing orphaned outputs.
    pub async fn process_mod(&self, mod_config: &ModConfig) -> Result<ModOutcome, PipelineError> {
        let orphans = self.remove_orphaned_outputs(mod_config)?;
        let mut outcome = ModOutcome {
            name: mod_config.name.clone(),
            files: Vec::new(),
            orphans_removed: orphans.len(),
        };
        let target_lang = self.target.locale_id();
        for source_path in locale::find_locale_files(&mod_config.source_dir, &self.source_lang) {
            let Some(target_path) = locale::target_path(
                &mod_config.source_dir,
                &mod_config.target_dir,
                &source_path,
                &self.source_lang,
                target_lang,
            ) else {
                continue;
            };
            let label = display_relative(&source_path, &mod_config.source_dir);
            let file = match self.process_file(&mod_config.name, &source_path, &target_path).await {
                Ok(file) => FileOutcome { file: label, ..file },
                Err(e) => {
                    error!(mod_name = %mod_config.name, file = %label, error = %e, "file failed");
                    self.issues.report(Issue {
                        unit: format!("{}/{label}", mod_config.name),
                        title: "file processing failed".into(),
                        detail: e.to_string(),
                    });
                    FileOutcome {
                        file: label,
                        status: FileStatus::Failed(e.to_string()),
                        ..FileOutcome::default()
                    }
                }
            };
            let stop = file.status.stops_run();
            outcome.files.push(file);
            if stop {
                break;
            }
        }
        info!(
            mod_name = %outcome.name,
            files = outcome.files.len(),
            translated = outcome.translated(),
            failed = outcome.failed(),
            orphans_removed = outcome.orphans_removed,
            "mod processed"
        );
        Ok(outcome)
    }

    /// Delete target files whose source file no longer exists.
    pub fn remove_orphaned_outputs(&self, mod_config: &ModConfig) -> Result<Vec<PathBuf>, PipelineError> {
        if !mod_config.target_dir.is_dir() {
            return Ok(Vec::new());
        }
        let target_lang = self.target.locale_id();
        let mut removed = Vec::new();
        for target_path in locale::find_locale_files(&mod_config.target_dir, target_lang) {
            let Some(source_path) = locale::target_path(
                &mod_config.target_dir,
                &mod_config.source_dir,
                &target_path,
                target_lang,
                &self.source_lang,
            ) else {
                continue;
            };
            if source_path.exists() {
                continue;
            }
            std::fs::remove_file(&target_path).map_err(|source| PipelineError::Io {
                path: target_path.clone(),
                source,
            })?;
            info!(path = %target_path.display(), "removed orphaned output");
            removed.push(target_path);
        }
        Ok(removed)
    }

    /// Translate one source file into `target_path`.
    pub async fn process_file(
        &self,
        mod_name: &str,
        source_path: &Path,
        target_path: &Path,
    ) -> Result<FileOutcome, PipelineError> {
        let source = LocaleFile::load(source_path)?;
        let existing = match LocaleFile::load_optional(target_path) {
            Ok(file) => file,
            Err(e) => {
                warn!(path = %target_path.display(), error = %e, "existing output unreadable, starting over");
                None
            }
        };
        let stored = existing.as_ref().map(LocaleFile::index).unwrap_or_default();
        let file_label = source_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut output = LocaleFile::new(locale::target_header(
            &source.header,
            &self.source_lang,
            self.target.locale_id(),
        ));
        let mut outcome = FileOutcome {
            file: file_label.clone(),
            ..FileOutcome::default()
        };
        let mut check = DeadlineCheck::new(self.deadline.clone(), self.check_interval);
        let mut unflushed = 0usize;

        for entry in &source.entries {
            if check.tick() {
                warn!(file = %file_label, processed = output.entries.len(), "deadline reached, flushing prefix");
                outcome.status = FileStatus::TimedOut;
                break;
            }

            let previous = stored.get(entry.key.as_str());
            let decision = decide(
                &entry.text,
                previous.map(|p| p.text.as_str()),
                previous.and_then(|p| p.tag.as_deref()),
            );
            if decision == Decision::Skip {
                if let Some(prev) = previous {
                    let mut kept = (*prev).clone();
                    kept.version = entry.version;
                    output.entries.push(kept);
                    outcome.skipped += 1;
                    continue;
                }
            }
            debug!(key = %entry.key, ?decision, "entry needs work");

            let resolution = match self.resolve(&entry.key, &entry.text, decision).await {
                Ok(resolution) => resolution,
                Err(e) => {
                    error!(file = %file_label, key = %entry.key, error = %e, "aborting file");
                    outcome.status = match e {
                        PipelineError::Cache(_) => FileStatus::StorageFailed(e.to_string()),
                        _ => FileStatus::Aborted(e.to_string()),
                    };
                    break;
                }
            };

            let mut out_entry = match resolution {
                Resolution::Stored { text, source: how } => {
                    match how {
                        Source::Dictionary => outcome.dictionary_hits += 1,
                        Source::Cache => outcome.cache_hits += 1,
                        Source::Translator => outcome.translated += 1,
                        Source::Verbatim => outcome.verbatim += 1,
                    }
                    LocaleEntry::new(entry.key.clone(), text).with_tag(content_hash(&entry.text))
                }
                Resolution::Untranslated { reason } => {
                    outcome.failed += 1;
                    self.report.record(mod_name, &file_label, &entry.key, reason);
                    LocaleEntry::new(entry.key.clone(), entry.text.clone())
                }
            };
            out_entry.version = entry.version;
            output.entries.push(out_entry);

            unflushed += 1;
            if unflushed >= self.flush_every {
                output.save_atomic(target_path)?;
                unflushed = 0;
            }
        }

        if existing.as_ref() != Some(&output) {
            output.save_atomic(target_path)?;
        }
        info!(
            file = %file_label,
            skipped = outcome.skipped,
            cache_hits = outcome.cache_hits,
            dictionary_hits = outcome.dictionary_hits,
            translated = outcome.translated,
            failed = outcome.failed,
            status = ?outcome.status,
            "file processed"
        );
        Ok(outcome)
    }

    /// Produce a stored value for one entry that needs work.
    /// A `Retranslate` entry never reads the cache: its stored value was
    /// invalidated, and the cached one is the same stale text.
    async fn resolve(&self, key: &str, source_text: &str, decision: Decision) -> Result<Resolution, PipelineError> {
        if !has_free_text(source_text) {
            return Ok(Resolution::Stored {
                text: source_text.to_string(),
                source: Source::Verbatim,
            });
        }

        if let Some(value) = self.dictionary.replacement(source_text) {
            return Ok(Resolution::Stored {
                text: value.to_string(),
                source: Source::Dictionary,
            });
        }

        let mode = self.mode_for(key);
        let cache_key = CacheKey::new(self.domain, mode, source_text);
        let cached = match decision {
            Decision::Retranslate => None,
            _ => self.cache.get(&cache_key).await?,
        };
        if let Some(cached) = cached {
            match self.validator.validate_for(mode, source_text, &cached) {
                Ok(()) => {
                    return Ok(Resolution::Stored {
                        text: cached,
                        source: Source::Cache,
                    })
                }
                Err(failure) => {
                    warn!(key, reason = %failure, "cached translation no longer valid, evicting");
                    self.cache.remove(&cache_key).await?;
                }
            }
        }

        let hints = match mode {
            TranslationMode::Standard => self.dictionary.hints_for(source_text),
            TranslationMode::Transliteration => Vec::new(),
        };
        let base = TranslateRequest::new(key, source_text, self.domain, self.target)
            .with_mode(mode)
            .with_hints(hints);

        let mut retry = RetryContext::default();
        for attempt in 1..=self.max_attempts {
            let mut request = base.clone();
            if !retry.rejected.is_empty() {
                request = request.with_retry(retry.clone());
            }
            let candidate = match self.call_translator(request).await {
                Ok(text) => text,
                Err(QueueError::Refused { source, .. }) => {
                    return Ok(Resolution::Untranslated {
                        reason: source.to_string(),
                    })
                }
                Err(e) => return Err(e.into()),
            };

            match self.validator.validate_for(mode, source_text, &candidate) {
                Ok(()) => {
                    let text = to_line_text(&candidate);
                    self.cache.set(&cache_key, &text).await?;
                    return Ok(Resolution::Stored {
                        text,
                        source: Source::Translator,
                    });
                }
                Err(failure) => {
                    warn!(key, attempt, reason = %failure, "translation rejected");
                    retry.push(candidate, failure.to_string());
                }
            }
        }
        let last_reason = retry.last().map(|r| r.reason.as_str()).unwrap_or_default();
        Ok(Resolution::Untranslated {
            reason: format!(
                "validation failed after {} attempts: {last_reason}",
                self.max_attempts
            ),
        })
    }

    async fn call_translator(&self, request: TranslateRequest) -> Result<String, QueueError> {
        let translator = Arc::clone(&self.translator);
        let task_key = request.key.clone();
        self.queue
            .submit(task_key, move || {
                let translator = Arc::clone(&translator);
                let request = request.clone();
                async move { translator.translate(&request).await }
            })
            .await
    }
}

/// Locale values are single-line; real line breaks become `\n` escapes and
/// bare quotes are escaped the way parsed entries store them.
fn to_line_text(candidate: &str) -> String {
    locale::escape_quotes(&candidate.trim().replace("\r\n", "\n").replace('\n', "\\n"))
}
