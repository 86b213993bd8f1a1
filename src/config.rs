//! Engine configuration, loaded from TOML.
//! Every field has a default, so an empty file is a valid configuration.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{GameDomain, TargetLanguage};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid version strategy \"{0}\" (expected latest, tag:<name> or commit:<sha>)")]
    VersionStrategy(String),
    #[error("mod {name}: {reason}")]
    InvalidMod { name: String, reason: String },
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    pub domain: GameDomain,
    pub source_language: SourceLanguage,
    pub target_language: TargetLanguage,
    /// Dictionary file; without one every entry goes to the translator.
    pub dictionary_path: Option<PathBuf>,
    pub queue: QueueConfig,
    pub cache: CacheConfig,
    pub pipeline: PipelineConfig,
    pub validator: ValidatorConfig,
    pub invalidation: InvalidationConfig,
    pub mods: Vec<ModConfig>,
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(text)?;
        config.check()?;
        Ok(config)
    }

    /// Reject values that would make the engine misbehave rather than fail.
    fn check(&self) -> Result<(), ConfigError> {
        if self.pipeline.max_translation_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "pipeline.max_translation_attempts",
                reason: "must be at least 1".into(),
            });
        }
        if self.cache.l1_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "cache.l1_capacity",
                reason: "must be at least 1".into(),
            });
        }
        if self.validator.transliteration_min_ratio > self.validator.transliteration_max_ratio {
            return Err(ConfigError::InvalidValue {
                field: "validator.transliteration_min_ratio",
                reason: "must not exceed transliteration_max_ratio".into(),
            });
        }
        Ok(())
    }
}

/// Language id of the upstream files (`english` in `l_english`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct SourceLanguage(pub String);

impl Default for SourceLanguage {
    fn default() -> Self {
        Self("english".into())
    }
}

impl SourceLanguage {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Minimum spacing between the starts of two translator calls.
    pub min_interval_ms: u64,
    /// Literal backoff table; its length is the retry bound.
    pub backoff_ms: Vec<u64>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 1000,
            backoff_ms: vec![1000, 2000, 4000, 8000, 16000],
        }
    }
}

impl QueueConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    pub fn backoff(&self) -> Vec<Duration> {
        self.backoff_ms.iter().copied().map(Duration::from_millis).collect()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub path: PathBuf,
    pub l1_capacity: usize,
    pub l1_ttl_secs: u64,
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_percent: u32,
    pub busy_timeout_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("translation_cache.sqlite"),
            l1_capacity: 512,
            l1_ttl_secs: 600,
            max_retries: 6,
            base_delay_ms: 50,
            max_delay_ms: 5000,
            jitter_percent: 25,
            busy_timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Translator attempts per entry, including the first one.
    pub max_translation_attempts: u32,
    /// Wall-clock budget for a whole run.
    pub timeout_secs: Option<u64>,
    /// Check the deadline every N entries.
    pub timeout_check_interval: usize,
    /// Persist the file after every N newly translated entries.
    pub flush_every: usize,
    /// Keys with these suffixes are transliterated rather than translated.
    pub transliteration_key_suffixes: Vec<String>,
    /// Where to write the untranslated-items report, if anywhere.
    pub report_path: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_translation_attempts: 3,
            timeout_secs: None,
            timeout_check_interval: 10,
            flush_every: 20,
            transliteration_key_suffixes: vec!["_name".into(), "_adj".into()],
            report_path: None,
        }
    }
}

impl PipelineConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ValidatorConfig {
    pub boilerplate_phrases: Vec<String>,
    /// Phrases that contain a boilerplate phrase but are legitimate text.
    pub boilerplate_exceptions: Vec<String>,
    pub reject_untranslated: bool,
    pub transliteration_min_ratio: f64,
    pub transliteration_max_ratio: f64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            boilerplate_phrases: [
                "yes, i understand",
                "here is the translation",
                "here's the translation",
                "translated text:",
                "as an ai",
                "i cannot translate",
                "네, 알겠습니다",
                "번역 결과:",
                "다음은 번역",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            boilerplate_exceptions: vec!["네, 알겠습니다, 폐하".into()],
            reject_untranslated: true,
            transliteration_min_ratio: 0.2,
            transliteration_max_ratio: 3.0,
        }
    }
}

/// How to treat entries whose matched terms are proper nouns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProperNounPolicy {
    /// Skip invalidation only when every matched term is a proper noun.
    #[default]
    Every,
    /// Skip invalidation when any matched term is a proper noun.
    Any,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct InvalidationConfig {
    pub proper_noun_policy: ProperNounPolicy,
}

/// One upstream mod to keep in sync.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModConfig {
    pub name: String,
    pub source_dir: PathBuf,
    pub target_dir: PathBuf,
    #[serde(default = "default_version_strategy")]
    pub version_strategy: String,
}

fn default_version_strategy() -> String {
    "latest".into()
}

impl ModConfig {
    pub fn strategy(&self) -> Result<VersionStrategy, ConfigError> {
        self.version_strategy.parse()
    }

    /// Check the unit can be processed at all.
    pub fn check(&self) -> Result<VersionStrategy, ConfigError> {
        let strategy = self.strategy()?;
        if !self.source_dir.is_dir() {
            return Err(ConfigError::InvalidMod {
                name: self.name.clone(),
                reason: format!("source dir {} does not exist", self.source_dir.display()),
            });
        }
        Ok(strategy)
    }
}

/// Which upstream revision a mod tracks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionStrategy {
    Latest,
    Tag(String),
    Commit(String),
}

impl FromStr for VersionStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == "latest" {
            return Ok(VersionStrategy::Latest);
        }
        match s.split_once(':') {
            Some(("tag", name)) if !name.is_empty() => Ok(VersionStrategy::Tag(name.to_string())),
            Some(("commit", sha)) if !sha.is_empty() && sha.chars().all(|c| c.is_ascii_hexdigit()) => {
                Ok(VersionStrategy::Commit(sha.to_string()))
            }
            _ => Err(ConfigError::VersionStrategy(s.to_string())),
        }
    }
}

impl fmt::Display for VersionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionStrategy::Latest => f.write_str("latest"),
            VersionStrategy::Tag(name) => write!(f, "tag:{name}"),
            VersionStrategy::Commit(sha) => write!(f, "commit:{sha}"),
        }
    }
}
