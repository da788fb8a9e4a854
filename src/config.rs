//! TOML configuration for waftriage.
//!
//! Layered model: an explicitly named file (flag or `WAFTRIAGE_CONFIG`),
//! then `./waftriage.toml`, then compiled-in defaults. Command line flags
//! are applied on top by the binary.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::classifier::{DEFAULT_MAX_FEATURES, DEFAULT_MIN_CORPUS_SIZE};

/// File looked up in the working directory when no path is given.
pub const LOCAL_CONFIG_FILE: &str = "waftriage.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub heuristic: HeuristicConfig,
    #[serde(default)]
    pub oracle: OracleConfig,
}

impl Config {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Resolve the configuration layers.
    ///
    /// An explicitly requested file must load; the local file is optional.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        let local = Path::new(LOCAL_CONFIG_FILE);
        if local.exists() {
            return Self::load(local);
        }

        debug!("no config file found, using compiled-in defaults");
        Ok(Self::default())
    }

    /// Reject values that would stall or disable the pipeline.
    pub fn validate(&self) -> Result<()> {
        if self.source.poll_interval_ms == 0 {
            bail!("source.poll_interval_ms must be greater than zero");
        }
        if self.classifier.max_features == 0 {
            bail!("classifier.max_features must be greater than zero");
        }
        if self.classifier.min_corpus_size == 0 {
            bail!("classifier.min_corpus_size must be greater than zero");
        }
        if self.oracle.max_attempts == 0 {
            bail!("oracle.max_attempts must be greater than zero");
        }
        if self.oracle.max_backoff_ms < self.oracle.base_backoff_ms {
            bail!("oracle.max_backoff_ms must not be smaller than oracle.base_backoff_ms");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

/// The log file to follow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub path: PathBuf,
    /// Idle wait between polls when no new data is available.
    pub poll_interval_ms: u64,
    /// Replay the existing file instead of starting at its end.
    pub from_start: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("log_waf.log"),
            poll_interval_ms: 1000,
            from_start: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Memory
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// JSON file of memorized answers.
    pub path: PathBuf,
    /// JSON-lines file of lines resolved without an oracle answer.
    pub review_log: PathBuf,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("memoria.json"),
            review_log: PathBuf::from("review.jsonl"),
        }
    }
}

// ---------------------------------------------------------------------------
// Classifier / heuristic
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Vocabulary cap of the vectorizer.
    pub max_features: usize,
    /// Corpus size below which retraining is skipped.
    pub min_corpus_size: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            max_features: DEFAULT_MAX_FEATURES,
            min_corpus_size: DEFAULT_MIN_CORPUS_SIZE,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HeuristicConfig {
    /// Markers added to the built-in list.
    pub extra_keywords: Vec<String>,
}

// ---------------------------------------------------------------------------
// Oracle
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// Base URL of the chat-completions API.
    pub endpoint: String,
    pub model: String,
    /// API key. Prefer `api_key_env` over storing it in the file.
    pub api_key: Option<String>,
    /// Environment variable read when `api_key` is unset.
    pub api_key_env: String,
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1".to_string(),
            model: "gpt-4".to_string(),
            api_key: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 30,
            max_attempts: 4,
            base_backoff_ms: 500,
            max_backoff_ms: 8000,
        }
    }
}

impl OracleConfig {
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(&self.api_key_env).ok())
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
    }
}
