//! Configuration loading.
//!
//! Reads `config/default.toml` (or the file given with `--config`), fills
//! every missing key with its default, then applies environment overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use blimp_intent::{LlmProvider, ResolverConfig};
use serde::Deserialize;

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct BlimpConfig {
    pub storage: StorageConfig,
    pub vault: VaultConfig,
    pub resolver: ResolverConfig,
    pub classifier: ClassifierConfig,
    pub execution: ExecutionConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data/blimp.db"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    pub path: PathBuf,
    /// Base64-encoded 32-byte master key.
    pub key: Option<String>,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/vault.db"),
            key: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassifierBackend {
    Llm,
    Keyword,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub backend: ClassifierBackend,
    pub provider: LlmProvider,
    /// Provider default when unset.
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub timeout_secs: u64,
    pub keyword_fallback: bool,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            backend: ClassifierBackend::Llm,
            provider: LlmProvider::Gemini,
            model: None,
            api_key: None,
            base_url: None,
            timeout_secs: 30,
            keyword_fallback: true,
        }
    }
}

impl ClassifierConfig {
    pub fn model(&self) -> &str {
        match (&self.model, self.provider) {
            (Some(model), _) => model,
            (None, LlmProvider::OpenAi) => "gpt-4o-mini",
            (None, LlmProvider::Gemini) => "gemini-2.0-flash-exp",
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub handler_timeout_secs: u64,
    /// Per-request timeout for application API calls.
    pub http_timeout_secs: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            handler_timeout_secs: 60,
            http_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}

impl BlimpConfig {
    /// Load from `path`, or from [`DEFAULT_CONFIG_PATH`] if it exists, then
    /// apply environment overrides.
    ///
    /// An explicitly given path must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_PATH))?
            }
            None => Self::default(),
        };
        config.apply_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `BLIMP_*` overrides read through `var`. Empty values are ignored.
    pub fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        let get = |name: &str| var(name).filter(|v| !v.trim().is_empty());
        if let Some(path) = get("BLIMP_DB_PATH") {
            self.storage.db_path = PathBuf::from(path);
        }
        if let Some(key) = get("BLIMP_VAULT_KEY") {
            self.vault.key = Some(key);
        }
        if let Some(key) = get("BLIMP_CLASSIFIER_API_KEY") {
            self.classifier.api_key = Some(key);
        }
        if let Some(level) = get("BLIMP_LOG") {
            self.logging.level = level;
        }
    }
}
