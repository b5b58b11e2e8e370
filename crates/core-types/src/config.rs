//! Startup configuration: a TOML file, `.env`, and `MMSEARCH_*` overrides.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "mmsearch.toml";
pub const CONFIG_PATH_ENV: &str = "MMSEARCH_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write default config {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Tantivy,
    Jsonl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderBackend {
    /// In-process sentence-transformer via fastembed.
    Local,
    Http,
    /// Feature hashing; for tests and offline smoke runs only.
    Hash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexLoadMode {
    /// Map the file and let the OS page vectors in during search.
    Mmap,
    /// Read the whole file into memory at load time.
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Tantivy directory or JSONL file, depending on `backend`.
    pub endpoint: String,
    pub retry_attempts: u32,
    pub retry_backoff_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Tantivy,
            endpoint: "docstore".to_string(),
            retry_attempts: 3,
            retry_backoff_ms: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub path: String,
    /// HNSW search breadth (`ef`); higher trades latency for recall.
    pub nprobe: usize,
    pub load_mode: IndexLoadMode,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: "large_index.usearch".to_string(),
            nprobe: 10,
            load_mode: IndexLoadMode::Mmap,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedderConfig {
    pub backend: EmbedderBackend,
    pub model: String,
    pub endpoint: String,
    /// Where the local backend keeps downloaded model files.
    pub cache_dir: String,
    pub dimension: usize,
    pub max_tokens: usize,
    pub timeout_secs: u64,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            backend: EmbedderBackend::Local,
            model: "all-MiniLM-L6-v2".to_string(),
            endpoint: "http://localhost:11434/api/embeddings".to_string(),
            cache_dir: ".fastembed_cache".to_string(),
            dimension: 384,
            max_tokens: 256,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub default_k: usize,
    /// Largest `k` a caller may request.
    pub max_k: usize,
    /// Characters of content shown under each result.
    pub preview_chars: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_k: 3,
            max_k: 100,
            preview_chars: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    /// Optional log file; empty keeps logging on stderr only.
    pub file: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
            file: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub index: IndexConfig,
    pub embedder: EmbedderConfig,
    pub search: SearchConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn from_toml_str(raw: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Apply `MMSEARCH_*` environment overrides on top of file values.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| env::var(key).ok())
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("MMSEARCH_STORE_ENDPOINT") {
            self.store.endpoint = v;
        }
        if let Some(v) = lookup("MMSEARCH_INDEX_PATH") {
            self.index.path = v;
        }
        if let Some(v) = lookup("MMSEARCH_EMBEDDER_MODEL") {
            self.embedder.model = v;
        }
        if let Some(v) = lookup("MMSEARCH_NPROBE") {
            self.index.nprobe = parse_positive("MMSEARCH_NPROBE", &v)?;
        }
        if let Some(v) = lookup("MMSEARCH_DEFAULT_K") {
            self.search.default_k = parse_positive("MMSEARCH_DEFAULT_K", &v)?;
        }
        Ok(())
    }

    /// Reject knobs that must be positive or that contradict each other.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("index.nprobe", self.index.nprobe),
            ("search.default_k", self.search.default_k),
            ("search.max_k", self.search.max_k),
            ("embedder.dimension", self.embedder.dimension),
            ("embedder.max_tokens", self.embedder.max_tokens),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    key,
                    reason: "must be a positive integer".to_string(),
                });
            }
        }
        if self.search.default_k > self.search.max_k {
            return Err(ConfigError::Invalid {
                key: "search.default_k",
                reason: format!("must not exceed search.max_k ({})", self.search.max_k),
            });
        }
        if self.index.path.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "index.path",
                reason: "must not be empty".to_string(),
            });
        }
        if self.store.endpoint.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "store.endpoint",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_positive(key: &'static str, raw: &str) -> Result<usize, ConfigError> {
    match raw.trim().parse::<usize>() {
        Ok(0) | Err(_) => Err(ConfigError::Invalid {
            key,
            reason: format!("expected a positive integer, got {raw:?}"),
        }),
        Ok(v) => Ok(v),
    }
}

/// Resolve the config path: explicit argument, then `MMSEARCH_CONFIG`, then the default file.
pub fn resolve_config_path(path: Option<&Path>) -> PathBuf {
    path.map(Path::to_path_buf)
        .or_else(|| env::var_os(CONFIG_PATH_ENV).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

/// Load configuration, writing a default file when none exists yet.
///
/// `.env` is read first so its values take part in the environment overrides.
pub fn load_or_create_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    let path = resolve_config_path(path);

    let mut cfg = if path.exists() {
        let raw = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        AppConfig::from_toml_str(&raw, &path)?
    } else {
        let cfg = AppConfig::default();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: path.clone(),
                source,
            })?;
        }
        fs::write(&path, cfg.to_toml_string()?).map_err(|source| ConfigError::Write {
            path: path.clone(),
            source,
        })?;
        cfg
    };

    cfg.apply_env_overrides()?;
    cfg.validate()?;
    Ok(cfg)
}
