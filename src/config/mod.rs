//! Configuration management for lectern
//!
//! Handles loading, saving, and validating configuration from TOML files.

mod defaults;

pub use defaults::*;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Embedding/generation provider
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Chunking configuration
    #[serde(default)]
    pub chunk: ChunkConfig,

    /// Processing queue configuration
    #[serde(default)]
    pub queue: QueueConfig,

    /// Document fetch configuration
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Query configuration
    #[serde(default)]
    pub query: QueryConfig,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Cache invalidation hook
    #[serde(default)]
    pub cache: CacheConfig,

    /// Paths configuration (internal, not user-editable)
    #[serde(skip)]
    pub paths: PathsConfig,
}

/// Provider configuration (OpenAI-compatible API)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Base URL, e.g. `https://api.openai.com/v1`
    #[serde(default = "default_provider_base_url")]
    pub base_url: String,

    /// Environment variable holding the API key
    #[serde(default = "default_provider_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    /// Embedding dimension (must match model)
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Texts per embedding request
    #[serde(default = "default_embedding_batch_size")]
    pub batch_size: usize,

    /// Per-request timeout in seconds
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,

    /// Fallback delay when a rate limit response has no Retry-After
    #[serde(default = "default_retry_after_secs")]
    pub default_retry_after_secs: u64,

    /// Client-side pacing (0 disables)
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

/// Chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkConfig {
    /// Maximum characters per chunk
    #[serde(default = "default_chunk_max_chars")]
    pub max_chars: usize,

    /// Overlap characters between chunks
    #[serde(default = "default_chunk_overlap")]
    pub overlap_chars: usize,

    /// How far back from the limit to look for a break point
    #[serde(default = "default_chunk_boundary_window")]
    pub boundary_window: usize,

    /// Minimum chunk size (don't create tiny chunks)
    #[serde(default = "default_chunk_min_chars")]
    pub min_chars: usize,
}

/// Processing queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_queue_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_queue_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// How long a claim stays valid without a heartbeat
    #[serde(default = "default_queue_lease_secs")]
    pub lease_secs: u64,

    #[serde(default = "default_queue_heartbeat_secs")]
    pub heartbeat_secs: u64,

    /// First delay after a timeout or provider error
    #[serde(default = "default_queue_backoff_base_secs")]
    pub backoff_base_secs: u64,

    #[serde(default = "default_queue_backoff_max_secs")]
    pub backoff_max_secs: u64,
}

/// Document fetch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Request timeout in seconds
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,

    /// Maximum accepted document size
    #[serde(default = "default_fetch_max_bytes")]
    pub max_bytes: usize,

    /// User agent string
    #[serde(default = "default_fetch_user_agent")]
    pub user_agent: String,

    /// Accept `file://` material URLs (reads the worker's local filesystem)
    #[serde(default)]
    pub allow_file_urls: bool,
}

/// Query configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Chunks retrieved per question
    #[serde(default = "default_query_top_k")]
    pub top_k: usize,

    /// Optional similarity floor (0.0 - 1.0)
    #[serde(default)]
    pub min_score: Option<f32>,

    /// Character budget for the assembled context
    #[serde(default = "default_query_max_context_chars")]
    pub max_context_chars: usize,

    /// Number of prior turns folded into the prompt
    #[serde(default = "default_query_history_turns")]
    pub history_turns: usize,

    #[serde(default = "default_query_max_history_chars")]
    pub max_history_chars: usize,

    /// Ask the model for follow-up questions
    #[serde(default = "default_query_model_follow_ups")]
    pub model_follow_ups: bool,

    #[serde(default = "default_query_max_follow_ups")]
    pub max_follow_ups: usize,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_host")]
    pub host: String,

    #[serde(default = "default_server_port")]
    pub port: u16,

    #[serde(default)]
    pub enable_cors: bool,

    /// Run the ingestion worker inside the server process
    #[serde(default = "default_server_run_worker")]
    pub run_worker: bool,
}

/// Cache invalidation configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Webhook notified whenever a material's processing status changes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalidation_url: Option<String>,
}

/// Internal paths configuration
#[derive(Debug, Clone, Default, Serialize)]
pub struct PathsConfig {
    /// Base directory for lectern data
    pub base_dir: PathBuf,

    /// Path to config file
    pub config_file: PathBuf,

    /// Path to SQLite database
    pub db_file: PathBuf,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_provider_base_url(),
            api_key_env: default_provider_api_key_env(),
            embedding_model: default_embedding_model(),
            chat_model: default_chat_model(),
            dimension: default_embedding_dimension(),
            batch_size: default_embedding_batch_size(),
            timeout_secs: default_provider_timeout(),
            default_retry_after_secs: default_retry_after_secs(),
            requests_per_second: default_requests_per_second(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_chars: default_chunk_max_chars(),
            overlap_chars: default_chunk_overlap(),
            boundary_window: default_chunk_boundary_window(),
            min_chars: default_chunk_min_chars(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_queue_max_attempts(),
            poll_interval_ms: default_queue_poll_interval_ms(),
            lease_secs: default_queue_lease_secs(),
            heartbeat_secs: default_queue_heartbeat_secs(),
            backoff_base_secs: default_queue_backoff_base_secs(),
            backoff_max_secs: default_queue_backoff_max_secs(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_fetch_timeout(),
            max_bytes: default_fetch_max_bytes(),
            user_agent: default_fetch_user_agent(),
            allow_file_urls: false,
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            top_k: default_query_top_k(),
            min_score: None,
            max_context_chars: default_query_max_context_chars(),
            history_turns: default_query_history_turns(),
            max_history_chars: default_query_max_history_chars(),
            model_follow_ups: default_query_model_follow_ups(),
            max_follow_ups: default_query_max_follow_ups(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
            enable_cors: false,
            run_worker: default_server_run_worker(),
        }
    }
}

impl Config {
    /// Get the default base directory for lectern (~/.lectern)
    pub fn default_base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".lectern")
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        Self::default_base_dir().join("config.toml")
    }

    /// Initialize paths configuration
    pub(crate) fn init_paths(&mut self, base_dir: Option<PathBuf>) {
        let base = base_dir.unwrap_or_else(Self::default_base_dir);
        self.paths = PathsConfig {
            config_file: base.join("config.toml"),
            db_file: base.join("metadata.db"),
            base_dir: base,
        };
    }

    /// Load configuration from a specific file path
    pub fn load(config_path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", config_path);

        if !config_path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }

        let content = std::fs::read_to_string(config_path)?;
        let mut config: Config = toml::from_str(&content)?;

        let base = config_path.parent().unwrap_or(Path::new(".")).to_path_buf();
        config.paths = PathsConfig {
            config_file: config_path.to_path_buf(),
            db_file: base.join("metadata.db"),
            base_dir: base,
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific base directory, falling back to defaults
    pub fn load_from(base_dir: Option<PathBuf>) -> Result<Self> {
        let mut config = Config::default();
        config.init_paths(base_dir);

        if config.paths.config_file.exists() {
            debug!("Loading config from {:?}", config.paths.config_file);
            let content = std::fs::read_to_string(&config.paths.config_file)?;
            let mut loaded: Config = toml::from_str(&content)?;
            loaded.paths = config.paths;
            config = loaded;
        } else {
            debug!("No config file found, using defaults");
        }

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.paths.config_file.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&self.paths.config_file, content)?;
        info!("Saved config to {:?}", self.paths.config_file);
        Ok(())
    }

    /// Get the provider API key from environment
    pub fn provider_api_key(&self) -> Option<String> {
        std::env::var(&self.provider.api_key_env)
            .ok()
            .filter(|k| !k.is_empty())
    }

    /// Check if lectern is initialized (config and DB exist)
    pub fn is_initialized(&self) -> bool {
        self.paths.config_file.exists() && self.paths.db_file.exists()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.chunk.max_chars == 0 {
            return Err(Error::Config("chunk.max_chars must be > 0".to_string()));
        }

        if self.chunk.max_chars < self.chunk.min_chars {
            return Err(Error::Config(
                "chunk.max_chars must be >= chunk.min_chars".to_string(),
            ));
        }

        if self.chunk.overlap_chars >= self.chunk.max_chars {
            return Err(Error::Config(
                "chunk.overlap_chars must be < chunk.max_chars".to_string(),
            ));
        }

        if self.chunk.boundary_window > self.chunk.max_chars {
            return Err(Error::Config(
                "chunk.boundary_window must be <= chunk.max_chars".to_string(),
            ));
        }

        if self.provider.batch_size == 0 {
            return Err(Error::Config(
                "provider.batch_size must be > 0".to_string(),
            ));
        }

        if self.provider.dimension == 0 {
            return Err(Error::Config(
                "provider.dimension must be > 0".to_string(),
            ));
        }

        if self.provider.timeout_secs == 0 {
            return Err(Error::Config(
                "provider.timeout_secs must be > 0".to_string(),
            ));
        }

        if self.queue.max_attempts == 0 {
            return Err(Error::Config("queue.max_attempts must be > 0".to_string()));
        }

        if self.queue.heartbeat_secs == 0 || self.queue.heartbeat_secs >= self.queue.lease_secs {
            return Err(Error::Config(
                "queue.heartbeat_secs must be > 0 and < queue.lease_secs".to_string(),
            ));
        }

        if self.queue.backoff_max_secs < self.queue.backoff_base_secs {
            return Err(Error::Config(
                "queue.backoff_max_secs must be >= queue.backoff_base_secs".to_string(),
            ));
        }

        if let Some(min_score) = self.query.min_score {
            if !(-1.0..=1.0).contains(&min_score) {
                return Err(Error::Config(
                    "query.min_score must be between -1.0 and 1.0".to_string(),
                ));
            }
        }

        if !(2..=4).contains(&self.query.max_follow_ups) {
            return Err(Error::Config(
                "query.max_follow_ups must be between 2 and 4".to_string(),
            ));
        }

        if let Some(url) = &self.cache.invalidation_url {
            url::Url::parse(url)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.chunk.max_chars, 1000);
        assert_eq!(config.chunk.overlap_chars, 200);
        assert_eq!(config.query.top_k, 5);
        assert_eq!(config.queue.max_attempts, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_save_load() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.init_paths(Some(tmp.path().to_path_buf()));
        config.provider.chat_model = "gpt-4o-mini".to_string();
        config.queue.max_attempts = 5;

        config.save().unwrap();
        assert!(config.paths.config_file.exists());

        let loaded = Config::load_from(Some(tmp.path().to_path_buf())).unwrap();
        assert_eq!(loaded.provider.chat_model, "gpt-4o-mini");
        assert_eq!(loaded.queue.max_attempts, 5);
        assert_eq!(loaded.paths.db_file, tmp.path().join("metadata.db"));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[query]\ntop_k = 8\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.query.top_k, 8);
        assert_eq!(config.query.max_context_chars, 6000);
        assert_eq!(config.chunk.max_chars, 1000);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        // Invalid: overlap >= max
        config.chunk.overlap_chars = config.chunk.max_chars;
        assert!(config.validate().is_err());

        config.chunk.overlap_chars = 100;
        assert!(config.validate().is_ok());

        config.queue.max_attempts = 0;
        assert!(config.validate().is_err());
        config.queue.max_attempts = 3;

        config.queue.heartbeat_secs = config.queue.lease_secs;
        assert!(config.validate().is_err());
        config.queue.heartbeat_secs = 30;

        config.query.max_follow_ups = 8;
        assert!(config.validate().is_err());
        config.query.max_follow_ups = 1;
        assert!(config.validate().is_err());
        config.query.max_follow_ups = 2;
        assert!(config.validate().is_ok());

        config.cache.invalidation_url = Some("not a url".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_config_file() {
        let tmp = TempDir::new().unwrap();
        let result = Config::load(&tmp.path().join("nope.toml"));
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
