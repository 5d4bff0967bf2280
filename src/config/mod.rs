//! Configuration management for ragline
//!
//! Handles loading, saving, and validating configuration from TOML files.

mod defaults;

pub use defaults::*;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Qdrant connection URL
    #[serde(default = "default_qdrant_url")]
    pub qdrant_url: String,

    /// Environment variable name for Qdrant API key
    #[serde(default = "default_qdrant_api_key_env")]
    pub qdrant_api_key_env: String,

    /// Prefix for per-tenant collections
    #[serde(default = "default_collection_prefix")]
    pub collection_prefix: String,

    /// Embedding/completion provider configuration
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Embedding model configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Completion model configuration
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Chunking configuration
    #[serde(default)]
    pub chunk: ChunkConfig,

    /// Query configuration
    #[serde(default)]
    pub query: QueryConfig,

    /// Learning loop configuration
    #[serde(default)]
    pub learn: LearnConfig,

    /// Bulk reprocessing configuration
    #[serde(default)]
    pub reprocess: ReprocessConfig,

    /// Paths configuration (internal, not user-editable)
    #[serde(skip)]
    pub paths: PathsConfig,
}

/// Closed set of supported provider endpoints, selected once at
/// configuration time. Both speak the OpenAI wire shape; they differ
/// in default base URL and credential resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    OpenAi,
    /// Any OpenAI-compatible server (vLLM, Ollama, LiteLLM, ...)
    Compatible,
}

impl ProviderKind {
    /// Endpoint used when the config does not set one
    pub fn default_base_url(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "https://api.openai.com/v1",
            ProviderKind::Compatible => "http://localhost:8000/v1",
        }
    }

    /// Environment variable consulted for the API key
    pub fn default_api_key_env(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "OPENAI_API_KEY",
            ProviderKind::Compatible => "PROVIDER_API_KEY",
        }
    }
}

/// Provider connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Which provider to talk to
    #[serde(default)]
    pub kind: ProviderKind,

    /// Overrides the kind's default endpoint when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Overrides the kind's API key environment variable when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    /// Per-call timeout in seconds (embedding, completion, vision)
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Model name/identifier
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension (must match model)
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Batch size for embedding calls (capped at 100)
    #[serde(default = "default_embedding_batch_size")]
    pub batch_size: usize,
}

/// Completion configuration (defaults; agents may override per query)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Default model identifier
    #[serde(default = "default_generation_model")]
    pub model: String,

    /// Default sampling temperature
    #[serde(default = "default_generation_temperature")]
    pub temperature: f32,

    /// Default completion budget
    #[serde(default = "default_generation_max_tokens")]
    pub max_tokens: u32,
}

/// Chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkConfig {
    /// Target characters per chunk
    #[serde(default = "default_chunk_max_chars")]
    pub max_chars: usize,

    /// Overlap characters between chunks
    #[serde(default = "default_chunk_overlap")]
    pub overlap_chars: usize,

    /// Minimum chunk size after trimming (smaller chunks are dropped)
    #[serde(default = "default_chunk_min_chars")]
    pub min_chars: usize,

    /// Sentence-boundary search window around the target cut (chars each way)
    #[serde(default = "default_boundary_window")]
    pub boundary_window: usize,

    /// A boundary cut must land at least this far past the chunk start
    #[serde(default = "default_min_cut_offset")]
    pub min_cut_offset: usize,

    /// Characters per page when no explicit page breaks exist
    #[serde(default = "default_chars_per_page")]
    pub chars_per_page: usize,
}

/// Query configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Number of candidate chunks to retrieve
    #[serde(default = "default_query_top_k")]
    pub top_k: usize,
}

/// Learning loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnConfig {
    /// Whether high-confidence exchanges are written back as documents
    #[serde(default = "default_learn_enabled")]
    pub enabled: bool,

    /// Bounded queue capacity for pending write-backs
    #[serde(default = "default_learn_queue_capacity")]
    pub queue_capacity: usize,
}

/// Bulk reprocessing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReprocessConfig {
    /// Documents processed concurrently during bulk reprocessing
    #[serde(default = "default_reprocess_concurrency")]
    pub concurrency: usize,
}

/// Internal paths configuration
#[derive(Debug, Clone, Default)]
pub struct PathsConfig {
    /// Base directory for ragline data
    pub base_dir: PathBuf,

    /// Path to config file
    pub config_file: PathBuf,

    /// Path to SQLite database
    pub db_file: PathBuf,

    /// Directory for stored upload blobs
    pub blobs_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            qdrant_url: default_qdrant_url(),
            qdrant_api_key_env: default_qdrant_api_key_env(),
            collection_prefix: default_collection_prefix(),
            provider: ProviderConfig::default(),
            embedding: EmbeddingConfig::default(),
            generation: GenerationConfig::default(),
            chunk: ChunkConfig::default(),
            query: QueryConfig::default(),
            learn: LearnConfig::default(),
            reprocess: ReprocessConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::default(),
            base_url: None,
            api_key_env: None,
            timeout_secs: default_provider_timeout(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            batch_size: default_embedding_batch_size(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: default_generation_model(),
            temperature: default_generation_temperature(),
            max_tokens: default_generation_max_tokens(),
        }
    }
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_chars: default_chunk_max_chars(),
            overlap_chars: default_chunk_overlap(),
            min_chars: default_chunk_min_chars(),
            boundary_window: default_boundary_window(),
            min_cut_offset: default_min_cut_offset(),
            chars_per_page: default_chars_per_page(),
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            top_k: default_query_top_k(),
        }
    }
}

impl Default for LearnConfig {
    fn default() -> Self {
        Self {
            enabled: default_learn_enabled(),
            queue_capacity: default_learn_queue_capacity(),
        }
    }
}

impl Default for ReprocessConfig {
    fn default() -> Self {
        Self {
            concurrency: default_reprocess_concurrency(),
        }
    }
}

impl ProviderConfig {
    /// Effective API base URL: the configured override or the kind's default
    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.kind.default_base_url())
    }

    /// Effective API key environment variable name
    pub fn api_key_env(&self) -> &str {
        self.api_key_env
            .as_deref()
            .unwrap_or_else(|| self.kind.default_api_key_env())
    }

    /// Get the provider API key from environment
    pub fn api_key(&self) -> Option<String> {
        std::env::var(self.api_key_env()).ok()
    }
}

impl Config {
    /// Get the default base directory for ragline (~/.ragline)
    pub fn default_base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".ragline")
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        Self::default_base_dir().join("config.toml")
    }

    /// Initialize paths configuration
    pub fn init_paths(&mut self, base_dir: Option<PathBuf>) {
        let base = base_dir.unwrap_or_else(Self::default_base_dir);
        self.paths = PathsConfig {
            config_file: base.join("config.toml"),
            db_file: base.join("metadata.db"),
            blobs_dir: base.join("blobs"),
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

        let base = config_path
            .parent()
            .unwrap_or(Path::new("."))
            .to_path_buf();
        config.paths = PathsConfig {
            config_file: config_path.to_path_buf(),
            db_file: base.join("metadata.db"),
            blobs_dir: base.join("blobs"),
            base_dir: base,
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default location
    pub fn load_default() -> Result<Self> {
        Self::load(&Self::default_config_path())
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

    /// Get the Qdrant API key from environment
    pub fn qdrant_api_key(&self) -> Option<String> {
        std::env::var(&self.qdrant_api_key_env).ok()
    }

    /// Get the completion/embedding provider API key; missing credentials
    /// are a configuration error for hosted providers. Compatible servers
    /// commonly run without authentication and accept any bearer token.
    pub fn provider_api_key(&self) -> Result<String> {
        match self.provider.api_key() {
            Some(key) => Ok(key),
            None if self.provider.kind == ProviderKind::Compatible => Ok("unused".to_string()),
            None => Err(Error::Config(format!(
                "Provider API key not set (export {})",
                self.provider.api_key_env()
            ))),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
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

        if self.embedding.dimension == 0 {
            return Err(Error::Config(
                "embedding.dimension must be positive".to_string(),
            ));
        }

        if self.embedding.batch_size == 0 || self.embedding.batch_size > 100 {
            return Err(Error::Config(
                "embedding.batch_size must be between 1 and 100".to_string(),
            ));
        }

        if self.query.top_k == 0 {
            return Err(Error::Config("query.top_k must be positive".to_string()));
        }

        if self.reprocess.concurrency == 0 {
            return Err(Error::Config(
                "reprocess.concurrency must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

/// Get the database URL for sqlx
pub fn database_url(config: &Config) -> String {
    format!("sqlite://{}?mode=rwc", config.paths.db_file.display())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.qdrant_url, "http://127.0.0.1:6334");
        assert_eq!(config.collection_prefix, "ragline");
        assert_eq!(config.provider.kind, ProviderKind::OpenAi);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_save_load() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.init_paths(Some(tmp.path().to_path_buf()));
        config.collection_prefix = "test_prefix".to_string();

        config.save().unwrap();
        assert!(config.paths.config_file.exists());

        let loaded = Config::load(&config.paths.config_file).unwrap();
        assert_eq!(loaded.collection_prefix, "test_prefix");
        assert_eq!(loaded.paths.blobs_dir, tmp.path().join("blobs"));
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        config.chunk.overlap_chars = config.chunk.max_chars;
        assert!(config.validate().is_err());

        config.chunk.overlap_chars = 800;
        assert!(config.validate().is_ok());

        config.embedding.batch_size = 200;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_provider_kind_parses_from_toml() {
        let toml = r#"
            [provider]
            kind = "compatible"
            base_url = "http://localhost:11434/v1"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.provider.kind, ProviderKind::Compatible);
        // Explicit overrides win over the kind's defaults
        assert_eq!(config.provider.base_url(), "http://localhost:11434/v1");
        assert_eq!(config.provider.api_key_env(), "PROVIDER_API_KEY");
    }

    #[test]
    fn test_provider_kind_drives_defaults() {
        let openai = ProviderConfig::default();
        assert_eq!(openai.base_url(), "https://api.openai.com/v1");
        assert_eq!(openai.api_key_env(), "OPENAI_API_KEY");

        let compatible = ProviderConfig {
            kind: ProviderKind::Compatible,
            ..Default::default()
        };
        assert_eq!(compatible.base_url(), "http://localhost:8000/v1");
        assert_eq!(compatible.api_key_env(), "PROVIDER_API_KEY");
    }

    #[test]
    fn test_compatible_provider_runs_without_credentials() {
        let mut config = Config::default();
        config.provider.kind = ProviderKind::Compatible;
        // Point at an env var that is never set
        config.provider.api_key_env = Some("RAGLINE_TEST_NO_SUCH_KEY".to_string());
        assert_eq!(config.provider_api_key().unwrap(), "unused");

        config.provider.kind = ProviderKind::OpenAi;
        assert!(matches!(config.provider_api_key(), Err(Error::Config(_))));
    }
}
