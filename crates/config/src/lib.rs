//! Configuration loading and validation for the Nebula chat service.
//!
//! Loads configuration from `nebula.toml` in the working directory (or
//! the path in `NEBULA_CONFIG`) with environment variable overrides.
//! Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `nebula.toml`. Every field has a default so an
/// absent file yields a runnable (if unconfigured) service.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Google API key for chat and embedding calls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Chat model.
    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    /// Embedding model used to build and query the document index.
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Sampling temperature for chat completions.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens per model response.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Document corpus and similarity search settings.
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Turn engine settings.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Outbound fetch tool settings.
    #[serde(default)]
    pub fetch: FetchConfig,

    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,
}

fn default_chat_model() -> String {
    "gemini-1.5-flash".into()
}
fn default_embedding_model() -> String {
    "text-embedding-004".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    2048
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("chat_model", &self.chat_model)
            .field("embedding_model", &self.embedding_model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("retrieval", &self.retrieval)
            .field("engine", &self.engine)
            .field("fetch", &self.fetch)
            .field("server", &self.server)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Directory scanned at startup for .md/.txt corpus documents.
    #[serde(default = "default_docs_dir")]
    pub docs_dir: String,

    /// Target chunk size in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Overlap carried between consecutive chunks.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// Passages returned per query.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

fn default_docs_dir() -> String {
    "docs".into()
}
fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}
fn default_top_k() -> usize {
    3
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            docs_dir: default_docs_dir(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            top_k: default_top_k(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound on tool-call/model-call cycles per turn.
    #[serde(default = "default_max_tool_cycles")]
    pub max_tool_cycles: u32,
}

fn default_max_tool_cycles() -> u32 {
    5
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_tool_cycles: default_max_tool_cycles(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Timeout for one outbound fetch, in seconds.
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,

    /// User-Agent sent with fetches. Some sites block non-browser agents.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_fetch_timeout() -> u64 {
    10
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36".into()
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_fetch_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Conversations kept in memory before the store evicts the
    /// least-recently-updated one.
    #[serde(default = "default_max_conversations")]
    pub max_conversations: usize,
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    8000
}
fn default_max_conversations() -> usize {
    1000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_conversations: default_max_conversations(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path with env overrides.
    ///
    /// The file path is `NEBULA_CONFIG` if set, else `nebula.toml` in
    /// the working directory. Environment variables checked afterwards:
    /// - `GOOGLE_API_KEY` / `NEBULA_API_KEY` (API key)
    /// - `NEBULA_MODEL` (chat model)
    /// - `NEBULA_DOCS_DIR` (corpus directory)
    /// - `NEBULA_PORT` (server port)
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("NEBULA_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("nebula.toml"));
        let mut config = Self::load_from(&path)?;

        if config.api_key.is_none() {
            config.api_key = std::env::var("GOOGLE_API_KEY")
                .ok()
                .or_else(|| std::env::var("NEBULA_API_KEY").ok());
        }

        if let Ok(model) = std::env::var("NEBULA_MODEL") {
            config.chat_model = model;
        }

        if let Ok(dir) = std::env::var("NEBULA_DOCS_DIR") {
            config.retrieval.docs_dir = dir;
        }

        if let Ok(port) = std::env::var("NEBULA_PORT") {
            config.server.port = port
                .parse()
                .map_err(|_| ConfigError::ValidationError(format!("invalid NEBULA_PORT: {port}")))?;
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.temperature < 0.0 || self.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.retrieval.chunk_size == 0 {
            return Err(ConfigError::ValidationError(
                "retrieval.chunk_size must be > 0".into(),
            ));
        }

        if self.retrieval.chunk_overlap >= self.retrieval.chunk_size {
            return Err(ConfigError::ValidationError(
                "retrieval.chunk_overlap must be smaller than chunk_size".into(),
            ));
        }

        if self.retrieval.top_k == 0 {
            return Err(ConfigError::ValidationError(
                "retrieval.top_k must be >= 1".into(),
            ));
        }

        if self.engine.max_tool_cycles == 0 {
            return Err(ConfigError::ValidationError(
                "engine.max_tool_cycles must be >= 1".into(),
            ));
        }

        if self.fetch.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "fetch.timeout_secs must be >= 1".into(),
            ));
        }

        if self.server.max_conversations == 0 {
            return Err(ConfigError::ValidationError(
                "server.max_conversations must be >= 1".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is set (env overrides are merged by `load`).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            chat_model: default_chat_model(),
            embedding_model: default_embedding_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            retrieval: RetrievalConfig::default(),
            engine: EngineConfig::default(),
            fetch: FetchConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
