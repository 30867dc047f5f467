//! Core configuration structures and loading logic

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;

/// Error type for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// Strategy used to hand media bytes from the fetch tool to the transform tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PipelineStrategy {
    /// The fetch tool streams raw bytes into the transform tool's stdin.
    StreamingPipe,
    /// The transform tool is given resolved media URLs and fetches them itself.
    DirectUrl,
}

impl Default for PipelineStrategy {
    fn default() -> Self {
        Self::StreamingPipe
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// Address the HTTP server binds to
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

fn default_bind_addr() -> String {
    "127.0.0.1:8080".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineConfig {
    /// How the fetch and transform processes are connected
    #[serde(default)]
    pub strategy: PipelineStrategy,
    /// Directory where clip artifacts are written
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: String,
    /// Quality cap applied when a request does not name one
    #[serde(default = "default_fallback_quality")]
    pub fallback_quality: String,
}

fn default_scratch_dir() -> String {
    "scratch".to_string()
}

fn default_fallback_quality() -> String {
    "1080".to_string()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            strategy: PipelineStrategy::default(),
            scratch_dir: default_scratch_dir(),
            fallback_quality: default_fallback_quality(),
        }
    }
}

/// Job lifecycle configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobsConfig {
    /// Seconds a completed artifact is retained before cleanup
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
    /// Capacity of the per-job progress queue
    #[serde(default = "default_progress_queue_capacity")]
    pub progress_queue_capacity: usize,
    /// Milliseconds to wait for a slow subscriber before dropping a progress event
    #[serde(default = "default_progress_send_grace_ms")]
    pub progress_send_grace_ms: u64,
}

fn default_retention_secs() -> u64 {
    600
}

fn default_progress_queue_capacity() -> usize {
    64
}

fn default_progress_send_grace_ms() -> u64 {
    500
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            retention_secs: default_retention_secs(),
            progress_queue_capacity: default_progress_queue_capacity(),
            progress_send_grace_ms: default_progress_send_grace_ms(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Parses the config file and handles missing optional fields with defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Overrides the following values if environment variables are set:
    /// - CLIPPER_BIND_ADDR -> server.bind_addr
    /// - CLIPPER_STRATEGY -> pipeline.strategy ("streaming-pipe" or "direct-url")
    /// - CLIPPER_SCRATCH_DIR -> pipeline.scratch_dir
    /// - CLIPPER_FALLBACK_QUALITY -> pipeline.fallback_quality
    /// - CLIPPER_RETENTION_SECS -> jobs.retention_secs
    /// - CLIPPER_QUEUE_CAPACITY -> jobs.progress_queue_capacity
    /// - CLIPPER_SEND_GRACE_MS -> jobs.progress_send_grace_ms
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("CLIPPER_BIND_ADDR") {
            if !val.is_empty() {
                self.server.bind_addr = val;
            }
        }

        if let Ok(val) = env::var("CLIPPER_STRATEGY") {
            match val.as_str() {
                "streaming-pipe" => self.pipeline.strategy = PipelineStrategy::StreamingPipe,
                "direct-url" => self.pipeline.strategy = PipelineStrategy::DirectUrl,
                _ => {} // Invalid value, keep existing
            }
        }

        if let Ok(val) = env::var("CLIPPER_SCRATCH_DIR") {
            if !val.is_empty() {
                self.pipeline.scratch_dir = val;
            }
        }

        if let Ok(val) = env::var("CLIPPER_FALLBACK_QUALITY") {
            if !val.is_empty() {
                self.pipeline.fallback_quality = val;
            }
        }

        if let Ok(val) = env::var("CLIPPER_RETENTION_SECS") {
            if let Ok(secs) = val.parse::<u64>() {
                self.jobs.retention_secs = secs;
            }
        }

        if let Ok(val) = env::var("CLIPPER_QUEUE_CAPACITY") {
            if let Ok(cap) = val.parse::<usize>() {
                self.jobs.progress_queue_capacity = cap;
            }
        }

        if let Ok(val) = env::var("CLIPPER_SEND_GRACE_MS") {
            if let Ok(ms) = val.parse::<u64>() {
                self.jobs.progress_send_grace_ms = ms;
            }
        }
    }

    /// Load configuration from file and apply environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }
}
