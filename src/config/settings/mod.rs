#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

use crate::agent::memory::MemoryKind;
use crate::embeddings::chunking::ChunkingConfig;
use crate::embeddings::ollama::DEFAULT_EMBEDDING_DIMENSION;

pub const BASE_DIR_ENV: &str = "AGENT_LAB_HOME";
const DEFAULT_DIR_NAME: &str = ".agent-lab";
const CONFIG_FILE: &str = "config.toml";

/// Everything under `config.toml`; missing sections fall back to defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    /// Directory holding `config.toml` and the knowledge base files
    #[serde(skip)]
    pub base_dir: PathBuf,
}

/// OpenAI-compatible chat endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    pub api_base: String,
    pub model: String,
    pub temperature: f32,
    pub max_iterations: u32,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            temperature: 0.0,
            max_iterations: 5,
            timeout_secs: 60,
        }
    }
}

/// Local Ollama server used for embeddings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OllamaConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    /// Mount point when Ollama sits behind a reverse proxy, e.g. `ollama`
    pub path: String,
    pub model: String,
    pub batch_size: u32,
    pub embedding_dimension: u32,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            path: String::new(),
            model: "nomic-embed-text:latest".to_string(),
            batch_size: 16,
            embedding_dimension: DEFAULT_EMBEDDING_DIMENSION,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MemoryConfig {
    pub kind: MemoryKind,
    pub window_size: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            kind: MemoryKind::Buffer,
            window_size: 5,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not determine a home directory; set {BASE_DIR_ENV}")]
    NoHomeDirectory,
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Unsupported protocol '{0}' (use http or https)")]
    InvalidProtocol(String),
    #[error("Port must not be 0")]
    InvalidPort,
    #[error("Model name must not be empty")]
    EmptyModel,
    #[error("{field} = {value} is out of range ({min}..={max})")]
    OutOfRange {
        field: &'static str,
        value: String,
        min: String,
        max: String,
    },
    #[error("Chunk overlap ({0}) must be smaller than chunk size ({1})")]
    OverlapTooLarge(usize, usize),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

/// Single-value checks shared by [`Config::validate`] and the interactive
/// prompts.
pub mod check {
    use super::ConfigError;
    use std::fmt::Display;
    use std::ops::RangeInclusive;
    use url::Url;

    fn within<T: PartialOrd + Display>(
        field: &'static str,
        value: T,
        range: RangeInclusive<T>,
    ) -> Result<(), ConfigError> {
        if range.contains(&value) {
            Ok(())
        } else {
            Err(ConfigError::OutOfRange {
                field,
                value: value.to_string(),
                min: range.start().to_string(),
                max: range.end().to_string(),
            })
        }
    }

    #[inline]
    pub fn protocol(protocol: &str) -> Result<(), ConfigError> {
        match protocol {
            "http" | "https" => Ok(()),
            other => Err(ConfigError::InvalidProtocol(other.to_string())),
        }
    }

    #[inline]
    pub fn http_url(raw: &str) -> Result<Url, ConfigError> {
        let url = Url::parse(raw).map_err(|_| ConfigError::InvalidUrl(raw.to_string()))?;
        protocol(url.scheme())?;
        Ok(url)
    }

    #[inline]
    pub fn model(name: &str) -> Result<(), ConfigError> {
        if name.trim().is_empty() {
            Err(ConfigError::EmptyModel)
        } else {
            Ok(())
        }
    }

    #[inline]
    pub fn port(port: u16) -> Result<(), ConfigError> {
        if port == 0 { Err(ConfigError::InvalidPort) } else { Ok(()) }
    }

    #[inline]
    pub fn temperature(value: f32) -> Result<(), ConfigError> {
        within("temperature", value, 0.0..=2.0)
    }

    #[inline]
    pub fn max_iterations(value: u32) -> Result<(), ConfigError> {
        within("max_iterations", value, 1..=50)
    }

    #[inline]
    pub fn timeout_secs(value: u64) -> Result<(), ConfigError> {
        within("timeout_secs", value, 1..=600)
    }

    #[inline]
    pub fn batch_size(value: u32) -> Result<(), ConfigError> {
        within("batch_size", value, 1..=1000)
    }

    #[inline]
    pub fn embedding_dimension(value: u32) -> Result<(), ConfigError> {
        within("embedding_dimension", value, 64..=4096)
    }

    #[inline]
    pub fn chunk_size(value: usize) -> Result<(), ConfigError> {
        within("chunk_size", value, 50..=8000)
    }

    #[inline]
    pub fn window_size(value: usize) -> Result<(), ConfigError> {
        within("window_size", value, 1..=100)
    }
}

impl Default for Config {
    #[inline]
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            ollama: OllamaConfig::default(),
            chunking: ChunkingConfig::default(),
            memory: MemoryConfig::default(),
            base_dir: Self::default_base_dir().unwrap_or_else(|_| PathBuf::from(DEFAULT_DIR_NAME)),
        }
    }
}

impl Config {
    /// `$AGENT_LAB_HOME`, or `~/.agent-lab`.
    #[inline]
    pub fn default_base_dir() -> Result<PathBuf, ConfigError> {
        if let Some(dir) = std::env::var_os(BASE_DIR_ENV).filter(|v| !v.is_empty()) {
            return Ok(PathBuf::from(dir));
        }
        dirs::home_dir()
            .map(|home| home.join(DEFAULT_DIR_NAME))
            .ok_or(ConfigError::NoHomeDirectory)
    }

    /// Reads `config.toml` from `base_dir`. A missing file yields the
    /// defaults; a present one must parse and validate.
    #[inline]
    pub fn load<P: AsRef<Path>>(base_dir: P) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        let path = base_dir.join(CONFIG_FILE);

        let mut config = if path.exists() {
            let text = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let parsed: Config =
                toml::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))?;
            parsed
                .validate()
                .with_context(|| format!("Invalid settings in {}", path.display()))?;
            parsed
        } else {
            Self::default()
        };
        config.base_dir = base_dir;
        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate().context("Refusing to save invalid settings")?;

        fs::create_dir_all(&self.base_dir)
            .with_context(|| format!("Failed to create {}", self.base_dir.display()))?;

        let path = self.config_file_path();
        let text = toml::to_string_pretty(self).context("Failed to serialize settings")?;
        fs::write(&path, text).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.llm.validate()?;
        self.ollama.validate()?;

        check::chunk_size(self.chunking.chunk_size)?;
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(ConfigError::OverlapTooLarge(
                self.chunking.chunk_overlap,
                self.chunking.chunk_size,
            ));
        }

        check::window_size(self.memory.window_size)
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.base_dir.join(CONFIG_FILE)
    }

    /// SQLite database holding documents and chunk metadata
    #[inline]
    pub fn database_path(&self) -> PathBuf {
        self.base_dir.join("knowledge.db")
    }

    /// LanceDB directory holding chunk vectors
    #[inline]
    pub fn vector_database_path(&self) -> PathBuf {
        self.base_dir.join("vectors")
    }
}

impl LlmConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        check::http_url(&self.api_base)?;
        check::model(&self.model)?;
        check::temperature(self.temperature)?;
        check::max_iterations(self.max_iterations)?;
        check::timeout_secs(self.timeout_secs)
    }
}

impl OllamaConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        check::protocol(&self.protocol)?;
        check::port(self.port)?;
        self.base_url()?;
        check::model(&self.model)?;
        check::batch_size(self.batch_size)?;
        check::embedding_dimension(self.embedding_dimension)
    }

    /// `protocol://host:port/path/`, always ending in `/` so relative API
    /// routes land under the mount point
    #[inline]
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        let mount = self.path.trim_matches('/');
        let raw = if mount.is_empty() {
            format!("{}://{}:{}/", self.protocol, self.host, self.port)
        } else {
            format!("{}://{}:{}/{}/", self.protocol, self.host, self.port, mount)
        };
        Url::parse(&raw).map_err(|_| ConfigError::InvalidUrl(raw))
    }
}
