use anyhow::{Context, Result};
use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::chunker::{Chunker, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};

pub type Number = f32;

pub const EPSILON: f32 = 1e-6;

pub const DEFAULT_DB_PATH: &str = "data/vector_db";
pub const DEFAULT_TOP_K: usize = 3;
pub const DEFAULT_DIMENSIONS: usize = 384;
pub const DEFAULT_GENERATOR_TIMEOUT_SECS: u64 = 60;

#[derive(Deserialize)]
pub struct RagConfig {
    pub db_path: Option<String>,
    pub chunk_size: Option<usize>,
    pub chunk_overlap: Option<usize>,
    pub top_k: Option<usize>,
    pub embedding_dimensions: Option<usize>,
    pub generator_command: Option<String>,
    pub generator_timeout_secs: Option<u64>,
    pub verbose: Option<bool>,
}

impl RagConfig {
    pub fn try_from(config: &Config) -> Result<Self, ConfigError> {
        Ok(RagConfig {
            db_path: optional(config, "db_path")?,
            chunk_size: optional(config, "chunk_size")?,
            chunk_overlap: optional(config, "chunk_overlap")?,
            top_k: optional(config, "top_k")?,
            embedding_dimensions: optional(config, "embedding_dimensions")?,
            generator_command: optional(config, "generator_command")?,
            generator_timeout_secs: optional(config, "generator_timeout_secs")?,
            verbose: optional(config, "verbose")?,
        })
    }
}

/// An unset key is `None`; a set key that does not parse is an error.
fn optional<T: DeserializeOwned>(config: &Config, key: &str) -> Result<Option<T>, ConfigError> {
    match config.get::<T>(key) {
        Ok(value) => Ok(Some(value)),
        Err(ConfigError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Effective settings after layering `ragstore_config.*` and `RAGSTORE_*`.
#[derive(Debug, Clone)]
pub struct State {
    pub db_path: PathBuf,
    pub chunker: Chunker,
    pub top_k: usize,
    pub dimensions: usize,
    pub generator_command: Option<String>,
    pub generator_timeout: Duration,
    pub verbose: bool,
}

impl State {
    pub fn new() -> Result<Self> {
        let config = Config::builder()
            .add_source(ConfigFile::with_name("ragstore_config").required(false))
            .add_source(Environment::with_prefix("RAGSTORE"))
            .build()
            .context("Failed to assemble configuration")?;
        Self::from_config(&config)
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let rag_config = RagConfig::try_from(config).context("Invalid configuration value")?;

        let chunk_size = rag_config.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE);
        let chunk_overlap = rag_config.chunk_overlap.unwrap_or(DEFAULT_CHUNK_OVERLAP);
        let chunker = Chunker::new(chunk_size, chunk_overlap)
            .context("chunk_overlap must be smaller than chunk_size")?;

        let top_k = rag_config.top_k.unwrap_or(DEFAULT_TOP_K);
        if top_k == 0 {
            anyhow::bail!("top_k must be at least 1.");
        }

        let dimensions = rag_config.embedding_dimensions.unwrap_or(DEFAULT_DIMENSIONS);
        if dimensions == 0 {
            anyhow::bail!("embedding_dimensions must be at least 1.");
        }

        Ok(Self {
            db_path: PathBuf::from(
                rag_config
                    .db_path
                    .unwrap_or_else(|| DEFAULT_DB_PATH.to_string()),
            ),
            chunker,
            top_k,
            dimensions,
            generator_command: rag_config.generator_command.filter(|c| !c.trim().is_empty()),
            generator_timeout: Duration::from_secs(
                rag_config
                    .generator_timeout_secs
                    .unwrap_or(DEFAULT_GENERATOR_TIMEOUT_SECS),
            ),
            verbose: rag_config.verbose.unwrap_or(false),
        })
    }

    pub fn print_config(&self) {
        println!("db_path={}", self.db_path.display());
        println!("chunk_size={}", self.chunker.size());
        println!("chunk_overlap={}", self.chunker.overlap());
        println!("top_k={}", self.top_k);
        println!("embedding_dimensions={}", self.dimensions);
        println!(
            "generator_command={}",
            self.generator_command.as_deref().unwrap_or("<none>")
        );
        println!("generator_timeout_secs={}", self.generator_timeout.as_secs());
        println!("verbose={}", self.verbose);
    }
}
