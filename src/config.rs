//! Configuration module for docbot.
//!
//! Handles loading, validating, and providing default configuration values.
//! Every component receives the values it needs through its constructor;
//! nothing reads this as process-global state.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Default config file name, generated as a template on first run.
pub const DEFAULT_CONFIG_PATH: &str = "rag_config.json";

// ── Default value functions ──────────────────────────────────────────

fn default_docs_dir() -> String {
    "docs".to_string()
}

fn default_common_docs_dir() -> String {
    "docs/common".to_string()
}

fn default_db_path() -> String {
    "vector.db".to_string()
}

fn default_chunk_size() -> usize {
    1000
}

fn default_top_k() -> usize {
    5
}

fn default_min_similarity() -> f32 {
    0.1
}

fn default_device() -> String {
    "auto".to_string()
}

fn default_true() -> bool {
    true
}

fn default_model_name() -> String {
    "sentence-transformers/all-MiniLM-L6-v2".to_string()
}

fn default_model_dir() -> String {
    "models/all-MiniLM-L6-v2".to_string()
}

fn default_dimensions() -> usize {
    384
}

fn default_generator_model() -> String {
    "gemma-3-27b-it".to_string()
}

fn default_api_base() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_api_key_env() -> String {
    "API_KEY".to_string()
}

// ── Config structs ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// Root of the markdown documentation tree to ingest.
    #[serde(default = "default_docs_dir")]
    pub docs_dir: String,

    /// Shared-docs subtree resolved by the wildcard file filter.
    #[serde(default = "default_common_docs_dir")]
    pub common_docs_dir: String,

    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Words per chunk for the sliding-window chunker.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Similarity floor below which retrieved chunks are excluded from
    /// the grounding context handed to the generator.
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f32,

    #[serde(default)]
    pub compute: ComputeConfig,

    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub generator: GeneratorConfig,

    #[serde(default)]
    pub download: DownloadConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ComputeConfig {
    /// "auto" | "cuda" | "cpu"
    #[serde(default = "default_device")]
    pub device: String,

    #[serde(default = "default_true")]
    pub fallback_to_cpu: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ModelConfig {
    #[serde(default = "default_model_name")]
    pub name: String,

    /// Local directory holding model.onnx and tokenizer files.
    #[serde(default = "default_model_dir")]
    pub dir: String,

    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GeneratorConfig {
    #[serde(default = "default_generator_model")]
    pub model: String,

    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Environment variable holding the API key (never stored in the file).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct DownloadConfig {
    /// Skip TLS certificate verification for model downloads only.
    /// Narrowly-scoped opt-in for proxied corporate networks.
    #[serde(default)]
    pub insecure_tls: bool,
}

// ── Default impls ────────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        Self {
            docs_dir: default_docs_dir(),
            common_docs_dir: default_common_docs_dir(),
            db_path: default_db_path(),
            chunk_size: default_chunk_size(),
            top_k: default_top_k(),
            min_similarity: default_min_similarity(),
            compute: ComputeConfig::default(),
            model: ModelConfig::default(),
            generator: GeneratorConfig::default(),
            download: DownloadConfig::default(),
        }
    }
}

impl Default for ComputeConfig {
    fn default() -> Self {
        Self {
            device: default_device(),
            fallback_to_cpu: default_true(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model_name(),
            dir: default_model_dir(),
            dimensions: default_dimensions(),
        }
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            model: default_generator_model(),
            api_base: default_api_base(),
            api_key_env: default_api_key_env(),
        }
    }
}

// ── Config implementation ────────────────────────────────────────────

impl Config {
    /// Load configuration from a JSON file.
    ///
    /// If the file does not exist, returns defaults and generates a
    /// template at the default path so users have something to edit.
    pub fn load(config_path: &str) -> Result<Self> {
        let path = if config_path.is_empty() {
            DEFAULT_CONFIG_PATH
        } else {
            config_path
        };

        if !Path::new(path).exists() {
            info!("{path} not found, using defaults");
            let cfg = Self::default();

            if path == DEFAULT_CONFIG_PATH {
                match cfg.save(path) {
                    Ok(()) => info!("Generated config template: {path}"),
                    Err(e) => warn!("Failed to generate config template: {e}"),
                }
            }

            return Ok(cfg);
        }

        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {path}"))?;

        let cfg: Config = match serde_json::from_str(&data) {
            Ok(c) => c,
            Err(e) => {
                warn!("Invalid JSON in {path}: {e}");
                warn!("Using default configuration");
                return Ok(Self::default());
            }
        };

        info!("Loaded configuration from {path}");
        Ok(cfg)
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &str) -> Result<()> {
        let data = serde_json::to_string_pretty(self).context("failed to marshal config")?;
        std::fs::write(path, data).with_context(|| format!("failed to write config: {path}"))?;
        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.chunk_size >= 2, "chunk_size must be at least 2 words");
        anyhow::ensure!(self.top_k > 0, "top_k must be positive");
        anyhow::ensure!(
            self.model.dimensions > 0,
            "model.dimensions must be positive"
        );
        anyhow::ensure!(!self.docs_dir.is_empty(), "docs_dir must not be empty");
        anyhow::ensure!(
            matches!(self.compute.device.as_str(), "auto" | "cuda" | "cpu"),
            "compute.device must be one of: auto, cuda, cpu"
        );
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────────
