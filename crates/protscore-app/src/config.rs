//! Configuration for scoring plugins
//!
//! A plugin is described by one YAML document: compute target, score names,
//! transformer backend, and scoring-head checkpoint.

use crate::checkpoint::{CheckpointFormat, HeadConfig};
use crate::device::DeviceSpec;
use crate::embedding::Pooling;
use crate::protbert::{TransformerBackend, TransformerSource};
use protscore_core::{Error, Result, ScoreNames};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Complete plugin configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Default compute target, overridable at construction
    #[serde(default)]
    pub device: DeviceSpec,

    /// Names of the scores produced per sequence, in model output order
    #[serde(default = "default_score_names")]
    pub score_names: Vec<String>,

    /// Embedding provider settings
    #[serde(default)]
    pub transformer: TransformerConfig,

    /// Scoring model checkpoint
    pub checkpoint: CheckpointConfig,
}

/// Transformer (embedding provider) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformerConfig {
    /// Named backend, see [`TransformerBackend`]
    #[serde(default)]
    pub backend: Option<TransformerBackend>,

    /// Explicit model source; mutually exclusive with `backend`
    #[serde(default)]
    pub source: Option<TransformerSource>,

    /// Embedding fed to the scoring model
    #[serde(default)]
    pub pooling: Pooling,

    /// Maximum tokens per sequence, `[CLS]` and `[SEP]` included
    #[serde(default = "default_max_length")]
    pub max_length: usize,

    /// Sequences per forward pass
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Cut overlong sequences instead of rejecting them
    #[serde(default)]
    pub truncate: bool,
}

/// Scoring model checkpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// Checkpoint file; relative paths are resolved against the config file
    pub path: PathBuf,

    /// File format, guessed from the extension when absent
    #[serde(default)]
    pub format: Option<CheckpointFormat>,

    /// Layer layout of the head stored in the checkpoint
    pub head: HeadConfig,
}

fn default_score_names() -> Vec<String> {
    vec!["probability".to_string()]
}

fn default_max_length() -> usize {
    1024
}

fn default_batch_size() -> usize {
    8
}

impl Default for TransformerConfig {
    fn default() -> Self {
        Self {
            backend: None,
            source: None,
            pooling: Pooling::default(),
            max_length: default_max_length(),
            batch_size: default_batch_size(),
            truncate: false,
        }
    }
}

impl TransformerConfig {
    /// The model source to load, defaulting to ProtBERT
    pub fn resolved_source(&self) -> Result<TransformerSource> {
        match (&self.backend, &self.source) {
            (Some(_), Some(_)) => Err(Error::config(
                "transformer.backend and transformer.source are mutually exclusive",
            )),
            (_, Some(source)) => Ok(source.clone()),
            (Some(backend), None) => Ok(backend.source()),
            (None, None) => Ok(TransformerBackend::default().source()),
        }
    }

    /// Check batching and length limits and that the source resolves
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::config("transformer.batch_size must be at least 1"));
        }
        if self.max_length <= 2 {
            return Err(Error::config(
                "transformer.max_length must leave room for [CLS] and [SEP]",
            ));
        }
        self.resolved_source()?;
        Ok(())
    }
}

impl CheckpointConfig {
    pub fn resolved_format(&self) -> CheckpointFormat {
        self.format
            .unwrap_or_else(|| CheckpointFormat::from_path(&self.path))
    }
}

impl AppConfig {
    /// Load from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from file, resolving relative paths against the file's directory
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("Failed to read config {}: {}", path.display(), e))
        })?;

        let mut config: Self = serde_yaml::from_str(&content)?;
        if let Some(base) = path.parent() {
            config.resolve_relative_paths(base);
        }
        config.validate()?;

        tracing::debug!("Loaded plugin configuration from {}", path.display());
        Ok(config)
    }

    /// Rebase relative checkpoint and local model paths onto `base`
    pub fn resolve_relative_paths(&mut self, base: &Path) {
        if self.checkpoint.path.is_relative() {
            self.checkpoint.path = base.join(&self.checkpoint.path);
        }
        if let Some(TransformerSource::Local { path }) = &mut self.transformer.source {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        let names = self.score_names()?;

        if self.checkpoint.head.output_dim != names.len() {
            return Err(Error::config(format!(
                "scoring head produces {} values but {} score names are declared",
                self.checkpoint.head.output_dim,
                names.len()
            )));
        }
        self.transformer.validate()
    }

    /// The declared score names
    pub fn score_names(&self) -> Result<ScoreNames> {
        ScoreNames::new(self.score_names.iter().cloned())
    }
}
