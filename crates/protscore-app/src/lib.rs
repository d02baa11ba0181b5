//! protscore App
//!
//! Protein scoring plugins built from two pieces:
//! - an embedding provider, a pre-trained protein language model that turns
//!   each sequence into a fixed-size vector (ProtBERT via Candle by default)
//! - a scoring model, a small network restored from a checkpoint that maps
//!   each embedding to named scores
//!
//! A host application constructs a plugin once per compute target and calls
//! [`ScoringApp::compute_scores`] as often as it likes. Both pieces sit behind
//! traits, so the plugin logic can run against test doubles or other backends.

pub mod app;
pub mod checkpoint;
pub mod config;
pub mod device;
pub mod embedding;
pub mod loader;
pub mod matrix;
pub mod protbert;
pub mod scoring_model;

pub use app::{ScoringApp, SequenceScorer};
pub use checkpoint::{
    Activation, CheckpointFormat, CheckpointSource, HeadConfig, MlpScoringModel, OutputActivation,
};
pub use config::{AppConfig, CheckpointConfig, TransformerConfig};
pub use device::DeviceSpec;
pub use embedding::{EmbeddingProvider, Embeddings, Pooling};
pub use loader::{AppLoaderPlugin, ConfiguredAppLoader};
pub use matrix::Matrix;
pub use protbert::{list_backends, BertEmbedder, TransformerBackend, TransformerSource};
pub use scoring_model::ScoringModel;

pub use protscore_core::{Error, Result, Score, ScoreNames, SequenceInput};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::app::{ScoringApp, SequenceScorer};
    pub use crate::config::AppConfig;
    pub use crate::embedding::{EmbeddingProvider, Embeddings, Pooling};
    pub use crate::matrix::Matrix;
    pub use crate::scoring_model::ScoringModel;
    pub use protscore_core::prelude::*;
}
