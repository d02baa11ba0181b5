//! Embedding provider capability

use crate::matrix::Matrix;
use protscore_core::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// How per-token hidden states are reduced to one vector per sequence
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pooling {
    /// Hidden state of the leading `[CLS]` token
    #[default]
    Cls,
    /// Mean of the residue-token hidden states, special tokens excluded
    Mean,
}

impl Pooling {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cls => "cls",
            Self::Mean => "mean",
        }
    }
}

impl fmt::Display for Pooling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Embedding matrices keyed by pooling, rows aligned with the input sequences
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Embeddings {
    matrices: BTreeMap<Pooling, Matrix>,
}

impl Embeddings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, pooling: Pooling, matrix: Matrix) {
        self.matrices.insert(pooling, matrix);
    }

    pub fn get(&self, pooling: Pooling) -> Option<&Matrix> {
        self.matrices.get(&pooling)
    }

    /// The `[CLS]` embeddings, if they were requested
    pub fn cls(&self) -> Option<&Matrix> {
        self.get(Pooling::Cls)
    }

    /// Remove and return one pooling's matrix
    pub fn take(&mut self, pooling: Pooling) -> Option<Matrix> {
        self.matrices.remove(&pooling)
    }

    /// Poolings present in this result
    pub fn poolings(&self) -> Vec<Pooling> {
        self.matrices.keys().copied().collect()
    }
}

/// A pre-trained sequence model that turns protein sequences into fixed-size vectors.
///
/// Implementations receive sequences that were already validated and uppercased.
pub trait EmbeddingProvider: Send + Sync {
    /// Backend identifier (e.g. `protbert`)
    fn backend(&self) -> &str;

    /// Width of every embedding row
    fn embedding_dim(&self) -> usize;

    /// Compute one matrix per requested pooling, `sequences.len()` rows each
    fn compute_embeddings(&self, sequences: &[String], pooling: &[Pooling]) -> Result<Embeddings>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pooling_serde_names() {
        let pooling: Pooling = serde_yaml::from_str("mean").unwrap();
        assert_eq!(pooling, Pooling::Mean);
        assert_eq!(serde_json::to_string(&Pooling::Cls).unwrap(), "\"cls\"");
    }

    #[test]
    fn test_embeddings_take() {
        let mut embeddings = Embeddings::new();
        embeddings.insert(Pooling::Cls, Matrix::zeros(2, 4));

        assert_eq!(embeddings.cls().map(Matrix::rows), Some(2));
        assert_eq!(embeddings.poolings(), vec![Pooling::Cls]);
        assert!(embeddings.take(Pooling::Mean).is_none());
        assert!(embeddings.take(Pooling::Cls).is_some());
        assert!(embeddings.cls().is_none());
    }
}
