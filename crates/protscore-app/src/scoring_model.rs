//! Scoring model capability

use crate::matrix::Matrix;
use protscore_core::Result;

/// A trained model mapping a batch of embeddings to per-sequence outputs
pub trait ScoringModel: Send + Sync {
    /// Expected embedding width, if the model knows it
    fn input_dim(&self) -> Option<usize>;

    /// Number of values produced per sequence
    fn output_dim(&self) -> usize;

    /// Run the model on a `(batch, input_dim)` matrix, returning `(batch, output_dim)`
    fn forward(&self, batch: &Matrix) -> Result<Matrix>;
}
