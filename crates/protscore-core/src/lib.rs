//! protscore Core
//!
//! Core types shared by protscore scoring plugins.
//!
//! This crate provides:
//! - The error type and result alias used across the workspace
//! - Protein sequence validation and "one or many" input normalization
//! - Typed score records whose key set is fixed by the plugin definition

pub mod error;
pub mod score;
pub mod sequence;

pub use error::{Error, Result};
pub use score::{Score, ScoreNames};
pub use sequence::{normalize_sequence, validate_batch, SequenceInput, RESIDUE_ALPHABET};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::score::{Score, ScoreNames};
    pub use crate::sequence::SequenceInput;
}
