//! Protein sequence input handling
//!
//! A plugin accepts either a single sequence or a batch of sequences. Both forms
//! are normalized into [`SequenceInput`], and every sequence is validated against
//! the extended amino-acid alphabet before any embedding work starts.

use crate::error::{Error, Result};

/// The 20 standard residues plus `X` (unknown) and the ambiguous/rare codes
/// `B`, `Z`, `U`, `O`.
pub const RESIDUE_ALPHABET: &str = "ACDEFGHIKLMNPQRSTVWYXBZUO";

/// One or many protein sequences, normalized to an owned batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SequenceInput {
    sequences: Vec<String>,
}

impl SequenceInput {
    /// Create an input from an owned batch
    pub fn new(sequences: Vec<String>) -> Self {
        Self { sequences }
    }

    /// Number of sequences in the batch
    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    /// Check if the batch is empty
    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    /// Borrow the raw sequences
    pub fn as_slice(&self) -> &[String] {
        &self.sequences
    }

    /// Consume into the raw sequences
    pub fn into_inner(self) -> Vec<String> {
        self.sequences
    }
}

impl From<&str> for SequenceInput {
    fn from(sequence: &str) -> Self {
        Self::new(vec![sequence.to_string()])
    }
}

impl From<String> for SequenceInput {
    fn from(sequence: String) -> Self {
        Self::new(vec![sequence])
    }
}

impl From<&String> for SequenceInput {
    fn from(sequence: &String) -> Self {
        Self::new(vec![sequence.clone()])
    }
}

impl From<Vec<String>> for SequenceInput {
    fn from(sequences: Vec<String>) -> Self {
        Self::new(sequences)
    }
}

impl From<Vec<&str>> for SequenceInput {
    fn from(sequences: Vec<&str>) -> Self {
        Self::new(sequences.into_iter().map(str::to_string).collect())
    }
}

impl From<&[&str]> for SequenceInput {
    fn from(sequences: &[&str]) -> Self {
        Self::new(sequences.iter().map(|s| s.to_string()).collect())
    }
}

impl From<&[String]> for SequenceInput {
    fn from(sequences: &[String]) -> Self {
        Self::new(sequences.to_vec())
    }
}

impl<const N: usize> From<[&str; N]> for SequenceInput {
    fn from(sequences: [&str; N]) -> Self {
        Self::new(sequences.iter().map(|s| s.to_string()).collect())
    }
}

impl FromIterator<String> for SequenceInput {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Normalize and validate a single sequence.
///
/// Surrounding whitespace is trimmed and lowercase residues are uppercased.
/// `index` is the sequence's position in its batch and is only used for error
/// reporting. Positions in errors are zero-based offsets into the trimmed
/// sequence.
pub fn normalize_sequence(index: usize, raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::EmptySequence { index });
    }

    let mut normalized = String::with_capacity(trimmed.len());
    for (position, residue) in trimmed.chars().enumerate() {
        let upper = residue.to_ascii_uppercase();
        if !RESIDUE_ALPHABET.contains(upper) {
            return Err(Error::InvalidSequence {
                index,
                position,
                residue,
            });
        }
        normalized.push(upper);
    }

    Ok(normalized)
}

/// Validate a whole batch, failing on the first bad sequence
pub fn validate_batch(sequences: &[String]) -> Result<Vec<String>> {
    sequences
        .iter()
        .enumerate()
        .map(|(index, raw)| normalize_sequence(index, raw))
        .collect()
}
