//! Error types for protscore

/// Result type alias using protscore's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for protscore operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Checkpoint missing, corrupt, or incompatible with the configured head
    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    /// Embedding provider failures (tokenizer, transformer load, forward pass)
    #[error("embedding error: {0}")]
    Embedding(String),

    /// Scoring model execution errors
    #[error("model error: {0}")]
    Model(String),

    /// Row or column counts disagree between pipeline stages
    #[error("shape mismatch: {0}")]
    Shape(String),

    /// A sequence contains a symbol outside the residue alphabet
    #[error("invalid residue '{residue}' at position {position} of sequence {index}")]
    InvalidSequence {
        index: usize,
        position: usize,
        residue: char,
    },

    /// A sequence is empty after trimming
    #[error("sequence {index} is empty")]
    EmptySequence { index: usize },

    /// A sequence does not fit in the transformer context
    #[error("sequence {index} has {length} tokens, limit is {max}")]
    SequenceTooLong {
        index: usize,
        length: usize,
        max: usize,
    },

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML configuration parse errors
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Create a new checkpoint error
    pub fn checkpoint(msg: impl Into<String>) -> Self {
        Self::Checkpoint(msg.into())
    }

    /// Create a new embedding error
    pub fn embedding(msg: impl Into<String>) -> Self {
        Self::Embedding(msg.into())
    }

    /// Create a new model error
    pub fn model(msg: impl Into<String>) -> Self {
        Self::Model(msg.into())
    }

    /// Create a new shape error
    pub fn shape(msg: impl Into<String>) -> Self {
        Self::Shape(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether the error was caused by the caller's input rather than the plugin
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidSequence { .. } | Self::EmptySequence { .. } | Self::SequenceTooLong { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_sequence_message() {
        let err = Error::InvalidSequence {
            index: 1,
            position: 4,
            residue: '*',
        };
        assert_eq!(
            err.to_string(),
            "invalid residue '*' at position 4 of sequence 1"
        );
        assert!(err.is_input_error());
    }

    #[test]
    fn test_constructors() {
        assert!(matches!(Error::checkpoint("x"), Error::Checkpoint(_)));
        assert!(matches!(Error::shape("x"), Error::Shape(_)));
        assert!(!Error::model("boom").is_input_error());
    }
}
