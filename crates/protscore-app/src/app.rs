//! Scoring plugin contract and its standard implementation

use crate::checkpoint::{CheckpointSource, MlpScoringModel};
use crate::config::AppConfig;
use crate::device::DeviceSpec;
use crate::embedding::{EmbeddingProvider, Pooling};
use crate::protbert::BertEmbedder;
use crate::scoring_model::ScoringModel;
use protscore_core::sequence::validate_batch;
use protscore_core::{Error, Result, Score, ScoreNames, SequenceInput};
use std::time::Instant;

/// Contract a host application uses to drive a scoring plugin
pub trait ScoringApp: Send + Sync {
    /// Names of the scores produced for every sequence, in a fixed order
    fn score_names(&self) -> &ScoreNames;

    /// Score a batch of sequences.
    ///
    /// Returns one [`Score`] per input sequence, in input order. An empty batch
    /// yields an empty result. Any embedding or model failure aborts the whole
    /// call.
    fn compute_scores(&self, sequences: SequenceInput) -> Result<Vec<Score>>;

    /// Score a single sequence or any batch convertible into [`SequenceInput`]
    fn score<I>(&self, sequences: I) -> Result<Vec<Score>>
    where
        I: Into<SequenceInput>,
        Self: Sized,
    {
        self.compute_scores(sequences.into())
    }
}

/// Embedding provider followed by a scoring model
pub struct SequenceScorer {
    names: ScoreNames,
    embedder: Box<dyn EmbeddingProvider>,
    model: Box<dyn ScoringModel>,
    pooling: Pooling,
}

impl SequenceScorer {
    /// Wire an embedding provider to a scoring model.
    ///
    /// The model must produce one value per score name and, when it declares an
    /// input width, accept the provider's embedding width.
    pub fn new(
        names: ScoreNames,
        embedder: Box<dyn EmbeddingProvider>,
        model: Box<dyn ScoringModel>,
    ) -> Result<Self> {
        if model.output_dim() != names.len() {
            return Err(Error::config(format!(
                "scoring model produces {} values but {} score names are declared",
                model.output_dim(),
                names.len()
            )));
        }

        if let Some(input_dim) = model.input_dim() {
            if input_dim != embedder.embedding_dim() {
                return Err(Error::config(format!(
                    "scoring model expects {}-wide embeddings but '{}' produces {}",
                    input_dim,
                    embedder.backend(),
                    embedder.embedding_dim()
                )));
            }
        }

        Ok(Self {
            names,
            embedder,
            model,
            pooling: Pooling::default(),
        })
    }

    /// Select which pooled embedding feeds the model
    pub fn with_pooling(mut self, pooling: Pooling) -> Self {
        self.pooling = pooling;
        self
    }

    /// Build from configuration on the configured device
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Self::from_config_on(config, config.device)
    }

    /// Build from configuration on an explicit compute target
    pub fn from_config_on(config: &AppConfig, device: DeviceSpec) -> Result<Self> {
        config.validate()?;
        let names = config.score_names()?;

        // Fail on a bad checkpoint before any transformer download
        let checkpoint = &config.checkpoint;
        tracing::info!("Loading scoring checkpoint {}", checkpoint.path.display());
        let model = MlpScoringModel::load(
            &CheckpointSource::Path(checkpoint.path.clone()),
            checkpoint.resolved_format(),
            &checkpoint.head,
            &device.to_device()?,
        )?;

        let embedder = BertEmbedder::load(&config.transformer, device)?;

        Ok(Self::new(names, Box::new(embedder), Box::new(model))?
            .with_pooling(config.transformer.pooling))
    }

    pub fn pooling(&self) -> Pooling {
        self.pooling
    }

    pub fn embedder(&self) -> &dyn EmbeddingProvider {
        self.embedder.as_ref()
    }

    pub fn model(&self) -> &dyn ScoringModel {
        self.model.as_ref()
    }
}

impl ScoringApp for SequenceScorer {
    fn score_names(&self) -> &ScoreNames {
        &self.names
    }

    fn compute_scores(&self, sequences: SequenceInput) -> Result<Vec<Score>> {
        if sequences.is_empty() {
            tracing::debug!("Empty batch, nothing to score");
            return Ok(Vec::new());
        }

        let start = Instant::now();
        let sequences = validate_batch(sequences.as_slice())?;
        let count = sequences.len();

        let mut embeddings = self
            .embedder
            .compute_embeddings(&sequences, &[self.pooling])?;
        let batch = embeddings.take(self.pooling).ok_or_else(|| {
            Error::embedding(format!(
                "'{}' returned no {} embeddings",
                self.embedder.backend(),
                self.pooling
            ))
        })?;
        if batch.rows() != count {
            return Err(Error::shape(format!(
                "{} embeddings returned for {} sequences",
                batch.rows(),
                count
            )));
        }

        let outputs = self.model.forward(&batch)?;
        if outputs.rows() != count {
            return Err(Error::shape(format!(
                "scoring model returned {} rows for {} sequences",
                outputs.rows(),
                count
            )));
        }

        let scores = outputs
            .iter_rows()
            .map(|row| Score::from_row(&self.names, row.to_vec()))
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(
            "Scored {} sequences in {}us",
            count,
            start.elapsed().as_micros()
        );

        Ok(scores)
    }
}
