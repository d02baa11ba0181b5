//! ProtBERT embedding provider
//!
//! Runs a BERT-family protein language model (ProtBERT, ProtBERT-BFD) with
//! Candle and pools its last hidden layer into one vector per sequence.
//!
//! ProtBERT treats every residue as a word, so sequences are fed as
//! space-separated residues (`"M K T V"`), and the rare residues `U Z O B` are
//! folded into `X` as during pre-training.

use crate::config::TransformerConfig;
use crate::device::DeviceSpec;
use crate::embedding::{EmbeddingProvider, Embeddings, Pooling};
use crate::matrix::Matrix;
use candle_core::{DType, Device, IndexOp, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use hf_hub::api::sync::ApiBuilder;
use hf_hub::{Repo, RepoType};
use protscore_core::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Instant;
use tokenizers::Tokenizer;

/// Pre-trained transformers available by name
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransformerBackend {
    /// ProtBERT trained on UniRef100
    #[default]
    #[serde(rename = "protbert")]
    ProtBert,
    /// ProtBERT trained on BFD
    #[serde(rename = "protbert_bfd")]
    ProtBertBfd,
}

impl TransformerBackend {
    pub const ALL: [TransformerBackend; 2] = [Self::ProtBert, Self::ProtBertBfd];

    pub fn name(&self) -> &'static str {
        match self {
            Self::ProtBert => "protbert",
            Self::ProtBertBfd => "protbert_bfd",
        }
    }

    /// Hugging Face repository holding the weights
    pub fn repo_id(&self) -> &'static str {
        match self {
            Self::ProtBert => "Rostlab/prot_bert",
            Self::ProtBertBfd => "Rostlab/prot_bert_bfd",
        }
    }

    pub fn source(&self) -> TransformerSource {
        TransformerSource::HuggingFace {
            repo: self.repo_id().to_string(),
            revision: default_revision(),
        }
    }
}

impl FromStr for TransformerBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|backend| backend.name() == s)
            .ok_or_else(|| {
                Error::config(format!(
                    "Unknown transformer backend '{}' (available: {})",
                    s,
                    list_backends().join(", ")
                ))
            })
    }
}

impl fmt::Display for TransformerBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Names of the built-in transformer backends
pub fn list_backends() -> Vec<&'static str> {
    TransformerBackend::ALL.iter().map(|b| b.name()).collect()
}

/// Transformer source configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransformerSource {
    /// Directory with `config.json`, tokenizer files and weights
    Local { path: PathBuf },

    /// Download from HuggingFace Hub
    HuggingFace {
        repo: String,
        #[serde(default = "default_revision")]
        revision: String,
    },
}

fn default_revision() -> String {
    "main".to_string()
}

impl fmt::Display for TransformerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local { path } => write!(f, "{}", path.display()),
            Self::HuggingFace { repo, revision } => write!(f, "{}@{}", repo, revision),
        }
    }
}

/// Candle BERT model producing protein embeddings
pub struct BertEmbedder {
    name: String,
    tokenizer: Tokenizer,
    model: BertModel,
    device: Device,
    hidden_size: usize,
    pad_id: u32,
    max_length: usize,
    batch_size: usize,
    truncate: bool,
}

impl BertEmbedder {
    /// Load the configured transformer onto `device`
    pub fn load(config: &TransformerConfig, device: DeviceSpec) -> Result<Self> {
        config.validate()?;
        let source = config.resolved_source()?;
        tracing::info!("Loading transformer '{}' on {}", source, device);

        let model_dir = resolve_model_dir(&source)?;
        let tokenizer = load_tokenizer(&model_dir)?;
        let pad_id = tokenizer.token_to_id("[PAD]").unwrap_or(0);

        let bert_config: BertConfig = parse_json_config(&model_dir.join("config.json"))?;
        let hidden_size = bert_config.hidden_size;

        let device = device.to_device()?;
        let vb = load_var_builder(&model_dir, &device)?;
        let model = load_bert_backbone(&vb, &bert_config, &["bert", ""])?;

        let name = match (&config.backend, &source) {
            (Some(backend), _) => backend.name().to_string(),
            (None, TransformerSource::HuggingFace { repo, .. }) => repo.clone(),
            (None, TransformerSource::Local { path }) => path
                .file_name()
                .and_then(|s| s.to_str())
                .unwrap_or("local-bert")
                .to_string(),
        };

        tracing::info!(
            "Transformer '{}' ready (hidden_size={}, max_length={}, batch_size={})",
            name,
            hidden_size,
            config.max_length,
            config.batch_size
        );

        Ok(Self {
            name,
            tokenizer,
            model,
            device,
            hidden_size,
            pad_id,
            max_length: config.max_length,
            batch_size: config.batch_size,
            truncate: config.truncate,
        })
    }

    /// Embed sequences already passed through [`prepare_sequence`]
    fn embed_chunk(&self, prepared: &[String], pooling: &[Pooling]) -> Result<Vec<(Pooling, Matrix)>> {
        let encodings = self
            .tokenizer
            .encode_batch(prepared.to_vec(), true)
            .map_err(|e| Error::embedding(format!("Tokenization failed: {}", e)))?;

        let rows = encodings
            .iter()
            .map(|enc| TokenRow {
                ids: enc.get_ids().to_vec(),
                special_tokens_mask: enc.get_special_tokens_mask().to_vec(),
            })
            .collect();
        let batch = PaddedBatch::new(rows, self.pad_id);
        let shape = (batch.batch_size, batch.seq_len);

        let input_ids = Tensor::from_vec(batch.input_ids, shape, &self.device)
            .map_err(|e| Error::embedding(format!("Failed to create input tensor: {}", e)))?;
        let token_type_ids = input_ids
            .zeros_like()
            .map_err(|e| Error::embedding(format!("Failed to create token type tensor: {}", e)))?;
        let attention_mask = Tensor::from_vec(batch.attention_mask, shape, &self.device)
            .map_err(|e| Error::embedding(format!("Failed to create attention mask: {}", e)))?;

        let hidden_states = self
            .model
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))
            .map_err(|e| Error::embedding(format!("Model forward pass failed: {}", e)))?;

        let mut pooled = Vec::with_capacity(pooling.len());
        for &kind in pooling {
            let tensor = match kind {
                Pooling::Cls => hidden_states
                    .i((.., 0, ..))
                    .map_err(|e| Error::embedding(format!("Failed to get CLS token: {}", e)))?,
                Pooling::Mean => {
                    let mask = Tensor::from_vec(batch.residue_mask.clone(), shape, &self.device)
                        .map_err(|e| {
                            Error::embedding(format!("Failed to create residue mask: {}", e))
                        })?;
                    masked_mean(&hidden_states, &mask)
                        .map_err(|e| Error::embedding(format!("Mean pooling failed: {}", e)))?
                }
            };

            let matrix = Matrix::from_tensor(&tensor)
                .map_err(|e| Error::embedding(format!("Failed to read embeddings: {}", e)))?;
            pooled.push((kind, matrix));
        }

        Ok(pooled)
    }
}

impl EmbeddingProvider for BertEmbedder {
    fn backend(&self) -> &str {
        &self.name
    }

    fn embedding_dim(&self) -> usize {
        self.hidden_size
    }

    fn compute_embeddings(&self, sequences: &[String], pooling: &[Pooling]) -> Result<Embeddings> {
        let start = Instant::now();
        let prepared = sequences
            .iter()
            .enumerate()
            .map(|(idx, seq)| prepare_sequence(idx, seq, self.max_length, self.truncate))
            .collect::<Result<Vec<_>>>()?;

        let mut accumulated: Vec<(Pooling, Matrix)> = pooling
            .iter()
            .map(|&kind| (kind, Matrix::zeros(0, self.hidden_size)))
            .collect();

        for (chunk_idx, chunk) in prepared.chunks(self.batch_size).enumerate() {
            let offset = chunk_idx * self.batch_size;
            tracing::debug!(
                "Embedding sequences {}..{} with '{}'",
                offset,
                offset + chunk.len(),
                self.name
            );

            for ((_, acc), (_, matrix)) in accumulated
                .iter_mut()
                .zip(self.embed_chunk(chunk, pooling)?)
            {
                acc.append(matrix)?;
            }
        }

        tracing::debug!(
            "Embedded {} sequences in {}ms",
            sequences.len(),
            start.elapsed().as_millis()
        );

        let mut embeddings = Embeddings::new();
        for (kind, matrix) in accumulated {
            embeddings.insert(kind, matrix);
        }
        Ok(embeddings)
    }
}

/// Turn a validated sequence into ProtBERT input text.
///
/// The token count is residues + 2 (`[CLS]`, `[SEP]`); longer sequences are
/// cut to fit when `truncate` is set and rejected otherwise.
pub fn prepare_sequence(index: usize, sequence: &str, max_length: usize, truncate: bool) -> Result<String> {
    let capacity = max_length.saturating_sub(2);
    let residues = sequence.chars().count();

    if residues > capacity && !truncate {
        return Err(Error::SequenceTooLong {
            index,
            length: residues + 2,
            max: max_length,
        });
    }
    if residues > capacity {
        tracing::warn!(
            "Sequence {} truncated from {} to {} residues",
            index,
            residues,
            capacity
        );
    }

    let spaced: Vec<String> = sequence
        .chars()
        .take(capacity)
        .map(|residue| match residue {
            'U' | 'Z' | 'O' | 'B' => "X".to_string(),
            other => other.to_string(),
        })
        .collect();

    Ok(spaced.join(" "))
}

/// Token ids and special-token flags for one encoded sequence
#[derive(Debug, Clone)]
struct TokenRow {
    ids: Vec<u32>,
    special_tokens_mask: Vec<u32>,
}

/// Right-padded batch in row-major layout
#[derive(Debug)]
struct PaddedBatch {
    batch_size: usize,
    seq_len: usize,
    input_ids: Vec<u32>,
    attention_mask: Vec<u32>,
    /// 1.0 for residue tokens, 0.0 for special and padding tokens
    residue_mask: Vec<f32>,
}

impl PaddedBatch {
    fn new(rows: Vec<TokenRow>, pad_id: u32) -> Self {
        let batch_size = rows.len();
        let seq_len = rows.iter().map(|row| row.ids.len()).max().unwrap_or(0);

        let mut input_ids = Vec::with_capacity(batch_size * seq_len);
        let mut attention_mask = Vec::with_capacity(batch_size * seq_len);
        let mut residue_mask = Vec::with_capacity(batch_size * seq_len);

        for row in &rows {
            for (pos, &id) in row.ids.iter().enumerate() {
                input_ids.push(id);
                attention_mask.push(1);
                let special = row.special_tokens_mask.get(pos).copied().unwrap_or(0) > 0;
                residue_mask.push(if special { 0.0 } else { 1.0 });
            }
            for _ in row.ids.len()..seq_len {
                input_ids.push(pad_id);
                attention_mask.push(0);
                residue_mask.push(0.0);
            }
        }

        Self {
            batch_size,
            seq_len,
            input_ids,
            attention_mask,
            residue_mask,
        }
    }
}

/// Mean of `hidden` `(b, l, h)` over positions where `mask` `(b, l)` is 1
fn masked_mean(hidden: &Tensor, mask: &Tensor) -> candle_core::Result<Tensor> {
    let mask = mask.to_dtype(hidden.dtype())?.unsqueeze(2)?;
    let summed = hidden.broadcast_mul(&mask)?.sum(1)?;
    let counts = mask.sum(1)?.maximum(1f32)?;
    summed.broadcast_div(&counts)
}

fn resolve_model_dir(source: &TransformerSource) -> Result<PathBuf> {
    match source {
        TransformerSource::Local { path } => {
            if !path.is_dir() {
                return Err(Error::embedding(format!(
                    "Transformer directory does not exist: {}",
                    path.display()
                )));
            }
            Ok(path.clone())
        }
        TransformerSource::HuggingFace { repo, revision } => {
            download_from_huggingface(repo, revision)
        }
    }
}

fn download_from_huggingface(repo: &str, revision: &str) -> Result<PathBuf> {
    tracing::info!("Fetching transformer from HuggingFace: {} @ {}", repo, revision);

    let cache_dir = dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("protscore/hub");

    let api = ApiBuilder::new()
        .with_cache_dir(cache_dir)
        .build()
        .map_err(|e| Error::embedding(format!("Failed to initialize HuggingFace API: {}", e)))?;

    let repo_obj = api.repo(Repo::with_revision(
        repo.to_string(),
        RepoType::Model,
        revision.to_string(),
    ));

    let config_path = repo_obj
        .get("config.json")
        .map_err(|e| Error::embedding(format!("Failed to download config.json: {}", e)))?;

    let weights = ["model.safetensors", "pytorch_model.bin"]
        .into_iter()
        .find(|file| match repo_obj.get(file) {
            Ok(_) => {
                tracing::debug!("Found weight file: {}", file);
                true
            }
            Err(_) => false,
        });
    if weights.is_none() {
        return Err(Error::embedding(
            "No model weights found (tried model.safetensors, pytorch_model.bin)",
        ));
    }

    let tokenizer = ["tokenizer.json", "vocab.txt"]
        .into_iter()
        .find(|file| repo_obj.get(file).is_ok());
    if tokenizer.is_none() {
        return Err(Error::embedding(
            "No tokenizer found (tried tokenizer.json, vocab.txt)",
        ));
    }

    let model_dir = config_path
        .parent()
        .ok_or_else(|| Error::embedding("Invalid cache path"))?;

    tracing::info!("Transformer available at: {}", model_dir.display());
    Ok(model_dir.to_path_buf())
}

fn parse_json_config<T: DeserializeOwned>(config_path: &Path) -> Result<T> {
    let config_str = std::fs::read_to_string(config_path).map_err(|e| {
        Error::embedding(format!(
            "Failed to read config {}: {}",
            config_path.display(),
            e
        ))
    })?;

    serde_json::from_str(&config_str).map_err(|e| {
        Error::embedding(format!(
            "Failed to parse config {}: {}",
            config_path.display(),
            e
        ))
    })
}

fn load_var_builder(model_path: &Path, device: &Device) -> Result<VarBuilder<'static>> {
    let safetensors = model_path.join("model.safetensors");
    if safetensors.exists() {
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[safetensors], DType::F32, device)
                .map_err(|e| Error::embedding(format!("Failed to load weights: {}", e)))?
        };
        return Ok(vb);
    }

    let pytorch = model_path.join("pytorch_model.bin");
    if pytorch.exists() {
        tracing::debug!("Loading PyTorch weights from {}", pytorch.display());
        return VarBuilder::from_pth(&pytorch, DType::F32, device)
            .map_err(|e| Error::embedding(format!("Failed to load PyTorch weights: {}", e)));
    }

    Err(Error::embedding(format!(
        "No weights found in {} (tried model.safetensors, pytorch_model.bin)",
        model_path.display()
    )))
}

fn load_bert_backbone(vb: &VarBuilder, config: &BertConfig, prefixes: &[&str]) -> Result<BertModel> {
    let mut errors = Vec::new();

    for prefix in prefixes {
        let vb_prefix = if prefix.is_empty() {
            vb.clone()
        } else {
            vb.pp(prefix)
        };

        match BertModel::load(vb_prefix, config) {
            Ok(model) => {
                let effective_prefix = if prefix.is_empty() { "<root>" } else { prefix };
                tracing::info!("Loaded BERT backbone from '{}'", effective_prefix);
                return Ok(model);
            }
            Err(e) => {
                tracing::debug!("No BERT backbone under '{}', trying next prefix", prefix);
                errors.push(format!(
                    "{}: {}",
                    if prefix.is_empty() { "<root>" } else { prefix },
                    e
                ));
            }
        }
    }

    Err(Error::embedding(format!(
        "Failed to load BERT backbone with tried prefixes [{}]",
        errors.join(" | ")
    )))
}

fn load_tokenizer(model_path: &Path) -> Result<Tokenizer> {
    let tokenizer_json_path = model_path.join("tokenizer.json");
    if tokenizer_json_path.exists() {
        tracing::debug!("Loading tokenizer from tokenizer.json");
        return Tokenizer::from_file(&tokenizer_json_path)
            .map_err(|e| Error::embedding(format!("Failed to load tokenizer.json: {}", e)));
    }

    let vocab_path = model_path.join("vocab.txt");
    if vocab_path.exists() {
        tracing::debug!("Building tokenizer from vocab.txt");

        use tokenizers::models::wordpiece::WordPiece;
        use tokenizers::normalizers::BertNormalizer;
        use tokenizers::pre_tokenizers::bert::BertPreTokenizer;
        use tokenizers::processors::bert::BertProcessing;

        let wordpiece = WordPiece::from_file(vocab_path.to_string_lossy().as_ref())
            .unk_token("[UNK]".to_string())
            .build()
            .map_err(|e| Error::embedding(format!("Failed to build WordPiece model: {}", e)))?;

        let mut tokenizer = Tokenizer::new(wordpiece);

        // ProtBERT vocabularies are uppercase and cased
        tokenizer.with_normalizer(Some(BertNormalizer::new(true, false, Some(false), false)));
        tokenizer.with_pre_tokenizer(Some(BertPreTokenizer));

        let special_id = |token: &str| {
            tokenizer.token_to_id(token).ok_or_else(|| {
                Error::embedding(format!("Vocabulary has no {} token", token))
            })
        };
        let sep = ("[SEP]".to_string(), special_id("[SEP]")?);
        let cls = ("[CLS]".to_string(), special_id("[CLS]")?);
        tokenizer.with_post_processor(Some(BertProcessing::new(sep, cls)));

        return Ok(tokenizer);
    }

    Err(Error::embedding(format!(
        "No tokenizer found in {:?} (tried tokenizer.json, vocab.txt)",
        model_path
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_names() {
        assert_eq!(list_backends(), vec!["protbert", "protbert_bfd"]);
        assert_eq!(
            "protbert_bfd".parse::<TransformerBackend>().unwrap(),
            TransformerBackend::ProtBertBfd
        );
        assert!("esm1b".parse::<TransformerBackend>().is_err());
        assert_eq!(TransformerBackend::ProtBert.repo_id(), "Rostlab/prot_bert");
    }

    #[test]
    fn test_source_yaml() {
        let source: TransformerSource =
            serde_yaml::from_str("type: huggingface\nrepo: Rostlab/prot_bert_bfd").unwrap();
        assert_eq!(source, TransformerBackend::ProtBertBfd.source());
        assert_eq!(source.to_string(), "Rostlab/prot_bert_bfd@main");
    }

    #[test]
    fn test_prepare_sequence_spaces_and_maps_rare_residues() {
        assert_eq!(
            prepare_sequence(0, "MKUZOBV", 1024, false).unwrap(),
            "M K X X X X V"
        );
    }

    #[test]
    fn test_prepare_sequence_length_limit() {
        assert!(matches!(
            prepare_sequence(2, "MKTVR", 6, false),
            Err(Error::SequenceTooLong {
                index: 2,
                length: 7,
                max: 6
            })
        ));
        assert_eq!(prepare_sequence(0, "MKTVR", 6, true).unwrap(), "M K T V");
        assert_eq!(prepare_sequence(0, "MKTV", 6, false).unwrap(), "M K T V");
    }

    #[test]
    fn test_padded_batch_masks() {
        let rows = vec![
            TokenRow {
                ids: vec![2, 10, 11, 3],
                special_tokens_mask: vec![1, 0, 0, 1],
            },
            TokenRow {
                ids: vec![2, 12, 3],
                special_tokens_mask: vec![1, 0, 1],
            },
        ];
        let batch = PaddedBatch::new(rows, 0);

        assert_eq!((batch.batch_size, batch.seq_len), (2, 4));
        assert_eq!(batch.input_ids, vec![2, 10, 11, 3, 2, 12, 3, 0]);
        assert_eq!(batch.attention_mask, vec![1, 1, 1, 1, 1, 1, 1, 0]);
        assert_eq!(
            batch.residue_mask,
            vec![0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0]
        );
    }

    #[test]
    fn test_masked_mean_ignores_masked_tokens() {
        let hidden = Tensor::new(
            &[[[2f32, 2.0], [6.0, 10.0], [100.0, 100.0]]],
            &Device::Cpu,
        )
        .unwrap();
        let mask = Tensor::new(&[[1f32, 1.0, 0.0]], &Device::Cpu).unwrap();

        let pooled = masked_mean(&hidden, &mask).unwrap().to_vec2::<f32>().unwrap();
        assert!((pooled[0][0] - 4.0).abs() < 1e-4);
        assert!((pooled[0][1] - 6.0).abs() < 1e-4);
    }

    #[test]
    fn test_missing_local_directory() {
        let source = TransformerSource::Local {
            path: PathBuf::from("/nonexistent/prot_bert"),
        };
        assert!(matches!(resolve_model_dir(&source), Err(Error::Embedding(_))));
    }
}
