//! Checkpointed scoring head loaded with Candle
//!
//! The scoring model is a small feed-forward network trained on top of
//! transformer embeddings. Its weights come from a SafeTensors file, a PyTorch
//! `state_dict` file, or an in-memory SafeTensors blob. The layer layout is
//! declared in [`HeadConfig`] because a weights file alone does not say which
//! activations sit between the linear layers.

use crate::matrix::Matrix;
use crate::scoring_model::ScoringModel;
use candle_core::{DType, Device, Tensor, D};
use candle_nn::{Linear, Module, VarBuilder};
use protscore_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Where checkpoint bytes come from
#[derive(Debug, Clone)]
pub enum CheckpointSource {
    /// Load from local file system
    Path(PathBuf),
    /// SafeTensors bytes already in memory
    Bytes(Vec<u8>),
}

/// Checkpoint file format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointFormat {
    /// SafeTensors format (recommended)
    #[default]
    SafeTensors,
    /// PyTorch `state_dict` saved with `torch.save`
    PyTorch,
}

impl CheckpointFormat {
    /// Guess the format from a file extension
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("pt" | "pth" | "bin") => Self::PyTorch,
            _ => Self::SafeTensors,
        }
    }
}

/// Activation between hidden layers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    #[default]
    Relu,
    Gelu,
    Tanh,
}

impl Activation {
    fn apply(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        match self {
            Self::Relu => xs.relu(),
            Self::Gelu => xs.gelu_erf(),
            Self::Tanh => xs.tanh(),
        }
    }
}

/// Activation applied to the final layer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputActivation {
    #[default]
    Sigmoid,
    Softmax,
    Identity,
}

impl OutputActivation {
    fn apply(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        match self {
            Self::Sigmoid => candle_nn::ops::sigmoid(xs),
            Self::Softmax => candle_nn::ops::softmax(xs, D::Minus1),
            Self::Identity => Ok(xs.clone()),
        }
    }
}

/// Layer layout of the scoring head
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadConfig {
    /// Embedding width the head was trained on
    pub input_dim: usize,

    /// Widths of the hidden layers, empty for a single linear layer
    #[serde(default)]
    pub hidden_dims: Vec<usize>,

    /// Values produced per sequence
    #[serde(default = "default_output_dim")]
    pub output_dim: usize,

    #[serde(default)]
    pub activation: Activation,

    #[serde(default)]
    pub output: OutputActivation,

    /// Whether the linear layers carry a bias
    #[serde(default = "default_bias")]
    pub bias: bool,

    /// Tensor name prefix, e.g. `model` for `model.0.weight`
    #[serde(default)]
    pub prefix: Option<String>,

    /// Explicit layer names, one per linear layer
    #[serde(default)]
    pub layer_names: Option<Vec<String>>,
}

fn default_output_dim() -> usize {
    1
}

fn default_bias() -> bool {
    true
}

impl HeadConfig {
    /// A single linear layer followed by a sigmoid
    pub fn linear(input_dim: usize, output_dim: usize) -> Self {
        Self {
            input_dim,
            hidden_dims: Vec::new(),
            output_dim,
            activation: Activation::default(),
            output: OutputActivation::default(),
            bias: true,
            prefix: None,
            layer_names: None,
        }
    }

    /// `(in, out)` shape of each linear layer
    pub fn layer_dims(&self) -> Vec<(usize, usize)> {
        let mut widths = Vec::with_capacity(self.hidden_dims.len() + 2);
        widths.push(self.input_dim);
        widths.extend(&self.hidden_dims);
        widths.push(self.output_dim);
        widths.windows(2).map(|w| (w[0], w[1])).collect()
    }

    /// Layer naming schemes to try, in order.
    ///
    /// Without explicit names, `nn.Sequential` numbering (linear layers at even
    /// indices, activations in between) is tried before `layers.N`.
    pub fn candidate_layer_names(&self) -> Vec<Vec<String>> {
        if let Some(names) = &self.layer_names {
            return vec![names.clone()];
        }

        let count = self.hidden_dims.len() + 1;
        vec![
            (0..count).map(|idx| (idx * 2).to_string()).collect(),
            (0..count).map(|idx| format!("layers.{}", idx)).collect(),
        ]
    }

    fn validate(&self) -> Result<()> {
        if self.input_dim == 0 || self.output_dim == 0 || self.hidden_dims.contains(&0) {
            return Err(Error::config("scoring head dimensions must be non-zero"));
        }
        if let Some(names) = &self.layer_names {
            if names.len() != self.hidden_dims.len() + 1 {
                return Err(Error::config(format!(
                    "{} layer names given for {} linear layers",
                    names.len(),
                    self.hidden_dims.len() + 1
                )));
            }
        }
        Ok(())
    }
}

/// Feed-forward scoring model restored from a checkpoint
pub struct MlpScoringModel {
    layers: Vec<Linear>,
    activation: Activation,
    output: OutputActivation,
    input_dim: usize,
    output_dim: usize,
    device: Device,
}

impl MlpScoringModel {
    /// Load the head described by `head` from `source`
    pub fn load(
        source: &CheckpointSource,
        format: CheckpointFormat,
        head: &HeadConfig,
        device: &Device,
    ) -> Result<Self> {
        head.validate()?;

        let vb = load_checkpoint(source, format, device)?;
        let vb = match head.prefix.as_deref() {
            Some(prefix) if !prefix.is_empty() => vb.pp(prefix),
            _ => vb,
        };

        let dims = head.layer_dims();
        let mut errors = Vec::new();

        for names in head.candidate_layer_names() {
            match load_layers(&vb, &dims, &names, head.bias) {
                Ok(layers) => {
                    tracing::info!(
                        "Loaded scoring head with layers [{}] ({} -> {})",
                        names.join(", "),
                        head.input_dim,
                        head.output_dim
                    );
                    return Ok(Self {
                        layers,
                        activation: head.activation,
                        output: head.output,
                        input_dim: head.input_dim,
                        output_dim: head.output_dim,
                        device: device.clone(),
                    });
                }
                Err(e) => errors.push(format!("[{}]: {}", names.join(", "), e)),
            }
        }

        Err(Error::checkpoint(format!(
            "Checkpoint does not match the configured head, tried {}",
            errors.join(" | ")
        )))
    }

    /// Number of linear layers
    pub fn depth(&self) -> usize {
        self.layers.len()
    }
}

impl ScoringModel for MlpScoringModel {
    fn input_dim(&self) -> Option<usize> {
        Some(self.input_dim)
    }

    fn output_dim(&self) -> usize {
        self.output_dim
    }

    fn forward(&self, batch: &Matrix) -> Result<Matrix> {
        if batch.cols() != self.input_dim {
            return Err(Error::shape(format!(
                "scoring head expects {}-wide embeddings, got {}",
                self.input_dim,
                batch.cols()
            )));
        }
        if batch.rows() == 0 {
            return Ok(Matrix::zeros(0, self.output_dim));
        }

        let mut xs = batch
            .to_tensor(&self.device)
            .map_err(|e| Error::model(format!("Failed to create input tensor: {}", e)))?;

        let last = self.layers.len() - 1;
        for (idx, layer) in self.layers.iter().enumerate() {
            xs = layer
                .forward(&xs)
                .map_err(|e| Error::model(format!("Layer {} failed: {}", idx, e)))?;
            if idx < last {
                xs = self
                    .activation
                    .apply(&xs)
                    .map_err(|e| Error::model(format!("Activation failed: {}", e)))?;
            }
        }

        let xs = self
            .output
            .apply(&xs)
            .map_err(|e| Error::model(format!("Output activation failed: {}", e)))?;

        Matrix::from_tensor(&xs)
            .map_err(|e| Error::model(format!("Failed to read model output: {}", e)))
    }
}

fn load_checkpoint(
    source: &CheckpointSource,
    format: CheckpointFormat,
    device: &Device,
) -> Result<VarBuilder<'static>> {
    match source {
        CheckpointSource::Path(path) => {
            if !path.exists() {
                return Err(Error::checkpoint(format!(
                    "Checkpoint file not found: {}",
                    path.display()
                )));
            }
            tracing::debug!("Reading {:?} checkpoint {}", format, path.display());

            match format {
                CheckpointFormat::SafeTensors => unsafe {
                    VarBuilder::from_mmaped_safetensors(&[path], DType::F32, device).map_err(|e| {
                        Error::checkpoint(format!("Failed to load SafeTensors: {}", e))
                    })
                },
                CheckpointFormat::PyTorch => VarBuilder::from_pth(path, DType::F32, device)
                    .map_err(|e| {
                        Error::checkpoint(format!("Failed to load PyTorch weights: {}", e))
                    }),
            }
        }
        CheckpointSource::Bytes(bytes) => {
            if format != CheckpointFormat::SafeTensors {
                return Err(Error::checkpoint(
                    "In-memory checkpoints must be SafeTensors",
                ));
            }
            VarBuilder::from_buffered_safetensors(bytes.clone(), DType::F32, device)
                .map_err(|e| Error::checkpoint(format!("Failed to load SafeTensors: {}", e)))
        }
    }
}

fn load_layers(
    vb: &VarBuilder,
    dims: &[(usize, usize)],
    names: &[String],
    bias: bool,
) -> candle_core::Result<Vec<Linear>> {
    dims.iter()
        .zip(names)
        .map(|(&(input, output), name)| {
            if bias {
                candle_nn::linear(input, output, vb.pp(name))
            } else {
                candle_nn::linear_no_bias(input, output, vb.pp(name))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_dims() {
        let head = HeadConfig {
            hidden_dims: vec![64, 16],
            ..HeadConfig::linear(1024, 2)
        };
        assert_eq!(head.layer_dims(), vec![(1024, 64), (64, 16), (16, 2)]);
    }

    #[test]
    fn test_candidate_names() {
        let head = HeadConfig {
            hidden_dims: vec![8],
            ..HeadConfig::linear(4, 1)
        };
        let candidates = head.candidate_layer_names();
        assert_eq!(candidates[0], vec!["0", "2"]);
        assert_eq!(candidates[1], vec!["layers.0", "layers.1"]);

        let explicit = HeadConfig {
            layer_names: Some(vec!["fc".to_string()]),
            ..HeadConfig::linear(4, 1)
        };
        assert_eq!(explicit.candidate_layer_names(), vec![vec!["fc".to_string()]]);
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(
            CheckpointFormat::from_path(Path::new("checkpoint/model.pt")),
            CheckpointFormat::PyTorch
        );
        assert_eq!(
            CheckpointFormat::from_path(Path::new("model.safetensors")),
            CheckpointFormat::SafeTensors
        );
    }

    #[test]
    fn test_head_yaml_defaults() {
        let head: HeadConfig = serde_yaml::from_str("input_dim: 1024").unwrap();
        assert_eq!(head.output_dim, 1);
        assert_eq!(head.output, OutputActivation::Sigmoid);
        assert!(head.bias);
        assert!(head.hidden_dims.is_empty());
    }

    #[test]
    fn test_missing_checkpoint_fails() {
        let result = MlpScoringModel::load(
            &CheckpointSource::Path(PathBuf::from("/nonexistent/model.safetensors")),
            CheckpointFormat::SafeTensors,
            &HeadConfig::linear(4, 1),
            &Device::Cpu,
        );
        assert!(matches!(result, Err(Error::Checkpoint(_))));
    }

    #[test]
    fn test_layer_name_count_checked() {
        let head = HeadConfig {
            layer_names: Some(vec!["a".to_string(), "b".to_string()]),
            ..HeadConfig::linear(4, 1)
        };
        let result = MlpScoringModel::load(
            &CheckpointSource::Bytes(Vec::new()),
            CheckpointFormat::SafeTensors,
            &head,
            &Device::Cpu,
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
