//! Checkpoint loading tests
//!
//! Writes small SafeTensors checkpoints to a temporary directory and restores
//! them through the same path the plugin uses at construction.

use candle_core::{Device, Tensor};
use protscore_app::{
    AppConfig, CheckpointFormat, CheckpointSource, EmbeddingProvider, Embeddings, HeadConfig,
    Matrix, MlpScoringModel, OutputActivation, Pooling, ScoringApp, ScoringModel, SequenceScorer,
};
use protscore_core::{Error, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write_checkpoint(dir: &Path, file: &str, tensors: Vec<(String, Tensor)>) -> PathBuf {
    let tensors: HashMap<String, Tensor> = tensors.into_iter().collect();
    let path = dir.join(file);
    candle_core::safetensors::save(&tensors, &path).unwrap();
    path
}

/// Single linear layer: z = x0 - x1 + 0.5
fn linear_checkpoint(dir: &Path, prefix: &str) -> PathBuf {
    let weight = Tensor::new(&[[1f32, -1.0]], &Device::Cpu).unwrap();
    let bias = Tensor::new(&[0.5f32], &Device::Cpu).unwrap();
    write_checkpoint(
        dir,
        "model.safetensors",
        vec![
            (format!("{}.weight", prefix), weight),
            (format!("{}.bias", prefix), bias),
        ],
    )
}

fn sigmoid(z: f32) -> f32 {
    1.0 / (1.0 + (-z).exp())
}

#[test]
fn test_linear_head_matches_hand_computation() {
    let dir = TempDir::new().unwrap();
    let path = linear_checkpoint(dir.path(), "0");

    let model = MlpScoringModel::load(
        &CheckpointSource::Path(path),
        CheckpointFormat::SafeTensors,
        &HeadConfig::linear(2, 1),
        &Device::Cpu,
    )
    .unwrap();

    let batch = Matrix::from_rows(vec![vec![2.0, 1.0], vec![0.0, 3.0]]).unwrap();
    let output = model.forward(&batch).unwrap();

    assert_eq!((output.rows(), output.cols()), (2, 1));
    assert!((output.row(0).unwrap()[0] - sigmoid(1.5)).abs() < 1e-5);
    assert!((output.row(1).unwrap()[0] - sigmoid(-2.5)).abs() < 1e-5);
}

#[test]
fn test_layers_naming_fallback() {
    let dir = TempDir::new().unwrap();
    let path = linear_checkpoint(dir.path(), "layers.0");

    let model = MlpScoringModel::load(
        &CheckpointSource::Path(path),
        CheckpointFormat::SafeTensors,
        &HeadConfig::linear(2, 1),
        &Device::Cpu,
    )
    .unwrap();

    assert_eq!(model.depth(), 1);
}

#[test]
fn test_prefixed_hidden_layer_with_relu() {
    let dir = TempDir::new().unwrap();
    // 2 -> 2 (relu) -> 1 (identity)
    let path = write_checkpoint(
        dir.path(),
        "head.safetensors",
        vec![
            ("model.0.weight".to_string(), Tensor::new(&[[1f32, 0.0], [0.0, -1.0]], &Device::Cpu).unwrap()),
            ("model.0.bias".to_string(), Tensor::new(&[0f32, 0.0], &Device::Cpu).unwrap()),
            ("model.2.weight".to_string(), Tensor::new(&[[2f32, 3.0]], &Device::Cpu).unwrap()),
            ("model.2.bias".to_string(), Tensor::new(&[1f32], &Device::Cpu).unwrap()),
        ],
    );

    let head = HeadConfig {
        hidden_dims: vec![2],
        output: OutputActivation::Identity,
        prefix: Some("model".to_string()),
        ..HeadConfig::linear(2, 1)
    };
    let model = MlpScoringModel::load(
        &CheckpointSource::Path(path),
        CheckpointFormat::SafeTensors,
        &head,
        &Device::Cpu,
    )
    .unwrap();

    // hidden = relu([3, -4]) = [3, 0]; out = 2*3 + 3*0 + 1 = 7
    let batch = Matrix::from_rows(vec![vec![3.0, 4.0]]).unwrap();
    let output = model.forward(&batch).unwrap();
    assert!((output.row(0).unwrap()[0] - 7.0).abs() < 1e-5);
}

#[test]
fn test_in_memory_checkpoint() {
    let dir = TempDir::new().unwrap();
    let path = linear_checkpoint(dir.path(), "0");
    let bytes = std::fs::read(&path).unwrap();

    let model = MlpScoringModel::load(
        &CheckpointSource::Bytes(bytes),
        CheckpointFormat::SafeTensors,
        &HeadConfig::linear(2, 1),
        &Device::Cpu,
    )
    .unwrap();

    assert_eq!(model.input_dim(), Some(2));
    assert_eq!(model.output_dim(), 1);
}

#[test]
fn test_shape_mismatch_is_checkpoint_error() {
    let dir = TempDir::new().unwrap();
    let path = linear_checkpoint(dir.path(), "0");

    let result = MlpScoringModel::load(
        &CheckpointSource::Path(path),
        CheckpointFormat::SafeTensors,
        &HeadConfig::linear(3, 1),
        &Device::Cpu,
    );

    assert!(matches!(result, Err(Error::Checkpoint(_))));
}

#[test]
fn test_corrupt_checkpoint_fails() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("model.safetensors");
    std::fs::write(&path, b"not a checkpoint").unwrap();

    let result = MlpScoringModel::load(
        &CheckpointSource::Path(path),
        CheckpointFormat::SafeTensors,
        &HeadConfig::linear(2, 1),
        &Device::Cpu,
    );

    assert!(matches!(result, Err(Error::Checkpoint(_))));
}

#[test]
fn test_wrong_embedding_width_rejected() {
    let dir = TempDir::new().unwrap();
    let path = linear_checkpoint(dir.path(), "0");
    let model = MlpScoringModel::load(
        &CheckpointSource::Path(path),
        CheckpointFormat::SafeTensors,
        &HeadConfig::linear(2, 1),
        &Device::Cpu,
    )
    .unwrap();

    let batch = Matrix::zeros(1, 5);
    assert!(matches!(model.forward(&batch), Err(Error::Shape(_))));
}

/// Two-feature embedder: residue count and lysine count
struct CountingEmbedder;

impl EmbeddingProvider for CountingEmbedder {
    fn backend(&self) -> &str {
        "counting"
    }

    fn embedding_dim(&self) -> usize {
        2
    }

    fn compute_embeddings(&self, sequences: &[String], pooling: &[Pooling]) -> Result<Embeddings> {
        let mut embeddings = Embeddings::new();
        for &kind in pooling {
            let rows = sequences
                .iter()
                .map(|s| vec![s.len() as f32, s.matches('K').count() as f32])
                .collect();
            embeddings.insert(kind, Matrix::from_rows(rows)?);
        }
        Ok(embeddings)
    }
}

#[test]
fn test_scorer_with_checkpointed_head() {
    let dir = TempDir::new().unwrap();
    let yaml = r#"
score_names: [probability]
checkpoint:
  path: checkpoint/model.safetensors
  head:
    input_dim: 2
"#;
    std::fs::create_dir_all(dir.path().join("checkpoint")).unwrap();
    linear_checkpoint(&dir.path().join("checkpoint"), "0");
    let config_path = dir.path().join("protscore.yaml");
    std::fs::write(&config_path, yaml).unwrap();

    let config = AppConfig::from_file(&config_path).unwrap();
    assert_eq!(config.checkpoint.path, dir.path().join("checkpoint/model.safetensors"));

    let model = MlpScoringModel::load(
        &CheckpointSource::Path(config.checkpoint.path.clone()),
        config.checkpoint.resolved_format(),
        &config.checkpoint.head,
        &Device::Cpu,
    )
    .unwrap();
    let app = SequenceScorer::new(
        config.score_names().unwrap(),
        Box::new(CountingEmbedder),
        Box::new(model),
    )
    .unwrap();

    // "MKK": z = 3 - 2 + 0.5 = 1.5
    let scores = app.score(vec!["MKK", "AAAA"]).unwrap();
    assert_eq!(scores.len(), 2);
    assert!((scores[0].get("probability").unwrap() - sigmoid(1.5)).abs() < 1e-5);
    assert!((scores[1].get("probability").unwrap() - sigmoid(4.5)).abs() < 1e-5);

    let json = serde_json::to_value(&scores).unwrap();
    assert!(json[0]["probability"].is_number());
}
