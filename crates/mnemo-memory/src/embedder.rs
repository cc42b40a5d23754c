// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Local ONNX embedding adapter.
//!
//! Runs a sentence-embedding model (BGE family by default) on CPU. Inference
//! happens on the blocking pool and stops early when the caller's search
//! deadline drops the future.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ndarray::Array2;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::TensorRef;
use tokenizers::{Tokenizer, TruncationParams};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use mnemo_core::error::MnemoError;
use mnemo_core::traits::adapter::PluginAdapter;
use mnemo_core::traits::EmbeddingAdapter;
use mnemo_core::types::{AdapterType, EmbeddingInput, EmbeddingOutput, HealthStatus};

use crate::types::{l2_normalize, Pooling};

/// Tokenizer plus ONNX session for one local model.
pub(crate) struct OnnxModel {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    token_type_ids: bool,
}

// Safety: Session is accessed through Mutex which provides synchronization.
// The tokenizer is thread-safe for encoding operations.
unsafe impl Send for OnnxModel {}
unsafe impl Sync for OnnxModel {}

impl OnnxModel {
    /// Loads `model_path` and the `tokenizer.json` beside it.
    pub(crate) fn load(
        model_path: &Path,
        max_input_length: usize,
        token_type_ids: bool,
    ) -> Result<Self, MnemoError> {
        let model_dir = model_path
            .parent()
            .ok_or_else(|| MnemoError::Config("Invalid model path".to_string()))?;

        let tokenizer_path = model_dir.join("tokenizer.json");
        let mut tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|e| {
            MnemoError::Config(format!(
                "Failed to load tokenizer from {}: {e}",
                tokenizer_path.display()
            ))
        })?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: max_input_length,
                ..Default::default()
            }))
            .map_err(|e| MnemoError::Config(format!("Failed to set truncation: {e}")))?;

        let session = Session::builder()
            .map_err(|e| MnemoError::Internal(format!("Failed to create ONNX session builder: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| MnemoError::Internal(format!("Failed to set optimization level: {e}")))?
            .with_intra_threads(1)
            .map_err(|e| MnemoError::Internal(format!("Failed to set thread count: {e}")))?
            .commit_from_file(model_path)
            .map_err(|e| {
                MnemoError::Config(format!(
                    "Failed to load ONNX model from {}: {e}",
                    model_path.display()
                ))
            })?;

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            token_type_ids,
        })
    }

    pub(crate) fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    /// Runs one encoded sequence through the model.
    ///
    /// Returns the output shape and the flattened first output tensor.
    pub(crate) fn run(
        &self,
        input_ids: Vec<i64>,
        attention_mask: Vec<i64>,
        type_ids: Vec<i64>,
    ) -> Result<(Vec<i64>, Vec<f32>), String> {
        let seq_len = input_ids.len();

        let input_ids_array = Array2::from_shape_vec((1, seq_len), input_ids)
            .map_err(|e| format!("Failed to create input_ids tensor: {e}"))?;
        let attention_mask_array = Array2::from_shape_vec((1, seq_len), attention_mask)
            .map_err(|e| format!("Failed to create attention_mask tensor: {e}"))?;
        let token_type_ids_array = Array2::from_shape_vec((1, seq_len), type_ids)
            .map_err(|e| format!("Failed to create token_type_ids tensor: {e}"))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| format!("Failed to lock ONNX session: {e}"))?;

        let input_ids_tensor = TensorRef::from_array_view(&input_ids_array)
            .map_err(|e| format!("Failed to create input_ids TensorRef: {e}"))?;
        let attention_mask_tensor = TensorRef::from_array_view(&attention_mask_array)
            .map_err(|e| format!("Failed to create attention_mask TensorRef: {e}"))?;

        let result = if self.token_type_ids {
            let token_type_ids_tensor = TensorRef::from_array_view(&token_type_ids_array)
                .map_err(|e| format!("Failed to create token_type_ids TensorRef: {e}"))?;
            session.run(ort::inputs![
                "input_ids" => input_ids_tensor,
                "attention_mask" => attention_mask_tensor,
                "token_type_ids" => token_type_ids_tensor
            ])
        } else {
            session.run(ort::inputs![
                "input_ids" => input_ids_tensor,
                "attention_mask" => attention_mask_tensor
            ])
        };
        let outputs = result.map_err(|e| format!("ONNX inference failed: {e}"))?;

        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| format!("Failed to extract output tensor: {e}"))?;

        Ok((shape.iter().copied().collect(), data.to_vec()))
    }

    pub(crate) fn is_alive(&self) -> Result<(), String> {
        self.session
            .lock()
            .map(|_| ())
            .map_err(|e| format!("Session lock poisoned: {e}"))
    }
}

fn to_i64(values: &[u32]) -> Vec<i64> {
    values.iter().map(|&v| v as i64).collect()
}

pub(crate) fn encoding_inputs(encoding: &tokenizers::Encoding) -> (Vec<i64>, Vec<i64>, Vec<i64>) {
    (
        to_i64(encoding.get_ids()),
        to_i64(encoding.get_attention_mask()),
        to_i64(encoding.get_type_ids()),
    )
}

/// ONNX-based embedding adapter.
pub struct OnnxEmbedder {
    model: Arc<OnnxModel>,
    pooling: Pooling,
    model_name: String,
    dimensions: usize,
}

impl OnnxEmbedder {
    /// Creates a new ONNX embedder from model files on disk.
    ///
    /// Expects `tokenizer.json` in the same directory as the model file.
    pub fn new(
        model_path: &Path,
        model_name: &str,
        dimensions: usize,
        max_input_length: usize,
        pooling: Pooling,
        token_type_ids: bool,
    ) -> Result<Self, MnemoError> {
        let model = OnnxModel::load(model_path, max_input_length, token_type_ids)?;
        Ok(Self {
            model: Arc::new(model),
            pooling,
            model_name: model_name.to_string(),
            dimensions,
        })
    }
}

/// Embed `texts` one at a time, checking `cancel` between texts.
fn embed_blocking(
    model: &OnnxModel,
    pooling: Pooling,
    texts: &[String],
    cancel: &CancellationToken,
) -> Result<Vec<Vec<f32>>, MnemoError> {
    let mut embeddings = Vec::with_capacity(texts.len());

    for text in texts {
        if cancel.is_cancelled() {
            debug!(done = embeddings.len(), total = texts.len(), "embedding cancelled");
            return Err(MnemoError::Embedding {
                message: "embedding cancelled".to_string(),
                source: None,
            });
        }

        let encoding = model.tokenizer().encode(text.as_str(), true).map_err(|e| {
            MnemoError::Embedding {
                message: format!("Tokenization failed: {e}"),
                source: None,
            }
        })?;
        let (input_ids, attention_mask, type_ids) = encoding_inputs(&encoding);
        let seq_len = input_ids.len();

        let (shape, data) = model
            .run(input_ids, attention_mask.clone(), type_ids)
            .map_err(|message| MnemoError::Embedding {
                message,
                source: None,
            })?;

        // Output shape is [1, seq_len, hidden].
        let hidden_size = shape.last().copied().unwrap_or(0) as usize;
        let mut pooled = match pooling {
            Pooling::Cls => cls_pool(&data, hidden_size),
            Pooling::Mean => mean_pool_with_attention(&data, &attention_mask, seq_len, hidden_size),
        };
        l2_normalize(&mut pooled);
        embeddings.push(pooled);
    }

    Ok(embeddings)
}

/// Take the first token's hidden state.
fn cls_pool(embeddings: &[f32], hidden_size: usize) -> Vec<f32> {
    embeddings.iter().take(hidden_size).copied().collect()
}

/// Apply attention-masked mean pooling over token embeddings.
fn mean_pool_with_attention(
    embeddings: &[f32],
    attention_mask: &[i64],
    seq_len: usize,
    hidden_size: usize,
) -> Vec<f32> {
    let mut sum = vec![0.0f32; hidden_size];
    let mut count = 0.0f32;

    for i in 0..seq_len {
        if attention_mask[i] > 0 {
            for j in 0..hidden_size {
                sum[j] += embeddings[i * hidden_size + j];
            }
            count += 1.0;
        }
    }

    if count > 0.0 {
        for val in &mut sum {
            *val /= count;
        }
    }

    sum
}

#[async_trait]
impl PluginAdapter for OnnxEmbedder {
    fn name(&self) -> &str {
        "onnx-embedder"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Embedding
    }

    async fn health_check(&self) -> Result<HealthStatus, MnemoError> {
        match self.model.is_alive() {
            Ok(()) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Unhealthy(e)),
        }
    }

    async fn shutdown(&self) -> Result<(), MnemoError> {
        Ok(())
    }
}

#[async_trait]
impl EmbeddingAdapter for OnnxEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, input: EmbeddingInput) -> Result<EmbeddingOutput, MnemoError> {
        let model = Arc::clone(&self.model);
        let pooling = self.pooling;
        let cancel = CancellationToken::new();
        // Dropping this future (search deadline) cancels the blocking loop.
        let _guard = cancel.clone().drop_guard();

        let embeddings = tokio::task::spawn_blocking(move || {
            embed_blocking(&model, pooling, &input.texts, &cancel)
        })
        .await
        .map_err(|e| MnemoError::Embedding {
            message: format!("embedding task failed: {e}"),
            source: Some(Box::new(e)),
        })??;

        Ok(EmbeddingOutput {
            dimensions: embeddings.first().map(Vec::len).unwrap_or(self.dimensions),
            embeddings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cls_pool_takes_first_token() {
        let embeddings = vec![
            1.0, 2.0, 3.0, // token 0 ([CLS])
            9.0, 9.0, 9.0, // token 1
        ];
        assert_eq!(cls_pool(&embeddings, 3), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn mean_pool_with_attention_skips_padding() {
        let embeddings = vec![
            0.0, 0.0, 0.0, // token 0 (padding)
            1.0, 2.0, 3.0, // token 1 (real)
        ];
        let attention_mask = vec![0, 1];
        let result = mean_pool_with_attention(&embeddings, &attention_mask, 2, 3);
        assert_eq!(result, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn mean_pool_with_attention_multiple() {
        let embeddings = vec![
            1.0, 2.0, // token 0
            3.0, 4.0, // token 1
            5.0, 6.0, // token 2
        ];
        let attention_mask = vec![1, 1, 1];
        let result = mean_pool_with_attention(&embeddings, &attention_mask, 3, 2);
        assert!((result[0] - 3.0).abs() < f32::EPSILON);
        assert!((result[1] - 4.0).abs() < f32::EPSILON);
    }

    #[test]
    fn missing_model_files_are_config_errors() {
        let dir = tempfile::tempdir().unwrap();
        let err = OnnxEmbedder::new(
            &dir.path().join("model.onnx"),
            "bge",
            8,
            512,
            Pooling::Cls,
            false,
        )
        .err()
        .expect("missing tokenizer should fail");
        assert!(matches!(err, MnemoError::Config(_)), "got {err:?}");
    }
}
