// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Local ONNX cross-encoder reranker.
//!
//! Scores each (query, document) pair jointly and maps the logit to a
//! relevance probability.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use mnemo_core::error::MnemoError;
use mnemo_core::traits::adapter::PluginAdapter;
use mnemo_core::traits::RerankAdapter;
use mnemo_core::types::{AdapterType, HealthStatus, RerankInput, RerankOutput, RerankScore};

use crate::embedder::{encoding_inputs, OnnxModel};

pub struct OnnxReranker {
    model: Arc<OnnxModel>,
}

impl OnnxReranker {
    /// Loads a cross-encoder model; `tokenizer.json` must sit beside it.
    pub fn new(
        model_path: &Path,
        max_input_length: usize,
        token_type_ids: bool,
    ) -> Result<Self, MnemoError> {
        Ok(Self {
            model: Arc::new(OnnxModel::load(model_path, max_input_length, token_type_ids)?),
        })
    }
}

fn rerank_err(message: String) -> MnemoError {
    MnemoError::Rerank {
        message,
        source: None,
    }
}

fn score_blocking(
    model: &OnnxModel,
    query: &str,
    documents: &[String],
    cancel: &CancellationToken,
) -> Result<Vec<RerankScore>, MnemoError> {
    let mut scores = Vec::with_capacity(documents.len());

    for (index, doc) in documents.iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(rerank_err("rerank cancelled".to_string()));
        }

        let encoding = model
            .tokenizer()
            .encode((query, doc.as_str()), true)
            .map_err(|e| rerank_err(format!("Tokenization failed: {e}")))?;
        let (input_ids, attention_mask, type_ids) = encoding_inputs(&encoding);
        let (shape, logits) = model.run(input_ids, attention_mask, type_ids).map_err(rerank_err)?;

        let classes = shape.last().copied().unwrap_or(1) as usize;
        scores.push(RerankScore {
            index,
            relevance_score: relevance_from_logits(&logits, classes),
        });
    }

    Ok(scores)
}

/// Single-logit heads go through a sigmoid; two-class heads use the softmax
/// probability of the positive class.
fn relevance_from_logits(logits: &[f32], classes: usize) -> f32 {
    match (classes, logits) {
        (2, [neg, pos, ..]) => {
            let max = neg.max(*pos);
            let e_neg = (neg - max).exp();
            let e_pos = (pos - max).exp();
            e_pos / (e_neg + e_pos)
        }
        (_, [logit, ..]) => 1.0 / (1.0 + (-logit).exp()),
        _ => 0.0,
    }
}

#[async_trait]
impl PluginAdapter for OnnxReranker {
    fn name(&self) -> &str {
        "onnx-reranker"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Reranker
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
impl RerankAdapter for OnnxReranker {
    async fn rerank(&self, input: RerankInput) -> Result<RerankOutput, MnemoError> {
        let model = Arc::clone(&self.model);
        let cancel = CancellationToken::new();
        let _guard = cancel.clone().drop_guard();

        let mut results = tokio::task::spawn_blocking(move || {
            score_blocking(&model, &input.query, &input.documents, &cancel)
        })
        .await
        .map_err(|e| MnemoError::Rerank {
            message: format!("rerank task failed: {e}"),
            source: Some(Box::new(e)),
        })??;

        results.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
        results.truncate(input.top_n);
        Ok(RerankOutput { results })
    }
}
