// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding and rerank backend selection, plus the embedding helpers every
//! store uses.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use mnemo_config::model::{ModelParams, RagConfig};
use mnemo_core::error::MnemoError;
use mnemo_core::traits::{EmbeddingAdapter, RerankAdapter};
use mnemo_core::types::EmbeddingInput;

use crate::cross_encoder::OnnxReranker;
use crate::embedder::OnnxEmbedder;
use crate::model_manager::{ModelManager, ModelSource};
use crate::remote::{RemoteEmbedder, RemoteReranker};
use crate::types::{l2_normalize, parse_selector, ModelBackend, Pooling};

/// The embedding adapter and optional reranker a store works with.
#[derive(Clone)]
pub struct Providers {
    pub embedder: Arc<dyn EmbeddingAdapter>,
    pub reranker: Option<Arc<dyn RerankAdapter>>,
}

impl std::fmt::Debug for Providers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Providers")
            .field("embedder", &self.embedder.name())
            .field("reranker", &self.reranker.as_ref().map(|r| r.name()))
            .finish()
    }
}

impl Providers {
    pub fn new(
        embedder: Arc<dyn EmbeddingAdapter>,
        reranker: Option<Arc<dyn RerankAdapter>>,
    ) -> Self {
        Self { embedder, reranker }
    }

    /// Build the configured backends.
    ///
    /// Unknown selectors fail with [`MnemoError::Config`] before anything is
    /// written to disk. Local models may be downloaded into
    /// `{data_dir}/models/` on first use.
    pub async fn from_config(rag: &RagConfig, data_dir: &Path) -> Result<Self, MnemoError> {
        let dense = &rag.dense;
        let embed_backend: ModelBackend =
            parse_selector("rag.dense.embed_backend", &dense.embed_backend)?;
        let pooling: Pooling =
            parse_selector("rag.dense.embed_params.pooling", &dense.embed_params.pooling)?;

        let embedder: Arc<dyn EmbeddingAdapter> = match embed_backend {
            ModelBackend::RemoteApi => {
                Arc::new(RemoteEmbedder::new(&dense.embed_params, dense.vector_dim)?)
            }
            ModelBackend::LocalModel => {
                let params = &dense.embed_params;
                let model_path = resolve_model_path(params, data_dir).await?;
                Arc::new(OnnxEmbedder::new(
                    &model_path,
                    &params.model_name,
                    dense.vector_dim,
                    params.max_input_length,
                    pooling,
                    params.token_type_ids,
                )?)
            }
        };

        let reranker: Option<Arc<dyn RerankAdapter>> = if rag.rerank.enabled {
            let backend: ModelBackend = parse_selector("rag.rerank.backend", &rag.rerank.backend)?;
            let params = &rag.rerank.params;
            let reranker: Arc<dyn RerankAdapter> = match backend {
                ModelBackend::RemoteApi => Arc::new(RemoteReranker::new(params)?),
                ModelBackend::LocalModel => {
                    let model_path = resolve_model_path(params, data_dir).await?;
                    Arc::new(OnnxReranker::new(
                        &model_path,
                        params.max_input_length,
                        params.token_type_ids,
                    )?)
                }
            };
            Some(reranker)
        } else {
            None
        };

        info!(
            embedder = embedder.name(),
            model = embedder.model_name(),
            reranker = reranker.as_ref().map(|r| r.name()).unwrap_or("none"),
            "providers ready"
        );
        Ok(Self { embedder, reranker })
    }
}

/// Use `model_path` when given, otherwise download from the configured URLs.
async fn resolve_model_path(params: &ModelParams, data_dir: &Path) -> Result<PathBuf, MnemoError> {
    if let Some(path) = &params.model_path {
        return Ok(PathBuf::from(path));
    }
    match (&params.model_url, &params.tokenizer_url) {
        (Some(model_url), Some(tokenizer_url)) => {
            let manager = ModelManager::new(
                data_dir.to_path_buf(),
                ModelSource {
                    name: params.model_name.clone(),
                    model_url: model_url.clone(),
                    tokenizer_url: tokenizer_url.clone(),
                },
            );
            manager.ensure_model().await
        }
        _ => Err(MnemoError::Config(format!(
            "local model `{}` needs model_path or both model_url and tokenizer_url",
            params.model_name
        ))),
    }
}

/// Embed documents for indexing.
///
/// Failures degrade to zero vectors so positions stay aligned with the
/// corpus; every vector is L2-normalized.
pub async fn embed_documents(
    embedder: &dyn EmbeddingAdapter,
    texts: &[String],
    dim: usize,
) -> Vec<Vec<f32>> {
    if texts.is_empty() {
        return Vec::new();
    }

    let mut vectors = match embedder
        .embed(EmbeddingInput {
            texts: texts.to_vec(),
        })
        .await
    {
        Ok(output) if output.embeddings.len() == texts.len() => output.embeddings,
        Ok(output) => {
            warn!(
                expected = texts.len(),
                got = output.embeddings.len(),
                "embedding count mismatch, using zero vectors"
            );
            vec![vec![0.0; dim]; texts.len()]
        }
        Err(e) => {
            warn!(error = %e, count = texts.len(), "embedding failed, using zero vectors");
            vec![vec![0.0; dim]; texts.len()]
        }
    };

    for v in vectors.iter_mut() {
        if v.len() != dim {
            warn!(expected = dim, got = v.len(), "embedding has wrong dimension, using zero vector");
            *v = vec![0.0; dim];
        }
        l2_normalize(v);
    }
    vectors
}

/// Embed a search query. Unlike [`embed_documents`] this fails instead of
/// substituting a zero vector, which would match everything equally.
pub async fn embed_query(
    embedder: &dyn EmbeddingAdapter,
    query: &str,
    dim: usize,
) -> Result<Vec<f32>, MnemoError> {
    let output = embedder
        .embed(EmbeddingInput {
            texts: vec![query.to_string()],
        })
        .await?;
    let mut vector = output.embeddings.into_iter().next().ok_or_else(|| {
        MnemoError::Embedding {
            message: "embedding returned no results".to_string(),
            source: None,
        }
    })?;
    if vector.len() != dim {
        return Err(MnemoError::Index(format!(
            "query embedding has {} dimensions, index expects {dim}",
            vector.len()
        )));
    }
    l2_normalize(&mut vector);
    Ok(vector)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnemo_config::MnemoConfig;
    use mnemo_test_utils::HashEmbedder;

    #[tokio::test]
    async fn unknown_embed_backend_is_config_error() {
        let mut config = MnemoConfig::default();
        config.rag.dense.embed_backend = "unknown".to_string();
        let dir = tempfile::tempdir().unwrap();

        let err = Providers::from_config(&config.rag, dir.path())
            .await
            .expect_err("should fail");
        assert!(matches!(err, MnemoError::Config(_)));
    }

    #[tokio::test]
    async fn unknown_rerank_backend_is_config_error() {
        let mut config = MnemoConfig::default();
        config.rag.rerank.backend = "magic".to_string();
        let dir = tempfile::tempdir().unwrap();

        let err = Providers::from_config(&config.rag, dir.path())
            .await
            .expect_err("should fail");
        assert!(matches!(err, MnemoError::Config(_)));
    }

    #[tokio::test]
    async fn remote_backends_build_without_network() {
        let config = MnemoConfig::default();
        let dir = tempfile::tempdir().unwrap();
        let providers = Providers::from_config(&config.rag, dir.path()).await.unwrap();
        assert_eq!(providers.embedder.name(), "remote-embedder");
        assert_eq!(providers.embedder.dimensions(), 1024);
        assert!(providers.reranker.is_some());
    }

    #[tokio::test]
    async fn local_model_without_location_is_config_error() {
        let mut config = MnemoConfig::default();
        config.rag.dense.embed_backend = "local-model".to_string();
        let dir = tempfile::tempdir().unwrap();

        let err = Providers::from_config(&config.rag, dir.path())
            .await
            .expect_err("should fail");
        assert!(matches!(err, MnemoError::Config(_)));
        assert!(!dir.path().join("models").exists());
    }

    #[tokio::test]
    async fn failed_document_embedding_yields_zero_vectors() {
        let embedder = HashEmbedder::new(8).failing();
        let vectors = embed_documents(&embedder, &["a".to_string(), "b".to_string()], 8).await;
        assert_eq!(vectors, vec![vec![0.0; 8]; 2]);
    }

    #[tokio::test]
    async fn document_vectors_are_normalized() {
        let embedder = HashEmbedder::new(16);
        let vectors = embed_documents(&embedder, &["a cat sat".to_string()], 16).await;
        let norm: f32 = vectors[0].iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn wrong_dimension_becomes_zero_vector() {
        let embedder = HashEmbedder::new(4);
        let vectors = embed_documents(&embedder, &["x".to_string()], 8).await;
        assert_eq!(vectors[0], vec![0.0; 8]);
    }

    #[tokio::test]
    async fn failed_query_embedding_is_an_error() {
        let embedder = HashEmbedder::new(8).failing();
        assert!(embed_query(&embedder, "q", 8).await.is_err());
    }
}
