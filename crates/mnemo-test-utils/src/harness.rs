// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for memory integration tests.
//!
//! `MemoryHarness` owns a temp data directory and a [`MnemoConfig`] pointing
//! at it, together with the mock adapters the stores should use.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use mnemo_config::MnemoConfig;
use mnemo_core::{MnemoError, RerankAdapter};

use crate::mock_embedder::HashEmbedder;
use crate::mock_reranker::{FailingReranker, OverlapReranker};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RerankerKind {
    Overlap,
    Failing,
    Disabled,
}

/// Builder for [`MemoryHarness`].
pub struct MemoryHarnessBuilder {
    backend: String,
    dim: usize,
    language: String,
    threshold: f32,
    timeout_secs: u64,
    embed_delay: Option<Duration>,
    failing_embedder: bool,
    reranker: RerankerKind,
}

impl MemoryHarnessBuilder {
    fn new() -> Self {
        Self {
            backend: "relational".to_string(),
            dim: 256,
            language: "en".to_string(),
            threshold: 0.3,
            timeout_secs: 5,
            embed_delay: None,
            failing_embedder: false,
            reranker: RerankerKind::Overlap,
        }
    }

    /// Store backend selector written to `memory.backend`.
    pub fn backend(mut self, backend: &str) -> Self {
        self.backend = backend.to_string();
        self
    }

    pub fn dim(mut self, dim: usize) -> Self {
        self.dim = dim;
        self
    }

    pub fn language(mut self, language: &str) -> Self {
        self.language = language.to_string();
        self
    }

    /// Dense channel cosine threshold.
    pub fn threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Make every embedding call sleep first.
    pub fn with_embed_delay(mut self, delay: Duration) -> Self {
        self.embed_delay = Some(delay);
        self
    }

    pub fn with_failing_embedder(mut self) -> Self {
        self.failing_embedder = true;
        self
    }

    pub fn with_failing_reranker(mut self) -> Self {
        self.reranker = RerankerKind::Failing;
        self
    }

    pub fn without_reranker(mut self) -> Self {
        self.reranker = RerankerKind::Disabled;
        self
    }

    pub fn build(self) -> Result<MemoryHarness, MnemoError> {
        let temp_dir = tempfile::TempDir::new().map_err(MnemoError::storage)?;

        let mut config = MnemoConfig::default();
        config.memory.data_dir = temp_dir.path().display().to_string();
        config.memory.backend = self.backend;
        config.memory.timeout_secs = self.timeout_secs;
        config.rag.lexical.language = self.language;
        config.rag.dense.vector_dim = self.dim;
        config.rag.dense.threshold = self.threshold;
        config.rag.dense.n_trees = 4;
        config.rag.dense.embed_params.model_name = "hash-bow".to_string();
        config.rag.rerank.enabled = self.reranker != RerankerKind::Disabled;

        let mut embedder = HashEmbedder::new(self.dim);
        if let Some(delay) = self.embed_delay {
            embedder = embedder.with_delay(delay);
        }
        if self.failing_embedder {
            embedder = embedder.failing();
        }

        let reranker: Option<Arc<dyn RerankAdapter>> = match self.reranker {
            RerankerKind::Overlap => Some(Arc::new(OverlapReranker::new())),
            RerankerKind::Failing => Some(Arc::new(FailingReranker)),
            RerankerKind::Disabled => None,
        };

        Ok(MemoryHarness {
            temp_dir,
            config,
            embedder: Arc::new(embedder),
            reranker,
        })
    }
}

/// A temp data directory, a config pointing at it, and mock adapters.
pub struct MemoryHarness {
    temp_dir: tempfile::TempDir,
    config: MnemoConfig,
    embedder: Arc<HashEmbedder>,
    reranker: Option<Arc<dyn RerankAdapter>>,
}

impl MemoryHarness {
    pub fn builder() -> MemoryHarnessBuilder {
        MemoryHarnessBuilder::new()
    }

    pub fn data_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn config(&self) -> &MnemoConfig {
        &self.config
    }

    /// Mutable access for tests that tweak one setting after building.
    pub fn config_mut(&mut self) -> &mut MnemoConfig {
        &mut self.config
    }

    pub fn embedder(&self) -> Arc<HashEmbedder> {
        Arc::clone(&self.embedder)
    }

    pub fn reranker(&self) -> Option<Arc<dyn RerankAdapter>> {
        self.reranker.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn harness_points_config_at_temp_dir() {
        let h = MemoryHarness::builder().backend("indexed-file").dim(32).build().unwrap();
        assert_eq!(h.config().memory.data_dir, h.data_dir().display().to_string());
        assert_eq!(h.config().memory.backend, "indexed-file");
        assert_eq!(h.config().rag.dense.vector_dim, 32);
        assert!(h.reranker().is_some());
    }

    #[test]
    fn disabled_reranker_is_reflected_in_config() {
        let h = MemoryHarness::builder().without_reranker().build().unwrap();
        assert!(h.reranker().is_none());
        assert!(!h.config().rag.rerank.enabled);
    }
}
