// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dense recall channel: ANN search over normalized embeddings with
//! neighbor expansion.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use mnemo_core::traits::EmbeddingAdapter;
use mnemo_core::MnemoError;

use crate::ann::{angular_to_cosine, AnnIndex};
use crate::channel::RecallChannel;
use crate::providers::{embed_documents, embed_query};

/// Embedding recall channel.
///
/// A neighbor whose cosine similarity to the query reaches `threshold` is
/// expanded to the documents immediately before and after it, since a single
/// short turn rarely carries enough context on its own.
pub struct DenseRetriever {
    embedder: Arc<dyn EmbeddingAdapter>,
    threshold: f32,
    n_trees: usize,
    index: AnnIndex,
}

impl DenseRetriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingAdapter>,
        dim: usize,
        threshold: f32,
        n_trees: usize,
    ) -> Self {
        Self {
            embedder,
            threshold,
            n_trees,
            index: AnnIndex::new(dim, n_trees),
        }
    }

    pub fn indexed(&self) -> usize {
        self.index.len()
    }
}

/// Positions `{prev, hit, next}` around `idx`, clamped to `[0, len)`.
pub fn context_window(idx: usize, len: usize) -> [usize; 3] {
    let last = len.saturating_sub(1);
    [idx.saturating_sub(1), idx.min(last), (idx + 1).min(last)]
}

#[async_trait]
impl RecallChannel for DenseRetriever {
    fn name(&self) -> &'static str {
        "dense"
    }

    async fn add(
        &mut self,
        new_texts: &[String],
        corpus: &BTreeMap<usize, String>,
    ) -> Result<(), MnemoError> {
        if new_texts.is_empty() {
            return Ok(());
        }
        let vectors =
            embed_documents(self.embedder.as_ref(), new_texts, self.index.dim()).await;
        let start = corpus.len();
        for (offset, vector) in vectors.iter().enumerate() {
            self.index.add_item(start + offset, vector)?;
        }
        self.index.build();
        debug!(items = self.index.len(), "dense index rebuilt");
        Ok(())
    }

    async fn retrieval(
        &self,
        query: &str,
        corpus: &BTreeMap<usize, String>,
        top_k: usize,
    ) -> Result<Vec<String>, MnemoError> {
        if corpus.is_empty() || self.index.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }
        let vector = embed_query(self.embedder.as_ref(), query, self.index.dim()).await?;
        let neighbors = self.index.get_nns_by_vector(&vector, top_k / 3 + 1, None)?;

        let mut seen = HashSet::new();
        let mut texts = Vec::new();
        for (idx, distance) in neighbors {
            let similarity = angular_to_cosine(distance);
            if similarity < self.threshold {
                continue;
            }
            for pos in context_window(idx, corpus.len()) {
                if let Some(text) = corpus.get(&pos) {
                    if seen.insert(text.as_str()) {
                        texts.push(text.clone());
                    }
                }
            }
        }
        Ok(texts)
    }

    async fn load_state(
        &mut self,
        _state: Option<&serde_json::Value>,
        corpus: &BTreeMap<usize, String>,
    ) -> Result<(), MnemoError> {
        self.index = AnnIndex::new(self.index.dim(), self.n_trees);
        let texts: Vec<String> = corpus.values().cloned().collect();
        self.add(&texts, &BTreeMap::new()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnemo_test_utils::HashEmbedder;

    fn corpus(texts: &[&str]) -> BTreeMap<usize, String> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| (i, t.to_string()))
            .collect()
    }

    async fn retriever(texts: &[&str], threshold: f32) -> (DenseRetriever, BTreeMap<usize, String>) {
        let docs = corpus(texts);
        let mut dense = DenseRetriever::new(Arc::new(HashEmbedder::new(64)), 64, threshold, 3);
        let all: Vec<String> = docs.values().cloned().collect();
        dense.add(&all, &BTreeMap::new()).await.unwrap();
        (dense, docs)
    }

    #[test]
    fn window_is_clamped_not_wrapped() {
        assert_eq!(context_window(0, 5), [0, 0, 1]);
        assert_eq!(context_window(4, 5), [3, 4, 4]);
        assert_eq!(context_window(2, 5), [1, 2, 3]);
        assert_eq!(context_window(0, 1), [0, 0, 0]);
    }

    #[tokio::test]
    async fn hit_expands_to_neighbors() {
        let (dense, docs) = retriever(
            &["first line", "second line", "purple elephant", "fourth line", "fifth line"],
            0.5,
        )
        .await;
        let hits = dense.retrieval("purple elephant", &docs, 1).await.unwrap();
        assert_eq!(
            hits,
            vec![
                "second line".to_string(),
                "purple elephant".to_string(),
                "fourth line".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn boundary_hit_is_deduplicated() {
        let (dense, docs) = retriever(&["purple elephant", "other words"], 0.5).await;
        let hits = dense.retrieval("purple elephant", &docs, 1).await.unwrap();
        assert_eq!(hits, vec!["purple elephant".to_string(), "other words".to_string()]);
    }

    #[tokio::test]
    async fn threshold_filters_unrelated_neighbors() {
        let (dense, docs) = retriever(&["purple elephant", "green giraffe"], 0.9).await;
        let hits = dense.retrieval("blue whale", &docs, 3).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn failed_query_embedding_is_an_error() {
        let docs = corpus(&["a"]);
        let mut dense = DenseRetriever::new(Arc::new(HashEmbedder::new(8).failing()), 8, 0.0, 1);
        dense.add(&["a".to_string()], &BTreeMap::new()).await.unwrap();
        assert!(dense.retrieval("a", &docs, 3).await.is_err());
    }

    #[tokio::test]
    async fn load_state_rebuilds_from_corpus() {
        let (mut dense, docs) = retriever(&["one", "two", "three"], 0.5).await;
        dense.load_state(None, &docs).await.unwrap();
        assert_eq!(dense.indexed(), 3);
    }
}
