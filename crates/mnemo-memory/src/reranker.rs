// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Second-pass relevance ordering of fused candidates.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::warn;

use mnemo_core::traits::RerankAdapter;
use mnemo_core::types::RerankInput;
use mnemo_core::MnemoError;

/// Deduplicates candidates, scores them with a rerank adapter and keeps the
/// best `k`. Adapter errors are returned to the caller.
#[derive(Clone)]
pub struct Reranker {
    adapter: Arc<dyn RerankAdapter>,
}

impl Reranker {
    pub fn new(adapter: Arc<dyn RerankAdapter>) -> Self {
        Self { adapter }
    }

    pub fn name(&self) -> &str {
        self.adapter.name()
    }

    pub async fn rerank(
        &self,
        candidates: &[String],
        query: &str,
        k: usize,
    ) -> Result<Vec<String>, MnemoError> {
        let documents = dedup(candidates);
        if documents.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let output = self
            .adapter
            .rerank(RerankInput {
                query: query.to_string(),
                documents: documents.clone(),
                top_n: k.min(documents.len()),
            })
            .await?;

        let mut scored = output.results;
        scored.retain(|r| {
            let ok = r.index < documents.len();
            if !ok {
                warn!(index = r.index, documents = documents.len(), "rerank index out of range");
            }
            ok
        });
        scored.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));

        let mut seen = HashSet::new();
        Ok(scored
            .into_iter()
            .filter(|r| seen.insert(r.index))
            .take(k)
            .map(|r| documents[r.index].clone())
            .collect())
    }
}

/// Drop repeated texts, keeping first occurrences in order.
pub fn dedup(texts: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    texts
        .iter()
        .filter(|t| seen.insert(t.as_str()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnemo_test_utils::{FailingReranker, OverlapReranker};

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        assert_eq!(dedup(&strings(&["b", "a", "b", "c", "a"])), strings(&["b", "a", "c"]));
    }

    #[tokio::test]
    async fn orders_by_relevance_and_truncates() {
        let reranker = Reranker::new(Arc::new(OverlapReranker::new()));
        let out = reranker
            .rerank(
                &strings(&["dogs bark", "a cat likes milk", "a cat", "a cat"]),
                "cat milk",
                2,
            )
            .await
            .unwrap();
        assert_eq!(out, strings(&["a cat likes milk", "a cat"]));
    }

    #[tokio::test]
    async fn empty_candidates_skip_the_adapter() {
        let reranker = Reranker::new(Arc::new(FailingReranker));
        assert!(reranker.rerank(&[], "q", 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn adapter_errors_propagate() {
        let reranker = Reranker::new(Arc::new(FailingReranker));
        let err = reranker.rerank(&strings(&["x"]), "q", 1).await.unwrap_err();
        assert!(err.is_transient());
    }
}
