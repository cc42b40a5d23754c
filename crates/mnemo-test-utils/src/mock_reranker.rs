// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rerank adapters for tests.

use std::collections::HashSet;

use async_trait::async_trait;

use mnemo_core::traits::adapter::PluginAdapter;
use mnemo_core::traits::RerankAdapter;
use mnemo_core::types::{AdapterType, HealthStatus, RerankInput, RerankOutput, RerankScore};
use mnemo_core::MnemoError;

use crate::words;

/// Scores a document by the fraction of query words it contains.
#[derive(Debug, Clone, Default)]
pub struct OverlapReranker;

impl OverlapReranker {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PluginAdapter for OverlapReranker {
    fn name(&self) -> &str {
        "overlap-reranker"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Reranker
    }

    async fn health_check(&self) -> Result<HealthStatus, MnemoError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), MnemoError> {
        Ok(())
    }
}

#[async_trait]
impl RerankAdapter for OverlapReranker {
    async fn rerank(&self, input: RerankInput) -> Result<RerankOutput, MnemoError> {
        let query: HashSet<String> = words(&input.query).into_iter().collect();
        let denom = query.len().max(1) as f32;

        let mut results: Vec<RerankScore> = input
            .documents
            .iter()
            .enumerate()
            .map(|(index, doc)| {
                let doc_words: HashSet<String> = words(doc).into_iter().collect();
                let hits = query.intersection(&doc_words).count() as f32;
                RerankScore {
                    index,
                    relevance_score: hits / denom,
                }
            })
            .collect();
        results.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
        results.truncate(input.top_n);
        Ok(RerankOutput { results })
    }
}

/// A reranker whose every call fails, for degradation tests.
#[derive(Debug, Clone, Default)]
pub struct FailingReranker;

#[async_trait]
impl PluginAdapter for FailingReranker {
    fn name(&self) -> &str {
        "failing-reranker"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Reranker
    }

    async fn health_check(&self) -> Result<HealthStatus, MnemoError> {
        Ok(HealthStatus::Unhealthy("always fails".into()))
    }

    async fn shutdown(&self) -> Result<(), MnemoError> {
        Ok(())
    }
}

#[async_trait]
impl RerankAdapter for FailingReranker {
    async fn rerank(&self, _input: RerankInput) -> Result<RerankOutput, MnemoError> {
        Err(MnemoError::Rerank {
            message: "mock rerank failure".into(),
            source: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn overlap_scores_shared_words() {
        let out = OverlapReranker
            .rerank(RerankInput {
                query: "cat milk".into(),
                documents: vec!["A cat likes milk.".into(), "Dogs bark.".into()],
                top_n: 2,
            })
            .await
            .unwrap();
        assert_eq!(out.results[0].index, 0);
        assert_eq!(out.results[0].relevance_score, 1.0);
        assert_eq!(out.results[1].relevance_score, 0.0);
    }
}
