// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The recall channel capability shared by the lexical and dense retrievers.

use std::collections::BTreeMap;

use async_trait::async_trait;

use mnemo_core::MnemoError;

/// One retrieval strategy contributing candidates to multi-recall fusion.
///
/// A channel's index is a projection of the orchestrator's corpus. Document
/// ids are corpus positions, so a channel must index `new_texts` at
/// `corpus.len()..corpus.len() + new_texts.len()`.
#[async_trait]
pub trait RecallChannel: Send + Sync {
    /// Stable channel name, used as the key of its saved state.
    fn name(&self) -> &'static str;

    /// Index `new_texts`, which are about to be appended to `corpus`.
    async fn add(
        &mut self,
        new_texts: &[String],
        corpus: &BTreeMap<usize, String>,
    ) -> Result<(), MnemoError>;

    /// Up to `top_k` candidate texts for `query`, taken from `corpus`.
    async fn retrieval(
        &self,
        query: &str,
        corpus: &BTreeMap<usize, String>,
        top_k: usize,
    ) -> Result<Vec<String>, MnemoError>;

    /// Serialized channel state. Channels whose index is fully derived from
    /// the corpus return `None`.
    fn save_state(&self) -> Option<serde_json::Value> {
        None
    }

    /// Restore the channel after a load. The default rebuilds the index from
    /// the restored corpus and ignores any saved state.
    async fn load_state(
        &mut self,
        _state: Option<&serde_json::Value>,
        corpus: &BTreeMap<usize, String>,
    ) -> Result<(), MnemoError> {
        let texts: Vec<String> = corpus.values().cloned().collect();
        self.add(&texts, &BTreeMap::new()).await
    }
}
