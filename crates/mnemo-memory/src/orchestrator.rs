// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Multi-recall orchestrator.
//!
//! [`MultiRecall`] owns the canonical corpus (`id -> text`). Every recall
//! channel indexes a projection of it; queries fan out to each channel, the
//! candidates are fused (union plus text dedup), and the reranker cuts the
//! union down to `top_k`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use mnemo_config::model::RagConfig;
use mnemo_core::MnemoError;

use crate::channel::RecallChannel;
use crate::dense::DenseRetriever;
use crate::lexical::LexicalRetriever;
use crate::providers::Providers;
use crate::reranker::{dedup, Reranker};
use crate::types::{parse_selector, preview, Language};

/// Marker placed between documents in the joined output of [`MultiRecall::req`].
pub const DOCUMENT_SEPARATOR: &str = "\n<document-split>\n";

/// Durable state of a [`MultiRecall`]: the corpus plus whatever each channel
/// chose to serialize.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RagState {
    pub id_to_doc: BTreeMap<usize, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub channels: BTreeMap<String, serde_json::Value>,
}

pub struct MultiRecall {
    id_to_doc: BTreeMap<usize, String>,
    channels: Vec<Box<dyn RecallChannel>>,
    reranker: Option<Reranker>,
}

impl MultiRecall {
    pub fn new(channels: Vec<Box<dyn RecallChannel>>, reranker: Option<Reranker>) -> Self {
        Self {
            id_to_doc: BTreeMap::new(),
            channels,
            reranker,
        }
    }

    /// Build the channels enabled in `rag` around the given providers.
    pub fn from_config(rag: &RagConfig, providers: &Providers) -> Result<Self, MnemoError> {
        let mut channels: Vec<Box<dyn RecallChannel>> = Vec::new();
        if rag.lexical.enabled {
            let language: Language = parse_selector("rag.lexical.language", &rag.lexical.language)?;
            channels.push(Box::new(LexicalRetriever::new(language)));
        }
        if rag.dense.enabled {
            channels.push(Box::new(DenseRetriever::new(
                providers.embedder.clone(),
                rag.dense.vector_dim,
                rag.dense.threshold,
                rag.dense.n_trees,
            )));
        }
        if channels.is_empty() {
            return Err(MnemoError::Config(
                "at least one recall channel must be enabled".into(),
            ));
        }

        let reranker = if rag.rerank.enabled {
            providers.reranker.clone().map(Reranker::new)
        } else {
            None
        };
        Ok(Self::new(channels, reranker))
    }

    pub fn len(&self) -> usize {
        self.id_to_doc.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_doc.is_empty()
    }

    /// The canonical corpus, ordered by id.
    pub fn documents(&self) -> &BTreeMap<usize, String> {
        &self.id_to_doc
    }

    pub fn channel_names(&self) -> Vec<&'static str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    /// Append one document and return its id.
    pub async fn add(&mut self, text: &str) -> usize {
        let id = self.id_to_doc.len();
        self.add_batch(&[text.to_string()]).await;
        id
    }

    /// Append documents in order, returning their ids.
    ///
    /// A channel that fails to index the batch is logged and left behind; the
    /// corpus still grows, and the channel catches up on the next load.
    pub async fn add_batch(&mut self, texts: &[String]) -> Vec<usize> {
        if texts.is_empty() {
            return Vec::new();
        }
        for channel in self.channels.iter_mut() {
            if let Err(e) = channel.add(texts, &self.id_to_doc).await {
                warn!(channel = channel.name(), error = %e, "recall channel failed to index documents");
            }
        }
        let start = self.id_to_doc.len();
        for (offset, text) in texts.iter().enumerate() {
            self.id_to_doc.insert(start + offset, text.clone());
        }
        (start..start + texts.len()).collect()
    }

    /// Fused, deduplicated and reranked documents for `query`, at most `top_k`.
    ///
    /// Channel and reranker failures degrade the result rather than fail it.
    pub async fn req_docs(&self, query: &str, top_k: usize) -> Vec<String> {
        if top_k == 0 || self.id_to_doc.is_empty() {
            return Vec::new();
        }

        let mut candidates = Vec::new();
        for channel in &self.channels {
            match channel.retrieval(query, &self.id_to_doc, top_k).await {
                Ok(hits) => {
                    debug!(channel = channel.name(), hits = hits.len(), "recall channel returned");
                    candidates.extend(hits);
                }
                Err(e) => {
                    warn!(channel = channel.name(), error = %e, "recall channel failed, skipping");
                }
            }
        }
        let mut candidates = dedup(&candidates);

        let docs = match &self.reranker {
            Some(reranker) => match reranker.rerank(&candidates, query, top_k).await {
                Ok(docs) => docs,
                Err(e) => {
                    warn!(reranker = reranker.name(), error = %e, "rerank failed, passing candidates through");
                    candidates.truncate(top_k);
                    candidates
                }
            },
            None => {
                candidates.truncate(top_k);
                candidates
            }
        };

        for doc in &docs {
            debug!(preview = %preview(doc, 50), "recalled");
        }
        docs
    }

    /// [`req_docs`](Self::req_docs) joined with [`DOCUMENT_SEPARATOR`].
    pub async fn req(&self, query: &str, top_k: usize) -> String {
        self.req_docs(query, top_k).await.join(DOCUMENT_SEPARATOR)
    }

    pub fn save_state(&self) -> RagState {
        let channels = self
            .channels
            .iter()
            .filter_map(|c| c.save_state().map(|s| (c.name().to_string(), s)))
            .collect();
        RagState {
            id_to_doc: self.id_to_doc.clone(),
            channels,
        }
    }

    /// Replace the corpus with `state` and rebuild every channel from it.
    ///
    /// Ids that are not exactly `0..n` are renumbered in key order.
    pub async fn load_state(&mut self, state: RagState) -> Result<(), MnemoError> {
        let dense_ids = state.id_to_doc.keys().copied().eq(0..state.id_to_doc.len());
        let corpus: BTreeMap<usize, String> = if dense_ids {
            state.id_to_doc
        } else {
            warn!(
                documents = state.id_to_doc.len(),
                "saved corpus ids are not contiguous, renumbering"
            );
            state.id_to_doc.into_values().enumerate().collect()
        };

        for channel in self.channels.iter_mut() {
            let name = channel.name();
            channel.load_state(state.channels.get(name), &corpus).await?;
        }
        self.id_to_doc = corpus;
        Ok(())
    }
}
