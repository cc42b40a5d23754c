// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request and response types exchanged with adapters.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Outcome of [`PluginAdapter::health_check`](crate::PluginAdapter::health_check).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    /// Usable, but slow or partially configured.
    Degraded(String),
    Unhealthy(String),
}

/// What an adapter provides.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Embedding,
    Reranker,
    Storage,
}

/// Input to an embedding adapter.
#[derive(Debug, Clone)]
pub struct EmbeddingInput {
    /// Texts to embed, one vector is returned per text in the same order.
    pub texts: Vec<String>,
}

/// Output from an embedding adapter.
#[derive(Debug, Clone)]
pub struct EmbeddingOutput {
    pub embeddings: Vec<Vec<f32>>,
    /// Width of each vector in `embeddings`.
    pub dimensions: usize,
}

/// Input to a rerank adapter.
#[derive(Debug, Clone)]
pub struct RerankInput {
    pub query: String,
    pub documents: Vec<String>,
    /// Maximum number of scored documents to return.
    pub top_n: usize,
}

/// A single document score returned by a rerank adapter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RerankScore {
    /// Position of the document in [`RerankInput::documents`].
    pub index: usize,
    pub relevance_score: f32,
}

/// Output from a rerank adapter. Scores are not guaranteed to be sorted.
#[derive(Debug, Clone, Default)]
pub struct RerankOutput {
    pub results: Vec<RerankScore>,
}
