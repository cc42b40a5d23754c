// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Mnemo memory engine.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Persistence strategies accepted by `memory.backend`.
pub const STORE_BACKENDS: &[&str] = &["delegating", "indexed-file", "relational"];

/// Embedding and rerank backends accepted by `rag.dense.embed_backend` and
/// `rag.rerank.backend`.
pub const MODEL_BACKENDS: &[&str] = &["local-model", "remote-api"];

/// Tokenizer languages accepted by `rag.lexical.language`.
pub const LANGUAGES: &[&str] = &["zh", "en"];

/// Pooling strategies accepted by `embed_params.pooling`.
pub const POOLING_STRATEGIES: &[&str] = &["cls", "mean"];

/// Top-level Mnemo configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MnemoConfig {
    /// Log level used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Namespace storage and retrieval behavior.
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Recall channel and reranker settings.
    #[serde(default)]
    pub rag: RagConfig,
}

impl Default for MnemoConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            memory: MemoryConfig::default(),
            rag: RagConfig::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Namespace storage and retrieval settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryConfig {
    /// Root directory holding `memory/`, `saves/`, `details/` and `models/`.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Persistence strategy for character and story namespaces.
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Number of memories returned by a search when the caller does not say.
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Deadline for a single search, embedding and index query included.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Hits whose similarity falls below this are left out of the prompt block.
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f32,

    /// Number of character detail segments returned by a details search.
    #[serde(default = "default_details_top_k")]
    pub details_top_k: usize,

    /// Use the batched ndarray flat index, falling back to the scalar index
    /// when it cannot be initialized.
    #[serde(default = "default_accelerated_index")]
    pub accelerated_index: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            backend: default_backend(),
            top_k: default_top_k(),
            timeout_secs: default_timeout_secs(),
            min_similarity: default_min_similarity(),
            details_top_k: default_details_top_k(),
            accelerated_index: default_accelerated_index(),
        }
    }
}

impl MemoryConfig {
    /// Returns the data directory as a path.
    pub fn data_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir)
    }
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_backend() -> String {
    "relational".to_string()
}

fn default_top_k() -> usize {
    5
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_min_similarity() -> f32 {
    0.3
}

fn default_details_top_k() -> usize {
    3
}

fn default_accelerated_index() -> bool {
    true
}

/// Multi-recall settings: which channels run and how results are reranked.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RagConfig {
    #[serde(default)]
    pub lexical: LexicalConfig,

    #[serde(default)]
    pub dense: DenseConfig,

    #[serde(default)]
    pub rerank: RerankConfig,
}

/// BM25 channel settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LexicalConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Tokenizer language: `zh` uses word segmentation, `en` splits on whitespace.
    #[serde(default = "default_language")]
    pub language: String,
}

impl Default for LexicalConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            language: default_language(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_language() -> String {
    "zh".to_string()
}

/// Dense (embedding + ANN) channel settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DenseConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default = "default_model_backend")]
    pub embed_backend: String,

    #[serde(default = "default_embed_params")]
    pub embed_params: ModelParams,

    #[serde(default = "default_vector_dim")]
    pub vector_dim: usize,

    /// Minimum cosine similarity for an ANN neighbor to be expanded.
    #[serde(default = "default_threshold")]
    pub threshold: f32,

    /// Number of random-projection trees built over the corpus.
    #[serde(default = "default_n_trees")]
    pub n_trees: usize,
}

impl Default for DenseConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            embed_backend: default_model_backend(),
            embed_params: default_embed_params(),
            vector_dim: default_vector_dim(),
            threshold: default_threshold(),
            n_trees: default_n_trees(),
        }
    }
}

fn default_model_backend() -> String {
    "remote-api".to_string()
}

fn default_vector_dim() -> usize {
    1024
}

fn default_threshold() -> f32 {
    0.5
}

fn default_n_trees() -> usize {
    10
}

fn default_embed_params() -> ModelParams {
    ModelParams::default()
}

/// Reranker settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RerankConfig {
    /// When disabled, fused candidates are truncated without rescoring.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default = "default_model_backend")]
    pub backend: String,

    #[serde(default = "default_rerank_params")]
    pub params: ModelParams,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            backend: default_model_backend(),
            params: default_rerank_params(),
        }
    }
}

fn default_rerank_params() -> ModelParams {
    ModelParams {
        model_name: "netease-youdao/bce-reranker-base_v1".to_string(),
        ..ModelParams::default()
    }
}

/// Parameters shared by embedding and rerank backends.
///
/// Remote backends read `endpoint`, `credential` and `batch_size`; local
/// backends read `model_path` (or download `model_url`/`tokenizer_url`),
/// `max_input_length` and `pooling`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ModelParams {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Bearer credential. Falls back to `MNEMO_API_KEY` when unset.
    #[serde(default)]
    pub credential: Option<String>,

    #[serde(default = "default_model_name")]
    pub model_name: String,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Token limit applied by local tokenizers.
    #[serde(default = "default_max_input_length")]
    pub max_input_length: usize,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Path to a local ONNX model; `tokenizer.json` is expected beside it.
    #[serde(default)]
    pub model_path: Option<String>,

    #[serde(default)]
    pub model_url: Option<String>,

    #[serde(default)]
    pub tokenizer_url: Option<String>,

    #[serde(default = "default_pooling")]
    pub pooling: String,

    /// Whether the local model takes a `token_type_ids` input.
    #[serde(default)]
    pub token_type_ids: bool,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            credential: None,
            model_name: default_model_name(),
            batch_size: default_batch_size(),
            max_input_length: default_max_input_length(),
            request_timeout_secs: default_request_timeout_secs(),
            model_path: None,
            model_url: None,
            tokenizer_url: None,
            pooling: default_pooling(),
            token_type_ids: false,
        }
    }
}

fn default_endpoint() -> String {
    "https://api.siliconflow.cn/v1".to_string()
}

fn default_model_name() -> String {
    "BAAI/bge-m3".to_string()
}

fn default_batch_size() -> usize {
    32
}

fn default_max_input_length() -> usize {
    512
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_pooling() -> String {
    "cls".to_string()
}
