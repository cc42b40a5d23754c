// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Hybrid multi-recall memory engine.
//!
//! Documents are recalled through independent channels, fused, deduplicated
//! and reranked, then kept durable by one of several vector store backends
//! behind a common facade.
//!
//! ## Architecture
//!
//! - **LexicalRetriever**: BM25 over a tokenized corpus (jieba for `zh`)
//! - **DenseRetriever**: embeddings in a random-projection ANN index with
//!   context-window expansion
//! - **Reranker**: cross-encoder pass over the fused candidates
//! - **MultiRecall**: owns the corpus and drives the channels
//! - **VectorStore**: delegating, indexed-file and relational backends
//! - **MemoryService**: namespace registry, dual search, character details
//!   and backend migration
//! - **Providers**: local ONNX or remote HTTP embedding and rerank backends

pub mod ann;
pub mod channel;
pub mod cross_encoder;
pub mod dense;
pub mod details;
pub mod embedder;
pub mod flat_index;
pub mod lexical;
pub mod model_manager;
pub mod orchestrator;
pub mod providers;
pub mod remote;
pub mod reranker;
pub mod service;
pub mod store;
pub mod types;

pub use channel::RecallChannel;
pub use cross_encoder::OnnxReranker;
pub use dense::DenseRetriever;
pub use embedder::OnnxEmbedder;
pub use lexical::LexicalRetriever;
pub use model_manager::ModelManager;
pub use orchestrator::{MultiRecall, RagState};
pub use providers::Providers;
pub use remote::{RemoteEmbedder, RemoteReranker};
pub use reranker::Reranker;
pub use service::MemoryService;
pub use store::{
    open_store, open_store_with, DelegatingStore, IndexedFileStore, RelationalStore, VectorStore,
};
pub use types::*;
