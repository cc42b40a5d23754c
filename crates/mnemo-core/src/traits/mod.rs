// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Backend traits. Embedders and rerankers are held as trait objects, so
//! every trait here is `#[async_trait]` and extends [`PluginAdapter`].

pub mod adapter;
pub mod embedding;
pub mod rerank;

pub use adapter::PluginAdapter;
pub use embedding::EmbeddingAdapter;
pub use rerank::RerankAdapter;
