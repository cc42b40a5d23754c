// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding adapter trait for vector embedding generation.

use async_trait::async_trait;

use crate::error::MnemoError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{EmbeddingInput, EmbeddingOutput};

/// Turns text into fixed-width float vectors.
#[async_trait]
pub trait EmbeddingAdapter: PluginAdapter {
    /// Name of the underlying embedding model, recorded in persisted state.
    fn model_name(&self) -> &str;

    /// Width of the vectors this adapter produces.
    fn dimensions(&self) -> usize;

    /// Generates one embedding per input text.
    async fn embed(&self, input: EmbeddingInput) -> Result<EmbeddingOutput, MnemoError>;
}
