// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rerank adapter trait for query-document relevance scoring.

use async_trait::async_trait;

use crate::error::MnemoError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{RerankInput, RerankOutput};

/// Scores a small candidate set against a query with full query-document
/// interaction (cross-encoder style).
#[async_trait]
pub trait RerankAdapter: PluginAdapter {
    async fn rerank(&self, input: RerankInput) -> Result<RerankOutput, MnemoError>;
}
