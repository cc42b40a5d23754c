// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Mnemo integration tests.
//!
//! Provides deterministic adapters and a temp-dir harness so memory tests
//! run without model files or network access.
//!
//! # Components
//!
//! - [`HashEmbedder`] - hashed bag-of-words embeddings with optional latency and failure
//! - [`OverlapReranker`] - term-overlap reranker
//! - [`FailingReranker`] - reranker whose every call fails
//! - [`MemoryHarness`] - temp data directory plus a config wired for the mocks

pub mod harness;
pub mod mock_embedder;
pub mod mock_reranker;

pub use harness::{MemoryHarness, MemoryHarnessBuilder};
pub use mock_embedder::HashEmbedder;
pub use mock_reranker::{FailingReranker, OverlapReranker};

/// Lowercased alphanumeric words of `text`.
pub fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn words_strip_punctuation() {
        assert_eq!(words("A cat, sat!"), vec!["a", "cat", "sat"]);
        assert!(words("  ...  ").is_empty());
    }
}
