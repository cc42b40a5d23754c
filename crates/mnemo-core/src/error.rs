// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Mnemo memory engine.

use thiserror::Error;

/// The error type used across all Mnemo adapter traits and engine operations.
#[derive(Debug, Error)]
pub enum MnemoError {
    /// Invalid or unsupported configuration (unknown backend selector, bad
    /// namespace id, missing model files). Raised at construction time.
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database, filesystem, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Embedding provider failure (transport, inference, response shape).
    #[error("embedding error: {message}")]
    Embedding {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Reranker failure (transport, inference, response shape).
    #[error("rerank error: {message}")]
    Rerank {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Vector index misuse, such as a dimension mismatch or a query issued
    /// against an index that has not been built.
    #[error("index error: {0}")]
    Index(String),

    /// Persisted state that does not agree with itself.
    #[error("corrupt persisted state: {0}")]
    Corruption(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl MnemoError {
    /// Returns true for failures that retrieval recovers from by degrading to
    /// partial or empty results.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            MnemoError::Embedding { .. } | MnemoError::Rerank { .. } | MnemoError::Timeout { .. }
        )
    }

    /// Wraps any IO or serialization error as a storage error.
    pub fn storage<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        MnemoError::Storage {
            source: Box::new(err),
        }
    }
}
