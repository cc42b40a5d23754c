// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Mnemo memory engine.
//!
//! Holds the error type shared by every crate in the workspace, the adapter
//! traits that embedding and rerank backends implement, and the request and
//! response types exchanged across those traits.

pub mod error;
pub mod traits;
pub mod types;

pub use error::MnemoError;
pub use types::{AdapterType, HealthStatus};

pub use traits::{EmbeddingAdapter, PluginAdapter, RerankAdapter};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_type_round_trips_through_strings() {
        use std::str::FromStr;

        for variant in [AdapterType::Embedding, AdapterType::Reranker, AdapterType::Storage] {
            let s = variant.to_string();
            let parsed = AdapterType::from_str(&s).expect("should parse back");
            assert_eq!(variant, parsed);
        }
    }

    #[test]
    fn adapter_type_serialization() {
        let json = serde_json::to_string(&AdapterType::Reranker).expect("should serialize");
        let parsed: AdapterType = serde_json::from_str(&json).expect("should deserialize");
        assert_eq!(parsed, AdapterType::Reranker);
    }

    #[test]
    fn transient_errors_are_classified() {
        let embed = MnemoError::Embedding {
            message: "connection reset".into(),
            source: None,
        };
        let rerank = MnemoError::Rerank {
            message: "502".into(),
            source: None,
        };
        let timeout = MnemoError::Timeout {
            duration: std::time::Duration::from_secs(10),
        };
        assert!(embed.is_transient());
        assert!(rerank.is_transient());
        assert!(timeout.is_transient());

        assert!(!MnemoError::Config("bad backend".into()).is_transient());
        assert!(!MnemoError::Corruption("short metadata".into()).is_transient());
        assert!(!MnemoError::Index("dimension mismatch".into()).is_transient());
    }

    #[test]
    fn all_traits_are_exported() {
        fn _assert_plugin_adapter<T: PluginAdapter>() {}
        fn _assert_embedding_adapter<T: EmbeddingAdapter>() {}
        fn _assert_rerank_adapter<T: RerankAdapter>() {}
    }
}
