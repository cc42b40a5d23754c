// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Checks the constraints serde cannot express: selector values drawn from a
//! fixed set, positive sizes, and similarity ranges.

use crate::diagnostic::{suggest_key, ConfigError};
use crate::model::{MnemoConfig, LANGUAGES, MODEL_BACKENDS, POOLING_STRATEGIES, STORE_BACKENDS};

/// Validate a deserialized configuration for semantic correctness.
///
/// Collects every failure instead of stopping at the first.
pub fn validate_config(config: &MnemoConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    check_choice(&mut errors, "memory.backend", &config.memory.backend, STORE_BACKENDS);
    check_choice(&mut errors, "rag.lexical.language", &config.rag.lexical.language, LANGUAGES);
    check_choice(
        &mut errors,
        "rag.dense.embed_backend",
        &config.rag.dense.embed_backend,
        MODEL_BACKENDS,
    );
    check_choice(
        &mut errors,
        "rag.dense.embed_params.pooling",
        &config.rag.dense.embed_params.pooling,
        POOLING_STRATEGIES,
    );
    if config.rag.rerank.enabled {
        check_choice(&mut errors, "rag.rerank.backend", &config.rag.rerank.backend, MODEL_BACKENDS);
    }

    if config.memory.data_dir.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "memory.data_dir must not be empty".to_string(),
        });
    }

    if config.memory.top_k == 0 {
        errors.push(ConfigError::Validation {
            message: "memory.top_k must be at least 1".to_string(),
        });
    }

    if config.memory.timeout_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "memory.timeout_secs must be at least 1".to_string(),
        });
    }

    if !(0.0..=1.0).contains(&config.memory.min_similarity) {
        errors.push(ConfigError::Validation {
            message: format!(
                "memory.min_similarity must be between 0.0 and 1.0, got {}",
                config.memory.min_similarity
            ),
        });
    }

    if !config.rag.lexical.enabled && !config.rag.dense.enabled {
        errors.push(ConfigError::Validation {
            message: "at least one of rag.lexical and rag.dense must be enabled".to_string(),
        });
    }

    if config.rag.dense.vector_dim == 0 {
        errors.push(ConfigError::Validation {
            message: "rag.dense.vector_dim must be at least 1".to_string(),
        });
    }

    if !(-1.0..=1.0).contains(&config.rag.dense.threshold) {
        errors.push(ConfigError::Validation {
            message: format!(
                "rag.dense.threshold must be a cosine similarity in [-1.0, 1.0], got {}",
                config.rag.dense.threshold
            ),
        });
    }

    if config.rag.dense.n_trees == 0 {
        errors.push(ConfigError::Validation {
            message: "rag.dense.n_trees must be at least 1".to_string(),
        });
    }

    for (section, params) in [
        ("rag.dense.embed_params", &config.rag.dense.embed_params),
        ("rag.rerank.params", &config.rag.rerank.params),
    ] {
        if params.batch_size == 0 {
            errors.push(ConfigError::Validation {
                message: format!("{section}.batch_size must be at least 1"),
            });
        }
        if params.max_input_length == 0 {
            errors.push(ConfigError::Validation {
                message: format!("{section}.max_input_length must be at least 1"),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_choice(errors: &mut Vec<ConfigError>, key: &str, value: &str, choices: &[&str]) {
    if !choices.contains(&value) {
        errors.push(ConfigError::UnsupportedValue {
            key: key.to_string(),
            value: value.to_string(),
            suggestion: suggest_key(value, choices),
            choices: choices.join(", "),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&MnemoConfig::default()).is_ok());
    }

    #[test]
    fn collects_every_error() {
        let mut config = MnemoConfig::default();
        config.memory.backend = "faiss".to_string();
        config.memory.top_k = 0;
        config.rag.dense.vector_dim = 0;

        let errors = validate_config(&config).expect_err("should fail");
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn unknown_selector_gets_suggestion() {
        let mut config = MnemoConfig::default();
        config.rag.dense.embed_backend = "remote_api".to_string();

        let errors = validate_config(&config).expect_err("should fail");
        match &errors[0] {
            ConfigError::UnsupportedValue { key, suggestion, .. } => {
                assert_eq!(key, "rag.dense.embed_backend");
                assert_eq!(suggestion.as_deref(), Some("remote-api"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn disabled_reranker_backend_is_not_checked() {
        let mut config = MnemoConfig::default();
        config.rag.rerank.enabled = false;
        config.rag.rerank.backend = "anything".to_string();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn both_channels_disabled_is_rejected() {
        let mut config = MnemoConfig::default();
        config.rag.lexical.enabled = false;
        config.rag.dense.enabled = false;
        assert!(validate_config(&config).is_err());
    }
}
