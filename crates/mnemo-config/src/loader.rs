// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./mnemo.toml` > `~/.config/mnemo/mnemo.toml` > `/etc/mnemo/mnemo.toml`
//! with environment variable overrides via `MNEMO_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::MnemoConfig;

/// Environment variable consulted when no credential is configured.
pub const API_KEY_ENV: &str = "MNEMO_API_KEY";

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/mnemo/mnemo.toml` (system-wide)
/// 3. `~/.config/mnemo/mnemo.toml` (user XDG config)
/// 4. `./mnemo.toml` (local directory)
/// 5. `MNEMO_*` environment variables
pub fn load_config() -> Result<MnemoConfig, figment::Error> {
    build_figment().extract().map(apply_credential_env)
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<MnemoConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(MnemoConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<MnemoConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(MnemoConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
        .map(apply_credential_env)
}

/// Build the Figment used internally for config loading.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(MnemoConfig::default()))
        .merge(Toml::file("/etc/mnemo/mnemo.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("mnemo/mnemo.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("mnemo.toml"))
        .merge(env_provider())
}

/// Create the environment variable provider.
///
/// Key names contain underscores, so sections are mapped explicitly:
/// `MNEMO_RAG_DENSE_VECTOR_DIM` becomes `rag.dense.vector_dim`. Figment
/// hands the mapper the key in its original case and only lowercases
/// afterwards, so the mapper lowercases first.
fn env_provider() -> Env {
    Env::prefixed("MNEMO_").ignore(&["api_key"]).map(|key| {
        env_key_path(key.as_str()).into()
    })
}

/// Dotted config path for an env key with the `MNEMO_` prefix stripped.
pub(crate) fn env_key_path(key: &str) -> String {
    key.to_ascii_lowercase()
        .replacen("memory_", "memory.", 1)
        .replacen("rag_lexical_", "rag.lexical.", 1)
        .replacen("rag_dense_", "rag.dense.", 1)
        .replacen("rag_rerank_", "rag.rerank.", 1)
        .replacen("dense.embed_params_", "dense.embed_params.", 1)
        .replacen("rerank.params_", "rerank.params.", 1)
}

/// Fill empty credentials from `MNEMO_API_KEY`.
fn apply_credential_env(mut config: MnemoConfig) -> MnemoConfig {
    if let Ok(key) = std::env::var(API_KEY_ENV) {
        let key = key.trim().to_string();
        if !key.is_empty() {
            let params = [
                &mut config.rag.dense.embed_params,
                &mut config.rag.rerank.params,
            ];
            for p in params {
                if p.credential.is_none() {
                    p.credential = Some(key.clone());
                }
            }
        }
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_keys_map_to_nested_paths() {
        assert_eq!(env_key_path("MEMORY_TOP_K"), "memory.top_k");
        assert_eq!(env_key_path("RAG_DENSE_VECTOR_DIM"), "rag.dense.vector_dim");
        assert_eq!(
            env_key_path("RAG_DENSE_EMBED_PARAMS_MODEL_NAME"),
            "rag.dense.embed_params.model_name"
        );
        assert_eq!(
            env_key_path("rag_rerank_params_endpoint"),
            "rag.rerank.params.endpoint"
        );
        assert_eq!(env_key_path("LOG_LEVEL"), "log_level");
    }
}
