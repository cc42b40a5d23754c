// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The trait every embedding and rerank backend is built on.

use async_trait::async_trait;

use crate::error::MnemoError;
use crate::types::{AdapterType, HealthStatus};

/// Identity, lifecycle, and health check shared by every adapter.
#[async_trait]
pub trait PluginAdapter: Send + Sync + 'static {
    /// Short name used in logs and `mnemo health`, e.g. `onnx-embedder`.
    fn name(&self) -> &str;

    fn version(&self) -> semver::Version;

    fn adapter_type(&self) -> AdapterType;

    /// Probe the backend. Remote adapters hit their endpoint, local ones
    /// report whether the model session is loaded.
    async fn health_check(&self) -> Result<HealthStatus, MnemoError>;

    /// Release model sessions and HTTP clients.
    async fn shutdown(&self) -> Result<(), MnemoError>;
}
