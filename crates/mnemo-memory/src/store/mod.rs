// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Vector store facades.
//!
//! Every backend turns conversation turns into documents, keeps its files
//! under the namespace directory, bounds searches with a deadline and formats
//! hits into a prompt block. They differ in what is durable:
//!
//! - [`DelegatingStore`]: only the multi-recall corpus.
//! - [`IndexedFileStore`]: a flat vector index plus parallel text and
//!   metadata files.
//! - [`RelationalStore`]: one SQLite row per document plus a flat vector
//!   index, joined on `vector_index`.

pub mod delegating;
pub mod indexed;
pub mod relational;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, error, warn};

use mnemo_config::MnemoConfig;
use mnemo_core::MnemoError;

use crate::providers::Providers;
use crate::types::{
    format_chat_turn, parse_selector, preview, ConversationTurn, MemoryMetadata, Namespace,
    SearchHit, StoreBackend, StoreStats,
};

pub use delegating::DelegatingStore;
pub use indexed::IndexedFileStore;
pub use relational::RelationalStore;

/// Header line of the block returned by [`VectorStore::get_relevant_memory`].
pub const MEMORY_BLOCK_HEADER: &str = "Here are related memories for reference:";

/// Closing line of the block returned by [`VectorStore::get_relevant_memory`].
pub const MEMORY_BLOCK_FOOTER: &str =
    "Refer to the history above to keep the conversation coherent and consistent.";

/// The operation set shared by every persistence strategy.
///
/// Writes take the store's write lock and are serialized; searches share the
/// read lock. `search` never fails: errors and expired deadlines are logged
/// and produce an empty list.
#[async_trait]
pub trait VectorStore: Send + Sync {
    fn namespace(&self) -> &Namespace;

    fn backend(&self) -> StoreBackend;

    /// Add one document. Blank text is skipped and returns `Ok(None)`;
    /// otherwise the document's position is returned.
    async fn add_text(
        &self,
        text: &str,
        metadata: Option<MemoryMetadata>,
    ) -> Result<Option<usize>, MnemoError>;

    /// Add a user/assistant exchange as `"user: {u}\nassistant: {a}"`.
    async fn add_chat_turn(
        &self,
        user_message: &str,
        assistant_message: &str,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<Option<usize>, MnemoError> {
        let timestamp = timestamp.unwrap_or_else(Utc::now);
        let text = format_chat_turn(user_message, assistant_message);
        let metadata = MemoryMetadata::conversation(user_message, assistant_message, timestamp);
        self.add_text(&text, Some(metadata)).await
    }

    /// Search without a deadline. Errors propagate.
    async fn query(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>, MnemoError>;

    /// Search bounded by `timeout`, covering query embedding and index lookup.
    ///
    /// Dropping the in-flight query on expiry cancels local inference and
    /// aborts remote requests.
    async fn search(&self, query: &str, top_k: usize, timeout: Duration) -> Vec<SearchHit> {
        let outcome = tokio::time::timeout(timeout, self.query(query, top_k))
            .await
            .unwrap_or(Err(MnemoError::Timeout { duration: timeout }));
        match outcome {
            Ok(hits) => {
                debug!(
                    namespace = %self.namespace(),
                    query = %preview(query, 50),
                    hits = hits.len(),
                    "search complete"
                );
                hits
            }
            Err(e) if e.is_transient() => {
                warn!(namespace = %self.namespace(), error = %e, "search degraded to no results");
                Vec::new()
            }
            Err(e) => {
                error!(namespace = %self.namespace(), error = %e, "search failed");
                Vec::new()
            }
        }
    }

    /// Prompt-ready block of hits clearing `min_similarity`, or `""`.
    async fn get_relevant_memory(
        &self,
        query: &str,
        top_k: usize,
        timeout: Duration,
        min_similarity: f32,
    ) -> String {
        let hits = self.search(query, top_k, timeout).await;
        let texts: Vec<&str> = hits
            .iter()
            .filter(|h| h.passes(min_similarity))
            .map(|h| h.text.as_str())
            .collect();
        format_memory_block(&texts)
    }

    async fn save_to_file(&self) -> Result<(), MnemoError>;

    /// Replace in-memory state with what is on disk. A namespace with no
    /// files loads as empty.
    async fn load_from_file(&self) -> Result<(), MnemoError>;

    async fn get_stats(&self) -> Result<StoreStats, MnemoError>;

    /// Stored conversation turns, oldest first, or the most recent `limit`.
    async fn conversations(
        &self,
        limit: Option<usize>,
    ) -> Result<Vec<ConversationTurn>, MnemoError>;
}

/// Wrap texts in the memory prompt block. No texts gives `""`.
pub fn format_memory_block(texts: &[&str]) -> String {
    if texts.is_empty() {
        return String::new();
    }
    format!(
        "{MEMORY_BLOCK_HEADER}\n```\n{}\n```\n{MEMORY_BLOCK_FOOTER}",
        texts.join("\n")
    )
}

/// Open the store configured by `memory.backend` for `namespace`.
///
/// Selectors are parsed and providers built before any directory is
/// created, so an invalid configuration leaves the disk untouched.
pub async fn open_store(
    namespace: Namespace,
    config: &MnemoConfig,
) -> Result<Arc<dyn VectorStore>, MnemoError> {
    let backend: StoreBackend = parse_selector("memory.backend", &config.memory.backend)?;
    let providers = Providers::from_config(&config.rag, &config.memory.data_path()).await?;
    open_store_with(backend, namespace, config, providers).await
}

/// Open a store of an explicit backend with ready providers.
pub async fn open_store_with(
    backend: StoreBackend,
    namespace: Namespace,
    config: &MnemoConfig,
    providers: Providers,
) -> Result<Arc<dyn VectorStore>, MnemoError> {
    let store: Arc<dyn VectorStore> = match backend {
        StoreBackend::Delegating => {
            Arc::new(DelegatingStore::open(namespace, config, providers).await?)
        }
        StoreBackend::IndexedFile => {
            Arc::new(IndexedFileStore::open(namespace, config, providers).await?)
        }
        StoreBackend::Relational => {
            Arc::new(RelationalStore::open(namespace, config, providers).await?)
        }
    };
    Ok(store)
}

/// Read a file, treating a missing file as `None`.
pub(crate) async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, MnemoError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(MnemoError::storage(e)),
    }
}

/// Write through a sibling temp file and rename, so readers never observe a
/// half-written file.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), MnemoError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    tokio::fs::write(&tmp, bytes)
        .await
        .map_err(MnemoError::storage)?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(MnemoError::storage)
}

pub(crate) async fn ensure_dir(path: &Path) -> Result<(), MnemoError> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(MnemoError::storage)
}
