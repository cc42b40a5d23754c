// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Store backed directly by the multi-recall orchestrator.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use mnemo_config::MnemoConfig;
use mnemo_core::MnemoError;

use crate::orchestrator::{MultiRecall, RagState};
use crate::providers::Providers;
use crate::store::{ensure_dir, read_optional, write_atomic, VectorStore};
use crate::types::{
    parse_chat_turn, preview, ConversationTurn, MemoryMetadata, Namespace, NamespaceKind,
    SearchHit, StoreBackend, StoreStats,
};

/// On-disk form of a delegating store.
#[derive(Debug, Serialize, Deserialize)]
struct SavedMemory {
    namespace: String,
    embedding_model: String,
    rag: RagState,
    last_updated: DateTime<Utc>,
}

/// Persists only the orchestrator's corpus; recall indexes are rebuilt on
/// load. Metadata passed to `add_text` is not kept.
///
/// Hits carry no similarity, so `min_similarity` never filters them. The
/// lexical channel pads its results with zero-score documents, and without a
/// reranker those reach `get_relevant_memory` even for unrelated queries.
pub struct DelegatingStore {
    namespace: Namespace,
    dir: PathBuf,
    path: PathBuf,
    embedding_model: String,
    vector_dim: usize,
    rag: RwLock<MultiRecall>,
}

impl DelegatingStore {
    /// File holding `namespace`: `{id}_memory.json` in the namespace
    /// directory, or `details/{id}.json` for detail stores.
    pub fn file_path(namespace: &Namespace, data_dir: &Path) -> PathBuf {
        let dir = namespace.dir(data_dir);
        match namespace.kind() {
            NamespaceKind::Details => dir.join(format!("{}.json", namespace.id())),
            _ => dir.join(format!("{}_memory.json", namespace.id())),
        }
    }

    /// Build the orchestrator and load any saved corpus. An unreadable file
    /// is logged and the store starts empty.
    pub async fn open(
        namespace: Namespace,
        config: &MnemoConfig,
        providers: Providers,
    ) -> Result<Self, MnemoError> {
        let rag = MultiRecall::from_config(&config.rag, &providers)?;
        let data_dir = config.memory.data_path();
        let dir = namespace.dir(&data_dir);
        ensure_dir(&dir).await?;

        let store = Self {
            path: Self::file_path(&namespace, &data_dir),
            dir,
            embedding_model: providers.embedder.model_name().to_string(),
            vector_dim: config.rag.dense.vector_dim,
            namespace,
            rag: RwLock::new(rag),
        };
        if let Err(e) = store.load_from_file().await {
            error!(namespace = %store.namespace, error = %e, "failed to load memory, starting empty");
        }
        Ok(store)
    }
}

#[async_trait]
impl VectorStore for DelegatingStore {
    fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    fn backend(&self) -> StoreBackend {
        StoreBackend::Delegating
    }

    async fn add_text(
        &self,
        text: &str,
        _metadata: Option<MemoryMetadata>,
    ) -> Result<Option<usize>, MnemoError> {
        if text.trim().is_empty() {
            debug!(namespace = %self.namespace, "skipping blank document");
            return Ok(None);
        }
        let id = self.rag.write().await.add(text).await;
        info!(namespace = %self.namespace, id, preview = %preview(text, 50), "memory added");
        Ok(Some(id))
    }

    /// Unscored hits in orchestrator order.
    async fn query(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>, MnemoError> {
        let docs = self.rag.read().await.req_docs(query, top_k).await;
        Ok(docs.into_iter().map(SearchHit::text).collect())
    }

    async fn save_to_file(&self) -> Result<(), MnemoError> {
        let saved = SavedMemory {
            namespace: self.namespace.id().to_string(),
            embedding_model: self.embedding_model.clone(),
            rag: self.rag.read().await.save_state(),
            last_updated: Utc::now(),
        };
        let bytes = serde_json::to_vec_pretty(&saved).map_err(MnemoError::storage)?;
        ensure_dir(&self.dir).await?;
        write_atomic(&self.path, &bytes).await?;
        debug!(namespace = %self.namespace, path = %self.path.display(), "memory saved");
        Ok(())
    }

    async fn load_from_file(&self) -> Result<(), MnemoError> {
        let Some(bytes) = read_optional(&self.path).await? else {
            debug!(namespace = %self.namespace, "no saved memory");
            return Ok(());
        };
        let saved: SavedMemory = serde_json::from_slice(&bytes).map_err(|e| {
            MnemoError::Corruption(format!("{}: {e}", self.path.display()))
        })?;
        let documents = saved.rag.id_to_doc.len();
        self.rag.write().await.load_state(saved.rag).await?;
        info!(
            namespace = %self.namespace,
            documents,
            embedding_model = %saved.embedding_model,
            "memory loaded"
        );
        Ok(())
    }

    async fn get_stats(&self) -> Result<StoreStats, MnemoError> {
        Ok(StoreStats {
            namespace: self.namespace.to_string(),
            backend: StoreBackend::Delegating,
            embedding_model: self.embedding_model.clone(),
            vector_dim: self.vector_dim,
            total_documents: self.rag.read().await.len(),
            total_vectors: None,
            total_metadata: None,
            accelerated: None,
            total_records: None,
            conversation_records: None,
            latest_record_time: None,
            files: vec![self.path.clone()],
        })
    }

    async fn conversations(
        &self,
        limit: Option<usize>,
    ) -> Result<Vec<ConversationTurn>, MnemoError> {
        let rag = self.rag.read().await;
        let mut turns: Vec<ConversationTurn> = rag
            .documents()
            .values()
            .filter_map(|text| parse_chat_turn(text))
            .map(|(user_message, assistant_message)| ConversationTurn {
                user_message,
                assistant_message,
                timestamp: None,
            })
            .collect();
        if let Some(limit) = limit {
            let skip = turns.len().saturating_sub(limit);
            turns.drain(..skip);
        }
        Ok(turns)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use mnemo_test_utils::MemoryHarness;

    use super::*;

    async fn open(harness: &MemoryHarness, ns: Namespace) -> DelegatingStore {
        let providers = Providers::new(harness.embedder(), harness.reranker());
        DelegatingStore::open(ns, harness.config(), providers).await.unwrap()
    }

    #[test]
    fn file_layout() {
        let root = Path::new("/data");
        assert_eq!(
            DelegatingStore::file_path(&Namespace::character("alice").unwrap(), root),
            PathBuf::from("/data/memory/alice/alice_memory.json")
        );
        assert_eq!(
            DelegatingStore::file_path(&Namespace::details("alice").unwrap(), root),
            PathBuf::from("/data/details/alice.json")
        );
    }

    #[tokio::test]
    async fn unscored_hits_ignore_min_similarity() {
        let harness = MemoryHarness::builder()
            .backend("delegating")
            .dim(64)
            .without_reranker()
            .build()
            .unwrap();
        let store = open(&harness, Namespace::character("pad").unwrap()).await;
        store.add_text("the lighthouse is red", None).await.unwrap();

        let hits = store.search("quantum chess", 1, Duration::from_secs(5)).await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].similarity, None);

        let block = store
            .get_relevant_memory("quantum chess", 1, Duration::from_secs(5), 0.99)
            .await;
        assert!(block.contains("lighthouse"));
    }

    #[tokio::test]
    async fn save_and_reload_keeps_corpus() {
        let harness = MemoryHarness::builder().backend("delegating").dim(64).build().unwrap();
        let ns = Namespace::story("s1").unwrap();

        let store = open(&harness, ns.clone()).await;
        store.add_chat_turn("my name is Alex", "nice to meet you, Alex", None).await.unwrap();
        assert_eq!(store.add_text("   ", None).await.unwrap(), None);
        store.save_to_file().await.unwrap();

        let json: serde_json::Value = serde_json::from_slice(
            &std::fs::read(harness.data_dir().join("saves/s1/s1_memory.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(json["namespace"], "s1");
        assert_eq!(json["embedding_model"], "hash-bow");
        assert!(json["last_updated"].is_string());

        let reopened = open(&harness, ns).await;
        assert_eq!(reopened.get_stats().await.unwrap().total_documents, 1);
        let turns = reopened.conversations(None).await.unwrap();
        assert_eq!(turns[0].user_message, "my name is Alex");

        let hits = reopened.search("Alex", 3, Duration::from_secs(5)).await;
        assert_eq!(hits.len(), 1);
        assert!(hits[0].similarity.is_none());
    }

    #[tokio::test]
    async fn corrupt_file_starts_empty() {
        let harness = MemoryHarness::builder().backend("delegating").build().unwrap();
        let ns = Namespace::character("bob").unwrap();
        let path = DelegatingStore::file_path(&ns, harness.data_dir());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"{not json").unwrap();

        let store = open(&harness, ns).await;
        assert_eq!(store.get_stats().await.unwrap().total_documents, 0);
        assert!(matches!(store.load_from_file().await, Err(MnemoError::Corruption(_))));
    }
}
