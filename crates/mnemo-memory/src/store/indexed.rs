// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Store with an explicit flat vector index and parallel text and metadata
//! lists, persisted as three sibling files:
//!
//! - `{ns}_index.bin`: the flat index
//! - `{ns}_texts.json`: the text list
//! - `{ns}_metadata.json`: the metadata list plus a header
//!
//! `index.len() == texts.len() == metadata.len()` holds after every operation.
//! Loading repairs files that disagree instead of refusing to start.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use mnemo_config::MnemoConfig;
use mnemo_core::traits::EmbeddingAdapter;
use mnemo_core::MnemoError;

use crate::flat_index::{distance_to_similarity, FlatIndex};
use crate::providers::{embed_documents, embed_query, Providers};
use crate::store::{ensure_dir, read_optional, write_atomic, VectorStore};
use crate::types::{
    parse_chat_turn, preview, ConversationTurn, MemoryMetadata, Namespace, SearchHit,
    StoreBackend, StoreStats,
};

#[derive(Debug, Serialize, Deserialize)]
struct MetadataFile {
    namespace: String,
    embedding_model: String,
    vector_dim: usize,
    total_texts: usize,
    metadata: Vec<MemoryMetadata>,
    last_updated: DateTime<Utc>,
}

struct IndexedState {
    index: FlatIndex,
    texts: Vec<String>,
    metadata: Vec<MemoryMetadata>,
}

pub struct IndexedFileStore {
    namespace: Namespace,
    dir: PathBuf,
    embedder: Arc<dyn EmbeddingAdapter>,
    embedding_model: String,
    vector_dim: usize,
    accelerated: bool,
    state: RwLock<IndexedState>,
}

impl IndexedFileStore {
    /// Open the store and load existing files. Unreadable files are logged
    /// and the store starts empty.
    pub async fn open(
        namespace: Namespace,
        config: &MnemoConfig,
        providers: Providers,
    ) -> Result<Self, MnemoError> {
        let dir = namespace.dir(&config.memory.data_path());
        ensure_dir(&dir).await?;

        let vector_dim = config.rag.dense.vector_dim;
        let accelerated = config.memory.accelerated_index;
        let store = Self {
            namespace,
            dir,
            embedding_model: providers.embedder.model_name().to_string(),
            embedder: providers.embedder,
            vector_dim,
            accelerated,
            state: RwLock::new(IndexedState {
                index: FlatIndex::new(vector_dim, accelerated),
                texts: Vec::new(),
                metadata: Vec::new(),
            }),
        };
        if let Err(e) = store.load_from_file().await {
            error!(namespace = %store.namespace, error = %e, "failed to load memory, starting empty");
        }
        Ok(store)
    }

    fn file(&self, suffix: &str) -> PathBuf {
        self.dir.join(format!("{}_{suffix}", self.namespace.id()))
    }

    fn index_path(&self) -> PathBuf {
        self.file("index.bin")
    }

    fn texts_path(&self) -> PathBuf {
        self.file("texts.json")
    }

    fn metadata_path(&self) -> PathBuf {
        self.file("metadata.json")
    }

    /// Bring a freshly read index in line with `texts`.
    async fn reconcile_index(&self, index: Option<FlatIndex>, texts: &[String]) -> FlatIndex {
        let mut index = match index {
            Some(index) if index.dim() == self.vector_dim => index,
            Some(index) => {
                warn!(
                    namespace = %self.namespace,
                    stored = index.dim(),
                    configured = self.vector_dim,
                    "vector index dimension changed, re-embedding all texts"
                );
                FlatIndex::new(self.vector_dim, self.accelerated)
            }
            None => FlatIndex::new(self.vector_dim, self.accelerated),
        };

        if index.len() > texts.len() {
            warn!(
                namespace = %self.namespace,
                vectors = index.len(),
                texts = texts.len(),
                "vector index longer than text list, truncating"
            );
            index.truncate(texts.len());
        } else if index.len() < texts.len() {
            let missing = &texts[index.len()..];
            warn!(
                namespace = %self.namespace,
                vectors = index.len(),
                texts = texts.len(),
                "vector index shorter than text list, re-embedding missing texts"
            );
            for vector in embed_documents(self.embedder.as_ref(), missing, self.vector_dim).await {
                if let Err(e) = index.add(&vector) {
                    warn!(namespace = %self.namespace, error = %e, "failed to re-index text");
                }
            }
        }
        index
    }
}

/// Pad or truncate `metadata` to `len` entries, logging any repair.
fn align_metadata(
    namespace: &Namespace,
    mut metadata: Vec<MemoryMetadata>,
    len: usize,
) -> Vec<MemoryMetadata> {
    if metadata.len() != len {
        warn!(
            namespace = %namespace,
            metadata = metadata.len(),
            texts = len,
            "metadata count does not match texts, repairing"
        );
        metadata.resize_with(len, MemoryMetadata::default);
    }
    metadata
}

#[async_trait]
impl VectorStore for IndexedFileStore {
    fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    fn backend(&self) -> StoreBackend {
        StoreBackend::IndexedFile
    }

    async fn add_text(
        &self,
        text: &str,
        metadata: Option<MemoryMetadata>,
    ) -> Result<Option<usize>, MnemoError> {
        if text.trim().is_empty() {
            debug!(namespace = %self.namespace, "skipping blank document");
            return Ok(None);
        }
        let vectors =
            embed_documents(self.embedder.as_ref(), &[text.to_string()], self.vector_dim).await;
        let Some(vector) = vectors.into_iter().next() else {
            return Err(MnemoError::Internal("embedding returned no vector".into()));
        };

        let mut state = self.state.write().await;
        let pos = state.index.add(&vector)?;
        state.texts.push(text.to_string());
        state.metadata.push(metadata.unwrap_or_else(MemoryMetadata::now));
        info!(namespace = %self.namespace, pos, preview = %preview(text, 50), "memory added");
        Ok(Some(pos))
    }

    async fn query(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>, MnemoError> {
        if self.state.read().await.texts.is_empty() {
            return Ok(Vec::new());
        }
        let vector = embed_query(self.embedder.as_ref(), query, self.vector_dim).await?;

        let state = self.state.read().await;
        let ranked = state.index.search(&vector, top_k)?;
        let mut hits = Vec::with_capacity(ranked.len());
        for (pos, distance) in ranked {
            let Some(text) = state.texts.get(pos) else {
                warn!(namespace = %self.namespace, pos, "vector without text, skipping");
                continue;
            };
            let similarity = distance_to_similarity(distance);
            debug!(pos, similarity, preview = %preview(text, 50), "hit");
            hits.push(SearchHit {
                text: text.clone(),
                distance: Some(distance),
                similarity: Some(similarity),
                metadata: state.metadata.get(pos).cloned(),
                record_id: None,
                vector_index: Some(pos),
            });
        }
        Ok(hits)
    }

    async fn save_to_file(&self) -> Result<(), MnemoError> {
        let state = self.state.read().await;
        ensure_dir(&self.dir).await?;

        write_atomic(&self.index_path(), &state.index.to_bytes()).await?;
        let texts = serde_json::to_vec(&state.texts).map_err(MnemoError::storage)?;
        write_atomic(&self.texts_path(), &texts).await?;
        let meta = MetadataFile {
            namespace: self.namespace.id().to_string(),
            embedding_model: self.embedding_model.clone(),
            vector_dim: self.vector_dim,
            total_texts: state.texts.len(),
            metadata: state.metadata.clone(),
            last_updated: Utc::now(),
        };
        let meta = serde_json::to_vec_pretty(&meta).map_err(MnemoError::storage)?;
        write_atomic(&self.metadata_path(), &meta).await?;

        debug!(namespace = %self.namespace, texts = state.texts.len(), "memory saved");
        Ok(())
    }

    async fn load_from_file(&self) -> Result<(), MnemoError> {
        let Some(text_bytes) = read_optional(&self.texts_path()).await? else {
            debug!(namespace = %self.namespace, "no saved memory");
            return Ok(());
        };
        let texts: Vec<String> = serde_json::from_slice(&text_bytes).map_err(|e| {
            MnemoError::Corruption(format!("{}: {e}", self.texts_path().display()))
        })?;

        let metadata = match read_optional(&self.metadata_path()).await? {
            Some(bytes) => match serde_json::from_slice::<MetadataFile>(&bytes) {
                Ok(file) => {
                    if file.embedding_model != self.embedding_model {
                        warn!(
                            namespace = %self.namespace,
                            stored = %file.embedding_model,
                            configured = %self.embedding_model,
                            "embedding model changed since last save"
                        );
                    }
                    file.metadata
                }
                Err(e) => {
                    warn!(namespace = %self.namespace, error = %e, "unreadable metadata file, resetting metadata");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };
        let metadata = align_metadata(&self.namespace, metadata, texts.len());

        let index = match read_optional(&self.index_path()).await? {
            Some(bytes) => match FlatIndex::from_bytes(&bytes, self.accelerated) {
                Ok(index) => Some(index),
                Err(e) => {
                    warn!(namespace = %self.namespace, error = %e, "unreadable vector index, re-embedding");
                    None
                }
            },
            None => None,
        };
        let index = self.reconcile_index(index, &texts).await;

        info!(
            namespace = %self.namespace,
            texts = texts.len(),
            accelerated = index.is_accelerated(),
            "memory loaded"
        );
        *self.state.write().await = IndexedState {
            index,
            texts,
            metadata,
        };
        Ok(())
    }

    async fn get_stats(&self) -> Result<StoreStats, MnemoError> {
        let state = self.state.read().await;
        Ok(StoreStats {
            namespace: self.namespace.to_string(),
            backend: StoreBackend::IndexedFile,
            embedding_model: self.embedding_model.clone(),
            vector_dim: self.vector_dim,
            total_documents: state.texts.len(),
            total_vectors: Some(state.index.len()),
            total_metadata: Some(state.metadata.len()),
            accelerated: Some(state.index.is_accelerated()),
            total_records: None,
            conversation_records: Some(
                state.metadata.iter().filter(|m| m.is_conversation()).count() as u64,
            ),
            latest_record_time: state.metadata.iter().filter_map(|m| m.timestamp).max(),
            files: vec![self.index_path(), self.texts_path(), self.metadata_path()],
        })
    }

    async fn conversations(
        &self,
        limit: Option<usize>,
    ) -> Result<Vec<ConversationTurn>, MnemoError> {
        let state = self.state.read().await;
        let mut turns: Vec<ConversationTurn> = state
            .texts
            .iter()
            .zip(&state.metadata)
            .filter_map(|(text, meta)| {
                let (user_message, assistant_message) =
                    match (&meta.user_message, &meta.assistant_message) {
                        (Some(u), Some(a)) if meta.is_conversation() => (u.clone(), a.clone()),
                        _ => parse_chat_turn(text)?,
                    };
                Some(ConversationTurn {
                    user_message,
                    assistant_message,
                    timestamp: meta.timestamp,
                })
            })
            .collect();
        if let Some(limit) = limit {
            let skip = turns.len().saturating_sub(limit);
            turns.drain(..skip);
        }
        Ok(turns)
    }
}
