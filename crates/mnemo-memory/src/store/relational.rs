// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite-backed store: one row per document plus a flat vector index.
//!
//! Rows and vectors are joined on `vector_index`, which stays a bijection
//! with the index positions. Adding a document allocates the slot, writes
//! the row and pushes the vector inside one transaction that also holds the
//! index lock, so a failure on either side leaves neither behind.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, OptionalExtension};
use tokio::sync::RwLock;
use tokio_rusqlite::Connection;
use tracing::{debug, error, info, warn};

use mnemo_config::MnemoConfig;
use mnemo_core::traits::EmbeddingAdapter;
use mnemo_core::MnemoError;

use crate::flat_index::{distance_to_similarity, FlatIndex};
use crate::providers::{embed_documents, embed_query, Providers};
use crate::store::{ensure_dir, read_optional, write_atomic, VectorStore};
use crate::types::{
    preview, ConversationTurn, MemoryMetadata, Namespace, SearchHit, StoreBackend, StoreStats,
    CONVERSATION, PLAIN_TEXT,
};

const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
CREATE TABLE IF NOT EXISTS memory_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    namespace TEXT NOT NULL,
    text TEXT NOT NULL,
    user_message TEXT,
    assistant_message TEXT,
    record_type TEXT NOT NULL DEFAULT 'text',
    timestamp TEXT NOT NULL,
    vector_index INTEGER NOT NULL,
    similarity_score REAL,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);
CREATE INDEX IF NOT EXISTS idx_memory_records_ns_time
    ON memory_records(namespace, timestamp);
CREATE INDEX IF NOT EXISTS idx_memory_records_ns_type
    ON memory_records(namespace, record_type);
CREATE UNIQUE INDEX IF NOT EXISTS idx_memory_records_ns_vector
    ON memory_records(namespace, vector_index);
";

const SELECT_RECORD: &str = "SELECT id, text, user_message, assistant_message, record_type, \
     timestamp, vector_index FROM memory_records";

/// Helper to convert tokio_rusqlite errors into MnemoError::Storage.
fn storage_err(e: tokio_rusqlite::Error) -> MnemoError {
    MnemoError::Storage {
        source: Box::new(e),
    }
}

/// Fixed-width UTC timestamps so that text comparison orders them.
fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(ts: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(ts)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

fn lock_index(index: &Mutex<FlatIndex>) -> MutexGuard<'_, FlatIndex> {
    index.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A row of `memory_records`.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryRecord {
    pub id: i64,
    pub text: String,
    pub user_message: Option<String>,
    pub assistant_message: Option<String>,
    pub record_type: String,
    pub timestamp: String,
    pub vector_index: i64,
}

impl MemoryRecord {
    fn from_row(row: &rusqlite::Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get(0)?,
            text: row.get(1)?,
            user_message: row.get(2)?,
            assistant_message: row.get(3)?,
            record_type: row.get(4)?,
            timestamp: row.get(5)?,
            vector_index: row.get(6)?,
        })
    }

    pub fn metadata(&self) -> MemoryMetadata {
        MemoryMetadata {
            timestamp: parse_ts(&self.timestamp),
            user_message: self.user_message.clone(),
            assistant_message: self.assistant_message.clone(),
            record_type: Some(self.record_type.clone()),
        }
    }

    fn into_turn(self) -> Option<ConversationTurn> {
        Some(ConversationTurn {
            timestamp: parse_ts(&self.timestamp),
            user_message: self.user_message?,
            assistant_message: self.assistant_message?,
        })
    }
}

pub struct RelationalStore {
    namespace: Namespace,
    dir: PathBuf,
    db_path: PathBuf,
    index_path: PathBuf,
    conn: Connection,
    index: Arc<Mutex<FlatIndex>>,
    embedder: Arc<dyn EmbeddingAdapter>,
    embedding_model: String,
    vector_dim: usize,
    accelerated: bool,
    lock: RwLock<()>,
}

impl RelationalStore {
    /// Open (creating if needed) the namespace database and load the vector
    /// index, rebuilding it from rows when it is missing or stale.
    pub async fn open(
        namespace: Namespace,
        config: &MnemoConfig,
        providers: Providers,
    ) -> Result<Self, MnemoError> {
        let dir = namespace.dir(&config.memory.data_path());
        ensure_dir(&dir).await?;
        let db_path = dir.join(format!("{}_memory.db", namespace.id()));
        let index_path = dir.join(format!("{}_vectors.bin", namespace.id()));

        let conn = Connection::open(&db_path)
            .await
            .map_err(MnemoError::storage)?;
        conn.call(|conn| -> Result<(), rusqlite::Error> {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await
        .map_err(storage_err)?;

        let vector_dim = config.rag.dense.vector_dim;
        let accelerated = config.memory.accelerated_index;
        let store = Self {
            namespace,
            dir,
            db_path,
            index_path,
            conn,
            index: Arc::new(Mutex::new(FlatIndex::new(vector_dim, accelerated))),
            embedding_model: providers.embedder.model_name().to_string(),
            embedder: providers.embedder,
            vector_dim,
            accelerated,
            lock: RwLock::new(()),
        };
        if let Err(e) = store.load_from_file().await {
            error!(namespace = %store.namespace, error = %e, "failed to load vector index");
        }
        Ok(store)
    }

    /// Insert a row and its vector atomically, returning `(slot, row id)`.
    async fn insert_record(
        &self,
        text: &str,
        metadata: MemoryMetadata,
        vector: Vec<f32>,
    ) -> Result<(usize, i64), MnemoError> {
        if vector.len() != self.vector_dim {
            return Err(MnemoError::Index(format!(
                "vector has {} dimensions, index expects {}",
                vector.len(),
                self.vector_dim
            )));
        }

        let namespace = self.namespace.id().to_string();
        let text = text.to_string();
        let timestamp = format_ts(metadata.timestamp.unwrap_or_else(Utc::now));
        let record_type = metadata
            .record_type
            .unwrap_or_else(|| PLAIN_TEXT.to_string());
        let user_message = metadata.user_message;
        let assistant_message = metadata.assistant_message;
        let index = Arc::clone(&self.index);

        self.conn
            .call(move |conn| -> Result<(usize, i64), rusqlite::Error> {
                let mut index = lock_index(&index);
                let slot = index.len();

                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT INTO memory_records (namespace, text, user_message, assistant_message, record_type, timestamp, vector_index) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![namespace, text, user_message, assistant_message, record_type, timestamp, slot as i64],
                )?;
                let id = tx.last_insert_rowid();

                index
                    .add(&vector)
                    .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
                if let Err(e) = tx.commit() {
                    index.truncate(slot);
                    return Err(e);
                }
                Ok((slot, id))
            })
            .await
            .map_err(storage_err)
    }

    /// Look up the rows behind index hits and record the returned
    /// similarity on each. Missing rows come back as `None`.
    async fn fetch_hits(
        &self,
        ranked: Vec<(usize, f32)>,
    ) -> Result<Vec<Option<MemoryRecord>>, MnemoError> {
        let namespace = self.namespace.id().to_string();
        self.conn
            .call(move |conn| -> Result<Vec<Option<MemoryRecord>>, rusqlite::Error> {
                let now = format_ts(Utc::now());
                let mut out = Vec::with_capacity(ranked.len());
                for (pos, distance) in ranked {
                    let record = conn
                        .query_row(
                            &format!("{SELECT_RECORD} WHERE namespace = ?1 AND vector_index = ?2"),
                            params![namespace, pos as i64],
                            MemoryRecord::from_row,
                        )
                        .optional()?;
                    if let Some(record) = &record {
                        conn.execute(
                            "UPDATE memory_records SET similarity_score = ?1, updated_at = ?2 WHERE id = ?3",
                            params![f64::from(distance_to_similarity(distance)), now, record.id],
                        )?;
                    }
                    out.push(record);
                }
                Ok(out)
            })
            .await
            .map_err(storage_err)
    }

    /// All rows of this namespace ordered by `vector_index`.
    async fn all_records(&self) -> Result<Vec<MemoryRecord>, MnemoError> {
        let namespace = self.namespace.id().to_string();
        self.conn
            .call(move |conn| -> Result<Vec<MemoryRecord>, rusqlite::Error> {
                let mut stmt = conn.prepare(&format!(
                    "{SELECT_RECORD} WHERE namespace = ?1 ORDER BY vector_index ASC"
                ))?;
                let rows = stmt
                    .query_map(params![namespace], MemoryRecord::from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(storage_err)
    }

    /// Most recent conversation turns, newest first.
    pub async fn recent_conversations(
        &self,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>, MnemoError> {
        let namespace = self.namespace.id().to_string();
        let records = self
            .conn
            .call(move |conn| -> Result<Vec<MemoryRecord>, rusqlite::Error> {
                let mut stmt = conn.prepare(&format!(
                    "{SELECT_RECORD} WHERE namespace = ?1 AND record_type = ?2 \
                     AND user_message IS NOT NULL AND assistant_message IS NOT NULL \
                     ORDER BY timestamp DESC, id DESC LIMIT ?3"
                ))?;
                let rows = stmt
                    .query_map(
                        params![namespace, CONVERSATION, limit as i64],
                        MemoryRecord::from_row,
                    )?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(storage_err)?;
        Ok(records
            .into_iter()
            .filter_map(MemoryRecord::into_turn)
            .collect())
    }

    /// Delete records older than `days` days and compact the vector index so
    /// that positions stay `0..n`. Returns the number of deleted rows.
    pub async fn delete_older_than(&self, days: u32) -> Result<usize, MnemoError> {
        let _guard = self.lock.write().await;
        let cutoff = format_ts(Utc::now() - chrono::Duration::days(i64::from(days)));
        let namespace = self.namespace.id().to_string();
        let index = Arc::clone(&self.index);

        let deleted = self
            .conn
            .call(move |conn| -> Result<usize, rusqlite::Error> {
                let mut index = lock_index(&index);
                let tx = conn.transaction()?;
                let deleted = tx.execute(
                    "DELETE FROM memory_records WHERE namespace = ?1 AND timestamp < ?2",
                    params![namespace, cutoff],
                )?;
                if deleted == 0 {
                    return Ok(0);
                }

                let survivors: Vec<i64> = {
                    let mut stmt = tx.prepare(
                        "SELECT vector_index FROM memory_records WHERE namespace = ?1 ORDER BY vector_index ASC",
                    )?;
                    stmt.query_map(params![namespace], |row| row.get(0))?
                        .collect::<Result<Vec<_>, _>>()?
                };

                let mut compacted = FlatIndex::new(index.dim(), index.is_accelerated());
                for (new_pos, old_pos) in survivors.iter().enumerate() {
                    if new_pos as i64 != *old_pos {
                        tx.execute(
                            "UPDATE memory_records SET vector_index = ?1 WHERE namespace = ?2 AND vector_index = ?3",
                            params![new_pos as i64, namespace, old_pos],
                        )?;
                    }
                    let vector = index
                        .vector(*old_pos as usize)
                        .unwrap_or_else(|| vec![0.0; index.dim()]);
                    compacted
                        .add(&vector)
                        .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
                }
                tx.commit()?;
                *index = compacted;
                Ok(deleted)
            })
            .await
            .map_err(storage_err)?;

        if deleted > 0 {
            info!(namespace = %self.namespace, deleted, days, "old memories deleted");
            self.write_index().await?;
        }
        Ok(deleted)
    }

    async fn write_index(&self) -> Result<(), MnemoError> {
        let bytes = lock_index(&self.index).to_bytes();
        ensure_dir(&self.dir).await?;
        write_atomic(&self.index_path, &bytes).await
    }

    /// Re-embed every row in `vector_index` order and renumber rows whose
    /// position moved.
    async fn rebuild_index(&self, records: Vec<MemoryRecord>) -> Result<FlatIndex, MnemoError> {
        let texts: Vec<String> = records.iter().map(|r| r.text.clone()).collect();
        let vectors = embed_documents(self.embedder.as_ref(), &texts, self.vector_dim).await;

        let mut index = FlatIndex::new(self.vector_dim, self.accelerated);
        for vector in &vectors {
            index.add(vector)?;
        }

        let moves: Vec<(i64, i64)> = records
            .iter()
            .enumerate()
            .filter(|(pos, r)| *pos as i64 != r.vector_index)
            .map(|(pos, r)| (r.id, pos as i64))
            .collect();
        if !moves.is_empty() {
            warn!(namespace = %self.namespace, moved = moves.len(), "renumbering vector positions");
            self.conn
                .call(move |conn| -> Result<(), rusqlite::Error> {
                    let tx = conn.transaction()?;
                    for (id, pos) in moves {
                        tx.execute(
                            "UPDATE memory_records SET vector_index = ?1 WHERE id = ?2",
                            params![pos, id],
                        )?;
                    }
                    tx.commit()
                })
                .await
                .map_err(storage_err)?;
        }
        Ok(index)
    }

    pub fn db_path(&self) -> &PathBuf {
        &self.db_path
    }
}

#[async_trait]
impl VectorStore for RelationalStore {
    fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    fn backend(&self) -> StoreBackend {
        StoreBackend::Relational
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

        let _guard = self.lock.write().await;
        let metadata = metadata.unwrap_or_else(MemoryMetadata::now);
        let (slot, id) = self.insert_record(text, metadata, vector).await?;
        info!(namespace = %self.namespace, id, slot, preview = %preview(text, 50), "memory added");
        Ok(Some(slot))
    }

    async fn query(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>, MnemoError> {
        if lock_index(&self.index).is_empty() {
            return Ok(Vec::new());
        }
        let vector = embed_query(self.embedder.as_ref(), query, self.vector_dim).await?;

        let _guard = self.lock.read().await;
        let ranked = lock_index(&self.index).search(&vector, top_k)?;
        let records = self.fetch_hits(ranked.clone()).await?;

        let mut hits = Vec::with_capacity(ranked.len());
        for ((pos, distance), record) in ranked.into_iter().zip(records) {
            let Some(record) = record else {
                warn!(namespace = %self.namespace, pos, "vector has no record, skipping");
                continue;
            };
            let similarity = distance_to_similarity(distance);
            debug!(pos, similarity, preview = %preview(&record.text, 50), "hit");
            hits.push(SearchHit {
                metadata: Some(record.metadata()),
                record_id: Some(record.id),
                text: record.text,
                distance: Some(distance),
                similarity: Some(similarity),
                vector_index: Some(pos),
            });
        }
        Ok(hits)
    }

    /// Rows are committed as they are added; this persists the vector index.
    async fn save_to_file(&self) -> Result<(), MnemoError> {
        let _guard = self.lock.read().await;
        self.write_index().await?;
        debug!(namespace = %self.namespace, "vector index saved");
        Ok(())
    }

    async fn load_from_file(&self) -> Result<(), MnemoError> {
        let _guard = self.lock.write().await;
        let records = self.all_records().await?;

        let stored = match read_optional(&self.index_path).await? {
            Some(bytes) => match FlatIndex::from_bytes(&bytes, self.accelerated) {
                Ok(index) => Some(index),
                Err(e) => {
                    warn!(namespace = %self.namespace, error = %e, "unreadable vector index");
                    None
                }
            },
            None => None,
        };

        let positions_dense = records
            .iter()
            .enumerate()
            .all(|(pos, r)| r.vector_index == pos as i64);
        let index = match stored {
            Some(index)
                if index.len() == records.len()
                    && index.dim() == self.vector_dim
                    && positions_dense =>
            {
                index
            }
            stored => {
                if !records.is_empty() {
                    warn!(
                        namespace = %self.namespace,
                        records = records.len(),
                        vectors = stored.as_ref().map(FlatIndex::len),
                        "vector index missing or out of sync, rebuilding from records"
                    );
                }
                self.rebuild_index(records).await?
            }
        };

        info!(
            namespace = %self.namespace,
            records = index.len(),
            accelerated = index.is_accelerated(),
            "memory loaded"
        );
        *lock_index(&self.index) = index;
        Ok(())
    }

    async fn get_stats(&self) -> Result<StoreStats, MnemoError> {
        let namespace = self.namespace.id().to_string();
        let (total, conversations, latest) = self
            .conn
            .call(move |conn| -> Result<(u64, u64, Option<String>), rusqlite::Error> {
                conn.query_row(
                    "SELECT COUNT(*), COALESCE(SUM(record_type = ?2), 0), MAX(timestamp) FROM memory_records WHERE namespace = ?1",
                    params![namespace, CONVERSATION],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
            })
            .await
            .map_err(storage_err)?;

        let (vectors, accelerated) = {
            let index = lock_index(&self.index);
            (index.len(), index.is_accelerated())
        };
        Ok(StoreStats {
            namespace: self.namespace.to_string(),
            backend: StoreBackend::Relational,
            embedding_model: self.embedding_model.clone(),
            vector_dim: self.vector_dim,
            total_documents: total as usize,
            total_vectors: Some(vectors),
            total_metadata: None,
            accelerated: Some(accelerated),
            total_records: Some(total),
            conversation_records: Some(conversations),
            latest_record_time: latest.as_deref().and_then(parse_ts),
            files: vec![self.db_path.clone(), self.index_path.clone()],
        })
    }

    async fn conversations(
        &self,
        limit: Option<usize>,
    ) -> Result<Vec<ConversationTurn>, MnemoError> {
        match limit {
            Some(limit) => {
                let mut turns = self.recent_conversations(limit).await?;
                turns.reverse();
                Ok(turns)
            }
            None => Ok(self
                .all_records()
                .await?
                .into_iter()
                .filter(|r| r.record_type == CONVERSATION)
                .filter_map(MemoryRecord::into_turn)
                .collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use mnemo_test_utils::MemoryHarness;

    use super::*;

    async fn open(harness: &MemoryHarness, ns: &Namespace) -> RelationalStore {
        let providers = Providers::new(harness.embedder(), harness.reranker());
        RelationalStore::open(ns.clone(), harness.config(), providers)
            .await
            .unwrap()
    }

    fn harness() -> MemoryHarness {
        MemoryHarness::builder().backend("relational").dim(64).build().unwrap()
    }

    /// Wide enough that the hashed test vectors of distinct words rarely
    /// share a bucket, so nearest-neighbour order follows word overlap.
    fn wide_harness() -> MemoryHarness {
        MemoryHarness::builder().backend("relational").dim(256).build().unwrap()
    }

    #[tokio::test]
    async fn add_and_search_joins_rows() {
        let h = wide_harness();
        let ns = Namespace::character("alice").unwrap();
        let store = open(&h, &ns).await;

        let first = store
            .add_chat_turn("my name is Alex", "nice to meet you, Alex", None)
            .await
            .unwrap();
        let second = store.add_text("rain again today", None).await.unwrap();
        assert_eq!(first, Some(0));
        assert_eq!(second, Some(1));

        let hits = store.search("what is my name", 1, Duration::from_secs(5)).await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].vector_index, Some(0));
        assert!(hits[0].record_id.is_some());
        assert_eq!(
            hits[0].metadata.as_ref().and_then(|m| m.assistant_message.as_deref()),
            Some("nice to meet you, Alex")
        );

        let id = hits[0].record_id.unwrap();
        let score: Option<f64> = store
            .conn
            .call(move |conn| -> Result<Option<f64>, rusqlite::Error> {
                conn.query_row(
                    "SELECT similarity_score FROM memory_records WHERE id = ?1",
                    params![id],
                    |row| row.get(0),
                )
            })
            .await
            .unwrap();
        assert!(score.is_some());
    }

    #[tokio::test]
    async fn missing_row_is_skipped() {
        let h = harness();
        let ns = Namespace::character("gone").unwrap();
        let store = open(&h, &ns).await;
        store.add_text("purple elephant", None).await.unwrap();
        store.add_text("purple elephants", None).await.unwrap();

        store
            .conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute("DELETE FROM memory_records WHERE vector_index = 0", [])?;
                Ok(())
            })
            .await
            .unwrap();

        let hits = store.search("purple elephant", 2, Duration::from_secs(5)).await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "purple elephants");
    }

    #[tokio::test]
    async fn failed_insert_leaves_no_orphan_vector() {
        let h = harness();
        let ns = Namespace::character("orphan").unwrap();
        let store = open(&h, &ns).await;
        store.add_text("first", None).await.unwrap();

        // Occupy the next slot so the row insert violates the unique index.
        store
            .conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute(
                    "INSERT INTO memory_records (namespace, text, record_type, timestamp, vector_index) VALUES ('orphan', 'squatter', 'text', '2026-01-01T00:00:00.000000Z', 1)",
                    [],
                )?;
                Ok(())
            })
            .await
            .unwrap();

        assert!(store.add_text("second", None).await.is_err());
        assert_eq!(lock_index(&store.index).len(), 1);
    }

    #[tokio::test]
    async fn wrong_dimension_is_rejected_before_writing() {
        let h = harness();
        let store = open(&h, &Namespace::character("dim").unwrap()).await;
        let err = store
            .insert_record("x", MemoryMetadata::now(), vec![1.0; 3])
            .await
            .unwrap_err();
        assert!(matches!(err, MnemoError::Index(_)));
        assert_eq!(store.get_stats().await.unwrap().total_records, Some(0));
    }

    #[tokio::test]
    async fn index_is_rebuilt_when_file_is_missing() {
        let h = harness();
        let ns = Namespace::story("s1").unwrap();
        {
            let store = open(&h, &ns).await;
            store.add_text("purple elephant", None).await.unwrap();
            store.add_text("green giraffe", None).await.unwrap();
            store.save_to_file().await.unwrap();
        }
        std::fs::remove_file(h.data_dir().join("saves/s1/s1_vectors.bin")).unwrap();

        let reopened = open(&h, &ns).await;
        let stats = reopened.get_stats().await.unwrap();
        assert_eq!(stats.total_vectors, Some(2));
        let hits = reopened.search("green giraffe", 1, Duration::from_secs(5)).await;
        assert_eq!(hits[0].text, "green giraffe");
    }

    #[tokio::test]
    async fn recent_conversations_newest_first() {
        let h = harness();
        let store = open(&h, &Namespace::character("r").unwrap()).await;
        let base = Utc::now();
        for (i, u) in ["one", "two", "three"].iter().enumerate() {
            store
                .add_chat_turn(u, "ok", Some(base + chrono::Duration::seconds(i as i64)))
                .await
                .unwrap();
        }
        store.add_text("plain note", None).await.unwrap();

        let recent = store.recent_conversations(2).await.unwrap();
        let users: Vec<_> = recent.iter().map(|t| t.user_message.as_str()).collect();
        assert_eq!(users, vec!["three", "two"]);

        let all = store.conversations(None).await.unwrap();
        assert_eq!(all.len(), 3);
        let stats = store.get_stats().await.unwrap();
        assert_eq!(stats.total_records, Some(4));
        assert_eq!(stats.conversation_records, Some(3));
        assert!(stats.latest_record_time.is_some());
    }

    #[tokio::test]
    async fn delete_older_than_compacts_positions() {
        let h = harness();
        let ns = Namespace::character("old").unwrap();
        let store = open(&h, &ns).await;
        let long_ago = Utc::now() - chrono::Duration::days(30);
        store.add_chat_turn("ancient", "history", Some(long_ago)).await.unwrap();
        store.add_chat_turn("fresh", "news", None).await.unwrap();

        assert_eq!(store.delete_older_than(7).await.unwrap(), 1);
        assert_eq!(lock_index(&store.index).len(), 1);

        let hits = store.search("fresh news", 1, Duration::from_secs(5)).await;
        assert_eq!(hits[0].vector_index, Some(0));
        assert!(hits[0].text.contains("fresh"));

        let reopened = open(&h, &ns).await;
        assert_eq!(reopened.get_stats().await.unwrap().total_vectors, Some(1));
    }
}
