// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Memory domain types shared by the recall channels and the vector stores.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use mnemo_core::MnemoError;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Persistence strategy of a vector store.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum StoreBackend {
    /// Thin wrapper over the multi-recall orchestrator; only the corpus is durable.
    Delegating,
    /// Flat vector index plus parallel text and metadata files.
    IndexedFile,
    /// One SQLite row per document plus a flat vector index.
    Relational,
}

/// Where embeddings and rerank scores are computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum ModelBackend {
    LocalModel,
    RemoteApi,
}

/// Tokenizer language for the lexical channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Language {
    /// Dictionary word segmentation.
    Zh,
    /// Whitespace split.
    En,
}

/// How token embeddings are reduced to one sentence vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Pooling {
    Cls,
    Mean,
}

/// Parse a configuration selector, reporting unknown values as configuration
/// errors.
pub fn parse_selector<T: FromStr>(key: &str, value: &str) -> Result<T, MnemoError> {
    T::from_str(value)
        .map_err(|_| MnemoError::Config(format!("unsupported value `{value}` for `{key}`")))
}

/// What a namespace holds, which decides where it lives on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamespaceKind {
    Character,
    Story,
    Details,
}

/// Isolation unit for memory: one character, one story, or one character's
/// reference details.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Namespace {
    kind: NamespaceKind,
    id: String,
}

impl Namespace {
    pub fn character(id: &str) -> Result<Self, MnemoError> {
        Self::new(NamespaceKind::Character, id)
    }

    pub fn story(id: &str) -> Result<Self, MnemoError> {
        Self::new(NamespaceKind::Story, id)
    }

    pub fn details(id: &str) -> Result<Self, MnemoError> {
        Self::new(NamespaceKind::Details, id)
    }

    /// Builds a namespace after checking that `id` is usable as a file name.
    pub fn new(kind: NamespaceKind, id: &str) -> Result<Self, MnemoError> {
        let id = id.trim();
        if id.is_empty() {
            return Err(MnemoError::Config("namespace id must not be empty".into()));
        }
        if id == "." || id == ".." || id.contains(['/', '\\', '\0']) {
            return Err(MnemoError::Config(format!(
                "namespace id `{id}` must not contain path separators"
            )));
        }
        Ok(Self {
            kind,
            id: id.to_string(),
        })
    }

    pub fn kind(&self) -> NamespaceKind {
        self.kind
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Directory holding this namespace's files under `data_dir`.
    ///
    /// Characters live in `memory/{id}`, stories in `saves/{id}`, and all
    /// detail stores share `details/`.
    pub fn dir(&self, data_dir: &Path) -> PathBuf {
        match self.kind {
            NamespaceKind::Character => data_dir.join("memory").join(&self.id),
            NamespaceKind::Story => data_dir.join("saves").join(&self.id),
            NamespaceKind::Details => data_dir.join("details"),
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            NamespaceKind::Character => "character",
            NamespaceKind::Story => "story",
            NamespaceKind::Details => "details",
        };
        write!(f, "{kind}:{}", self.id)
    }
}

/// Record type for conversation turns.
pub const CONVERSATION: &str = "conversation";

/// Record type for documents added without a type.
pub const PLAIN_TEXT: &str = "text";

/// Structured metadata stored alongside each document by the indexed-file and
/// relational backends.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assistant_message: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub record_type: Option<String>,
}

impl MemoryMetadata {
    /// Metadata carrying only the current time.
    pub fn now() -> Self {
        Self {
            timestamp: Some(Utc::now()),
            ..Self::default()
        }
    }

    /// Metadata for one user/assistant exchange.
    pub fn conversation(user: &str, assistant: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp: Some(timestamp),
            user_message: Some(user.to_string()),
            assistant_message: Some(assistant.to_string()),
            record_type: Some(CONVERSATION.to_string()),
        }
    }

    pub fn is_conversation(&self) -> bool {
        self.record_type.as_deref() == Some(CONVERSATION)
    }
}

/// One user/assistant exchange as recovered from a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub user_message: String,
    pub assistant_message: String,
    pub timestamp: Option<DateTime<Utc>>,
}

/// A search result returned by a vector store.
///
/// `distance` and `similarity` are present for backends that score against
/// their own flat index; reranked delegating results carry neither.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub text: String,
    pub distance: Option<f32>,
    pub similarity: Option<f32>,
    pub metadata: Option<MemoryMetadata>,
    pub record_id: Option<i64>,
    pub vector_index: Option<usize>,
}

impl SearchHit {
    /// A hit with text only.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            distance: None,
            similarity: None,
            metadata: None,
            record_id: None,
            vector_index: None,
        }
    }

    /// Whether the hit clears `min_similarity`. Unscored hits always pass.
    pub fn passes(&self, min_similarity: f32) -> bool {
        self.similarity.is_none_or(|s| s >= min_similarity)
    }
}

/// Summary of a store's contents.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub namespace: String,
    pub backend: StoreBackend,
    pub embedding_model: String,
    pub vector_dim: usize,
    pub total_documents: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_vectors: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_metadata: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accelerated: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_records: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_records: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_record_time: Option<DateTime<Utc>>,
    pub files: Vec<PathBuf>,
}

/// Format a conversation turn as a single document.
pub fn format_chat_turn(user: &str, assistant: &str) -> String {
    format!("user: {user}\nassistant: {assistant}")
}

/// Recover the two halves of a document written by [`format_chat_turn`].
pub fn parse_chat_turn(text: &str) -> Option<(String, String)> {
    let rest = text.strip_prefix("user: ")?;
    let (user, assistant) = rest.split_once("\nassistant: ")?;
    Some((user.to_string(), assistant.to_string()))
}

/// First `max_chars` characters of `text`, for log lines.
pub fn preview(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

/// L2-normalize a vector in place. Zero vectors are left untouched.
pub fn l2_normalize(vec: &mut [f32]) {
    let norm: f32 = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for v in vec.iter_mut() {
            *v /= norm;
        }
    }
}

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Cosine similarity; zero when either vector has no length.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let na = dot(a, a).sqrt();
    let nb = dot(b, b).sqrt();
    if na <= f32::EPSILON || nb <= f32::EPSILON {
        return 0.0;
    }
    dot(a, b) / (na * nb)
}
