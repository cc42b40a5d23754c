// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Memory service: the namespace registry and the operations the chat layer
//! calls.
//!
//! One store is opened per namespace on first access and cached for the life
//! of the service. Construction of a given namespace is serialized by its
//! `OnceCell`, so two callers racing on the same namespace share one store.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OnceCell, RwLock};
use tracing::{debug, error, info, warn};

use mnemo_config::MnemoConfig;
use mnemo_core::MnemoError;

use crate::details::{format_details, segments};
use crate::providers::Providers;
use crate::store::{open_store_with, VectorStore};
use crate::types::{
    parse_selector, preview, ConversationTurn, Namespace, NamespaceKind, StoreBackend, StoreStats,
};

type StoreCell = Arc<OnceCell<Arc<dyn VectorStore>>>;

pub struct MemoryService {
    config: MnemoConfig,
    backend: StoreBackend,
    providers: Providers,
    stores: Mutex<HashMap<Namespace, StoreCell>>,
    current_character: RwLock<Option<String>>,
    current_story: RwLock<Option<String>>,
}

impl MemoryService {
    /// Build providers from `config`. Unknown selectors fail here with
    /// [`MnemoError::Config`] before any namespace is touched.
    pub async fn new(config: MnemoConfig) -> Result<Self, MnemoError> {
        let providers = Providers::from_config(&config.rag, &config.memory.data_path()).await?;
        Self::with_providers(config, providers)
    }

    /// Use ready-made providers, typically test doubles.
    pub fn with_providers(config: MnemoConfig, providers: Providers) -> Result<Self, MnemoError> {
        let backend: StoreBackend = parse_selector("memory.backend", &config.memory.backend)?;
        Ok(Self {
            config,
            backend,
            providers,
            stores: Mutex::new(HashMap::new()),
            current_character: RwLock::new(None),
            current_story: RwLock::new(None),
        })
    }

    pub fn config(&self) -> &MnemoConfig {
        &self.config
    }

    pub fn backend(&self) -> StoreBackend {
        self.backend
    }

    pub fn providers(&self) -> &Providers {
        &self.providers
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.memory.timeout_secs)
    }

    /// The cached store for `namespace`, opening it on first use.
    ///
    /// Detail namespaces always use the delegating backend.
    pub async fn store(&self, namespace: &Namespace) -> Result<Arc<dyn VectorStore>, MnemoError> {
        let cell = {
            let mut stores = self.stores.lock().await;
            stores.entry(namespace.clone()).or_default().clone()
        };
        let backend = match namespace.kind() {
            NamespaceKind::Details => StoreBackend::Delegating,
            _ => self.backend,
        };
        let store = cell
            .get_or_try_init(|| async {
                info!(namespace = %namespace, backend = %backend, "opening memory store");
                open_store_with(backend, namespace.clone(), &self.config, self.providers.clone())
                    .await
            })
            .await?;
        Ok(store.clone())
    }

    /// Serve `store` for its namespace instead of opening one from config.
    /// Fails if a store for that namespace is already open.
    pub async fn register_store(&self, store: Arc<dyn VectorStore>) -> Result<(), MnemoError> {
        let namespace = store.namespace().clone();
        let mut stores = self.stores.lock().await;
        if stores.get(&namespace).is_some_and(|cell| cell.initialized()) {
            return Err(MnemoError::Config(format!(
                "a store for {namespace} is already open"
            )));
        }
        info!(namespace = %namespace, backend = %store.backend(), "registering memory store");
        stores.insert(namespace, Arc::new(OnceCell::new_with(Some(store))));
        Ok(())
    }

    /// Drop the cached store for `namespace`; the next access reopens it from
    /// disk.
    pub async fn evict(&self, namespace: &Namespace) -> bool {
        self.stores.lock().await.remove(namespace).is_some()
    }

    pub async fn initialize_character_memory(
        &self,
        character_id: &str,
    ) -> Result<Arc<dyn VectorStore>, MnemoError> {
        self.store(&Namespace::character(character_id)?).await
    }

    pub async fn initialize_story_memory(
        &self,
        story_id: &str,
    ) -> Result<Arc<dyn VectorStore>, MnemoError> {
        self.store(&Namespace::story(story_id)?).await
    }

    /// Open the character's store and make it the default for calls that do
    /// not name a character.
    pub async fn set_current_character(&self, character_id: &str) -> Result<(), MnemoError> {
        let store = self.initialize_character_memory(character_id).await?;
        *self.current_character.write().await = Some(store.namespace().id().to_string());
        Ok(())
    }

    pub async fn set_current_story(&self, story_id: &str) -> Result<(), MnemoError> {
        let store = self.initialize_story_memory(story_id).await?;
        *self.current_story.write().await = Some(store.namespace().id().to_string());
        Ok(())
    }

    pub async fn current_character(&self) -> Option<String> {
        self.current_character.read().await.clone()
    }

    pub async fn current_story(&self) -> Option<String> {
        self.current_story.read().await.clone()
    }

    async fn resolve(
        &self,
        kind: NamespaceKind,
        id: Option<&str>,
    ) -> Result<Option<Namespace>, MnemoError> {
        let id = match id {
            Some(id) => Some(id.to_string()),
            None => match kind {
                NamespaceKind::Story => self.current_story().await,
                _ => self.current_character().await,
            },
        };
        id.map(|id| Namespace::new(kind, &id)).transpose()
    }

    /// Memory block for `query` from a character's store, or `""` when
    /// nothing relevant is found or the store cannot be opened.
    pub async fn search_memory(
        &self,
        query: &str,
        character_id: Option<&str>,
        top_k: Option<usize>,
    ) -> String {
        self.search_namespace(NamespaceKind::Character, query, character_id, top_k)
            .await
    }

    pub async fn search_story_memory(
        &self,
        query: &str,
        story_id: Option<&str>,
        top_k: Option<usize>,
    ) -> String {
        self.search_namespace(NamespaceKind::Story, query, story_id, top_k)
            .await
    }

    async fn search_namespace(
        &self,
        kind: NamespaceKind,
        query: &str,
        id: Option<&str>,
        top_k: Option<usize>,
    ) -> String {
        let namespace = match self.resolve(kind, id).await {
            Ok(Some(ns)) => ns,
            Ok(None) => {
                warn!(kind = ?kind, "no namespace selected, skipping memory search");
                return String::new();
            }
            Err(e) => {
                warn!(error = %e, "invalid namespace, skipping memory search");
                return String::new();
            }
        };
        let store = match self.store(&namespace).await {
            Ok(store) => store,
            Err(e) => {
                error!(namespace = %namespace, error = %e, "failed to open memory store");
                return String::new();
            }
        };

        let top_k = top_k.unwrap_or(self.config.memory.top_k);
        debug!(namespace = %namespace, query = %preview(query, 50), top_k, "memory search");
        let block = store
            .get_relevant_memory(query, top_k, self.timeout(), self.config.memory.min_similarity)
            .await;
        if block.is_empty() {
            info!(namespace = %namespace, "no relevant memory found");
        } else {
            info!(namespace = %namespace, chars = block.chars().count(), "memory context built");
        }
        block
    }

    /// Record one exchange in a character's memory and persist it.
    ///
    /// With no character named or selected the turn is dropped with a
    /// warning.
    pub async fn add_conversation(
        &self,
        user_message: &str,
        assistant_message: &str,
        character_id: Option<&str>,
    ) -> Result<(), MnemoError> {
        self.add_turn(NamespaceKind::Character, user_message, assistant_message, character_id)
            .await
    }

    pub async fn add_story_conversation(
        &self,
        user_message: &str,
        assistant_message: &str,
        story_id: Option<&str>,
    ) -> Result<(), MnemoError> {
        self.add_turn(NamespaceKind::Story, user_message, assistant_message, story_id)
            .await
    }

    async fn add_turn(
        &self,
        kind: NamespaceKind,
        user_message: &str,
        assistant_message: &str,
        id: Option<&str>,
    ) -> Result<(), MnemoError> {
        let Some(namespace) = self.resolve(kind, id).await? else {
            warn!(kind = ?kind, "no namespace selected, conversation not recorded");
            return Ok(());
        };
        let store = self.store(&namespace).await?;
        store.add_chat_turn(user_message, assistant_message, None).await?;
        store.save_to_file().await
    }

    /// Details block for `query` from a character's reference material, or
    /// `""`.
    pub async fn search_character_details(
        &self,
        query: &str,
        character_id: &str,
        top_k: Option<usize>,
    ) -> String {
        let store = match Namespace::details(character_id) {
            Ok(ns) => self.store(&ns).await,
            Err(e) => Err(e),
        };
        let store = match store {
            Ok(store) => store,
            Err(e) => {
                error!(character = character_id, error = %e, "failed to open details store");
                return String::new();
            }
        };
        match store.get_stats().await {
            Ok(stats) if stats.total_documents == 0 => {
                info!(character = character_id, "no character details");
                return String::new();
            }
            Ok(_) => {}
            Err(e) => {
                warn!(character = character_id, error = %e, "details stats failed");
                return String::new();
            }
        }

        let top_k = top_k.unwrap_or(self.config.memory.details_top_k);
        let hits = store.search(query, top_k, self.timeout()).await;
        let texts: Vec<&str> = hits.iter().map(|h| h.text.as_str()).collect();
        format_details(&texts)
    }

    /// Import reference files into a character's details store.
    ///
    /// Each file is split on blank lines; missing or empty files are skipped
    /// with a warning. Returns the number of segments added.
    pub async fn build_character_details(
        &self,
        character_id: &str,
        files: &[PathBuf],
    ) -> Result<usize, MnemoError> {
        let store = self.store(&Namespace::details(character_id)?).await?;
        let mut added = 0;
        for path in files {
            let content = match tokio::fs::read_to_string(path).await {
                Ok(content) => content,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    warn!(path = %path.display(), "details file not found");
                    continue;
                }
                Err(e) => {
                    error!(path = %path.display(), error = %e, "failed to read details file");
                    continue;
                }
            };
            let parts = segments(&content);
            if parts.is_empty() {
                warn!(path = %path.display(), "details file has no content");
                continue;
            }
            for part in &parts {
                if store.add_text(part, None).await?.is_some() {
                    added += 1;
                }
            }
            info!(path = %path.display(), segments = parts.len(), "details file imported");
        }
        store.save_to_file().await?;
        info!(character = character_id, added, "character details built");
        Ok(added)
    }

    /// Search long-term memory and character details concurrently.
    ///
    /// Each branch runs as its own task under the search deadline; a branch
    /// that fails, panics or times out yields `""` without affecting the
    /// other.
    pub async fn search_memory_and_details(
        &self,
        query: &str,
        character_id: Option<&str>,
        top_k: Option<usize>,
    ) -> (String, String) {
        let namespace = match self.resolve(NamespaceKind::Character, character_id).await {
            Ok(Some(ns)) => ns,
            Ok(None) => {
                warn!("no character selected, skipping memory and details search");
                return (String::new(), String::new());
            }
            Err(e) => {
                warn!(error = %e, "invalid character id");
                return (String::new(), String::new());
            }
        };

        let timeout = self.timeout();
        let min_similarity = self.config.memory.min_similarity;
        let memory_top_k = top_k.unwrap_or(self.config.memory.top_k);
        let details_top_k = self.config.memory.details_top_k;

        let memory_task = match self.store(&namespace).await {
            Ok(store) => {
                let query = query.to_string();
                Some(tokio::spawn(async move {
                    store
                        .get_relevant_memory(&query, memory_top_k, timeout, min_similarity)
                        .await
                }))
            }
            Err(e) => {
                error!(namespace = %namespace, error = %e, "failed to open memory store");
                None
            }
        };
        let details_store = match Namespace::details(namespace.id()) {
            Ok(ns) => self.store(&ns).await,
            Err(e) => Err(e),
        };
        let details_task = match details_store {
            Ok(store) => {
                let query = query.to_string();
                Some(tokio::spawn(async move {
                    let hits = store.search(&query, details_top_k, timeout).await;
                    let texts: Vec<&str> = hits.iter().map(|h| h.text.as_str()).collect();
                    format_details(&texts)
                }))
            }
            Err(e) => {
                error!(namespace = %namespace, error = %e, "failed to open details store");
                None
            }
        };

        let (memory, details) = tokio::join!(
            join_branch("memory", memory_task, timeout),
            join_branch("details", details_task, timeout),
        );
        info!(
            namespace = %namespace,
            memory_chars = memory.chars().count(),
            details_chars = details.chars().count(),
            "dual search complete"
        );
        (memory, details)
    }

    /// Stats for a character's store.
    pub async fn memory_stats(&self, character_id: Option<&str>) -> Result<StoreStats, MnemoError> {
        let namespace = self
            .resolve(NamespaceKind::Character, character_id)
            .await?
            .ok_or_else(|| MnemoError::Config("no character selected".into()))?;
        self.store(&namespace).await?.get_stats().await
    }

    /// Most recent `limit` conversation turns of `namespace`, oldest first.
    pub async fn recent_conversations(
        &self,
        namespace: &Namespace,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>, MnemoError> {
        self.store(namespace).await?.conversations(Some(limit)).await
    }

    /// Copy every stored conversation turn of `namespace` from one backend
    /// into another and save the target. Returns the number of turns copied.
    ///
    /// The cached store for `namespace` is evicted so later calls see the
    /// migrated data when the target is the service's backend.
    pub async fn migrate(
        &self,
        from: StoreBackend,
        to: StoreBackend,
        namespace: &Namespace,
    ) -> Result<usize, MnemoError> {
        if from == to {
            return Ok(0);
        }
        self.evict(namespace).await;
        info!(namespace = %namespace, from = %from, to = %to, "migrating memory");

        let source =
            open_store_with(from, namespace.clone(), &self.config, self.providers.clone()).await?;
        let target =
            open_store_with(to, namespace.clone(), &self.config, self.providers.clone()).await?;

        let turns = source.conversations(None).await?;
        let mut migrated = 0;
        for turn in &turns {
            if turn.user_message.is_empty() || turn.assistant_message.is_empty() {
                continue;
            }
            target
                .add_chat_turn(&turn.user_message, &turn.assistant_message, turn.timestamp)
                .await?;
            migrated += 1;
        }
        if migrated > 0 {
            target.save_to_file().await?;
        }
        info!(namespace = %namespace, migrated, "migration complete");
        Ok(migrated)
    }
}

async fn join_branch(
    branch: &'static str,
    task: Option<tokio::task::JoinHandle<String>>,
    timeout: Duration,
) -> String {
    let Some(task) = task else {
        return String::new();
    };
    let abort = task.abort_handle();
    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => {
            error!(branch, error = %e, "search branch failed");
            String::new()
        }
        Err(_) => {
            abort.abort();
            let e = MnemoError::Timeout { duration: timeout };
            warn!(branch, error = %e, "search branch abandoned");
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use mnemo_test_utils::MemoryHarness;

    use super::*;

    fn service(harness: &MemoryHarness) -> MemoryService {
        let providers = Providers::new(harness.embedder(), harness.reranker());
        MemoryService::with_providers(harness.config().clone(), providers).unwrap()
    }

    #[tokio::test]
    async fn registry_returns_one_store_per_namespace() {
        let harness = MemoryHarness::builder().build().unwrap();
        let service = service(&harness);

        let a = service.initialize_character_memory("alice").await.unwrap();
        let b = service.initialize_character_memory("alice").await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let details = service.store(&Namespace::details("alice").unwrap()).await.unwrap();
        assert_eq!(details.backend(), StoreBackend::Delegating);
        assert_eq!(a.backend(), StoreBackend::Relational);
    }

    #[tokio::test]
    async fn registering_over_an_open_store_fails() {
        let harness = MemoryHarness::builder().build().unwrap();
        let service = service(&harness);
        let opened = service.initialize_character_memory("alice").await.unwrap();

        let err = service.register_store(opened.clone()).await.expect_err("should fail");
        assert!(matches!(err, MnemoError::Config(_)));

        assert!(service.evict(opened.namespace()).await);
        service.register_store(opened.clone()).await.unwrap();
        let served = service.initialize_character_memory("alice").await.unwrap();
        assert!(Arc::ptr_eq(&opened, &served));
    }

    #[tokio::test]
    async fn unknown_backend_is_rejected() {
        let mut harness = MemoryHarness::builder().build().unwrap();
        harness.config_mut().memory.backend = "cloud".into();
        let providers = Providers::new(harness.embedder(), None);
        let err = MemoryService::with_providers(harness.config().clone(), providers)
            .err()
            .expect("should fail");
        assert!(matches!(err, MnemoError::Config(_)));
    }

    #[tokio::test]
    async fn current_character_is_the_default() {
        let harness = MemoryHarness::builder().build().unwrap();
        let service = service(&harness);

        assert_eq!(service.search_memory("anything", None, None).await, "");
        service.add_conversation("hi", "hello", None).await.unwrap();

        service.set_current_character("alice").await.unwrap();
        assert_eq!(service.current_character().await.as_deref(), Some("alice"));
        service
            .add_conversation("my name is Alex", "nice to meet you, Alex", None)
            .await
            .unwrap();

        let stats = service.memory_stats(None).await.unwrap();
        assert_eq!(stats.total_documents, 1);
        assert_eq!(service.memory_stats(Some("bob")).await.unwrap().total_documents, 0);
    }

    #[tokio::test]
    async fn story_conversations_are_separate() {
        let harness = MemoryHarness::builder().build().unwrap();
        let service = service(&harness);
        service.set_current_story("s1").await.unwrap();
        service.add_story_conversation("we enter the cave", "it is dark", None).await.unwrap();

        let block = service.search_story_memory("we enter the cave", None, Some(3)).await;
        assert!(block.contains("cave"));
        assert_eq!(service.search_memory("cave", Some("alice"), Some(3)).await, "");
        assert!(harness.data_dir().join("saves/s1/s1_memory.db").exists());
    }

    #[tokio::test]
    async fn details_build_and_search() {
        let harness = MemoryHarness::builder().build().unwrap();
        let service = service(&harness);

        let file = harness.data_dir().join("alice.txt");
        std::fs::write(&file, "Alice grew up in Paris.\n\nAlice drinks green tea every morning.")
            .unwrap();
        let empty = harness.data_dir().join("empty.txt");
        std::fs::write(&empty, "  \n\n ").unwrap();
        let missing = harness.data_dir().join("missing.txt");

        let added = service
            .build_character_details("alice", &[file, empty, missing])
            .await
            .unwrap();
        assert_eq!(added, 2);
        assert!(harness.data_dir().join("details/alice.json").exists());

        let block = service.search_character_details("green tea", "alice", Some(1)).await;
        assert!(block.starts_with("Relevant character details:\n```"));
        assert!(block.contains("tea"));

        assert_eq!(service.search_character_details("tea", "bob", None).await, "");
    }
}
