// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the memory engine.
//!
//! Each test builds an isolated MemoryHarness with a temp data directory and
//! deterministic mock adapters. Tests are independent and order-insensitive.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use std::sync::Arc;

use async_trait::async_trait;
use proptest::prelude::*;

use mnemo_core::MnemoError;
use mnemo_memory::{
    open_store_with, ConversationTurn, MemoryMetadata, MemoryService, MultiRecall, Namespace,
    Providers, SearchHit, StoreBackend, StoreStats, VectorStore,
};
use mnemo_test_utils::MemoryHarness;

const BACKENDS: [StoreBackend; 3] = [
    StoreBackend::Delegating,
    StoreBackend::IndexedFile,
    StoreBackend::Relational,
];

fn providers(harness: &MemoryHarness) -> Providers {
    Providers::new(harness.embedder(), harness.reranker())
}

fn service(harness: &MemoryHarness) -> MemoryService {
    MemoryService::with_providers(harness.config().clone(), providers(harness)).unwrap()
}

// ---- Multi-recall ranking ----

#[tokio::test]
async fn test_cat_sentences_rank_above_dog_sentence() {
    let harness = MemoryHarness::builder().build().unwrap();
    let mut rag = MultiRecall::from_config(&harness.config().rag, &providers(&harness)).unwrap();
    rag.add_batch(&[
        "A cat sat on a mat.".to_string(),
        "Dogs bark at night.".to_string(),
        "A cat likes milk.".to_string(),
    ])
    .await;

    let docs = rag.req_docs("cat", 2).await;
    assert_eq!(docs.len(), 2);
    assert!(docs.iter().all(|d| d.contains("cat")), "got {docs:?}");
}

#[tokio::test]
async fn test_fused_results_never_repeat_text() {
    let harness = MemoryHarness::builder().build().unwrap();
    let mut rag = MultiRecall::from_config(&harness.config().rag, &providers(&harness)).unwrap();
    for text in [
        "A cat sat on a mat.",
        "A cat sat on a mat.",
        "The cat chased a mouse.",
        "Rain fell all day.",
    ] {
        rag.add(text).await;
    }

    let docs = rag.req_docs("cat mat", 10).await;
    let unique: BTreeSet<&String> = docs.iter().collect();
    assert_eq!(unique.len(), docs.len(), "duplicates in {docs:?}");
    assert!(docs.contains(&"A cat sat on a mat.".to_string()));
}

#[tokio::test]
async fn test_failing_reranker_passes_candidates_through() {
    let harness = MemoryHarness::builder().with_failing_reranker().build().unwrap();
    let mut rag = MultiRecall::from_config(&harness.config().rag, &providers(&harness)).unwrap();
    rag.add("A cat likes milk.").await;
    rag.add("Dogs bark at night.").await;

    let docs = rag.req_docs("cat", 1).await;
    assert_eq!(docs.len(), 1);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_corpus_ids_stay_dense(batches in prop::collection::vec(
        prop::collection::vec("[a-z]{1,8}( [a-z]{1,8}){0,4}", 0..4),
        0..6,
    )) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let harness = MemoryHarness::builder().dim(32).build().unwrap();

        let (ids, keys) = runtime.block_on(async {
            let mut rag =
                MultiRecall::from_config(&harness.config().rag, &providers(&harness)).unwrap();
            let mut ids = Vec::new();
            for batch in &batches {
                if batch.len() == 1 {
                    ids.push(rag.add(&batch[0]).await);
                } else {
                    ids.extend(rag.add_batch(batch).await);
                }
            }
            let keys: Vec<usize> = rag.documents().keys().copied().collect();
            (ids, keys)
        });

        let total: usize = batches.iter().map(Vec::len).sum();
        prop_assert_eq!(&ids, &(0..total).collect::<Vec<_>>());
        prop_assert_eq!(&keys, &(0..total).collect::<Vec<_>>());
    }
}

// ---- Store facades ----

#[tokio::test]
async fn test_save_and_reload_returns_same_texts_for_every_backend() {
    for backend in BACKENDS {
        let harness = MemoryHarness::builder().dim(64).build().unwrap();
        let ns = Namespace::character("alice").unwrap();
        let docs = [
            "Alice keeps a diary about the garden.",
            "The garden has red roses and tall sunflowers.",
            "Alice fears thunderstorms at night.",
            "Her brother lives by the sea.",
        ];

        let store = open_store_with(backend, ns.clone(), harness.config(), providers(&harness))
            .await
            .unwrap();
        for doc in docs {
            store.add_text(doc, None).await.unwrap();
        }
        let before: BTreeSet<String> = store
            .search("garden roses", 3, Duration::from_secs(5))
            .await
            .into_iter()
            .map(|h| h.text)
            .collect();
        assert!(!before.is_empty(), "{backend}: no hits before save");
        store.save_to_file().await.unwrap();
        drop(store);

        let reopened = open_store_with(backend, ns, harness.config(), providers(&harness))
            .await
            .unwrap();
        let after: BTreeSet<String> = reopened
            .search("garden roses", 3, Duration::from_secs(5))
            .await
            .into_iter()
            .map(|h| h.text)
            .collect();
        assert_eq!(before, after, "{backend}: results changed across reload");
        assert_eq!(reopened.get_stats().await.unwrap().total_documents, docs.len());
    }
}

#[tokio::test]
async fn test_search_returns_empty_when_deadline_passes() {
    for backend in BACKENDS {
        let harness = MemoryHarness::builder()
            .with_embed_delay(Duration::from_millis(800))
            .build()
            .unwrap();
        let store = open_store_with(
            backend,
            Namespace::character("slow").unwrap(),
            harness.config(),
            providers(&harness),
        )
        .await
        .unwrap();
        store.add_text("a slow memory about the sea", None).await.unwrap();

        let deadline = Duration::from_millis(100);
        let started = Instant::now();
        let hits = store.search("sea", 3, deadline).await;
        let elapsed = started.elapsed();

        assert!(hits.is_empty(), "{backend}: expected no hits");
        assert!(
            elapsed < deadline + Duration::from_millis(400),
            "{backend}: search took {elapsed:?}"
        );
    }
}

#[tokio::test]
async fn test_failed_query_embedding_degrades_to_empty() {
    let harness = MemoryHarness::builder()
        .backend("indexed-file")
        .with_failing_embedder()
        .build()
        .unwrap();
    let service = service(&harness);
    service
        .add_conversation("hello", "hi there", Some("alice"))
        .await
        .unwrap();
    assert_eq!(service.search_memory("hello", Some("alice"), None).await, "");
}

// ---- Memory service ----

#[tokio::test]
async fn test_remembered_name_is_recalled() {
    for backend in ["delegating", "indexed-file", "relational"] {
        let harness = MemoryHarness::builder().backend(backend).build().unwrap();
        let service = service(&harness);
        service.set_current_character("alex-friend").await.unwrap();
        service
            .add_conversation("my name is Alex", "nice to meet you, Alex", None)
            .await
            .unwrap();

        let block = service.search_memory("what is my name", None, Some(3)).await;
        assert!(!block.is_empty(), "{backend}: empty memory block");
        assert!(block.contains("Alex"), "{backend}: {block}");
        assert!(block.starts_with("Here are related memories for reference:"));
    }
}

#[tokio::test]
async fn test_unknown_embedding_backend_fails_without_files() {
    let mut harness = MemoryHarness::builder().build().unwrap();
    harness.config_mut().rag.dense.embed_backend = "unknown".to_string();

    let err = MemoryService::new(harness.config().clone())
        .await
        .err()
        .expect("construction should fail");
    assert!(matches!(err, MnemoError::Config(_)));
    assert!(std::fs::read_dir(harness.data_dir()).unwrap().next().is_none());

    let err = mnemo_memory::open_store(Namespace::character("alice").unwrap(), harness.config())
        .await
        .err()
        .expect("open should fail");
    assert!(matches!(err, MnemoError::Config(_)));
    assert!(std::fs::read_dir(harness.data_dir()).unwrap().next().is_none());
}

#[tokio::test]
async fn test_namespaces_are_isolated() {
    let harness = MemoryHarness::builder().build().unwrap();
    let service = service(&harness);

    let alice_docs: Vec<String> = (0..5).map(|i| format!("alice memory number {i} about apples")).collect();
    let bob_docs: Vec<String> = (0..5).map(|i| format!("bob memory number {i} about apples")).collect();

    let alice = service.initialize_character_memory("alice").await.unwrap();
    let bob = service.initialize_character_memory("bob").await.unwrap();
    for doc in &alice_docs {
        alice.add_text(doc, None).await.unwrap();
    }
    for doc in &bob_docs {
        bob.add_text(doc, None).await.unwrap();
    }

    for query in ["apples", "bob memory", "memory number 3"] {
        let hits = alice.search(query, 10, Duration::from_secs(5)).await;
        assert!(!hits.is_empty());
        assert!(
            hits.iter().all(|h| !bob_docs.contains(&h.text)),
            "bob's document leaked into alice's results for {query:?}"
        );
    }
}

#[tokio::test]
async fn test_dual_search_returns_both_blocks() {
    let harness = MemoryHarness::builder().build().unwrap();
    let service = service(&harness);

    let file = harness.data_dir().join("alice.txt");
    std::fs::write(&file, "Alice loves the ocean.\n\nAlice sails every summer.").unwrap();
    service.build_character_details("alice", &[file]).await.unwrap();
    service
        .add_conversation("do you like the ocean", "yes, the ocean calms me", Some("alice"))
        .await
        .unwrap();

    let (memory, details) = service.search_memory_and_details("ocean", Some("alice"), None).await;
    assert!(memory.contains("ocean"), "memory: {memory}");
    assert!(details.contains("ocean"), "details: {details}");
}

#[tokio::test]
async fn test_dual_search_degrades_each_branch_independently() {
    let harness = MemoryHarness::builder().build().unwrap();
    let service = service(&harness);
    service
        .add_conversation("do you like the ocean", "yes, the ocean calms me", Some("bob"))
        .await
        .unwrap();

    let (memory, details) = service.search_memory_and_details("ocean", Some("bob"), None).await;
    assert!(memory.contains("ocean"));
    assert_eq!(details, "");

    let (memory, details) = service.search_memory_and_details("ocean", None, None).await;
    assert_eq!((memory.as_str(), details.as_str()), ("", ""));
}

#[tokio::test]
async fn test_untyped_text_is_not_counted_as_conversation() {
    for backend in [StoreBackend::IndexedFile, StoreBackend::Relational] {
        let harness = MemoryHarness::builder().build().unwrap();
        let ns = Namespace::character("notes").unwrap();
        let store = open_store_with(backend, ns, harness.config(), providers(&harness))
            .await
            .unwrap();
        store.add_text("the lighthouse is red", None).await.unwrap();
        store.add_chat_turn("hi", "hello", None).await.unwrap();

        let stats = store.get_stats().await.unwrap();
        assert_eq!(stats.conversation_records, Some(1), "{backend}");
        assert_eq!(store.conversations(None).await.unwrap().len(), 1, "{backend}");
    }
}

/// How a [`BrokenStore`] misbehaves when searched.
#[derive(Clone, Copy)]
enum Fault {
    /// Ignore the deadline and never answer.
    Stall,
    Panic,
}

struct BrokenStore {
    namespace: Namespace,
    fault: Fault,
}

#[async_trait]
impl VectorStore for BrokenStore {
    fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    fn backend(&self) -> StoreBackend {
        StoreBackend::Delegating
    }

    async fn add_text(
        &self,
        _text: &str,
        _metadata: Option<MemoryMetadata>,
    ) -> Result<Option<usize>, MnemoError> {
        Ok(None)
    }

    async fn query(&self, _query: &str, _top_k: usize) -> Result<Vec<SearchHit>, MnemoError> {
        Ok(Vec::new())
    }

    async fn search(&self, _query: &str, _top_k: usize, _timeout: Duration) -> Vec<SearchHit> {
        match self.fault {
            Fault::Stall => {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Vec::new()
            }
            Fault::Panic => panic!("index exploded"),
        }
    }

    async fn save_to_file(&self) -> Result<(), MnemoError> {
        Ok(())
    }

    async fn load_from_file(&self) -> Result<(), MnemoError> {
        Ok(())
    }

    async fn get_stats(&self) -> Result<StoreStats, MnemoError> {
        Err(MnemoError::Internal("no stats".into()))
    }

    async fn conversations(
        &self,
        _limit: Option<usize>,
    ) -> Result<Vec<ConversationTurn>, MnemoError> {
        Ok(Vec::new())
    }
}

fn one_second_service(harness: &mut MemoryHarness) -> MemoryService {
    harness.config_mut().memory.timeout_secs = 1;
    service(harness)
}

#[tokio::test]
async fn test_stalled_memory_branch_keeps_details() {
    let mut harness = MemoryHarness::builder().build().unwrap();
    let service = one_second_service(&mut harness);

    let file = harness.data_dir().join("alice.txt");
    std::fs::write(&file, "Alice loves the ocean.\n\nAlice sails every summer.").unwrap();
    service.build_character_details("alice", &[file]).await.unwrap();
    service
        .register_store(Arc::new(BrokenStore {
            namespace: Namespace::character("alice").unwrap(),
            fault: Fault::Stall,
        }))
        .await
        .unwrap();

    let started = Instant::now();
    let (memory, details) = service.search_memory_and_details("ocean", Some("alice"), None).await;
    assert!(started.elapsed() < Duration::from_secs(3), "took {:?}", started.elapsed());
    assert_eq!(memory, "");
    assert!(details.contains("ocean"), "details: {details}");
}

#[tokio::test]
async fn test_panicking_details_branch_keeps_memory() {
    let mut harness = MemoryHarness::builder().build().unwrap();
    let service = one_second_service(&mut harness);

    service
        .add_conversation("do you like the ocean", "yes, the ocean calms me", Some("alice"))
        .await
        .unwrap();
    service
        .register_store(Arc::new(BrokenStore {
            namespace: Namespace::details("alice").unwrap(),
            fault: Fault::Panic,
        }))
        .await
        .unwrap();

    let (memory, details) = service.search_memory_and_details("ocean", Some("alice"), None).await;
    assert!(memory.contains("ocean"), "memory: {memory}");
    assert_eq!(details, "");
}

#[tokio::test]
async fn test_migrate_copies_conversations_between_backends() {
    let harness = MemoryHarness::builder().backend("relational").build().unwrap();
    let service = service(&harness);
    let ns = Namespace::character("alice").unwrap();

    service.add_conversation("hi", "hello", Some("alice")).await.unwrap();
    service
        .add_conversation("my name is Alex", "nice to meet you, Alex", Some("alice"))
        .await
        .unwrap();

    let migrated = service
        .migrate(StoreBackend::Relational, StoreBackend::IndexedFile, &ns)
        .await
        .unwrap();
    assert_eq!(migrated, 2);
    assert_eq!(
        service.migrate(StoreBackend::Relational, StoreBackend::Relational, &ns).await.unwrap(),
        0
    );

    let target = open_store_with(StoreBackend::IndexedFile, ns, harness.config(), providers(&harness))
        .await
        .unwrap();
    let turns = target.conversations(None).await.unwrap();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[1].user_message, "my name is Alex");
    assert!(turns.iter().all(|t| t.timestamp.is_some()));
}

#[tokio::test]
async fn test_recent_conversations_are_limited() {
    let harness = MemoryHarness::builder().build().unwrap();
    let service = service(&harness);
    for i in 0..4 {
        service
            .add_conversation(&format!("question {i}"), &format!("answer {i}"), Some("alice"))
            .await
            .unwrap();
    }

    let turns = service
        .recent_conversations(&Namespace::character("alice").unwrap(), 2)
        .await
        .unwrap();
    let users: Vec<&str> = turns.iter().map(|t| t.user_message.as_str()).collect();
    assert_eq!(users, vec!["question 2", "question 3"]);
}
