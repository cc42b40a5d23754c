// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Memory subcommands.

use std::path::PathBuf;

use mnemo_config::MnemoConfig;
use mnemo_core::MnemoError;
use mnemo_memory::{parse_selector, MemoryService, NamespaceKind, StoreBackend, StoreStats};
use tracing::info;

use crate::Target;

pub async fn add(
    config: MnemoConfig,
    target: &Target,
    user: &str,
    assistant: &str,
) -> Result<(), MnemoError> {
    let namespace = target.namespace()?;
    let service = MemoryService::new(config).await?;
    match namespace.kind() {
        NamespaceKind::Story => {
            service
                .add_story_conversation(user, assistant, Some(namespace.id()))
                .await?
        }
        _ => {
            service
                .add_conversation(user, assistant, Some(namespace.id()))
                .await?
        }
    }
    println!("recorded turn in {namespace}");
    Ok(())
}

pub async fn search(
    config: MnemoConfig,
    target: &Target,
    query: &str,
    top_k: Option<usize>,
) -> Result<(), MnemoError> {
    let namespace = target.namespace()?;
    let service = MemoryService::new(config).await?;
    let block = match namespace.kind() {
        NamespaceKind::Story => {
            service
                .search_story_memory(query, Some(namespace.id()), top_k)
                .await
        }
        _ => service.search_memory(query, Some(namespace.id()), top_k).await,
    };
    if block.is_empty() {
        println!("no relevant memory");
    } else {
        println!("{block}");
    }
    Ok(())
}

pub async fn dual_search(
    config: MnemoConfig,
    character: &str,
    query: &str,
    top_k: Option<usize>,
) -> Result<(), MnemoError> {
    let service = MemoryService::new(config).await?;
    let (memory, details) = service
        .search_memory_and_details(query, Some(character), top_k)
        .await;
    println!("{}", section("memory", &memory));
    println!("{}", section("details", &details));
    Ok(())
}

pub async fn import_details(
    config: MnemoConfig,
    character: &str,
    files: &[PathBuf],
) -> Result<(), MnemoError> {
    let service = MemoryService::new(config).await?;
    let added = service.build_character_details(character, files).await?;
    info!(character, files = files.len(), segments = added, "details imported");
    println!("imported {added} segments for {character}");
    Ok(())
}

pub async fn stats(config: MnemoConfig, target: &Target, json: bool) -> Result<(), MnemoError> {
    let namespace = target.namespace()?;
    let service = MemoryService::new(config).await?;
    let stats = service.store(&namespace).await?.get_stats().await?;
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&stats).map_err(|e| MnemoError::Internal(e.to_string()))?
        );
    } else {
        print_stats(&stats);
    }
    Ok(())
}

pub async fn recent(
    config: MnemoConfig,
    target: &Target,
    limit: usize,
    json: bool,
) -> Result<(), MnemoError> {
    let namespace = target.namespace()?;
    let service = MemoryService::new(config).await?;
    let turns = service.recent_conversations(&namespace, limit).await?;
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&turns).map_err(|e| MnemoError::Internal(e.to_string()))?
        );
        return Ok(());
    }
    if turns.is_empty() {
        println!("no conversations in {namespace}");
    }
    for turn in &turns {
        let when = turn
            .timestamp
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("[{when}] user: {}", turn.user_message);
        println!("{:>18} assistant: {}", "", turn.assistant_message);
    }
    Ok(())
}

pub async fn migrate(
    config: MnemoConfig,
    target: &Target,
    from: &str,
    to: &str,
) -> Result<(), MnemoError> {
    let namespace = target.namespace()?;
    let from: StoreBackend = parse_selector("--from", from)?;
    let to: StoreBackend = parse_selector("--to", to)?;
    let service = MemoryService::new(config).await?;
    let migrated = service.migrate(from, to, &namespace).await?;
    info!(namespace = %namespace, %from, %to, migrated, "migration finished");
    println!("migrated {migrated} turns of {namespace} from {from} to {to}");
    Ok(())
}

fn section(title: &str, body: &str) -> String {
    let body = if body.is_empty() { "(none)" } else { body };
    format!("== {title} ==\n{body}\n")
}

fn print_stats(stats: &StoreStats) {
    println!();
    println!("  mnemo stats: {}", stats.namespace);
    println!("  {}", "-".repeat(40));
    println!("    Backend:    {}", stats.backend);
    println!("    Model:      {} ({} dims)", stats.embedding_model, stats.vector_dim);
    println!("    Documents:  {}", stats.total_documents);
    if let Some(vectors) = stats.total_vectors {
        println!("    Vectors:    {vectors}");
    }
    if let Some(records) = stats.total_records {
        println!("    Records:    {records}");
    }
    if let Some(turns) = stats.conversation_records {
        println!("    Turns:      {turns}");
    }
    if let Some(latest) = stats.latest_record_time {
        println!("    Latest:     {}", latest.to_rfc3339());
    }
    if let Some(accelerated) = stats.accelerated {
        println!("    Index:      {}", if accelerated { "ndarray" } else { "scalar" });
    }
    for file in &stats.files {
        println!("    File:       {}", file.display());
    }
    println!();
}
