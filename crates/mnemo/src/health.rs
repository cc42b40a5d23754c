// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `mnemo health` command implementation.
//!
//! Builds the configured providers and asks each adapter for its health,
//! along with a check that the data directory is writable.

use std::io::IsTerminal;
use std::path::Path;
use std::time::{Duration, Instant};

use mnemo_config::MnemoConfig;
use mnemo_core::{HealthStatus, MnemoError, PluginAdapter};
use mnemo_memory::Providers;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

/// Result of a single check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    pub duration: Duration,
}

/// Run the `mnemo health` command. Fails when any check fails.
pub async fn run_health(config: &MnemoConfig, plain: bool) -> Result<(), MnemoError> {
    let use_color = !plain && std::io::stdout().is_terminal();
    let mut results = vec![check_data_dir(&config.memory.data_path()).await];

    let started = Instant::now();
    match Providers::from_config(&config.rag, &config.memory.data_path()).await {
        Ok(providers) => {
            results.push(check_adapter("embedder", providers.embedder.as_ref()).await);
            match &providers.reranker {
                Some(reranker) => results.push(check_adapter("reranker", reranker.as_ref()).await),
                None => results.push(CheckResult {
                    name: "reranker".into(),
                    status: CheckStatus::Warn,
                    message: "disabled, candidates are passed through unranked".into(),
                    duration: Duration::ZERO,
                }),
            }
        }
        Err(e) => results.push(CheckResult {
            name: "providers".into(),
            status: CheckStatus::Fail,
            message: e.to_string(),
            duration: started.elapsed(),
        }),
    }

    println!();
    println!("  mnemo health");
    println!("  {}", "-".repeat(50));
    for result in &results {
        println!("{}", format_line(result, use_color));
    }
    println!();

    let failed = results.iter().filter(|r| r.status == CheckStatus::Fail).count();
    if failed > 0 {
        return Err(MnemoError::Internal(format!("{failed} health check(s) failed")));
    }
    Ok(())
}

async fn check_adapter<A: PluginAdapter + ?Sized>(label: &str, adapter: &A) -> CheckResult {
    let started = Instant::now();
    let (status, message) = match adapter.health_check().await {
        Ok(HealthStatus::Healthy) => (CheckStatus::Pass, format!("{} is healthy", adapter.name())),
        Ok(HealthStatus::Degraded(reason)) => {
            (CheckStatus::Warn, format!("{} degraded: {reason}", adapter.name()))
        }
        Ok(HealthStatus::Unhealthy(reason)) => {
            (CheckStatus::Fail, format!("{} unhealthy: {reason}", adapter.name()))
        }
        Err(e) => (CheckStatus::Fail, format!("{}: {e}", adapter.name())),
    };
    CheckResult {
        name: label.to_string(),
        status,
        message,
        duration: started.elapsed(),
    }
}

async fn check_data_dir(path: &Path) -> CheckResult {
    let started = Instant::now();
    let marker = path.join(".mnemo-health");
    let outcome = async {
        tokio::fs::create_dir_all(path).await?;
        tokio::fs::write(&marker, b"ok").await?;
        tokio::fs::remove_file(&marker).await
    }
    .await;
    let (status, message) = match outcome {
        Ok(()) => (CheckStatus::Pass, format!("{} is writable", path.display())),
        Err(e) => (CheckStatus::Fail, format!("{}: {e}", path.display())),
    };
    CheckResult {
        name: "data dir".into(),
        status,
        message,
        duration: started.elapsed(),
    }
}

fn format_line(result: &CheckResult, use_color: bool) -> String {
    let ms = result.duration.as_millis();
    if use_color {
        use colored::Colorize;
        let symbol = match result.status {
            CheckStatus::Pass => "✓".green(),
            CheckStatus::Warn => "!".yellow(),
            CheckStatus::Fail => "✗".red(),
        };
        format!("    {symbol} {:<10} {} ({ms}ms)", result.name, result.message)
    } else {
        let tag = match result.status {
            CheckStatus::Pass => "[OK]",
            CheckStatus::Warn => "[WARN]",
            CheckStatus::Fail => "[FAIL]",
        };
        format!("    {tag} {:<10} {} ({ms}ms)", result.name, result.message)
    }
}
