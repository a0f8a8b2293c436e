//! Archive statistics and health overview.
//!
//! Summarizes what the record store holds and how much of it is indexed:
//! conversation count, entries per collection, and a per-project breakdown.
//! Used by `recall stats` to check that imports and rebuilds did their job.

use std::collections::BTreeMap;

use anyhow::Result;
use sqlx::Row;

use crate::config::Config;
use crate::relate::UNKNOWN_PROJECT;
use crate::services::Services;
use crate::store::{Collection, ListFilter, RecordStore, VectorIndex};

/// Per-project breakdown of conversation and chunk counts.
#[derive(Default)]
struct ProjectStats {
    conversations: usize,
    chunks: i64,
    latest: String,
}

pub async fn run_stats(config: &Config) -> Result<()> {
    let services = Services::open(config).await?;

    let summaries = services.records.list(&ListFilter::default()).await?;

    let mut collection_counts = Vec::new();
    for collection in Collection::ALL {
        collection_counts.push((collection, services.index.count(collection).await?));
    }

    let mut projects: BTreeMap<String, ProjectStats> = BTreeMap::new();
    for summary in &summaries {
        let entry = projects
            .entry(summary.project.clone().unwrap_or_else(|| UNKNOWN_PROJECT.to_string()))
            .or_default();
        entry.conversations += 1;
        if summary.day() > entry.latest.as_str() {
            entry.latest = summary.day().to_string();
        }
    }

    let chunk_rows = sqlx::query(
        r#"
        SELECT json_extract(attributes, '$.project') AS project, COUNT(*) AS chunk_count
        FROM index_entries
        WHERE collection = ?
        GROUP BY project
        "#,
    )
    .bind(Collection::MessageChunks.name())
    .fetch_all(services.index.pool())
    .await?;

    for row in &chunk_rows {
        let project: Option<String> = row.get("project");
        let project = project.unwrap_or_else(|| UNKNOWN_PROJECT.to_string());
        projects.entry(project).or_default().chunks = row.get("chunk_count");
    }

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Conversation Memory — Stats");
    println!("===========================");
    println!();
    println!("  Store:         {}", config.store.path.display());
    println!("  Database:      {}", config.db.path.display());
    println!("  Size:          {}", format_bytes(db_size));
    println!();
    println!("  Conversations: {}", summaries.len());
    for (collection, count) in &collection_counts {
        println!("  {:<14} {}", format!("{}:", collection), count);
    }

    if !projects.is_empty() {
        println!();
        println!("  By project:");
        println!(
            "  {:<24} {:>6} {:>8}   {}",
            "PROJECT", "CONVS", "CHUNKS", "LATEST"
        );
        println!("  {}", "-".repeat(56));

        for (project, s) in &projects {
            let latest = if s.latest.is_empty() { "-" } else { s.latest.as_str() };
            println!(
                "  {:<24} {:>6} {:>8}   {}",
                project, s.conversations, s.chunks, latest
            );
        }
    }

    println!();

    services.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
