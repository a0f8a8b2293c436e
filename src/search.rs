//! `search` and `recall` commands.
//!
//! Both run [`relate::search`] over the full-chunk collection. `search`
//! prints a ranked list; `recall` prints a context block meant to be pasted
//! or piped into an assistant session.

use anyhow::Result;

use crate::config::Config;
use crate::relate::{self, SearchFilter, SearchHit};
use crate::services::{self, Services};
use crate::store::RecordStore;

const PREVIEW_CHARS: usize = 200;
const SUMMARY_CHARS: usize = 150;

pub async fn run_search(
    config: &Config,
    query: &str,
    limit: Option<usize>,
    filter: SearchFilter,
) -> Result<()> {
    let services = Services::open(config).await?;
    let embedder = services::embedder(config)?;
    let limit = limit.unwrap_or(config.retrieval.search_limit);

    let hits = relate::search(&services.index, embedder.as_ref(), query, limit, &filter).await?;

    if hits.is_empty() {
        println!("No results.");
    }

    for (i, hit) in hits.iter().enumerate() {
        let chunk = &hit.chunk;
        println!(
            "{}. [{:.0}%] {} ({})",
            i + 1,
            hit.similarity() * 100.0,
            chunk.title,
            day(&chunk.timestamp)
        );
        println!(
            "    project: {} | id: {} | chunk: {}",
            chunk.project.as_deref().unwrap_or("-"),
            chunk.conversation_id,
            chunk.chunk_index
        );
        println!("    {}", preview(&chunk.text, PREVIEW_CHARS));
        println!();
    }

    services.close().await;
    Ok(())
}

pub async fn run_recall(
    config: &Config,
    query: &str,
    limit: Option<usize>,
    project: Option<String>,
) -> Result<()> {
    let services = Services::open(config).await?;
    let embedder = services::embedder(config)?;
    let limit = limit.unwrap_or(config.retrieval.recall_limit);
    let filter = SearchFilter {
        project,
        topic: None,
    };

    let hits = relate::search(&services.index, embedder.as_ref(), query, limit, &filter).await?;

    if hits.is_empty() {
        println!("No relevant conversations found for: {}", query);
        services.close().await;
        return Ok(());
    }

    println!("=== RECALLED CONTEXT: {} ===", query);
    println!();

    for (i, hit) in hits.iter().enumerate() {
        let date = conversation_day(&services.records, hit).await;
        println!("--- [{}] {} ---", i + 1, hit.chunk.title);
        println!(
            "Date: {} | Project: {}",
            date,
            hit.chunk.project.as_deref().unwrap_or("-")
        );
        println!();
        println!("{}", hit.chunk.text);
        println!();
        println!(
            "Summary: User asked about {}...",
            user_turn(&hit.chunk.text, SUMMARY_CHARS)
        );
        println!();
    }

    println!("=== END RECALLED CONTEXT ===");
    services.close().await;
    Ok(())
}

/// Day of the owning conversation, falling back to the chunk timestamp.
async fn conversation_day(records: &dyn RecordStore, hit: &SearchHit) -> String {
    match records.get(&hit.chunk.conversation_id).await {
        Ok(Some(conversation)) => conversation.day().to_string(),
        _ => day(&hit.chunk.timestamp).to_string(),
    }
}

fn day(timestamp: &str) -> &str {
    timestamp.get(..10).unwrap_or(timestamp)
}

/// The user half of a `"User: …\n\nAssistant: …"` chunk, trimmed to `max_chars`.
pub fn user_turn(text: &str, max_chars: usize) -> String {
    let after_user = text.rsplit("User:").next().unwrap_or(text);
    let user = after_user.split("Assistant:").next().unwrap_or(after_user);
    user.trim().chars().take(max_chars).collect()
}

fn preview(text: &str, max_chars: usize) -> String {
    let flat: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        flat
    } else {
        let cut: String = flat.chars().take(max_chars).collect();
        format!("{}…", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_turn() {
        let text = "User: How do I evict entries?\n\nAssistant: Use LRU.";
        assert_eq!(user_turn(text, 150), "How do I evict entries?");
        assert_eq!(user_turn(text, 6), "How do");
    }

    #[test]
    fn test_user_turn_without_markers() {
        assert_eq!(user_turn("  plain text ", 150), "plain text");
    }

    #[test]
    fn test_preview_flattens_and_truncates() {
        assert_eq!(preview("a\n\nb   c", 10), "a b c");
        assert_eq!(preview("abcdef", 3), "abc…");
    }

    #[test]
    fn test_day() {
        assert_eq!(day("2025-11-27T10:00:00"), "2025-11-27");
        assert_eq!(day("2025"), "2025");
    }
}
