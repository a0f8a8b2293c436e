//! `list` and `show` commands.
//!
//! Both read only the record store, so neither needs the vector index or
//! an embedding provider.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::models::{Conversation, ConversationSummary};
use crate::store::json_files::JsonRecordStore;
use crate::store::{ListFilter, RecordStore};

pub async fn run_list(config: &Config, filter: ListFilter) -> Result<()> {
    let records = JsonRecordStore::open(&config.store.path).await?;
    let summaries = records.list(&filter).await?;

    if summaries.is_empty() {
        println!("No conversations.");
        return Ok(());
    }

    for summary in &summaries {
        println!("{}", format_summary(summary));
    }
    println!();
    println!("{} conversation(s)", summaries.len());
    Ok(())
}

pub async fn run_show(config: &Config, id: &str, json: bool) -> Result<()> {
    let records = JsonRecordStore::open(&config.store.path).await?;
    let Some(conversation) = records.get(id).await? else {
        bail!("conversation not found: {}", id);
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&conversation)?);
    } else {
        print!("{}", format_conversation(&conversation));
    }
    Ok(())
}

fn format_summary(summary: &ConversationSummary) -> String {
    let mut line = format!("{}  {}  {}", summary.id, summary.day(), summary.title);
    if let Some(project) = &summary.project {
        line.push_str(&format!("  [{}]", project));
    }
    if !summary.topics.is_empty() {
        line.push_str(&format!("  ({})", summary.topics.join(", ")));
    }
    line
}

fn format_conversation(conversation: &Conversation) -> String {
    let meta = &conversation.metadata;
    let mut out = String::new();
    out.push_str(&format!("# {}\n", conversation.title));
    out.push_str(&format!("ID:       {}\n", conversation.id));
    out.push_str(&format!("Date:     {}\n", conversation.date));
    out.push_str(&format!(
        "Project:  {}\n",
        meta.project.as_deref().unwrap_or("-")
    ));
    if !meta.topics.is_empty() {
        out.push_str(&format!("Topics:   {}\n", meta.topics.join(", ")));
    }
    if !meta.tags.is_empty() {
        out.push_str(&format!("Tags:     {}\n", meta.tags.join(", ")));
    }
    out.push('\n');

    for message in &conversation.messages {
        out.push_str(&format!("[{}]\n{}\n\n", message.role, message.content));
    }

    if !meta.decisions.is_empty() {
        out.push_str("Decisions:\n");
        for d in &meta.decisions {
            out.push_str(&format!("  • {}\n", d.decision));
            if !d.rationale.is_empty() {
                out.push_str(&format!("    Rationale: {}\n", d.rationale));
            }
        }
    }
    out
}
