//! `graph` subcommands: decisions, related, similar, topics and build.
//!
//! Rendering is kept in plain `format_*` functions returning strings so the
//! layouts can be tested without a store.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use anyhow::{bail, Result};

use crate::config::Config;
use crate::models::DecisionRecord;
use crate::relate::{self, ConversationGraph, RelatedConversation, SimilarConversation};
use crate::services::{self, Services};
use crate::store::json_files::JsonRecordStore;

pub async fn run_decisions(config: &Config, project: Option<&str>) -> Result<()> {
    let services = Services::open(config).await?;
    let decisions =
        relate::decisions(&services.index, project, config.retrieval.decisions_limit).await?;
    print!("{}", format_decisions(&decisions, project));
    services.close().await;
    Ok(())
}

pub async fn run_related(config: &Config, id: &str, limit: Option<usize>) -> Result<()> {
    let records = JsonRecordStore::open(&config.store.path).await?;
    let related = relate::find_related(
        &records,
        id,
        limit.unwrap_or(config.retrieval.related_limit),
        config.retrieval.related_scan_limit,
    )
    .await?;
    print!("{}", format_related(id, &related));
    Ok(())
}

/// Reject a `--threshold` override outside `[0.0, 1.0]`.
pub fn check_threshold(threshold: Option<f32>) -> Result<()> {
    match threshold {
        Some(value) if !(0.0..=1.0).contains(&value) => {
            bail!("--threshold must be in [0.0, 1.0], got {}", value)
        }
        _ => Ok(()),
    }
}

pub async fn run_similar(
    config: &Config,
    id: &str,
    threshold: Option<f32>,
    limit: Option<usize>,
) -> Result<()> {
    check_threshold(threshold)?;
    let options = services::similar_options(config, threshold, limit);
    let services = Services::open(config).await?;
    let similar = relate::find_similar_across(&services.index, id, &options).await?;
    print!("{}", format_similar(id, options.threshold, &similar));
    services.close().await;
    Ok(())
}

pub async fn run_topics(config: &Config) -> Result<()> {
    let records = JsonRecordStore::open(&config.store.path).await?;
    let topics = relate::topics_by_project(&records).await?;
    print!("{}", format_topics(&topics));
    Ok(())
}

pub async fn run_build(config: &Config, threshold: Option<f32>, json: bool) -> Result<()> {
    check_threshold(threshold)?;
    let options = services::graph_options(config, threshold);
    let services = Services::open(config).await?;
    let graph = relate::build_graph(&services.records, &services.index, &options).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&graph)?);
    } else {
        print!("{}", format_graph(&graph));
    }
    services.close().await;
    Ok(())
}

pub fn format_decisions(decisions: &[DecisionRecord], project: Option<&str>) -> String {
    if decisions.is_empty() {
        return "No decisions found\n".to_string();
    }

    let mut out = match project {
        Some(p) => format!("=== DECISIONS for {} ===\n\n", p),
        None => "=== DECISIONS ===\n\n".to_string(),
    };
    for d in decisions {
        let _ = writeln!(out, "• {}", d.decision);
        let _ = writeln!(out, "  Rationale: {}", d.rationale);
        let _ = writeln!(
            out,
            "  Project: {} | Conversation: {}",
            d.project.as_deref().unwrap_or("-"),
            d.conversation_id
        );
        out.push('\n');
    }
    out
}

pub fn format_related(id: &str, related: &[RelatedConversation]) -> String {
    if related.is_empty() {
        return format!("No related conversations found for {}\n", id);
    }

    let mut out = format!("=== RELATED TO {} ===\n\n", id);
    for r in related {
        let mut reasons = Vec::new();
        if r.topic_overlap > 0 {
            reasons.push(format!("{} shared topics", r.topic_overlap));
        }
        if r.same_project {
            reasons.push("same project".to_string());
        }
        let _ = writeln!(out, "• {}", r.title);
        let _ = writeln!(
            out,
            "  ID: {} | Project: {}",
            r.conversation_id,
            r.project.as_deref().unwrap_or("-")
        );
        let _ = writeln!(out, "  Reason: {}", reasons.join(", "));
        out.push('\n');
    }
    out
}

pub fn format_similar(id: &str, threshold: f32, similar: &[SimilarConversation]) -> String {
    if similar.is_empty() {
        return format!(
            "No similar conversations found for {} (threshold: {})\n",
            id, threshold
        );
    }

    let mut out = format!("=== SIMILAR TO {} (threshold: {}) ===\n\n", id, threshold);
    for s in similar {
        let _ = writeln!(out, "• {} ({:.0}% similar)", s.title, s.similarity * 100.0);
        let _ = writeln!(
            out,
            "  ID: {} | Project: {}",
            s.conversation_id,
            s.project.as_deref().unwrap_or("-")
        );
        let _ = writeln!(out, "  Source: \"{}...\"", s.source_snippet);
        let _ = writeln!(out, "  Match:  \"{}...\"", s.match_snippet);
        out.push('\n');
    }
    out
}

pub fn format_topics(topics: &BTreeMap<String, BTreeSet<String>>) -> String {
    let mut out = "=== TOPICS BY PROJECT ===\n\n".to_string();
    for (project, list) in topics {
        let _ = writeln!(out, "{}:", project);
        for topic in list {
            let _ = writeln!(out, "  • {}", topic);
        }
        out.push('\n');
    }
    out
}

pub fn format_graph(graph: &ConversationGraph) -> String {
    if graph.is_empty() {
        return "No similarity edges found\n".to_string();
    }

    let edges = graph.edges();
    let mut out = format!(
        "=== CONVERSATION GRAPH ({} nodes, {} edges) ===\n\n",
        graph.adjacency.len(),
        edges.len()
    );
    for edge in &edges {
        let _ = writeln!(
            out,
            "{} -> {} ({:.0}%)",
            edge.source_id,
            edge.target_id,
            edge.score * 100.0
        );
    }
    out
}
