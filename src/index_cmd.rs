//! `index` and `rebuild` commands.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::indexer;
use crate::services::{self, Services};

fn require_embedding(config: &Config) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in the config first.");
    }
    Ok(())
}

pub async fn run_index(config: &Config, id: &str) -> Result<()> {
    require_embedding(config)?;
    let services = Services::open(config).await?;
    let embedder = services::embedder(config)?;

    let report = indexer::index_conversation(
        &services.records,
        &services.index,
        embedder.as_ref(),
        &services::index_options(config),
        id,
    )
    .await?;

    println!(
        "Indexed {}: {} full chunk(s), {} assistant chunk(s), {} decision(s)",
        id, report.full_chunks, report.assistant_chunks, report.decisions
    );
    services.close().await;
    Ok(())
}

pub async fn run_rebuild(config: &Config) -> Result<()> {
    require_embedding(config)?;
    let services = Services::open(config).await?;
    let embedder = services::embedder(config)?;

    let report = indexer::rebuild(
        &services.records,
        &services.index,
        embedder.as_ref(),
        &services::index_options(config),
    )
    .await?;

    println!("Rebuild complete");
    println!("  conversations: {}", report.conversations);
    println!("  skipped:       {}", report.skipped);
    println!("  chunks:        {}", report.chunks);
    println!("  decisions:     {}", report.decisions);
    services.close().await;
    Ok(())
}
