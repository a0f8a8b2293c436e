//! Wiring from [`Config`] to the concrete collaborators used by commands.

use anyhow::Result;

use crate::config::Config;
use crate::db;
use crate::embedding::{create_provider, EmbeddingProvider};
use crate::indexer::IndexOptions;
use crate::relate::{GraphOptions, SimilarOptions};
use crate::sqlite_index::SqliteVectorIndex;
use crate::store::json_files::JsonRecordStore;

/// The record store and vector index named by the config.
pub struct Services {
    pub records: JsonRecordStore,
    pub index: SqliteVectorIndex,
}

impl Services {
    pub async fn open(config: &Config) -> Result<Self> {
        let records = JsonRecordStore::open(&config.store.path).await?;
        let pool = db::connect(config).await?;
        let index = SqliteVectorIndex::new(pool).await?;
        Ok(Self { records, index })
    }

    pub async fn close(self) {
        self.index.pool().close().await;
    }
}

/// The configured embedding provider. Created per command so that commands
/// which never embed do not need provider credentials.
pub fn embedder(config: &Config) -> Result<Box<dyn EmbeddingProvider>> {
    create_provider(&config.embedding)
}

pub fn index_options(config: &Config) -> IndexOptions {
    IndexOptions {
        min_assistant_chars: config.chunking.min_assistant_chars,
    }
}

pub fn similar_options(
    config: &Config,
    threshold: Option<f32>,
    limit: Option<usize>,
) -> SimilarOptions {
    SimilarOptions {
        threshold: threshold.unwrap_or(config.retrieval.similar_threshold),
        limit: limit.unwrap_or(config.retrieval.similar_limit),
        source_chunk_limit: config.retrieval.source_chunk_limit,
        snippet_chars: config.retrieval.snippet_chars,
    }
}

pub fn graph_options(config: &Config, threshold: Option<f32>) -> GraphOptions {
    GraphOptions {
        threshold: threshold.unwrap_or(config.graph.threshold),
        links_per_conversation: config.graph.links_per_conversation,
        scan_limit: config.graph.scan_limit,
        source_chunk_limit: config.retrieval.source_chunk_limit,
        snippet_chars: config.retrieval.snippet_chars,
    }
}
