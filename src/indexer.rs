//! Upsert / re-index protocol.
//!
//! Keeps the vector index consistent with the record store. Indexing a
//! conversation always replaces everything the index holds for it:
//!
//! 1. chunk the conversation ([`crate::chunk`]);
//! 2. embed every chunk in document mode, before anything is deleted, so an
//!    embedder failure leaves the previous entries intact;
//! 3. delete all chunk entries whose `conversation_id` matches;
//! 4. insert the new entries in `chunk_index` order, keyed
//!    `{conversation_id}_chunk_{chunk_index}`;
//! 5. replace the conversation's decision entries the same way.
//!
//! Running it twice leaves the same entries as running it once, and a
//! conversation that shrank leaves no stale chunks behind. Steps 3 and 4 are
//! not atomic; re-running the indexer is the recovery path.

use crate::chunk::{chunk_conversation, DEFAULT_MIN_ASSISTANT_CHARS};
use crate::embedding::EmbeddingProvider;
use crate::error::{GraphError, Result};
use crate::models::{Chunk, Conversation, DecisionRecord};
use crate::store::{Attributes, Collection, Filter, IndexEntry, RecordStore, VectorIndex};

#[derive(Debug, Clone)]
pub struct IndexOptions {
    pub min_assistant_chars: usize,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            min_assistant_chars: DEFAULT_MIN_ASSISTANT_CHARS,
        }
    }
}

/// Entries written for one conversation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexReport {
    pub full_chunks: usize,
    pub assistant_chunks: usize,
    pub decisions: usize,
}

impl IndexReport {
    pub fn chunks_written(&self) -> usize {
        self.full_chunks + self.assistant_chunks
    }
}

/// Outcome of a full rebuild.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebuildReport {
    pub conversations: usize,
    pub skipped: usize,
    pub chunks: usize,
    pub decisions: usize,
}

/// Map a record store failure, keeping record-level errors distinguishable.
pub(crate) fn store_error(err: anyhow::Error) -> GraphError {
    match err.downcast::<GraphError>() {
        Ok(graph) => graph,
        Err(other) => GraphError::StoreUnavailable(other),
    }
}

/// Load a conversation and re-index it.
///
/// Fails with [`GraphError::NotFound`] when the record store has no such ID.
pub async fn index_conversation(
    records: &dyn RecordStore,
    index: &dyn VectorIndex,
    embedder: &dyn EmbeddingProvider,
    options: &IndexOptions,
    id: &str,
) -> Result<IndexReport> {
    let conversation = records
        .get(id)
        .await
        .map_err(store_error)?
        .ok_or_else(|| GraphError::NotFound(id.to_string()))?;
    index_record(index, embedder, options, &conversation).await
}

/// Re-index a conversation that is already in hand.
pub async fn index_record(
    index: &dyn VectorIndex,
    embedder: &dyn EmbeddingProvider,
    options: &IndexOptions,
    conversation: &Conversation,
) -> Result<IndexReport> {
    let chunks = match chunk_conversation(conversation, options.min_assistant_chars) {
        Ok(chunks) => chunks,
        Err(e) => {
            // An unchunkable record must not stay searchable under its old text.
            remove_conversation(index, &conversation.id).await?;
            return Err(e);
        }
    };

    let texts: Vec<String> = chunks
        .full
        .iter()
        .chain(chunks.assistant.iter())
        .map(|c| c.text.clone())
        .collect();
    let mut vectors = embed_all(embedder, &texts).await?.into_iter();

    let full_entries = to_entries(&chunks.full, &mut vectors)?;
    let assistant_entries = to_entries(&chunks.assistant, &mut vectors)?;

    let owned = Filter::conversation(&conversation.id);
    for (collection, entries) in [
        (Collection::MessageChunks, &full_entries),
        (Collection::AssistantChunks, &assistant_entries),
    ] {
        index
            .delete_where(collection, &owned)
            .await
            .map_err(GraphError::IndexUnavailable)?;
        if !entries.is_empty() {
            index
                .insert(collection, entries)
                .await
                .map_err(GraphError::IndexUnavailable)?;
        }
    }

    let decisions = replace_decisions(index, conversation).await?;

    let report = IndexReport {
        full_chunks: full_entries.len(),
        assistant_chunks: assistant_entries.len(),
        decisions,
    };
    tracing::debug!(
        id = %conversation.id,
        full = report.full_chunks,
        assistant = report.assistant_chunks,
        decisions = report.decisions,
        "indexed conversation"
    );
    Ok(report)
}

async fn embed_all(embedder: &dyn EmbeddingProvider, texts: &[String]) -> Result<Vec<Vec<f32>>> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }
    let vectors = embedder
        .embed_documents(texts)
        .await
        .map_err(GraphError::EmbedderUnavailable)?;
    if vectors.len() != texts.len() {
        return Err(GraphError::EmbedderUnavailable(anyhow::anyhow!(
            "embedder returned {} vectors for {} texts",
            vectors.len(),
            texts.len()
        )));
    }
    Ok(vectors)
}

fn to_entries(
    chunks: &[Chunk],
    vectors: &mut impl Iterator<Item = Vec<f32>>,
) -> Result<Vec<IndexEntry>> {
    chunks
        .iter()
        .map(|chunk| {
            let vector = vectors.next().ok_or_else(|| {
                GraphError::EmbedderUnavailable(anyhow::anyhow!("missing vector for chunk"))
            })?;
            Ok(IndexEntry {
                id: chunk.entry_id(),
                vector,
                attributes: attributes_of(chunk)?,
            })
        })
        .collect()
}

async fn replace_decisions(index: &dyn VectorIndex, conversation: &Conversation) -> Result<usize> {
    let entries = conversation
        .metadata
        .decisions
        .iter()
        .enumerate()
        .map(|(position, decision)| {
            let record = DecisionRecord {
                conversation_id: conversation.id.clone(),
                decision: decision.decision.clone(),
                rationale: decision.rationale.clone(),
                timestamp: decision
                    .timestamp
                    .clone()
                    .unwrap_or_else(|| conversation.date.clone()),
                project: conversation.metadata.project.clone(),
            };
            Ok(IndexEntry {
                id: DecisionRecord::entry_id(&conversation.id, position),
                vector: Vec::new(),
                attributes: attributes_of(&record)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    index
        .delete_where(Collection::Decisions, &Filter::conversation(&conversation.id))
        .await
        .map_err(GraphError::IndexUnavailable)?;
    if !entries.is_empty() {
        index
            .insert(Collection::Decisions, &entries)
            .await
            .map_err(GraphError::IndexUnavailable)?;
    }
    Ok(entries.len())
}

fn attributes_of<T: serde::Serialize>(value: &T) -> Result<Attributes> {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(_) => Err(GraphError::IndexUnavailable(anyhow::anyhow!(
            "index attributes must serialize to an object"
        ))),
        Err(e) => Err(GraphError::IndexUnavailable(e.into())),
    }
}

/// Remove every index entry owned by a conversation. Returns the number removed.
pub async fn remove_conversation(index: &dyn VectorIndex, id: &str) -> Result<usize> {
    let owned = Filter::conversation(id);
    let mut removed = 0;
    for collection in Collection::ALL {
        removed += index
            .delete_where(collection, &owned)
            .await
            .map_err(GraphError::IndexUnavailable)?;
    }
    Ok(removed)
}

/// Drop the whole index and re-index every conversation in the record store.
///
/// Malformed records and conversations are skipped with a warning;
/// collaborator failures abort. Safe to re-run after an interruption.
pub async fn rebuild(
    records: &dyn RecordStore,
    index: &dyn VectorIndex,
    embedder: &dyn EmbeddingProvider,
    options: &IndexOptions,
) -> Result<RebuildReport> {
    index.reset().await.map_err(GraphError::IndexUnavailable)?;

    let conversations = records.all().await.map_err(store_error)?;
    let mut report = RebuildReport::default();

    for conversation in &conversations {
        match index_record(index, embedder, options, conversation).await {
            Ok(written) => {
                report.conversations += 1;
                report.chunks += written.chunks_written();
                report.decisions += written.decisions;
            }
            Err(e) if e.is_record_level() => {
                tracing::warn!(id = %conversation.id, error = %e, "skipping conversation");
                report.skipped += 1;
            }
            Err(e) => return Err(e),
        }
    }

    tracing::info!(
        conversations = report.conversations,
        skipped = report.skipped,
        chunks = report.chunks,
        "rebuilt index"
    );
    Ok(report)
}
