//! Flat-file [`RecordStore`]: one JSON document per conversation.
//!
//! Layout of the store directory:
//!
//! ```text
//! conversations/
//! ├── index.json              {"conversations": [summary, …]}
//! ├── 20251127-1a2b3c4d.json  full Conversation document
//! └── …
//! ```
//!
//! `index.json` is the [`SummaryIndex`]: loaded once when the store opens,
//! mutated in memory and rewritten whole after every `put`/`delete`. Writes
//! go to a temporary file that is renamed into place. Two processes writing
//! the same store race last-writer-wins.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::GraphError;
use crate::models::{Conversation, ConversationSummary};

use super::{ListFilter, RecordStore};

const INDEX_FILE: &str = "index.json";

/// The summary index persisted as `index.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryIndex {
    #[serde(default)]
    conversations: Vec<ConversationSummary>,
}

impl SummaryIndex {
    /// Load from `path`; a missing file is an empty index.
    pub async fn load(path: &Path) -> Result<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(raw) => serde_json::from_str(&raw)
                .with_context(|| format!("Failed to parse summary index: {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(anyhow::Error::new(e)
                .context(format!("Failed to read summary index: {}", path.display()))),
        }
    }

    pub async fn persist(&self, path: &Path) -> Result<()> {
        let body = serde_json::to_string_pretty(self)?;
        write_atomic(path, body.as_bytes()).await
    }

    /// Insert a summary, replacing any entry with the same ID in place.
    pub fn upsert(&mut self, summary: ConversationSummary) {
        match self.conversations.iter_mut().find(|s| s.id == summary.id) {
            Some(existing) => *existing = summary,
            None => self.conversations.push(summary),
        }
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.conversations.len();
        self.conversations.retain(|s| s.id != id);
        before != self.conversations.len()
    }

    pub fn get(&self, id: &str) -> Option<&ConversationSummary> {
        self.conversations.iter().find(|s| s.id == id)
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    /// Entries sorted newest first (ties by ID).
    pub fn newest_first(&self) -> Vec<ConversationSummary> {
        let mut entries = self.conversations.clone();
        entries.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.id.cmp(&b.id)));
        entries
    }
}

/// Whether `id` can name a document in a [`JsonRecordStore`]: non-empty,
/// `[A-Za-z0-9_-]` only, and not the summary index name.
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id != INDEX_FILE.trim_end_matches(".json")
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Directory-backed conversation store.
pub struct JsonRecordStore {
    dir: PathBuf,
    index: RwLock<SummaryIndex>,
}

impl JsonRecordStore {
    /// Open (creating if needed) the store directory and load its index.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create store directory: {}", dir.display()))?;
        let index = SummaryIndex::load(&dir.join(INDEX_FILE)).await?;
        tracing::debug!(dir = %dir.display(), conversations = index.len(), "opened record store");
        Ok(Self {
            dir,
            index: RwLock::new(index),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn index_path(&self) -> PathBuf {
        self.dir.join(INDEX_FILE)
    }

    /// Path of a conversation document; `None` for IDs that are not plain file names.
    fn document_path(&self, id: &str) -> Option<PathBuf> {
        is_valid_id(id).then(|| self.dir.join(format!("{}.json", id)))
    }

    async fn read_document(&self, id: &str) -> Result<Option<Conversation>> {
        let Some(path) = self.document_path(id) else {
            return Ok(None);
        };
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("Failed to read conversation: {}", path.display())))
            }
        };
        match serde_json::from_str::<Conversation>(&raw) {
            Ok(conversation) => Ok(Some(conversation)),
            Err(e) => Err(GraphError::MalformedRecord {
                id: id.to_string(),
                reason: e.to_string(),
            }
            .into()),
        }
    }
}

#[async_trait]
impl RecordStore for JsonRecordStore {
    async fn get(&self, id: &str) -> Result<Option<Conversation>> {
        self.read_document(id).await
    }

    async fn list(&self, filter: &ListFilter) -> Result<Vec<ConversationSummary>> {
        let candidates: Vec<ConversationSummary> = self
            .index
            .read()
            .await
            .newest_first()
            .into_iter()
            .filter(|s| filter.matches_summary(s))
            .collect();

        let Some(tag) = &filter.tag else {
            return Ok(candidates);
        };

        // Tags live only in the full documents.
        let mut tagged = Vec::new();
        for summary in candidates {
            match self.read_document(&summary.id).await {
                Ok(Some(conversation)) if conversation.metadata.tags.contains(tag) => {
                    tagged.push(summary)
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(id = %summary.id, error = %e, "skipping unreadable conversation")
                }
            }
        }
        Ok(tagged)
    }

    async fn put(&self, conversation: &Conversation) -> Result<()> {
        let path = self
            .document_path(&conversation.id)
            .ok_or_else(|| GraphError::MalformedRecord {
                id: conversation.id.clone(),
                reason: "id is not a valid file name for the store".to_string(),
            })?;
        let body = serde_json::to_string_pretty(conversation)?;

        let mut index = self.index.write().await;
        write_atomic(&path, body.as_bytes()).await?;
        index.upsert(conversation.summary());
        index.persist(&self.index_path()).await
    }

    async fn all(&self) -> Result<Vec<Conversation>> {
        let summaries = self.index.read().await.newest_first();
        let mut conversations = Vec::with_capacity(summaries.len());
        for summary in summaries {
            match self.read_document(&summary.id).await {
                Ok(Some(conversation)) => conversations.push(conversation),
                Ok(None) => {
                    tracing::warn!(id = %summary.id, "indexed conversation has no document")
                }
                Err(e) => match e.downcast::<GraphError>() {
                    Ok(malformed) => {
                        tracing::warn!(
                            id = %summary.id,
                            error = %malformed,
                            "skipping malformed record"
                        )
                    }
                    Err(e) => return Err(e),
                },
            }
        }
        Ok(conversations)
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let mut index = self.index.write().await;
        let mut existed = false;
        if let Some(path) = self.document_path(id) {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => existed = true,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(anyhow::Error::new(e)
                        .context(format!("Failed to delete conversation: {}", path.display())))
                }
            }
        }
        if index.remove(id) {
            existed = true;
            index.persist(&self.index_path()).await?;
        }
        Ok(existed)
    }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes)
        .await
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}
