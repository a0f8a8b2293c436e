//! In-memory [`RecordStore`] and [`VectorIndex`] implementations.
//!
//! Uses `BTreeMap`s behind `tokio::sync::RwLock`. Vector queries are
//! brute-force cosine distance over every stored vector in the collection.
//! Used by the library tests and by callers that want the engine without
//! touching disk.

use std::collections::{BTreeMap, HashMap};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::models::{Conversation, ConversationSummary};

use super::{
    cosine_distance, rank_hits, Collection, FetchedEntry, Filter, IndexEntry, ListFilter,
    QueryHit, RecordStore, VectorIndex,
};

/// In-memory conversation store.
#[derive(Default)]
pub struct InMemoryRecordStore {
    records: RwLock<BTreeMap<String, Conversation>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first(a: &ConversationSummary, b: &ConversationSummary) -> std::cmp::Ordering {
    b.date.cmp(&a.date).then_with(|| a.id.cmp(&b.id))
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn get(&self, id: &str) -> Result<Option<Conversation>> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn list(&self, filter: &ListFilter) -> Result<Vec<ConversationSummary>> {
        let records = self.records.read().await;
        let mut summaries: Vec<ConversationSummary> = records
            .values()
            .filter(|c| match &filter.tag {
                Some(tag) => c.metadata.tags.contains(tag),
                None => true,
            })
            .map(Conversation::summary)
            .filter(|s| filter.matches_summary(s))
            .collect();
        summaries.sort_by(newest_first);
        Ok(summaries)
    }

    async fn put(&self, conversation: &Conversation) -> Result<()> {
        self.records
            .write()
            .await
            .insert(conversation.id.clone(), conversation.clone());
        Ok(())
    }

    async fn all(&self) -> Result<Vec<Conversation>> {
        let mut all: Vec<Conversation> = self.records.read().await.values().cloned().collect();
        all.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.id.cmp(&b.id)));
        Ok(all)
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.records.write().await.remove(id).is_some())
    }
}

/// In-memory vector index, one ordered map per collection.
#[derive(Default)]
pub struct InMemoryVectorIndex {
    collections: RwLock<HashMap<Collection, BTreeMap<String, IndexEntry>>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn insert(&self, collection: Collection, entries: &[IndexEntry]) -> Result<()> {
        let mut collections = self.collections.write().await;
        let stored = collections.entry(collection).or_default();
        for entry in entries {
            stored.insert(entry.id.clone(), entry.clone());
        }
        Ok(())
    }

    async fn delete_where(&self, collection: Collection, filter: &Filter) -> Result<usize> {
        let mut collections = self.collections.write().await;
        let Some(stored) = collections.get_mut(&collection) else {
            return Ok(0);
        };
        let before = stored.len();
        stored.retain(|_, entry| !filter.matches(&entry.attributes));
        Ok(before - stored.len())
    }

    async fn query(
        &self,
        collection: Collection,
        near: &[f32],
        limit: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<QueryHit>> {
        let collections = self.collections.read().await;
        let Some(stored) = collections.get(&collection) else {
            return Ok(Vec::new());
        };
        let hits = stored
            .values()
            .filter(|e| !e.vector.is_empty())
            .filter(|e| filter.map_or(true, |f| f.matches(&e.attributes)))
            .map(|e| QueryHit {
                id: e.id.clone(),
                attributes: e.attributes.clone(),
                distance: cosine_distance(near, &e.vector),
            })
            .collect();
        Ok(rank_hits(hits, limit))
    }

    async fn fetch_where(
        &self,
        collection: Collection,
        filter: Option<&Filter>,
        limit: usize,
        include_vector: bool,
    ) -> Result<Vec<FetchedEntry>> {
        let collections = self.collections.read().await;
        let Some(stored) = collections.get(&collection) else {
            return Ok(Vec::new());
        };
        Ok(stored
            .values()
            .filter(|e| filter.map_or(true, |f| f.matches(&e.attributes)))
            .take(limit)
            .map(|e| FetchedEntry {
                id: e.id.clone(),
                attributes: e.attributes.clone(),
                vector: include_vector.then(|| e.vector.clone()),
            })
            .collect())
    }

    async fn reset(&self) -> Result<()> {
        self.collections.write().await.clear();
        Ok(())
    }

    async fn count(&self, collection: Collection) -> Result<usize> {
        Ok(self
            .collections
            .read()
            .await
            .get(&collection)
            .map_or(0, BTreeMap::len))
    }
}
