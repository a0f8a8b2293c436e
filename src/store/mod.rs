//! Storage contracts for the conversation memory.
//!
//! Two collaborators back the engine:
//!
//! - [`RecordStore`]: the authoritative store of [`Conversation`] records,
//!   keyed by ID;
//! - [`VectorIndex`]: derived `(id, vector, attributes)` entries in named
//!   [`Collection`]s, answering nearest-neighbour queries.
//!
//! The index is always rebuildable from the record store. Engine code in
//! [`crate::indexer`] and [`crate::relate`] is generic over both traits so
//! the in-memory implementations in [`memory`] can stand in for the flat-file
//! store and the SQLite index.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod json_files;
pub mod memory;

use std::cmp::Ordering;
use std::fmt;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::models::{Conversation, ConversationSummary};

/// Attribute map stored alongside each index entry.
pub type Attributes = serde_json::Map<String, Value>;

/// Named collections in the vector index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    /// Full user+assistant turn pairs, used for search.
    MessageChunks,
    /// Assistant-only turns, used for relationship discovery.
    AssistantChunks,
    /// Decisions denormalized from conversation metadata.
    Decisions,
}

impl Collection {
    pub const ALL: [Collection; 3] = [
        Collection::MessageChunks,
        Collection::AssistantChunks,
        Collection::Decisions,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Collection::MessageChunks => "message_chunks",
            Collection::AssistantChunks => "assistant_chunks",
            Collection::Decisions => "decisions",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Attribute filter for index lookups.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// `attributes[field] == value`.
    Equals { field: String, value: Value },
    /// `attributes[field]` is an array containing `value`.
    Contains { field: String, value: Value },
    /// Every inner filter matches.
    All(Vec<Filter>),
}

impl Filter {
    pub fn equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Equals {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn contains(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Contains {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Filter selecting every entry owned by one conversation.
    pub fn conversation(id: &str) -> Self {
        Filter::equals("conversation_id", id)
    }

    /// Combine optional filters; `None` when nothing constrains the lookup.
    pub fn all_of(filters: Vec<Filter>) -> Option<Filter> {
        let mut filters = filters;
        match filters.len() {
            0 => None,
            1 => filters.pop(),
            _ => Some(Filter::All(filters)),
        }
    }

    pub fn matches(&self, attributes: &Attributes) -> bool {
        match self {
            Filter::Equals { field, value } => attributes.get(field) == Some(value),
            Filter::Contains { field, value } => match attributes.get(field) {
                Some(Value::Array(items)) => items.contains(value),
                _ => false,
            },
            Filter::All(filters) => filters.iter().all(|f| f.matches(attributes)),
        }
    }
}

/// An entry written to the vector index.
///
/// An empty `vector` marks an attribute-only entry (decisions): it can be
/// fetched by filter but never appears in nearest-neighbour results.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub id: String,
    pub vector: Vec<f32>,
    pub attributes: Attributes,
}

/// A nearest-neighbour result. `distance` is cosine distance (0 = identical).
#[derive(Debug, Clone, PartialEq)]
pub struct QueryHit {
    pub id: String,
    pub attributes: Attributes,
    pub distance: f32,
}

impl QueryHit {
    pub fn similarity(&self) -> f32 {
        1.0 - self.distance
    }
}

/// An entry returned by [`VectorIndex::fetch_where`].
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedEntry {
    pub id: String,
    pub attributes: Attributes,
    pub vector: Option<Vec<f32>>,
}

/// Optional constraints for [`RecordStore::list`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListFilter {
    pub project: Option<String>,
    pub topic: Option<String>,
    pub tag: Option<String>,
}

impl ListFilter {
    pub fn matches_summary(&self, summary: &ConversationSummary) -> bool {
        if let Some(project) = &self.project {
            if summary.project.as_ref() != Some(project) {
                return false;
            }
        }
        if let Some(topic) = &self.topic {
            if !summary.topics.contains(topic) {
                return false;
            }
        }
        true
    }
}

/// Authoritative conversation storage.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Load one conversation; `Ok(None)` when the ID is unknown.
    async fn get(&self, id: &str) -> Result<Option<Conversation>>;

    /// Summaries matching `filter`, newest first.
    ///
    /// Project and topic use the summary index; a tag constraint loads each
    /// candidate's full record.
    async fn list(&self, filter: &ListFilter) -> Result<Vec<ConversationSummary>>;

    /// Insert or replace a conversation and its summary.
    async fn put(&self, conversation: &Conversation) -> Result<()>;

    /// Every readable conversation, newest first. Unreadable records are
    /// skipped with a warning.
    async fn all(&self) -> Result<Vec<Conversation>>;

    /// Remove a conversation. Returns whether it existed.
    async fn delete(&self, id: &str) -> Result<bool>;
}

/// Derived nearest-neighbour storage.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert entries, replacing any with the same ID in the collection.
    async fn insert(&self, collection: Collection, entries: &[IndexEntry]) -> Result<()>;

    /// Delete every entry matching `filter`. Returns the number removed.
    async fn delete_where(&self, collection: Collection, filter: &Filter) -> Result<usize>;

    /// Up to `limit` nearest entries, ascending by cosine distance.
    async fn query(
        &self,
        collection: Collection,
        near: &[f32],
        limit: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<QueryHit>>;

    /// Up to `limit` entries matching `filter`, ordered by ID.
    async fn fetch_where(
        &self,
        collection: Collection,
        filter: Option<&Filter>,
        limit: usize,
        include_vector: bool,
    ) -> Result<Vec<FetchedEntry>>;

    /// Drop every entry in every collection.
    async fn reset(&self) -> Result<()>;

    async fn count(&self, collection: Collection) -> Result<usize>;
}

/// Sort hits by ascending distance (ties by ID) and keep the first `limit`.
pub(crate) fn rank_hits(mut hits: Vec<QueryHit>, limit: usize) -> Vec<QueryHit> {
    hits.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    hits.truncate(limit);
    hits
}

/// Cosine distance between two vectors; 1.0 when either is degenerate.
pub(crate) fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - crate::embedding::cosine_similarity(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs(value: Value) -> Attributes {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_equals_filter() {
        let a = attrs(json!({"project": "demo", "conversation_id": "c1"}));
        assert!(Filter::equals("project", "demo").matches(&a));
        assert!(!Filter::equals("project", "other").matches(&a));
        assert!(!Filter::equals("missing", "demo").matches(&a));
        assert!(Filter::conversation("c1").matches(&a));
    }

    #[test]
    fn test_null_project_does_not_match_string() {
        let a = attrs(json!({"project": null}));
        assert!(!Filter::equals("project", "demo").matches(&a));
        assert!(Filter::equals("project", Value::Null).matches(&a));
    }

    #[test]
    fn test_contains_filter() {
        let a = attrs(json!({"topics": ["caching", "rust"], "project": "demo"}));
        assert!(Filter::contains("topics", "rust").matches(&a));
        assert!(!Filter::contains("topics", "go").matches(&a));
        // Not an array.
        assert!(!Filter::contains("project", "demo").matches(&a));
    }

    #[test]
    fn test_all_of() {
        assert_eq!(Filter::all_of(Vec::new()), None);
        let single = Filter::all_of(vec![Filter::equals("project", "demo")]);
        assert_eq!(single, Some(Filter::equals("project", "demo")));

        let both = Filter::all_of(vec![
            Filter::equals("project", "demo"),
            Filter::contains("topics", "caching"),
        ])
        .unwrap();
        assert!(both.matches(&attrs(json!({"project": "demo", "topics": ["caching"]}))));
        assert!(!both.matches(&attrs(json!({"project": "demo", "topics": []}))));
    }

    #[test]
    fn test_rank_hits_orders_and_truncates() {
        let hit = |id: &str, distance: f32| QueryHit {
            id: id.to_string(),
            attributes: Attributes::new(),
            distance,
        };
        let ranked = rank_hits(
            vec![hit("c", 0.3), hit("b", 0.1), hit("a", 0.1), hit("d", 0.9)],
            3,
        );
        let ids: Vec<&str> = ranked.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_list_filter_on_summary() {
        let summary = ConversationSummary {
            id: "x".into(),
            date: "2025-01-01T00:00:00".into(),
            title: "t".into(),
            project: Some("demo".into()),
            topics: vec!["caching".into()],
        };
        assert!(ListFilter::default().matches_summary(&summary));
        let by_topic = ListFilter {
            topic: Some("caching".into()),
            ..ListFilter::default()
        };
        assert!(by_topic.matches_summary(&summary));
        let by_project = ListFilter {
            project: Some("other".into()),
            ..ListFilter::default()
        };
        assert!(!by_project.matches_summary(&summary));
    }
}
