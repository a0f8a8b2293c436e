//! Relationship engine: questions answered over the record store and the
//! vector index.
//!
//! Two notions of connection between conversations are kept apart:
//!
//! - **relatedness** ([`find_related`]) is metadata-derived: shared topics
//!   or a shared project. No embeddings are involved.
//! - **similarity** ([`find_similar_across`], [`build_graph`]) is
//!   embedding-derived: assistant chunks of one conversation that sit close
//!   to chunks of another.
//!
//! Every function is stateless over the stores at call time. Distances are
//! cosine distances; similarity is `1 - distance` and thresholds are
//! inclusive.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use serde_json::Value;

use crate::embedding::EmbeddingProvider;
use crate::error::{GraphError, Result};
use crate::indexer::store_error;
use crate::models::{Chunk, DecisionRecord};
use crate::store::{
    Attributes, Collection, FetchedEntry, Filter, ListFilter, RecordStore, VectorIndex,
};

/// Project bucket for conversations without one in [`topics_by_project`].
pub const UNKNOWN_PROJECT: &str = "unknown";

/// How many extra neighbours to request per source chunk, to make room for
/// hits from the source conversation itself.
const SELF_MATCH_HEADROOM: usize = 5;

// ============ Search ============

/// Optional attribute constraints for [`search`].
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    pub project: Option<String>,
    /// Chunks whose conversation carries this topic.
    pub topic: Option<String>,
}

impl SearchFilter {
    fn to_filter(&self) -> Option<Filter> {
        let mut filters = Vec::new();
        if let Some(project) = &self.project {
            filters.push(Filter::equals("project", project.as_str()));
        }
        if let Some(topic) = &self.topic {
            filters.push(Filter::contains("topics", topic.as_str()));
        }
        Filter::all_of(filters)
    }
}

/// A full chunk returned by [`search`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub entry_id: String,
    pub chunk: Chunk,
    pub distance: f32,
}

impl SearchHit {
    pub fn similarity(&self) -> f32 {
        1.0 - self.distance
    }
}

/// Nearest full chunks to `query`, ascending by distance.
///
/// The query is embedded in query mode. A blank query returns nothing.
pub async fn search(
    index: &dyn VectorIndex,
    embedder: &dyn EmbeddingProvider,
    query: &str,
    limit: usize,
    filter: &SearchFilter,
) -> Result<Vec<SearchHit>> {
    if query.trim().is_empty() || limit == 0 {
        return Ok(Vec::new());
    }

    let vector = embedder
        .embed_query(query)
        .await
        .map_err(GraphError::EmbedderUnavailable)?;
    let hits = index
        .query(
            Collection::MessageChunks,
            &vector,
            limit,
            filter.to_filter().as_ref(),
        )
        .await
        .map_err(GraphError::IndexUnavailable)?;

    Ok(hits
        .into_iter()
        .filter_map(|hit| {
            let chunk = chunk_from(&hit.id, hit.attributes)?;
            Some(SearchHit {
                entry_id: hit.id,
                chunk,
                distance: hit.distance,
            })
        })
        .collect())
}

fn chunk_from(id: &str, attributes: Attributes) -> Option<Chunk> {
    match serde_json::from_value(Value::Object(attributes)) {
        Ok(chunk) => Some(chunk),
        Err(e) => {
            tracing::warn!(id, error = %e, "skipping malformed index entry");
            None
        }
    }
}

// ============ Relatedness ============

/// A conversation related to the source by metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelatedConversation {
    pub conversation_id: String,
    pub title: String,
    pub project: Option<String>,
    pub topic_overlap: usize,
    pub same_project: bool,
}

impl RelatedConversation {
    /// The strongest metadata edge from `source_id` to this conversation.
    pub fn edge(&self, source_id: &str) -> RelationshipEdge {
        let (kind, score) = if self.topic_overlap > 0 {
            (EdgeKind::TopicOverlap, self.topic_overlap as f32)
        } else {
            (EdgeKind::SameProject, 1.0)
        };
        RelationshipEdge {
            source_id: source_id.to_string(),
            target_id: self.conversation_id.clone(),
            kind,
            score,
        }
    }
}

/// Conversations sharing topics or the project with `id`.
///
/// Scans at most `scan_limit` conversations (newest first). A target
/// qualifies with at least one shared topic or the same project; both
/// projects must be set to count as the same. Ordered by topic overlap,
/// then same-project, otherwise newest first. Unknown IDs yield nothing.
pub async fn find_related(
    records: &dyn RecordStore,
    id: &str,
    limit: usize,
    scan_limit: usize,
) -> Result<Vec<RelatedConversation>> {
    let Some(source) = records.get(id).await.map_err(store_error)? else {
        return Ok(Vec::new());
    };
    let source_topics: BTreeSet<&str> = source.metadata.topics.iter().map(String::as_str).collect();
    let source_project = source.project();

    let summaries = records
        .list(&ListFilter::default())
        .await
        .map_err(store_error)?;

    let mut related: Vec<RelatedConversation> = summaries
        .into_iter()
        .take(scan_limit)
        .filter(|s| s.id != id)
        .filter_map(|summary| {
            let target_topics: BTreeSet<&str> = summary.topics.iter().map(String::as_str).collect();
            let topic_overlap = source_topics.intersection(&target_topics).count();
            let same_project =
                source_project.is_some() && source_project == summary.project.as_deref();
            (topic_overlap > 0 || same_project).then(|| RelatedConversation {
                conversation_id: summary.id.clone(),
                title: summary.title.clone(),
                project: summary.project.clone(),
                topic_overlap,
                same_project,
            })
        })
        .collect();

    // Stable: equal keys keep newest-first order.
    related.sort_by(|a, b| {
        (b.topic_overlap, b.same_project).cmp(&(a.topic_overlap, a.same_project))
    });
    related.truncate(limit);
    Ok(related)
}

// ============ Similarity ============

/// Tuning for [`find_similar_across`].
#[derive(Debug, Clone)]
pub struct SimilarOptions {
    /// Minimum similarity, inclusive.
    pub threshold: f32,
    pub limit: usize,
    /// Upper bound on source chunks examined.
    pub source_chunk_limit: usize,
    pub snippet_chars: usize,
}

impl Default for SimilarOptions {
    fn default() -> Self {
        Self {
            threshold: 0.8,
            limit: 10,
            source_chunk_limit: 100,
            snippet_chars: 100,
        }
    }
}

/// Another conversation whose chunks sit close to the source's.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarConversation {
    pub conversation_id: String,
    pub title: String,
    pub project: Option<String>,
    pub similarity: f32,
    pub source_snippet: String,
    pub match_snippet: String,
}

/// Conversations with chunks similar to those of `id`.
///
/// Uses the assistant-chunk collection, falling back to full chunks when
/// the source has no assistant chunks. For each source chunk the
/// `limit + 5` nearest chunks are examined; matches from the source
/// conversation and below `threshold` are dropped. Each target keeps its
/// best-scoring chunk pair. Results are ordered by similarity, descending.
pub async fn find_similar_across(
    index: &dyn VectorIndex,
    id: &str,
    options: &SimilarOptions,
) -> Result<Vec<SimilarConversation>> {
    let owned = Filter::conversation(id);
    let mut collection = Collection::AssistantChunks;
    let mut sources = fetch_sources(index, collection, &owned, options.source_chunk_limit).await?;
    if sources.is_empty() {
        collection = Collection::MessageChunks;
        sources = fetch_sources(index, collection, &owned, options.source_chunk_limit).await?;
    }

    let mut best: BTreeMap<String, SimilarConversation> = BTreeMap::new();

    for source in &sources {
        let Some(vector) = source.vector.as_deref().filter(|v| !v.is_empty()) else {
            continue;
        };
        let hits = index
            .query(collection, vector, options.limit + SELF_MATCH_HEADROOM, None)
            .await
            .map_err(GraphError::IndexUnavailable)?;

        for hit in hits {
            let Some(target) = str_attr(&hit.attributes, "conversation_id") else {
                continue;
            };
            if target == id {
                continue;
            }
            let similarity = hit.similarity();
            if similarity < options.threshold {
                continue;
            }
            if best
                .get(target)
                .is_some_and(|existing| existing.similarity >= similarity)
            {
                continue;
            }
            let link = SimilarConversation {
                conversation_id: target.to_string(),
                title: str_attr(&hit.attributes, "title").unwrap_or_default().to_string(),
                project: str_attr(&hit.attributes, "project").map(str::to_string),
                similarity,
                source_snippet: snippet(&source.attributes, options.snippet_chars),
                match_snippet: snippet(&hit.attributes, options.snippet_chars),
            };
            best.insert(link.conversation_id.clone(), link);
        }
    }

    let mut links: Vec<SimilarConversation> = best.into_values().collect();
    links.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.conversation_id.cmp(&b.conversation_id))
    });
    links.truncate(options.limit);
    Ok(links)
}

async fn fetch_sources(
    index: &dyn VectorIndex,
    collection: Collection,
    owned: &Filter,
    limit: usize,
) -> Result<Vec<FetchedEntry>> {
    index
        .fetch_where(collection, Some(owned), limit, true)
        .await
        .map_err(GraphError::IndexUnavailable)
}

fn str_attr<'a>(attributes: &'a Attributes, field: &str) -> Option<&'a str> {
    attributes.get(field).and_then(Value::as_str)
}

fn snippet(attributes: &Attributes, max_chars: usize) -> String {
    str_attr(attributes, "text")
        .unwrap_or_default()
        .chars()
        .take(max_chars)
        .collect()
}

// ============ Graph ============

/// Kind of connection between two conversations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EdgeKind {
    TopicOverlap,
    SameProject,
    EmbeddingSimilarity,
}

/// A directed, scored connection between two conversations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelationshipEdge {
    pub source_id: String,
    pub target_id: String,
    pub kind: EdgeKind,
    pub score: f32,
}

/// Tuning for [`build_graph`].
#[derive(Debug, Clone)]
pub struct GraphOptions {
    pub threshold: f32,
    pub links_per_conversation: usize,
    /// How many conversations to visit, newest first.
    pub scan_limit: usize,
    pub source_chunk_limit: usize,
    pub snippet_chars: usize,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            threshold: 0.8,
            links_per_conversation: 5,
            scan_limit: 500,
            source_chunk_limit: 100,
            snippet_chars: 100,
        }
    }
}

/// Embedding-similarity adjacency over the archive.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ConversationGraph {
    pub adjacency: BTreeMap<String, Vec<SimilarConversation>>,
}

impl ConversationGraph {
    pub fn edges(&self) -> Vec<RelationshipEdge> {
        self.adjacency
            .iter()
            .flat_map(|(source, links)| {
                links.iter().map(move |link| RelationshipEdge {
                    source_id: source.clone(),
                    target_id: link.conversation_id.clone(),
                    kind: EdgeKind::EmbeddingSimilarity,
                    score: link.similarity,
                })
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.adjacency.is_empty()
    }
}

/// Run [`find_similar_across`] for up to `scan_limit` conversations and keep
/// the non-empty results.
pub async fn build_graph(
    records: &dyn RecordStore,
    index: &dyn VectorIndex,
    options: &GraphOptions,
) -> Result<ConversationGraph> {
    let summaries = records
        .list(&ListFilter::default())
        .await
        .map_err(store_error)?;
    let similar = SimilarOptions {
        threshold: options.threshold,
        limit: options.links_per_conversation,
        source_chunk_limit: options.source_chunk_limit,
        snippet_chars: options.snippet_chars,
    };

    let mut graph = ConversationGraph::default();
    for summary in summaries.into_iter().take(options.scan_limit) {
        let links = find_similar_across(index, &summary.id, &similar).await?;
        if !links.is_empty() {
            graph.adjacency.insert(summary.id, links);
        }
    }
    tracing::info!(nodes = graph.adjacency.len(), "built conversation graph");
    Ok(graph)
}

// ============ Aggregates ============

/// Union of topics per project. Conversations without a project are
/// grouped under [`UNKNOWN_PROJECT`].
pub async fn topics_by_project(
    records: &dyn RecordStore,
) -> Result<BTreeMap<String, BTreeSet<String>>> {
    let summaries = records
        .list(&ListFilter::default())
        .await
        .map_err(store_error)?;

    let mut topics: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for summary in summaries {
        let project = summary
            .project
            .unwrap_or_else(|| UNKNOWN_PROJECT.to_string());
        topics.entry(project).or_default().extend(summary.topics);
    }
    Ok(topics)
}

/// Recorded decisions, optionally for one project.
pub async fn decisions(
    index: &dyn VectorIndex,
    project: Option<&str>,
    limit: usize,
) -> Result<Vec<DecisionRecord>> {
    let filter = project.map(|p| Filter::equals("project", p));
    let entries = index
        .fetch_where(Collection::Decisions, filter.as_ref(), limit, false)
        .await
        .map_err(GraphError::IndexUnavailable)?;

    Ok(entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value(Value::Object(entry.attributes)) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(id = %entry.id, error = %e, "skipping malformed decision entry");
                None
            }
        })
        .collect())
}
