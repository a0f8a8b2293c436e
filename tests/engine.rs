//! End-to-end behaviour of the indexer and relationship engine over the
//! in-memory stores and the deterministic hash embedder.

use std::collections::{BTreeMap, BTreeSet};

use conversation_memory::embedding::HashProvider;
use conversation_memory::error::GraphError;
use conversation_memory::indexer::{self, IndexOptions};
use conversation_memory::models::{Conversation, Decision, Message, Metadata};
use conversation_memory::relate::{self, GraphOptions, SearchFilter, SimilarOptions};
use conversation_memory::store::memory::{InMemoryRecordStore, InMemoryVectorIndex};
use conversation_memory::store::{Collection, RecordStore, VectorIndex};

const CACHE_REPLY: &str = "A bounded LRU cache keeps recently used entries in memory \
    and evicts the least recently used entry when capacity is reached.";
const CACHE_REPLY_2: &str = "A bounded LRU cache keeps recently used entries in memory \
    and evicts the least recently used entry once capacity is exceeded.";
const NET_REPLY: &str = "TCP retransmits lost segments after timeouts; tune congestion \
    windows, socket buffers, keepalive probes, Nagle batching.";

fn conversation(
    id: &str,
    date: &str,
    project: &str,
    topic: &str,
    question: &str,
    reply: &str,
) -> Conversation {
    Conversation {
        id: id.to_string(),
        date: date.to_string(),
        title: format!("{} ({})", topic, id),
        messages: vec![Message::user(question), Message::assistant(reply)],
        metadata: Metadata {
            project: Some(project.to_string()),
            topics: vec![topic.to_string()],
            ..Default::default()
        },
    }
}

struct Archive {
    records: InMemoryRecordStore,
    index: InMemoryVectorIndex,
    embedder: HashProvider,
}

async fn archive() -> Archive {
    let archive = Archive {
        records: InMemoryRecordStore::new(),
        index: InMemoryVectorIndex::new(),
        embedder: HashProvider::new(256),
    };

    let mut first = conversation(
        "20250301-aaaa0001",
        "2025-03-01T10:00:00",
        "demo",
        "caching",
        "How should I cache lookups?",
        CACHE_REPLY,
    );
    first.metadata.decisions.push(Decision {
        decision: "Use an LRU cache".to_string(),
        rationale: "Bounded memory".to_string(),
        timestamp: None,
    });
    let second = conversation(
        "20250302-aaaa0002",
        "2025-03-02T10:00:00",
        "demo",
        "caching",
        "What eviction policy fits a cache?",
        CACHE_REPLY_2,
    );
    let third = conversation(
        "20250303-bbbb0003",
        "2025-03-03T10:00:00",
        "other",
        "networking",
        "Why are my TCP connections slow?",
        NET_REPLY,
    );

    for c in [&first, &second, &third] {
        archive.records.put(c).await.unwrap();
    }
    let report = indexer::rebuild(
        &archive.records,
        &archive.index,
        &archive.embedder,
        &IndexOptions::default(),
    )
    .await
    .unwrap();
    assert_eq!(report.conversations, 3);
    assert_eq!(report.skipped, 0);
    archive
}

#[tokio::test]
async fn test_search_respects_project_filter() {
    let a = archive().await;
    let filter = SearchFilter {
        project: Some("demo".to_string()),
        topic: None,
    };
    let hits = relate::search(&a.index, &a.embedder, "LRU cache eviction", 10, &filter)
        .await
        .unwrap();

    assert_eq!(hits.len(), 2);
    for hit in &hits {
        assert_eq!(hit.chunk.project.as_deref(), Some("demo"));
    }
    assert!(hits[0].distance <= hits[1].distance);
}

#[tokio::test]
async fn test_search_by_topic_uses_denormalized_topics() {
    let a = archive().await;
    let filter = SearchFilter {
        project: None,
        topic: Some("networking".to_string()),
    };
    let hits = relate::search(&a.index, &a.embedder, "cache", 10, &filter)
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].chunk.conversation_id, "20250303-bbbb0003");
}

#[tokio::test]
async fn test_similar_finds_the_other_caching_conversation() {
    let a = archive().await;
    let options = SimilarOptions {
        threshold: 0.1,
        ..Default::default()
    };
    let similar = relate::find_similar_across(&a.index, "20250301-aaaa0001", &options)
        .await
        .unwrap();

    assert!(!similar.is_empty());
    assert_eq!(similar[0].conversation_id, "20250302-aaaa0002");
    assert!(similar[0].similarity > 0.5);
    assert!(similar.iter().all(|s| s.conversation_id != "20250301-aaaa0001"));

    let strict = SimilarOptions {
        threshold: 0.5,
        ..Default::default()
    };
    let strict = relate::find_similar_across(&a.index, "20250301-aaaa0001", &strict)
        .await
        .unwrap();
    assert!(strict.iter().all(|s| s.conversation_id != "20250303-bbbb0003"));
}

#[tokio::test]
async fn test_related_and_topics_come_from_metadata() {
    let a = archive().await;

    let related = relate::find_related(&a.records, "20250301-aaaa0001", 5, 500)
        .await
        .unwrap();
    assert_eq!(related.len(), 1);
    assert_eq!(related[0].conversation_id, "20250302-aaaa0002");
    assert_eq!(related[0].topic_overlap, 1);
    assert!(related[0].same_project);

    let topics = relate::topics_by_project(&a.records).await.unwrap();
    let expected: BTreeMap<String, BTreeSet<String>> = [
        ("demo".to_string(), BTreeSet::from(["caching".to_string()])),
        ("other".to_string(), BTreeSet::from(["networking".to_string()])),
    ]
    .into_iter()
    .collect();
    assert_eq!(topics, expected);
}

#[tokio::test]
async fn test_decisions_are_denormalized_per_project() {
    let a = archive().await;
    let demo = relate::decisions(&a.index, Some("demo"), 100).await.unwrap();
    assert_eq!(demo.len(), 1);
    assert_eq!(demo[0].decision, "Use an LRU cache");
    assert_eq!(demo[0].conversation_id, "20250301-aaaa0001");
    assert_eq!(demo[0].timestamp, "2025-03-01T10:00:00");

    assert!(relate::decisions(&a.index, Some("other"), 100)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_graph_links_the_caching_conversations() {
    let a = archive().await;
    let options = GraphOptions {
        threshold: 0.5,
        ..Default::default()
    };
    let graph = relate::build_graph(&a.records, &a.index, &options).await.unwrap();

    assert!(graph.adjacency["20250301-aaaa0001"]
        .iter()
        .any(|l| l.conversation_id == "20250302-aaaa0002"));
    assert!(graph.adjacency["20250302-aaaa0002"]
        .iter()
        .any(|l| l.conversation_id == "20250301-aaaa0001"));
    assert!(!graph.adjacency.contains_key("20250303-bbbb0003"));
}

#[tokio::test]
async fn test_reindexing_is_idempotent() {
    let a = archive().await;
    let before = a.index.count(Collection::MessageChunks).await.unwrap();

    for _ in 0..2 {
        indexer::index_conversation(
            &a.records,
            &a.index,
            &a.embedder,
            &IndexOptions::default(),
            "20250301-aaaa0001",
        )
        .await
        .unwrap();
    }
    assert_eq!(a.index.count(Collection::MessageChunks).await.unwrap(), before);
    assert_eq!(a.index.count(Collection::Decisions).await.unwrap(), 1);
}

#[tokio::test]
async fn test_indexing_unknown_conversation_is_not_found() {
    let a = archive().await;
    let err = indexer::index_conversation(
        &a.records,
        &a.index,
        &a.embedder,
        &IndexOptions::default(),
        "19990101-00000000",
    )
    .await
    .unwrap_err();
    assert!(matches!(err, GraphError::NotFound(id) if id == "19990101-00000000"));

    let related = relate::find_related(&a.records, "19990101-00000000", 5, 500)
        .await
        .unwrap();
    assert!(related.is_empty());
}
