//! Getting conversations into the archive and keeping it consistent.
//!
//! Covers the `add`, `import`, `update` and `delete` commands. Every write
//! goes to the record store first; the vector index is refreshed afterwards
//! through [`indexer::index_record`], so a failed index step leaves the
//! authoritative record in place and `recall index <id>` can repair it.
//!
//! Import follows sync semantics: an incoming document only replaces a
//! stored one when it has strictly more messages, so re-running an import
//! of a growing export is cheap and idempotent.

use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::config::Config;
use crate::embedding::EmbeddingProvider;
use crate::error::GraphError;
use crate::identity::{generate_id, generate_id_from_key};
use crate::indexer::{self, store_error, IndexOptions};
use crate::models::{Conversation, Message, Metadata};
use crate::services::{self, Services};
use crate::store::{RecordStore, VectorIndex};

const TITLE_CHARS: usize = 60;

/// Metadata supplied on the command line for `add`.
#[derive(Debug, Clone, Default)]
pub struct AddOptions {
    pub title: Option<String>,
    pub project: Option<String>,
    pub topics: Vec<String>,
    pub tags: Vec<String>,
}

/// Fields to merge into an existing conversation's metadata.
///
/// `None` leaves a field untouched; topics and tags replace the stored
/// lists when given.
#[derive(Debug, Clone, Default)]
pub struct MetadataUpdate {
    pub project: Option<String>,
    pub topics: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
}

impl MetadataUpdate {
    pub fn is_empty(&self) -> bool {
        self.project.is_none() && self.topics.is_none() && self.tags.is_none()
    }
}

/// Input accepted by `add`: a bare message array or a partial document.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AddInput {
    Messages(Vec<Message>),
    Document(ImportDocument),
}

/// One element of an import file. Only `messages` is required.
#[derive(Debug, Clone, Deserialize)]
pub struct ImportDocument {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub metadata: Metadata,
    /// Stable source key; when present the ID hashes this instead of the
    /// messages so a growing thread keeps its ID.
    #[serde(default)]
    pub external_key: Option<String>,
}

impl ImportDocument {
    /// Resolve missing fields and produce a storable conversation.
    pub fn into_conversation(self, now: DateTime<Utc>) -> Conversation {
        let anchor = self
            .date
            .as_deref()
            .or_else(|| self.messages.first().and_then(|m| m.timestamp.as_deref()));
        let id = match (&self.id, &self.external_key) {
            (Some(id), _) => id.clone(),
            (None, Some(key)) => generate_id_from_key(key, anchor, now),
            (None, None) => generate_id(&self.messages, now),
        };
        let date = anchor
            .map(str::to_string)
            .unwrap_or_else(|| iso_timestamp(now));
        let title = self
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| default_title(&self.messages));

        Conversation {
            id,
            date,
            title,
            messages: self.messages,
            metadata: self.metadata,
        }
    }
}

/// Counters for one import run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub saved: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub indexed: usize,
}

fn iso_timestamp(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%dT%H:%M:%S").to_string()
}

/// First user line, trimmed to a short title.
fn default_title(messages: &[Message]) -> String {
    let first = messages
        .iter()
        .map(|m| m.content.trim())
        .find(|c| !c.is_empty())
        .unwrap_or("Untitled conversation");
    let line = first.lines().next().unwrap_or(first);
    if line.chars().count() <= TITLE_CHARS {
        line.to_string()
    } else {
        let cut: String = line.chars().take(TITLE_CHARS).collect();
        format!("{}…", cut.trim_end())
    }
}

/// Build a conversation from `add` input plus command-line metadata.
pub fn conversation_from_add(
    raw: &str,
    options: AddOptions,
    now: DateTime<Utc>,
) -> Result<Conversation> {
    let input: AddInput = serde_json::from_str(raw)
        .context("Expected a message array or an object with `messages`")?;
    let mut document = match input {
        AddInput::Messages(messages) => ImportDocument {
            id: None,
            date: None,
            title: None,
            messages,
            metadata: Metadata::default(),
            external_key: None,
        },
        AddInput::Document(document) => document,
    };

    if document.messages.is_empty() {
        bail!("Conversation has no messages");
    }
    if options.title.is_some() {
        document.title = options.title;
    }
    if options.project.is_some() {
        document.metadata.project = options.project;
    }
    merge_unique(&mut document.metadata.topics, options.topics);
    merge_unique(&mut document.metadata.tags, options.tags);

    Ok(document.into_conversation(now))
}

fn merge_unique(into: &mut Vec<String>, values: Vec<String>) {
    for value in values {
        if !into.contains(&value) {
            into.push(value);
        }
    }
}

/// Whether `incoming` should overwrite `existing` during import.
pub fn should_replace(existing: Option<&Conversation>, incoming: &Conversation) -> bool {
    existing.map_or(true, |e| incoming.messages.len() > e.messages.len())
}

/// Store each document and, when an embedder is given, index it.
///
/// Malformed documents and conversations are skipped with a warning;
/// store and index failures abort.
pub async fn import_documents(
    records: &dyn RecordStore,
    index: &dyn VectorIndex,
    embedder: Option<&dyn EmbeddingProvider>,
    options: &IndexOptions,
    documents: Vec<Value>,
    now: DateTime<Utc>,
) -> Result<ImportReport> {
    let mut report = ImportReport::default();

    for (position, raw) in documents.into_iter().enumerate() {
        let document: ImportDocument = match serde_json::from_value(raw) {
            Ok(doc) => doc,
            Err(e) => {
                tracing::warn!(position, error = %e, "skipping malformed import entry");
                report.skipped += 1;
                continue;
            }
        };
        if document.messages.is_empty() {
            tracing::warn!(position, "skipping import entry without messages");
            report.skipped += 1;
            continue;
        }

        let conversation = document.into_conversation(now);
        let existing = match records.get(&conversation.id).await.map_err(store_error) {
            Ok(existing) => existing,
            Err(e @ GraphError::MalformedRecord { .. }) => {
                tracing::warn!(id = %conversation.id, error = %e, "replacing malformed record");
                None
            }
            Err(e) => return Err(e.into()),
        };
        if !should_replace(existing.as_ref(), &conversation) {
            report.unchanged += 1;
            continue;
        }

        match records.put(&conversation).await.map_err(store_error) {
            Ok(()) => {}
            Err(e) if e.is_record_level() => {
                tracing::warn!(
                    position,
                    id = %conversation.id,
                    error = %e,
                    "skipping import entry"
                );
                report.skipped += 1;
                continue;
            }
            Err(e) => return Err(e.into()),
        }
        report.saved += 1;
        tracing::debug!(
            id = %conversation.id,
            messages = conversation.messages.len(),
            "saved conversation"
        );

        if let Some(embedder) = embedder {
            match indexer::index_record(index, embedder, options, &conversation).await {
                Ok(_) => report.indexed += 1,
                Err(e) if e.is_record_level() => {
                    tracing::warn!(id = %conversation.id, error = %e, "stored but not indexed");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    tracing::info!(
        saved = report.saved,
        unchanged = report.unchanged,
        skipped = report.skipped,
        "import finished"
    );
    Ok(report)
}

/// Merge `update` into a stored conversation, rewrite it and re-index it.
///
/// Re-indexing keeps the denormalized project and topics on chunk entries
/// in step with the record. Pass `None` for the embedder to skip it. A
/// conversation that cannot be chunked is still updated; its index entries
/// are removed and a warning is logged.
pub async fn update_metadata(
    records: &dyn RecordStore,
    index: &dyn VectorIndex,
    embedder: Option<&dyn EmbeddingProvider>,
    options: &IndexOptions,
    id: &str,
    update: MetadataUpdate,
) -> Result<Conversation> {
    let Some(mut conversation) = records.get(id).await? else {
        bail!("conversation not found: {}", id);
    };

    if let Some(project) = update.project {
        conversation.metadata.project = Some(project);
    }
    if let Some(topics) = update.topics {
        conversation.metadata.topics = topics;
    }
    if let Some(tags) = update.tags {
        conversation.metadata.tags = tags;
    }

    records.put(&conversation).await?;
    if let Some(embedder) = embedder {
        match indexer::index_record(index, embedder, options, &conversation).await {
            Ok(_) => {}
            Err(e) if e.is_record_level() => {
                tracing::warn!(id = %conversation.id, error = %e, "updated but not indexed");
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(conversation)
}

/// Delete a conversation and every index entry it owns.
///
/// Returns the number of index entries removed, or `None` when the record
/// store had no such conversation.
pub async fn delete_conversation(
    records: &dyn RecordStore,
    index: &dyn VectorIndex,
    id: &str,
) -> Result<Option<usize>> {
    let existed = records.delete(id).await?;
    let removed = indexer::remove_conversation(index, id).await?;
    Ok(existed.then_some(removed))
}

fn read_input(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

pub async fn run_add(config: &Config, path: &Path, options: AddOptions) -> Result<()> {
    let raw = read_input(path)?;
    let conversation = conversation_from_add(&raw, options, Utc::now())?;

    let services = Services::open(config).await?;
    services.records.put(&conversation).await?;
    println!(
        "Saved conversation {} ({} messages)",
        conversation.id,
        conversation.messages.len()
    );

    if config.embedding.is_enabled() {
        let embedder = services::embedder(config)?;
        let report = indexer::index_record(
            &services.index,
            embedder.as_ref(),
            &services::index_options(config),
            &conversation,
        )
        .await?;
        println!(
            "Indexed {} chunk(s), {} decision(s)",
            report.chunks_written(),
            report.decisions
        );
    } else {
        println!("Embedding disabled; not indexed.");
    }

    services.close().await;
    Ok(())
}

pub async fn run_import(config: &Config, path: &Path, no_index: bool) -> Result<()> {
    let raw = read_input(path)?;
    let value: Value = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid JSON in {}", path.display()))?;
    let Value::Array(documents) = value else {
        bail!("Import file must contain a JSON array of conversations");
    };
    let total = documents.len();

    let services = Services::open(config).await?;
    let embedder = if no_index || !config.embedding.is_enabled() {
        None
    } else {
        Some(services::embedder(config)?)
    };

    let report = import_documents(
        &services.records,
        &services.index,
        embedder.as_deref(),
        &services::index_options(config),
        documents,
        Utc::now(),
    )
    .await?;

    println!("Import complete: {} entries", total);
    println!("  saved:     {}", report.saved);
    println!("  unchanged: {}", report.unchanged);
    println!("  skipped:   {}", report.skipped);
    if embedder.is_some() {
        println!("  indexed:   {}", report.indexed);
    }

    services.close().await;
    Ok(())
}

pub async fn run_update(config: &Config, id: &str, update: MetadataUpdate) -> Result<()> {
    if update.is_empty() {
        bail!("Nothing to update: pass --project, --topic or --tag");
    }

    let services = Services::open(config).await?;
    let embedder = if config.embedding.is_enabled() {
        Some(services::embedder(config)?)
    } else {
        None
    };

    let conversation = update_metadata(
        &services.records,
        &services.index,
        embedder.as_deref(),
        &services::index_options(config),
        id,
        update,
    )
    .await?;

    println!("Updated {}", conversation.id);
    services.close().await;
    Ok(())
}

pub async fn run_delete(config: &Config, id: &str) -> Result<()> {
    let services = Services::open(config).await?;
    let outcome = delete_conversation(&services.records, &services.index, id).await?;
    services.close().await;

    match outcome {
        Some(removed) => {
            println!("Deleted {} ({} index entries)", id, removed);
            Ok(())
        }
        None => bail!("conversation not found: {}", id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashProvider;
    use crate::models::ConversationSummary;
    use crate::store::json_files::JsonRecordStore;
    use crate::store::memory::{InMemoryRecordStore, InMemoryVectorIndex};
    use crate::store::{Collection, ListFilter};
    use chrono::TimeZone;
    use serde_json::json;

    const REPLY: &str = "Use a bounded LRU cache and evict the least recently used entry first.";

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 9, 30, 0).unwrap()
    }

    #[test]
    fn test_add_accepts_bare_message_array() {
        let raw = r#"[{"role": "user", "content": "How should I cache?"},
                      {"role": "assistant", "content": "LRU."}]"#;
        let options = AddOptions {
            project: Some("demo".to_string()),
            topics: vec!["caching".to_string()],
            ..Default::default()
        };
        let conversation = conversation_from_add(raw, options, now()).unwrap();
        assert!(conversation.id.starts_with("20250601-"));
        assert_eq!(conversation.date, "2025-06-01T09:30:00");
        assert_eq!(conversation.title, "How should I cache?");
        assert_eq!(conversation.project(), Some("demo"));
        assert_eq!(conversation.metadata.topics, vec!["caching"]);
    }

    #[test]
    fn test_add_accepts_document_and_merges_flags() {
        let raw = r#"{"title": "Caching",
                      "messages": [{"role": "user", "content": "q"}, {"role": "assistant", "content": "a"}],
                      "metadata": {"topics": ["caching"], "tags": ["keep"]}}"#;
        let options = AddOptions {
            title: Some("Cache design".to_string()),
            topics: vec!["caching".to_string(), "lru".to_string()],
            ..Default::default()
        };
        let conversation = conversation_from_add(raw, options, now()).unwrap();
        assert_eq!(conversation.title, "Cache design");
        assert_eq!(conversation.metadata.topics, vec!["caching", "lru"]);
        assert_eq!(conversation.metadata.tags, vec!["keep"]);
    }

    #[test]
    fn test_add_rejects_empty_and_invalid_input() {
        assert!(conversation_from_add("[]", AddOptions::default(), now()).is_err());
        assert!(conversation_from_add("{\"title\": \"x\"}", AddOptions::default(), now()).is_err());
    }

    #[test]
    fn test_same_messages_get_same_id() {
        let doc = || ImportDocument {
            id: None,
            date: None,
            title: None,
            messages: vec![Message::user("hello"), Message::assistant("hi")],
            metadata: Metadata::default(),
            external_key: None,
        };
        assert_eq!(doc().into_conversation(now()).id, doc().into_conversation(now()).id);
    }

    #[test]
    fn test_external_key_keeps_id_when_messages_grow() {
        let doc = |n: usize| ImportDocument {
            id: None,
            date: Some("2025-01-02T00:00:00".to_string()),
            title: Some("Thread".to_string()),
            messages: (0..n).map(|i| Message::user(format!("m{}", i))).collect(),
            metadata: Metadata::default(),
            external_key: Some("/home/me/project".to_string()),
        };
        let short = doc(2).into_conversation(now());
        let long = doc(4).into_conversation(now());
        assert_eq!(short.id, long.id);
        assert!(short.id.starts_with("20250102-"));
    }

    #[test]
    fn test_default_title_truncates() {
        let long = "x".repeat(100);
        let title = default_title(&[Message::user(long)]);
        assert_eq!(title.chars().count(), TITLE_CHARS + 1);
        assert_eq!(default_title(&[]), "Untitled conversation");
    }

    #[test]
    fn test_should_replace_only_when_longer() {
        let make = |n: usize| Conversation {
            id: "c".to_string(),
            date: "2025-01-01".to_string(),
            title: String::new(),
            messages: (0..n).map(|_| Message::user("m")).collect(),
            metadata: Metadata::default(),
        };
        assert!(should_replace(None, &make(2)));
        assert!(should_replace(Some(&make(2)), &make(4)));
        assert!(!should_replace(Some(&make(2)), &make(2)));
        assert!(!should_replace(Some(&make(4)), &make(2)));
    }

    fn import_entry(key: &str, pairs: usize) -> Value {
        let mut messages = Vec::new();
        for i in 0..pairs {
            messages.push(json!({"role": "user", "content": format!("question {}", i)}));
            messages.push(json!({"role": "assistant", "content": format!("{} ({})", REPLY, i)}));
        }
        json!({
            "date": "2025-02-01T10:00:00",
            "title": "Caching",
            "external_key": key,
            "messages": messages,
            "metadata": {"project": "demo", "topics": ["caching"]}
        })
    }

    #[tokio::test]
    async fn test_import_is_idempotent_and_skips_malformed() {
        let records = InMemoryRecordStore::new();
        let index = InMemoryVectorIndex::new();
        let embedder = HashProvider::new(64);
        let options = IndexOptions::default();

        let documents = vec![
            import_entry("thread-a", 1),
            json!({"title": "no messages field"}),
            json!({"messages": [{"role": "user", "content": "q"}, {"role": "user", "content": "q2"}]}),
        ];
        let report = import_documents(&records, &index, Some(&embedder), &options, documents, now())
            .await
            .unwrap();
        assert_eq!(report.saved, 2);
        assert_eq!(report.skipped, 1);
        // The user/user pair is stored but cannot be chunked.
        assert_eq!(report.indexed, 1);
        assert_eq!(index.count(Collection::MessageChunks).await.unwrap(), 1);

        let again = import_documents(
            &records,
            &index,
            Some(&embedder),
            &options,
            vec![import_entry("thread-a", 1)],
            now(),
        )
        .await
        .unwrap();
        assert_eq!(again.saved, 0);
        assert_eq!(again.unchanged, 1);

        let grown = import_documents(
            &records,
            &index,
            Some(&embedder),
            &options,
            vec![import_entry("thread-a", 3)],
            now(),
        )
        .await
        .unwrap();
        assert_eq!(grown.saved, 1);
        assert_eq!(index.count(Collection::MessageChunks).await.unwrap(), 3);
        assert_eq!(records.list(&ListFilter::default()).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_import_without_embedder_only_stores() {
        let records = InMemoryRecordStore::new();
        let index = InMemoryVectorIndex::new();
        let report = import_documents(
            &records,
            &index,
            None,
            &IndexOptions::default(),
            vec![import_entry("thread-b", 2)],
            now(),
        )
        .await
        .unwrap();
        assert_eq!(report.saved, 1);
        assert_eq!(report.indexed, 0);
        assert_eq!(index.count(Collection::MessageChunks).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_update_reindexes_denormalized_attributes() {
        let records = InMemoryRecordStore::new();
        let index = InMemoryVectorIndex::new();
        let embedder = HashProvider::new(64);
        let options = IndexOptions::default();
        import_documents(
            &records,
            &index,
            Some(&embedder),
            &options,
            vec![import_entry("thread-c", 2)],
            now(),
        )
        .await
        .unwrap();
        let id = records.list(&ListFilter::default()).await.unwrap()[0].id.clone();

        let update = MetadataUpdate {
            project: Some("renamed".to_string()),
            topics: Some(vec!["eviction".to_string()]),
            tags: None,
        };
        let updated = update_metadata(&records, &index, Some(&embedder), &options, &id, update)
            .await
            .unwrap();
        assert_eq!(updated.project(), Some("renamed"));

        let chunks = index
            .fetch_where(Collection::MessageChunks, None, 10, false)
            .await
            .unwrap();
        assert_eq!(chunks.len(), 2);
        for chunk in chunks {
            assert_eq!(chunk.attributes["project"], "renamed");
            assert_eq!(chunk.attributes["topics"], json!(["eviction"]));
        }
    }

    #[tokio::test]
    async fn test_update_unknown_id_fails() {
        let records = InMemoryRecordStore::new();
        let index = InMemoryVectorIndex::new();
        let update = MetadataUpdate {
            project: Some("x".to_string()),
            ..Default::default()
        };
        let options = IndexOptions::default();
        let err = update_metadata(&records, &index, None, &options, "missing", update)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn test_delete_removes_record_and_entries() {
        let records = InMemoryRecordStore::new();
        let index = InMemoryVectorIndex::new();
        let embedder = HashProvider::new(64);
        import_documents(
            &records,
            &index,
            Some(&embedder),
            &IndexOptions::default(),
            vec![import_entry("thread-d", 2)],
            now(),
        )
        .await
        .unwrap();
        let id = records.list(&ListFilter::default()).await.unwrap()[0].id.clone();

        let removed = delete_conversation(&records, &index, &id).await.unwrap();
        assert_eq!(removed, Some(4));
        assert!(records.get(&id).await.unwrap().is_none());
        for collection in Collection::ALL {
            assert_eq!(index.count(collection).await.unwrap(), 0);
        }

        assert_eq!(delete_conversation(&records, &index, &id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_import_skips_ids_the_json_store_rejects() {
        let tmp = tempfile::TempDir::new().unwrap();
        let records = JsonRecordStore::open(tmp.path()).await.unwrap();
        let index = InMemoryVectorIndex::new();
        let embedder = HashProvider::new(64);

        let mut bad = import_entry("thread-x", 1);
        bad["id"] = json!("thread.v2");
        let documents = vec![bad, import_entry("thread-ok", 1)];
        let report = import_documents(
            &records,
            &index,
            Some(&embedder),
            &IndexOptions::default(),
            documents,
            now(),
        )
        .await
        .unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(report.saved, 1);
        assert_eq!(report.indexed, 1);

        let stored = records.list(&ListFilter::default()).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_ne!(stored[0].id, "thread.v2");
    }

    #[tokio::test]
    async fn test_import_replaces_unreadable_record() {
        let tmp = tempfile::TempDir::new().unwrap();
        let records = JsonRecordStore::open(tmp.path()).await.unwrap();
        let index = InMemoryVectorIndex::new();

        let mut entry = import_entry("thread-y", 1);
        entry["id"] = json!("20250201-corrupt1");
        std::fs::write(tmp.path().join("20250201-corrupt1.json"), "{not json").unwrap();

        let report = import_documents(
            &records,
            &index,
            None,
            &IndexOptions::default(),
            vec![entry],
            now(),
        )
        .await
        .unwrap();
        assert_eq!(report.saved, 1);
        let stored = records.get("20250201-corrupt1").await.unwrap().unwrap();
        assert_eq!(stored.messages.len(), 2);
    }

    struct OfflineStore;

    #[async_trait::async_trait]
    impl RecordStore for OfflineStore {
        async fn get(&self, _id: &str) -> Result<Option<Conversation>> {
            bail!("store offline")
        }
        async fn list(&self, _filter: &ListFilter) -> Result<Vec<ConversationSummary>> {
            bail!("store offline")
        }
        async fn put(&self, _conversation: &Conversation) -> Result<()> {
            bail!("store offline")
        }
        async fn all(&self) -> Result<Vec<Conversation>> {
            bail!("store offline")
        }
        async fn delete(&self, _id: &str) -> Result<bool> {
            bail!("store offline")
        }
    }

    #[tokio::test]
    async fn test_import_aborts_when_store_is_unreadable() {
        let index = InMemoryVectorIndex::new();
        let err = import_documents(
            &OfflineStore,
            &index,
            None,
            &IndexOptions::default(),
            vec![import_entry("thread-z", 1)],
            now(),
        )
        .await
        .unwrap_err();
        match err.downcast_ref::<GraphError>() {
            Some(GraphError::StoreUnavailable(_)) => {}
            other => panic!("expected StoreUnavailable, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_update_of_unchunkable_record_saves_and_clears_index() {
        let records = InMemoryRecordStore::new();
        let index = InMemoryVectorIndex::new();
        let embedder = HashProvider::new(64);
        let options = IndexOptions::default();
        import_documents(
            &records,
            &index,
            Some(&embedder),
            &options,
            vec![import_entry("thread-e", 2)],
            now(),
        )
        .await
        .unwrap();
        let id = records.list(&ListFilter::default()).await.unwrap()[0].id.clone();
        assert_eq!(index.count(Collection::MessageChunks).await.unwrap(), 2);

        let mut broken = records.get(&id).await.unwrap().unwrap();
        broken.messages[1] = Message::user("no reply");
        records.put(&broken).await.unwrap();

        let update = MetadataUpdate {
            project: Some("renamed".to_string()),
            ..Default::default()
        };
        let updated = update_metadata(&records, &index, Some(&embedder), &options, &id, update)
            .await
            .unwrap();
        assert_eq!(updated.project(), Some("renamed"));
        let stored = records.get(&id).await.unwrap().unwrap();
        assert_eq!(stored.project(), Some("renamed"));
        for collection in Collection::ALL {
            assert_eq!(index.count(collection).await.unwrap(), 0);
        }
    }
}
