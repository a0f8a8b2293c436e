//! Core data models used throughout the conversation memory.
//!
//! These types represent the conversations persisted by the record store,
//! the chunks derived from them for the vector index, and the decision
//! entries denormalized alongside. Field names follow the on-disk JSON
//! document format so existing archives load unchanged.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Speaker of a single message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => f.write_str("user"),
            Role::Assistant => f.write_str("assistant"),
        }
    }
}

/// One turn of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// ISO-8601 timestamp; absent messages inherit the conversation date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            timestamp: None,
        }
    }
}

/// A decision recorded during a conversation. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub decision: String,
    #[serde(default)]
    pub rationale: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// A file or other artifact produced in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Conversation metadata with fixed, optional fields.
///
/// Keys not known to this struct (importer bookkeeping such as
/// `project_path` or `thread_id`) are preserved in [`Metadata::extra`]
/// so a load/save cycle never drops them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub decisions: Vec<Decision>,
    #[serde(default)]
    pub related_conversations: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// A stored conversation: the authoritative record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    /// ISO-8601 creation timestamp.
    pub date: String,
    #[serde(default)]
    pub title: String,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Conversation {
    pub fn project(&self) -> Option<&str> {
        self.metadata.project.as_deref()
    }

    /// The `YYYY-MM-DD` prefix of the conversation date.
    pub fn day(&self) -> &str {
        day_of(&self.date)
    }

    pub fn summary(&self) -> ConversationSummary {
        ConversationSummary {
            id: self.id.clone(),
            date: self.date.clone(),
            title: self.title.clone(),
            project: self.metadata.project.clone(),
            topics: self.metadata.topics.clone(),
        }
    }
}

/// Lightweight listing entry kept in the summary index.
///
/// Tags are deliberately absent: filtering by tag loads the full record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: String,
    pub date: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
}

impl ConversationSummary {
    pub fn day(&self) -> &str {
        day_of(&self.date)
    }
}

/// A derived, embeddable unit of conversation text.
///
/// Serialized as-is into the attribute map of its index entry, so every
/// field here is filterable in the vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub conversation_id: String,
    pub chunk_index: usize,
    pub text: String,
    pub project: Option<String>,
    pub title: String,
    pub timestamp: String,
    #[serde(default)]
    pub topics: Vec<String>,
}

impl Chunk {
    /// Deterministic entry key: `{conversation_id}_chunk_{chunk_index}`.
    pub fn entry_id(&self) -> String {
        format!("{}_chunk_{}", self.conversation_id, self.chunk_index)
    }
}

/// A decision denormalized into the decisions collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub conversation_id: String,
    pub decision: String,
    pub rationale: String,
    pub timestamp: String,
    pub project: Option<String>,
}

impl DecisionRecord {
    pub fn entry_id(conversation_id: &str, position: usize) -> String {
        format!("{}_decision_{}", conversation_id, position)
    }
}

fn day_of(date: &str) -> &str {
    date.get(..10).unwrap_or(date)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_archive_document() {
        let raw = r#"{
            "id": "20251127-1a2b3c4d",
            "date": "2025-11-27T10:00:00.123456",
            "title": "Fragment Layout Discussion",
            "messages": [
                {"role": "user", "content": "Help me with fragment layout", "timestamp": "2025-11-27T10:00:00"},
                {"role": "assistant", "content": "Sure!"}
            ],
            "metadata": {
                "project": "moneypenny",
                "topics": ["visual-annotation"],
                "decisions": [{"decision": "Use 1-indexed coordinates", "rationale": "Matches intuition"}],
                "related_conversations": [],
                "tags": ["architecture"],
                "artifacts": [{"type": "code", "path": "app.js"}],
                "project_path": "/home/me/moneypenny"
            }
        }"#;
        let conv: Conversation = serde_json::from_str(raw).unwrap();
        assert_eq!(conv.project(), Some("moneypenny"));
        assert_eq!(conv.day(), "2025-11-27");
        assert_eq!(conv.messages[1].role, Role::Assistant);
        assert_eq!(conv.messages[1].timestamp, None);
        assert_eq!(conv.metadata.artifacts[0].kind, "code");
        assert_eq!(
            conv.metadata.extra.get("project_path"),
            Some(&serde_json::json!("/home/me/moneypenny"))
        );

        let back = serde_json::to_value(&conv).unwrap();
        assert_eq!(back["metadata"]["project_path"], "/home/me/moneypenny");
    }

    #[test]
    fn test_unknown_role_rejected() {
        let raw = r#"{"role": "system", "content": "x"}"#;
        assert!(serde_json::from_str::<Message>(raw).is_err());
    }

    #[test]
    fn test_chunk_entry_id() {
        let chunk = Chunk {
            conversation_id: "20250101-deadbeef".to_string(),
            chunk_index: 3,
            text: String::new(),
            project: None,
            title: String::new(),
            timestamp: String::new(),
            topics: Vec::new(),
        };
        assert_eq!(chunk.entry_id(), "20250101-deadbeef_chunk_3");
    }
}
