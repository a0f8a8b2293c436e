//! Turn-pair conversation chunker.
//!
//! Splits a [`Conversation`] into two parallel chunk sequences:
//!
//! - **full chunks**: `"User: …\n\nAssistant: …"` for each user/assistant
//!   pair, used for search;
//! - **assistant chunks**: the assistant text alone, used for relationship
//!   discovery, emitted only when it is longer than `min_assistant_chars`.
//!
//! Pairs start at even positions. A trailing unpaired message is dropped.
//! Role order is validated: a pair whose roles are not user then assistant
//! is reported as [`GraphError::MalformedConversation`] instead of producing
//! misaligned chunks.

use crate::error::{GraphError, Result};
use crate::models::{Chunk, Conversation, Role};

/// Default minimum assistant length (in characters) for an assistant chunk.
pub const DEFAULT_MIN_ASSISTANT_CHARS: usize = 50;

/// Chunks derived from one conversation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationChunks {
    pub full: Vec<Chunk>,
    pub assistant: Vec<Chunk>,
}

impl ConversationChunks {
    pub fn is_empty(&self) -> bool {
        self.full.is_empty() && self.assistant.is_empty()
    }

    pub fn len(&self) -> usize {
        self.full.len() + self.assistant.len()
    }
}

/// Chunk a conversation. Pure and deterministic.
pub fn chunk_conversation(
    conversation: &Conversation,
    min_assistant_chars: usize,
) -> Result<ConversationChunks> {
    let messages = &conversation.messages;
    let mut chunks = ConversationChunks::default();

    for (pair_index, pair) in messages.chunks_exact(2).enumerate() {
        let (user, assistant) = (&pair[0], &pair[1]);
        let position = pair_index * 2;
        check_role(conversation, position, user.role, Role::User)?;
        check_role(conversation, position + 1, assistant.role, Role::Assistant)?;

        let timestamp = user
            .timestamp
            .clone()
            .unwrap_or_else(|| conversation.date.clone());

        let make = |text: String| Chunk {
            conversation_id: conversation.id.clone(),
            chunk_index: pair_index,
            text,
            project: conversation.metadata.project.clone(),
            title: conversation.title.clone(),
            timestamp: timestamp.clone(),
            topics: conversation.metadata.topics.clone(),
        };

        chunks.full.push(make(format!(
            "User: {}\n\nAssistant: {}",
            user.content, assistant.content
        )));

        if assistant.content.chars().count() > min_assistant_chars {
            chunks.assistant.push(make(assistant.content.clone()));
        }
    }

    Ok(chunks)
}

fn check_role(
    conversation: &Conversation,
    position: usize,
    actual: Role,
    expected: Role,
) -> Result<()> {
    if actual == expected {
        Ok(())
    } else {
        Err(GraphError::MalformedConversation {
            id: conversation.id.clone(),
            position,
            expected,
        })
    }
}
