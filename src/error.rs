//! Error taxonomy for the conversation graph engine.

use crate::models::Role;

/// Errors surfaced by indexing and relationship queries.
///
/// Collaborator failures carry the underlying [`anyhow::Error`] so the
/// full context chain is printed at the CLI boundary.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// No conversation with this ID exists in the record store.
    #[error("conversation not found: {0}")]
    NotFound(String),

    /// A stored document could not be parsed.
    #[error("malformed record {id}: {reason}")]
    MalformedRecord { id: String, reason: String },

    /// Messages do not alternate user/assistant starting with user.
    #[error("malformed conversation {id}: message {position} should be from the {expected}")]
    MalformedConversation {
        id: String,
        position: usize,
        expected: Role,
    },

    #[error("embedder unavailable: {0:#}")]
    EmbedderUnavailable(anyhow::Error),

    #[error("vector index unavailable: {0:#}")]
    IndexUnavailable(anyhow::Error),

    #[error("record store unavailable: {0:#}")]
    StoreUnavailable(anyhow::Error),
}

impl GraphError {
    /// Whether a batch operation may skip this error and continue.
    pub fn is_record_level(&self) -> bool {
        matches!(
            self,
            GraphError::NotFound(_)
                | GraphError::MalformedRecord { .. }
                | GraphError::MalformedConversation { .. }
        )
    }
}

/// Result type alias using `GraphError`.
pub type Result<T> = std::result::Result<T, GraphError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_level_errors() {
        assert!(GraphError::NotFound("x".into()).is_record_level());
        assert!(GraphError::MalformedConversation {
            id: "x".into(),
            position: 1,
            expected: Role::Assistant,
        }
        .is_record_level());
        assert!(!GraphError::IndexUnavailable(anyhow::anyhow!("down")).is_record_level());
    }

    #[test]
    fn test_display_includes_cause_chain() {
        let cause = anyhow::anyhow!("connection refused").context("POST /api/embed");
        let err = GraphError::EmbedderUnavailable(cause);
        let msg = err.to_string();
        assert!(msg.contains("POST /api/embed"));
        assert!(msg.contains("connection refused"));
    }
}
