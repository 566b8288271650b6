//! Conversational session pipeline.
//!
//! Wires the quota ledger, media resolver, history assembler and the dual
//! persistence gateway into the streaming turn controller.

pub mod history;
pub mod media;
pub mod models;
pub mod quota;
pub mod service;

pub use history::HistoryAssembler;
pub use media::{MediaResolver, ResolvedPart};
pub use quota::{QuotaKind, QuotaLedger, QuotaStatus};
pub use service::{ChatService, TurnOutcome, TurnRequest};

use thiserror::Error;

use crate::store::StoreError;

/// Tagged chat pipeline errors. Each variant is a distinct condition the API
/// layer maps to a status code; nothing downstream inspects message text.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Missing or malformed required fields, rejected before any side effect.
    #[error("{0}")]
    Validation(String),

    /// A quota ceiling was hit. Carries the numbers and user-facing copy.
    #[error("{message}")]
    QuotaExceeded {
        kind: QuotaKind,
        current: u64,
        limit: u64,
        message: String,
    },

    /// Conversation exists but belongs to someone else.
    #[error("access denied to conversation {0}")]
    AccessDenied(String),

    /// Conversation does not exist in the caller's scope.
    #[error("conversation not found: {0}")]
    NotFound(String),

    /// A turn is already streaming for this conversation.
    #[error("a response is already in progress for conversation {0}")]
    TurnInFlight(String),

    /// Completion service or persistence failure after validation.
    #[error("completion failed: {0}")]
    Upstream(String),

    /// Persistence-layer failure.
    #[error("store error: {0}")]
    Store(sqlx::Error),
}

impl From<StoreError> for ChatError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ConversationNotFound(id) => ChatError::NotFound(id),
            StoreError::AccessDenied(id) => ChatError::AccessDenied(id),
            StoreError::Database(err) => ChatError::Store(err),
        }
    }
}
