//! Dual persistence layer.
//!
//! One [`ConversationStore`] contract, two backends: [`SqliteStore`] for
//! authenticated users and [`EphemeralStore`] for anonymous devices. The
//! [`PersistenceGateway`] picks the backend from identity presence at its
//! entry points; nothing below it branches on identity again.

mod ephemeral;
mod gateway;
mod remote;

pub use ephemeral::EphemeralStore;
pub use gateway::PersistenceGateway;
pub use remote::SqliteStore;

use async_trait::async_trait;
use thiserror::Error;

use crate::chat::models::{Attachment, Conversation, Message, NewMessage, QuotaCounters};

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by conversation stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The conversation does not exist in the caller's scope's backend.
    #[error("conversation not found: {0}")]
    ConversationNotFound(String),

    /// The conversation exists but belongs to someone else.
    #[error("access denied to conversation {0}")]
    AccessDenied(String),

    /// Database failure.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Conversation and message CRUD, scoped to one owner key.
///
/// `scope` is the user id for the remote backend and the device key for the
/// ephemeral one. Every operation that targets an existing conversation
/// checks it is visible in that scope first: a foreign conversation surfaces
/// as [`StoreError::AccessDenied`], a missing one as
/// [`StoreError::ConversationNotFound`] — never a silent no-op.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn create_conversation(&self, scope: &str, title: &str) -> StoreResult<Conversation>;

    /// Conversations ordered by `updated_at` descending.
    async fn list_conversations(&self, scope: &str) -> StoreResult<Vec<Conversation>>;

    async fn get_conversation(&self, scope: &str, id: &str) -> StoreResult<Conversation>;

    async fn append_message(
        &self,
        scope: &str,
        conversation_id: &str,
        message: NewMessage,
    ) -> StoreResult<Message>;

    /// Messages ordered by creation ascending.
    async fn messages(&self, scope: &str, conversation_id: &str) -> StoreResult<Vec<Message>>;

    /// Bump the conversation's `updated_at`.
    async fn touch_conversation(&self, scope: &str, conversation_id: &str) -> StoreResult<()>;

    /// Delete the conversation and its messages, returning the attachments
    /// the removed messages carried so the caller can clean up stored blobs.
    async fn delete_conversation(
        &self,
        scope: &str,
        conversation_id: &str,
    ) -> StoreResult<Vec<Attachment>>;

    /// Usage counters for the quota ledger.
    async fn counters(&self, scope: &str) -> StoreResult<QuotaCounters>;

    /// Record a completed file upload. Only meaningful for the ephemeral
    /// backend, where file counts are stored rather than derived.
    async fn record_file(&self, scope: &str, attachment: &Attachment) -> StoreResult<()>;
}
