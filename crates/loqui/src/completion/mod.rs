//! Generative completion service client.
//!
//! The chat pipeline only depends on the [`CompletionBackend`] trait: one
//! call with ordered turn history plus the new input parts, answered by a
//! stream of text fragments. [`HttpCompletionClient`] talks to a hosted
//! Gemini-compatible API; [`ScriptedBackend`] replays canned fragments for
//! tests and offline development.

mod http;
mod scripted;

pub use http::HttpCompletionClient;
pub use scripted::ScriptedBackend;

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

/// Result type for completion operations.
pub type CompletionResult<T> = Result<T, CompletionError>;

/// Errors from the completion service.
#[derive(Debug, Clone, Error)]
pub enum CompletionError {
    /// The call could not be issued.
    #[error("completion request failed: {0}")]
    Request(String),

    /// The fragment stream broke mid-response.
    #[error("completion stream failed: {0}")]
    Stream(String),
}

/// One content part of a completion turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputPart {
    Text(String),
    /// Raw base64 payload with its mime type.
    InlineData { mime_type: String, data: String },
}

/// Role of a turn as the completion service sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnRole {
    User,
    Model,
}

/// One history turn sent to the completion service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionTurn {
    pub role: TurnRole,
    pub parts: Vec<InputPart>,
}

/// Stream of reply fragments.
pub type FragmentStream = BoxStream<'static, CompletionResult<String>>;

/// A hosted generative-completion service.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Issue a single completion call and stream back text fragments in
    /// order. A stream yielding zero fragments is a valid empty reply.
    async fn stream_completion(
        &self,
        history: Vec<CompletionTurn>,
        parts: Vec<InputPart>,
    ) -> CompletionResult<FragmentStream>;
}
