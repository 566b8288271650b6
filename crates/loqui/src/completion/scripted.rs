//! Scripted completion backend for tests and offline development.

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream;

use super::{
    CompletionBackend, CompletionError, CompletionResult, CompletionTurn, FragmentStream,
    InputPart,
};

/// Replays a fixed fragment sequence for every call.
///
/// Selected with `completion.provider = "scripted"` so the full pipeline can
/// run without a hosted model, and used throughout the integration tests.
#[derive(Debug, Clone, Default)]
pub struct ScriptedBackend {
    fragments: Vec<String>,
    /// When set, the stream fails with this message after the fragments.
    fail_with: Option<String>,
}

impl ScriptedBackend {
    pub fn new(fragments: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            fragments: fragments.into_iter().map(Into::into).collect(),
            fail_with: None,
        }
    }

    /// An empty reply.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Fail the stream with `message` after yielding any fragments.
    pub fn failing_after(self, message: impl Into<String>) -> Self {
        Self {
            fail_with: Some(message.into()),
            ..self
        }
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    async fn stream_completion(
        &self,
        _history: Vec<CompletionTurn>,
        _parts: Vec<InputPart>,
    ) -> CompletionResult<FragmentStream> {
        let mut items: Vec<CompletionResult<String>> =
            self.fragments.iter().cloned().map(Ok).collect();
        if let Some(message) = &self.fail_with {
            items.push(Err(CompletionError::Stream(message.clone())));
        }
        Ok(stream::iter(items).boxed())
    }
}
