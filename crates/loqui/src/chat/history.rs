//! Conversation history assembly for the completion call.

use std::sync::Arc;

use tracing::warn;

use super::ChatError;
use super::media::{MediaResolver, ResolvedPart};
use crate::chat::models::{Identity, Sender};
use crate::completion::{CompletionTurn, InputPart, TurnRole};
use crate::store::PersistenceGateway;

/// Turns a conversation's persisted turns into model-ready input.
pub struct HistoryAssembler {
    gateway: Arc<PersistenceGateway>,
    media: MediaResolver,
}

impl HistoryAssembler {
    pub fn new(gateway: Arc<PersistenceGateway>, media: MediaResolver) -> Self {
        Self { gateway, media }
    }

    /// Assemble ordered history for a conversation.
    ///
    /// Anonymous turns are never replayed to the completion service, so an
    /// anonymous identity always gets an empty history. `exclude_last` drops
    /// the just-saved user turn being answered. Load failures degrade to an
    /// empty history: the turn must still be answerable without it.
    pub async fn assemble(
        &self,
        identity: &Identity,
        conversation_id: &str,
        exclude_last: bool,
    ) -> Vec<CompletionTurn> {
        if !identity.is_authenticated() {
            return Vec::new();
        }

        match self.load(identity, conversation_id, exclude_last).await {
            Ok(turns) => turns,
            Err(err) => {
                warn!(
                    conversation_id = %conversation_id,
                    error = %err,
                    "history load failed, answering without history"
                );
                Vec::new()
            }
        }
    }

    async fn load(
        &self,
        identity: &Identity,
        conversation_id: &str,
        exclude_last: bool,
    ) -> Result<Vec<CompletionTurn>, ChatError> {
        let mut messages = self.gateway.get_messages(identity, conversation_id).await?;
        if exclude_last {
            messages.pop();
        }

        let mut turns = Vec::with_capacity(messages.len());
        for message in &messages {
            let role = match message.sender {
                Sender::User => TurnRole::User,
                Sender::Bot => TurnRole::Model,
            };

            let mut parts = Vec::new();
            if !message.text.is_empty() {
                parts.push(InputPart::Text(message.text.clone()));
            }
            if let Some(attachment) = &message.attachment {
                parts.push(match self.media.resolve_history(attachment).await {
                    ResolvedPart::Inline { mime_type, data } => {
                        InputPart::InlineData { mime_type, data }
                    }
                    ResolvedPart::Text(text) => InputPart::Text(text),
                });
            }

            // A turn with no content (e.g. an empty bot reply) would be
            // rejected by the completion service; skip it.
            if !parts.is_empty() {
                turns.push(CompletionTurn { role, parts });
            }
        }

        Ok(turns)
    }
}
