//! Streaming turn controller.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};

use loqui_protocol::StreamFrame;

use super::history::HistoryAssembler;
use super::media::{MediaResolver, ResolvedPart};
use super::quota::{QuotaKind, QuotaLedger};
use super::ChatError;
use crate::chat::models::{Attachment, Conversation, Identity, NewMessage, Sender};
use crate::completion::{CompletionBackend, CompletionTurn, InputPart};
use crate::store::PersistenceGateway;

/// One chat turn as received from the API layer.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub identity: Identity,
    /// Absent on a conversation's first turn; one is created.
    pub conversation_id: Option<String>,
    pub message: String,
    pub attachment: Option<Attachment>,
}

/// Result of a non-streaming turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub conversation_id: String,
    pub response: String,
}

/// Progress of one turn through the pipeline, for tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TurnPhase {
    AccessChecked,
    HistoryLoaded,
    Streaming,
    Persisted,
    Closed,
    Errored,
}

/// A validated turn holding its conversation's advisory lock.
struct PreparedTurn {
    identity: Identity,
    conversation: Conversation,
    history: Vec<CompletionTurn>,
    parts: Vec<InputPart>,
    /// Released when the turn finishes; a second send for the same
    /// conversation fails fast instead of racing the ledger and the stores.
    _guard: OwnedMutexGuard<()>,
}

/// Drives one request through quota check, persistence, history assembly and
/// the streamed completion call.
pub struct ChatService {
    gateway: Arc<PersistenceGateway>,
    ledger: Arc<QuotaLedger>,
    assembler: HistoryAssembler,
    completion: Arc<dyn CompletionBackend>,
    turn_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ChatService {
    pub fn new(
        gateway: Arc<PersistenceGateway>,
        ledger: Arc<QuotaLedger>,
        completion: Arc<dyn CompletionBackend>,
    ) -> Self {
        let assembler = HistoryAssembler::new(gateway.clone(), MediaResolver::new());
        Self {
            gateway,
            ledger,
            assembler,
            completion,
            turn_locks: DashMap::new(),
        }
    }

    /// Run a turn, streaming frames as they are produced.
    ///
    /// The returned stream always ends with a terminal frame. Dropping it
    /// aborts the turn: the upstream completion call stops and no bot turn
    /// is persisted.
    pub async fn stream_turn(
        &self,
        request: TurnRequest,
    ) -> Result<(Conversation, ReceiverStream<StreamFrame>), ChatError> {
        let prepared = self.prepare_turn(request).await?;
        let conversation = prepared.conversation.clone();

        let (tx, rx) = mpsc::channel(32);
        let gateway = self.gateway.clone();
        let completion = self.completion.clone();
        tokio::spawn(async move {
            run_turn(gateway, completion, prepared, tx).await;
        });

        Ok((conversation, ReceiverStream::new(rx)))
    }

    /// Run a turn to completion and return the full reply.
    pub async fn complete_turn(&self, request: TurnRequest) -> Result<TurnOutcome, ChatError> {
        use futures::StreamExt;

        let prepared = self.prepare_turn(request).await?;
        let conversation_id = prepared.conversation.id.clone();

        let mut fragments = self
            .completion
            .stream_completion(prepared.history.clone(), prepared.parts.clone())
            .await
            .map_err(|err| ChatError::Upstream(err.to_string()))?;

        let mut accumulated = String::new();
        while let Some(fragment) = fragments.next().await {
            let fragment = fragment.map_err(|err| ChatError::Upstream(err.to_string()))?;
            accumulated.push_str(&fragment);
        }

        persist_bot_turn(
            &self.gateway,
            &prepared.identity,
            &conversation_id,
            accumulated.clone(),
        )
        .await?;

        Ok(TurnOutcome {
            conversation_id,
            response: accumulated,
        })
    }

    /// Validate the request, settle quota and ownership, persist the user
    /// turn and assemble the model input.
    async fn prepare_turn(&self, request: TurnRequest) -> Result<PreparedTurn, ChatError> {
        let TurnRequest {
            identity,
            conversation_id,
            message,
            attachment,
        } = request;

        if message.trim().is_empty() && attachment.is_none() {
            return Err(ChatError::Validation(
                "message or attachment is required".to_string(),
            ));
        }

        // Quota and ownership settle before any side effect. Anonymous
        // callers pass the access check: their message quota was enforced
        // when their client appended the turn to its own store.
        let conversation = match &conversation_id {
            Some(id) => self.gateway.verify_ownership(&identity, id).await?,
            None => {
                self.ledger.require(QuotaKind::Conversation, &identity).await?;
                self.gateway
                    .create_conversation(&identity, &title_from_message(&message))
                    .await?
            }
        };
        debug!(conversation_id = %conversation.id, phase = ?TurnPhase::AccessChecked, "turn admitted");

        let guard = self.acquire_turn_lock(&conversation.id)?;

        // The user's turn is saved before streaming begins, so a later
        // failure still leaves it persisted. Anonymous clients have already
        // appended it to their own store before calling.
        let exclude_last = if identity.is_authenticated() {
            self.ledger.require(QuotaKind::Message, &identity).await?;
            self.gateway
                .append_message(
                    &identity,
                    &conversation.id,
                    NewMessage {
                        sender: Sender::User,
                        text: message.clone(),
                        attachment: attachment.clone(),
                    },
                )
                .await?;
            true
        } else {
            false
        };

        let history = self
            .assembler
            .assemble(&identity, &conversation.id, exclude_last)
            .await;
        debug!(
            conversation_id = %conversation.id,
            turns = history.len(),
            phase = ?TurnPhase::HistoryLoaded,
            "history assembled"
        );

        let mut parts = Vec::new();
        if !message.trim().is_empty() {
            parts.push(InputPart::Text(message));
        }
        if let Some(attachment) = &attachment {
            match MediaResolver::resolve_new(attachment) {
                Some(ResolvedPart::Inline { mime_type, data }) => {
                    parts.push(InputPart::InlineData { mime_type, data });
                }
                Some(ResolvedPart::Text(text)) => parts.push(InputPart::Text(text)),
                // Stored media reappears through history once persisted.
                None => {}
            }
        }

        Ok(PreparedTurn {
            identity,
            conversation,
            history,
            parts,
            _guard: guard,
        })
    }

    fn acquire_turn_lock(&self, conversation_id: &str) -> Result<OwnedMutexGuard<()>, ChatError> {
        let lock = self
            .turn_locks
            .entry(conversation_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.try_lock_owned()
            .map_err(|_| ChatError::TurnInFlight(conversation_id.to_string()))
    }
}

/// Stream fragments to the caller, then persist the bot turn and emit the
/// terminal frame. Runs detached; a closed receiver means the caller went
/// away and aborts the turn.
async fn run_turn(
    gateway: Arc<PersistenceGateway>,
    completion: Arc<dyn CompletionBackend>,
    prepared: PreparedTurn,
    tx: mpsc::Sender<StreamFrame>,
) {
    use futures::StreamExt;

    let PreparedTurn {
        identity,
        conversation,
        history,
        parts,
        _guard,
    } = prepared;

    let mut fragments = match completion.stream_completion(history, parts).await {
        Ok(fragments) => fragments,
        Err(err) => {
            error!(conversation_id = %conversation.id, error = %err, "completion call failed");
            let _ = tx.send(StreamFrame::error(err.to_string())).await;
            return;
        }
    };
    debug!(conversation_id = %conversation.id, phase = ?TurnPhase::Streaming, "streaming");

    let mut accumulated = String::new();
    while let Some(fragment) = fragments.next().await {
        match fragment {
            Ok(fragment) => {
                accumulated.push_str(&fragment);
                if tx.send(StreamFrame::chunk(fragment)).await.is_err() {
                    // Caller aborted; dropping the fragment stream stops the
                    // upstream call. The partially accumulated reply is
                    // discarded rather than persisted.
                    warn!(conversation_id = %conversation.id, "client went away mid-stream");
                    return;
                }
            }
            Err(err) => {
                error!(
                    conversation_id = %conversation.id,
                    phase = ?TurnPhase::Errored,
                    error = %err,
                    "completion stream failed"
                );
                let _ = tx.send(StreamFrame::error(err.to_string())).await;
                return;
            }
        }
    }

    // An empty reply is still a reply: persist it and close normally.
    match persist_bot_turn(&gateway, &identity, &conversation.id, accumulated).await {
        Ok(()) => {
            debug!(conversation_id = %conversation.id, phase = ?TurnPhase::Persisted, "bot turn persisted");
            let _ = tx.send(StreamFrame::done()).await;
            info!(conversation_id = %conversation.id, phase = ?TurnPhase::Closed, "turn complete");
        }
        Err(err) => {
            error!(
                conversation_id = %conversation.id,
                phase = ?TurnPhase::Errored,
                error = %err,
                "failed to persist bot turn"
            );
            let _ = tx.send(StreamFrame::error(err.to_string())).await;
        }
    }
}

async fn persist_bot_turn(
    gateway: &PersistenceGateway,
    identity: &Identity,
    conversation_id: &str,
    text: String,
) -> Result<(), ChatError> {
    gateway
        .append_message(
            identity,
            conversation_id,
            NewMessage {
                sender: Sender::Bot,
                text,
                attachment: None,
            },
        )
        .await?;
    gateway.touch_conversation(identity, conversation_id).await?;
    Ok(())
}

/// Derive a conversation title from the opening message.
fn title_from_message(message: &str) -> String {
    let trimmed = message.trim();
    if trimmed.is_empty() {
        return "New conversation".to_string();
    }

    if trimmed.chars().count() <= 40 {
        trimmed.to_string()
    } else {
        let mut title: String = trimmed.chars().take(40).collect();
        title.push_str("...");
        title
    }
}
