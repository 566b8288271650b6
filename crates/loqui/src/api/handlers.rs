//! API request handlers.

use axum::Json;
use axum::body::Body;
use axum::extract::{Multipart, Path, State};
use axum::http::{StatusCode, header};
use axum::response::Response;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use super::error::{ApiError, ApiResult};
use super::state::AppState;
use crate::chat::models::{Attachment, AttachmentCategory, Conversation, Identity, Message, NewMessage, Sender};
use crate::chat::{QuotaKind, TurnRequest};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Request body shared by the streaming and non-streaming chat endpoints.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub file_data: Option<Attachment>,
}

/// Non-streaming chat response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub success: bool,
    pub response: String,
    pub conversation_id: String,
}

/// File quota status response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileQuotaResponse {
    pub can_upload: bool,
    pub current: u64,
    pub limit: Option<u64>,
    pub remaining: Option<u64>,
}

/// Request to create a conversation explicitly.
#[derive(Debug, Deserialize)]
pub struct CreateConversationRequest {
    pub title: String,
}

/// Request to append a message to a conversation.
#[derive(Debug, Deserialize)]
pub struct AppendMessageRequest {
    pub sender: Sender,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub attachment: Option<Attachment>,
}

impl ChatRequest {
    fn into_turn_request(self, identity: Identity) -> TurnRequest {
        TurnRequest {
            identity,
            conversation_id: self.conversation_id,
            message: self.message,
            attachment: self.file_data,
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Stream a chat turn as frame-protocol lines.
///
/// Errors before streaming starts surface as structured HTTP errors; once
/// the stream is open, failures arrive as a terminal error frame instead.
#[instrument(skip(state, request), fields(conversation_id = ?request.conversation_id))]
pub async fn chat_stream(
    State(state): State<AppState>,
    identity: Identity,
    Json(request): Json<ChatRequest>,
) -> ApiResult<Response> {
    let (conversation, frames) = state
        .chat
        .stream_turn(request.into_turn_request(identity))
        .await?;

    let body = Body::from_stream(tokio_stream::StreamExt::map(frames, |frame| {
        Ok::<_, std::convert::Infallible>(Bytes::from(frame.encode()))
    }));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .header("X-Accel-Buffering", "no") // Disable nginx buffering if present
        .header("X-Conversation-Id", conversation.id)
        .body(body)
        .map_err(|e| ApiError::internal(e.to_string()))
}

/// Run a chat turn to completion and return the full reply at once.
#[instrument(skip(state, request), fields(conversation_id = ?request.conversation_id))]
pub async fn chat(
    State(state): State<AppState>,
    identity: Identity,
    Json(request): Json<ChatRequest>,
) -> ApiResult<Json<ChatResponse>> {
    let outcome = state
        .chat
        .complete_turn(request.into_turn_request(identity))
        .await?;

    Ok(Json(ChatResponse {
        success: true,
        response: outcome.response,
        conversation_id: outcome.conversation_id,
    }))
}

/// File quota status for the caller.
pub async fn file_quota(
    State(state): State<AppState>,
    identity: Identity,
) -> ApiResult<Json<FileQuotaResponse>> {
    let status = state.ledger.check(QuotaKind::File, &identity).await?;
    Ok(Json(FileQuotaResponse {
        can_upload: status.allowed,
        current: status.current,
        limit: status.limit,
        remaining: status.remaining,
    }))
}

/// List the caller's conversations, most recently updated first.
pub async fn list_conversations(
    State(state): State<AppState>,
    identity: Identity,
) -> ApiResult<Json<Vec<Conversation>>> {
    let conversations = state.gateway.list_conversations(&identity).await?;
    Ok(Json(conversations))
}

/// Create a conversation.
#[instrument(skip(state, request))]
pub async fn create_conversation(
    State(state): State<AppState>,
    identity: Identity,
    Json(request): Json<CreateConversationRequest>,
) -> ApiResult<(StatusCode, Json<Conversation>)> {
    let title = request.title.trim();
    if title.is_empty() {
        return Err(ApiError::bad_request("title is required"));
    }

    state.ledger.require(QuotaKind::Conversation, &identity).await?;
    let conversation = state.gateway.create_conversation(&identity, title).await?;
    info!(conversation_id = %conversation.id, "Created conversation");

    Ok((StatusCode::CREATED, Json(conversation)))
}

/// Delete a conversation, cascading messages and stored attachments.
#[instrument(skip(state))]
pub async fn delete_conversation(
    State(state): State<AppState>,
    identity: Identity,
    Path(conversation_id): Path<String>,
) -> ApiResult<StatusCode> {
    state.gateway.delete_conversation(&identity, &conversation_id).await?;
    info!(conversation_id = %conversation_id, "Deleted conversation");
    Ok(StatusCode::NO_CONTENT)
}

/// List a conversation's messages in creation order.
#[instrument(skip(state))]
pub async fn get_messages(
    State(state): State<AppState>,
    identity: Identity,
    Path(conversation_id): Path<String>,
) -> ApiResult<Json<Vec<Message>>> {
    let messages = state.gateway.get_messages(&identity, &conversation_id).await?;
    Ok(Json(messages))
}

/// Append a message to a conversation.
///
/// User-sent turns count against the message quota; this is where the
/// anonymous ceiling is enforced, before the client opens its stream.
#[instrument(skip(state, request), fields(sender = %request.sender))]
pub async fn append_message(
    State(state): State<AppState>,
    identity: Identity,
    Path(conversation_id): Path<String>,
    Json(request): Json<AppendMessageRequest>,
) -> ApiResult<(StatusCode, Json<Message>)> {
    if request.text.trim().is_empty() && request.attachment.is_none() {
        return Err(ApiError::bad_request("text or attachment is required"));
    }

    if request.sender == Sender::User {
        state.ledger.require(QuotaKind::Message, &identity).await?;
    }

    let message = state
        .gateway
        .append_message(
            &identity,
            &conversation_id,
            NewMessage {
                sender: request.sender,
                text: request.text,
                attachment: request.attachment,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(message)))
}

/// Upload a file to object storage, gated by the file quota.
///
/// The quota counter moves only after the upload succeeds.
#[instrument(skip(state, multipart))]
pub async fn upload_file(
    State(state): State<AppState>,
    identity: Identity,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<Attachment>)> {
    state.ledger.require(QuotaKind::File, &identity).await?;

    let field = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(e.to_string()))?
        .ok_or_else(|| ApiError::bad_request("missing file field"))?;

    let name = sanitize_file_name(field.file_name().unwrap_or("upload"));
    let mime = field
        .content_type()
        .map(str::to_string)
        .unwrap_or_else(|| mime_guess::from_path(&name).first_or_octet_stream().to_string());

    let data = field
        .bytes()
        .await
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
    if data.is_empty() {
        return Err(ApiError::bad_request("file is empty"));
    }

    let key = format!("uploads/{}/{}", Uuid::new_v4(), name);
    let object = state.objects.put(&key, &data).await?;

    let attachment = Attachment {
        url: object.url,
        name,
        mime_type: mime.clone(),
        size: object.size,
        category: AttachmentCategory::from_mime(&mime),
    };
    state.gateway.record_file(&identity, &attachment).await?;
    info!(key = %key, size = attachment.size, "Stored upload");

    Ok((StatusCode::CREATED, Json(attachment)))
}

/// Serve a stored file.
pub async fn get_file(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> ApiResult<Response> {
    let data = state.objects.read(&key).await?;
    let mime = mime_guess::from_path(&key).first_or_octet_stream();

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, mime.as_ref())
        .body(Body::from(data))
        .map_err(|e| ApiError::internal(e.to_string()))
}

/// Keep a client-supplied file name safe for storage keys.
fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let trimmed = cleaned.trim_matches(['.', '_']);
    if trimmed.is_empty() {
        "upload".to_string()
    } else {
        trimmed.chars().take(120).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("report.pdf"), "report.pdf");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "etc_passwd");
        assert_eq!(sanitize_file_name("my photo (1).png"), "my_photo__1_.png");
        assert_eq!(sanitize_file_name("..."), "upload");
    }

    #[test]
    fn test_chat_request_wire_names() {
        let request: ChatRequest = serde_json::from_str(
            r#"{"message":"hi","conversationId":"c1","fileData":null}"#,
        )
        .unwrap();
        assert_eq!(request.message, "hi");
        assert_eq!(request.conversation_id.as_deref(), Some("c1"));
        assert!(request.file_data.is_none());
    }
}
