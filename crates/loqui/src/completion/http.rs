//! HTTP client for a Gemini-compatible streaming completion API.

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream;
use reqwest_eventsource::{Event, EventSource, RequestBuilderExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{
    CompletionBackend, CompletionError, CompletionResult, CompletionTurn, FragmentStream,
    InputPart, TurnRole,
};

/// Client for `models/{model}:streamGenerateContent` with SSE delivery.
#[derive(Debug, Clone)]
pub struct HttpCompletionClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<PartBody>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PartBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineDataBody>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineDataBody {
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<ChunkContent>,
}

#[derive(Debug, Deserialize)]
struct ChunkContent {
    #[serde(default)]
    parts: Vec<ChunkPart>,
}

#[derive(Debug, Deserialize)]
struct ChunkPart {
    text: Option<String>,
}

fn part_body(part: InputPart) -> PartBody {
    match part {
        InputPart::Text(text) => PartBody {
            text: Some(text),
            inline_data: None,
        },
        InputPart::InlineData { mime_type, data } => PartBody {
            text: None,
            inline_data: Some(InlineDataBody { mime_type, data }),
        },
    }
}

fn content(role: TurnRole, parts: Vec<InputPart>) -> Content {
    Content {
        role: match role {
            TurnRole::User => "user",
            TurnRole::Model => "model",
        },
        parts: parts.into_iter().map(part_body).collect(),
    }
}

/// Extract the concatenated fragment text from one SSE data payload.
/// Payloads without text (safety metadata, usage reports) yield `None`.
fn extract_fragment(data: &str) -> Option<String> {
    let chunk = match serde_json::from_str::<GenerateChunk>(data) {
        Ok(chunk) => chunk,
        Err(err) => {
            warn!(error = %err, "skipping unparseable completion chunk");
            return None;
        }
    };

    let text: String = chunk
        .candidates
        .into_iter()
        .filter_map(|c| c.content)
        .flat_map(|c| c.parts)
        .filter_map(|p| p.text)
        .collect();

    (!text.is_empty()).then_some(text)
}

impl HttpCompletionClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl CompletionBackend for HttpCompletionClient {
    async fn stream_completion(
        &self,
        history: Vec<CompletionTurn>,
        parts: Vec<InputPart>,
    ) -> CompletionResult<FragmentStream> {
        let mut contents: Vec<Content> = history
            .into_iter()
            .map(|turn| content(turn.role, turn.parts))
            .collect();
        contents.push(content(TurnRole::User, parts));

        let url = format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.base_url, self.model
        );

        let source = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&GenerateRequest { contents })
            .eventsource()
            .map_err(|err| CompletionError::Request(err.to_string()))?;

        debug!(model = %self.model, "opened completion stream");

        let fragments = stream::unfold(source, |mut source| async move {
            loop {
                match source.next().await {
                    Some(Ok(Event::Open)) => continue,
                    Some(Ok(Event::Message(message))) => {
                        if message.data == "[DONE]" {
                            source.close();
                            return None;
                        }
                        match extract_fragment(&message.data) {
                            Some(text) => return Some((Ok(text), source)),
                            None => continue,
                        }
                    }
                    Some(Err(reqwest_eventsource::Error::StreamEnded)) | None => {
                        source.close();
                        return None;
                    }
                    Some(Err(err)) => {
                        source.close();
                        return Some((Err(CompletionError::Stream(err.to_string())), source));
                    }
                }
            }
        });

        Ok(fragments.boxed())
    }
}
