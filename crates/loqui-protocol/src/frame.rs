//! Stream frame definitions and line encoding.

use serde::{Deserialize, Serialize};

/// One discrete unit of the streaming wire protocol.
///
/// Serializes to the JSON union `{"chunk": ...} | {"done": true} |
/// {"error": ...}` carried on a `data:` line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StreamFrame {
    /// An incremental text fragment of the bot's reply.
    Chunk { chunk: String },
    /// Terminal frame for a successfully completed session.
    Done { done: bool },
    /// Terminal frame carrying a user-renderable error message.
    Error { error: String },
}

impl StreamFrame {
    /// Build a chunk frame.
    pub fn chunk(text: impl Into<String>) -> Self {
        Self::Chunk { chunk: text.into() }
    }

    /// Build the terminal done frame.
    pub fn done() -> Self {
        Self::Done { done: true }
    }

    /// Build a terminal error frame.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }

    /// Whether this frame ends the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }

    /// Encode the frame as one wire event: `data: <JSON>\n\n`.
    ///
    /// Frame payloads are single-line by construction: `serde_json` escapes
    /// any newline inside chunk text.
    pub fn encode(&self) -> String {
        let json = serde_json::to_string(self).expect("stream frame serializes");
        format!("data: {}\n\n", json)
    }
}
