//! Chat domain models.

use serde::{Deserialize, Serialize};

/// Caller identity class, resolved per request and never stored.
///
/// Determines the quota thresholds and the persistence backend. Anonymous
/// callers carry an opaque device key that scopes their ephemeral store; it
/// is not a user id and never leaves the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Authenticated { user_id: String },
    Anonymous { device: String },
}

impl Identity {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Identity::Authenticated { .. })
    }

    /// The key that scopes this identity's data in its backend.
    pub fn scope(&self) -> &str {
        match self {
            Identity::Authenticated { user_id } => user_id,
            Identity::Anonymous { device } => device,
        }
    }
}

/// A conversation owned by one identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub title: String,
    /// User id for persisted conversations; absent for ephemeral ones.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    /// RFC 3339 timestamps.
    pub created_at: String,
    pub updated_at: String,
}

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

impl std::fmt::Display for Sender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Sender::User => write!(f, "user"),
            Sender::Bot => write!(f, "bot"),
        }
    }
}

impl std::str::FromStr for Sender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Sender::User),
            "bot" => Ok(Sender::Bot),
            _ => Err(format!("unknown sender: {}", s)),
        }
    }
}

/// A single turn within a conversation. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub sender: Sender,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,
    pub created_at: String,
}

/// New turn to append; the store assigns id and timestamp.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub sender: Sender,
    pub text: String,
    pub attachment: Option<Attachment>,
}

/// File payload carried by a message, in the wire shape exchanged with
/// clients: `{url, name, type, size, category}`.
///
/// `url` is either an inline `data:` payload or an object-storage reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub url: String,
    pub name: String,
    #[serde(rename = "type")]
    pub mime_type: String,
    pub size: u64,
    pub category: AttachmentCategory,
}

impl Attachment {
    pub fn is_inline(&self) -> bool {
        self.url.starts_with("data:")
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }
}

/// Coarse attachment classification used by the UI and the media resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentCategory {
    Image,
    Document,
    Text,
    Json,
    Other,
}

impl AttachmentCategory {
    /// Classify a MIME type.
    pub fn from_mime(mime: &str) -> Self {
        let mime = mime.trim().to_ascii_lowercase();
        if mime.starts_with("image/") {
            Self::Image
        } else if mime == "application/pdf"
            || mime.starts_with("application/msword")
            || mime.starts_with("application/vnd.openxmlformats-officedocument")
            || mime.starts_with("application/vnd.ms-")
        {
            Self::Document
        } else if mime == "application/json" {
            Self::Json
        } else if mime.starts_with("text/") {
            Self::Text
        } else {
            Self::Other
        }
    }
}

impl std::fmt::Display for AttachmentCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Image => "image",
            Self::Document => "document",
            Self::Text => "text",
            Self::Json => "json",
            Self::Other => "other",
        };
        write!(f, "{}", name)
    }
}

impl std::str::FromStr for AttachmentCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(Self::Image),
            "document" => Ok(Self::Document),
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            "other" => Ok(Self::Other),
            _ => Err(format!("unknown attachment category: {}", s)),
        }
    }
}

/// Per-identity usage counters read by the quota ledger.
///
/// Derived from persisted rows for authenticated identities, read from
/// stored counters for anonymous ones; the ledger sees one shape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QuotaCounters {
    /// User-sent turns.
    pub messages: u64,
    pub conversations: u64,
    /// Uploaded files (persisted attachments for authenticated identities).
    pub files: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sender_round_trip() {
        assert_eq!("user".parse::<Sender>().unwrap(), Sender::User);
        assert_eq!("bot".parse::<Sender>().unwrap(), Sender::Bot);
        assert_eq!(Sender::Bot.to_string(), "bot");
        assert!("model".parse::<Sender>().is_err());
    }

    #[test]
    fn test_category_from_mime() {
        assert_eq!(AttachmentCategory::from_mime("image/png"), AttachmentCategory::Image);
        assert_eq!(
            AttachmentCategory::from_mime("application/pdf"),
            AttachmentCategory::Document
        );
        assert_eq!(AttachmentCategory::from_mime("text/csv"), AttachmentCategory::Text);
        assert_eq!(
            AttachmentCategory::from_mime("application/json"),
            AttachmentCategory::Json
        );
        assert_eq!(AttachmentCategory::from_mime("video/mp4"), AttachmentCategory::Other);
    }

    #[test]
    fn test_category_office_docs() {
        assert_eq!(
            AttachmentCategory::from_mime(
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            ),
            AttachmentCategory::Document
        );
    }

    #[test]
    fn test_attachment_wire_shape() {
        let attachment = Attachment {
            url: "https://files.example/abc".into(),
            name: "report.pdf".into(),
            mime_type: "application/pdf".into(),
            size: 1024,
            category: AttachmentCategory::Document,
        };

        let json = serde_json::to_value(&attachment).unwrap();
        assert_eq!(json["type"], "application/pdf");
        assert_eq!(json["category"], "document");
        assert_eq!(json["size"], 1024);
    }

    #[test]
    fn test_identity_scope() {
        let auth = Identity::Authenticated { user_id: "u1".into() };
        let anon = Identity::Anonymous { device: "d1".into() };
        assert!(auth.is_authenticated());
        assert!(!anon.is_authenticated());
        assert_eq!(auth.scope(), "u1");
        assert_eq!(anon.scope(), "d1");
    }
}
