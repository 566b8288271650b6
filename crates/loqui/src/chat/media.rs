//! Attachment resolution for completion input.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use tracing::warn;

use crate::chat::models::Attachment;

const DEFAULT_IMAGE_MIME: &str = "image/png";

/// An attachment normalized for the completion call: either an inlineable
/// payload or placeholder text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedPart {
    Inline { mime_type: String, data: String },
    Text(String),
}

/// A `data:` URI split into its declared mime type and raw base64 payload.
#[derive(Debug, Clone, PartialEq, Eq)]
struct InlinePayload {
    mime_type: String,
    data: String,
}

fn parse_data_uri(url: &str) -> Option<InlinePayload> {
    let rest = url.strip_prefix("data:")?;
    let (header, data) = rest.split_once(',')?;
    let mime = header.strip_suffix(";base64").unwrap_or(header);
    let mime = if mime.is_empty() { DEFAULT_IMAGE_MIME } else { mime };
    Some(InlinePayload {
        mime_type: mime.to_string(),
        data: data.to_string(),
    })
}

fn document_placeholder(attachment: &Attachment) -> ResolvedPart {
    ResolvedPart::Text(format!(
        "[user attached a document: {} ({})]",
        attachment.name, attachment.mime_type
    ))
}

fn unavailable_placeholder(attachment: &Attachment) -> ResolvedPart {
    ResolvedPart::Text(format!("[could not load image: {}]", attachment.name))
}

/// Normalizes attachment references into inline parts for the completion
/// call. Resolution failures degrade to placeholder text; they never
/// propagate past this boundary.
#[derive(Debug, Clone, Default)]
pub struct MediaResolver {
    http: reqwest::Client,
}

impl MediaResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve an attachment from persisted history.
    ///
    /// Non-image attachments always become placeholder text: documents are
    /// never inlined as binary. Inline payloads decode locally; remote image
    /// URLs are fetched and re-encoded.
    pub async fn resolve_history(&self, attachment: &Attachment) -> ResolvedPart {
        if !attachment.is_image() {
            return document_placeholder(attachment);
        }

        if attachment.is_inline() {
            return match parse_data_uri(&attachment.url) {
                Some(payload) => ResolvedPart::Inline {
                    mime_type: payload.mime_type,
                    data: payload.data,
                },
                None => {
                    warn!(name = %attachment.name, "malformed inline image payload");
                    unavailable_placeholder(attachment)
                }
            };
        }

        match self.fetch_image(&attachment.url).await {
            Ok(data) => ResolvedPart::Inline {
                mime_type: attachment.mime_type.clone(),
                data,
            },
            Err(err) => {
                warn!(url = %attachment.url, error = %err, "image fetch failed");
                unavailable_placeholder(attachment)
            }
        }
    }

    /// Resolve a brand-new attachment for the current turn's input parts.
    ///
    /// An inline image has its `data:` header stripped so only the raw
    /// base64 string travels; a stored-media URL yields `None` because the
    /// stored copy will appear through history once the turn is persisted.
    /// Non-image attachments degrade to the same document placeholder as
    /// history resolution. No network access.
    pub fn resolve_new(attachment: &Attachment) -> Option<ResolvedPart> {
        if !attachment.is_image() {
            return Some(document_placeholder(attachment));
        }

        if attachment.is_inline() {
            return parse_data_uri(&attachment.url).map(|payload| ResolvedPart::Inline {
                mime_type: payload.mime_type,
                data: payload.data,
            });
        }

        None
    }

    async fn fetch_image(&self, url: &str) -> Result<String, reqwest::Error> {
        let response = self.http.get(url).send().await?.error_for_status()?;
        let bytes = response.bytes().await?;
        Ok(BASE64.encode(&bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::models::AttachmentCategory;

    fn attachment(url: &str, mime: &str) -> Attachment {
        Attachment {
            url: url.into(),
            name: "thing".into(),
            mime_type: mime.into(),
            size: 0,
            category: AttachmentCategory::from_mime(mime),
        }
    }

    #[test]
    fn test_parse_data_uri() {
        let payload = parse_data_uri("data:image/jpeg;base64,QUJD").unwrap();
        assert_eq!(payload.mime_type, "image/jpeg");
        assert_eq!(payload.data, "QUJD");
    }

    #[test]
    fn test_parse_data_uri_defaults_to_png() {
        let payload = parse_data_uri("data:;base64,QUJD").unwrap();
        assert_eq!(payload.mime_type, "image/png");
    }

    #[test]
    fn test_parse_data_uri_rejects_plain_urls() {
        assert!(parse_data_uri("https://example.com/a.png").is_none());
        assert!(parse_data_uri("data:image/png").is_none());
    }

    #[tokio::test]
    async fn test_document_always_becomes_placeholder() {
        let resolver = MediaResolver::new();
        let att = attachment("https://files.example/r.pdf", "application/pdf");

        let part = resolver.resolve_history(&att).await;
        assert_eq!(
            part,
            ResolvedPart::Text("[user attached a document: thing (application/pdf)]".into())
        );
    }

    #[tokio::test]
    async fn test_inline_image_decodes_without_network() {
        let resolver = MediaResolver::new();
        let att = attachment("data:image/png;base64,QUJD", "image/png");

        let part = resolver.resolve_history(&att).await;
        assert_eq!(
            part,
            ResolvedPart::Inline {
                mime_type: "image/png".into(),
                data: "QUJD".into(),
            }
        );
    }

    #[tokio::test]
    async fn test_unreachable_image_degrades_to_text() {
        let resolver = MediaResolver::new();
        // Nothing listens on port 1; the connection is refused immediately.
        let att = attachment("http://127.0.0.1:1/x.png", "image/png");

        let part = resolver.resolve_history(&att).await;
        assert_eq!(part, ResolvedPart::Text("[could not load image: thing]".into()));
    }

    #[test]
    fn test_new_inline_image_strips_header() {
        let att = attachment("data:image/webp;base64,ZGF0YQ==", "image/webp");
        let part = MediaResolver::resolve_new(&att).unwrap();
        assert_eq!(
            part,
            ResolvedPart::Inline {
                mime_type: "image/webp".into(),
                data: "ZGF0YQ==".into(),
            }
        );
    }

    #[test]
    fn test_new_stored_image_is_skipped() {
        let att = attachment("https://files.example/pic.png", "image/png");
        assert!(MediaResolver::resolve_new(&att).is_none());
    }

    #[test]
    fn test_new_document_gets_placeholder() {
        let att = attachment("https://files.example/r.csv", "text/csv");
        let part = MediaResolver::resolve_new(&att).unwrap();
        assert!(matches!(part, ResolvedPart::Text(t) if t.contains("text/csv")));
    }
}
