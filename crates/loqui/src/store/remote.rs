//! SQLite-backed conversation store for authenticated users.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::FromRow;
use uuid::Uuid;

use super::{ConversationStore, StoreError, StoreResult};
use crate::chat::models::{
    Attachment, AttachmentCategory, Conversation, Message, NewMessage, QuotaCounters, Sender,
};
use crate::db::Database;

/// Remote persistent store. Counters are derived from persisted rows.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    db: Database,
}

/// Flat message row; attachments are stored as nullable columns.
#[derive(Debug, FromRow)]
struct MessageRow {
    id: String,
    conversation_id: String,
    sender: String,
    body: String,
    attachment_url: Option<String>,
    attachment_name: Option<String>,
    attachment_mime: Option<String>,
    attachment_size: Option<i64>,
    attachment_category: Option<String>,
    created_at: String,
}

impl MessageRow {
    fn into_message(self) -> Message {
        let attachment = match (self.attachment_url, self.attachment_name) {
            (Some(url), Some(name)) => {
                let mime = self.attachment_mime.unwrap_or_default();
                let category = self
                    .attachment_category
                    .as_deref()
                    .and_then(|c| c.parse().ok())
                    .unwrap_or_else(|| AttachmentCategory::from_mime(&mime));
                Some(Attachment {
                    url,
                    name,
                    mime_type: mime,
                    size: self.attachment_size.unwrap_or(0) as u64,
                    category,
                })
            }
            _ => None,
        };

        Message {
            id: self.id,
            conversation_id: self.conversation_id,
            sender: self.sender.parse().unwrap_or(Sender::User),
            text: self.body,
            attachment,
            created_at: self.created_at,
        }
    }
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Load a conversation by id and verify it belongs to `scope`.
    ///
    /// This runs before every operation that targets an existing
    /// conversation, so cross-user access fails closed.
    async fn ensure_owned(&self, scope: &str, conversation_id: &str) -> StoreResult<Conversation> {
        let row = sqlx::query_as::<_, Conversation>(
            "SELECT id, owner_id, title, created_at, updated_at FROM conversations WHERE id = ?",
        )
        .bind(conversation_id)
        .fetch_optional(self.db.pool())
        .await?;

        match row {
            None => Err(StoreError::ConversationNotFound(conversation_id.to_string())),
            Some(conversation) if conversation.owner_id.as_deref() != Some(scope) => {
                Err(StoreError::AccessDenied(conversation_id.to_string()))
            }
            Some(conversation) => Ok(conversation),
        }
    }
}

impl<'r> FromRow<'r, sqlx::sqlite::SqliteRow> for Conversation {
    fn from_row(row: &'r sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        Ok(Conversation {
            id: row.try_get("id")?,
            owner_id: row.try_get("owner_id")?,
            title: row.try_get("title")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl ConversationStore for SqliteStore {
    async fn create_conversation(&self, scope: &str, title: &str) -> StoreResult<Conversation> {
        let now = Utc::now().to_rfc3339();
        let conversation = Conversation {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            owner_id: Some(scope.to_string()),
            created_at: now.clone(),
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO conversations (id, owner_id, title, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&conversation.id)
        .bind(scope)
        .bind(&conversation.title)
        .bind(&conversation.created_at)
        .bind(&conversation.updated_at)
        .execute(self.db.pool())
        .await?;

        Ok(conversation)
    }

    async fn list_conversations(&self, scope: &str) -> StoreResult<Vec<Conversation>> {
        let rows = sqlx::query_as::<_, Conversation>(
            r#"
            SELECT id, owner_id, title, created_at, updated_at
            FROM conversations
            WHERE owner_id = ?
            ORDER BY updated_at DESC
            "#,
        )
        .bind(scope)
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows)
    }

    async fn get_conversation(&self, scope: &str, id: &str) -> StoreResult<Conversation> {
        self.ensure_owned(scope, id).await
    }

    async fn append_message(
        &self,
        scope: &str,
        conversation_id: &str,
        message: NewMessage,
    ) -> StoreResult<Message> {
        self.ensure_owned(scope, conversation_id).await?;

        let id = Uuid::new_v4().to_string();
        let created_at = Utc::now().to_rfc3339();
        let attachment = message.attachment;

        sqlx::query(
            r#"
            INSERT INTO messages (
                id, conversation_id, sender, body,
                attachment_url, attachment_name, attachment_mime,
                attachment_size, attachment_category, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(conversation_id)
        .bind(message.sender.to_string())
        .bind(&message.text)
        .bind(attachment.as_ref().map(|a| a.url.clone()))
        .bind(attachment.as_ref().map(|a| a.name.clone()))
        .bind(attachment.as_ref().map(|a| a.mime_type.clone()))
        .bind(attachment.as_ref().map(|a| a.size as i64))
        .bind(attachment.as_ref().map(|a| a.category.to_string()))
        .bind(&created_at)
        .execute(self.db.pool())
        .await?;

        Ok(Message {
            id,
            conversation_id: conversation_id.to_string(),
            sender: message.sender,
            text: message.text,
            attachment,
            created_at,
        })
    }

    async fn messages(&self, scope: &str, conversation_id: &str) -> StoreResult<Vec<Message>> {
        self.ensure_owned(scope, conversation_id).await?;

        let rows = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT id, conversation_id, sender, body,
                   attachment_url, attachment_name, attachment_mime,
                   attachment_size, attachment_category, created_at
            FROM messages
            WHERE conversation_id = ?
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(conversation_id)
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows.into_iter().map(MessageRow::into_message).collect())
    }

    async fn touch_conversation(&self, scope: &str, conversation_id: &str) -> StoreResult<()> {
        self.ensure_owned(scope, conversation_id).await?;

        sqlx::query("UPDATE conversations SET updated_at = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(conversation_id)
            .execute(self.db.pool())
            .await?;

        Ok(())
    }

    async fn delete_conversation(
        &self,
        scope: &str,
        conversation_id: &str,
    ) -> StoreResult<Vec<Attachment>> {
        self.ensure_owned(scope, conversation_id).await?;

        let attachments = self
            .messages(scope, conversation_id)
            .await?
            .into_iter()
            .filter_map(|m| m.attachment)
            .collect();

        sqlx::query("DELETE FROM messages WHERE conversation_id = ?")
            .bind(conversation_id)
            .execute(self.db.pool())
            .await?;
        sqlx::query("DELETE FROM conversations WHERE id = ?")
            .bind(conversation_id)
            .execute(self.db.pool())
            .await?;

        Ok(attachments)
    }

    async fn counters(&self, scope: &str) -> StoreResult<QuotaCounters> {
        let conversations = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM conversations WHERE owner_id = ?",
        )
        .bind(scope)
        .fetch_one(self.db.pool())
        .await?;

        let messages = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM messages m
            JOIN conversations c ON m.conversation_id = c.id
            WHERE c.owner_id = ? AND m.sender = 'user'
            "#,
        )
        .bind(scope)
        .fetch_one(self.db.pool())
        .await?;

        let files = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM messages m
            JOIN conversations c ON m.conversation_id = c.id
            WHERE c.owner_id = ? AND m.attachment_url IS NOT NULL
            "#,
        )
        .bind(scope)
        .fetch_one(self.db.pool())
        .await?;

        Ok(QuotaCounters {
            messages: messages as u64,
            conversations: conversations as u64,
            files: files as u64,
        })
    }

    async fn record_file(&self, _scope: &str, _attachment: &Attachment) -> StoreResult<()> {
        // File counts are derived from persisted messages; nothing to store.
        Ok(())
    }
}
