//! Dual persistence gateway.

use std::sync::Arc;

use tracing::warn;

use super::{ConversationStore, EphemeralStore, SqliteStore, StoreResult};
use crate::chat::models::{
    Attachment, Conversation, Identity, Message, NewMessage, QuotaCounters,
};
use crate::storage::ObjectStore;

/// Routes conversation reads and writes to the backend matching the caller's
/// identity class. This is the only place that inspects identity presence;
/// both backends expose the same [`ConversationStore`] shape below it.
pub struct PersistenceGateway {
    remote: Arc<SqliteStore>,
    ephemeral: Arc<EphemeralStore>,
    objects: Arc<dyn ObjectStore>,
}

impl PersistenceGateway {
    pub fn new(
        remote: Arc<SqliteStore>,
        ephemeral: Arc<EphemeralStore>,
        objects: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            remote,
            ephemeral,
            objects,
        }
    }

    fn backend(&self, identity: &Identity) -> (&dyn ConversationStore, &str) {
        match identity {
            Identity::Authenticated { user_id } => (self.remote.as_ref(), user_id.as_str()),
            Identity::Anonymous { device } => (self.ephemeral.as_ref(), device.as_str()),
        }
    }

    pub async fn create_conversation(
        &self,
        identity: &Identity,
        title: &str,
    ) -> StoreResult<Conversation> {
        let (store, scope) = self.backend(identity);
        store.create_conversation(scope, title).await
    }

    pub async fn list_conversations(&self, identity: &Identity) -> StoreResult<Vec<Conversation>> {
        let (store, scope) = self.backend(identity);
        store.list_conversations(scope).await
    }

    /// Existence plus ownership check; the backend surfaces a foreign
    /// conversation as access-denied, never as a silent no-op.
    pub async fn verify_ownership(
        &self,
        identity: &Identity,
        conversation_id: &str,
    ) -> StoreResult<Conversation> {
        let (store, scope) = self.backend(identity);
        store.get_conversation(scope, conversation_id).await
    }

    pub async fn append_message(
        &self,
        identity: &Identity,
        conversation_id: &str,
        message: NewMessage,
    ) -> StoreResult<Message> {
        let (store, scope) = self.backend(identity);
        store.append_message(scope, conversation_id, message).await
    }

    pub async fn get_messages(
        &self,
        identity: &Identity,
        conversation_id: &str,
    ) -> StoreResult<Vec<Message>> {
        let (store, scope) = self.backend(identity);
        store.messages(scope, conversation_id).await
    }

    pub async fn touch_conversation(
        &self,
        identity: &Identity,
        conversation_id: &str,
    ) -> StoreResult<()> {
        let (store, scope) = self.backend(identity);
        store.touch_conversation(scope, conversation_id).await
    }

    /// Delete a conversation, cascading its messages, then clean up any
    /// storage-backed attachments they referenced. Blob cleanup is best
    /// effort: a missing blob only warns.
    pub async fn delete_conversation(
        &self,
        identity: &Identity,
        conversation_id: &str,
    ) -> StoreResult<()> {
        let (store, scope) = self.backend(identity);
        let attachments = store.delete_conversation(scope, conversation_id).await?;
        self.cleanup_attachments(&attachments).await;
        Ok(())
    }

    pub async fn counters(&self, identity: &Identity) -> StoreResult<QuotaCounters> {
        let (store, scope) = self.backend(identity);
        store.counters(scope).await
    }

    /// Record a completed file upload against the identity's counters.
    pub async fn record_file(&self, identity: &Identity, attachment: &Attachment) -> StoreResult<()> {
        let (store, scope) = self.backend(identity);
        store.record_file(scope, attachment).await
    }

    async fn cleanup_attachments(&self, attachments: &[Attachment]) {
        for attachment in attachments {
            let Some(key) = self.objects.key_for_url(&attachment.url) else {
                // Inline payloads and foreign URLs have no blob to remove.
                continue;
            };
            if let Err(err) = self.objects.delete(&key).await {
                warn!(key = %key, error = %err, "failed to delete stored attachment");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::models::{AttachmentCategory, Sender};
    use crate::db::Database;
    use crate::storage::LocalObjectStore;
    use tempfile::TempDir;

    async fn gateway() -> (TempDir, PersistenceGateway) {
        let temp = TempDir::new().unwrap();
        let objects = LocalObjectStore::new(temp.path(), "http://localhost:8080/files");
        let remote = SqliteStore::new(Database::in_memory().await.unwrap());
        let gateway = PersistenceGateway::new(
            Arc::new(remote),
            Arc::new(EphemeralStore::new()),
            Arc::new(objects),
        );
        (temp, gateway)
    }

    fn auth() -> Identity {
        Identity::Authenticated { user_id: "u1".into() }
    }

    fn anon() -> Identity {
        Identity::Anonymous { device: "dev-1".into() }
    }

    #[tokio::test]
    async fn test_identity_selects_backend() {
        let (_temp, gateway) = gateway().await;

        gateway.create_conversation(&auth(), "remote").await.unwrap();
        gateway.create_conversation(&anon(), "local").await.unwrap();

        let remote = gateway.list_conversations(&auth()).await.unwrap();
        let local = gateway.list_conversations(&anon()).await.unwrap();
        assert_eq!(remote.len(), 1);
        assert_eq!(remote[0].title, "remote");
        assert_eq!(local.len(), 1);
        assert_eq!(local[0].title, "local");
    }

    #[tokio::test]
    async fn test_round_trip_identical_shape_across_backends() {
        let (_temp, gateway) = gateway().await;

        for identity in [auth(), anon()] {
            let conversation = gateway.create_conversation(&identity, "chat").await.unwrap();
            gateway
                .append_message(
                    &identity,
                    &conversation.id,
                    NewMessage {
                        sender: Sender::User,
                        text: "hello".into(),
                        attachment: None,
                    },
                )
                .await
                .unwrap();

            let messages = gateway.get_messages(&identity, &conversation.id).await.unwrap();
            assert_eq!(messages.len(), 1);
            assert_eq!(messages[0].sender, Sender::User);
            assert_eq!(messages[0].text, "hello");
        }
    }

    #[tokio::test]
    async fn test_delete_cleans_up_stored_blobs() {
        let (_temp, gateway) = gateway().await;

        let object = gateway.objects.put("uploads/u1/pic.png", b"png").await.unwrap();
        let attachment = Attachment {
            url: object.url.clone(),
            name: "pic.png".into(),
            mime_type: "image/png".into(),
            size: 3,
            category: AttachmentCategory::Image,
        };

        let conversation = gateway.create_conversation(&auth(), "chat").await.unwrap();
        gateway
            .append_message(
                &auth(),
                &conversation.id,
                NewMessage {
                    sender: Sender::User,
                    text: String::new(),
                    attachment: Some(attachment),
                },
            )
            .await
            .unwrap();

        gateway.delete_conversation(&auth(), &conversation.id).await.unwrap();
        assert!(gateway.objects.read("uploads/u1/pic.png").await.is_err());
    }
}
