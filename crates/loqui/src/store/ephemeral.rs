//! In-process ephemeral store for anonymous devices.
//!
//! Mirrors the browser-local layout: one record per conversation
//! `{id, title, messages, created_at, updated_at}` plus scalar counters and
//! the device's file records. Everything lives in memory, scoped by the
//! caller's device key, and vanishes with the process.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use super::{ConversationStore, StoreError, StoreResult};
use crate::chat::models::{
    Attachment, Conversation, Message, NewMessage, QuotaCounters, Sender,
};

/// Per-device state. Counters are stored rather than derived and are
/// monotonic: deleting a conversation does not refund quota.
#[derive(Debug, Default)]
struct DeviceState {
    conversations: Vec<ConversationRecord>,
    message_count: u64,
    conversation_count: u64,
    files: Vec<Attachment>,
}

#[derive(Debug)]
struct ConversationRecord {
    conversation: Conversation,
    messages: Vec<Message>,
}

/// Ephemeral conversation store, one [`DeviceState`] per device key.
#[derive(Debug, Default)]
pub struct EphemeralStore {
    devices: DashMap<String, DeviceState>,
}

impl EphemeralStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_conversation<T>(
        &self,
        scope: &str,
        conversation_id: &str,
        f: impl FnOnce(&mut ConversationRecord) -> T,
    ) -> StoreResult<T> {
        let mut device = self
            .devices
            .get_mut(scope)
            .ok_or_else(|| StoreError::ConversationNotFound(conversation_id.to_string()))?;
        let record = device
            .conversations
            .iter_mut()
            .find(|r| r.conversation.id == conversation_id)
            .ok_or_else(|| StoreError::ConversationNotFound(conversation_id.to_string()))?;
        Ok(f(record))
    }
}

#[async_trait]
impl ConversationStore for EphemeralStore {
    async fn create_conversation(&self, scope: &str, title: &str) -> StoreResult<Conversation> {
        let now = Utc::now().to_rfc3339();
        let conversation = Conversation {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            owner_id: None,
            created_at: now.clone(),
            updated_at: now,
        };

        let mut device = self.devices.entry(scope.to_string()).or_default();
        device.conversations.push(ConversationRecord {
            conversation: conversation.clone(),
            messages: Vec::new(),
        });
        device.conversation_count += 1;

        Ok(conversation)
    }

    async fn list_conversations(&self, scope: &str) -> StoreResult<Vec<Conversation>> {
        let Some(device) = self.devices.get(scope) else {
            return Ok(Vec::new());
        };

        let mut conversations: Vec<Conversation> = device
            .conversations
            .iter()
            .map(|r| r.conversation.clone())
            .collect();
        conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(conversations)
    }

    async fn get_conversation(&self, scope: &str, id: &str) -> StoreResult<Conversation> {
        self.with_conversation(scope, id, |record| record.conversation.clone())
    }

    async fn append_message(
        &self,
        scope: &str,
        conversation_id: &str,
        message: NewMessage,
    ) -> StoreResult<Message> {
        let sender = message.sender;
        let stored = Message {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.to_string(),
            sender,
            text: message.text,
            attachment: message.attachment,
            created_at: Utc::now().to_rfc3339(),
        };

        self.with_conversation(scope, conversation_id, |record| {
            record.messages.push(stored.clone());
        })?;

        if sender == Sender::User {
            if let Some(mut device) = self.devices.get_mut(scope) {
                device.message_count += 1;
            }
        }

        Ok(stored)
    }

    async fn messages(&self, scope: &str, conversation_id: &str) -> StoreResult<Vec<Message>> {
        self.with_conversation(scope, conversation_id, |record| record.messages.clone())
    }

    async fn touch_conversation(&self, scope: &str, conversation_id: &str) -> StoreResult<()> {
        self.with_conversation(scope, conversation_id, |record| {
            record.conversation.updated_at = Utc::now().to_rfc3339();
        })
    }

    async fn delete_conversation(
        &self,
        scope: &str,
        conversation_id: &str,
    ) -> StoreResult<Vec<Attachment>> {
        let mut device = self
            .devices
            .get_mut(scope)
            .ok_or_else(|| StoreError::ConversationNotFound(conversation_id.to_string()))?;

        let index = device
            .conversations
            .iter()
            .position(|r| r.conversation.id == conversation_id)
            .ok_or_else(|| StoreError::ConversationNotFound(conversation_id.to_string()))?;

        let record = device.conversations.remove(index);
        Ok(record
            .messages
            .into_iter()
            .filter_map(|m| m.attachment)
            .collect())
    }

    async fn counters(&self, scope: &str) -> StoreResult<QuotaCounters> {
        let Some(device) = self.devices.get(scope) else {
            return Ok(QuotaCounters::default());
        };

        Ok(QuotaCounters {
            messages: device.message_count,
            conversations: device.conversation_count,
            files: device.files.len() as u64,
        })
    }

    async fn record_file(&self, scope: &str, attachment: &Attachment) -> StoreResult<()> {
        let mut device = self.devices.entry(scope.to_string()).or_default();
        device.files.push(attachment.clone());
        Ok(())
    }
}
