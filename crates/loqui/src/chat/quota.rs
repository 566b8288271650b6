//! Per-identity usage quota ledger.

use std::sync::Arc;

use serde::Serialize;

use super::ChatError;
use crate::chat::models::Identity;
use crate::store::PersistenceGateway;

/// What kind of resource a quota check guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaKind {
    Conversation,
    Message,
    File,
}

impl std::fmt::Display for QuotaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuotaKind::Conversation => write!(f, "conversation"),
            QuotaKind::Message => write!(f, "message"),
            QuotaKind::File => write!(f, "file"),
        }
    }
}

/// Outcome of a quota check. `limit`/`remaining` are `None` when the
/// identity class has no ceiling for the kind.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct QuotaStatus {
    pub allowed: bool,
    pub current: u64,
    pub limit: Option<u64>,
    pub remaining: Option<u64>,
}

const ANON_CONVERSATION_LIMIT: u64 = 3;
const ANON_MESSAGE_LIMIT: u64 = 15;
const ANON_FILE_LIMIT: u64 = 2;
const AUTH_FILE_LIMIT: u64 = 4;

/// Enforces the fixed per-identity-class thresholds.
///
/// Counter reads go through the gateway, so authenticated counts are derived
/// from persisted rows while anonymous counts come from the device's stored
/// counters; the ledger cannot tell the difference. Checks never reserve:
/// counters only move after the guarded action succeeds, and correctness
/// relies on at most one in-flight turn per conversation (enforced upstream
/// by the per-conversation turn lock).
pub struct QuotaLedger {
    gateway: Arc<PersistenceGateway>,
}

impl QuotaLedger {
    pub fn new(gateway: Arc<PersistenceGateway>) -> Self {
        Self { gateway }
    }

    fn limit_for(kind: QuotaKind, identity: &Identity) -> Option<u64> {
        match (kind, identity.is_authenticated()) {
            (QuotaKind::Conversation, false) => Some(ANON_CONVERSATION_LIMIT),
            (QuotaKind::Message, false) => Some(ANON_MESSAGE_LIMIT),
            (QuotaKind::File, false) => Some(ANON_FILE_LIMIT),
            (QuotaKind::File, true) => Some(AUTH_FILE_LIMIT),
            (QuotaKind::Conversation | QuotaKind::Message, true) => None,
        }
    }

    /// Check whether one more `kind` is within the identity's ceiling.
    pub async fn check(&self, kind: QuotaKind, identity: &Identity) -> Result<QuotaStatus, ChatError> {
        let counters = self.gateway.counters(identity).await?;
        let current = match kind {
            QuotaKind::Conversation => counters.conversations,
            QuotaKind::Message => counters.messages,
            QuotaKind::File => counters.files,
        };

        let status = match Self::limit_for(kind, identity) {
            None => QuotaStatus {
                allowed: true,
                current,
                limit: None,
                remaining: None,
            },
            Some(limit) => QuotaStatus {
                allowed: current < limit,
                current,
                limit: Some(limit),
                remaining: Some(limit.saturating_sub(current)),
            },
        };

        Ok(status)
    }

    /// Like [`QuotaLedger::check`] but failing the request outright when the
    /// ceiling is reached.
    pub async fn require(&self, kind: QuotaKind, identity: &Identity) -> Result<QuotaStatus, ChatError> {
        let status = self.check(kind, identity).await?;
        if status.allowed {
            return Ok(status);
        }

        let limit = status.limit.unwrap_or(status.current);
        let message = if identity.is_authenticated() {
            format!("You've reached your {} limit ({}).", kind, limit)
        } else {
            format!(
                "Guest {} limit reached ({}). Sign in to continue without limits.",
                kind, limit
            )
        };

        Err(ChatError::QuotaExceeded {
            kind,
            current: status.current,
            limit,
            message,
        })
    }
}
