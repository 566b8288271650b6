//! Application state shared across handlers.

use std::sync::Arc;

use crate::auth::AuthState;
use crate::chat::{ChatService, QuotaLedger};
use crate::storage::ObjectStore;
use crate::store::PersistenceGateway;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Persistence gateway routing between the remote and ephemeral stores.
    pub gateway: Arc<PersistenceGateway>,
    /// Quota ledger.
    pub ledger: Arc<QuotaLedger>,
    /// Streaming turn controller.
    pub chat: Arc<ChatService>,
    /// Object store for uploaded attachments.
    pub objects: Arc<dyn ObjectStore>,
    /// JWT validation state.
    pub auth: AuthState,
}

impl AppState {
    pub fn new(
        gateway: Arc<PersistenceGateway>,
        ledger: Arc<QuotaLedger>,
        chat: Arc<ChatService>,
        objects: Arc<dyn ObjectStore>,
        auth: AuthState,
    ) -> Self {
        Self {
            gateway,
            ledger,
            chat,
            objects,
            auth,
        }
    }
}
