use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::models::{Principal, TokenId};

// ── Event Types ───────────────────────────────────────────────

/// Emitted once a request has been authenticated by a token.
#[derive(Debug, Clone, Serialize)]
pub struct TokenAuthenticated {
    pub token_id: TokenId,
    pub token_name: String,
    pub owner_type: String,
    pub owner_id: String,
    pub timestamp: DateTime<Utc>,
}

impl TokenAuthenticated {
    pub fn from_principal(principal: &Principal, at: DateTime<Utc>) -> Self {
        let token = principal.token();
        Self {
            token_id: token.id,
            token_name: token.name.clone(),
            owner_type: token.tokenable_type.clone(),
            owner_id: token.tokenable_id.clone(),
            timestamp: at,
        }
    }
}

// ── Listeners ─────────────────────────────────────────────────

/// Fire-and-forget sink for authentication events. Must not block.
pub trait AuthEventListener: Send + Sync {
    fn authenticated(&self, event: &TokenAuthenticated);
}

/// Logs each event at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingListener;

impl AuthEventListener for TracingListener {
    fn authenticated(&self, event: &TokenAuthenticated) {
        tracing::info!(
            token_id = event.token_id,
            owner_type = %event.owner_type,
            owner_id = %event.owner_id,
            "token authenticated"
        );
    }
}

/// Fans events out over a tokio broadcast channel.
#[derive(Debug, Clone)]
pub struct BroadcastListener {
    tx: broadcast::Sender<TokenAuthenticated>,
}

impl BroadcastListener {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TokenAuthenticated> {
        self.tx.subscribe()
    }
}

impl AuthEventListener for BroadcastListener {
    fn authenticated(&self, event: &TokenAuthenticated) {
        // no receivers is fine
        let _ = self.tx.send(event.clone());
    }
}
