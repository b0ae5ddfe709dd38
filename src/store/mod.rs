//! Record store: the persistence seam for token records.

pub mod postgres;

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;

use crate::models::{NewTokenRecord, TokenId, TokenRecord, TokenRecordUpdate};

pub use postgres::PgTokenStore;

#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Insert a record and return it with its assigned id and timestamps.
    async fn create(&self, record: NewTokenRecord) -> anyhow::Result<TokenRecord>;

    async fn find_by_id(&self, id: TokenId) -> anyhow::Result<Option<TokenRecord>>;

    /// Apply a partial update. Returns the updated record, or `None` if it no longer exists.
    async fn update(&self, id: TokenId, update: TokenRecordUpdate) -> anyhow::Result<Option<TokenRecord>>;

    /// Returns true if a record was deleted.
    async fn delete(&self, id: TokenId) -> anyhow::Result<bool>;

    /// All records owned by `owner_type`/`owner_id`, newest first.
    async fn list_for_owner(&self, owner_type: &str, owner_id: &str) -> anyhow::Result<Vec<TokenRecord>>;
}

/// Process-local store, for tests and embedded use.
#[derive(Debug)]
pub struct MemoryTokenStore {
    records: DashMap<TokenId, TokenRecord>,
    next_id: AtomicI64,
}

impl Default for MemoryTokenStore {
    fn default() -> Self {
        Self {
            records: DashMap::new(),
            next_id: AtomicI64::new(1),
        }
    }
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn create(&self, new: NewTokenRecord) -> anyhow::Result<TokenRecord> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let now = Utc::now();
        let record = TokenRecord {
            id,
            name: new.name,
            package: new.package,
            tokenable_type: new.tokenable_type,
            tokenable_id: new.tokenable_id,
            access_token_fingerprint: None,
            refresh_token_fingerprint: None,
            access_token_expire_at: new.access_token_expire_at,
            refresh_token_expire_at: new.refresh_token_expire_at,
            scopes: new.scopes,
            last_used_at: None,
            created_at: now,
            updated_at: now,
        };
        self.records.insert(id, record.clone());
        Ok(record)
    }

    async fn find_by_id(&self, id: TokenId) -> anyhow::Result<Option<TokenRecord>> {
        Ok(self.records.get(&id).map(|r| r.value().clone()))
    }

    async fn update(&self, id: TokenId, update: TokenRecordUpdate) -> anyhow::Result<Option<TokenRecord>> {
        // get_mut holds the shard lock, so updates to one id are serialized
        Ok(self.records.get_mut(&id).map(|mut r| {
            update.apply(r.value_mut(), Utc::now());
            r.value().clone()
        }))
    }

    async fn delete(&self, id: TokenId) -> anyhow::Result<bool> {
        Ok(self.records.remove(&id).is_some())
    }

    async fn list_for_owner(&self, owner_type: &str, owner_id: &str) -> anyhow::Result<Vec<TokenRecord>> {
        let mut records: Vec<TokenRecord> = self
            .records
            .iter()
            .filter(|r| r.is_owned_by(owner_type, owner_id))
            .map(|r| r.value().clone())
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(records)
    }
}

// ── Tests ────────────────────────────────────────────────────
