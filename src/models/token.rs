use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Scope that grants every ability.
pub const WILDCARD_SCOPE: &str = "*";

pub type TokenId = i64;

/// A persisted token record. One record backs one access/refresh pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub id: TokenId,
    pub name: String,
    /// Device / client identifier.
    pub package: String,
    /// Owner type tag, also used as the `iss` claim.
    pub tokenable_type: String,
    pub tokenable_id: String,
    #[serde(skip_serializing)]
    pub access_token_fingerprint: Option<String>,
    #[serde(skip_serializing)]
    pub refresh_token_fingerprint: Option<String>,
    pub access_token_expire_at: DateTime<Utc>,
    pub refresh_token_expire_at: DateTime<Utc>,
    pub scopes: Vec<String>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TokenRecord {
    /// True if this token grants `ability`, either directly or through `*`.
    pub fn can(&self, ability: &str) -> bool {
        check_scope(&self.scopes, ability)
    }

    pub fn cant(&self, ability: &str) -> bool {
        !self.can(ability)
    }

    pub fn is_owned_by(&self, owner_type: &str, owner_id: &str) -> bool {
        self.tokenable_type == owner_type && self.tokenable_id == owner_id
    }
}

/// Fields for a record that has not been stored yet.
#[derive(Debug, Clone)]
pub struct NewTokenRecord {
    pub name: String,
    pub package: String,
    pub tokenable_type: String,
    pub tokenable_id: String,
    pub access_token_expire_at: DateTime<Utc>,
    pub refresh_token_expire_at: DateTime<Utc>,
    pub scopes: Vec<String>,
}

/// Partial update; `None` leaves a column untouched.
#[derive(Debug, Clone, Default)]
pub struct TokenRecordUpdate {
    pub access_token_fingerprint: Option<String>,
    pub refresh_token_fingerprint: Option<String>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl TokenRecordUpdate {
    pub fn fingerprints(access: String, refresh: String) -> Self {
        Self {
            access_token_fingerprint: Some(access),
            refresh_token_fingerprint: Some(refresh),
            ..Default::default()
        }
    }

    pub fn touched(at: DateTime<Utc>) -> Self {
        Self {
            last_used_at: Some(at),
            ..Default::default()
        }
    }

    pub fn apply(self, record: &mut TokenRecord, now: DateTime<Utc>) {
        if let Some(fp) = self.access_token_fingerprint {
            record.access_token_fingerprint = Some(fp);
        }
        if let Some(fp) = self.refresh_token_fingerprint {
            record.refresh_token_fingerprint = Some(fp);
        }
        if let Some(at) = self.last_used_at {
            record.last_used_at = Some(at);
        }
        record.updated_at = now;
    }
}

/// Exact, case-sensitive scope match. `*` is the only wildcard.
pub fn check_scope(scopes: &[String], ability: &str) -> bool {
    scopes.iter().any(|s| s == WILDCARD_SCOPE || s == ability)
}

// ── Tests ────────────────────────────────────────────────────
