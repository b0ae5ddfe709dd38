//! Token issuance: one record, one signed access/refresh pair.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::cipher::{fingerprint, fingerprint_matches, AesGcmCipher, PlainText, TokenCipher};
use crate::claims::{timestamp, ClaimsBuilder, TokenKind};
use crate::config::Config;
use crate::errors::{ConstraintViolation, TokenError};
use crate::keys::SigningKeys;
use crate::models::token::WILDCARD_SCOPE;
use crate::models::{NewTokenRecord, TokenId, TokenRecord, TokenRecordUpdate, Tokenable};
use crate::store::TokenStore;
use crate::validator::TokenValidator;

/// The token strings handed to a client after issuance.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    /// Seconds until the access token expires.
    pub expires_in: i64,
    #[serde(skip)]
    pub record: TokenRecord,
}

#[derive(Clone)]
pub struct TokenIssuer {
    keys: Arc<SigningKeys>,
    store: Arc<dyn TokenStore>,
    cipher: Arc<dyn TokenCipher>,
    validator: TokenValidator,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenIssuer {
    pub fn new(keys: Arc<SigningKeys>, store: Arc<dyn TokenStore>) -> Self {
        let defaults = Config::default();
        Self {
            validator: TokenValidator::new(keys.clone()),
            keys,
            store,
            cipher: Arc::new(PlainText),
            access_ttl: defaults.access_token_ttl,
            refresh_ttl: defaults.refresh_token_ttl,
        }
    }

    /// TTLs, leeway and the encryption transform from configuration.
    pub fn from_config(
        cfg: &Config,
        keys: Arc<SigningKeys>,
        store: Arc<dyn TokenStore>,
    ) -> Result<Self, TokenError> {
        let mut issuer = Self::new(keys, store)
            .with_ttls(cfg.access_token_ttl, cfg.refresh_token_ttl)
            .with_leeway(cfg.leeway);
        if let Some(key) = &cfg.encryption_key {
            issuer = issuer.with_cipher(Arc::new(AesGcmCipher::new(key)?));
        }
        Ok(issuer)
    }

    pub fn with_ttls(mut self, access: Duration, refresh: Duration) -> Self {
        self.access_ttl = access;
        self.refresh_ttl = refresh;
        self
    }

    pub fn with_leeway(mut self, leeway: i64) -> Self {
        self.validator = self.validator.with_leeway(leeway);
        self
    }

    pub fn with_cipher(mut self, cipher: Arc<dyn TokenCipher>) -> Self {
        self.cipher = cipher;
        self
    }

    pub fn validator(&self) -> &TokenValidator {
        &self.validator
    }

    /// Issue a pair granting every scope.
    pub async fn issue(
        &self,
        owner: &dyn Tokenable,
        name: &str,
        package: &str,
    ) -> Result<Option<TokenPair>, TokenError> {
        self.issue_with_scopes(owner, name, package, vec![WILDCARD_SCOPE.to_string()])
            .await
    }

    /// Issue a pair for `owner`. An owner that has not been persisted yet gets
    /// nothing (`Ok(None)`).
    pub async fn issue_with_scopes(
        &self,
        owner: &dyn Tokenable,
        name: &str,
        package: &str,
        scopes: Vec<String>,
    ) -> Result<Option<TokenPair>, TokenError> {
        let Some(owner_id) = owner.owner_id() else {
            tracing::debug!(owner_type = owner.owner_type(), "owner not persisted; no token issued");
            return Ok(None);
        };

        // claims carry whole seconds; keep the record in step with them
        let now = timestamp(Utc::now().timestamp());

        let record = self
            .store
            .create(NewTokenRecord {
                name: name.to_string(),
                package: package.to_string(),
                tokenable_type: owner.owner_type().to_string(),
                tokenable_id: owner_id,
                access_token_expire_at: now + self.access_ttl,
                refresh_token_expire_at: now + self.refresh_ttl,
                scopes,
            })
            .await?;

        let id = record.id;
        let (access, refresh, record) = match self.seal(record, now).await {
            Ok(sealed) => sealed,
            Err(e) => {
                // a record without handed-out tokens must not outlive the failure
                if let Err(cleanup) = self.store.delete(id).await {
                    tracing::warn!(token_id = id, error = %cleanup, "failed to remove unissued token record");
                }
                return Err(e);
            }
        };

        tracing::info!(
            token_id = record.id,
            owner_type = %record.tokenable_type,
            owner_id = %record.tokenable_id,
            scopes = record.scopes.len(),
            "issued token pair"
        );

        Ok(Some(TokenPair {
            access_token: access,
            refresh_token: refresh,
            token_type: "Bearer",
            expires_in: self.access_ttl.num_seconds(),
            record,
        }))
    }

    /// Sign, encrypt and fingerprint both tokens for a freshly created record.
    async fn seal(
        &self,
        record: TokenRecord,
        now: DateTime<Utc>,
    ) -> Result<(String, String, TokenRecord), TokenError> {
        let builder = ClaimsBuilder::new(&self.keys, now);
        let access = self.cipher.encrypt(&builder.access_token(&record)?.token)?;
        let refresh = self.cipher.encrypt(&builder.refresh_token(&record)?.token)?;

        let record = self
            .store
            .update(
                record.id,
                TokenRecordUpdate::fingerprints(fingerprint(&access), fingerprint(&refresh)),
            )
            .await?
            .ok_or_else(|| anyhow::anyhow!("token record {} vanished during issuance", record.id))?;

        Ok((access, refresh, record))
    }

    /// Resolve a presented refresh token to its live record.
    ///
    /// Every failure that is about the token itself is `InvalidRefreshToken`.
    pub async fn find_refresh_token(&self, presented: &str) -> Result<TokenRecord, TokenError> {
        resolve_record(
            &self.validator,
            self.store.as_ref(),
            self.cipher.as_ref(),
            presented,
            TokenKind::Refresh,
        )
        .await
    }

    /// Delete a record, invalidating both of its tokens.
    pub async fn revoke(&self, id: TokenId) -> Result<bool, TokenError> {
        let deleted = self.store.delete(id).await?;
        if deleted {
            tracing::info!(token_id = id, "revoked token");
        } else {
            tracing::debug!(token_id = id, "revoke: no such token");
        }
        Ok(deleted)
    }

    /// Every record owned by `owner`.
    pub async fn tokens_for(&self, owner: &dyn Tokenable) -> Result<Vec<TokenRecord>, TokenError> {
        match owner.owner_id() {
            Some(id) => Ok(self.store.list_for_owner(owner.owner_type(), &id).await?),
            None => Ok(Vec::new()),
        }
    }
}

/// Decrypt, parse and validate `presented` as `kind`, then load and match its record.
pub(crate) async fn resolve_record(
    validator: &TokenValidator,
    store: &dyn TokenStore,
    cipher: &dyn TokenCipher,
    presented: &str,
    kind: TokenKind,
) -> Result<TokenRecord, TokenError> {
    let unknown = || TokenError::invalid(kind, vec![ConstraintViolation::UnknownToken]);

    let token = match cipher.decrypt(presented) {
        Ok(t) => t,
        Err(TokenError::Malformed(reason)) => {
            return Err(TokenError::invalid(kind, vec![ConstraintViolation::Malformed(reason)]))
        }
        Err(e) => return Err(e),
    };

    let parsed = validator.parse_as(&token, kind, Utc::now())?;
    let id = parsed.claims.record_id().ok_or_else(unknown)?;

    let record = store.find_by_id(id).await?.ok_or_else(unknown)?;

    let stored = match kind {
        TokenKind::Access => record.access_token_fingerprint.as_deref(),
        TokenKind::Refresh => record.refresh_token_fingerprint.as_deref(),
    };
    if let Some(stored) = stored {
        if !fingerprint_matches(presented, stored) {
            tracing::debug!(token_id = id, kind = kind.as_str(), "fingerprint mismatch");
            return Err(unknown());
        }
    }

    Ok(record)
}

// ── Tests ────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OwnerRef;
    use crate::store::MemoryTokenStore;
    use jsonwebtoken::Algorithm;

    fn issuer() -> (TokenIssuer, Arc<MemoryTokenStore>) {
        let keys = Arc::new(
            SigningKeys::symmetric(Algorithm::HS256, b"0123456789abcdef0123456789abcdef").unwrap(),
        );
        let store = Arc::new(MemoryTokenStore::new());
        (TokenIssuer::new(keys, store.clone()), store)
    }

    #[tokio::test]
    async fn test_issue_persists_record_with_fingerprints() {
        let (issuer, store) = issuer();
        let owner = OwnerRef::new("user", "42");

        let pair = issuer.issue(&owner, "cli", "com.example.app").await.unwrap().unwrap();
        assert_eq!(pair.token_type, "Bearer");
        assert_eq!(pair.expires_in, 7200);
        assert_eq!(pair.record.scopes, vec!["*"]);

        let stored = store.find_by_id(pair.record.id).await.unwrap().unwrap();
        assert_eq!(stored.access_token_fingerprint, Some(fingerprint(&pair.access_token)));
        assert_eq!(stored.refresh_token_fingerprint, Some(fingerprint(&pair.refresh_token)));
        assert_eq!(
            stored.refresh_token_expire_at - stored.access_token_expire_at,
            Duration::days(15) - Duration::hours(2)
        );
    }

    #[tokio::test]
    async fn test_unsaved_owner_gets_nothing() {
        let (issuer, store) = issuer();
        let pair = issuer.issue(&OwnerRef::unsaved("user"), "cli", "pkg").await.unwrap();
        assert!(pair.is_none());
        assert!(store.is_empty());
    }

    struct BrokenCipher;

    impl TokenCipher for BrokenCipher {
        fn encrypt(&self, _: &str) -> Result<String, TokenError> {
            Err(TokenError::Config("cipher unavailable".into()))
        }

        fn decrypt(&self, _: &str) -> Result<String, TokenError> {
            Err(TokenError::Config("cipher unavailable".into()))
        }
    }

    #[tokio::test]
    async fn test_failed_issue_leaves_no_record() {
        let (issuer, store) = issuer();
        let issuer = issuer.with_cipher(Arc::new(BrokenCipher));

        let err = issuer.issue(&OwnerRef::new("user", "1"), "cli", "pkg").await.unwrap_err();
        assert!(matches!(err, TokenError::Config(_)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_pair_json_shape() {
        let (issuer, _) = issuer();
        let pair = issuer.issue(&OwnerRef::new("user", "1"), "cli", "pkg").await.unwrap().unwrap();
        let json = serde_json::to_value(&pair).unwrap();
        assert_eq!(json["token_type"], "Bearer");
        assert_eq!(json["expires_in"], 7200);
        assert!(json.get("record").is_none());
        assert!(json["access_token"].is_string());
    }

    #[tokio::test]
    async fn test_refresh_token_not_yet_usable() {
        let (issuer, _) = issuer();
        let pair = issuer.issue(&OwnerRef::new("user", "1"), "cli", "pkg").await.unwrap().unwrap();

        let err = issuer.find_refresh_token(&pair.refresh_token).await.unwrap_err();
        assert!(matches!(err, TokenError::InvalidRefreshToken(_)));
        assert!(err
            .violations()
            .unwrap()
            .contains(|v| matches!(v, ConstraintViolation::TokenNotYetValid { .. })));
    }

    #[tokio::test]
    async fn test_refresh_token_resolves_after_access_expiry() {
        let (issuer, _) = issuer();
        // a zero access TTL makes the refresh token usable straight away
        let issuer = issuer.with_ttls(Duration::zero(), Duration::days(1));
        let pair = issuer.issue(&OwnerRef::new("user", "1"), "cli", "pkg").await.unwrap().unwrap();

        let record = issuer.find_refresh_token(&pair.refresh_token).await.unwrap();
        assert_eq!(record.id, pair.record.id);

        // an access token presented as a refresh token is the wrong kind
        let err = issuer.find_refresh_token(&pair.access_token).await.unwrap_err();
        assert!(err
            .violations()
            .unwrap()
            .contains(|v| matches!(v, ConstraintViolation::WrongTokenKind { .. })));
    }

    #[tokio::test]
    async fn test_revoked_refresh_token_is_unknown() {
        let (issuer, _) = issuer();
        let issuer = issuer.with_ttls(Duration::zero(), Duration::days(1));
        let pair = issuer.issue(&OwnerRef::new("user", "1"), "cli", "pkg").await.unwrap().unwrap();

        assert!(issuer.revoke(pair.record.id).await.unwrap());
        assert!(!issuer.revoke(pair.record.id).await.unwrap());

        let err = issuer.find_refresh_token(&pair.refresh_token).await.unwrap_err();
        assert!(err
            .violations()
            .unwrap()
            .contains(|v| *v == ConstraintViolation::UnknownToken));
    }

    #[tokio::test]
    async fn test_encrypted_tokens() {
        let (issuer, _) = issuer();
        let key = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";
        let issuer = issuer
            .with_cipher(Arc::new(AesGcmCipher::new(key).unwrap()))
            .with_ttls(Duration::zero(), Duration::days(1));

        let pair = issuer.issue(&OwnerRef::new("user", "1"), "cli", "pkg").await.unwrap().unwrap();
        assert_eq!(pair.access_token.split('.').count(), 1);

        let record = issuer.find_refresh_token(&pair.refresh_token).await.unwrap();
        assert_eq!(record.id, pair.record.id);

        let err = issuer.find_refresh_token("plainly-not-encrypted").await.unwrap_err();
        assert!(matches!(err, TokenError::InvalidRefreshToken(_)));
    }

    #[tokio::test]
    async fn test_tokens_for_owner() {
        let (issuer, _) = issuer();
        let owner = OwnerRef::new("user", "1");
        issuer.issue(&owner, "a", "pkg").await.unwrap();
        issuer.issue(&owner, "b", "pkg").await.unwrap();
        issuer.issue(&OwnerRef::new("user", "2"), "c", "pkg").await.unwrap();

        assert_eq!(issuer.tokens_for(&owner).await.unwrap().len(), 2);
        assert!(issuer.tokens_for(&OwnerRef::unsaved("user")).await.unwrap().is_empty());
    }
}
