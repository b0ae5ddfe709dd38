//! End-to-end guard resolution: issue a pair, present it on a request, and
//! check what the guard makes of it.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use axum::http::request::Parts;
use axum::http::{HeaderName, Request};
use chrono::Duration;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::json;

use tokenguard::cipher::AesGcmCipher;
use tokenguard::events::BroadcastListener;
use tokenguard::extract::HeaderExtractor;
use tokenguard::guard::TokenGuard;
use tokenguard::issuer::TokenIssuer;
use tokenguard::keys::SigningKeys;
use tokenguard::models::{
    NewTokenRecord, OwnerLoader, OwnerRef, OwnerRegistry, TokenId, TokenRecord, TokenRecordUpdate,
    Tokenable,
};
use tokenguard::store::{MemoryTokenStore, TokenStore};
use tokenguard::validator::TokenValidator;

const SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";
const ENCRYPTION_KEY: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

// ── Owners ────────────────────────────────────────────────────

#[derive(Debug)]
struct User {
    id: String,
    suspended: bool,
}

impl Tokenable for User {
    fn owner_type(&self) -> &str {
        "user"
    }

    fn owner_id(&self) -> Option<String> {
        Some(self.id.clone())
    }

    fn supports_tokens(&self) -> bool {
        !self.suspended
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Users with id "0" are suspended, "404" do not exist.
struct Users;

#[async_trait]
impl OwnerLoader for Users {
    async fn load(&self, owner_id: &str) -> anyhow::Result<Option<Arc<dyn Tokenable>>> {
        Ok(match owner_id {
            "404" => None,
            id => Some(Arc::new(User {
                id: id.to_string(),
                suspended: id == "0",
            })),
        })
    }
}

// ── Stores ────────────────────────────────────────────────────

/// Wraps the memory store with injectable latency and touch failures.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryTokenStore,
    lookup_delay: Option<StdDuration>,
    fail_touch: bool,
}

#[async_trait]
impl TokenStore for FlakyStore {
    async fn create(&self, record: NewTokenRecord) -> anyhow::Result<TokenRecord> {
        self.inner.create(record).await
    }

    async fn find_by_id(&self, id: TokenId) -> anyhow::Result<Option<TokenRecord>> {
        if let Some(delay) = self.lookup_delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.find_by_id(id).await
    }

    async fn update(&self, id: TokenId, update: TokenRecordUpdate) -> anyhow::Result<Option<TokenRecord>> {
        if self.fail_touch && update.last_used_at.is_some() {
            anyhow::bail!("database unavailable");
        }
        self.inner.update(id, update).await
    }

    async fn delete(&self, id: TokenId) -> anyhow::Result<bool> {
        self.inner.delete(id).await
    }

    async fn list_for_owner(&self, owner_type: &str, owner_id: &str) -> anyhow::Result<Vec<TokenRecord>> {
        self.inner.list_for_owner(owner_type, owner_id).await
    }
}

// ── Helpers ───────────────────────────────────────────────────

fn keys() -> Arc<SigningKeys> {
    Arc::new(SigningKeys::symmetric(Algorithm::HS256, SECRET).unwrap())
}

fn setup_with(store: Arc<dyn TokenStore>) -> (TokenIssuer, TokenGuard) {
    let keys = keys();
    let issuer = TokenIssuer::new(keys.clone(), store.clone());
    let guard = TokenGuard::new(
        TokenValidator::new(keys),
        store,
        OwnerRegistry::new().register("user", Users),
    );
    (issuer, guard)
}

fn bearer(token: &str) -> Parts {
    let (parts, _) = Request::builder()
        .uri("/me")
        .header("authorization", format!("Bearer {}", token))
        .body(())
        .unwrap()
        .into_parts();
    parts
}

fn user(id: &str) -> OwnerRef {
    OwnerRef::new("user", id)
}

// ── Tests ─────────────────────────────────────────────────────

mod resolution {
    use super::*;

    #[tokio::test]
    async fn test_valid_token_resolves_owner_and_touches_record() {
        let store = Arc::new(MemoryTokenStore::new());
        let (issuer, guard) = setup_with(store.clone());
        let pair = issuer.issue(&user("7"), "cli", "pkg").await.unwrap().unwrap();
        assert!(pair.record.last_used_at.is_none());

        let principal = guard.authenticate(&bearer(&pair.access_token)).await.unwrap();
        let owner = principal.owner_as::<User>().unwrap();
        assert_eq!(owner.id, "7");
        assert_eq!(principal.token().id, pair.record.id);
        assert!(principal.can("anything"));

        let stored = store.find_by_id(pair.record.id).await.unwrap().unwrap();
        assert!(stored.last_used_at.is_some());
    }

    /// An expired but otherwise well-formed token yields no principal, not an error.
    #[tokio::test]
    async fn test_expired_token_is_unauthenticated() {
        let store = Arc::new(MemoryTokenStore::new());
        let (issuer, guard) = setup_with(store.clone());
        let issuer = issuer.with_ttls(Duration::seconds(-10), Duration::days(1));
        let pair = issuer.issue(&user("7"), "cli", "pkg").await.unwrap().unwrap();

        assert!(guard.authenticate(&bearer(&pair.access_token)).await.is_none());
        let stored = store.find_by_id(pair.record.id).await.unwrap().unwrap();
        assert!(stored.last_used_at.is_none());
    }

    #[tokio::test]
    async fn test_garbage_and_missing_tokens() {
        let (_, guard) = setup_with(Arc::new(MemoryTokenStore::new()));
        assert!(guard.authenticate(&bearer("not-a-token")).await.is_none());
        assert!(guard.authenticate(&bearer("a.b.c")).await.is_none());

        let (bare, _) = Request::builder().body(()).unwrap().into_parts();
        assert!(guard.authenticate(&bare).await.is_none());
    }

    /// Time claims at the edges of `i64` must not overflow once leeway is applied.
    #[tokio::test]
    async fn test_forged_token_with_extreme_times_is_rejected() {
        let guard = TokenGuard::new(
            TokenValidator::new(keys()).with_leeway(5),
            Arc::new(MemoryTokenStore::new()),
            OwnerRegistry::new().register("user", Users),
        );

        for (nbf, exp) in [(0, i64::MAX), (i64::MIN, i64::MAX), (i64::MIN, 0)] {
            let claims = json!({
                "iss": "user",
                "sub": "access-token",
                "jti": "1",
                "aud": ["*"],
                "iat": 0,
                "nbf": nbf,
                "exp": exp,
            });
            let forged = encode(
                &Header::new(Algorithm::HS256),
                &claims,
                &EncodingKey::from_secret(b"not-the-signing-secret"),
            )
            .unwrap();
            assert!(guard.authenticate(&bearer(&forged)).await.is_none());
        }
    }

    #[tokio::test]
    async fn test_revoked_token_is_unauthenticated() {
        let (issuer, guard) = setup_with(Arc::new(MemoryTokenStore::new()));
        let pair = issuer.issue(&user("7"), "cli", "pkg").await.unwrap().unwrap();
        assert!(issuer.revoke(pair.record.id).await.unwrap());
        assert!(guard.authenticate(&bearer(&pair.access_token)).await.is_none());
    }

    #[tokio::test]
    async fn test_missing_or_suspended_owner() {
        let (issuer, guard) = setup_with(Arc::new(MemoryTokenStore::new()));

        let gone = issuer.issue(&user("404"), "cli", "pkg").await.unwrap().unwrap();
        assert!(guard.authenticate(&bearer(&gone.access_token)).await.is_none());

        let suspended = issuer.issue(&user("0"), "cli", "pkg").await.unwrap().unwrap();
        assert!(guard.authenticate(&bearer(&suspended.access_token)).await.is_none());
    }

    #[tokio::test]
    async fn test_scopes_on_principal() {
        let (issuer, guard) = setup_with(Arc::new(MemoryTokenStore::new()));
        let pair = issuer
            .issue_with_scopes(&user("7"), "cli", "pkg", vec!["read".into()])
            .await
            .unwrap()
            .unwrap();

        let principal = guard.authenticate(&bearer(&pair.access_token)).await.unwrap();
        assert!(principal.can("read"));
        assert!(principal.cant("write"));
        assert!(principal.token_can(&["read", "write"]));
        assert!(!principal.token_can_all(&["read", "write"]));
    }
}

mod side_effects {
    use super::*;

    #[tokio::test]
    async fn test_touch_failure_does_not_fail_authentication() {
        let store = Arc::new(FlakyStore {
            fail_touch: true,
            ..FlakyStore::default()
        });
        let (issuer, guard) = setup_with(store.clone());
        let pair = issuer.issue(&user("7"), "cli", "pkg").await.unwrap().unwrap();

        assert!(guard.authenticate(&bearer(&pair.access_token)).await.is_some());
        let stored = store.find_by_id(pair.record.id).await.unwrap().unwrap();
        assert!(stored.last_used_at.is_none());
    }

    #[tokio::test]
    async fn test_authenticated_event_emitted() {
        let (issuer, guard) = setup_with(Arc::new(MemoryTokenStore::new()));
        let listener = BroadcastListener::new(8);
        let mut events = listener.subscribe();
        let guard = guard.with_listener(listener);

        let pair = issuer.issue(&user("7"), "cli", "pkg").await.unwrap().unwrap();
        guard.authenticate(&bearer(&pair.access_token)).await.unwrap();

        let event = events.try_recv().unwrap();
        assert_eq!(event.token_id, pair.record.id);
        assert_eq!(event.owner_type, "user");
        assert_eq!(event.owner_id, "7");

        // nothing is emitted for a rejected token
        guard.authenticate(&bearer("a.b.c")).await;
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_slow_store_times_out() {
        let store = Arc::new(FlakyStore {
            lookup_delay: Some(StdDuration::from_millis(500)),
            ..FlakyStore::default()
        });
        let (issuer, guard) = setup_with(store);
        let guard = guard.with_timeout(StdDuration::from_millis(20));
        let pair = issuer.issue(&user("7"), "cli", "pkg").await.unwrap().unwrap();

        assert!(guard.authenticate(&bearer(&pair.access_token)).await.is_none());
    }
}

mod strategies {
    use super::*;

    #[tokio::test]
    async fn test_encrypted_tokens_round_trip_through_guard() {
        let store: Arc<dyn TokenStore> = Arc::new(MemoryTokenStore::new());
        let cipher = Arc::new(AesGcmCipher::new(ENCRYPTION_KEY).unwrap());
        let (issuer, guard) = setup_with(store);
        let issuer = issuer.with_cipher(cipher.clone());
        let guard = guard.with_cipher(cipher);

        let pair = issuer.issue(&user("7"), "cli", "pkg").await.unwrap().unwrap();
        assert!(!pair.access_token.contains('.'));
        assert!(guard.authenticate(&bearer(&pair.access_token)).await.is_some());
    }

    #[tokio::test]
    async fn test_plain_token_rejected_when_encryption_expected() {
        let store: Arc<dyn TokenStore> = Arc::new(MemoryTokenStore::new());
        let (issuer, guard) = setup_with(store);
        let guard = guard.with_cipher(Arc::new(AesGcmCipher::new(ENCRYPTION_KEY).unwrap()));

        let pair = issuer.issue(&user("7"), "cli", "pkg").await.unwrap().unwrap();
        assert!(guard.authenticate(&bearer(&pair.access_token)).await.is_none());
    }

    #[tokio::test]
    async fn test_custom_header_extractor() {
        let (issuer, guard) = setup_with(Arc::new(MemoryTokenStore::new()));
        let guard = guard.with_extractor(HeaderExtractor::new(HeaderName::from_static("x-api-token")));
        let pair = issuer.issue(&user("7"), "cli", "pkg").await.unwrap().unwrap();

        let (parts, _) = Request::builder()
            .header("x-api-token", pair.access_token.as_str())
            .body(())
            .unwrap()
            .into_parts();
        assert!(guard.authenticate(&parts).await.is_some());
        // the bearer header is no longer consulted
        assert!(guard.authenticate(&bearer(&pair.access_token)).await.is_none());
    }
}
