//! Request authentication guard.
//!
//! Resolves an inbound request to a [`Principal`] or to nothing. Every failure
//! along the way (no token, bad token, unknown record, unknown owner, veto)
//! ends in `None`; nothing is surfaced to the caller, and a slow store cannot
//! hold a request past the configured deadline.

use std::sync::Arc;
use std::time::Duration;

use axum::http::request::Parts;
use chrono::Utc;

use crate::cipher::{AesGcmCipher, PlainText, TokenCipher};
use crate::claims::TokenKind;
use crate::config::Config;
use crate::errors::TokenError;
use crate::events::{AuthEventListener, TokenAuthenticated, TracingListener};
use crate::extract::{BearerExtractor, TokenExtractor};
use crate::issuer::resolve_record;
use crate::models::{OwnerRegistry, Principal, TokenRecord, TokenRecordUpdate, Tokenable};
use crate::store::TokenStore;
use crate::validator::TokenValidator;

/// Application-level veto run after the token and owner have been resolved.
///
/// `valid_provider` is whether the owner's type matches the guard's provider
/// binding. The default passes that verdict through unchanged.
pub trait AuthenticationHook: Send + Sync {
    fn authenticate(
        &self,
        parts: &Parts,
        record: &TokenRecord,
        owner: &dyn Tokenable,
        valid_provider: bool,
    ) -> bool {
        let _ = (parts, record, owner);
        valid_provider
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PassThrough;

impl AuthenticationHook for PassThrough {}

impl<F> AuthenticationHook for F
where
    F: Fn(&Parts, &TokenRecord, &dyn Tokenable, bool) -> bool + Send + Sync,
{
    fn authenticate(
        &self,
        parts: &Parts,
        record: &TokenRecord,
        owner: &dyn Tokenable,
        valid_provider: bool,
    ) -> bool {
        self(parts, record, owner, valid_provider)
    }
}

/// Which owners this guard accepts.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ProviderBinding {
    /// Any owner type with a registered loader.
    #[default]
    Database,
    /// Only owners of this type tag.
    Model(String),
}

impl ProviderBinding {
    pub fn accepts(&self, owner: &dyn Tokenable) -> bool {
        match self {
            ProviderBinding::Database => true,
            ProviderBinding::Model(owner_type) => owner.owner_type() == owner_type,
        }
    }
}

#[derive(Clone)]
pub struct TokenGuard {
    validator: TokenValidator,
    store: Arc<dyn TokenStore>,
    owners: OwnerRegistry,
    extractor: Arc<dyn TokenExtractor>,
    cipher: Arc<dyn TokenCipher>,
    hook: Arc<dyn AuthenticationHook>,
    listener: Arc<dyn AuthEventListener>,
    provider: ProviderBinding,
    timeout: Duration,
}

impl TokenGuard {
    pub fn new(validator: TokenValidator, store: Arc<dyn TokenStore>, owners: OwnerRegistry) -> Self {
        Self {
            validator,
            store,
            owners,
            extractor: Arc::new(BearerExtractor),
            cipher: Arc::new(PlainText),
            hook: Arc::new(PassThrough),
            listener: Arc::new(TracingListener),
            provider: ProviderBinding::Database,
            timeout: Config::default().guard_timeout,
        }
    }

    /// Provider binding, encryption transform and deadline from configuration.
    pub fn from_config(
        cfg: &Config,
        validator: TokenValidator,
        store: Arc<dyn TokenStore>,
        owners: OwnerRegistry,
    ) -> Result<Self, TokenError> {
        let mut guard = Self::new(validator, store, owners).with_timeout(cfg.guard_timeout);
        if let Some(model) = &cfg.provider_model {
            guard = guard.with_provider(ProviderBinding::Model(model.clone()));
        }
        if let Some(key) = &cfg.encryption_key {
            guard = guard.with_cipher(Arc::new(AesGcmCipher::new(key)?));
        }
        Ok(guard)
    }

    pub fn with_extractor(mut self, extractor: impl TokenExtractor + 'static) -> Self {
        self.extractor = Arc::new(extractor);
        self
    }

    pub fn with_cipher(mut self, cipher: Arc<dyn TokenCipher>) -> Self {
        self.cipher = cipher;
        self
    }

    pub fn with_hook(mut self, hook: impl AuthenticationHook + 'static) -> Self {
        self.hook = Arc::new(hook);
        self
    }

    pub fn with_listener(mut self, listener: impl AuthEventListener + 'static) -> Self {
        self.listener = Arc::new(listener);
        self
    }

    pub fn with_provider(mut self, provider: ProviderBinding) -> Self {
        self.provider = provider;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Resolve the request's principal, or `None`.
    pub async fn authenticate(&self, parts: &Parts) -> Option<Principal> {
        match tokio::time::timeout(self.timeout, self.resolve(parts)).await {
            Ok(principal) => principal,
            Err(_) => {
                tracing::warn!(timeout = ?self.timeout, "token guard timed out");
                None
            }
        }
    }

    /// Look up the live record behind a presented access token.
    pub async fn find_token(&self, presented: &str) -> Result<TokenRecord, TokenError> {
        resolve_record(
            &self.validator,
            self.store.as_ref(),
            self.cipher.as_ref(),
            presented,
            TokenKind::Access,
        )
        .await
    }

    async fn resolve(&self, parts: &Parts) -> Option<Principal> {
        let Some(presented) = self.extractor.extract(parts) else {
            tracing::debug!("no token presented");
            return None;
        };

        let mut record = match self.find_token(&presented).await {
            Ok(record) => record,
            Err(e) => {
                tracing::debug!(code = e.code(), "access token rejected: {}", e);
                return None;
            }
        };

        let owner = match self
            .owners
            .resolve(&record.tokenable_type, &record.tokenable_id)
            .await
        {
            Ok(Some(owner)) => owner,
            Ok(None) => {
                tracing::debug!(
                    token_id = record.id,
                    owner_type = %record.tokenable_type,
                    "token owner not found"
                );
                return None;
            }
            Err(e) => {
                tracing::warn!(token_id = record.id, error = %e, "failed to load token owner");
                return None;
            }
        };

        let valid_provider = self.provider.accepts(owner.as_ref());
        if !self.hook.authenticate(parts, &record, owner.as_ref(), valid_provider) {
            tracing::debug!(token_id = record.id, valid_provider, "authentication vetoed");
            return None;
        }

        if !owner.supports_tokens() {
            tracing::debug!(token_id = record.id, "owner does not support tokens");
            return None;
        }

        let now = Utc::now();
        let id = record.id;
        record.last_used_at = Some(now);
        let principal = Principal::new(owner, record);

        self.listener
            .authenticated(&TokenAuthenticated::from_principal(&principal, now));

        if let Err(e) = self.store.update(id, TokenRecordUpdate::touched(now)).await {
            tracing::warn!(token_id = id, error = %e, "failed to record token use");
        }

        Some(principal)
    }
}

// ── Tests ────────────────────────────────────────────────────
