//! tokenguard: signed access/refresh token issuance, validation and request
//! authentication for axum services.
//!
//! Bootstrap once, share everywhere:
//!
//! ```no_run
//! # async fn boot() -> anyhow::Result<()> {
//! use std::sync::Arc;
//! use tokenguard::{config, guard::TokenGuard, issuer::TokenIssuer, keys::SigningKeys};
//! use tokenguard::{models::OwnerRegistry, store::MemoryTokenStore, validator::TokenValidator};
//!
//! let cfg = config::load()?;
//! let keys = Arc::new(SigningKeys::from_config(&cfg)?);
//! let store = Arc::new(MemoryTokenStore::new());
//! let issuer = TokenIssuer::from_config(&cfg, keys.clone(), store.clone())?;
//! let validator = TokenValidator::new(keys).with_leeway(cfg.leeway);
//! let guard = TokenGuard::from_config(&cfg, validator, store, OwnerRegistry::new())?;
//! # let _ = (issuer, guard);
//! # Ok(())
//! # }
//! ```

pub mod cipher;
pub mod claims;
pub mod config;
pub mod errors;
pub mod events;
pub mod extract;
pub mod guard;
pub mod issuer;
pub mod keys;
pub mod middleware;
pub mod models;
pub mod store;
pub mod validator;

pub use errors::TokenError;
pub use guard::TokenGuard;
pub use issuer::{TokenIssuer, TokenPair};
pub use models::Principal;
