use std::sync::Arc;

use super::owner::Tokenable;
use super::token::TokenRecord;

/// An authenticated owner together with the token it authenticated with.
#[derive(Debug, Clone)]
pub struct Principal {
    owner: Arc<dyn Tokenable>,
    token: Arc<TokenRecord>,
}

impl Principal {
    pub fn new(owner: Arc<dyn Tokenable>, token: TokenRecord) -> Self {
        Self {
            owner,
            token: Arc::new(token),
        }
    }

    pub fn owner(&self) -> &Arc<dyn Tokenable> {
        &self.owner
    }

    /// Downcast the owner to the application's concrete type.
    pub fn owner_as<T: Tokenable>(&self) -> Option<&T> {
        self.owner.as_any().downcast_ref::<T>()
    }

    /// The token record used for this request.
    pub fn token(&self) -> &TokenRecord {
        &self.token
    }

    pub fn can(&self, ability: &str) -> bool {
        self.token.can(ability)
    }

    pub fn cant(&self, ability: &str) -> bool {
        self.token.cant(ability)
    }

    /// True if the token grants at least one of `scopes`.
    pub fn token_can<S: AsRef<str>>(&self, scopes: &[S]) -> bool {
        scopes.iter().any(|s| self.token.can(s.as_ref()))
    }

    /// True if the token grants every one of `scopes`.
    pub fn token_can_all<S: AsRef<str>>(&self, scopes: &[S]) -> bool {
        scopes.iter().all(|s| self.token.can(s.as_ref()))
    }
}
