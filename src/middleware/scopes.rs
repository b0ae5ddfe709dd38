use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::errors::{TokenError, Violations};
use crate::models::Principal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeMode {
    /// Every listed scope is required.
    All,
    /// One listed scope is enough.
    Any,
}

/// Scopes a route requires from the authenticated token.
#[derive(Debug, Clone)]
pub struct ScopeRequirement {
    scopes: Arc<[String]>,
    mode: ScopeMode,
}

impl ScopeRequirement {
    pub fn all<I, S>(scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(ScopeMode::All, scopes)
    }

    pub fn any<I, S>(scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(ScopeMode::Any, scopes)
    }

    fn new<I, S>(mode: ScopeMode, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            scopes: scopes.into_iter().map(Into::into).collect(),
            mode,
        }
    }

    pub fn mode(&self) -> ScopeMode {
        self.mode
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    /// `All` reports the first missing scope; `Any` reports every requested scope.
    pub fn check(&self, principal: Option<&Principal>) -> Result<(), TokenError> {
        let Some(principal) = principal else {
            return Err(TokenError::InvalidAccessToken(Violations::default()));
        };

        match self.mode {
            ScopeMode::All => match self.scopes.iter().find(|s| principal.cant(s)) {
                Some(missing) => Err(TokenError::MissingScope(vec![missing.clone()])),
                None => Ok(()),
            },
            ScopeMode::Any if principal.token_can(self.scopes()) => Ok(()),
            ScopeMode::Any => Err(TokenError::MissingScope(self.scopes.to_vec())),
        }
    }
}

/// Layer with `from_fn_with_state(ScopeRequirement::all([..]), check_scopes)`,
/// inside the authentication layer.
pub async fn check_scopes(
    State(required): State<ScopeRequirement>,
    req: Request,
    next: Next,
) -> Result<Response, TokenError> {
    if let Err(e) = required.check(req.extensions().get::<Principal>()) {
        tracing::debug!(mode = ?required.mode, "scope check failed: {}", e);
        return Err(e);
    }
    Ok(next.run(req).await)
}
