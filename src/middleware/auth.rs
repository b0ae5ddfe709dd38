use std::sync::Arc;

use axum::async_trait;
use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::errors::{TokenError, Violations};
use crate::guard::TokenGuard;
use crate::models::Principal;

/// Runs the guard and, on success, stores the [`Principal`] in request extensions.
///
/// Never rejects by itself: an unauthenticated request passes through without
/// a principal, and handlers or [`require_principal`] decide what that means.
pub async fn authenticate(
    State(guard): State<Arc<TokenGuard>>,
    req: Request,
    next: Next,
) -> Response {
    let (mut parts, body) = req.into_parts();
    if let Some(principal) = guard.authenticate(&parts).await {
        parts.extensions.insert(principal);
    }
    next.run(Request::from_parts(parts, body)).await
}

/// Rejects requests that reached this layer without a principal.
pub async fn require_principal(req: Request, next: Next) -> Response {
    if req.extensions().get::<Principal>().is_none() {
        return TokenError::InvalidAccessToken(Violations::default()).into_response();
    }
    next.run(req).await
}

#[async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = TokenError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .ok_or_else(|| TokenError::InvalidAccessToken(Violations::default()))
    }
}
