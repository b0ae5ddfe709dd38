use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde_json::json;
use thiserror::Error;

use crate::claims::TokenKind;

/// A single failed constraint on a parsed token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstraintViolation {
    /// The token string could not be decoded into header + claims.
    Malformed(String),
    /// The signature does not verify against the verification key.
    SignatureInvalid,
    /// `sub` names a different token kind than the one expected.
    WrongTokenKind { expected: String, found: String },
    /// `exp` lies in the past (beyond leeway).
    TokenExpired { expired_at: DateTime<Utc> },
    /// `nbf` lies in the future (beyond leeway).
    TokenNotYetValid { not_before: DateTime<Utc> },
    /// The claims are valid but no live record backs them.
    UnknownToken,
}

impl fmt::Display for ConstraintViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstraintViolation::Malformed(reason) => write!(f, "malformed token: {}", reason),
            ConstraintViolation::SignatureInvalid => f.write_str("token signature mismatch"),
            ConstraintViolation::WrongTokenKind { expected, found } => {
                write!(f, "token is a '{}', expected '{}'", found, expected)
            }
            ConstraintViolation::TokenExpired { expired_at } => {
                write!(f, "token expired at {}", expired_at.to_rfc3339())
            }
            ConstraintViolation::TokenNotYetValid { not_before } => {
                write!(f, "token cannot be used before {}", not_before.to_rfc3339())
            }
            ConstraintViolation::UnknownToken => f.write_str("token is not backed by a live record"),
        }
    }
}

/// Violations collected while asserting every constraint on one token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Violations(pub Vec<ConstraintViolation>);

impl Violations {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, predicate: impl Fn(&ConstraintViolation) -> bool) -> bool {
        self.0.iter().any(predicate)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConstraintViolation> {
        self.0.iter()
    }
}

impl From<Vec<ConstraintViolation>> for Violations {
    fn from(v: Vec<ConstraintViolation>) -> Self {
        Violations(v)
    }
}

impl fmt::Display for Violations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("no token presented");
        }
        let parts: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        f.write_str(&parts.join("; "))
    }
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("failed to load key '{path}': {reason}")]
    KeyLoad { path: String, reason: String },

    #[error("unsupported signer algorithm '{0}'")]
    UnsupportedSigner(String),

    #[error("invalid token configuration: {0}")]
    Config(String),

    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("invalid access token: {0}")]
    InvalidAccessToken(Violations),

    #[error("invalid refresh token: {0}")]
    InvalidRefreshToken(Violations),

    #[error("missing scope: {}", .0.join(", "))]
    MissingScope(Vec<String>),

    #[error("token error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("token error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl TokenError {
    /// Wraps constraint violations into the error matching the token kind.
    pub fn invalid(kind: TokenKind, violations: impl Into<Violations>) -> Self {
        match kind {
            TokenKind::Access => TokenError::InvalidAccessToken(violations.into()),
            TokenKind::Refresh => TokenError::InvalidRefreshToken(violations.into()),
        }
    }

    /// Stable numeric code reported to clients.
    pub fn code(&self) -> u32 {
        match self {
            TokenError::InvalidAccessToken(_) => 41001,
            TokenError::InvalidRefreshToken(_) => 42001,
            TokenError::MissingScope(_) => 43001,
            TokenError::KeyLoad { .. } => 50001,
            TokenError::UnsupportedSigner(_) => 50002,
            TokenError::Config(_) => 50003,
            TokenError::Malformed(_) | TokenError::Jwt(_) | TokenError::Internal(_) => 40001,
        }
    }

    /// Violations carried by an invalid-token error, if any.
    pub fn violations(&self) -> Option<&Violations> {
        match self {
            TokenError::InvalidAccessToken(v) | TokenError::InvalidRefreshToken(v) => Some(v),
            _ => None,
        }
    }

    /// True for errors that must stop the process from starting.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TokenError::KeyLoad { .. } | TokenError::UnsupportedSigner(_) | TokenError::Config(_)
        )
    }
}

impl IntoResponse for TokenError {
    fn into_response(self) -> Response {
        let code = self.code();
        let (status, error_type, msg) = match &self {
            TokenError::InvalidAccessToken(_) | TokenError::Malformed(_) => (
                StatusCode::UNAUTHORIZED,
                "authentication_error",
                "invalid or missing access token".to_string(),
            ),
            TokenError::InvalidRefreshToken(_) => (
                StatusCode::UNAUTHORIZED,
                "authentication_error",
                "invalid refresh token".to_string(),
            ),
            TokenError::MissingScope(scopes) => (
                StatusCode::FORBIDDEN,
                "permission_error",
                format!("token is missing scope: {}", scopes.join(", ")),
            ),
            other => {
                tracing::error!(code, "token subsystem error: {}", other);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "message": msg,
                "type": error_type,
                "code": code,
            }
        }));

        let mut response = (status, body).into_response();

        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                axum::http::header::WWW_AUTHENTICATE,
                axum::http::HeaderValue::from_static("Bearer"),
            );
        }

        response
    }
}

// ── Tests ────────────────────────────────────────────────────
