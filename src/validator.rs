//! Token parsing and constraint validation.
//!
//! Parsing only decodes structure. Validation then asserts every constraint
//! (signature, token kind, validity window) and reports all violations at
//! once, wrapped in the error matching the expected kind.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Header, Validation};

use crate::claims::{timestamp, Claims, TokenKind};
use crate::errors::{ConstraintViolation, TokenError};
use crate::keys::SigningKeys;

/// A structurally valid token whose signature has not been checked yet.
#[derive(Debug, Clone)]
pub struct ParsedToken {
    raw: String,
    pub header: Header,
    pub claims: Claims,
}

impl ParsedToken {
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn kind(&self) -> Option<TokenKind> {
        self.claims.kind()
    }
}

#[derive(Debug, Clone)]
pub struct TokenValidator {
    keys: Arc<SigningKeys>,
    leeway: i64,
}

impl TokenValidator {
    pub fn new(keys: Arc<SigningKeys>) -> Self {
        Self { keys, leeway: 0 }
    }

    /// Seconds of clock skew tolerated on both ends of the validity window.
    pub fn with_leeway(mut self, leeway: i64) -> Self {
        self.leeway = leeway.max(0);
        self
    }

    pub fn keys(&self) -> &Arc<SigningKeys> {
        &self.keys
    }

    /// Decode header and claims. No cryptographic check happens here.
    pub fn parse(&self, token: &str) -> Result<ParsedToken, TokenError> {
        parse(token)
    }

    /// Parse then validate as an access token. Every failure is `InvalidAccessToken`.
    pub fn parse_access_token(&self, token: &str) -> Result<ParsedToken, TokenError> {
        self.parse_as(token, TokenKind::Access, Utc::now())
    }

    /// Parse then validate as a refresh token. Every failure is `InvalidRefreshToken`.
    pub fn parse_refresh_token(&self, token: &str) -> Result<ParsedToken, TokenError> {
        self.parse_as(token, TokenKind::Refresh, Utc::now())
    }

    pub fn parse_as(
        &self,
        token: &str,
        kind: TokenKind,
        now: DateTime<Utc>,
    ) -> Result<ParsedToken, TokenError> {
        let parsed = match parse(token) {
            Ok(p) => p,
            Err(TokenError::Malformed(reason)) => {
                return Err(TokenError::invalid(
                    kind,
                    vec![ConstraintViolation::Malformed(reason)],
                ))
            }
            Err(e) => return Err(e),
        };
        self.validate_at(&parsed, kind, now)?;
        Ok(parsed)
    }

    pub fn validate(&self, token: &ParsedToken, expected: TokenKind) -> Result<(), TokenError> {
        self.validate_at(token, expected, Utc::now())
    }

    /// Assert every constraint against `now`.
    pub fn validate_at(
        &self,
        token: &ParsedToken,
        expected: TokenKind,
        now: DateTime<Utc>,
    ) -> Result<(), TokenError> {
        let mut violations = Vec::new();

        if !self.signed_with(token)? {
            violations.push(ConstraintViolation::SignatureInvalid);
        }

        if token.claims.sub != expected.as_str() {
            violations.push(ConstraintViolation::WrongTokenKind {
                expected: expected.as_str().to_string(),
                found: token.claims.sub.clone(),
            });
        }

        let now = now.timestamp();
        if now < token.claims.nbf.saturating_sub(self.leeway) {
            violations.push(ConstraintViolation::TokenNotYetValid {
                not_before: token.claims.not_before(),
            });
        }
        if now > token.claims.exp.saturating_add(self.leeway) {
            violations.push(ConstraintViolation::TokenExpired {
                expired_at: timestamp(token.claims.exp),
            });
        }

        if violations.is_empty() {
            Ok(())
        } else {
            tracing::debug!(
                kind = expected.as_str(),
                jti = %token.claims.jti,
                violations = violations.len(),
                "token failed validation"
            );
            Err(TokenError::invalid(expected, violations))
        }
    }

    /// Signature check only. Temporal and audience checks are ours, not the JWT library's.
    fn signed_with(&self, token: &ParsedToken) -> Result<bool, TokenError> {
        let mut validation = Validation::new(self.keys.algorithm());
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        match jsonwebtoken::decode::<serde_json::Value>(
            &token.raw,
            self.keys.verification_key(),
            &validation,
        ) {
            Ok(_) => Ok(true),
            Err(e) => match e.kind() {
                ErrorKind::InvalidSignature
                | ErrorKind::InvalidAlgorithm
                | ErrorKind::InvalidAlgorithmName
                | ErrorKind::InvalidKeyFormat
                | ErrorKind::Base64(_) => Ok(false),
                _ => Err(TokenError::Jwt(e)),
            },
        }
    }
}

/// Decode a compact JWT into header and claims.
pub fn parse(token: &str) -> Result<ParsedToken, TokenError> {
    let token = token.trim();
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 || parts.iter().any(|p| p.is_empty()) {
        return Err(TokenError::Malformed(
            "expected three dot-separated segments".into(),
        ));
    }

    let header = jsonwebtoken::decode_header(token)
        .map_err(|e| TokenError::Malformed(format!("bad header: {}", e)))?;

    let payload = URL_SAFE_NO_PAD
        .decode(parts[1])
        .map_err(|e| TokenError::Malformed(format!("bad payload encoding: {}", e)))?;
    let claims: Claims = serde_json::from_slice(&payload)
        .map_err(|e| TokenError::Malformed(format!("bad claims: {}", e)))?;

    Ok(ParsedToken {
        raw: token.to_string(),
        header,
        claims,
    })
}

// ── Tests ────────────────────────────────────────────────────
