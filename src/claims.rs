//! Claim sets for the two token kinds and the builder that signs them.
//!
//! One record backs one pair. The access token carries the record's scopes
//! in `aud`; the refresh token carries none and only becomes usable once the
//! access token has expired (`nbf` = access expiry).

use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::Header;
use serde::{Deserialize, Deserializer, Serialize};

use crate::errors::TokenError;
use crate::keys::SigningKeys;
use crate::models::TokenRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    /// The `sub` value for this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            TokenKind::Access => "access-token",
            TokenKind::Refresh => "refresh-token",
        }
    }

    pub fn from_subject(sub: &str) -> Option<Self> {
        match sub {
            "access-token" => Some(TokenKind::Access),
            "refresh-token" => Some(TokenKind::Refresh),
            _ => None,
        }
    }
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registered claims carried by both kinds. Times are unix seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Owner type tag.
    pub iss: String,
    /// Token kind, see [`TokenKind::as_str`].
    pub sub: String,
    /// Record id, as a decimal string.
    pub jti: String,
    /// Scopes. Empty (and omitted) on refresh tokens.
    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "one_or_many"
    )]
    pub aud: Vec<String>,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
}

impl Claims {
    pub fn kind(&self) -> Option<TokenKind> {
        TokenKind::from_subject(&self.sub)
    }

    pub fn record_id(&self) -> Option<i64> {
        self.jti.parse().ok()
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        timestamp(self.iat)
    }

    pub fn not_before(&self) -> DateTime<Utc> {
        timestamp(self.nbf)
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        timestamp(self.exp)
    }
}

pub(crate) fn timestamp(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// `aud` may be a single string or an array on the wire.
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
    })
}

/// A signed compact JWT and the claims it was built from.
#[derive(Debug, Clone)]
pub struct SignedToken {
    pub token: String,
    pub claims: Claims,
}

/// Builds and signs claim sets for one record.
pub struct ClaimsBuilder<'a> {
    keys: &'a SigningKeys,
    now: DateTime<Utc>,
}

impl<'a> ClaimsBuilder<'a> {
    pub fn new(keys: &'a SigningKeys, now: DateTime<Utc>) -> Self {
        Self { keys, now }
    }

    /// Access token: valid from now until the record's access expiry.
    pub fn access_token(&self, record: &TokenRecord) -> Result<SignedToken, TokenError> {
        let claims = Claims {
            iss: record.tokenable_type.clone(),
            sub: TokenKind::Access.as_str().to_string(),
            jti: record.id.to_string(),
            aud: record.scopes.clone(),
            iat: self.now.timestamp(),
            nbf: self.now.timestamp(),
            exp: record.access_token_expire_at.timestamp(),
        };
        self.sign(claims)
    }

    /// Refresh token: usable only after the access token has expired.
    pub fn refresh_token(&self, record: &TokenRecord) -> Result<SignedToken, TokenError> {
        let claims = Claims {
            iss: record.tokenable_type.clone(),
            sub: TokenKind::Refresh.as_str().to_string(),
            jti: record.id.to_string(),
            aud: Vec::new(),
            iat: self.now.timestamp(),
            nbf: record.access_token_expire_at.timestamp(),
            exp: record.refresh_token_expire_at.timestamp(),
        };
        self.sign(claims)
    }

    fn sign(&self, claims: Claims) -> Result<SignedToken, TokenError> {
        let header = Header::new(self.keys.algorithm());
        let token = jsonwebtoken::encode(&header, &claims, self.keys.signing_key())?;
        Ok(SignedToken { token, claims })
    }
}

// ── Tests ────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use jsonwebtoken::Algorithm;

    fn keys() -> SigningKeys {
        SigningKeys::symmetric(Algorithm::HS256, b"0123456789abcdef0123456789abcdef").unwrap()
    }

    fn record(now: DateTime<Utc>) -> TokenRecord {
        TokenRecord {
            id: 17,
            name: "cli".into(),
            package: "com.example.app".into(),
            tokenable_type: "user".into(),
            tokenable_id: "42".into(),
            access_token_fingerprint: None,
            refresh_token_fingerprint: None,
            access_token_expire_at: now + Duration::hours(2),
            refresh_token_expire_at: now + Duration::days(15),
            scopes: vec!["read".into(), "write".into()],
            last_used_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_access_claims() {
        let now = timestamp(1_700_000_000);
        let keys = keys();
        let signed = ClaimsBuilder::new(&keys, now).access_token(&record(now)).unwrap();
        let c = &signed.claims;

        assert_eq!(c.iss, "user");
        assert_eq!(c.sub, "access-token");
        assert_eq!(c.jti, "17");
        assert_eq!(c.aud, vec!["read", "write"]);
        assert_eq!(c.iat, 1_700_000_000);
        assert_eq!(c.nbf, c.iat);
        assert_eq!(c.exp, 1_700_000_000 + 7200);
        assert_eq!(signed.token.split('.').count(), 3);
    }

    #[test]
    fn test_refresh_claims() {
        let now = timestamp(1_700_000_000);
        let keys = keys();
        let rec = record(now);
        let signed = ClaimsBuilder::new(&keys, now).refresh_token(&rec).unwrap();
        let c = &signed.claims;

        assert_eq!(c.sub, "refresh-token");
        assert!(c.aud.is_empty());
        assert_eq!(c.nbf, rec.access_token_expire_at.timestamp());
        assert_eq!(c.exp, rec.refresh_token_expire_at.timestamp());
        assert_eq!(c.kind(), Some(TokenKind::Refresh));
        assert_eq!(c.record_id(), Some(17));
    }

    #[test]
    fn test_aud_accepts_string_or_array() {
        let one: Claims = serde_json::from_str(
            r#"{"iss":"user","sub":"access-token","jti":"1","aud":"read","iat":0,"nbf":0,"exp":1}"#,
        )
        .unwrap();
        assert_eq!(one.aud, vec!["read"]);

        let none: Claims = serde_json::from_str(
            r#"{"iss":"user","sub":"refresh-token","jti":"1","iat":0,"nbf":0,"exp":1}"#,
        )
        .unwrap();
        assert!(none.aud.is_empty());
        assert!(!serde_json::to_string(&none).unwrap().contains("aud"));
    }

    #[test]
    fn test_unknown_subject() {
        assert_eq!(TokenKind::from_subject("id-token"), None);
        assert_eq!(TokenKind::Access.to_string(), "access-token");
    }
}
