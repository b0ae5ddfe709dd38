use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderName;

/// Pulls a raw token string out of an inbound request.
pub trait TokenExtractor: Send + Sync {
    fn extract(&self, parts: &Parts) -> Option<String>;
}

/// `Authorization: Bearer <token>`. The scheme is matched case-insensitively.
#[derive(Debug, Clone, Copy, Default)]
pub struct BearerExtractor;

impl TokenExtractor for BearerExtractor {
    fn extract(&self, parts: &Parts) -> Option<String> {
        let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
        let (scheme, token) = value.trim().split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("bearer") {
            return None;
        }
        let token = token.trim();
        (!token.is_empty()).then(|| token.to_string())
    }
}

/// The whole value of a named header, e.g. `X-Refresh-Token`.
#[derive(Debug, Clone)]
pub struct HeaderExtractor {
    name: HeaderName,
}

impl HeaderExtractor {
    pub fn new(name: HeaderName) -> Self {
        Self { name }
    }
}

impl TokenExtractor for HeaderExtractor {
    fn extract(&self, parts: &Parts) -> Option<String> {
        let value = parts.headers.get(&self.name)?.to_str().ok()?.trim();
        (!value.is_empty()).then(|| value.to_string())
    }
}

impl<F> TokenExtractor for F
where
    F: Fn(&Parts) -> Option<String> + Send + Sync,
{
    fn extract(&self, parts: &Parts) -> Option<String> {
        self(parts)
    }
}
