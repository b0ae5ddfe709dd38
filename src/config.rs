use std::path::PathBuf;

use anyhow::Context;
use chrono::Duration;

pub const DEFAULT_ACCESS_TOKEN_TTL: &str = "PT2H";
pub const DEFAULT_REFRESH_TOKEN_TTL: &str = "P15D";
pub const DEFAULT_TABLE: &str = "auth_tokens";

#[derive(Debug, Clone)]
pub struct Config {
    /// JWA algorithm name, e.g. `RS256` or `HS256`.
    pub signer: String,
    /// Directory that relative key file names resolve against.
    pub key_path: PathBuf,
    pub private_key: String,
    pub public_key: String,
    /// HMAC secret, only read for symmetric signers.
    pub secret_key: Option<String>,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    /// Clock-skew tolerance applied to `nbf`/`exp`, in seconds.
    pub leeway: i64,
    /// Deadline for one guard resolution, end to end.
    pub guard_timeout: std::time::Duration,
    /// Postgres URL for the record store. `None` means the host supplies its own store.
    pub database_url: Option<String>,
    pub table: String,
    /// 64 hex chars. When set, token strings are AES-256-GCM encrypted before they leave.
    pub encryption_key: Option<String>,
    /// Owner type the guard accepts. `None` accepts any registered owner type.
    pub provider_model: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            signer: "RS256".into(),
            key_path: PathBuf::from("storage"),
            private_key: "token-private.key".into(),
            public_key: "token-public.key".into(),
            secret_key: None,
            access_token_ttl: Duration::hours(2),
            refresh_token_ttl: Duration::days(15),
            leeway: 0,
            guard_timeout: std::time::Duration::from_millis(5000),
            database_url: None,
            table: DEFAULT_TABLE.into(),
            encryption_key: None,
            provider_model: None,
        }
    }
}

impl Config {
    /// Resolves a key file name against `key_path`. Absolute paths are kept as given.
    pub fn key_file(&self, file: &str) -> PathBuf {
        let path = PathBuf::from(file);
        if path.is_absolute() {
            path
        } else {
            self.key_path.join(file.trim_start_matches(['/', '\\']))
        }
    }
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();

    let defaults = Config::default();

    let access_token_ttl = parse_iso8601_duration(
        &std::env::var("ACCESS_TOKEN_EXPIRES_IN").unwrap_or_else(|_| DEFAULT_ACCESS_TOKEN_TTL.into()),
    )
    .context("ACCESS_TOKEN_EXPIRES_IN is not a valid ISO-8601 duration")?;

    let refresh_token_ttl = parse_iso8601_duration(
        &std::env::var("REFRESH_TOKEN_EXPIRES_IN").unwrap_or_else(|_| DEFAULT_REFRESH_TOKEN_TTL.into()),
    )
    .context("REFRESH_TOKEN_EXPIRES_IN is not a valid ISO-8601 duration")?;

    if refresh_token_ttl < access_token_ttl {
        tracing::warn!(
            access = %access_token_ttl,
            refresh = %refresh_token_ttl,
            "refresh tokens expire before access tokens; refresh tokens will never become usable"
        );
    }

    let table = std::env::var("TOKEN_TABLE").unwrap_or_else(|_| DEFAULT_TABLE.into());
    if !is_identifier(&table) {
        anyhow::bail!("TOKEN_TABLE '{}' is not a plain SQL identifier", table);
    }

    let encryption_key = non_empty("TOKEN_ENCRYPTION_KEY");
    if let Some(key) = &encryption_key {
        if key.len() != 64 || hex::decode(key).is_err() {
            anyhow::bail!("TOKEN_ENCRYPTION_KEY must be 64 hex chars (32 bytes)");
        }
    }

    Ok(Config {
        signer: std::env::var("TOKEN_SIGNER").unwrap_or(defaults.signer),
        key_path: std::env::var("TOKEN_KEY_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.key_path),
        private_key: std::env::var("TOKEN_PRIVATE_KEY").unwrap_or(defaults.private_key),
        public_key: std::env::var("TOKEN_PUBLIC_KEY").unwrap_or(defaults.public_key),
        secret_key: non_empty("TOKEN_SECRET_KEY"),
        access_token_ttl,
        refresh_token_ttl,
        leeway: std::env::var("TOKEN_LEEWAY")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.leeway),
        guard_timeout: std::env::var("TOKEN_GUARD_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(std::time::Duration::from_millis)
            .unwrap_or(defaults.guard_timeout),
        database_url: non_empty("TOKEN_CONNECTION"),
        table,
        encryption_key,
        provider_model: non_empty("TOKEN_PROVIDER_MODEL"),
    })
}

fn non_empty(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

pub(crate) fn is_identifier(s: &str) -> bool {
    !s.is_empty()
        && !s.starts_with(|c: char| c.is_ascii_digit())
        && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Parses `P[nY][nM][nW][nD][T[nH][nM][nS]]`.
///
/// Years count as 365 days and months as 30 days; only integer components are accepted.
pub fn parse_iso8601_duration(input: &str) -> anyhow::Result<Duration> {
    let s = input.trim();
    let body = s
        .strip_prefix('P')
        .ok_or_else(|| anyhow::anyhow!("duration '{}' must start with 'P'", s))?;
    if body.is_empty() || body == "T" {
        anyhow::bail!("duration '{}' has no components", s);
    }

    let mut total = Duration::zero();
    let mut in_time = false;
    let mut digits = String::new();
    let mut seen_component = false;
    let mut seen_time_component = false;

    for c in body.chars() {
        match c {
            'T' if !in_time => {
                if !digits.is_empty() {
                    anyhow::bail!("dangling number before 'T' in '{}'", s);
                }
                in_time = true;
            }
            '0'..='9' => digits.push(c),
            unit => {
                if digits.is_empty() {
                    anyhow::bail!("unit '{}' without a value in '{}'", unit, s);
                }
                let n: i64 = digits
                    .parse()
                    .with_context(|| format!("duration component out of range in '{}'", s))?;
                digits.clear();
                let part = match (in_time, unit) {
                    (false, 'Y') => n.checked_mul(365).and_then(Duration::try_days),
                    (false, 'M') => n.checked_mul(30).and_then(Duration::try_days),
                    (false, 'W') => Duration::try_weeks(n),
                    (false, 'D') => Duration::try_days(n),
                    (true, 'H') => Duration::try_hours(n),
                    (true, 'M') => Duration::try_minutes(n),
                    (true, 'S') => Duration::try_seconds(n),
                    _ => anyhow::bail!("unexpected unit '{}' in '{}'", unit, s),
                };
                total = match part.and_then(|part| total.checked_add(&part)) {
                    Some(total) => total,
                    None => anyhow::bail!("duration component out of range in '{}'", s),
                };
                seen_component = true;
                seen_time_component |= in_time;
            }
        }
    }

    if !digits.is_empty() {
        anyhow::bail!("trailing number without unit in '{}'", s);
    }
    if !seen_component || (in_time && !seen_time_component) {
        anyhow::bail!("duration '{}' has no components", s);
    }
    Ok(total)
}

// ── Tests ────────────────────────────────────────────────────
