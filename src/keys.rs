//! Signer provider: turns the configured algorithm and key material into a
//! ready-to-use signing/verification key pair.
//!
//! Asymmetric families (RSA, RSA-PSS, ECDSA, EdDSA) load a PEM key pair from
//! disk; HMAC families use the configured plaintext secret for both halves.
//! Keys are loaded once at bootstrap and are immutable afterwards, so a
//! `SigningKeys` can be shared behind an `Arc` by any number of readers.

use std::fmt;
use std::path::Path;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey};
use zeroize::Zeroizing;

use crate::config::Config;
use crate::errors::TokenError;

/// Below this many bytes an HMAC secret is accepted but flagged.
const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignerFamily {
    Rsa,
    RsaPss,
    Ecdsa,
    EdDsa,
    Hmac,
}

impl SignerFamily {
    pub fn of(algorithm: Algorithm) -> Self {
        match algorithm {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => SignerFamily::Hmac,
            Algorithm::RS256 | Algorithm::RS384 | Algorithm::RS512 => SignerFamily::Rsa,
            Algorithm::PS256 | Algorithm::PS384 | Algorithm::PS512 => SignerFamily::RsaPss,
            Algorithm::ES256 | Algorithm::ES384 => SignerFamily::Ecdsa,
            Algorithm::EdDSA => SignerFamily::EdDsa,
        }
    }

    pub fn is_symmetric(self) -> bool {
        self == SignerFamily::Hmac
    }
}

/// Maps a configured signer name onto a JWA algorithm.
pub fn parse_algorithm(name: &str) -> Result<Algorithm, TokenError> {
    let alg = match name.trim().to_ascii_uppercase().as_str() {
        "HS256" => Algorithm::HS256,
        "HS384" => Algorithm::HS384,
        "HS512" => Algorithm::HS512,
        "RS256" => Algorithm::RS256,
        "RS384" => Algorithm::RS384,
        "RS512" => Algorithm::RS512,
        "PS256" => Algorithm::PS256,
        "PS384" => Algorithm::PS384,
        "PS512" => Algorithm::PS512,
        "ES256" => Algorithm::ES256,
        "ES384" => Algorithm::ES384,
        "EDDSA" => Algorithm::EdDSA,
        _ => return Err(TokenError::UnsupportedSigner(name.to_string())),
    };
    Ok(alg)
}

/// The signer + signing key + verification key triple.
#[derive(Clone)]
pub struct SigningKeys {
    algorithm: Algorithm,
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl fmt::Debug for SigningKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeys")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl SigningKeys {
    /// Resolve the configured signer into keys. Setup-time errors here are fatal.
    pub fn from_config(cfg: &Config) -> Result<Self, TokenError> {
        let algorithm = parse_algorithm(&cfg.signer)?;

        if SignerFamily::of(algorithm).is_symmetric() {
            let secret = Zeroizing::new(cfg.secret_key.clone().unwrap_or_default());
            return Self::symmetric(algorithm, secret.as_bytes());
        }

        let private_path = cfg.key_file(&cfg.private_key);
        let public_path = cfg.key_file(&cfg.public_key);

        let private_pem = Zeroizing::new(read_key_file(&private_path)?);
        warn_if_world_readable(&private_path);
        let public_pem = read_key_file(&public_path)?;

        let keys = Self::asymmetric(algorithm, &private_pem, &public_pem).map_err(|e| match e {
            TokenError::KeyLoad { path, reason } => TokenError::KeyLoad {
                path: if path == "private" {
                    private_path.display().to_string()
                } else {
                    public_path.display().to_string()
                },
                reason,
            },
            other => other,
        })?;

        tracing::info!(
            algorithm = ?algorithm,
            private_key = %private_path.display(),
            public_key = %public_path.display(),
            "loaded asymmetric signing keys"
        );
        Ok(keys)
    }

    /// Keys for an HMAC signer: the same secret signs and verifies.
    pub fn symmetric(algorithm: Algorithm, secret: &[u8]) -> Result<Self, TokenError> {
        if !SignerFamily::of(algorithm).is_symmetric() {
            return Err(TokenError::Config(format!(
                "{:?} is asymmetric and needs a key pair",
                algorithm
            )));
        }
        if secret.is_empty() {
            return Err(TokenError::KeyLoad {
                path: "TOKEN_SECRET_KEY".into(),
                reason: "secret is empty".into(),
            });
        }
        if secret.len() < MIN_SECRET_LEN {
            tracing::warn!(
                len = secret.len(),
                "HMAC secret is shorter than {} bytes",
                MIN_SECRET_LEN
            );
        }

        Ok(Self {
            algorithm,
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        })
    }

    /// Keys for an asymmetric signer from PEM-encoded private/public halves.
    pub fn asymmetric(
        algorithm: Algorithm,
        private_pem: &[u8],
        public_pem: &[u8],
    ) -> Result<Self, TokenError> {
        let family = SignerFamily::of(algorithm);
        let (encoding, decoding) = match family {
            SignerFamily::Rsa | SignerFamily::RsaPss => (
                EncodingKey::from_rsa_pem(private_pem).map_err(|e| bad_key("private", e))?,
                DecodingKey::from_rsa_pem(public_pem).map_err(|e| bad_key("public", e))?,
            ),
            SignerFamily::Ecdsa => (
                EncodingKey::from_ec_pem(private_pem).map_err(|e| bad_key("private", e))?,
                DecodingKey::from_ec_pem(public_pem).map_err(|e| bad_key("public", e))?,
            ),
            SignerFamily::EdDsa => (
                EncodingKey::from_ed_pem(private_pem).map_err(|e| bad_key("private", e))?,
                DecodingKey::from_ed_pem(public_pem).map_err(|e| bad_key("public", e))?,
            ),
            SignerFamily::Hmac => {
                return Err(TokenError::Config(format!(
                    "{:?} is symmetric and takes a secret, not a key pair",
                    algorithm
                )))
            }
        };

        Ok(Self {
            algorithm,
            encoding,
            decoding,
        })
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn is_symmetric(&self) -> bool {
        SignerFamily::of(self.algorithm).is_symmetric()
    }

    pub fn signing_key(&self) -> &EncodingKey {
        &self.encoding
    }

    pub fn verification_key(&self) -> &DecodingKey {
        &self.decoding
    }
}

fn bad_key(which: &str, e: jsonwebtoken::errors::Error) -> TokenError {
    TokenError::KeyLoad {
        path: which.to_string(),
        reason: format!("not a valid PEM key for this signer: {}", e),
    }
}

fn read_key_file(path: &Path) -> Result<Vec<u8>, TokenError> {
    std::fs::read(path).map_err(|e| TokenError::KeyLoad {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

#[cfg(unix)]
fn warn_if_world_readable(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    if let Ok(meta) = std::fs::metadata(path) {
        let mode = meta.permissions().mode();
        if mode & 0o077 != 0 {
            tracing::warn!(
                path = %path.display(),
                mode = %format!("{:o}", mode & 0o777),
                "private key is accessible to group/other; expected 0600"
            );
        }
    }
}

#[cfg(not(unix))]
fn warn_if_world_readable(_path: &Path) {}

// ── Tests ────────────────────────────────────────────────────
