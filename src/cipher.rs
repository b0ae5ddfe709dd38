//! Transform applied to token strings on their way out (encrypt) and back in
//! (decrypt), plus the fingerprints stored on records.

use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::errors::TokenError;

const NONCE_LEN: usize = 12;

pub trait TokenCipher: Send + Sync {
    fn encrypt(&self, token: &str) -> Result<String, TokenError>;
    fn decrypt(&self, token: &str) -> Result<String, TokenError>;
}

/// Identity transform.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainText;

impl TokenCipher for PlainText {
    fn encrypt(&self, token: &str) -> Result<String, TokenError> {
        Ok(token.to_string())
    }

    fn decrypt(&self, token: &str) -> Result<String, TokenError> {
        Ok(token.to_string())
    }
}

/// AES-256-GCM with a random nonce per token.
///
/// Output is `base64url(nonce || ciphertext)`, so encrypted tokens stay
/// header-safe.
pub struct AesGcmCipher {
    key: Zeroizing<[u8; 32]>,
}

impl std::fmt::Debug for AesGcmCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AesGcmCipher { .. }")
    }
}

impl AesGcmCipher {
    pub fn new(key_hex: &str) -> Result<Self, TokenError> {
        Ok(Self {
            key: Zeroizing::new(parse_key(key_hex)?),
        })
    }

    fn cipher(&self) -> Result<Aes256Gcm, TokenError> {
        Aes256Gcm::new_from_slice(&self.key[..])
            .map_err(|e| TokenError::Config(format!("invalid key length: {:?}", e)))
    }
}

impl TokenCipher for AesGcmCipher {
    fn encrypt(&self, token: &str) -> Result<String, TokenError> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher()?
            .encrypt(Nonce::from_slice(&nonce), token.as_bytes())
            .map_err(|e| TokenError::Internal(anyhow::anyhow!("token encryption failed: {}", e)))?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(URL_SAFE_NO_PAD.encode(out))
    }

    fn decrypt(&self, token: &str) -> Result<String, TokenError> {
        let raw = URL_SAFE_NO_PAD
            .decode(token.trim())
            .map_err(|_| TokenError::Malformed("encrypted token is not base64url".into()))?;
        if raw.len() <= NONCE_LEN {
            return Err(TokenError::Malformed("encrypted token is truncated".into()));
        }

        let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
        let plain = self
            .cipher()?
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| TokenError::Malformed("token could not be decrypted".into()))?;

        String::from_utf8(plain)
            .map_err(|_| TokenError::Malformed("decrypted token is not UTF-8".into()))
    }
}

fn parse_key(hex: &str) -> Result<[u8; 32], TokenError> {
    if hex.len() != 64 {
        return Err(TokenError::Config(format!(
            "TOKEN_ENCRYPTION_KEY must be 64 hex chars (32 bytes), got {} chars",
            hex.len()
        )));
    }
    let bytes = Zeroizing::new(
        hex::decode(hex).map_err(|e| TokenError::Config(format!("TOKEN_ENCRYPTION_KEY: {}", e)))?,
    );
    let mut key = [0u8; 32];
    key.copy_from_slice(&bytes);
    Ok(key)
}

/// SHA-256 hex digest of a token string as handed to the client.
pub fn fingerprint(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Constant-time comparison of a presented token against a stored fingerprint.
pub fn fingerprint_matches(token: &str, stored: &str) -> bool {
    let presented = fingerprint(token);
    presented.as_bytes().ct_eq(stored.as_bytes()).into()
}

// ── Tests ────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

    #[test]
    fn test_plaintext_is_identity() {
        assert_eq!(PlainText.encrypt("a.b.c").unwrap(), "a.b.c");
        assert_eq!(PlainText.decrypt("a.b.c").unwrap(), "a.b.c");
    }

    #[test]
    fn test_aes_roundtrip_uses_fresh_nonce() {
        let cipher = AesGcmCipher::new(KEY).unwrap();
        let a = cipher.encrypt("header.payload.sig").unwrap();
        let b = cipher.encrypt("header.payload.sig").unwrap();
        assert_ne!(a, b);
        assert!(!a.contains('.'));
        assert_eq!(cipher.decrypt(&a).unwrap(), "header.payload.sig");
    }

    #[test]
    fn test_aes_rejects_tampering() {
        let cipher = AesGcmCipher::new(KEY).unwrap();
        let enc = cipher.encrypt("header.payload.sig").unwrap();
        let mut raw = URL_SAFE_NO_PAD.decode(&enc).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        let tampered = URL_SAFE_NO_PAD.encode(raw);

        assert!(matches!(cipher.decrypt(&tampered), Err(TokenError::Malformed(_))));
        assert!(matches!(cipher.decrypt("not base64!"), Err(TokenError::Malformed(_))));
        assert!(matches!(cipher.decrypt("AAAA"), Err(TokenError::Malformed(_))));
    }

    #[test]
    fn test_bad_key_is_config_error() {
        assert!(matches!(AesGcmCipher::new("abcd"), Err(TokenError::Config(_))));
        let not_hex = "z".repeat(64);
        assert!(matches!(AesGcmCipher::new(&not_hex), Err(TokenError::Config(_))));
    }

    #[test]
    fn test_fingerprint() {
        let fp = fingerprint("abc");
        assert_eq!(
            fp,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert!(fingerprint_matches("abc", &fp));
        assert!(!fingerprint_matches("abd", &fp));
        assert!(!fingerprint_matches("abc", "short"));
    }
}
