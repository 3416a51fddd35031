//! Opaque single-use tokens (refresh, verification, invite).
//!
//! The raw token only ever leaves the process inside a response or an email.
//! The store keeps `HMAC-SHA256(secret, raw)` as 64 lowercase hex characters,
//! which is deterministic and therefore indexable.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::config::MIN_TOKEN_HASH_SECRET_LEN;
use crate::services::error::ServiceError;

type HmacSha256 = Hmac<Sha256>;

const RAW_TOKEN_BYTES: usize = 32;

#[derive(Clone)]
pub struct TokenHasher {
    keyed: HmacSha256,
}

impl std::fmt::Debug for TokenHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenHasher").finish_non_exhaustive()
    }
}

impl TokenHasher {
    pub fn new(secret: &str) -> Result<Self, ServiceError> {
        if secret.is_empty() {
            return Err(ServiceError::Configuration(
                "TOKEN_HASH_SECRET is not set".to_string(),
            ));
        }
        if secret.chars().count() < MIN_TOKEN_HASH_SECRET_LEN {
            return Err(ServiceError::Configuration(format!(
                "TOKEN_HASH_SECRET must be at least {} characters",
                MIN_TOKEN_HASH_SECRET_LEN
            )));
        }

        let keyed = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| ServiceError::Configuration(format!("Invalid token secret: {}", e)))?;

        Ok(Self { keyed })
    }

    /// 256 bits from the OS CSPRNG, base64url without padding (43 chars).
    pub fn generate_raw_token(&self) -> String {
        let mut bytes = [0u8; RAW_TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }

    pub fn hash_token(&self, raw: &str) -> String {
        let mut mac = self.keyed.clone();
        mac.update(raw.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Constant-time check of `raw` against a stored hash.
    pub fn verify_token(&self, raw: &str, expected_hash: &str) -> bool {
        let computed = self.hash_token(raw);
        let computed = computed.as_bytes();
        let expected = expected_hash.as_bytes();

        if computed.len() != expected.len() {
            return false;
        }

        computed.ct_eq(expected).into()
    }
}

/// First 8 characters of a hash, for log fields.
pub fn hash_prefix(hash: &str) -> &str {
    hash.get(..8).unwrap_or(hash)
}
