//! Integrity digests.
//!
//! API keys carry a keyed HMAC-SHA256 checksum over their secret segment.
//! The sign-in nonce binding uses a plain SHA-256 digest because the client
//! computes it before handing it to the identity provider.

use hmac::{digest::InvalidLength, Hmac, Mac};
use sha2::{Digest, Sha256};
use std::fmt;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Keyed checksum over API key secrets.
#[derive(Clone)]
pub struct Checksum {
    mac: HmacSha256,
}

impl Checksum {
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, InvalidLength> {
        let mac = HmacSha256::new_from_slice(secret.as_ref())?;
        Ok(Self { mac })
    }

    /// Lowercase hex HMAC of `payload`.
    pub fn compute(&self, payload: &[u8]) -> String {
        let mut mac = self.mac.clone();
        mac.update(payload);
        hex::encode(mac.finalize().into_bytes())
    }

    /// Constant-time comparison of `checksum` against the expected value.
    pub fn verify(&self, payload: &[u8], checksum: &str) -> bool {
        let expected = self.compute(payload);
        expected.as_bytes().ct_eq(checksum.as_bytes()).into()
    }
}

impl fmt::Debug for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Checksum").finish_non_exhaustive()
    }
}

/// Lowercase hex SHA-256 of `payload`.
pub fn sha256_hex(payload: &[u8]) -> String {
    hex::encode(Sha256::digest(payload))
}

/// Constant-time string equality.
pub fn digests_match(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
