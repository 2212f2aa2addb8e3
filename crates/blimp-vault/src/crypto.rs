//! AES-256-GCM sealing with `ring`.
//!
//! Every credential is sealed under the vault's [`MasterKey`] with a fresh
//! random 96-bit nonce. The caller supplies associated data that names the
//! row (`user_id` and app), so a ciphertext copied into another user's slot
//! fails authentication instead of decrypting.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use ring::aead::{
    self, Aad, BoundKey, NONCE_LEN, Nonce, NonceSequence, OpeningKey, SealingKey, UnboundKey,
};
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};

use crate::error::{Result, VaultError};

/// Length of the AES-256-GCM key in bytes.
pub const KEY_LEN: usize = 32;

/// Length of a PBKDF2 salt in bytes.
pub const SALT_LEN: usize = 16;

/// PBKDF2-HMAC-SHA256 iterations for passphrase-derived keys.
const PBKDF2_ITERATIONS: u32 = 600_000;

static AEAD_ALG: &aead::Algorithm = &aead::AES_256_GCM;

// ---------------------------------------------------------------------------
// Master key
// ---------------------------------------------------------------------------

/// A 256-bit vault key.
#[derive(Clone)]
pub struct MasterKey([u8; KEY_LEN]);

impl MasterKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Decode a standard base64 string holding exactly 32 bytes.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| VaultError::InvalidKey {
                reason: format!("not valid base64: {e}"),
            })?;
        let array: [u8; KEY_LEN] = bytes.try_into().map_err(|b: Vec<u8>| VaultError::InvalidKey {
            reason: format!("expected {KEY_LEN} bytes, got {}", b.len()),
        })?;
        Ok(Self(array))
    }

    /// A fresh random key.
    pub fn generate() -> Result<Self> {
        let mut bytes = [0u8; KEY_LEN];
        SystemRandom::new()
            .fill(&mut bytes)
            .map_err(|_| VaultError::Internal("failed to generate random key".into()))?;
        Ok(Self(bytes))
    }

    /// Derive a key from a passphrase and salt with PBKDF2-HMAC-SHA256.
    pub fn derive(passphrase: &[u8], salt: &[u8]) -> Result<Self> {
        let iterations = std::num::NonZeroU32::new(PBKDF2_ITERATIONS)
            .ok_or_else(|| VaultError::Internal("PBKDF2 iterations must be non-zero".into()))?;
        let mut out = [0u8; KEY_LEN];
        pbkdf2::derive(pbkdf2::PBKDF2_HMAC_SHA256, iterations, salt, passphrase, &mut out);
        Ok(Self(out))
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterKey(<redacted>)")
    }
}

/// `len` bytes from the system CSPRNG.
pub fn random_bytes(len: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    SystemRandom::new()
        .fill(&mut buf)
        .map_err(|_| VaultError::Internal("failed to generate random bytes".into()))?;
    Ok(buf)
}

// ---------------------------------------------------------------------------
// Sealing
// ---------------------------------------------------------------------------

/// Yields its nonce once; each sealing or opening key is single-use.
struct OneShot(Option<[u8; NONCE_LEN]>);

impl NonceSequence for OneShot {
    fn advance(&mut self) -> std::result::Result<Nonce, ring::error::Unspecified> {
        self.0
            .take()
            .map(Nonce::assume_unique_for_key)
            .ok_or(ring::error::Unspecified)
    }
}

/// Nonce and ciphertext (with the GCM tag appended).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub nonce: [u8; NONCE_LEN],
    pub ciphertext: Vec<u8>,
}

/// Encrypt `plaintext`, authenticating `aad` alongside it.
pub fn seal(key: &MasterKey, plaintext: &[u8], aad: &[u8]) -> Result<Sealed> {
    let mut nonce = [0u8; NONCE_LEN];
    SystemRandom::new()
        .fill(&mut nonce)
        .map_err(|_| VaultError::EncryptionFailed {
            reason: "failed to generate random nonce".into(),
        })?;

    let unbound =
        UnboundKey::new(AEAD_ALG, key.as_bytes()).map_err(|_| VaultError::EncryptionFailed {
            reason: "failed to create AES-256-GCM key".into(),
        })?;
    let mut sealing = SealingKey::new(unbound, OneShot(Some(nonce)));

    let mut in_out = plaintext.to_vec();
    sealing
        .seal_in_place_append_tag(Aad::from(aad), &mut in_out)
        .map_err(|_| VaultError::EncryptionFailed {
            reason: "seal_in_place failed".into(),
        })?;

    tracing::trace!(plaintext_len = plaintext.len(), ciphertext_len = in_out.len(), "sealed");
    Ok(Sealed {
        nonce,
        ciphertext: in_out,
    })
}

/// Decrypt a [`Sealed`] value produced by [`seal`] with the same `aad`.
pub fn open(key: &MasterKey, sealed: &Sealed, aad: &[u8]) -> Result<Vec<u8>> {
    let unbound =
        UnboundKey::new(AEAD_ALG, key.as_bytes()).map_err(|_| VaultError::DecryptionFailed {
            reason: "failed to create AES-256-GCM key".into(),
        })?;
    let mut opening = OpeningKey::new(unbound, OneShot(Some(sealed.nonce)));

    let mut in_out = sealed.ciphertext.clone();
    let plaintext = opening
        .open_in_place(Aad::from(aad), &mut in_out)
        .map_err(|_| VaultError::DecryptionFailed {
            reason: "authentication failed (wrong key, tampered data, or wrong row)".into(),
        })?;
    Ok(plaintext.to_vec())
}

/// Rebuild a nonce from a stored BLOB.
pub fn nonce_from_slice(bytes: &[u8]) -> Result<[u8; NONCE_LEN]> {
    bytes.try_into().map_err(|_| VaultError::DecryptionFailed {
        reason: format!("nonce must be {NONCE_LEN} bytes, got {}", bytes.len()),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_then_open() {
        let key = MasterKey::generate().unwrap();
        let sealed = seal(&key, b"xoxb-secret", b"u1\0slack").unwrap();
        assert_ne!(sealed.ciphertext, b"xoxb-secret");
        assert_eq!(open(&key, &sealed, b"u1\0slack").unwrap(), b"xoxb-secret");
    }

    #[test]
    fn wrong_key_fails() {
        let sealed = seal(&MasterKey::generate().unwrap(), b"data", b"").unwrap();
        let other = MasterKey::generate().unwrap();
        assert!(matches!(
            open(&other, &sealed, b""),
            Err(VaultError::DecryptionFailed { .. })
        ));
    }

    #[test]
    fn mismatched_associated_data_fails() {
        let key = MasterKey::generate().unwrap();
        let sealed = seal(&key, b"token", b"alice\0github").unwrap();
        assert!(open(&key, &sealed, b"mallory\0github").is_err());
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let key = MasterKey::generate().unwrap();
        let mut sealed = seal(&key, b"token", b"").unwrap();
        sealed.ciphertext[0] ^= 0xff;
        assert!(open(&key, &sealed, b"").is_err());
    }

    #[test]
    fn nonces_are_fresh() {
        let key = MasterKey::generate().unwrap();
        let a = seal(&key, b"same", b"").unwrap();
        let b = seal(&key, b"same", b"").unwrap();
        assert_ne!(a.nonce, b.nonce);
    }

    #[test]
    fn base64_key_parsing() {
        let key = MasterKey::generate().unwrap();
        let parsed = MasterKey::from_base64(&key.to_base64()).unwrap();
        assert_eq!(parsed.as_bytes(), key.as_bytes());

        assert!(MasterKey::from_base64("not base64!").is_err());
        assert!(MasterKey::from_base64(&STANDARD.encode([0u8; 16])).is_err());
        assert_eq!(format!("{key:?}"), "MasterKey(<redacted>)");
    }

    #[test]
    fn derived_keys_depend_on_salt() {
        let a = MasterKey::derive(b"passphrase", b"salt-one-1234567").unwrap();
        let b = MasterKey::derive(b"passphrase", b"salt-one-1234567").unwrap();
        let c = MasterKey::derive(b"passphrase", b"salt-two-1234567").unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
        assert_ne!(a.as_bytes(), c.as_bytes());
    }
}
