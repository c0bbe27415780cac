//! Password-derived sealing of the store file.
//!
//! The administrator password is stretched with PBKDF2-HMAC-SHA256 into a
//! 256-bit key. The salt is derived from the password itself, so the same
//! password always opens the same file without any header on disk. The JSON
//! payload is sealed with AES-256-GCM; the file is `nonce (12) || ciphertext || tag (16)`.
//!
//! Any failure to open (wrong key, truncated file, flipped bit) is reported
//! as [`CryptoError::Authentication`] and never distinguished further.

use std::num::NonZeroU32;

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, KeyInit},
};
use rand::RngCore;
use ring::{digest, pbkdf2};
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use zeroize::Zeroizing;

/// PBKDF2 iteration count.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Errors from sealing or opening a store payload.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// The payload could not be authenticated under this key.
    #[error("Authentication failed: wrong password or corrupted data")]
    Authentication,

    /// Encryption itself failed (only possible for absurd payload sizes).
    #[error("Failed to encrypt store payload")]
    Seal,
}

/// 256-bit store key, wiped from memory on drop.
pub struct StoreKey(Zeroizing<[u8; 32]>);

impl std::fmt::Debug for StoreKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StoreKey(<redacted>)")
    }
}

/// Derive the store key from the administrator password.
///
/// Deterministic: the same password yields the same key on every call.
pub fn derive_key(password: &SecretString) -> StoreKey {
    let secret = password.expose_secret().as_bytes();
    let salt_digest = digest::digest(&digest::SHA256, secret);
    let salt = &salt_digest.as_ref()[..SALT_LEN];

    let mut key = Zeroizing::new([0u8; 32]);
    let iterations = NonZeroU32::new(PBKDF2_ITERATIONS).unwrap_or(NonZeroU32::MIN);
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        iterations,
        salt,
        secret,
        key.as_mut(),
    );
    StoreKey(key)
}

impl StoreKey {
    /// Encrypt `plaintext` under a fresh random nonce.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let key: &Key<Aes256Gcm> = (&*self.0).into();
        let cipher = Aes256Gcm::new(key);

        let mut nonce = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce);

        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| CryptoError::Seal)?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Decrypt and authenticate a sealed payload.
    pub fn open(&self, sealed: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        if sealed.len() < NONCE_LEN + TAG_LEN {
            return Err(CryptoError::Authentication);
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);

        let key: &Key<Aes256Gcm> = (&*self.0).into();
        let cipher = Aes256Gcm::new(key);
        cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map(Zeroizing::new)
            .map_err(|_| CryptoError::Authentication)
    }
}
