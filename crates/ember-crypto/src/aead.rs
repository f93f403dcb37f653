//! AES-256-GCM authenticated encryption for session and transfer payloads.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand_core::{CryptoRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::CryptoError;

/// Nonce size for AES-256-GCM (96 bits).
pub const NONCE_SIZE: usize = 12;

/// Key size for AES-256-GCM (256 bits).
pub const KEY_SIZE: usize = 32;

/// AES-256-GCM symmetric key, zeroized on drop.
#[derive(Clone, ZeroizeOnDrop, Zeroize)]
pub struct AeadKey([u8; KEY_SIZE]);

impl AeadKey {
    /// Wrap a raw 32-byte key.
    #[must_use]
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Raw key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.0))
    }
}

/// Draw a fresh random 12-byte nonce.
///
/// Callers must never reuse a nonce with the same key; the session layer
/// increments a counter into this space rather than drawing randomly for
/// every single message when volume is high.
#[must_use]
pub fn random_nonce<R: RngCore + CryptoRng>(rng: &mut R) -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    rng.fill_bytes(&mut nonce);
    nonce
}

/// Encrypt `plaintext` under `key` and `nonce`, authenticating `aad` without
/// encrypting it. Returns the ciphertext with the 16-byte GCM tag appended.
///
/// # Errors
///
/// Returns [`CryptoError::EncryptionFailed`] if the underlying cipher
/// rejects the input (never happens for well-formed keys/nonces).
pub fn encrypt(
    key: &AeadKey,
    nonce: &[u8; NONCE_SIZE],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    key.cipher()
        .encrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| CryptoError::EncryptionFailed)
}

/// Decrypt `ciphertext` (with trailing GCM tag) under `key` and `nonce`,
/// verifying `aad`.
///
/// # Errors
///
/// Returns [`CryptoError::DecryptionFailed`] if authentication fails.
pub fn decrypt(
    key: &AeadKey,
    nonce: &[u8; NONCE_SIZE],
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    key.cipher()
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| CryptoError::DecryptionFailed)
}
