//! Cryptographic error types.

use thiserror::Error;

/// Cryptographic errors.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// AEAD encryption failed.
    #[error("encryption failed")]
    EncryptionFailed,

    /// AEAD decryption failed (authentication failure).
    #[error("decryption failed: authentication failure")]
    DecryptionFailed,

    /// Invalid key length.
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected length.
        expected: usize,
        /// Actual length.
        actual: usize,
    },

    /// Invalid nonce length.
    #[error("invalid nonce length")]
    InvalidNonceLength,

    /// Invalid signature encoding.
    #[error("invalid signature")]
    InvalidSignature,

    /// Invalid public key encoding.
    #[error("invalid public key")]
    InvalidPublicKey,

    /// Diffie-Hellman exchange produced a degenerate (low-order) shared secret.
    #[error("key exchange produced a degenerate shared secret")]
    DegenerateSharedSecret,

    /// Random number generation failed.
    #[error("random number generation failed")]
    RandomFailed,
}
