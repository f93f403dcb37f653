//! SHA-256 hashing and HKDF-SHA256 key derivation.
//!
//! Provides:
//! - SHA-256 digests (peer ID derivation, file integrity)
//! - HKDF-SHA256 extract/expand (session key and per-transfer subkey derivation)

use hkdf::Hkdf;
use sha2::{Digest, Sha256};

/// SHA-256 digest output (32 bytes).
pub type HashOutput = [u8; 32];

/// Compute the SHA-256 digest of `data`.
#[must_use]
pub fn hash(data: &[u8]) -> HashOutput {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Incremental SHA-256 hasher for streaming input such as file chunks.
pub struct StreamHasher {
    hasher: Sha256,
    total_len: u64,
}

impl StreamHasher {
    /// Create a new streaming hasher.
    #[must_use]
    pub fn new() -> Self {
        Self {
            hasher: Sha256::new(),
            total_len: 0,
        }
    }

    /// Feed more data into the digest.
    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
        self.total_len += data.len() as u64;
    }

    /// Total bytes hashed so far.
    #[must_use]
    pub fn total_len(&self) -> u64 {
        self.total_len
    }

    /// Finalize and return the digest.
    #[must_use]
    pub fn finalize(self) -> HashOutput {
        self.hasher.finalize().into()
    }
}

impl Default for StreamHasher {
    fn default() -> Self {
        Self::new()
    }
}

/// HKDF-SHA256 extract-then-expand, as used for session key derivation
/// (salt absent, info `"session-key-v1"`) and per-transfer subkey
/// derivation (salt `"file-transfer-v1"`, info the transfer id).
///
/// # Errors
///
/// Returns an error if `output` is longer than HKDF-SHA256 can produce
/// (255 * 32 bytes), which never happens for the fixed-size keys this
/// crate derives.
pub fn hkdf_sha256(salt: &[u8], ikm: &[u8], info: &[u8], output: &mut [u8]) -> Result<(), crate::CryptoError> {
    let hk = Hkdf::<Sha256>::new(Some(salt), ikm);
    hk.expand(info, output)
        .map_err(|_| crate::CryptoError::InvalidKeyLength {
            expected: 255 * 32,
            actual: output.len(),
        })
}

/// Derive the 32-byte AES-256-GCM session key from an X25519 shared secret.
///
/// `HKDF-SHA256(salt = none, ikm = shared_secret, info = "session-key-v1")`
#[must_use]
pub fn derive_session_key(shared_secret: &[u8]) -> [u8; 32] {
    let mut key = [0u8; 32];
    hkdf_sha256(&[], shared_secret, b"session-key-v1", &mut key)
        .expect("32-byte output is always within HKDF-SHA256 limits");
    key
}

/// Derive a per-transfer subkey from the session key and transfer id.
///
/// `HKDF-SHA256(salt = "file-transfer-v1", ikm = session_key, info = transfer_id)`
#[must_use]
pub fn derive_transfer_key(session_key: &[u8; 32], transfer_id: &[u8]) -> [u8; 32] {
    let mut key = [0u8; 32];
    hkdf_sha256(b"file-transfer-v1", session_key, transfer_id, &mut key)
        .expect("32-byte output is always within HKDF-SHA256 limits");
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        let data = b"hello world";
        assert_eq!(hash(data), hash(data));
    }

    #[test]
    fn hash_differs_by_input() {
        assert_ne!(hash(b"input1"), hash(b"input2"));
    }

    #[test]
    fn sha256_empty_string_vector() {
        let expected = [
            0xe3, 0xb0, 0xc4, 0x42, 0x98, 0xfc, 0x1c, 0x14, 0x9a, 0xfb, 0xf4, 0xc8, 0x99, 0x6f,
            0xb9, 0x24, 0x27, 0xae, 0x41, 0xe4, 0x64, 0x9b, 0x93, 0x4c, 0xa4, 0x95, 0x99, 0x1b,
            0x78, 0x52, 0xb8, 0x55,
        ];
        assert_eq!(hash(b""), expected);
    }

    #[test]
    fn stream_hasher_matches_oneshot() {
        let mut streamed = StreamHasher::new();
        streamed.update(b"hello ");
        streamed.update(b"world");
        assert_eq!(streamed.total_len(), 11);
        assert_eq!(streamed.finalize(), hash(b"hello world"));
    }

    #[test]
    fn session_key_derivation_is_deterministic() {
        let secret = [0x11u8; 32];
        assert_eq!(derive_session_key(&secret), derive_session_key(&secret));
    }

    #[test]
    fn session_key_differs_by_secret() {
        let a = derive_session_key(&[0x11u8; 32]);
        let b = derive_session_key(&[0x22u8; 32]);
        assert_ne!(a, b);
    }

    #[test]
    fn transfer_key_differs_by_transfer_id() {
        let session_key = derive_session_key(&[0x33u8; 32]);
        let t1 = derive_transfer_key(&session_key, b"transfer-1");
        let t2 = derive_transfer_key(&session_key, b"transfer-2");
        assert_ne!(t1, t2);
    }

    #[test]
    fn transfer_key_differs_from_session_key() {
        let session_key = derive_session_key(&[0x44u8; 32]);
        let transfer_key = derive_transfer_key(&session_key, b"transfer-1");
        assert_ne!(session_key, transfer_key);
    }
}
