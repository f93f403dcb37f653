//! SHA-256 hashing for file and chunk integrity.

use ember_crypto::hash;

/// Hash a single chunk of plaintext.
#[must_use]
pub fn hash_chunk(data: &[u8]) -> [u8; 32] {
    hash::hash(data)
}

/// Hash an entire file's plaintext (the end-to-end integrity check the
/// receiver compares against `FileMetadata::hash_sha256`).
#[must_use]
pub fn hash_file(data: &[u8]) -> [u8; 32] {
    hash::hash(data)
}

/// Verify a chunk against its expected hash.
#[must_use]
pub fn verify_chunk(data: &[u8], expected: &[u8; 32]) -> bool {
    hash_chunk(data) == *expected
}
