//! # Ember Crypto
//!
//! Cryptographic primitives for the Ember peer-to-peer messenger.
//!
//! This crate provides:
//! - Ed25519 long-term identity, signing, Peer ID and fingerprint derivation
//! - Ephemeral X25519 Diffie-Hellman key exchange per session
//! - HKDF-SHA256 session key and per-transfer subkey derivation
//! - AES-256-GCM authenticated encryption
//!
//! ## Cryptographic Suite
//!
//! | Function | Algorithm | Security Level |
//! |----------|-----------|----------------|
//! | Key Exchange | Ephemeral X25519 | 128-bit |
//! | AEAD | AES-256-GCM | 256-bit key |
//! | Hash | SHA-256 | 128-bit collision |
//! | KDF | HKDF-SHA256 | 128-bit |
//! | Signatures | Ed25519 | 128-bit |
//!
//! There is deliberately no Noise-style ratcheting: each session's key is
//! derived once from its ephemeral handshake and used for the session's
//! lifetime, matching the messenger's "plain ephemeral key exchange" scope.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod aead;
pub mod error;
pub mod hash;
pub mod identity;
pub mod signatures;
pub mod x25519;

pub use error::CryptoError;

/// X25519 public key size.
pub const X25519_PUBLIC_KEY_SIZE: usize = 32;

/// X25519 secret key size.
pub const X25519_SECRET_KEY_SIZE: usize = 32;

/// AES-256-GCM key size.
pub const AES_KEY_SIZE: usize = 32;

/// AES-256-GCM nonce size.
pub const AES_NONCE_SIZE: usize = 12;

/// SHA-256 output size.
pub const SHA256_OUTPUT_SIZE: usize = 32;

/// Ed25519 public key size.
pub const ED25519_PUBLIC_KEY_SIZE: usize = 32;

/// Ed25519 secret key size.
pub const ED25519_SECRET_KEY_SIZE: usize = 32;

/// Ed25519 signature size.
pub const ED25519_SIGNATURE_SIZE: usize = 64;
