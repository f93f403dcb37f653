//! # Ember Files
//!
//! Windowed file transfer engine for the Ember peer-to-peer messenger.
//!
//! This crate provides:
//! - Sequential file chunking and reassembly ([`chunker`])
//! - SHA-256 chunk and whole-file integrity hashing ([`hasher`])
//! - The windowed, chunk-encrypted transfer state machine
//!   ([`transfer::WindowedSender`], [`transfer::WindowedReceiver`])
//!
//! A transfer sends a file as a sequence of AES-256-GCM-encrypted chunks
//! (≤64 KiB of plaintext each, keyed by a per-transfer HKDF subkey derived
//! from the session key) capped by a 16 MiB sliding window: the sender
//! pauses after each window until the receiver acknowledges the bytes
//! written so far. There is no per-chunk ACK and no credit scheme — the
//! windowed ACK is the only flow-control primitive.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod chunker;
pub mod hasher;
pub mod transfer;

/// Maximum plaintext carried by one non-terminal chunk (64 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = transfer::MAX_CHUNK_SIZE;
