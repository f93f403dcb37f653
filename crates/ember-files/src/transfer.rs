//! Windowed, chunk-encrypted file transfer.
//!
//! A transfer moves a file in four phases: announce, receive-announcement,
//! request, and stream. This module implements the streaming phase —
//! [`WindowedSender`] and [`WindowedReceiver`] — plus the state and control
//! types the earlier phases hand off.

use std::path::PathBuf;
use std::time::Duration;

use ember_crypto::aead::{self, AeadKey};
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::timeout;
use uuid::Uuid;

use crate::chunker::{FileChunker, FileReassembler};
use crate::hasher;

/// Maximum plaintext carried by one non-terminal chunk.
pub const MAX_CHUNK_SIZE: usize = 64 * 1024;

/// Plaintext sent before the sender pauses for an acknowledgement.
pub const WINDOW_SIZE: u64 = 16 * 1024 * 1024;

/// How long the sender waits for a `ChunkAck` before failing the transfer.
pub const ACK_TIMEOUT: Duration = Duration::from_secs(60);

/// Transfer state, mirrored on both peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    /// Announced, awaiting the receiver's decision.
    Announced,
    /// Receiver has requested the stream; sender has not opened it yet.
    Downloading,
    /// Stream open, chunks flowing.
    Transferring,
    /// All chunks received and the hash matched.
    Completed,
    /// Aborted: ACK timeout, hash mismatch, or I/O failure.
    Failed,
}

/// Transfer direction, from the local peer's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    /// Local peer is sending the file.
    Send,
    /// Local peer is receiving the file.
    Receive,
}

/// Errors from the windowed transfer engine.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// Underlying file I/O failed.
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// AEAD encryption or decryption failed.
    #[error("crypto error: {0}")]
    Crypto(#[from] ember_crypto::CryptoError),

    /// No `ChunkAck` arrived within [`ACK_TIMEOUT`].
    #[error("ack timeout waiting for offset {awaited}")]
    AckTimeout {
        /// The offset the sender was waiting to see acknowledged.
        awaited: u64,
    },

    /// The receiver's recomputed SHA-256 did not match the announced hash.
    #[error("hash mismatch: expected {expected:x?}, got {actual:x?}")]
    HashMismatch {
        /// Hash from `FileMetadata`.
        expected: [u8; 32],
        /// Hash recomputed from received bytes.
        actual: [u8; 32],
    },

    /// The peer-facing channel closed before the transfer finished.
    #[error("transfer channel closed")]
    ChannelClosed,
}

/// Result type for transfer operations.
pub type Result<T> = std::result::Result<T, TransferError>;

/// Metadata a sender announces before streaming a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    /// Fresh UUID identifying this transfer; also the HKDF info input for
    /// the per-transfer subkey.
    pub transfer_id: Uuid,
    /// Original file name.
    pub filename: String,
    /// File size in bytes.
    pub size_bytes: u64,
    /// SHA-256 of the whole plaintext file.
    pub hash_sha256: [u8; 32],
}

impl FileMetadata {
    /// Build metadata by hashing a file already on disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn from_path(path: &std::path::Path, transfer_id: Uuid) -> Result<Self> {
        let data = std::fs::read(path)?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Self {
            transfer_id,
            filename,
            size_bytes: data.len() as u64,
            hash_sha256: hasher::hash_file(&data),
        })
    }

    /// The transfer id as HKDF info bytes for `derive_transfer_key`.
    #[must_use]
    pub fn transfer_id_bytes(&self) -> [u8; 16] {
        *self.transfer_id.as_bytes()
    }
}

/// Out-of-band control messages for the announce/request/ack handshake,
/// carried over the normal chat channel rather than the bulk `file/1` stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FileControl {
    /// Receiver accepts an announced transfer and asks the sender to open
    /// the bulk stream.
    DownloadRequest {
        /// The transfer being requested.
        transfer_id: Uuid,
    },
    /// Receiver acknowledges bytes written so far. A later ack with a
    /// higher offset supersedes any earlier one still in flight.
    ChunkAck {
        /// The transfer being acknowledged.
        transfer_id: Uuid,
        /// Total plaintext bytes received so far.
        acknowledged_offset: u64,
    },
}

/// One frame of the bulk `file/1` stream: an encrypted chunk, or — when
/// `is_last_chunk` is set and `ciphertext` is empty — the terminal frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileData {
    /// The transfer this frame belongs to.
    pub transfer_id: Uuid,
    /// AES-256-GCM ciphertext (tag included), empty for the terminal frame.
    pub ciphertext: Vec<u8>,
    /// Nonce used for this frame. Never reused under the same key.
    pub nonce: [u8; 12],
    /// Whether this is the terminal frame.
    pub is_last_chunk: bool,
}

impl FileData {
    /// Encode a frame for the wire.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails (never happens for this type).
    pub fn encode(&self) -> Result<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| TransferError::Io(std::io::Error::other(e.to_string())))
    }

    /// Decode a frame read off the wire.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a valid encoded `FileData`.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes)
            .map_err(|e| TransferError::Io(std::io::Error::other(e.to_string())))
    }
}

/// Per-transfer bookkeeping held by the controller alongside its stream.
#[derive(Debug, Clone)]
pub struct TransferState {
    /// Whether the local peer is the receiver (`true`) or sender (`false`).
    pub is_incoming: bool,
    /// On-disk path: source file for a sender, destination for a receiver.
    pub file_path: PathBuf,
    /// Announced metadata.
    pub metadata: FileMetadata,
    /// The controller's stream id once the bulk stream is open.
    pub stream_id: Option<u64>,
    /// Current lifecycle status.
    pub status: TransferStatus,
}

impl TransferState {
    /// State for a transfer this peer is sending.
    #[must_use]
    pub fn new_outgoing(file_path: PathBuf, metadata: FileMetadata) -> Self {
        Self {
            is_incoming: false,
            file_path,
            metadata,
            stream_id: None,
            status: TransferStatus::Announced,
        }
    }

    /// State for a transfer this peer is receiving.
    #[must_use]
    pub fn new_incoming(file_path: PathBuf, metadata: FileMetadata) -> Self {
        Self {
            is_incoming: true,
            file_path,
            metadata,
            stream_id: None,
            status: TransferStatus::Announced,
        }
    }

    /// Direction from the local peer's perspective.
    #[must_use]
    pub fn direction(&self) -> TransferDirection {
        if self.is_incoming {
            TransferDirection::Receive
        } else {
            TransferDirection::Send
        }
    }
}

/// Sends a file as a sequence of encrypted, windowed chunks.
///
/// One [`WindowedSender`] drives one transfer to completion or failure;
/// `outgoing` carries [`FileData`] frames out to the `file/1` stream and
/// `acks` delivers `acknowledged_offset` values as `ChunkAck`s arrive.
pub struct WindowedSender {
    transfer_id: Uuid,
    key: AeadKey,
    chunker: FileChunker,
    outgoing: mpsc::Sender<FileData>,
    acks: mpsc::Receiver<u64>,
}

impl WindowedSender {
    /// Build a sender over an already-opened file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(
        transfer_id: Uuid,
        path: &std::path::Path,
        key: AeadKey,
        outgoing: mpsc::Sender<FileData>,
        acks: mpsc::Receiver<u64>,
    ) -> Result<Self> {
        let chunker = FileChunker::new(path, MAX_CHUNK_SIZE)?;
        Ok(Self {
            transfer_id,
            key,
            chunker,
            outgoing,
            acks,
        })
    }

    /// Stream the whole file: encrypt each chunk, respect the sliding
    /// window, and wait out acknowledgements. Returns once the final ACK
    /// for the complete length has arrived.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::AckTimeout`] if no ACK arrives within
    /// [`ACK_TIMEOUT`], or a crypto/I/O/channel error.
    pub async fn run<R: RngCore + CryptoRng>(mut self, rng: &mut R) -> Result<()> {
        let total_size = self.chunker.total_size();
        let mut sent: u64 = 0;
        let mut acked: u64 = 0;
        let mut window_start: u64 = 0;

        loop {
            let chunk = self.chunker.read_chunk()?;
            let is_last = chunk.is_none();
            let plaintext = chunk.unwrap_or_default();

            let nonce = aead::random_nonce(rng);
            let ciphertext = aead::encrypt(&self.key, &nonce, &plaintext, self.aad())?;
            let frame = FileData {
                transfer_id: self.transfer_id,
                ciphertext,
                nonce,
                is_last_chunk: is_last,
            };

            sent += plaintext.len() as u64;
            self.outgoing
                .send(frame)
                .await
                .map_err(|_| TransferError::ChannelClosed)?;

            if is_last {
                break;
            }

            if sent - window_start >= WINDOW_SIZE {
                tracing::debug!(transfer_id = %self.transfer_id, sent, "window full, awaiting ack");
                acked = self.await_ack(sent).await?;
                window_start = acked;
            }
        }

        // Drain acks until the sender has confirmation for the full length.
        while acked < total_size {
            acked = self.await_ack(total_size).await?;
        }

        tracing::info!(transfer_id = %self.transfer_id, total_size, "transfer sent");
        Ok(())
    }

    fn aad(&self) -> &[u8] {
        self.transfer_id.as_bytes()
    }

    async fn await_ack(&mut self, awaited: u64) -> Result<u64> {
        match timeout(ACK_TIMEOUT, self.acks.recv()).await {
            Ok(Some(offset)) => Ok(offset),
            Ok(None) => Err(TransferError::ChannelClosed),
            Err(_) => Err(TransferError::AckTimeout { awaited }),
        }
    }
}

/// Receives a windowed, encrypted file stream and verifies it end-to-end.
pub struct WindowedReceiver {
    transfer_id: Uuid,
    key: AeadKey,
    reassembler: FileReassembler,
    incoming: mpsc::Receiver<FileData>,
    acks: mpsc::Sender<u64>,
    hasher: ember_crypto::hash::StreamHasher,
    since_last_ack: u64,
}

impl WindowedReceiver {
    /// Build a receiver that will write into a freshly pre-allocated file.
    ///
    /// # Errors
    ///
    /// Returns an error if the destination file cannot be created.
    pub fn new(
        transfer_id: Uuid,
        path: &std::path::Path,
        total_size: u64,
        key: AeadKey,
        incoming: mpsc::Receiver<FileData>,
        acks: mpsc::Sender<u64>,
    ) -> Result<Self> {
        let reassembler = FileReassembler::new(path, total_size)?;
        Ok(Self {
            transfer_id,
            key,
            reassembler,
            incoming,
            acks,
            hasher: ember_crypto::hash::StreamHasher::new(),
            since_last_ack: 0,
        })
    }

    /// Consume frames until the terminal chunk, verifying the end-to-end
    /// hash against `expected_hash` before returning.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::HashMismatch`] if the recomputed hash
    /// differs, or a crypto/I/O/channel error.
    pub async fn run(mut self, expected_hash: [u8; 32]) -> Result<()> {
        loop {
            let frame = self.incoming.recv().await.ok_or(TransferError::ChannelClosed)?;

            if frame.is_last_chunk {
                self.send_ack().await?;
                break;
            }

            let plaintext = aead::decrypt(&self.key, &frame.nonce, &frame.ciphertext, self.aad())?;
            self.hasher.update(&plaintext);
            self.reassembler.write_next(&plaintext)?;
            self.since_last_ack += plaintext.len() as u64;

            if self.since_last_ack >= WINDOW_SIZE {
                self.send_ack().await?;
                self.since_last_ack = 0;
            }
        }

        self.reassembler.sync()?;
        let actual = self.hasher.finalize();
        if actual != expected_hash {
            tracing::warn!(transfer_id = %self.transfer_id, "hash mismatch, transfer failed");
            return Err(TransferError::HashMismatch {
                expected: expected_hash,
                actual,
            });
        }

        self.reassembler.finalize()?;
        tracing::info!(transfer_id = %self.transfer_id, "transfer completed");
        Ok(())
    }

    fn aad(&self) -> &[u8] {
        self.transfer_id.as_bytes()
    }

    async fn send_ack(&mut self) -> Result<()> {
        self.acks
            .send(self.reassembler.written_bytes())
            .await
            .map_err(|_| TransferError::ChannelClosed)
    }
}
