//! FFI error codes and the boundary error type.
//!
//! Every library symbol in spec §6 returns `0` on success and a non-zero
//! code on failure; detailed diagnostics flow through `tracing`, not the
//! return value. [`EmberErrorCode`] enumerates the kinds named in spec §7.

use std::ffi::CString;
use std::os::raw::c_char;

use thiserror::Error;

/// Integer error codes returned across the FFI boundary. `0` is always
/// success; non-zero values match the error kinds of spec §7.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmberErrorCode {
    /// Operation succeeded.
    Success = 0,
    /// Malformed peer id, bad key bytes, or other bad input.
    InvalidArgument = 1,
    /// No matching peer or content.
    NotFound = 2,
    /// Connect-exhausted: every stage of the reachability ladder failed.
    Unreachable = 3,
    /// The controller does not recognize the given stream id.
    UnknownStream = 4,
    /// The session exists but has not completed its handshake.
    SessionNotActive = 5,
    /// No session exists for the given context.
    NoSession = 6,
    /// Authentication tag mismatch; always treated as hostile.
    CryptoFailed = 7,
    /// Signature verification failed.
    SigInvalid = 8,
    /// Signature valid but derived Peer ID disagrees with the sender.
    PeerIdMismatch = 9,
    /// Command sequence number was not strictly increasing.
    SequenceViolation = 10,
    /// Operation exceeded its deadline.
    Timeout = 11,
    /// Operation was cancelled by a shutdown.
    Cancelled = 12,
    /// The node has not been started.
    NotInitialized = 13,
    /// `start`/`start_with_key` called while already running.
    AlreadyInitialized = 14,
    /// Unspecified internal failure.
    InternalError = 99,
}

/// The FFI boundary's error type; every fallible library call produces one
/// of these, which [`EmberError::to_c_string`] renders for the logging
/// facility and [`EmberError::code`] reduces to the integer-return
/// convention of spec §6.
#[derive(Debug, Error, Clone)]
#[error("{message}")]
pub struct EmberError {
    code: EmberErrorCode,
    message: String,
}

impl EmberError {
    /// Build an error with an explicit code and message.
    #[must_use]
    pub fn new(code: EmberErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// [`EmberErrorCode::InvalidArgument`] helper.
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(EmberErrorCode::InvalidArgument, message)
    }

    /// [`EmberErrorCode::NotInitialized`] helper.
    #[must_use]
    pub fn not_initialized() -> Self {
        Self::new(EmberErrorCode::NotInitialized, "node is not running")
    }

    /// [`EmberErrorCode::InternalError`] helper.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(EmberErrorCode::InternalError, message)
    }

    /// This error's integer code.
    #[must_use]
    pub fn code(&self) -> EmberErrorCode {
        self.code
    }

    /// Render as a heap-allocated C string for an `error_out` parameter.
    /// Falls back to a fixed message if `message` contains an interior NUL.
    #[must_use]
    pub fn to_c_string(&self) -> *mut c_char {
        CString::new(self.message.clone())
            .unwrap_or_else(|_| CString::new("invalid error message").unwrap())
            .into_raw()
    }
}

impl From<ember_core::node::error::NodeError> for EmberError {
    fn from(err: ember_core::node::error::NodeError) -> Self {
        use ember_core::node::error::NodeError as E;
        let code = match &err {
            E::PeerNotFound(_) | E::SessionNotFound(_) | E::TransferNotFound(_) => {
                EmberErrorCode::NotFound
            }
            E::Transport(_) | E::TransportInit(_) | E::NatTraversal(_) => {
                EmberErrorCode::Unreachable
            }
            E::Discovery(_) => EmberErrorCode::NotFound,
            E::Crypto(_) | E::HashMismatch => EmberErrorCode::CryptoFailed,
            E::Handshake(_) | E::SessionEstablishment(_) => EmberErrorCode::CryptoFailed,
            E::InvalidState(_) | E::InvalidConfig(_) => EmberErrorCode::InvalidArgument,
            E::Timeout(_) => EmberErrorCode::Timeout,
            E::Transfer(_)
            | E::Io(_)
            | E::TaskJoin(_)
            | E::Channel(_)
            | E::Serialization(_)
            | E::Other(_) => EmberErrorCode::InternalError,
        };
        Self::new(code, err.to_string())
    }
}

impl From<ember_contact::ContactError> for EmberError {
    fn from(err: ember_contact::ContactError) -> Self {
        use ember_contact::ContactError as E;
        let code = match &err {
            E::InvalidArgument(_) => EmberErrorCode::InvalidArgument,
            E::NotFound(_) => EmberErrorCode::NotFound,
            E::SigInvalid => EmberErrorCode::SigInvalid,
            E::PeerIdMismatch => EmberErrorCode::PeerIdMismatch,
            E::SequenceViolation => EmberErrorCode::SequenceViolation,
            E::NoSession => EmberErrorCode::NoSession,
            E::NotActive => EmberErrorCode::SessionNotActive,
            E::CryptoFailed(_) => EmberErrorCode::CryptoFailed,
            E::InvalidState(_) => EmberErrorCode::InvalidArgument,
        };
        Self::new(code, err.to_string())
    }
}

impl From<ember_crypto::CryptoError> for EmberError {
    fn from(err: ember_crypto::CryptoError) -> Self {
        Self::new(EmberErrorCode::CryptoFailed, err.to_string())
    }
}

/// Run a fallible expression; on `Err`, write its message to `error_out`
/// (if non-null) and `return` the error's integer code from the enclosing
/// function.
macro_rules! ffi_try {
    ($expr:expr, $error_out:expr) => {
        match $expr {
            Ok(value) => value,
            Err(err) => {
                let err: $crate::error::EmberError = err.into();
                if !$error_out.is_null() {
                    unsafe {
                        *$error_out = err.to_c_string();
                    }
                }
                return err.code() as std::os::raw::c_int;
            }
        }
    };
}

pub(crate) use ffi_try;
