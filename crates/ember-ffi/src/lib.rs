//! # ember-ffi — C-compatible bindings for the Ember P2P messenger core
//!
//! Exposes the library API table of spec §6 as a stable C ABI: a single
//! process-wide [`runtime::EmberRuntime`] started by [`ember_start`] (or
//! [`ember_start_with_key`]) and torn down by [`ember_stop`]. Every other
//! symbol operates on that singleton.
//!
//! ## Error convention
//!
//! Every fallible symbol returns `0` on success and a non-zero
//! [`error::EmberErrorCode`] on failure. Failing calls that take an
//! `error_out: *mut *mut c_char` parameter write a human-readable message
//! there (when non-null); the caller must release it with
//! [`ember_free_string`].
//!
//! ## Memory
//!
//! Every string this crate returns is heap-allocated and must be released
//! through [`ember_free_string`]; this crate owns no other FFI-visible
//! heap allocation (there are no opaque handles — state lives entirely
//! behind the singleton).

#![allow(unsafe_op_in_unsafe_fn)]

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rand_core::OsRng;

pub mod error;
pub mod logging;
pub mod runtime;
pub mod types;

pub use error::{EmberError, EmberErrorCode};

use crate::error::ffi_try;
use crate::runtime::EmberRuntime;
use crate::types::{
    parse_peer_id, status_label, ChatHistoryEntry, ConnectionQualityResponse, ConnectionStatusResponse,
    KeyPairResponse, NetworkStatsResponse, PeerAddressResponse, PeerSummary, ProfileResponse,
};
use ember_contact::{Contact, ContactStatus, Profile};
use ember_crypto::identity::Identity;

unsafe fn read_c_string(ptr: *const c_char) -> Result<String, EmberError> {
    if ptr.is_null() {
        return Err(EmberError::invalid_argument("null string argument"));
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map(str::to_owned)
        .map_err(|_| EmberError::invalid_argument("argument is not valid UTF-8"))
}

fn write_string(value: impl Into<String>) -> *mut c_char {
    CString::new(value.into())
        .unwrap_or_else(|_| CString::new("<embedded NUL>").unwrap())
        .into_raw()
}

fn write_json<T: serde::Serialize>(value: &T) -> Result<*mut c_char, EmberError> {
    serde_json::to_string(value)
        .map(write_string)
        .map_err(|e| EmberError::internal(e.to_string()))
}

/// Free a string returned by any function in this crate.
///
/// # Safety
///
/// `s` must be a pointer previously returned by this crate, not freed
/// already, and not used again after this call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ember_free_string(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}

/// Start the runtime with a freshly generated identity.
///
/// # Safety
///
/// `error_out` must be null or a valid pointer to write an error string to.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ember_start(error_out: *mut *mut c_char) -> c_int {
    logging::init();
    ffi_try!(runtime::start(), error_out);
    EmberErrorCode::Success as c_int
}

/// Start the runtime restoring a previously generated identity from its
/// raw 32-byte Ed25519 seed.
///
/// # Safety
///
/// `key_bytes` must point to `len` readable bytes; `error_out` as above.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ember_start_with_key(
    key_bytes: *const u8,
    len: usize,
    error_out: *mut *mut c_char,
) -> c_int {
    logging::init();
    if key_bytes.is_null() || len != 32 {
        let err = EmberError::invalid_argument("key must be exactly 32 bytes");
        if !error_out.is_null() {
            *error_out = err.to_c_string();
        }
        return err.code() as c_int;
    }
    let mut seed = [0u8; 32];
    seed.copy_from_slice(std::slice::from_raw_parts(key_bytes, 32));
    ffi_try!(runtime::start_with_identity(Identity::from_seed(&seed)), error_out);
    EmberErrorCode::Success as c_int
}

/// Stop the runtime (spec §9: known-racy under concurrent traffic).
///
/// # Safety
///
/// `error_out` as above.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ember_stop(error_out: *mut *mut c_char) -> c_int {
    ffi_try!(runtime::stop(), error_out);
    EmberErrorCode::Success as c_int
}

/// Generate a fresh Ed25519 identity without starting the runtime; returns
/// base64-wrapped JSON `{private_key, peer_id, key_type, key_length}`.
///
/// # Safety
///
/// `error_out` as above; the returned pointer must be freed with
/// [`ember_free_string`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ember_generate_new_key_pair(error_out: *mut *mut c_char) -> *mut c_char {
    let identity = Identity::generate(&mut OsRng);
    let response = KeyPairResponse {
        private_key: BASE64.encode(identity.seed_bytes()),
        peer_id: identity.peer_id().to_base32(),
        key_type: "Ed25519".to_string(),
        key_length: identity.seed_bytes().len(),
    };
    match write_json(&response) {
        Ok(ptr) => ptr,
        Err(err) => {
            if !error_out.is_null() {
                *error_out = err.to_c_string();
            }
            std::ptr::null_mut()
        }
    }
}

/// Generate a fresh Ed25519 identity and return its raw private key bytes,
/// base64-encoded, with no JSON wrapper.
///
/// # Safety
///
/// As [`ember_generate_new_key_pair`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ember_generate_new_key_bytes(_error_out: *mut *mut c_char) -> *mut c_char {
    let identity = Identity::generate(&mut OsRng);
    write_string(BASE64.encode(identity.seed_bytes()))
}

/// This node's Peer ID, base32 text form.
///
/// # Safety
///
/// `error_out` as above.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ember_get_my_peer_id(error_out: *mut *mut c_char) -> *mut c_char {
    let result = runtime::with_runtime(|rt| Ok(rt.node.peer_id().to_base32()));
    match result {
        Ok(peer_id) => write_string(peer_id),
        Err(err) => {
            if !error_out.is_null() {
                *error_out = err.to_c_string();
            }
            std::ptr::null_mut()
        }
    }
}

/// This node's own profile as JSON `{nickname, discriminator, full_address}`.
///
/// # Safety
///
/// `error_out` as above.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ember_get_my_profile(error_out: *mut *mut c_char) -> *mut c_char {
    let result = runtime::with_runtime(|rt| {
        let profile = rt.profile.read().expect("profile lock poisoned").clone();
        Ok(ProfileResponse {
            full_address: profile.full_address(),
            nickname: profile.nickname,
            discriminator: profile.discriminator,
        })
    })
    .and_then(|response| write_json(&response));
    match result {
        Ok(ptr) => ptr,
        Err(err) => {
            if !error_out.is_null() {
                *error_out = err.to_c_string();
            }
            std::ptr::null_mut()
        }
    }
}

/// Update this node's own nickname, keeping its discriminator stable.
///
/// # Safety
///
/// `nickname` must be a valid, non-null C string; `error_out` as above.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ember_update_my_profile(
    nickname: *const c_char,
    error_out: *mut *mut c_char,
) -> c_int {
    let nickname = ffi_try!(read_c_string(nickname), error_out);
    ffi_try!(
        runtime::with_runtime(|rt| {
            let peer_id = rt.node.peer_id();
            let mut profile = rt.profile.write().expect("profile lock poisoned");
            *profile = Profile::new(nickname.clone(), &peer_id);
            Ok(())
        }),
        error_out
    );
    EmberErrorCode::Success as c_int
}

/// All known contacts, as a JSON array of `PeerSummary`.
///
/// # Safety
///
/// `error_out` as above.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ember_get_connected_peers(error_out: *mut *mut c_char) -> *mut c_char {
    let result = runtime::with_runtime(|rt| {
        let peers: Vec<PeerSummary> = rt
            .contacts
            .all()
            .into_iter()
            .map(|contact| contact_summary(rt, &contact))
            .collect();
        Ok(peers)
    })
    .and_then(|peers| write_json(&peers));
    match result {
        Ok(ptr) => ptr,
        Err(err) => {
            if !error_out.is_null() {
                *error_out = err.to_c_string();
            }
            std::ptr::null_mut()
        }
    }
}

fn contact_summary(rt: &EmberRuntime, contact: &Contact) -> PeerSummary {
    PeerSummary {
        peer_id: contact.peer_id.to_base32(),
        nickname: (contact.status != ContactStatus::Unknown).then(|| contact.nickname.clone()),
        status: status_label(contact.status).to_string(),
        protected: rt.protected_peers.contains(&contact.peer_id),
    }
}

/// Overall connection status, as JSON `{running, peer_id, connected_peer_count}`.
///
/// # Safety
///
/// `error_out` as above.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ember_get_connection_status(error_out: *mut *mut c_char) -> *mut c_char {
    let result = runtime::with_runtime(|rt| {
        Ok(ConnectionStatusResponse {
            running: rt.node.is_running(),
            peer_id: Some(rt.node.peer_id().to_base32()),
            connected_peer_count: rt.node.routing().active_routes().len(),
        })
    })
    .and_then(|response| write_json(&response));
    match result {
        Ok(ptr) => ptr,
        Err(err) => {
            if !error_out.is_null() {
                *error_out = err.to_c_string();
            }
            std::ptr::null_mut()
        }
    }
}

/// Network-wide telemetry, as JSON `{open_stream_count, connected_peer_count, known_contact_count}`.
///
/// # Safety
///
/// `error_out` as above.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ember_get_network_stats(error_out: *mut *mut c_char) -> *mut c_char {
    let result = runtime::with_runtime(|rt| {
        Ok(NetworkStatsResponse {
            open_stream_count: rt.node.controller().open_stream_count(),
            connected_peer_count: rt.node.routing().active_routes().len(),
            known_contact_count: rt.contacts.all().len(),
        })
    })
    .and_then(|response| write_json(&response));
    match result {
        Ok(ptr) => ptr,
        Err(err) => {
            if !error_out.is_null() {
                *error_out = err.to_c_string();
            }
            std::ptr::null_mut()
        }
    }
}

/// Per-peer connection quality, as JSON `{peer_id, reachable, reconnect_attempts}`.
///
/// # Safety
///
/// `peer_id` must be a valid, non-null C string; `error_out` as above.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ember_get_connection_quality(
    peer_id: *const c_char,
    error_out: *mut *mut c_char,
) -> *mut c_char {
    let result = (|| {
        let peer_id_text = read_c_string(peer_id)?;
        let peer_id = parse_peer_id(&peer_id_text)?;
        runtime::with_runtime(|rt| {
            Ok(ConnectionQualityResponse {
                peer_id: peer_id.to_base32(),
                reachable: rt.node.routing().has_route(&peer_id),
                reconnect_attempts: runtime::reconnect_attempts_for(rt, &peer_id),
            })
        })
    })()
    .and_then(|response| write_json(&response));
    match result {
        Ok(ptr) => ptr,
        Err(err) => {
            if !error_out.is_null() {
                *error_out = err.to_c_string();
            }
            std::ptr::null_mut()
        }
    }
}

/// Run the reachability ladder against `peer_id` after resolving its
/// address through the discovery backend.
///
/// # Safety
///
/// `peer_id` must be a valid, non-null C string; `error_out` as above.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ember_connect_to_peer(
    peer_id: *const c_char,
    error_out: *mut *mut c_char,
) -> c_int {
    let peer_id_text = ffi_try!(read_c_string(peer_id), error_out);
    let peer_id = ffi_try!(parse_peer_id(&peer_id_text), error_out);
    ffi_try!(
        runtime::with_runtime(|rt| {
            let addr_info = rt
                .tokio
                .block_on(rt.node.controller().find_peer(&peer_id))
                .map_err(EmberError::from)?;
            let addr = addr_info
                .addresses
                .first()
                .copied()
                .ok_or_else(|| EmberError::new(EmberErrorCode::Unreachable, "discovery returned no addresses"))?;
            rt.tokio
                .block_on(rt.node.connect(peer_id, addr))
                .map_err(EmberError::from)?;
            runtime::ensure_contact(rt, peer_id);
            if !rt.sessions.contains(&ember_contact::ContextId::for_pair(&rt.node.peer_id(), &peer_id)) {
                let profile = rt.profile.read().expect("profile lock poisoned").clone();
                if let Err(err) = rt.tokio.block_on(rt.command_pipeline.initiate_contact(peer_id, profile)) {
                    tracing::debug!(peer = %peer_id, error = %err, "context initiate failed after connect");
                }
            }
            Ok(())
        }),
        error_out
    );
    EmberErrorCode::Success as c_int
}

/// Resolve `peer_id`'s current addresses via the discovery backend, as
/// JSON `{peer_id, addresses}`.
///
/// # Safety
///
/// `peer_id` must be a valid, non-null C string; `error_out` as above.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ember_find_peer(peer_id: *const c_char, error_out: *mut *mut c_char) -> *mut c_char {
    let result = (|| {
        let peer_id_text = read_c_string(peer_id)?;
        let peer_id = parse_peer_id(&peer_id_text)?;
        runtime::with_runtime(|rt| {
            let addr_info = rt
                .tokio
                .block_on(rt.node.controller().find_peer(&peer_id))
                .map_err(EmberError::from)?;
            Ok(PeerAddressResponse::from(addr_info))
        })
    })()
    .and_then(|response| write_json(&response));
    match result {
        Ok(ptr) => ptr,
        Err(err) => {
            if !error_out.is_null() {
                *error_out = err.to_c_string();
            }
            std::ptr::null_mut()
        }
    }
}

/// Resolve a peer by `nickname#discriminator` full address, or bare
/// nickname if exactly one contact matches, as JSON `PeerSummary`.
///
/// # Safety
///
/// `nickname` must be a valid, non-null C string; `error_out` as above.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ember_find_peer_by_nickname(
    nickname: *const c_char,
    error_out: *mut *mut c_char,
) -> *mut c_char {
    let result = (|| {
        let query = read_c_string(nickname)?;
        runtime::with_runtime(|rt| {
            let matches: Vec<Contact> = rt
                .contacts
                .all()
                .into_iter()
                .filter(|contact| contact.full_address() == query || contact.nickname == query)
                .collect();
            match matches.as_slice() {
                [one] => Ok(contact_summary(rt, one)),
                [] => Err(EmberError::new(EmberErrorCode::NotFound, format!("no contact matches {query}"))),
                _ => Err(EmberError::new(
                    EmberErrorCode::InvalidArgument,
                    format!("nickname {query} is ambiguous; use the full address"),
                )),
            }
        })
    })()
    .and_then(|response| write_json(&response));
    match result {
        Ok(ptr) => ptr,
        Err(err) => {
            if !error_out.is_null() {
                *error_out = err.to_c_string();
            }
            std::ptr::null_mut()
        }
    }
}

/// Broadcast `text` to every peer with an active session.
///
/// # Safety
///
/// `text` must be a valid, non-null C string; `error_out` as above.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ember_send_message(text: *const c_char, error_out: *mut *mut c_char) -> c_int {
    let text = ffi_try!(read_c_string(text), error_out);
    ffi_try!(
        runtime::with_runtime(|rt| {
            let payload = ember_contact::ChatContent::Text { body: text.clone() }
                .encode()
                .map_err(EmberError::from)?;
            rt.tokio.block_on(rt.node.controller().broadcast(&payload));
            for peer_id in rt.node.routing().active_routes() {
                rt.record_chat(peer_id, true, text.clone());
            }
            Ok(())
        }),
        error_out
    );
    EmberErrorCode::Success as c_int
}

/// Send `text` to exactly one peer.
///
/// # Safety
///
/// `peer_id` and `text` must be valid, non-null C strings; `error_out` as
/// above.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ember_send_message_to_peer(
    peer_id: *const c_char,
    text: *const c_char,
    error_out: *mut *mut c_char,
) -> c_int {
    let peer_id_text = ffi_try!(read_c_string(peer_id), error_out);
    let peer_id = ffi_try!(parse_peer_id(&peer_id_text), error_out);
    let text = ffi_try!(read_c_string(text), error_out);
    ffi_try!(
        runtime::with_runtime(|rt| {
            let payload = ember_contact::ChatContent::Text { body: text.clone() }
                .encode()
                .map_err(EmberError::from)?;
            rt.tokio
                .block_on(rt.node.controller().send_to_peer(&peer_id, &payload))
                .map_err(EmberError::from)?;
            rt.record_chat(peer_id, true, text);
            Ok(())
        }),
        error_out
    );
    EmberErrorCode::Success as c_int
}

/// Recent chat history with `peer_id`, most recent `limit` entries (`0`
/// for no limit), as a JSON array of `ChatHistoryEntry`.
///
/// # Safety
///
/// `peer_id` must be a valid, non-null C string; `error_out` as above.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ember_get_chat_history(
    peer_id: *const c_char,
    limit: usize,
    error_out: *mut *mut c_char,
) -> *mut c_char {
    let result = (|| {
        let peer_id_text = read_c_string(peer_id)?;
        let peer_id = parse_peer_id(&peer_id_text)?;
        runtime::with_runtime(|rt| {
            let mut history: Vec<ChatHistoryEntry> = rt
                .chat_history
                .get(&peer_id)
                .map(|entries| entries.clone())
                .unwrap_or_default();
            if limit > 0 && history.len() > limit {
                history = history.split_off(history.len() - limit);
            }
            Ok(history)
        })
    })()
    .and_then(|history| write_json(&history));
    match result {
        Ok(ptr) => ptr,
        Err(err) => {
            if !error_out.is_null() {
                *error_out = err.to_c_string();
            }
            std::ptr::null_mut()
        }
    }
}

/// `0` = trace .. `4` = error.
///
/// # Safety
///
/// `error_out` as above.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ember_set_log_level(level: c_int, error_out: *mut *mut c_char) -> c_int {
    logging::init();
    ffi_try!(logging::set_level(level), error_out);
    EmberErrorCode::Success as c_int
}

/// `0` = stderr, `1` = stdout, `2` = file at `dir`, `3` = discard.
///
/// # Safety
///
/// `dir` must be null or a valid C string; `error_out` as above.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ember_set_log_output(
    mode: c_int,
    dir: *const c_char,
    error_out: *mut *mut c_char,
) -> c_int {
    logging::init();
    let dir = if dir.is_null() {
        None
    } else {
        Some(ffi_try!(read_c_string(dir), error_out))
    };
    ffi_try!(logging::set_output(mode, dir.as_deref()), error_out);
    EmberErrorCode::Success as c_int
}

/// Add `peer_id` to the protected set (spec §9: retried indefinitely with
/// back-off by the auto-reconnect loop).
///
/// # Safety
///
/// `peer_id` must be a valid, non-null C string; `error_out` as above.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ember_add_protected_peer(
    peer_id: *const c_char,
    error_out: *mut *mut c_char,
) -> c_int {
    let peer_id_text = ffi_try!(read_c_string(peer_id), error_out);
    let peer_id = ffi_try!(parse_peer_id(&peer_id_text), error_out);
    ffi_try!(
        runtime::with_runtime(|rt| {
            rt.protected_peers.insert(peer_id);
            Ok(())
        }),
        error_out
    );
    EmberErrorCode::Success as c_int
}

/// Remove `peer_id` from the protected set.
///
/// # Safety
///
/// `peer_id` must be a valid, non-null C string; `error_out` as above.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ember_remove_protected_peer(
    peer_id: *const c_char,
    error_out: *mut *mut c_char,
) -> c_int {
    let peer_id_text = ffi_try!(read_c_string(peer_id), error_out);
    let peer_id = ffi_try!(parse_peer_id(&peer_id_text), error_out);
    ffi_try!(
        runtime::with_runtime(|rt| {
            rt.protected_peers.remove(&peer_id);
            Ok(())
        }),
        error_out
    );
    EmberErrorCode::Success as c_int
}

/// Write `1` to `*out` if `peer_id` is in the protected set, `0` otherwise.
///
/// # Safety
///
/// `peer_id` must be a valid, non-null C string; `out` must be a valid,
/// non-null pointer; `error_out` as above.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ember_is_protected_peer(
    peer_id: *const c_char,
    out: *mut c_int,
    error_out: *mut *mut c_char,
) -> c_int {
    let peer_id_text = ffi_try!(read_c_string(peer_id), error_out);
    let peer_id = ffi_try!(parse_peer_id(&peer_id_text), error_out);
    let protected = ffi_try!(
        runtime::with_runtime(|rt| Ok(rt.protected_peers.contains(&peer_id))),
        error_out
    );
    if !out.is_null() {
        *out = i32::from(protected);
    }
    EmberErrorCode::Success as c_int
}

/// All protected peers, as a JSON array of base32 Peer ID strings.
///
/// # Safety
///
/// `error_out` as above.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ember_get_protected_peers(error_out: *mut *mut c_char) -> *mut c_char {
    let result = runtime::with_runtime(|rt| {
        Ok(rt
            .protected_peers
            .iter()
            .map(|entry| entry.to_base32())
            .collect::<Vec<_>>())
    })
    .and_then(|peers| write_json(&peers));
    match result {
        Ok(ptr) => ptr,
        Err(err) => {
            if !error_out.is_null() {
                *error_out = err.to_c_string();
            }
            std::ptr::null_mut()
        }
    }
}

/// Enable indefinite back-off retry for protected peers.
///
/// # Safety
///
/// `error_out` as above.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ember_enable_auto_reconnect(error_out: *mut *mut c_char) -> c_int {
    ffi_try!(
        runtime::with_runtime(|rt| {
            rt.auto_reconnect.store(true, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }),
        error_out
    );
    EmberErrorCode::Success as c_int
}

/// Disable auto-reconnect.
///
/// # Safety
///
/// `error_out` as above.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ember_disable_auto_reconnect(error_out: *mut *mut c_char) -> c_int {
    ffi_try!(
        runtime::with_runtime(|rt| {
            rt.auto_reconnect.store(false, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }),
        error_out
    );
    EmberErrorCode::Success as c_int
}

/// Write `1` to `*out` if auto-reconnect is enabled, `0` otherwise.
///
/// # Safety
///
/// `out` must be a valid, non-null pointer; `error_out` as above.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ember_is_auto_reconnect_enabled(
    out: *mut c_int,
    error_out: *mut *mut c_char,
) -> c_int {
    let enabled = ffi_try!(
        runtime::with_runtime(|rt| Ok(rt.auto_reconnect.load(std::sync::atomic::Ordering::SeqCst))),
        error_out
    );
    if !out.is_null() {
        *out = i32::from(enabled);
    }
    EmberErrorCode::Success as c_int
}

/// Write the number of consecutive reconnect attempts recorded for
/// `peer_id` to `*out`.
///
/// # Safety
///
/// `peer_id` must be a valid, non-null C string; `out` must be a valid,
/// non-null pointer; `error_out` as above.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ember_get_reconnect_attempts(
    peer_id: *const c_char,
    out: *mut u32,
    error_out: *mut *mut c_char,
) -> c_int {
    let peer_id_text = ffi_try!(read_c_string(peer_id), error_out);
    let peer_id = ffi_try!(parse_peer_id(&peer_id_text), error_out);
    let attempts = ffi_try!(
        runtime::with_runtime(|rt| Ok(runtime::reconnect_attempts_for(rt, &peer_id))),
        error_out
    );
    if !out.is_null() {
        *out = attempts;
    }
    EmberErrorCode::Success as c_int
}
