//! Call signaling (L10): Offer/Answer/Candidate/Hangup state machine.
//!
//! The core only terminates the signaling state machine and buffers
//! out-of-order ICE candidates; SDP generation/application and the RTP
//! media plane are delegated to an external WebRTC engine through the
//! [`MediaEngine`] trait.

use std::collections::HashMap;

use ember_crypto::identity::PeerId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ContactError, Result};

/// Identifies one call attempt, stable across its Offer/Answer/Candidate
/// exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallId(Uuid);

impl CallId {
    /// Allocate a fresh call id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CallId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Wire payload for call-signaling traffic, tagged [`crate::envelope`]-style
/// but transmitted unencrypted over the dispatcher's `Signaling` message
/// type (spec §4.4) since signaling must work before a session exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SignalingMessage {
    /// Proposes a call; carries the offering side's SDP.
    CallOffer { call_id: CallId, sdp: String },
    /// Accepts a call; carries the answering side's SDP.
    CallAnswer { call_id: CallId, sdp: String },
    /// One ICE candidate, trickled as it is gathered.
    CallCandidate { call_id: CallId, candidate: String },
    /// Either side ends the call.
    CallHangup { call_id: CallId },
}

/// Lifecycle state of the call signaling machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    /// No call in progress.
    Idle,
    /// Local side has sent an offer and is awaiting an answer.
    Dialing,
    /// Local side has received an offer and is awaiting local accept.
    Incoming,
    /// Offer and answer both applied; media may flow.
    Connected,
}

/// Abstracts SDP offer/answer generation and application, delegated to an
/// external WebRTC engine. The core never inspects SDP content.
pub trait MediaEngine {
    /// Generate a local offer, blocking until ICE gathering completes.
    fn generate_offer(&self) -> String;
    /// Generate a local answer to a just-applied remote offer, blocking
    /// until ICE gathering completes.
    fn generate_answer(&self) -> String;
    /// Apply a remote offer.
    fn set_remote_offer(&self, sdp: &str);
    /// Apply a remote answer.
    fn set_remote_answer(&self, sdp: &str);
    /// Apply one remote ICE candidate.
    fn add_remote_candidate(&self, candidate: &str);
    /// Tear down the peer connection.
    fn close(&self);
}

/// Per-node call-signaling state machine (spec §3 "Call state", a
/// singleton per node). Exactly one call is tracked at a time; candidates
/// for peers other than the active call's target are buffered separately
/// so they can still be applied if that peer later becomes the call target.
pub struct CallSignaling<M: MediaEngine> {
    engine: M,
    state: CallState,
    call_id: Option<CallId>,
    target_peer_id: Option<PeerId>,
    pending_ice_candidates: HashMap<PeerId, Vec<String>>,
}

impl<M: MediaEngine> CallSignaling<M> {
    /// Build a fresh, idle call-signaling machine over `engine`.
    #[must_use]
    pub fn new(engine: M) -> Self {
        Self {
            engine,
            state: CallState::Idle,
            call_id: None,
            target_peer_id: None,
            pending_ice_candidates: HashMap::new(),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> CallState {
        self.state
    }

    /// The in-progress call id, if any.
    #[must_use]
    pub fn call_id(&self) -> Option<CallId> {
        self.call_id
    }

    /// Begin a call to `peer_id`. Legal only from [`CallState::Idle`].
    ///
    /// # Errors
    ///
    /// Returns [`ContactError::InvalidState`] if a call is already in
    /// progress.
    pub fn initiate_call(&mut self, peer_id: PeerId) -> Result<SignalingMessage> {
        if self.state != CallState::Idle {
            return Err(ContactError::invalid_state("call already in progress"));
        }
        let call_id = CallId::new();
        let sdp = self.engine.generate_offer();
        self.call_id = Some(call_id);
        self.target_peer_id = Some(peer_id);
        self.state = CallState::Dialing;
        Ok(SignalingMessage::CallOffer { call_id, sdp })
    }

    /// Record an inbound offer from `peer_id`. Legal only from
    /// [`CallState::Idle`].
    ///
    /// # Errors
    ///
    /// Returns [`ContactError::InvalidState`] if a call is already in
    /// progress.
    pub fn on_offer(&mut self, peer_id: PeerId, call_id: CallId, sdp: &str) -> Result<()> {
        if self.state != CallState::Idle {
            return Err(ContactError::invalid_state("call already in progress"));
        }
        self.engine.set_remote_offer(sdp);
        self.call_id = Some(call_id);
        self.target_peer_id = Some(peer_id);
        self.state = CallState::Incoming;
        Ok(())
    }

    /// Accept an incoming call: generate and send an answer, draining any
    /// candidates that arrived before the offer was set. Legal only from
    /// [`CallState::Incoming`].
    ///
    /// # Errors
    ///
    /// Returns [`ContactError::InvalidState`] if not currently incoming.
    pub fn accept_call(&mut self) -> Result<SignalingMessage> {
        if self.state != CallState::Incoming {
            return Err(ContactError::invalid_state("no incoming call to accept"));
        }
        let call_id = self.call_id.expect("call_id set when incoming");
        self.drain_pending_candidates();
        let sdp = self.engine.generate_answer();
        self.state = CallState::Connected;
        Ok(SignalingMessage::CallAnswer { call_id, sdp })
    }

    /// Record the remote answer to our own offer, draining any candidates
    /// that arrived before it. Legal only from [`CallState::Dialing`].
    ///
    /// # Errors
    ///
    /// Returns [`ContactError::InvalidState`] if not currently dialing.
    pub fn on_answer(&mut self, sdp: &str) -> Result<()> {
        if self.state != CallState::Dialing {
            return Err(ContactError::invalid_state("no outstanding offer"));
        }
        self.engine.set_remote_answer(sdp);
        self.drain_pending_candidates();
        self.state = CallState::Connected;
        Ok(())
    }

    /// Record a remote ICE candidate from `peer_id`. Applied immediately
    /// if the remote description (offer or answer) is already set for the
    /// active call; otherwise buffered in arrival order, applied later by
    /// [`CallSignaling::accept_call`] or [`CallSignaling::on_answer`].
    pub fn on_candidate(&mut self, peer_id: PeerId, candidate: String) {
        // The callee's remote description (the offer) is already applied by
        // the time `on_offer` moves the state to `Incoming`; the caller's
        // remote description (the answer) is not set until `on_answer`
        // moves the state to `Connected`.
        let remote_description_set =
            matches!(self.state, CallState::Incoming | CallState::Connected);
        if remote_description_set {
            self.engine.add_remote_candidate(&candidate);
        } else {
            self.pending_ice_candidates
                .entry(peer_id)
                .or_default()
                .push(candidate);
        }
    }

    fn drain_pending_candidates(&mut self) {
        let Some(target) = self.target_peer_id else {
            return;
        };
        if let Some(candidates) = self.pending_ice_candidates.remove(&target) {
            for candidate in candidates {
                self.engine.add_remote_candidate(&candidate);
            }
        }
    }

    /// End the call from any non-idle state: closes the media engine and
    /// clears all buffered state.
    pub fn hangup(&mut self) -> Option<SignalingMessage> {
        if self.state == CallState::Idle {
            return None;
        }
        let call_id = self.call_id.take();
        self.target_peer_id = None;
        self.pending_ice_candidates.clear();
        self.state = CallState::Idle;
        self.engine.close();
        call_id.map(|call_id| SignalingMessage::CallHangup { call_id })
    }
}
