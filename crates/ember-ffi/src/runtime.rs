//! The process-wide runtime singleton backing every `extern "C"` symbol.
//!
//! Spec §9 frames the node, discovery, controller, dispatcher, and every
//! service as process-wide singletons, with the advice that "a systems
//! language port should make these fields of a single root holder
//! initialized in `start` and dropped in `stop`". [`EmberRuntime`] is that
//! holder; [`RUNTIME`] is the only actual global, and it holds nothing
//! until [`ember_start`](crate::ember_start) runs.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};

use dashmap::{DashMap, DashSet};
use ember_contact::session_manager::SessionManager;
use ember_contact::{CommandPipeline, Contact, ContactStatus, ContactStore, Profile};
use ember_core::node::config::NodeConfig;
use ember_core::node::node::Node;
use ember_core::{Dialer, DiscoveryHandle, OverlayTransport};
use ember_crypto::identity::{Identity, PeerId};
use ember_discovery::manager::{DiscoveryConfig as RendezvousConfig, DiscoveryManager};
use ember_transport::udp_overlay::UdpOverlay;
use rand_core::OsRng;
use tokio::runtime::Runtime;

use crate::error::{EmberError, EmberErrorCode};
use crate::types::ChatHistoryEntry;

/// Fixed rendezvous tag every runtime instance advertises under. Spec §5
/// has no notion of separate swarms; one process-wide tag is enough for a
/// single logical network.
const RENDEZVOUS_TAG: &str = "ember-rendezvous-v1";

/// Maximum number of chat lines retained per peer by the in-process
/// history buffer. `get_chat_history`'s persisted form is explicitly out
/// of scope (spec §6: "delegates to persistence"); this keeps enough
/// recent context to be useful without the library owning a database.
const CHAT_HISTORY_CAPACITY: usize = 500;

static RUNTIME: OnceLock<std::sync::Mutex<Option<EmberRuntime>>> = OnceLock::new();

fn slot() -> &'static std::sync::Mutex<Option<EmberRuntime>> {
    RUNTIME.get_or_init(|| std::sync::Mutex::new(None))
}

/// The singleton's contents: identity, node, contact book, and the small
/// amount of bookkeeping the library API table needs (chat history,
/// protected peers, reconnect counters) that has no other natural home.
pub(crate) struct EmberRuntime {
    pub(crate) tokio: Runtime,
    pub(crate) node: Arc<Node>,
    pub(crate) profile: std::sync::RwLock<Profile>,
    pub(crate) contacts: Arc<ContactStore>,
    pub(crate) sessions: Arc<SessionManager>,
    pub(crate) command_pipeline: Arc<CommandPipeline>,
    pub(crate) chat_history: DashMap<PeerId, Vec<ChatHistoryEntry>>,
    pub(crate) protected_peers: DashSet<PeerId>,
    pub(crate) auto_reconnect: std::sync::atomic::AtomicBool,
    pub(crate) reconnect_attempts: DashMap<PeerId, AtomicU32>,
}

impl EmberRuntime {
    fn new(identity: Identity, config: NodeConfig) -> Result<Self, EmberError> {
        let tokio = Runtime::new().map_err(|e| EmberError::internal(e.to_string()))?;
        let peer_id = identity.peer_id();
        let listen_addr = config.listen_addr;

        let node = tokio.block_on(async {
            let transport = Arc::new(
                UdpOverlay::bind(listen_addr)
                    .await
                    .map_err(|e| EmberError::internal(e.to_string()))?,
            );
            let bound_addr = transport
                .local_addr()
                .map_err(|e| EmberError::internal(e.to_string()))?;

            let rendezvous_config =
                RendezvousConfig::new(peer_id, bound_addr, RENDEZVOUS_TAG.to_string());
            let (discovery, _discovered_rx) = DiscoveryManager::new(rendezvous_config);
            let discovery = Arc::new(discovery);
            if let Err(err) = discovery.start().await {
                tracing::warn!(%err, "discovery manager failed to start");
            }

            let node = Arc::new(Node::with_full_backends(
                config,
                identity,
                Some(discovery as Arc<dyn DiscoveryHandle>),
                Some(Arc::clone(&transport) as Arc<dyn Dialer>),
                Some(transport as Arc<dyn OverlayTransport>),
            ));
            node.start();

            let receive_node = Arc::clone(&node);
            tokio::spawn(async move {
                if let Err(err) = receive_node.run_receive_loop().await {
                    tracing::warn!(%err, "node receive loop exited");
                }
            });

            Ok::<_, EmberError>(node)
        })?;
        let profile = Profile::new(peer_id.to_base32(), &peer_id);
        let contacts = Arc::new(ContactStore::new());
        let sessions = Arc::new(SessionManager::new());
        let command_pipeline = Arc::new(CommandPipeline::new(
            Arc::clone(node.identity()),
            Arc::clone(&sessions),
            Arc::clone(&contacts),
            Arc::clone(node.controller()),
        ));
        tokio.block_on(async {
            if let Some(events) = node.controller().take_event_receiver().await {
                let pipeline = Arc::clone(&command_pipeline);
                tokio::spawn(pipeline.run(events));
            }
        });
        Ok(Self {
            tokio,
            node,
            profile: std::sync::RwLock::new(profile),
            contacts,
            sessions,
            command_pipeline,
            chat_history: DashMap::new(),
            protected_peers: DashSet::new(),
            auto_reconnect: std::sync::atomic::AtomicBool::new(false),
            reconnect_attempts: DashMap::new(),
        })
    }

    pub(crate) fn record_chat(&self, peer_id: PeerId, outgoing: bool, body: String) {
        let mut history = self.chat_history.entry(peer_id).or_default();
        if history.len() >= CHAT_HISTORY_CAPACITY {
            history.remove(0);
        }
        history.push(ChatHistoryEntry { outgoing, body });
    }
}

/// Start the runtime with a freshly generated identity.
///
/// # Errors
///
/// Returns [`EmberErrorCode::AlreadyInitialized`] if a runtime is already
/// running.
pub(crate) fn start() -> Result<(), EmberError> {
    start_with_identity(Identity::generate(&mut OsRng))
}

/// Start the runtime restoring `identity`.
///
/// # Errors
///
/// Returns [`EmberErrorCode::AlreadyInitialized`] if a runtime is already
/// running.
pub(crate) fn start_with_identity(identity: Identity) -> Result<(), EmberError> {
    let mut guard = slot().lock().expect("runtime mutex poisoned");
    if guard.is_some() {
        return Err(EmberError::new(
            EmberErrorCode::AlreadyInitialized,
            "ember runtime is already started",
        ));
    }
    *guard = Some(EmberRuntime::new(identity, NodeConfig::default())?);
    Ok(())
}

/// Stop the runtime, tearing down the node and dropping identity material.
///
/// Matches the ordering spec §9 calls for under "Stop hazard": flip the
/// running flag (inside `Node::stop`) before anything else observes it,
/// then drop the holder, releasing the controller's streams and finally
/// the identity.
///
/// # Errors
///
/// Returns [`EmberErrorCode::NotInitialized`] if no runtime is running.
pub(crate) fn stop() -> Result<(), EmberError> {
    let mut guard = slot().lock().expect("runtime mutex poisoned");
    match guard.take() {
        Some(runtime) => {
            runtime.node.stop();
            drop(runtime);
            Ok(())
        }
        None => Err(EmberError::not_initialized()),
    }
}

/// Run `f` against the live runtime, or return [`EmberError::not_initialized`].
pub(crate) fn with_runtime<T>(f: impl FnOnce(&EmberRuntime) -> Result<T, EmberError>) -> Result<T, EmberError> {
    let guard = slot().lock().expect("runtime mutex poisoned");
    match guard.as_ref() {
        Some(runtime) => f(runtime),
        None => Err(EmberError::not_initialized()),
    }
}

/// Ensure a contact entry exists for `peer_id`, creating an `Unknown`
/// placeholder profile if this is the first time the runtime has heard of
/// this peer.
pub(crate) fn ensure_contact(runtime: &EmberRuntime, peer_id: PeerId) {
    if runtime.contacts.get(&peer_id).is_none() {
        let profile = Profile::new(peer_id.to_base32(), &peer_id);
        runtime
            .contacts
            .upsert(Contact::from_profile(peer_id, &profile, ContactStatus::Unknown));
    }
}

pub(crate) fn reconnect_attempts_for(runtime: &EmberRuntime, peer_id: &PeerId) -> u32 {
    runtime
        .reconnect_attempts
        .get(peer_id)
        .map(|counter| counter.load(Ordering::SeqCst))
        .unwrap_or(0)
}
