//! Circuit breaker gating the reachability ladder's repeated dial attempts.
//!
//! Prevents hammering an unreachable peer: after enough consecutive dial
//! failures the circuit opens and further attempts fail fast until a
//! recovery timeout elapses, at which point a single probe is allowed
//! through (half-open) to test whether the peer has become reachable again.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ember_crypto::identity::PeerId;
use tokio::sync::RwLock;

/// Circuit breaker state for a single peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Dial attempts pass through normally.
    Closed,
    /// Dial attempts fail immediately without trying.
    Open,
    /// A single dial attempt is allowed to test recovery.
    HalfOpen,
}

/// Circuit breaker configuration.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening the circuit.
    pub failure_threshold: u32,
    /// Time to wait before probing again after opening.
    pub timeout: Duration,
    /// Consecutive half-open successes required to close the circuit.
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

#[derive(Debug, Clone)]
struct PeerCircuit {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_transition: Instant,
    last_failure: Option<Instant>,
    total_failures: u64,
    total_successes: u64,
    open_count: u64,
}

impl PeerCircuit {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            last_transition: Instant::now(),
            last_failure: None,
            total_failures: 0,
            total_successes: 0,
            open_count: 0,
        }
    }

    fn allows_request(&self, config: &CircuitBreakerConfig) -> bool {
        match self.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => Instant::now().duration_since(self.last_transition) >= config.timeout,
        }
    }

    fn try_transition_to_half_open(&mut self, config: &CircuitBreakerConfig) {
        if self.state == CircuitState::Open
            && Instant::now().duration_since(self.last_transition) >= config.timeout
        {
            self.state = CircuitState::HalfOpen;
            self.success_count = 0;
            self.last_transition = Instant::now();
        }
    }

    fn record_success(&mut self, config: &CircuitBreakerConfig) {
        self.total_successes += 1;
        match self.state {
            CircuitState::Closed => self.failure_count = 0,
            CircuitState::HalfOpen => {
                self.success_count += 1;
                if self.success_count >= config.success_threshold {
                    self.state = CircuitState::Closed;
                    self.failure_count = 0;
                    self.success_count = 0;
                    self.last_transition = Instant::now();
                }
            }
            CircuitState::Open => {}
        }
    }

    fn record_failure(&mut self, config: &CircuitBreakerConfig) {
        let now = Instant::now();
        self.total_failures += 1;
        self.last_failure = Some(now);
        match self.state {
            CircuitState::Closed => {
                self.failure_count += 1;
                if self.failure_count >= config.failure_threshold {
                    self.state = CircuitState::Open;
                    self.last_transition = now;
                    self.open_count += 1;
                }
            }
            CircuitState::HalfOpen => {
                self.state = CircuitState::Open;
                self.failure_count = config.failure_threshold;
                self.success_count = 0;
                self.last_transition = now;
                self.open_count += 1;
            }
            CircuitState::Open => {}
        }
    }
}

/// Per-peer circuit breaker used by the reachability ladder.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    circuits: Arc<RwLock<HashMap<PeerId, PeerCircuit>>>,
}

/// Point-in-time circuit breaker metrics for one peer.
#[derive(Debug, Clone)]
pub struct CircuitMetrics {
    /// Current state.
    pub state: CircuitState,
    /// Consecutive failures since the circuit last closed.
    pub failure_count: u32,
    /// Total failures ever recorded.
    pub total_failures: u64,
    /// Total successes ever recorded.
    pub total_successes: u64,
    /// Number of times this circuit has opened.
    pub open_count: u64,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            circuits: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Whether a dial attempt to `peer` is currently allowed.
    pub async fn allows_request(&self, peer: &PeerId) -> bool {
        let mut circuits = self.circuits.write().await;
        let circuit = circuits.entry(*peer).or_insert_with(PeerCircuit::new);
        circuit.try_transition_to_half_open(&self.config);
        circuit.allows_request(&self.config)
    }

    /// Record a successful dial/handshake with `peer`.
    pub async fn record_success(&self, peer: &PeerId) {
        let mut circuits = self.circuits.write().await;
        circuits
            .entry(*peer)
            .or_insert_with(PeerCircuit::new)
            .record_success(&self.config);
    }

    /// Record a failed dial/handshake with `peer`.
    pub async fn record_failure(&self, peer: &PeerId) {
        let mut circuits = self.circuits.write().await;
        circuits
            .entry(*peer)
            .or_insert_with(PeerCircuit::new)
            .record_failure(&self.config);
    }

    /// Current state for `peer` (`Closed` if never seen).
    pub async fn state(&self, peer: &PeerId) -> CircuitState {
        self.circuits
            .read()
            .await
            .get(peer)
            .map(|c| c.state)
            .unwrap_or(CircuitState::Closed)
    }

    /// Metrics for `peer`, if a circuit has been created for them.
    pub async fn metrics(&self, peer: &PeerId) -> Option<CircuitMetrics> {
        self.circuits.read().await.get(peer).map(|c| CircuitMetrics {
            state: c.state,
            failure_count: c.failure_count,
            total_failures: c.total_failures,
            total_successes: c.total_successes,
            open_count: c.open_count,
        })
    }

    /// Drop the circuit for `peer` entirely.
    pub async fn remove(&self, peer: &PeerId) {
        self.circuits.write().await.remove(peer);
    }
}
