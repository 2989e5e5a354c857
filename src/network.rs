//! The transport consumed by the engine, and an in-memory implementation of it.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard},
};

use bytes::Bytes;
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::node::Address;

/// Describes types that can carry opaque payloads between two addresses.
///
/// Sending is fire-and-forget: payloads may be lost, duplicated or reordered, and no acknowledgment is
/// returned. Receiving never blocks and drains whatever arrived since the last call.
pub trait Network {
    fn send(&self, from: Address, to: Address, payload: Bytes);

    fn receive(&self, at: Address) -> Vec<Bytes>;
}

impl<N: Network + ?Sized> Network for Arc<N> {
    fn send(&self, from: Address, to: Address, payload: Bytes) {
        (**self).send(from, to, payload)
    }

    fn receive(&self, at: Address) -> Vec<Bytes> {
        (**self).receive(at)
    }
}

impl<N: Network + ?Sized> Network for &N {
    fn send(&self, from: Address, to: Address, payload: Bytes) {
        (**self).send(from, to, payload)
    }

    fn receive(&self, at: Address) -> Vec<Bytes> {
        (**self).receive(at)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulatedNetworkConfig {
    /// Probability for any payload to be silently dropped
    pub drop_probability: f64,
    /// Probability for a delivered payload to be delivered twice
    pub duplicate_probability: f64,
    /// Seeds the network's random source, for reproducible runs
    pub seed: Option<u64>,
}

impl Default for SimulatedNetworkConfig {
    fn default() -> Self {
        Self {
            drop_probability: 0.0,
            duplicate_probability: 0.0,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetworkStats {
    pub sent: u64,
    pub delivered: u64,
    pub dropped: u64,
    pub duplicated: u64,
}

/// A [Network] whose nodes all live in the same process: every address owns an inbox, `send` pushes
/// into the destination's inbox and `receive` drains it.
pub struct SimulatedNetwork {
    config: SimulatedNetworkConfig,
    state: Mutex<State>,
}

struct State {
    inboxes: HashMap<Address, VecDeque<Bytes>>,
    rng: StdRng,
    stats: NetworkStats,
}

impl SimulatedNetwork {
    pub fn new(config: SimulatedNetworkConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            config,
            state: Mutex::new(State {
                inboxes: HashMap::new(),
                rng,
                stats: NetworkStats::default(),
            }),
        }
    }

    /// A network that delivers everything, exactly once
    pub fn reliable() -> Self {
        Self::new(SimulatedNetworkConfig::default())
    }

    pub fn config(&self) -> SimulatedNetworkConfig {
        self.config
    }

    pub fn stats(&self) -> NetworkStats {
        self.lock().stats
    }

    /// Number of payloads waiting for `at`
    pub fn pending(&self, at: Address) -> usize {
        self.lock().inboxes.get(&at).map_or(0, VecDeque::len)
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // The state stays consistent even if a panicking thread held the lock
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for SimulatedNetwork {
    fn default() -> Self {
        Self::reliable()
    }
}

impl Network for SimulatedNetwork {
    fn send(&self, from: Address, to: Address, payload: Bytes) {
        let mut guard = self.lock();
        let state = &mut *guard;
        state.stats.sent += 1;

        if self.config.drop_probability > 0.0
            && state.rng.gen_bool(self.config.drop_probability.min(1.0))
        {
            log::trace!("[{}] dropped payload for {}", from, to);
            state.stats.dropped += 1;
            return;
        }

        let duplicate = self.config.duplicate_probability > 0.0
            && state.rng.gen_bool(self.config.duplicate_probability.min(1.0));
        let inbox = state.inboxes.entry(to).or_default();
        if duplicate {
            inbox.push_back(payload.clone());
            state.stats.duplicated += 1;
        }
        inbox.push_back(payload);
    }

    fn receive(&self, at: Address) -> Vec<Bytes> {
        let mut state = self.lock();
        let received: Vec<Bytes> = state
            .inboxes
            .get_mut(&at)
            .map(|inbox| inbox.drain(..).collect())
            .unwrap_or_default();
        state.stats.delivered += received.len() as u64;
        received
    }
}
