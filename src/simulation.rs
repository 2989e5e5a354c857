//! Runs a whole group of engines inside a single process.
//!
//! Every engine shares the same [SimulatedNetwork] and the same [LogicalClock]. A [Simulation] introduces
//! nodes at scheduled ticks, injects failures, and optionally plays the role of an operator re-sending join
//! requests for nodes that were not admitted.

use std::{collections::BTreeSet, sync::Arc};

use rand::{rngs::StdRng, SeedableRng};

use crate::{
    builder::Config,
    engine::Engine,
    error::Error,
    membership::MembershipEvent,
    network::{SimulatedNetwork, SimulatedNetworkConfig},
    node::{
        clock::{Clock, LogicalClock, Tick},
        Address, JoinStatus,
    },
};

pub type SimulatedEngine = Engine<Arc<SimulatedNetwork>, Arc<LogicalClock>>;

struct SimulatedNode {
    engine: SimulatedEngine,
    introduce_at: Tick,
    fail_at: Option<Tick>,
    last_join_attempt: Option<Tick>,
    events: Vec<MembershipEvent>,
}

pub struct Simulation {
    config: Config,
    clock: Arc<LogicalClock>,
    network: Arc<SimulatedNetwork>,
    nodes: Vec<SimulatedNode>,
    seed: Option<u64>,
    join_retry_interval: Option<Tick>,
}

impl Simulation {
    pub fn new(config: Config, network_config: SimulatedNetworkConfig) -> Self {
        Self {
            config,
            clock: Arc::new(LogicalClock::new()),
            network: Arc::new(SimulatedNetwork::new(network_config)),
            nodes: Vec::new(),
            seed: network_config.seed,
            join_retry_interval: None,
        }
    }

    /// Nodes still waiting for a join reply send a new request every `interval` ticks
    pub fn with_join_retry(mut self, interval: Tick) -> Self {
        self.join_retry_interval = Some(interval.max(1));
        self
    }

    /// Schedules a node to start at tick `introduce_at`. Nodes tick in the order they were added.
    pub fn add_node(&mut self, address: Address, introduce_at: Tick) -> Result<(), Error> {
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(
                seed ^ (u64::from(address.id) << 16) ^ u64::from(address.port),
            ),
            None => StdRng::from_entropy(),
        };
        let engine = Engine::with_rng(
            address,
            self.config,
            Arc::clone(&self.network),
            Arc::clone(&self.clock),
            rng,
        )?;
        self.nodes.push(SimulatedNode {
            engine,
            introduce_at,
            fail_at: None,
            last_join_attempt: None,
            events: Vec::new(),
        });
        Ok(())
    }

    /// Schedules a crash of `address` at tick `at`: from that tick on, the node no longer ticks.
    /// Returns `false` if no such node was added.
    pub fn fail_node(&mut self, address: Address, at: Tick) -> bool {
        match self.node_mut(address) {
            Some(node) => {
                node.fail_at = Some(at);
                true
            }
            None => false,
        }
    }

    pub fn now(&self) -> Tick {
        self.clock.now()
    }

    pub fn network(&self) -> &SimulatedNetwork {
        &self.network
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Advances the clock by one tick, then crashes, starts and ticks nodes as scheduled
    pub fn step(&mut self) -> Tick {
        let now = self.clock.advance();
        let retry = self.join_retry_interval;

        for node in &mut self.nodes {
            if node.fail_at.map_or(false, |at| at <= now) {
                node.engine.mark_failed();
            }

            if node.introduce_at > now {
                continue;
            }

            let should_start =
                match (node.engine.join_status(), node.last_join_attempt, retry) {
                    (JoinStatus::Uninitialized, _, _) => true,
                    (JoinStatus::AwaitingJoinReply, Some(last), Some(every)) => {
                        now - last >= every
                    }
                    _ => false,
                };
            if should_start && !node.engine.is_failed() {
                node.engine.start();
                node.last_join_attempt = Some(now);
            }

            node.engine.tick();
            node.events.extend(node.engine.drain_events());
        }

        now
    }

    pub fn run_until(&mut self, tick: Tick) {
        while self.now() < tick {
            self.step();
        }
    }

    pub fn engine(&self, address: Address) -> Option<&SimulatedEngine> {
        self.nodes
            .iter()
            .find(|node| node.engine.address() == address)
            .map(|node| &node.engine)
    }

    pub fn engines(&self) -> impl Iterator<Item = &SimulatedEngine> {
        self.nodes.iter().map(|node| &node.engine)
    }

    /// Every event recorded by `address` since the beginning of the simulation
    pub fn events(&self, address: Address) -> &[MembershipEvent] {
        self.nodes
            .iter()
            .find(|node| node.engine.address() == address)
            .map(|node| node.events.as_slice())
            .unwrap_or(&[])
    }

    /// Addresses known to `observer`, or `None` if there is no such node
    pub fn members_seen_by(&self, observer: Address) -> Option<BTreeSet<Address>> {
        self.engine(observer).map(|engine| {
            engine
                .table()
                .iter()
                .map(|member| member.address())
                .collect()
        })
    }

    /// Whether every running member of the group knows exactly the running members of the group
    pub fn converged(&self) -> bool {
        let running: BTreeSet<Address> = self
            .engines()
            .filter(|engine| engine.is_in_group() && !engine.is_failed())
            .map(|engine| engine.address())
            .collect();
        !running.is_empty()
            && running
                .iter()
                .all(|address| self.members_seen_by(*address).as_ref() == Some(&running))
    }

    fn node_mut(&mut self, address: Address) -> Option<&mut SimulatedNode> {
        self.nodes
            .iter_mut()
            .find(|node| node.engine.address() == address)
    }
}
