use std::collections::VecDeque;

use log::{debug, info, trace, warn};
use rand::{rngs::StdRng, SeedableRng};

use crate::{
    builder::Config,
    codec::Message,
    error::{DecodeError, Error},
    membership::{
        failure_detector::FailureDetector,
        join::{JoinCoordinator, JoinStep},
        MemberRecord, MembershipEvent, MembershipTable,
    },
    network::Network,
    node::{
        clock::{Clock, Tick},
        Address, JoinStatus, NodeState,
    },
};

/// Number of undrained events an [Engine] keeps
pub const MAX_QUEUED_EVENTS: usize = 1024;

/// The membership engine of a single node.
///
/// An [Engine] owns its node state and membership table and is driven by repeated calls to [Engine::tick].
/// Each tick, strictly in order:
///  1. drains every payload the network delivered to this node, and handles them one by one,
///  2. if the node is part of the group, runs the failure detector over its table,
///  3. if the node is part of the group, increments its heartbeat and gossips its table to random peers.
///
/// A payload that cannot be decoded is dropped without touching the table. Engines never share state: they
/// only exchange encoded snapshots through the [Network], which makes it possible to run many of them in the
/// same process.
///
/// Membership events are queued until [Engine::drain_events] is called. At most [MAX_QUEUED_EVENTS] are kept:
/// past that, the oldest ones are dropped, the same way a lagging broadcast receiver skips events.
pub struct Engine<N, C> {
    node: NodeState,
    table: MembershipTable,
    config: Config,
    join_coordinator: JoinCoordinator,
    failure_detector: FailureDetector,
    network: N,
    clock: C,
    rng: StdRng,
    events: VecDeque<MembershipEvent>,
}

impl<N: Network, C: Clock> Engine<N, C> {
    pub fn new(address: Address, config: Config, network: N, clock: C) -> Result<Self, Error> {
        Self::with_rng(address, config, network, clock, StdRng::from_entropy())
    }

    pub(crate) fn with_rng(
        address: Address,
        config: Config,
        network: N,
        clock: C,
        rng: StdRng,
    ) -> Result<Self, Error> {
        if address.is_null() {
            return Err(Error::NullAddress);
        }
        config.validate()?;

        Ok(Self {
            node: NodeState::new(address),
            table: MembershipTable::new(),
            join_coordinator: JoinCoordinator::new(config.bootstrap_address),
            failure_detector: FailureDetector::new(config.fail_timeout, config.cleanup_timeout),
            config,
            network,
            clock,
            rng,
            events: VecDeque::new(),
        })
    }

    /// Introduces this node to the group: the bootstrap node founds it, any other node sends a join
    /// request to the bootstrap node.
    ///
    /// Nothing is retried automatically. Calling `start` again while still waiting for a join reply
    /// sends a new request; calling it once in the group does nothing.
    pub fn start(&mut self) {
        if self.node.failed {
            return;
        }
        let now = self.clock.now();
        match self
            .join_coordinator
            .start(&mut self.node, &mut self.table, now)
        {
            JoinStep::Founded(event) => self.record_events([event]),
            JoinStep::Request { to, message } => self.send(to, &message),
            JoinStep::AlreadyInGroup => (),
        }
    }

    pub fn tick(&mut self) {
        if self.node.failed {
            return;
        }
        let now = self.clock.now();

        for payload in self.network.receive(self.node.address) {
            if let Err(error) = self.handle_payload(&payload, now) {
                warn!(
                    "[{}] dropping malformed payload: {}",
                    self.node.address, error
                );
            }
        }

        if !self.node.in_group() {
            return;
        }

        let events = self.failure_detector.detect(&mut self.table, now);
        self.record_events(events);

        self.gossip(now);
    }

    /// Simulates a crash: every later call to [Engine::tick] or [Engine::start] does nothing.
    /// Peers find out through their failure detectors, there is no goodbye message.
    pub fn mark_failed(&mut self) {
        if !self.node.failed {
            info!("[{}] marked as failed", self.node.address);
        }
        self.node.failed = true;
    }

    pub fn is_failed(&self) -> bool {
        self.node.failed
    }

    pub fn is_in_group(&self) -> bool {
        self.node.in_group()
    }

    pub fn join_status(&self) -> JoinStatus {
        self.node.join_status
    }

    pub fn address(&self) -> Address {
        self.node.address
    }

    pub fn heartbeat(&self) -> i64 {
        self.node.heartbeat
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn node_state(&self) -> &NodeState {
        &self.node
    }

    pub fn table(&self) -> &MembershipTable {
        &self.table
    }

    /// A copy of the membership table, self record first
    pub fn current_view(&self) -> Vec<MemberRecord> {
        self.table.snapshot()
    }

    /// Takes every event recorded since the last call, oldest first
    pub fn drain_events(&mut self) -> Vec<MembershipEvent> {
        self.events.drain(..).collect()
    }

    fn handle_payload(&mut self, payload: &[u8], now: Tick) -> Result<(), DecodeError> {
        let message = Message::decode(payload)?;
        self.dispatch(message, now);
        Ok(())
    }

    fn dispatch(&mut self, message: Message, now: Tick) {
        match message {
            Message::JoinRequest { sender, .. } => {
                if let Some((to, reply)) =
                    self.join_coordinator
                        .handle_join_request(&self.node, &self.table, sender)
                {
                    self.send(to, &reply);
                }
            }
            Message::JoinReply { members } => {
                let events = self.join_coordinator.handle_join_reply(
                    &mut self.node,
                    &mut self.table,
                    &members,
                    now,
                );
                self.record_events(events);
            }
            Message::Gossip { members } => {
                if !self.node.in_group() {
                    debug!(
                        "[{}] ignoring gossip while not in group",
                        self.node.address
                    );
                    return;
                }
                let events = self.table.merge(&members, now);
                self.record_events(events);
            }
        }
    }

    fn gossip(&mut self, now: Tick) {
        let heartbeat = self.node.incr_heartbeat();
        self.table.set_self_heartbeat(heartbeat, now);

        if self.table.len() < 2 {
            return;
        }

        let destinations = self
            .table
            .select_gossip_destinations(self.config.fanout, &mut self.rng);
        let payload = Message::Gossip {
            members: self.table.snapshot(),
        }
        .encode();
        for destination in destinations {
            trace!(
                "[{}] gossiping to {} (heartbeat {})",
                self.node.address,
                destination,
                heartbeat
            );
            self.network
                .send(self.node.address, destination, payload.clone());
        }
    }

    fn send(&self, to: Address, message: &Message) {
        trace!(
            "[{}] sending {:?} to {}",
            self.node.address,
            message.message_type(),
            to
        );
        self.network.send(self.node.address, to, message.encode());
    }

    fn record_events(&mut self, events: impl IntoIterator<Item = MembershipEvent>) {
        let this_node = self.node.address;
        for event in events {
            match event {
                MembershipEvent::JoinedGroup { at, .. } => {
                    info!("[{}] joined the group at tick {}", this_node, at)
                }
                MembershipEvent::MemberAdded { address, at } => {
                    info!("[{}] added {} at tick {}", this_node, address, at)
                }
                MembershipEvent::MemberRemoved { address, at } => {
                    info!("[{}] removed {} at tick {}", this_node, address, at)
                }
                MembershipEvent::MemberSuspected { address, at } => {
                    debug!("[{}] suspects {} at tick {}", this_node, address, at)
                }
                MembershipEvent::MemberFailed { address, at } => {
                    debug!("[{}] considers {} failed at tick {}", this_node, address, at)
                }
                MembershipEvent::MemberRecovered { address, at } => {
                    debug!("[{}] {} recovered at tick {}", this_node, address, at)
                }
            }
            if self.events.len() == MAX_QUEUED_EVENTS {
                self.events.pop_front();
                trace!("[{}] event queue full, dropping the oldest event", this_node);
            }
            self.events.push_back(event);
        }
    }
}
