use log::{debug, info};

use super::{MemberRecord, MembershipEvent, MembershipTable};
use crate::{
    codec::Message,
    node::{clock::Tick, Address, JoinStatus, NodeState},
};

/// What [JoinCoordinator::start] did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinStep {
    /// This node is the bootstrap node and founded the group on its own
    Founded(MembershipEvent),
    /// A join request must be sent to the bootstrap node
    Request { to: Address, message: Message },
    /// Nothing to do, the node is already part of the group
    AlreadyInGroup,
}

/// The [JoinCoordinator] drives the bootstrap handshake.
///
/// A node moves from [JoinStatus::Uninitialized] to [JoinStatus::AwaitingJoinReply] when it sends a join request
/// to the bootstrap node, then to [JoinStatus::InGroup] when a join reply arrives. The bootstrap node itself skips
/// the handshake. Requests are never retried here: a node whose bootstrap is unreachable stays out of the group
/// until its caller starts it again.
#[derive(Debug, Clone, Copy)]
pub struct JoinCoordinator {
    pub bootstrap_address: Address,
}

impl JoinCoordinator {
    pub fn new(bootstrap_address: Address) -> Self {
        Self { bootstrap_address }
    }

    pub fn is_bootstrap(&self, address: Address) -> bool {
        address == self.bootstrap_address
    }

    pub fn start(&self, node: &mut NodeState, table: &mut MembershipTable, now: Tick) -> JoinStep {
        if node.in_group() {
            return JoinStep::AlreadyInGroup;
        }
        if self.is_bootstrap(node.address) {
            info!("[{}] starting up group", node.address);
            return JoinStep::Founded(admit(node, table, now));
        }

        debug!(
            "[{}] trying to join via {}",
            node.address, self.bootstrap_address
        );
        node.join_status = JoinStatus::AwaitingJoinReply;
        JoinStep::Request {
            to: self.bootstrap_address,
            message: Message::JoinRequest {
                sender: node.address,
                heartbeat: node.heartbeat,
            },
        }
    }

    /// Answers a join request with a snapshot of this node's table. Only members of the group answer.
    pub fn handle_join_request(
        &self,
        node: &NodeState,
        table: &MembershipTable,
        sender: Address,
    ) -> Option<(Address, Message)> {
        if !node.in_group() {
            debug!(
                "[{}] ignoring join request from {} while not in group",
                node.address, sender
            );
            return None;
        }
        debug!("[{}] answering join request from {}", node.address, sender);
        Some((
            sender,
            Message::JoinReply {
                members: table.snapshot(),
            },
        ))
    }

    /// Admits this node into the group on its first join reply, then merges the received snapshot.
    /// A node that never asked to join ignores the reply.
    pub fn handle_join_reply(
        &self,
        node: &mut NodeState,
        table: &mut MembershipTable,
        members: &[MemberRecord],
        now: Tick,
    ) -> Vec<MembershipEvent> {
        let mut events = Vec::new();
        match node.join_status {
            JoinStatus::Uninitialized => {
                debug!(
                    "[{}] ignoring join reply, no join request was sent",
                    node.address
                );
                return events;
            }
            JoinStatus::AwaitingJoinReply => {
                info!("[{}] received join reply", node.address);
                events.push(admit(node, table, now));
            }
            JoinStatus::InGroup => (),
        }
        events.extend(table.merge(members, now));
        events
    }
}

fn admit(node: &mut NodeState, table: &mut MembershipTable, now: Tick) -> MembershipEvent {
    table.add_self(node.address, node.heartbeat, now);
    node.join_status = JoinStatus::InGroup;
    MembershipEvent::JoinedGroup {
        address: node.address,
        at: now,
    }
}
