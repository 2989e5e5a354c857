//! The per-node membership view and the algorithms operating on it: merging incoming snapshots,
//! detecting failures, and choosing gossip destinations.

use crate::node::{clock::Tick, Address};

pub mod failure_detector;
pub mod gossip_destinations;
pub mod join;
pub mod table;

#[cfg(test)]
mod tests;
#[cfg(test)]
mod table_tests;

pub use self::table::{MemberRecord, MemberState, MembershipTable};

/// Observable transitions of the membership view, emitted by the engine as they happen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MembershipEvent {
    /// This node created its self record and now takes part in gossip
    JoinedGroup { address: Address, at: Tick },
    /// A member was seen for the first time
    MemberAdded { address: Address, at: Tick },
    /// A member's heartbeat went stale for one fail timeout
    MemberSuspected { address: Address, at: Tick },
    /// A member's heartbeat went stale for two fail timeouts
    MemberFailed { address: Address, at: Tick },
    /// A suspect or failed member showed a fresher heartbeat
    MemberRecovered { address: Address, at: Tick },
    /// A failed member was deleted from the table
    MemberRemoved { address: Address, at: Tick },
}

impl MembershipEvent {
    pub fn address(&self) -> Address {
        match *self {
            MembershipEvent::JoinedGroup { address, .. }
            | MembershipEvent::MemberAdded { address, .. }
            | MembershipEvent::MemberSuspected { address, .. }
            | MembershipEvent::MemberFailed { address, .. }
            | MembershipEvent::MemberRecovered { address, .. }
            | MembershipEvent::MemberRemoved { address, .. } => address,
        }
    }

    pub fn at(&self) -> Tick {
        match *self {
            MembershipEvent::JoinedGroup { at, .. }
            | MembershipEvent::MemberAdded { at, .. }
            | MembershipEvent::MemberSuspected { at, .. }
            | MembershipEvent::MemberFailed { at, .. }
            | MembershipEvent::MemberRecovered { at, .. }
            | MembershipEvent::MemberRemoved { at, .. } => at,
        }
    }
}
