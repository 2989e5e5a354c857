use std::slice;

use crate::node::{clock::Tick, Address};

use super::MembershipEvent;

/// How the running node classifies a member, based on how fresh its heartbeat is.
///
/// The state is local to each node and is never transmitted.
#[derive(Debug, PartialEq, Eq, Clone, Copy, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MemberState {
    Alive,
    // No fresher heartbeat for one fail timeout
    Suspect,
    // No fresher heartbeat for two fail timeouts; removed after the cleanup timeout
    Failed,
}

/// A view of how the running node views one member of the group, itself included
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MemberRecord {
    pub id: u32,
    pub port: u16,
    pub heartbeat: i64,
    pub last_updated: Tick,
    pub state: MemberState,
}

impl MemberRecord {
    pub fn new(address: Address, heartbeat: i64, last_updated: Tick) -> Self {
        Self {
            id: address.id,
            port: address.port,
            heartbeat,
            last_updated,
            state: MemberState::Alive,
        }
    }

    pub fn address(&self) -> Address {
        Address::new(self.id, self.port)
    }

    fn is(&self, address: Address) -> bool {
        self.id == address.id && self.port == address.port
    }
}

/// What remains of a removed member: enough to refuse stale copies of its record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Tombstone {
    pub(crate) address: Address,
    pub(crate) heartbeat: i64,
    pub(crate) removed_at: Tick,
}

/// The running node's local view of the group.
///
/// Records are kept in a sequence whose first element, once the node has joined, is the node's own record.
/// There is at most one record per address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipTable {
    this_node: Option<Address>,
    members: Vec<MemberRecord>,
    tombstones: Vec<Tombstone>,
}

impl MembershipTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a table whose self record is the first element of `members`.
    /// Later records sharing an address with an earlier one are discarded.
    pub fn from_members(members: impl IntoIterator<Item = MemberRecord>) -> Self {
        let mut table = Self::new();
        for record in members {
            if table.position(record.address()).is_some() {
                continue;
            }
            if table.this_node.is_none() {
                table.this_node = Some(record.address());
            }
            table.members.push(record);
        }
        table
    }

    /// Appends the record of the running node. A table holds at most one self record, a second call
    /// returns `false` and leaves the table untouched.
    pub(crate) fn add_self(&mut self, address: Address, heartbeat: i64, now: Tick) -> bool {
        if self.this_node.is_some() {
            return false;
        }
        if let Some(index) = self.position(address) {
            self.members.remove(index);
        }
        self.tombstones.retain(|t| t.address != address);
        self.members
            .insert(0, MemberRecord::new(address, heartbeat, now));
        self.this_node = Some(address);
        true
    }

    pub fn self_record(&self) -> Option<&MemberRecord> {
        self.this_node.and(self.members.first())
    }

    pub(crate) fn set_self_heartbeat(&mut self, heartbeat: i64, now: Tick) {
        if self.this_node.is_none() {
            return;
        }
        if let Some(this_node) = self.members.first_mut() {
            this_node.heartbeat = heartbeat;
            this_node.last_updated = now;
        }
    }

    /// Merges an incoming snapshot into this table, recording `now` as the freshness tick of every
    /// record that is added or whose heartbeat is raised.
    ///
    /// Only strictly greater heartbeats are taken into account, which makes merging the same snapshot
    /// twice, or two snapshots in any order, converge to the same table. A fresher heartbeat brings a
    /// suspect or failed member back to [MemberState::Alive]. The self record is never modified.
    pub fn merge<'a>(
        &mut self,
        incoming: impl IntoIterator<Item = &'a MemberRecord>,
        now: Tick,
    ) -> Vec<MembershipEvent> {
        let mut events = Vec::new();

        for record in incoming {
            let address = record.address();
            if self.this_node == Some(address) {
                continue;
            }

            match self.position(address) {
                Some(index) => {
                    let local = &mut self.members[index];
                    if record.heartbeat > local.heartbeat {
                        local.heartbeat = record.heartbeat;
                        local.last_updated = now;
                        if local.state != MemberState::Alive {
                            local.state = MemberState::Alive;
                            events.push(MembershipEvent::MemberRecovered { address, at: now });
                        }
                    }
                }
                None => {
                    if let Some(index) = self.tombstones.iter().position(|t| t.address == address)
                    {
                        if record.heartbeat <= self.tombstones[index].heartbeat {
                            continue;
                        }
                        self.tombstones.swap_remove(index);
                    }
                    self.members
                        .push(MemberRecord::new(address, record.heartbeat, now));
                    events.push(MembershipEvent::MemberAdded { address, at: now });
                }
            }
        }

        events
    }

    pub fn get(&self, address: Address) -> Option<&MemberRecord> {
        self.members.iter().find(|m| m.is(address))
    }

    pub fn contains(&self, address: Address) -> bool {
        self.position(address).is_some()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn iter(&self) -> slice::Iter<'_, MemberRecord> {
        self.members.iter()
    }

    /// Every record except the self record
    pub fn peers(&self) -> &[MemberRecord] {
        if self.this_node.is_some() {
            self.members.get(1..).unwrap_or(&[])
        } else {
            &self.members
        }
    }

    pub(crate) fn peers_mut(&mut self) -> &mut [MemberRecord] {
        if self.this_node.is_some() {
            self.members
                .split_first_mut()
                .map(|(_, peers)| peers)
                .unwrap_or_default()
        } else {
            &mut self.members
        }
    }

    /// A copy of every record, in table order
    pub fn snapshot(&self) -> Vec<MemberRecord> {
        self.members.clone()
    }

    /// Deletes the record of `address` and keeps a tombstone of its last heartbeat.
    /// The self record cannot be removed.
    pub(crate) fn remove(&mut self, address: Address, now: Tick) -> Option<MemberRecord> {
        if self.this_node == Some(address) {
            return None;
        }
        let index = self.position(address)?;
        let record = self.members.remove(index);
        self.tombstones.push(Tombstone {
            address,
            heartbeat: record.heartbeat,
            removed_at: now,
        });
        Some(record)
    }

    pub(crate) fn purge_tombstones(&mut self, keep: impl Fn(&Tombstone) -> bool) {
        self.tombstones.retain(keep);
    }

    fn position(&self, address: Address) -> Option<usize> {
        self.members.iter().position(|m| m.is(address))
    }
}

impl<'a> IntoIterator for &'a MembershipTable {
    type Item = &'a MemberRecord;
    type IntoIter = slice::Iter<'a, MemberRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
