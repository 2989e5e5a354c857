use super::{MemberState, MembershipEvent, MembershipTable};
use crate::node::clock::Tick;

/// The [FailureDetector] reclassifies members whose heartbeat has not been refreshed recently.
///
/// Each record remembers the tick at which its heartbeat was last raised by a merge. From the staleness of
/// that tick, a member goes through three stages:
///  - after `fail_timeout` ticks it becomes [MemberState::Suspect],
///  - after another `fail_timeout` ticks it becomes [MemberState::Failed],
///  - after another `cleanup_timeout` ticks it is deleted from the table altogether.
///
/// Suspect and failed members are still gossiped about, so that a peer holding a fresher heartbeat can bring
/// them back. Only a merge can do that; the detector never moves a member back to [MemberState::Alive].
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FailureDetector {
    pub fail_timeout: Tick,
    pub cleanup_timeout: Tick,
}

/// What the detector decides for a single record
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Keep(MemberState),
    Remove,
}

impl FailureDetector {
    pub fn new(fail_timeout: Tick, cleanup_timeout: Tick) -> Self {
        Self {
            fail_timeout,
            cleanup_timeout,
        }
    }

    /// Number of ticks after its last refresh at which a member is deleted
    pub fn removal_delay(&self) -> Tick {
        self.failure_delay().saturating_add(self.cleanup_timeout)
    }

    /// Number of ticks after its last refresh at which a member is considered failed
    pub fn failure_delay(&self) -> Tick {
        self.fail_timeout.saturating_mul(2)
    }

    /// Classifies a member whose heartbeat was last refreshed at `last_updated`
    pub fn verdict(&self, last_updated: Tick, now: Tick) -> Verdict {
        let staleness = now.saturating_sub(last_updated);
        if staleness >= self.removal_delay() {
            Verdict::Remove
        } else if staleness >= self.failure_delay() {
            Verdict::Keep(MemberState::Failed)
        } else if staleness >= self.fail_timeout {
            Verdict::Keep(MemberState::Suspect)
        } else {
            Verdict::Keep(MemberState::Alive)
        }
    }

    /// Scans every peer of the table, escalates stale ones and deletes those that stayed failed for the
    /// cleanup timeout. The self record is left alone.
    ///
    /// Tombstones of removed members are kept for as long as a stale copy of their record may still be
    /// circulating, that is [removal_delay](Self::removal_delay) ticks.
    pub fn detect(&self, table: &mut MembershipTable, now: Tick) -> Vec<MembershipEvent> {
        let mut events = Vec::new();
        let mut removed = Vec::new();

        for member in table.peers_mut() {
            let address = member.address();
            match self.verdict(member.last_updated, now) {
                Verdict::Remove => removed.push(address),
                Verdict::Keep(state) if state > member.state => {
                    if member.state == MemberState::Alive {
                        events.push(MembershipEvent::MemberSuspected { address, at: now });
                    }
                    if state == MemberState::Failed {
                        events.push(MembershipEvent::MemberFailed { address, at: now });
                    }
                    member.state = state;
                }
                Verdict::Keep(_) => (),
            }
        }

        for address in removed {
            if table.remove(address, now).is_some() {
                events.push(MembershipEvent::MemberRemoved { address, at: now });
            }
        }

        let ttl = self.removal_delay();
        table.purge_tombstones(|t| now.saturating_sub(t.removed_at) < ttl);

        events
    }
}

#[cfg(test)]
mod tests {
    use super::{FailureDetector, Verdict};
    use crate::{
        membership::{MemberRecord, MemberState, MembershipEvent, MembershipTable},
        node::Address,
    };

    fn table_with_peer(peer_last_updated: u64) -> MembershipTable {
        MembershipTable::from_members([
            MemberRecord::new(Address::new(1, 0), 10, 0),
            MemberRecord::new(Address::new(2, 0), 4, peer_last_updated),
        ])
    }

    #[test]
    fn verdict_thresholds() {
        let detector = FailureDetector::new(5, 3);
        assert_eq!(detector.verdict(10, 14), Verdict::Keep(MemberState::Alive));
        assert_eq!(detector.verdict(10, 15), Verdict::Keep(MemberState::Suspect));
        assert_eq!(detector.verdict(10, 19), Verdict::Keep(MemberState::Suspect));
        assert_eq!(detector.verdict(10, 20), Verdict::Keep(MemberState::Failed));
        assert_eq!(detector.verdict(10, 22), Verdict::Keep(MemberState::Failed));
        assert_eq!(detector.verdict(10, 23), Verdict::Remove);
        // A record refreshed in the future (clock skew between merges) is alive
        assert_eq!(detector.verdict(30, 23), Verdict::Keep(MemberState::Alive));
    }

    #[test]
    fn huge_timeouts_saturate() {
        let detector = FailureDetector::new(u64::MAX / 2 + 1, 7);
        assert_eq!(detector.failure_delay(), u64::MAX);
        assert_eq!(detector.removal_delay(), u64::MAX);
        assert_eq!(detector.verdict(0, 5), Verdict::Keep(MemberState::Alive));
        assert_eq!(
            detector.verdict(0, u64::MAX / 2 + 1),
            Verdict::Keep(MemberState::Suspect)
        );

        let mut table = table_with_peer(0);
        assert!(detector.detect(&mut table, 1_000).is_empty());
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn escalates_then_removes_stale_peers() {
        let detector = FailureDetector::new(5, 3);
        let peer = Address::new(2, 0);
        let mut table = table_with_peer(10);

        assert!(detector.detect(&mut table, 14).is_empty());

        assert_eq!(
            detector.detect(&mut table, 15),
            vec![MembershipEvent::MemberSuspected { address: peer, at: 15 }]
        );
        assert_eq!(table.get(peer).map(|m| m.state), Some(MemberState::Suspect));
        assert!(detector.detect(&mut table, 16).is_empty());

        assert_eq!(
            detector.detect(&mut table, 20),
            vec![MembershipEvent::MemberFailed { address: peer, at: 20 }]
        );
        assert_eq!(table.get(peer).map(|m| m.state), Some(MemberState::Failed));

        assert_eq!(
            detector.detect(&mut table, 23),
            vec![MembershipEvent::MemberRemoved { address: peer, at: 23 }]
        );
        assert!(!table.contains(peer));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn reports_every_stage_crossed_in_a_single_scan() {
        let detector = FailureDetector::new(5, 3);
        let peer = Address::new(2, 0);
        let mut table = table_with_peer(0);

        assert_eq!(
            detector.detect(&mut table, 11),
            vec![
                MembershipEvent::MemberSuspected { address: peer, at: 11 },
                MembershipEvent::MemberFailed { address: peer, at: 11 },
            ]
        );
    }

    #[test]
    fn never_touches_the_self_record() {
        let detector = FailureDetector::new(1, 1);
        let this_node = Address::new(1, 0);
        let mut table = MembershipTable::from_members([MemberRecord::new(this_node, 0, 0)]);

        assert!(detector.detect(&mut table, 1_000).is_empty());
        assert_eq!(
            table.self_record().map(|m| (m.address(), m.state)),
            Some((this_node, MemberState::Alive))
        );
    }

    #[test]
    fn tombstones_block_stale_copies_until_they_expire() {
        let detector = FailureDetector::new(5, 3);
        let peer = Address::new(2, 0);
        let mut table = table_with_peer(10);
        detector.detect(&mut table, 23);
        assert!(!table.contains(peer));

        // A slower peer still gossips the old heartbeat
        let stale = MemberRecord::new(peer, 4, 0);
        assert!(table.merge([&stale], 24).is_empty());
        assert!(!table.contains(peer));

        // Tombstones outlive the removal delay, then stale copies are admitted again
        detector.detect(&mut table, 23 + 12);
        assert!(table.merge([&stale], 35).is_empty());
        detector.detect(&mut table, 23 + 13);
        assert_eq!(
            table.merge([&stale], 37),
            vec![MembershipEvent::MemberAdded { address: peer, at: 37 }]
        );
        assert!(table.contains(peer));
    }

    #[test]
    fn fresher_heartbeat_passes_a_tombstone() {
        let detector = FailureDetector::new(5, 3);
        let peer = Address::new(2, 0);
        let mut table = table_with_peer(10);
        detector.detect(&mut table, 23);

        let restarted = MemberRecord::new(peer, 5, 0);
        assert_eq!(
            table.merge([&restarted], 24),
            vec![MembershipEvent::MemberAdded { address: peer, at: 24 }]
        );
        assert_eq!(table.get(peer).map(|m| m.heartbeat), Some(5));

        // The tombstone went away with the admission: a later removal starts over
        assert!(table.remove(peer, 30).is_some());
        assert!(table.merge([&restarted], 31).is_empty());
    }
}
