use std::collections::{BTreeMap, HashSet};

use super::{MemberRecord, MemberState, MembershipEvent, MembershipTable};
use crate::node::{clock::Tick, Address};

fn heartbeats(table: &MembershipTable) -> BTreeMap<Address, (i64, Tick, MemberState)> {
    table
        .iter()
        .map(|m| (m.address(), (m.heartbeat, m.last_updated, m.state)))
        .collect()
}

/// Tests that once we have merged a snapshot into a table, merging it again is a no-op, at any later tick,
/// i.e. that merging is idempotent. Repeated deliveries of the same gossip do not change anything.
#[quickcheck]
fn merge_test_idempotence(
    mut table: MembershipTable,
    snapshot: Vec<MemberRecord>,
    now: u8,
    later: u8,
) -> bool {
    let now = Tick::from(now);
    table.merge(&snapshot, now);
    let merged_once = table.clone();
    let events = table.merge(&snapshot, now + Tick::from(later));
    events.is_empty() && table == merged_once
}

/// Tests that merging two snapshots in either order gives the same members, heartbeats and states,
/// i.e. that reordered deliveries converge.
#[quickcheck]
fn merge_test_commutativity(
    table: MembershipTable,
    first: Vec<MemberRecord>,
    second: Vec<MemberRecord>,
) -> bool {
    let mut first_then_second = table.clone();
    first_then_second.merge(&first, 100);
    first_then_second.merge(&second, 100);

    let mut second_then_first = table;
    second_then_first.merge(&second, 100);
    second_then_first.merge(&first, 100);

    heartbeats(&first_then_second) == heartbeats(&second_then_first)
}

/// Tests that for every member known both locally and in the snapshot, the merged heartbeat is at least
/// as high as both of them.
#[quickcheck]
fn merge_test_monotonicity(mut table: MembershipTable, snapshot: Vec<MemberRecord>) -> bool {
    let this_node = table.self_record().map(|m| m.address());
    let before = table.clone();
    table.merge(&snapshot, 7);

    let local_ok = before
        .iter()
        .all(|m| table.get(m.address()).map(|merged| merged.heartbeat) >= Some(m.heartbeat));
    let incoming_ok = snapshot
        .iter()
        .filter(|m| Some(m.address()) != this_node)
        .all(|m| table.get(m.address()).map(|merged| merged.heartbeat) >= Some(m.heartbeat));
    local_ok && incoming_ok
}

#[quickcheck]
fn merge_test_never_overwrites_self(
    mut table: MembershipTable,
    snapshot: Vec<MemberRecord>,
) -> bool {
    let this_node = *table.self_record().unwrap();
    let mut hostile = snapshot;
    hostile.push(MemberRecord {
        heartbeat: this_node.heartbeat + 1_000,
        ..this_node
    });
    table.merge(&hostile, 3);
    table.self_record() == Some(&this_node) && table.iter().next() == Some(&this_node)
}

#[quickcheck]
fn merge_test_keeps_one_record_per_address(
    mut table: MembershipTable,
    snapshot: Vec<MemberRecord>,
) -> bool {
    table.merge(&snapshot, 1);
    let distinct: HashSet<Address> = table.iter().map(|m| m.address()).collect();
    distinct.len() == table.len()
}

#[test]
fn fresher_heartbeat_resurrects_suspect_members() {
    let this_node = Address::new(1, 0);
    let peer = Address::new(2, 0);
    let mut table = MembershipTable::from_members([
        MemberRecord::new(this_node, 3, 0),
        MemberRecord {
            state: MemberState::Failed,
            ..MemberRecord::new(peer, 5, 2)
        },
    ]);

    // Same heartbeat: stale information
    assert!(table.merge(&[MemberRecord::new(peer, 5, 0)], 9).is_empty());
    assert_eq!(
        table.get(peer).map(|m| (m.heartbeat, m.last_updated, m.state)),
        Some((5, 2, MemberState::Failed))
    );

    assert_eq!(
        table.merge(&[MemberRecord::new(peer, 6, 0)], 10),
        vec![MembershipEvent::MemberRecovered { address: peer, at: 10 }]
    );
    assert_eq!(
        table.get(peer).map(|m| (m.heartbeat, m.last_updated, m.state)),
        Some((6, 10, MemberState::Alive))
    );
}

#[test]
fn unknown_members_are_appended_alive() {
    let this_node = Address::new(1, 0);
    let mut table = MembershipTable::from_members([MemberRecord::new(this_node, 0, 0)]);
    let mut incoming = MemberRecord::new(Address::new(3, 1), 4, 77);
    incoming.state = MemberState::Suspect;

    assert_eq!(
        table.merge(&[incoming], 12),
        vec![MembershipEvent::MemberAdded {
            address: Address::new(3, 1),
            at: 12
        }]
    );
    assert_eq!(
        table.snapshot(),
        vec![
            MemberRecord::new(this_node, 0, 0),
            MemberRecord::new(Address::new(3, 1), 4, 12),
        ]
    );
}

#[test]
fn self_record_is_added_once() {
    let this_node = Address::new(1, 0);
    let mut table = MembershipTable::new();
    assert!(table.self_record().is_none());
    assert!(table.add_self(this_node, 0, 4));
    assert!(!table.add_self(this_node, 9, 5));
    assert_eq!(table.snapshot(), vec![MemberRecord::new(this_node, 0, 4)]);

    table.set_self_heartbeat(2, 6);
    assert_eq!(table.self_record().map(|m| m.heartbeat), Some(2));
    assert!(table.remove(this_node, 7).is_none());
}
