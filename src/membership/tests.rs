use std::iter::once;

use quickcheck::Arbitrary;

use super::{MemberRecord, MemberState, MembershipTable};
use crate::node::Address;

impl Arbitrary for MemberState {
    fn arbitrary(g: &mut quickcheck::Gen) -> Self {
        *g.choose(&[Self::Alive, Self::Suspect, Self::Failed]).unwrap()
    }
}

impl Arbitrary for MemberRecord {
    fn arbitrary(g: &mut quickcheck::Gen) -> Self {
        Self {
            id: Address::arbitrary(g).id,
            port: Address::arbitrary(g).port,
            // Narrow heartbeats, so that generated records often tie
            heartbeat: i64::from(u8::arbitrary(g) % 32),
            last_updated: u64::from(u8::arbitrary(g)),
            state: MemberState::arbitrary(g),
        }
    }
}

/// Generates an arbitrary table with at least a self record
impl Arbitrary for MembershipTable {
    fn arbitrary(g: &mut quickcheck::Gen) -> Self {
        let this_node = MemberRecord {
            state: MemberState::Alive,
            ..MemberRecord::arbitrary(g)
        };
        MembershipTable::from_members(once(this_node).chain(Vec::<MemberRecord>::arbitrary(g)))
    }
}

#[quickcheck]
fn arbitrary_table_test(table: MembershipTable) {
    assert!(!table.is_empty());
    assert_eq!(table.self_record(), table.iter().next());
    assert_eq!(table.peers().len(), table.len() - 1);
    for (i, a) in table.iter().enumerate() {
        for b in table.iter().skip(i + 1) {
            assert_ne!(a.address(), b.address());
        }
    }
}

#[cfg(feature = "serde")]
#[test]
fn events_serialize_to_json() {
    use super::MembershipEvent;

    let event = MembershipEvent::MemberSuspected {
        address: Address::new(7, 2),
        at: 15,
    };
    let json = serde_json::to_string(&event).unwrap();
    assert_eq!(
        json,
        r#"{"MemberSuspected":{"address":{"id":7,"port":2},"at":15}}"#
    );
    assert_eq!(serde_json::from_str::<MembershipEvent>(&json).unwrap(), event);
}
