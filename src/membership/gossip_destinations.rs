use rand::{seq::SliceRandom, Rng};

use super::MembershipTable;
use crate::node::Address;

impl MembershipTable {
    /// Selects up to `fanout` distinct peers to gossip with, uniformly at random.
    ///
    /// Every peer is a candidate regardless of its state: gossiping with suspect and failed members gives them
    /// a chance to prove they are still alive, and gives other nodes a chance to corroborate their failure.
    /// The self record is never selected.
    pub fn select_gossip_destinations<R: Rng + ?Sized>(
        &self,
        fanout: usize,
        rng: &mut R,
    ) -> Vec<Address> {
        self.peers()
            .choose_multiple(rng, fanout)
            .map(|member| member.address())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rand::{rngs::StdRng, SeedableRng};

    use crate::{
        membership::{MemberRecord, MembershipTable},
        node::Address,
    };

    fn table_of(size: u32) -> MembershipTable {
        MembershipTable::from_members((1..=size).map(|id| MemberRecord::new(Address::new(id, 0), 0, 0)))
    }

    #[test]
    fn picks_min_of_fanout_and_peer_count() {
        let mut rng = StdRng::seed_from_u64(7);
        assert!(table_of(1).select_gossip_destinations(3, &mut rng).is_empty());
        assert_eq!(table_of(3).select_gossip_destinations(3, &mut rng).len(), 2);
        assert_eq!(table_of(10).select_gossip_destinations(3, &mut rng).len(), 3);
    }

    #[test]
    fn never_picks_self_nor_twice_the_same_peer() {
        let mut rng = StdRng::seed_from_u64(42);
        let table = table_of(6);
        for _ in 0..100 {
            let destinations = table.select_gossip_destinations(4, &mut rng);
            let distinct: HashSet<_> = destinations.iter().collect();
            assert_eq!(distinct.len(), destinations.len());
            assert!(!destinations.contains(&Address::new(1, 0)));
        }
    }

    #[test]
    fn eventually_picks_every_peer() {
        let mut rng = StdRng::seed_from_u64(1);
        let table = table_of(8);
        let mut seen = HashSet::new();
        for _ in 0..200 {
            seen.extend(table.select_gossip_destinations(2, &mut rng));
        }
        assert_eq!(seen.len(), 7);
    }
}
