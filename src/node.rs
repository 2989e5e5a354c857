pub use self::address::Address;

pub mod address {
    use std::{
        fmt::{self, Display},
        net::SocketAddrV4,
        str::FromStr,
    };

    #[cfg(test)]
    use quickcheck::Arbitrary;

    use crate::error::AddressError;

    /// An [Address] identifies a node on the network: a 32-bit id and a 16-bit port.
    ///
    /// Its textual form is `id:port`, e.g. `1:0` for the default bootstrap node.
    #[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct Address {
        pub id: u32,
        pub port: u16,
    }

    impl Address {
        pub const NULL: Address = Address { id: 0, port: 0 };

        pub const fn new(id: u32, port: u16) -> Self {
            Self { id, port }
        }

        pub fn is_null(&self) -> bool {
            *self == Self::NULL
        }
    }

    impl Display for Address {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}:{}", self.id, self.port)
        }
    }

    impl FromStr for Address {
        type Err = AddressError;

        fn from_str(s: &str) -> Result<Self, Self::Err> {
            let (id, port) = s
                .split_once(':')
                .ok_or_else(|| AddressError::Malformed(s.to_string()))?;
            let id = id
                .trim()
                .parse::<u32>()
                .map_err(|_| AddressError::InvalidComponent {
                    component: "id",
                    input: s.to_string(),
                })?;
            let port = port
                .trim()
                .parse::<u16>()
                .map_err(|_| AddressError::InvalidComponent {
                    component: "port",
                    input: s.to_string(),
                })?;
            Ok(Self { id, port })
        }
    }

    impl From<SocketAddrV4> for Address {
        fn from(value: SocketAddrV4) -> Self {
            Self {
                id: u32::from(*value.ip()),
                port: value.port(),
            }
        }
    }

    #[cfg(test)]
    impl Arbitrary for Address {
        fn arbitrary(g: &mut quickcheck::Gen) -> Self {
            // A small id space makes collisions between generated tables likely,
            // which is what the merge properties need to exercise.
            Self {
                id: u32::arbitrary(g) % 16,
                port: u16::arbitrary(g) % 4,
            }
        }
    }

}

pub mod clock {
    use std::sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    };

    /// A discrete unit of logical time. Every engine drains its inbox and may gossip once per tick.
    pub type Tick = u64;

    /// The source of logical time consumed by the [Engine](crate::engine::Engine)
    pub trait Clock {
        fn now(&self) -> Tick;
    }

    /// A [Clock] backed by an atomic counter that is advanced explicitly.
    ///
    /// Many engines can share one [LogicalClock] (behind an [Arc]) when they are simulated in the same process.
    #[derive(Debug, Default)]
    pub struct LogicalClock {
        current: AtomicU64,
    }

    impl LogicalClock {
        pub fn new() -> Self {
            Self::default()
        }

        /// Advances the clock by one tick and returns the new current tick
        pub fn advance(&self) -> Tick {
            self.current.fetch_add(1, Ordering::SeqCst) + 1
        }
    }

    impl Clock for LogicalClock {
        fn now(&self) -> Tick {
            self.current.load(Ordering::SeqCst)
        }
    }

    impl<C: Clock + ?Sized> Clock for Arc<C> {
        fn now(&self) -> Tick {
            (**self).now()
        }
    }

    impl<C: Clock + ?Sized> Clock for &C {
        fn now(&self) -> Tick {
            (**self).now()
        }
    }
}

/// Where a node stands in the join handshake
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum JoinStatus {
    // The node has not started yet
    Uninitialized,
    // A join request was sent to the bootstrap node, no reply received yet
    AwaitingJoinReply,
    // The node owns a self record and takes part in gossip
    InGroup,
}

/// Self-identity bookkeeping of a running node.
///
/// `heartbeat` mirrors the heartbeat of the self record at index 0 of the membership table.
#[derive(Debug, Clone)]
pub struct NodeState {
    pub address: Address,
    pub heartbeat: i64,
    pub join_status: JoinStatus,
    pub failed: bool,
}

impl NodeState {
    pub(crate) fn new(address: Address) -> Self {
        Self {
            address,
            heartbeat: 0,
            join_status: JoinStatus::Uninitialized,
            failed: false,
        }
    }

    pub fn in_group(&self) -> bool {
        self.join_status == JoinStatus::InGroup
    }

    /// Increments this node's heartbeat and returns it
    pub(crate) fn incr_heartbeat(&mut self) -> i64 {
        self.heartbeat += 1;
        self.heartbeat
    }
}
