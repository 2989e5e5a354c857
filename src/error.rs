use thiserror::Error;

/// Errors raised while turning a byte buffer back into a [Message](crate::codec::Message).
///
/// A payload that fails to decode is dropped by the engine. It never mutates the membership table.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum DecodeError {
    #[error("payload is too short: expected at least {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },

    #[error("payload declares {entries} entries ({expected} bytes) but only {actual} bytes follow the header")]
    Truncated {
        entries: u32,
        expected: usize,
        actual: usize,
    },

    #[error("unknown message type tag {0}")]
    UnknownMessageType(u8),

    #[error("join request declares {0} entries, expected none")]
    UnexpectedEntries(u32),
}

/// Errors raised when parsing an [Address](crate::node::address::Address) from its textual form
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum AddressError {
    #[error("malformed address {0:?}, expected `id:port`")]
    Malformed(String),

    #[error("invalid {component} in address {input:?}")]
    InvalidComponent {
        component: &'static str,
        input: String,
    },
}

#[derive(Debug, Error)]
pub enum Error {
    /// The node cannot determine its own address. This is the only fatal initialization failure.
    #[error("this node's address is the null address")]
    NullAddress,

    #[error(transparent)]
    Address(#[from] AddressError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    #[error("the membership driver task has stopped")]
    DriverStopped,
}
