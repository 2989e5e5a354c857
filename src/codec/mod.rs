//! The wire format exchanged between nodes.
//!
//! Every payload starts with a fixed header: a one-byte message type followed by a 32-bit entry count.
//! Join requests carry the sender's address and heartbeat after the header and no entries. Join replies and
//! gossips carry `entry_count` packed member entries. All integers are little-endian.
//!
//! ```text
//! header:        msg_type: u8 | entry_count: u32
//! join request:  header | id: u32 | port: u16 | heartbeat: i64
//! reply/gossip:  header | entry_count * (id: u32 | port: u16 | heartbeat: i64)
//! ```
//!
//! Only the identity and heartbeat of members are transmitted. Their state and freshness tick are local
//! to each node.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::{error::DecodeError, membership::MemberRecord, node::Address};

mod entries;

pub use self::entries::ENTRY_SIZE;

pub const HEADER_SIZE: usize = 1 + 4;
const JOIN_REQUEST_BODY_SIZE: usize = 4 + 2 + 8;

#[repr(u8)]
#[derive(Debug, PartialEq, Eq, Clone, Copy, TryFromPrimitive, IntoPrimitive)]
pub enum MessageType {
    JoinRequest = 0,
    JoinReply = 1,
    Gossip = 2,
}

/// Messages exchanged by the membership protocol
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Message {
    /// Sent by a node to the bootstrap node when it wants to join the group
    JoinRequest { sender: Address, heartbeat: i64 },
    /// Answers a join request with a snapshot of the responder's table
    JoinReply { members: Vec<MemberRecord> },
    /// Sent every tick to a random subset of peers, with a snapshot of the sender's table
    Gossip { members: Vec<MemberRecord> },
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::JoinRequest { .. } => MessageType::JoinRequest,
            Message::JoinReply { .. } => MessageType::JoinReply,
            Message::Gossip { .. } => MessageType::Gossip,
        }
    }

    pub fn encode(&self) -> Bytes {
        encode(self)
    }

    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        decode(payload)
    }
}

pub fn encode(message: &Message) -> Bytes {
    match message {
        Message::JoinRequest { sender, heartbeat } => {
            let mut buf = BytesMut::with_capacity(HEADER_SIZE + JOIN_REQUEST_BODY_SIZE);
            buf.put_u8(MessageType::JoinRequest.into());
            buf.put_u32_le(0);
            buf.put_u32_le(sender.id);
            buf.put_u16_le(sender.port);
            buf.put_i64_le(*heartbeat);
            buf.freeze()
        }
        Message::JoinReply { members } | Message::Gossip { members } => {
            let mut buf = BytesMut::with_capacity(HEADER_SIZE + members.len() * ENTRY_SIZE);
            buf.put_u8(message.message_type().into());
            // A table never holds anywhere near u32::MAX members
            buf.put_u32_le(members.len() as u32);
            for member in members {
                entries::put_entry(&mut buf, member);
            }
            buf.freeze()
        }
    }
}

pub fn decode(payload: &[u8]) -> Result<Message, DecodeError> {
    if payload.len() < HEADER_SIZE {
        return Err(DecodeError::TooShort {
            expected: HEADER_SIZE,
            actual: payload.len(),
        });
    }

    let mut buf = payload;
    let tag = buf.get_u8();
    let entry_count = buf.get_u32_le();
    let message_type =
        MessageType::try_from(tag).map_err(|_| DecodeError::UnknownMessageType(tag))?;

    match message_type {
        MessageType::JoinRequest => {
            if entry_count != 0 {
                return Err(DecodeError::UnexpectedEntries(entry_count));
            }
            if buf.remaining() < JOIN_REQUEST_BODY_SIZE {
                return Err(DecodeError::TooShort {
                    expected: HEADER_SIZE + JOIN_REQUEST_BODY_SIZE,
                    actual: payload.len(),
                });
            }
            let id = buf.get_u32_le();
            let port = buf.get_u16_le();
            let heartbeat = buf.get_i64_le();
            Ok(Message::JoinRequest {
                sender: Address::new(id, port),
                heartbeat,
            })
        }
        MessageType::JoinReply => Ok(Message::JoinReply {
            members: entries::get_entries(&mut buf, entry_count)?,
        }),
        MessageType::Gossip => Ok(Message::Gossip {
            members: entries::get_entries(&mut buf, entry_count)?,
        }),
    }
}
