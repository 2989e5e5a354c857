use bytes::{Buf, BufMut};

use crate::{error::DecodeError, membership::MemberRecord, node::Address};

/// Size of one packed member entry: id (u32), port (u16), heartbeat (i64)
pub const ENTRY_SIZE: usize = 4 + 2 + 8;

pub(super) fn put_entry(buf: &mut impl BufMut, member: &MemberRecord) {
    buf.put_u32_le(member.id);
    buf.put_u16_le(member.port);
    buf.put_i64_le(member.heartbeat);
}

/// Reads `entry_count` entries, after checking that the buffer actually holds them.
/// Decoded records are alive and carry no freshness tick; the receiver stamps them when merging.
pub(super) fn get_entries(
    buf: &mut impl Buf,
    entry_count: u32,
) -> Result<Vec<MemberRecord>, DecodeError> {
    let expected = (entry_count as usize)
        .checked_mul(ENTRY_SIZE)
        .unwrap_or(usize::MAX);
    if buf.remaining() < expected {
        return Err(DecodeError::Truncated {
            entries: entry_count,
            expected,
            actual: buf.remaining(),
        });
    }

    let mut members = Vec::with_capacity(entry_count as usize);
    for _ in 0..entry_count {
        let id = buf.get_u32_le();
        let port = buf.get_u16_le();
        let heartbeat = buf.get_i64_le();
        members.push(MemberRecord::new(Address::new(id, port), heartbeat, 0));
    }
    Ok(members)
}
