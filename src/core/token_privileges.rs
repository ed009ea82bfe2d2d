//! TOKEN_PRIVILEGES buffer layout
//!
//! ```text
//! +------------------+----------------------------------------------+
//! | PrivilegeCount   | LUID_AND_ATTRIBUTES[PrivilegeCount]          |
//! | u32              | { LowPart u32, HighPart i32, Attributes u32 }|
//! +------------------+----------------------------------------------+
//! ```
//!
//! All fields are native-endian and 4-byte aligned, so the layout has no
//! padding. Parsing lives here so the core never casts platform buffers.

use super::platform::Luid;
use crate::constants::{
    ERROR_INVALID_DATA, SE_PRIVILEGE_ENABLED, SE_PRIVILEGE_ENABLED_BY_DEFAULT,
    SE_PRIVILEGE_REMOVED, SE_PRIVILEGE_USED_FOR_ACCESS,
};
use crate::utils::{PlatformError, SecurityError};
use bitflags::bitflags;

pub const HEADER_LEN: usize = 4;
pub const ENTRY_LEN: usize = 12;

bitflags! {
    /// SE_PRIVILEGE_* attribute bits of one token privilege
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PrivilegeAttributes: u32 {
        const ENABLED_BY_DEFAULT = SE_PRIVILEGE_ENABLED_BY_DEFAULT;
        const ENABLED = SE_PRIVILEGE_ENABLED;
        const REMOVED = SE_PRIVILEGE_REMOVED;
        const USED_FOR_ACCESS = SE_PRIVILEGE_USED_FOR_ACCESS;
    }
}

/// One LUID_AND_ATTRIBUTES entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrivilegeRecord {
    pub luid: Luid,
    pub attributes: PrivilegeAttributes,
}

/// Buffer size needed for `count` entries
pub fn encoded_len(count: usize) -> usize {
    HEADER_LEN + count * ENTRY_LEN
}

pub fn encode(records: &[PrivilegeRecord]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(encoded_len(records.len()));
    buf.extend_from_slice(&(records.len() as u32).to_ne_bytes());
    for record in records {
        buf.extend_from_slice(&record.luid.low.to_ne_bytes());
        buf.extend_from_slice(&record.luid.high.to_ne_bytes());
        buf.extend_from_slice(&record.attributes.bits().to_ne_bytes());
    }
    buf
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&buf[offset..offset + 4]);
    u32::from_ne_bytes(word)
}

/// Parse a TOKEN_PRIVILEGES buffer. Unknown attribute bits are kept.
pub fn decode(buf: &[u8]) -> Result<Vec<PrivilegeRecord>, SecurityError> {
    if buf.len() < HEADER_LEN {
        return Err(truncated(buf.len(), HEADER_LEN));
    }

    let count = read_u32(buf, 0) as usize;
    let needed = count
        .checked_mul(ENTRY_LEN)
        .and_then(|n| n.checked_add(HEADER_LEN))
        .ok_or_else(|| truncated(buf.len(), usize::MAX))?;
    if buf.len() < needed {
        return Err(truncated(buf.len(), needed));
    }

    Ok((0..count)
        .map(|i| {
            let at = HEADER_LEN + i * ENTRY_LEN;
            PrivilegeRecord {
                luid: Luid::new(read_u32(buf, at), read_u32(buf, at + 4) as i32),
                attributes: PrivilegeAttributes::from_bits_retain(read_u32(buf, at + 8)),
            }
        })
        .collect())
}

fn truncated(have: usize, need: usize) -> SecurityError {
    SecurityError::platform(
        "GetTokenInformation",
        PlatformError::new(
            ERROR_INVALID_DATA,
            format!("TOKEN_PRIVILEGES buffer truncated: {} of {} bytes", have, need),
        ),
    )
}
