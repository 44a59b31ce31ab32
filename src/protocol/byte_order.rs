//! Network (big-endian) to host order conversion for frame length fields.

use crate::error::{Error, Result};

/// Decode a 16-bit extended payload length.
///
/// # Errors
///
/// Returns `Error::IncompleteFrame` if fewer than 2 bytes are supplied.
#[inline]
pub fn read_u16(bytes: &[u8]) -> Result<u16> {
    match bytes {
        [a, b, ..] => Ok(u16::from_be_bytes([*a, *b])),
        _ => Err(Error::IncompleteFrame {
            needed: 2 - bytes.len(),
        }),
    }
}

/// Decode a 64-bit extended payload length.
///
/// # Errors
///
/// Returns `Error::IncompleteFrame` if fewer than 8 bytes are supplied.
#[inline]
pub fn read_u64(bytes: &[u8]) -> Result<u64> {
    let raw: [u8; 8] = bytes
        .get(..8)
        .and_then(|b| b.try_into().ok())
        .ok_or(Error::IncompleteFrame {
            needed: 8usize.saturating_sub(bytes.len()),
        })?;
    Ok(u64::from_be_bytes(raw))
}

/// Encode a 16-bit length in network order.
#[inline]
#[must_use]
pub const fn write_u16(value: u16) -> [u8; 2] {
    value.to_be_bytes()
}

/// Encode a 64-bit length in network order.
#[inline]
#[must_use]
pub const fn write_u64(value: u64) -> [u8; 8] {
    value.to_be_bytes()
}
