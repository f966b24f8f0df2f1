//! `VarInt` encoding/decoding for Minecraft protocol.
//!
//! Minecraft uses a variable-length integer encoding where each byte
//! uses 7 bits for data and 1 bit to indicate if more bytes follow.
//! Negative values are reinterpreted as `u32` before encoding, so they
//! always take the full 5 bytes.

use bytes::{Buf, BufMut};

use crate::error::{ProtocolError, Result};

/// Segment bits mask (lower 7 bits).
const SEGMENT_BITS: u8 = 0x7F;

/// Continue bit (high bit).
const CONTINUE_BIT: u8 = 0x80;

/// Maximum encoded length of a `VarInt`.
pub const MAX_VARINT_LEN: usize = 5;

/// Read a `VarInt` from a buffer.
///
/// # Errors
///
/// Returns an error if:
/// - The buffer ends before the final byte
/// - The `VarInt` is longer than 5 bytes
pub fn read_varint(buf: &mut impl Buf) -> Result<i32> {
    let mut value: i32 = 0;
    let mut position: u32 = 0;

    loop {
        if !buf.has_remaining() {
            return Err(ProtocolError::UnexpectedEof {
                needed: 1,
                remaining: 0,
            });
        }

        let byte = buf.get_u8();
        value |= i32::from(byte & SEGMENT_BITS) << position;

        if byte & CONTINUE_BIT == 0 {
            break;
        }

        position += 7;
        if position >= 32 {
            return Err(ProtocolError::VarIntTooLong);
        }
    }

    Ok(value)
}

/// Decode a `VarInt` from the start of a byte slice without consuming it.
///
/// Returns the value and the number of bytes it occupied, or `None` if the
/// slice ends in the middle of the `VarInt`.
///
/// # Errors
///
/// Returns an error if the `VarInt` is longer than 5 bytes.
pub fn peek_varint(bytes: &[u8]) -> Result<Option<(i32, usize)>> {
    let mut value: i32 = 0;

    for (index, &byte) in bytes.iter().enumerate() {
        if index >= MAX_VARINT_LEN {
            return Err(ProtocolError::VarIntTooLong);
        }

        #[allow(clippy::cast_possible_truncation)]
        let shift = (index * 7) as u32;
        value |= i32::from(byte & SEGMENT_BITS) << shift;

        if byte & CONTINUE_BIT == 0 {
            return Ok(Some((value, index + 1)));
        }
    }

    if bytes.len() >= MAX_VARINT_LEN {
        return Err(ProtocolError::VarIntTooLong);
    }

    Ok(None)
}

/// Write a `VarInt` to a buffer.
///
/// Returns the number of bytes written.
#[allow(clippy::cast_sign_loss, clippy::cast_possible_wrap)]
pub fn write_varint(buf: &mut impl BufMut, mut value: i32) -> usize {
    let mut bytes_written = 0;

    loop {
        #[allow(clippy::cast_possible_truncation)]
        let mut byte = (value & i32::from(SEGMENT_BITS)) as u8;
        value = ((value as u32) >> 7) as i32;

        if value != 0 {
            byte |= CONTINUE_BIT;
        }

        buf.put_u8(byte);
        bytes_written += 1;

        if value == 0 {
            break;
        }
    }

    bytes_written
}

/// Calculate the number of bytes needed to encode a `VarInt`.
#[must_use]
#[allow(clippy::cast_sign_loss)]
pub const fn varint_len(value: i32) -> usize {
    // Convert to unsigned for bit manipulation
    let value = value as u32;

    if value == 0 {
        return 1;
    }

    // Calculate the number of 7-bit segments needed
    let bits_needed = 32 - value.leading_zeros();
    (bits_needed as usize).div_ceil(7)
}
