//! Protocol error types.

use std::io;

use thiserror::Error;

use crate::table::{ConnectionState, Direction, PacketName};
use crate::version::ProtocolVersion;

/// Errors that can occur when reading or writing Minecraft protocol data.
///
/// An incomplete frame is not an error: frame decoding reports it as
/// `Ok(None)` so the caller can wait for more bytes.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A `VarInt` was too long (more than 5 bytes).
    #[error("VarInt too long")]
    VarIntTooLong,

    /// A field ran past the end of a complete packet.
    #[error("Unexpected end of packet: needed {needed} bytes, {remaining} left")]
    UnexpectedEof {
        /// Bytes the field required.
        needed: usize,
        /// Bytes that were left in the packet.
        remaining: usize,
    },

    /// A string exceeded the maximum length.
    #[error("String too long: {len} bytes (max {max})")]
    StringTooLong {
        /// The actual length of the string.
        len: usize,
        /// The maximum allowed length.
        max: usize,
    },

    /// A packet exceeded the maximum length.
    #[error("Packet too long: {len} bytes (max {max})")]
    PacketTooLong {
        /// The actual length of the packet.
        len: usize,
        /// The maximum allowed length.
        max: usize,
    },

    /// A negative length prefix was received.
    #[error("Negative length prefix: {0}")]
    NegativeLength(i32),

    /// Field data could not be interpreted.
    #[error("Malformed packet: {0}")]
    Malformed(String),

    /// A compressed frame could not be inflated or deflated.
    #[error("Compression error: {0}")]
    Compression(String),

    /// A position coordinate does not fit its packed field.
    #[error("Position out of range: ({x}, {y}, {z})")]
    PositionOutOfRange {
        /// X coordinate.
        x: i32,
        /// Y coordinate.
        y: i32,
        /// Z coordinate.
        z: i32,
    },

    /// A packet ID has no mapping for the active version, state and direction.
    #[error("Unknown packet ID 0x{id:02x} ({direction:?}, {state:?}, protocol {})", version.as_raw())]
    UnknownPacketId {
        /// Active protocol version.
        version: ProtocolVersion,
        /// Active connection state.
        state: ConnectionState,
        /// Direction the packet travelled.
        direction: Direction,
        /// The unmapped packet ID.
        id: i32,
    },

    /// A packet name has no ID for the active version, state and direction.
    #[error("No packet ID for {name:?} ({direction:?}, {state:?}, protocol {})", version.as_raw())]
    UnknownPacketName {
        /// Active protocol version.
        version: ProtocolVersion,
        /// Active connection state.
        state: ConnectionState,
        /// Direction the packet would travel.
        direction: Direction,
        /// The unmapped packet name.
        name: PacketName,
    },

    /// An invalid next state was received in a handshake.
    #[error("Invalid next state: {0}")]
    InvalidNextState(i32),

    /// An unsupported protocol version was received.
    #[error("Unsupported protocol version: {0}")]
    UnsupportedProtocol(i32),
}

/// Result type alias using [`ProtocolError`].
pub type Result<T> = std::result::Result<T, ProtocolError>;
