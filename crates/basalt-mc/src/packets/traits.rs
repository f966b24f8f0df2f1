//! Packet traits for serialization and deserialization.
//!
//! These traits provide a common interface for reading and writing
//! Minecraft protocol packets across different protocol versions.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::Result;
use crate::table::{ConnectionState, Direction, PacketName};
use crate::version::ProtocolVersion;

/// A Minecraft protocol packet.
///
/// This trait provides metadata about a packet type. The wire ID is not
/// part of it: IDs depend on the protocol version and are resolved through
/// the [`ProtocolTable`](crate::table::ProtocolTable).
pub trait Packet {
    /// The logical packet name.
    const NAME: PacketName;

    /// The connection state this packet belongs to.
    const STATE: ConnectionState;

    /// The direction this packet travels.
    const DIRECTION: Direction;
}

/// A packet that can be read from a buffer.
///
/// Implementations should handle version-specific differences in packet format.
pub trait Readable: Sized {
    /// Read the packet from a buffer.
    ///
    /// # Arguments
    ///
    /// * `buf` - The buffer to read from
    /// * `version` - The protocol version to use for parsing
    ///
    /// # Errors
    ///
    /// Returns an error if the packet data is malformed.
    fn read(buf: &mut impl Buf, version: ProtocolVersion) -> Result<Self>;

    /// Read the packet from a complete payload.
    ///
    /// The payload handle is cloned, so the caller's cursor is untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the packet data is malformed.
    fn decode(payload: &Bytes, version: ProtocolVersion) -> Result<Self> {
        Self::read(&mut payload.clone(), version)
    }
}

/// A packet that can be written to a buffer.
///
/// Implementations should handle version-specific differences in packet format.
pub trait Writable {
    /// Write the packet to a buffer.
    ///
    /// # Arguments
    ///
    /// * `buf` - The buffer to write to
    /// * `version` - The protocol version to use for serialization
    fn write(&self, buf: &mut impl BufMut, version: ProtocolVersion);

    /// Write the packet into a fresh payload.
    fn encode(&self, version: ProtocolVersion) -> Bytes {
        let mut buf = BytesMut::new();
        self.write(&mut buf, version);
        buf.freeze()
    }
}
