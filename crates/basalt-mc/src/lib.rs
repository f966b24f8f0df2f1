//! Minecraft protocol implementation for Basalt.
//!
//! This crate provides the wire-level pieces of the protocol: `VarInt` and
//! field codecs, the frame codec with optional zlib compression, the
//! versioned packet ID table and typed packet structs for protocol 340
//! (1.12.2) and, behind the `protocol-47` feature, protocol 47 (1.8).

pub mod codec;
pub mod error;
pub mod packets;
pub mod table;
pub mod types;
pub mod varint;
pub mod version;

pub use codec::{Frame, FrameCodec, RawPacket};
pub use error::ProtocolError;
pub use table::{ConnectionState, Direction, PacketName, ProtocolTable};
pub use version::ProtocolVersion;
