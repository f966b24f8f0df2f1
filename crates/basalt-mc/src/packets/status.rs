//! Status protocol packets.
//!
//! The status protocol is used by clients to query server information
//! without joining. This packet format is stable across all supported
//! protocol versions.

use byteorder::{BigEndian, ByteOrder};
use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};

use crate::codec::{ensure_remaining, read_string, write_string};
use crate::error::Result;
use crate::packets::traits::{Packet, Readable, Writable};
use crate::table::{ConnectionState, Direction, PacketName};
use crate::types::Chat;
use crate::version::ProtocolVersion;

/// Maximum JSON response length (32 KiB).
const MAX_JSON_LENGTH: usize = 32 * 1024;

/// Status Request packet (client -> server).
///
/// This is an empty packet that requests server status.
#[derive(Debug, Clone, Default)]
pub struct StatusRequest;

impl Packet for StatusRequest {
    const NAME: PacketName = PacketName::StatusRequest;
    const STATE: ConnectionState = ConnectionState::Status;
    const DIRECTION: Direction = Direction::Serverbound;
}

impl Readable for StatusRequest {
    fn read(_buf: &mut impl Buf, _version: ProtocolVersion) -> Result<Self> {
        Ok(Self)
    }
}

impl Writable for StatusRequest {
    fn write(&self, _buf: &mut impl BufMut, _version: ProtocolVersion) {}
}

/// Status Response packet (server -> client).
///
/// Contains a JSON object with server information.
#[derive(Debug, Clone)]
pub struct StatusResponse {
    /// JSON response containing server status.
    pub json: String,
}

impl StatusResponse {
    /// Create a new status response with the given JSON.
    #[must_use]
    pub fn new(json: impl Into<String>) -> Self {
        Self { json: json.into() }
    }
}

impl Packet for StatusResponse {
    const NAME: PacketName = PacketName::StatusResponse;
    const STATE: ConnectionState = ConnectionState::Status;
    const DIRECTION: Direction = Direction::Clientbound;
}

impl Readable for StatusResponse {
    fn read(buf: &mut impl Buf, _version: ProtocolVersion) -> Result<Self> {
        let json = read_string(buf, MAX_JSON_LENGTH)?;
        Ok(Self { json })
    }
}

impl Writable for StatusResponse {
    fn write(&self, buf: &mut impl BufMut, _version: ProtocolVersion) {
        write_string(buf, &self.json);
    }
}

/// Ping packet (client -> server).
///
/// Client sends a timestamp, server echoes it back.
#[derive(Debug, Clone)]
pub struct Ping {
    /// Arbitrary payload (usually a timestamp).
    pub payload: i64,
}

impl Ping {
    /// Create a new ping with the given payload.
    #[must_use]
    pub const fn new(payload: i64) -> Self {
        Self { payload }
    }
}

impl Packet for Ping {
    const NAME: PacketName = PacketName::StatusPing;
    const STATE: ConnectionState = ConnectionState::Status;
    const DIRECTION: Direction = Direction::Serverbound;
}

impl Readable for Ping {
    fn read(buf: &mut impl Buf, _version: ProtocolVersion) -> Result<Self> {
        Ok(Self {
            payload: read_timestamp(buf)?,
        })
    }
}

impl Writable for Ping {
    fn write(&self, buf: &mut impl BufMut, _version: ProtocolVersion) {
        write_timestamp(buf, self.payload);
    }
}

/// Pong packet (server -> client).
///
/// Server echoes back the ping payload.
#[derive(Debug, Clone)]
pub struct Pong {
    /// The payload from the ping packet.
    pub payload: i64,
}

impl Pong {
    /// Create a new pong with the given payload.
    #[must_use]
    pub const fn new(payload: i64) -> Self {
        Self { payload }
    }
}

impl Packet for Pong {
    const NAME: PacketName = PacketName::StatusPong;
    const STATE: ConnectionState = ConnectionState::Status;
    const DIRECTION: Direction = Direction::Clientbound;
}

impl Readable for Pong {
    fn read(buf: &mut impl Buf, _version: ProtocolVersion) -> Result<Self> {
        Ok(Self {
            payload: read_timestamp(buf)?,
        })
    }
}

impl Writable for Pong {
    fn write(&self, buf: &mut impl BufMut, _version: ProtocolVersion) {
        write_timestamp(buf, self.payload);
    }
}

fn read_timestamp(buf: &mut impl Buf) -> Result<i64> {
    ensure_remaining(buf, 8)?;
    let mut bytes = [0u8; 8];
    buf.copy_to_slice(&mut bytes);
    Ok(BigEndian::read_i64(&bytes))
}

fn write_timestamp(buf: &mut impl BufMut, value: i64) {
    let mut bytes = [0u8; 8];
    BigEndian::write_i64(&mut bytes, value);
    buf.put_slice(&bytes);
}

/// The JSON document carried by [`StatusResponse`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerStatus {
    /// Version the server reports.
    pub version: StatusVersion,
    /// Player counts and sample.
    pub players: StatusPlayers,
    /// Message of the day.
    pub description: Chat,
    /// `data:image/png;base64,...` icon.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favicon: Option<String>,
}

/// Version section of [`ServerStatus`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusVersion {
    /// Human-readable version name.
    pub name: String,
    /// Protocol number.
    pub protocol: i32,
}

/// Player section of [`ServerStatus`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusPlayers {
    /// Capacity.
    pub max: u32,
    /// Players currently in game.
    pub online: u32,
    /// A few online players.
    #[serde(default)]
    pub sample: Vec<PlayerSample>,
}

/// One entry of [`StatusPlayers::sample`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSample {
    /// Display name.
    pub name: String,
    /// Hyphenated UUID.
    pub id: String,
}

impl ServerStatus {
    /// Serialize to the JSON carried in [`StatusResponse`].
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
