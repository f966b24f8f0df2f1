//! Play packets sent by the server.

use bytes::{Buf, BufMut};

use super::play_packet;
use crate::codec::{
    read_bool, read_f32, read_f64, read_i8, read_i32, read_i64, read_string, read_u8,
    write_string,
};
use crate::error::Result;
use crate::packets::traits::{Readable, Writable};
use crate::types::{Chat, Position};
use crate::varint::{read_varint, write_varint};
use crate::version::ProtocolVersion;

/// Maximum level type length.
const MAX_LEVEL_TYPE_LENGTH: usize = 16;

/// Keep Alive (server -> client).
///
/// The ID is a `Long` on 340 and a `VarInt` on 47.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepAlive {
    /// Value the client must echo back.
    pub id: i64,
}

play_packet!(KeepAlive, KeepAlive, Clientbound);

impl Readable for KeepAlive {
    fn read(buf: &mut impl Buf, version: ProtocolVersion) -> Result<Self> {
        let id = if version.long_keep_alive() {
            read_i64(buf)?
        } else {
            i64::from(read_varint(buf)?)
        };
        Ok(Self { id })
    }
}

impl Writable for KeepAlive {
    #[allow(clippy::cast_possible_truncation)]
    fn write(&self, buf: &mut impl BufMut, version: ProtocolVersion) {
        if version.long_keep_alive() {
            buf.put_i64(self.id);
        } else {
            write_varint(buf, self.id as i32);
        }
    }
}

/// Join Game (server -> client).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinGame {
    /// The player's entity ID.
    pub entity_id: i32,
    /// Game mode (bit 3 is the hardcore flag).
    pub gamemode: u8,
    /// -1 nether, 0 overworld, 1 end.
    pub dimension: i32,
    /// 0 peaceful to 3 hard.
    pub difficulty: u8,
    /// Used by the client to size the player list.
    pub max_players: u8,
    /// e.g. `default`, `flat`.
    pub level_type: String,
    /// Hide coordinates from the debug screen.
    pub reduced_debug_info: bool,
}

play_packet!(JoinGame, JoinGame, Clientbound);

impl Readable for JoinGame {
    fn read(buf: &mut impl Buf, version: ProtocolVersion) -> Result<Self> {
        let entity_id = read_i32(buf)?;
        let gamemode = read_u8(buf)?;
        let dimension = if version.int_dimension() {
            read_i32(buf)?
        } else {
            i32::from(read_i8(buf)?)
        };

        Ok(Self {
            entity_id,
            gamemode,
            dimension,
            difficulty: read_u8(buf)?,
            max_players: read_u8(buf)?,
            level_type: read_string(buf, MAX_LEVEL_TYPE_LENGTH)?,
            reduced_debug_info: read_bool(buf)?,
        })
    }
}

impl Writable for JoinGame {
    #[allow(clippy::cast_possible_truncation)]
    fn write(&self, buf: &mut impl BufMut, version: ProtocolVersion) {
        buf.put_i32(self.entity_id);
        buf.put_u8(self.gamemode);
        if version.int_dimension() {
            buf.put_i32(self.dimension);
        } else {
            buf.put_i8(self.dimension as i8);
        }
        buf.put_u8(self.difficulty);
        buf.put_u8(self.max_players);
        write_string(buf, &self.level_type);
        buf.put_u8(u8::from(self.reduced_debug_info));
    }
}

/// Where a [`ChatMessage`] is displayed.
pub mod chat_position {
    /// Chat box.
    pub const CHAT: i8 = 0;
    /// System message in the chat box.
    pub const SYSTEM: i8 = 1;
    /// Above the hotbar.
    pub const GAME_INFO: i8 = 2;
}

/// Chat Message (server -> client).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// The message component.
    pub message: Chat,
    /// See [`chat_position`].
    pub position: i8,
}

impl ChatMessage {
    /// A message for the chat box.
    #[must_use]
    pub const fn chat(message: Chat) -> Self {
        Self {
            message,
            position: chat_position::CHAT,
        }
    }

    /// A system message for the chat box.
    #[must_use]
    pub const fn system(message: Chat) -> Self {
        Self {
            message,
            position: chat_position::SYSTEM,
        }
    }
}

play_packet!(ChatMessage, ChatMessage, Clientbound);

impl Readable for ChatMessage {
    fn read(buf: &mut impl Buf, _version: ProtocolVersion) -> Result<Self> {
        Ok(Self {
            message: Chat::read(buf)?,
            position: read_i8(buf)?,
        })
    }
}

impl Writable for ChatMessage {
    fn write(&self, buf: &mut impl BufMut, _version: ProtocolVersion) {
        self.message.write(buf);
        buf.put_i8(self.position);
    }
}

/// Spawn Position (server -> client).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpawnPosition {
    /// Where the compass points.
    pub location: Position,
}

play_packet!(SpawnPosition, SpawnPosition, Clientbound);

impl Readable for SpawnPosition {
    fn read(buf: &mut impl Buf, _version: ProtocolVersion) -> Result<Self> {
        Ok(Self {
            location: Position::read(buf)?,
        })
    }
}

impl Writable for SpawnPosition {
    fn write(&self, buf: &mut impl BufMut, _version: ProtocolVersion) {
        self.location.write(buf);
    }
}

/// Player Abilities (server -> client).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerAbilities {
    /// Bit field: invulnerable, flying, allow flying, creative.
    pub flags: i8,
    /// Flying speed.
    pub flying_speed: f32,
    /// Field of view modifier.
    pub walking_speed: f32,
}

impl Default for PlayerAbilities {
    fn default() -> Self {
        Self {
            flags: 0,
            flying_speed: 0.05,
            walking_speed: 0.1,
        }
    }
}

play_packet!(PlayerAbilities, PlayerAbilities, Clientbound);

impl Readable for PlayerAbilities {
    fn read(buf: &mut impl Buf, _version: ProtocolVersion) -> Result<Self> {
        Ok(Self {
            flags: read_i8(buf)?,
            flying_speed: read_f32(buf)?,
            walking_speed: read_f32(buf)?,
        })
    }
}

impl Writable for PlayerAbilities {
    fn write(&self, buf: &mut impl BufMut, _version: ProtocolVersion) {
        buf.put_i8(self.flags);
        buf.put_f32(self.flying_speed);
        buf.put_f32(self.walking_speed);
    }
}

/// Player Position And Look (server -> client).
///
/// On 340 the client must answer with a teleport confirmation carrying
/// `teleport_id`; 47 has no such field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerPositionAndLook {
    /// X coordinate.
    pub x: f64,
    /// Y coordinate (feet).
    pub y: f64,
    /// Z coordinate.
    pub z: f64,
    /// Yaw in degrees.
    pub yaw: f32,
    /// Pitch in degrees.
    pub pitch: f32,
    /// Bit field marking relative fields.
    pub flags: i8,
    /// Teleport confirmation ID (340 only).
    pub teleport_id: i32,
}

play_packet!(PlayerPositionAndLook, PlayerPositionAndLook, Clientbound);

impl Readable for PlayerPositionAndLook {
    fn read(buf: &mut impl Buf, version: ProtocolVersion) -> Result<Self> {
        Ok(Self {
            x: read_f64(buf)?,
            y: read_f64(buf)?,
            z: read_f64(buf)?,
            yaw: read_f32(buf)?,
            pitch: read_f32(buf)?,
            flags: read_i8(buf)?,
            teleport_id: if version.has_teleport_confirm() {
                read_varint(buf)?
            } else {
                0
            },
        })
    }
}

impl Writable for PlayerPositionAndLook {
    fn write(&self, buf: &mut impl BufMut, version: ProtocolVersion) {
        buf.put_f64(self.x);
        buf.put_f64(self.y);
        buf.put_f64(self.z);
        buf.put_f32(self.yaw);
        buf.put_f32(self.pitch);
        buf.put_i8(self.flags);
        if version.has_teleport_confirm() {
            write_varint(buf, self.teleport_id);
        }
    }
}

/// Disconnect (server -> client) for the play state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disconnect {
    /// The reason shown to the player.
    pub reason: Chat,
}

impl Disconnect {
    /// Create a disconnect with a plain text reason.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: Chat::text(reason),
        }
    }
}

play_packet!(Disconnect, Disconnect, Clientbound);

impl Readable for Disconnect {
    fn read(buf: &mut impl Buf, _version: ProtocolVersion) -> Result<Self> {
        Ok(Self {
            reason: Chat::read(buf)?,
        })
    }
}

impl Writable for Disconnect {
    fn write(&self, buf: &mut impl BufMut, _version: ProtocolVersion) {
        self.reason.write(buf);
    }
}
