//! Play packets sent by the client.

use bytes::{Buf, BufMut, Bytes};

use super::play_packet;
use crate::codec::{
    read_bool, read_f32, read_f64, read_i8, read_i64, read_string, read_u8, write_string,
};
use crate::error::Result;
use crate::packets::traits::{Readable, Writable};
use crate::varint::{read_varint, write_varint};
use crate::version::ProtocolVersion;

/// Maximum locale length.
const MAX_LOCALE_LENGTH: usize = 16;

/// Maximum plugin channel name length.
const MAX_CHANNEL_LENGTH: usize = 20;

/// Maximum chat message length for a protocol version.
#[must_use]
pub const fn max_chat_length(version: ProtocolVersion) -> usize {
    if version.has_teleport_confirm() {
        256
    } else {
        100
    }
}

/// Teleport Confirm (client -> server), 340 only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeleportConfirm {
    /// ID from the server's position and look packet.
    pub teleport_id: i32,
}

play_packet!(TeleportConfirm, TeleportConfirm, Serverbound);

impl Readable for TeleportConfirm {
    fn read(buf: &mut impl Buf, _version: ProtocolVersion) -> Result<Self> {
        Ok(Self {
            teleport_id: read_varint(buf)?,
        })
    }
}

impl Writable for TeleportConfirm {
    fn write(&self, buf: &mut impl BufMut, _version: ProtocolVersion) {
        write_varint(buf, self.teleport_id);
    }
}

/// Keep Alive (client -> server).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepAlive {
    /// Echo of the server's keep-alive ID.
    pub id: i64,
}

play_packet!(KeepAlive, KeepAlive, Serverbound);

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

/// Chat Message (client -> server).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// Raw text typed by the player.
    pub message: String,
}

play_packet!(ChatMessage, ChatMessage, Serverbound);

impl Readable for ChatMessage {
    fn read(buf: &mut impl Buf, version: ProtocolVersion) -> Result<Self> {
        Ok(Self {
            message: read_string(buf, max_chat_length(version))?,
        })
    }
}

impl Writable for ChatMessage {
    fn write(&self, buf: &mut impl BufMut, _version: ProtocolVersion) {
        write_string(buf, &self.message);
    }
}

/// Client Settings (client -> server).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    /// e.g. `en_US` or `en_us`.
    pub locale: String,
    /// Render distance in chunks.
    pub view_distance: i8,
    /// 0 enabled, 1 commands only, 2 hidden.
    pub chat_mode: i32,
    /// Whether colours are shown in chat.
    pub chat_colors: bool,
    /// Displayed skin parts bit mask.
    pub skin_parts: u8,
    /// 0 left, 1 right. Always right on 47.
    pub main_hand: i32,
}

play_packet!(ClientSettings, ClientSettings, Serverbound);

impl Readable for ClientSettings {
    fn read(buf: &mut impl Buf, version: ProtocolVersion) -> Result<Self> {
        let modern = version.has_teleport_confirm();
        let locale = read_string(buf, MAX_LOCALE_LENGTH)?;
        let view_distance = read_i8(buf)?;
        let chat_mode = if modern {
            read_varint(buf)?
        } else {
            i32::from(read_i8(buf)?)
        };
        let chat_colors = read_bool(buf)?;
        let skin_parts = read_u8(buf)?;
        let main_hand = if modern { read_varint(buf)? } else { 1 };

        Ok(Self {
            locale,
            view_distance,
            chat_mode,
            chat_colors,
            skin_parts,
            main_hand,
        })
    }
}

impl Writable for ClientSettings {
    #[allow(clippy::cast_possible_truncation)]
    fn write(&self, buf: &mut impl BufMut, version: ProtocolVersion) {
        let modern = version.has_teleport_confirm();
        write_string(buf, &self.locale);
        buf.put_i8(self.view_distance);
        if modern {
            write_varint(buf, self.chat_mode);
        } else {
            buf.put_i8(self.chat_mode as i8);
        }
        buf.put_u8(u8::from(self.chat_colors));
        buf.put_u8(self.skin_parts);
        if modern {
            write_varint(buf, self.main_hand);
        }
    }
}

/// Plugin Message (client -> server).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginMessage {
    /// Channel name, e.g. `MC|Brand`.
    pub channel: String,
    /// The rest of the packet.
    pub data: Bytes,
}

play_packet!(PluginMessage, PluginMessage, Serverbound);

impl Readable for PluginMessage {
    fn read(buf: &mut impl Buf, _version: ProtocolVersion) -> Result<Self> {
        let channel = read_string(buf, MAX_CHANNEL_LENGTH)?;
        let len = buf.remaining();
        let data = buf.copy_to_bytes(len);
        Ok(Self { channel, data })
    }
}

impl Writable for PluginMessage {
    fn write(&self, buf: &mut impl BufMut, _version: ProtocolVersion) {
        write_string(buf, &self.channel);
        buf.put_slice(&self.data);
    }
}

/// Player (client -> server): on-ground flag only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Player {
    /// Whether the player is on the ground.
    pub on_ground: bool,
}

play_packet!(Player, Player, Serverbound);

impl Readable for Player {
    fn read(buf: &mut impl Buf, _version: ProtocolVersion) -> Result<Self> {
        Ok(Self {
            on_ground: read_bool(buf)?,
        })
    }
}

impl Writable for Player {
    fn write(&self, buf: &mut impl BufMut, _version: ProtocolVersion) {
        buf.put_u8(u8::from(self.on_ground));
    }
}

/// Player Position (client -> server).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerPosition {
    /// X coordinate.
    pub x: f64,
    /// Y coordinate of the feet.
    pub y: f64,
    /// Z coordinate.
    pub z: f64,
    /// Whether the player is on the ground.
    pub on_ground: bool,
}

play_packet!(PlayerPosition, PlayerPosition, Serverbound);

impl Readable for PlayerPosition {
    fn read(buf: &mut impl Buf, _version: ProtocolVersion) -> Result<Self> {
        Ok(Self {
            x: read_f64(buf)?,
            y: read_f64(buf)?,
            z: read_f64(buf)?,
            on_ground: read_bool(buf)?,
        })
    }
}

impl Writable for PlayerPosition {
    fn write(&self, buf: &mut impl BufMut, _version: ProtocolVersion) {
        buf.put_f64(self.x);
        buf.put_f64(self.y);
        buf.put_f64(self.z);
        buf.put_u8(u8::from(self.on_ground));
    }
}

/// Player Look (client -> server).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerLook {
    /// Yaw in degrees.
    pub yaw: f32,
    /// Pitch in degrees.
    pub pitch: f32,
    /// Whether the player is on the ground.
    pub on_ground: bool,
}

play_packet!(PlayerLook, PlayerLook, Serverbound);

impl Readable for PlayerLook {
    fn read(buf: &mut impl Buf, _version: ProtocolVersion) -> Result<Self> {
        Ok(Self {
            yaw: read_f32(buf)?,
            pitch: read_f32(buf)?,
            on_ground: read_bool(buf)?,
        })
    }
}

impl Writable for PlayerLook {
    fn write(&self, buf: &mut impl BufMut, _version: ProtocolVersion) {
        buf.put_f32(self.yaw);
        buf.put_f32(self.pitch);
        buf.put_u8(u8::from(self.on_ground));
    }
}

/// Player Position And Look (client -> server).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerPositionAndLook {
    /// X coordinate.
    pub x: f64,
    /// Y coordinate of the feet.
    pub y: f64,
    /// Z coordinate.
    pub z: f64,
    /// Yaw in degrees.
    pub yaw: f32,
    /// Pitch in degrees.
    pub pitch: f32,
    /// Whether the player is on the ground.
    pub on_ground: bool,
}

play_packet!(PlayerPositionAndLook, PlayerPositionAndLook, Serverbound);

impl Readable for PlayerPositionAndLook {
    fn read(buf: &mut impl Buf, _version: ProtocolVersion) -> Result<Self> {
        Ok(Self {
            x: read_f64(buf)?,
            y: read_f64(buf)?,
            z: read_f64(buf)?,
            yaw: read_f32(buf)?,
            pitch: read_f32(buf)?,
            on_ground: read_bool(buf)?,
        })
    }
}

impl Writable for PlayerPositionAndLook {
    fn write(&self, buf: &mut impl BufMut, _version: ProtocolVersion) {
        buf.put_f64(self.x);
        buf.put_f64(self.y);
        buf.put_f64(self.z);
        buf.put_f32(self.yaw);
        buf.put_f32(self.pitch);
        buf.put_u8(u8::from(self.on_ground));
    }
}

/// Animation (client -> server): arm swing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Animation {
    /// 0 main hand, 1 off hand. Always main hand on 47.
    pub hand: i32,
}

play_packet!(Animation, Animation, Serverbound);

impl Readable for Animation {
    fn read(buf: &mut impl Buf, version: ProtocolVersion) -> Result<Self> {
        let hand = if version.has_teleport_confirm() {
            read_varint(buf)?
        } else {
            0
        };
        Ok(Self { hand })
    }
}

impl Writable for Animation {
    fn write(&self, buf: &mut impl BufMut, version: ProtocolVersion) {
        if version.has_teleport_confirm() {
            write_varint(buf, self.hand);
        }
    }
}
