//! Composite field types: packed block positions, chat components and UUIDs.

use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::codec::{ensure_remaining, read_string, write_string};
use crate::error::{ProtocolError, Result};

/// Maximum length of a serialized chat component.
pub const MAX_CHAT_LENGTH: usize = 262_144;

const XZ_BITS: u32 = 26;
const Y_BITS: u32 = 12;

const XZ_MIN: i32 = -(1 << (XZ_BITS - 1));
const XZ_MAX: i32 = (1 << (XZ_BITS - 1)) - 1;
const Y_MIN: i32 = -(1 << (Y_BITS - 1));
const Y_MAX: i32 = (1 << (Y_BITS - 1)) - 1;

/// A block position packed into a single 64-bit value.
///
/// Layout: x in the top 26 bits, y in the next 12, z in the low 26, each
/// field two's complement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Position {
    x: i32,
    y: i32,
    z: i32,
}

impl Position {
    /// Create a position, checking every coordinate fits its field.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::PositionOutOfRange`] if a coordinate is too
    /// large for the packed encoding.
    pub const fn new(x: i32, y: i32, z: i32) -> Result<Self> {
        if x < XZ_MIN || x > XZ_MAX || z < XZ_MIN || z > XZ_MAX || y < Y_MIN || y > Y_MAX {
            return Err(ProtocolError::PositionOutOfRange { x, y, z });
        }
        Ok(Self { x, y, z })
    }

    /// X coordinate.
    #[must_use]
    pub const fn x(&self) -> i32 {
        self.x
    }

    /// Y coordinate.
    #[must_use]
    pub const fn y(&self) -> i32 {
        self.y
    }

    /// Z coordinate.
    #[must_use]
    pub const fn z(&self) -> i32 {
        self.z
    }

    /// Pack into the wire representation.
    #[must_use]
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_wrap)]
    pub const fn to_packed(self) -> i64 {
        let x = (self.x as i64 as u64) & 0x3FF_FFFF;
        let y = (self.y as i64 as u64) & 0xFFF;
        let z = (self.z as i64 as u64) & 0x3FF_FFFF;
        ((x << 38) | (y << 26) | z) as i64
    }

    /// Unpack from the wire representation.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from_packed(value: i64) -> Self {
        // Arithmetic shifts sign-extend each field
        Self {
            x: (value >> 38) as i32,
            y: ((value << 26) >> 52) as i32,
            z: ((value << 38) >> 38) as i32,
        }
    }

    /// Read a packed position.
    ///
    /// # Errors
    ///
    /// Returns an error if fewer than 8 bytes remain.
    pub fn read(buf: &mut impl Buf) -> Result<Self> {
        ensure_remaining(buf, 8)?;
        Ok(Self::from_packed(buf.get_i64()))
    }

    /// Write a packed position.
    pub fn write(self, buf: &mut impl BufMut) {
        buf.put_i64(self.to_packed());
    }
}

/// A plain text chat component.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Chat {
    /// The text content.
    pub text: String,
    /// Named colour (e.g. `yellow`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl Chat {
    /// Create an uncoloured text component.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            color: None,
        }
    }

    /// Set the colour of this component.
    #[must_use]
    pub fn color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    /// Serialize to the JSON string sent on the wire.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| String::from(r#"{"text":""}"#))
    }

    /// Read a chat component.
    ///
    /// Plain JSON strings are accepted as bare text.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is too long or is not a chat component.
    pub fn read(buf: &mut impl Buf) -> Result<Self> {
        let json = read_string(buf, MAX_CHAT_LENGTH)?;
        let value: serde_json::Value =
            serde_json::from_str(&json).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

        match value {
            serde_json::Value::String(text) => Ok(Self::text(text)),
            other => serde_json::from_value(other).map_err(|e| ProtocolError::Malformed(e.to_string())),
        }
    }

    /// Write a chat component as a JSON string.
    pub fn write(&self, buf: &mut impl BufMut) {
        write_string(buf, &self.to_json());
    }
}

impl From<&str> for Chat {
    fn from(text: &str) -> Self {
        Self::text(text)
    }
}

impl From<String> for Chat {
    fn from(text: String) -> Self {
        Self::text(text)
    }
}

/// Read a UUID as 16 raw bytes.
///
/// # Errors
///
/// Returns an error if fewer than 16 bytes remain.
pub fn read_uuid(buf: &mut impl Buf) -> Result<Uuid> {
    ensure_remaining(buf, 16)?;
    let mut bytes = [0u8; 16];
    buf.copy_to_slice(&mut bytes);
    Ok(Uuid::from_bytes(bytes))
}

/// Write a UUID as 16 raw bytes.
pub fn write_uuid(buf: &mut impl BufMut, uuid: Uuid) {
    buf.put_slice(uuid.as_bytes());
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use super::*;

    #[test]
    fn test_position_extremes() {
        let cases = [
            (0, 0, 0),
            (1, 2, 3),
            (-1, -1, -1),
            (XZ_MAX, Y_MAX, XZ_MAX),
            (XZ_MIN, Y_MIN, XZ_MIN),
            (XZ_MIN, Y_MAX, XZ_MAX),
            (-33_554_432, 255, 33_554_431),
        ];

        for (x, y, z) in cases {
            let position = Position::new(x, y, z).unwrap();
            let decoded = Position::from_packed(position.to_packed());
            assert_eq!(decoded, position, "({x}, {y}, {z})");
        }
    }

    #[test]
    fn test_position_bit_layout() {
        assert_eq!(Position::new(1, 0, 0).unwrap().to_packed(), 1 << 38);
        assert_eq!(Position::new(0, 1, 0).unwrap().to_packed(), 1 << 26);
        assert_eq!(Position::new(0, 0, 1).unwrap().to_packed(), 1);
        assert_eq!(Position::new(0, 0, -1).unwrap().to_packed(), 0x3FF_FFFF);
        assert_eq!(Position::new(0, -1, 0).unwrap().to_packed(), 0xFFF << 26);
        assert!(Position::new(-1, 0, 0).unwrap().to_packed() < 0);
    }

    #[test]
    fn test_position_out_of_range() {
        assert!(matches!(
            Position::new(XZ_MAX + 1, 0, 0),
            Err(ProtocolError::PositionOutOfRange { .. })
        ));
        assert!(Position::new(0, Y_MIN - 1, 0).is_err());
        assert!(Position::new(0, 0, XZ_MIN - 1).is_err());
    }

    #[test]
    fn test_position_read_write() {
        let position = Position::new(-100, 64, 250).unwrap();
        let mut buf = BytesMut::new();
        position.write(&mut buf);
        assert_eq!(buf.len(), 8);
        assert_eq!(Position::read(&mut buf.freeze()).unwrap(), position);

        assert!(Position::read(&mut &[0u8; 7][..]).is_err());
    }

    #[test]
    fn test_chat_json() {
        assert_eq!(Chat::text("hi").to_json(), r#"{"text":"hi"}"#);
        assert_eq!(
            Chat::text("Steve joined the game").color("yellow").to_json(),
            r#"{"text":"Steve joined the game","color":"yellow"}"#
        );
    }

    #[test]
    fn test_chat_read_write() {
        let chat = Chat::text("hello").color("red");
        let mut buf = BytesMut::new();
        chat.write(&mut buf);
        assert_eq!(Chat::read(&mut buf.freeze()).unwrap(), chat);

        let mut buf = BytesMut::new();
        write_string(&mut buf, r#""bare""#);
        assert_eq!(Chat::read(&mut buf.freeze()).unwrap(), Chat::text("bare"));

        let mut buf = BytesMut::new();
        write_string(&mut buf, "not json");
        assert!(matches!(
            Chat::read(&mut buf.freeze()),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn test_uuid() {
        let uuid = Uuid::parse_str("069a79f4-44e9-4726-a5be-fca90e38aaf5").unwrap();
        let mut buf = BytesMut::new();
        write_uuid(&mut buf, uuid);
        assert_eq!(buf.len(), 16);
        assert_eq!(read_uuid(&mut buf.freeze()).unwrap(), uuid);
        assert!(read_uuid(&mut &[0u8; 15][..]).is_err());
    }
}
