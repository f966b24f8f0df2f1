//! Login protocol packets.
//!
//! The login protocol handles player authentication. In online mode, this includes
//! encryption negotiation and Mojang session verification. This packet format is
//! stable across all supported protocol versions.

use bytes::{Buf, BufMut, Bytes};
use uuid::Uuid;

use crate::codec::{read_byte_array, read_string, write_byte_array, write_string};
use crate::error::{ProtocolError, Result};
use crate::packets::traits::{Packet, Readable, Writable};
use crate::table::{ConnectionState, Direction, PacketName};
use crate::types::Chat;
use crate::varint::{read_varint, write_varint};
use crate::version::ProtocolVersion;

/// Maximum username length (16 characters).
pub const MAX_USERNAME_LENGTH: usize = 16;

/// Maximum server ID length.
const MAX_SERVER_ID_LENGTH: usize = 20;

/// Maximum public key length (512 bytes for RSA-1024).
const MAX_PUBLIC_KEY_LENGTH: usize = 512;

/// Maximum encrypted field length.
const MAX_ENCRYPTED_LENGTH: usize = 256;

/// Length of a hyphenated UUID string.
const UUID_STRING_LENGTH: usize = 36;

macro_rules! login_packet {
    ($ty:ty, $name:ident, $direction:ident) => {
        impl Packet for $ty {
            const NAME: PacketName = PacketName::$name;
            const STATE: ConnectionState = ConnectionState::Login;
            const DIRECTION: Direction = Direction::$direction;
        }
    };
}

// =============================================================================
// LoginStart (Client -> Server)
// =============================================================================

/// Login Start packet (client -> server).
///
/// Sent by the client to begin the login process.
#[derive(Debug, Clone)]
pub struct LoginStart {
    /// The player's username.
    pub name: String,
}

impl LoginStart {
    /// Create a new login start packet.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

login_packet!(LoginStart, LoginStart, Serverbound);

impl Readable for LoginStart {
    fn read(buf: &mut impl Buf, _version: ProtocolVersion) -> Result<Self> {
        let name = read_string(buf, MAX_USERNAME_LENGTH)?;
        Ok(Self { name })
    }
}

impl Writable for LoginStart {
    fn write(&self, buf: &mut impl BufMut, _version: ProtocolVersion) {
        write_string(buf, &self.name);
    }
}

// =============================================================================
// EncryptionRequest (Server -> Client)
// =============================================================================

/// Encryption Request packet (server -> client).
///
/// Sent by the server to initiate encryption.
#[derive(Debug, Clone)]
pub struct EncryptionRequest {
    /// Server ID, mixed into the session hash.
    pub server_id: String,
    /// The server's public key (DER-encoded).
    pub public_key: Bytes,
    /// Random verify token.
    pub verify_token: Bytes,
}

impl EncryptionRequest {
    /// Create a new encryption request.
    #[must_use]
    pub fn new(server_id: impl Into<String>, public_key: Bytes, verify_token: Bytes) -> Self {
        Self {
            server_id: server_id.into(),
            public_key,
            verify_token,
        }
    }
}

login_packet!(EncryptionRequest, LoginEncryptionRequest, Clientbound);

impl Readable for EncryptionRequest {
    fn read(buf: &mut impl Buf, _version: ProtocolVersion) -> Result<Self> {
        let server_id = read_string(buf, MAX_SERVER_ID_LENGTH)?;
        let public_key = read_byte_array(buf, MAX_PUBLIC_KEY_LENGTH)?;
        let verify_token = read_byte_array(buf, MAX_ENCRYPTED_LENGTH)?;

        Ok(Self {
            server_id,
            public_key,
            verify_token,
        })
    }
}

impl Writable for EncryptionRequest {
    fn write(&self, buf: &mut impl BufMut, _version: ProtocolVersion) {
        write_string(buf, &self.server_id);
        write_byte_array(buf, &self.public_key);
        write_byte_array(buf, &self.verify_token);
    }
}

// =============================================================================
// EncryptionResponse (Client -> Server)
// =============================================================================

/// Encryption Response packet (client -> server).
///
/// Sent by the client in response to an encryption request.
#[derive(Debug, Clone)]
pub struct EncryptionResponse {
    /// The shared secret, encrypted with the server's public key.
    pub shared_secret: Bytes,
    /// The verify token, encrypted with the server's public key.
    pub verify_token: Bytes,
}

login_packet!(EncryptionResponse, LoginEncryptionResponse, Serverbound);

impl Readable for EncryptionResponse {
    fn read(buf: &mut impl Buf, _version: ProtocolVersion) -> Result<Self> {
        let shared_secret = read_byte_array(buf, MAX_ENCRYPTED_LENGTH)?;
        let verify_token = read_byte_array(buf, MAX_ENCRYPTED_LENGTH)?;

        Ok(Self {
            shared_secret,
            verify_token,
        })
    }
}

impl Writable for EncryptionResponse {
    fn write(&self, buf: &mut impl BufMut, _version: ProtocolVersion) {
        write_byte_array(buf, &self.shared_secret);
        write_byte_array(buf, &self.verify_token);
    }
}

// =============================================================================
// LoginSuccess (Server -> Client)
// =============================================================================

/// Login Success packet (server -> client).
///
/// Sent when login is complete. Client should transition to Play state.
/// Both supported versions send the UUID as a hyphenated string.
#[derive(Debug, Clone)]
pub struct LoginSuccess {
    /// The player's UUID.
    pub uuid: Uuid,
    /// The player's username.
    pub username: String,
}

impl LoginSuccess {
    /// Create a new login success packet.
    #[must_use]
    pub fn new(uuid: Uuid, username: impl Into<String>) -> Self {
        Self {
            uuid,
            username: username.into(),
        }
    }
}

login_packet!(LoginSuccess, LoginSuccess, Clientbound);

impl Readable for LoginSuccess {
    fn read(buf: &mut impl Buf, _version: ProtocolVersion) -> Result<Self> {
        let uuid = read_string(buf, UUID_STRING_LENGTH)?;
        let uuid = Uuid::parse_str(&uuid).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
        let username = read_string(buf, MAX_USERNAME_LENGTH)?;

        Ok(Self { uuid, username })
    }
}

impl Writable for LoginSuccess {
    fn write(&self, buf: &mut impl BufMut, _version: ProtocolVersion) {
        write_string(buf, &self.uuid.hyphenated().to_string());
        write_string(buf, &self.username);
    }
}

// =============================================================================
// SetCompression (Server -> Client)
// =============================================================================

/// Set Compression packet (server -> client).
///
/// Every frame after this one uses the compressed layout in both directions.
#[derive(Debug, Clone)]
pub struct SetCompression {
    /// Minimum packet size to compress.
    pub threshold: i32,
}

login_packet!(SetCompression, LoginSetCompression, Clientbound);

impl Readable for SetCompression {
    fn read(buf: &mut impl Buf, _version: ProtocolVersion) -> Result<Self> {
        Ok(Self {
            threshold: read_varint(buf)?,
        })
    }
}

impl Writable for SetCompression {
    fn write(&self, buf: &mut impl BufMut, _version: ProtocolVersion) {
        write_varint(buf, self.threshold);
    }
}

// =============================================================================
// LoginDisconnect (Server -> Client)
// =============================================================================

/// Disconnect packet for the login state (server -> client).
#[derive(Debug, Clone)]
pub struct LoginDisconnect {
    /// The reason shown to the player.
    pub reason: Chat,
}

impl LoginDisconnect {
    /// Create a disconnect with a plain text reason.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: Chat::text(reason),
        }
    }
}

login_packet!(LoginDisconnect, LoginDisconnect, Clientbound);

impl Readable for LoginDisconnect {
    fn read(buf: &mut impl Buf, _version: ProtocolVersion) -> Result<Self> {
        Ok(Self {
            reason: Chat::read(buf)?,
        })
    }
}

impl Writable for LoginDisconnect {
    fn write(&self, buf: &mut impl BufMut, _version: ProtocolVersion) {
        self.reason.write(buf);
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use super::*;

    const V: ProtocolVersion = ProtocolVersion::V340;

    #[test]
    fn test_login_start() {
        let payload = LoginStart::new("Notch").encode(V);
        assert_eq!(&payload[..], b"\x05Notch");
        assert_eq!(LoginStart::decode(&payload, V).unwrap().name, "Notch");
    }

    #[test]
    fn test_username_too_long() {
        let mut buf = BytesMut::new();
        write_string(&mut buf, "ThisNameIsWayTooLong");
        let result = LoginStart::decode(&buf.freeze(), V);
        assert!(matches!(result, Err(ProtocolError::StringTooLong { .. })));
    }

    #[test]
    fn test_encryption_request_roundtrip() {
        let original = EncryptionRequest::new(
            "0123456789abcdef0123",
            Bytes::from_static(&[0x30, 0x81, 0x9f]),
            Bytes::from_static(&[1, 2, 3, 4]),
        );
        let payload = original.encode(V);
        let parsed = EncryptionRequest::decode(&payload, V).unwrap();

        assert_eq!(parsed.server_id, original.server_id);
        assert_eq!(parsed.public_key, original.public_key);
        assert_eq!(parsed.verify_token, original.verify_token);
    }

    #[test]
    fn test_encryption_response_truncated() {
        let mut buf = BytesMut::new();
        write_varint(&mut buf, 128);
        buf.put_slice(&[0u8; 10]);
        let result = EncryptionResponse::decode(&buf.freeze(), V);
        assert!(matches!(result, Err(ProtocolError::UnexpectedEof { .. })));
    }

    #[test]
    fn test_login_success_uses_hyphenated_uuid() {
        let uuid = Uuid::parse_str("069a79f444e94726a5befca90e38aaf5").unwrap();
        let payload = LoginSuccess::new(uuid, "Notch").encode(V);

        let mut buf = payload.clone();
        let uuid_string = read_string(&mut buf, UUID_STRING_LENGTH).unwrap();
        assert_eq!(uuid_string, "069a79f4-44e9-4726-a5be-fca90e38aaf5");

        let parsed = LoginSuccess::decode(&payload, V).unwrap();
        assert_eq!(parsed.uuid, uuid);
        assert_eq!(parsed.username, "Notch");
    }

    #[test]
    fn test_set_compression() {
        let payload = SetCompression { threshold: 256 }.encode(V);
        assert_eq!(&payload[..], &[0x80, 0x02]);
        assert_eq!(SetCompression::decode(&payload, V).unwrap().threshold, 256);
    }

    #[test]
    fn test_login_disconnect_is_json() {
        let payload = LoginDisconnect::new("Server is full!").encode(V);
        let mut buf = payload.clone();
        let json = read_string(&mut buf, 1024).unwrap();
        assert_eq!(json, r#"{"text":"Server is full!"}"#);
        assert_eq!(
            LoginDisconnect::decode(&payload, V).unwrap().reason.text,
            "Server is full!"
        );
    }
}
