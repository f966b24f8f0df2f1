//! Handshake packet definitions.
//!
//! The handshake is the first packet sent by the client and determines
//! whether this is a status ping or a login attempt.

use bytes::{Buf, BufMut};

use crate::codec::{ensure_remaining, read_string, write_string};
use crate::error::{ProtocolError, Result};
use crate::packets::traits::{Packet, Readable, Writable};
use crate::table::{ConnectionState, Direction, PacketName};
use crate::varint::{read_varint, write_varint};
use crate::version::ProtocolVersion;

/// Maximum server address length.
const MAX_SERVER_ADDRESS: usize = 255;

/// The next state after handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextState {
    /// Status request (server list ping).
    Status = 1,
    /// Login request.
    Login = 2,
}

impl TryFrom<i32> for NextState {
    type Error = ProtocolError;

    fn try_from(value: i32) -> Result<Self> {
        match value {
            1 => Ok(Self::Status),
            2 => Ok(Self::Login),
            _ => Err(ProtocolError::InvalidNextState(value)),
        }
    }
}

/// Handshake packet sent by the client.
///
/// This is always the first packet in a connection. Its layout is the same
/// in every protocol version, which is what lets the server read it before
/// it knows the client's version.
#[derive(Debug, Clone)]
pub struct Handshake {
    /// The protocol version the client is using.
    pub protocol_version: i32,
    /// The server address the client connected to.
    pub server_address: String,
    /// The server port the client connected to.
    pub server_port: u16,
    /// The next state: Status (1) or Login (2).
    pub next_state: NextState,
}

impl Packet for Handshake {
    const NAME: PacketName = PacketName::Handshake;
    const STATE: ConnectionState = ConnectionState::Handshaking;
    const DIRECTION: Direction = Direction::Serverbound;
}

impl Readable for Handshake {
    fn read(buf: &mut impl Buf, _version: ProtocolVersion) -> Result<Self> {
        let protocol_version = read_varint(buf)?;
        let server_address = read_string(buf, MAX_SERVER_ADDRESS)?;
        ensure_remaining(buf, 2)?;
        let server_port = buf.get_u16();
        let next_state = NextState::try_from(read_varint(buf)?)?;

        Ok(Self {
            protocol_version,
            server_address,
            server_port,
            next_state,
        })
    }
}

impl Writable for Handshake {
    fn write(&self, buf: &mut impl BufMut, _version: ProtocolVersion) {
        write_varint(buf, self.protocol_version);
        write_string(buf, &self.server_address);
        buf.put_u16(self.server_port);
        write_varint(buf, self.next_state as i32);
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use super::*;

    #[test]
    fn test_handshake_roundtrip() {
        let original = Handshake {
            protocol_version: 340,
            server_address: "localhost".to_string(),
            server_port: 25565,
            next_state: NextState::Login,
        };

        let payload = original.encode(ProtocolVersion::V340);
        let parsed = Handshake::decode(&payload, ProtocolVersion::V340).unwrap();

        assert_eq!(parsed.protocol_version, original.protocol_version);
        assert_eq!(parsed.server_address, original.server_address);
        assert_eq!(parsed.server_port, original.server_port);
        assert_eq!(parsed.next_state, original.next_state);
    }

    #[test]
    fn test_next_state_conversion() {
        assert_eq!(NextState::try_from(1).unwrap(), NextState::Status);
        assert_eq!(NextState::try_from(2).unwrap(), NextState::Login);
        assert!(matches!(
            NextState::try_from(3),
            Err(ProtocolError::InvalidNextState(3))
        ));
        assert!(NextState::try_from(0).is_err());
    }

    #[test]
    fn test_truncated_handshake() {
        let mut buf = BytesMut::new();
        write_varint(&mut buf, 340);
        write_string(&mut buf, "localhost");
        buf.put_u8(0x63);

        let result = Handshake::read(&mut buf.freeze(), ProtocolVersion::V340);
        assert!(matches!(result, Err(ProtocolError::UnexpectedEof { .. })));
    }
}
