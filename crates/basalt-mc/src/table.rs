//! Versioned mapping between on-wire packet IDs and logical packet names.
//!
//! The same logical packet can carry a different ID in each protocol
//! version, so every lookup is keyed by version, connection state and
//! direction. The table is built once and is read-only afterwards.

use std::collections::HashMap;

use crate::error::{ProtocolError, Result};
use crate::version::ProtocolVersion;

/// The connection state for a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Handshaking state (initial connection).
    Handshaking,
    /// Status state (server list ping).
    Status,
    /// Login state (authentication).
    Login,
    /// Play state (in-game).
    Play,
}

/// Which way a packet travels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Client to server.
    Serverbound,
    /// Server to client.
    Clientbound,
}

/// Logical packet names, independent of version and direction.
///
/// Some names exist in both directions (e.g. [`PacketName::KeepAlive`]);
/// the direction is part of every table key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketName {
    Handshake,

    StatusRequest,
    StatusResponse,
    StatusPing,
    StatusPong,

    LoginStart,
    LoginDisconnect,
    LoginEncryptionRequest,
    LoginEncryptionResponse,
    LoginSuccess,
    LoginSetCompression,

    KeepAlive,
    TeleportConfirm,
    ChatMessage,
    ClientSettings,
    PluginMessage,
    Player,
    PlayerPosition,
    PlayerLook,
    PlayerPositionAndLook,
    Animation,
    JoinGame,
    SpawnPosition,
    PlayerAbilities,
    Disconnect,
}

type Entry = (ConnectionState, Direction, i32, PacketName);

use ConnectionState::{Handshaking, Login, Play, Status};
use Direction::{Clientbound, Serverbound};

/// Packets whose IDs are the same in every supported version.
const COMMON: &[Entry] = &[
    (Handshaking, Serverbound, 0x00, PacketName::Handshake),
    (Status, Serverbound, 0x00, PacketName::StatusRequest),
    (Status, Serverbound, 0x01, PacketName::StatusPing),
    (Status, Clientbound, 0x00, PacketName::StatusResponse),
    (Status, Clientbound, 0x01, PacketName::StatusPong),
    (Login, Serverbound, 0x00, PacketName::LoginStart),
    (Login, Serverbound, 0x01, PacketName::LoginEncryptionResponse),
    (Login, Clientbound, 0x00, PacketName::LoginDisconnect),
    (Login, Clientbound, 0x01, PacketName::LoginEncryptionRequest),
    (Login, Clientbound, 0x02, PacketName::LoginSuccess),
    (Login, Clientbound, 0x03, PacketName::LoginSetCompression),
];

/// Play packets for protocol 340 (1.12.2).
const PLAY_340: &[Entry] = &[
    (Play, Serverbound, 0x00, PacketName::TeleportConfirm),
    (Play, Serverbound, 0x02, PacketName::ChatMessage),
    (Play, Serverbound, 0x04, PacketName::ClientSettings),
    (Play, Serverbound, 0x09, PacketName::PluginMessage),
    (Play, Serverbound, 0x0B, PacketName::KeepAlive),
    (Play, Serverbound, 0x0C, PacketName::Player),
    (Play, Serverbound, 0x0D, PacketName::PlayerPosition),
    (Play, Serverbound, 0x0E, PacketName::PlayerPositionAndLook),
    (Play, Serverbound, 0x0F, PacketName::PlayerLook),
    (Play, Serverbound, 0x1D, PacketName::Animation),
    (Play, Clientbound, 0x0F, PacketName::ChatMessage),
    (Play, Clientbound, 0x1A, PacketName::Disconnect),
    (Play, Clientbound, 0x1F, PacketName::KeepAlive),
    (Play, Clientbound, 0x23, PacketName::JoinGame),
    (Play, Clientbound, 0x2C, PacketName::PlayerAbilities),
    (Play, Clientbound, 0x2F, PacketName::PlayerPositionAndLook),
    (Play, Clientbound, 0x46, PacketName::SpawnPosition),
];

/// Play packets for protocol 47 (1.8.x).
#[cfg(feature = "protocol-47")]
const PLAY_47: &[Entry] = &[
    (Play, Serverbound, 0x00, PacketName::KeepAlive),
    (Play, Serverbound, 0x01, PacketName::ChatMessage),
    (Play, Serverbound, 0x03, PacketName::Player),
    (Play, Serverbound, 0x04, PacketName::PlayerPosition),
    (Play, Serverbound, 0x05, PacketName::PlayerLook),
    (Play, Serverbound, 0x06, PacketName::PlayerPositionAndLook),
    (Play, Serverbound, 0x0A, PacketName::Animation),
    (Play, Serverbound, 0x15, PacketName::ClientSettings),
    (Play, Serverbound, 0x17, PacketName::PluginMessage),
    (Play, Clientbound, 0x00, PacketName::KeepAlive),
    (Play, Clientbound, 0x01, PacketName::JoinGame),
    (Play, Clientbound, 0x02, PacketName::ChatMessage),
    (Play, Clientbound, 0x05, PacketName::SpawnPosition),
    (Play, Clientbound, 0x08, PacketName::PlayerPositionAndLook),
    (Play, Clientbound, 0x39, PacketName::PlayerAbilities),
    (Play, Clientbound, 0x40, PacketName::Disconnect),
];

const fn play_entries(version: ProtocolVersion) -> &'static [Entry] {
    match version {
        ProtocolVersion::V340 => PLAY_340,

        #[cfg(feature = "protocol-47")]
        ProtocolVersion::V47 => PLAY_47,
    }
}

type IdKey = (ProtocolVersion, ConnectionState, Direction, i32);
type NameKey = (ProtocolVersion, ConnectionState, Direction, PacketName);

/// Bidirectional packet ID table for every compiled-in protocol version.
#[derive(Debug, Clone)]
pub struct ProtocolTable {
    names: HashMap<IdKey, PacketName>,
    ids: HashMap<NameKey, i32>,
}

impl ProtocolTable {
    /// Build the table for all versions in [`ProtocolVersion::ALL`].
    #[must_use]
    pub fn new() -> Self {
        let mut names = HashMap::new();
        let mut ids = HashMap::new();

        for &version in ProtocolVersion::ALL {
            for &(state, direction, id, name) in COMMON.iter().chain(play_entries(version)) {
                names.insert((version, state, direction, id), name);
                ids.insert((version, state, direction, name), id);
            }
        }

        Self { names, ids }
    }

    /// Resolve a received packet ID to its logical name.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::UnknownPacketId`] if the ID is not defined
    /// for this version, state and direction.
    pub fn name_for(
        &self,
        version: ProtocolVersion,
        state: ConnectionState,
        direction: Direction,
        id: i32,
    ) -> Result<PacketName> {
        self.names
            .get(&(version, state, direction, id))
            .copied()
            .ok_or(ProtocolError::UnknownPacketId {
                version,
                state,
                direction,
                id,
            })
    }

    /// Resolve a logical packet name to its wire ID.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::UnknownPacketName`] if the name has no ID
    /// for this version, state and direction.
    pub fn id_for(
        &self,
        version: ProtocolVersion,
        state: ConnectionState,
        direction: Direction,
        name: PacketName,
    ) -> Result<i32> {
        self.ids
            .get(&(version, state, direction, name))
            .copied()
            .ok_or(ProtocolError::UnknownPacketName {
                version,
                state,
                direction,
                name,
            })
    }
}

impl Default for ProtocolTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_both_ways() {
        let table = ProtocolTable::new();
        let v = ProtocolVersion::V340;

        assert_eq!(
            table.name_for(v, Play, Clientbound, 0x23).unwrap(),
            PacketName::JoinGame
        );
        assert_eq!(
            table.id_for(v, Play, Clientbound, PacketName::JoinGame).unwrap(),
            0x23
        );
        assert_eq!(
            table.name_for(v, Handshaking, Serverbound, 0x00).unwrap(),
            PacketName::Handshake
        );
    }

    #[test]
    fn test_direction_is_part_of_key() {
        let table = ProtocolTable::new();
        let v = ProtocolVersion::V340;

        assert_eq!(
            table.id_for(v, Play, Serverbound, PacketName::KeepAlive).unwrap(),
            0x0B
        );
        assert_eq!(
            table.id_for(v, Play, Clientbound, PacketName::KeepAlive).unwrap(),
            0x1F
        );
    }

    #[test]
    fn test_unknown_id_is_protocol_error() {
        let table = ProtocolTable::new();
        let result = table.name_for(ProtocolVersion::V340, Login, Serverbound, 0x7F);
        assert!(matches!(
            result,
            Err(ProtocolError::UnknownPacketId { id: 0x7F, .. })
        ));

        // Play IDs are not valid while still logging in
        let result = table.name_for(ProtocolVersion::V340, Login, Serverbound, 0x0B);
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_name_is_error() {
        let table = ProtocolTable::new();
        let result = table.id_for(
            ProtocolVersion::V340,
            Status,
            Clientbound,
            PacketName::JoinGame,
        );
        assert!(matches!(
            result,
            Err(ProtocolError::UnknownPacketName {
                name: PacketName::JoinGame,
                ..
            })
        ));
    }

    #[test]
    #[cfg(feature = "protocol-47")]
    fn test_ids_differ_between_versions() {
        let table = ProtocolTable::new();

        assert_eq!(
            table
                .id_for(ProtocolVersion::V47, Play, Clientbound, PacketName::JoinGame)
                .unwrap(),
            0x01
        );
        assert_eq!(
            table
                .name_for(ProtocolVersion::V47, Play, Serverbound, 0x01)
                .unwrap(),
            PacketName::ChatMessage
        );
        assert_eq!(
            table
                .name_for(ProtocolVersion::V340, Play, Serverbound, 0x01)
                .ok(),
            None
        );
        assert!(
            table
                .id_for(
                    ProtocolVersion::V47,
                    Play,
                    Serverbound,
                    PacketName::TeleportConfirm
                )
                .is_err()
        );
    }

    #[test]
    fn test_every_entry_is_bidirectional() {
        let table = ProtocolTable::new();
        for (&(version, state, direction, id), &name) in &table.names {
            assert_eq!(table.id_for(version, state, direction, name).unwrap(), id);
        }
        assert_eq!(table.names.len(), table.ids.len());
    }
}
