//! Handshake and status handling.
//!
//! The handshake fixes the protocol version and picks the next state.
//! Status is a terminal state: the server answers the list ping and closes
//! once the pong is queued.

use std::sync::Arc;

use basalt_mc::packets::status::{PlayerSample, StatusPlayers, StatusVersion};
use basalt_mc::packets::{Handshake, NextState, Ping, Pong, Readable, ServerStatus, StatusResponse};
use basalt_mc::types::Chat;
use basalt_mc::{ConnectionState, Frame, PacketName, ProtocolVersion};
use tracing::{debug, warn};

use crate::connection::{Connection, ConnectionError};

/// Online players listed in a status response.
const STATUS_SAMPLE_SIZE: usize = 12;

/// Handle a frame received in the handshaking or status state.
pub(crate) fn handle(conn: &Arc<Connection>, frame: &Frame) -> Result<(), ConnectionError> {
    match frame.name {
        PacketName::Handshake => on_handshake(conn, frame),
        PacketName::StatusRequest => on_status_request(conn),
        PacketName::StatusPing => on_ping(conn, frame),
        other => Err(ConnectionError::UnexpectedPacket(other)),
    }
}

fn on_handshake(conn: &Arc<Connection>, frame: &Frame) -> Result<(), ConnectionError> {
    let handshake = Handshake::decode(&frame.payload, conn.version())?;
    debug!(
        protocol = handshake.protocol_version,
        address = %handshake.server_address,
        port = handshake.server_port,
        next_state = ?handshake.next_state,
        "Received handshake"
    );

    let supported = ProtocolVersion::from_raw(handshake.protocol_version);
    if let Some(version) = supported {
        conn.set_version(version)?;
    }

    match handshake.next_state {
        NextState::Status => conn.set_state(ConnectionState::Status),
        NextState::Login => {
            conn.set_state(ConnectionState::Login);
            if supported.is_none() {
                warn!(
                    protocol = handshake.protocol_version,
                    "Refusing login from unsupported version"
                );
                conn.close_connection(unsupported_reason(handshake.protocol_version));
            }
        }
    }

    Ok(())
}

/// Disconnect message for a client whose version is not compiled in.
fn unsupported_reason(protocol: i32) -> String {
    let names = ProtocolVersion::ALL
        .iter()
        .map(|v| v.name())
        .collect::<Vec<_>>()
        .join(", ");

    if protocol < ProtocolVersion::LATEST.as_raw() {
        format!("Outdated client! Please use {names}")
    } else {
        format!("Outdated server! I'm still on {names}")
    }
}

fn on_status_request(conn: &Arc<Connection>) -> Result<(), ConnectionError> {
    let server = conn.server();
    let props = server.properties();
    let version = conn.version();

    let sessions = server.registry().sessions();
    let sample = sessions
        .iter()
        .take(STATUS_SAMPLE_SIZE)
        .map(|s| PlayerSample {
            name: s.display_name.clone(),
            id: s.uuid.hyphenated().to_string(),
        })
        .collect();

    let status = ServerStatus {
        version: StatusVersion {
            name: version.name().to_string(),
            protocol: version.as_raw(),
        },
        players: StatusPlayers {
            max: props.max_players,
            online: u32::try_from(sessions.len()).unwrap_or(u32::MAX),
            sample,
        },
        description: Chat::text(&props.motd),
        favicon: server.favicon().map(str::to_string),
    };

    conn.send(&StatusResponse::new(status.to_json()?))?;
    debug!("Sent status response");
    Ok(())
}

fn on_ping(conn: &Arc<Connection>, frame: &Frame) -> Result<(), ConnectionError> {
    let ping = Ping::decode(&frame.payload, conn.version())?;
    debug!(payload = ping.payload, "Received ping");

    conn.send(&Pong::new(ping.payload))?;
    // The pong is already queued; the write loop drains it before closing
    conn.shutdown();
    Ok(())
}
