//! The login state: authentication and entry into play.
//!
//! Online mode runs the encryption handshake and verifies the session with
//! the session server; offline mode derives the UUID from the name. Either
//! way the player is registered, switched to play and sent the packets that
//! spawn them. Every failure closes the connection with a reason the client
//! shows; no session is created in that case.

use std::sync::Arc;
use std::time::{Duration, Instant};

use basalt_mc::packets::play::{clientbound, serverbound};
use basalt_mc::packets::{
    EncryptionRequest, EncryptionResponse, LoginStart, LoginSuccess, Readable,
};
use basalt_mc::types::Position;
use basalt_mc::{ConnectionState, Frame, PacketName, ProtocolError};
use bytes::Bytes;
use tracing::{Instrument, debug, info, warn};

use crate::auth::{AuthError, PlayerProfile, offline_uuid};
use crate::connection::{Connection, ConnectionError};
use crate::dispatcher::{Event, EventKind};
use crate::registry::{RegistryError, Session};

/// How long a client has to answer a keep-alive.
pub const KEEP_ALIVE_TIMEOUT: Duration = Duration::from_secs(30);

/// Teleport IDs are drawn from `0..TELEPORT_ID_RANGE`.
const TELEPORT_ID_RANGE: i32 = 1 << 20;

/// Where players spawn.
const SPAWN: (i32, i32, i32) = (0, 64, 0);

/// Progress through the login state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoginStage {
    #[default]
    AwaitingStart,
    AwaitingEncryption,
    Complete,
}

/// Error type for the login flow.
#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Unexpected {packet:?} while {stage:?}")]
    UnexpectedPacket {
        packet: PacketName,
        stage: LoginStage,
    },

    #[error("Server is full")]
    Full,

    #[error("Player is already connected")]
    Duplicate,
}

impl From<RegistryError> for LoginError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::Full(_) => Self::Full,
            RegistryError::Duplicate(_) => Self::Duplicate,
        }
    }
}

impl LoginError {
    /// Reason shown to the client.
    #[must_use]
    pub fn disconnect_reason(&self) -> String {
        match self {
            Self::Full => "Server is full!".to_string(),
            Self::Duplicate => "You are already connected to this server!".to_string(),
            Self::Auth(AuthError::VerifyTokenMismatch) => "Invalid verify token!".to_string(),
            Self::Auth(
                AuthError::SessionVerification(_) | AuthError::Timeout(_) | AuthError::Http(_),
            ) => "Failed to verify username!".to_string(),
            Self::Auth(
                AuthError::Rsa(_) | AuthError::Pkcs8(_) | AuthError::InvalidSharedSecret(_),
            ) => "Invalid encryption response!".to_string(),
            Self::Protocol(e) => format!("Protocol error: {e}"),
            Self::UnexpectedPacket { packet, .. } => {
                format!("Protocol error: unexpected {packet:?} during login")
            }
            Self::Connection(e) => e
                .disconnect_reason()
                .unwrap_or_else(|| "Internal server error".to_string()),
        }
    }
}

/// Handle a frame received in the login state.
pub(crate) async fn handle(conn: &Arc<Connection>, frame: Frame) {
    if let Err(e) = process(conn, frame).await {
        warn!("Login failed: {e}");
        conn.close_connection(e.disconnect_reason());
    }
}

async fn process(conn: &Arc<Connection>, frame: Frame) -> Result<(), LoginError> {
    let stage = conn.login_stage();
    match (frame.name, stage) {
        (PacketName::LoginStart, LoginStage::AwaitingStart) => {
            on_login_start(conn, &frame.payload)
        }
        (PacketName::LoginEncryptionResponse, LoginStage::AwaitingEncryption) => {
            on_encryption_response(conn, &frame.payload).await
        }
        (packet, stage) => Err(LoginError::UnexpectedPacket { packet, stage }),
    }
}

fn on_login_start(conn: &Arc<Connection>, payload: &Bytes) -> Result<(), LoginError> {
    let start = LoginStart::decode(payload, conn.version())?;
    info!(username = %start.name, "Login started");
    conn.set_display_name(start.name.clone());

    let server = conn.server();
    let props = server.properties();
    if server.registry().count() >= props.max_players as usize {
        return Err(LoginError::Full);
    }

    if !props.online_mode {
        let profile = PlayerProfile {
            uuid: offline_uuid(&start.name),
            username: Some(start.name),
            properties: Vec::new(),
        };
        return complete(conn, profile);
    }

    conn.send(&EncryptionRequest::new(
        conn.server_id(),
        server.keys().public_key_der(),
        Bytes::copy_from_slice(conn.verify_token()),
    ))?;
    conn.set_login_stage(LoginStage::AwaitingEncryption);
    debug!("Sent encryption request");
    Ok(())
}

async fn on_encryption_response(
    conn: &Arc<Connection>,
    payload: &Bytes,
) -> Result<(), LoginError> {
    let response = EncryptionResponse::decode(payload, conn.version())?;
    let server = conn.server();

    let secret = server.keys().decrypt_response(
        &response.shared_secret,
        &response.verify_token,
        conn.verify_token(),
    )?;
    conn.enable_encryption(&secret)?;

    let hash = server.keys().calculate_server_hash(conn.server_id(), &secret);
    let username = conn.display_name().unwrap_or_default();
    let ip = server
        .properties()
        .prevent_proxy_connections
        .then(|| conn.peer().ip());

    let started = Instant::now();
    let profile = server.verifier().verify(&username, &hash, ip).await?;
    debug!(
        uuid = %profile.uuid,
        elapsed_ms = started.elapsed().as_millis(),
        "Session verified"
    );

    complete(conn, profile)
}

/// Register the player, switch to play and spawn them.
fn complete(conn: &Arc<Connection>, profile: PlayerProfile) -> Result<(), LoginError> {
    let server = conn.server();
    let props = server.properties();
    let PlayerProfile {
        uuid,
        username,
        properties,
    } = profile;
    // The session server may omit the name; keep the one from login start
    let username = username.or_else(|| conn.display_name()).unwrap_or_default();

    let session = Session::new(uuid, username.clone(), properties, Arc::clone(conn));
    server
        .registry()
        .try_add(session, props.max_players as usize)?;

    conn.set_uuid(uuid);
    conn.set_display_name(username.clone());
    conn.set_login_stage(LoginStage::Complete);
    conn.set_state(ConnectionState::Play);

    if let Some(threshold) = props.compression_threshold() {
        conn.enable_compression(threshold)?;
    }

    let version = conn.version();
    conn.send(&LoginSuccess::new(uuid, username.clone()))?;
    conn.send(&clientbound::JoinGame {
        entity_id: server.next_entity_id(),
        gamemode: props.gamemode,
        dimension: 0,
        difficulty: props.difficulty,
        max_players: u8::try_from(props.max_players).unwrap_or(u8::MAX),
        level_type: props.level_type.clone(),
        reduced_debug_info: false,
    })?;
    let (x, y, z) = SPAWN;
    conn.send(&clientbound::SpawnPosition {
        location: Position::new(x, y, z)?,
    })?;
    conn.send(&clientbound::PlayerAbilities::default())?;

    let teleport_id = if version.has_teleport_confirm() {
        let teleport_id = rand::random_range(0..TELEPORT_ID_RANGE);
        // Registered before the packet goes out so a fast reply is not lost
        let reply = conn.expect_packet(PacketName::TeleportConfirm);
        tokio::spawn(confirm_teleport(Arc::clone(conn), reply, teleport_id).in_current_span());
        teleport_id
    } else {
        0
    };
    conn.send(&clientbound::PlayerPositionAndLook {
        x: f64::from(x) + 0.5,
        y: f64::from(y),
        z: f64::from(z) + 0.5,
        yaw: 0.0,
        pitch: 0.0,
        flags: 0,
        teleport_id,
    })?;

    tokio::spawn(keep_alive(Arc::clone(conn), props.keep_alive_interval).in_current_span());

    info!(%uuid, %username, "Player joined");
    server
        .dispatcher()
        .dispatch(conn, Event::new(EventKind::PlayerJoin));
    Ok(())
}

async fn confirm_teleport(
    conn: Arc<Connection>,
    reply: crate::correlator::PendingReply,
    expected: i32,
) {
    let Some(payload) = reply.wait().await else {
        return;
    };

    match serverbound::TeleportConfirm::decode(&payload, conn.version()) {
        Ok(confirm) if confirm.teleport_id == expected => debug!(expected, "Teleport confirmed"),
        Ok(confirm) => conn.close_connection(format!(
            "Invalid teleport confirmation: got {}, expected {expected}",
            confirm.teleport_id
        )),
        Err(e) => conn.close_connection(format!("Protocol error: {e}")),
    }
}

/// Probe the client every `interval` until the connection closes.
async fn keep_alive(conn: Arc<Connection>, interval: Duration) {
    let version = conn.version();

    loop {
        tokio::select! {
            () = tokio::time::sleep(interval) => {}
            () = conn.closed() => return,
        }

        let expected = if version.long_keep_alive() {
            rand::random::<i64>()
        } else {
            i64::from(rand::random::<i32>())
        };

        let reply = conn.expect_packet(PacketName::KeepAlive);
        let sent_at = Instant::now();
        if conn.send(&clientbound::KeepAlive { id: expected }).is_err() {
            return;
        }

        let payload = match tokio::time::timeout(KEEP_ALIVE_TIMEOUT, reply.wait()).await {
            Ok(Some(payload)) => payload,
            Ok(None) => return,
            Err(_) => {
                conn.close_connection("Timed out");
                return;
            }
        };

        match serverbound::KeepAlive::decode(&payload, version) {
            Ok(echo) if echo.id == expected => {
                let ping_ms = u32::try_from(sent_at.elapsed().as_millis()).unwrap_or(u32::MAX);
                if let Some(uuid) = conn.uuid() {
                    conn.server().registry().update_ping(uuid, ping_ms);
                }
                debug!(ping_ms, "Keep-alive answered");
            }
            Ok(echo) => {
                conn.close_connection(format!(
                    "Invalid keep-alive: got {}, expected {expected}",
                    echo.id
                ));
                return;
            }
            Err(e) => {
                conn.close_connection(format!("Protocol error: {e}"));
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::correlator::Correlator;

    #[test]
    fn test_disconnect_reasons_are_distinct() {
        let reasons = [
            LoginError::Full.disconnect_reason(),
            LoginError::Duplicate.disconnect_reason(),
            LoginError::Auth(AuthError::VerifyTokenMismatch).disconnect_reason(),
            LoginError::Auth(AuthError::Timeout(Duration::from_secs(1))).disconnect_reason(),
            LoginError::Protocol(ProtocolError::VarIntTooLong).disconnect_reason(),
        ];
        assert_eq!(reasons[0], "Server is full!");
        assert_eq!(reasons[1], "You are already connected to this server!");
        assert_eq!(reasons[2], "Invalid verify token!");
        assert_eq!(reasons[3], "Failed to verify username!");
        assert!(reasons[4].starts_with("Protocol error"));

        let mut unique = reasons.to_vec();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), reasons.len());
    }

    #[test]
    fn test_registry_errors_map_to_login_errors() {
        assert!(matches!(
            LoginError::from(RegistryError::Full(20)),
            LoginError::Full
        ));
        assert!(matches!(
            LoginError::from(RegistryError::Duplicate(uuid::Uuid::nil())),
            LoginError::Duplicate
        ));
    }

    #[tokio::test]
    async fn test_confirm_teleport_mismatch_closes() {
        let (conn, _queue) = crate::connection::tests::test_connection();
        conn.set_state(ConnectionState::Play);

        let correlator = Correlator::new();
        let reply = correlator.register(PacketName::TeleportConfirm);
        let payload = basalt_mc::packets::Writable::encode(
            &serverbound::TeleportConfirm { teleport_id: 3 },
            conn.version(),
        );
        assert!(
            correlator
                .offer(Frame::new(PacketName::TeleportConfirm, payload))
                .is_none()
        );

        confirm_teleport(Arc::clone(&conn), reply, 4).await;
        assert!(!conn.is_open());
    }
}
