//! The built-in `basalt:core` extension.
//!
//! Provides chat broadcast, join and leave announcements, movement tracking
//! and logging of client settings and plugin channels.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use basalt_mc::packets::Readable;
use basalt_mc::packets::play::{clientbound, serverbound};
use basalt_mc::types::Chat;
use basalt_mc::{Frame, PacketName};
use parking_lot::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::connection::Connection;
use crate::dispatcher::{DispatcherBuilder, Event, EventHandler, EventKind, HandlerError};
use crate::extension::{Extension, ExtensionDescriptor};

/// ID of the built-in extension.
pub const CORE_EXTENSION_ID: &str = "basalt:core";

/// Descriptor for the built-in extension.
#[must_use]
pub fn core_extension() -> ExtensionDescriptor {
    ExtensionDescriptor::new(CORE_EXTENSION_ID, env!("CARGO_PKG_VERSION"), build_core)
}

fn build_core() -> Box<dyn Extension> {
    Box::new(CoreExtension)
}

struct CoreExtension;

impl Extension for CoreExtension {
    fn register(&self, dispatcher: &mut DispatcherBuilder) {
        let announcer = Arc::new(Announcer);
        let movement = Arc::new(MovementTracker::default());
        dispatcher
            .on(EventKind::ChatMessage, Arc::new(ChatBroadcast))
            .on(EventKind::PlayerJoin, Arc::clone(&announcer) as Arc<dyn EventHandler>)
            .on(EventKind::PlayerLeave, announcer)
            .on(EventKind::PlayerMove, Arc::clone(&movement) as Arc<dyn EventHandler>)
            .on(EventKind::PlayerLeave, movement)
            .on(EventKind::ClientSettings, Arc::new(ClientInfoLogger))
            .on(EventKind::PluginMessage, Arc::new(ClientInfoLogger));
    }
}

fn frame(event: &Event) -> Result<&Frame, HandlerError> {
    event
        .frame
        .as_ref()
        .ok_or_else(|| format!("{:?} event without a packet", event.kind).into())
}

/// Send a chat line to every logged-in player.
///
/// Each recipient gets the packet encoded for its own protocol version.
fn broadcast(conn: &Connection, message: &Chat) {
    conn.server().registry().broadcast(|session| {
        let packet = clientbound::ChatMessage::system(message.clone());
        if let Err(e) = session.connection.send(&packet) {
            debug!(to = %session.display_name, "Failed to deliver chat: {e}");
        }
    });
}

/// Relays chat as `<name> message`.
struct ChatBroadcast;

#[async_trait]
impl EventHandler for ChatBroadcast {
    async fn handle(&self, conn: &Arc<Connection>, event: &Event) -> Result<(), HandlerError> {
        let chat = serverbound::ChatMessage::decode(&frame(event)?.payload, conn.version())?;
        let message = chat.message.trim();
        if message.is_empty() {
            return Ok(());
        }

        let name = conn.display_name().unwrap_or_default();
        info!(player = %name, "<{name}> {message}");
        broadcast(conn, &Chat::text(format!("<{name}> {message}")));
        Ok(())
    }
}

/// Announces players joining and leaving.
struct Announcer;

#[async_trait]
impl EventHandler for Announcer {
    async fn handle(&self, conn: &Arc<Connection>, event: &Event) -> Result<(), HandlerError> {
        let name = conn.display_name().unwrap_or_default();
        let text = match event.kind {
            EventKind::PlayerJoin => format!("{name} joined the game"),
            EventKind::PlayerLeave => format!("{name} left the game"),
            other => return Err(format!("Announcer cannot handle {other:?}").into()),
        };
        broadcast(conn, &Chat::text(text).color("yellow"));
        Ok(())
    }
}

/// Last reported location of a player.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PlayerState {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub yaw: f32,
    pub pitch: f32,
    pub on_ground: bool,
}

impl PlayerState {
    /// Apply a movement packet.
    fn apply(&mut self, frame: &Frame, conn: &Connection) -> Result<(), HandlerError> {
        let version = conn.version();
        match frame.name {
            PacketName::Player => {
                let packet = serverbound::Player::decode(&frame.payload, version)?;
                self.on_ground = packet.on_ground;
            }
            PacketName::PlayerPosition => {
                let packet = serverbound::PlayerPosition::decode(&frame.payload, version)?;
                (self.x, self.y, self.z) = (packet.x, packet.y, packet.z);
                self.on_ground = packet.on_ground;
            }
            PacketName::PlayerLook => {
                let packet = serverbound::PlayerLook::decode(&frame.payload, version)?;
                (self.yaw, self.pitch) = (packet.yaw, packet.pitch);
                self.on_ground = packet.on_ground;
            }
            PacketName::PlayerPositionAndLook => {
                let packet = serverbound::PlayerPositionAndLook::decode(&frame.payload, version)?;
                (self.x, self.y, self.z) = (packet.x, packet.y, packet.z);
                (self.yaw, self.pitch) = (packet.yaw, packet.pitch);
                self.on_ground = packet.on_ground;
            }
            other => return Err(format!("{other:?} is not a movement packet").into()),
        }
        Ok(())
    }
}

/// Tracks where each player is.
#[derive(Default)]
pub struct MovementTracker {
    players: Mutex<HashMap<Uuid, PlayerState>>,
}

impl MovementTracker {
    /// Last known state of a player.
    #[must_use]
    pub fn get(&self, uuid: Uuid) -> Option<PlayerState> {
        self.players.lock().get(&uuid).copied()
    }
}

#[async_trait]
impl EventHandler for MovementTracker {
    async fn handle(&self, conn: &Arc<Connection>, event: &Event) -> Result<(), HandlerError> {
        let Some(uuid) = conn.uuid() else {
            return Ok(());
        };

        if event.kind == EventKind::PlayerLeave {
            self.players.lock().remove(&uuid);
            return Ok(());
        }

        let frame = frame(event)?;
        let mut players = self.players.lock();
        let state = players.entry(uuid).or_default();
        state.apply(frame, conn)
    }
}

/// Logs client settings and plugin channel traffic.
struct ClientInfoLogger;

#[async_trait]
impl EventHandler for ClientInfoLogger {
    async fn handle(&self, conn: &Arc<Connection>, event: &Event) -> Result<(), HandlerError> {
        let frame = frame(event)?;
        match event.kind {
            EventKind::ClientSettings => {
                let settings = serverbound::ClientSettings::decode(&frame.payload, conn.version())?;
                debug!(
                    locale = %settings.locale,
                    view_distance = settings.view_distance,
                    chat_mode = settings.chat_mode,
                    "Client settings"
                );
            }
            EventKind::PluginMessage => {
                let message = serverbound::PluginMessage::decode(&frame.payload, conn.version())?;
                debug!(channel = %message.channel, len = message.data.len(), "Plugin message");
            }
            _ => {}
        }
        Ok(())
    }
}
