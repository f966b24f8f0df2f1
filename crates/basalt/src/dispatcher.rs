//! Routing play packets and lifecycle events to handlers.
//!
//! Packet names are remapped to a small set of [`EventKind`]s. Handlers are
//! registered per kind while the server starts and the table is immutable
//! afterwards. Each dispatch runs in its own task, so a slow handler never
//! holds up the read loop. Each handler call is a separate task as well: a
//! failing or panicking handler is logged and the remaining handlers still
//! run.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use basalt_mc::{Frame, PacketName};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, trace};

use crate::connection::Connection;

/// Error type returned by handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// What a handler reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    PlayerJoin,
    PlayerLeave,
    ChatMessage,
    TeleportConfirm,
    ClientSettings,
    PluginMessage,
    PlayerMove,
    Animation,
}

impl EventKind {
    /// The event a serverbound packet is delivered as.
    ///
    /// `None` means the packet is handled by the connection itself (or
    /// ignored) and never reaches handlers.
    #[must_use]
    pub const fn from_packet(name: PacketName) -> Option<Self> {
        match name {
            // Completion of the auth flow, emitted by the login code
            PacketName::LoginEncryptionResponse => Some(Self::PlayerJoin),
            PacketName::ChatMessage => Some(Self::ChatMessage),
            PacketName::TeleportConfirm => Some(Self::TeleportConfirm),
            PacketName::ClientSettings => Some(Self::ClientSettings),
            PacketName::PluginMessage => Some(Self::PluginMessage),
            PacketName::Player
            | PacketName::PlayerPosition
            | PacketName::PlayerLook
            | PacketName::PlayerPositionAndLook => Some(Self::PlayerMove),
            PacketName::Animation => Some(Self::Animation),
            _ => None,
        }
    }
}

/// An event handed to handlers.
#[derive(Debug, Clone)]
pub struct Event {
    pub kind: EventKind,
    /// The packet behind the event; `None` for lifecycle events.
    pub frame: Option<Frame>,
}

impl Event {
    /// A lifecycle event with no packet attached.
    #[must_use]
    pub const fn new(kind: EventKind) -> Self {
        Self { kind, frame: None }
    }

    #[must_use]
    pub const fn from_frame(kind: EventKind, frame: Frame) -> Self {
        Self {
            kind,
            frame: Some(frame),
        }
    }
}

/// Reacts to events on a connection.
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    /// Handle one event.
    ///
    /// # Errors
    ///
    /// Errors are logged with the event kind; they never close the
    /// connection.
    async fn handle(&self, conn: &Arc<Connection>, event: &Event) -> Result<(), HandlerError>;
}

/// Collects handlers before the server starts.
#[derive(Default)]
pub struct DispatcherBuilder {
    handlers: HashMap<EventKind, Vec<Arc<dyn EventHandler>>>,
}

impl DispatcherBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler for `kind`. Handlers for a kind run in the order they
    /// were added.
    pub fn on(&mut self, kind: EventKind, handler: Arc<dyn EventHandler>) -> &mut Self {
        self.handlers.entry(kind).or_default().push(handler);
        self
    }

    #[must_use]
    pub fn build(self) -> Dispatcher {
        Dispatcher {
            handlers: self.handlers,
        }
    }
}

/// Immutable handler table.
#[derive(Default)]
pub struct Dispatcher {
    handlers: HashMap<EventKind, Vec<Arc<dyn EventHandler>>>,
}

impl Dispatcher {
    /// Number of handlers registered for `kind`.
    #[must_use]
    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.handlers.get(&kind).map_or(0, Vec::len)
    }

    /// Run every handler for the event in a detached task.
    ///
    /// Returns `None` when no handler is registered for the kind.
    pub fn dispatch(&self, conn: &Arc<Connection>, event: Event) -> Option<JoinHandle<()>> {
        let Some(handlers) = self.handlers.get(&event.kind) else {
            debug!(kind = ?event.kind, "No handlers for event");
            return None;
        };

        let handlers = handlers.clone();
        let conn = Arc::clone(conn);
        let event = Arc::new(event);

        let task = async move {
            for handler in handlers {
                let kind = event.kind;
                let call = {
                    let conn = Arc::clone(&conn);
                    let event = Arc::clone(&event);
                    async move { handler.handle(&conn, &event).await }.in_current_span()
                };

                match tokio::spawn(call).await {
                    Ok(Ok(())) => trace!(?kind, "Handler finished"),
                    Ok(Err(e)) => error!(?kind, "Handler failed: {e}"),
                    Err(e) if e.is_panic() => error!(?kind, "Handler panicked: {e:?}"),
                    Err(e) => error!(?kind, "Handler task failed: {e}"),
                }
            }
        };

        Some(tokio::spawn(task.in_current_span()))
    }
}
