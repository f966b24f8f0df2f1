//! Registry of players that completed login.
//!
//! This is the only mutable state shared between connections. Every
//! operation takes the single lock briefly and never awaits while holding
//! it.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::auth::ProfileProperty;
use crate::connection::Connection;

/// Error type for registry insertion.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Registry is at capacity ({0} sessions)")]
    Full(usize),

    #[error("Session {0} is already registered")]
    Duplicate(Uuid),
}

/// A logged-in player.
#[derive(Debug, Clone)]
pub struct Session {
    /// Player UUID, unique in the registry.
    pub uuid: Uuid,
    /// Name shown to other players.
    pub display_name: String,
    /// Last measured keep-alive round trip.
    pub ping_ms: u32,
    /// Signed profile properties from the session server.
    pub properties: Vec<ProfileProperty>,
    /// The player's connection.
    pub connection: Arc<Connection>,
}

impl Session {
    #[must_use]
    pub fn new(
        uuid: Uuid,
        display_name: impl Into<String>,
        properties: Vec<ProfileProperty>,
        connection: Arc<Connection>,
    ) -> Self {
        Self {
            uuid,
            display_name: display_name.into(),
            ping_ms: 0,
            properties,
            connection,
        }
    }
}

/// Sessions keyed by UUID.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<Uuid, Session>>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a session. Returns `false` if the UUID is already present.
    pub fn add(&self, session: Session) -> bool {
        let mut sessions = self.sessions.lock();
        if sessions.contains_key(&session.uuid) {
            return false;
        }
        sessions.insert(session.uuid, session);
        true
    }

    /// Insert a session if the UUID is free and fewer than `capacity`
    /// sessions exist. Both checks happen under the same lock.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] or [`RegistryError::Full`].
    pub fn try_add(&self, session: Session, capacity: usize) -> Result<(), RegistryError> {
        let mut sessions = self.sessions.lock();
        if sessions.contains_key(&session.uuid) {
            return Err(RegistryError::Duplicate(session.uuid));
        }
        if sessions.len() >= capacity {
            return Err(RegistryError::Full(capacity));
        }
        sessions.insert(session.uuid, session);
        Ok(())
    }

    pub fn remove(&self, uuid: Uuid) -> Option<Session> {
        self.sessions.lock().remove(&uuid)
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.sessions.lock().len()
    }

    #[must_use]
    pub fn find(&self, uuid: Uuid) -> Option<Session> {
        self.sessions.lock().get(&uuid).cloned()
    }

    /// Snapshot of every session.
    #[must_use]
    pub fn sessions(&self) -> Vec<Session> {
        self.sessions.lock().values().cloned().collect()
    }

    /// Record a keep-alive round trip. Returns `false` if the session is gone.
    pub fn update_ping(&self, uuid: Uuid, ping_ms: u32) -> bool {
        match self.sessions.lock().get_mut(&uuid) {
            Some(session) => {
                session.ping_ms = ping_ms;
                true
            }
            None => false,
        }
    }

    /// Call `f` for every session. The lock is released before `f` runs.
    pub fn broadcast<F>(&self, mut f: F)
    where
        F: FnMut(&Session),
    {
        for session in self.sessions() {
            f(&session);
        }
    }
}
