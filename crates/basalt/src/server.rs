//! Shared server context and the accept loop.

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use basalt_mc::ProtocolTable;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::auth::{AuthError, AuthKeys, SessionVerifier};
use crate::config::ServerProperties;
use crate::connection::Connection;
use crate::dispatcher::Dispatcher;
use crate::registry::SessionRegistry;

/// Error type for server setup.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to generate server keys: {0}")]
    Auth(#[from] AuthError),
}

/// Everything connections share: configuration, keys, the session registry,
/// the dispatcher and the protocol table.
pub struct Server {
    properties: ServerProperties,
    keys: Arc<AuthKeys>,
    verifier: SessionVerifier,
    registry: SessionRegistry,
    dispatcher: Dispatcher,
    table: ProtocolTable,
    favicon: Option<String>,
    /// Session counter for logging
    connection_counter: AtomicUsize,
    entity_ids: AtomicI32,
}

impl Server {
    /// Create a server with a freshly generated keypair.
    ///
    /// # Errors
    ///
    /// Returns an error if key generation fails.
    pub fn new(properties: ServerProperties, dispatcher: Dispatcher) -> Result<Self, ServerError> {
        let keys = Arc::new(AuthKeys::generate()?);
        Ok(Self::with_keys(properties, dispatcher, keys))
    }

    /// Create a server that reuses an existing keypair.
    #[must_use]
    pub fn with_keys(
        properties: ServerProperties,
        dispatcher: Dispatcher,
        keys: Arc<AuthKeys>,
    ) -> Self {
        let verifier = SessionVerifier::new(&properties.session_server, properties.auth_timeout);
        let favicon = load_favicon(&properties.server_icon);

        Self {
            properties,
            keys,
            verifier,
            registry: SessionRegistry::new(),
            dispatcher,
            table: ProtocolTable::new(),
            favicon,
            connection_counter: AtomicUsize::new(0),
            entity_ids: AtomicI32::new(1),
        }
    }

    /// Accept connections forever, serving each on its own task.
    pub async fn run(self: Arc<Self>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((client, client_addr)) => {
                    let server = Arc::clone(&self);
                    let id = self.connection_counter.fetch_add(1, Ordering::SeqCst);
                    tokio::spawn(async move {
                        Connection::serve(server, client, client_addr, id).await;
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {e}");
                }
            }
        }
    }

    #[must_use]
    pub const fn properties(&self) -> &ServerProperties {
        &self.properties
    }

    #[must_use]
    pub fn keys(&self) -> &AuthKeys {
        &self.keys
    }

    #[must_use]
    pub const fn verifier(&self) -> &SessionVerifier {
        &self.verifier
    }

    #[must_use]
    pub const fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    #[must_use]
    pub const fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    #[must_use]
    pub const fn table(&self) -> &ProtocolTable {
        &self.table
    }

    /// The server icon as a `data:` URL, if one was loaded.
    #[must_use]
    pub fn favicon(&self) -> Option<&str> {
        self.favicon.as_deref()
    }

    /// Allocate an entity ID for a joining player.
    pub fn next_entity_id(&self) -> i32 {
        self.entity_ids.fetch_add(1, Ordering::SeqCst)
    }
}

/// Read the server icon and encode it for the status response.
fn load_favicon(path: &Path) -> Option<String> {
    match std::fs::read(path) {
        Ok(png) => {
            info!(path = %path.display(), "Loaded server icon");
            Some(format!("data:image/png;base64,{}", STANDARD.encode(png)))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => {
            warn!(path = %path.display(), "Failed to read server icon: {e}");
            None
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::OnceLock;

    use super::*;

    /// One keypair for every unit test; generation is slow.
    pub(crate) fn test_keys() -> Arc<AuthKeys> {
        static KEYS: OnceLock<Arc<AuthKeys>> = OnceLock::new();
        Arc::clone(KEYS.get_or_init(|| Arc::new(AuthKeys::generate().unwrap())))
    }

    pub(crate) fn test_server() -> Arc<Server> {
        let properties = ServerProperties {
            server_icon: "/nonexistent/server-icon.png".into(),
            ..ServerProperties::default()
        };
        Arc::new(Server::with_keys(
            properties,
            Dispatcher::default(),
            test_keys(),
        ))
    }

    #[test]
    fn test_entity_ids_are_unique() {
        let server = test_server();
        let a = server.next_entity_id();
        let b = server.next_entity_id();
        assert_ne!(a, b);
    }

    #[test]
    fn test_favicon_is_data_url() {
        let path = std::env::temp_dir().join(format!("basalt-icon-{}.png", std::process::id()));
        std::fs::write(&path, b"\x89PNG").unwrap();
        let favicon = load_favicon(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(favicon, "data:image/png;base64,iVBORw==");
        assert!(load_favicon(Path::new("/nonexistent/icon.png")).is_none());
    }
}
