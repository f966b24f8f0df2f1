use std::sync::Arc;

use basalt::handlers::core_extension;
use basalt::{DispatcherBuilder, ExtensionRegistry, Server, ServerProperties};
use tokio::net::TcpListener;
use tracing::info;

/// Basalt: a Minecraft server speaking protocols 47 and 340.
///
/// Reads `server.properties` (or the file named by `BASALT_CONFIG`), loads the
/// registered extensions and serves clients until the process is killed.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let properties = ServerProperties::from_env()?;

    let mut extensions = ExtensionRegistry::new();
    extensions.register(core_extension());

    let mut dispatcher = DispatcherBuilder::new();
    let loaded = extensions.load(&mut dispatcher)?;
    info!(extensions = ?loaded, "Loaded extensions");

    let listen_addr = properties.bind_address();
    let online_mode = properties.online_mode;
    let server = Arc::new(Server::new(properties, dispatcher.build())?);
    let listener = TcpListener::bind(&listen_addr).await?;

    info!(online_mode, "Listening on {listen_addr}");

    server.run(listener).await;
    Ok(())
}
