//! Basalt server engine.
//!
//! Builds on [`basalt_mc`] to serve Minecraft clients: the connection actor,
//! online-mode authentication, the login flow, request/response correlation,
//! event dispatch to extensions and the session registry.

pub mod auth;
pub mod cipher;
pub mod config;
pub mod connection;
pub mod correlator;
pub mod dispatcher;
pub mod extension;
pub mod handlers;
pub mod login;
mod protocol;
pub mod registry;
pub mod server;
mod utils;

pub use config::ServerProperties;
pub use connection::{Connection, ConnectionError};
pub use dispatcher::{Dispatcher, DispatcherBuilder, Event, EventHandler, EventKind};
pub use extension::{ExtensionDescriptor, ExtensionRegistry};
pub use registry::{Session, SessionRegistry};
pub use server::{Server, ServerError};
