//! Minecraft protocol packets.
//!
//! Packets are organized by connection state:
//! - Handshake: Initial connection state
//! - Status: Server list ping
//! - Login: Authentication and encryption
//! - Play: In-game, split by direction

pub mod handshake;
pub mod login;
pub mod play;
pub mod status;
pub mod traits;

pub use handshake::{Handshake, NextState};
pub use login::{
    EncryptionRequest, EncryptionResponse, LoginDisconnect, LoginStart, LoginSuccess,
    SetCompression,
};
pub use status::{Ping, Pong, ServerStatus, StatusRequest, StatusResponse};
pub use traits::{Packet, Readable, Writable};
