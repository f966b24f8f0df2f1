//! The per-client connection actor.
//!
//! Every accepted socket is served by one task that joins two loops:
//!
//! - the read loop decrypts incoming bytes, carves frames, resolves their
//!   names and routes them (correlator first, then the state machine or the
//!   dispatcher);
//! - the write loop drains the outbound queue in FIFO order.
//!
//! Outbound packets are encoded, compressed and encrypted under one lock
//! and queued as finished byte strings, so the cipher stream order is the
//! queue order.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use basalt_mc::packets::play::clientbound::Disconnect;
use basalt_mc::packets::{LoginDisconnect, Packet, SetCompression, Writable};
use basalt_mc::{
    ConnectionState, Direction, Frame, FrameCodec, PacketName, ProtocolError, ProtocolVersion,
    RawPacket,
};
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tracing::{Instrument, debug, error, info, info_span, trace, warn};
use uuid::Uuid;

use crate::auth::{VERIFY_TOKEN_SIZE, generate_server_id, generate_verify_token};
use crate::cipher::{Cipher, CipherError};
use crate::correlator::{Correlator, PendingReply};
use crate::dispatcher::{Event, EventKind};
use crate::login::{self, LoginStage};
use crate::protocol;
use crate::server::Server;

/// Bytes reserved for each socket read.
const READ_CHUNK: usize = 4096;

/// Frames a client may leave unread before it is dropped.
pub(crate) const OUTBOUND_QUEUE_CAPACITY: usize = 1024;

/// Error type for connection operations.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Cipher error: {0}")]
    Cipher(#[from] CipherError),

    #[error("Status serialization failed: {0}")]
    Status(#[from] serde_json::Error),

    #[error("Protocol version is already set to {0}")]
    VersionAlreadySet(i32),

    #[error("Unexpected {0:?} packet")]
    UnexpectedPacket(PacketName),

    #[error("Outbound queue is full")]
    Backlogged,

    #[error("Connection is closed")]
    Closed,
}

impl ConnectionError {
    /// Reason shown to the client when this error ends the connection.
    #[must_use]
    pub fn disconnect_reason(&self) -> Option<String> {
        match self {
            Self::Protocol(e) => Some(format!("Protocol error: {e}")),
            Self::VersionAlreadySet(_) | Self::UnexpectedPacket(_) => {
                Some(format!("Protocol error: {self}"))
            }
            Self::Io(_) | Self::Cipher(_) | Self::Status(_) | Self::Backlogged | Self::Closed => {
                None
            }
        }
    }
}

struct Inbound {
    cipher: Cipher,
    codec: FrameCodec,
}

struct Outbound {
    cipher: Cipher,
    codec: FrameCodec,
    queue: mpsc::Sender<Bytes>,
}

impl Outbound {
    fn push(&mut self, id: i32, payload: Bytes) -> Result<(), ConnectionError> {
        let mut buf = BytesMut::new();
        self.codec.encode(&RawPacket::new(id, payload), &mut buf)?;
        self.cipher.encrypt(&mut buf);
        self.queue.try_send(buf.freeze()).map_err(|e| match e {
            TrySendError::Full(_) => ConnectionError::Backlogged,
            TrySendError::Closed(_) => ConnectionError::Closed,
        })
    }
}

/// One client connection, shared by its loops and by handler tasks.
pub struct Connection {
    id: usize,
    peer: SocketAddr,
    server: Arc<Server>,
    state: Mutex<ConnectionState>,
    version: OnceLock<ProtocolVersion>,
    inbound: Mutex<Inbound>,
    outbound: Mutex<Outbound>,
    open: AtomicBool,
    close_tx: watch::Sender<bool>,
    correlator: Correlator,
    server_id: String,
    verify_token: [u8; VERIFY_TOKEN_SIZE],
    uuid: OnceLock<Uuid>,
    display_name: Mutex<Option<String>>,
    login_stage: Mutex<LoginStage>,
}

impl Connection {
    /// Create a connection and the receiving end of its outbound queue.
    pub(crate) fn new(
        server: Arc<Server>,
        peer: SocketAddr,
        id: usize,
    ) -> (Arc<Self>, mpsc::Receiver<Bytes>) {
        let (queue, rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        let (close_tx, _) = watch::channel(false);

        let conn = Self {
            id,
            peer,
            server,
            state: Mutex::new(ConnectionState::Handshaking),
            version: OnceLock::new(),
            inbound: Mutex::new(Inbound {
                cipher: Cipher::new(),
                codec: FrameCodec::new(),
            }),
            outbound: Mutex::new(Outbound {
                cipher: Cipher::new(),
                codec: FrameCodec::new(),
                queue,
            }),
            open: AtomicBool::new(true),
            close_tx,
            correlator: Correlator::new(),
            server_id: generate_server_id(),
            verify_token: generate_verify_token(),
            uuid: OnceLock::new(),
            display_name: Mutex::new(None),
            login_stage: Mutex::new(LoginStage::default()),
        };

        (Arc::new(conn), rx)
    }

    /// Serve a freshly accepted socket until both loops finish.
    pub async fn serve(server: Arc<Server>, stream: TcpStream, peer: SocketAddr, id: usize) {
        let (conn, queue) = Self::new(server, peer, id);

        async {
            debug!("Accepted connection");
            if let Err(e) = stream.set_nodelay(true) {
                debug!("Failed to set TCP_NODELAY: {e}");
            }

            let (reader, writer) = stream.into_split();
            let read = async {
                match conn.read_loop(reader).await {
                    Ok(()) => conn.shutdown(),
                    Err(e) => match e.disconnect_reason() {
                        Some(reason) => {
                            warn!("{e}");
                            conn.close_connection(reason);
                        }
                        None => {
                            debug!("Read loop ended: {e}");
                            conn.shutdown();
                        }
                    },
                }
            };
            let write = async {
                if let Err(e) = conn.write_loop(writer, queue).await {
                    debug!("Write loop ended: {e}");
                }
                conn.shutdown();
            };

            tokio::join!(read, write);
            conn.teardown();
            info!("Connection closed");
        }
        .instrument(info_span!(
            "conn",
            sid = id,
            ip = %peer.ip(),
            port = peer.port()
        ))
        .await;
    }

    async fn read_loop(self: &Arc<Self>, mut reader: OwnedReadHalf) -> Result<(), ConnectionError> {
        let mut buf = BytesMut::with_capacity(READ_CHUNK);

        loop {
            let start = buf.len();
            buf.reserve(READ_CHUNK);

            let read = tokio::select! {
                read = reader.read_buf(&mut buf) => read?,
                () = self.closed() => return Ok(()),
            };
            if read == 0 {
                debug!("Client closed the stream");
                return Ok(());
            }

            self.inbound.lock().cipher.decrypt(&mut buf[start..]);

            while self.is_open() {
                let (packet, encrypted) = {
                    let inbound = self.inbound.lock();
                    (inbound.codec.decode(&mut buf)?, inbound.cipher.is_enabled())
                };
                let Some(packet) = packet else {
                    break;
                };

                self.handle_raw(packet).await?;

                // Bytes after the frame that switched encryption on arrived
                // encrypted but were buffered as they came
                if !encrypted {
                    let mut inbound = self.inbound.lock();
                    if inbound.cipher.is_enabled() {
                        inbound.cipher.decrypt(&mut buf[..]);
                    }
                }
            }
        }
    }

    async fn handle_raw(self: &Arc<Self>, packet: RawPacket) -> Result<(), ConnectionError> {
        let state = self.state();
        let name = self.server.table().name_for(
            self.version(),
            state,
            Direction::Serverbound,
            packet.id,
        )?;
        trace!(packet = ?name, len = packet.payload.len(), "Received packet");

        let Some(frame) = self.correlator.offer(Frame::new(name, packet.payload)) else {
            return Ok(());
        };

        match state {
            ConnectionState::Handshaking | ConnectionState::Status => {
                protocol::handle(self, &frame)?;
            }
            ConnectionState::Login => login::handle(self, frame).await,
            ConnectionState::Play => match EventKind::from_packet(frame.name) {
                Some(kind) => {
                    self.server
                        .dispatcher()
                        .dispatch(self, Event::from_frame(kind, frame));
                }
                None => debug!(packet = ?frame.name, "Ignoring packet"),
            },
        }

        Ok(())
    }

    async fn write_loop(
        &self,
        mut writer: OwnedWriteHalf,
        mut queue: mpsc::Receiver<Bytes>,
    ) -> io::Result<()> {
        loop {
            tokio::select! {
                biased;
                Some(frame) = queue.recv() => writer.write_all(&frame).await?,
                () = self.closed() => break,
            }
        }

        // Deliver what was queued before the close, e.g. the disconnect
        while let Ok(frame) = queue.try_recv() {
            writer.write_all(&frame).await?;
        }
        writer.shutdown().await
    }

    fn teardown(self: &Arc<Self>) {
        self.shutdown();

        if self.state() != ConnectionState::Play {
            return;
        }
        let Some(uuid) = self.uuid() else {
            return;
        };

        if let Some(session) = self.server.registry().remove(uuid) {
            info!(%uuid, name = %session.display_name, "Player left");
            self.server
                .dispatcher()
                .dispatch(self, Event::new(EventKind::PlayerLeave));
        }
    }

    /// Send a typed packet, resolved in the packet's own state.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection is closed or the packet has no ID
    /// in the active version.
    pub fn send<P: Packet + Writable>(&self, packet: &P) -> Result<(), ConnectionError> {
        if !self.is_open() {
            return Err(ConnectionError::Closed);
        }
        self.enqueue(P::STATE, P::NAME, packet.encode(self.version()))
    }

    /// Send an already encoded payload in the current state.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection is closed or `name` has no ID in
    /// the active version and state.
    pub fn send_packet(&self, name: PacketName, payload: Bytes) -> Result<(), ConnectionError> {
        if !self.is_open() {
            return Err(ConnectionError::Closed);
        }
        self.enqueue(self.state(), name, payload)
    }

    fn enqueue(
        &self,
        state: ConnectionState,
        name: PacketName,
        payload: Bytes,
    ) -> Result<(), ConnectionError> {
        let id = self.resolve(state, name)?;
        let mut outbound = self.outbound.lock();
        if let Err(e) = outbound.push(id, payload) {
            if matches!(e, ConnectionError::Backlogged) {
                warn!("Client is not reading, dropping connection");
                self.shutdown();
            }
            return Err(e);
        }
        trace!(packet = ?name, id, "Queued packet");
        Ok(())
    }

    fn resolve(&self, state: ConnectionState, name: PacketName) -> Result<i32, ConnectionError> {
        match self
            .server
            .table()
            .id_for(self.version(), state, Direction::Clientbound, name)
        {
            Ok(id) => Ok(id),
            Err(e) => {
                error!("{e}");
                self.shutdown();
                Err(e.into())
            }
        }
    }

    /// Send `SetCompression` and switch both directions to the threshold.
    pub(crate) fn enable_compression(&self, threshold: usize) -> Result<(), ConnectionError> {
        let packet = SetCompression {
            threshold: i32::try_from(threshold).unwrap_or(i32::MAX),
        };
        let id = self.resolve(SetCompression::STATE, SetCompression::NAME)?;

        // The switch happens under the same lock as the send
        let mut outbound = self.outbound.lock();
        outbound.push(id, packet.encode(self.version()))?;
        outbound.codec.set_compression(Some(threshold));
        drop(outbound);

        self.inbound.lock().codec.set_compression(Some(threshold));
        debug!(threshold, "Compression enabled");
        Ok(())
    }

    /// Switch both ciphers on with the shared secret.
    pub(crate) fn enable_encryption(&self, secret: &[u8; 16]) -> Result<(), ConnectionError> {
        self.outbound.lock().cipher.enable(secret)?;
        self.inbound.lock().cipher.enable(secret)?;
        debug!("Encryption enabled");
        Ok(())
    }

    /// Wait for the next packet named `name`; `None` if the connection
    /// closes first.
    pub async fn wait_for_packet(&self, name: PacketName) -> Option<Bytes> {
        self.correlator.wait_for_packet(name).await
    }

    /// Register a waiter now and await it later.
    pub fn expect_packet(&self, name: PacketName) -> PendingReply {
        self.correlator.register(name)
    }

    /// Close with a reason shown to the client.
    ///
    /// Only the first close has an effect. In login and play a disconnect
    /// packet is queued ahead of the close so the write loop delivers it.
    pub fn close_connection(&self, reason: impl Into<String>) {
        if !self.open.swap(false, Ordering::SeqCst) {
            return;
        }

        let reason = reason.into();
        info!(%reason, "Disconnecting");

        let sent = match self.state() {
            ConnectionState::Login => {
                let packet = LoginDisconnect::new(reason);
                self.enqueue(
                    LoginDisconnect::STATE,
                    LoginDisconnect::NAME,
                    packet.encode(self.version()),
                )
            }
            ConnectionState::Play => {
                let packet = Disconnect::new(reason);
                self.enqueue(
                    Disconnect::STATE,
                    Disconnect::NAME,
                    packet.encode(self.version()),
                )
            }
            ConnectionState::Handshaking | ConnectionState::Status => Ok(()),
        };
        if let Err(e) = sent {
            debug!("Failed to queue disconnect: {e}");
        }

        self.signal_closed();
    }

    /// Close without telling the client.
    pub fn shutdown(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            self.signal_closed();
        }
    }

    fn signal_closed(&self) {
        self.close_tx.send_replace(true);
        self.correlator.close();
    }

    /// Resolves once the connection is closed.
    pub async fn closed(&self) {
        let mut rx = self.close_tx.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    #[must_use]
    pub const fn id(&self) -> usize {
        self.id
    }

    #[must_use]
    pub const fn peer(&self) -> SocketAddr {
        self.peer
    }

    #[must_use]
    pub fn server(&self) -> &Arc<Server> {
        &self.server
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        let mut current = self.state.lock();
        debug!(from = ?*current, to = ?state, "State transition");
        *current = state;
    }

    /// The negotiated version, or the newest supported one before the
    /// handshake.
    #[must_use]
    pub fn version(&self) -> ProtocolVersion {
        self.version
            .get()
            .copied()
            .unwrap_or(ProtocolVersion::LATEST)
    }

    /// Fix the protocol version. It can only be set once.
    pub(crate) fn set_version(&self, version: ProtocolVersion) -> Result<(), ConnectionError> {
        self.version
            .set(version)
            .map_err(|_| ConnectionError::VersionAlreadySet(self.version().as_raw()))
    }

    #[must_use]
    pub fn uuid(&self) -> Option<Uuid> {
        self.uuid.get().copied()
    }

    pub(crate) fn set_uuid(&self, uuid: Uuid) {
        let _ = self.uuid.set(uuid);
    }

    #[must_use]
    pub fn display_name(&self) -> Option<String> {
        self.display_name.lock().clone()
    }

    pub(crate) fn set_display_name(&self, name: impl Into<String>) {
        *self.display_name.lock() = Some(name.into());
    }

    pub(crate) fn server_id(&self) -> &str {
        &self.server_id
    }

    pub(crate) const fn verify_token(&self) -> &[u8; VERIFY_TOKEN_SIZE] {
        &self.verify_token
    }

    pub(crate) fn login_stage(&self) -> LoginStage {
        *self.login_stage.lock()
    }

    pub(crate) fn set_login_stage(&self, stage: LoginStage) {
        *self.login_stage.lock() = stage;
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("state", &self.state())
            .field("version", &self.version())
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}
