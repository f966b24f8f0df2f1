#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use basalt::auth::AuthKeys;
use basalt::cipher::Cipher;
use basalt::{Dispatcher, Server, ServerProperties};
use basalt_mc::packets::{
    EncryptionRequest, EncryptionResponse, Handshake, LoginDisconnect, LoginStart, LoginSuccess,
    NextState, Packet, Readable, SetCompression, Writable,
};
use basalt_mc::packets::play::clientbound;
use basalt_mc::{
    ConnectionState, Direction, FrameCodec, PacketName, ProtocolTable, ProtocolVersion, RawPacket,
};
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use rsa::pkcs8::DecodePublicKey;
use rsa::rand_core::OsRng;
use rsa::{Pkcs1v15Encrypt, RsaPublicKey};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use uuid::Uuid;

/// Upper bound for anything a test waits on.
pub const WAIT: Duration = Duration::from_secs(5);

/// One keypair for the whole test binary; generation is slow.
pub fn shared_keys() -> Arc<AuthKeys> {
    static KEYS: OnceLock<Arc<AuthKeys>> = OnceLock::new();
    Arc::clone(KEYS.get_or_init(|| Arc::new(AuthKeys::generate().unwrap())))
}

/// Properties pointing at `session_server`, with no icon on disk.
pub fn properties(session_server: &str) -> ServerProperties {
    ServerProperties {
        session_server: session_server.to_string(),
        server_icon: "/nonexistent/server-icon.png".into(),
        ..ServerProperties::default()
    }
}

pub fn offline_properties() -> ServerProperties {
    ServerProperties {
        online_mode: false,
        ..properties("http://127.0.0.1:9/unused")
    }
}

/// Start a server on an ephemeral port.
pub async fn start_server(
    properties: ServerProperties,
    dispatcher: Dispatcher,
) -> (Arc<Server>, SocketAddr) {
    let server = Arc::new(Server::with_keys(properties, dispatcher, shared_keys()));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(Arc::clone(&server).run(listener));
    (server, addr)
}

/// Poll `check` until it holds.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    timeout(WAIT, async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition was not reached in time");
}

/// UUID the fake session server hands out for `username`.
pub fn profile_uuid(username: &str) -> Uuid {
    Uuid::new_v3(&Uuid::NAMESPACE_DNS, username.as_bytes())
}

/// How the fake session server answers.
#[derive(Debug, Clone, Copy)]
pub enum SessionReply {
    /// 200 with a profile for the requested name.
    Profile,
    /// Never answer.
    Hang,
    /// An empty response with this status.
    Status(u16),
    /// 200 with this exact body.
    Body(&'static str),
}

/// A local stand-in for the `hasJoined` endpoint.
pub struct FakeSessionServer {
    pub url: String,
    requests: Arc<Mutex<Vec<String>>>,
}

impl FakeSessionServer {
    pub async fn start(reply: SessionReply) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!(
            "http://{}/session/minecraft/hasJoined",
            listener.local_addr().unwrap()
        );
        let requests = Arc::new(Mutex::new(Vec::new()));

        let log = Arc::clone(&requests);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(answer(stream, reply, Arc::clone(&log)));
            }
        });

        Self { url, requests }
    }

    /// Request targets received so far, e.g. `/session/...?username=...`.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }
}

fn query_param<'a>(target: &'a str, key: &str) -> Option<&'a str> {
    let (_, query) = target.split_once('?')?;
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find_map(|(k, v)| (k == key).then_some(v))
}

async fn answer(mut stream: TcpStream, reply: SessionReply, log: Arc<Mutex<Vec<String>>>) {
    let mut request = Vec::new();
    let mut chunk = [0u8; 1024];
    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => request.extend_from_slice(&chunk[..n]),
        }
    }

    let request = String::from_utf8_lossy(&request).into_owned();
    let target = request
        .split_whitespace()
        .nth(1)
        .unwrap_or_default()
        .to_string();
    log.lock().push(target.clone());

    let response = match reply {
        SessionReply::Profile => {
            let username = query_param(&target, "username").unwrap_or_default();
            let body = serde_json::json!({
                "id": profile_uuid(username).simple().to_string(),
                "name": username,
                "properties": [{"name": "textures", "value": "e30=", "signature": "c2ln"}],
            })
            .to_string();
            format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            )
        }
        SessionReply::Hang => {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            return;
        }
        SessionReply::Status(code) => {
            format!("HTTP/1.1 {code} Status\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
        }
        SessionReply::Body(body) => format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        ),
    };

    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

/// A minimal client speaking the wire protocol.
pub struct TestClient {
    stream: TcpStream,
    buf: BytesMut,
    codec: FrameCodec,
    encrypt: Cipher,
    decrypt: Cipher,
    table: ProtocolTable,
    pub version: ProtocolVersion,
    pub state: ConnectionState,
    /// Names of every packet received, in order.
    pub received: Vec<PacketName>,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        Self::connect_as(addr, ProtocolVersion::LATEST).await
    }

    pub async fn connect_as(addr: SocketAddr, version: ProtocolVersion) -> Self {
        Self {
            stream: TcpStream::connect(addr).await.unwrap(),
            buf: BytesMut::new(),
            codec: FrameCodec::new(),
            encrypt: Cipher::new(),
            decrypt: Cipher::new(),
            table: ProtocolTable::new(),
            version,
            state: ConnectionState::Handshaking,
            received: Vec::new(),
        }
    }

    pub async fn send<P: Packet + Writable>(&mut self, packet: &P) {
        let id = self
            .table
            .id_for(self.version, P::STATE, Direction::Serverbound, P::NAME)
            .unwrap();
        self.send_raw(id, packet.encode(self.version)).await;
    }

    pub async fn send_raw(&mut self, id: i32, payload: Bytes) {
        let mut buf = BytesMut::new();
        self.codec
            .encode(&RawPacket::new(id, payload), &mut buf)
            .unwrap();
        self.encrypt.encrypt(&mut buf);
        self.stream.write_all(&buf).await.unwrap();
    }

    /// Next packet; `None` once the server has closed the stream.
    pub async fn recv_raw(&mut self) -> Option<RawPacket> {
        timeout(WAIT, async {
            loop {
                if let Some(packet) = self.codec.decode(&mut self.buf).unwrap() {
                    return Some(packet);
                }
                let start = self.buf.len();
                self.buf.reserve(4096);
                let read = self.stream.read_buf(&mut self.buf).await.ok()?;
                if read == 0 {
                    return None;
                }
                self.decrypt.decrypt(&mut self.buf[start..]);
            }
        })
        .await
        .expect("timed out waiting for a packet")
    }

    pub async fn recv(&mut self) -> Option<(PacketName, Bytes)> {
        let packet = self.recv_raw().await?;
        let name = self
            .table
            .name_for(self.version, self.state, Direction::Clientbound, packet.id)
            .unwrap();
        self.received.push(name);
        Some((name, packet.payload))
    }

    /// Receive the next packet and check its name.
    pub async fn expect(&mut self, expected: PacketName) -> Bytes {
        let (name, payload) = self.recv().await.expect("stream closed");
        assert_eq!(name, expected);
        payload
    }

    /// Skip packets until one named `expected` arrives.
    pub async fn recv_until(&mut self, expected: PacketName) -> Bytes {
        loop {
            let (name, payload) = self.recv().await.expect("stream closed");
            if name == expected {
                return payload;
            }
        }
    }

    /// True once the server has closed the stream.
    pub async fn is_closed(&mut self) -> bool {
        loop {
            if self.recv_raw().await.is_none() {
                return true;
            }
        }
    }

    pub async fn handshake(&mut self, next_state: NextState) {
        self.handshake_raw(self.version.as_raw(), next_state).await;
    }

    pub async fn handshake_raw(&mut self, protocol_version: i32, next_state: NextState) {
        self.send(&Handshake {
            protocol_version,
            server_address: "localhost".to_string(),
            server_port: 25565,
            next_state,
        })
        .await;
        self.state = match next_state {
            NextState::Status => ConnectionState::Status,
            NextState::Login => ConnectionState::Login,
        };
    }

    /// Handshake and send `LoginStart`.
    pub async fn start_login(&mut self, username: &str) {
        self.handshake(NextState::Login).await;
        self.send(&LoginStart::new(username)).await;
    }

    /// Answer an encryption request with the given secret and token.
    pub async fn respond(&mut self, request: &EncryptionRequest, secret: &[u8; 16], token: &[u8]) {
        let key = RsaPublicKey::from_public_key_der(&request.public_key).unwrap();
        let shared_secret = key.encrypt(&mut OsRng, Pkcs1v15Encrypt, secret).unwrap();
        let verify_token = key.encrypt(&mut OsRng, Pkcs1v15Encrypt, token).unwrap();
        self.send(&EncryptionResponse {
            shared_secret: Bytes::from(shared_secret),
            verify_token: Bytes::from(verify_token),
        })
        .await;
    }

    pub fn enable_encryption(&mut self, secret: &[u8; 16]) {
        self.encrypt.enable(secret).unwrap();
        self.decrypt.enable(secret).unwrap();
    }

    /// Run the online handshake up to the point the server verifies the
    /// session. Returns the request and the secret used.
    pub async fn encrypt_login(&mut self, username: &str) -> (EncryptionRequest, [u8; 16]) {
        self.start_login(username).await;
        let payload = self.expect(PacketName::LoginEncryptionRequest).await;
        let request = EncryptionRequest::decode(&payload, self.version).unwrap();

        let secret: [u8; 16] = rand::random();
        let token = request.verify_token.clone();
        self.respond(&request, &secret, &token).await;
        self.enable_encryption(&secret);
        (request, secret)
    }

    /// Read the rest of the login state, following compression, until
    /// `LoginSuccess`.
    pub async fn finish_login(&mut self) -> LoginSuccess {
        loop {
            let (name, payload) = self.recv().await.expect("stream closed during login");
            match name {
                PacketName::LoginSetCompression => {
                    let packet = SetCompression::decode(&payload, self.version).unwrap();
                    self.codec
                        .set_compression(usize::try_from(packet.threshold).ok());
                }
                PacketName::LoginSuccess => {
                    self.state = ConnectionState::Play;
                    return LoginSuccess::decode(&payload, self.version).unwrap();
                }
                PacketName::LoginDisconnect => {
                    let packet = LoginDisconnect::decode(&payload, self.version).unwrap();
                    panic!("login refused: {}", packet.reason.text);
                }
                other => panic!("unexpected {other:?} during login"),
            }
        }
    }

    /// Read the spawn sequence that follows `LoginSuccess`.
    pub async fn expect_spawn(&mut self) -> clientbound::PlayerPositionAndLook {
        self.expect(PacketName::JoinGame).await;
        self.expect(PacketName::SpawnPosition).await;
        self.expect(PacketName::PlayerAbilities).await;
        let payload = self.expect(PacketName::PlayerPositionAndLook).await;
        clientbound::PlayerPositionAndLook::decode(&payload, self.version).unwrap()
    }

    pub async fn login_offline(&mut self, username: &str) -> LoginSuccess {
        self.start_login(username).await;
        let success = self.finish_login().await;
        self.expect_spawn().await;
        success
    }

    pub async fn login_online(&mut self, username: &str) -> LoginSuccess {
        self.encrypt_login(username).await;
        let success = self.finish_login().await;
        self.expect_spawn().await;
        success
    }

    /// Reason of the next `LoginDisconnect`.
    pub async fn login_disconnect_reason(&mut self) -> String {
        let payload = self.recv_until(PacketName::LoginDisconnect).await;
        LoginDisconnect::decode(&payload, self.version)
            .unwrap()
            .reason
            .text
    }

    /// Reason of the next play `Disconnect`.
    pub async fn disconnect_reason(&mut self) -> String {
        let payload = self.recv_until(PacketName::Disconnect).await;
        clientbound::Disconnect::decode(&payload, self.version)
            .unwrap()
            .reason
            .text
    }
}
