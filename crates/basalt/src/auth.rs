//! Online-mode authentication for Minecraft.
//!
//! This module provides the pieces of the online-mode login:
//! 1. The server RSA keypair used for the encryption handshake
//! 2. Per-connection server IDs and verify tokens
//! 3. The session hash sent to the session server
//! 4. Session verification against Mojang's `hasJoined` endpoint

use std::fmt::Write as _;
use std::net::IpAddr;
use std::time::Duration;

use bytes::Bytes;
use num_bigint::BigInt;
use rand::Rng;
use rsa::pkcs8::EncodePublicKey;
use rsa::rand_core::OsRng;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use serde::Deserialize;
use sha1::{Digest, Sha1};
use tracing::debug;
use uuid::Uuid;

/// RSA key size in bits.
const RSA_KEY_SIZE: usize = 1024;

/// Verify token size in bytes.
pub const VERIFY_TOKEN_SIZE: usize = 4;

/// Length of the random server ID.
const SERVER_ID_LENGTH: usize = 20;

/// Shared secret size in bytes.
const SHARED_SECRET_SIZE: usize = 16;

/// Mojang session server URL.
pub const SESSION_SERVER_URL: &str =
    "https://sessionserver.mojang.com/session/minecraft/hasJoined";

/// Error type for authentication operations.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("RSA error: {0}")]
    Rsa(#[from] rsa::Error),

    #[error("PKCS8 error: {0}")]
    Pkcs8(#[from] rsa::pkcs8::spki::Error),

    #[error("Verify token mismatch")]
    VerifyTokenMismatch,

    #[error("Shared secret must be 16 bytes, got {0}")]
    InvalidSharedSecret(usize),

    #[error("Session verification failed: {0}")]
    SessionVerification(String),

    #[error("Session server did not answer within {0:?}")]
    Timeout(Duration),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Server keypair for the encryption handshake.
///
/// Generated once at startup and shared by every connection.
pub struct AuthKeys {
    /// RSA private key for decryption.
    private_key: RsaPrivateKey,
    /// RSA public key (DER-encoded), sent in every encryption request.
    public_key_der: Bytes,
}

impl AuthKeys {
    /// Generate a new authentication keypair.
    ///
    /// # Errors
    ///
    /// Returns an error if RSA key generation fails.
    pub fn generate() -> Result<Self, AuthError> {
        let private_key = RsaPrivateKey::new(&mut OsRng, RSA_KEY_SIZE)?;
        let public_key = RsaPublicKey::from(&private_key);

        // Encode public key as DER
        let public_key_der = public_key.to_public_key_der()?.into_vec();

        Ok(Self {
            private_key,
            public_key_der: Bytes::from(public_key_der),
        })
    }

    /// Get the DER-encoded public key.
    #[must_use]
    pub fn public_key_der(&self) -> Bytes {
        self.public_key_der.clone()
    }

    /// Decrypt the shared secret and verify token from the client.
    ///
    /// # Errors
    ///
    /// Returns an error if decryption fails, the verify token doesn't match
    /// `expected_token`, or the secret is not 16 bytes.
    pub fn decrypt_response(
        &self,
        encrypted_secret: &[u8],
        encrypted_token: &[u8],
        expected_token: &[u8],
    ) -> Result<[u8; SHARED_SECRET_SIZE], AuthError> {
        let decrypted_token = self.private_key.decrypt(Pkcs1v15Encrypt, encrypted_token)?;
        if decrypted_token != expected_token {
            return Err(AuthError::VerifyTokenMismatch);
        }

        let shared_secret = self
            .private_key
            .decrypt(Pkcs1v15Encrypt, encrypted_secret)?;

        <[u8; SHARED_SECRET_SIZE]>::try_from(shared_secret.as_slice())
            .map_err(|_| AuthError::InvalidSharedSecret(shared_secret.len()))
    }

    /// Calculate the server hash for Mojang session verification.
    ///
    /// The hash is calculated as: `SHA1(server_id + shared_secret + public_key)`
    /// and formatted as a signed hex string (Minecraft's non-standard format).
    #[must_use]
    pub fn calculate_server_hash(&self, server_id: &str, shared_secret: &[u8]) -> String {
        let mut hasher = Sha1::new();
        hasher.update(server_id.as_bytes());
        hasher.update(shared_secret);
        hasher.update(&self.public_key_der);

        minecraft_hex_digest(&hasher.finalize())
    }
}

/// Generate a random server ID of 20 lowercase hex characters.
#[must_use]
pub fn generate_server_id() -> String {
    let bytes: [u8; SERVER_ID_LENGTH / 2] = rand::random();
    bytes.iter().fold(String::with_capacity(SERVER_ID_LENGTH), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    })
}

/// Generate a random verify token.
#[must_use]
pub fn generate_verify_token() -> [u8; VERIFY_TOKEN_SIZE] {
    let mut token = [0u8; VERIFY_TOKEN_SIZE];
    rand::rng().fill(&mut token);
    token
}

/// Deterministic UUID for a player in offline mode.
#[must_use]
pub fn offline_uuid(username: &str) -> Uuid {
    Uuid::new_v3(&Uuid::NAMESPACE_OID, format!("OfflinePlayer:{username}").as_bytes())
}

/// A signed profile property (e.g. `textures`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProfileProperty {
    /// Property name.
    pub name: String,
    /// Base64 property value.
    pub value: String,
    /// Yggdrasil signature.
    #[serde(default)]
    pub signature: Option<String>,
}

/// Player profile returned from Mojang session verification.
#[derive(Debug, Clone)]
pub struct PlayerProfile {
    /// Player UUID.
    pub uuid: Uuid,
    /// Player username, when the session server reported one.
    pub username: Option<String>,
    /// Player properties (e.g., skin textures).
    pub properties: Vec<ProfileProperty>,
}

/// Response from Mojang session server.
#[derive(Debug, Deserialize)]
struct SessionResponse {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    properties: Vec<ProfileProperty>,
}

/// Client for the session server's `hasJoined` endpoint.
#[derive(Debug, Clone)]
pub struct SessionVerifier {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl SessionVerifier {
    /// Create a verifier for `url`, giving up after `timeout`.
    #[must_use]
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            timeout,
        }
    }

    /// The configured request bound.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Verify a player's session with the session server.
    ///
    /// The whole request, body included, is bounded by the configured
    /// timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the request times out or fails, the session is
    /// not found, or the response is not a valid profile.
    pub async fn verify(
        &self,
        username: &str,
        server_hash: &str,
        client_ip: Option<IpAddr>,
    ) -> Result<PlayerProfile, AuthError> {
        tokio::time::timeout(self.timeout, self.request(username, server_hash, client_ip))
            .await
            .map_err(|_| AuthError::Timeout(self.timeout))?
    }

    async fn request(
        &self,
        username: &str,
        server_hash: &str,
        client_ip: Option<IpAddr>,
    ) -> Result<PlayerProfile, AuthError> {
        let mut query = vec![
            ("username", username.to_string()),
            ("serverId", server_hash.to_string()),
        ];

        // Optionally include client IP for additional verification
        if let Some(ip) = client_ip {
            query.push(("ip", ip.to_string()));
        }

        debug!(url = %self.url, username, "Verifying session");
        let response = self.client.get(&self.url).query(&query).send().await?;

        if response.status() == reqwest::StatusCode::NO_CONTENT {
            return Err(AuthError::SessionVerification(
                "Session not found (player may not have authenticated with Mojang)".to_string(),
            ));
        }

        if response.status() != reqwest::StatusCode::OK {
            return Err(AuthError::SessionVerification(format!(
                "Session server returned status {}",
                response.status()
            )));
        }

        let session: SessionResponse = response.json().await?;

        // Mojang returns the UUID without hyphens
        let uuid = Uuid::parse_str(&session.id).map_err(|e| {
            AuthError::SessionVerification(format!("Invalid UUID from session server: {e}"))
        })?;

        Ok(PlayerProfile {
            uuid,
            username: session.name,
            properties: session.properties,
        })
    }
}

/// Convert a SHA1 hash to Minecraft's signed hex digest format.
///
/// Minecraft uses a non-standard format where the hash is treated as a
/// two's complement signed number and converted to hex without leading zeros.
#[must_use]
pub fn minecraft_hex_digest(hash: &[u8]) -> String {
    let bigint = BigInt::from_signed_bytes_be(hash);
    format!("{bigint:x}")
}
