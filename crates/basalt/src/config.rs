//! Server configuration.
//!
//! Settings come from a vanilla-style `server.properties` file (flat
//! `key=value` lines, `#` or `!` comments). Unknown keys are ignored so an
//! existing vanilla file can be reused. A few settings can be overridden
//! from the environment for container deployments.

use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{fs, io};

use tracing::{debug, info};

use crate::auth::SESSION_SERVER_URL;
use crate::utils::{EnvError, env_bool, env_number, env_string};

/// Config file used when `BASALT_CONFIG` is not set.
pub const DEFAULT_CONFIG_PATH: &str = "server.properties";

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Line {line}: expected key=value, got '{text}'")]
    InvalidLine { line: usize, text: String },

    #[error("Invalid value for {key}: '{value}' ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("Environment override: {0}")]
    Env(EnvError),
}

/// Settings read from `server.properties`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerProperties {
    /// Interface to bind; empty means all interfaces.
    pub server_ip: String,
    /// TCP port to listen on.
    pub server_port: u16,
    /// Maximum concurrent sessions.
    pub max_players: u32,
    /// Message of the day shown in the server list.
    pub motd: String,
    /// Authenticate players against the session server.
    pub online_mode: bool,
    /// 0 peaceful to 3 hard.
    pub difficulty: u8,
    /// 0 survival, 1 creative, 2 adventure, 3 spectator.
    pub gamemode: u8,
    /// Level type sent in join game.
    pub level_type: String,
    /// Packets at least this large are compressed; negative disables.
    pub network_compression_threshold: i32,
    /// Send the client IP to the session server.
    pub prevent_proxy_connections: bool,
    /// Bound on the session server request.
    pub auth_timeout: Duration,
    /// Time between keep-alive probes in play.
    pub keep_alive_interval: Duration,
    /// Session server `hasJoined` endpoint.
    pub session_server: String,
    /// PNG shown in the server list, if present.
    pub server_icon: PathBuf,
}

impl Default for ServerProperties {
    fn default() -> Self {
        Self {
            server_ip: String::new(),
            server_port: 25565,
            max_players: 20,
            motd: "A Minecraft Server".to_string(),
            online_mode: true,
            difficulty: 1,
            gamemode: 0,
            level_type: "DEFAULT".to_string(),
            network_compression_threshold: 256,
            prevent_proxy_connections: false,
            auth_timeout: Duration::from_secs(30),
            keep_alive_interval: Duration::from_secs(15),
            session_server: SESSION_SERVER_URL.to_string(),
            server_icon: PathBuf::from("server-icon.png"),
        }
    }
}

fn parse_value<T>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: value.to_string(),
            reason: "expected 'true' or 'false'".to_string(),
        }),
    }
}

fn parse_bounded(key: &'static str, value: &str, max: u8) -> Result<u8, ConfigError> {
    let parsed: u8 = parse_value(key, value)?;
    if parsed > max {
        return Err(ConfigError::InvalidValue {
            key,
            value: value.to_string(),
            reason: format!("must be between 0 and {max}"),
        });
    }
    Ok(parsed)
}

impl ServerProperties {
    /// Parse the contents of a properties file on top of the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error for a line without `=` or a value that does not
    /// parse for its key.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut props = Self::default();

        for (index, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                return Err(ConfigError::InvalidLine {
                    line: index + 1,
                    text: line.to_string(),
                });
            };

            props.set(key.trim(), value.trim())?;
        }

        Ok(props)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "server-ip" => self.server_ip = value.to_string(),
            "server-port" => self.server_port = parse_value("server-port", value)?,
            "max-players" => self.max_players = parse_value("max-players", value)?,
            "motd" => self.motd = value.to_string(),
            "online-mode" => self.online_mode = parse_bool("online-mode", value)?,
            "difficulty" => self.difficulty = parse_bounded("difficulty", value, 3)?,
            "gamemode" => self.gamemode = parse_bounded("gamemode", value, 3)?,
            "level-type" => self.level_type = value.to_string(),
            "network-compression-threshold" => {
                self.network_compression_threshold =
                    parse_value("network-compression-threshold", value)?;
            }
            "prevent-proxy-connections" => {
                self.prevent_proxy_connections = parse_bool("prevent-proxy-connections", value)?;
            }
            "auth-timeout-ms" => {
                self.auth_timeout = Duration::from_millis(parse_value("auth-timeout-ms", value)?);
            }
            "keep-alive-interval-ms" => {
                let ms: u64 = parse_value("keep-alive-interval-ms", value)?;
                if ms == 0 {
                    return Err(ConfigError::InvalidValue {
                        key: "keep-alive-interval-ms",
                        value: value.to_string(),
                        reason: "must be positive".to_string(),
                    });
                }
                self.keep_alive_interval = Duration::from_millis(ms);
            }
            "session-server" => self.session_server = value.to_string(),
            "server-icon" => self.server_icon = PathBuf::from(value),
            _ => debug!(key, "Ignoring unknown property"),
        }
        Ok(())
    }

    /// Load a properties file, falling back to defaults if it is missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(text) => {
                info!(path = %path.display(), "Loaded configuration");
                Self::parse(&text)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No configuration file, using defaults");
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Apply `BASALT_ONLINE_MODE`, `BASALT_MAX_PLAYERS` and `BASALT_PORT`.
    ///
    /// # Errors
    ///
    /// Returns an error if an override is set to an invalid value.
    pub fn apply_env(mut self) -> Result<Self, ConfigError> {
        self.online_mode = env_bool("BASALT_ONLINE_MODE", self.online_mode).map_err(ConfigError::Env)?;
        self.max_players =
            env_number("BASALT_MAX_PLAYERS", self.max_players).map_err(ConfigError::Env)?;
        self.server_port = env_number("BASALT_PORT", self.server_port).map_err(ConfigError::Env)?;
        Ok(self)
    }

    /// Load the file named by `BASALT_CONFIG` (default `server.properties`)
    /// and apply environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if loading or an override fails.
    pub fn from_env() -> Result<Self, ConfigError> {
        let path = env_string("BASALT_CONFIG", DEFAULT_CONFIG_PATH).map_err(ConfigError::Env)?;
        Self::load(path)?.apply_env()
    }

    /// Address to bind the listener to.
    #[must_use]
    pub fn bind_address(&self) -> String {
        let ip = if self.server_ip.is_empty() {
            "0.0.0.0"
        } else {
            self.server_ip.as_str()
        };
        format!("{ip}:{}", self.server_port)
    }

    /// Compression threshold to negotiate, if compression is enabled.
    #[must_use]
    pub fn compression_threshold(&self) -> Option<usize> {
        usize::try_from(self.network_compression_threshold).ok()
    }
}
