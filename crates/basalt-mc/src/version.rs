//! Protocol version definitions.
//!
//! This module provides the [`ProtocolVersion`] enum for identifying
//! which Minecraft protocol version a client is using.

/// Minecraft protocol version.
///
/// Each variant represents a specific protocol version number. Protocol 340
/// is always available; older versions are feature-gated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[non_exhaustive]
pub enum ProtocolVersion {
    /// Protocol version 47 (Minecraft 1.8.x)
    #[cfg(feature = "protocol-47")]
    V47,

    /// Protocol version 340 (Minecraft 1.12.2)
    V340,
}

impl ProtocolVersion {
    /// The newest supported version, used before a handshake has been seen.
    pub const LATEST: Self = Self::V340;

    /// Every version compiled into this build, oldest first.
    #[cfg(feature = "protocol-47")]
    pub const ALL: &'static [Self] = &[Self::V47, Self::V340];

    /// Every version compiled into this build, oldest first.
    #[cfg(not(feature = "protocol-47"))]
    pub const ALL: &'static [Self] = &[Self::V340];

    /// Attempt to create a `ProtocolVersion` from a raw protocol version number.
    ///
    /// Returns `None` if the version is not supported or not enabled via features.
    #[must_use]
    pub const fn from_raw(version: i32) -> Option<Self> {
        match version {
            340 => Some(Self::V340),

            #[cfg(feature = "protocol-47")]
            47 => Some(Self::V47),

            _ => None,
        }
    }

    /// Get the raw protocol version number.
    #[must_use]
    pub const fn as_raw(self) -> i32 {
        match self {
            Self::V340 => 340,

            #[cfg(feature = "protocol-47")]
            Self::V47 => 47,
        }
    }

    /// Gets a list of human-readable version names (e.g., `["1.8.9", "1.8"]`).
    #[must_use]
    pub const fn names(self) -> &'static [&'static str] {
        match self {
            Self::V340 => &["1.12.2"],

            #[cfg(feature = "protocol-47")]
            Self::V47 => &["1.8.9", "1.8.8", "1.8"],
        }
    }

    /// Gets the primary version name (e.g., "1.12.2").
    #[must_use]
    pub const fn name(self) -> &'static str {
        self.names()[0]
    }

    /// Whether the client must confirm server-initiated teleports.
    #[must_use]
    pub const fn has_teleport_confirm(self) -> bool {
        matches!(self, Self::V340)
    }

    /// Whether keep-alive ids are sent as a 64-bit long instead of a `VarInt`.
    #[must_use]
    pub const fn long_keep_alive(self) -> bool {
        matches!(self, Self::V340)
    }

    /// Whether the join game dimension is an `Int` rather than a `Byte`.
    #[must_use]
    pub const fn int_dimension(self) -> bool {
        matches!(self, Self::V340)
    }
}
