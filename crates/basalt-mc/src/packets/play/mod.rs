//! Play state packets.
//!
//! Only the packets needed to bring a player into a world and keep them
//! there are modelled. Field layouts differ between protocol versions; each
//! packet takes the version into account when reading or writing.

/// Implement [`Packet`](crate::packets::Packet) for a play packet.
macro_rules! play_packet {
    ($ty:ty, $name:ident, $direction:ident) => {
        impl $crate::packets::traits::Packet for $ty {
            const NAME: $crate::table::PacketName = $crate::table::PacketName::$name;
            const STATE: $crate::table::ConnectionState = $crate::table::ConnectionState::Play;
            const DIRECTION: $crate::table::Direction = $crate::table::Direction::$direction;
        }
    };
}

pub(crate) use play_packet;

pub mod clientbound;
pub mod serverbound;
