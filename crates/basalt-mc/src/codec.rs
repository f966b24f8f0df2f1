//! Packet framing and field codec for the Minecraft protocol.
//!
//! Uncompressed frames are `[VarInt length][VarInt packet_id][payload...]`,
//! where the length covers the packet ID and payload but not itself.
//!
//! Once a compression threshold is negotiated, frames become
//! `[VarInt length][VarInt data_length][data]`. A `data_length` of zero
//! means `data` is the plain `[packet_id][payload]`; anything else is the
//! inflated size of the zlib stream in `data`.

use std::io::{Read, Write};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;

use crate::error::{ProtocolError, Result};
use crate::table::PacketName;
use crate::varint::{peek_varint, read_varint, varint_len, write_varint};

/// Maximum packet size (2 MiB, same as vanilla).
pub const MAX_PACKET_SIZE: usize = 2 * 1024 * 1024;

/// A packet as it appears on the wire, before its ID is resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPacket {
    /// The packet ID.
    pub id: i32,
    /// The packet payload (without the packet ID).
    pub payload: Bytes,
}

impl RawPacket {
    /// Create a new raw packet with the given ID and payload.
    #[must_use]
    pub const fn new(id: i32, payload: Bytes) -> Self {
        Self { id, payload }
    }

    /// Create a new raw packet with the given ID and an empty payload.
    #[must_use]
    pub const fn empty(id: i32) -> Self {
        Self {
            id,
            payload: Bytes::new(),
        }
    }
}

/// A packet whose ID has been resolved to a logical name.
///
/// The payload is immutable and reference counted, so every consumer can
/// take its own cursor with a cheap clone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Logical packet name.
    pub name: PacketName,
    /// Packet payload (without the packet ID).
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    #[must_use]
    pub const fn new(name: PacketName, payload: Bytes) -> Self {
        Self { name, payload }
    }
}

/// Splits a byte stream into packets and joins packets into a byte stream.
///
/// The codec carries the compression threshold, which is switched on once
/// per connection during login.
#[derive(Debug, Clone, Default)]
pub struct FrameCodec {
    compression_threshold: Option<usize>,
}

impl FrameCodec {
    /// Create a codec with compression disabled.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            compression_threshold: None,
        }
    }

    /// Set the compression threshold; `None` disables compression.
    pub const fn set_compression(&mut self, threshold: Option<usize>) {
        self.compression_threshold = threshold;
    }

    /// Current compression threshold.
    #[must_use]
    pub const fn compression(&self) -> Option<usize> {
        self.compression_threshold
    }

    /// Carve the next complete packet off the front of `src`.
    ///
    /// Returns `Ok(None)` without consuming anything if `src` does not yet
    /// hold a complete frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is oversized or malformed.
    pub fn decode(&self, src: &mut BytesMut) -> Result<Option<RawPacket>> {
        let Some((length, length_len)) = peek_varint(src)? else {
            return Ok(None);
        };

        let length = usize::try_from(length).map_err(|_| ProtocolError::NegativeLength(length))?;
        if length > MAX_PACKET_SIZE {
            return Err(ProtocolError::PacketTooLong {
                len: length,
                max: MAX_PACKET_SIZE,
            });
        }

        if src.len() < length_len + length {
            return Ok(None);
        }

        src.advance(length_len);
        let mut data = src.split_to(length).freeze();

        if self.compression_threshold.is_some() {
            let data_length = read_varint(&mut data)?;
            if data_length != 0 {
                data = inflate(&data, data_length)?;
            }
        }

        if data.is_empty() {
            return Err(ProtocolError::Malformed("empty frame".into()));
        }

        let id = read_varint(&mut data)?;
        Ok(Some(RawPacket::new(id, data)))
    }

    /// Append the frame for `packet` to `dst`.
    ///
    /// # Errors
    ///
    /// Returns an error if the packet is too large or cannot be compressed.
    pub fn encode(&self, packet: &RawPacket, dst: &mut BytesMut) -> Result<()> {
        let body_len = varint_len(packet.id) + packet.payload.len();

        match self.compression_threshold {
            None => {
                check_size(body_len)?;
                write_varint(dst, to_varint_len(body_len)?);
                write_varint(dst, packet.id);
                dst.put_slice(&packet.payload);
            }
            Some(threshold) if body_len < threshold => {
                let frame_len = varint_len(0) + body_len;
                check_size(frame_len)?;
                write_varint(dst, to_varint_len(frame_len)?);
                write_varint(dst, 0);
                write_varint(dst, packet.id);
                dst.put_slice(&packet.payload);
            }
            Some(_) => {
                let mut body = BytesMut::with_capacity(body_len);
                write_varint(&mut body, packet.id);
                body.put_slice(&packet.payload);
                let compressed = deflate(&body)?;

                let data_length = to_varint_len(body_len)?;
                let frame_len = varint_len(data_length) + compressed.len();
                check_size(frame_len)?;
                write_varint(dst, to_varint_len(frame_len)?);
                write_varint(dst, data_length);
                dst.put_slice(&compressed);
            }
        }

        Ok(())
    }
}

fn check_size(len: usize) -> Result<()> {
    if len > MAX_PACKET_SIZE {
        return Err(ProtocolError::PacketTooLong {
            len,
            max: MAX_PACKET_SIZE,
        });
    }
    Ok(())
}

fn to_varint_len(len: usize) -> Result<i32> {
    i32::try_from(len).map_err(|_| ProtocolError::PacketTooLong {
        len,
        max: MAX_PACKET_SIZE,
    })
}

fn inflate(data: &[u8], data_length: i32) -> Result<Bytes> {
    let expected =
        usize::try_from(data_length).map_err(|_| ProtocolError::NegativeLength(data_length))?;
    if expected > MAX_PACKET_SIZE {
        return Err(ProtocolError::PacketTooLong {
            len: expected,
            max: MAX_PACKET_SIZE,
        });
    }

    let mut out = Vec::with_capacity(expected);
    ZlibDecoder::new(data)
        .take(MAX_PACKET_SIZE as u64 + 1)
        .read_to_end(&mut out)
        .map_err(|e| ProtocolError::Compression(e.to_string()))?;

    if out.len() != expected {
        return Err(ProtocolError::Compression(format!(
            "inflated to {} bytes, header said {expected}",
            out.len()
        )));
    }

    Ok(Bytes::from(out))
}

fn deflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| ProtocolError::Compression(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| ProtocolError::Compression(e.to_string()))
}

/// Fail with [`ProtocolError::UnexpectedEof`] unless `buf` holds `needed` bytes.
///
/// # Errors
///
/// Returns an error if fewer than `needed` bytes remain.
pub fn ensure_remaining(buf: &impl Buf, needed: usize) -> Result<()> {
    let remaining = buf.remaining();
    if remaining < needed {
        return Err(ProtocolError::UnexpectedEof { needed, remaining });
    }
    Ok(())
}

/// Read a length prefix, rejecting negative values.
fn read_length(buf: &mut impl Buf) -> Result<usize> {
    let len = read_varint(buf)?;
    usize::try_from(len).map_err(|_| ProtocolError::NegativeLength(len))
}

/// Read a Minecraft string from a buffer.
///
/// Minecraft strings are: `[VarInt length][UTF-8 bytes]`, where `max_len`
/// bounds the length in characters.
///
/// # Errors
///
/// Returns an error if the string exceeds the maximum length, runs past the
/// end of the buffer, or is not valid UTF-8.
pub fn read_string(buf: &mut impl Buf, max_len: usize) -> Result<String> {
    let len = read_length(buf)?;

    // Max 4 bytes per char in UTF-8
    if len > max_len * 4 {
        return Err(ProtocolError::StringTooLong {
            len,
            max: max_len * 4,
        });
    }

    ensure_remaining(buf, len)?;
    let mut bytes = vec![0u8; len];
    buf.copy_to_slice(&mut bytes);

    let s = String::from_utf8(bytes).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
    let chars = s.chars().count();
    if chars > max_len {
        return Err(ProtocolError::StringTooLong {
            len: chars,
            max: max_len,
        });
    }

    Ok(s)
}

/// Write a Minecraft string to a buffer.
#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
pub fn write_string(buf: &mut impl BufMut, s: &str) {
    let bytes = s.as_bytes();
    write_varint(buf, bytes.len() as i32);
    buf.put_slice(bytes);
}

/// Read a length-prefixed byte array.
///
/// # Errors
///
/// Returns an error if the array exceeds `max_len` or the buffer.
pub fn read_byte_array(buf: &mut impl Buf, max_len: usize) -> Result<Bytes> {
    let len = read_length(buf)?;
    if len > max_len {
        return Err(ProtocolError::PacketTooLong { len, max: max_len });
    }
    ensure_remaining(buf, len)?;
    Ok(buf.copy_to_bytes(len))
}

/// Write a length-prefixed byte array.
#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
pub fn write_byte_array(buf: &mut impl BufMut, data: &[u8]) {
    write_varint(buf, data.len() as i32);
    buf.put_slice(data);
}

/// Read a boolean.
///
/// # Errors
///
/// Returns an error if the buffer is empty.
pub fn read_bool(buf: &mut impl Buf) -> Result<bool> {
    ensure_remaining(buf, 1)?;
    Ok(buf.get_u8() != 0)
}

/// Read an unsigned byte.
///
/// # Errors
///
/// Returns an error if the buffer is empty.
pub fn read_u8(buf: &mut impl Buf) -> Result<u8> {
    ensure_remaining(buf, 1)?;
    Ok(buf.get_u8())
}

/// Read a signed byte.
///
/// # Errors
///
/// Returns an error if the buffer is empty.
pub fn read_i8(buf: &mut impl Buf) -> Result<i8> {
    ensure_remaining(buf, 1)?;
    Ok(buf.get_i8())
}

/// Read a big-endian `i32`.
///
/// # Errors
///
/// Returns an error if fewer than 4 bytes remain.
pub fn read_i32(buf: &mut impl Buf) -> Result<i32> {
    ensure_remaining(buf, 4)?;
    Ok(buf.get_i32())
}

/// Read a big-endian `i64`.
///
/// # Errors
///
/// Returns an error if fewer than 8 bytes remain.
pub fn read_i64(buf: &mut impl Buf) -> Result<i64> {
    ensure_remaining(buf, 8)?;
    Ok(buf.get_i64())
}

/// Read a big-endian `f32`.
///
/// # Errors
///
/// Returns an error if fewer than 4 bytes remain.
pub fn read_f32(buf: &mut impl Buf) -> Result<f32> {
    ensure_remaining(buf, 4)?;
    Ok(buf.get_f32())
}

/// Read a big-endian `f64`.
///
/// # Errors
///
/// Returns an error if fewer than 8 bytes remain.
pub fn read_f64(buf: &mut impl Buf) -> Result<f64> {
    ensure_remaining(buf, 8)?;
    Ok(buf.get_f64())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(codec: &FrameCodec, packet: &RawPacket) -> BytesMut {
        let mut buf = BytesMut::new();
        codec.encode(packet, &mut buf).unwrap();
        buf
    }

    #[test]
    fn test_encode_decode_frame() {
        let codec = FrameCodec::new();
        let original = RawPacket::new(0x00, Bytes::from_static(b"hello"));

        let mut buf = encode(&codec, &original);
        assert_eq!(&buf[..2], &[6, 0x00]);

        let read = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(read, original);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_empty_packet() {
        let codec = FrameCodec::new();
        let mut buf = encode(&codec, &RawPacket::empty(0x01));

        let read = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(read.id, 0x01);
        assert!(read.payload.is_empty());
    }

    #[test]
    fn test_incomplete_frame_keeps_bytes() {
        let codec = FrameCodec::new();
        let full = encode(&codec, &RawPacket::new(0x05, Bytes::from_static(b"abcdef")));

        for cut in 0..full.len() {
            let mut partial = BytesMut::from(&full[..cut]);
            assert!(codec.decode(&mut partial).unwrap().is_none());
            assert_eq!(partial.len(), cut);
        }
    }

    #[test]
    fn test_several_frames_in_one_buffer() {
        let codec = FrameCodec::new();
        let mut buf = encode(&codec, &RawPacket::new(0x01, Bytes::from_static(b"one")));
        buf.extend_from_slice(&encode(&codec, &RawPacket::new(0x02, Bytes::from_static(b"two"))));
        buf.extend_from_slice(&[0x05, 0x03]);

        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().id, 0x01);
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().id, 0x02);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(&buf[..], &[0x05, 0x03]);
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        write_varint(&mut buf, i32::try_from(MAX_PACKET_SIZE + 1).unwrap());

        let result = codec.decode(&mut buf);
        assert!(matches!(result, Err(ProtocolError::PacketTooLong { .. })));
    }

    #[test]
    fn test_compressed_below_threshold() {
        let mut codec = FrameCodec::new();
        codec.set_compression(Some(64));
        let original = RawPacket::new(0x0F, Bytes::from_static(b"short"));

        let mut buf = encode(&codec, &original);
        // length, data_length = 0, id
        assert_eq!(&buf[..3], &[7, 0, 0x0F]);

        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), original);
    }

    #[test]
    fn test_compressed_above_threshold() {
        let mut codec = FrameCodec::new();
        codec.set_compression(Some(64));
        let original = RawPacket::new(0x0F, Bytes::from(vec![b'a'; 1000]));

        let mut buf = encode(&codec, &original);
        assert!(buf.len() < 1000);

        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), original);
    }

    #[test]
    fn test_bad_zlib_is_error() {
        let mut codec = FrameCodec::new();
        codec.set_compression(Some(0));

        let mut buf = BytesMut::new();
        write_varint(&mut buf, 5);
        write_varint(&mut buf, 100);
        buf.put_slice(&[1, 2, 3, 4]);

        let result = codec.decode(&mut buf);
        assert!(matches!(result, Err(ProtocolError::Compression(_))));
    }

    #[test]
    fn test_read_write_string() {
        let original = "Hello, Minecraft!";

        let mut buf = BytesMut::new();
        write_string(&mut buf, original);

        let read = read_string(&mut buf.freeze(), 256).unwrap();
        assert_eq!(read, original);
    }

    #[test]
    fn test_string_too_long() {
        let mut buf = BytesMut::new();
        // Write a string that claims to be very long
        write_varint(&mut buf, 10000);

        let result = read_string(&mut buf.freeze(), 16);
        assert!(matches!(result, Err(ProtocolError::StringTooLong { .. })));

        let mut buf = BytesMut::new();
        write_string(&mut buf, "seventeen chars!!");
        let result = read_string(&mut buf.freeze(), 16);
        assert!(matches!(
            result,
            Err(ProtocolError::StringTooLong { len: 17, max: 16 })
        ));
    }

    #[test]
    fn test_string_past_end() {
        let mut buf = BytesMut::new();
        write_varint(&mut buf, 10);
        buf.put_slice(b"abc");

        let result = read_string(&mut buf.freeze(), 16);
        assert!(matches!(
            result,
            Err(ProtocolError::UnexpectedEof {
                needed: 10,
                remaining: 3
            })
        ));
    }

    #[test]
    fn test_invalid_utf8() {
        let mut buf = BytesMut::new();
        write_byte_array(&mut buf, &[0xff, 0xfe]);

        let result = read_string(&mut buf.freeze(), 16);
        assert!(matches!(result, Err(ProtocolError::Malformed(_))));
    }

    #[test]
    fn test_short_numeric_reads() {
        let mut buf: &[u8] = &[0, 0, 1];
        assert!(matches!(
            read_i32(&mut buf),
            Err(ProtocolError::UnexpectedEof { needed: 4, .. })
        ));
        assert!(read_i64(&mut &b""[..]).is_err());
        assert!(read_bool(&mut &b""[..]).is_err());
        assert_eq!(read_i8(&mut &[0xff][..]).unwrap(), -1);
    }

    #[test]
    fn test_byte_array_limits() {
        let mut buf = BytesMut::new();
        write_byte_array(&mut buf, &[1, 2, 3, 4]);
        let frozen = buf.freeze();

        assert_eq!(
            read_byte_array(&mut frozen.clone(), 4).unwrap(),
            Bytes::from_static(&[1, 2, 3, 4])
        );
        assert!(read_byte_array(&mut frozen.clone(), 3).is_err());
    }
}
