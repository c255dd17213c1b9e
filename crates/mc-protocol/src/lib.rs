//! Wire-level primitives shared by the protocol engine and the world codec.
//!
//! The central type is [`ByteBuffer`], a positional byte store with typed
//! reads and writes for everything the Minecraft protocol moves around:
//! primitives, VarInt/VarLong, length-prefixed UTF-8, UUIDs and bitsets.

use std::io::{self, Read, Write};

use byteorder::{ReadBytesExt, WriteBytesExt};
use thiserror::Error;

pub mod buffer;

pub use buffer::{BitSet, ByteBuffer, Endianness};

#[derive(Error, Debug)]
pub enum BufferError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("buffer underflow: requested {requested} bytes, {remaining} remaining")]
    Underflow { requested: usize, remaining: usize },
    #[error("value out of range: {0}")]
    OutOfRange(&'static str),
    #[error("invalid position {position}, buffer length {length}")]
    InvalidPosition { position: usize, length: usize },
    #[error("reset without a mark")]
    InvalidMark,
    #[error("VarInt wider than 5 bytes")]
    VarIntTooLong,
    #[error("VarLong wider than 10 bytes")]
    VarLongTooLong,
    #[error("string too long: {len} > {max}")]
    StringTooLong { len: usize, max: usize },
    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

pub type Result<T> = std::result::Result<T, BufferError>;

/// Maximum UTF-16 code units a protocol string may carry.
pub const MAX_STRING_UNITS: usize = 32767;

// VarInt encoding/decoding over io streams, used for socket-side framing.
// Buffer-positional variants live on `ByteBuffer`.
pub fn read_varint<R: Read>(reader: &mut R) -> Result<i32> {
    let mut result = 0i32;
    let mut shift = 0;
    loop {
        let byte = reader.read_u8()?;
        result |= ((byte & 0x7F) as i32) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
        if shift >= 32 {
            return Err(BufferError::VarIntTooLong);
        }
    }
    Ok(result)
}

pub fn write_varint<W: Write>(writer: &mut W, value: i32) -> Result<()> {
    let mut value = value as u32;
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        writer.write_u8(byte)?;
        if value == 0 {
            break;
        }
    }
    Ok(())
}

pub fn read_varlong<R: Read>(reader: &mut R) -> Result<i64> {
    let mut result = 0i64;
    let mut shift = 0;
    loop {
        let byte = reader.read_u8()?;
        result |= ((byte & 0x7F) as i64) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
        if shift >= 70 {
            return Err(BufferError::VarLongTooLong);
        }
    }
    Ok(result)
}

pub fn write_varlong<W: Write>(writer: &mut W, value: i64) -> Result<()> {
    let mut value = value as u64;
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        writer.write_u8(byte)?;
        if value == 0 {
            break;
        }
    }
    Ok(())
}

/// Number of bytes `value` occupies as a VarInt.
#[must_use]
pub fn varint_len(value: i32) -> usize {
    let mut value = value as u32;
    let mut len = 1;
    while value >= 0x80 {
        value >>= 7;
        len += 1;
    }
    len
}

/// A 128-bit UUID, stored as the big-endian integer the wire format uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Uuid(pub u128);

impl Uuid {
    #[must_use]
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(u128::from_be_bytes(bytes))
    }

    #[must_use]
    pub fn to_bytes(self) -> [u8; 16] {
        self.0.to_be_bytes()
    }

    /// Parses the undashed hex form the Mojang session server returns.
    pub fn parse_undashed(s: &str) -> Result<Self> {
        if s.len() != 32 {
            return Err(BufferError::OutOfRange("uuid hex length"));
        }
        let value =
            u128::from_str_radix(s, 16).map_err(|_| BufferError::OutOfRange("uuid hex digit"))?;
        Ok(Self(value))
    }
}

impl std::fmt::Display for Uuid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let b = self.0;
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:04x}-{:012x}",
            (b >> 96) as u32,
            (b >> 80) as u16,
            (b >> 64) as u16,
            (b >> 48) as u16,
            b & 0xFFFF_FFFF_FFFF
        )
    }
}

impl From<u128> for Uuid {
    fn from(v: u128) -> Self {
        Self(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varint_io_round_trip() {
        for v in [0, 1, 127, 128, 255, 25565, -1, i32::MIN, i32::MAX] {
            let mut buf = Vec::new();
            write_varint(&mut buf, v).unwrap();
            assert_eq!(buf.len(), varint_len(v));
            let decoded = read_varint(&mut buf.as_slice()).unwrap();
            assert_eq!(decoded, v);
        }
    }

    #[test]
    fn varint_rejects_overlong() {
        // Six continuation bytes cannot be a 32-bit VarInt.
        let bytes = [0x80u8, 0x80, 0x80, 0x80, 0x80, 0x01];
        assert!(matches!(
            read_varint(&mut bytes.as_slice()),
            Err(BufferError::VarIntTooLong)
        ));
    }

    #[test]
    fn varlong_round_trip() {
        for v in [0i64, 1, -1, i64::MIN, i64::MAX, 1 << 40] {
            let mut buf = Vec::new();
            write_varlong(&mut buf, v).unwrap();
            assert_eq!(read_varlong(&mut buf.as_slice()).unwrap(), v);
        }
    }

    #[test]
    fn varlong_rejects_overlong() {
        let bytes = [0x80u8; 11];
        assert!(matches!(
            read_varlong(&mut bytes.as_slice()),
            Err(BufferError::VarLongTooLong)
        ));
    }

    #[test]
    fn uuid_display_and_parse() {
        let uuid = Uuid(0x12345678_9abc_def0_1234_56789abcdef0);
        assert_eq!(uuid.to_string(), "12345678-9abc-def0-1234-56789abcdef0");
        let parsed = Uuid::parse_undashed("123456789abcdef0123456789abcdef0").unwrap();
        assert_eq!(parsed, uuid);
    }
}
