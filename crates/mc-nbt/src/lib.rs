//! NBT (Named Binary Tag) serialization.
//!
//! The tree is split into [`NbtValue`] (one variant per payload kind),
//! [`NbtList`] (one variant per element type, so list homogeneity holds by
//! construction) and [`NbtCompound`] (order-preserving named children). A
//! root tag plus its name is a [`NamedTag`].
//!
//! Binary format of a named tag: `u8 tag id | u16 name length | name bytes |
//! payload`. List elements are headerless payloads. A compound's children
//! are named tags terminated by a lone End byte. Standalone blobs may be
//! gzip-wrapped.

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use mc_protocol::{BufferError, ByteBuffer};
use thiserror::Error;

pub mod snbt;

/// NBT tag type IDs.
pub mod tag_type {
    pub const END: u8 = 0;
    pub const BYTE: u8 = 1;
    pub const SHORT: u8 = 2;
    pub const INT: u8 = 3;
    pub const LONG: u8 = 4;
    pub const FLOAT: u8 = 5;
    pub const DOUBLE: u8 = 6;
    pub const BYTE_ARRAY: u8 = 7;
    pub const STRING: u8 = 8;
    pub const LIST: u8 = 9;
    pub const COMPOUND: u8 = 10;
    pub const INT_ARRAY: u8 = 11;
    pub const LONG_ARRAY: u8 = 12;
}

#[derive(Error, Debug)]
pub enum NbtError {
    #[error("unknown NBT tag id: {0:#04x}")]
    UnknownTagId(u8),
    #[error("invalid value: {0}")]
    InvalidValue(&'static str),
    #[error("invalid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Buffer(#[from] BufferError),
}

pub type Result<T> = std::result::Result<T, NbtError>;

/// An NBT value.
#[derive(Debug, Clone, PartialEq)]
pub enum NbtValue {
    /// The terminator sentinel; carries neither name nor payload.
    End,
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    ByteArray(Vec<i8>),
    String(String),
    List(NbtList),
    Compound(NbtCompound),
    IntArray(Vec<i32>),
    LongArray(Vec<i64>),
}

/// An NBT list; all elements share one tag type.
#[derive(Debug, Clone, PartialEq)]
pub enum NbtList {
    Empty,
    Byte(Vec<i8>),
    Short(Vec<i16>),
    Int(Vec<i32>),
    Long(Vec<i64>),
    Float(Vec<f32>),
    Double(Vec<f64>),
    ByteArray(Vec<Vec<i8>>),
    String(Vec<String>),
    List(Vec<NbtList>),
    Compound(Vec<NbtCompound>),
    IntArray(Vec<Vec<i32>>),
    LongArray(Vec<Vec<i64>>),
}

/// An NBT compound: named children in insertion order, names unique.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NbtCompound {
    entries: Vec<(String, NbtValue)>,
}

/// A root tag together with its name.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedTag {
    pub name: String,
    pub value: NbtValue,
}

impl NamedTag {
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<NbtValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    #[must_use]
    pub fn to_snbt(&self) -> String {
        snbt::named(&self.name, &self.value)
    }
}

/// Decodes one named tag from the buffer. With `compressed` the remaining
/// bytes are gunzipped first.
pub fn read_nbt(buffer: &mut ByteBuffer, compressed: bool) -> Result<NamedTag> {
    if compressed {
        let remaining = buffer.remaining();
        let mut decoder = GzDecoder::new(buffer.read(remaining)?);
        let mut plain = Vec::new();
        decoder.read_to_end(&mut plain)?;
        let mut inner = ByteBuffer::wrap(plain);
        return read_nbt(&mut inner, false);
    }
    read_named(buffer)
}

/// Encodes one named tag; with `compressed` the blob is gzip-wrapped.
pub fn write_nbt(tag: &NamedTag, compressed: bool) -> Result<Vec<u8>> {
    let mut buffer = ByteBuffer::new();
    write_named(&tag.name, &tag.value, &mut buffer)?;
    let plain = buffer.into_vec();
    if compressed {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&plain)?;
        Ok(encoder.finish()?)
    } else {
        Ok(plain)
    }
}

fn write_named(name: &str, value: &NbtValue, buffer: &mut ByteBuffer) -> Result<()> {
    buffer.write_u8(value.tag_id());
    if let NbtValue::End = value {
        return Ok(());
    }
    write_name(name, buffer)?;
    value.write_payload(buffer)
}

fn read_named(buffer: &mut ByteBuffer) -> Result<NamedTag> {
    let tag_id = buffer.read_u8()?;
    if tag_id == tag_type::END {
        return Ok(NamedTag {
            name: String::new(),
            value: NbtValue::End,
        });
    }
    let name = read_utf8(buffer)?;
    let value = NbtValue::read_payload(tag_id, buffer)?;
    Ok(NamedTag { name, value })
}

fn write_name(name: &str, buffer: &mut ByteBuffer) -> Result<()> {
    let bytes = name.as_bytes();
    if bytes.len() > u16::MAX as usize {
        return Err(NbtError::InvalidValue("tag name longer than 65535 bytes"));
    }
    buffer.write_u16(bytes.len() as u16);
    buffer.write(bytes);
    Ok(())
}

// Tag names and string payloads share the u16-prefixed UTF-8 layout.
fn read_utf8(buffer: &mut ByteBuffer) -> Result<String> {
    let len = buffer.read_u16()? as usize;
    Ok(String::from_utf8(buffer.read(len)?.to_vec())?)
}

fn read_len(buffer: &mut ByteBuffer) -> Result<usize> {
    let len = buffer.read_i32()?;
    if len < 0 {
        return Err(NbtError::InvalidValue("negative length"));
    }
    Ok(len as usize)
}

impl NbtValue {
    /// The wire tag id for this value.
    #[must_use]
    pub fn tag_id(&self) -> u8 {
        match self {
            Self::End => tag_type::END,
            Self::Byte(_) => tag_type::BYTE,
            Self::Short(_) => tag_type::SHORT,
            Self::Int(_) => tag_type::INT,
            Self::Long(_) => tag_type::LONG,
            Self::Float(_) => tag_type::FLOAT,
            Self::Double(_) => tag_type::DOUBLE,
            Self::ByteArray(_) => tag_type::BYTE_ARRAY,
            Self::String(_) => tag_type::STRING,
            Self::List(_) => tag_type::LIST,
            Self::Compound(_) => tag_type::COMPOUND,
            Self::IntArray(_) => tag_type::INT_ARRAY,
            Self::LongArray(_) => tag_type::LONG_ARRAY,
        }
    }

    #[must_use]
    pub fn to_snbt(&self) -> String {
        snbt::value(self)
    }

    /// Writes the payload only (no tag id, no name).
    fn write_payload(&self, buffer: &mut ByteBuffer) -> Result<()> {
        match self {
            Self::End => {}
            Self::Byte(v) => buffer.write_i8(*v),
            Self::Short(v) => buffer.write_i16(*v),
            Self::Int(v) => buffer.write_i32(*v),
            Self::Long(v) => buffer.write_i64(*v),
            Self::Float(v) => buffer.write_f32(*v),
            Self::Double(v) => buffer.write_f64(*v),
            Self::ByteArray(v) => {
                buffer.write_i32(v.len() as i32);
                for b in v {
                    buffer.write_i8(*b);
                }
            }
            Self::String(v) => {
                let bytes = v.as_bytes();
                if bytes.len() > u16::MAX as usize {
                    return Err(NbtError::InvalidValue("string longer than 65535 bytes"));
                }
                buffer.write_u16(bytes.len() as u16);
                buffer.write(bytes);
            }
            Self::List(list) => list.write_payload(buffer)?,
            Self::Compound(compound) => compound.write_payload(buffer)?,
            Self::IntArray(v) => {
                buffer.write_i32(v.len() as i32);
                for i in v {
                    buffer.write_i32(*i);
                }
            }
            Self::LongArray(v) => {
                buffer.write_i32(v.len() as i32);
                for l in v {
                    buffer.write_i64(*l);
                }
            }
        }
        Ok(())
    }

    /// Reads the headerless payload for `tag_id`.
    fn read_payload(tag_id: u8, buffer: &mut ByteBuffer) -> Result<Self> {
        Ok(match tag_id {
            tag_type::END => Self::End,
            tag_type::BYTE => Self::Byte(buffer.read_i8()?),
            tag_type::SHORT => Self::Short(buffer.read_i16()?),
            tag_type::INT => Self::Int(buffer.read_i32()?),
            tag_type::LONG => Self::Long(buffer.read_i64()?),
            tag_type::FLOAT => Self::Float(buffer.read_f32()?),
            tag_type::DOUBLE => Self::Double(buffer.read_f64()?),
            tag_type::BYTE_ARRAY => {
                let len = read_len(buffer)?;
                let mut out = Vec::with_capacity(len);
                for _ in 0..len {
                    out.push(buffer.read_i8()?);
                }
                Self::ByteArray(out)
            }
            tag_type::STRING => Self::String(read_utf8(buffer)?),
            tag_type::LIST => Self::List(NbtList::read_payload(buffer)?),
            tag_type::COMPOUND => Self::Compound(NbtCompound::read_payload(buffer)?),
            tag_type::INT_ARRAY => {
                let len = read_len(buffer)?;
                let mut out = Vec::with_capacity(len);
                for _ in 0..len {
                    out.push(buffer.read_i32()?);
                }
                Self::IntArray(out)
            }
            tag_type::LONG_ARRAY => {
                let len = read_len(buffer)?;
                let mut out = Vec::with_capacity(len);
                for _ in 0..len {
                    out.push(buffer.read_i64()?);
                }
                Self::LongArray(out)
            }
            other => return Err(NbtError::UnknownTagId(other)),
        })
    }
}

impl NbtList {
    /// The element tag id written before the length.
    #[must_use]
    pub fn element_id(&self) -> u8 {
        match self {
            Self::Empty => tag_type::END,
            Self::Byte(_) => tag_type::BYTE,
            Self::Short(_) => tag_type::SHORT,
            Self::Int(_) => tag_type::INT,
            Self::Long(_) => tag_type::LONG,
            Self::Float(_) => tag_type::FLOAT,
            Self::Double(_) => tag_type::DOUBLE,
            Self::ByteArray(_) => tag_type::BYTE_ARRAY,
            Self::String(_) => tag_type::STRING,
            Self::List(_) => tag_type::LIST,
            Self::Compound(_) => tag_type::COMPOUND,
            Self::IntArray(_) => tag_type::INT_ARRAY,
            Self::LongArray(_) => tag_type::LONG_ARRAY,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Empty => 0,
            Self::Byte(v) => v.len(),
            Self::Short(v) => v.len(),
            Self::Int(v) => v.len(),
            Self::Long(v) => v.len(),
            Self::Float(v) => v.len(),
            Self::Double(v) => v.len(),
            Self::ByteArray(v) => v.len(),
            Self::String(v) => v.len(),
            Self::List(v) => v.len(),
            Self::Compound(v) => v.len(),
            Self::IntArray(v) => v.len(),
            Self::LongArray(v) => v.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Builds a homogeneous list from loose values; mixed element types fail.
    pub fn from_values(values: Vec<NbtValue>) -> Result<Self> {
        let Some(first) = values.first() else {
            return Ok(Self::Empty);
        };
        let element_id = first.tag_id();
        if element_id == tag_type::END {
            return Err(NbtError::InvalidValue("End is not a list element type"));
        }
        if values.iter().any(|v| v.tag_id() != element_id) {
            return Err(NbtError::InvalidValue("mixed element types in list"));
        }
        macro_rules! collect {
            ($variant:ident) => {
                Self::$variant(
                    values
                        .into_iter()
                        .map(|v| match v {
                            NbtValue::$variant(inner) => inner,
                            _ => unreachable!(),
                        })
                        .collect(),
                )
            };
        }
        Ok(match element_id {
            tag_type::BYTE => collect!(Byte),
            tag_type::SHORT => collect!(Short),
            tag_type::INT => collect!(Int),
            tag_type::LONG => collect!(Long),
            tag_type::FLOAT => collect!(Float),
            tag_type::DOUBLE => collect!(Double),
            tag_type::BYTE_ARRAY => collect!(ByteArray),
            tag_type::STRING => collect!(String),
            tag_type::LIST => collect!(List),
            tag_type::COMPOUND => collect!(Compound),
            tag_type::INT_ARRAY => collect!(IntArray),
            tag_type::LONG_ARRAY => collect!(LongArray),
            _ => unreachable!(),
        })
    }

    /// Writes element id, length and the headerless element payloads.
    fn write_payload(&self, buffer: &mut ByteBuffer) -> Result<()> {
        buffer.write_u8(self.element_id());
        buffer.write_i32(self.len() as i32);
        match self {
            Self::Empty => {}
            Self::Byte(v) => {
                for b in v {
                    buffer.write_i8(*b);
                }
            }
            Self::Short(v) => {
                for s in v {
                    buffer.write_i16(*s);
                }
            }
            Self::Int(v) => {
                for i in v {
                    buffer.write_i32(*i);
                }
            }
            Self::Long(v) => {
                for l in v {
                    buffer.write_i64(*l);
                }
            }
            Self::Float(v) => {
                for f in v {
                    buffer.write_f32(*f);
                }
            }
            Self::Double(v) => {
                for d in v {
                    buffer.write_f64(*d);
                }
            }
            Self::ByteArray(v) => {
                for arr in v {
                    NbtValue::ByteArray(arr.clone()).write_payload(buffer)?;
                }
            }
            Self::String(v) => {
                for s in v {
                    NbtValue::String(s.clone()).write_payload(buffer)?;
                }
            }
            Self::List(v) => {
                for list in v {
                    list.write_payload(buffer)?;
                }
            }
            Self::Compound(v) => {
                for compound in v {
                    compound.write_payload(buffer)?;
                }
            }
            Self::IntArray(v) => {
                for arr in v {
                    NbtValue::IntArray(arr.clone()).write_payload(buffer)?;
                }
            }
            Self::LongArray(v) => {
                for arr in v {
                    NbtValue::LongArray(arr.clone()).write_payload(buffer)?;
                }
            }
        }
        Ok(())
    }

    fn read_payload(buffer: &mut ByteBuffer) -> Result<Self> {
        let element_id = buffer.read_u8()?;
        let len = buffer.read_i32()?;
        if len <= 0 || element_id == tag_type::END {
            return Ok(Self::Empty);
        }
        let mut values = Vec::with_capacity(len as usize);
        for _ in 0..len {
            values.push(NbtValue::read_payload(element_id, buffer)?);
        }
        Self::from_values(values)
    }
}

impl NbtCompound {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_entries(entries: Vec<(String, NbtValue)>) -> Self {
        let mut compound = Self::new();
        for (name, value) in entries {
            compound.insert(name, value);
        }
        compound
    }

    /// Inserts a child, replacing any existing child of the same name so
    /// names stay unique. Insertion order is preserved.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<NbtValue>) {
        let name = name.into();
        let value = value.into();
        if let Some(entry) = self.entries.iter_mut().find(|(n, _)| *n == name) {
            entry.1 = value;
        } else {
            self.entries.push((name, value));
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&NbtValue> {
        self.entries
            .iter()
            .find_map(|(n, v)| (n == name).then_some(v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, NbtValue)> {
        self.entries.iter()
    }

    /// Named children followed by an End byte.
    fn write_payload(&self, buffer: &mut ByteBuffer) -> Result<()> {
        for (name, value) in &self.entries {
            write_named(name, value, buffer)?;
        }
        buffer.write_u8(tag_type::END);
        Ok(())
    }

    fn read_payload(buffer: &mut ByteBuffer) -> Result<Self> {
        let mut compound = Self::new();
        loop {
            let child = read_named(buffer)?;
            if let NbtValue::End = child.value {
                break;
            }
            compound.insert(child.name, child.value);
        }
        Ok(compound)
    }
}

// Conversions for ergonomic tree building.
impl From<bool> for NbtValue {
    fn from(v: bool) -> Self {
        Self::Byte(i8::from(v))
    }
}

impl From<i8> for NbtValue {
    fn from(v: i8) -> Self {
        Self::Byte(v)
    }
}

impl From<i16> for NbtValue {
    fn from(v: i16) -> Self {
        Self::Short(v)
    }
}

impl From<i32> for NbtValue {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl From<i64> for NbtValue {
    fn from(v: i64) -> Self {
        Self::Long(v)
    }
}

impl From<f32> for NbtValue {
    fn from(v: f32) -> Self {
        Self::Float(v)
    }
}

impl From<f64> for NbtValue {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<&str> for NbtValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for NbtValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<NbtCompound> for NbtValue {
    fn from(v: NbtCompound) -> Self {
        Self::Compound(v)
    }
}

impl From<NbtList> for NbtValue {
    fn from(v: NbtList) -> Self {
        Self::List(v)
    }
}

impl From<Vec<i8>> for NbtValue {
    fn from(v: Vec<i8>) -> Self {
        Self::ByteArray(v)
    }
}

impl From<Vec<i32>> for NbtValue {
    fn from(v: Vec<i32>) -> Self {
        Self::IntArray(v)
    }
}

impl From<Vec<i64>> for NbtValue {
    fn from(v: Vec<i64>) -> Self {
        Self::LongArray(v)
    }
}

/// Builds an [`NbtCompound`] from `key => value` pairs.
///
/// ```
/// use mc_nbt::nbt;
///
/// let compound = nbt! {
///     "byte" => 1i8,
///     "string" => "hello",
///     "nested" => nbt! { "inner" => true },
/// };
/// assert_eq!(compound.len(), 3);
/// ```
#[macro_export]
macro_rules! nbt {
    () => {
        $crate::NbtCompound::new()
    };

    ($($key:expr => $value:expr),* $(,)?) => {{
        let mut compound = $crate::NbtCompound::new();
        $(
            compound.insert($key, $value);
        )*
        compound
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(tag: &NamedTag, compressed: bool) -> NamedTag {
        let bytes = write_nbt(tag, compressed).unwrap();
        let mut buf = ByteBuffer::wrap(bytes);
        read_nbt(&mut buf, compressed).unwrap()
    }

    #[test]
    fn byte_tag_binary_encoding() {
        let tag = NamedTag::new("a", 5i8);
        let bytes = write_nbt(&tag, false).unwrap();
        assert_eq!(bytes, [0x01, 0x00, 0x01, 0x61, 0x05]);
    }

    #[test]
    fn primitive_round_trips() {
        let tags = [
            NamedTag::new("b", NbtValue::Byte(-128)),
            NamedTag::new("s", NbtValue::Short(12345)),
            NamedTag::new("i", NbtValue::Int(i32::MIN)),
            NamedTag::new("l", NbtValue::Long(i64::MAX)),
            NamedTag::new("f", NbtValue::Float(1.25)),
            NamedTag::new("d", NbtValue::Double(-2.5)),
            NamedTag::new("str", NbtValue::String("hello \"mc\"".into())),
        ];
        for tag in &tags {
            assert_eq!(&roundtrip(tag, false), tag);
            assert_eq!(&roundtrip(tag, true), tag);
        }
    }

    #[test]
    fn array_round_trips() {
        let tags = [
            NamedTag::new("ba", NbtValue::ByteArray(vec![1, -2, 3])),
            NamedTag::new("ia", NbtValue::IntArray(vec![1, 2, 3])),
            NamedTag::new("la", NbtValue::LongArray(vec![1, 2, 3])),
        ];
        for tag in &tags {
            assert_eq!(&roundtrip(tag, false), tag);
        }
    }

    #[test]
    fn compound_preserves_insertion_order() {
        let compound = nbt! {
            "z" => 1i8,
            "a" => 2i8,
            "m" => 3i8,
        };
        let tag = NamedTag::new("root", compound);
        let NamedTag {
            value: NbtValue::Compound(parsed),
            ..
        } = roundtrip(&tag, false)
        else {
            panic!("expected compound root");
        };
        let names: Vec<_> = parsed.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["z", "a", "m"]);
    }

    #[test]
    fn compound_insert_keeps_names_unique() {
        let mut compound = NbtCompound::new();
        compound.insert("x", 1i8);
        compound.insert("x", 2i8);
        assert_eq!(compound.len(), 1);
        assert_eq!(compound.get("x"), Some(&NbtValue::Byte(2)));
    }

    #[test]
    fn nested_compound_round_trip() {
        let root = nbt! {
            "inner" => nbt! { "msg" => "hi" },
            "list" => NbtList::Byte(vec![1, 2]),
        };
        let tag = NamedTag::new("root", root);
        assert_eq!(roundtrip(&tag, false), tag);
        assert_eq!(roundtrip(&tag, true), tag);
    }

    #[test]
    fn list_round_trip() {
        let tag = NamedTag::new("list", NbtList::Short(vec![1, 2, 3]));
        assert_eq!(roundtrip(&tag, false), tag);
    }

    #[test]
    fn empty_list_round_trip() {
        let tag = NamedTag::new("empty", NbtList::Empty);
        assert_eq!(roundtrip(&tag, false), tag);
    }

    #[test]
    fn list_of_compounds_round_trip() {
        let tag = NamedTag::new(
            "players",
            NbtList::Compound(vec![nbt! { "id" => 1 }, nbt! { "id" => 2 }]),
        );
        assert_eq!(roundtrip(&tag, false), tag);
    }

    #[test]
    fn mixed_list_construction_fails() {
        let result = NbtList::from_values(vec![NbtValue::Byte(1), NbtValue::Short(2)]);
        assert!(matches!(result, Err(NbtError::InvalidValue(_))));
    }

    #[test]
    fn unknown_tag_id_rejected() {
        let mut buf = ByteBuffer::wrap(vec![0xFF, 0x00, 0x00]);
        assert!(matches!(
            read_nbt(&mut buf, false),
            Err(NbtError::UnknownTagId(0xFF))
        ));
    }

    #[test]
    fn end_root_decodes_as_end() {
        let mut buf = ByteBuffer::wrap(vec![0x00]);
        let tag = read_nbt(&mut buf, false).unwrap();
        assert_eq!(tag.value, NbtValue::End);
        assert!(tag.name.is_empty());
    }

    #[test]
    fn empty_compound_round_trip() {
        let tag = NamedTag::new("", NbtCompound::new());
        let bytes = write_nbt(&tag, false).unwrap();
        assert_eq!(bytes, [0x0A, 0x00, 0x00, 0x00]);
        assert_eq!(roundtrip(&tag, false), tag);
    }
}
