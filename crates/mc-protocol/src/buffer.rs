//! Positional byte buffer with typed codecs.
//!
//! Mirrors the semantics of Java's `ByteBuffer` as the protocol uses it:
//! writes append at the end and grow the length, reads advance the position
//! and fail on underflow, `flip` rewinds the position for reading back.

use byteorder::{BigEndian, ByteOrder as _, LittleEndian};

use crate::{BufferError, MAX_STRING_UNITS, Result, Uuid};

/// Byte order applied to multi-byte primitive reads and writes.
///
/// VarInt/VarLong group order is fixed by the format and unaffected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endianness {
    #[default]
    Big,
    Little,
}

#[derive(Debug, Clone, Default)]
pub struct ByteBuffer {
    data: Vec<u8>,
    position: usize,
    mark: Option<usize>,
    order: Endianness,
}

impl ByteBuffer {
    /// An empty big-endian buffer, the wire default.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_order(order: Endianness) -> Self {
        Self {
            order,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            ..Self::default()
        }
    }

    /// Wraps existing bytes; position starts at 0, ready for reading.
    #[must_use]
    pub fn wrap(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn order(&self) -> Endianness {
        self.order
    }

    #[must_use]
    pub fn pos(&self) -> usize {
        self.position
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    /// The full backing byte sequence, independent of position.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    /// Resets the position to 0 so written data can be read back.
    pub fn flip(&mut self) {
        self.position = 0;
    }

    /// Resets the position to 0 and discards any mark.
    pub fn rewind(&mut self) {
        self.position = 0;
        self.mark = None;
    }

    /// Saves the current position for a later [`reset`](Self::reset).
    pub fn mark(&mut self) {
        self.mark = Some(self.position);
    }

    /// Restores the position saved by [`mark`](Self::mark).
    pub fn reset(&mut self) -> Result<()> {
        match self.mark {
            Some(mark) => {
                self.position = mark;
                Ok(())
            }
            None => Err(BufferError::InvalidMark),
        }
    }

    pub fn seek(&mut self, position: usize) -> Result<()> {
        if position > self.data.len() {
            return Err(BufferError::InvalidPosition {
                position,
                length: self.data.len(),
            });
        }
        self.position = position;
        Ok(())
    }

    /// Appends bytes at the end of the buffer, growing its length.
    pub fn write(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Consumes `n` bytes from the current position.
    pub fn read(&mut self, n: usize) -> Result<&[u8]> {
        if n > self.remaining() {
            return Err(BufferError::Underflow {
                requested: n,
                remaining: self.remaining(),
            });
        }
        let slice = &self.data[self.position..self.position + n];
        self.position += n;
        Ok(slice)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read(N)?);
        Ok(out)
    }

    // Primitives. Writes are infallible: the value's type is its range proof.

    pub fn write_bool(&mut self, value: bool) {
        self.write(&[u8::from(value)]);
    }

    /// Any nonzero byte decodes as `true`.
    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read(1)?[0] != 0)
    }

    pub fn write_u8(&mut self, value: u8) {
        self.write(&[value]);
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read(1)?[0])
    }

    pub fn write_i8(&mut self, value: i8) {
        self.write(&[value as u8]);
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read(1)?[0] as i8)
    }

    pub fn write_i16(&mut self, value: i16) {
        let mut out = [0u8; 2];
        match self.order {
            Endianness::Big => BigEndian::write_i16(&mut out, value),
            Endianness::Little => LittleEndian::write_i16(&mut out, value),
        }
        self.write(&out);
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        let bytes = self.read_array::<2>()?;
        Ok(match self.order {
            Endianness::Big => BigEndian::read_i16(&bytes),
            Endianness::Little => LittleEndian::read_i16(&bytes),
        })
    }

    pub fn write_u16(&mut self, value: u16) {
        let mut out = [0u8; 2];
        match self.order {
            Endianness::Big => BigEndian::write_u16(&mut out, value),
            Endianness::Little => LittleEndian::write_u16(&mut out, value),
        }
        self.write(&out);
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let bytes = self.read_array::<2>()?;
        Ok(match self.order {
            Endianness::Big => BigEndian::read_u16(&bytes),
            Endianness::Little => LittleEndian::read_u16(&bytes),
        })
    }

    pub fn write_i32(&mut self, value: i32) {
        let mut out = [0u8; 4];
        match self.order {
            Endianness::Big => BigEndian::write_i32(&mut out, value),
            Endianness::Little => LittleEndian::write_i32(&mut out, value),
        }
        self.write(&out);
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        let bytes = self.read_array::<4>()?;
        Ok(match self.order {
            Endianness::Big => BigEndian::read_i32(&bytes),
            Endianness::Little => LittleEndian::read_i32(&bytes),
        })
    }

    pub fn write_i64(&mut self, value: i64) {
        let mut out = [0u8; 8];
        match self.order {
            Endianness::Big => BigEndian::write_i64(&mut out, value),
            Endianness::Little => LittleEndian::write_i64(&mut out, value),
        }
        self.write(&out);
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        let bytes = self.read_array::<8>()?;
        Ok(match self.order {
            Endianness::Big => BigEndian::read_i64(&bytes),
            Endianness::Little => LittleEndian::read_i64(&bytes),
        })
    }

    pub fn write_f32(&mut self, value: f32) {
        let mut out = [0u8; 4];
        match self.order {
            Endianness::Big => BigEndian::write_f32(&mut out, value),
            Endianness::Little => LittleEndian::write_f32(&mut out, value),
        }
        self.write(&out);
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        let bytes = self.read_array::<4>()?;
        Ok(match self.order {
            Endianness::Big => BigEndian::read_f32(&bytes),
            Endianness::Little => LittleEndian::read_f32(&bytes),
        })
    }

    pub fn write_f64(&mut self, value: f64) {
        let mut out = [0u8; 8];
        match self.order {
            Endianness::Big => BigEndian::write_f64(&mut out, value),
            Endianness::Little => LittleEndian::write_f64(&mut out, value),
        }
        self.write(&out);
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        let bytes = self.read_array::<8>()?;
        Ok(match self.order {
            Endianness::Big => BigEndian::read_f64(&bytes),
            Endianness::Little => LittleEndian::read_f64(&bytes),
        })
    }

    // VarInt / VarLong. 32-bit values serialize as unsigned two's complement,
    // so negatives always occupy the full 5 bytes.

    pub fn write_varint(&mut self, value: i32) {
        let mut value = value as u32;
        loop {
            let mut byte = (value & 0x7F) as u8;
            value >>= 7;
            if value != 0 {
                byte |= 0x80;
            }
            self.write_u8(byte);
            if value == 0 {
                break;
            }
        }
    }

    pub fn read_varint(&mut self) -> Result<i32> {
        let mut result = 0i32;
        let mut shift = 0;
        loop {
            let byte = self.read_u8()?;
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

    pub fn write_varlong(&mut self, value: i64) {
        let mut value = value as u64;
        loop {
            let mut byte = (value & 0x7F) as u8;
            value >>= 7;
            if value != 0 {
                byte |= 0x80;
            }
            self.write_u8(byte);
            if value == 0 {
                break;
            }
        }
    }

    pub fn read_varlong(&mut self) -> Result<i64> {
        let mut result = 0i64;
        let mut shift = 0;
        loop {
            let byte = self.read_u8()?;
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

    // Strings. The limit `max_units` counts UTF-16 code units, validated on
    // both ends; the encoded form is a VarInt byte length plus UTF-8 bytes.

    pub fn write_string(&mut self, value: &str, max_units: usize) -> Result<()> {
        if max_units > MAX_STRING_UNITS {
            return Err(BufferError::OutOfRange("string limit above 32767"));
        }
        let units = utf16_units(value);
        if units > max_units {
            return Err(BufferError::StringTooLong {
                len: units,
                max: max_units,
            });
        }
        let bytes = value.as_bytes();
        if bytes.len() > max_units * 3 {
            return Err(BufferError::StringTooLong {
                len: bytes.len(),
                max: max_units * 3,
            });
        }
        self.write_varint(bytes.len() as i32);
        self.write(bytes);
        Ok(())
    }

    pub fn read_string(&mut self, max_units: usize) -> Result<String> {
        if max_units > MAX_STRING_UNITS {
            return Err(BufferError::OutOfRange("string limit above 32767"));
        }
        let byte_len = self.read_varint()?;
        if byte_len < 0 || byte_len as usize > max_units * 3 + 3 {
            return Err(BufferError::StringTooLong {
                len: byte_len.max(0) as usize,
                max: max_units * 3 + 3,
            });
        }
        let value = String::from_utf8(self.read(byte_len as usize)?.to_vec())?;
        let units = utf16_units(&value);
        if units > max_units {
            return Err(BufferError::StringTooLong {
                len: units,
                max: max_units,
            });
        }
        Ok(value)
    }

    // UUIDs are 16 bytes, big-endian regardless of buffer order.

    pub fn write_uuid(&mut self, uuid: Uuid) {
        self.write(&uuid.to_bytes());
    }

    pub fn read_uuid(&mut self) -> Result<Uuid> {
        Ok(Uuid::from_bytes(self.read_array::<16>()?))
    }

    // Bitsets, in both wire forms. The long-array and byte-array encodings
    // are not interchangeable even for the same bits.

    pub fn write_bitset(&mut self, bits: &BitSet) {
        let words = bits.words();
        self.write_varint(words.len() as i32);
        for word in words {
            self.write_i64(*word as i64);
        }
    }

    pub fn read_bitset(&mut self) -> Result<BitSet> {
        let len = self.read_varint()?;
        if len < 0 {
            return Err(BufferError::OutOfRange("negative bitset length"));
        }
        let mut words = Vec::with_capacity(len as usize);
        for _ in 0..len {
            words.push(self.read_i64()? as u64);
        }
        Ok(BitSet::from_words(words))
    }

    /// Writes `bit_count` bits packed into `ceil(bit_count / 8)` bytes.
    pub fn write_fixed_bitset(&mut self, bits: &BitSet, bit_count: usize) -> Result<()> {
        if bits.highest_set_bit().is_some_and(|bit| bit >= bit_count) {
            return Err(BufferError::OutOfRange("bit beyond fixed bitset width"));
        }
        for i in 0..bit_count.div_ceil(8) {
            let mut byte = 0u8;
            for bit in 0..8 {
                if bits.get(i * 8 + bit) {
                    byte |= 1 << bit;
                }
            }
            self.write_u8(byte);
        }
        Ok(())
    }

    pub fn read_fixed_bitset(&mut self, bit_count: usize) -> Result<BitSet> {
        let mut bits = BitSet::new();
        for i in 0..bit_count.div_ceil(8) {
            let byte = self.read_u8()?;
            for bit in 0..8 {
                if byte & (1 << bit) != 0 {
                    bits.set(i * 8 + bit);
                }
            }
        }
        Ok(bits)
    }
}

fn utf16_units(value: &str) -> usize {
    value.chars().map(char::len_utf16).sum()
}

/// A growable bitset; bit `i` lives in `words[i / 64]` at `1 << (i % 64)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BitSet {
    words: Vec<u64>,
}

impl BitSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_words(words: Vec<u64>) -> Self {
        Self { words }
    }

    #[must_use]
    pub fn words(&self) -> &[u64] {
        &self.words
    }

    #[must_use]
    pub fn get(&self, index: usize) -> bool {
        self.words
            .get(index / 64)
            .is_some_and(|word| word & (1 << (index % 64)) != 0)
    }

    pub fn set(&mut self, index: usize) {
        let word = index / 64;
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1 << (index % 64);
    }

    pub fn clear(&mut self, index: usize) {
        if let Some(word) = self.words.get_mut(index / 64) {
            *word &= !(1 << (index % 64));
        }
    }

    #[must_use]
    pub fn highest_set_bit(&self) -> Option<usize> {
        self.words.iter().enumerate().rev().find_map(|(i, word)| {
            (*word != 0).then(|| i * 64 + 63 - word.leading_zeros() as usize)
        })
    }
}
