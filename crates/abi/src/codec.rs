//! Byte-level codec
//!
//! All multi-byte integers are big-endian so that producer and consumer may run
//! on different platforms.
//!
//! ```text
//! u8 tag | u32 count + elements | u8 flag (+ payload) | u32 length + UTF-8
//! ```

use std::io::{Read, Write};

use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;

use crate::error::DecodeError;

/// Deepest type nesting accepted from decoded or demangled input
pub const MAX_NESTING: usize = 256;

/// Growable output buffer
#[derive(Debug, Default, Clone)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    #[inline]
    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    #[inline]
    pub fn write_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    #[inline]
    pub fn write_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    /// Write a list length or string length
    ///
    /// # Panics
    /// Panics if `len` does not fit in a `u32`.
    pub fn write_len(&mut self, len: usize) {
        assert!(
            len <= u32::MAX as usize,
            "length {} exceeds the u32 range of the binary format",
            len
        );
        self.write_u32(len as u32);
    }

    /// Write a presence flag
    #[inline]
    pub fn write_flag(&mut self, present: bool) {
        self.write_u8(present as u8);
    }

    pub fn write_str(&mut self, value: &str) {
        self.write_len(value.len());
        self.buf.extend_from_slice(value.as_bytes());
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Cursor over an input buffer
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            pos: 0,
            depth: 0,
        }
    }

    /// Current offset from the start of the buffer
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, needed: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < needed {
            return Err(DecodeError::UnexpectedEof {
                offset: self.pos,
                needed,
                remaining: self.remaining(),
            });
        }
        let slice = &self.bytes[self.pos..self.pos + needed];
        self.pos += needed;
        Ok(slice)
    }

    /// Read the next byte without consuming it
    pub fn peek_u8(&self) -> Result<u8, DecodeError> {
        self.bytes
            .get(self.pos)
            .copied()
            .ok_or(DecodeError::UnexpectedEof {
                offset: self.pos,
                needed: 1,
                remaining: 0,
            })
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_i32(&mut self) -> Result<i32, DecodeError> {
        let bytes = self.take(4)?;
        Ok(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_len(&mut self) -> Result<usize, DecodeError> {
        Ok(self.read_u32()? as usize)
    }

    /// Read a presence flag, rejecting anything but 0 and 1
    pub fn read_flag(&mut self) -> Result<bool, DecodeError> {
        let offset = self.pos;
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            flag => Err(DecodeError::InvalidFlag { offset, flag }),
        }
    }

    pub fn read_string(&mut self) -> Result<String, DecodeError> {
        let len = self.read_len()?;
        let offset = self.pos;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|source| DecodeError::InvalidUtf8 { offset, source })
    }

    /// Consume a kind tag and check it against the variant being decoded
    pub fn expect_tag(&mut self, what: &'static str, expected: u8) -> Result<(), DecodeError> {
        let offset = self.pos;
        let found = self.read_u8()?;
        if found != expected {
            return Err(DecodeError::TagMismatch {
                what,
                offset,
                expected,
                found,
            });
        }
        Ok(())
    }

    /// Enter one level of nested value, failing past [`MAX_NESTING`]
    ///
    /// Every successful call is paired with [`leave`](Self::leave).
    pub fn enter(&mut self) -> Result<(), DecodeError> {
        if self.depth >= MAX_NESTING {
            return Err(DecodeError::NestingTooDeep { offset: self.pos });
        }
        self.depth += 1;
        Ok(())
    }

    pub fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Current nesting level
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Fail if any input is left
    pub fn finish(&self) -> Result<(), DecodeError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(DecodeError::TrailingBytes(n)),
        }
    }
}

/// Values with a binary encoding
pub trait Encode {
    fn encode(&self, writer: &mut ByteWriter);

    fn to_bytes(&self) -> Vec<u8> {
        let mut writer = ByteWriter::new();
        self.encode(&mut writer);
        writer.into_bytes()
    }

    /// Encode, then pass the whole payload through `compressor`
    fn to_compressed_bytes(&self, compressor: &dyn Compressor) -> std::io::Result<Vec<u8>> {
        compressor.compress(&self.to_bytes())
    }
}

/// Values that can be decoded from the binary encoding
pub trait Decode: Sized {
    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError>;

    /// Decode a complete buffer, rejecting trailing bytes
    fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = ByteReader::new(bytes);
        let value = Self::decode(&mut reader)?;
        reader.finish()?;
        Ok(value)
    }

    /// Decompress with `compressor`, then decode the complete payload
    fn from_compressed_bytes(bytes: &[u8], compressor: &dyn Compressor) -> Result<Self, DecodeError> {
        let payload = compressor.decompress(bytes)?;
        Self::from_bytes(&payload)
    }
}

impl Encode for String {
    fn encode(&self, writer: &mut ByteWriter) {
        writer.write_str(self);
    }
}

impl Decode for String {
    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        reader.read_string()
    }
}

impl<T: Encode> Encode for [T] {
    fn encode(&self, writer: &mut ByteWriter) {
        writer.write_len(self.len());
        for item in self {
            item.encode(writer);
        }
    }
}

impl<T: Encode> Encode for Vec<T> {
    fn encode(&self, writer: &mut ByteWriter) {
        self.as_slice().encode(writer);
    }
}

impl<T: Decode> Decode for Vec<T> {
    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        let count = reader.read_len()?;
        // Every element takes at least one byte
        let mut items = Vec::with_capacity(count.min(reader.remaining()));
        for _ in 0..count {
            items.push(T::decode(reader)?);
        }
        Ok(items)
    }
}

impl<T: Encode> Encode for Option<T> {
    fn encode(&self, writer: &mut ByteWriter) {
        writer.write_flag(self.is_some());
        if let Some(value) = self {
            value.encode(writer);
        }
    }
}

impl<T: Decode> Decode for Option<T> {
    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        if reader.read_flag()? {
            Ok(Some(T::decode(reader)?))
        } else {
            Ok(None)
        }
    }
}

/// Byte-stream compressor applied to whole serialized payloads
pub trait Compressor {
    fn compress(&self, data: &[u8]) -> std::io::Result<Vec<u8>>;
    fn decompress(&self, data: &[u8]) -> std::io::Result<Vec<u8>>;
}

/// Raw DEFLATE compressor
#[derive(Debug, Clone, Copy)]
pub struct DeflateCompressor {
    level: Compression,
}

impl DeflateCompressor {
    /// Create a compressor with a level from 0 (store) to 9 (best)
    pub fn new(level: u32) -> Self {
        Self {
            level: Compression::new(level.min(9)),
        }
    }

    pub fn fast() -> Self {
        Self {
            level: Compression::fast(),
        }
    }

    pub fn best() -> Self {
        Self {
            level: Compression::best(),
        }
    }
}

impl Default for DeflateCompressor {
    fn default() -> Self {
        Self {
            level: Compression::default(),
        }
    }
}

impl Compressor for DeflateCompressor {
    fn compress(&self, data: &[u8]) -> std::io::Result<Vec<u8>> {
        let mut encoder = DeflateEncoder::new(Vec::with_capacity(data.len() / 2), self.level);
        encoder.write_all(data)?;
        let compressed = encoder.finish()?;
        log::trace!("Deflated {} bytes to {}", data.len(), compressed.len());
        Ok(compressed)
    }

    fn decompress(&self, data: &[u8]) -> std::io::Result<Vec<u8>> {
        let mut decoder = DeflateDecoder::new(data);
        let mut out = Vec::with_capacity(data.len() * 2);
        decoder.read_to_end(&mut out)?;
        log::trace!("Inflated {} bytes to {}", data.len(), out.len());
        Ok(out)
    }
}
