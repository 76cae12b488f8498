//! Bit-addressed buffers and ranges.
//!
//! A [`BitBuffer`] is an immutable view over a contiguous run of bits in a
//! shared byte source, with 1-bit addressability and MSB-first bit order.
//! Sub-slicing is cheap (the byte source is reference-counted, never copied).
//! All positional reads live in [`crate::reader::BitReader`]; this module only
//! provides random access.

use crate::error::{Error, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use byteorder::{BigEndian, ByteOrder};
use std::sync::Arc;

/// A `(start, length)` pair of bit offsets. Empty ranges are legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BitRange {
    pub start: u64,
    pub len: u64,
}

impl BitRange {
    pub fn new(start: u64, len: u64) -> Self {
        BitRange { start, len }
    }

    pub fn stop(&self) -> u64 {
        self.start + self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// True when `other` lies fully within `self`.
    pub fn contains(&self, other: &BitRange) -> bool {
        other.start >= self.start && other.stop() <= self.stop()
    }
}

/// Immutable 1-bit-addressable view over a shared byte source.
#[derive(Debug, Clone)]
pub struct BitBuffer {
    data: Arc<[u8]>,
    /// Absolute bit offset of this view within `data`.
    start: u64,
    /// Length of this view in bits.
    len: u64,
}

impl PartialEq for BitBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.start == other.start && self.len == other.len && self.data == other.data
    }
}

impl BitBuffer {
    /// View over whole bytes.
    pub fn from_bytes(bytes: impl Into<Arc<[u8]>>) -> Self {
        let data = bytes.into();
        let len = data.len() as u64 * 8;
        BitBuffer { data, start: 0, len }
    }

    /// View over a bit prefix of `bytes`; `len_bits` may end mid-byte.
    pub fn from_bytes_len(bytes: impl Into<Arc<[u8]>>, len_bits: u64) -> Result<Self> {
        let data: Arc<[u8]> = bytes.into();
        let max = data.len() as u64 * 8;
        if len_bits > max {
            return Err(Error::OutOfBounds { start: 0, stop: len_bits, len: max });
        }
        Ok(BitBuffer { data, start: 0, len: len_bits })
    }

    /// Length in bits.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Sub-view over `r`, which must lie within this view.
    pub fn slice(&self, r: BitRange) -> Result<BitBuffer> {
        if r.stop() > self.len {
            return Err(Error::OutOfBounds { start: r.start, stop: r.stop(), len: self.len });
        }
        Ok(BitBuffer {
            data: Arc::clone(&self.data),
            start: self.start + r.start,
            len: r.len,
        })
    }

    /// Reads `width` bits (0..=64) at bit offset `pos`, MSB-first.
    pub fn read_bits(&self, pos: u64, width: u32) -> Result<u64> {
        if width > 64 || pos + width as u64 > self.len {
            return Err(Error::OutOfBounds {
                start: pos,
                stop: pos + width as u64,
                len: self.len,
            });
        }
        if width == 0 {
            return Ok(0);
        }
        let abs = self.start + pos;
        // Byte-aligned fast path for the common whole-byte widths.
        if abs % 8 == 0 {
            let i = (abs / 8) as usize;
            match width {
                8 => return Ok(self.data[i] as u64),
                16 => return Ok(BigEndian::read_u16(&self.data[i..]) as u64),
                32 => return Ok(BigEndian::read_u32(&self.data[i..]) as u64),
                64 => return Ok(BigEndian::read_u64(&self.data[i..])),
                _ => {}
            }
        }
        let mut v = 0u64;
        let mut bit = abs;
        let mut remaining = width;
        while remaining > 0 {
            let byte = self.data[(bit / 8) as usize];
            let off = (bit % 8) as u32;
            let take = (8 - off).min(remaining);
            let chunk = (byte >> (8 - off - take)) & (((1u16 << take) - 1) as u8);
            v = (v << take) | chunk as u64;
            bit += take as u64;
            remaining -= take;
        }
        Ok(v)
    }

    /// Copies out the bits of `r` as bytes. The final byte of a range whose
    /// length is not a byte multiple is left-aligned and zero-padded.
    pub fn bytes(&self, r: BitRange) -> Result<Vec<u8>> {
        if r.stop() > self.len {
            return Err(Error::OutOfBounds { start: r.start, stop: r.stop(), len: self.len });
        }
        let mut out = Vec::with_capacity(((r.len + 7) / 8) as usize);
        let abs = self.start + r.start;
        let mut off = 0u64;
        if abs % 8 == 0 {
            let first = (abs / 8) as usize;
            let whole = (r.len / 8) as usize;
            out.extend_from_slice(&self.data[first..first + whole]);
            off = whole as u64 * 8;
        }
        while off < r.len {
            let take = (r.len - off).min(8) as u32;
            let b = self.read_bits(r.start + off, take)? as u8;
            out.push(b << (8 - take));
            off += take as u64;
        }
        Ok(out)
    }
}

/// Rendering applied to raw bit slices when coerced to plain values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BitsFormat {
    /// Uppercase hex, no separators.
    #[default]
    Hex,
    Base64,
    /// One char per byte, unvalidated.
    Raw,
}

/// Byte/bit-range handle over a bit buffer, surfaced by `_bits`/`_bytes` and
/// by byte-sequence scalars. `unit` is 1 for bit addressing, 8 for bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferRange {
    pub buf: BitBuffer,
    pub range: BitRange,
    pub unit: u32,
}

impl BufferRange {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.buf.bytes(self.range)
    }

    /// Renders the spanned bits with the given bit-format function.
    pub fn render(&self, format: BitsFormat) -> Result<String> {
        let bytes = self.to_bytes()?;
        Ok(match format {
            BitsFormat::Hex => {
                let mut s = String::with_capacity(bytes.len() * 2);
                for b in &bytes {
                    s.push_str(&format!("{:02X}", b));
                }
                s
            }
            BitsFormat::Base64 => BASE64.encode(&bytes),
            BitsFormat::Raw => bytes.iter().map(|&b| b as char).collect(),
        })
    }
}
