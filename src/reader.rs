//! Positioned reads over a [`BitBuffer`] with a length-scope window.
//!
//! The reader tracks a current bit position and a `limit`: reads past the
//! limit fail with [`Error::Range`]. Length-scoped sub-decodes narrow the
//! limit and restore it afterwards (see
//! [`Decoder::field_format_len`](crate::decoder::Decoder::field_format_len)).

use crate::bits::{BitBuffer, BitRange};
use crate::error::{Error, Result};

pub struct BitReader {
    buf: BitBuffer,
    pos: u64,
    limit: u64,
}

impl BitReader {
    pub fn new(buf: BitBuffer) -> Self {
        let limit = buf.len();
        BitReader { buf, pos: 0, limit }
    }

    /// Reader restricted to `r`: position starts at `r.start`, reads stop at
    /// `r.stop()`. Positions stay absolute within `buf`.
    pub fn with_range(buf: BitBuffer, r: BitRange) -> Result<Self> {
        if r.stop() > buf.len() {
            return Err(Error::OutOfBounds { start: r.start, stop: r.stop(), len: buf.len() });
        }
        Ok(BitReader { buf, pos: r.start, limit: r.stop() })
    }

    pub fn buffer(&self) -> &BitBuffer {
        &self.buf
    }

    pub fn pos(&self) -> u64 {
        self.pos
    }

    /// End of the innermost length scope.
    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn bits_left(&self) -> u64 {
        self.limit - self.pos
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.limit
    }

    pub fn seek_abs(&mut self, pos: u64) -> Result<u64> {
        if pos > self.limit {
            return Err(Error::Range { pos: self.pos, wanted: pos.saturating_sub(self.pos), left: self.bits_left() });
        }
        self.pos = pos;
        Ok(self.pos)
    }

    pub fn seek_rel(&mut self, delta: i64) -> Result<u64> {
        let target = if delta < 0 {
            self.pos.checked_sub(delta.unsigned_abs())
        } else {
            self.pos.checked_add(delta as u64)
        };
        match target {
            Some(p) => self.seek_abs(p),
            None => Err(Error::Range { pos: self.pos, wanted: delta.unsigned_abs(), left: self.bits_left() }),
        }
    }

    /// Narrows the scope to end at `end`; returns the previous limit for
    /// [`BitReader::restore_limit`]. `end` must not widen the current scope.
    pub(crate) fn push_limit(&mut self, end: u64) -> Result<u64> {
        if end > self.limit {
            return Err(Error::Range { pos: self.pos, wanted: end - self.pos, left: self.bits_left() });
        }
        let old = self.limit;
        self.limit = end;
        Ok(old)
    }

    pub(crate) fn restore_limit(&mut self, limit: u64) {
        self.limit = limit;
    }

    fn claim(&self, width: u64) -> Result<()> {
        match self.pos.checked_add(width) {
            Some(end) if end <= self.limit => Ok(()),
            _ => Err(Error::Range { pos: self.pos, wanted: width, left: self.bits_left() }),
        }
    }

    /// Unsigned integer of 0..=64 bits, MSB-first.
    pub fn u(&mut self, width: u32) -> Result<u64> {
        if width > 64 {
            return Err(Error::Range { pos: self.pos, wanted: width as u64, left: self.bits_left() });
        }
        self.claim(width as u64)?;
        let v = self.buf.read_bits(self.pos, width)?;
        self.pos += width as u64;
        Ok(v)
    }

    /// Signed integer of 0..=64 bits, two's complement, sign-extended.
    pub fn s(&mut self, width: u32) -> Result<i64> {
        let raw = self.u(width)?;
        if width == 0 {
            return Ok(0);
        }
        let sh = 64 - width;
        Ok(((raw << sh) as i64) >> sh)
    }

    /// IEEE-754 float of 16, 32 or 64 bits, widened to f64.
    pub fn f(&mut self, width: u32) -> Result<f64> {
        match width {
            16 => Ok(f16_to_f64(self.u(16)? as u16)),
            32 => Ok(f32::from_bits(self.u(32)? as u32) as f64),
            64 => Ok(f64::from_bits(self.u(64)?)),
            _ => Err(Error::Range { pos: self.pos, wanted: width as u64, left: self.bits_left() }),
        }
    }

    /// Advances over `bit_len` bits and returns their range. No copy.
    pub fn raw(&mut self, bit_len: u64) -> Result<BitRange> {
        self.claim(bit_len)?;
        let r = BitRange::new(self.pos, bit_len);
        self.pos += bit_len;
        Ok(r)
    }

    /// Copies out `byte_len` whole bytes.
    pub fn bytes(&mut self, byte_len: u64) -> Result<Vec<u8>> {
        let bit_len = byte_len.checked_mul(8).ok_or(Error::Range {
            pos: self.pos,
            wanted: u64::MAX,
            left: self.bits_left(),
        })?;
        let r = self.raw(bit_len)?;
        self.buf.bytes(r)
    }

    /// UTF-8 string of `byte_len` bytes. Invalid UTF-8 is a decode error.
    pub fn utf8(&mut self, byte_len: u64) -> Result<String> {
        let start = self.pos;
        let bytes = self.bytes(byte_len)?;
        String::from_utf8(bytes).map_err(|_| Error::InvalidUtf8 { pos: start })
    }
}

fn f16_to_f64(bits: u16) -> f64 {
    let sign = if bits & 0x8000 != 0 { -1.0 } else { 1.0 };
    let exp = ((bits >> 10) & 0x1f) as i32;
    let man = (bits & 0x3ff) as f64;
    match exp {
        0 => sign * man * (-24f64).exp2(),
        0x1f => {
            if man == 0.0 {
                sign * f64::INFINITY
            } else {
                f64::NAN
            }
        }
        _ => sign * (1.0 + man / 1024.0) * f64::from(exp - 15).exp2(),
    }
}
