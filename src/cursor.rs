//! Forward-only little-endian byte cursors.
//!
//! [`ByteReader`] and [`ByteWriter`] are mirror images: every `read_*`
//! primitive has a `write_*` twin with the identical on-wire layout, so the
//! reader and the writer cannot drift apart on format details.

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{GgufError, Result};

/// Round `pos` up to the next multiple of `alignment`.
pub fn align_to(pos: u64, alignment: u64) -> u64 {
    if alignment <= 1 {
        return pos;
    }
    pos.div_ceil(alignment) * alignment
}

/// Sequential reader over a byte source of known length.
///
/// The length lets the cursor reject reads (and length prefixes) that would
/// run past the end before any allocation happens.
pub struct ByteReader<R> {
    inner: R,
    pos: u64,
    len: u64,
}

impl<R: Read> ByteReader<R> {
    /// Wrap `inner`, which must be positioned at absolute offset 0 of a
    /// source holding `len` bytes.
    pub fn new(inner: R, len: u64) -> Self {
        Self { inner, pos: 0, len }
    }

    /// Absolute offset of the next byte to be read
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Total length of the underlying source
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes left between the cursor and the end of the source
    pub fn remaining(&self) -> u64 {
        self.len.saturating_sub(self.pos)
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    fn reserve(&self, needed: u64) -> Result<()> {
        if needed > self.remaining() {
            return Err(GgufError::TruncatedInput {
                offset: self.pos,
                needed,
            });
        }
        Ok(())
    }

    fn primitive<T>(
        &mut self,
        size: u64,
        read: impl FnOnce(&mut R) -> io::Result<T>,
    ) -> Result<T> {
        self.reserve(size)?;
        let value = read(&mut self.inner).map_err(|e| self.eof_as_truncation(e, size))?;
        self.pos += size;
        Ok(value)
    }

    fn eof_as_truncation(&self, err: io::Error, needed: u64) -> GgufError {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            GgufError::TruncatedInput {
                offset: self.pos,
                needed,
            }
        } else {
            GgufError::Io(err)
        }
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.primitive(1, |r| r.read_u8())
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        self.primitive(1, |r| r.read_i8())
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        self.primitive(2, |r| r.read_u16::<LittleEndian>())
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        self.primitive(2, |r| r.read_i16::<LittleEndian>())
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.primitive(4, |r| r.read_u32::<LittleEndian>())
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        self.primitive(4, |r| r.read_i32::<LittleEndian>())
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        self.primitive(8, |r| r.read_u64::<LittleEndian>())
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        self.primitive(8, |r| r.read_i64::<LittleEndian>())
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        self.primitive(4, |r| r.read_f32::<LittleEndian>())
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        self.primitive(8, |r| r.read_f64::<LittleEndian>())
    }

    /// Booleans are a single byte; any non-zero value reads as `true`.
    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    /// Read exactly `n` raw bytes.
    pub fn read_bytes(&mut self, n: u64) -> Result<Vec<u8>> {
        self.reserve(n)?;
        let mut buf = vec![0u8; n as usize];
        self.inner
            .read_exact(&mut buf)
            .map_err(|e| self.eof_as_truncation(e, n))?;
        self.pos += n;
        Ok(buf)
    }

    /// Read a u64 byte-length prefix followed by that many UTF-8 bytes.
    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_u64()?;
        let start = self.pos;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes).map_err(|source| GgufError::Utf8Decode {
            offset: start,
            source,
        })
    }

    /// Check that `count` items of at least `min_size` bytes each could still
    /// fit in the source, and return the count as a usize suitable for
    /// `Vec::with_capacity`.
    pub fn plausible_count(&self, count: u64, min_size: u64) -> Result<usize> {
        let needed = count.saturating_mul(min_size.max(1));
        self.reserve(needed)?;
        usize::try_from(count).map_err(|_| GgufError::TruncatedInput {
            offset: self.pos,
            needed,
        })
    }

    /// Discard bytes up to absolute offset `target`.
    pub fn skip_to(&mut self, target: u64) -> Result<()> {
        let n = target.saturating_sub(self.pos);
        self.reserve(n)?;
        let copied = io::copy(&mut (&mut self.inner).take(n), &mut io::sink())?;
        if copied != n {
            return Err(GgufError::TruncatedInput {
                offset: self.pos + copied,
                needed: n - copied,
            });
        }
        self.pos = target.max(self.pos);
        Ok(())
    }
}

/// Sequential little-endian writer; the mirror of [`ByteReader`].
pub struct ByteWriter<W> {
    inner: W,
    pos: u64,
}

impl<W: Write> ByteWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, pos: 0 }
    }

    /// Number of bytes written so far
    pub fn position(&self) -> u64 {
        self.pos
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    fn primitive(&mut self, size: u64, write: impl FnOnce(&mut W) -> io::Result<()>) -> Result<()> {
        write(&mut self.inner)?;
        self.pos += size;
        Ok(())
    }

    pub fn write_u8(&mut self, v: u8) -> Result<()> {
        self.primitive(1, |w| w.write_u8(v))
    }

    pub fn write_i8(&mut self, v: i8) -> Result<()> {
        self.primitive(1, |w| w.write_i8(v))
    }

    pub fn write_u16(&mut self, v: u16) -> Result<()> {
        self.primitive(2, |w| w.write_u16::<LittleEndian>(v))
    }

    pub fn write_i16(&mut self, v: i16) -> Result<()> {
        self.primitive(2, |w| w.write_i16::<LittleEndian>(v))
    }

    pub fn write_u32(&mut self, v: u32) -> Result<()> {
        self.primitive(4, |w| w.write_u32::<LittleEndian>(v))
    }

    pub fn write_i32(&mut self, v: i32) -> Result<()> {
        self.primitive(4, |w| w.write_i32::<LittleEndian>(v))
    }

    pub fn write_u64(&mut self, v: u64) -> Result<()> {
        self.primitive(8, |w| w.write_u64::<LittleEndian>(v))
    }

    pub fn write_i64(&mut self, v: i64) -> Result<()> {
        self.primitive(8, |w| w.write_i64::<LittleEndian>(v))
    }

    pub fn write_f32(&mut self, v: f32) -> Result<()> {
        self.primitive(4, |w| w.write_f32::<LittleEndian>(v))
    }

    pub fn write_f64(&mut self, v: f64) -> Result<()> {
        self.primitive(8, |w| w.write_f64::<LittleEndian>(v))
    }

    pub fn write_bool(&mut self, v: bool) -> Result<()> {
        self.write_u8(u8::from(v))
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.inner.write_all(bytes)?;
        self.pos += bytes.len() as u64;
        Ok(())
    }

    /// Write a u64 byte-length prefix followed by the UTF-8 bytes.
    pub fn write_string(&mut self, s: &str) -> Result<()> {
        self.write_u64(s.len() as u64)?;
        self.write_bytes(s.as_bytes())
    }

    /// Emit zero bytes until the position is a multiple of `alignment`.
    pub fn pad_to(&mut self, alignment: u64) -> Result<()> {
        let padding = align_to(self.pos, alignment) - self.pos;
        const ZEROS: [u8; 64] = [0u8; 64];
        let mut left = padding as usize;
        while left > 0 {
            let n = left.min(ZEROS.len());
            self.write_bytes(&ZEROS[..n])?;
            left -= n;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }
}
