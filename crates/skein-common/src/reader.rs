//! Binary reader for zero-copy parsing of byte slices.
//!
//! This module provides [`BinaryReader`], a cursor-like type that reads
//! binary data from a byte slice without copying. Unlike a plain cursor,
//! every multi-byte read takes an explicit [`Endian`] so the byte order is
//! always decided by the caller.

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::{Endian, Error, Result};

/// A binary reader that provides zero-copy reading from a byte slice.
///
/// Maintains a position into the underlying slice and hands out sub-slices
/// without copying where possible.
///
/// # Example
///
/// ```
/// use skein_common::{BinaryReader, Endian};
///
/// let data = [0x01, 0x02, 0x03, 0x04];
/// let mut reader = BinaryReader::new(&data);
///
/// assert_eq!(reader.read_u16(Endian::Little).unwrap(), 0x0201);
/// assert_eq!(reader.read_u16(Endian::Big).unwrap(), 0x0304);
/// assert!(reader.is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct BinaryReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> BinaryReader<'a> {
    /// Create a new reader from a byte slice.
    #[inline]
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Get the current position in the buffer.
    #[inline]
    pub const fn position(&self) -> usize {
        self.position
    }

    /// Get the total length of the underlying buffer.
    #[inline]
    pub const fn len(&self) -> usize {
        self.data.len()
    }

    /// Get the number of bytes remaining to read.
    #[inline]
    pub const fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    /// Check if there are no more bytes to read.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.position >= self.data.len()
    }

    /// Seek to an absolute position.
    #[inline]
    pub fn seek(&mut self, position: usize) {
        self.position = position;
    }

    /// Advance the position by a number of bytes.
    #[inline]
    pub fn advance(&mut self, count: usize) {
        self.position = self.position.saturating_add(count);
    }

    /// Get the remaining bytes as a slice.
    #[inline]
    pub fn remaining_bytes(&self) -> &'a [u8] {
        &self.data[self.position.min(self.data.len())..]
    }

    /// Read bytes and advance the position.
    #[inline]
    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8]> {
        if self.remaining() < count {
            return Err(Error::UnexpectedEof {
                needed: count,
                available: self.remaining(),
            });
        }
        let bytes = &self.data[self.position..self.position + count];
        self.position += count;
        Ok(bytes)
    }

    /// Read a single byte.
    #[inline]
    pub fn read_u8(&mut self) -> Result<u8> {
        self.read_bytes(1).map(|b| b[0])
    }

    /// Read a signed byte.
    #[inline]
    pub fn read_i8(&mut self) -> Result<i8> {
        self.read_u8().map(|b| b as i8)
    }

    /// Read a u16 in the given byte order.
    #[inline]
    pub fn read_u16(&mut self, order: Endian) -> Result<u16> {
        let bytes = self.read_bytes(2)?;
        Ok(match order {
            Endian::Little => LittleEndian::read_u16(bytes),
            Endian::Big => BigEndian::read_u16(bytes),
        })
    }

    /// Read an i16 in the given byte order.
    #[inline]
    pub fn read_i16(&mut self, order: Endian) -> Result<i16> {
        self.read_u16(order).map(|v| v as i16)
    }

    /// Read a u32 in the given byte order.
    #[inline]
    pub fn read_u32(&mut self, order: Endian) -> Result<u32> {
        let bytes = self.read_bytes(4)?;
        Ok(match order {
            Endian::Little => LittleEndian::read_u32(bytes),
            Endian::Big => BigEndian::read_u32(bytes),
        })
    }

    /// Read an i32 in the given byte order.
    #[inline]
    pub fn read_i32(&mut self, order: Endian) -> Result<i32> {
        self.read_u32(order).map(|v| v as i32)
    }

    /// Read a u64 in the given byte order.
    #[inline]
    pub fn read_u64(&mut self, order: Endian) -> Result<u64> {
        let bytes = self.read_bytes(8)?;
        Ok(match order {
            Endian::Little => LittleEndian::read_u64(bytes),
            Endian::Big => BigEndian::read_u64(bytes),
        })
    }

    /// Read an i64 in the given byte order.
    #[inline]
    pub fn read_i64(&mut self, order: Endian) -> Result<i64> {
        self.read_u64(order).map(|v| v as i64)
    }

    /// Read an f32 in the given byte order.
    #[inline]
    pub fn read_f32(&mut self, order: Endian) -> Result<f32> {
        self.read_u32(order).map(f32::from_bits)
    }

    /// Read a null-terminated byte string, not including the terminator.
    ///
    /// Scans at most `max` bytes; if no null byte is found within that
    /// window (or before the buffer ends), the read fails and the position
    /// is left unchanged.
    pub fn read_zstring_bytes(&mut self, max: usize) -> Result<&'a [u8]> {
        let remaining = self.remaining_bytes();
        let window = &remaining[..remaining.len().min(max + 1)];
        match memchr::memchr(0, window) {
            Some(null_pos) => {
                let bytes = &remaining[..null_pos];
                self.position += null_pos + 1;
                Ok(bytes)
            }
            None if remaining.len() <= max => Err(Error::UnexpectedEof {
                needed: remaining.len() + 1,
                available: remaining.len(),
            }),
            None => Err(Error::UnterminatedString { max }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_integers_both_orders() {
        let data = [0x12, 0x34, 0x56, 0x78];
        let mut r = BinaryReader::new(&data);
        assert_eq!(r.read_u32(Endian::Little).unwrap(), 0x78563412);
        r.seek(0);
        assert_eq!(r.read_u32(Endian::Big).unwrap(), 0x12345678);
    }

    #[test]
    fn test_eof() {
        let data = [0x01];
        let mut r = BinaryReader::new(&data);
        assert!(matches!(
            r.read_u32(Endian::Little),
            Err(Error::UnexpectedEof { needed: 4, available: 1 })
        ));
    }

    #[test]
    fn test_zstring() {
        let data = b"hello\0world";
        let mut r = BinaryReader::new(data);
        assert_eq!(r.read_zstring_bytes(100).unwrap(), &b"hello"[..]);
        assert_eq!(r.remaining_bytes(), &b"world"[..]);
    }

    #[test]
    fn test_zstring_over_max() {
        let data = b"hello\0";
        let mut r = BinaryReader::new(data);
        assert!(matches!(
            r.read_zstring_bytes(3),
            Err(Error::UnterminatedString { max: 3 })
        ));
        // position untouched on failure
        assert_eq!(r.position(), 0);
    }

    #[test]
    fn test_zstring_missing_terminator() {
        let data = b"abc";
        let mut r = BinaryReader::new(data);
        assert!(matches!(
            r.read_zstring_bytes(100),
            Err(Error::UnexpectedEof { .. })
        ));
    }
}
