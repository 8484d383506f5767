//! Bounds-checked scalar reads over an untrusted byte buffer.
//!
//! Every structure in this crate is decoded field by field through a
//! [`ByteSpan`] or a [`SpanReader`], never by reinterpreting bytes in place.
//! Offsets and lengths coming from the file are combined with checked
//! arithmetic so a crafted `offset + size` that wraps is reported as
//! `OutOfBounds` instead of aliasing another part of the buffer.

use std::fmt;
use std::str;

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::errors::{MachError, Result};

/// Swap the byte order of a 16-bit value.
pub fn swap16(value: u16) -> u16 {
    value.swap_bytes()
}

/// Swap the byte order of a 32-bit value.
pub fn swap32(value: u32) -> u32 {
    value.swap_bytes()
}

/// Swap the byte order of a 64-bit value.
pub fn swap64(value: u64) -> u64 {
    value.swap_bytes()
}

/// Read an unsigned integer of `width` bytes at `offset`.
///
/// `width` must be between 1 and 8 bytes.
pub fn read_uint(buf: &[u8], offset: usize, width: usize, big_endian: bool) -> Result<u64> {
    if width == 0 || width > 8 {
        return Err(MachError::OutOfBounds {
            what: "scalar width",
            offset: offset as u64,
            size: width as u64,
            limit: 8,
        });
    }

    let bytes = ByteSpan::new(buf, offset, width)?.as_bytes();

    Ok(if big_endian {
        BigEndian::read_uint(bytes, width)
    } else {
        LittleEndian::read_uint(bytes, width)
    })
}

fn out_of_bounds(what: &'static str, base: usize, offset: u64, size: u64, limit: usize) -> MachError {
    MachError::OutOfBounds {
        what,
        offset: (base as u64).saturating_add(offset),
        size,
        limit: limit as u64,
    }
}

/// An immutable view `[offset, offset + len)` into a backing buffer.
///
/// The range is validated once at construction, so every later access is
/// in bounds. Offsets are absolute in the backing buffer, which lets the
/// errors and logs of a slice inside a fat archive name real file positions.
#[derive(Clone, Copy)]
pub struct ByteSpan<'a> {
    buf: &'a [u8],
    offset: usize,
    len: usize,
}

impl<'a> ByteSpan<'a> {
    pub fn new(buf: &'a [u8], offset: usize, len: usize) -> Result<ByteSpan<'a>> {
        match offset.checked_add(len) {
            Some(end) if end <= buf.len() => Ok(ByteSpan { buf, offset, len }),
            _ => Err(out_of_bounds("span", 0, offset as u64, len as u64, buf.len())),
        }
    }

    /// A span covering the whole buffer.
    pub fn whole(buf: &'a [u8]) -> ByteSpan<'a> {
        ByteSpan {
            buf,
            offset: 0,
            len: buf.len(),
        }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn end(&self) -> usize {
        self.offset + self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        &self.buf[self.offset..self.offset + self.len]
    }

    /// The backing buffer the span points into.
    pub fn buffer(&self) -> &'a [u8] {
        self.buf
    }

    /// Narrow the span to `[offset, offset + len)`, relative to its start.
    pub fn sub_span(&self, what: &'static str, offset: u64, len: u64) -> Result<ByteSpan<'a>> {
        match offset.checked_add(len) {
            Some(end) if end <= self.len as u64 => Ok(ByteSpan {
                buf: self.buf,
                offset: self.offset + offset as usize,
                len: len as usize,
            }),
            _ => Err(out_of_bounds(what, self.offset, offset, len, self.end())),
        }
    }

    /// The span from `offset` to the end.
    pub fn tail(&self, what: &'static str, offset: u64) -> Result<ByteSpan<'a>> {
        if offset > self.len as u64 {
            Err(out_of_bounds(what, self.offset, offset, 0, self.end()))
        } else {
            self.sub_span(what, offset, self.len as u64 - offset)
        }
    }

    fn bytes_at(&self, what: &'static str, offset: u64, len: usize) -> Result<&'a [u8]> {
        self.sub_span(what, offset, len as u64).map(|span| span.as_bytes())
    }

    pub fn read_u8(&self, what: &'static str, offset: u64) -> Result<u8> {
        Ok(self.bytes_at(what, offset, 1)?[0])
    }

    pub fn read_u16<O: ByteOrder>(&self, what: &'static str, offset: u64) -> Result<u16> {
        Ok(O::read_u16(self.bytes_at(what, offset, 2)?))
    }

    pub fn read_u32<O: ByteOrder>(&self, what: &'static str, offset: u64) -> Result<u32> {
        Ok(O::read_u32(self.bytes_at(what, offset, 4)?))
    }

    pub fn read_u64<O: ByteOrder>(&self, what: &'static str, offset: u64) -> Result<u64> {
        Ok(O::read_u64(self.bytes_at(what, offset, 8)?))
    }

    /// Read a NUL terminated string starting at `offset`.
    ///
    /// The string ends at the first NUL or at the end of the span.
    pub fn read_cstr(&self, what: &'static str, offset: u64) -> Result<&'a str> {
        if offset >= self.len as u64 {
            return Err(out_of_bounds(what, self.offset, offset, 1, self.end()));
        }

        let bytes = self.tail(what, offset)?.as_bytes();
        let s = bytes.split(|&b| b == 0).next().unwrap_or_default();

        Ok(str::from_utf8(s)?)
    }
}

impl<'a> fmt::Debug for ByteSpan<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ByteSpan(0x{:x}..0x{:x})", self.offset, self.end())
    }
}

impl<'a> AsRef<[u8]> for ByteSpan<'a> {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

/// A sequential reader over a `ByteSpan`.
///
/// Every read is checked against the span, and failures are reported as
/// `OutOfBounds` against the structure named by `what`.
#[derive(Debug, Clone)]
pub struct SpanReader<'a> {
    span: ByteSpan<'a>,
    pos: usize,
    what: &'static str,
}

impl<'a> SpanReader<'a> {
    pub fn new(span: ByteSpan<'a>, what: &'static str) -> SpanReader<'a> {
        SpanReader { span, pos: 0, what }
    }

    pub fn span(&self) -> ByteSpan<'a> {
        self.span
    }

    /// The current position, relative to the span start.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.span.len() - self.pos
    }

    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.take(n).map(|_| ())
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let bytes = self.span.bytes_at(self.what, self.pos as u64, n)?;

        self.pos += n;

        Ok(bytes)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16<O: ByteOrder>(&mut self) -> Result<u16> {
        Ok(O::read_u16(self.take(2)?))
    }

    pub fn read_u32<O: ByteOrder>(&mut self) -> Result<u32> {
        Ok(O::read_u32(self.take(4)?))
    }

    pub fn read_i32<O: ByteOrder>(&mut self) -> Result<i32> {
        Ok(O::read_i32(self.take(4)?))
    }

    pub fn read_u64<O: ByteOrder>(&mut self) -> Result<u64> {
        Ok(O::read_u64(self.take(8)?))
    }

    /// Read a fixed size, NUL padded string such as a segment name.
    pub fn read_fixed_size_string(&mut self, len: usize) -> Result<String> {
        let bytes = self.take(len)?;
        let s = bytes.split(|&b| b == 0).next().unwrap_or_default();

        Ok(str::from_utf8(s)?.to_owned())
    }
}

#[cfg(test)]
pub mod tests {
    use byteorder::{BigEndian, LittleEndian};

    use super::*;

    #[test]
    fn test_swap() {
        assert_eq!(swap16(0x1234), 0x3412);
        assert_eq!(swap32(0xfeedfacf), 0xcffaedfe);
        assert_eq!(swap32(0xcafebabe), 0xbebafeca);
        assert_eq!(swap64(0x0102_0304_0506_0708), 0x0807_0605_0403_0201);

        for &v in &[0u32, 1, 0xffff_ffff, 0x8000_0001, 0xdead_beef] {
            assert_eq!(swap32(swap32(v)), v);
            assert_eq!(u64::from(swap32(v)), swap64(u64::from(v)) >> 32);
        }
    }

    #[test]
    fn test_read_uint() {
        let buf = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];

        assert_eq!(read_uint(&buf, 0, 4, true).unwrap(), 0x0102_0304);
        assert_eq!(read_uint(&buf, 0, 4, false).unwrap(), 0x0403_0201);
        assert_eq!(read_uint(&buf, 6, 2, true).unwrap(), 0x0708);
        assert_eq!(read_uint(&buf, 0, 8, false).unwrap(), 0x0807_0605_0403_0201);
        assert_eq!(read_uint(&buf, 7, 1, true).unwrap(), 0x08);
    }

    #[test]
    fn test_read_uint_out_of_bounds() {
        let buf = [0u8; 8];

        assert!(matches!(read_uint(&buf, 5, 4, true), Err(MachError::OutOfBounds { .. })));
        assert!(matches!(read_uint(&buf, 8, 1, false), Err(MachError::OutOfBounds { .. })));
        assert!(matches!(
            read_uint(&buf, usize::max_value() - 1, 4, true),
            Err(MachError::OutOfBounds { .. })
        ));
        assert!(matches!(read_uint(&buf, 0, 9, true), Err(MachError::OutOfBounds { .. })));
        assert!(matches!(read_uint(&buf, 0, 0, true), Err(MachError::OutOfBounds { .. })));
    }

    #[test]
    fn test_span_bounds() {
        let buf = [0u8; 16];

        assert!(ByteSpan::new(&buf, 0, 16).is_ok());
        assert!(ByteSpan::new(&buf, 16, 0).is_ok());
        assert!(ByteSpan::new(&buf, 8, 9).is_err());
        assert!(ByteSpan::new(&buf, usize::max_value(), 2).is_err());

        let span = ByteSpan::new(&buf, 4, 8).unwrap();
        let sub = span.sub_span("test", 2, 4).unwrap();

        assert_eq!(sub.offset(), 6);
        assert_eq!(sub.len(), 4);
        assert_eq!(sub.end(), 10);

        match span.sub_span("test", u64::max_value(), 2) {
            Err(MachError::OutOfBounds { what, limit, .. }) => {
                assert_eq!(what, "test");
                assert_eq!(limit, 12);
            }
            res => panic!("unexpected {:?}", res),
        }

        assert!(span.sub_span("test", 4, 5).is_err());
        assert!(span.tail("test", 9).is_err());
        assert_eq!(span.tail("test", 8).unwrap().len(), 0);
    }

    #[test]
    fn test_span_reads() {
        let buf = [0xfe, 0xed, 0xfa, 0xcf, b'a', b'b', 0, b'c'];
        let span = ByteSpan::whole(&buf);

        assert_eq!(span.read_u32::<BigEndian>("magic", 0).unwrap(), 0xfeedfacf);
        assert_eq!(span.read_u32::<LittleEndian>("magic", 0).unwrap(), 0xcffaedfe);
        assert_eq!(span.read_u16::<BigEndian>("half", 2).unwrap(), 0xfacf);
        assert_eq!(span.read_cstr("name", 4).unwrap(), "ab");
        assert_eq!(span.read_cstr("name", 7).unwrap(), "c");
        assert!(span.read_cstr("name", 8).is_err());
        assert!(span.read_u64::<BigEndian>("wide", 1).is_err());
    }

    #[test]
    fn test_span_reader() {
        let buf = [
            0x01, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00, b'_', b'_', b'T', b'E', b'X', b'T', 0, 0,
        ];
        let mut r = SpanReader::new(ByteSpan::whole(&buf), "test");

        assert_eq!(r.read_u32::<LittleEndian>().unwrap(), 1);
        assert_eq!(r.read_u32::<BigEndian>().unwrap(), 0x0200_0000);
        assert_eq!(r.read_fixed_size_string(8).unwrap(), "__TEXT");
        assert_eq!(r.position(), 16);
        assert_eq!(r.remaining(), 0);

        match r.read_u8() {
            Err(MachError::OutOfBounds { what, offset, size, .. }) => {
                assert_eq!(what, "test");
                assert_eq!(offset, 16);
                assert_eq!(size, 1);
            }
            res => panic!("unexpected {:?}", res),
        }
    }
}
