//! Byte cursor over a packet buffer
//
// https://github.com/rust-iot/rust-lpwan
// Copyright 2021 Ryan Kurte
//
// Network-byte-order reads/writes with an explicit position, used by every
// codec in this crate instead of indexing fixed arrays directly.

use byteorder::{BigEndian, ByteOrder};

/// Read or write past the end of the underlying buffer.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TruncatedBuffer;

/// Cursor for reading a byte slice.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Seek to an absolute position.
    pub fn seek(&mut self, pos: usize) -> Result<(), TruncatedBuffer> {
        if pos > self.buf.len() {
            return Err(TruncatedBuffer);
        }
        self.pos = pos;
        Ok(())
    }

    /// Advance the position by `n` bytes without reading them.
    pub fn skip(&mut self, n: usize) -> Result<(), TruncatedBuffer> {
        self.seek(self.pos + n)
    }

    pub fn read_u8(&mut self) -> Result<u8, TruncatedBuffer> {
        let b = *self.buf.get(self.pos).ok_or(TruncatedBuffer)?;
        self.pos += 1;
        Ok(b)
    }

    pub fn read_u16(&mut self) -> Result<u16, TruncatedBuffer> {
        Ok(BigEndian::read_u16(self.read(2)?))
    }

    pub fn read_u32(&mut self) -> Result<u32, TruncatedBuffer> {
        Ok(BigEndian::read_u32(self.read(4)?))
    }

    /// Borrow the next `n` bytes and advance past them.
    pub fn read(&mut self, n: usize) -> Result<&'a [u8], TruncatedBuffer> {
        if self.pos + n > self.buf.len() {
            return Err(TruncatedBuffer);
        }
        let s = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(s)
    }

    /// Everything from the current position to the end of the buffer.
    pub fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }
}

/// Cursor for writing into a mutable byte slice.
pub struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Writer<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn seek(&mut self, pos: usize) -> Result<(), TruncatedBuffer> {
        if pos > self.buf.len() {
            return Err(TruncatedBuffer);
        }
        self.pos = pos;
        Ok(())
    }

    pub fn skip(&mut self, n: usize) -> Result<(), TruncatedBuffer> {
        self.seek(self.pos + n)
    }

    pub fn write_u8(&mut self, v: u8) -> Result<(), TruncatedBuffer> {
        *self.buf.get_mut(self.pos).ok_or(TruncatedBuffer)? = v;
        self.pos += 1;
        Ok(())
    }

    pub fn write_u16(&mut self, v: u16) -> Result<(), TruncatedBuffer> {
        BigEndian::write_u16(self.write_slice(2)?, v);
        Ok(())
    }

    pub fn write_u32(&mut self, v: u32) -> Result<(), TruncatedBuffer> {
        BigEndian::write_u32(self.write_slice(4)?, v);
        Ok(())
    }

    pub fn write(&mut self, data: &[u8]) -> Result<(), TruncatedBuffer> {
        self.write_slice(data.len())?.copy_from_slice(data);
        Ok(())
    }

    fn write_slice(&mut self, n: usize) -> Result<&mut [u8], TruncatedBuffer> {
        if self.pos + n > self.buf.len() {
            return Err(TruncatedBuffer);
        }
        let s = &mut self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(s)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn round_trip() {
        let mut buf = [0u8; 16];

        {
            let mut w = Writer::new(&mut buf);
            w.write_u8(0x42).unwrap();
            w.write_u16(0xBEEF).unwrap();
            w.write_u32(0xCAFEF00D).unwrap();
            w.write(&[1, 2, 3]).unwrap();
            assert_eq!(w.position(), 10);
        }

        let mut r = Reader::new(&buf[..10]);
        assert_eq!(r.read_u8().unwrap(), 0x42);
        assert_eq!(r.read_u16().unwrap(), 0xBEEF);
        assert_eq!(r.read_u32().unwrap(), 0xCAFEF00D);
        assert_eq!(r.read(3).unwrap(), &[1, 2, 3]);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn truncated_read() {
        let buf = [0u8; 2];
        let mut r = Reader::new(&buf);
        assert_eq!(r.read_u32(), Err(TruncatedBuffer));
    }

    #[test]
    fn truncated_write() {
        let mut buf = [0u8; 1];
        let mut w = Writer::new(&mut buf);
        assert_eq!(w.write_u16(1), Err(TruncatedBuffer));
    }

    #[test]
    fn skip_and_seek() {
        let buf = [1u8, 2, 3, 4];
        let mut r = Reader::new(&buf);
        r.skip(2).unwrap();
        assert_eq!(r.read_u8().unwrap(), 3);
        r.seek(0).unwrap();
        assert_eq!(r.read_u8().unwrap(), 1);
        assert_eq!(r.seek(10), Err(TruncatedBuffer));
    }
}
