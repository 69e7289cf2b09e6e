//! Endian-aware payload cursor and writer shared by the argument codecs
//!
//! Payload fields follow the MSBF bit of the standard header, so every read
//! and write picks the byte order at runtime.

use crate::id_cache::{id_to_bytes, IdCache};
use crate::types::{DecoderError, Result};
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use std::sync::Arc;

macro_rules! read_fixed {
    ($name:ident, $ty:ty, $len:expr, $read:ident) => {
        pub fn $name(&mut self) -> Result<$ty> {
            let bytes = self.bytes($len)?;
            Ok(if self.big_endian {
                BigEndian::$read(bytes)
            } else {
                LittleEndian::$read(bytes)
            })
        }
    };
}

macro_rules! write_fixed {
    ($name:ident, $ty:ty, $len:expr, $write:ident) => {
        pub fn $name(&mut self, value: $ty) {
            let mut bytes = [0u8; $len];
            if self.big_endian {
                BigEndian::$write(&mut bytes, value);
            } else {
                LittleEndian::$write(&mut bytes, value);
            }
            self.buf.extend_from_slice(&bytes);
        }
    };
}

/// Reads payload fields from a borrowed buffer
#[derive(Debug, Clone)]
pub struct PayloadReader<'a> {
    buf: &'a [u8],
    pos: usize,
    big_endian: bool,
}

impl<'a> PayloadReader<'a> {
    pub fn new(buf: &'a [u8], big_endian: bool) -> Self {
        Self {
            buf,
            pos: 0,
            big_endian,
        }
    }

    /// Bytes consumed so far
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn big_endian(&self) -> bool {
        self.big_endian
    }

    /// The unread part of the buffer
    pub fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    pub fn bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(DecoderError::invalid(format!(
                "need {} bytes, only {} remaining",
                len,
                self.remaining()
            )));
        }
        let bytes = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.bytes(len).map(|_| ())
    }

    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.bytes(1)?[0])
    }

    pub fn i8(&mut self) -> Result<i8> {
        Ok(self.u8()? as i8)
    }

    read_fixed!(u16, u16, 2, read_u16);
    read_fixed!(u32, u32, 4, read_u32);
    read_fixed!(u64, u64, 8, read_u64);
    read_fixed!(u128, u128, 16, read_u128);
    read_fixed!(i16, i16, 2, read_i16);
    read_fixed!(i32, i32, 4, read_i32);
    read_fixed!(i64, i64, 8, read_i64);
    read_fixed!(i128, i128, 16, read_i128);
    read_fixed!(f32, f32, 4, read_f32);
    read_fixed!(f64, f64, 8, read_f64);

    /// Reads a 4-byte identifier embedded in a payload
    pub fn id(&mut self) -> Result<Arc<str>> {
        let bytes = self.bytes(4)?;
        let packed = BigEndian::read_u32(bytes);
        Ok(IdCache::global().parse_id(packed))
    }
}

/// Appends payload fields to a growable buffer
#[derive(Debug, Clone, Default)]
pub struct PayloadWriter {
    buf: Vec<u8>,
    big_endian: bool,
}

impl PayloadWriter {
    pub fn new(big_endian: bool) -> Self {
        Self {
            buf: Vec::new(),
            big_endian,
        }
    }

    pub fn big_endian(&self) -> bool {
        self.big_endian
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    pub fn bytes(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    pub fn u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn i8(&mut self, value: i8) {
        self.buf.push(value as u8);
    }

    write_fixed!(u16, u16, 2, write_u16);
    write_fixed!(u32, u32, 4, write_u32);
    write_fixed!(u64, u64, 8, write_u64);
    write_fixed!(u128, u128, 16, write_u128);
    write_fixed!(i16, i16, 2, write_i16);
    write_fixed!(i32, i32, 4, write_i32);
    write_fixed!(i64, i64, 8, write_i64);
    write_fixed!(i128, i128, 16, write_i128);
    write_fixed!(f32, f32, 4, write_f32);
    write_fixed!(f64, f64, 8, write_f64);

    /// Writes a 4-byte identifier, zero padded
    pub fn id(&mut self, id: &str) {
        self.buf.extend_from_slice(&id_to_bytes(id));
    }

    /// Overwrites a previously written u16 at `offset`
    pub fn patch_u16(&mut self, offset: usize, value: u16) {
        let slot = &mut self.buf[offset..offset + 2];
        if self.big_endian {
            BigEndian::write_u16(slot, value);
        } else {
            LittleEndian::write_u16(slot, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_endianness() {
        let data = [0x01, 0x02, 0x03, 0x04];
        assert_eq!(PayloadReader::new(&data, false).u32().unwrap(), 0x0403_0201);
        assert_eq!(PayloadReader::new(&data, true).u32().unwrap(), 0x0102_0304);
    }

    #[test]
    fn test_reader_tracks_position() {
        let data = [0xFF, 0x34, 0x12, 0xAA];
        let mut reader = PayloadReader::new(&data, false);
        assert_eq!(reader.i8().unwrap(), -1);
        assert_eq!(reader.u16().unwrap(), 0x1234);
        assert_eq!(reader.position(), 3);
        assert_eq!(reader.rest(), &[0xAA]);
        assert!(reader.u16().is_err());
        // A failed read consumes nothing
        assert_eq!(reader.remaining(), 1);
    }

    #[test]
    fn test_writer_endianness() {
        let mut writer = PayloadWriter::new(true);
        writer.u16(0x0102);
        writer.i32(-2);
        writer.id("AB");
        assert_eq!(
            writer.as_slice(),
            &[0x01, 0x02, 0xFF, 0xFF, 0xFF, 0xFE, 0x41, 0x42, 0x00, 0x00]
        );

        let mut writer = PayloadWriter::new(false);
        writer.u16(0);
        writer.patch_u16(0, 0x0102);
        assert_eq!(writer.into_inner(), vec![0x02, 0x01]);
    }

    #[test]
    fn test_reader_id() {
        let data = *b"APP1";
        let mut reader = PayloadReader::new(&data, false);
        assert_eq!(&*reader.id().unwrap(), "APP1");
    }
}
