//! DLT header layouts and protocol constants
//!
//! A packet on the wire is built from up to three header layers:
//! - an optional storage header (capture files only), 16 bytes
//! - the mandatory standard header, 4 bytes plus optional ECU ID, session ID
//!   and device timestamp fields
//! - an optional extended header, 10 bytes
//!
//! The standard header length field and all optional standard/extended header
//! fields are always big-endian. Only the payload follows the MSBF bit.

use crate::types::{DecoderError, Result};
use byteorder::{BigEndian, ByteOrder, LittleEndian};

/// Bits of the standard header type byte (HTYP)
pub mod htyp {
    pub const USE_EXTENDED_HEADER: u8 = 0x01;
    pub const MOST_SIGNIFICANT_BYTE: u8 = 0x02;
    pub const WITH_ECU_ID: u8 = 0x04;
    pub const WITH_SESSION_ID: u8 = 0x08;
    pub const WITH_TIMESTAMP: u8 = 0x10;
    pub const VERSION_MASK: u8 = 0xE0;
    pub const VERSION_SHIFT: u8 = 5;
    pub const VERSION_1: u8 = 0x20;
}

/// Bits of the extended header message info byte (MSIN)
pub mod msin {
    pub const VERBOSE: u8 = 0x01;
    /// Message type and subtype together, the value of a `DltType`
    pub const TYPE_INFO_MASK: u8 = 0xFE;
    pub const MESSAGE_TYPE_MASK: u8 = 0x0E;
    pub const MESSAGE_SUBTYPE_MASK: u8 = 0xF0;

    pub const TYPE_LOG: u8 = 0x00;
    pub const TYPE_APP_TRACE: u8 = 0x02;
    pub const TYPE_NW_TRACE: u8 = 0x04;
    pub const TYPE_CONTROL: u8 = 0x06;
}

/// Bits of the 32-bit verbose argument type info field
pub mod type_info {
    pub const LENGTH_MASK: u32 = 0x0000_000F;
    pub const LENGTH_UNKNOWN: u32 = 0x0;
    pub const LENGTH_8: u32 = 0x1;
    pub const LENGTH_16: u32 = 0x2;
    pub const LENGTH_32: u32 = 0x3;
    pub const LENGTH_64: u32 = 0x4;
    pub const LENGTH_128: u32 = 0x5;

    pub const TYPE_BOOL: u32 = 0x0000_0010;
    pub const TYPE_SINT: u32 = 0x0000_0020;
    pub const TYPE_UINT: u32 = 0x0000_0040;
    pub const TYPE_FLOAT: u32 = 0x0000_0080;
    pub const TYPE_ARRAY: u32 = 0x0000_0100;
    pub const TYPE_STRING: u32 = 0x0000_0200;
    pub const TYPE_RAW: u32 = 0x0000_0400;
    pub const VARIABLE_INFO: u32 = 0x0000_0800;
    pub const FIXED_POINT: u32 = 0x0000_1000;
    pub const TRACE_INFO: u32 = 0x0000_2000;
    pub const TYPE_STRUCT: u32 = 0x0000_4000;

    /// All data-kind bits, excluding the VARI and FIXP modifiers
    pub const KIND_MASK: u32 = 0x0000_67F0;

    pub const CODING_MASK: u32 = 0x0003_8000;
    pub const CODING_SHIFT: u32 = 15;
    pub const CODING_ASCII: u32 = 0;
    pub const CODING_UTF8: u32 = 1;
}

/// Marker at the start of each storage header in a capture file
pub const STORAGE_MARKER: [u8; 4] = *b"DLT\x01";

/// Marker preceding each packet on a serial link
pub const SERIAL_MARKER: [u8; 4] = *b"DLS\x01";

pub const STORAGE_HEADER_LEN: usize = 16;
pub const STANDARD_HEADER_LEN: usize = 4;
pub const EXTENDED_HEADER_LEN: usize = 10;

/// Device timestamp resolution, in microseconds (0.1 ms)
pub const DEVICE_TIME_RESOLUTION_US: u64 = 100;

/// Parsed standard header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StandardHeader {
    pub htyp: u8,
    pub count: u8,
    /// Total packet length, standard header included
    pub length: u16,
    pub ecu_id: Option<u32>,
    pub session_id: Option<u32>,
    /// Device timestamp in 0.1 ms ticks
    pub timestamp: Option<u32>,
}

impl StandardHeader {
    /// Smallest legal packet length for the given header type byte
    pub fn minimum_length(header_type: u8) -> usize {
        let mut len = STANDARD_HEADER_LEN;
        if header_type & htyp::WITH_ECU_ID != 0 {
            len += 4;
        }
        if header_type & htyp::WITH_SESSION_ID != 0 {
            len += 4;
        }
        if header_type & htyp::WITH_TIMESTAMP != 0 {
            len += 4;
        }
        if header_type & htyp::USE_EXTENDED_HEADER != 0 {
            len += EXTENDED_HEADER_LEN;
        }
        len
    }

    /// Checks the first four bytes of a standard header
    ///
    /// # Returns
    /// * `Ok(length)` - the total packet length from the header
    /// * `Err(_)` - the version is not 1, or the length cannot hold the
    ///   fields the header type announces
    pub fn validate(buf: &[u8]) -> Result<usize> {
        if buf.len() < STANDARD_HEADER_LEN {
            return Err(DecoderError::invalid("standard header truncated"));
        }

        let version = buf[0] & htyp::VERSION_MASK;
        if version != htyp::VERSION_1 {
            return Err(DecoderError::invalid(format!(
                "packet version {} found, expected 1",
                version >> htyp::VERSION_SHIFT
            )));
        }

        let length = BigEndian::read_u16(&buf[2..4]) as usize;
        let minimum = Self::minimum_length(buf[0]);
        if length < minimum {
            return Err(DecoderError::invalid(format!(
                "packet with length {} found, expected minimum {}",
                length, minimum
            )));
        }
        Ok(length)
    }

    /// Parses the standard header including its optional fields
    ///
    /// The caller must have validated the header; `buf` must hold at least
    /// the announced header fields.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        let header_type = buf.first().copied().unwrap_or_default();
        let needed = Self::minimum_length(header_type & !htyp::USE_EXTENDED_HEADER);
        if buf.len() < needed {
            return Err(DecoderError::invalid("standard header truncated"));
        }

        let mut header = StandardHeader {
            htyp: header_type,
            count: buf[1],
            length: BigEndian::read_u16(&buf[2..4]),
            ..Default::default()
        };

        let mut offset = STANDARD_HEADER_LEN;
        if header_type & htyp::WITH_ECU_ID != 0 {
            header.ecu_id = Some(BigEndian::read_u32(&buf[offset..offset + 4]));
            offset += 4;
        }
        if header_type & htyp::WITH_SESSION_ID != 0 {
            header.session_id = Some(BigEndian::read_u32(&buf[offset..offset + 4]));
            offset += 4;
        }
        if header_type & htyp::WITH_TIMESTAMP != 0 {
            header.timestamp = Some(BigEndian::read_u32(&buf[offset..offset + 4]));
        }
        Ok(header)
    }

    /// Length of the standard header with its optional fields
    pub fn header_len(&self) -> usize {
        Self::minimum_length(self.htyp & !htyp::USE_EXTENDED_HEADER)
    }

    pub fn has_extended_header(&self) -> bool {
        self.htyp & htyp::USE_EXTENDED_HEADER != 0
    }

    pub fn is_big_endian(&self) -> bool {
        self.htyp & htyp::MOST_SIGNIFICANT_BYTE != 0
    }

    /// Writes the header, returning the bytes written
    pub fn write(&self, buf: &mut [u8]) -> Result<usize> {
        let len = self.header_len();
        if buf.len() < len {
            return Err(DecoderError::buffer(len, buf.len()));
        }

        buf[0] = self.htyp;
        buf[1] = self.count;
        BigEndian::write_u16(&mut buf[2..4], self.length);
        let mut offset = STANDARD_HEADER_LEN;
        for field in [self.ecu_id, self.session_id, self.timestamp].into_iter().flatten() {
            BigEndian::write_u32(&mut buf[offset..offset + 4], field);
            offset += 4;
        }
        Ok(offset)
    }
}

/// Parsed extended header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExtendedHeader {
    pub msin: u8,
    pub noar: u8,
    pub app_id: u32,
    pub ctx_id: u32,
}

impl ExtendedHeader {
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < EXTENDED_HEADER_LEN {
            return Err(DecoderError::invalid("extended header truncated"));
        }
        Ok(ExtendedHeader {
            msin: buf[0],
            noar: buf[1],
            app_id: BigEndian::read_u32(&buf[2..6]),
            ctx_id: BigEndian::read_u32(&buf[6..10]),
        })
    }

    pub fn is_verbose(&self) -> bool {
        self.msin & msin::VERBOSE != 0
    }

    /// Message type and subtype bits
    pub fn type_info(&self) -> u8 {
        self.msin & msin::TYPE_INFO_MASK
    }

    pub fn write(&self, buf: &mut [u8]) -> Result<usize> {
        if buf.len() < EXTENDED_HEADER_LEN {
            return Err(DecoderError::buffer(EXTENDED_HEADER_LEN, buf.len()));
        }
        buf[0] = self.msin;
        buf[1] = self.noar;
        BigEndian::write_u32(&mut buf[2..6], self.app_id);
        BigEndian::write_u32(&mut buf[6..10], self.ctx_id);
        Ok(EXTENDED_HEADER_LEN)
    }
}

/// Storage header written in front of every packet of a capture file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StorageHeader {
    pub seconds: u32,
    pub microseconds: u32,
    pub ecu_id: u32,
}

impl StorageHeader {
    /// Parses a storage header, marker included
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < STORAGE_HEADER_LEN {
            return Err(DecoderError::invalid("storage header truncated"));
        }
        if buf[0..4] != STORAGE_MARKER {
            return Err(DecoderError::invalid("storage header marker not found"));
        }
        Ok(StorageHeader {
            seconds: LittleEndian::read_u32(&buf[4..8]),
            microseconds: LittleEndian::read_u32(&buf[8..12]),
            ecu_id: BigEndian::read_u32(&buf[12..16]),
        })
    }

    pub fn write(&self, buf: &mut [u8]) -> Result<usize> {
        if buf.len() < STORAGE_HEADER_LEN {
            return Err(DecoderError::buffer(STORAGE_HEADER_LEN, buf.len()));
        }
        buf[0..4].copy_from_slice(&STORAGE_MARKER);
        LittleEndian::write_u32(&mut buf[4..8], self.seconds);
        LittleEndian::write_u32(&mut buf[8..12], self.microseconds);
        BigEndian::write_u32(&mut buf[12..16], self.ecu_id);
        Ok(STORAGE_HEADER_LEN)
    }
}
