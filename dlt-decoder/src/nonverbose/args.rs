//! Decoders for the individual non-verbose wire types
//!
//! Every decoder receives the payload starting at its argument and returns
//! the argument with the number of bytes it occupies.

use super::frame_map::Pdu;
use crate::args::{decode_latin1, DltArg, IntWidth, StringCoding};
use crate::types::{DecoderError, Result};
use crate::wire::PayloadReader;

/// Decodes one non-verbose argument described by a PDU
pub trait NonVerboseArgDecoder: Send + Sync {
    fn decode(&self, buf: &[u8], big_endian: bool, pdu: &Pdu) -> Result<(DltArg, usize)>;
}

impl<F> NonVerboseArgDecoder for F
where
    F: Fn(&[u8], bool, &Pdu) -> Result<(DltArg, usize)> + Send + Sync,
{
    fn decode(&self, buf: &[u8], big_endian: bool, pdu: &Pdu) -> Result<(DltArg, usize)> {
        self(buf, big_endian, pdu)
    }
}

fn insufficient(what: &str, needed: usize, available: usize) -> DecoderError {
    DecoderError::invalid(format!(
        "insufficient payload for {}: need {} bytes, have {}",
        what, needed, available
    ))
}

/// Reads the 2-byte length prefix of a variable length argument
fn length_prefix(buf: &[u8], big_endian: bool, what: &str) -> Result<usize> {
    let mut reader = PayloadReader::new(buf, big_endian);
    let length = reader
        .u16()
        .map_err(|_| insufficient(what, 2, buf.len()))? as usize;
    if buf.len() < 2 + length {
        return Err(insufficient(what, 2 + length, buf.len()));
    }
    Ok(length)
}

/// Locates the value of a fixed width argument
///
/// The PDU may declare more bytes than the value needs; they are consumed
/// but ignored. Returns the value bytes and the total length consumed.
fn fixed_value<'a>(
    buf: &'a [u8],
    big_endian: bool,
    pdu: &Pdu,
    width: usize,
    what: &str,
) -> Result<(&'a [u8], usize)> {
    let (start, length) = if pdu.length == 0 {
        (2, length_prefix(buf, big_endian, what)?)
    } else {
        (0, pdu.length as usize)
    };
    if length < width {
        return Err(DecoderError::invalid(format!(
            "{} invalid length {} in PDU",
            what, length
        )));
    }
    if buf.len() < start + length {
        return Err(insufficient(what, start + length, buf.len()));
    }
    Ok((&buf[start..start + width], start + length))
}

/// `S_BOOL`
#[derive(Debug, Clone, Copy, Default)]
pub struct BoolDecoder;

impl NonVerboseArgDecoder for BoolDecoder {
    fn decode(&self, buf: &[u8], big_endian: bool, pdu: &Pdu) -> Result<(DltArg, usize)> {
        let (value, consumed) = fixed_value(buf, big_endian, pdu, 1, "S_BOOL")?;
        Ok((DltArg::Bool(value[0] != 0), consumed))
    }
}

/// How an integer wire type is presented
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntDisplay {
    Signed,
    Unsigned,
    Hex,
    Binary,
}

/// `S_SINTn`, `S_UINTn`, `S_HEXn` and `S_BINn`
#[derive(Debug, Clone, Copy)]
pub struct IntDecoder {
    width: IntWidth,
    display: IntDisplay,
}

impl IntDecoder {
    pub fn new(width: IntWidth, display: IntDisplay) -> Self {
        Self { width, display }
    }

    fn type_name(&self) -> String {
        let prefix = match self.display {
            IntDisplay::Signed => "S_SINT",
            IntDisplay::Unsigned => "S_UINT",
            IntDisplay::Hex => "S_HEX",
            IntDisplay::Binary => "S_BIN",
        };
        format!("{}{}", prefix, self.width.bytes() * 8)
    }
}

impl NonVerboseArgDecoder for IntDecoder {
    fn decode(&self, buf: &[u8], big_endian: bool, pdu: &Pdu) -> Result<(DltArg, usize)> {
        let what = self.type_name();
        let (value, consumed) = fixed_value(buf, big_endian, pdu, self.width.bytes(), &what)?;
        let mut reader = PayloadReader::new(value, big_endian);

        let arg = match self.display {
            IntDisplay::Signed => {
                let value: i128 = match self.width {
                    IntWidth::W8 => reader.i8()?.into(),
                    IntWidth::W16 => reader.i16()?.into(),
                    IntWidth::W32 => reader.i32()?.into(),
                    IntWidth::W64 => reader.i64()?.into(),
                    IntWidth::W128 => reader.i128()?,
                };
                DltArg::SignedInt {
                    value,
                    width: self.width,
                    fixed_point: None,
                }
            }
            display => {
                let value: u128 = match self.width {
                    IntWidth::W8 => reader.u8()?.into(),
                    IntWidth::W16 => reader.u16()?.into(),
                    IntWidth::W32 => reader.u32()?.into(),
                    IntWidth::W64 => reader.u64()?.into(),
                    IntWidth::W128 => reader.u128()?,
                };
                match display {
                    IntDisplay::Hex => DltArg::HexInt {
                        value: value as u64,
                        width: self.width,
                    },
                    IntDisplay::Binary => DltArg::BinaryInt {
                        value: value as u64,
                        width: self.width,
                    },
                    _ => DltArg::UnsignedInt {
                        value,
                        width: self.width,
                        fixed_point: None,
                    },
                }
            }
        };
        Ok((arg, consumed))
    }
}

/// `S_FLOA32` and `S_FLOA64`
#[derive(Debug, Clone, Copy)]
pub struct FloatDecoder {
    double: bool,
}

impl FloatDecoder {
    pub fn f32() -> Self {
        Self { double: false }
    }

    pub fn f64() -> Self {
        Self { double: true }
    }
}

impl NonVerboseArgDecoder for FloatDecoder {
    fn decode(&self, buf: &[u8], big_endian: bool, pdu: &Pdu) -> Result<(DltArg, usize)> {
        let (width, what) = if self.double { (8, "S_FLOA64") } else { (4, "S_FLOA32") };
        let (value, consumed) = fixed_value(buf, big_endian, pdu, width, what)?;
        let mut reader = PayloadReader::new(value, big_endian);
        let arg = if self.double {
            DltArg::Float64(reader.f64()?)
        } else {
            DltArg::Float32(reader.f32()?)
        };
        Ok((arg, consumed))
    }
}

/// `S_STRG_ASCII`, `S_STRG_UTF8` and `S_UTF8`: length prefixed, optionally
/// NUL terminated
#[derive(Debug, Clone, Copy)]
pub struct StringDecoder {
    coding: StringCoding,
}

impl StringDecoder {
    pub fn new(coding: StringCoding) -> Self {
        Self { coding }
    }
}

impl NonVerboseArgDecoder for StringDecoder {
    fn decode(&self, buf: &[u8], big_endian: bool, _pdu: &Pdu) -> Result<(DltArg, usize)> {
        let length = length_prefix(buf, big_endian, "string")?;
        let mut data = &buf[2..2 + length];
        if let Some((0, rest)) = data.split_last() {
            data = rest;
        }
        let arg = match self.coding {
            StringCoding::Ascii => DltArg::string(decode_latin1(data)),
            StringCoding::Utf8 => DltArg::utf8(String::from_utf8_lossy(data)),
        };
        Ok((arg, 2 + length))
    }
}

/// `S_RAW` and `S_RAWD`: length prefixed bytes
#[derive(Debug, Clone, Copy, Default)]
pub struct RawDecoder;

impl NonVerboseArgDecoder for RawDecoder {
    fn decode(&self, buf: &[u8], big_endian: bool, _pdu: &Pdu) -> Result<(DltArg, usize)> {
        let length = length_prefix(buf, big_endian, "raw")?;
        Ok((DltArg::Raw(buf[2..2 + length].to_vec()), 2 + length))
    }
}

/// Fallback for unregistered wire types: keeps the bytes the PDU covers
#[derive(Debug, Clone, Copy, Default)]
pub struct UnknownDecoder;

impl NonVerboseArgDecoder for UnknownDecoder {
    fn decode(&self, buf: &[u8], big_endian: bool, pdu: &Pdu) -> Result<(DltArg, usize)> {
        let (start, length) = if pdu.length == 0 {
            (2, length_prefix(buf, big_endian, "unknown argument")?)
        } else {
            let length = pdu.length as usize;
            if buf.len() < length {
                return Err(insufficient("unknown argument", length, buf.len()));
            }
            (0, length)
        };
        let arg = DltArg::Unknown {
            type_info: None,
            data: buf[start..start + length].to_vec(),
        };
        Ok((arg, start + length))
    }
}
