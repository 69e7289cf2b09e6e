//! Verbose argument codec
//!
//! Each verbose argument starts with a 32-bit type info word in stream byte
//! order. The type info selects exactly one data kind and optional modifiers:
//! variable info (a name, and for numbers a unit, precede the value), fixed
//! point (quantization and offset precede integer data) and, for strings and
//! integers, a coding field.
//!
//! ```text
//! integer: type_info [name_len unit_len name unit] [quantization offset] value
//! string:  type_info len [name_len name] data
//! raw:     type_info len [name_len name] data
//! struct:  type_info count [name_len name] arg*
//! array:   type_info dims dim* [name_len unit_len name unit] [quantization offset] value*
//! ```

use crate::args::{decode_latin1, DltArg, FixedPoint, IntWidth, ScalarKind, StringCoding};
use crate::header::type_info::*;
use crate::types::{DecoderError, Result};
use crate::wire::{PayloadReader, PayloadWriter};
use log::debug;

/// Integer coding values in the type info coding field
const CODING_HEX: u32 = 2;
const CODING_BIN: u32 = 3;

/// Nesting limit for structs
const MAX_DEPTH: usize = 16;

const SCALAR_KINDS: u32 = TYPE_BOOL | TYPE_SINT | TYPE_UINT | TYPE_FLOAT;

fn width_from_code(code: u32) -> Option<IntWidth> {
    match code {
        LENGTH_8 => Some(IntWidth::W8),
        LENGTH_16 => Some(IntWidth::W16),
        LENGTH_32 => Some(IntWidth::W32),
        LENGTH_64 => Some(IntWidth::W64),
        LENGTH_128 => Some(IntWidth::W128),
        _ => None,
    }
}

fn length_code(width: IntWidth) -> u32 {
    match width {
        IntWidth::W8 => LENGTH_8,
        IntWidth::W16 => LENGTH_16,
        IntWidth::W32 => LENGTH_32,
        IntWidth::W64 => LENGTH_64,
        IntWidth::W128 => LENGTH_128,
    }
}

/// Decodes `count` arguments from a verbose payload
///
/// An argument that fails to decode is replaced by a [`DltArg::Error`] and
/// decoding stops there; the rest of the payload counts as consumed, so the
/// line is still produced.
///
/// # Returns
/// The arguments and the number of payload bytes consumed
pub fn decode_args(buf: &[u8], count: u8, big_endian: bool) -> (Vec<DltArg>, usize) {
    let mut reader = PayloadReader::new(buf, big_endian);
    let mut args = Vec::with_capacity(count as usize);
    for index in 0..count {
        let start = reader.position();
        match decode_arg(&mut reader) {
            Ok(arg) => args.push(arg),
            Err(e) => {
                debug!(
                    "Verbose argument {} of {} at offset {} failed: {}",
                    index + 1,
                    count,
                    start,
                    e
                );
                args.push(DltArg::Error(format!(
                    "arg {} of {}: {}",
                    index + 1,
                    count,
                    e
                )));
                return (args, buf.len());
            }
        }
    }
    (args, reader.position())
}

/// Decodes one argument, type info included
pub fn decode_arg(reader: &mut PayloadReader<'_>) -> Result<DltArg> {
    decode_nested(reader, 0)
}

fn decode_nested(reader: &mut PayloadReader<'_>, depth: usize) -> Result<DltArg> {
    let type_info = reader.u32()?;
    let kind = type_info & KIND_MASK;
    let variable_info = type_info & VARIABLE_INFO != 0;

    match kind {
        TYPE_BOOL => {
            let name = if variable_info { Some(read_name(reader)?) } else { None };
            if !matches!(type_info & LENGTH_MASK, LENGTH_8 | LENGTH_UNKNOWN) {
                return Err(unsupported_length("Bool", type_info));
            }
            let value = DltArg::Bool(reader.u8()? != 0);
            Ok(with_name(name, None, value))
        }
        TYPE_SINT | TYPE_UINT => decode_integer(reader, type_info),
        TYPE_FLOAT => decode_float(reader, type_info),
        TYPE_STRING => {
            let length = reader.u16()? as usize;
            let name = if variable_info { Some(read_name(reader)?) } else { None };
            let data = strip_nul(reader.bytes(length)?);
            let coding = (type_info & CODING_MASK) >> CODING_SHIFT;
            let value = if coding == CODING_UTF8 {
                DltArg::utf8(String::from_utf8_lossy(data))
            } else {
                DltArg::string(decode_latin1(data))
            };
            Ok(with_name(name, None, value))
        }
        TYPE_RAW => {
            let length = reader.u16()? as usize;
            let name = if variable_info { Some(read_name(reader)?) } else { None };
            let value = DltArg::Raw(reader.bytes(length)?.to_vec());
            Ok(with_name(name, None, value))
        }
        TRACE_INFO => {
            let length = reader.u16()? as usize;
            let data = strip_nul(reader.bytes(length)?);
            Ok(DltArg::TraceInfo(decode_latin1(data)))
        }
        TYPE_STRUCT => {
            if depth >= MAX_DEPTH {
                return Err(DecoderError::invalid("struct nesting too deep"));
            }
            let count = reader.u16()?;
            let name = if variable_info { Some(read_name(reader)?) } else { None };
            let mut fields = Vec::with_capacity(count.min(256) as usize);
            for _ in 0..count {
                fields.push(decode_nested(reader, depth + 1)?);
            }
            Ok(with_name(name, None, DltArg::Struct(fields)))
        }
        _ if kind & TYPE_ARRAY != 0 => decode_array(reader, type_info),
        _ => Err(DecoderError::invalid(format!("unknown type info 0x{:08x}", type_info))),
    }
}

fn unsupported_length(kind: &str, type_info: u32) -> DecoderError {
    DecoderError::invalid(format!(
        "'{}' unsupported type length 0x{:x}",
        kind,
        type_info & LENGTH_MASK
    ))
}

fn strip_nul(data: &[u8]) -> &[u8] {
    match data.split_last() {
        Some((0, rest)) => rest,
        _ => data,
    }
}

fn read_text(reader: &mut PayloadReader<'_>, length: usize) -> Result<String> {
    let data = strip_nul(reader.bytes(length)?);
    Ok(String::from_utf8_lossy(data).into_owned())
}

/// Name of a bool, string, raw or struct argument
fn read_name(reader: &mut PayloadReader<'_>) -> Result<String> {
    let length = reader.u16()? as usize;
    read_text(reader, length)
}

/// Name and unit of a numeric argument; an empty unit field is `None`
fn read_name_unit(reader: &mut PayloadReader<'_>) -> Result<(String, Option<String>)> {
    let name_length = reader.u16()? as usize;
    let unit_length = reader.u16()? as usize;
    let name = read_text(reader, name_length)?;
    let unit = if unit_length == 0 {
        None
    } else {
        Some(read_text(reader, unit_length)?)
    };
    Ok((name, unit))
}

fn with_name(name: Option<String>, unit: Option<String>, value: DltArg) -> DltArg {
    match name {
        Some(name) => DltArg::Named {
            name,
            unit,
            value: Box::new(value),
        },
        None => value,
    }
}

fn read_fixed_point(reader: &mut PayloadReader<'_>, width: IntWidth) -> Result<FixedPoint> {
    let quantization = reader.f32()?;
    let offset = match width {
        IntWidth::W8 | IntWidth::W16 | IntWidth::W32 => reader.i32()? as i128,
        IntWidth::W64 => reader.i64()? as i128,
        IntWidth::W128 => reader.i128()?,
    };
    Ok(FixedPoint { quantization, offset })
}

fn read_signed(reader: &mut PayloadReader<'_>, width: IntWidth) -> Result<i128> {
    Ok(match width {
        IntWidth::W8 => reader.i8()? as i128,
        IntWidth::W16 => reader.i16()? as i128,
        IntWidth::W32 => reader.i32()? as i128,
        IntWidth::W64 => reader.i64()? as i128,
        IntWidth::W128 => reader.i128()?,
    })
}

fn read_unsigned(reader: &mut PayloadReader<'_>, width: IntWidth) -> Result<u128> {
    Ok(match width {
        IntWidth::W8 => reader.u8()? as u128,
        IntWidth::W16 => reader.u16()? as u128,
        IntWidth::W32 => reader.u32()? as u128,
        IntWidth::W64 => reader.u64()? as u128,
        IntWidth::W128 => reader.u128()?,
    })
}

fn decode_integer(reader: &mut PayloadReader<'_>, type_info: u32) -> Result<DltArg> {
    let signed = type_info & KIND_MASK == TYPE_SINT;
    let width = width_from_code(type_info & LENGTH_MASK)
        .ok_or_else(|| unsupported_length("Integer", type_info))?;

    let (name, unit) = if type_info & VARIABLE_INFO != 0 {
        let (name, unit) = read_name_unit(reader)?;
        (Some(name), unit)
    } else {
        (None, None)
    };
    let fixed_point = if type_info & FIXED_POINT != 0 {
        Some(read_fixed_point(reader, width)?)
    } else {
        None
    };

    let coding = (type_info & CODING_MASK) >> CODING_SHIFT;
    let value = if signed {
        let value = read_signed(reader, width)?;
        display_coded(coding, width, fixed_point, value as u128).unwrap_or(DltArg::SignedInt {
            value,
            width,
            fixed_point,
        })
    } else {
        let value = read_unsigned(reader, width)?;
        display_coded(coding, width, fixed_point, value).unwrap_or(DltArg::UnsignedInt {
            value,
            width,
            fixed_point,
        })
    };
    Ok(with_name(name, unit, value))
}

/// Hex and binary coded integers up to 64 bits keep their display form
fn display_coded(
    coding: u32,
    width: IntWidth,
    fixed_point: Option<FixedPoint>,
    raw: u128,
) -> Option<DltArg> {
    if fixed_point.is_some() || width == IntWidth::W128 {
        return None;
    }
    let mask = u64::MAX >> (64 - width.bytes() * 8);
    let value = raw as u64 & mask;
    match coding {
        CODING_HEX => Some(DltArg::HexInt { value, width }),
        CODING_BIN => Some(DltArg::BinaryInt { value, width }),
        _ => None,
    }
}

fn decode_float(reader: &mut PayloadReader<'_>, type_info: u32) -> Result<DltArg> {
    let (name, unit) = if type_info & VARIABLE_INFO != 0 {
        let (name, unit) = read_name_unit(reader)?;
        (Some(name), unit)
    } else {
        (None, None)
    };

    let value = match type_info & LENGTH_MASK {
        LENGTH_32 => DltArg::Float32(reader.f32()?),
        LENGTH_64 => DltArg::Float64(reader.f64()?),
        LENGTH_16 => DltArg::Unknown {
            type_info: Some(type_info),
            data: reader.bytes(2)?.to_vec(),
        },
        LENGTH_128 => DltArg::Unknown {
            type_info: Some(type_info),
            data: reader.bytes(16)?.to_vec(),
        },
        _ => return Err(unsupported_length("Float", type_info)),
    };
    Ok(with_name(name, unit, value))
}

fn array_element(type_info: u32) -> Result<ScalarKind> {
    let code = type_info & LENGTH_MASK;
    let element = match type_info & SCALAR_KINDS {
        TYPE_BOOL => ScalarKind::Bool,
        TYPE_SINT => ScalarKind::Signed(
            width_from_code(code).ok_or_else(|| unsupported_length("Array", type_info))?,
        ),
        TYPE_UINT => ScalarKind::Unsigned(
            width_from_code(code).ok_or_else(|| unsupported_length("Array", type_info))?,
        ),
        TYPE_FLOAT if code == LENGTH_32 => ScalarKind::Float32,
        TYPE_FLOAT if code == LENGTH_64 => ScalarKind::Float64,
        _ => {
            return Err(DecoderError::invalid(format!(
                "unsupported array type info 0x{:08x}",
                type_info
            )))
        }
    };
    Ok(element)
}

fn read_scalar(reader: &mut PayloadReader<'_>, element: ScalarKind) -> Result<DltArg> {
    Ok(match element {
        ScalarKind::Bool => DltArg::Bool(reader.u8()? != 0),
        ScalarKind::Signed(width) => DltArg::SignedInt {
            value: read_signed(reader, width)?,
            width,
            fixed_point: None,
        },
        ScalarKind::Unsigned(width) => DltArg::UnsignedInt {
            value: read_unsigned(reader, width)?,
            width,
            fixed_point: None,
        },
        ScalarKind::Float32 => DltArg::Float32(reader.f32()?),
        ScalarKind::Float64 => DltArg::Float64(reader.f64()?),
    })
}

fn decode_array(reader: &mut PayloadReader<'_>, type_info: u32) -> Result<DltArg> {
    let element = array_element(type_info)?;

    let dimension_count = reader.u16()?;
    let mut dimensions = Vec::with_capacity(dimension_count.min(16) as usize);
    let mut items_count: usize = 1;
    for _ in 0..dimension_count {
        let dim = reader.u16()?;
        items_count = items_count.saturating_mul(dim as usize);
        dimensions.push(dim);
    }

    let (name, unit) = if type_info & VARIABLE_INFO != 0 {
        let (name, unit) = read_name_unit(reader)?;
        (Some(name), unit)
    } else {
        (None, None)
    };
    let fixed_point = match element {
        ScalarKind::Signed(width) | ScalarKind::Unsigned(width) if type_info & FIXED_POINT != 0 => {
            Some(read_fixed_point(reader, width)?)
        }
        _ => None,
    };

    if items_count.saturating_mul(element.bytes()) > reader.remaining() {
        return Err(DecoderError::invalid(format!(
            "array of {} items exceeds the remaining {} bytes",
            items_count,
            reader.remaining()
        )));
    }
    let mut items = Vec::with_capacity(items_count);
    for _ in 0..items_count {
        items.push(read_scalar(reader, element)?);
    }

    let value = DltArg::Array {
        element,
        dimensions,
        items,
        fixed_point,
    };
    Ok(with_name(name, unit, value))
}

// Encoding

fn not_encodable(arg: &DltArg) -> DecoderError {
    DecoderError::EncodeNotSupported(format!("verbose argument {:?}", arg))
}

fn u16_len(len: usize, what: &str) -> Result<u16> {
    u16::try_from(len).map_err(|_| DecoderError::EncodeNotSupported(format!("{} too long ({} bytes)", what, len)))
}

/// Bytes of a string in the given coding, without terminator
fn string_bytes(value: &str, coding: StringCoding) -> Vec<u8> {
    match coding {
        StringCoding::Utf8 => value.as_bytes().to_vec(),
        StringCoding::Ascii => value.chars().map(|c| u8::try_from(c).unwrap_or(b'?')).collect(),
    }
}

/// Variable info of a named argument
struct VarInfo<'a> {
    name: &'a str,
    unit: Option<&'a str>,
}

impl VarInfo<'_> {
    /// `name_len name` form of bool, string, raw and struct arguments
    fn name_len(&self) -> Result<u16> {
        u16_len(self.name.len() + 1, "name")
    }

    fn write_name(&self, writer: &mut PayloadWriter) {
        writer.bytes(self.name.as_bytes());
        writer.u8(0);
    }

    /// `name_len unit_len name unit` form of numeric arguments
    fn write_name_unit(&self, writer: &mut PayloadWriter) -> Result<()> {
        writer.u16(self.name_len()?);
        match self.unit {
            Some(unit) => writer.u16(u16_len(unit.len() + 1, "unit")?),
            None => writer.u16(0),
        }
        self.write_name(writer);
        if let Some(unit) = self.unit {
            writer.bytes(unit.as_bytes());
            writer.u8(0);
        }
        Ok(())
    }
}

fn write_fixed_point(writer: &mut PayloadWriter, width: IntWidth, fp: &FixedPoint) {
    writer.f32(fp.quantization);
    match width {
        IntWidth::W8 | IntWidth::W16 | IntWidth::W32 => writer.i32(fp.offset as i32),
        IntWidth::W64 => writer.i64(fp.offset as i64),
        IntWidth::W128 => writer.i128(fp.offset),
    }
}

fn write_signed(writer: &mut PayloadWriter, width: IntWidth, value: i128) {
    match width {
        IntWidth::W8 => writer.i8(value as i8),
        IntWidth::W16 => writer.i16(value as i16),
        IntWidth::W32 => writer.i32(value as i32),
        IntWidth::W64 => writer.i64(value as i64),
        IntWidth::W128 => writer.i128(value),
    }
}

fn write_unsigned(writer: &mut PayloadWriter, width: IntWidth, value: u128) {
    match width {
        IntWidth::W8 => writer.u8(value as u8),
        IntWidth::W16 => writer.u16(value as u16),
        IntWidth::W32 => writer.u32(value as u32),
        IntWidth::W64 => writer.u64(value as u64),
        IntWidth::W128 => writer.u128(value),
    }
}

fn write_scalar(writer: &mut PayloadWriter, element: ScalarKind, item: &DltArg) -> Result<()> {
    match (element, item) {
        (ScalarKind::Bool, DltArg::Bool(value)) => writer.u8(u8::from(*value)),
        (ScalarKind::Signed(width), DltArg::SignedInt { value, .. }) => {
            write_signed(writer, width, *value)
        }
        (ScalarKind::Unsigned(width), DltArg::UnsignedInt { value, .. }) => {
            write_unsigned(writer, width, *value)
        }
        (ScalarKind::Float32, DltArg::Float32(value)) => writer.f32(*value),
        (ScalarKind::Float64, DltArg::Float64(value)) => writer.f64(*value),
        _ => return Err(not_encodable(item)),
    }
    Ok(())
}

fn scalar_type_info(element: ScalarKind) -> u32 {
    match element {
        ScalarKind::Bool => TYPE_BOOL | LENGTH_8,
        ScalarKind::Signed(width) => TYPE_SINT | length_code(width),
        ScalarKind::Unsigned(width) => TYPE_UINT | length_code(width),
        ScalarKind::Float32 => TYPE_FLOAT | LENGTH_32,
        ScalarKind::Float64 => TYPE_FLOAT | LENGTH_64,
    }
}

/// Encodes one argument, type info included
pub fn encode_arg(arg: &DltArg, writer: &mut PayloadWriter) -> Result<()> {
    match arg {
        DltArg::Named { name, unit, value } => {
            let var = VarInfo {
                name,
                unit: unit.as_deref(),
            };
            encode_value(value, Some(&var), writer)
        }
        _ => encode_value(arg, None, writer),
    }
}

fn encode_value(arg: &DltArg, var: Option<&VarInfo<'_>>, writer: &mut PayloadWriter) -> Result<()> {
    let vari_bit = if var.is_some() { VARIABLE_INFO } else { 0 };

    match arg {
        DltArg::Bool(value) => {
            writer.u32(TYPE_BOOL | LENGTH_8 | vari_bit);
            if let Some(var) = var {
                writer.u16(var.name_len()?);
                var.write_name(writer);
            }
            writer.u8(u8::from(*value));
        }
        DltArg::SignedInt {
            value,
            width,
            fixed_point,
        } => {
            let fixp_bit = if fixed_point.is_some() { FIXED_POINT } else { 0 };
            writer.u32(TYPE_SINT | length_code(*width) | vari_bit | fixp_bit);
            if let Some(var) = var {
                var.write_name_unit(writer)?;
            }
            if let Some(fp) = fixed_point {
                write_fixed_point(writer, *width, fp);
            }
            write_signed(writer, *width, *value);
        }
        DltArg::UnsignedInt {
            value,
            width,
            fixed_point,
        } => {
            let fixp_bit = if fixed_point.is_some() { FIXED_POINT } else { 0 };
            writer.u32(TYPE_UINT | length_code(*width) | vari_bit | fixp_bit);
            if let Some(var) = var {
                var.write_name_unit(writer)?;
            }
            if let Some(fp) = fixed_point {
                write_fixed_point(writer, *width, fp);
            }
            write_unsigned(writer, *width, *value);
        }
        DltArg::HexInt { value, width } | DltArg::BinaryInt { value, width } => {
            if *width == IntWidth::W128 {
                return Err(not_encodable(arg));
            }
            let coding = if matches!(arg, DltArg::HexInt { .. }) {
                CODING_HEX
            } else {
                CODING_BIN
            };
            writer.u32(TYPE_UINT | length_code(*width) | vari_bit | (coding << CODING_SHIFT));
            if let Some(var) = var {
                var.write_name_unit(writer)?;
            }
            write_unsigned(writer, *width, *value as u128);
        }
        DltArg::Float32(value) => {
            writer.u32(TYPE_FLOAT | LENGTH_32 | vari_bit);
            if let Some(var) = var {
                var.write_name_unit(writer)?;
            }
            writer.f32(*value);
        }
        DltArg::Float64(value) => {
            writer.u32(TYPE_FLOAT | LENGTH_64 | vari_bit);
            if let Some(var) = var {
                var.write_name_unit(writer)?;
            }
            writer.f64(*value);
        }
        DltArg::String { value, coding } => {
            let coding_bits = match coding {
                StringCoding::Ascii => CODING_ASCII,
                StringCoding::Utf8 => CODING_UTF8,
            };
            let data = string_bytes(value, *coding);
            writer.u32(TYPE_STRING | vari_bit | (coding_bits << CODING_SHIFT));
            writer.u16(u16_len(data.len() + 1, "string")?);
            if let Some(var) = var {
                writer.u16(var.name_len()?);
                var.write_name(writer);
            }
            writer.bytes(&data);
            writer.u8(0);
        }
        DltArg::Raw(data) => {
            writer.u32(TYPE_RAW | vari_bit);
            writer.u16(u16_len(data.len(), "raw data")?);
            if let Some(var) = var {
                writer.u16(var.name_len()?);
                var.write_name(writer);
            }
            writer.bytes(data);
        }
        DltArg::TraceInfo(value) => {
            if var.is_some() {
                return Err(not_encodable(arg));
            }
            let data = string_bytes(value, StringCoding::Ascii);
            writer.u32(TRACE_INFO);
            writer.u16(u16_len(data.len() + 1, "trace info")?);
            writer.bytes(&data);
            writer.u8(0);
        }
        DltArg::Struct(fields) => {
            writer.u32(TYPE_STRUCT | vari_bit);
            writer.u16(u16_len(fields.len(), "struct")?);
            if let Some(var) = var {
                writer.u16(var.name_len()?);
                var.write_name(writer);
            }
            for field in fields {
                encode_arg(field, writer)?;
            }
        }
        DltArg::Array {
            element,
            dimensions,
            items,
            fixed_point,
        } => {
            let expected = dimensions.iter().fold(1usize, |n, &d| n.saturating_mul(d as usize));
            if expected != items.len() {
                return Err(DecoderError::EncodeNotSupported(format!(
                    "array dimensions {:?} do not match {} items",
                    dimensions,
                    items.len()
                )));
            }
            let fixp_width = match element {
                ScalarKind::Signed(width) | ScalarKind::Unsigned(width) => Some(*width),
                _ => None,
            };
            let fixp_bit = match (fixed_point, fixp_width) {
                (Some(_), Some(_)) => FIXED_POINT,
                (Some(_), None) => return Err(not_encodable(arg)),
                _ => 0,
            };

            writer.u32(TYPE_ARRAY | scalar_type_info(*element) | vari_bit | fixp_bit);
            writer.u16(u16_len(dimensions.len(), "array dimensions")?);
            for &dim in dimensions {
                writer.u16(dim);
            }
            if let Some(var) = var {
                var.write_name_unit(writer)?;
            }
            if let (Some(fp), Some(width)) = (fixed_point, fixp_width) {
                write_fixed_point(writer, width, fp);
            }
            for item in items {
                write_scalar(writer, *element, item)?;
            }
        }
        DltArg::Unknown {
            type_info: Some(type_info),
            data,
        } if var.is_none() => {
            writer.u32(*type_info);
            writer.bytes(data);
        }
        DltArg::Unknown { .. } | DltArg::NonVerbose(_) | DltArg::Error(_) | DltArg::Named { .. } => {
            return Err(not_encodable(arg))
        }
    }
    Ok(())
}
