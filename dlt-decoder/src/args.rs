//! Decoded trace line arguments
//!
//! Verbose and non-verbose messages share one argument type. Not every
//! variant occurs in both: type-tagged arrays and structs only come from
//! verbose payloads, undecoded payload bytes only from non-verbose ones.

use std::fmt::{self, Write};

/// Width of an integer argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntWidth {
    W8,
    W16,
    W32,
    W64,
    W128,
}

impl IntWidth {
    pub fn bytes(self) -> usize {
        match self {
            IntWidth::W8 => 1,
            IntWidth::W16 => 2,
            IntWidth::W32 => 4,
            IntWidth::W64 => 8,
            IntWidth::W128 => 16,
        }
    }

    pub fn from_bytes(bytes: usize) -> Option<Self> {
        match bytes {
            1 => Some(IntWidth::W8),
            2 => Some(IntWidth::W16),
            4 => Some(IntWidth::W32),
            8 => Some(IntWidth::W64),
            16 => Some(IntWidth::W128),
            _ => None,
        }
    }
}

/// Character coding of a string argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StringCoding {
    /// 8-bit text; bytes above 0x7F are read as ISO-8859-1
    #[default]
    Ascii,
    Utf8,
}

/// Scaling applied to a fixed-point integer: `physical = raw * quantization + offset`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedPoint {
    pub quantization: f32,
    pub offset: i128,
}

/// Element type of a verbose array
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    Bool,
    Signed(IntWidth),
    Unsigned(IntWidth),
    Float32,
    Float64,
}

impl ScalarKind {
    pub fn bytes(self) -> usize {
        match self {
            ScalarKind::Bool => 1,
            ScalarKind::Signed(width) | ScalarKind::Unsigned(width) => width.bytes(),
            ScalarKind::Float32 => 4,
            ScalarKind::Float64 => 8,
        }
    }
}

/// A single argument of a trace line
#[derive(Debug, Clone, PartialEq)]
pub enum DltArg {
    Bool(bool),
    SignedInt {
        value: i128,
        width: IntWidth,
        fixed_point: Option<FixedPoint>,
    },
    UnsignedInt {
        value: u128,
        width: IntWidth,
        fixed_point: Option<FixedPoint>,
    },
    Float32(f32),
    Float64(f64),
    String {
        value: String,
        coding: StringCoding,
    },
    Raw(Vec<u8>),
    /// Multi-dimensional array of scalars, items stored in wire order
    Array {
        element: ScalarKind,
        dimensions: Vec<u16>,
        items: Vec<DltArg>,
        fixed_point: Option<FixedPoint>,
    },
    Struct(Vec<DltArg>),
    TraceInfo(String),
    /// Integer shown in hexadecimal
    HexInt { value: u64, width: IntWidth },
    /// Integer shown in binary
    BinaryInt { value: u64, width: IntWidth },
    /// Undecoded non-verbose payload following the message ID
    NonVerbose(Vec<u8>),
    /// A value whose type could not be interpreted, kept as raw bytes
    Unknown {
        type_info: Option<u32>,
        data: Vec<u8>,
    },
    /// Placeholder for an argument that failed to decode
    Error(String),
    /// A value carrying variable info (a name and, for numbers, a unit)
    Named {
        name: String,
        unit: Option<String>,
        value: Box<DltArg>,
    },
}

impl DltArg {
    pub fn string(value: impl Into<String>) -> Self {
        DltArg::String {
            value: value.into(),
            coding: StringCoding::Ascii,
        }
    }

    pub fn utf8(value: impl Into<String>) -> Self {
        DltArg::String {
            value: value.into(),
            coding: StringCoding::Utf8,
        }
    }

    pub fn signed(value: i64, width: IntWidth) -> Self {
        DltArg::SignedInt {
            value: value as i128,
            width,
            fixed_point: None,
        }
    }

    pub fn unsigned(value: u64, width: IntWidth) -> Self {
        DltArg::UnsignedInt {
            value: value as u128,
            width,
            fixed_point: None,
        }
    }

    /// Attaches variable info to an argument
    pub fn named(name: impl Into<String>, unit: Option<&str>, value: DltArg) -> Self {
        DltArg::Named {
            name: name.into(),
            unit: unit.map(str::to_string),
            value: Box::new(value),
        }
    }

    /// Width of the value on the wire, for types with a fixed size
    pub fn fixed_width(&self) -> Option<usize> {
        match self {
            DltArg::Bool(_) => Some(1),
            DltArg::SignedInt { width, .. }
            | DltArg::UnsignedInt { width, .. }
            | DltArg::HexInt { width, .. }
            | DltArg::BinaryInt { width, .. } => Some(width.bytes()),
            DltArg::Float32(_) => Some(4),
            DltArg::Float64(_) => Some(8),
            DltArg::Named { value, .. } => value.fixed_width(),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, DltArg::Error(_))
    }
}

impl From<bool> for DltArg {
    fn from(value: bool) -> Self {
        DltArg::Bool(value)
    }
}

macro_rules! from_int {
    ($ty:ty, $variant:ident, $width:expr) => {
        impl From<$ty> for DltArg {
            fn from(value: $ty) -> Self {
                DltArg::$variant {
                    value: value.into(),
                    width: $width,
                    fixed_point: None,
                }
            }
        }
    };
}

from_int!(i8, SignedInt, IntWidth::W8);
from_int!(i16, SignedInt, IntWidth::W16);
from_int!(i32, SignedInt, IntWidth::W32);
from_int!(i64, SignedInt, IntWidth::W64);
from_int!(i128, SignedInt, IntWidth::W128);
from_int!(u8, UnsignedInt, IntWidth::W8);
from_int!(u16, UnsignedInt, IntWidth::W16);
from_int!(u32, UnsignedInt, IntWidth::W32);
from_int!(u64, UnsignedInt, IntWidth::W64);
from_int!(u128, UnsignedInt, IntWidth::W128);

impl From<f32> for DltArg {
    fn from(value: f32) -> Self {
        DltArg::Float32(value)
    }
}

impl From<f64> for DltArg {
    fn from(value: f64) -> Self {
        DltArg::Float64(value)
    }
}

impl From<&str> for DltArg {
    fn from(value: &str) -> Self {
        DltArg::string(value)
    }
}

impl From<String> for DltArg {
    fn from(value: String) -> Self {
        DltArg::string(value)
    }
}

impl fmt::Display for DltArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DltArg::Bool(value) => f.write_str(if *value { "True" } else { "False" }),
            DltArg::SignedInt {
                value, fixed_point, ..
            } => match fixed_point {
                Some(fp) => write!(f, "{}", physical(*value as f64, fp)),
                None => write!(f, "{}", value),
            },
            DltArg::UnsignedInt {
                value, fixed_point, ..
            } => match fixed_point {
                Some(fp) => write!(f, "{}", physical(*value as f64, fp)),
                None => write!(f, "{}", value),
            },
            DltArg::Float32(value) => write!(f, "{}", value),
            DltArg::Float64(value) => write!(f, "{}", value),
            DltArg::String {
                value,
                coding: StringCoding::Ascii,
            } => write_printable(f, value),
            DltArg::String { value, .. } => f.write_str(value),
            DltArg::TraceInfo(value) => write_printable(f, value),
            DltArg::Raw(data) => f.write_str(&hex_string(data)),
            DltArg::Array { items, .. } => {
                f.write_char('[')?;
                write_joined(f, items)?;
                f.write_char(']')
            }
            DltArg::Struct(fields) => {
                f.write_char('{')?;
                write_joined(f, fields)?;
                f.write_char('}')
            }
            DltArg::HexInt { value, width } => {
                write!(f, "0x{:0w$x}", value, w = width.bytes().min(8) * 2)
            }
            DltArg::BinaryInt { value, width } => write_binary(f, *value, width.bytes()),
            DltArg::NonVerbose(data) => {
                if data.is_empty() {
                    return Ok(());
                }
                for &b in data {
                    f.write_char(if (32..=126).contains(&b) { b as char } else { '-' })?;
                }
                f.write_char('|')?;
                f.write_str(&hex_string(data))
            }
            DltArg::Unknown { type_info, data } => {
                if let Some(type_info) = type_info {
                    write!(f, "Type Info: 0x{:08x} ", type_info)?;
                }
                write!(f, "Data: {}", hex_string(data))
            }
            DltArg::Error(message) => f.write_str(message),
            DltArg::Named { name, unit, value } => {
                write!(f, "{}: {}", name, value)?;
                match unit {
                    Some(unit) if !unit.is_empty() => write!(f, " {}", unit),
                    _ => Ok(()),
                }
            }
        }
    }
}

fn physical(raw: f64, fp: &FixedPoint) -> f64 {
    raw * fp.quantization as f64 + fp.offset as f64
}

fn write_joined(f: &mut fmt::Formatter<'_>, items: &[DltArg]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_char(' ')?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

/// Writes `0b0000 0001 ...`, at least `bytes` bytes wide, leading zero bytes
/// beyond the width omitted
fn write_binary(f: &mut fmt::Formatter<'_>, value: u64, bytes: usize) -> fmt::Result {
    let mut first = true;
    let mut print = false;
    for i in (0..8).rev() {
        let byte = (value >> (i * 8)) as u8;
        print |= byte != 0;
        if i < bytes || print {
            let prefix = if first { "0b" } else { " " };
            write!(f, "{}{:04b} {:04b}", prefix, byte >> 4, byte & 0xF)?;
            first = false;
        }
    }
    Ok(())
}

/// Space separated lowercase hex, e.g. `00 12 ab`
pub fn hex_string(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Decodes 8-bit text as ISO-8859-1; every byte maps to one char
pub fn decode_latin1(data: &[u8]) -> String {
    data.iter().map(|&b| char::from(b)).collect()
}

/// Writes 8-bit text with control characters shown as '.'
pub(crate) fn write_printable(f: &mut impl fmt::Write, text: &str) -> fmt::Result {
    for c in text.chars() {
        match c {
            '\u{00}'..='\u{1F}' | '\u{7F}'..='\u{9F}' => f.write_char('.')?,
            _ => f.write_char(c)?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_width() {
        assert_eq!(IntWidth::W32.bytes(), 4);
        assert_eq!(IntWidth::from_bytes(16), Some(IntWidth::W128));
        assert_eq!(IntWidth::from_bytes(3), None);
    }

    #[test]
    fn test_display_scalars() {
        assert_eq!(DltArg::from(true).to_string(), "True");
        assert_eq!(DltArg::from(false).to_string(), "False");
        assert_eq!(DltArg::from(-42i32).to_string(), "-42");
        assert_eq!(DltArg::from(u64::MAX).to_string(), "18446744073709551615");
        assert_eq!(DltArg::from(1.5f32).to_string(), "1.5");
        assert_eq!(DltArg::from("hello").to_string(), "hello");
    }

    #[test]
    fn test_display_fixed_point() {
        let arg = DltArg::SignedInt {
            value: 10,
            width: IntWidth::W16,
            fixed_point: Some(FixedPoint {
                quantization: 0.5,
                offset: 3,
            }),
        };
        assert_eq!(arg.to_string(), "8");
    }

    #[test]
    fn test_display_hex_and_binary() {
        let hex = DltArg::HexInt {
            value: 0x12,
            width: IntWidth::W16,
        };
        assert_eq!(hex.to_string(), "0x0012");

        let bin = DltArg::BinaryInt {
            value: 0x01,
            width: IntWidth::W8,
        };
        assert_eq!(bin.to_string(), "0b0000 0001");

        let bin = DltArg::BinaryInt {
            value: 0x0102,
            width: IntWidth::W8,
        };
        assert_eq!(bin.to_string(), "0b0000 0001 0000 0010");
    }

    #[test]
    fn test_display_non_verbose() {
        assert_eq!(DltArg::NonVerbose(vec![0x00, 0x12]).to_string(), "--|00 12");
        assert_eq!(DltArg::NonVerbose(b"AB\x7f".to_vec()).to_string(), "AB-|41 42 7f");
        assert_eq!(DltArg::NonVerbose(Vec::new()).to_string(), "");
    }

    #[test]
    fn test_display_named() {
        let arg = DltArg::named("speed", Some("km/h"), DltArg::from(88u16));
        assert_eq!(arg.to_string(), "speed: 88 km/h");
        assert_eq!(arg.fixed_width(), Some(2));
    }

    #[test]
    fn test_display_containers() {
        let arr = DltArg::Array {
            element: ScalarKind::Unsigned(IntWidth::W8),
            dimensions: vec![3],
            items: vec![1u8.into(), 2u8.into(), 3u8.into()],
            fixed_point: None,
        };
        assert_eq!(arr.to_string(), "[1 2 3]");
        let st = DltArg::Struct(vec!["a".into(), 7i8.into()]);
        assert_eq!(st.to_string(), "{a 7}");
    }

    #[test]
    fn test_latin1() {
        assert_eq!(decode_latin1(b"abc"), "abc");
        assert_eq!(decode_latin1(&[0x41, 0xE9, 0x0A, 0x85]), "A\u{e9}\n\u{85}");

        // Control characters stay in the value and only display as '.'
        let arg = DltArg::string(decode_latin1(b"a\tb\nc"));
        assert_eq!(arg, DltArg::string("a\tb\nc"));
        assert_eq!(arg.to_string(), "a.b.c");
        assert_eq!(DltArg::utf8("a\tb").to_string(), "a\tb");
    }

    #[test]
    fn test_hex_string() {
        assert_eq!(hex_string(&[0x00, 0xAB, 0x12]), "00 ab 12");
        assert_eq!(hex_string(&[]), "");
    }
}
