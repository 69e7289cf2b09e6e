//! Stream encoder
//!
//! [`TraceEncoder`] writes trace lines back into packets. The headers follow
//! the line's feature flags. Control and verbose lines always get an
//! extended header; other lines only when they carry an application ID,
//! context ID or message type. Normal lines are written verbose, except lines
//! that still hold an undecoded non-verbose payload, which are written back
//! as message ID and payload.

use crate::args::DltArg;
use crate::control::ControlCodec;
use crate::decoder::Format;
use crate::dlt_type::DltType;
use crate::header::{
    htyp, msin, ExtendedHeader, StandardHeader, StorageHeader, DEVICE_TIME_RESOLUTION_US,
    EXTENDED_HEADER_LEN, SERIAL_MARKER, STORAGE_HEADER_LEN,
};
use crate::id_cache::id_to_u32;
use crate::line::{DltTraceLine, LineHeader, NormalLine};
use crate::types::{DecoderError, Result};
use crate::verbose;
use crate::wire::PayloadWriter;
use log::{debug, trace};

/// Encodes trace lines into DLT packets
#[derive(Debug)]
pub struct TraceEncoder {
    format: Format,
    control: ControlCodec,
    next_count: u8,
}

impl Default for TraceEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl TraceEncoder {
    /// Creates an encoder writing bare network packets
    pub fn new() -> Self {
        Self::with_format(Format::Network)
    }

    /// Creates an encoder for the given capture framing
    pub fn with_format(format: Format) -> Self {
        Self {
            format,
            control: ControlCodec::new(),
            next_count: 0,
        }
    }

    pub fn format(&self) -> Format {
        self.format
    }

    /// Control service registry, for adding or removing services
    pub fn control_mut(&mut self) -> &mut ControlCodec {
        &mut self.control
    }

    /// Encodes a line into `buf`
    ///
    /// # Returns
    /// * `Ok(written)` - number of bytes written
    /// * `Err(DecoderError::InsufficientBuffer)` - `buf` is too small; nothing
    ///   was written
    /// * `Err(DecoderError::EncodeNotSupported)` - the line cannot be
    ///   represented, such as a skipped line
    pub fn encode(&mut self, buf: &mut [u8], line: &DltTraceLine) -> Result<usize> {
        let count = self.next_count;
        let packet = self.build(line)?;
        if buf.len() < packet.len() {
            // Leave the counter as it was so a retry writes the same packet
            self.next_count = count;
            return Err(DecoderError::buffer(packet.len(), buf.len()));
        }
        buf[..packet.len()].copy_from_slice(&packet);
        Ok(packet.len())
    }

    /// Encodes a line into a new buffer
    pub fn encode_to_vec(&mut self, line: &DltTraceLine) -> Result<Vec<u8>> {
        self.build(line)
    }

    fn build(&mut self, line: &DltTraceLine) -> Result<Vec<u8>> {
        let header = line.header();
        let big_endian = header.is_big_endian();

        let (msin_bits, noar, payload) = match line {
            DltTraceLine::Normal(normal) => encode_normal(normal, big_endian)?,
            DltTraceLine::Control(control) => {
                let payload = self.control.encode(&control.payload, big_endian)?;
                (control.payload.dlt_type().bits(), 0, payload)
            }
            DltTraceLine::Skipped(_) => {
                return Err(DecoderError::EncodeNotSupported(
                    "skipped lines have no packet".to_string(),
                ))
            }
        };

        let count = header.count.unwrap_or(self.next_count);
        let extended = needs_extended_header(line, msin_bits);
        let mut standard = standard_header(header, count, extended)?;

        let header_len = standard.header_len();
        let extended_len = if extended { EXTENDED_HEADER_LEN } else { 0 };
        let length = header_len + extended_len + payload.len();
        standard.length = u16::try_from(length).map_err(|_| {
            DecoderError::EncodeNotSupported(format!("packet length {} exceeds 65535", length))
        })?;

        let prefix = self.format.header_offset();
        let mut packet = vec![0u8; prefix + length];
        match self.format {
            Format::Network => {}
            Format::File => {
                let storage = storage_header(header);
                storage.write(&mut packet[..STORAGE_HEADER_LEN])?;
            }
            Format::Serial => packet[..SERIAL_MARKER.len()].copy_from_slice(&SERIAL_MARKER),
        }
        let mut offset = prefix;
        offset += standard.write(&mut packet[offset..])?;
        if extended {
            let extended = ExtendedHeader {
                msin: msin_bits,
                noar,
                app_id: if header.features.app_id() { id_to_u32(&header.app_id) } else { 0 },
                ctx_id: if header.features.ctx_id() { id_to_u32(&header.ctx_id) } else { 0 },
            };
            offset += extended.write(&mut packet[offset..])?;
        }
        packet[offset..].copy_from_slice(&payload);

        self.next_count = count.wrapping_add(1);
        trace!("Encoded line {} into {} bytes", header.line, packet.len());
        Ok(packet)
    }
}

/// MSIN, NOAR and payload of a normal line
fn encode_normal(line: &NormalLine, big_endian: bool) -> Result<(u8, u8, Vec<u8>)> {
    let header = &line.header;
    let dlt_type = if header.features.message_type() && header.dlt_type != DltType::Unknown {
        header.dlt_type
    } else {
        DltType::LogInfo
    };
    let noar = u8::try_from(line.args.len()).map_err(|_| {
        DecoderError::Usage(format!("{} arguments, at most 255 fit a packet", line.args.len()))
    })?;

    let mut writer = PayloadWriter::new(big_endian);
    if let (false, Some(message_id)) = (header.is_verbose(), line.message_id) {
        writer.u32(message_id);
        match line.args.as_slice() {
            [] => {}
            [DltArg::NonVerbose(data)] => writer.bytes(data),
            _ => {
                debug!("Message ID {} has decoded arguments", message_id);
                return Err(DecoderError::EncodeNotSupported(format!(
                    "non-verbose message {} with decoded arguments",
                    message_id
                )));
            }
        }
        return Ok((dlt_type.bits(), noar, writer.into_inner()));
    }

    for arg in &line.args {
        verbose::encode_arg(arg, &mut writer)?;
    }
    Ok((dlt_type.bits() | msin::VERBOSE, noar, writer.into_inner()))
}

/// Control and verbose lines need the extended header, as does any line
/// carrying an application ID, context ID or message type
fn needs_extended_header(line: &DltTraceLine, msin_bits: u8) -> bool {
    let features = line.features();
    !matches!(line, DltTraceLine::Normal(_))
        || msin_bits & msin::VERBOSE != 0
        || features.app_id()
        || features.ctx_id()
        || features.message_type()
}

fn standard_header(header: &LineHeader, count: u8, extended: bool) -> Result<StandardHeader> {
    let features = header.features;
    let mut header_type = htyp::VERSION_1;
    if extended {
        header_type |= htyp::USE_EXTENDED_HEADER;
    }
    if features.big_endian() {
        header_type |= htyp::MOST_SIGNIFICANT_BYTE;
    }
    if features.ecu_id() {
        header_type |= htyp::WITH_ECU_ID;
    }
    if features.session_id() {
        header_type |= htyp::WITH_SESSION_ID;
    }
    if features.device_timestamp() {
        header_type |= htyp::WITH_TIMESTAMP;
    }

    let timestamp = if features.device_timestamp() {
        let ticks = header.device_timestamp.as_micros() / DEVICE_TIME_RESOLUTION_US as u128;
        Some(u32::try_from(ticks).map_err(|_| {
            DecoderError::EncodeNotSupported(format!(
                "device timestamp {:?} exceeds the 32-bit tick counter",
                header.device_timestamp
            ))
        })?)
    } else {
        None
    };

    Ok(StandardHeader {
        htyp: header_type,
        count,
        length: 0,
        ecu_id: features.ecu_id().then(|| id_to_u32(&header.ecu_id)),
        session_id: features.session_id().then_some(header.session_id),
        timestamp,
    })
}

fn storage_header(header: &LineHeader) -> StorageHeader {
    let (seconds, microseconds) = if header.features.log_timestamp() {
        (
            header.timestamp.timestamp() as u32,
            header.timestamp.timestamp_subsec_micros(),
        )
    } else {
        (0, 0)
    };
    StorageHeader {
        seconds,
        microseconds,
        ecu_id: if header.features.ecu_id() { id_to_u32(&header.ecu_id) } else { 0 },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::LineBuilder;
    use crate::control::{ControlPayload, ControlRequest};
    use std::sync::Arc;
    use std::time::Duration;

    fn verbose_line(big_endian: bool) -> DltTraceLine {
        let mut builder = LineBuilder::new(false);
        builder
            .set_big_endian(big_endian)
            .set_app_id(Arc::from("APP1"))
            .set_ctx_id(Arc::from("CTX1"))
            .set_dlt_type(DltType::LogWarn)
            .set_verbose(true)
            .set_count(5)
            .add_arg(DltArg::string("hi"));
        builder.get_result().unwrap()
    }

    #[test]
    fn test_encode_verbose_little_endian() {
        let mut encoder = TraceEncoder::new();
        let mut buf = [0u8; 64];
        let len = encoder.encode(&mut buf, &verbose_line(false)).unwrap();
        assert_eq!(
            &buf[..len],
            &[
                0x21, 0x05, 0x00, 0x17, // HTYP, count, length 23
                0x31, 0x01, b'A', b'P', b'P', b'1', b'C', b'T', b'X', b'1', // extended header
                0x00, 0x02, 0x00, 0x00, 0x03, 0x00, b'h', b'i', 0x00, // string
            ]
        );
    }

    #[test]
    fn test_insufficient_buffer() {
        let mut encoder = TraceEncoder::new();
        let mut buf = [0xAAu8; 10];
        let err = encoder.encode(&mut buf, &verbose_line(true)).unwrap_err();
        assert!(matches!(
            err,
            DecoderError::InsufficientBuffer {
                needed: 23,
                available: 10
            }
        ));
        assert!(buf.iter().all(|&b| b == 0xAA));
    }

    #[test]
    fn test_standard_header_only() {
        let mut builder = LineBuilder::new(false);
        builder
            .set_ecu_id(Arc::from("ECU1"))
            .set_count(3)
            .set_message_id(1)
            .add_arg(DltArg::NonVerbose(vec![0x00, 0x12]));
        let line = builder.get_result().unwrap();

        let bytes = TraceEncoder::new().encode_to_vec(&line).unwrap();
        assert_eq!(
            bytes,
            [0x24, 0x03, 0x00, 0x0E, b'E', b'C', b'U', b'1', 0x01, 0x00, 0x00, 0x00, 0x00, 0x12]
        );
    }

    #[test]
    fn test_device_timestamp_out_of_range() {
        let mut builder = LineBuilder::new(false);
        builder
            .set_verbose(true)
            .set_dlt_type(DltType::LogInfo)
            .set_device_timestamp(Duration::from_secs(500_000));
        let line = builder.get_result().unwrap();

        let mut encoder = TraceEncoder::new();
        let err = encoder.encode_to_vec(&line).unwrap_err();
        assert!(matches!(err, DecoderError::EncodeNotSupported(_)));

        builder
            .set_verbose(true)
            .set_dlt_type(DltType::LogInfo)
            .set_device_timestamp(Duration::from_secs(429_000));
        let line = builder.get_result().unwrap();
        assert!(encoder.encode_to_vec(&line).is_ok());
    }

    #[test]
    fn test_running_count() {
        let mut builder = LineBuilder::new(false);
        builder.set_verbose(true).set_dlt_type(DltType::LogInfo);
        let line = builder.get_result().unwrap();

        let mut encoder = TraceEncoder::new();
        let first = encoder.encode_to_vec(&line).unwrap();
        let second = encoder.encode_to_vec(&line).unwrap();
        assert_eq!(first[1], 0);
        assert_eq!(second[1], 1);
    }

    #[test]
    fn test_control_line() {
        let mut builder = LineBuilder::new(false);
        builder
            .set_dlt_type(DltType::ControlRequest)
            .set_app_id(Arc::from("APP"))
            .set_ctx_id(Arc::from("CON"))
            .set_control_payload(ControlPayload::Request(ControlRequest::Query {
                service_id: 0x13,
            }));
        let line = builder.get_result().unwrap();

        let bytes = TraceEncoder::new().encode_to_vec(&line).unwrap();
        assert_eq!(bytes[4], 0x16); // MSIN control request, non-verbose
        assert_eq!(bytes[5], 0); // NOAR
        assert_eq!(&bytes[14..], &[0x13, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_skipped_not_encodable() {
        let mut builder = LineBuilder::new(false);
        builder.add_skipped_bytes(3, "test");
        let line = builder.get_skipped_result();
        let err = TraceEncoder::new().encode_to_vec(&line).unwrap_err();
        assert!(matches!(err, DecoderError::EncodeNotSupported(_)));
    }

    #[test]
    fn test_serial_and_file_prefix() {
        let line = verbose_line(false);
        let serial = TraceEncoder::with_format(Format::Serial).encode_to_vec(&line).unwrap();
        assert_eq!(&serial[..4], b"DLS\x01");
        assert_eq!(serial.len(), 4 + 23);

        let file = TraceEncoder::with_format(Format::File).encode_to_vec(&line).unwrap();
        assert_eq!(&file[..4], b"DLT\x01");
        assert_eq!(file.len(), 16 + 23);
    }
}
