//! Stream decoder
//!
//! [`TraceDecoder`] turns a byte stream into [`DltTraceLine`]s. It finds the
//! start of each packet according to the capture [`Format`], validates the
//! standard header, and hands the payload to the verbose, non-verbose or
//! control codec. Bytes that cannot be decoded are never an error: they are
//! counted and reported as a [`DltTraceLine::Skipped`] line that precedes the
//! next good line, so the bytes of all returned lines always add up to the
//! input.

use crate::builder::LineBuilder;
use crate::config::DecoderConfig;
use crate::control::ControlCodec;
use crate::dlt_type::DltType;
use crate::header::{
    ExtendedHeader, StandardHeader, StorageHeader, DEVICE_TIME_RESOLUTION_US, EXTENDED_HEADER_LEN,
    SERIAL_MARKER, STANDARD_HEADER_LEN, STORAGE_HEADER_LEN, STORAGE_MARKER,
};
use crate::id_cache::IdCache;
use crate::line::DltTraceLine;
use crate::nonverbose::{DefaultFrameMap, FrameMap, NonVerboseCodec};
use crate::types::{DecoderError, Result};
use crate::verbose;
use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Skip reasons reported on skipped lines
pub mod reason {
    pub const SEARCHING: &str = "Searching for next packet";
    pub const INVALID_HEADER: &str = "Invalid packet standard header";
    pub const INVALID_PACKET: &str = "Invalid packet";
    pub const INCOMPLETE: &str = "Incomplete packet at end of stream";
    pub const END_OF_STREAM: &str = "End of stream";
}

/// Trailing bytes a control payload may carry beyond its encoded length
const MAX_CONTROL_PADDING: usize = 32;

/// Framing of packets in a byte stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// Bare packets, as received over TCP or UDP
    Network,
    /// Capture file: every packet follows a 16-byte storage header
    #[default]
    File,
    /// Serial link: every packet follows a `DLS\x01` marker
    Serial,
}

impl Format {
    /// Bytes that must open every packet, if any
    pub fn marker(self) -> Option<[u8; 4]> {
        match self {
            Format::Network => None,
            Format::File => Some(STORAGE_MARKER),
            Format::Serial => Some(SERIAL_MARKER),
        }
    }

    /// Offset of the standard header from the packet start
    pub fn header_offset(self) -> usize {
        match self {
            Format::Network => 0,
            Format::File => STORAGE_HEADER_LEN,
            Format::Serial => SERIAL_MARKER.len(),
        }
    }

    /// Bytes dropped when a packet start turns out to be invalid
    pub fn min_discard(self) -> usize {
        match self {
            Format::Network => 1,
            Format::File | Format::Serial => 4,
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Format::Network => "network",
            Format::File => "file",
            Format::Serial => "serial",
        })
    }
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "network" | "net" | "tcp" => Ok(Format::Network),
            "file" | "dlt" => Ok(Format::File),
            "serial" | "ser" => Ok(Format::Serial),
            other => Err(format!("unknown capture format '{}'", other)),
        }
    }
}

/// Outcome of one [`TraceDecoder::decode_line`] call
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeStep {
    /// A line was produced; `consumed` bytes of the input are done with
    Line { consumed: usize, line: DltTraceLine },
    /// No complete packet is buffered. `consumed` bytes were skipped and can
    /// be dropped; call again with more data appended to the rest.
    NeedMore { consumed: usize },
}

/// Decodes a DLT byte stream into trace lines
#[derive(Debug)]
pub struct TraceDecoder {
    format: Format,
    builder: LineBuilder,
    nonverbose: NonVerboseCodec,
    control: ControlCodec,
    /// Line held back while the skipped line before it is returned
    pending: Option<DltTraceLine>,
    /// Unconsumed bytes of the streaming API
    cache: Vec<u8>,
    /// Stream position of `cache[0]`
    position: u64,
}

impl TraceDecoder {
    /// Creates a decoder with the standard wire types and control services
    /// and no frame map
    pub fn new(format: Format) -> Self {
        Self {
            format,
            builder: LineBuilder::new(false),
            nonverbose: NonVerboseCodec::new(),
            control: ControlCodec::new(),
            pending: None,
            cache: Vec::new(),
            position: 0,
        }
    }

    /// Stamps lines with the wall clock instead of storage header time
    pub fn with_online(mut self, online: bool) -> Self {
        self.builder = LineBuilder::new(online);
        self
    }

    pub fn with_frame_map(mut self, frame_map: Arc<dyn FrameMap>) -> Self {
        self.nonverbose.set_frame_map(Some(frame_map));
        self
    }

    /// Builds a decoder from configuration, loading the frame map if one is
    /// configured
    pub fn from_config(config: &DecoderConfig) -> Result<Self> {
        let mut decoder = Self::new(config.format).with_online(config.online);
        if let Some(path) = &config.frame_map {
            let map = DefaultFrameMap::load_json(path)?;
            decoder = decoder.with_frame_map(Arc::new(map));
        }
        debug!(
            "Created {} decoder (online: {}, frame map: {})",
            config.format,
            config.online,
            config.frame_map.is_some()
        );
        Ok(decoder)
    }

    pub fn format(&self) -> Format {
        self.format
    }

    /// Non-verbose registry, for adding or removing wire types
    pub fn nonverbose_mut(&mut self) -> &mut NonVerboseCodec {
        &mut self.nonverbose
    }

    /// Control service registry, for adding or removing services
    pub fn control_mut(&mut self) -> &mut ControlCodec {
        &mut self.control
    }

    /// Decodes at most one line from `buf`
    ///
    /// # Arguments
    /// * `buf` - unconsumed input
    /// * `position` - stream position of `buf[0]`, stored on the lines
    /// * `flush` - no more data follows; incomplete packets become skipped
    ///   bytes instead of a [`DecodeStep::NeedMore`]
    pub fn decode_line(&mut self, buf: &[u8], position: u64, flush: bool) -> DecodeStep {
        if let Some(line) = self.pending.take() {
            return DecodeStep::Line { consumed: 0, line };
        }

        let header_offset = self.format.header_offset();
        let min_discard = self.format.min_discard();
        let mut offset = 0;

        loop {
            let rest = &buf[offset..];
            let pos = position + offset as u64;

            if rest.len() < header_offset + STANDARD_HEADER_LEN {
                if flush {
                    self.skip(rest.len(), pos, reason::END_OF_STREAM, None);
                    offset = buf.len();
                    if self.builder.skipped_bytes() > 0 {
                        let line = self.builder.get_skipped_result();
                        return DecodeStep::Line { consumed: offset, line };
                    }
                }
                return DecodeStep::NeedMore { consumed: offset };
            }

            if let Some(marker) = self.format.marker() {
                let discard = match rest.windows(marker.len()).position(|w| w == marker) {
                    Some(0) => 0,
                    Some(found) => found,
                    None => rest.len() - partial_marker(rest, &marker),
                };
                if discard > 0 {
                    self.skip(discard, pos, reason::SEARCHING, None);
                    offset += discard;
                    continue;
                }
            }

            let length = match StandardHeader::validate(&rest[header_offset..]) {
                Ok(length) => length,
                Err(e) => {
                    self.skip(min_discard, pos, reason::INVALID_HEADER, Some(&e));
                    offset += min_discard;
                    continue;
                }
            };

            let total = header_offset + length;
            if rest.len() < total {
                if flush {
                    self.skip(min_discard, pos, reason::INCOMPLETE, None);
                    offset += min_discard;
                    continue;
                }
                return DecodeStep::NeedMore { consumed: offset };
            }

            let line = self.decode_packet(&rest[..total], pos);
            match line {
                Ok(mut line) => {
                    offset += total;
                    if self.builder.skipped_bytes() > 0 {
                        // The skipped line goes first, so it takes the lower number
                        let mut skipped = self.builder.get_skipped_result();
                        let number = line.header().line;
                        line.header_mut().line = skipped.header().line;
                        skipped.header_mut().line = number;
                        self.pending = Some(line);
                        return DecodeStep::Line {
                            consumed: offset,
                            line: skipped,
                        };
                    }
                    return DecodeStep::Line { consumed: offset, line };
                }
                Err(e) => {
                    self.builder.reset();
                    self.skip(min_discard, pos, reason::INVALID_PACKET, Some(&e));
                    offset += min_discard;
                }
            }
        }
    }

    /// Appends `data` to the internal buffer and decodes every complete line
    pub fn decode(&mut self, data: &[u8]) -> Vec<DltTraceLine> {
        self.cache.extend_from_slice(data);
        self.drain(false)
    }

    /// Decodes what is left at the end of a stream
    ///
    /// Incomplete data is reported as skipped bytes. The decoder can be used
    /// for a new stream afterwards; positions continue from the old one.
    pub fn flush(&mut self) -> Vec<DltTraceLine> {
        self.drain(true)
    }

    /// Decodes a complete stream: [`decode`](Self::decode) followed by
    /// [`flush`](Self::flush)
    pub fn decode_all(&mut self, data: &[u8]) -> Vec<DltTraceLine> {
        let mut lines = self.decode(data);
        lines.extend(self.flush());
        lines
    }

    fn drain(&mut self, flush: bool) -> Vec<DltTraceLine> {
        let mut cache = std::mem::take(&mut self.cache);
        let mut lines = Vec::new();
        let mut start = 0;
        loop {
            match self.decode_line(&cache[start..], self.position, flush) {
                DecodeStep::Line { consumed, line } => {
                    start += consumed;
                    self.position += consumed as u64;
                    lines.push(line);
                }
                DecodeStep::NeedMore { consumed } => {
                    start += consumed;
                    self.position += consumed as u64;
                    break;
                }
            }
        }
        cache.drain(..start);
        self.cache = cache;
        lines
    }

    fn skip(&mut self, bytes: usize, position: u64, why: &str, error: Option<&DecoderError>) {
        if bytes == 0 {
            return;
        }
        if self.builder.skipped_bytes() == 0 {
            self.builder.set_position(position);
            match error {
                Some(e) => warn!("{} at position {}: {}", why, position, e),
                None => trace!("{} at position {}", why, position),
            }
        }
        self.builder.add_skipped_bytes(bytes, why);
    }

    /// Decodes one framed packet, storage header or serial marker included
    fn decode_packet(&mut self, packet: &[u8], position: u64) -> Result<DltTraceLine> {
        self.builder.set_position(position);

        if self.format == Format::File {
            let storage = StorageHeader::parse(packet)?;
            self.builder
                .set_timestamp_parts(storage.seconds, storage.microseconds)
                .set_storage_header_ecu_id(IdCache::global().parse_id(storage.ecu_id));
        }

        self.parse_packet(&packet[self.format.header_offset()..])?;
        let line = self.builder.get_result()?;
        self.builder.reset();
        trace!("Decoded line {} at position {}", line.line_number(), position);
        Ok(line)
    }

    fn parse_packet(&mut self, packet: &[u8]) -> Result<()> {
        let ids = IdCache::global();
        let header = StandardHeader::parse(packet)?;
        let big_endian = header.is_big_endian();

        let builder = &mut self.builder;
        builder.set_big_endian(big_endian).set_count(header.count);
        if let Some(ecu_id) = header.ecu_id {
            builder.set_ecu_id(ids.parse_id(ecu_id));
        }
        if let Some(session_id) = header.session_id {
            builder.set_session_id(session_id);
        }
        if let Some(ticks) = header.timestamp {
            builder.set_device_timestamp(Duration::from_micros(
                ticks as u64 * DEVICE_TIME_RESOLUTION_US,
            ));
        }

        let mut offset = header.header_len();
        let mut verbose = false;
        let mut noar = 0;
        if header.has_extended_header() {
            let extended = ExtendedHeader::parse(&packet[offset..])?;
            offset += EXTENDED_HEADER_LEN;
            verbose = extended.is_verbose();
            noar = extended.noar;
            builder
                .set_verbose(verbose)
                .set_dlt_type(DltType::from_msin(extended.msin))
                .set_number_of_args(noar)
                .set_app_id(ids.parse_id(extended.app_id))
                .set_ctx_id(ids.parse_id(extended.ctx_id));
        }

        let payload = &packet[offset..];
        let dlt_type = builder.dlt_type();
        if dlt_type.is_control() {
            let (control, consumed) = self.control.decode(dlt_type, payload, big_endian)?;
            if payload.len() > consumed + MAX_CONTROL_PADDING {
                return Err(DecoderError::invalid(format!(
                    "control payload of {} bytes, decoded {}",
                    payload.len(),
                    consumed
                )));
            }
            builder.set_control_payload(control);
        } else if verbose {
            let (args, consumed) = verbose::decode_args(payload, noar, big_endian);
            if consumed != payload.len() {
                return Err(DecoderError::invalid(format!(
                    "verbose payload of {} bytes, {} arguments used {}",
                    payload.len(),
                    noar,
                    consumed
                )));
            }
            builder.add_args(args);
        } else {
            self.nonverbose.decode(payload, builder);
        }
        Ok(())
    }
}

/// Length of the longest proper prefix of `marker` that ends `buf`
fn partial_marker(buf: &[u8], marker: &[u8]) -> usize {
    (1..marker.len())
        .rev()
        .find(|&len| buf.ends_with(&marker[..len]))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::DltArg;

    /// Network packet: little endian, extended header, verbose log info,
    /// one uint8 argument
    fn verbose_packet(value: u8) -> Vec<u8> {
        vec![
            0x21, 0x00, 0x00, 0x13, // HTYP, count, length 19
            0x41, 0x01, // MSIN log info verbose, NOAR 1
            b'A', b'P', b'P', b'1', b'C', b'T', b'X', b'1', // app, ctx
            0x41, 0x00, 0x00, 0x00, value, // uint8
        ]
    }

    fn storage_header() -> Vec<u8> {
        let mut header = STORAGE_MARKER.to_vec();
        header.extend_from_slice(&10u32.to_le_bytes());
        header.extend_from_slice(&500u32.to_le_bytes());
        header.extend_from_slice(b"ECU1");
        header
    }

    #[test]
    fn test_format_properties() {
        assert_eq!(Format::Network.header_offset(), 0);
        assert_eq!(Format::File.min_discard(), 4);
        assert_eq!(Format::Serial.marker(), Some(*b"DLS\x01"));
        assert_eq!("serial".parse::<Format>(), Ok(Format::Serial));
        assert!("pcap".parse::<Format>().is_err());
    }

    #[test]
    fn test_partial_marker() {
        assert_eq!(partial_marker(b"xxDL", b"DLT\x01"), 2);
        assert_eq!(partial_marker(b"xxDLT", b"DLT\x01"), 3);
        assert_eq!(partial_marker(b"xxx", b"DLT\x01"), 0);
    }

    #[test]
    fn test_decode_network_packet() {
        let mut decoder = TraceDecoder::new(Format::Network);
        let packet = verbose_packet(42);
        match decoder.decode_line(&packet, 0, false) {
            DecodeStep::Line { consumed, line } => {
                assert_eq!(consumed, packet.len());
                assert_eq!(line.args(), &[DltArg::from(42u8)]);
                assert_eq!(line.header().app_id.as_ref(), "APP1");
                assert_eq!(line.header().dlt_type, DltType::LogInfo);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_need_more() {
        let mut decoder = TraceDecoder::new(Format::Network);
        let packet = verbose_packet(1);
        assert_eq!(
            decoder.decode_line(&packet[..10], 0, false),
            DecodeStep::NeedMore { consumed: 0 }
        );
    }

    #[test]
    fn test_garbage_before_packet() {
        let mut decoder = TraceDecoder::new(Format::Network);
        let mut data = vec![0xFF, 0xFF];
        data.extend(verbose_packet(7));

        let lines = decoder.decode_all(&data);
        assert_eq!(lines.len(), 2);
        match &lines[0] {
            DltTraceLine::Skipped(skipped) => {
                assert_eq!(skipped.bytes, 2);
                assert_eq!(skipped.reason.as_deref(), Some(reason::INVALID_HEADER));
            }
            other => panic!("expected skipped line, got {:?}", other),
        }
        assert_eq!(lines[1].args(), &[DltArg::from(7u8)]);
        assert_eq!(lines[1].position(), 2);
        assert_eq!(lines[0].line_number() + 1, lines[1].line_number());
    }

    #[test]
    fn test_file_format_storage_header() {
        let mut decoder = TraceDecoder::new(Format::File);
        let mut data = storage_header();
        data.extend(verbose_packet(3));

        let lines = decoder.decode_all(&data);
        assert_eq!(lines.len(), 1);
        let header = lines[0].header();
        assert!(header.features.log_timestamp());
        assert_eq!(header.timestamp.timestamp(), 10);
        assert_eq!(header.timestamp.timestamp_subsec_micros(), 500);
        assert_eq!(header.ecu_id.as_ref(), "ECU1");
        assert!(!header.features.ecu_id());
    }

    #[test]
    fn test_file_format_searching() {
        let mut decoder = TraceDecoder::new(Format::File);
        let mut data = b"garbage".to_vec();
        data.extend(storage_header());
        data.extend(verbose_packet(3));

        let lines = decoder.decode_all(&data);
        assert_eq!(lines.len(), 2);
        match &lines[0] {
            DltTraceLine::Skipped(skipped) => {
                assert_eq!(skipped.bytes, 7);
                assert_eq!(skipped.reason.as_deref(), Some(reason::SEARCHING));
            }
            other => panic!("expected skipped line, got {:?}", other),
        }
    }

    #[test]
    fn test_streaming_split_packet() {
        let mut decoder = TraceDecoder::new(Format::Network);
        let packet = verbose_packet(9);
        assert!(decoder.decode(&packet[..5]).is_empty());
        let lines = decoder.decode(&packet[5..]);
        assert_eq!(lines.len(), 1);
        assert!(decoder.flush().is_empty());
    }

    #[test]
    fn test_flush_incomplete() {
        let mut decoder = TraceDecoder::new(Format::Network);
        let packet = verbose_packet(9);
        assert!(decoder.decode(&packet[..12]).is_empty());
        let lines = decoder.flush();
        let skipped: u64 = lines
            .iter()
            .map(|line| match line {
                DltTraceLine::Skipped(skipped) => skipped.bytes,
                _ => 0,
            })
            .sum();
        assert_eq!(skipped, 12);
    }

    #[test]
    fn test_verbose_argument_count_mismatch() {
        let mut decoder = TraceDecoder::new(Format::Network);
        let mut packet = verbose_packet(1);
        // NOAR 0 leaves the argument bytes unused
        packet[5] = 0;
        let lines = decoder.decode_all(&packet);
        assert!(lines.iter().all(|line| line.is_skipped()));
    }
}
