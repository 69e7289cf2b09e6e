//! Line builder: accumulates header and argument state for one line at a time
//!
//! The stream decoder feeds the builder field by field while it walks the
//! headers and payload of a packet, then asks for an immutable
//! [`DltTraceLine`]. Between packets the builder is reset. The byte order and
//! the last logger timestamp are stream properties and survive a reset; all
//! other fields are per line.

use crate::args::DltArg;
use crate::control::ControlPayload;
use crate::dlt_type::DltType;
use crate::features::LineFeatures;
use crate::line::{ControlLine, DltTraceLine, LineHeader, NormalLine, SkippedLine};
use crate::types::{default_timestamp, DecoderError, Result, Timestamp};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

/// Mutable accumulator for a single trace line
#[derive(Debug)]
pub struct LineBuilder {
    online: bool,
    features: LineFeatures,
    ecu_id: Arc<str>,
    app_id: Arc<str>,
    ctx_id: Arc<str>,
    last_ecu_id: Arc<str>,
    count: Option<u8>,
    device_timestamp: Duration,
    session_id: u32,
    timestamp: Timestamp,
    dlt_type: DltType,
    position: u64,
    message_id: Option<u32>,
    number_of_args: u8,
    args: Vec<DltArg>,
    control_payload: Option<ControlPayload>,
    line: u64,

    skipped_bytes: u64,
    skipped_reason: Option<String>,
    skipped_timestamp: Timestamp,
    skipped_timestamp_valid: bool,
    skipped_device_timestamp: Duration,
    skipped_position: u64,
}

impl LineBuilder {
    /// Creates a builder
    ///
    /// # Arguments
    /// * `online` - stamp every line with the wall clock at the moment it is
    ///   produced, for live captures
    pub fn new(online: bool) -> Self {
        let empty: Arc<str> = Arc::from("");
        let timestamp = if online { Utc::now() } else { default_timestamp() };
        let mut builder = Self {
            online,
            features: LineFeatures::NONE,
            ecu_id: Arc::clone(&empty),
            app_id: Arc::clone(&empty),
            ctx_id: Arc::clone(&empty),
            last_ecu_id: empty,
            count: None,
            device_timestamp: Duration::ZERO,
            session_id: 0,
            timestamp,
            dlt_type: DltType::Unknown,
            position: 0,
            message_id: None,
            number_of_args: 0,
            args: Vec::new(),
            control_payload: None,
            line: 0,
            skipped_bytes: 0,
            skipped_reason: None,
            skipped_timestamp: timestamp,
            skipped_timestamp_valid: false,
            skipped_device_timestamp: Duration::ZERO,
            skipped_position: 0,
        };
        builder.reset();
        builder
    }

    /// Clears per-line state, keeping the byte order and the last timestamp value
    pub fn reset(&mut self) {
        let mut features = LineFeatures::NONE.with(LineFeatures::BIG_ENDIAN, self.features.big_endian());
        if self.online {
            features |= LineFeatures::LOG_TIMESTAMP;
        }
        self.features = features;

        let empty: Arc<str> = Arc::from("");
        self.last_ecu_id = std::mem::replace(&mut self.ecu_id, Arc::clone(&empty));
        self.app_id = Arc::clone(&empty);
        self.ctx_id = empty;
        self.count = None;
        self.device_timestamp = Duration::ZERO;
        self.session_id = 0;
        self.dlt_type = DltType::Unknown;
        self.position = 0;
        self.message_id = None;
        self.number_of_args = 0;
        self.args.clear();
        self.control_payload = None;
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    pub fn features(&self) -> LineFeatures {
        self.features
    }

    pub fn ecu_id(&self) -> &str {
        &self.ecu_id
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn ctx_id(&self) -> &str {
        &self.ctx_id
    }

    pub fn count(&self) -> Option<u8> {
        self.count
    }

    pub fn device_timestamp(&self) -> Duration {
        self.device_timestamp
    }

    pub fn session_id(&self) -> u32 {
        self.session_id
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn dlt_type(&self) -> DltType {
        self.dlt_type
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn message_id(&self) -> Option<u32> {
        self.message_id
    }

    pub fn number_of_args(&self) -> u8 {
        self.number_of_args
    }

    pub fn args(&self) -> &[DltArg] {
        &self.args
    }

    pub fn control_payload(&self) -> Option<&ControlPayload> {
        self.control_payload.as_ref()
    }

    pub fn is_big_endian(&self) -> bool {
        self.features.big_endian()
    }

    pub fn is_verbose(&self) -> bool {
        self.features.verbose()
    }

    /// Sequence number the next produced line will get
    pub fn line(&self) -> u64 {
        self.line
    }

    /// ECU ID from a storage header; only used when the standard header has none
    pub fn set_storage_header_ecu_id(&mut self, id: Arc<str>) -> &mut Self {
        if !self.features.ecu_id() {
            self.ecu_id = id;
        }
        self
    }

    pub fn set_ecu_id(&mut self, id: Arc<str>) -> &mut Self {
        self.ecu_id = id;
        self.features |= LineFeatures::ECU_ID;
        self
    }

    pub fn set_app_id(&mut self, id: Arc<str>) -> &mut Self {
        self.app_id = id;
        self.features |= LineFeatures::APP_ID;
        self
    }

    pub fn set_ctx_id(&mut self, id: Arc<str>) -> &mut Self {
        self.ctx_id = id;
        self.features |= LineFeatures::CTX_ID;
        self
    }

    /// Message counter; a counter is not an optional header field, so no feature is set
    pub fn set_count(&mut self, count: u8) -> &mut Self {
        self.count = Some(count);
        self
    }

    pub fn set_device_timestamp(&mut self, duration: Duration) -> &mut Self {
        self.device_timestamp = duration;
        self.features |= LineFeatures::DEVICE_TIMESTAMP;
        self
    }

    pub fn set_dlt_type(&mut self, dlt_type: DltType) -> &mut Self {
        self.dlt_type = dlt_type;
        self.features |= LineFeatures::MESSAGE_TYPE;
        self
    }

    pub fn set_verbose(&mut self, verbose: bool) -> &mut Self {
        self.features = self.features.with(LineFeatures::VERBOSE, verbose);
        self
    }

    pub fn set_big_endian(&mut self, big_endian: bool) -> &mut Self {
        self.features = self.features.with(LineFeatures::BIG_ENDIAN, big_endian);
        self
    }

    pub fn set_session_id(&mut self, id: u32) -> &mut Self {
        self.session_id = id;
        self.features |= LineFeatures::SESSION_ID;
        self
    }

    /// Logger timestamp from a storage header (seconds and microseconds since the epoch)
    pub fn set_timestamp_parts(&mut self, seconds: u32, microseconds: u32) -> &mut Self {
        let timestamp = DateTime::from_timestamp(seconds as i64, 0)
            .map(|t| t + chrono::Duration::microseconds(microseconds as i64))
            .unwrap_or_else(default_timestamp);
        self.set_timestamp(timestamp)
    }

    pub fn set_timestamp(&mut self, timestamp: Timestamp) -> &mut Self {
        self.timestamp = timestamp;
        self.features |= LineFeatures::LOG_TIMESTAMP;
        self
    }

    pub fn set_position(&mut self, position: u64) -> &mut Self {
        self.position = position;
        self
    }

    pub fn set_message_id(&mut self, id: u32) -> &mut Self {
        self.message_id = Some(id);
        self
    }

    pub fn set_number_of_args(&mut self, count: u8) -> &mut Self {
        self.number_of_args = count;
        self
    }

    pub fn add_arg(&mut self, arg: DltArg) -> &mut Self {
        self.args.push(arg);
        self
    }

    pub fn add_args(&mut self, args: impl IntoIterator<Item = DltArg>) -> &mut Self {
        self.args.extend(args);
        self
    }

    pub fn set_control_payload(&mut self, payload: ControlPayload) -> &mut Self {
        self.control_payload = Some(payload);
        self
    }

    /// Bytes skipped since the last skipped line was produced
    pub fn skipped_bytes(&self) -> u64 {
        self.skipped_bytes
    }

    /// Records skipped bytes
    ///
    /// The first call after a skipped line was produced takes a snapshot of
    /// the current timestamp (or the wall clock, if online), the device
    /// timestamp, the position and the reason. A count of zero is ignored.
    pub fn add_skipped_bytes(&mut self, bytes: usize, reason: &str) {
        if bytes == 0 {
            return;
        }

        if self.skipped_bytes == 0 {
            if self.online {
                self.skipped_timestamp = Utc::now();
                self.skipped_timestamp_valid = true;
            } else {
                self.skipped_timestamp = self.timestamp;
                self.skipped_timestamp_valid = self.features.log_timestamp();
            }
            self.skipped_device_timestamp = self.device_timestamp;
            self.skipped_position = self.position;
            self.skipped_reason = Some(reason.to_string());
        }
        self.skipped_bytes += bytes as u64;
    }

    /// Produces the line accumulated since the last reset
    ///
    /// # Returns
    /// * `Err(DecoderError::UndefinedControlPayload)` - the message type is a
    ///   control type but no control payload was set
    pub fn get_result(&mut self) -> Result<DltTraceLine> {
        if self.dlt_type.is_control() {
            let payload = self.control_payload.take().ok_or_else(|| {
                DecoderError::UndefinedControlPayload(self.dlt_type.description().to_string())
            })?;
            let header = self.next_header();
            return Ok(DltTraceLine::Control(ControlLine { header, payload }));
        }

        debug_assert!(
            !self.features.verbose() || self.features.message_type(),
            "verbose line without a message type"
        );

        let header = self.next_header();
        Ok(DltTraceLine::Normal(NormalLine {
            header,
            message_id: self.message_id,
            args: std::mem::take(&mut self.args),
        }))
    }

    /// Produces a line describing the bytes skipped so far and clears the counter
    pub fn get_skipped_result(&mut self) -> DltTraceLine {
        let mut features = LineFeatures::ECU_ID
            | LineFeatures::APP_ID
            | LineFeatures::CTX_ID
            | LineFeatures::VERBOSE
            | LineFeatures::MESSAGE_TYPE;
        if self.skipped_timestamp_valid {
            features |= LineFeatures::LOG_TIMESTAMP;
        }

        let skip_id: Arc<str> = Arc::from(SkippedLine::ID);
        let header = LineHeader {
            features,
            ecu_id: Arc::clone(&self.last_ecu_id),
            app_id: Arc::clone(&skip_id),
            ctx_id: skip_id,
            count: None,
            device_timestamp: self.skipped_device_timestamp,
            session_id: 0,
            timestamp: self.skipped_timestamp,
            dlt_type: DltType::LogWarn,
            line: self.line,
            position: self.skipped_position,
        };
        self.line += 1;

        let line = SkippedLine {
            header,
            bytes: self.skipped_bytes,
            reason: self.skipped_reason.take(),
        };
        self.skipped_bytes = 0;
        DltTraceLine::Skipped(line)
    }

    fn next_header(&mut self) -> LineHeader {
        let timestamp = if self.online {
            self.features |= LineFeatures::LOG_TIMESTAMP;
            Utc::now()
        } else {
            self.timestamp
        };

        let header = LineHeader {
            features: self.features,
            ecu_id: Arc::clone(&self.ecu_id),
            app_id: Arc::clone(&self.app_id),
            ctx_id: Arc::clone(&self.ctx_id),
            count: self.count,
            device_timestamp: self.device_timestamp,
            session_id: self.session_id,
            timestamp,
            dlt_type: self.dlt_type,
            line: self.line,
            position: self.position,
        };
        self.line += 1;
        header
    }
}

impl Default for LineBuilder {
    fn default() -> Self {
        Self::new(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{ControlPayload, ControlRequest};

    #[test]
    fn test_reset_keeps_big_endian_and_timestamp() {
        let mut builder = LineBuilder::new(false);
        builder
            .set_big_endian(true)
            .set_timestamp_parts(1_600_000_000, 500)
            .set_ecu_id(Arc::from("ECU1"))
            .set_app_id(Arc::from("APP1"))
            .set_session_id(7)
            .set_count(3);
        builder.reset();

        assert!(builder.is_big_endian());
        assert!(!builder.features().log_timestamp());
        assert_eq!(builder.timestamp().timestamp(), 1_600_000_000);
        assert_eq!(builder.ecu_id(), "");
        assert_eq!(builder.app_id(), "");
        assert_eq!(builder.count(), None);
        assert_eq!(builder.session_id(), 0);
        assert_eq!(builder.features(), LineFeatures::BIG_ENDIAN);
    }

    #[test]
    fn test_storage_header_ecu_id_does_not_override() {
        let mut builder = LineBuilder::new(false);
        builder.set_storage_header_ecu_id(Arc::from("STOR"));
        assert_eq!(builder.ecu_id(), "STOR");
        assert!(!builder.features().ecu_id());

        builder.set_ecu_id(Arc::from("ECU1"));
        builder.set_storage_header_ecu_id(Arc::from("STOR"));
        assert_eq!(builder.ecu_id(), "ECU1");
    }

    #[test]
    fn test_get_result_builds_normal_line() {
        let mut builder = LineBuilder::new(false);
        builder
            .set_dlt_type(DltType::LogInfo)
            .set_verbose(true)
            .set_app_id(Arc::from("APP1"))
            .add_arg("hello".into());
        let line = builder.get_result().unwrap();
        assert_eq!(line.line_number(), 0);
        assert_eq!(line.text(), "hello");
        assert_eq!(&*line.header().app_id, "APP1");
        assert!(line.features().verbose());

        builder.reset();
        builder.set_dlt_type(DltType::LogWarn).set_verbose(true);
        assert_eq!(builder.get_result().unwrap().line_number(), 1);
    }

    #[test]
    fn test_control_result_requires_payload() {
        let mut builder = LineBuilder::new(false);
        builder.set_dlt_type(DltType::ControlRequest);
        assert!(matches!(
            builder.get_result(),
            Err(DecoderError::UndefinedControlPayload(_))
        ));

        builder.set_control_payload(ControlPayload::Request(ControlRequest::Query { service_id: 0x05 }));
        let line = builder.get_result().unwrap();
        assert!(matches!(line, DltTraceLine::Control(_)));
    }

    #[test]
    fn test_skipped_bytes_snapshot_on_first_call() {
        let mut builder = LineBuilder::new(false);
        builder.set_timestamp_parts(100, 0).set_position(40);
        builder.add_skipped_bytes(0, "ignored");
        assert_eq!(builder.skipped_bytes(), 0);

        builder.add_skipped_bytes(3, "Searching for next packet");
        builder.set_timestamp_parts(200, 0).set_position(50);
        builder.add_skipped_bytes(4, "Invalid packet");
        assert_eq!(builder.skipped_bytes(), 7);

        let line = builder.get_skipped_result();
        assert_eq!(builder.skipped_bytes(), 0);
        match line {
            DltTraceLine::Skipped(skipped) => {
                assert_eq!(skipped.bytes, 7);
                assert_eq!(skipped.reason.as_deref(), Some("Searching for next packet"));
                assert_eq!(skipped.header.timestamp.timestamp(), 100);
                assert_eq!(skipped.header.position, 40);
                assert_eq!(&*skipped.header.app_id, "SKIP");
                assert_eq!(skipped.header.dlt_type, DltType::LogWarn);
                assert_eq!(skipped.header.count, None);
            }
            other => panic!("expected skipped line, got {:?}", other),
        }
    }

    #[test]
    fn test_skipped_line_uses_last_ecu_id() {
        let mut builder = LineBuilder::new(false);
        builder.set_ecu_id(Arc::from("ECU1"));
        builder.reset();
        builder.add_skipped_bytes(1, "Invalid packet");
        assert_eq!(&*builder.get_skipped_result().header().ecu_id, "ECU1");
    }

    #[test]
    fn test_online_builder_stamps_now() {
        let before = Utc::now();
        let mut builder = LineBuilder::new(true);
        builder.set_dlt_type(DltType::LogInfo).set_verbose(true);
        let line = builder.get_result().unwrap();
        assert!(line.features().log_timestamp());
        assert!(line.header().timestamp >= before);
    }
}
