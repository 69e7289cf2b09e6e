//! Trace line records produced by the decoder
//!
//! A line is created by the [`LineBuilder`](crate::builder::LineBuilder) and is
//! immutable afterwards. Every variant carries the same [`LineHeader`]; the
//! [`LineFeatures`] in that header decide which header fields are meaningful.

use crate::args::DltArg;
use crate::control::ControlPayload;
use crate::dlt_type::DltType;
use crate::features::LineFeatures;
use crate::types::{default_timestamp, Timestamp};
use chrono::Local;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Header metadata shared by every trace line variant
#[derive(Debug, Clone)]
pub struct LineHeader {
    pub features: LineFeatures,
    pub ecu_id: Arc<str>,
    pub app_id: Arc<str>,
    pub ctx_id: Arc<str>,
    /// Message counter, `None` when the line has none
    pub count: Option<u8>,
    /// Time since device start, 0.1 ms resolution
    pub device_timestamp: Duration,
    pub session_id: u32,
    /// Logger (capture) time
    pub timestamp: Timestamp,
    pub dlt_type: DltType,
    /// Sequence number assigned by the builder
    pub line: u64,
    /// Offset of the packet in the source stream
    pub position: u64,
}

impl LineHeader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_big_endian(&self) -> bool {
        self.features.big_endian()
    }

    pub fn is_verbose(&self) -> bool {
        self.features.verbose()
    }
}

impl Default for LineHeader {
    fn default() -> Self {
        Self {
            features: LineFeatures::NONE,
            ecu_id: Arc::from(""),
            app_id: Arc::from(""),
            ctx_id: Arc::from(""),
            count: None,
            device_timestamp: Duration::ZERO,
            session_id: 0,
            timestamp: default_timestamp(),
            dlt_type: DltType::Unknown,
            line: 0,
            position: 0,
        }
    }
}

/// Header equality compares only fields whose feature is set. The builder's
/// `line` and `position` bookkeeping is not part of the comparison.
impl PartialEq for LineHeader {
    fn eq(&self, other: &Self) -> bool {
        let f = self.features;
        f == other.features
            && self.count == other.count
            && (!f.ecu_id() || self.ecu_id == other.ecu_id)
            && (!f.app_id() || self.app_id == other.app_id)
            && (!f.ctx_id() || self.ctx_id == other.ctx_id)
            && (!f.device_timestamp() || self.device_timestamp == other.device_timestamp)
            && (!f.session_id() || self.session_id == other.session_id)
            && (!f.log_timestamp() || self.timestamp == other.timestamp)
            && (!f.message_type() || self.dlt_type == other.dlt_type)
    }
}

/// A verbose or non-verbose application log/trace line
#[derive(Debug, Clone, PartialEq)]
pub struct NormalLine {
    pub header: LineHeader,
    /// Message ID of a non-verbose line
    pub message_id: Option<u32>,
    pub args: Vec<DltArg>,
}

impl NormalLine {
    /// The text projection of the arguments
    pub fn text(&self) -> String {
        let mut text = String::new();
        if let Some(id) = self.message_id {
            text.push_str(&format!("[{}] ", id));
        }
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                text.push(' ');
            }
            text.push_str(&arg.to_string());
        }
        text
    }
}

/// A control request, response or time marker
#[derive(Debug, Clone, PartialEq)]
pub struct ControlLine {
    pub header: LineHeader,
    pub payload: ControlPayload,
}

/// A span of bytes that could not be decoded
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedLine {
    pub header: LineHeader,
    pub bytes: u64,
    pub reason: Option<String>,
}

impl SkippedLine {
    /// Application and context ID reported on skipped lines
    pub const ID: &'static str = "SKIP";

    pub fn text(&self) -> String {
        match &self.reason {
            Some(reason) => format!("Skipped: {} bytes; {}", self.bytes, reason),
            None => format!("Skipped: {}", self.bytes),
        }
    }
}

/// One decode outcome
#[derive(Debug, Clone, PartialEq)]
pub enum DltTraceLine {
    Normal(NormalLine),
    Control(ControlLine),
    Skipped(SkippedLine),
}

impl DltTraceLine {
    pub fn header(&self) -> &LineHeader {
        match self {
            DltTraceLine::Normal(line) => &line.header,
            DltTraceLine::Control(line) => &line.header,
            DltTraceLine::Skipped(line) => &line.header,
        }
    }

    pub fn header_mut(&mut self) -> &mut LineHeader {
        match self {
            DltTraceLine::Normal(line) => &mut line.header,
            DltTraceLine::Control(line) => &mut line.header,
            DltTraceLine::Skipped(line) => &mut line.header,
        }
    }

    pub fn features(&self) -> LineFeatures {
        self.header().features
    }

    pub fn line_number(&self) -> u64 {
        self.header().line
    }

    pub fn position(&self) -> u64 {
        self.header().position
    }

    /// Arguments of a normal line, empty for other variants
    pub fn args(&self) -> &[DltArg] {
        match self {
            DltTraceLine::Normal(line) => &line.args,
            _ => &[],
        }
    }

    /// The decoded text projection of the line
    pub fn text(&self) -> String {
        match self {
            DltTraceLine::Normal(line) => line.text(),
            DltTraceLine::Control(line) => line.payload.to_string(),
            DltTraceLine::Skipped(line) => line.text(),
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, DltTraceLine::Skipped(_))
    }
}

impl fmt::Display for DltTraceLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let h = self.header();
        let count = h.count.map(i32::from).unwrap_or(-1);
        let mode = if h.is_verbose() { "verbose" } else { "non-verbose" };
        write!(
            f,
            "{} {:.4} {} {} {} {} {} {} {} {}",
            h.timestamp.with_timezone(&Local).format("%Y/%m/%d %H:%M:%S%.6f"),
            h.device_timestamp.as_secs_f64(),
            count,
            h.ecu_id,
            h.app_id,
            h.ctx_id,
            h.session_id,
            h.dlt_type,
            mode,
            self.text()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(features: LineFeatures) -> LineHeader {
        LineHeader {
            features,
            ..LineHeader::default()
        }
    }

    #[test]
    fn test_equality_ignores_fields_without_feature() {
        let mut a = header(LineFeatures::APP_ID);
        let mut b = header(LineFeatures::APP_ID);
        a.app_id = Arc::from("APP1");
        b.app_id = Arc::from("APP1");
        a.ecu_id = Arc::from("");
        b.ecu_id = Arc::from("ECU1");
        a.line = 3;
        b.position = 99;
        assert_eq!(a, b);

        b.app_id = Arc::from("APP2");
        assert_ne!(a, b);
    }

    #[test]
    fn test_equality_compares_features() {
        assert_ne!(header(LineFeatures::ECU_ID), header(LineFeatures::NONE));
    }

    #[test]
    fn test_normal_text() {
        let line = NormalLine {
            header: LineHeader::default(),
            message_id: None,
            args: vec!["value".into(), 42u32.into()],
        };
        assert_eq!(line.text(), "value 42");

        let line = NormalLine {
            header: LineHeader::default(),
            message_id: Some(1),
            args: vec![DltArg::NonVerbose(vec![0x00, 0x12])],
        };
        assert_eq!(line.text(), "[1] --|00 12");
    }

    #[test]
    fn test_skipped_text() {
        let line = SkippedLine {
            header: LineHeader::default(),
            bytes: 12,
            reason: Some("Invalid packet".to_string()),
        };
        assert_eq!(line.text(), "Skipped: 12 bytes; Invalid packet");

        let line = SkippedLine {
            reason: None,
            ..line
        };
        assert_eq!(line.text(), "Skipped: 12");
    }

    #[test]
    fn test_display_contains_fields() {
        let mut header = header(LineFeatures::VERBOSE | LineFeatures::APP_ID);
        header.app_id = Arc::from("APP1");
        header.dlt_type = DltType::LogInfo;
        header.device_timestamp = Duration::from_micros(1_234_500);
        let line = DltTraceLine::Normal(NormalLine {
            header,
            message_id: None,
            args: vec!["hi".into()],
        });
        let text = line.to_string();
        assert!(text.contains(" 1.2345 -1  APP1  0 log info verbose hi"), "{}", text);
    }
}
