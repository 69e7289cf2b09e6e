//! Message type and subtype of a trace line

use crate::header::msin;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Message type and subtype, encoded exactly as the MSIN byte without the
/// verbose bit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum DltType {
    LogFatal = 0x10,
    LogError = 0x20,
    LogWarn = 0x30,
    LogInfo = 0x40,
    LogDebug = 0x50,
    LogVerbose = 0x60,

    AppTraceVariable = 0x12,
    AppTraceFunctionIn = 0x22,
    AppTraceFunctionOut = 0x32,
    AppTraceState = 0x42,
    AppTraceVfb = 0x52,

    NwTraceIpc = 0x14,
    NwTraceCan = 0x24,
    NwTraceFlexray = 0x34,
    NwTraceMost = 0x44,
    NwTraceEthernet = 0x54,
    NwTraceSomeIp = 0x64,
    NwTraceUserDefined0 = 0x74,
    NwTraceUserDefined1 = 0x84,
    NwTraceUserDefined2 = 0x94,
    NwTraceUserDefined3 = 0xA4,
    NwTraceUserDefined4 = 0xB4,
    NwTraceUserDefined5 = 0xC4,
    NwTraceUserDefined6 = 0xD4,
    NwTraceUserDefined7 = 0xE4,
    NwTraceUserDefined8 = 0xF4,

    ControlRequest = 0x16,
    ControlResponse = 0x26,
    ControlTime = 0x36,

    #[default]
    Unknown = 0xFF,
}

/// Top-level message type from bits 1-3 of MSIN
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Log,
    AppTrace,
    NwTrace,
    Control,
    Reserved,
}

impl DltType {
    /// Interprets the MSIN byte; the verbose bit is ignored
    pub fn from_msin(value: u8) -> Self {
        use DltType::*;
        match value & msin::TYPE_INFO_MASK {
            0x10 => LogFatal,
            0x20 => LogError,
            0x30 => LogWarn,
            0x40 => LogInfo,
            0x50 => LogDebug,
            0x60 => LogVerbose,
            0x12 => AppTraceVariable,
            0x22 => AppTraceFunctionIn,
            0x32 => AppTraceFunctionOut,
            0x42 => AppTraceState,
            0x52 => AppTraceVfb,
            0x14 => NwTraceIpc,
            0x24 => NwTraceCan,
            0x34 => NwTraceFlexray,
            0x44 => NwTraceMost,
            0x54 => NwTraceEthernet,
            0x64 => NwTraceSomeIp,
            0x74 => NwTraceUserDefined0,
            0x84 => NwTraceUserDefined1,
            0x94 => NwTraceUserDefined2,
            0xA4 => NwTraceUserDefined3,
            0xB4 => NwTraceUserDefined4,
            0xC4 => NwTraceUserDefined5,
            0xD4 => NwTraceUserDefined6,
            0xE4 => NwTraceUserDefined7,
            0xF4 => NwTraceUserDefined8,
            0x16 => ControlRequest,
            0x26 => ControlResponse,
            0x36 => ControlTime,
            _ => Unknown,
        }
    }

    /// The MSIN bits for this type, verbose bit clear
    pub fn bits(self) -> u8 {
        self as u8
    }

    pub fn message_type(self) -> MessageType {
        if self == DltType::Unknown {
            return MessageType::Reserved;
        }
        match self.bits() & msin::MESSAGE_TYPE_MASK {
            msin::TYPE_LOG => MessageType::Log,
            msin::TYPE_APP_TRACE => MessageType::AppTrace,
            msin::TYPE_NW_TRACE => MessageType::NwTrace,
            msin::TYPE_CONTROL => MessageType::Control,
            _ => MessageType::Reserved,
        }
    }

    pub fn is_control(self) -> bool {
        self.message_type() == MessageType::Control
    }

    /// Human readable description, e.g. "log info" or "control response"
    pub fn description(self) -> &'static str {
        use DltType::*;
        match self {
            LogFatal => "log fatal",
            LogError => "log error",
            LogWarn => "log warn",
            LogInfo => "log info",
            LogDebug => "log debug",
            LogVerbose => "log verbose",
            AppTraceVariable => "app_trace variable",
            AppTraceFunctionIn => "app_trace func_in",
            AppTraceFunctionOut => "app_trace func_out",
            AppTraceState => "app_trace state",
            AppTraceVfb => "app_trace vfb",
            NwTraceIpc => "nw_trace ipc",
            NwTraceCan => "nw_trace can",
            NwTraceFlexray => "nw_trace flexray",
            NwTraceMost => "nw_trace most",
            NwTraceEthernet => "nw_trace vfb",
            NwTraceSomeIp
            | NwTraceUserDefined0
            | NwTraceUserDefined1
            | NwTraceUserDefined2
            | NwTraceUserDefined3
            | NwTraceUserDefined4
            | NwTraceUserDefined5
            | NwTraceUserDefined6
            | NwTraceUserDefined7
            | NwTraceUserDefined8 => "nw_trace ",
            ControlRequest => "control request",
            ControlResponse => "control response",
            ControlTime => "control time",
            Unknown => "",
        }
    }
}

impl fmt::Display for DltType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_msin_ignores_verbose_bit() {
        assert_eq!(DltType::from_msin(0x41), DltType::LogInfo);
        assert_eq!(DltType::from_msin(0x40), DltType::LogInfo);
        assert_eq!(DltType::from_msin(0x26), DltType::ControlResponse);
    }

    #[test]
    fn test_undefined_subtype_is_unknown() {
        assert_eq!(DltType::from_msin(0x70), DltType::Unknown);
        assert_eq!(DltType::from_msin(0x08), DltType::Unknown);
        assert_eq!(DltType::Unknown.message_type(), MessageType::Reserved);
    }

    #[test]
    fn test_message_type_classification() {
        assert_eq!(DltType::LogWarn.message_type(), MessageType::Log);
        assert_eq!(DltType::AppTraceState.message_type(), MessageType::AppTrace);
        assert_eq!(DltType::NwTraceCan.message_type(), MessageType::NwTrace);
        assert!(DltType::ControlTime.is_control());
        assert!(!DltType::LogFatal.is_control());
    }

    #[test]
    fn test_description() {
        assert_eq!(DltType::LogFatal.to_string(), "log fatal");
        assert_eq!(DltType::AppTraceVariable.to_string(), "app_trace variable");
        assert_eq!(DltType::NwTraceCan.to_string(), "nw_trace can");
        assert_eq!(DltType::ControlRequest.to_string(), "control request");
    }

    #[test]
    fn test_bits_round_trip() {
        for value in 0u8..=0xFF {
            let dlt_type = DltType::from_msin(value);
            if dlt_type != DltType::Unknown {
                assert_eq!(dlt_type.bits(), value & 0xFE);
            }
        }
    }
}
