//! Control messages: service requests, responses and time markers
//!
//! A control line carries exactly one [`ControlPayload`]. The wire layout of
//! each service is handled in [`services`]; dispatch by service ID goes
//! through the runtime-extensible [`ControlCodec`] registry.

pub mod registry;
pub mod services;

pub use registry::{ControlCodec, ControlDecodeFn, ControlEncodeFn, ControlRole, ControlService};

use crate::args::{hex_string, write_printable};
use crate::dlt_type::DltType;
use chrono::DateTime;
use std::fmt;

/// First service ID of the software injection range
pub const SW_INJECTION_FIRST: u32 = 0xFFF;

/// Response status codes
pub mod status {
    pub const OK: u8 = 0;
    pub const NOT_SUPPORTED: u8 = 1;
    pub const ERROR: u8 = 2;
    /// Software injection only
    pub const PENDING: u8 = 3;

    /// get_log_info: matching contexts without log level or trace status
    pub const NO_LOG_NO_TRACE: u8 = 3;
    pub const WITH_LOG_NO_TRACE: u8 = 4;
    pub const NO_LOG_WITH_TRACE: u8 = 5;
    pub const WITH_LOG_WITH_TRACE: u8 = 6;
    /// get_log_info: log level, trace status and descriptions
    pub const FULL_INFO: u8 = 7;
    pub const NO_MATCH: u8 = 8;
    pub const OVERFLOW: u8 = 9;
}

/// Well-known service IDs
pub mod service {
    pub const SET_LOG_LEVEL: u32 = 0x01;
    pub const SET_TRACE_STATUS: u32 = 0x02;
    pub const GET_LOG_INFO: u32 = 0x03;
    pub const GET_DEFAULT_LOG_LEVEL: u32 = 0x04;
    pub const STORE_CONFIG: u32 = 0x05;
    pub const RESET_FACTORY_DEFAULT: u32 = 0x06;
    pub const SET_VERBOSE_MODE: u32 = 0x09;
    pub const SET_MESSAGE_FILTERING: u32 = 0x0A;
    pub const SET_TIMING_PACKETS: u32 = 0x0B;
    pub const GET_LOCAL_TIME: u32 = 0x0C;
    pub const USE_ECU_ID: u32 = 0x0D;
    pub const USE_SESSION_ID: u32 = 0x0E;
    pub const USE_TIMESTAMP: u32 = 0x0F;
    pub const USE_EXTENDED_HEADER: u32 = 0x10;
    pub const SET_DEFAULT_LOG_LEVEL: u32 = 0x11;
    pub const SET_DEFAULT_TRACE_STATUS: u32 = 0x12;
    pub const GET_SOFTWARE_VERSION: u32 = 0x13;
    pub const MESSAGE_BUFFER_OVERFLOW: u32 = 0x14;
    pub const GET_DEFAULT_TRACE_STATUS: u32 = 0x15;
    pub const GET_VERBOSE_MODE: u32 = 0x19;
    pub const GET_MESSAGE_FILTERING: u32 = 0x1A;
    pub const GET_USE_ECU_ID: u32 = 0x1B;
    pub const GET_USE_SESSION_ID: u32 = 0x1C;
    pub const GET_USE_TIMESTAMP: u32 = 0x1D;
    pub const GET_USE_EXTENDED_HEADER: u32 = 0x1E;
    pub const GET_TRACE_STATUS: u32 = 0x1F;
    pub const BUFFER_OVERFLOW: u32 = 0x23;
    pub const SYNC_TIMESTAMP: u32 = 0x24;
    pub const UNREGISTER_CONTEXT: u32 = 0xF01;
    pub const CONNECTION_INFO: u32 = 0xF02;
    pub const TIMEZONE: u32 = 0xF03;
    pub const MARKER: u32 = 0xF04;
}

/// Text name of a known service
pub fn service_name(service_id: u32) -> Option<&'static str> {
    use service::*;
    let name = match service_id {
        SET_LOG_LEVEL => "set_log_level",
        SET_TRACE_STATUS => "set_trace_status",
        GET_LOG_INFO => "get_log_info",
        GET_DEFAULT_LOG_LEVEL => "get_default_log_level",
        STORE_CONFIG => "store_config",
        RESET_FACTORY_DEFAULT => "reset_factory_default",
        SET_VERBOSE_MODE => "set_verbose_mode",
        SET_MESSAGE_FILTERING => "set_message_filtering",
        SET_TIMING_PACKETS => "set_timing_packets",
        GET_LOCAL_TIME => "get_local_time",
        USE_ECU_ID => "use_ecu_id",
        USE_SESSION_ID => "use_session_id",
        USE_TIMESTAMP => "use_timestamp",
        USE_EXTENDED_HEADER => "use_extended_header",
        SET_DEFAULT_LOG_LEVEL => "set_default_log_level",
        SET_DEFAULT_TRACE_STATUS => "set_default_trace_status",
        GET_SOFTWARE_VERSION => "get_software_version",
        MESSAGE_BUFFER_OVERFLOW => "message_buffer_overflow",
        GET_DEFAULT_TRACE_STATUS => "get_default_trace_status",
        GET_VERBOSE_MODE => "get_verbose_mode",
        GET_MESSAGE_FILTERING => "get_message_filtering",
        GET_USE_ECU_ID => "get_use_ecu_id",
        GET_USE_SESSION_ID => "get_use_session_id",
        GET_USE_TIMESTAMP => "get_use_timestamp",
        GET_USE_EXTENDED_HEADER => "get_use_extended_header",
        GET_TRACE_STATUS => "get_trace_status",
        BUFFER_OVERFLOW => "buffer_overflow",
        SYNC_TIMESTAMP => "sync_timestamp",
        UNREGISTER_CONTEXT => "unregister_context",
        CONNECTION_INFO => "connection_info",
        TIMEZONE => "timezone",
        MARKER => "marker",
        _ => return None,
    };
    Some(name)
}

/// Text form of a log level: `block_all`, `fatal` .. `verbose`, `default` for -1
pub fn log_level_str(level: i8) -> String {
    match level {
        -1 => "default".to_string(),
        0 => "block_all".to_string(),
        1 => "fatal".to_string(),
        2 => "error".to_string(),
        3 => "warning".to_string(),
        4 => "info".to_string(),
        5 => "debug".to_string(),
        6 => "verbose".to_string(),
        other => format!("log_level={}", other),
    }
}

/// Text form of a trace status: `default` for -1, `off`, `on`
pub fn trace_status_str(value: i8) -> String {
    match value {
        -1 => "default".to_string(),
        0 => "off".to_string(),
        1 => "on".to_string(),
        other => format!("status={}", other),
    }
}

/// Text form of a response status
pub fn status_str(value: u8) -> String {
    match value {
        status::OK => "ok".to_string(),
        status::NOT_SUPPORTED => "not_supported".to_string(),
        status::ERROR => "error".to_string(),
        other => format!("status={}", other),
    }
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "on"
    } else {
        "off"
    }
}

struct ServiceName(u32);

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match service_name(self.0) {
            Some(name) => f.write_str(name),
            None => write!(f, "service_0x{:x}", self.0),
        }
    }
}

/// Writes ` APP (CTX)` unless both IDs are empty
fn write_app_ctx(f: &mut fmt::Formatter<'_>, app_id: &str, ctx_id: &str) -> fmt::Result {
    if app_id.is_empty() && ctx_id.is_empty() {
        return Ok(());
    }
    write!(f, " {} ({})", app_id, ctx_id)
}

fn write_com(f: &mut fmt::Formatter<'_>, com_interface: &str) -> fmt::Result {
    if com_interface.is_empty() {
        return Ok(());
    }
    write!(f, " {}", com_interface)
}

/// A context entry of a get_log_info response
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ContextInfo {
    pub id: String,
    /// `None` when the response option does not carry a log level
    pub log_level: Option<i8>,
    /// `None` when the response option does not carry a trace status
    pub trace_status: Option<i8>,
    pub description: Option<String>,
}

impl fmt::Display for ContextInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)?;
        if let Some(level) = self.log_level {
            write!(f, " {}", log_level_str(level))?;
        }
        match self.trace_status {
            Some(0) => f.write_str(" off"),
            Some(1) => f.write_str(" on"),
            Some(-1) => f.write_str(" default"),
            Some(other) => write!(f, " {}", other),
            None => Ok(()),
        }
    }
}

/// An application entry of a get_log_info response
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AppInfo {
    pub id: String,
    pub contexts: Vec<ContextInfo>,
    pub description: Option<String>,
}

impl fmt::Display for AppInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.id.is_empty() {
            f.write_str("(")?;
        } else {
            write!(f, "{} (", self.id)?;
        }
        for (i, ctx) in self.contexts.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", ctx)?;
        }
        f.write_str(")")
    }
}

/// Control request payloads
#[derive(Debug, Clone, PartialEq)]
pub enum ControlRequest {
    SetLogLevel {
        app_id: String,
        ctx_id: String,
        log_level: i8,
        com_interface: String,
    },
    SetTraceStatus {
        app_id: String,
        ctx_id: String,
        trace_status: i8,
        com_interface: String,
    },
    GetLogInfo {
        options: u8,
        app_id: String,
        ctx_id: String,
        com_interface: String,
    },
    SetDefaultLogLevel {
        log_level: i8,
        com_interface: String,
    },
    SetDefaultTraceStatus {
        enabled: bool,
        com_interface: String,
    },
    GetTraceStatus {
        app_id: String,
        ctx_id: String,
    },
    /// Switches such as set_verbose_mode or use_ecu_id
    Enable { service_id: u32, enabled: bool },
    /// Requests without parameters
    Query { service_id: u32 },
    /// Opaque request in the software injection range
    SwInjection { service_id: u32, payload: Vec<u8> },
    /// Payload of a caller-registered service, without the service ID
    Custom { service_id: u32, data: Vec<u8> },
}

impl ControlRequest {
    pub fn service_id(&self) -> u32 {
        match self {
            ControlRequest::SetLogLevel { .. } => service::SET_LOG_LEVEL,
            ControlRequest::SetTraceStatus { .. } => service::SET_TRACE_STATUS,
            ControlRequest::GetLogInfo { .. } => service::GET_LOG_INFO,
            ControlRequest::SetDefaultLogLevel { .. } => service::SET_DEFAULT_LOG_LEVEL,
            ControlRequest::SetDefaultTraceStatus { .. } => service::SET_DEFAULT_TRACE_STATUS,
            ControlRequest::GetTraceStatus { .. } => service::GET_TRACE_STATUS,
            ControlRequest::Enable { service_id, .. }
            | ControlRequest::Query { service_id }
            | ControlRequest::SwInjection { service_id, .. }
            | ControlRequest::Custom { service_id, .. } => *service_id,
        }
    }
}

impl fmt::Display for ControlRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlRequest::SetLogLevel {
                app_id,
                ctx_id,
                log_level,
                com_interface,
            } => {
                write!(f, "[set_log_level] {}", log_level_str(*log_level))?;
                write_app_ctx(f, app_id, ctx_id)?;
                write_com(f, com_interface)
            }
            ControlRequest::SetTraceStatus {
                app_id,
                ctx_id,
                trace_status,
                com_interface,
            } => {
                write!(f, "[set_trace_status] {}", trace_status_str(*trace_status))?;
                write_app_ctx(f, app_id, ctx_id)?;
                write_com(f, com_interface)
            }
            ControlRequest::GetLogInfo {
                options,
                app_id,
                ctx_id,
                com_interface,
            } => {
                write!(f, "[get_log_info options={}]", options)?;
                if app_id.is_empty() {
                    f.write_str(" -all-")?;
                } else {
                    write!(f, " {} ({})", app_id, ctx_id)?;
                }
                write_com(f, com_interface)
            }
            ControlRequest::SetDefaultLogLevel {
                log_level,
                com_interface,
            } => {
                write!(f, "[set_default_log_level] {}", log_level_str(*log_level))?;
                write_com(f, com_interface)
            }
            ControlRequest::SetDefaultTraceStatus {
                enabled,
                com_interface,
            } => {
                write!(f, "[set_default_trace_status] {}", on_off(*enabled))?;
                write_com(f, com_interface)
            }
            ControlRequest::GetTraceStatus { app_id, ctx_id } => {
                f.write_str("[get_trace_status]")?;
                write_app_ctx(f, app_id, ctx_id)
            }
            ControlRequest::Enable {
                service_id,
                enabled,
            } => write!(f, "[{}] {}", ServiceName(*service_id), on_off(*enabled)),
            ControlRequest::Query { service_id } => write!(f, "[{}]", ServiceName(*service_id)),
            ControlRequest::SwInjection { payload, .. } => {
                f.write_str("[] ")?;
                f.write_str(&hex_string(&(payload.len() as u32).to_le_bytes()))?;
                if !payload.is_empty() {
                    write!(f, " {}", hex_string(payload))?;
                }
                Ok(())
            }
            ControlRequest::Custom { service_id, data } => {
                write!(f, "[{}]", ServiceName(*service_id))?;
                if !data.is_empty() {
                    write!(f, " {}", hex_string(data))?;
                }
                Ok(())
            }
        }
    }
}

/// Control response payloads
#[derive(Debug, Clone, PartialEq)]
pub enum ControlResponse {
    /// Status-only response, also used for `not_supported`/`error` replies
    Status { service_id: u32, status: u8 },
    /// get_default_log_level
    LogLevel {
        service_id: u32,
        status: u8,
        log_level: i8,
    },
    /// Responses carrying a single flag, e.g. get_verbose_mode
    Enabled {
        service_id: u32,
        status: u8,
        enabled: bool,
    },
    LogInfo {
        status: u8,
        apps: Vec<AppInfo>,
        com_interface: String,
    },
    SoftwareVersion {
        status: u8,
        version: String,
    },
    BufferOverflow {
        status: u8,
        counter: u32,
    },
    SyncTimeStamp {
        status: u8,
        seconds: u64,
        nanoseconds: u32,
    },
    UnregisterContext {
        status: u8,
        app_id: String,
        ctx_id: String,
        com_interface: String,
    },
    ConnectionInfo {
        status: u8,
        state: u8,
        com_interface: String,
    },
    TimeZone {
        status: u8,
        offset_secs: i32,
        is_dst: bool,
    },
    SwInjection { service_id: u32, status: u8 },
    /// Payload of a caller-registered service, after the status byte
    Custom {
        service_id: u32,
        status: u8,
        data: Vec<u8>,
    },
}

impl ControlResponse {
    pub fn service_id(&self) -> u32 {
        match self {
            ControlResponse::Status { service_id, .. }
            | ControlResponse::LogLevel { service_id, .. }
            | ControlResponse::Enabled { service_id, .. }
            | ControlResponse::SwInjection { service_id, .. }
            | ControlResponse::Custom { service_id, .. } => *service_id,
            ControlResponse::LogInfo { .. } => service::GET_LOG_INFO,
            ControlResponse::SoftwareVersion { .. } => service::GET_SOFTWARE_VERSION,
            ControlResponse::BufferOverflow { .. } => service::BUFFER_OVERFLOW,
            ControlResponse::SyncTimeStamp { .. } => service::SYNC_TIMESTAMP,
            ControlResponse::UnregisterContext { .. } => service::UNREGISTER_CONTEXT,
            ControlResponse::ConnectionInfo { .. } => service::CONNECTION_INFO,
            ControlResponse::TimeZone { .. } => service::TIMEZONE,
        }
    }

    pub fn status(&self) -> u8 {
        match self {
            ControlResponse::Status { status, .. }
            | ControlResponse::LogLevel { status, .. }
            | ControlResponse::Enabled { status, .. }
            | ControlResponse::LogInfo { status, .. }
            | ControlResponse::SoftwareVersion { status, .. }
            | ControlResponse::BufferOverflow { status, .. }
            | ControlResponse::SyncTimeStamp { status, .. }
            | ControlResponse::UnregisterContext { status, .. }
            | ControlResponse::ConnectionInfo { status, .. }
            | ControlResponse::TimeZone { status, .. }
            | ControlResponse::SwInjection { status, .. }
            | ControlResponse::Custom { status, .. } => *status,
        }
    }
}

fn log_info_status_str(value: u8) -> String {
    match value {
        status::NO_MATCH => "no_matching_context_id".to_string(),
        status::OVERFLOW => "overflow".to_string(),
        status::NO_LOG_NO_TRACE..=status::FULL_INFO => value.to_string(),
        other => status_str(other),
    }
}

impl fmt::Display for ControlResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlResponse::Status { service_id, status } => {
                write!(f, "[{} {}]", ServiceName(*service_id), status_str(*status))
            }
            ControlResponse::LogLevel {
                service_id,
                status,
                log_level,
            } => write!(
                f,
                "[{} {}] {}",
                ServiceName(*service_id),
                status_str(*status),
                log_level_str(*log_level)
            ),
            ControlResponse::Enabled {
                service_id,
                status,
                enabled,
            } => {
                let value = if *service_id == service::MESSAGE_BUFFER_OVERFLOW {
                    if *enabled {
                        "true"
                    } else {
                        "false"
                    }
                } else {
                    on_off(*enabled)
                };
                write!(f, "[{} {}] {}", ServiceName(*service_id), status_str(*status), value)
            }
            ControlResponse::LogInfo {
                status,
                apps,
                com_interface,
            } => {
                write!(f, "[get_log_info {}]", log_info_status_str(*status))?;
                if apps.is_empty() {
                    return Ok(());
                }
                for app in apps {
                    write!(f, " {};", app)?;
                }
                write_com(f, com_interface)
            }
            ControlResponse::SoftwareVersion { status, version } => {
                write!(f, "[get_software_version {}] ", status_str(*status))?;
                write_printable(f, version)
            }
            ControlResponse::BufferOverflow { status, counter } => {
                write!(f, "[buffer_overflow {}] {}", status_str(*status), counter)
            }
            ControlResponse::SyncTimeStamp {
                status,
                seconds,
                nanoseconds,
            } => {
                write!(f, "[sync_timestamp {}] ", status_str(*status))?;
                match i64::try_from(*seconds)
                    .ok()
                    .and_then(|secs| DateTime::from_timestamp(secs, *nanoseconds))
                {
                    Some(time) => write!(f, "{}", time.format("%Y-%m-%dT%H:%M:%S%.9fZ")),
                    None => write!(f, "{}.{:09}", seconds, nanoseconds),
                }
            }
            ControlResponse::UnregisterContext {
                status,
                app_id,
                ctx_id,
                com_interface,
            } => {
                write!(f, "[unregister_context {}]", status_str(*status))?;
                write_app_ctx(f, app_id, ctx_id)?;
                write_com(f, com_interface)
            }
            ControlResponse::ConnectionInfo {
                status,
                state,
                com_interface,
            } => {
                let state = match state {
                    1 => "disconnected",
                    2 => "connected",
                    _ => "unknown",
                };
                write!(f, "[connection_info {}] {}", status_str(*status), state)?;
                write_com(f, com_interface)
            }
            ControlResponse::TimeZone {
                status,
                offset_secs,
                is_dst,
            } => {
                let sign = if *offset_secs < 0 { '-' } else { '+' };
                let minutes = offset_secs.unsigned_abs() / 60;
                write!(
                    f,
                    "[timezone {}] {}{:02}:{:02}",
                    status_str(*status),
                    sign,
                    minutes / 60,
                    minutes % 60
                )?;
                if *is_dst {
                    f.write_str(" DST")?;
                }
                Ok(())
            }
            ControlResponse::SwInjection { status, .. } => {
                let status = if *status == status::PENDING {
                    "pending".to_string()
                } else {
                    status_str(*status)
                };
                write!(f, "[ {}]", status)
            }
            ControlResponse::Custom {
                service_id,
                status,
                data,
            } => {
                write!(f, "[{} {}]", ServiceName(*service_id), status_str(*status))?;
                if !data.is_empty() {
                    write!(f, " {}", hex_string(data))?;
                }
                Ok(())
            }
        }
    }
}

/// The payload of a control line
#[derive(Debug, Clone, PartialEq)]
pub enum ControlPayload {
    Request(ControlRequest),
    Response(ControlResponse),
    /// Time synchronisation marker, no payload bytes
    TimeMarker,
}

impl ControlPayload {
    /// Message type a line carrying this payload has
    pub fn dlt_type(&self) -> DltType {
        match self {
            ControlPayload::Request(_) => DltType::ControlRequest,
            ControlPayload::Response(_) => DltType::ControlResponse,
            ControlPayload::TimeMarker => DltType::ControlTime,
        }
    }

    pub fn service_id(&self) -> Option<u32> {
        match self {
            ControlPayload::Request(request) => Some(request.service_id()),
            ControlPayload::Response(response) => Some(response.service_id()),
            ControlPayload::TimeMarker => None,
        }
    }
}

impl fmt::Display for ControlPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlPayload::Request(request) => write!(f, "{}", request),
            ControlPayload::Response(response) => write!(f, "{}", response),
            ControlPayload::TimeMarker => f.write_str("[time]"),
        }
    }
}
