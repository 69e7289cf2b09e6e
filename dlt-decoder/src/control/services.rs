//! Wire layouts of the standard and custom control services
//!
//! Every payload starts with the 32-bit service ID in stream byte order,
//! responses follow it with a status byte. Identifiers inside payloads are
//! four raw bytes, all zero meaning "none". Decoders are handed a reader
//! positioned after the service ID; encoders write the complete payload.

use super::{
    service, status, AppInfo, ContextInfo, ControlPayload, ControlRequest, ControlResponse,
};
use crate::args::decode_latin1;
use crate::types::{DecoderError, Result};
use crate::wire::{PayloadReader, PayloadWriter};

fn id(reader: &mut PayloadReader<'_>) -> Result<String> {
    Ok(reader.id()?.to_string())
}

fn request(request: ControlRequest) -> Result<ControlPayload> {
    Ok(ControlPayload::Request(request))
}

fn response(response: ControlResponse) -> Result<ControlPayload> {
    Ok(ControlPayload::Response(response))
}

/// A `not_supported` or `error` reply carries no service data
fn failed_status(service_id: u32, status: u8) -> Option<ControlPayload> {
    match status {
        status::NOT_SUPPORTED | status::ERROR => Some(ControlPayload::Response(
            ControlResponse::Status { service_id, status },
        )),
        _ => None,
    }
}

fn not_supported(payload: &ControlPayload) -> DecoderError {
    DecoderError::EncodeNotSupported(format!("cannot encode control payload {:?}", payload))
}

// Requests

pub fn decode_set_log_level(_service_id: u32, reader: &mut PayloadReader<'_>) -> Result<ControlPayload> {
    request(ControlRequest::SetLogLevel {
        app_id: id(reader)?,
        ctx_id: id(reader)?,
        log_level: reader.i8()?,
        com_interface: id(reader)?,
    })
}

pub fn decode_set_trace_status(_service_id: u32, reader: &mut PayloadReader<'_>) -> Result<ControlPayload> {
    request(ControlRequest::SetTraceStatus {
        app_id: id(reader)?,
        ctx_id: id(reader)?,
        trace_status: reader.i8()?,
        com_interface: id(reader)?,
    })
}

pub fn decode_get_log_info_request(_service_id: u32, reader: &mut PayloadReader<'_>) -> Result<ControlPayload> {
    request(ControlRequest::GetLogInfo {
        options: reader.u8()?,
        app_id: id(reader)?,
        ctx_id: id(reader)?,
        com_interface: id(reader)?,
    })
}

pub fn decode_query(service_id: u32, _reader: &mut PayloadReader<'_>) -> Result<ControlPayload> {
    request(ControlRequest::Query { service_id })
}

pub fn decode_enable(service_id: u32, reader: &mut PayloadReader<'_>) -> Result<ControlPayload> {
    request(ControlRequest::Enable {
        service_id,
        enabled: reader.u8()? != 0,
    })
}

pub fn decode_set_default_log_level(_service_id: u32, reader: &mut PayloadReader<'_>) -> Result<ControlPayload> {
    request(ControlRequest::SetDefaultLogLevel {
        log_level: reader.i8()?,
        com_interface: id(reader)?,
    })
}

pub fn decode_set_default_trace_status(
    _service_id: u32,
    reader: &mut PayloadReader<'_>,
) -> Result<ControlPayload> {
    request(ControlRequest::SetDefaultTraceStatus {
        enabled: reader.u8()? != 0,
        com_interface: id(reader)?,
    })
}

pub fn decode_get_trace_status(_service_id: u32, reader: &mut PayloadReader<'_>) -> Result<ControlPayload> {
    request(ControlRequest::GetTraceStatus {
        app_id: id(reader)?,
        ctx_id: id(reader)?,
    })
}

/// `<id:4><len:4 little endian><payload>`; the length must cover the rest of the packet
pub fn decode_sw_injection_request(service_id: u32, reader: &mut PayloadReader<'_>) -> Result<ControlPayload> {
    let b = reader.bytes(4)?;
    let length = u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as usize;
    if length != reader.remaining() {
        return Err(DecoderError::invalid(format!(
            "software injection 0x{:x} length {} does not match payload of {} bytes",
            service_id,
            length,
            reader.remaining()
        )));
    }
    request(ControlRequest::SwInjection {
        service_id,
        payload: reader.bytes(length)?.to_vec(),
    })
}

/// Writes any [`ControlRequest`]
pub fn encode_request(payload: &ControlPayload, writer: &mut PayloadWriter) -> Result<()> {
    let request = match payload {
        ControlPayload::Request(request) => request,
        _ => return Err(not_supported(payload)),
    };

    writer.u32(request.service_id());
    match request {
        ControlRequest::SetLogLevel {
            app_id,
            ctx_id,
            log_level,
            com_interface,
        } => {
            writer.id(app_id);
            writer.id(ctx_id);
            writer.i8(*log_level);
            writer.id(com_interface);
        }
        ControlRequest::SetTraceStatus {
            app_id,
            ctx_id,
            trace_status,
            com_interface,
        } => {
            writer.id(app_id);
            writer.id(ctx_id);
            writer.i8(*trace_status);
            writer.id(com_interface);
        }
        ControlRequest::GetLogInfo {
            options,
            app_id,
            ctx_id,
            com_interface,
        } => {
            writer.u8(*options);
            writer.id(app_id);
            writer.id(ctx_id);
            writer.id(com_interface);
        }
        ControlRequest::SetDefaultLogLevel {
            log_level,
            com_interface,
        } => {
            writer.i8(*log_level);
            writer.id(com_interface);
        }
        ControlRequest::SetDefaultTraceStatus {
            enabled,
            com_interface,
        } => {
            writer.u8(u8::from(*enabled));
            writer.id(com_interface);
        }
        ControlRequest::GetTraceStatus { app_id, ctx_id } => {
            writer.id(app_id);
            writer.id(ctx_id);
        }
        ControlRequest::Enable { enabled, .. } => writer.u8(u8::from(*enabled)),
        ControlRequest::Query { .. } => {}
        ControlRequest::SwInjection { payload, .. } => {
            writer.bytes(&(payload.len() as u32).to_le_bytes());
            writer.bytes(payload);
        }
        ControlRequest::Custom { data, .. } => writer.bytes(data),
    }
    Ok(())
}

// Responses

pub fn decode_status_response(service_id: u32, reader: &mut PayloadReader<'_>) -> Result<ControlPayload> {
    response(ControlResponse::Status {
        service_id,
        status: reader.u8()?,
    })
}

pub fn decode_log_level_response(service_id: u32, reader: &mut PayloadReader<'_>) -> Result<ControlPayload> {
    let status = reader.u8()?;
    if let Some(payload) = failed_status(service_id, status) {
        return Ok(payload);
    }
    response(ControlResponse::LogLevel {
        service_id,
        status,
        log_level: reader.i8()?,
    })
}

pub fn decode_enabled_response(service_id: u32, reader: &mut PayloadReader<'_>) -> Result<ControlPayload> {
    let status = reader.u8()?;
    if let Some(payload) = failed_status(service_id, status) {
        return Ok(payload);
    }
    response(ControlResponse::Enabled {
        service_id,
        status,
        enabled: reader.u8()? != 0,
    })
}

pub fn decode_software_version(service_id: u32, reader: &mut PayloadReader<'_>) -> Result<ControlPayload> {
    let status = reader.u8()?;
    if let Some(payload) = failed_status(service_id, status) {
        return Ok(payload);
    }
    let length = reader.u32()? as usize;
    let mut data = reader.bytes(length)?;
    if let Some((0, rest)) = data.split_last() {
        data = rest;
    }
    response(ControlResponse::SoftwareVersion {
        status,
        version: decode_latin1(data),
    })
}

pub fn decode_buffer_overflow(service_id: u32, reader: &mut PayloadReader<'_>) -> Result<ControlPayload> {
    let status = reader.u8()?;
    if let Some(payload) = failed_status(service_id, status) {
        return Ok(payload);
    }
    response(ControlResponse::BufferOverflow {
        status,
        counter: reader.u32()?,
    })
}

/// Nanoseconds, then seconds since the epoch as a 48-bit value split low/high
pub fn decode_sync_timestamp(service_id: u32, reader: &mut PayloadReader<'_>) -> Result<ControlPayload> {
    let status = reader.u8()?;
    if let Some(payload) = failed_status(service_id, status) {
        return Ok(payload);
    }
    let nanoseconds = reader.u32()?;
    let low = reader.u32()? as u64;
    let high = reader.u16()? as u64;
    response(ControlResponse::SyncTimeStamp {
        status,
        seconds: (high << 32) | low,
        nanoseconds,
    })
}

pub fn decode_unregister_context(service_id: u32, reader: &mut PayloadReader<'_>) -> Result<ControlPayload> {
    let status = reader.u8()?;
    if let Some(payload) = failed_status(service_id, status) {
        return Ok(payload);
    }
    response(ControlResponse::UnregisterContext {
        status,
        app_id: id(reader)?,
        ctx_id: id(reader)?,
        com_interface: id(reader)?,
    })
}

pub fn decode_connection_info(service_id: u32, reader: &mut PayloadReader<'_>) -> Result<ControlPayload> {
    let status = reader.u8()?;
    if let Some(payload) = failed_status(service_id, status) {
        return Ok(payload);
    }
    response(ControlResponse::ConnectionInfo {
        status,
        state: reader.u8()?,
        com_interface: id(reader)?,
    })
}

pub fn decode_time_zone(service_id: u32, reader: &mut PayloadReader<'_>) -> Result<ControlPayload> {
    let status = reader.u8()?;
    if let Some(payload) = failed_status(service_id, status) {
        return Ok(payload);
    }
    response(ControlResponse::TimeZone {
        status,
        offset_secs: reader.i32()?,
        is_dst: reader.u8()? != 0,
    })
}

pub fn decode_sw_injection_response(service_id: u32, reader: &mut PayloadReader<'_>) -> Result<ControlPayload> {
    response(ControlResponse::SwInjection {
        service_id,
        status: reader.u8()?,
    })
}

fn read_description(reader: &mut PayloadReader<'_>) -> Result<String> {
    let length = reader.u16()? as usize;
    let mut data = reader.bytes(length)?;
    if let Some((0, rest)) = data.split_last() {
        data = rest;
    }
    Ok(String::from_utf8_lossy(data).into_owned())
}

fn read_context(reader: &mut PayloadReader<'_>, status: u8) -> Result<ContextInfo> {
    let mut ctx = ContextInfo {
        id: id(reader)?,
        ..ContextInfo::default()
    };
    if matches!(
        status,
        status::WITH_LOG_NO_TRACE | status::WITH_LOG_WITH_TRACE | status::FULL_INFO
    ) {
        ctx.log_level = Some(reader.i8()?);
    }
    if matches!(
        status,
        status::NO_LOG_WITH_TRACE | status::WITH_LOG_WITH_TRACE | status::FULL_INFO
    ) {
        ctx.trace_status = Some(reader.i8()?);
    }
    if status == status::FULL_INFO {
        ctx.description = Some(read_description(reader)?);
    }
    Ok(ctx)
}

/// get_log_info response
///
/// Status 3 to 7 carry an application list whose per-context fields depend on
/// the status; 0, 8 and 9 carry only the com interface. Any other status is a
/// decode failure.
pub fn decode_log_info(service_id: u32, reader: &mut PayloadReader<'_>) -> Result<ControlPayload> {
    let status = reader.u8()?;
    match status {
        status::NOT_SUPPORTED | status::ERROR if reader.remaining() < 4 => {
            Ok(ControlPayload::Response(ControlResponse::Status { service_id, status }))
        }
        status::OK | status::NOT_SUPPORTED | status::ERROR | status::NO_MATCH | status::OVERFLOW => {
            response(ControlResponse::LogInfo {
                status,
                apps: Vec::new(),
                com_interface: id(reader)?,
            })
        }
        status::NO_LOG_NO_TRACE..=status::FULL_INFO => {
            let app_count = reader.u16()?;
            let mut apps = Vec::with_capacity(app_count as usize);
            for _ in 0..app_count {
                let app_id = id(reader)?;
                let ctx_count = reader.u16()?;
                let mut contexts = Vec::with_capacity(ctx_count as usize);
                for _ in 0..ctx_count {
                    contexts.push(read_context(reader, status)?);
                }
                let description = if status == status::FULL_INFO {
                    Some(read_description(reader)?)
                } else {
                    None
                };
                apps.push(AppInfo {
                    id: app_id,
                    contexts,
                    description,
                });
            }
            response(ControlResponse::LogInfo {
                status,
                apps,
                com_interface: id(reader)?,
            })
        }
        other => Err(DecoderError::invalid(format!(
            "get_log_info response with unrecognized status {}",
            other
        ))),
    }
}

fn write_description(writer: &mut PayloadWriter, description: Option<&str>) -> Result<()> {
    let bytes = description.unwrap_or_default().as_bytes();
    let length = u16::try_from(bytes.len() + 1)
        .map_err(|_| DecoderError::EncodeNotSupported("description longer than 65534 bytes".to_string()))?;
    writer.u16(length);
    writer.bytes(bytes);
    writer.u8(0);
    Ok(())
}

fn write_log_info(writer: &mut PayloadWriter, status: u8, apps: &[AppInfo]) -> Result<()> {
    let count = |n: usize| {
        u16::try_from(n).map_err(|_| DecoderError::EncodeNotSupported("too many log info entries".to_string()))
    };

    writer.u16(count(apps.len())?);
    for app in apps {
        writer.id(&app.id);
        writer.u16(count(app.contexts.len())?);
        for ctx in &app.contexts {
            writer.id(&ctx.id);
            if matches!(
                status,
                status::WITH_LOG_NO_TRACE | status::WITH_LOG_WITH_TRACE | status::FULL_INFO
            ) {
                writer.i8(ctx.log_level.unwrap_or(-1));
            }
            if matches!(
                status,
                status::NO_LOG_WITH_TRACE | status::WITH_LOG_WITH_TRACE | status::FULL_INFO
            ) {
                writer.i8(ctx.trace_status.unwrap_or(-1));
            }
            if status == status::FULL_INFO {
                write_description(writer, ctx.description.as_deref())?;
            }
        }
        if status == status::FULL_INFO {
            write_description(writer, app.description.as_deref())?;
        }
    }
    Ok(())
}

/// Writes any [`ControlResponse`]
pub fn encode_response(payload: &ControlPayload, writer: &mut PayloadWriter) -> Result<()> {
    let response = match payload {
        ControlPayload::Response(response) => response,
        _ => return Err(not_supported(payload)),
    };

    writer.u32(response.service_id());
    writer.u8(response.status());
    match response {
        ControlResponse::Status { .. } | ControlResponse::SwInjection { .. } => {}
        ControlResponse::LogLevel { log_level, .. } => writer.i8(*log_level),
        ControlResponse::Enabled { enabled, .. } => writer.u8(u8::from(*enabled)),
        ControlResponse::LogInfo {
            status,
            apps,
            com_interface,
        } => {
            match *status {
                status::NO_LOG_NO_TRACE..=status::FULL_INFO => write_log_info(writer, *status, apps)?,
                status::OK | status::NOT_SUPPORTED | status::ERROR | status::NO_MATCH | status::OVERFLOW => {}
                _ => return Err(not_supported(payload)),
            }
            writer.id(com_interface);
        }
        ControlResponse::SoftwareVersion { version, .. } => {
            let bytes: Vec<u8> = version
                .chars()
                .map(|c| u8::try_from(c).unwrap_or(b'?'))
                .collect();
            writer.u32(bytes.len() as u32 + 1);
            writer.bytes(&bytes);
            writer.u8(0);
        }
        ControlResponse::BufferOverflow { counter, .. } => writer.u32(*counter),
        ControlResponse::SyncTimeStamp {
            seconds,
            nanoseconds,
            ..
        } => {
            writer.u32(*nanoseconds);
            writer.u32(*seconds as u32);
            writer.u16((*seconds >> 32) as u16);
        }
        ControlResponse::UnregisterContext {
            app_id,
            ctx_id,
            com_interface,
            ..
        } => {
            writer.id(app_id);
            writer.id(ctx_id);
            writer.id(com_interface);
        }
        ControlResponse::ConnectionInfo {
            state,
            com_interface,
            ..
        } => {
            writer.u8(*state);
            writer.id(com_interface);
        }
        ControlResponse::TimeZone {
            offset_secs, is_dst, ..
        } => {
            writer.i32(*offset_secs);
            writer.u8(u8::from(*is_dst));
        }
        ControlResponse::Custom { data, .. } => writer.bytes(data),
    }
    Ok(())
}

/// Service IDs whose request has no parameters
pub const QUERY_REQUESTS: &[u32] = &[
    service::GET_DEFAULT_LOG_LEVEL,
    service::STORE_CONFIG,
    service::RESET_FACTORY_DEFAULT,
    service::GET_LOCAL_TIME,
    service::GET_SOFTWARE_VERSION,
    service::MESSAGE_BUFFER_OVERFLOW,
    service::GET_DEFAULT_TRACE_STATUS,
    service::GET_VERBOSE_MODE,
    service::GET_MESSAGE_FILTERING,
    service::GET_USE_ECU_ID,
    service::GET_USE_SESSION_ID,
    service::GET_USE_TIMESTAMP,
    service::GET_USE_EXTENDED_HEADER,
    service::BUFFER_OVERFLOW,
    service::SYNC_TIMESTAMP,
];

/// Service IDs whose request is a single on/off byte
pub const ENABLE_REQUESTS: &[u32] = &[
    service::SET_VERBOSE_MODE,
    service::SET_MESSAGE_FILTERING,
    service::SET_TIMING_PACKETS,
    service::USE_ECU_ID,
    service::USE_SESSION_ID,
    service::USE_TIMESTAMP,
    service::USE_EXTENDED_HEADER,
];

/// Service IDs whose response is only a status byte
pub const STATUS_RESPONSES: &[u32] = &[
    service::SET_LOG_LEVEL,
    service::SET_TRACE_STATUS,
    service::STORE_CONFIG,
    service::RESET_FACTORY_DEFAULT,
    service::SET_VERBOSE_MODE,
    service::SET_MESSAGE_FILTERING,
    service::SET_TIMING_PACKETS,
    service::GET_LOCAL_TIME,
    service::USE_ECU_ID,
    service::USE_SESSION_ID,
    service::USE_TIMESTAMP,
    service::USE_EXTENDED_HEADER,
    service::SET_DEFAULT_LOG_LEVEL,
    service::SET_DEFAULT_TRACE_STATUS,
    service::MARKER,
];

/// Service IDs whose response is a status and one flag byte
pub const ENABLED_RESPONSES: &[u32] = &[
    service::MESSAGE_BUFFER_OVERFLOW,
    service::GET_DEFAULT_TRACE_STATUS,
    service::GET_VERBOSE_MODE,
    service::GET_MESSAGE_FILTERING,
    service::GET_USE_ECU_ID,
    service::GET_USE_SESSION_ID,
    service::GET_USE_TIMESTAMP,
    service::GET_USE_EXTENDED_HEADER,
    service::GET_TRACE_STATUS,
];

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(
        decoder: fn(u32, &mut PayloadReader<'_>) -> Result<ControlPayload>,
        data: &[u8],
        big_endian: bool,
    ) -> Result<(ControlPayload, usize)> {
        let mut reader = PayloadReader::new(data, big_endian);
        let service_id = reader.u32()?;
        let payload = decoder(service_id, &mut reader)?;
        Ok((payload, reader.position()))
    }

    #[test]
    fn test_get_log_info_request_bytes() {
        let payload = ControlPayload::Request(ControlRequest::GetLogInfo {
            options: 7,
            app_id: "APP1".to_string(),
            ctx_id: "CTX1".to_string(),
            com_interface: String::new(),
        });
        let mut writer = PayloadWriter::new(true);
        encode_request(&payload, &mut writer).unwrap();
        assert_eq!(
            writer.as_slice(),
            &[
                0x00, 0x00, 0x00, 0x03, 0x07, 0x41, 0x50, 0x50, 0x31, 0x43, 0x54, 0x58, 0x31, 0x00,
                0x00, 0x00, 0x00
            ]
        );

        let (decoded, len) = decode(decode_get_log_info_request, writer.as_slice(), true).unwrap();
        assert_eq!(len, 17);
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_set_log_level_little_endian() {
        let data = [
            0x01, 0x00, 0x00, 0x00, b'A', b'P', b'P', b'1', b'C', b'T', b'X', b'1', 0xFF, 0, 0, 0, 0,
        ];
        let (payload, len) = decode(decode_set_log_level, &data, false).unwrap();
        assert_eq!(len, 17);
        assert_eq!(payload.to_string(), "[set_log_level] default APP1 (CTX1)");
    }

    #[test]
    fn test_short_request_fails() {
        let data = [0x01, 0x00, 0x00, 0x00, b'A', b'P'];
        assert!(decode(decode_set_log_level, &data, false).is_err());
    }

    #[test]
    fn test_sw_injection_request() {
        let data = [0x00, 0x10, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00, 0x41, 0x42, 0x43, 0x44];
        let (payload, len) = decode(decode_sw_injection_request, &data, false).unwrap();
        assert_eq!(len, 12);
        assert_eq!(
            payload,
            ControlPayload::Request(ControlRequest::SwInjection {
                service_id: 0x1000,
                payload: b"ABCD".to_vec(),
            })
        );

        // Length must match the remaining payload
        let data = [0x00, 0x10, 0x00, 0x00, 0x05, 0x00, 0x00, 0x00, 0x41, 0x42, 0x43, 0x44];
        assert!(decode(decode_sw_injection_request, &data, false).is_err());
    }

    #[test]
    fn test_failed_status_is_status_only() {
        let data = [0x04, 0x00, 0x00, 0x00, status::NOT_SUPPORTED];
        let (payload, len) = decode(decode_log_level_response, &data, false).unwrap();
        assert_eq!(len, 5);
        assert_eq!(
            payload,
            ControlPayload::Response(ControlResponse::Status {
                service_id: 0x04,
                status: status::NOT_SUPPORTED,
            })
        );
    }

    #[test]
    fn test_software_version_strips_nul() {
        let data = [
            0x13, 0x00, 0x00, 0x00, 0x00, 0x06, 0x00, 0x00, 0x00, b'1', b'.', b'2', b'.', b'3', 0x00,
        ];
        let (payload, len) = decode(decode_software_version, &data, false).unwrap();
        assert_eq!(len, data.len());
        assert_eq!(payload.to_string(), "[get_software_version ok] 1.2.3");
    }

    #[test]
    fn test_log_info_round_trip() {
        let payload = ControlPayload::Response(ControlResponse::LogInfo {
            status: status::FULL_INFO,
            apps: vec![AppInfo {
                id: "APP1".to_string(),
                contexts: vec![ContextInfo {
                    id: "CTX1".to_string(),
                    log_level: Some(4),
                    trace_status: Some(1),
                    description: Some("context".to_string()),
                }],
                description: Some("application".to_string()),
            }],
            com_interface: "com1".to_string(),
        });

        for big_endian in [false, true] {
            let mut writer = PayloadWriter::new(big_endian);
            encode_response(&payload, &mut writer).unwrap();
            let (decoded, len) = decode(decode_log_info, writer.as_slice(), big_endian).unwrap();
            assert_eq!(len, writer.len());
            assert_eq!(decoded, payload);
        }
    }

    #[test]
    fn test_log_info_unknown_status_fails() {
        let data = [0x03, 0x00, 0x00, 0x00, 0x0A, 0x00, 0x00, 0x00, 0x00];
        assert!(decode(decode_log_info, &data, false).is_err());
    }

    #[test]
    fn test_sync_timestamp_round_trip() {
        let payload = ControlPayload::Response(ControlResponse::SyncTimeStamp {
            status: status::OK,
            seconds: 0x1_0000_0002,
            nanoseconds: 500,
        });
        let mut writer = PayloadWriter::new(false);
        encode_response(&payload, &mut writer).unwrap();
        assert_eq!(writer.len(), 15);
        let (decoded, _) = decode(decode_sync_timestamp, writer.as_slice(), false).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_encode_role_mismatch() {
        let payload = ControlPayload::Request(ControlRequest::Query { service_id: 0x04 });
        let mut writer = PayloadWriter::new(false);
        assert!(matches!(
            encode_response(&payload, &mut writer),
            Err(DecoderError::EncodeNotSupported(_))
        ));
    }
}
