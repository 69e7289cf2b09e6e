//! Service registry for control message dispatch
//!
//! The registry maps `(service ID, role)` to a decode/encode function pair.
//! Callers can replace or remove entries at runtime. Service IDs from
//! [`SW_INJECTION_FIRST`] upwards that have no entry fall back to the
//! software injection codec, so they stay decodable and encodable whatever
//! the registry state.

use super::services::{self, ENABLED_RESPONSES, ENABLE_REQUESTS, QUERY_REQUESTS, STATUS_RESPONSES};
use super::{service, ControlPayload, ControlResponse, SW_INJECTION_FIRST};
use crate::dlt_type::DltType;
use crate::types::{DecoderError, Result};
use crate::wire::{PayloadReader, PayloadWriter};
use log::{debug, warn};
use std::collections::HashMap;
use std::fmt;

/// Decodes a service payload; the reader is positioned after the service ID
pub type ControlDecodeFn = fn(u32, &mut PayloadReader<'_>) -> Result<ControlPayload>;

/// Encodes a complete service payload including the service ID
pub type ControlEncodeFn = fn(&ControlPayload, &mut PayloadWriter) -> Result<()>;

/// Direction of a control message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlRole {
    Request,
    Response,
}

impl ControlRole {
    /// The role of a control message type; `None` for every other type
    pub fn from_dlt_type(dlt_type: DltType) -> Option<Self> {
        match dlt_type {
            DltType::ControlRequest => Some(ControlRole::Request),
            DltType::ControlResponse => Some(ControlRole::Response),
            _ => None,
        }
    }
}

/// A decode/encode pair for one service and role
#[derive(Clone, Copy)]
pub struct ControlService {
    pub decode: ControlDecodeFn,
    pub encode: ControlEncodeFn,
}

impl fmt::Debug for ControlService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlService").finish_non_exhaustive()
    }
}

impl ControlService {
    pub fn new(decode: ControlDecodeFn, encode: ControlEncodeFn) -> Self {
        Self { decode, encode }
    }

    fn request(decode: ControlDecodeFn) -> Self {
        Self::new(decode, services::encode_request)
    }

    fn response(decode: ControlDecodeFn) -> Self {
        Self::new(decode, services::encode_response)
    }
}

/// Control payload codec with a mutable service table
#[derive(Debug, Clone)]
pub struct ControlCodec {
    services: HashMap<(u32, ControlRole), ControlService>,
}

impl ControlCodec {
    /// Creates a codec with every standard and custom service registered
    pub fn new() -> Self {
        let mut table = HashMap::new();
        let mut request = |id: u32, decode: ControlDecodeFn| {
            table.insert((id, ControlRole::Request), ControlService::request(decode));
        };

        request(service::SET_LOG_LEVEL, services::decode_set_log_level);
        request(service::SET_TRACE_STATUS, services::decode_set_trace_status);
        request(service::GET_LOG_INFO, services::decode_get_log_info_request);
        request(service::SET_DEFAULT_LOG_LEVEL, services::decode_set_default_log_level);
        request(
            service::SET_DEFAULT_TRACE_STATUS,
            services::decode_set_default_trace_status,
        );
        request(service::GET_TRACE_STATUS, services::decode_get_trace_status);
        for &id in QUERY_REQUESTS {
            request(id, services::decode_query);
        }
        for &id in ENABLE_REQUESTS {
            request(id, services::decode_enable);
        }

        let mut response = |id: u32, decode: ControlDecodeFn| {
            table.insert((id, ControlRole::Response), ControlService::response(decode));
        };

        for &id in STATUS_RESPONSES {
            response(id, services::decode_status_response);
        }
        for &id in ENABLED_RESPONSES {
            response(id, services::decode_enabled_response);
        }
        response(service::GET_LOG_INFO, services::decode_log_info);
        response(service::GET_DEFAULT_LOG_LEVEL, services::decode_log_level_response);
        response(service::GET_SOFTWARE_VERSION, services::decode_software_version);
        response(service::BUFFER_OVERFLOW, services::decode_buffer_overflow);
        response(service::SYNC_TIMESTAMP, services::decode_sync_timestamp);
        response(service::UNREGISTER_CONTEXT, services::decode_unregister_context);
        response(service::CONNECTION_INFO, services::decode_connection_info);
        response(service::TIMEZONE, services::decode_time_zone);

        Self { services: table }
    }

    /// Registers a service, replacing any previous entry
    ///
    /// # Arguments
    /// * `service_id` - Service identifier
    /// * `dlt_type` - `ControlRequest` or `ControlResponse`
    /// * `service` - Decode/encode pair
    ///
    /// # Returns
    /// * `Err(DecoderError::Usage)` - `dlt_type` is not a request or response type
    pub fn register(&mut self, service_id: u32, dlt_type: DltType, service: ControlService) -> Result<()> {
        let role = ControlRole::from_dlt_type(dlt_type).ok_or_else(|| {
            DecoderError::Usage(format!(
                "cannot register control service 0x{:x} for message type {}",
                service_id, dlt_type
            ))
        })?;
        debug!("Registering control {:?} service 0x{:x}", role, service_id);
        self.services.insert((service_id, role), service);
        Ok(())
    }

    /// Removes a service; returns true if it was registered
    pub fn unregister(&mut self, service_id: u32, role: ControlRole) -> bool {
        debug!("Unregistering control {:?} service 0x{:x}", role, service_id);
        self.services.remove(&(service_id, role)).is_some()
    }

    pub fn is_registered(&self, service_id: u32, role: ControlRole) -> bool {
        self.services.contains_key(&(service_id, role))
    }

    fn lookup(&self, service_id: u32, role: ControlRole) -> Option<ControlService> {
        if let Some(service) = self.services.get(&(service_id, role)) {
            return Some(*service);
        }
        if service_id < SW_INJECTION_FIRST {
            return None;
        }
        Some(match role {
            ControlRole::Request => ControlService::request(services::decode_sw_injection_request),
            ControlRole::Response => ControlService::response(services::decode_sw_injection_response),
        })
    }

    /// Decodes the payload of a control message
    ///
    /// # Returns
    /// * `Ok((payload, consumed))` - The payload and the number of bytes it used
    /// * `Err(..)` - No service for the ID, or the payload is malformed
    pub fn decode(&self, dlt_type: DltType, buf: &[u8], big_endian: bool) -> Result<(ControlPayload, usize)> {
        if dlt_type == DltType::ControlTime {
            return Ok((ControlPayload::TimeMarker, 0));
        }

        let role = ControlRole::from_dlt_type(dlt_type).ok_or_else(|| {
            DecoderError::invalid(format!("{} is not a control message type", dlt_type))
        })?;

        let mut reader = PayloadReader::new(buf, big_endian);
        let service_id = reader.u32()?;
        let service = self.lookup(service_id, role).ok_or_else(|| {
            warn!("No decoder for control {:?} service 0x{:x}", role, service_id);
            DecoderError::invalid(format!("no decoder for control service 0x{:x}", service_id))
        })?;

        let payload = (service.decode)(service_id, &mut reader).map_err(|e| {
            warn!("Failed decoding control {:?} service 0x{:x}: {}", role, service_id, e);
            e
        })?;
        Ok((payload, reader.position()))
    }

    /// Encodes a control payload
    ///
    /// A `not_supported`/`error` status-only response is written as service ID
    /// and status byte by any registered response service.
    ///
    /// # Returns
    /// * `Err(DecoderError::EncodeNotSupported)` - no service is registered
    ///   for a standard or custom range ID
    pub fn encode(&self, payload: &ControlPayload, big_endian: bool) -> Result<Vec<u8>> {
        let mut writer = PayloadWriter::new(big_endian);
        let (service_id, role) = match payload {
            ControlPayload::TimeMarker => return Ok(Vec::new()),
            ControlPayload::Request(request) => (request.service_id(), ControlRole::Request),
            ControlPayload::Response(response) => (response.service_id(), ControlRole::Response),
        };

        let service = self.lookup(service_id, role).ok_or_else(|| {
            DecoderError::EncodeNotSupported(format!(
                "control {:?} service 0x{:x} is not registered",
                role, service_id
            ))
        })?;

        match payload {
            ControlPayload::Response(ControlResponse::Status { .. }) => {
                services::encode_response(payload, &mut writer)?
            }
            _ => (service.encode)(payload, &mut writer)?,
        }
        Ok(writer.into_inner())
    }
}

impl Default for ControlCodec {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{status, ControlRequest};

    #[test]
    fn test_decode_time_marker() {
        let codec = ControlCodec::new();
        let (payload, len) = codec.decode(DltType::ControlTime, &[], false).unwrap();
        assert_eq!(payload, ControlPayload::TimeMarker);
        assert_eq!(len, 0);
    }

    #[test]
    fn test_unknown_standard_service_fails() {
        let codec = ControlCodec::new();
        let data = [0x07, 0x00, 0x00, 0x00];
        assert!(codec.decode(DltType::ControlRequest, &data, false).is_err());

        let payload = ControlPayload::Request(ControlRequest::Query { service_id: 0x07 });
        assert!(matches!(
            codec.encode(&payload, false),
            Err(DecoderError::EncodeNotSupported(_))
        ));
    }

    #[test]
    fn test_unregister_standard_service() {
        let mut codec = ControlCodec::new();
        assert!(codec.unregister(service::SET_LOG_LEVEL, ControlRole::Request));
        assert!(codec.unregister(service::SET_LOG_LEVEL, ControlRole::Response));
        assert!(!codec.unregister(service::SET_LOG_LEVEL, ControlRole::Response));

        let request = ControlPayload::Request(ControlRequest::SetLogLevel {
            app_id: "APP1".to_string(),
            ctx_id: "CTX1".to_string(),
            log_level: 4,
            com_interface: String::new(),
        });
        let response = ControlPayload::Response(ControlResponse::Status {
            service_id: service::SET_LOG_LEVEL,
            status: status::OK,
        });
        assert!(codec.encode(&request, false).is_err());
        assert!(codec.encode(&response, false).is_err());
    }

    #[test]
    fn test_sw_injection_survives_unregister() {
        let mut codec = ControlCodec::new();
        assert!(!codec.unregister(0x1000, ControlRole::Request));

        let payload = ControlPayload::Request(ControlRequest::SwInjection {
            service_id: 0x1000,
            payload: vec![0x41, 0x42, 0x43, 0x44],
        });
        let bytes = codec.encode(&payload, true).unwrap();
        assert_eq!(
            bytes,
            vec![0x00, 0x00, 0x10, 0x00, 0x04, 0x00, 0x00, 0x00, 0x41, 0x42, 0x43, 0x44]
        );

        let (decoded, len) = codec.decode(DltType::ControlRequest, &bytes, true).unwrap();
        assert_eq!(len, bytes.len());
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_sw_injection_response() {
        let codec = ControlCodec::new();
        let data = [0x00, 0x20, 0x00, 0x00, status::PENDING];
        let (payload, len) = codec.decode(DltType::ControlResponse, &data, false).unwrap();
        assert_eq!(len, 5);
        assert_eq!(payload.to_string(), "[ pending]");
    }

    fn decode_custom(service_id: u32, reader: &mut PayloadReader<'_>) -> Result<ControlPayload> {
        let status = reader.u8()?;
        let data = reader.rest().to_vec();
        reader.skip(data.len())?;
        Ok(ControlPayload::Response(ControlResponse::Custom {
            service_id,
            status,
            data,
        }))
    }

    #[test]
    fn test_register_overrides() {
        let mut codec = ControlCodec::new();
        let custom = ControlService::new(decode_custom, services::encode_response);
        codec
            .register(service::GET_VERBOSE_MODE, DltType::ControlResponse, custom)
            .unwrap();

        let data = [0x19, 0x00, 0x00, 0x00, 0x00, 0x01, 0x02];
        let (payload, len) = codec.decode(DltType::ControlResponse, &data, false).unwrap();
        assert_eq!(len, 7);
        assert_eq!(payload.to_string(), "[get_verbose_mode ok] 01 02");
        assert_eq!(codec.encode(&payload, false).unwrap(), data.to_vec());
    }

    #[test]
    fn test_register_rejects_non_control_type() {
        let mut codec = ControlCodec::new();
        let custom = ControlService::new(decode_custom, services::encode_response);
        assert!(matches!(
            codec.register(0x30, DltType::LogInfo, custom),
            Err(DecoderError::Usage(_))
        ));
        assert!(matches!(
            codec.register(0x30, DltType::ControlTime, custom),
            Err(DecoderError::Usage(_))
        ));
    }

    #[test]
    fn test_status_only_response_encodes_for_any_service() {
        let codec = ControlCodec::new();
        let payload = ControlPayload::Response(ControlResponse::Status {
            service_id: service::GET_SOFTWARE_VERSION,
            status: status::ERROR,
        });
        let bytes = codec.encode(&payload, false).unwrap();
        assert_eq!(bytes, vec![0x13, 0x00, 0x00, 0x00, 0x02]);
        let (decoded, _) = codec.decode(DltType::ControlResponse, &bytes, false).unwrap();
        assert_eq!(decoded, payload);
    }
}
