//! Non-verbose payload decoding
//!
//! A non-verbose payload starts with a 32-bit message ID. With a frame map
//! the remaining bytes are split into arguments following the frame's PDUs,
//! each decoded by the wire type registered under the PDU's type name.
//! Without a frame map, or when anything about the frame does not fit the
//! payload, the line gets a single [`DltArg::NonVerbose`] argument holding
//! the bytes after the message ID.

pub mod args;
pub mod frame_map;

pub use args::{
    BoolDecoder, FloatDecoder, IntDecoder, IntDisplay, NonVerboseArgDecoder, RawDecoder,
    StringDecoder, UnknownDecoder,
};
pub use frame_map::{DefaultFrameMap, Frame, FrameMap, FrameMapStats, Pdu};

use crate::args::{DltArg, IntWidth, StringCoding};
use crate::builder::LineBuilder;
use crate::types::{DecoderError, Result};
use crate::wire::PayloadReader;
use log::{debug, trace};
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of wire type decoders plus an optional frame map
pub struct NonVerboseCodec {
    decoders: HashMap<String, Arc<dyn NonVerboseArgDecoder>>,
    unknown: Arc<dyn NonVerboseArgDecoder>,
    frame_map: Option<Arc<dyn FrameMap>>,
}

impl std::fmt::Debug for NonVerboseCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<&String> = self.decoders.keys().collect();
        types.sort();
        f.debug_struct("NonVerboseCodec")
            .field("types", &types)
            .field("frame_map", &self.frame_map.is_some())
            .finish()
    }
}

impl Default for NonVerboseCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl NonVerboseCodec {
    /// Creates a codec with the standard wire types and no frame map
    pub fn new() -> Self {
        let mut codec = Self {
            decoders: HashMap::new(),
            unknown: Arc::new(UnknownDecoder),
            frame_map: None,
        };

        codec.insert("S_BOOL", BoolDecoder);
        let widths = [
            (8, IntWidth::W8),
            (16, IntWidth::W16),
            (32, IntWidth::W32),
            (64, IntWidth::W64),
        ];
        for (bits, width) in widths {
            codec.insert(&format!("S_SINT{}", bits), IntDecoder::new(width, IntDisplay::Signed));
            codec.insert(&format!("S_UINT{}", bits), IntDecoder::new(width, IntDisplay::Unsigned));
            codec.insert(&format!("S_HEX{}", bits), IntDecoder::new(width, IntDisplay::Hex));
            codec.insert(&format!("S_BIN{}", bits), IntDecoder::new(width, IntDisplay::Binary));
        }
        codec.insert("S_FLOA32", FloatDecoder::f32());
        codec.insert("S_FLOA64", FloatDecoder::f64());
        codec.insert("S_RAW", RawDecoder);
        codec.insert("S_RAWD", RawDecoder);
        codec.insert("S_STRG_ASCII", StringDecoder::new(StringCoding::Ascii));
        codec.insert("S_STRG_UTF8", StringDecoder::new(StringCoding::Utf8));
        codec.insert("S_UTF8", StringDecoder::new(StringCoding::Utf8));
        codec
    }

    fn insert(&mut self, pdu_type: &str, decoder: impl NonVerboseArgDecoder + 'static) {
        self.decoders.insert(pdu_type.to_string(), Arc::new(decoder));
    }

    pub fn with_frame_map(mut self, frame_map: Arc<dyn FrameMap>) -> Self {
        self.frame_map = Some(frame_map);
        self
    }

    pub fn set_frame_map(&mut self, frame_map: Option<Arc<dyn FrameMap>>) {
        self.frame_map = frame_map;
    }

    pub fn frame_map(&self) -> Option<&Arc<dyn FrameMap>> {
        self.frame_map.as_ref()
    }

    /// Registers a decoder for a wire type name, replacing any existing one
    ///
    /// # Errors
    /// `Usage` if the name is empty
    pub fn register(
        &mut self,
        pdu_type: &str,
        decoder: Arc<dyn NonVerboseArgDecoder>,
    ) -> Result<()> {
        if pdu_type.is_empty() {
            return Err(DecoderError::Usage("empty PDU type name".to_string()));
        }
        if self.decoders.insert(pdu_type.to_string(), decoder).is_some() {
            debug!("Replaced non-verbose decoder for {}", pdu_type);
        }
        Ok(())
    }

    /// Removes a wire type; its PDUs then decode with the unknown decoder
    ///
    /// # Errors
    /// `Usage` if the name is empty
    pub fn unregister(&mut self, pdu_type: &str) -> Result<bool> {
        if pdu_type.is_empty() {
            return Err(DecoderError::Usage("empty PDU type name".to_string()));
        }
        Ok(self.decoders.remove(pdu_type).is_some())
    }

    pub fn is_registered(&self, pdu_type: &str) -> bool {
        self.decoders.contains_key(pdu_type)
    }

    /// Decodes a single argument
    pub fn decode_arg(&self, buf: &[u8], big_endian: bool, pdu: &Pdu) -> Result<(DltArg, usize)> {
        if let Some(description) = &pdu.description {
            return Ok((DltArg::string(description.clone()), 0));
        }
        let decoder = self.decoders.get(&pdu.pdu_type).unwrap_or(&self.unknown);
        decoder.decode(buf, big_endian, pdu)
    }

    /// Decodes all arguments of a frame; the payload must be used up exactly
    pub fn decode_frame(&self, buf: &[u8], big_endian: bool, frame: &Frame) -> Result<Vec<DltArg>> {
        let mut args = Vec::with_capacity(frame.pdus.len());
        let mut offset = 0;
        for pdu in &frame.pdus {
            let (arg, consumed) = self.decode_arg(&buf[offset..], big_endian, pdu)?;
            offset += consumed;
            args.push(arg);
        }
        if offset != buf.len() {
            return Err(DecoderError::invalid(format!(
                "frame {} used {} of {} payload bytes",
                frame.id,
                offset,
                buf.len()
            )));
        }
        Ok(args)
    }

    /// Decodes a non-verbose payload into the builder
    ///
    /// # Returns
    /// The number of bytes consumed, which is always the whole payload
    pub fn decode(&self, buf: &[u8], builder: &mut LineBuilder) -> usize {
        let big_endian = builder.is_big_endian();
        if buf.len() < 4 {
            builder
                .set_message_id(0)
                .add_arg(DltArg::NonVerbose(Vec::new()));
            return buf.len();
        }

        let mut reader = PayloadReader::new(buf, big_endian);
        let message_id = match reader.u32() {
            Ok(id) => id,
            Err(_) => return buf.len(),
        };
        let payload = reader.rest();
        builder.set_message_id(message_id);

        if let Some(frame) = self.find_frame(message_id, builder) {
            match self.decode_frame(payload, big_endian, frame) {
                Ok(args) => {
                    apply_frame_ids(frame, builder);
                    builder.add_args(args);
                    return buf.len();
                }
                Err(e) => trace!("Message ID {} falls back to raw: {}", message_id, e),
            }
        }

        builder.add_arg(DltArg::NonVerbose(payload.to_vec()));
        buf.len()
    }

    fn find_frame(&self, message_id: u32, builder: &LineBuilder) -> Option<&Frame> {
        let map = self.frame_map.as_ref()?;
        let features = builder.features();
        let app_id = features.app_id().then(|| builder.app_id());
        let ctx_id = features.ctx_id().then(|| builder.ctx_id());
        let ecu_id = features.ecu_id().then(|| builder.ecu_id());
        map.get_frame(message_id, app_id, ctx_id, ecu_id)
    }
}

/// Fills identifiers and type from the frame where the packet had none
fn apply_frame_ids(frame: &Frame, builder: &mut LineBuilder) {
    let features = builder.features();
    let cache = crate::id_cache::IdCache::global();
    let intern = |id: &str| cache.parse_id(crate::id_cache::id_to_u32(id));

    if !features.app_id() {
        if let Some(app_id) = &frame.app_id {
            builder.set_app_id(intern(app_id));
        }
    }
    if !features.ctx_id() {
        if let Some(ctx_id) = &frame.ctx_id {
            builder.set_ctx_id(intern(ctx_id));
        }
    }
    if !features.ecu_id() {
        if let Some(ecu_id) = &frame.ecu_id {
            builder.set_ecu_id(intern(ecu_id));
        }
    }
    if !features.message_type() {
        builder.set_dlt_type(frame.message_type);
    }
}
