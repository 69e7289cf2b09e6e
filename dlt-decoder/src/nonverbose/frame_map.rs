//! Frame map for non-verbose messages
//!
//! A non-verbose packet carries only a message ID followed by packed
//! argument data. The frame map supplies the layout: for each message ID an
//! ordered list of PDUs, each naming its wire type and length.

use crate::dlt_type::DltType;
use crate::types::{DecoderError, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// One argument slot of a non-verbose frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pdu {
    /// Wire type name, e.g. `S_UINT32`
    #[serde(rename = "type")]
    pub pdu_type: String,
    /// Length in bytes; 0 means a 2-byte length prefix precedes the data
    #[serde(default)]
    pub length: u16,
    /// Static text; the PDU then occupies no payload bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Pdu {
    pub fn new(pdu_type: impl Into<String>, length: u16) -> Self {
        Self {
            pdu_type: pdu_type.into(),
            length,
            description: None,
        }
    }

    /// A PDU that only contributes fixed text
    pub fn text(description: impl Into<String>) -> Self {
        Self {
            pdu_type: String::new(),
            length: 0,
            description: Some(description.into()),
        }
    }
}

/// A non-verbose message definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Message ID
    pub id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ecu_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ctx_id: Option<String>,
    /// Message type assigned to lines without an extended header
    #[serde(default = "default_message_type")]
    pub message_type: DltType,
    /// Arguments in payload order
    #[serde(default)]
    pub pdus: Vec<Pdu>,
}

fn default_message_type() -> DltType {
    DltType::LogInfo
}

impl Frame {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            ecu_id: None,
            app_id: None,
            ctx_id: None,
            message_type: default_message_type(),
            pdus: Vec::new(),
        }
    }

    pub fn with_app_ctx(mut self, app_id: impl Into<String>, ctx_id: impl Into<String>) -> Self {
        self.app_id = Some(app_id.into());
        self.ctx_id = Some(ctx_id.into());
        self
    }

    pub fn with_ecu(mut self, ecu_id: impl Into<String>) -> Self {
        self.ecu_id = Some(ecu_id.into());
        self
    }

    pub fn with_type(mut self, message_type: DltType) -> Self {
        self.message_type = message_type;
        self
    }

    pub fn with_pdu(mut self, pdu: Pdu) -> Self {
        self.pdus.push(pdu);
        self
    }
}

/// Looks up the frame describing a non-verbose message
///
/// The identifiers are those of the packet being decoded; any of them may be
/// absent when the packet has no extended header or no ECU ID.
pub trait FrameMap: Send + Sync {
    fn get_frame(
        &self,
        id: u32,
        app_id: Option<&str>,
        ctx_id: Option<&str>,
        ecu_id: Option<&str>,
    ) -> Option<&Frame>;
}

/// Frame map statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameMapStats {
    pub num_frames: usize,
    pub num_pdus: usize,
}

/// In-memory frame map
///
/// Frames are indexed three ways. A frame with an ECU ID is found by
/// (ECU, ID); a frame with application and context IDs by (app, ctx, ID);
/// every frame is also reachable by its ID alone, where the first frame added
/// for an ID wins.
#[derive(Debug, Default)]
pub struct DefaultFrameMap {
    frames: Vec<Frame>,
    by_ecu: HashMap<(String, u32), usize>,
    by_app_ctx: HashMap<(String, String, u32), usize>,
    by_id: HashMap<u32, usize>,
}

impl DefaultFrameMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a frame
    ///
    /// # Errors
    /// `DuplicateFrame` if a frame with the same qualified key exists; the
    /// map is unchanged in that case.
    pub fn add_frame(&mut self, frame: Frame) -> Result<()> {
        let ecu_key = frame.ecu_id.clone().map(|ecu| (ecu, frame.id));
        let app_ctx_key = match (&frame.app_id, &frame.ctx_id) {
            (Some(app), Some(ctx)) => Some((app.clone(), ctx.clone(), frame.id)),
            _ => None,
        };

        let duplicate = match (&ecu_key, &app_ctx_key) {
            (Some(key), _) => self.by_ecu.contains_key(key),
            (None, Some(key)) => self.by_app_ctx.contains_key(key),
            (None, None) => self.by_id.contains_key(&frame.id),
        };
        if duplicate {
            return Err(DecoderError::DuplicateFrame(format!(
                "ecu={:?} app={:?} ctx={:?} id={}",
                frame.ecu_id, frame.app_id, frame.ctx_id, frame.id
            )));
        }

        let index = self.frames.len();
        if let Some(key) = ecu_key {
            self.by_ecu.insert(key, index);
        }
        if let Some(key) = app_ctx_key {
            self.by_app_ctx.entry(key).or_insert(index);
        }
        self.by_id.entry(frame.id).or_insert(index);
        self.frames.push(frame);
        Ok(())
    }

    /// Builds a frame map from a JSON array of frames
    pub fn from_json(json: &str) -> Result<Self> {
        let frames: Vec<Frame> = serde_json::from_str(json)?;
        let mut map = Self::new();
        for frame in frames {
            map.add_frame(frame)?;
        }
        Ok(map)
    }

    /// Loads a JSON frame map file
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading frame map: {}", path.display());
        let json = std::fs::read_to_string(path)?;
        let map = Self::from_json(&json)?;
        let stats = map.stats();
        info!(
            "Loaded frame map {}: {} frames, {} PDUs",
            path.display(),
            stats.num_frames,
            stats.num_pdus
        );
        Ok(map)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn stats(&self) -> FrameMapStats {
        FrameMapStats {
            num_frames: self.frames.len(),
            num_pdus: self.frames.iter().map(|f| f.pdus.len()).sum(),
        }
    }
}

impl FrameMap for DefaultFrameMap {
    fn get_frame(
        &self,
        id: u32,
        app_id: Option<&str>,
        ctx_id: Option<&str>,
        ecu_id: Option<&str>,
    ) -> Option<&Frame> {
        let ecu_hit = ecu_id.and_then(|ecu| self.by_ecu.get(&(ecu.to_string(), id)));
        let app_ctx_hit = || match (app_id, ctx_id) {
            (Some(app), Some(ctx)) => self
                .by_app_ctx
                .get(&(app.to_string(), ctx.to_string(), id)),
            _ => None,
        };
        let index = ecu_hit
            .or_else(app_ctx_hit)
            .or_else(|| self.by_id.get(&id))?;
        self.frames.get(*index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_order() {
        let mut map = DefaultFrameMap::new();
        map.add_frame(Frame::new(1).with_pdu(Pdu::text("plain"))).unwrap();
        map.add_frame(
            Frame::new(1)
                .with_app_ctx("APP1", "CTX1")
                .with_pdu(Pdu::text("app")),
        )
        .unwrap();
        map.add_frame(Frame::new(1).with_ecu("ECU1").with_pdu(Pdu::text("ecu")))
            .unwrap();

        let text = |frame: Option<&Frame>| frame.and_then(|f| f.pdus[0].description.clone());
        assert_eq!(text(map.get_frame(1, None, None, None)), Some("plain".to_string()));
        assert_eq!(
            text(map.get_frame(1, Some("APP1"), Some("CTX1"), Some("ECU2"))),
            Some("app".to_string())
        );
        assert_eq!(
            text(map.get_frame(1, Some("APP1"), Some("CTX1"), Some("ECU1"))),
            Some("ecu".to_string())
        );
        assert_eq!(
            text(map.get_frame(1, Some("APP2"), Some("CTX1"), None)),
            Some("plain".to_string())
        );
        assert!(map.get_frame(2, None, None, None).is_none());
    }

    #[test]
    fn test_duplicate_frame() {
        let mut map = DefaultFrameMap::new();
        map.add_frame(Frame::new(7).with_app_ctx("A", "C")).unwrap();
        let err = map.add_frame(Frame::new(7).with_app_ctx("A", "C")).unwrap_err();
        assert!(matches!(err, DecoderError::DuplicateFrame(_)));
        assert_eq!(map.len(), 1);

        // Same ID under another context is fine
        map.add_frame(Frame::new(7).with_app_ctx("A", "D")).unwrap();
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_from_json() {
        let json = r#"[
            { "id": 10, "app_id": "APP1", "ctx_id": "CTX1", "message_type": "LOG_WARN",
              "pdus": [ { "type": "S_UINT16", "length": 2 }, { "type": "", "description": "volts" } ] },
            { "id": 11 }
        ]"#;
        let map = DefaultFrameMap::from_json(json).unwrap();
        assert_eq!(map.stats(), FrameMapStats { num_frames: 2, num_pdus: 2 });

        let frame = map.get_frame(10, Some("APP1"), Some("CTX1"), None).unwrap();
        assert_eq!(frame.message_type, DltType::LogWarn);
        assert_eq!(frame.pdus[0], Pdu::new("S_UINT16", 2));
        assert_eq!(map.get_frame(11, None, None, None).unwrap().message_type, DltType::LogInfo);
    }

    #[test]
    fn test_from_json_invalid() {
        let err = DefaultFrameMap::from_json("{ not json").unwrap_err();
        assert!(matches!(err, DecoderError::FrameMapParseError(_)));
    }

    #[test]
    fn test_load_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frames.json");
        std::fs::write(&path, r#"[{ "id": 1, "pdus": [{ "type": "S_BOOL", "length": 1 }] }]"#).unwrap();
        let map = DefaultFrameMap::load_json(&path).unwrap();
        assert_eq!(map.len(), 1);

        let missing = DefaultFrameMap::load_json(dir.path().join("missing.json"));
        assert!(matches!(missing, Err(DecoderError::IoError(_))));
    }
}
