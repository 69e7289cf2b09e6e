//! Decoder configuration types
//!
//! This module defines the configuration needed to build a
//! [`TraceDecoder`](crate::decoder::TraceDecoder). Everything about output
//! (which lines to print, how to format them) belongs to the application
//! layer.

use crate::decoder::Format;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the decoder library
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoderConfig {
    /// Framing of packets in the input
    #[serde(default)]
    pub format: Format,

    /// Stamp lines with the wall clock instead of storage header time
    #[serde(default)]
    pub online: bool,

    /// Optional JSON frame map for non-verbose messages
    #[serde(default)]
    pub frame_map: Option<PathBuf>,
}

impl DecoderConfig {
    /// Create a new decoder configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the capture format
    pub fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    /// Builder method: enable online time stamping
    pub fn with_online(mut self, online: bool) -> Self {
        self.online = online;
        self
    }

    /// Builder method: set the frame map file
    pub fn with_frame_map(mut self, path: impl Into<PathBuf>) -> Self {
        self.frame_map = Some(path.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoder_config_builder() {
        let config = DecoderConfig::new()
            .with_format(Format::Serial)
            .with_online(true)
            .with_frame_map("frames.json");

        assert_eq!(config.format, Format::Serial);
        assert!(config.online);
        assert_eq!(config.frame_map, Some(PathBuf::from("frames.json")));
    }

    #[test]
    fn test_defaults() {
        let config = DecoderConfig::new();
        assert_eq!(config.format, Format::File);
        assert!(!config.online);
        assert!(config.frame_map.is_none());
    }

    #[test]
    fn test_deserialize() {
        let config: DecoderConfig =
            serde_json::from_str(r#"{ "format": "network", "frame_map": "map.json" }"#).unwrap();
        assert_eq!(config.format, Format::Network);
        assert!(!config.online);
        assert_eq!(config.frame_map, Some(PathBuf::from("map.json")));
    }
}
