//! Configuration loading and parsing

use anyhow::{Context, Result};
use dlt_decoder::DecoderConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Main application configuration (loaded from config.toml)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub decoder: DecoderConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    /// Print lines for bytes that could not be decoded
    #[serde(default = "default_true")]
    pub show_skipped: bool,
    /// Prefix every line with its stream position
    #[serde(default)]
    pub position: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            show_skipped: default_true(),
            position: false,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    if let Some(frame_map) = &config.decoder.frame_map {
        if !frame_map.exists() {
            log::warn!("Frame map {:?} from {:?} does not exist", frame_map, path);
        }
    }

    Ok(config)
}
