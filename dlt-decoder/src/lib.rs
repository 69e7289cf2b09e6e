//! DLT Decoder Library
//!
//! A reusable library for decoding and encoding AUTOSAR DLT (Diagnostic Log
//! and Trace) streams: capture files, serial captures and raw network
//! packets.
//!
//! # Architecture
//!
//! This library is intentionally minimal and focused on the wire format:
//! - Splits a byte stream into packets and resynchronises after corruption
//! - Decodes verbose, non-verbose (with a frame map) and control messages
//! - Encodes trace lines back into packets
//! - Reports undecodable bytes as skipped lines instead of failing
//!
//! The library does NOT:
//! - Read capture files or sockets
//! - Filter or format lines for display
//!
//! All higher-level functionality is in the application layer (dlt-cli).
//!
//! # Example Usage
//!
//! ```no_run
//! use dlt_decoder::{DecoderConfig, Format, TraceDecoder};
//!
//! let config = DecoderConfig::new()
//!     .with_format(Format::File)
//!     .with_frame_map("frames.json");
//! let mut decoder = TraceDecoder::from_config(&config).unwrap();
//!
//! let data = std::fs::read("trace.dlt").unwrap();
//! for line in decoder.decode_all(&data) {
//!     println!("{}", line);
//! }
//! ```

// Public modules
pub mod args;
pub mod builder;
pub mod config;
pub mod control;
pub mod decoder;
pub mod dlt_type;
pub mod encoder;
pub mod features;
pub mod header;
pub mod id_cache;
pub mod line;
pub mod nonverbose;
pub mod types;
pub mod verbose;
pub mod wire;

// Re-export main types for convenience
pub use args::{DltArg, FixedPoint, IntWidth, ScalarKind, StringCoding};
pub use builder::LineBuilder;
pub use config::DecoderConfig;
pub use control::{ControlCodec, ControlPayload, ControlRequest, ControlResponse};
pub use decoder::{DecodeStep, Format, TraceDecoder};
pub use dlt_type::DltType;
pub use encoder::TraceEncoder;
pub use features::LineFeatures;
pub use line::{ControlLine, DltTraceLine, LineHeader, NormalLine, SkippedLine};
pub use nonverbose::{DefaultFrameMap, Frame, FrameMap, NonVerboseCodec, Pdu};
pub use types::{DecoderError, Result, Timestamp};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
