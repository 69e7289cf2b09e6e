//! DLT Decoder CLI Application
//!
//! This is the command-line interface for the DLT decoder. It uses the
//! dlt-decoder library and adds:
//! - Reading capture files (several in parallel)
//! - TOML configuration with command-line overrides
//! - Text output of every decoded line

use anyhow::{Context, Result};
use clap::Parser;
use dlt_decoder::{DefaultFrameMap, DltTraceLine, Format, FrameMap, TraceDecoder};
use rayon::prelude::*;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

mod config;

use config::AppConfig;

/// DLT Decoder - Decode AUTOSAR DLT captures to text
#[derive(Parser, Debug)]
#[command(name = "dlt-cli")]
#[command(about = "Decode AUTOSAR DLT capture files", long_about = None)]
#[command(version)]
struct Args {
    /// Capture files to decode
    #[arg(value_name = "FILE")]
    files: Vec<PathBuf>,

    /// Capture format: file, serial or network
    #[arg(short, long, value_name = "FORMAT")]
    format: Option<Format>,

    /// JSON frame map for non-verbose messages
    #[arg(long, value_name = "FILE")]
    frame_map: Option<PathBuf>,

    /// Stamp lines with the current time instead of the capture time
    #[arg(long)]
    online: bool,

    /// Output file for decoded lines (default: stdout)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Path to configuration file (config.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Do not print skipped byte ranges
    #[arg(long)]
    hide_skipped: bool,

    /// Prefix each line with its position in the file
    #[arg(long)]
    position: bool,

    /// Verbosity level (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

/// Result of decoding one file
#[derive(Debug, Default)]
struct FileOutput {
    text: Vec<String>,
    lines: usize,
    skipped_lines: usize,
    skipped_bytes: u64,
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(args.verbose, args.quiet);

    log::info!("DLT Decoder CLI v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using decoder library v{}", dlt_decoder::VERSION);

    if args.files.is_empty() {
        println!("DLT Decoder - No input specified");
        println!("\nQuick Start:");
        println!("  dlt-cli trace.dlt");
        println!("  dlt-cli --format serial --frame-map frames.json capture.bin");
        println!("\nUse --help for more options");
        return Ok(());
    }

    let config = merge_config(&args)?;
    let frame_map: Option<Arc<dyn FrameMap>> = match &config.decoder.frame_map {
        Some(path) => {
            let map = DefaultFrameMap::load_json(path)
                .with_context(|| format!("Failed to load frame map: {:?}", path))?;
            Some(Arc::new(map))
        }
        None => None,
    };

    // One decoder per file; files are independent streams
    let outputs: Vec<Result<FileOutput>> = args
        .files
        .par_iter()
        .map(|path| decode_file(path, &config, frame_map.clone()))
        .collect();

    let mut writer: BufWriter<Box<dyn Write>> = match &args.output {
        Some(path) => BufWriter::new(Box::new(
            File::create(path).with_context(|| format!("Failed to create output file: {:?}", path))?,
        )),
        None => BufWriter::new(Box::new(io::stdout().lock())),
    };

    let multiple = args.files.len() > 1;
    for (path, output) in args.files.iter().zip(outputs) {
        let output = output?;
        if multiple {
            writeln!(writer, "# {}", path.display())?;
        }
        for text in &output.text {
            writeln!(writer, "{}", text)?;
        }
        log::info!(
            "{}: {} lines, {} skipped ({} bytes)",
            path.display(),
            output.lines,
            output.skipped_lines,
            output.skipped_bytes
        );
    }
    writer.flush()?;

    Ok(())
}

/// Loads the configuration file, if any, and applies command-line overrides
fn merge_config(args: &Args) -> Result<AppConfig> {
    let mut config = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from: {:?}", path);
            config::load_config(path)?
        }
        None => AppConfig::default(),
    };

    if let Some(format) = args.format {
        config.decoder.format = format;
    }
    if let Some(frame_map) = &args.frame_map {
        config.decoder.frame_map = Some(frame_map.clone());
    }
    if args.online {
        config.decoder.online = true;
    }
    if args.hide_skipped {
        config.output.show_skipped = false;
    }
    if args.position {
        config.output.position = true;
    }
    log::debug!("Effective configuration: {:?}", config);
    Ok(config)
}

/// Decodes a whole capture file into text lines
fn decode_file(
    path: &Path,
    config: &AppConfig,
    frame_map: Option<Arc<dyn FrameMap>>,
) -> Result<FileOutput> {
    let data = std::fs::read(path).with_context(|| format!("Failed to read input file: {:?}", path))?;
    log::debug!("Decoding {:?} ({} bytes, {} format)", path, data.len(), config.decoder.format);

    let mut decoder = TraceDecoder::new(config.decoder.format).with_online(config.decoder.online);
    if let Some(map) = frame_map {
        decoder = decoder.with_frame_map(map);
    }

    let mut output = FileOutput::default();
    for line in decoder.decode_all(&data) {
        output.lines += 1;
        if let DltTraceLine::Skipped(skipped) = &line {
            output.skipped_lines += 1;
            output.skipped_bytes += skipped.bytes;
            if !config.output.show_skipped {
                continue;
            }
        }
        output.text.push(format_line(&line, config.output.position));
    }
    Ok(output)
}

fn format_line(line: &DltTraceLine, position: bool) -> String {
    if position {
        format!("{:08x}: {}", line.position(), line)
    } else {
        line.to_string()
    }
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
