use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use dotenvy::dotenv;
use gnss_replay::capture::{CAPTURE_VERSION, CaptureHeader, CaptureParser, CaptureWriter, now_unix_ns};
use gnss_replay::config::GnssConfig;
use gnss_replay::parser::{DataParser, StatsParser, Tee};
use gnss_replay::{DEFAULT_CONFIG_PATH, Dispatcher, PacingPolicy, RAW_CHUNK_SIZE, ReplayOptions};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const EXIT_CODES: &str = "\
Exit status:
  0  replay completed (or usage printed)
  1  harness failure (parser library, capture file)
  3  source file missing or not a valid container of the given type
  4  unknown file type
  5  source failed part way through (read error or corrupt data);
     payloads before the failure were forwarded
  6  container uses a compression codec this build cannot read";

#[derive(Debug, Parser)]
#[command(version, about = "Replay a captured GNSS log into the raw data parser", after_help = EXIT_CODES)]
struct Args {
    /// Log file to replay
    filename: Option<PathBuf>,

    /// File type: bag, bin or record
    file_type: Option<String>,

    /// Parser configuration (YAML); defaults are used if it cannot be loaded
    #[arg(long, env = "GNSS_CONF", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Shared library exporting the gnss_parser_* C ABI
    #[cfg(feature = "parser-dyn")]
    #[arg(long, env = "GNSS_PARSER_LIB")]
    parser_lib: Option<PathBuf>,

    /// Write every forwarded payload to this capture file
    #[arg(long)]
    capture: Option<PathBuf>,

    /// Pause after each forwarded bag/record message, in milliseconds
    #[arg(long, default_value_t = 2)]
    pacing_ms: u64,

    /// Pause after every bag/record message read, matched or not
    #[arg(long, default_value_t = false)]
    pace_every_record: bool,

    /// Window size for bin replay, in bytes
    #[arg(long, default_value_t = RAW_CHUNK_SIZE, value_parser = parse_chunk_size)]
    chunk_size: usize,
}

fn parse_chunk_size(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("chunk size must be at least 1".into()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}

#[cfg(feature = "parser-dyn")]
fn load_backend(args: &Args) -> Result<Option<Box<dyn DataParser>>> {
    match &args.parser_lib {
        Some(path) => {
            let lib = gnss_replay::dylib::DylibParser::load(path)?;
            tracing::info!(path = %path.display(), "using parser library");
            Ok(Some(Box::new(lib)))
        }
        None => Ok(None),
    }
}

#[cfg(not(feature = "parser-dyn"))]
fn load_backend(_args: &Args) -> Result<Option<Box<dyn DataParser>>> {
    Ok(None)
}

fn main() -> Result<ExitCode> {
    // Load environment variables from .env if present
    let _ = dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("parser_cli=info,gnss_replay=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let (Some(filename), Some(file_type)) = (args.filename.clone(), args.file_type.clone()) else {
        println!("{}", Args::command().render_usage());
        return Ok(ExitCode::SUCCESS);
    };

    let config = GnssConfig::load_or_default(&args.config);
    let options = ReplayOptions {
        chunk_size: args.chunk_size,
        pacing: Duration::from_millis(args.pacing_ms),
        policy: if args.pace_every_record { PacingPolicy::EveryRecord } else { PacingPolicy::AfterForward },
        ..Default::default()
    };
    let dispatcher = Dispatcher::new(config, options);

    let mut backend = load_backend(&args)?;
    let mut capture = match &args.capture {
        Some(path) => {
            let header = CaptureHeader {
                version: CAPTURE_VERSION,
                created_unix_ns: now_unix_ns(),
                source: filename.display().to_string(),
                format: file_type.clone(),
            };
            let writer = CaptureWriter::create(path, header).with_context(|| format!("create {:?}", path))?;
            Some(CaptureParser::new(writer))
        }
        None => None,
    };
    let mut stats = StatsParser::new();

    let parser = Tee::new(&mut stats, Tee::new(&mut capture, &mut backend));
    let outcome = dispatcher.run(parser, &filename, &file_type);

    if let Some(e) = capture.as_ref().and_then(CaptureParser::error) {
        anyhow::bail!("capture {:?} is incomplete: {e}", args.capture.unwrap_or_default());
    }
    match outcome {
        Ok(replay) => {
            println!(
                "Replayed {} records from {:?}: forwarded {} ({} bytes), skipped {}, malformed {}. Stream crc32={:#010x}",
                replay.records,
                filename,
                replay.forwarded,
                replay.bytes,
                replay.skipped,
                replay.malformed,
                stats.digest()
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprintln!("{e}");
            if stats.payloads() > 0 {
                eprintln!("Forwarded {} payloads ({} bytes) before the failure", stats.payloads(), stats.bytes());
            }
            Ok(ExitCode::from(e.exit_code()))
        }
    }
}
