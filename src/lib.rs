//! GNSS raw-data log replay library.
//!
//! This crate replays captured sensor logs into a GNSS data parser so that
//! parser behavior can be checked against field data without a live receiver:
//!
//! - `dispatch`: owns the parser for one run and picks the extractor by tag
//! - `raw`: forwards an undifferentiated byte stream in fixed windows
//! - `replay`: forwards target-channel records from a structured container,
//!   paced to approximate live arrival
//! - `container`: ROS bag and Cyber record readers
//! - `capture`: durable framing of what was forwarded, for diffing runs
//!
//! The `parser_cli` binary (`src/main.rs`) drives a replay from the command
//! line; `capture_dump` (`src/bin/capture_dump.rs`) inspects and compares
//! capture files.
use std::time::Duration;

pub mod capture;
pub mod config;
pub mod container;
pub mod dispatch;
#[cfg(feature = "parser-dyn")]
pub mod dylib;
pub mod error;
pub mod parser;
pub mod raw;
pub mod replay;
pub mod source;

/// Channel carrying raw receiver bytes in structured logs.
pub const GNSS_RAW_DATA_CHANNEL: &str = "/apollo/sensor/gnss/raw_data";

/// Window size for raw-stream replay.
pub const RAW_CHUNK_SIZE: usize = 128;

/// Pause after each forwarded structured-log message.
pub const PACING_DELAY: Duration = Duration::from_millis(2);

pub const DEFAULT_CONFIG_PATH: &str = "/apollo/modules/drivers/gnss/conf/gnss_conf.yaml";

pub use dispatch::{Dispatcher, ReplayOptions};
pub use error::ReplayError;
pub use parser::{DataParser, ParserHandle};
pub use replay::{PacingPolicy, ReplayStats};
pub use source::FileFormat;
