//! Format dispatcher: owns the parser for one replay and routes the source to
//! exactly one extractor.
use crate::config::GnssConfig;
use crate::container::{BagFormat, CyberRecordFormat};
use crate::error::ReplayError;
use crate::parser::{DataParser, ParserHandle};
use crate::raw::replay_raw_file;
use crate::replay::{PacingPolicy, ReplayStats, SleepPacer, replay_container};
use crate::source::{FileFormat, ReplaySource};
use crate::{GNSS_RAW_DATA_CHANNEL, PACING_DELAY, RAW_CHUNK_SIZE};
use std::path::Path;
use std::time::Duration;

/// Per-run knobs; defaults are the crate constants.
#[derive(Debug, Clone)]
pub struct ReplayOptions {
    pub chunk_size: usize,
    pub pacing: Duration,
    pub policy: PacingPolicy,
    pub channel: String,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            chunk_size: RAW_CHUNK_SIZE,
            pacing: PACING_DELAY,
            policy: PacingPolicy::default(),
            channel: GNSS_RAW_DATA_CHANNEL.to_string(),
        }
    }
}

pub struct Dispatcher {
    config: GnssConfig,
    options: ReplayOptions,
}

impl Dispatcher {
    pub fn new(config: GnssConfig, options: ReplayOptions) -> Self {
        Self { config, options }
    }

    pub fn config(&self) -> &GnssConfig {
        &self.config
    }

    pub fn options(&self) -> &ReplayOptions {
        &self.options
    }

    /// Replay `path` tagged `file_type` into `parser`.
    ///
    /// The parser is initialized before the tag is even looked at and is
    /// released exactly once when this returns, whatever the outcome.
    pub fn run<P: DataParser>(
        &self,
        parser: P,
        path: &Path,
        file_type: &str,
    ) -> Result<ReplayStats, ReplayError> {
        let mut handle = ParserHandle::new(parser, &self.config);
        let format: FileFormat = file_type.parse().inspect_err(|e| {
            tracing::error!(error = %e, "no extractor for file type");
        })?;
        self.extract(&mut handle, &ReplaySource::new(path, format))
    }

    fn extract<P: DataParser>(
        &self,
        handle: &mut ParserHandle<P>,
        source: &ReplaySource,
    ) -> Result<ReplayStats, ReplayError> {
        tracing::info!(path = %source.path().display(), format = %source.format(), "replay started");
        let mut pacer = SleepPacer(self.options.pacing);
        let channel = self.options.channel.as_str();
        let result = match source.format() {
            FileFormat::Bin => replay_raw_file(source.path(), self.options.chunk_size, handle),
            FileFormat::Bag => {
                replay_container(&BagFormat, source.path(), channel, handle, &mut pacer, self.options.policy)
            }
            FileFormat::Record => replay_container(
                &CyberRecordFormat,
                source.path(),
                channel,
                handle,
                &mut pacer,
                self.options.policy,
            ),
        };
        match &result {
            Ok(stats) => tracing::info!(
                forwarded = stats.forwarded,
                bytes = stats.bytes,
                skipped = stats.skipped,
                malformed = stats.malformed,
                "replay finished"
            ),
            Err(e) => tracing::error!(error = %e, "replay failed"),
        }
        result
    }
}
