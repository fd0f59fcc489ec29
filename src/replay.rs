//! Structured-log extractor shared by every container format.
//!
//! Records are consumed one at a time in stored order. Only records on
//! [`GNSS_RAW_DATA_CHANNEL`](crate::GNSS_RAW_DATA_CHANNEL) reach the parser,
//! each followed by a short pause that approximates live sensor cadence.
use crate::container::ContainerFormat;
use crate::error::ReplayError;
use crate::parser::{DataParser, ParserHandle};
use std::path::Path;
use std::time::Duration;

/// What a replay did, for reporting.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplayStats {
    /// Records (or raw chunks) read from the source.
    pub records: u64,
    /// Payloads handed to the parser.
    pub forwarded: u64,
    /// Bytes handed to the parser.
    pub bytes: u64,
    /// Records on other channels.
    pub skipped: u64,
    /// Target records whose payload could not be unwrapped.
    pub malformed: u64,
}

/// Blocks between forwarded messages.
pub trait Pacer {
    fn pause(&mut self);
}

/// Sleeps the calling thread for a fixed interval; zero disables pacing.
#[derive(Debug, Clone, Copy)]
pub struct SleepPacer(pub Duration);

impl Pacer for SleepPacer {
    fn pause(&mut self) {
        if !self.0.is_zero() {
            std::thread::sleep(self.0);
        }
    }
}

/// When the pacing delay applies.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum PacingPolicy {
    /// Pause only after a payload was forwarded.
    #[default]
    AfterForward,
    /// Pause after every record read, matched or not.
    EveryRecord,
}

/// Replay every target-channel record of `path` into `parser`.
///
/// A target record whose payload does not unwrap is logged and skipped. A
/// container failure part way through is logged and ends the replay with
/// [`ReplayError::Interrupted`] (or [`ReplayError::Unsupported`] for a chunk
/// codec this build cannot read); records before it stay forwarded.
pub fn replay_container<C, P, T>(
    format: &C,
    path: &Path,
    channel: &str,
    parser: &mut ParserHandle<P>,
    pacer: &mut T,
    policy: PacingPolicy,
) -> Result<ReplayStats, ReplayError>
where
    C: ContainerFormat + ?Sized,
    P: DataParser,
    T: Pacer + ?Sized,
{
    let records = format.open(path).map_err(|source| ReplayError::opening(path, source))?;

    let mut stats = ReplayStats::default();
    for (index, item) in records.enumerate() {
        let record = match item {
            Ok(record) => record,
            Err(e) => {
                tracing::error!(
                    container = format.name(),
                    after = stats.records,
                    error = %e,
                    "container read failed, stopping replay"
                );
                return Err(ReplayError::reading(path, e));
            }
        };
        stats.records += 1;

        if record.channel != channel {
            stats.skipped += 1;
            if policy == PacingPolicy::EveryRecord {
                pacer.pause();
            }
            continue;
        }

        let time_ns = record.time_ns;
        match format.unwrap_payload(record) {
            Ok(bytes) => {
                parser.append(&bytes);
                stats.forwarded += 1;
                stats.bytes += bytes.len() as u64;
            }
            Err(e) => {
                tracing::warn!(
                    container = format.name(),
                    index,
                    time_ns,
                    error = %e,
                    "skipping malformed record"
                );
                stats.malformed += 1;
                if policy == PacingPolicy::AfterForward {
                    continue;
                }
            }
        }
        pacer.pause();
    }

    tracing::debug!(?stats, container = format.name(), "container exhausted");
    Ok(stats)
}
