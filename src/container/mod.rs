//! Structured log containers.
//!
//! A container yields channel-tagged [`Record`]s in the order it stores them.
//! Each format provides two capabilities through [`ContainerFormat`]: opening
//! a file as a forward-only record iterator, and unwrapping a record's payload
//! into the raw bytes that the receiver originally produced.
//!
//! - [`bag`]: ROS bag v2.0, payload is a serialized `std_msgs/String`
//! - [`record`]: Cyber record, payload is a serialized `RawData` envelope
use crate::error::ContainerError;
use std::path::Path;

pub mod bag;
pub mod codec;
pub mod record;

#[cfg(test)]
pub(crate) mod fixtures;

pub use bag::BagFormat;
pub use codec::Compression;
pub use record::CyberRecordFormat;

/// One stored message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub channel: String,
    /// Receive time in nanoseconds as stored by the container.
    pub time_ns: u64,
    /// Message type declared by the container, when it stores one per message.
    pub msg_type: Option<String>,
    /// Serialized message, still wrapped in its container-specific encoding.
    pub payload: Vec<u8>,
}

/// Lazy, finite, forward-only sequence of records. Restart by reopening.
pub type RecordIter = Box<dyn Iterator<Item = Result<Record, ContainerError>>>;

/// Read capability for one container format.
pub trait ContainerFormat {
    /// Short format name used in diagnostics.
    fn name(&self) -> &'static str;

    /// Open `path`; fails if it is missing or not a container of this kind.
    fn open(&self, path: &Path) -> Result<RecordIter, ContainerError>;

    /// Extract the raw receiver bytes carried by `record`.
    fn unwrap_payload(&self, record: Record) -> Result<Vec<u8>, ContainerError>;
}
