//! Input file handle plus its container format tag.
use crate::error::ReplayError;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Container formats accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    /// ROS bag, one `std_msgs/String` per message.
    Bag,
    /// Undifferentiated receiver byte stream.
    Bin,
    /// Cyber record, one `RawData` envelope per message.
    Record,
}

impl FileFormat {
    pub const ALL: [FileFormat; 3] = [FileFormat::Bag, FileFormat::Bin, FileFormat::Record];

    pub fn as_str(self) -> &'static str {
        match self {
            FileFormat::Bag => "bag",
            FileFormat::Bin => "bin",
            FileFormat::Record => "record",
        }
    }
}

impl FromStr for FileFormat {
    type Err = ReplayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bag" => Ok(FileFormat::Bag),
            "bin" => Ok(FileFormat::Bin),
            "record" => Ok(FileFormat::Record),
            other => Err(ReplayError::UnknownFormat(other.to_string())),
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One input file for one replay run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplaySource {
    path: PathBuf,
    format: FileFormat,
}

impl ReplaySource {
    pub fn new(path: impl Into<PathBuf>, format: FileFormat) -> Self {
        Self { path: path.into(), format }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> FileFormat {
        self.format
    }
}
