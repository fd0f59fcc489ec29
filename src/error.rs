//! Error taxonomy for a replay run.
//!
//! Source-open, format-selection and mid-stream source failures reach the
//! caller as [`ReplayError`], for every file type alike. Configuration
//! problems are downgraded to a warning by
//! [`crate::config::GnssConfig::load_or_default`], and a target record whose
//! payload cannot be unwrapped is counted in [`crate::replay::ReplayStats`].
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Failures raised while reading a structured log container.
#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not a {0} file (bad magic)")]
    BadMagic(&'static str),

    #[error("malformed {what}: {detail}")]
    Malformed { what: &'static str, detail: String },

    #[error("unsupported {0}")]
    Unsupported(String),

    #[error("protobuf decode failed: {0}")]
    Decode(#[from] prost::DecodeError),
}

impl ContainerError {
    pub(crate) fn malformed(what: &'static str, detail: impl Into<String>) -> Self {
        ContainerError::Malformed { what, detail: detail.into() }
    }
}

/// Failures that end a replay and map onto a process exit code.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("unable to open {}: {source}", path.display())]
    Unopenable {
        path: PathBuf,
        #[source]
        source: ContainerError,
    },

    #[error("unknown file type {0:?} (expected bag, bin or record)")]
    UnknownFormat(String),

    /// The source opened but failed part way through. Payloads before the
    /// failure were forwarded.
    #[error("{} failed part way through: {source}", path.display())]
    Interrupted {
        path: PathBuf,
        #[source]
        source: ContainerError,
    },

    #[error("{} uses an encoding this build cannot read: {source}", path.display())]
    Unsupported {
        path: PathBuf,
        #[source]
        source: ContainerError,
    },
}

impl ReplayError {
    /// Classify a failure to open `path`.
    pub(crate) fn opening(path: &Path, source: ContainerError) -> Self {
        let path = path.to_path_buf();
        match source {
            ContainerError::Unsupported(_) => ReplayError::Unsupported { path, source },
            source => ReplayError::Unopenable { path, source },
        }
    }

    /// Classify a failure after `path` was opened.
    pub(crate) fn reading(path: &Path, source: ContainerError) -> Self {
        let path = path.to_path_buf();
        match source {
            ContainerError::Unsupported(_) => ReplayError::Unsupported { path, source },
            source => ReplayError::Interrupted { path, source },
        }
    }

    /// Process exit status for this failure class. `0` is reserved for success.
    pub fn exit_code(&self) -> u8 {
        match self {
            ReplayError::Unopenable { .. } => 3,
            ReplayError::UnknownFormat(_) => 4,
            ReplayError::Interrupted { .. } => 5,
            ReplayError::Unsupported { .. } => 6,
        }
    }
}

/// Failures while loading the parser configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct_and_nonzero() {
        let unopenable = ReplayError::Unopenable {
            path: PathBuf::from("missing.bag"),
            source: ContainerError::BadMagic("rosbag"),
        };
        let unknown = ReplayError::UnknownFormat("pcap".into());
        let interrupted =
            ReplayError::reading(Path::new("a.bin"), ContainerError::Io(std::io::Error::other("boom")));
        let unsupported =
            ReplayError::reading(Path::new("a.bag"), ContainerError::Unsupported("bag chunk compression".into()));
        let mut codes = vec![unopenable.exit_code(), unknown.exit_code(), interrupted.exit_code(), unsupported.exit_code()];
        assert!(codes.iter().all(|&c| c != 0));
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), 4);
    }

    #[test]
    fn unsupported_encoding_is_never_reported_as_unopenable() {
        let e = ReplayError::opening(Path::new("a.record"), ContainerError::Unsupported("record compression type 9".into()));
        assert!(matches!(e, ReplayError::Unsupported { .. }));
        let e = ReplayError::opening(Path::new("a.record"), ContainerError::BadMagic("cyber record"));
        assert!(matches!(e, ReplayError::Unopenable { .. }));
        let e = ReplayError::reading(Path::new("a.bag"), ContainerError::malformed("bag chunk", "nested chunk"));
        assert!(matches!(e, ReplayError::Interrupted { .. }));
    }

    #[test]
    fn unknown_format_message_names_the_tag() {
        let e = ReplayError::UnknownFormat("pcap".into());
        assert!(e.to_string().contains("\"pcap\""));
    }
}
