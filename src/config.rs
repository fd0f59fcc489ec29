//! GNSS parser configuration.
//!
//! The replay core treats this as an opaque value handed to
//! [`DataParser::init`](crate::parser::DataParser::init). It is loaded from a
//! YAML file at a fixed location; a missing or unreadable file is not fatal.
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Receiver wire protocol carried in the raw stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamFormat {
    #[default]
    Unknown,
    NmeaText,
    NovatelText,
    NovatelBinary,
    UbloxText,
    UbloxBinary,
    HemisphereText,
    HemisphereBinary,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RtkSolutionType {
    #[default]
    RtkReceiverSolution,
    RtkSoftwareSolution,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImuType {
    #[default]
    Unknown,
    ImarFsas,
    Isa100c,
    Adis16488,
    Stim300,
    Isa100,
    Cpt,
    G320n,
}

/// Raw data stream settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub format: StreamFormat,
}

/// Frame ids used when the parser publishes transforms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TfConfig {
    pub frame_id: String,
    pub child_frame_id: String,
    pub enable: bool,
}

impl Default for TfConfig {
    fn default() -> Self {
        Self {
            frame_id: "world".into(),
            child_frame_id: "novatel".into(),
            enable: true,
        }
    }
}

/// Full parser configuration loaded from YAML.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GnssConfig {
    /// Raw stream settings
    pub data: StreamConfig,

    pub rtk_solution_type: RtkSolutionType,

    pub imu_type: ImuType,

    /// Projection used to convert fixes into map coordinates
    pub proj4_text: String,

    pub tf: TfConfig,

    /// Receiver command string for wheel odometry input
    pub wheel_parameters: Option<String>,

    /// Where the parser may dump undecodable binary, if anywhere
    pub gpsbin_folder: Option<PathBuf>,

    pub login_commands: Vec<String>,
    pub logout_commands: Vec<String>,
}

impl GnssConfig {
    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load configuration, falling back to the default on any failure.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded gnss conf");
                config
            }
            Err(e) => {
                tracing::warn!(error = %e, "unable to load gnss conf file, using defaults");
                Self::default()
            }
        }
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}
