//! Appliance management: a session against the device's REST API and a
//! deployment driver that converges images onto boot volumes.

pub mod deploy;
pub mod session;

use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::iso9660::IsoError;
use crate::metadata::MetadataError;

pub use deploy::{ensure, DeployRequest, DeployState};
pub use session::{ApplianceSession, BootVolume, InstallStatus, RemoteImage, RestSession};

/// The error type for appliance sessions and deployments.
#[derive(Debug, Error)]
pub enum ApplianceError {
    /// The local image file failed to decode.
    #[error(transparent)]
    Image(#[from] IsoError),

    /// The local image carries unusable metadata.
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The management API refused a request or could not be reached.
    #[error("Appliance API error: {0}")]
    Api(String),

    #[error("I/O error: {0:?}")]
    Io(#[from] std::io::Error),

    #[error("Image path {0:?} has no file name")]
    InvalidImagePath(PathBuf),

    /// The operation would touch the volume the appliance booted from.
    #[error("Volume {0} is the active boot volume")]
    ActiveVolume(String),

    #[error("No such boot volume: {0}")]
    NoVolume(String),

    #[error("A target volume is required to {0}")]
    VolumeRequired(&'static str),

    #[error("Software installation failed: {0}")]
    InstallFailed(String),

    #[error("Timed out waiting for {operation} after {attempts} attempts")]
    Timeout {
        operation: &'static str,
        attempts: u32,
    },
}

impl From<reqwest::Error> for ApplianceError {
    fn from(err: reqwest::Error) -> Self {
        ApplianceError::Api(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ApplianceError>;
