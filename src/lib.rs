//! # softimg
//!
//! A reader for ISO 9660 software images and a deployment driver for the
//! appliances that run them. Extracts files and product metadata from an
//! image without mounting it, and converges images onto an appliance's
//! boot volumes over the management API.

pub mod appliance;
pub mod config;
pub mod iso9660;
pub mod metadata;

// Re-export the main types for convenience
pub use appliance::{
    ApplianceError,
    ApplianceSession,
    DeployRequest,
    DeployState,
    RestSession,
};
pub use config::DeviceConfig;
pub use iso9660::{directory::DirectoryRecord, IsoError, IsoImage};
pub use metadata::{image_info, ImageInfo, MetadataError};
