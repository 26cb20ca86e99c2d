//! The deployment driver: converge a software image onto the appliance
//! to a requested state.

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use log::{debug, info};

use super::session::{ApplianceSession, BootVolume, InstallStatus};
use super::{ApplianceError, Result};
use crate::iso9660::IsoImage;
use crate::metadata::{image_info, ImageInfo};

/// Sleep between status polls.
const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Attempt cap used by `ensure`; at one poll per five seconds this
/// allows half an hour per operation.
pub const DEFAULT_ATTEMPTS: u32 = 360;

/// Target state for a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployState {
    /// The image is stored on the appliance.
    Present,
    /// The image is installed onto the target volume.
    Installed,
    /// The target volume carries the image and the appliance booted it.
    Activated,
    /// The image is not stored on the appliance.
    Absent,
}

/// One deployment request.
#[derive(Debug, Clone)]
pub struct DeployRequest {
    /// Local path of the image file; its basename is the remote name.
    pub image_path: PathBuf,
    pub state: DeployState,
    /// Target boot volume; required for `Installed` and `Activated`.
    pub volume: Option<String>,
    /// Allow the install to create the target volume if it is missing.
    pub create_volume: bool,
    /// Redo work that appears to be done already.
    pub force: bool,
}

/// Drive the appliance to the requested state.
///
/// Returns whether any change was made. Converged states come back
/// `Ok(false)` without touching the appliance.
///
/// # Errors
/// Returns an error when a guard rail trips (installing onto the active
/// volume, targeting a volume that does not exist without
/// `create_volume`), when the appliance reports an installation failure,
/// or when a waiter exceeds its attempt cap.
pub fn ensure(session: &dyn ApplianceSession, request: &DeployRequest) -> Result<bool> {
    info!(
        "ensuring {:?} for {}",
        request.state,
        request.image_path.display()
    );
    match request.state {
        DeployState::Present => ensure_present(session, request),
        DeployState::Installed => ensure_installed(session, request),
        DeployState::Activated => ensure_activated(session, request),
        DeployState::Absent => ensure_absent(session, request),
    }
}

fn ensure_present(session: &dyn ApplianceSession, request: &DeployRequest) -> Result<bool> {
    let name = image_name(request)?;
    let listed = session.list_images()?.iter().any(|image| image.name == name);
    if listed && !request.force {
        info!("image {} is already on the appliance", name);
        return Ok(false);
    }
    if listed {
        info!("replacing remote image {}", name);
        session.delete_image(&name)?;
    }
    let uploaded = session.upload_image(&request.image_path)?;
    wait_for_image(session, &uploaded, DEFAULT_ATTEMPTS)?;
    Ok(true)
}

fn ensure_installed(session: &dyn ApplianceSession, request: &DeployRequest) -> Result<bool> {
    let volume = request
        .volume
        .as_deref()
        .ok_or(ApplianceError::VolumeRequired("install an image"))?;
    let uploaded = ensure_present(session, request)?;

    let image = IsoImage::open(&request.image_path)?;
    let info = image_info(&image)?;

    let volumes = session.volumes()?;
    if let Some(active) = volumes.iter().find(|candidate| candidate.active) {
        if active.name == volume {
            return Err(ApplianceError::ActiveVolume(volume.to_string()));
        }
    }
    let target = volumes.iter().find(|candidate| candidate.name == volume);
    if let Some(target) = target {
        if carries(target, &info) && !request.force {
            info!(
                "volume {} already carries {} {} build {}",
                volume, info.product, info.version, info.build
            );
            return Ok(uploaded);
        }
    } else if !request.create_volume {
        return Err(ApplianceError::NoVolume(volume.to_string()));
    }

    let name = image_name(request)?;
    session.install_image(&name, volume, &info, target.is_none())?;
    wait_for_install(session, volume, DEFAULT_ATTEMPTS)?;
    Ok(true)
}

fn ensure_activated(session: &dyn ApplianceSession, request: &DeployRequest) -> Result<bool> {
    let volume = request
        .volume
        .as_deref()
        .ok_or(ApplianceError::VolumeRequired("activate a volume"))?;
    let image = IsoImage::open(&request.image_path)?;
    let info = image_info(&image)?;

    if !request.force {
        let volumes = session.volumes()?;
        if let Some(active) = volumes.iter().find(|candidate| candidate.active) {
            if active.name == volume && carries(active, &info) {
                info!("volume {} is active and already carries this image", volume);
                return Ok(false);
            }
        }
    }

    ensure_installed(session, request)?;
    session.activate_volume(volume)?;
    wait_for_active(session, volume, DEFAULT_ATTEMPTS)?;
    Ok(true)
}

fn ensure_absent(session: &dyn ApplianceSession, request: &DeployRequest) -> Result<bool> {
    let name = image_name(request)?;
    let images = session.list_images()?;
    let listed = match images.iter().find(|image| image.name == name) {
        Some(image) => image,
        None => {
            debug!("image {} is not on the appliance", name);
            return Ok(false);
        }
    };
    if !listed.product.is_empty() {
        let volumes = session.volumes()?;
        if let Some(active) = volumes.iter().find(|candidate| candidate.active) {
            if active.product == listed.product
                && active.version == listed.version
                && active.build == listed.build
            {
                return Err(ApplianceError::ActiveVolume(active.name.clone()));
            }
        }
    }
    session.delete_image(&name)?;
    Ok(true)
}

/// Poll the install status of a volume until it completes.
///
/// # Errors
/// Returns `InstallFailed` when the appliance reports a failure and
/// `Timeout` when the attempt cap is exceeded.
pub fn wait_for_install(
    session: &dyn ApplianceSession,
    volume: &str,
    attempts: u32,
) -> Result<()> {
    for attempt in 0..attempts {
        if attempt > 0 {
            thread::sleep(POLL_INTERVAL);
        }
        match session.install_status(volume)? {
            InstallStatus::Complete => {
                info!("installation onto {} is complete", volume);
                return Ok(());
            }
            InstallStatus::Failed(reason) => return Err(ApplianceError::InstallFailed(reason)),
            InstallStatus::InProgress(detail) => {
                debug!("volume {}: {} (attempt {})", volume, detail, attempt + 1);
            }
        }
    }
    Err(ApplianceError::Timeout {
        operation: "software installation",
        attempts,
    })
}

/// Poll the volume list until the named volume reports active.
///
/// Session errors are swallowed; the appliance drops connections while
/// it reboots into the new volume.
pub fn wait_for_active(session: &dyn ApplianceSession, volume: &str, attempts: u32) -> Result<()> {
    for attempt in 0..attempts {
        if attempt > 0 {
            thread::sleep(POLL_INTERVAL);
        }
        match session.volumes() {
            Ok(volumes) => {
                let active = volumes
                    .iter()
                    .any(|candidate| candidate.name == volume && candidate.active);
                if active {
                    info!("volume {} is active", volume);
                    return Ok(());
                }
                debug!("volume {} not active yet (attempt {})", volume, attempt + 1);
            }
            Err(error) => debug!("appliance unreachable (attempt {}): {}", attempt + 1, error),
        }
    }
    Err(ApplianceError::Timeout {
        operation: "volume activation",
        attempts,
    })
}

fn wait_for_image(session: &dyn ApplianceSession, name: &str, attempts: u32) -> Result<()> {
    for attempt in 0..attempts {
        if attempt > 0 {
            thread::sleep(POLL_INTERVAL);
        }
        if session.list_images()?.iter().any(|image| image.name == name) {
            return Ok(());
        }
        debug!("image {} not listed yet (attempt {})", name, attempt + 1);
    }
    Err(ApplianceError::Timeout {
        operation: "image upload",
        attempts,
    })
}

fn image_name(request: &DeployRequest) -> Result<String> {
    request
        .image_path
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| ApplianceError::InvalidImagePath(request.image_path.clone()))
}

fn carries(volume: &BootVolume, info: &ImageInfo) -> bool {
    volume.product == info.product
        && volume.version == info.version
        && volume.build == info.build
}
