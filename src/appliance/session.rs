//! The appliance session: the operations the deployment driver needs,
//! and their implementation over the device's REST API.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

use log::{debug, info};
use reqwest::blocking::{Client, Response};
use serde::Deserialize;
use serde_json::json;

use super::{ApplianceError, Result};
use crate::config::DeviceConfig;
use crate::metadata::ImageInfo;

/// Upload chunk size in bytes.
pub const CHUNK_SIZE: usize = 512 * 1024;

/// Remote directory where uploaded images land.
pub const IMAGE_DIRECTORY: &str = "/shared/images";

/// A software image as listed by the appliance.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RemoteImage {
    pub name: String,
    #[serde(default)]
    pub product: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub build: String,
}

/// A boot volume as listed by the appliance. `active` is reported only
/// for the volume the device booted from.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BootVolume {
    pub name: String,
    #[serde(default)]
    pub product: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub build: String,
    #[serde(default)]
    pub active: bool,
}

/// Progress of an installation onto a boot volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallStatus {
    InProgress(String),
    Complete,
    Failed(String),
}

/// The operations the deployment driver needs from an appliance.
pub trait ApplianceSession {
    /// Images currently stored on the appliance.
    fn list_images(&self) -> Result<Vec<RemoteImage>>;

    /// Upload a local image file in chunks; returns the remote name.
    fn upload_image(&self, path: &Path) -> Result<String>;

    /// Remove a stored image by name.
    fn delete_image(&self, name: &str) -> Result<()>;

    /// Start installing a stored image onto a boot volume.
    fn install_image(
        &self,
        name: &str,
        volume: &str,
        info: &ImageInfo,
        create_volume: bool,
    ) -> Result<()>;

    /// Progress of the installation running on a volume.
    fn install_status(&self, volume: &str) -> Result<InstallStatus>;

    /// Boot volumes currently defined on the appliance.
    fn volumes(&self) -> Result<Vec<BootVolume>>;

    /// Set the boot location to a volume and reboot into it.
    fn activate_volume(&self, volume: &str) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct ItemList<T> {
    #[serde(default)]
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct VolumeDetail {
    #[serde(default)]
    status: String,
}

/// A session against the appliance's REST management API.
pub struct RestSession {
    client: Client,
    base_url: String,
    username: String,
    password: String,
}

impl RestSession {
    /// Build a session from the device configuration.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &DeviceConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent("softimg")
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(RestSession {
            client,
            base_url: format!("https://{}/mgmt", config.host),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    fn get(&self, path: &str) -> Result<Response> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .basic_auth(&self.username, Some(&self.password))
            .send()?;
        check(response)
    }

    fn post(&self, path: &str, body: &serde_json::Value) -> Result<Response> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .basic_auth(&self.username, Some(&self.password))
            .json(body)
            .send()?;
        check(response)
    }

    fn delete(&self, path: &str) -> Result<Response> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .delete(&url)
            .basic_auth(&self.username, Some(&self.password))
            .send()?;
        check(response)
    }
}

impl ApplianceSession for RestSession {
    fn list_images(&self) -> Result<Vec<RemoteImage>> {
        let list: ItemList<RemoteImage> = self.get("/tm/sys/software/image")?.json()?;
        Ok(list.items)
    }

    fn upload_image(&self, path: &Path) -> Result<String> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ApplianceError::InvalidImagePath(path.to_path_buf()))?;
        let mut file = File::open(path)?;
        let total = file.metadata()?.len();
        let url = format!("{}{}/{}", self.base_url, IMAGE_DIRECTORY, name);
        info!("uploading {} ({} bytes) to {}", name, total, IMAGE_DIRECTORY);

        let mut offset: u64 = 0;
        let mut buffer = vec![0u8; CHUNK_SIZE];
        loop {
            let read = file.read(&mut buffer)?;
            if read == 0 {
                break;
            }
            let end = offset + read as u64;
            let position = classify_chunk(offset, end, total);
            debug!("{:?} chunk: bytes {}-{}/{}", position, offset, end - 1, total);
            let response = self
                .client
                .post(&url)
                .basic_auth(&self.username, Some(&self.password))
                .header("Content-Range", format!("{}-{}/{}", offset, end - 1, total))
                .body(buffer[..read].to_vec())
                .send()?;
            check(response)?;
            offset = end;
        }
        Ok(name.to_string())
    }

    fn delete_image(&self, name: &str) -> Result<()> {
        info!("deleting remote image {}", name);
        self.delete(&format!("/tm/sys/software/image/{}", name))?;
        Ok(())
    }

    fn install_image(
        &self,
        name: &str,
        volume: &str,
        info: &ImageInfo,
        create_volume: bool,
    ) -> Result<()> {
        info!(
            "installing {} ({} {} build {}) onto volume {}",
            name, info.product, info.version, info.build, volume
        );
        let mut body = json!({
            "command": "install",
            "name": name,
            "volume": volume,
        });
        if create_volume {
            body["options"] = json!([{"create-volume": true}]);
        }
        self.post("/tm/sys/software/image", &body)?;
        Ok(())
    }

    fn install_status(&self, volume: &str) -> Result<InstallStatus> {
        let detail: VolumeDetail = self
            .get(&format!("/tm/sys/software/volume/{}", volume))?
            .json()?;
        Ok(classify_status(&detail.status))
    }

    fn volumes(&self) -> Result<Vec<BootVolume>> {
        let list: ItemList<BootVolume> = self.get("/tm/sys/software/volume")?.json()?;
        Ok(list.items)
    }

    fn activate_volume(&self, volume: &str) -> Result<()> {
        info!("activating volume {} (the appliance will reboot)", volume);
        self.post(
            "/tm/sys/software/volume",
            &json!({"command": "reboot", "volume": volume}),
        )?;
        Ok(())
    }
}

fn check(response: Response) -> Result<Response> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(ApplianceError::Api(format!(
            "{} returned {}",
            response.url(),
            response.status()
        )))
    }
}

/// Map a volume status string onto the install state machine. The
/// appliance reports free-form strings; `complete` and `failed` are the
/// terminal markers.
fn classify_status(status: &str) -> InstallStatus {
    if status.contains("complete") {
        InstallStatus::Complete
    } else if status.contains("failed") {
        InstallStatus::Failed(status.to_string())
    } else {
        InstallStatus::InProgress(status.to_string())
    }
}

#[derive(Debug, PartialEq, Eq)]
enum ChunkPosition {
    First,
    Middle,
    Last,
    FirstAndLast,
}

fn classify_chunk(start: u64, end: u64, total: u64) -> ChunkPosition {
    if start == 0 && end == total {
        ChunkPosition::FirstAndLast
    } else if start == 0 {
        ChunkPosition::First
    } else if end == total {
        ChunkPosition::Last
    } else {
        ChunkPosition::Middle
    }
}
