//! Core ISO 9660 image reader module

pub mod decode;
pub mod directory;
pub mod error;
pub mod path_table;
pub mod sector;
pub mod volume;
mod resolve;

use std::path::Path;

use log::info;

use directory::{DirectoryChildren, DirectoryRecord};
use path_table::PathTableEntry;
use resolve::PathResolver;
use sector::SectorReader;
use volume::PrimaryVolumeDescriptor;
pub use error::{IsoError, Result};

/// The main reader for ISO 9660 filesystem images.
///
/// Opens an image file, locates its Primary Volume Descriptor and path
/// table, and serves file lookups without mounting the filesystem.
#[derive(Debug)]
pub struct IsoImage {
    sectors: SectorReader,
    volume: PrimaryVolumeDescriptor,
    path_table: Vec<PathTableEntry>,
}

impl IsoImage {
    /// Read an ISO 9660 image from the given path.
    ///
    /// # Arguments
    /// * `path` - File path to the .iso image
    ///
    /// # Errors
    /// Returns an error if:
    /// - File cannot be opened or read
    /// - The descriptor set has no primary descriptor or no terminator
    /// - A both-endian field disagrees between its halves
    /// - The path table does not decode to its declared size
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening ISO image: {}", path.display());
        let sectors = SectorReader::new(path);

        let volume = volume::find_primary(&sectors)?;
        let path_table = path_table::read_path_table(
            &sectors,
            volume.path_table_location,
            volume.path_table_size,
        )?;

        info!(
            "ISO image opened: volume '{}', {} directories in the path table",
            volume.volume_identifier,
            path_table.len()
        );

        Ok(Self {
            sectors,
            volume,
            path_table,
        })
    }

    /// The image's Primary Volume Descriptor.
    pub fn volume(&self) -> &PrimaryVolumeDescriptor {
        &self.volume
    }

    /// The little-endian path table, in table order.
    pub fn path_table(&self) -> &[PathTableEntry] {
        &self.path_table
    }

    /// Look up the directory record for an absolute path.
    ///
    /// Paths are case-insensitive; `;version` suffixes on the stored
    /// identifiers are ignored.
    ///
    /// # Errors
    /// Returns `PathNotFound` if no entry matches, or a corruption error
    /// if a directory extent fails to decode along the way.
    pub fn stat(&self, path: &str) -> Result<DirectoryRecord> {
        self.resolver().resolve(path)
    }

    /// Read the full content of the file at an absolute path.
    pub fn get_file(&self, path: &str) -> Result<Vec<u8>> {
        let record = self.stat(path)?;
        self.read_extent(&record)
    }

    /// Read the extent behind a previously resolved record.
    pub fn read_extent(&self, record: &DirectoryRecord) -> Result<Vec<u8>> {
        self.sectors
            .read(record.extent_location, record.extent_length as usize)
    }

    /// Iterate over the children of a directory record.
    ///
    /// The iterator reads the directory extent one sector at a time.
    pub fn children(&self, record: &DirectoryRecord) -> DirectoryChildren<'_> {
        DirectoryChildren::new(&self.sectors, record.extent_location)
    }

    fn resolver(&self) -> PathResolver<'_> {
        PathResolver::new(&self.sectors, &self.volume, &self.path_table)
    }
}
