//! Volume descriptors: the sector-16 scan and the Primary Volume
//! Descriptor layout.

use log::{debug, info, trace};

use super::decode;
use super::directory::{self, DirectoryRecord};
use super::error::{IsoError, Result};
use super::sector::{SectorReader, SECTOR_SIZE};

/// Sector where the volume descriptor set begins.
const DESCRIPTOR_SET_START: u32 = 16;
/// Type byte of the Primary Volume Descriptor.
const TYPE_PRIMARY: u8 = 1;
/// Type byte of the Volume Descriptor Set Terminator.
const TYPE_TERMINATOR: u8 = 255;

/// The Primary Volume Descriptor, decoded in document order.
#[derive(Debug, Clone)]
pub struct PrimaryVolumeDescriptor {
    /// Always `CD001` on a conformant image; stored, not enforced.
    pub standard_identifier: String,
    pub version: u8,
    pub system_identifier: String,
    pub volume_identifier: String,
    /// Volume size in logical blocks.
    pub volume_space_size: u32,
    pub volume_set_size: u16,
    pub volume_sequence_number: u16,
    pub logical_block_size: u16,
    /// Byte length of each path table.
    pub path_table_size: u32,
    /// Sector of the little-endian path table.
    pub path_table_location: u32,
    pub optional_path_table_location: u32,
    /// Sector of the big-endian mirror table.
    pub mirror_path_table_location: u32,
    pub optional_mirror_path_table_location: u32,
    /// The root directory's record, embedded in the descriptor.
    pub root_directory: DirectoryRecord,
    pub volume_set_identifier: String,
    pub publisher_identifier: String,
    pub data_preparer_identifier: String,
    pub application_identifier: String,
    pub copyright_file_identifier: String,
    pub abstract_file_identifier: String,
    pub bibliographic_file_identifier: String,
    /// Creation, modification, expiration and effective times as the raw
    /// 17-byte fields; their sub-format is not interpreted here.
    pub timestamps: [[u8; 17]; 4],
    pub file_structure_version: u8,
}

/// Scan the descriptor set for the Primary Volume Descriptor.
///
/// Reads one sector at a time from sector 16. The first type-1 descriptor
/// wins; every other type is skipped opaquely until the type-255
/// terminator. A set that runs to the end of the backing store without a
/// terminator is corrupt.
pub fn find_primary(sectors: &SectorReader) -> Result<PrimaryVolumeDescriptor> {
    let mut primary: Option<PrimaryVolumeDescriptor> = None;
    for sector in DESCRIPTOR_SET_START.. {
        let buffer = sectors
            .read(sector, SECTOR_SIZE as usize)
            .map_err(|e| match e {
                IsoError::TruncatedRead { .. } => IsoError::ImageCorrupt(
                    "descriptor set ends without a terminator".to_string(),
                ),
                other => other,
            })?;
        let mut reader: &[u8] = &buffer;
        let descriptor_type = decode::read_u8(&mut reader)?;
        match descriptor_type {
            TYPE_PRIMARY if primary.is_none() => {
                debug!("primary volume descriptor at sector {}", sector);
                primary = Some(read_primary(&mut reader)?);
            }
            TYPE_TERMINATOR => {
                debug!("descriptor set terminator at sector {}", sector);
                break;
            }
            other => trace!("skipping descriptor type {} at sector {}", other, sector),
        }
    }
    primary.ok_or_else(|| {
        IsoError::ImageCorrupt("descriptor set has no primary volume descriptor".to_string())
    })
}

/// Decode the PVD fields following the type byte.
fn read_primary(reader: &mut &[u8]) -> Result<PrimaryVolumeDescriptor> {
    let standard_identifier = decode::read_padded_str(reader, 5)?;
    let version = decode::read_u8(reader)?;
    decode::skip_bytes(reader, 1)?;
    let system_identifier = decode::read_padded_str(reader, 32)?;
    let volume_identifier = decode::read_padded_str(reader, 32)?;
    decode::skip_bytes(reader, 8)?;
    let volume_space_size = decode::read_u32_both(reader, "volume space size")?;
    decode::skip_bytes(reader, 32)?;
    let volume_set_size = decode::read_u16_both(reader, "volume set size")?;
    let volume_sequence_number = decode::read_u16_both(reader, "volume sequence number")?;
    let logical_block_size = decode::read_u16_both(reader, "logical block size")?;
    let path_table_size = decode::read_u32_both(reader, "path table size")?;
    let path_table_location = decode::read_u32_le(reader)?;
    let optional_path_table_location = decode::read_u32_le(reader)?;
    let mirror_path_table_location = decode::read_u32_be(reader)?;
    let optional_mirror_path_table_location = decode::read_u32_be(reader)?;
    let root_directory = match directory::read_record(reader)? {
        Some((record, _)) => record,
        None => {
            return Err(IsoError::ImageCorrupt(
                "root directory record is null".to_string(),
            ))
        }
    };
    let volume_set_identifier = decode::read_padded_str(reader, 128)?;
    let publisher_identifier = decode::read_padded_str(reader, 128)?;
    let data_preparer_identifier = decode::read_padded_str(reader, 128)?;
    let application_identifier = decode::read_padded_str(reader, 128)?;
    let copyright_file_identifier = decode::read_padded_str(reader, 38)?;
    let abstract_file_identifier = decode::read_padded_str(reader, 36)?;
    let bibliographic_file_identifier = decode::read_padded_str(reader, 37)?;
    let mut timestamps = [[0u8; 17]; 4];
    for slot in timestamps.iter_mut() {
        slot.copy_from_slice(decode::take_bytes(reader, 17)?);
    }
    let file_structure_version = decode::read_u8(reader)?;

    info!(
        "volume '{}': {} blocks of {} bytes, path table {} bytes at sector {}",
        volume_identifier,
        volume_space_size,
        logical_block_size,
        path_table_size,
        path_table_location
    );

    Ok(PrimaryVolumeDescriptor {
        standard_identifier,
        version,
        system_identifier,
        volume_identifier,
        volume_space_size,
        volume_set_size,
        volume_sequence_number,
        logical_block_size,
        path_table_size,
        path_table_location,
        optional_path_table_location,
        mirror_path_table_location,
        optional_mirror_path_table_location,
        root_directory,
        volume_set_identifier,
        publisher_identifier,
        data_preparer_identifier,
        application_identifier,
        copyright_file_identifier,
        abstract_file_identifier,
        bibliographic_file_identifier,
        timestamps,
        file_structure_version,
    })
}
