//! The little-endian path table: one entry per directory on the volume,
//! used as the fast route when resolving a path.

use log::debug;

use super::decode;
use super::error::{IsoError, Result};
use super::sector::SectorReader;

/// One path table entry. The root is entry 1; `parent` numbers entries
/// from 1 in table order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTableEntry {
    pub name: String,
    pub parent: u16,
    pub extent_location: u32,
}

/// Read the table at `location` and parse exactly `size` bytes of it.
pub fn read_path_table(
    sectors: &SectorReader,
    location: u32,
    size: u32,
) -> Result<Vec<PathTableEntry>> {
    let buffer = sectors.read(location, size as usize)?;
    let entries = parse_table(&buffer)?;
    debug!("path table holds {} directories", entries.len());
    Ok(entries)
}

/// Decode table entries until the buffer is exhausted. Entries are
/// name length, extended attribute length, extent, parent, then the
/// name padded to an even length.
pub(crate) fn parse_table(buffer: &[u8]) -> Result<Vec<PathTableEntry>> {
    let mut entries = Vec::new();
    let mut reader: &[u8] = buffer;
    while !reader.is_empty() {
        let name_length = usize::from(reader[0]);
        let entry_length = 8 + name_length + name_length % 2;
        if entry_length > reader.len() {
            return Err(IsoError::ImageCorrupt(format!(
                "path table entry needs {} bytes, {} remain of the declared size",
                entry_length,
                reader.len()
            )));
        }
        decode::skip_bytes(&mut reader, 1)?;
        let _extended_attribute_length = decode::read_u8(&mut reader)?;
        let extent_location = decode::read_u32_le(&mut reader)?;
        let parent = decode::read_u16_le(&mut reader)?;
        let raw_name = decode::take_bytes(&mut reader, name_length)?;
        if name_length % 2 == 1 {
            decode::skip_bytes(&mut reader, 1)?;
        }
        let name = decode_entry_name(raw_name);
        entries.push(PathTableEntry {
            name,
            parent,
            extent_location,
        });
    }
    Ok(entries)
}

/// Table names use `\x00` for the root, which maps to the empty string.
fn decode_entry_name(raw: &[u8]) -> String {
    let name = String::from_utf8_lossy(raw);
    if name == "\u{0}" {
        String::new()
    } else {
        name.into_owned()
    }
}
