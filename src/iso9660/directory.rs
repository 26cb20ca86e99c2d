//! Directory records and the child iterator.
//!
//! A directory's extent is a run of sectors holding variable-length
//! records. Records never straddle a sector boundary: when the next
//! record does not fit, the remainder of the sector is zero padding and
//! decoding resumes at the next boundary.

use chrono::{DateTime, Duration, TimeZone, Utc};
use log::trace;

use super::decode;
use super::error::{IsoError, Result};
use super::sector::{SectorReader, SECTOR_SIZE};

/// Directory bit of the file-flags byte.
const FLAG_DIRECTORY: u8 = 0x02;

/// One decoded directory record: a file or subdirectory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryRecord {
    /// Entry name with any `;version` suffix stripped. Empty for a
    /// directory's own entry.
    pub name: String,
    /// First sector of the entry's extent.
    pub extent_location: u32,
    /// Extent length in bytes.
    pub extent_length: u32,
    /// Recording time, when the on-disk bytes form a calendar date.
    pub recorded_at: Option<DateTime<Utc>>,
    pub flags: u8,
    pub interleave_unit_size: u8,
    pub interleave_gap_size: u8,
    pub volume_sequence_number: u16,
}

impl DirectoryRecord {
    pub fn is_directory(&self) -> bool {
        self.flags & FLAG_DIRECTORY != 0
    }
}

/// Decode one directory record at the cursor.
///
/// A record of declared length 0 is the null record that terminates the
/// records of the current sector; it consumes one byte and is returned as
/// `None`. Otherwise the record and its declared length (the bytes it
/// accounts for in the enclosing extent) are returned, with the cursor
/// left at the next record boundary.
pub fn read_record(reader: &mut &[u8]) -> Result<Option<(DirectoryRecord, usize)>> {
    let record_length = decode::read_u8(reader)? as usize;
    if record_length == 0 {
        return Ok(None);
    }
    decode::skip_bytes(reader, 1)?; // extended-attribute record length
    let extent_location = decode::read_u32_both(reader, "extent location")?;
    let extent_length = decode::read_u32_both(reader, "extent length")?;
    let recorded_at = read_timestamp(reader)?;
    let flags = decode::read_u8(reader)?;
    let interleave_unit_size = decode::read_u8(reader)?;
    let interleave_gap_size = decode::read_u8(reader)?;
    let volume_sequence_number = decode::read_u16_both(reader, "volume sequence number")?;
    let name_length = decode::read_u8(reader)? as usize;
    let name = decode_name(decode::take_bytes(reader, name_length)?);

    // Records stay even-aligned: an even-length name is followed by one
    // padding byte.
    let mut fixed = 33 + name_length;
    if name_length % 2 == 0 {
        decode::skip_bytes(reader, 1)?;
        fixed += 1;
    }
    if record_length < fixed {
        return Err(IsoError::ImageCorrupt(format!(
            "directory record declares {} bytes but its fields span {}",
            record_length, fixed
        )));
    }
    // Anything up to the declared length is system-use data.
    decode::skip_bytes(reader, record_length - fixed)?;

    let record = DirectoryRecord {
        name,
        extent_location,
        extent_length,
        recorded_at,
        flags,
        interleave_unit_size,
        interleave_gap_size,
        volume_sequence_number,
    };
    Ok(Some((record, record_length)))
}

/// Strip the `;version` suffix and map the null self-identifier to "".
fn decode_name(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    let text = text.trim_end_matches(' ');
    let name = text.split(';').next().unwrap_or_default();
    if name == "\u{0}" {
        String::new()
    } else {
        name.to_string()
    }
}

/// Decode the packed 7-byte recording time.
///
/// Byte 0 is years since 1900, bytes 1-5 are month, day, hour, minute and
/// second, byte 6 is the offset from GMT in signed units of 15 minutes.
/// Bytes that do not form a calendar date (an unrecorded time is all
/// zeroes) yield `None`.
fn read_timestamp(reader: &mut &[u8]) -> Result<Option<DateTime<Utc>>> {
    let raw = decode::take_bytes(reader, 7)?;
    let offset_units = raw[6] as i8;
    let composed = Utc
        .with_ymd_and_hms(
            1900 + i32::from(raw[0]),
            u32::from(raw[1]),
            u32::from(raw[2]),
            u32::from(raw[3]),
            u32::from(raw[4]),
            u32::from(raw[5]),
        )
        .single();
    Ok(composed.map(|time| time - Duration::seconds(i64::from(offset_units) * 15 * 60)))
}

/// Lazily yields the immediate children of one directory.
///
/// The iterator re-reads the directory's extent sector by sector. The
/// first two records are the directory's own entry and its parent's;
/// both are decoded and dropped, and the own entry's extent length bounds
/// the iteration. The sequence is finite and rebuilt fresh for every
/// traversal, so no iterator state outlives a call.
pub struct DirectoryChildren<'a> {
    sectors: &'a SectorReader,
    extent_location: u32,
    extent_length: u32,
    buffer: Vec<u8>,
    cursor: usize,
    consumed: u32,
    primed: bool,
    failed: bool,
}

impl<'a> DirectoryChildren<'a> {
    pub(super) fn new(sectors: &'a SectorReader, extent_location: u32) -> Self {
        Self {
            sectors,
            extent_location,
            extent_length: 0,
            buffer: Vec::new(),
            cursor: 0,
            consumed: 0,
            primed: false,
            failed: false,
        }
    }

    /// Read the first sector and account the self and parent entries.
    fn prime(&mut self) -> Result<()> {
        self.buffer = self
            .sectors
            .read(self.extent_location, SECTOR_SIZE as usize)?;
        let mut reader: &[u8] = &self.buffer;
        let (own, own_length) = read_record(&mut reader)?.ok_or_else(|| {
            IsoError::ImageCorrupt("directory extent starts with a null record".to_string())
        })?;
        let (_, parent_length) = read_record(&mut reader)?.ok_or_else(|| {
            IsoError::ImageCorrupt("directory extent has no parent entry".to_string())
        })?;
        trace!(
            "directory at sector {}: {} bytes of records",
            self.extent_location,
            own.extent_length
        );
        self.extent_length = own.extent_length;
        self.cursor = own_length + parent_length;
        self.consumed = (own_length + parent_length) as u32;
        Ok(())
    }
}

impl Iterator for DirectoryChildren<'_> {
    type Item = Result<DirectoryRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        if !self.primed {
            self.primed = true;
            if let Err(e) = self.prime() {
                self.failed = true;
                return Some(Err(e));
            }
        }
        loop {
            if self.consumed >= self.extent_length {
                return None;
            }
            // On a sector boundary the next record starts in the next
            // sector of the extent.
            if self.consumed % SECTOR_SIZE == 0 {
                let sector = self.extent_location + self.consumed / SECTOR_SIZE;
                match self.sectors.read(sector, SECTOR_SIZE as usize) {
                    Ok(buffer) => {
                        self.buffer = buffer;
                        self.cursor = 0;
                    }
                    Err(e) => {
                        self.failed = true;
                        return Some(Err(e));
                    }
                }
            }
            let mut reader: &[u8] = &self.buffer[self.cursor..];
            match read_record(&mut reader) {
                Ok(Some((record, length))) => {
                    self.cursor += length;
                    self.consumed += length as u32;
                    return Some(Ok(record));
                }
                Ok(None) => {
                    // The rest of this sector is padding.
                    self.consumed += SECTOR_SIZE - (self.consumed % SECTOR_SIZE);
                }
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
