//! Scoped sector reads against the backing image file.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use log::trace;

use super::error::{IsoError, Result};

/// Fixed addressable unit of an ISO 9660 image, in bytes.
pub const SECTOR_SIZE: u32 = 2048;

/// Reads byte regions addressed by sector number from the image file.
///
/// Every read opens the file, seeks, reads and drops the handle. No
/// descriptor is held between calls, so interleaved lookups never share
/// file-position state and the file is released on every exit path.
#[derive(Debug, Clone)]
pub struct SectorReader {
    path: PathBuf,
}

impl SectorReader {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Read exactly `length` bytes starting at `sector * 2048`.
    ///
    /// # Errors
    /// Returns `TruncatedRead` when the file ends before `length` bytes are
    /// available, and `Io` for any other failure opening or positioning the
    /// file.
    pub fn read(&self, sector: u32, length: usize) -> Result<Vec<u8>> {
        trace!("sector read: sector={}, length={}", sector, length);
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(
            u64::from(sector) * u64::from(SECTOR_SIZE),
        ))?;
        let mut buffer = Vec::with_capacity(length);
        let got = file.take(length as u64).read_to_end(&mut buffer)?;
        if got < length {
            return Err(IsoError::TruncatedRead {
                sector,
                wanted: length,
                got,
            });
        }
        Ok(buffer)
    }
}
