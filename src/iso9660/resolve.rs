//! Path resolution: locate a directory record by absolute path, using
//! the path table when it can prove the parent chain and walking the
//! directory tree when it cannot.

use log::{debug, warn};

use super::directory::{DirectoryChildren, DirectoryRecord};
use super::error::{IsoError, Result};
use super::path_table::PathTableEntry;
use super::sector::SectorReader;
use super::volume::PrimaryVolumeDescriptor;

pub(super) struct PathResolver<'a> {
    sectors: &'a SectorReader,
    volume: &'a PrimaryVolumeDescriptor,
    table: &'a [PathTableEntry],
}

/// Uppercase a path and split it into its non-empty segments.
fn normalize(path: &str) -> Vec<String> {
    path.to_uppercase()
        .trim_matches('/')
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}

impl<'a> PathResolver<'a> {
    pub(super) fn new(
        sectors: &'a SectorReader,
        volume: &'a PrimaryVolumeDescriptor,
        table: &'a [PathTableEntry],
    ) -> Self {
        PathResolver {
            sectors,
            volume,
            table,
        }
    }

    /// Find the record for `path`. The parent directory comes from the
    /// path table when a full chain up to the root matches, otherwise
    /// from a top-down walk; the final segment is always matched against
    /// the parent's children.
    pub(super) fn resolve(&self, path: &str) -> Result<DirectoryRecord> {
        let mut segments = normalize(path);
        let file_name = match segments.pop() {
            Some(name) => name,
            None => return Err(IsoError::PathNotFound(path.to_string())),
        };

        let parent_extent = if segments.is_empty() {
            self.volume.root_directory.extent_location
        } else {
            match self.parent_from_table(&segments) {
                Some(extent) => {
                    debug!("path table resolved {:?} to extent {}", segments, extent);
                    extent
                }
                None => {
                    warn!(
                        "path table has no chain for {:?}, walking the tree",
                        segments
                    );
                    self.parent_from_walk(&segments, path)?
                }
            }
        };

        match self.find_child(parent_extent, &file_name)? {
            Some(record) => Ok(record),
            None => Err(IsoError::PathNotFound(path.to_string())),
        }
    }

    /// Look the parent directory up in the path table. A candidate entry
    /// counts only if every ancestor segment matches on the way up and
    /// the chain ends at the root.
    fn parent_from_table(&self, segments: &[String]) -> Option<u32> {
        let target = segments.last()?;
        for position in (0..self.table.len()).rev() {
            if self.table[position].name == *target {
                if let Some(extent) = self.chain_matches(position, segments) {
                    return Some(extent);
                }
            }
        }
        None
    }

    /// Verify the parent chain of the entry at `start` against `segments`
    /// from deepest to shallowest. Parents number entries from 1, so the
    /// chain is complete when it lands on index 0, the root.
    fn chain_matches(&self, start: usize, segments: &[String]) -> Option<u32> {
        let mut position = start;
        for segment in segments.iter().rev() {
            let entry = self.table.get(position)?;
            if entry.name != *segment {
                return None;
            }
            position = usize::from(entry.parent).checked_sub(1)?;
        }
        if position == 0 {
            Some(self.table.get(start)?.extent_location)
        } else {
            None
        }
    }

    /// Walk the directory tree from the root, one segment at a time.
    fn parent_from_walk(&self, segments: &[String], path: &str) -> Result<u32> {
        let mut extent = self.volume.root_directory.extent_location;
        for segment in segments {
            match self.find_child(extent, segment)? {
                Some(record) if record.is_directory() => extent = record.extent_location,
                _ => return Err(IsoError::PathNotFound(path.to_string())),
            }
        }
        Ok(extent)
    }

    fn find_child(&self, extent: u32, name: &str) -> Result<Option<DirectoryRecord>> {
        for child in DirectoryChildren::new(self.sectors, extent) {
            let record = child?;
            if record.name == name {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }
}
