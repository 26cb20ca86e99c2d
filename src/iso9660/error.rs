//! Error types for the ISO 9660 reader.

use thiserror::Error;

/// The error type for all image-reading operations.
#[derive(Debug, Error)]
pub enum IsoError {
    /// An error originating from I/O on the backing image file.
    #[error("I/O error: {0:?}")]
    Io(#[from] std::io::Error),

    /// The image violates the ISO 9660 structure: a both-endian field whose
    /// halves disagree, path-table byte accounting that misses the declared
    /// size, a descriptor set without a terminator, or a record that
    /// overruns its buffer.
    #[error("Corrupt image: {0}")]
    ImageCorrupt(String),

    /// No entry matched the requested path under either resolution
    /// strategy.
    #[error("Path not found in image: {0}")]
    PathNotFound(String),

    /// A sector-region read came back short of the requested length.
    #[error("Truncated read at sector {sector}: wanted {wanted} bytes, got {got}")]
    TruncatedRead {
        sector: u32,
        wanted: usize,
        got: usize,
    },
}

/// A convenience `Result` type alias using the crate's `IsoError` type.
pub type Result<T> = std::result::Result<T, IsoError>;
