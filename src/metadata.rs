//! Image metadata: the product descriptor baked into every software
//! image, read without mounting.

use log::debug;
use quick_xml::{events::Event, Reader};
use thiserror::Error;

use crate::iso9660::{IsoError, IsoImage};

/// Path of the metadata document inside a software image.
pub const METADATA_PATH: &str = "/METADATA.XML";

/// The product identity carried by a software image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageInfo {
    pub product: String,
    pub version: String,
    pub build: String,
}

/// Errors raised while reading or interpreting image metadata.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// The underlying image could not serve the metadata file.
    #[error(transparent)]
    Image(#[from] IsoError),

    /// The metadata document is not UTF-8 or not well-formed XML.
    #[error("Invalid metadata XML: {0}")]
    InvalidXml(String),
}

pub type Result<T> = std::result::Result<T, MetadataError>;

/// Read `/METADATA.XML` from an opened image and extract the product
/// triple.
///
/// # Errors
/// Returns an error if the image has no metadata file or the document
/// is not well-formed UTF-8 XML. Absent tags are not an error; their
/// fields stay empty.
pub fn image_info(image: &IsoImage) -> Result<ImageInfo> {
    let bytes = image.get_file(METADATA_PATH)?;
    parse_metadata(&bytes)
}

/// Pull productName, version and buildNumber out of a metadata document.
///
/// The last non-empty text node seen before each closing tag wins, which
/// tolerates indentation and unknown elements around the values.
fn parse_metadata(bytes: &[u8]) -> Result<ImageInfo> {
    let document =
        std::str::from_utf8(bytes).map_err(|e| MetadataError::InvalidXml(e.to_string()))?;
    let mut reader = Reader::from_str(document);
    let mut buf = Vec::new();

    let mut info = ImageInfo::default();
    let mut last_text = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Text(text)) => {
                let text = text
                    .unescape()
                    .map_err(|e| MetadataError::InvalidXml(e.to_string()))?;
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    last_text = trimmed.to_string();
                }
            }
            Ok(Event::End(end)) => match end.name().as_ref() {
                b"productName" => info.product = last_text.clone(),
                b"version" => info.version = last_text.clone(),
                b"buildNumber" => info.build = last_text.clone(),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(MetadataError::InvalidXml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    debug!(
        "image metadata: product='{}' version='{}' build='{}'",
        info.product, info.version, info.build
    );
    Ok(info)
}
