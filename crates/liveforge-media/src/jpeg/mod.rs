//! JPEG metadata injection.
//!
//! Tags a still image with an Apple maker note carrying the content
//! identifier and bumps `ExifVersion`, without touching the compressed
//! image data.

pub mod exif;
mod inject;
pub mod segments;

pub use inject::{
    inject, read_metadata, scan_payload, write_with_identifier, ImageMetadataEntry,
    StillImageMarkers, LIVE_PHOTO_EXIF_VERSION,
};
