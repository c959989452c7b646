//! Tagging a JPEG with a content identifier.

use std::fs::{self, File};
use std::io::{self, Cursor, Write};
use std::path::Path;

use image::{ImageFormat, ImageReader};
use liveforge_common::{ContentIdentifier, Error, FileAsset, Result};

use super::exif::{
    apple_content_identifier, apple_maker_note, Directory, ExifData, IfdEntry, TAG_EXIF_VERSION,
    TAG_MAKER_NOTE,
};
use super::segments::{write_segment, JpegLayout, Segment, APP1, SOI};

/// The EXIF revision written alongside the maker note.
pub const LIVE_PHOTO_EXIF_VERSION: [u8; 3] = [2, 2, 1];

/// A metadata change applied to a still image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageMetadataEntry {
    /// Apple maker note entry 17 carrying the identifier.
    VendorMarker(ContentIdentifier),
    /// EXIF `ExifVersion` as four ASCII digits.
    ExifVersion([u8; 4]),
}

impl ImageMetadataEntry {
    /// `ExifVersion` from `[major, minor, patch]`; `[2, 2, 1]` is `"0221"`.
    pub fn exif_version(version: [u8; 3]) -> Self {
        let [major, minor, patch] = version;
        ImageMetadataEntry::ExifVersion([
            b'0' + (major / 10) % 10,
            b'0' + major % 10,
            b'0' + minor % 10,
            b'0' + patch % 10,
        ])
    }

    /// The two entries that make a still image half of a live photo.
    pub fn live_photo(identifier: ContentIdentifier) -> [Self; 2] {
        [
            ImageMetadataEntry::VendorMarker(identifier),
            ImageMetadataEntry::exif_version(LIVE_PHOTO_EXIF_VERSION),
        ]
    }

    fn apply(&self, exif: &mut ExifData) {
        match self {
            ImageMetadataEntry::VendorMarker(identifier) => exif.set(
                Directory::Exif,
                IfdEntry::undefined(TAG_MAKER_NOTE, apple_maker_note(&identifier.to_string())),
            ),
            ImageMetadataEntry::ExifVersion(version) => exif.set(
                Directory::Exif,
                IfdEntry::undefined(TAG_EXIF_VERSION, version.to_vec()),
            ),
        }
    }
}

/// Live-photo markers found in a JPEG.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct StillImageMarkers {
    pub content_identifier: Option<String>,
    pub exif_version: Option<[u8; 4]>,
}

/// Copy `source` to `destination` with the live-photo markers for
/// `destination`'s identifier added.
///
/// The compressed image data is copied unchanged; only the header segments
/// are rewritten.
pub fn write_with_identifier(source: &Path, destination: &FileAsset) -> Result<()> {
    let bytes = fs::read(source).map_err(|_| Error::invalid_file_path(source))?;
    let mut file = File::create(destination.path())
        .map_err(|_| Error::invalid_file_path(destination.path()))?;

    probe_dimensions(&bytes).map_err(|e| {
        tracing::debug!("{} is not a decodable JPEG: {e}", source.display());
        Error::invalid_file_metadata(source)
    })?;
    let entries = ImageMetadataEntry::live_photo(destination.identifier());
    let tagged = inject(&bytes, &entries).map_err(|e| {
        tracing::debug!("failed to rewrite metadata of {}: {e}", source.display());
        Error::invalid_file_metadata(source)
    })?;

    file.write_all(&tagged)?;
    file.flush()?;
    file.sync_all()?;

    tracing::info!(
        "Tagged {} -> {} ({} bytes)",
        source.display(),
        destination.path().display(),
        tagged.len()
    );
    Ok(())
}

/// Rebuild `bytes` with `entries` applied to its EXIF metadata.
///
/// Output order: SOI, APP0 JFIF (if present), the new APP1 Exif, the
/// remaining header segments, then the scan data verbatim.
pub fn inject(bytes: &[u8], entries: &[ImageMetadataEntry]) -> io::Result<Vec<u8>> {
    let layout = JpegLayout::parse(bytes)?;

    let mut exif = match layout.exif_payload() {
        Some(payload) => ExifData::parse(payload)?,
        None => ExifData::default(),
    };
    for entry in entries {
        entry.apply(&mut exif);
    }
    let app1 = exif.to_app1_payload();

    let mut out = Vec::with_capacity(bytes.len() + app1.len() + 4);
    out.extend_from_slice(&[0xFF, SOI]);

    let jfif = layout.segments.iter().position(|s| s.is_jfif());
    if let Some(i) = jfif {
        write_segment(&mut out, layout.segments[i].marker, layout.segments[i].payload)?;
    }
    write_segment(&mut out, APP1, &app1)?;
    for (i, segment) in layout.segments.iter().enumerate() {
        if Some(i) == jfif || segment.is_exif() {
            continue;
        }
        if Segment::is_standalone(segment.marker) {
            out.extend_from_slice(&[0xFF, segment.marker]);
            continue;
        }
        write_segment(&mut out, segment.marker, segment.payload)?;
    }
    out.extend_from_slice(layout.scan);
    Ok(out)
}

/// Read the live-photo markers of a JPEG.
pub fn read_metadata(bytes: &[u8]) -> io::Result<StillImageMarkers> {
    let layout = JpegLayout::parse(bytes)?;
    let Some(payload) = layout.exif_payload() else {
        return Ok(StillImageMarkers::default());
    };
    let exif = ExifData::parse(payload)?;

    Ok(StillImageMarkers {
        content_identifier: exif
            .get(Directory::Exif, TAG_MAKER_NOTE)
            .and_then(|note| apple_content_identifier(&note.value)),
        exif_version: exif
            .get(Directory::Exif, TAG_EXIF_VERSION)
            .and_then(|e| e.value.as_slice().try_into().ok()),
    })
}

/// The compressed payload, from Start-Of-Scan to the end of the file.
pub fn scan_payload(bytes: &[u8]) -> io::Result<&[u8]> {
    Ok(JpegLayout::parse(bytes)?.scan)
}

fn probe_dimensions(bytes: &[u8]) -> std::result::Result<(u32, u32), String> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| e.to_string())?;
    if reader.format() != Some(ImageFormat::Jpeg) {
        return Err(format!("unexpected image format {:?}", reader.format()));
    }
    reader.into_dimensions().map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{codecs::jpeg::JpegEncoder, Rgb, RgbImage};

    fn encoded_jpeg() -> Vec<u8> {
        let img = RgbImage::from_fn(16, 8, |x, y| Rgb([(x * 16) as u8, (y * 32) as u8, 128]));
        let mut bytes = Vec::new();
        JpegEncoder::new_with_quality(&mut bytes, 90).encode_image(&img).unwrap();
        bytes
    }

    #[test]
    fn test_exif_version_digits() {
        assert_eq!(
            ImageMetadataEntry::exif_version([2, 2, 1]),
            ImageMetadataEntry::ExifVersion(*b"0221")
        );
        assert_eq!(
            ImageMetadataEntry::exif_version([2, 3, 0]),
            ImageMetadataEntry::ExifVersion(*b"0230")
        );
    }

    #[test]
    fn test_inject_keeps_payload_and_decodes() {
        let source = encoded_jpeg();
        let id = ContentIdentifier::new();
        let tagged = inject(&source, &ImageMetadataEntry::live_photo(id)).unwrap();

        assert_eq!(scan_payload(&tagged).unwrap(), scan_payload(&source).unwrap());
        let markers = read_metadata(&tagged).unwrap();
        assert_eq!(markers.content_identifier, Some(id.to_string()));
        assert_eq!(markers.exif_version, Some(*b"0221"));

        let decoded = image::load_from_memory(&tagged).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (16, 8));
    }

    #[test]
    fn test_app1_follows_jfif() {
        let source = encoded_jpeg();
        let entries = ImageMetadataEntry::live_photo(ContentIdentifier::new());
        let tagged = inject(&source, &entries).unwrap();
        let layout = JpegLayout::parse(&tagged).unwrap();
        let jfif = layout.segments.iter().position(|s| s.is_jfif());
        let exif = layout.segments.iter().position(|s| s.is_exif()).unwrap();
        match jfif {
            Some(j) => assert_eq!(exif, j + 1),
            None => assert_eq!(exif, 0),
        }
    }

    #[test]
    fn test_reinjecting_replaces_marker() {
        let source = encoded_jpeg();
        let first_entries = ImageMetadataEntry::live_photo(ContentIdentifier::new());
        let first = inject(&source, &first_entries).unwrap();
        let second_id = ContentIdentifier::new();
        let second = inject(&first, &ImageMetadataEntry::live_photo(second_id)).unwrap();

        let layout = JpegLayout::parse(&second).unwrap();
        assert_eq!(layout.segments.iter().filter(|s| s.is_exif()).count(), 1);
        assert_eq!(
            read_metadata(&second).unwrap().content_identifier,
            Some(second_id.to_string())
        );
    }

    #[test]
    fn test_untagged_image_has_no_markers() {
        assert_eq!(read_metadata(&encoded_jpeg()).unwrap(), StillImageMarkers::default());
    }

    #[test]
    fn test_write_with_identifier_errors() {
        let dir = tempfile::tempdir().unwrap();
        let destination = FileAsset::new(ContentIdentifier::new(), dir.path().join("out.jpg"));

        let err = write_with_identifier(&dir.path().join("absent.jpg"), &destination).unwrap_err();
        assert!(matches!(err, Error::InvalidFilePath { .. }));

        let garbage = dir.path().join("garbage.jpg");
        std::fs::write(&garbage, b"definitely not a jpeg").unwrap();
        let err = write_with_identifier(&garbage, &destination).unwrap_err();
        assert!(matches!(err, Error::InvalidFileMetadata { ref path } if path == &garbage));

        let source = dir.path().join("source.jpg");
        std::fs::write(&source, encoded_jpeg()).unwrap();
        let nowhere = FileAsset::new(ContentIdentifier::new(), dir.path().join("no/such/out.jpg"));
        let err = write_with_identifier(&source, &nowhere).unwrap_err();
        assert!(matches!(err, Error::InvalidFilePath { ref path } if path == nowhere.path()));
    }
}
