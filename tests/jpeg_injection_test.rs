//! Still image tagging integration tests

mod common;

use std::fs;

use assert_matches::assert_matches;
use common::{init_tracing, write_jpeg};
use liveforge::{ContentIdentifier, Error, FileAsset};
use liveforge_media::jpeg::{
    self,
    exif::{Directory, ExifData, IfdEntry, TAG_EXIF_VERSION, TAG_MAKER_NOTE},
    segments::{write_segment, JpegLayout, APP1},
};

#[test]
fn test_round_trip_keeps_compressed_payload() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let source = write_jpeg(&dir.path().join("photo.jpg"), 120, 80);
    let id = ContentIdentifier::new();
    let destination = FileAsset::new(id, dir.path().join("tagged.jpg"));

    jpeg::write_with_identifier(&source, &destination).unwrap();

    let original = fs::read(&source).unwrap();
    let tagged = fs::read(destination.path()).unwrap();
    assert_eq!(
        jpeg::scan_payload(&tagged).unwrap(),
        jpeg::scan_payload(&original).unwrap()
    );

    let markers = jpeg::read_metadata(&tagged).unwrap();
    assert_eq!(markers.content_identifier, Some(id.to_string()));
    assert_eq!(markers.exif_version, Some(*b"0221"));

    let decoded = image::open(destination.path()).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (120, 80));
    assert_eq!(decoded, image::open(&source).unwrap());
}

/// A source that already carries camera EXIF keeps it next to the new entries.
#[test]
fn test_existing_exif_is_preserved() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let plain = fs::read(write_jpeg(&dir.path().join("plain.jpg"), 32, 32)).unwrap();

    let mut camera = ExifData::default();
    camera.set(Directory::Ifd0, IfdEntry::undefined(0x0131, b"CameraApp 1.0\0".to_vec()));
    camera.set(Directory::Exif, IfdEntry::undefined(TAG_EXIF_VERSION, b"0230".to_vec()));
    camera.set(Directory::Exif, IfdEntry::undefined(TAG_MAKER_NOTE, b"Nikon\0old".to_vec()));
    camera.set(Directory::Gps, IfdEntry::undefined(0x001B, b"ASCII\0\0\0NETWORK".to_vec()));

    // splice an APP1 right after SOI
    let mut with_exif = plain[..2].to_vec();
    write_segment(&mut with_exif, APP1, &camera.to_app1_payload()).unwrap();
    with_exif.extend_from_slice(&plain[2..]);
    let source = dir.path().join("camera.jpg");
    fs::write(&source, &with_exif).unwrap();

    let id = ContentIdentifier::new();
    let destination = FileAsset::new(id, dir.path().join("tagged.jpg"));
    jpeg::write_with_identifier(&source, &destination).unwrap();
    let tagged = fs::read(destination.path()).unwrap();

    let layout = JpegLayout::parse(&tagged).unwrap();
    assert_eq!(layout.segments.iter().filter(|s| s.is_exif()).count(), 1);
    let exif = ExifData::parse(layout.exif_payload().unwrap()).unwrap();
    assert_eq!(exif.get(Directory::Ifd0, 0x0131), camera.get(Directory::Ifd0, 0x0131));
    assert_eq!(exif.gps, camera.gps);
    assert_eq!(exif.get(Directory::Exif, TAG_EXIF_VERSION).unwrap().value, b"0221");

    let markers = jpeg::read_metadata(&tagged).unwrap();
    assert_eq!(markers.content_identifier, Some(id.to_string()));
    assert_eq!(jpeg::scan_payload(&tagged).unwrap(), jpeg::scan_payload(&with_exif).unwrap());
}

#[test]
fn test_corrupt_source_is_invalid_metadata() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let full = fs::read(write_jpeg(&dir.path().join("full.jpg"), 32, 32)).unwrap();
    let truncated = dir.path().join("truncated.jpg");
    fs::write(&truncated, &full[..20]).unwrap();

    let destination = FileAsset::new(ContentIdentifier::new(), dir.path().join("out.jpg"));
    let err = jpeg::write_with_identifier(&truncated, &destination).unwrap_err();
    assert_matches!(err, Error::InvalidFileMetadata { ref path } if path == &truncated);
}

#[test]
fn test_png_source_is_invalid_metadata() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let png = dir.path().join("photo.png");
    common::write_png(&png, 8, 8);

    let destination = FileAsset::new(ContentIdentifier::new(), dir.path().join("out.jpg"));
    let err = jpeg::write_with_identifier(&png, &destination).unwrap_err();
    assert_matches!(err, Error::InvalidFileMetadata { .. });
}
