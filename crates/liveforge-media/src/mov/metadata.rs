//! Metadata items carried by a live photo movie.
//!
//! The content identifier is an asset-level item stored in `moov/meta`. The
//! still-image-time marker is a timed item stored as a sample of a `mebx`
//! metadata track, positioned by a [`TimeRange`].

use std::io;

use liveforge_common::{ContentIdentifier, MediaTime, TimeRange};

use super::boxes::{fullbox_header, write_box, write_container_box, write_hdlr, write_stsd};

pub const CONTENT_IDENTIFIER_KEY: &str = "com.apple.quicktime.content.identifier";
pub const STILL_IMAGE_TIME_KEY: &str = "com.apple.quicktime.still-image-time";
pub const KEYSPACE_MDTA: [u8; 4] = *b"mdta";
pub const DATA_TYPE_UTF8: &str = "com.apple.metadata.datatype.UTF-8";
pub const DATA_TYPE_INT8: &str = "com.apple.metadata.datatype.int8";

/// Well-known type numbers used in `data` and `dtyp` atoms.
pub const WELL_KNOWN_UTF8: u32 = 1;
pub const WELL_KNOWN_INT8: u32 = 65;

/// A metadata item the muxer knows how to write.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum MetadataItem {
    /// Asset-level identifier shared with the still image.
    ContentIdentifier(String),
    /// Timed marker pointing at the frame matching the still image.
    StillImageTime(i8),
}

impl MetadataItem {
    pub fn content_identifier(identifier: ContentIdentifier) -> Self {
        MetadataItem::ContentIdentifier(identifier.to_string())
    }

    pub fn key(&self) -> &'static str {
        match self {
            MetadataItem::ContentIdentifier(_) => CONTENT_IDENTIFIER_KEY,
            MetadataItem::StillImageTime(_) => STILL_IMAGE_TIME_KEY,
        }
    }

    pub fn keyspace(&self) -> [u8; 4] {
        KEYSPACE_MDTA
    }

    pub fn data_type(&self) -> &'static str {
        match self {
            MetadataItem::ContentIdentifier(_) => DATA_TYPE_UTF8,
            MetadataItem::StillImageTime(_) => DATA_TYPE_INT8,
        }
    }

    pub fn well_known_type(&self) -> u32 {
        match self {
            MetadataItem::ContentIdentifier(_) => WELL_KNOWN_UTF8,
            MetadataItem::StillImageTime(_) => WELL_KNOWN_INT8,
        }
    }

    pub fn value_bytes(&self) -> Vec<u8> {
        match self {
            MetadataItem::ContentIdentifier(id) => id.as_bytes().to_vec(),
            MetadataItem::StillImageTime(value) => value.to_be_bytes().to_vec(),
        }
    }
}

/// Timed items sharing one time range; written as one metadata sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedMetadataGroup {
    pub items: Vec<MetadataItem>,
    pub range: TimeRange,
}

/// Range of the still-image-time marker: starts at 0/1000 s and lasts
/// 200/3000 s, independent of the clip length.
pub fn still_image_time_range() -> TimeRange {
    TimeRange::new(MediaTime::new(0, 1000), MediaTime::new(200, 3000))
}

/// The single timed group every live photo movie carries.
pub fn pairing_marker() -> TimedMetadataGroup {
    TimedMetadataGroup {
        items: vec![MetadataItem::StillImageTime(0)],
        range: still_image_time_range(),
    }
}

/// Movie-level `meta` atom (QuickTime layout: `hdlr` `mdta`, `keys`, `ilst`).
pub fn write_movie_meta(items: &[MetadataItem]) -> Vec<u8> {
    let hdlr = write_hdlr(b"mdta", b"");

    let mut keys = Vec::new();
    keys.extend_from_slice(&fullbox_header(0, 0));
    keys.extend_from_slice(&(items.len() as u32).to_be_bytes());
    for item in items {
        let key = item.key().as_bytes();
        keys.extend_from_slice(&((8 + key.len()) as u32).to_be_bytes());
        keys.extend_from_slice(&item.keyspace());
        keys.extend_from_slice(key);
    }
    let keys = write_box(b"keys", &keys);

    let mut ilst = Vec::new();
    for (i, item) in items.iter().enumerate() {
        let mut data = Vec::new();
        data.extend_from_slice(&item.well_known_type().to_be_bytes());
        // locale: default
        data.extend_from_slice(&0u32.to_be_bytes());
        data.extend_from_slice(&item.value_bytes());
        let index = (i as u32 + 1).to_be_bytes();
        ilst.extend_from_slice(&write_container_box(&index, &[&write_box(b"data", &data)]));
    }
    let ilst = write_box(b"ilst", &ilst);

    write_container_box(b"meta", &[&hdlr, &keys, &ilst])
}

/// `stsd` holding one `mebx` entry that declares `items`' keys, with local
/// ids assigned 1.. in order.
pub fn write_mebx_stsd(items: &[MetadataItem]) -> Vec<u8> {
    let mut local_keys = Vec::new();
    for (i, item) in items.iter().enumerate() {
        let mut keyd = Vec::new();
        keyd.extend_from_slice(&item.keyspace());
        keyd.extend_from_slice(item.key().as_bytes());

        let mut dtyp = Vec::new();
        // namespace 0: well-known type follows
        dtyp.extend_from_slice(&0u32.to_be_bytes());
        dtyp.extend_from_slice(&item.well_known_type().to_be_bytes());

        let local_id = (i as u32 + 1).to_be_bytes();
        local_keys.extend_from_slice(&write_container_box(
            &local_id,
            &[&write_box(b"keyd", &keyd), &write_box(b"dtyp", &dtyp)],
        ));
    }

    let mut entry = Vec::new();
    // reserved + data reference index
    entry.extend_from_slice(&[0u8; 6]);
    entry.extend_from_slice(&1u16.to_be_bytes());
    entry.extend_from_slice(&write_box(b"keys", &local_keys));

    write_stsd(&[&write_box(b"mebx", &entry)])
}

/// Serialize a timed group as a `mebx` sample: one `[size][local id][value]`
/// record per item. Every item must be declared in `declared`.
pub fn encode_sample(group: &TimedMetadataGroup, declared: &[MetadataItem]) -> io::Result<Vec<u8>> {
    let mut sample = Vec::new();
    for item in &group.items {
        let local_id = declared
            .iter()
            .position(|d| d.key() == item.key())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("metadata key {} is not declared by the track", item.key()),
                )
            })? as u32
            + 1;
        let value = item.value_bytes();
        sample.extend_from_slice(&((8 + value.len()) as u32).to_be_bytes());
        sample.extend_from_slice(&local_id.to_be_bytes());
        sample.extend_from_slice(&value);
    }
    Ok(sample)
}

/// Split a `mebx` sample into `(local id, value)` records.
pub fn decode_sample(payload: &[u8]) -> io::Result<Vec<(u32, Vec<u8>)>> {
    let mut records = Vec::new();
    let mut pos = 0usize;
    while pos + 8 <= payload.len() {
        let size = u32::from_be_bytes([
            payload[pos],
            payload[pos + 1],
            payload[pos + 2],
            payload[pos + 3],
        ]) as usize;
        if size < 8 || pos + size > payload.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "metadata sample record overruns the sample",
            ));
        }
        let local_id = u32::from_be_bytes([
            payload[pos + 4],
            payload[pos + 5],
            payload[pos + 6],
            payload[pos + 7],
        ]);
        records.push((local_id, payload[pos + 8..pos + size].to_vec()));
        pos += size;
    }
    if pos != payload.len() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "trailing bytes in metadata sample",
        ));
    }
    Ok(records)
}
