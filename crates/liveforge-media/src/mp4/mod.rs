//! QuickTime / MP4 `moov` parser.
//!
//! Parses an existing movie's `moov` atom into per-track descriptions with
//! resolved sample tables, so samples can be copied without decoding.

pub mod atoms;
pub mod metadata;
pub mod sample_table;

use std::io::{self, Read, Seek, SeekFrom};

use atoms::{
    find_child_box, list_children, read_box_bytes, read_bytes, read_fullbox_header, read_i32,
    read_u16, read_u32, read_u64,
};
pub use metadata::{AssetMetadataEntry, TimedMetadataKey};
pub use sample_table::{ResolvedSample, ResolvedSampleTable};

/// Identity transform as stored in `tkhd`/`mvhd`.
pub const IDENTITY_MATRIX: [u32; 9] = [
    0x0001_0000, 0, 0, 0, 0x0001_0000, 0, 0, 0, 0x4000_0000,
];

/// Parsed contents of a movie's `moov` atom.
#[derive(Debug, Clone)]
pub struct MovieInfo {
    pub timescale: u32,
    pub duration: u64,
    pub tracks: Vec<TrackInfo>,
    /// Asset-level items from `moov/meta`.
    pub metadata: Vec<AssetMetadataEntry>,
}

impl MovieInfo {
    pub fn duration_secs(&self) -> f64 {
        if self.timescale == 0 {
            return 0.0;
        }
        self.duration as f64 / self.timescale as f64
    }

    /// The first track whose handler is `vide`.
    pub fn video_track(&self) -> Option<&TrackInfo> {
        self.tracks.iter().find(|t| &t.handler_type == b"vide")
    }

    /// Timed metadata tracks (handler `meta`).
    pub fn metadata_tracks(&self) -> impl Iterator<Item = &TrackInfo> {
        self.tracks.iter().filter(|t| &t.handler_type == b"meta")
    }

    /// Asset-level UTF-8 item value for `key`.
    pub fn metadata_string(&self, key: &str) -> Option<&str> {
        self.metadata
            .iter()
            .find(|e| e.key == key)
            .and_then(|e| e.as_utf8())
    }
}

/// A `tref` entry: reference kind and the referenced track ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackReference {
    pub kind: [u8; 4],
    pub track_ids: Vec<u32>,
}

/// One `elst` segment.
///
/// `segment_duration` is in the movie timescale, `media_time` in the track's
/// media timescale; a media time of -1 marks an empty edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct EditListEntry {
    pub segment_duration: u64,
    pub media_time: i64,
    /// 16.16 fixed point playback rate.
    pub media_rate: u32,
}

/// Information about a single track.
#[derive(Debug, Clone)]
pub struct TrackInfo {
    pub track_id: u32,
    pub handler_type: [u8; 4],
    pub timescale: u32,
    pub duration: u64,
    /// Packed ISO-639-2/T language code from `mdhd`.
    pub language: u16,
    /// Presentation width, 16.16 fixed point.
    pub width: u32,
    /// Presentation height, 16.16 fixed point.
    pub height: u32,
    /// Display transform from `tkhd`.
    pub matrix: [u32; 9],
    /// The complete `stsd` atom, header included.
    pub sample_description: Vec<u8>,
    /// Type of the first sample entry (e.g. `avc1`, `hvc1`, `mebx`).
    pub sample_entry_type: Option<[u8; 4]>,
    pub references: Vec<TrackReference>,
    /// `edts/elst` segments, empty when the track has no edit list.
    pub edit_list: Vec<EditListEntry>,
    pub sample_table: ResolvedSampleTable,
}

impl TrackInfo {
    /// Keys declared by a `mebx` sample description, empty for other tracks.
    pub fn metadata_keys(&self) -> io::Result<Vec<TimedMetadataKey>> {
        metadata::parse_mebx_keys(&self.sample_description)
    }

    /// Track ids referenced with the given `tref` kind.
    pub fn referenced_tracks(&self, kind: &[u8; 4]) -> &[u32] {
        self.references
            .iter()
            .find(|r| &r.kind == kind)
            .map(|r| r.track_ids.as_slice())
            .unwrap_or(&[])
    }
}

fn invalid(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_string())
}

/// Parse the `moov` atom from a movie.
///
/// Tracks that cannot be parsed are skipped; a missing `moov` or `mvhd` is an
/// error.
pub fn parse_movie<R: Read + Seek>(reader: &mut R) -> io::Result<MovieInfo> {
    let file_size = reader.seek(SeekFrom::End(0))?;
    reader.rewind()?;
    let moov = find_child_box(reader, file_size, b"moov")?
        .ok_or_else(|| invalid("no moov atom found"))?;
    let moov_start = reader.stream_position()?;
    let moov_content = moov.content_size();

    reader.seek(SeekFrom::Start(moov_start))?;
    find_child_box(reader, moov_content, b"mvhd")?.ok_or_else(|| invalid("no mvhd in moov"))?;
    let (timescale, duration) = parse_media_times(reader)?;

    let mut tracks = Vec::new();
    let mut asset_metadata = Vec::new();

    reader.seek(SeekFrom::Start(moov_start))?;
    for (child, child_start) in list_children(reader, moov_content)? {
        if child.is(b"trak") {
            match parse_trak(reader, child_start, child.content_size()) {
                Ok(Some(track)) => tracks.push(track),
                Ok(None) => {}
                Err(e) => tracing::debug!("skipping unreadable trak at {child_start}: {e}"),
            }
        } else if child.is(b"meta") {
            reader.seek(SeekFrom::Start(child_start))?;
            asset_metadata = metadata::parse_meta(reader, child.content_size())?;
        }
    }

    Ok(MovieInfo {
        timescale,
        duration,
        tracks,
        metadata: asset_metadata,
    })
}

/// Field that is 64 bits wide in version 1 atoms and 32 bits otherwise.
fn read_versioned<R: Read>(reader: &mut R, version: u8) -> io::Result<u64> {
    match version {
        1 => read_u64(reader),
        _ => read_u32(reader).map(u64::from),
    }
}

/// Shared prefix of `mvhd` and `mdhd`: returns (timescale, duration).
fn parse_media_times<R: Read>(reader: &mut R) -> io::Result<(u32, u64)> {
    let (version, _) = read_fullbox_header(reader)?;
    // creation, modification
    read_versioned(reader, version)?;
    read_versioned(reader, version)?;
    let timescale = read_u32(reader)?;
    Ok((timescale, read_versioned(reader, version)?))
}

/// Parse a single trak atom. Returns `None` when required children are absent.
fn parse_trak<R: Read + Seek>(
    reader: &mut R,
    trak_start: u64,
    trak_content: u64,
) -> io::Result<Option<TrackInfo>> {
    reader.seek(SeekFrom::Start(trak_start))?;
    if find_child_box(reader, trak_content, b"tkhd")?.is_none() {
        return Ok(None);
    }
    let header = parse_tkhd(reader)?;

    reader.seek(SeekFrom::Start(trak_start))?;
    let references = match find_child_box(reader, trak_content, b"tref")? {
        Some(tref) => parse_tref(reader, tref.content_size())?,
        None => Vec::new(),
    };

    reader.seek(SeekFrom::Start(trak_start))?;
    let edit_list = match find_child_box(reader, trak_content, b"edts")? {
        Some(edts) => match find_child_box(reader, edts.content_size(), b"elst")? {
            Some(_) => parse_elst(reader)?,
            None => Vec::new(),
        },
        None => Vec::new(),
    };

    reader.seek(SeekFrom::Start(trak_start))?;
    let Some(mdia) = find_child_box(reader, trak_content, b"mdia")? else {
        return Ok(None);
    };
    let mdia_start = reader.stream_position()?;
    let mdia_content = mdia.content_size();

    reader.seek(SeekFrom::Start(mdia_start))?;
    if find_child_box(reader, mdia_content, b"mdhd")?.is_none() {
        return Ok(None);
    }
    let (timescale, duration) = parse_media_times(reader)?;
    let language = read_u16(reader)?;

    reader.seek(SeekFrom::Start(mdia_start))?;
    if find_child_box(reader, mdia_content, b"hdlr")?.is_none() {
        return Ok(None);
    }
    let handler_type = parse_hdlr(reader)?;

    reader.seek(SeekFrom::Start(mdia_start))?;
    let Some(minf) = find_child_box(reader, mdia_content, b"minf")? else {
        return Ok(None);
    };
    let minf_content = minf.content_size();
    let Some(stbl) = find_child_box(reader, minf_content, b"stbl")? else {
        return Ok(None);
    };
    let stbl_start = reader.stream_position()?;
    let stbl_content = stbl.content_size();

    let Some(stsd) = find_child_box(reader, stbl_content, b"stsd")? else {
        return Ok(None);
    };
    let stsd_start = reader.stream_position()?;
    let sample_description = read_box_bytes(reader, &stsd, stsd_start)?;
    let sample_entry_type = first_sample_entry_type(&sample_description);

    reader.seek(SeekFrom::Start(stbl_start))?;
    let sample_table = sample_table::resolve_sample_table(reader, stbl_content, timescale)?;

    Ok(Some(TrackInfo {
        track_id: header.track_id,
        handler_type,
        timescale,
        duration,
        language,
        width: header.width,
        height: header.height,
        matrix: header.matrix,
        sample_description,
        sample_entry_type,
        references,
        edit_list,
        sample_table,
    }))
}

struct TrackHeaderFields {
    track_id: u32,
    matrix: [u32; 9],
    width: u32,
    height: u32,
}

fn parse_tkhd<R: Read>(reader: &mut R) -> io::Result<TrackHeaderFields> {
    let (version, _) = read_fullbox_header(reader)?;
    read_versioned(reader, version)?;
    read_versioned(reader, version)?;
    let track_id = read_u32(reader)?;
    read_u32(reader)?;
    read_versioned(reader, version)?;
    // reserved, layer, alternate group, volume, reserved
    read_bytes(reader, 16)?;
    let mut matrix = [0u32; 9];
    for cell in &mut matrix {
        *cell = read_u32(reader)?;
    }
    Ok(TrackHeaderFields {
        track_id,
        matrix,
        width: read_u32(reader)?,
        height: read_u32(reader)?,
    })
}

fn parse_elst<R: Read>(reader: &mut R) -> io::Result<Vec<EditListEntry>> {
    let (version, _) = read_fullbox_header(reader)?;
    let count = read_u32(reader)?;
    let mut entries = Vec::with_capacity(count.min(1 << 10) as usize);
    for _ in 0..count {
        let segment_duration = read_versioned(reader, version)?;
        let media_time = match version {
            1 => read_u64(reader)? as i64,
            _ => read_i32(reader)? as i64,
        };
        entries.push(EditListEntry {
            segment_duration,
            media_time,
            media_rate: read_u32(reader)?,
        });
    }
    Ok(entries)
}

fn parse_hdlr<R: Read>(reader: &mut R) -> io::Result<[u8; 4]> {
    read_fullbox_header(reader)?;
    // pre_defined / component type
    read_u32(reader)?;
    atoms::read_fourcc(reader)
}

fn parse_tref<R: Read + Seek>(
    reader: &mut R,
    content_size: u64,
) -> io::Result<Vec<TrackReference>> {
    let mut references = Vec::new();
    for (kind, start) in list_children(reader, content_size)? {
        reader.seek(SeekFrom::Start(start))?;
        let track_ids = (0..kind.content_size() / 4)
            .map(|_| read_u32(reader))
            .collect::<io::Result<Vec<_>>>()?;
        references.push(TrackReference {
            kind: kind.box_type,
            track_ids,
        });
    }
    Ok(references)
}

/// stsd layout: size(4) type(4) version/flags(4) count(4) then entries.
fn first_sample_entry_type(stsd: &[u8]) -> Option<[u8; 4]> {
    if stsd.len() < 24 {
        return None;
    }
    let count = u32::from_be_bytes([stsd[12], stsd[13], stsd[14], stsd[15]]);
    if count == 0 {
        return None;
    }
    Some([stsd[20], stsd[21], stsd[22], stsd[23]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mov::boxes;
    use std::io::Cursor;

    fn video_trak(track_id: u32, stsd: &[u8], chunk_offset: u64) -> Vec<u8> {
        let stbl = boxes::write_container_box(
            b"stbl",
            &[
                stsd,
                &boxes::write_stts(&[(2, 512)]),
                &boxes::write_stss(&[1]),
                &boxes::write_stsz(&[4, 3]),
                &boxes::write_stsc(&[(1, 2, 1)]),
                &boxes::write_chunk_offsets(&[chunk_offset]),
            ],
        );
        let minf = boxes::write_container_box(
            b"minf",
            &[&boxes::write_vmhd(), &boxes::write_dinf(), &stbl],
        );
        let mdia = boxes::write_container_box(
            b"mdia",
            &[
                &boxes::write_mdhd(12800, 1024, boxes::LANGUAGE_UNDETERMINED),
                &boxes::write_hdlr(b"vide", b"VideoHandler"),
                &minf,
            ],
        );
        let tkhd = boxes::write_tkhd(&boxes::TrackHeader {
            track_id,
            duration: 80,
            volume: 0,
            width: 640 << 16,
            height: 480 << 16,
            matrix: [0, 0x0001_0000, 0, 0xFFFF_0000, 0, 0, 0, 0, 0x4000_0000],
        });
        boxes::write_container_box(b"trak", &[&tkhd, &mdia])
    }

    #[test]
    fn test_parse_movie_video_track() {
        let stsd = boxes::write_stsd(&[&boxes::write_box(b"avc1", &[0u8; 78])]);
        let ftyp = boxes::write_ftyp();
        let mdat_payload = [1u8, 2, 3, 4, 5, 6, 7];
        let mdat = boxes::write_box(b"mdat", &mdat_payload);
        let data_offset = (ftyp.len() + 8) as u64;

        let trak = video_trak(1, &stsd, data_offset);
        let moov = boxes::write_container_box(b"moov", &[&boxes::write_mvhd(600, 80, 2), &trak]);

        let file = [ftyp, mdat, moov].concat();
        let movie = parse_movie(&mut Cursor::new(&file)).unwrap();

        assert_eq!(movie.timescale, 600);
        assert_eq!(movie.duration, 80);
        let video = movie.video_track().unwrap();
        assert_eq!(video.track_id, 1);
        assert_eq!(video.timescale, 12800);
        assert_eq!(video.width >> 16, 640);
        assert_eq!(video.height >> 16, 480);
        assert_eq!(video.matrix[1], 0x0001_0000);
        assert_eq!(video.language, boxes::LANGUAGE_UNDETERMINED);
        assert_eq!(video.sample_description, stsd);
        assert_eq!(video.sample_entry_type, Some(*b"avc1"));
        assert_eq!(video.sample_table.samples.len(), 2);
        assert_eq!(video.sample_table.samples[1].file_offset, data_offset + 4);
        assert!(!video.sample_table.samples[1].is_sync);
        assert!(movie.metadata.is_empty());
    }

    #[test]
    fn test_parse_movie_without_moov() {
        let file = [boxes::write_ftyp(), boxes::write_box(b"mdat", &[0u8; 16])].concat();
        let err = parse_movie(&mut Cursor::new(&file)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_parse_tref_references() {
        let stsd = boxes::write_stsd(&[&boxes::write_box(b"avc1", &[0u8; 78])]);
        let mut trak = video_trak(2, &stsd, 0);
        // Splice a tref after the trak header.
        let tref = boxes::write_tref(b"cdsc", &[1]);
        let mut content = trak[8..].to_vec();
        content.extend_from_slice(&tref);
        trak = boxes::write_box(b"trak", &content);

        let moov = boxes::write_container_box(b"moov", &[&boxes::write_mvhd(600, 0, 3), &trak]);
        let movie = parse_movie(&mut Cursor::new(&moov)).unwrap();
        assert_eq!(movie.tracks[0].referenced_tracks(b"cdsc"), &[1]);
        assert!(movie.tracks[0].referenced_tracks(b"hint").is_empty());
    }

    #[test]
    fn test_first_sample_entry_type_empty() {
        assert_eq!(first_sample_entry_type(&boxes::write_stsd(&[])), None);
    }
}
