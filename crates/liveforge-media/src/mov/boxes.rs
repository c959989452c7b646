//! QuickTime atom serialization primitives.
//!
//! Every atom is a big-endian u32 size, a four-character type and its
//! payload. Payloads are assembled with [`Atom`] and closed with
//! [`Atom::finish`], which prepends the header.

use crate::mp4::{EditListEntry, IDENTITY_MATRIX};

/// Packed ISO-639-2/T code for "und".
pub const LANGUAGE_UNDETERMINED: u16 = 0x55C4;

/// Size of the 64-bit `mdat` header written ahead of streamed sample data.
pub const LARGE_MDAT_HEADER_SIZE: u64 = 16;

/// Payload under construction for a single atom.
struct Atom {
    kind: [u8; 4],
    payload: Vec<u8>,
}

impl Atom {
    fn new(kind: &[u8; 4]) -> Self {
        Self { kind: *kind, payload: Vec::new() }
    }

    /// Starts a full atom: version byte plus 24-bit flags.
    fn full(kind: &[u8; 4], version: u8, flags: u32) -> Self {
        Self::new(kind).raw(&fullbox_header(version, flags))
    }

    fn raw(mut self, bytes: &[u8]) -> Self {
        self.payload.extend_from_slice(bytes);
        self
    }

    fn zeros(mut self, n: usize) -> Self {
        self.payload.resize(self.payload.len() + n, 0);
        self
    }

    fn u16(self, v: u16) -> Self {
        self.raw(&v.to_be_bytes())
    }

    fn u32(self, v: u32) -> Self {
        self.raw(&v.to_be_bytes())
    }

    fn u64(self, v: u64) -> Self {
        self.raw(&v.to_be_bytes())
    }

    /// Entry count followed by one serialized record per item.
    fn table<T>(self, items: &[T], mut record: impl FnMut(Self, &T) -> Self) -> Self {
        items
            .iter()
            .fold(self.u32(items.len() as u32), |atom, item| record(atom, item))
    }

    fn matrix(self, matrix: &[u32; 9]) -> Self {
        matrix.iter().fold(self, |atom, &v| atom.u32(v))
    }

    fn finish(self) -> Vec<u8> {
        write_box(&self.kind, &self.payload)
    }
}

/// Frame `content` as one atom.
pub fn write_box(box_type: &[u8; 4], content: &[u8]) -> Vec<u8> {
    write_container_box(box_type, &[content])
}

/// Frame the concatenation of `children` as one atom.
pub fn write_container_box(box_type: &[u8; 4], children: &[&[u8]]) -> Vec<u8> {
    let total = 8 + children.iter().map(|c| c.len()).sum::<usize>();
    let mut framed = Vec::with_capacity(total);
    framed.extend_from_slice(&(total as u32).to_be_bytes());
    framed.extend_from_slice(box_type);
    children.iter().for_each(|c| framed.extend_from_slice(c));
    framed
}

pub fn fullbox_header(version: u8, flags: u32) -> [u8; 4] {
    (((version as u32) << 24) | (flags & 0x00FF_FFFF)).to_be_bytes()
}

/// `ftyp` for a QuickTime movie: major brand `qt  `.
pub fn write_ftyp() -> Vec<u8> {
    Atom::new(b"ftyp").raw(b"qt  ").u32(0).raw(b"qt  ").finish()
}

/// 64-bit `mdat` header for `payload_len` bytes of sample data.
pub fn write_large_mdat_header(payload_len: u64) -> [u8; 16] {
    let mut header = [0u8; 16];
    header[3] = 1;
    header[4..8].copy_from_slice(b"mdat");
    header[8..].copy_from_slice(&(LARGE_MDAT_HEADER_SIZE + payload_len).to_be_bytes());
    header
}

// Movie and track headers are always version 1 (64-bit times, zeroed dates).

pub fn write_mvhd(timescale: u32, duration: u64, next_track_id: u32) -> Vec<u8> {
    Atom::full(b"mvhd", 1, 0)
        .zeros(16)
        .u32(timescale)
        .u64(duration)
        // rate 1.0, volume 1.0
        .u32(0x0001_0000)
        .u16(0x0100)
        .zeros(10)
        .matrix(&IDENTITY_MATRIX)
        .zeros(24)
        .u32(next_track_id)
        .finish()
}

/// Fields of a `tkhd` atom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackHeader {
    pub track_id: u32,
    /// Duration in the movie timescale.
    pub duration: u64,
    /// 8.8 fixed point; 0 for video and metadata tracks.
    pub volume: u16,
    /// 16.16 fixed point.
    pub width: u32,
    /// 16.16 fixed point.
    pub height: u32,
    pub matrix: [u32; 9],
}

pub fn write_tkhd(header: &TrackHeader) -> Vec<u8> {
    // enabled | in movie | in preview
    Atom::full(b"tkhd", 1, 0x7)
        .zeros(16)
        .u32(header.track_id)
        .zeros(4)
        .u64(header.duration)
        // reserved, layer, alternate group
        .zeros(12)
        .u16(header.volume)
        .zeros(2)
        .matrix(&header.matrix)
        .u32(header.width)
        .u32(header.height)
        .finish()
}

pub fn write_mdhd(timescale: u32, duration: u64, language: u16) -> Vec<u8> {
    Atom::full(b"mdhd", 1, 0)
        .zeros(16)
        .u32(timescale)
        .u64(duration)
        .u16(language)
        .zeros(2)
        .finish()
}

pub fn write_hdlr(handler_type: &[u8; 4], name: &[u8]) -> Vec<u8> {
    Atom::full(b"hdlr", 0, 0)
        .zeros(4)
        .raw(handler_type)
        .zeros(12)
        .raw(name)
        .zeros(1)
        .finish()
}

/// `tref` holding one reference kind.
pub fn write_tref(kind: &[u8; 4], track_ids: &[u32]) -> Vec<u8> {
    let reference = track_ids.iter().fold(Atom::new(kind), |a, &id| a.u32(id)).finish();
    write_container_box(b"tref", &[&reference])
}

/// `edts` holding one `elst`; version 1 when a field needs 64 bits.
pub fn write_edts(entries: &[EditListEntry]) -> Vec<u8> {
    let wide = entries.iter().any(|e| {
        u32::try_from(e.segment_duration).is_err() || i32::try_from(e.media_time).is_err()
    });
    let elst = Atom::full(b"elst", u8::from(wide), 0)
        .table(entries, |a, e| {
            let a = if wide {
                a.u64(e.segment_duration).raw(&e.media_time.to_be_bytes())
            } else {
                a.u32(e.segment_duration as u32)
                    .raw(&(e.media_time as i32).to_be_bytes())
            };
            a.u32(e.media_rate)
        })
        .finish();
    write_container_box(b"edts", &[&elst])
}

/// `dinf` with a single self-contained data reference.
pub fn write_dinf() -> Vec<u8> {
    let url = Atom::full(b"url ", 0, 1).finish();
    let dref = Atom::full(b"dref", 0, 0).u32(1).raw(&url).finish();
    write_container_box(b"dinf", &[&dref])
}

pub fn write_vmhd() -> Vec<u8> {
    // graphics mode and opcolor stay zero
    Atom::full(b"vmhd", 0, 1).zeros(8).finish()
}

pub fn write_smhd() -> Vec<u8> {
    Atom::full(b"smhd", 0, 0).zeros(4).finish()
}

/// Null media header, used by timed metadata tracks.
pub fn write_nmhd() -> Vec<u8> {
    Atom::full(b"nmhd", 0, 0).finish()
}

/// `stsd` wrapping already-serialized sample entries.
pub fn write_stsd(entries: &[&[u8]]) -> Vec<u8> {
    Atom::full(b"stsd", 0, 0).table(entries, |a, e| a.raw(e)).finish()
}

/// Visual sample entry (`avc1`, `hvc1`, ...) followed by its config atoms.
pub fn write_visual_sample_entry(
    entry_type: &[u8; 4],
    width: u16,
    height: u16,
    config: &[u8],
) -> Vec<u8> {
    const DPI_72: u32 = 0x0048_0000;
    Atom::new(entry_type)
        .zeros(6)
        .u16(1)
        .zeros(16)
        .u16(width)
        .u16(height)
        .u32(DPI_72)
        .u32(DPI_72)
        .zeros(4)
        // one frame per sample, blank compressor name, 24-bit depth, no color table
        .u16(1)
        .zeros(32)
        .u16(24)
        .u16(0xFFFF)
        .raw(config)
        .finish()
}

/// `mp4a` sample entry with an optional `esds` payload.
pub fn write_audio_sample_entry(sample_rate: u32, channels: u16, esds: &[u8]) -> Vec<u8> {
    let entry = Atom::new(b"mp4a")
        .zeros(6)
        .u16(1)
        .zeros(8)
        .u16(channels)
        .u16(16)
        .zeros(4)
        .u32(sample_rate << 16);
    if esds.is_empty() {
        entry.finish()
    } else {
        entry.raw(&write_box(b"esds", esds)).finish()
    }
}

/// `stts` from `(count, delta)` runs.
pub fn write_stts(runs: &[(u32, u32)]) -> Vec<u8> {
    Atom::full(b"stts", 0, 0)
        .table(runs, |a, &(count, delta)| a.u32(count).u32(delta))
        .finish()
}

/// `ctts` from `(count, offset)` runs; version 1 when any offset is negative.
pub fn write_ctts(runs: &[(u32, i32)]) -> Vec<u8> {
    let signed = runs.iter().any(|&(_, offset)| offset < 0);
    Atom::full(b"ctts", u8::from(signed), 0)
        .table(runs, |a, &(count, offset)| a.u32(count).raw(&offset.to_be_bytes()))
        .finish()
}

/// `stss` from 1-based sample numbers.
pub fn write_stss(sample_numbers: &[u32]) -> Vec<u8> {
    Atom::full(b"stss", 0, 0)
        .table(sample_numbers, |a, &n| a.u32(n))
        .finish()
}

/// `stsz`; collapses to the fixed-size form when every sample matches.
pub fn write_stsz(sizes: &[u32]) -> Vec<u8> {
    let fixed = match sizes.split_first() {
        Some((&first, rest)) if rest.iter().all(|&s| s == first) => first,
        _ => 0,
    };
    let atom = Atom::full(b"stsz", 0, 0).u32(fixed);
    if fixed == 0 {
        atom.table(sizes, |a, &size| a.u32(size)).finish()
    } else {
        atom.u32(sizes.len() as u32).finish()
    }
}

/// `stsc` from `(first_chunk, samples_per_chunk, description_index)` entries.
pub fn write_stsc(entries: &[(u32, u32, u32)]) -> Vec<u8> {
    Atom::full(b"stsc", 0, 0)
        .table(entries, |a, &(first, per_chunk, description)| {
            a.u32(first).u32(per_chunk).u32(description)
        })
        .finish()
}

/// `stco`, or `co64` when any offset exceeds 32 bits.
pub fn write_chunk_offsets(offsets: &[u64]) -> Vec<u8> {
    match offsets.iter().map(|&o| u32::try_from(o)).collect::<Result<Vec<u32>, _>>() {
        Ok(narrow) => Atom::full(b"stco", 0, 0).table(&narrow, |a, &o| a.u32(o)).finish(),
        Err(_) => Atom::full(b"co64", 0, 0).table(offsets, |a, &o| a.u64(o)).finish(),
    }
}
