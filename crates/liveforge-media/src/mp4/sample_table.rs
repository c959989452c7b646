//! Parse sample table atoms (stts, ctts, stss, stsz, stsc, stco, co64)
//! and resolve them into a flat list of samples with absolute file offsets.

use std::collections::HashSet;
use std::io::{self, Read, Seek, SeekFrom};

use super::atoms::{find_child_box, read_fullbox_header, read_i32, read_u32, read_u64};

/// A fully resolved sample with absolute file position.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct ResolvedSample {
    pub index: u32,
    pub file_offset: u64,
    pub size: u32,
    pub duration: u32,
    pub composition_offset: i32,
    pub is_sync: bool,
    pub decode_timestamp: u64,
    /// 1-based entry of `stsd` describing this sample.
    pub description_index: u32,
}

/// A resolved sample table for one track.
#[derive(Debug, Clone)]
pub struct ResolvedSampleTable {
    pub samples: Vec<ResolvedSample>,
    pub timescale: u32,
}

impl ResolvedSampleTable {
    /// Sum of all sample durations in the media timescale.
    pub fn total_duration(&self) -> u64 {
        self.samples.iter().map(|s| s.duration as u64).sum()
    }
}

fn invalid(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_string())
}

/// Skip version/flags, then read `entry_count` records with `record`.
fn read_table<R: Read, T>(
    reader: &mut R,
    mut record: impl FnMut(&mut R) -> io::Result<T>,
) -> io::Result<Vec<T>> {
    read_fullbox_header(reader)?;
    let entry_count = read_u32(reader)?;
    // cap the preallocation; a corrupt count fails on the first short read
    let mut out = Vec::with_capacity(entry_count.min(1 << 16) as usize);
    for _ in 0..entry_count {
        out.push(record(reader)?);
    }
    Ok(out)
}

/// `stts` runs of `(count, delta)`.
fn parse_stts<R: Read>(reader: &mut R) -> io::Result<Vec<(u32, u32)>> {
    read_table(reader, |r| Ok((read_u32(r)?, read_u32(r)?)))
}

/// `ctts` runs of `(count, offset)`. Version 0 offsets are read as signed as
/// well, since QuickTime writers store negative values there too.
fn parse_ctts<R: Read>(reader: &mut R) -> io::Result<Vec<(u32, i32)>> {
    read_table(reader, |r| Ok((read_u32(r)?, read_i32(r)?)))
}

/// 0-based indices of sync samples (the atom stores 1-based numbers).
fn parse_stss<R: Read>(reader: &mut R) -> io::Result<HashSet<u32>> {
    let numbers = read_table(reader, read_u32)?;
    numbers
        .into_iter()
        .map(|n| n.checked_sub(1).ok_or_else(|| invalid("stss sample number 0")))
        .collect()
}

/// Sample sizes. A fixed-size table must fit its samples into the
/// `stream_len` bytes of the file.
fn parse_stsz<R: Read>(reader: &mut R, stream_len: u64) -> io::Result<Vec<u32>> {
    read_fullbox_header(reader)?;
    let fixed = read_u32(reader)?;
    let count = read_u32(reader)?;
    if fixed == 0 {
        let mut sizes = Vec::with_capacity(count.min(1 << 16) as usize);
        for _ in 0..count {
            sizes.push(read_u32(reader)?);
        }
        return Ok(sizes);
    }
    if count as u64 * fixed as u64 > stream_len {
        return Err(invalid("stsz declares more sample data than the file holds"));
    }
    Ok(vec![fixed; count as usize])
}

/// `(first_chunk, samples_per_chunk, description_index)` runs.
fn parse_stsc<R: Read>(reader: &mut R) -> io::Result<Vec<(u32, u32, u32)>> {
    read_table(reader, |r| Ok((read_u32(r)?, read_u32(r)?, read_u32(r)?)))
}

fn parse_chunk_offsets<R: Read>(reader: &mut R, wide: bool) -> io::Result<Vec<u64>> {
    if wide {
        read_table(reader, read_u64)
    } else {
        read_table(reader, |r| read_u32(r).map(u64::from))
    }
}

/// Position the reader at the content of `target` inside stbl, if present.
fn locate<R: Read + Seek>(
    reader: &mut R,
    stbl_start: u64,
    stbl_content_size: u64,
    target: &[u8; 4],
) -> io::Result<bool> {
    reader.seek(SeekFrom::Start(stbl_start))?;
    Ok(find_child_box(reader, stbl_content_size, target)?.is_some())
}

/// Resolve the sample table from the raw stbl atom content.
///
/// The reader should be positioned at the start of stbl's content.
pub fn resolve_sample_table<R: Read + Seek>(
    reader: &mut R,
    stbl_content_size: u64,
    timescale: u32,
) -> io::Result<ResolvedSampleTable> {
    let stbl_start = reader.stream_position()?;
    let stream_len = reader.seek(SeekFrom::End(0))?;

    if !locate(reader, stbl_start, stbl_content_size, b"stts")? {
        return Err(invalid("missing stts atom"));
    }
    let durations = parse_stts(reader)?;

    let composition = if locate(reader, stbl_start, stbl_content_size, b"ctts")? {
        parse_ctts(reader)?
    } else {
        Vec::new()
    };

    // Absent stss means every sample is a sync sample.
    let sync_set = if locate(reader, stbl_start, stbl_content_size, b"stss")? {
        Some(parse_stss(reader)?)
    } else {
        None
    };

    if !locate(reader, stbl_start, stbl_content_size, b"stsz")? {
        return Err(invalid("missing stsz atom"));
    }
    let sizes = parse_stsz(reader, stream_len)?;

    if !locate(reader, stbl_start, stbl_content_size, b"stsc")? {
        return Err(invalid("missing stsc atom"));
    }
    let stsc = parse_stsc(reader)?;

    let chunk_offsets = if locate(reader, stbl_start, stbl_content_size, b"stco")? {
        parse_chunk_offsets(reader, false)?
    } else if locate(reader, stbl_start, stbl_content_size, b"co64")? {
        parse_chunk_offsets(reader, true)?
    } else {
        return Err(invalid("missing stco/co64 atom"));
    };

    if !sizes.is_empty() && stsc.is_empty() {
        return Err(invalid("empty stsc with non-empty stsz"));
    }

    // Walk chunks, assigning file offsets. stsc entries use 1-based chunk
    // numbers and apply until the next entry's first_chunk.
    let sample_count = sizes.len();
    let mut placements: Vec<(u64, u32, u32)> = Vec::with_capacity(sample_count);
    let mut stsc_idx = 0usize;
    for (chunk_idx, &chunk_offset) in chunk_offsets.iter().enumerate() {
        let chunk_number = chunk_idx as u32 + 1;
        while stsc_idx + 1 < stsc.len() && stsc[stsc_idx + 1].0 <= chunk_number {
            stsc_idx += 1;
        }
        let (per_chunk, description_index) =
            stsc.get(stsc_idx).map_or((0, 1), |&(_, n, desc)| (n, desc));
        let mut offset = chunk_offset;
        for _ in 0..per_chunk {
            let Some(&size) = sizes.get(placements.len()) else {
                break;
            };
            placements.push((offset, size, description_index));
            offset += size as u64;
        }
    }
    if placements.len() < sample_count {
        return Err(invalid("chunk map covers fewer samples than stsz declares"));
    }

    let mut decode_times = expand_runs(&durations);
    let mut offsets = expand_runs(&composition);

    let mut samples = Vec::with_capacity(sample_count);
    let mut dts = 0u64;
    for (i, (file_offset, size, description_index)) in placements.into_iter().enumerate() {
        let index = i as u32;
        let duration = decode_times.next().unwrap_or(0);
        samples.push(ResolvedSample {
            index,
            file_offset,
            size,
            duration,
            composition_offset: offsets.next().unwrap_or(0),
            is_sync: sync_set.as_ref().map_or(true, |set| set.contains(&index)),
            decode_timestamp: dts,
            description_index,
        });
        dts += duration as u64;
    }

    Ok(ResolvedSampleTable { samples, timescale })
}

fn expand_runs<T: Copy>(runs: &[(u32, T)]) -> impl Iterator<Item = T> + '_ {
    runs.iter()
        .flat_map(|&(count, value)| std::iter::repeat(value).take(count as usize))
}
