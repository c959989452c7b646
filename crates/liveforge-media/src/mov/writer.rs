//! Streaming QuickTime writer.
//!
//! Layout: `ftyp`, one 64-bit `mdat` whose size is patched on finish, then
//! `moov`. Samples go straight to disk as they are appended; only their
//! sizes, timings and offsets are kept in memory for the sample tables.

use std::fs::File;
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::boxes::{self, TrackHeader, LARGE_MDAT_HEADER_SIZE, LANGUAGE_UNDETERMINED};
use super::metadata::{
    encode_sample, write_mebx_stsd, write_movie_meta, MetadataItem, TimedMetadataGroup,
};
use super::reader::{SampleBuffer, VideoTrackFormat};
use crate::mp4::{EditListEntry, IDENTITY_MATRIX};
use liveforge_common::MediaTime;

const VIDEO_TRACK_ID: u32 = 1;
const METADATA_TRACK_ID: u32 = 2;
const FALLBACK_TIMESCALE: u32 = 600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrackKind {
    Video,
    Metadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Chunk {
    offset: u64,
    samples: u32,
    description_index: u32,
}

/// Sample bookkeeping for one output track.
#[derive(Debug, Default)]
struct TrackState {
    sizes: Vec<u32>,
    durations: Vec<u32>,
    composition_offsets: Vec<i32>,
    sync: Vec<bool>,
    chunks: Vec<Chunk>,
}

impl TrackState {
    fn media_duration(&self) -> u64 {
        self.durations.iter().map(|&d| d as u64).sum()
    }

    fn stbl(&self, stsd: &[u8]) -> Vec<u8> {
        let stts = boxes::write_stts(&runs(&self.durations));
        let stsz = boxes::write_stsz(&self.sizes);
        let stsc = boxes::write_stsc(&chunk_runs(&self.chunks));
        let offsets: Vec<u64> = self.chunks.iter().map(|c| c.offset).collect();
        let stco = boxes::write_chunk_offsets(&offsets);

        let mut children: Vec<Vec<u8>> = vec![stsd.to_vec(), stts];
        if self.composition_offsets.iter().any(|&o| o != 0) {
            children.push(boxes::write_ctts(&runs(&self.composition_offsets)));
        }
        // Without stss every sample is a sync sample.
        if self.sync.iter().any(|&s| !s) {
            let numbers: Vec<u32> = self
                .sync
                .iter()
                .enumerate()
                .filter(|(_, s)| **s)
                .map(|(i, _)| i as u32 + 1)
                .collect();
            children.push(boxes::write_stss(&numbers));
        }
        children.extend([stsz, stsc, stco]);

        let refs: Vec<&[u8]> = children.iter().map(Vec::as_slice).collect();
        boxes::write_container_box(b"stbl", &refs)
    }
}

/// Run-length encode consecutive equal values as `(count, value)`.
fn runs<T: PartialEq + Copy>(values: &[T]) -> Vec<(u32, T)> {
    let mut out: Vec<(u32, T)> = Vec::new();
    for &value in values {
        match out.last_mut() {
            Some((count, last)) if *last == value => *count += 1,
            _ => out.push((1, value)),
        }
    }
    out
}

/// stsc entries: a new entry whenever the per-chunk sample count or the
/// sample description changes.
fn chunk_runs(chunks: &[Chunk]) -> Vec<(u32, u32, u32)> {
    let mut out = Vec::new();
    let mut previous = None;
    for (i, chunk) in chunks.iter().enumerate() {
        let shape = (chunk.samples, chunk.description_index);
        if previous != Some(shape) {
            out.push((i as u32 + 1, shape.0, shape.1));
            previous = Some(shape);
        }
    }
    out
}

/// Per-sample fields that go into the sample tables.
#[derive(Debug, Clone, Copy)]
struct SampleTiming {
    duration: u32,
    composition_offset: i32,
    is_sync: bool,
    description_index: u32,
}

/// Writes a video track copied from a source plus live-photo metadata.
pub struct MovieWriter {
    file: BufWriter<File>,
    path: PathBuf,
    video_format: VideoTrackFormat,
    asset_items: Vec<MetadataItem>,
    timed_keys: Vec<MetadataItem>,
    metadata_timescale: Option<u32>,
    metadata_end: i64,
    mdat_start: u64,
    position: u64,
    video: TrackState,
    metadata: TrackState,
    last_track: Option<TrackKind>,
    video_finished: bool,
}

impl std::fmt::Debug for MovieWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MovieWriter")
            .field("path", &self.path)
            .field("position", &self.position)
            .field("video_samples", &self.video.sizes.len())
            .field("metadata_samples", &self.metadata.sizes.len())
            .finish()
    }
}

impl MovieWriter {
    /// Create `path` and write the file header.
    ///
    /// `asset_items` land in `moov/meta`; `timed_keys` are the keys the
    /// metadata track declares, in local-id order.
    pub fn create(
        path: &Path,
        video_format: VideoTrackFormat,
        asset_items: Vec<MetadataItem>,
        timed_keys: Vec<MetadataItem>,
    ) -> io::Result<Self> {
        let mut file = BufWriter::new(File::create(path)?);
        let ftyp = boxes::write_ftyp();
        file.write_all(&ftyp)?;
        let mdat_start = ftyp.len() as u64;
        file.write_all(&boxes::write_large_mdat_header(0))?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
            video_format,
            asset_items,
            timed_keys,
            metadata_timescale: None,
            metadata_end: 0,
            mdat_start,
            position: mdat_start + LARGE_MDAT_HEADER_SIZE,
            video: TrackState::default(),
            metadata: TrackState::default(),
            last_track: None,
            video_finished: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one timed metadata group as a sample of the metadata track.
    ///
    /// Groups must be contiguous: each starts where the previous one ended.
    pub fn append_metadata(&mut self, group: &TimedMetadataGroup) -> io::Result<()> {
        let timescale = *self
            .metadata_timescale
            .get_or_insert(group.range.duration.timescale.max(1));
        let start = group.range.start.rescale(timescale);
        if start != self.metadata_end {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "timed metadata must be contiguous: group starts at {start}, track ends at {}",
                    self.metadata_end
                ),
            ));
        }
        let duration = group.range.duration.rescale(timescale);
        let duration = u32::try_from(duration)
            .ok()
            .filter(|&d| d > 0)
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "timed metadata needs a positive duration",
                )
            })?;

        let payload = encode_sample(group, &self.timed_keys)?;
        let timing = SampleTiming {
            duration,
            composition_offset: 0,
            is_sync: true,
            description_index: 1,
        };
        self.write_sample(TrackKind::Metadata, &payload, timing)?;
        self.metadata_end += duration as i64;
        Ok(())
    }

    /// Append one video sample unchanged.
    pub fn append_video(&mut self, sample: &SampleBuffer) -> io::Result<()> {
        if self.video_finished {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "video input already marked finished",
            ));
        }
        let timing = SampleTiming {
            duration: sample.duration,
            composition_offset: sample.composition_offset,
            is_sync: sample.is_sync,
            description_index: sample.description_index.max(1),
        };
        self.write_sample(TrackKind::Video, &sample.data, timing)
    }

    /// No more video samples will be appended.
    pub fn mark_video_finished(&mut self) {
        self.video_finished = true;
    }

    fn write_sample(
        &mut self,
        kind: TrackKind,
        data: &[u8],
        timing: SampleTiming,
    ) -> io::Result<()> {
        let size = u32::try_from(data.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "sample larger than 4 GiB"))?;
        self.file.write_all(data)?;

        let offset = self.position;
        self.position += data.len() as u64;

        let continues_chunk = self.last_track == Some(kind);
        let track = match kind {
            TrackKind::Video => &mut self.video,
            TrackKind::Metadata => &mut self.metadata,
        };
        track.sizes.push(size);
        track.durations.push(timing.duration);
        track.composition_offsets.push(timing.composition_offset);
        track.sync.push(timing.is_sync);
        match track.chunks.last_mut() {
            Some(chunk)
                if continues_chunk && chunk.description_index == timing.description_index =>
            {
                chunk.samples += 1
            }
            _ => track.chunks.push(Chunk {
                offset,
                samples: 1,
                description_index: timing.description_index,
            }),
        }
        self.last_track = Some(kind);
        Ok(())
    }

    /// Patch the `mdat` size, write `moov` and sync the file to disk.
    pub fn finish(mut self) -> io::Result<()> {
        self.video_finished = true;
        let payload_len = self.position - self.mdat_start - LARGE_MDAT_HEADER_SIZE;

        self.file.seek(SeekFrom::Start(self.mdat_start))?;
        self.file.write_all(&boxes::write_large_mdat_header(payload_len))?;
        self.file.seek(SeekFrom::Start(self.position))?;

        let moov = self.build_moov();
        self.file.write_all(&moov)?;
        self.file.flush()?;
        self.file.get_ref().sync_all()?;

        tracing::debug!(
            "wrote {} ({} video samples, {} metadata samples)",
            self.path.display(),
            self.video.sizes.len(),
            self.metadata.sizes.len()
        );
        Ok(())
    }

    fn build_moov(&self) -> Vec<u8> {
        let format = &self.video_format;
        let movie_timescale = if format.timescale > 0 {
            format.timescale
        } else {
            FALLBACK_TIMESCALE
        };

        let video_media = self.video.media_duration();
        let edits = self.rescaled_edits(movie_timescale);
        // an edit list defines the presented length of the track
        let video_movie = if edits.is_empty() {
            MediaTime::new(video_media as i64, format.timescale)
                .rescale(movie_timescale)
                .max(0) as u64
        } else {
            edits.iter().map(|e| e.segment_duration).sum()
        };

        let video_tkhd = boxes::write_tkhd(&TrackHeader {
            track_id: VIDEO_TRACK_ID,
            duration: video_movie,
            volume: 0,
            width: format.width,
            height: format.height,
            matrix: format.matrix,
        });
        let video_minf = boxes::write_container_box(
            b"minf",
            &[
                &boxes::write_vmhd(),
                &boxes::write_dinf(),
                &self.video.stbl(&format.sample_description),
            ],
        );
        let video_mdia = boxes::write_container_box(
            b"mdia",
            &[
                &boxes::write_mdhd(format.timescale, video_media, format.language),
                &boxes::write_hdlr(b"vide", b"Core Media Video"),
                &video_minf,
            ],
        );
        let video_trak = if edits.is_empty() {
            boxes::write_container_box(b"trak", &[&video_tkhd, &video_mdia])
        } else {
            let edts = boxes::write_edts(&edits);
            boxes::write_container_box(b"trak", &[&video_tkhd, &edts, &video_mdia])
        };

        let mut movie_duration = video_movie;
        let mut children: Vec<Vec<u8>> = vec![video_trak];
        let mut next_track_id = VIDEO_TRACK_ID + 1;

        if !self.metadata.sizes.is_empty() {
            next_track_id = METADATA_TRACK_ID + 1;
            let timescale = self.metadata_timescale.unwrap_or(FALLBACK_TIMESCALE);
            let media = self.metadata.media_duration();
            let movie = MediaTime::new(media as i64, timescale)
                .rescale(movie_timescale)
                .max(0) as u64;
            movie_duration = movie_duration.max(movie);

            let tkhd = boxes::write_tkhd(&TrackHeader {
                track_id: METADATA_TRACK_ID,
                duration: movie,
                volume: 0,
                width: 0,
                height: 0,
                matrix: IDENTITY_MATRIX,
            });
            let tref = boxes::write_tref(b"cdsc", &[VIDEO_TRACK_ID]);
            let minf = boxes::write_container_box(
                b"minf",
                &[
                    &boxes::write_nmhd(),
                    &boxes::write_dinf(),
                    &self.metadata.stbl(&write_mebx_stsd(&self.timed_keys)),
                ],
            );
            let mdia = boxes::write_container_box(
                b"mdia",
                &[
                    &boxes::write_mdhd(timescale, media, LANGUAGE_UNDETERMINED),
                    &boxes::write_hdlr(b"meta", b"Core Media Metadata"),
                    &minf,
                ],
            );
            children.push(boxes::write_container_box(b"trak", &[&tkhd, &tref, &mdia]));
        }

        if !self.asset_items.is_empty() {
            children.push(write_movie_meta(&self.asset_items));
        }

        let mvhd = boxes::write_mvhd(movie_timescale, movie_duration, next_track_id);
        let mut refs: Vec<&[u8]> = vec![mvhd.as_slice()];
        refs.extend(children.iter().map(Vec::as_slice));
        boxes::write_container_box(b"moov", &refs)
    }

    /// Source edits with segment durations moved into `movie_timescale`.
    /// Media times stay in the video media timescale, which is unchanged.
    fn rescaled_edits(&self, movie_timescale: u32) -> Vec<EditListEntry> {
        let format = &self.video_format;
        format
            .edit_list
            .iter()
            .map(|edit| {
                let duration = MediaTime::new(edit.segment_duration as i64, format.edit_timescale)
                    .rescale(movie_timescale)
                    .max(0) as u64;
                EditListEntry {
                    segment_duration: duration,
                    ..*edit
                }
            })
            .collect()
    }
}
