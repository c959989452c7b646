//! Sample-by-sample reading of a movie's first video track.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use liveforge_common::{Error, MediaTime, Result, TimeRange};

use super::metadata::{decode_sample, CONTENT_IDENTIFIER_KEY, STILL_IMAGE_TIME_KEY};
use crate::mp4::{self, EditListEntry, ResolvedSample, TimedMetadataKey, TrackInfo};

/// One compressed video sample, carried unchanged from reader to writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleBuffer {
    pub data: Bytes,
    /// Duration in the track's media timescale.
    pub duration: u32,
    pub composition_offset: i32,
    pub is_sync: bool,
    pub decode_timestamp: u64,
    /// 1-based `stsd` entry the sample is coded against.
    pub description_index: u32,
}

/// What the writer needs to reproduce the source video track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoTrackFormat {
    pub timescale: u32,
    pub language: u16,
    /// 16.16 fixed point.
    pub width: u32,
    /// 16.16 fixed point.
    pub height: u32,
    pub matrix: [u32; 9],
    /// Complete source `stsd` atom, copied verbatim.
    pub sample_description: Vec<u8>,
    /// Source edit list; segment durations are in `edit_timescale`.
    pub edit_list: Vec<EditListEntry>,
    pub edit_timescale: u32,
}

impl VideoTrackFormat {
    fn from_track(track: &TrackInfo, movie_timescale: u32) -> Self {
        Self {
            timescale: track.timescale,
            language: track.language,
            width: track.width,
            height: track.height,
            matrix: track.matrix,
            sample_description: track.sample_description.clone(),
            edit_list: track.edit_list.clone(),
            edit_timescale: movie_timescale,
        }
    }
}

/// Reads the samples of the first video track in decode order.
pub struct MovieReader {
    file: BufReader<File>,
    path: PathBuf,
    format: VideoTrackFormat,
    samples: Vec<ResolvedSample>,
    next: usize,
}

impl std::fmt::Debug for MovieReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MovieReader")
            .field("path", &self.path)
            .field("samples", &self.samples.len())
            .field("next", &self.next)
            .finish()
    }
}

impl MovieReader {
    /// Open `path` and select its first video track.
    ///
    /// An unreadable path is [`Error::InvalidFilePath`]; an unparsable movie
    /// or one without a video track is [`Error::InvalidFile`].
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|_| Error::invalid_file_path(path))?;
        let mut file = BufReader::new(file);

        let movie = mp4::parse_movie(&mut file).map_err(|e| {
            tracing::debug!("failed to parse movie {}: {e}", path.display());
            Error::invalid_file(path)
        })?;
        let Some(video) = movie.video_track() else {
            tracing::debug!("movie {} has no video track", path.display());
            return Err(Error::invalid_file(path));
        };

        Ok(Self {
            format: VideoTrackFormat::from_track(video, movie.timescale),
            samples: video.sample_table.samples.clone(),
            file,
            path: path.to_path_buf(),
            next: 0,
        })
    }

    pub fn format(&self) -> &VideoTrackFormat {
        &self.format
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Copy the next sample out of the file, `None` once all are read.
    pub fn next_sample(&mut self) -> io::Result<Option<SampleBuffer>> {
        let Some(sample) = self.samples.get(self.next) else {
            return Ok(None);
        };
        self.file.seek(SeekFrom::Start(sample.file_offset))?;
        let mut data = vec![0u8; sample.size as usize];
        self.file.read_exact(&mut data)?;
        let buffer = SampleBuffer {
            data: Bytes::from(data),
            duration: sample.duration,
            composition_offset: sample.composition_offset,
            is_sync: sample.is_sync,
            decode_timestamp: sample.decode_timestamp,
            description_index: sample.description_index,
        };
        self.next += 1;
        Ok(Some(buffer))
    }
}

/// One sample of a timed metadata track, decoded against its declared keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedMetadataSample {
    pub range: TimeRange,
    /// `(key, raw value)` pairs.
    pub values: Vec<(String, Vec<u8>)>,
}

/// A timed metadata track as found in a movie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataTrackInfo {
    pub track_id: u32,
    pub timescale: u32,
    pub keys: Vec<TimedMetadataKey>,
    /// Track ids this track describes (`tref/cdsc`).
    pub describes: Vec<u32>,
    pub samples: Vec<TimedMetadataSample>,
}

impl MetadataTrackInfo {
    /// The still-image-time marker, if this track carries one.
    pub fn still_image_time(&self) -> Option<(TimeRange, i8)> {
        self.samples.iter().find_map(|sample| {
            sample
                .values
                .iter()
                .find(|(key, value)| key == STILL_IMAGE_TIME_KEY && value.len() == 1)
                .map(|(_, value)| (sample.range, value[0] as i8))
        })
    }
}

/// Live-photo relevant facts about a movie.
#[derive(Debug, Clone)]
pub struct LiveMovieMetadata {
    /// Asset-level content identifier, if present.
    pub content_identifier: Option<String>,
    pub metadata_tracks: Vec<MetadataTrackInfo>,
    pub video_timescale: u32,
    pub video_samples: Vec<ResolvedSample>,
}

/// Inspect a movie for live-photo metadata.
pub fn read_live_metadata(path: &Path) -> Result<LiveMovieMetadata> {
    let file = File::open(path).map_err(|_| Error::invalid_file_path(path))?;
    let mut file = BufReader::new(file);
    let movie = mp4::parse_movie(&mut file).map_err(|_| Error::invalid_file(path))?;

    let mut metadata_tracks = Vec::new();
    for track in movie.metadata_tracks() {
        let keys = track
            .metadata_keys()
            .map_err(|_| Error::invalid_file_metadata(path))?;
        let mut samples = Vec::new();
        for sample in &track.sample_table.samples {
            file.seek(SeekFrom::Start(sample.file_offset))?;
            let mut payload = vec![0u8; sample.size as usize];
            file.read_exact(&mut payload)?;
            let records =
                decode_sample(&payload).map_err(|_| Error::invalid_file_metadata(path))?;
            let values = records
                .into_iter()
                .filter_map(|(local_id, value)| {
                    keys.iter()
                        .find(|k| k.local_id == local_id)
                        .map(|k| (k.key.clone(), value))
                })
                .collect();
            samples.push(TimedMetadataSample {
                range: TimeRange::new(
                    MediaTime::new(sample.decode_timestamp as i64, track.timescale),
                    MediaTime::new(sample.duration as i64, track.timescale),
                ),
                values,
            });
        }
        metadata_tracks.push(MetadataTrackInfo {
            track_id: track.track_id,
            timescale: track.timescale,
            keys,
            describes: track.referenced_tracks(b"cdsc").to_vec(),
            samples,
        });
    }

    let (video_timescale, video_samples) = movie
        .video_track()
        .map(|v| (v.timescale, v.sample_table.samples.clone()))
        .unwrap_or((0, Vec::new()));

    Ok(LiveMovieMetadata {
        content_identifier: movie
            .metadata_string(CONTENT_IDENTIFIER_KEY)
            .map(str::to_string),
        metadata_tracks,
        video_timescale,
        video_samples,
    })
}
