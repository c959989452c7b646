//! Shared fixtures for integration tests.
//!
//! Real JPEGs come from the `image` encoder. Movies are assembled from the
//! public box writers so their layout is known exactly. Recording
//! implementations of the collaborator traits capture what the orchestrator
//! hands them.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use image::{Rgb, RgbImage};
use liveforge::{
    AssemblyRequest, ContentIdentifier, Error, LiveAssembler, LiveConfig, PhotoLibrary, Result,
};
use liveforge_media::mov::boxes::{self, TrackHeader};
use liveforge_media::mp4::{EditListEntry, IDENTITY_MATRIX};

/// Install a `RUST_LOG`-driven subscriber once per test binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Config whose storage lives under `dir`.
pub fn config_in(dir: &Path) -> LiveConfig {
    let mut config = LiveConfig::default();
    config.storage.base_dir = Some(dir.to_path_buf());
    config.muxer.channel_capacity = 2;
    config
}

// ===== Images =====

pub fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 7 % 256) as u8, (y * 11 % 256) as u8, ((x + y) % 256) as u8])
    })
}

/// Encode a JPEG at `path`.
pub fn write_jpeg(path: &Path, width: u32, height: u32) -> PathBuf {
    gradient(width, height).save(path).unwrap();
    path.to_path_buf()
}

pub fn write_png(path: &Path, width: u32, height: u32) -> PathBuf {
    gradient(width, height).save(path).unwrap();
    path.to_path_buf()
}

// ===== Movies =====

/// 90 degree rotation, as phones record portrait video.
pub const ROTATE_90: [u32; 9] = [0, 0x0001_0000, 0, 0xFFFF_0000, 0, 0, 0, 0, 0x4000_0000];

/// One track of a fixture movie. Samples are stored as a single chunk.
#[derive(Debug, Clone)]
pub struct FixtureTrack {
    pub track_id: u32,
    pub handler: [u8; 4],
    pub timescale: u32,
    pub width: u32,
    pub height: u32,
    pub matrix: [u32; 9],
    pub sample_entry: Vec<u8>,
    pub samples: Vec<Vec<u8>>,
    pub sample_duration: u32,
    pub composition_offsets: Vec<i32>,
    /// 1-based sync sample numbers; empty means every sample is sync.
    pub sync_samples: Vec<u32>,
    /// Written as `edts/elst` when non-empty; durations in the 600 movie timescale.
    pub edit_list: Vec<EditListEntry>,
}

impl FixtureTrack {
    /// `frames` H.264 frames at 30 fps (timescale 600), sync every 10th,
    /// alternating composition offsets.
    pub fn video(track_id: u32, frames: usize) -> Self {
        // avcC content is opaque to the muxer
        let avcc = boxes::write_box(b"avcC", &[1, 0x64, 0, 0x1F, 0xFF, 0xE1, 0, 0]);
        Self {
            track_id,
            handler: *b"vide",
            timescale: 600,
            width: 64,
            height: 48,
            matrix: ROTATE_90,
            sample_entry: boxes::write_visual_sample_entry(b"avc1", 64, 48, &avcc),
            samples: (0..frames)
                .map(|i| vec![(i % 251) as u8; 100 + (i * 13) % 50])
                .collect(),
            sample_duration: 20,
            composition_offsets: (0..frames).map(|i| if i % 2 == 0 { 20 } else { 0 }).collect(),
            sync_samples: (0..frames).step_by(10).map(|i| i as u32 + 1).collect(),
            edit_list: Vec::new(),
        }
    }

    /// Start presentation at the first frame's composition time, the way
    /// B-frame recordings do.
    pub fn with_leading_edit(mut self) -> Self {
        let media_time = self.composition_offsets.first().copied().unwrap_or(0) as i64;
        self.edit_list = vec![EditListEntry {
            segment_duration: self.duration() * 600 / self.timescale as u64,
            media_time,
            media_rate: 0x0001_0000,
        }];
        self
    }

    /// AAC-like audio, 1024-sample frames at 44.1 kHz.
    pub fn audio(track_id: u32, frames: usize) -> Self {
        Self {
            track_id,
            handler: *b"soun",
            timescale: 44_100,
            width: 0,
            height: 0,
            matrix: IDENTITY_MATRIX,
            sample_entry: boxes::write_audio_sample_entry(44_100, 2, &[0, 0, 0, 0]),
            samples: (0..frames).map(|i| vec![0xA0 | (i % 16) as u8; 32]).collect(),
            sample_duration: 1024,
            composition_offsets: Vec::new(),
            sync_samples: Vec::new(),
            edit_list: Vec::new(),
        }
    }

    fn duration(&self) -> u64 {
        self.samples.len() as u64 * self.sample_duration as u64
    }

    fn trak(&self, chunk_offset: u64) -> Vec<u8> {
        let sizes: Vec<u32> = self.samples.iter().map(|s| s.len() as u32).collect();
        let mut stbl_children = vec![
            boxes::write_stsd(&[&self.sample_entry]),
            boxes::write_stts(&[(self.samples.len() as u32, self.sample_duration)]),
        ];
        if !self.composition_offsets.is_empty() {
            let runs: Vec<(u32, i32)> =
                self.composition_offsets.iter().map(|&o| (1, o)).collect();
            stbl_children.push(boxes::write_ctts(&runs));
        }
        if !self.sync_samples.is_empty() {
            stbl_children.push(boxes::write_stss(&self.sync_samples));
        }
        stbl_children.push(boxes::write_stsz(&sizes));
        stbl_children.push(boxes::write_stsc(&[(1, self.samples.len() as u32, 1)]));
        stbl_children.push(boxes::write_chunk_offsets(&[chunk_offset]));
        let stbl_refs: Vec<&[u8]> = stbl_children.iter().map(Vec::as_slice).collect();
        let stbl = boxes::write_container_box(b"stbl", &stbl_refs);

        let media_header = if &self.handler == b"vide" {
            boxes::write_vmhd()
        } else {
            boxes::write_smhd()
        };
        let minf =
            boxes::write_container_box(b"minf", &[&media_header, &boxes::write_dinf(), &stbl]);
        let mdia = boxes::write_container_box(
            b"mdia",
            &[
                &boxes::write_mdhd(self.timescale, self.duration(), boxes::LANGUAGE_UNDETERMINED),
                &boxes::write_hdlr(&self.handler, b"fixture"),
                &minf,
            ],
        );
        let tkhd = boxes::write_tkhd(&TrackHeader {
            track_id: self.track_id,
            duration: self.duration(),
            volume: if &self.handler == b"soun" { 0x0100 } else { 0 },
            width: self.width << 16,
            height: self.height << 16,
            matrix: self.matrix,
        });
        if self.edit_list.is_empty() {
            boxes::write_container_box(b"trak", &[&tkhd, &mdia])
        } else {
            let edts = boxes::write_edts(&self.edit_list);
            boxes::write_container_box(b"trak", &[&tkhd, &edts, &mdia])
        }
    }
}

/// Write an ISO-style movie: `ftyp`, `mdat` with each track's samples in
/// one chunk, then `moov`.
pub fn write_movie(path: &Path, tracks: &[FixtureTrack]) -> PathBuf {
    let ftyp = boxes::write_box(b"ftyp", b"isom\0\0\x02\0isomiso2avc1mp41");

    let mut payload = Vec::new();
    let mut chunk_offsets = Vec::new();
    let mdat_payload_start = (ftyp.len() + 8) as u64;
    for track in tracks {
        chunk_offsets.push(mdat_payload_start + payload.len() as u64);
        for sample in &track.samples {
            payload.extend_from_slice(sample);
        }
    }
    let mdat = boxes::write_box(b"mdat", &payload);

    let next_track_id = tracks.iter().map(|t| t.track_id).max().unwrap_or(0) + 1;
    let movie_duration = tracks
        .iter()
        .map(|t| t.duration() * 600 / t.timescale as u64)
        .max()
        .unwrap_or(0);
    let mut moov_children = vec![boxes::write_mvhd(600, movie_duration, next_track_id)];
    for (track, offset) in tracks.iter().zip(&chunk_offsets) {
        moov_children.push(track.trak(*offset));
    }
    let moov_refs: Vec<&[u8]> = moov_children.iter().map(Vec::as_slice).collect();
    let moov = boxes::write_container_box(b"moov", &moov_refs);

    let mut file = ftyp;
    file.extend_from_slice(&mdat);
    file.extend_from_slice(&moov);
    fs::write(path, file).unwrap();
    path.to_path_buf()
}

/// Video plus audio, the common phone recording shape.
pub fn write_clip(path: &Path, frames: usize) -> PathBuf {
    write_movie(
        path,
        &[FixtureTrack::video(1, frames), FixtureTrack::audio(2, frames)],
    )
}

// ===== Collaborators =====

/// What [`RecordingAssembler`] returns.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledPhoto {
    pub identifier: ContentIdentifier,
    pub image_path: PathBuf,
    pub movie_path: PathBuf,
    pub has_placeholder: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RecordingAssembler {
    pub requests: Arc<Mutex<Vec<AssemblyRequest>>>,
    pub decline: bool,
}

impl RecordingAssembler {
    pub fn declining() -> Self {
        Self {
            decline: true,
            ..Self::default()
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl LiveAssembler for RecordingAssembler {
    type LivePhoto = AssembledPhoto;

    async fn assemble(&self, request: AssemblyRequest) -> Result<Option<AssembledPhoto>> {
        let photo = AssembledPhoto {
            identifier: request.identifier,
            image_path: request.image_path.clone(),
            movie_path: request.movie_path.clone(),
            has_placeholder: request.placeholder.is_some(),
        };
        self.requests.lock().unwrap().push(request);
        Ok((!self.decline).then_some(photo))
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecordingLibrary {
    pub saved: Arc<Mutex<Vec<(PathBuf, PathBuf)>>>,
    pub fail: bool,
}

impl RecordingLibrary {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl PhotoLibrary for RecordingLibrary {
    async fn add_live_photo(&self, photo: &Path, paired_video: &Path) -> Result<()> {
        if self.fail {
            return Err(Error::Library("library is read-only".into()));
        }
        self.saved
            .lock()
            .unwrap()
            .push((photo.to_path_buf(), paired_video.to_path_buf()));
        Ok(())
    }
}
