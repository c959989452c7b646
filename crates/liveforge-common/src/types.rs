//! Core value types shared across liveforge.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::ids::ContentIdentifier;

/// Target display size handed to the assembly service.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplaySize {
    pub width: f64,
    pub height: f64,
}

impl DisplaySize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// A zero size lets the assembler pick the natural size of the media.
    pub fn zero() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// A rational media time: `value / timescale` seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaTime {
    pub value: i64,
    pub timescale: u32,
}

impl MediaTime {
    pub const fn new(value: i64, timescale: u32) -> Self {
        Self { value, timescale }
    }

    pub fn seconds(&self) -> f64 {
        if self.timescale == 0 {
            return 0.0;
        }
        self.value as f64 / self.timescale as f64
    }

    /// Express this time in another timescale, rounding to the nearest tick.
    pub fn rescale(&self, timescale: u32) -> i64 {
        if self.timescale == 0 {
            return 0;
        }
        if self.timescale == timescale {
            return self.value;
        }
        let num = self.value as i128 * timescale as i128;
        let den = self.timescale as i128;
        let half = den / 2;
        let rounded = if num >= 0 { (num + half) / den } else { (num - half) / den };
        rounded as i64
    }
}

/// A half-open time range `[start, start + duration)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: MediaTime,
    pub duration: MediaTime,
}

impl TimeRange {
    pub const fn new(start: MediaTime, duration: MediaTime) -> Self {
        Self { start, duration }
    }

    pub fn end_seconds(&self) -> f64 {
        self.start.seconds() + self.duration.seconds()
    }
}

/// One physical output file tagged with the shared identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAsset {
    identifier: ContentIdentifier,
    path: PathBuf,
}

impl FileAsset {
    pub fn new(identifier: ContentIdentifier, path: impl Into<PathBuf>) -> Self {
        Self {
            identifier,
            path: path.into(),
        }
    }

    pub fn identifier(&self) -> ContentIdentifier {
        self.identifier
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// The still image and movie produced by one request.
///
/// Only [`LiveAsset::new`] builds the pair, so both files always share one
/// identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveAsset {
    identifier: ContentIdentifier,
    image_file: FileAsset,
    movie_file: FileAsset,
}

impl LiveAsset {
    /// Allocate a fresh identifier and place both files inside `directory`.
    pub fn new(directory: &Path, image_file_name: &str, movie_file_name: &str) -> Self {
        let identifier = ContentIdentifier::new();
        Self {
            identifier,
            image_file: FileAsset::new(identifier, directory.join(image_file_name)),
            movie_file: FileAsset::new(identifier, directory.join(movie_file_name)),
        }
    }

    pub fn identifier(&self) -> ContentIdentifier {
        self.identifier
    }

    pub fn image_file(&self) -> &FileAsset {
        &self.image_file
    }

    pub fn movie_file(&self) -> &FileAsset {
        &self.movie_file
    }

    /// Both output paths, image first.
    pub fn file_paths(&self) -> Vec<PathBuf> {
        vec![
            self.image_file.path().to_path_buf(),
            self.movie_file.path().to_path_buf(),
        ]
    }
}
