//! Collaborators outside this crate.
//!
//! The platform that turns a tagged JPEG/MOV pair into a displayable live
//! photo, and the photo library that persists it, are supplied by the caller.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use image::DynamicImage;
use liveforge_common::{ContentIdentifier, DisplaySize, Result};

/// Everything the assembler gets for one live photo.
#[derive(Debug, Clone)]
pub struct AssemblyRequest {
    pub image_path: PathBuf,
    pub movie_path: PathBuf,
    /// Shared by both files.
    pub identifier: ContentIdentifier,
    pub target_size: DisplaySize,
    /// Shown while the live photo loads.
    pub placeholder: Option<DynamicImage>,
}

impl AssemblyRequest {
    pub fn file_paths(&self) -> Vec<PathBuf> {
        vec![self.image_path.clone(), self.movie_path.clone()]
    }
}

/// Builds a displayable live photo from a tagged image and movie.
///
/// Returning `Ok(None)` means the platform declined the pair.
#[async_trait]
pub trait LiveAssembler: Send + Sync {
    /// The platform's live photo value.
    type LivePhoto: Send;

    async fn assemble(&self, request: AssemblyRequest) -> Result<Option<Self::LivePhoto>>;
}

/// Persists a live photo pair into the user's library.
#[async_trait]
pub trait PhotoLibrary: Send + Sync {
    /// Add `photo` with `paired_video` as its paired video resource.
    ///
    /// Failures should be reported as [`Error::Library`](liveforge_common::Error::Library).
    async fn add_live_photo(&self, photo: &Path, paired_video: &Path) -> Result<()>;
}
