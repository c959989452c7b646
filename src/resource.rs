//! Live photo requests.
//!
//! [`LiveResource`] turns a still image and a movie into a live photo: it
//! validates both inputs, writes tagged copies into [`TemporaryStorage`],
//! hands them to a [`LiveAssembler`] and can later save the pair to a
//! [`PhotoLibrary`].
//!
//! Requests take `&mut self`, so one resource runs one request at a time.
//! Share it across tasks behind a `tokio::sync::Mutex`.

use std::path::PathBuf;

use image::DynamicImage;
use liveforge_common::paths::ContainerType;
use liveforge_common::{DisplaySize, Error, LiveAsset, LiveConfig, MuxerConfig, Result};
use liveforge_media::{jpeg, mov};

use crate::convertible::{ImageConvertible, PathConvertible, ValidatedPath};
use crate::services::{AssemblyRequest, LiveAssembler, PhotoLibrary};
use crate::storage::TemporaryStorage;

/// Orchestrates live photo creation for one storage directory.
pub struct LiveResource<A, L> {
    assembler: A,
    library: L,
    storage: TemporaryStorage,
    muxer: MuxerConfig,
    /// Set once both files of the last request exist.
    asset: Option<LiveAsset>,
}

impl<A, L> std::fmt::Debug for LiveResource<A, L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveResource")
            .field("storage", &self.storage)
            .field("muxer", &self.muxer)
            .field("asset", &self.asset)
            .finish_non_exhaustive()
    }
}

impl<A: LiveAssembler, L: PhotoLibrary> LiveResource<A, L> {
    pub fn new(assembler: A, library: L, config: &LiveConfig) -> Self {
        for warning in config.validate() {
            tracing::warn!("{warning}");
        }
        Self {
            assembler,
            library,
            storage: TemporaryStorage::new(&config.storage),
            muxer: config.muxer.clone(),
            asset: None,
        }
    }

    pub fn storage(&self) -> &TemporaryStorage {
        &self.storage
    }

    /// The pair written by the last successful file generation, if any.
    pub fn current_asset(&self) -> Option<&LiveAsset> {
        self.asset.as_ref()
    }

    /// Build a live photo from `image` (JPEG) and `movie` (QuickTime).
    ///
    /// Previous outputs are flushed first. Invalid inputs fail before any
    /// file is written. If the assembler declines the pair the error lists
    /// both generated files, which stay in storage until the next flush.
    pub async fn request_with<I, M>(
        &mut self,
        image: I,
        movie: M,
        target_size: DisplaySize,
    ) -> Result<A::LivePhoto>
    where
        I: PathConvertible,
        M: PathConvertible,
    {
        self.flush()?;
        let image = image.validated_as(ContainerType::StillImage)?;
        let movie = movie.validated_as(ContainerType::Movie)?;
        self.request(image, movie, target_size, None).await
    }

    /// Like [`request_with`](Self::request_with), also passing a placeholder
    /// image to the assembler.
    pub async fn request_with_placeholder<I, M, P>(
        &mut self,
        image: I,
        movie: M,
        placeholder: P,
        target_size: DisplaySize,
    ) -> Result<A::LivePhoto>
    where
        I: PathConvertible,
        M: PathConvertible,
        P: ImageConvertible,
    {
        self.flush()?;
        let image = image.validated_as(ContainerType::StillImage)?;
        let movie = movie.validated_as(ContainerType::Movie)?;
        let placeholder = placeholder.to_image()?;
        self.request(image, movie, target_size, Some(placeholder)).await
    }

    async fn request(
        &mut self,
        image: PathBuf,
        movie: PathBuf,
        target_size: DisplaySize,
        placeholder: Option<DynamicImage>,
    ) -> Result<A::LivePhoto> {
        let asset = self.storage.allocate()?;
        tracing::info!(
            "Live photo request {}: {} + {}",
            asset.identifier(),
            image.display(),
            movie.display()
        );

        let files = asset.clone();
        let muxer = self.muxer.clone();
        tokio::task::spawn_blocking(move || {
            jpeg::write_with_identifier(&image, files.image_file())?;
            mov::write_with_identifier(&movie, files.movie_file(), &muxer)
        })
        .await
        .map_err(|e| Error::Internal(format!("media task failed: {e}")))??;

        let request = AssemblyRequest {
            image_path: asset.image_file().path().to_path_buf(),
            movie_path: asset.movie_file().path().to_path_buf(),
            identifier: asset.identifier(),
            target_size,
            placeholder,
        };
        self.asset = Some(asset);

        let file_paths = request.file_paths();
        match self.assembler.assemble(request).await? {
            Some(photo) => {
                tracing::info!("Live photo assembled from {} files", file_paths.len());
                Ok(photo)
            }
            None => {
                tracing::warn!("Assembler declined the generated pair");
                Err(Error::LiveRequestProblem { file_paths })
            }
        }
    }

    /// Delete all generated files and forget the held pair.
    ///
    /// The pair is forgotten even when deleting fails.
    pub fn flush(&mut self) -> Result<()> {
        self.asset = None;
        self.storage.flush()
    }

    /// Save the held pair to the photo library.
    pub async fn save(&self) -> Result<()> {
        let Some(asset) = &self.asset else {
            return Err(Error::NothingToSave);
        };
        self.library
            .add_live_photo(asset.image_file().path(), asset.movie_file().path())
            .await?;
        tracing::info!("Saved live photo {}", asset.identifier());
        Ok(())
    }
}
