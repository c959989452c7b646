//! Liveforge - Live photo synthesis
//!
//! Pairs a JPEG and a QuickTime movie under one freshly generated content
//! identifier so a photo platform recognizes them as a single live photo.
//!
//! - [`LiveResource`] runs requests: validate, write tagged copies, assemble
//! - [`TemporaryStorage`] owns the scratch directory holding the outputs
//! - [`LiveAssembler`] and [`PhotoLibrary`] are supplied by the caller
//!
//! The byte-level work lives in `liveforge-media`; shared types, config and
//! errors in `liveforge-common`.

pub mod convertible;
pub mod resource;
pub mod services;
pub mod storage;

pub use convertible::{ImageConvertible, PathConvertible, ValidatedPath};
pub use liveforge_common::{
    ContentIdentifier, DisplaySize, Error, FileAsset, LiveAsset, LiveConfig, Result,
};
pub use resource::LiveResource;
pub use services::{AssemblyRequest, LiveAssembler, PhotoLibrary};
pub use storage::TemporaryStorage;
