//! Liveforge-Common: shared types, identifiers, configuration and errors.
//!
//! - **Identifiers**: [`ContentIdentifier`], the value that pairs an image with a movie
//! - **Core Types**: [`FileAsset`], [`LiveAsset`], [`MediaTime`], [`TimeRange`], [`DisplaySize`]
//! - **Path Utilities**: uniform type lookup and container validation
//! - **Configuration**: [`LiveConfig`] and its sections
//! - **Error Handling**: the unified [`Error`] and [`Result`] alias
//!
//! # Examples
//!
//! ```
//! use liveforge_common::{ContentIdentifier, LiveAsset};
//! use liveforge_common::paths::{validate_as, ContainerType};
//! use std::path::Path;
//!
//! let asset = LiveAsset::new(Path::new("/tmp/live"), "live.jpg", "live.mov");
//! assert_eq!(asset.image_file().identifier(), asset.movie_file().identifier());
//!
//! assert!(validate_as(Path::new("clip.mov"), ContainerType::Movie).is_ok());
//! let _id = ContentIdentifier::new();
//! ```

pub mod config;
pub mod error;
pub mod ids;
pub mod paths;
pub mod types;

pub use config::{LiveConfig, MuxerConfig, StorageConfig};
pub use error::{Error, Result};
pub use ids::ContentIdentifier;
pub use types::*;
