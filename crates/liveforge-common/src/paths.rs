//! Uniform type identification and container validation.
//!
//! A path's extension maps to a [`UniformType`]; types form a conformance
//! hierarchy (`public.jpeg` conforms to `public.image`, which conforms to
//! `public.data`). [`validate_as`] checks a path against the type a
//! [`ContainerType`] expects.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Extension table. Lookups are case-insensitive.
const EXTENSION_TYPES: &[(&str, UniformType)] = &[
    ("jpg", UniformType::Jpeg),
    ("jpeg", UniformType::Jpeg),
    ("jpe", UniformType::Jpeg),
    ("jfif", UniformType::Jpeg),
    ("png", UniformType::Png),
    ("heic", UniformType::Heic),
    ("gif", UniformType::Gif),
    ("mov", UniformType::QuickTimeMovie),
    ("qt", UniformType::QuickTimeMovie),
    ("mp4", UniformType::Mpeg4Movie),
    ("m4v", UniformType::AppleM4v),
];

/// Uniform type identifiers known to liveforge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UniformType {
    Data,
    Image,
    Jpeg,
    Png,
    Heic,
    Gif,
    AudiovisualContent,
    Movie,
    QuickTimeMovie,
    Mpeg4Movie,
    AppleM4v,
}

impl UniformType {
    /// The reverse-DNS identifier string.
    pub fn identifier(&self) -> &'static str {
        match self {
            UniformType::Data => "public.data",
            UniformType::Image => "public.image",
            UniformType::Jpeg => "public.jpeg",
            UniformType::Png => "public.png",
            UniformType::Heic => "public.heic",
            UniformType::Gif => "com.compuserve.gif",
            UniformType::AudiovisualContent => "public.audiovisual-content",
            UniformType::Movie => "public.movie",
            UniformType::QuickTimeMovie => "com.apple.quicktime-movie",
            UniformType::Mpeg4Movie => "public.mpeg-4",
            UniformType::AppleM4v => "com.apple.m4v-video",
        }
    }

    /// The immediate supertype, `None` for the root.
    pub fn parent(&self) -> Option<UniformType> {
        match self {
            UniformType::Data => None,
            UniformType::Image | UniformType::AudiovisualContent => Some(UniformType::Data),
            UniformType::Jpeg | UniformType::Png | UniformType::Heic | UniformType::Gif => {
                Some(UniformType::Image)
            }
            UniformType::Movie => Some(UniformType::AudiovisualContent),
            UniformType::QuickTimeMovie | UniformType::Mpeg4Movie | UniformType::AppleM4v => {
                Some(UniformType::Movie)
            }
        }
    }

    /// Whether `self` is `other` or one of its subtypes.
    pub fn conforms_to(&self, other: UniformType) -> bool {
        let mut current = Some(*self);
        while let Some(ty) = current {
            if ty == other {
                return true;
            }
            current = ty.parent();
        }
        false
    }

    /// Look up the type for a bare extension (no leading dot).
    pub fn from_extension(ext: &str) -> Option<UniformType> {
        let ext = ext.to_lowercase();
        EXTENSION_TYPES
            .iter()
            .find(|(e, _)| *e == ext)
            .map(|(_, ty)| *ty)
    }

    /// Look up the type for a path by its extension.
    pub fn from_path(path: &Path) -> Option<UniformType> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(UniformType::from_extension)
    }
}

/// The two containers a live photo is made of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContainerType {
    StillImage,
    Movie,
}

impl ContainerType {
    pub fn expected_type(&self) -> UniformType {
        match self {
            ContainerType::StillImage => UniformType::Jpeg,
            ContainerType::Movie => UniformType::QuickTimeMovie,
        }
    }
}

/// Check that `path` conforms to the type `container` expects.
///
/// Returns the path unchanged on success.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use liveforge_common::paths::{validate_as, ContainerType};
///
/// assert!(validate_as(Path::new("photo.jpg"), ContainerType::StillImage).is_ok());
/// assert!(validate_as(Path::new("photo.png"), ContainerType::StillImage).is_err());
/// ```
pub fn validate_as(path: &Path, container: ContainerType) -> Result<PathBuf> {
    let expected = container.expected_type();
    match UniformType::from_path(path) {
        Some(ty) if ty.conforms_to(expected) => Ok(path.to_path_buf()),
        _ => Err(Error::invalid_file_type(path, expected.identifier())),
    }
}

/// Check if a path looks like a still image of any known type.
pub fn is_image_file(path: &Path) -> bool {
    UniformType::from_path(path)
        .map(|ty| ty.conforms_to(UniformType::Image))
        .unwrap_or(false)
}

/// Check if a path looks like a movie of any known type.
pub fn is_movie_file(path: &Path) -> bool {
    UniformType::from_path(path)
        .map(|ty| ty.conforms_to(UniformType::Movie))
        .unwrap_or(false)
}
