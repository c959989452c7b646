//! Unified error type for liveforge.
//!
//! Every component funnels its failures into [`Error`]. Messages carry a
//! `[liveforge]` prefix so they are recognizable when surfaced through a host
//! application's own logging.

use std::path::{Path, PathBuf};

/// Unified error type covering all failure modes in liveforge.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A path could not be resolved, read from, or written to.
    #[error("[liveforge] invalid file path: {}", .path.display())]
    InvalidFilePath {
        /// The offending path.
        path: PathBuf,
    },

    /// A path does not conform to the expected container type.
    #[error("[liveforge] invalid file type: {} (expected {expected_type})", .path.display())]
    InvalidFileType {
        /// The offending path.
        path: PathBuf,
        /// Uniform type identifier the path was expected to conform to.
        expected_type: String,
    },

    /// The file is structurally unusable (e.g. a movie without a video track).
    #[error("[liveforge] invalid file: {}", .path.display())]
    InvalidFile {
        /// The offending path.
        path: PathBuf,
    },

    /// The file's embedded metadata could not be parsed or written.
    #[error("[liveforge] invalid file metadata: {}", .path.display())]
    InvalidFileMetadata {
        /// The offending path.
        path: PathBuf,
    },

    /// An image-like input could not be turned into a decoded image.
    #[error("[liveforge] invalid image source: {0}")]
    InvalidImageSource(String),

    /// Both files were written but the assembly service produced nothing.
    #[error("[liveforge] live request problem occurred: {}", join_paths(.file_paths))]
    LiveRequestProblem {
        /// The files that were handed to the assembly service.
        file_paths: Vec<PathBuf>,
    },

    /// `save` was called without a held live asset.
    #[error("[liveforge] nothing to save")]
    NothingToSave,

    /// The movie writer reported a failure while appending or finalizing.
    #[error("[liveforge] writer error: {source}")]
    Writer {
        /// The underlying writer error, passed through unchanged.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The photo library rejected the live photo.
    #[error("[liveforge] photo library error: {0}")]
    Library(String),

    /// Configuration could not be parsed.
    #[error("[liveforge] config error: {0}")]
    Config(String),

    /// An I/O operation failed.
    #[error("[liveforge] IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// A worker thread or blocking task ended without reporting a result.
    #[error("[liveforge] internal error: {0}")]
    Internal(String),
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl Error {
    /// Convenience constructor for [`Error::InvalidFilePath`].
    pub fn invalid_file_path(path: impl AsRef<Path>) -> Self {
        Error::InvalidFilePath {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Convenience constructor for [`Error::InvalidFileType`].
    pub fn invalid_file_type(path: impl AsRef<Path>, expected_type: impl Into<String>) -> Self {
        Error::InvalidFileType {
            path: path.as_ref().to_path_buf(),
            expected_type: expected_type.into(),
        }
    }

    /// Convenience constructor for [`Error::InvalidFile`].
    pub fn invalid_file(path: impl AsRef<Path>) -> Self {
        Error::InvalidFile {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Convenience constructor for [`Error::InvalidFileMetadata`].
    pub fn invalid_file_metadata(path: impl AsRef<Path>) -> Self {
        Error::InvalidFileMetadata {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Convenience constructor for [`Error::Writer`].
    pub fn writer(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Error::Writer {
            source: source.into(),
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_file_type_display() {
        let err = Error::invalid_file_type("/tmp/photo.png", "public.jpeg");
        assert_eq!(
            err.to_string(),
            "[liveforge] invalid file type: /tmp/photo.png (expected public.jpeg)"
        );
    }

    #[test]
    fn live_request_problem_lists_paths() {
        let err = Error::LiveRequestProblem {
            file_paths: vec![PathBuf::from("/a/live.jpg"), PathBuf::from("/a/live.mov")],
        };
        assert_eq!(
            err.to_string(),
            "[liveforge] live request problem occurred: /a/live.jpg, /a/live.mov"
        );
    }

    #[test]
    fn nothing_to_save_display() {
        assert_eq!(Error::NothingToSave.to_string(), "[liveforge] nothing to save");
    }

    #[test]
    fn writer_passes_source_through() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let err = Error::writer(io);
        assert_eq!(err.to_string(), "[liveforge] writer error: disk full");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn io_from_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io { .. }));
    }

    #[test]
    fn path_constructors() {
        assert!(matches!(
            Error::invalid_file("x.mov"),
            Error::InvalidFile { path } if path == PathBuf::from("x.mov")
        ));
        assert!(matches!(
            Error::invalid_file_metadata("x.jpg"),
            Error::InvalidFileMetadata { .. }
        ));
        assert!(matches!(
            Error::invalid_file_path("x"),
            Error::InvalidFilePath { .. }
        ));
    }
}
