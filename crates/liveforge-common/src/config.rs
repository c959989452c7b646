//! Configuration types.
//!
//! [`LiveConfig`] is deserialized from JSON. Every section defaults sensibly
//! so a completely empty `{}` file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    pub storage: StorageConfig,
    pub muxer: MuxerConfig,
}

impl LiveConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Config(format!("invalid live config: {e}")))
    }

    /// Read a JSON config file. Any problem with it (no path given, file
    /// absent or unreadable, bad JSON) yields the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), "ignoring malformed live config: {e}");
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no live config file, using defaults");
                Self::default()
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), "cannot read live config: {e}");
                Self::default()
            }
        }
    }

    /// Settings that work but are probably mistakes.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.muxer.channel_capacity == 0 {
            warnings.push("muxer.channel_capacity is 0; a capacity of 1 will be used".into());
        }

        let storage = &self.storage;
        if storage.directory_name.is_empty() {
            warnings.push("storage.directory_name is empty".into());
        }
        if storage.image_file_name == storage.movie_file_name {
            warnings.push(format!(
                "storage.image_file_name and storage.movie_file_name are both '{}'",
                storage.image_file_name
            ));
        }
        for (field, name) in [
            ("image_file_name", &storage.image_file_name),
            ("movie_file_name", &storage.movie_file_name),
        ] {
            if name.contains('/') || name.contains('\\') {
                warnings.push(format!("storage.{field} '{name}' contains a path separator"));
            }
        }
        if !crate::paths::is_image_file(Path::new(&storage.image_file_name)) {
            warnings.push(format!(
                "storage.image_file_name '{}' has no image extension",
                storage.image_file_name
            ));
        }
        if !crate::paths::is_movie_file(Path::new(&storage.movie_file_name)) {
            warnings.push(format!(
                "storage.movie_file_name '{}' has no movie extension",
                storage.movie_file_name
            ));
        }

        warnings
    }
}

/// Where generated files live.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Parent directory; `None` means the user's document directory.
    pub base_dir: Option<PathBuf>,
    pub directory_name: String,
    pub image_file_name: String,
    pub movie_file_name: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_dir: None,
            directory_name: "liveforge.liveResource".into(),
            image_file_name: "live_resource.jpg".into(),
            movie_file_name: "live_resource.mov".into(),
        }
    }
}

/// Movie remuxing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MuxerConfig {
    /// Bound of the sample channel between the demux thread and the writer.
    pub channel_capacity: usize,
}

impl Default for MuxerConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 8,
        }
    }
}
