//! Scratch directory holding the files of the current live photo.
//!
//! Lives under `{base_dir}/{directory_name}`. At most one [`LiveAsset`]'s
//! files exist there at a time; every new request flushes it first.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use liveforge_common::{LiveAsset, Result, StorageConfig};

/// Filesystem manager for the live resource directory.
#[derive(Debug, Clone)]
pub struct TemporaryStorage {
    directory: PathBuf,
    image_file_name: String,
    movie_file_name: String,
}

impl TemporaryStorage {
    /// Resolve the directory from `config`.
    ///
    /// Without an explicit `base_dir` the user's document directory is used,
    /// falling back to the system temp dir. Nothing is created yet.
    pub fn new(config: &StorageConfig) -> Self {
        let base_dir = config
            .base_dir
            .clone()
            .or_else(dirs::document_dir)
            .unwrap_or_else(std::env::temp_dir);
        Self {
            directory: base_dir.join(&config.directory_name),
            image_file_name: config.image_file_name.clone(),
            movie_file_name: config.movie_file_name.clone(),
        }
    }

    /// The storage directory, created if missing.
    pub fn path(&self) -> Result<&Path> {
        fs::create_dir_all(&self.directory)?;
        Ok(&self.directory)
    }

    /// Where the directory lives, without touching the filesystem.
    pub fn location(&self) -> &Path {
        &self.directory
    }

    /// Reserve a fresh identifier and the two output paths under the directory.
    pub fn allocate(&self) -> Result<LiveAsset> {
        let directory = self.path()?;
        Ok(LiveAsset::new(
            directory,
            &self.image_file_name,
            &self.movie_file_name,
        ))
    }

    /// Remove every file and sub-directory, keeping the directory itself.
    ///
    /// A missing directory is not an error.
    pub fn flush(&self) -> Result<()> {
        let entries = match fs::read_dir(&self.directory) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0usize;
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                fs::remove_dir_all(&path)?;
            } else {
                fs::remove_file(&path)?;
            }
            removed += 1;
        }

        if removed > 0 {
            tracing::debug!("Flushed {removed} entries from {}", self.directory.display());
        }
        Ok(())
    }

    /// Current contents, sorted by path. Empty when the directory is missing.
    pub fn entries(&self) -> Result<Vec<PathBuf>> {
        let entries = match fs::read_dir(&self.directory) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut paths = entries
            .map(|entry| entry.map(|e| e.path()))
            .collect::<io::Result<Vec<_>>>()?;
        paths.sort();
        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage_in(dir: &Path) -> TemporaryStorage {
        TemporaryStorage::new(&StorageConfig {
            base_dir: Some(dir.to_path_buf()),
            ..StorageConfig::default()
        })
    }

    #[test]
    fn test_location_uses_directory_name() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage_in(dir.path());
        assert_eq!(storage.location(), dir.path().join("liveforge.liveResource"));
        assert!(!storage.location().exists(), "created lazily");
    }

    #[test]
    fn test_default_base_dir_resolves() {
        let storage = TemporaryStorage::new(&StorageConfig::default());
        assert!(storage.location().ends_with("liveforge.liveResource"));
    }

    #[test]
    fn test_allocate_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage_in(dir.path());
        let asset = storage.allocate().unwrap();
        assert!(storage.location().is_dir());
        assert_eq!(
            asset.image_file().path(),
            storage.location().join("live_resource.jpg")
        );
        assert_eq!(
            asset.movie_file().path(),
            storage.location().join("live_resource.mov")
        );
    }

    #[test]
    fn test_flush_keeps_directory() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage_in(dir.path());
        let root = storage.path().unwrap().to_path_buf();
        fs::write(root.join("a.jpg"), b"a").unwrap();
        fs::create_dir(root.join("nested")).unwrap();
        fs::write(root.join("nested/b.mov"), b"b").unwrap();
        assert_eq!(storage.entries().unwrap().len(), 2);

        storage.flush().unwrap();
        assert!(root.is_dir());
        assert!(storage.entries().unwrap().is_empty());

        // idempotent
        storage.flush().unwrap();
    }

    #[test]
    fn test_flush_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage_in(&dir.path().join("never-created"));
        storage.flush().unwrap();
        assert!(storage.entries().unwrap().is_empty());
        assert!(!storage.location().exists());
    }
}
