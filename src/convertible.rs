//! Inputs accepted by [`LiveResource`](crate::LiveResource).
//!
//! Anything path-like can name a source file, and a placeholder image can be
//! given either decoded or as a file to load.

use std::path::{Path, PathBuf};

use image::DynamicImage;
use liveforge_common::paths::{validate_as, ContainerType};
use liveforge_common::{Error, Result};

/// Resolves to a filesystem path.
pub trait PathConvertible {
    fn to_path(&self) -> Result<PathBuf>;
}

impl PathConvertible for Path {
    fn to_path(&self) -> Result<PathBuf> {
        if self.as_os_str().is_empty() {
            return Err(Error::invalid_file_path(self));
        }
        Ok(self.to_path_buf())
    }
}

impl PathConvertible for PathBuf {
    fn to_path(&self) -> Result<PathBuf> {
        self.as_path().to_path()
    }
}

impl PathConvertible for str {
    fn to_path(&self) -> Result<PathBuf> {
        Path::new(self).to_path()
    }
}

impl PathConvertible for String {
    fn to_path(&self) -> Result<PathBuf> {
        Path::new(self).to_path()
    }
}

impl<T: PathConvertible + ?Sized> PathConvertible for &T {
    fn to_path(&self) -> Result<PathBuf> {
        (**self).to_path()
    }
}

/// Type checking on top of [`PathConvertible`].
pub trait ValidatedPath: PathConvertible {
    /// Resolve the path and check it conforms to `container`.
    fn validated_as(&self, container: ContainerType) -> Result<PathBuf> {
        validate_as(&self.to_path()?, container)
    }
}

impl<T: PathConvertible + ?Sized> ValidatedPath for T {}

/// Resolves to a decoded in-memory image.
pub trait ImageConvertible {
    fn to_image(&self) -> Result<DynamicImage>;
}

impl ImageConvertible for DynamicImage {
    fn to_image(&self) -> Result<DynamicImage> {
        Ok(self.clone())
    }
}

impl ImageConvertible for Path {
    fn to_image(&self) -> Result<DynamicImage> {
        image::open(self)
            .map_err(|e| Error::InvalidImageSource(format!("{}: {e}", self.display())))
    }
}

impl ImageConvertible for PathBuf {
    fn to_image(&self) -> Result<DynamicImage> {
        self.as_path().to_image()
    }
}

impl ImageConvertible for str {
    fn to_image(&self) -> Result<DynamicImage> {
        Path::new(self).to_image()
    }
}

impl ImageConvertible for String {
    fn to_image(&self) -> Result<DynamicImage> {
        Path::new(self).to_image()
    }
}

impl<T: ImageConvertible + ?Sized> ImageConvertible for &T {
    fn to_image(&self) -> Result<DynamicImage> {
        (**self).to_image()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    #[test]
    fn test_path_like_inputs() {
        let expected = PathBuf::from("/tmp/photo.jpg");
        assert_eq!("/tmp/photo.jpg".to_path().unwrap(), expected);
        assert_eq!(String::from("/tmp/photo.jpg").to_path().unwrap(), expected);
        assert_eq!(expected.to_path().unwrap(), expected);
        assert_eq!((&expected.as_path()).to_path().unwrap(), expected);
    }

    #[test]
    fn test_empty_path_rejected() {
        let err = "".to_path().unwrap_err();
        assert!(matches!(err, Error::InvalidFilePath { .. }));
    }

    #[test]
    fn test_validated_as() {
        assert_eq!(
            "photo.JPG".validated_as(ContainerType::StillImage).unwrap(),
            PathBuf::from("photo.JPG")
        );
        let err = "photo.png".validated_as(ContainerType::StillImage).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidFileType { ref expected_type, .. } if expected_type == "public.jpeg"
        ));
        assert!("clip.mov".validated_as(ContainerType::Movie).is_ok());
        assert!("clip.jpg".validated_as(ContainerType::Movie).is_err());
    }

    #[test]
    fn test_image_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("placeholder.png");
        RgbImage::new(4, 3).save(&path).unwrap();

        let loaded = path.to_image().unwrap();
        assert_eq!((loaded.width(), loaded.height()), (4, 3));
        let same = loaded.to_image().unwrap();
        assert_eq!(same, loaded);

        let err = dir.path().join("missing.png").to_image().unwrap_err();
        assert!(matches!(err, Error::InvalidImageSource(_)));
    }
}
