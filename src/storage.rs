use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};

use crate::snapshot::CapturedImage;

pub const PHOTO_FILE_NAME: &str = "photo.jpg";

/// Stores accepted photos, one timestamped folder per submission
#[derive(Debug, Clone)]
pub struct PhotoStore {
    output_dir: PathBuf,
}

impl PhotoStore {
    pub fn new<P: Into<PathBuf>>(output_dir: P) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn store(&self, image: &CapturedImage) -> Result<PathBuf> {
        self.store_at(image, Local::now())
    }

    fn store_at(&self, image: &CapturedImage, now: DateTime<Local>) -> Result<PathBuf> {
        let base = format!("capture_{}", now.format("%Y%m%d_%H%M%S"));

        // Two submissions within the same second get numbered folders
        let mut folder = self.output_dir.join(&base);
        let mut attempt = 1;
        while folder.exists() {
            attempt += 1;
            folder = self.output_dir.join(format!("{}_{}", base, attempt));
        }

        std::fs::create_dir_all(&folder)
            .with_context(|| format!("Failed to create capture folder: {}", folder.display()))?;

        let path = folder.join(PHOTO_FILE_NAME);
        image
            .save_to(&path)
            .with_context(|| format!("Failed to write photo: {}", path.display()))?;

        log::info!("Photo stored at {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use image::RgbImage;
    use tempfile::TempDir;

    #[test]
    fn test_store_creates_timestamped_folder() {
        let temp_dir = TempDir::new().unwrap();
        let store = PhotoStore::new(temp_dir.path().join("captures"));
        let image = CapturedImage::encode(&RgbImage::new(16, 16), 85).unwrap();
        let now = Local.with_ymd_and_hms(2026, 10, 19, 9, 30, 5).unwrap();

        let first = store.store_at(&image, now).unwrap();
        assert!(first.ends_with("capture_20261019_093005/photo.jpg"));
        assert_eq!(std::fs::read(&first).unwrap(), image.jpeg_bytes());

        let second = store.store_at(&image, now).unwrap();
        assert!(second.ends_with("capture_20261019_093005_2/photo.jpg"));
    }
}
