use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::{imageops, ColorType, RgbImage};
use std::path::Path;

use crate::camera_controller::FrameSource;
use crate::error::CaptureError;

const JPEG_DATA_URI_PREFIX: &str = "data:image/jpeg;base64,";

/// The still photo produced when the countdown completes
#[derive(Clone, PartialEq, Eq)]
pub struct CapturedImage {
    jpeg: Vec<u8>,
    width: u32,
    height: u32,
}

impl std::fmt::Debug for CapturedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CapturedImage({}x{}, {} bytes)", self.width, self.height, self.jpeg.len())
    }
}

impl CapturedImage {
    pub fn encode(frame: &RgbImage, quality: u8) -> Result<Self, CaptureError> {
        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, quality).encode(
            frame.as_raw(),
            frame.width(),
            frame.height(),
            ColorType::Rgb8,
        )?;

        Ok(Self {
            jpeg,
            width: frame.width(),
            height: frame.height(),
        })
    }

    /// Parse a `data:image/jpeg;base64,...` URI
    pub fn from_data_uri(uri: &str) -> Result<Self, CaptureError> {
        let (header, payload) = uri
            .split_once(',')
            .ok_or_else(|| CaptureError::DataUri("missing ',' separator".to_string()))?;

        if format!("{},", header) != JPEG_DATA_URI_PREFIX {
            return Err(CaptureError::DataUri(format!("unsupported header '{}'", header)));
        }

        let jpeg = STANDARD
            .decode(payload)
            .map_err(|e| CaptureError::DataUri(e.to_string()))?;
        let decoded = image::load_from_memory_with_format(&jpeg, image::ImageFormat::Jpeg)?;

        Ok(Self {
            width: decoded.width(),
            height: decoded.height(),
            jpeg,
        })
    }

    pub fn as_data_uri(&self) -> String {
        format!("{}{}", JPEG_DATA_URI_PREFIX, STANDARD.encode(&self.jpeg))
    }

    pub fn jpeg_bytes(&self) -> &[u8] {
        &self.jpeg
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn decode(&self) -> Result<RgbImage, CaptureError> {
        let img = image::load_from_memory_with_format(&self.jpeg, image::ImageFormat::Jpeg)?;
        Ok(img.to_rgb8())
    }

    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        std::fs::write(path, &self.jpeg)
    }
}

/// Takes stills from the live frame source
#[derive(Debug, Clone, Copy)]
pub struct Snapshotter {
    quality: u8,
    mirrored: bool,
}

impl Snapshotter {
    pub fn new(quality: u8, mirrored: bool) -> Self {
        Self {
            quality: quality.clamp(1, 100),
            mirrored,
        }
    }

    pub fn capture(&self, source: &dyn FrameSource) -> Result<CapturedImage, CaptureError> {
        let frame = source.current_frame().ok_or(CaptureError::NoFrame)?;
        if frame.width() == 0 || frame.height() == 0 {
            return Err(CaptureError::NoFrame);
        }

        if self.mirrored {
            CapturedImage::encode(&imageops::flip_horizontal(&frame), self.quality)
        } else {
            CapturedImage::encode(&frame, self.quality)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera_controller::StaticFrameSource;

    fn split_frame() -> RgbImage {
        // Left half white, right half black
        RgbImage::from_fn(32, 16, |x, _| {
            if x < 16 { image::Rgb([255, 255, 255]) } else { image::Rgb([0, 0, 0]) }
        })
    }

    #[test]
    fn test_data_uri_round_trip() {
        let image = CapturedImage::encode(&split_frame(), 90).unwrap();
        let uri = image.as_data_uri();
        assert!(uri.starts_with("data:image/jpeg;base64,"));

        let parsed = CapturedImage::from_data_uri(&uri).unwrap();
        assert_eq!(parsed, image);
        assert_eq!(parsed.dimensions(), (32, 16));
    }

    #[test]
    fn test_rejects_malformed_uris() {
        assert!(CapturedImage::from_data_uri("no separator").is_err());
        assert!(CapturedImage::from_data_uri("data:image/png;base64,AAAA").is_err());
        assert!(CapturedImage::from_data_uri("data:image/jpeg;base64,@@@").is_err());
    }

    #[test]
    fn test_mirrored_snapshot() {
        let source = StaticFrameSource::new(split_frame());

        let mirrored = Snapshotter::new(95, true).capture(&source).unwrap().decode().unwrap();
        assert!(mirrored.get_pixel(2, 8)[0] < 64);
        assert!(mirrored.get_pixel(29, 8)[0] > 192);

        let plain = Snapshotter::new(95, false).capture(&source).unwrap().decode().unwrap();
        assert!(plain.get_pixel(2, 8)[0] > 192);
    }

    #[test]
    fn test_no_frame_is_an_error() {
        let source = StaticFrameSource::warming_up();
        assert!(matches!(
            Snapshotter::new(90, true).capture(&source),
            Err(CaptureError::NoFrame)
        ));
    }

    #[test]
    fn test_save_to_disk() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("photo.jpg");
        let image = CapturedImage::encode(&split_frame(), 80).unwrap();
        image.save_to(&path).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), image.jpeg_bytes());
    }
}
