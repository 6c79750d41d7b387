use anyhow::{anyhow, Result};
use image::{ImageBuffer, RgbImage};
use std::path::Path;
use std::process::Command;

/// Source of live video frames.
///
/// `None`, or a frame with a zero dimension, means the camera is still
/// warming up. Implementations may block on file I/O and decoding; the
/// capture controller only calls them from `spawn_blocking`.
pub trait FrameSource: Send + Sync {
    fn current_frame(&self) -> Option<RgbImage>;
}

/// Camera controller for Raspberry Pi Camera using libcamera
pub struct CameraController {
    /// Camera settings
    width: u32,
    height: u32,
    /// Preview image path for live feed
    preview_image_path: String,
    /// Whether a still-capture tool is available
    is_available: bool,
    /// Tool used for the preview (rpicam-still, or legacy raspistill)
    still_command: &'static str,
    /// Preview process handle
    preview_process: Option<std::process::Child>,
}

impl CameraController {
    /// Create a new camera controller and start the live preview if possible
    pub fn new(width: u32, height: u32) -> Result<Self> {
        let mut controller = CameraController {
            width,
            height,
            preview_image_path: "/tmp/gesture_capture_preview.jpg".to_string(),
            is_available: false,
            still_command: "rpicam-still",
            preview_process: None,
        };

        controller.initialize();
        if controller.is_available {
            controller.start_preview()?;
        }
        Ok(controller)
    }

    /// Controller that never touches the camera and always yields the test pattern
    pub fn test_pattern(width: u32, height: u32) -> Self {
        log::info!("Camera disabled - using test pattern");
        CameraController {
            width,
            height,
            preview_image_path: String::new(),
            is_available: false,
            still_command: "rpicam-still",
            preview_process: None,
        }
    }

    /// Check whether rpicam-still (or legacy raspistill) is available
    fn initialize(&mut self) {
        log::info!("Initializing camera controller...");

        match Command::new("rpicam-still").arg("--help").output() {
            Ok(output) => {
                self.is_available = true;
                self.still_command = "rpicam-still";
                log::info!("Raspberry Pi Camera initialized successfully (using rpicam-still)");
                log::debug!("rpicam-still help output: {}", String::from_utf8_lossy(&output.stdout));
            }
            Err(e) => {
                log::warn!("rpicam-still not found: {}", e);

                // Try legacy raspistill as fallback
                match Command::new("raspistill").arg("-?").output() {
                    Ok(_) => {
                        self.is_available = true;
                        self.still_command = "raspistill";
                        log::info!("Raspberry Pi Camera initialized successfully (using legacy raspistill)");
                    }
                    Err(e) => {
                        self.is_available = false;
                        log::warn!("Neither rpicam-still nor raspistill found: {}", e);
                        log::warn!("Camera not available - falling back to test pattern");
                    }
                }
            }
        }
    }

    /// Check if camera is available and working
    pub fn is_available(&self) -> bool {
        self.is_available
    }

    /// Start live preview (timelapse capture overwriting one file)
    pub fn start_preview(&mut self) -> Result<()> {
        log::info!("Starting camera preview...");

        if !self.is_available {
            log::error!("Cannot start preview: Camera not available");
            return Err(anyhow!("Camera not available"));
        }

        // Stop any existing preview
        self.stop_preview();

        let width = self.width.to_string();
        let height = self.height.to_string();
        // raspistill only understands the short flags
        let args: [&str; 13] = if self.still_command == "raspistill" {
            [
                "-o", &self.preview_image_path,
                "-w", &width,
                "-h", &height,
                "-q", "70",
                "-t", "0",
                "-tl", "100",
                "-n",
            ]
        } else {
            [
                "-o", &self.preview_image_path,
                "--width", &width,
                "--height", &height,
                "--quality", "70",     // Lower quality for faster preview
                "--timeout", "0",      // Run until killed
                "--timelapse", "100",  // New frame every 100ms
                "--nopreview",         // No system preview window
            ]
        };

        log::info!("Preview command: {} {}", self.still_command, args.join(" "));

        match Command::new(self.still_command).args(args).spawn() {
            Ok(child) => {
                self.preview_process = Some(child);
                log::info!("Camera preview started successfully");
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to start camera preview: {}", e);
                Err(anyhow!("Failed to start preview: {}", e))
            }
        }
    }

    /// Stop live preview
    pub fn stop_preview(&mut self) {
        if let Some(mut process) = self.preview_process.take() {
            let _ = process.kill();
            let _ = process.wait();
            log::info!("Camera preview stopped");
        }
    }

    fn test_pattern_frame(&self) -> RgbImage {
        let time = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f32();
        let (width, height) = (self.width as f32, self.height as f32);

        ImageBuffer::from_fn(self.width, self.height, |x, y| {
            let r = ((x as f32 / width * 155.0) + (time * 0.5).sin() * 50.0) as u8;
            let g = ((y as f32 / height * 155.0) + (time * 0.3).cos() * 50.0) as u8;
            let b = (((x + y) as f32 / (width + height) * 155.0) + (time * 0.7).sin() * 50.0) as u8;
            image::Rgb([r.saturating_add(100), g.saturating_add(100), b.saturating_add(100)])
        })
    }

    /// Get current camera settings
    pub fn get_settings(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl FrameSource for CameraController {
    fn current_frame(&self) -> Option<RgbImage> {
        if !self.is_available {
            return Some(self.test_pattern_frame());
        }

        if !Path::new(&self.preview_image_path).exists() {
            log::debug!("Preview image not written yet: {}", self.preview_image_path);
            return None;
        }

        // The preview file is rewritten continuously; a torn read just skips this frame
        match image::open(&self.preview_image_path) {
            Ok(img) => Some(img.to_rgb8()),
            Err(e) => {
                log::debug!("Preview frame unreadable: {}", e);
                None
            }
        }
    }
}

impl Drop for CameraController {
    fn drop(&mut self) {
        self.stop_preview();

        if !self.preview_image_path.is_empty() && Path::new(&self.preview_image_path).exists() {
            let _ = std::fs::remove_file(&self.preview_image_path);
        }
        log::info!("Camera controller dropped");
    }
}

/// A frame source that always returns the same image
pub struct StaticFrameSource {
    frame: RgbImage,
}

impl StaticFrameSource {
    pub fn new(frame: RgbImage) -> Self {
        Self { frame }
    }

    /// A camera that has not produced its first frame
    pub fn warming_up() -> Self {
        Self { frame: RgbImage::new(0, 0) }
    }
}

impl FrameSource for StaticFrameSource {
    fn current_frame(&self) -> Option<RgbImage> {
        Some(self.frame.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_has_configured_size() {
        let camera = CameraController::test_pattern(64, 48);
        assert!(!camera.is_available());
        let frame = camera.current_frame().unwrap();
        assert_eq!(frame.dimensions(), (64, 48));
        assert_eq!(camera.get_settings(), (64, 48));
    }

    #[test]
    fn test_static_source_warming_up() {
        let frame = StaticFrameSource::warming_up().current_frame().unwrap();
        assert_eq!(frame.width(), 0);
    }
}
