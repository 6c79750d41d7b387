use egui::{ColorImage, Context, TextureOptions};
use image::RgbImage;
use crate::error::CaptureError;
use crate::snapshot::CapturedImage;
use crate::ui::HandCaptureApp;

fn to_color_image(image: &RgbImage) -> ColorImage {
    let size = [image.width() as usize, image.height() as usize];
    ColorImage::from_rgb(size, image.as_flat_samples().as_slice())
}

/// Whether `image` differs from the photo already on the GPU
fn needs_upload(uploaded: Option<&CapturedImage>, image: &CapturedImage) -> bool {
    uploaded != Some(image)
}

impl HandCaptureApp {
    pub fn update_camera_texture(&mut self, ctx: &Context, image: &RgbImage) {
        // Skip frames from a camera that is still warming up
        if image.width() == 0 || image.height() == 0 {
            return;
        }

        let color_image = to_color_image(image);
        if let Some(texture) = self
            .camera_texture
            .as_mut()
            .filter(|texture| texture.size() == color_image.size)
        {
            texture.set(color_image, TextureOptions::LINEAR);
            return;
        }
        // First frame, or the camera resolution changed
        self.camera_texture = Some(ctx.load_texture("camera_preview", color_image, TextureOptions::LINEAR));
    }

    /// Decode and upload the captured photo once; repeated calls with the
    /// same photo are free. Returns whether a new texture was uploaded.
    pub fn show_captured_photo(&mut self, ctx: &Context, image: &CapturedImage) -> Result<bool, CaptureError> {
        if !needs_upload(self.captured_source.as_ref(), image) {
            return Ok(false);
        }
        // Remember the photo even if decoding fails so a bad JPEG is reported once
        self.captured_source = Some(image.clone());

        let color_image = to_color_image(&image.decode()?);
        match &mut self.captured_texture {
            Some(texture) => texture.set(color_image, TextureOptions::LINEAR),
            None => {
                self.captured_texture =
                    Some(ctx.load_texture("captured_photo", color_image, TextureOptions::LINEAR));
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_captured_photo_uploaded_only_when_changed() {
        let first = CapturedImage::encode(&RgbImage::new(8, 8), 80).unwrap();
        let second = CapturedImage::encode(&RgbImage::from_pixel(8, 8, image::Rgb([255, 0, 0])), 80).unwrap();

        assert!(needs_upload(None, &first));
        assert!(!needs_upload(Some(&first), &first));
        assert!(needs_upload(Some(&first), &second));
    }

    #[test]
    fn test_color_image_keeps_dimensions() {
        let color = to_color_image(&RgbImage::new(12, 7));
        assert_eq!(color.size, [12, 7]);
    }
}
