use image::RgbImage;
use std::time::SystemTime;

/// Off-screen raster buffer the sampler draws into.
///
/// The pixel storage is reused between ticks and only re-allocated when the
/// source changes resolution.
#[derive(Debug)]
pub struct Frame {
    pixels: RgbImage,
    pub sequence: u64,
    pub captured_at: Option<SystemTime>,
}

impl Frame {
    pub fn new() -> Self {
        Self {
            pixels: RgbImage::new(0, 0),
            sequence: 0,
            captured_at: None,
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.width() == 0 || self.pixels.height() == 0
    }

    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }

    /// Resize the buffer to `width`x`height`, keeping the allocation when the
    /// size is unchanged. Returns the buffer for in-place drawing.
    pub fn ensure_size(&mut self, width: u32, height: u32) -> &mut RgbImage {
        if self.pixels.dimensions() != (width, height) {
            tracing::debug!(
                "Raster buffer resized {}x{} -> {}x{}",
                self.pixels.width(),
                self.pixels.height(),
                width,
                height
            );
            self.pixels = RgbImage::new(width, height);
        }
        &mut self.pixels
    }

    /// Copy a decoded frame into the buffer.
    pub fn load(&mut self, source: &RgbImage) {
        let buffer = self.ensure_size(source.width(), source.height());
        buffer.copy_from_slice(source.as_raw());
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_new_frame_is_empty() {
        let frame = Frame::new();
        assert!(frame.is_empty());
        assert_eq!(frame.width(), 0);
    }

    #[test]
    fn test_load_resizes_and_copies() {
        let mut frame = Frame::new();
        let source = RgbImage::from_pixel(4, 3, Rgb([1, 2, 3]));

        frame.load(&source);

        assert_eq!((frame.width(), frame.height()), (4, 3));
        assert_eq!(frame.pixels().get_pixel(3, 2), &Rgb([1, 2, 3]));
    }

    #[test]
    fn test_load_reuses_buffer_for_same_size() {
        let mut frame = Frame::new();
        frame.load(&RgbImage::from_pixel(2, 2, Rgb([9, 9, 9])));
        let before = frame.pixels().as_raw().as_ptr();

        frame.load(&RgbImage::from_pixel(2, 2, Rgb([7, 7, 7])));

        assert_eq!(frame.pixels().as_raw().as_ptr(), before);
        assert_eq!(frame.pixels().get_pixel(0, 0), &Rgb([7, 7, 7]));
    }
}
