//! Image normalization into the device raster.
//!
//! The device scans its panel bottom-up, so a picture with a top-left origin
//! has to be rotated 180 degrees and mirrored horizontally before it is sent.
//! The two operations together reduce to a vertical flip, done while packing.

use image::{imageops, DynamicImage, RgbImage};
use tracing::debug;

use crate::{Error, Frame, Result, BYTES_PER_PIXEL, FIP_ASPECT, FIP_HEIGHT, FIP_WIDTH};

/// Converts arbitrary bitmaps into [`Frame`]s of a fixed size.
#[derive(Debug, Clone, Copy)]
pub struct ImageNormalizer {
    width: u32,
    height: u32,
    aspect: f32,
}

impl Default for ImageNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageNormalizer {
    /// Normalizer for the native 320x240 panel.
    pub fn new() -> Self {
        Self {
            width: FIP_WIDTH,
            height: FIP_HEIGHT,
            aspect: FIP_ASPECT,
        }
    }

    /// Normalizer for another target canvas.
    pub fn with_target(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            aspect: width.max(1) as f32 / height.max(1) as f32,
        }
    }

    /// Target dimensions.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Computes the aspect-preserving thumbnail size for a source image.
    ///
    /// A source wider than the reference aspect is width-limited, anything
    /// else is height-limited. The result never exceeds the canvas.
    pub fn fit_dimensions(&self, src_width: u32, src_height: u32) -> (u32, u32) {
        let src_aspect = src_width.max(1) as f32 / src_height.max(1) as f32;
        let mut w = self.width as f32;
        let mut h = self.height as f32;
        if self.aspect < src_aspect {
            h = w / src_aspect;
        } else {
            w = h * src_aspect;
        }
        let w = (w.round() as u32).clamp(1, self.width);
        let h = (h.round() as u32).clamp(1, self.height);
        (w, h)
    }

    /// Top-left placement of a thumbnail centred on the canvas.
    pub fn centre_offset(&self, thumb_width: u32, thumb_height: u32) -> (u32, u32) {
        (
            self.width.saturating_sub(thumb_width) >> 1,
            self.height.saturating_sub(thumb_height) >> 1,
        )
    }

    /// Fits, flips and packs a source image.
    ///
    /// Returns [`Error::InvalidArgument`] when no image is given.
    pub fn normalize(&self, source: Option<&DynamicImage>) -> Result<Frame> {
        let source = source.ok_or_else(|| Error::InvalidArgument("no source image".into()))?;
        let rgb = source.to_rgb8();

        let conformed = if rgb.dimensions() == (self.width, self.height) {
            rgb
        } else {
            self.fit_to_canvas(&rgb)
        };

        Ok(self.pack(&conformed))
    }

    /// Scales the image into a black canvas of the target size.
    fn fit_to_canvas(&self, rgb: &RgbImage) -> RgbImage {
        let (w, h) = self.fit_dimensions(rgb.width(), rgb.height());
        debug!(
            "Resizing {}x{} image to {}x{}",
            rgb.width(),
            rgb.height(),
            w,
            h
        );
        let thumb = imageops::thumbnail(rgb, w, h);
        let (x, y) = self.centre_offset(thumb.width(), thumb.height());

        let mut canvas = RgbImage::new(self.width, self.height);
        imageops::overlay(&mut canvas, &thumb, x as i64, y as i64);
        canvas
    }

    /// Packs to 24-bit BGR with rows in device scan order.
    fn pack(&self, rgb: &RgbImage) -> Frame {
        let mut frame = Frame::with_dimensions(self.width, self.height);
        let stride = frame.stride();
        let data = frame.data_mut();

        for (y, row) in rgb.rows().enumerate() {
            let dst_row = self.height as usize - 1 - y;
            let base = dst_row * stride;
            for (x, px) in row.enumerate() {
                let idx = base + x * BYTES_PER_PIXEL;
                data[idx] = px[2];
                data[idx + 1] = px[1];
                data[idx + 2] = px[0];
            }
        }

        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn solid(width: u32, height: u32, color: [u8; 3]) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(color)))
    }

    #[test]
    fn test_absent_source_is_invalid() {
        let normalizer = ImageNormalizer::new();
        assert!(matches!(
            normalizer.normalize(None),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_output_always_target_size() {
        let normalizer = ImageNormalizer::new();
        for (w, h) in [(320, 240), (640, 480), (100, 400), (1000, 10), (1, 1), (321, 240)] {
            let frame = normalizer.normalize(Some(&solid(w, h, [9, 9, 9]))).unwrap();
            assert_eq!((frame.width(), frame.height()), (320, 240), "source {}x{}", w, h);
            assert_eq!(frame.data().len(), 320 * 240 * 3);
        }
    }

    #[test]
    fn test_same_size_is_flipped_vertically() {
        let mut img = RgbImage::new(320, 240);
        // Top-left marker in the source
        img.put_pixel(0, 0, Rgb([255, 0, 0]));
        img.put_pixel(319, 0, Rgb([0, 255, 0]));
        let frame = ImageNormalizer::new()
            .normalize(Some(&DynamicImage::ImageRgb8(img)))
            .unwrap();

        // Rotate 180 + mirror X keeps columns and reverses rows
        assert_eq!(frame.get_pixel(0, 239), Some(0xFF0000));
        assert_eq!(frame.get_pixel(319, 239), Some(0x00FF00));
        assert_eq!(frame.get_pixel(0, 0), Some(0));
    }

    #[test]
    fn test_matching_aspect_fills_canvas() {
        let normalizer = ImageNormalizer::with_target(320, 240);
        assert_eq!(normalizer.fit_dimensions(640, 480), (320, 240));

        let mut img = RgbImage::from_pixel(640, 480, Rgb([0, 0, 255]));
        for x in 0..640 {
            for y in 0..4 {
                img.put_pixel(x, y, Rgb([255, 255, 255]));
            }
        }
        let frame = normalizer
            .normalize(Some(&DynamicImage::ImageRgb8(img)))
            .unwrap();

        // No letterboxing: every corner is painted
        assert_ne!(frame.get_pixel(0, 0), Some(0));
        assert_ne!(frame.get_pixel(319, 0), Some(0));
        // Source top rows land at the end of the buffer
        assert_eq!(frame.get_pixel(160, 239), Some(0xFFFFFF));
        assert_eq!(frame.get_pixel(160, 0), Some(0x0000FF));
    }

    #[test]
    fn test_wide_source_is_letterboxed() {
        let normalizer = ImageNormalizer::new();
        assert_eq!(normalizer.fit_dimensions(640, 240), (320, 120));
        assert_eq!(normalizer.centre_offset(320, 120), (0, 60));

        let frame = normalizer
            .normalize(Some(&solid(640, 240, [255, 255, 255])))
            .unwrap();
        assert_eq!(frame.get_pixel(160, 10), Some(0));
        assert_eq!(frame.get_pixel(160, 120), Some(0xFFFFFF));
    }

    #[test]
    fn test_tall_source_is_pillarboxed() {
        let normalizer = ImageNormalizer::new();
        assert_eq!(normalizer.fit_dimensions(120, 240), (120, 240));
        assert_eq!(normalizer.centre_offset(120, 240), (100, 0));
    }

    #[test]
    fn test_fit_clamps_to_canvas() {
        let normalizer = ImageNormalizer::new();
        let (w, h) = normalizer.fit_dimensions(100_000, 1);
        assert!(w <= 320 && h >= 1);
        assert_eq!(normalizer.centre_offset(330, 250), (0, 0));
    }
}
