//! 24-bit packed frame in the device's native raster layout.

use image::RgbImage;

use crate::{BYTES_PER_PIXEL, FIP_HEIGHT, FIP_WIDTH};

/// Total byte count of a full-size frame.
pub const FRAME_BYTES: usize = FIP_WIDTH as usize * FIP_HEIGHT as usize * BYTES_PER_PIXEL;

/// Raster ready for transmission.
///
/// Pixels are stored as B, G, R triplets with a tight stride of
/// `width * 3`. Row 0 of the buffer is the bottom row of the picture as the
/// user sees it; [`crate::ImageNormalizer`] produces that order.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl Default for Frame {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}

impl Frame {
    /// Creates a full-size frame initialized to black.
    pub fn new() -> Self {
        Self::with_dimensions(FIP_WIDTH, FIP_HEIGHT)
    }

    /// Creates a frame with custom dimensions.
    pub fn with_dimensions(width: u32, height: u32) -> Self {
        let size = width as usize * height as usize * BYTES_PER_PIXEL;
        Self {
            data: vec![0; size],
            width,
            height,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Bytes per row.
    pub fn stride(&self) -> usize {
        self.width as usize * BYTES_PER_PIXEL
    }

    /// Returns a reference to the raw bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Returns a mutable reference to the raw bytes.
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Sets a pixel in buffer coordinates (row 0 = first row in memory).
    pub fn set_pixel(&mut self, x: u32, y: u32, color: u32) {
        if x < self.width && y < self.height {
            let idx = self.offset(x, y);
            let (r, g, b) = split_rgb(color);
            self.data[idx] = b;
            self.data[idx + 1] = g;
            self.data[idx + 2] = r;
        }
    }

    /// Gets a pixel in buffer coordinates as RGB888.
    pub fn get_pixel(&self, x: u32, y: u32) -> Option<u32> {
        if x < self.width && y < self.height {
            let idx = self.offset(x, y);
            let (b, g, r) = (self.data[idx], self.data[idx + 1], self.data[idx + 2]);
            Some(((r as u32) << 16) | ((g as u32) << 8) | b as u32)
        } else {
            None
        }
    }

    /// Converts the raw buffer to an RGB image without reordering rows.
    ///
    /// The result shows exactly what was sent to the device, which is what
    /// failure diagnostics want.
    pub fn to_rgb_image(&self) -> RgbImage {
        let mut rgb = Vec::with_capacity(self.data.len());
        for px in self.data.chunks_exact(BYTES_PER_PIXEL) {
            rgb.extend_from_slice(&[px[2], px[1], px[0]]);
        }
        RgbImage::from_raw(self.width, self.height, rgb)
            .unwrap_or_else(|| RgbImage::new(self.width, self.height))
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        y as usize * self.stride() + x as usize * BYTES_PER_PIXEL
    }
}

#[inline]
fn split_rgb(color: u32) -> (u8, u8, u8) {
    (
        ((color >> 16) & 0xFF) as u8,
        ((color >> 8) & 0xFF) as u8,
        (color & 0xFF) as u8,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_dimensions() {
        let frame = Frame::new();
        assert_eq!(frame.width(), 320);
        assert_eq!(frame.height(), 240);
        assert_eq!(frame.stride(), 960);
        assert_eq!(frame.data().len(), FRAME_BYTES);
    }

    #[test]
    fn test_pixel_byte_order() {
        let mut frame = Frame::new();
        frame.set_pixel(1, 0, 0x112233);
        assert_eq!(&frame.data()[3..6], &[0x33, 0x22, 0x11]);
        assert_eq!(frame.get_pixel(1, 0), Some(0x112233));
        assert_eq!(frame.get_pixel(320, 0), None);
    }

    #[test]
    fn test_to_rgb_image_swaps_channels() {
        let mut frame = Frame::with_dimensions(1, 1);
        frame.set_pixel(0, 0, 0x0A0B0C);
        let img = frame.to_rgb_image();
        assert_eq!(img.get_pixel(0, 0).0, [0x0A, 0x0B, 0x0C]);
    }
}
