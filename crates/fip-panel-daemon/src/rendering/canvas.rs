//! Canvas gauges draw on before a frame is normalized for the device.

use image::{DynamicImage, RgbaImage};
use tiny_skia::{Color, LineCap, Paint, PathBuilder, Pixmap, Rect, Stroke, Transform};

use crate::error::{Error, Result};

/// RGB888 drawing surface backed by a tiny-skia pixmap.
pub struct Canvas {
    width: u32,
    height: u32,
    pixmap: Pixmap,
    background_color: u32,
}

fn paint(color: u32) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color(Color::from_rgba8(
        ((color >> 16) & 0xFF) as u8,
        ((color >> 8) & 0xFF) as u8,
        (color & 0xFF) as u8,
        255,
    ));
    paint.anti_alias = true;
    paint
}

impl Canvas {
    /// Creates a new canvas.
    pub fn new(width: u32, height: u32) -> Result<Self> {
        let pixmap = Pixmap::new(width, height).ok_or_else(|| {
            Error::InvalidArgument(format!("invalid canvas size {}x{}", width, height))
        })?;

        Ok(Self {
            width,
            height,
            pixmap,
            background_color: 0x000000,
        })
    }

    /// Returns the canvas dimensions.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Sets the background color.
    pub fn set_background(&mut self, color: u32) {
        self.background_color = color;
    }

    /// Clears the canvas.
    pub fn clear(&mut self) {
        let c = self.background_color;
        self.pixmap.fill(Color::from_rgba8(
            ((c >> 16) & 0xFF) as u8,
            ((c >> 8) & 0xFF) as u8,
            (c & 0xFF) as u8,
            255,
        ));
    }

    /// Draws a filled rectangle.
    pub fn fill_rect(&mut self, x: i32, y: i32, width: u32, height: u32, color: u32) {
        if let Some(rect) = Rect::from_xywh(x as f32, y as f32, width as f32, height as f32) {
            self.pixmap
                .fill_rect(rect, &paint(color), Transform::identity(), None);
        }
    }

    /// Draws a one pixel rectangle outline.
    pub fn draw_rect_outline(&mut self, x: i32, y: i32, width: u32, height: u32, color: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.fill_rect(x, y, width, 1, color);
        self.fill_rect(x, y + height as i32 - 1, width, 1, color);
        self.fill_rect(x, y, 1, height, color);
        self.fill_rect(x + width as i32 - 1, y, 1, height, color);
    }

    /// Strokes a straight line.
    pub fn draw_line(&mut self, from: (f32, f32), to: (f32, f32), width: f32, color: u32) {
        let mut pb = PathBuilder::new();
        pb.move_to(from.0, from.1);
        pb.line_to(to.0, to.1);
        let Some(path) = pb.finish() else {
            return;
        };
        let stroke = Stroke {
            width,
            line_cap: LineCap::Round,
            ..Stroke::default()
        };
        self.pixmap
            .stroke_path(&path, &paint(color), &stroke, Transform::identity(), None);
    }

    /// Strokes a circular arc. Angles are in degrees, clockwise from 3 o'clock.
    #[allow(clippy::too_many_arguments)]
    pub fn draw_arc(
        &mut self,
        cx: f32,
        cy: f32,
        radius: f32,
        start_deg: f32,
        sweep_deg: f32,
        width: f32,
        color: u32,
    ) {
        if sweep_deg.abs() < f32::EPSILON || radius <= 0.0 {
            return;
        }
        // Polyline approximation, one segment per 3 degrees
        let segments = ((sweep_deg.abs() / 3.0).ceil() as usize).max(1);
        let mut pb = PathBuilder::new();
        for i in 0..=segments {
            let angle = (start_deg + sweep_deg * i as f32 / segments as f32).to_radians();
            let (x, y) = (cx + radius * angle.cos(), cy + radius * angle.sin());
            if i == 0 {
                pb.move_to(x, y);
            } else {
                pb.line_to(x, y);
            }
        }
        let Some(path) = pb.finish() else {
            return;
        };
        let stroke = Stroke {
            width,
            line_cap: LineCap::Butt,
            ..Stroke::default()
        };
        self.pixmap
            .stroke_path(&path, &paint(color), &stroke, Transform::identity(), None);
    }

    /// Returns the RGB888 color at a pixel.
    pub fn pixel(&self, x: u32, y: u32) -> Option<u32> {
        self.pixmap.pixel(x, y).map(|p| {
            let c = p.demultiply();
            ((c.red() as u32) << 16) | ((c.green() as u32) << 8) | c.blue() as u32
        })
    }

    /// Copies the canvas into an image the normalizer accepts.
    pub fn to_image(&self) -> Result<DynamicImage> {
        let mut data = Vec::with_capacity(self.pixmap.data().len());
        for pixel in self.pixmap.pixels() {
            let c = pixel.demultiply();
            data.extend_from_slice(&[c.red(), c.green(), c.blue(), c.alpha()]);
        }
        RgbaImage::from_raw(self.width, self.height, data)
            .map(DynamicImage::ImageRgba8)
            .ok_or_else(|| Error::InvalidState("canvas buffer size mismatch".to_string()))
    }
}
