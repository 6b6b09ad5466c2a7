//! Idle page shown before telemetry arrives.

use super::Gauge;
use crate::rendering::Canvas;
use crate::telemetry::TelemetrySnapshot;

const FRAME_COLOR: u32 = 0x3A6EA5;
const ACTIVITY_COLOR: u32 = 0x7FD13B;

/// Framed page with a telemetry activity strip along the bottom.
#[derive(Debug, Default)]
pub struct SplashGauge;

impl SplashGauge {
    pub fn new() -> Self {
        Self
    }
}

impl Gauge for SplashGauge {
    fn name(&self) -> &str {
        "splash"
    }

    fn render(&self, canvas: &mut Canvas, telemetry: &TelemetrySnapshot) {
        let (width, height) = canvas.dimensions();
        canvas.set_background(0x000000);
        canvas.clear();
        canvas.draw_rect_outline(4, 4, width.saturating_sub(8), height.saturating_sub(8), FRAME_COLOR);
        canvas.draw_rect_outline(8, 8, width.saturating_sub(16), height.saturating_sub(16), FRAME_COLOR);

        // Eight cells; the lit cell advances with every telemetry update
        let cells = 8u32;
        let cell_width = width.saturating_sub(32) / cells;
        let lit = (telemetry.updates() % cells as u64) as u32;
        let y = height.saturating_sub(28) as i32;
        for i in 0..cells {
            let x = 16 + (i * cell_width) as i32;
            if !telemetry.is_empty() && i == lit {
                canvas.fill_rect(x, y, cell_width.saturating_sub(2), 8, ACTIVITY_COLOR);
            } else {
                canvas.draw_rect_outline(x, y, cell_width.saturating_sub(2), 8, FRAME_COLOR);
            }
        }
    }
}
