//! Vertical bars for a run of consecutive telemetry addresses.

use super::{fraction, Gauge};
use crate::rendering::Canvas;
use crate::telemetry::TelemetrySnapshot;

const BAR_COUNT: u32 = 8;
const BAR_COLOR: u32 = 0x00C8C8;
const EMPTY_COLOR: u32 = 0x404040;

/// Eight bars showing addresses `base..base + 8`.
#[derive(Debug)]
pub struct BarsGauge {
    base: u32,
}

impl BarsGauge {
    pub fn new(base: u32) -> Self {
        Self { base }
    }
}

impl Gauge for BarsGauge {
    fn name(&self) -> &str {
        "bars"
    }

    fn render(&self, canvas: &mut Canvas, telemetry: &TelemetrySnapshot) {
        let (width, height) = canvas.dimensions();
        canvas.set_background(0x000000);
        canvas.clear();

        let slot = width / BAR_COUNT;
        let bar_width = slot.saturating_sub(8).max(1);
        let max_height = height.saturating_sub(20);
        let bottom = height.saturating_sub(10) as i32;

        for i in 0..BAR_COUNT {
            let x = (i * slot + 4) as i32;
            canvas.draw_rect_outline(x, 10, bar_width, max_height, EMPTY_COLOR);
            let Some(value) = telemetry.get(self.base.wrapping_add(i)) else {
                continue;
            };
            let filled = (max_height as f32 * fraction(value)).round() as u32;
            if filled > 0 {
                canvas.fill_rect(x, bottom - filled as i32, bar_width, filled, BAR_COLOR);
            }
        }
    }
}
