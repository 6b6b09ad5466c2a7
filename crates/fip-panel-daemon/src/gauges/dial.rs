//! Round dial following one telemetry value.

use super::{fraction, Gauge};
use crate::rendering::Canvas;
use crate::telemetry::TelemetrySnapshot;

const START_DEG: f32 = 135.0;
const SWEEP_DEG: f32 = 270.0;
const TRACK_COLOR: u32 = 0x303030;
const VALUE_COLOR: u32 = 0xF0F0F0;
const NEEDLE_COLOR: u32 = 0xFF8C00;

/// 270 degree dial with a needle.
#[derive(Debug)]
pub struct DialGauge {
    address: Option<u32>,
}

impl DialGauge {
    /// Follows `address`, or the lowest address in the snapshot when `None`.
    pub fn new(address: Option<u32>) -> Self {
        Self { address }
    }

    fn value(&self, telemetry: &TelemetrySnapshot) -> Option<u32> {
        match self.address {
            Some(address) => telemetry.get(address),
            None => telemetry.iter().next().map(|(_, v)| v),
        }
    }
}

impl Gauge for DialGauge {
    fn name(&self) -> &str {
        "dial"
    }

    fn render(&self, canvas: &mut Canvas, telemetry: &TelemetrySnapshot) {
        let (width, height) = canvas.dimensions();
        canvas.set_background(0x000000);
        canvas.clear();

        let cx = width as f32 / 2.0;
        let cy = height as f32 / 2.0;
        let radius = (width.min(height) as f32 / 2.0 - 16.0).max(4.0);

        canvas.draw_arc(cx, cy, radius, START_DEG, SWEEP_DEG, 10.0, TRACK_COLOR);

        // Ticks every tenth of full scale
        for i in 0..=10 {
            let angle = (START_DEG + SWEEP_DEG * i as f32 / 10.0).to_radians();
            let outer = radius + 8.0;
            let inner = radius + 2.0;
            canvas.draw_line(
                (cx + inner * angle.cos(), cy + inner * angle.sin()),
                (cx + outer * angle.cos(), cy + outer * angle.sin()),
                2.0,
                VALUE_COLOR,
            );
        }

        let Some(value) = self.value(telemetry) else {
            return;
        };
        let sweep = SWEEP_DEG * fraction(value);
        canvas.draw_arc(cx, cy, radius, START_DEG, sweep, 10.0, VALUE_COLOR);

        let angle = (START_DEG + sweep).to_radians();
        let tip = radius - 12.0;
        canvas.draw_line(
            (cx, cy),
            (cx + tip * angle.cos(), cy + tip * angle.sin()),
            4.0,
            NEEDLE_COLOR,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::TelemetryState;

    fn render(gauge: &DialGauge, telemetry: &TelemetrySnapshot) -> Canvas {
        let mut canvas = Canvas::new(320, 240).unwrap();
        gauge.render(&mut canvas, telemetry);
        canvas
    }

    #[test]
    fn test_needle_follows_value() {
        let gauge = DialGauge::new(Some(0x10));
        let mut state = TelemetryState::new();

        // At zero the needle points at START_DEG (down-left); at full scale it
        // points down-right.
        state.update(0x10, 0);
        let low = render(&gauge, &state.snapshot());
        state.update(0x10, super::super::FULL_SCALE);
        let high = render(&gauge, &state.snapshot());

        let down_left = (160 - 40, 120 + 40);
        let down_right = (160 + 40, 120 + 40);
        assert_ne!(low.pixel(down_left.0, down_left.1), Some(0x000000));
        assert_eq!(low.pixel(down_right.0, down_right.1), Some(0x000000));
        assert_ne!(high.pixel(down_right.0, down_right.1), Some(0x000000));
        assert_eq!(high.pixel(down_left.0, down_left.1), Some(0x000000));
    }

    #[test]
    fn test_missing_value_draws_no_needle() {
        let gauge = DialGauge::new(Some(0x10));
        let canvas = render(&gauge, &TelemetrySnapshot::default());
        assert_eq!(canvas.pixel(160 - 40, 120 + 40), Some(0x000000));
    }
}
