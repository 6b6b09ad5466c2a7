//! Gauges drawn on panel pages.
//!
//! Each page shows one gauge, chosen by name in the page configuration.
//! Gauges draw shapes only and read live values from a telemetry snapshot.

mod bars;
mod dial;
mod splash;

pub use bars::BarsGauge;
pub use dial::DialGauge;
pub use splash::SplashGauge;

use crate::rendering::Canvas;
use crate::telemetry::TelemetrySnapshot;

/// Full scale of a 16-bit telemetry value.
pub const FULL_SCALE: u32 = 0xFFFF;

/// Trait for all gauges.
pub trait Gauge: Send + Sync {
    /// Returns the name of the gauge.
    fn name(&self) -> &str;

    /// Renders the gauge onto the canvas.
    fn render(&self, canvas: &mut Canvas, telemetry: &TelemetrySnapshot);
}

/// Fraction of full scale, clamped to `0.0..=1.0`.
pub(crate) fn fraction(value: u32) -> f32 {
    (value.min(FULL_SCALE) as f32) / FULL_SCALE as f32
}

fn parse_address(text: &str) -> Option<u32> {
    let text = text.trim();
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}

/// Creates a gauge by name.
///
/// `dial` and `bars` accept an address suffix, e.g. `dial:0x1000` or
/// `bars:0x2000`; without one the dial follows the lowest address seen and
/// the bars start at address 0.
pub fn create_gauge(name: &str) -> Option<Box<dyn Gauge>> {
    let lower = name.trim().to_lowercase();
    let (kind, address) = match lower.split_once(':') {
        Some((kind, address)) => (kind.to_string(), Some(parse_address(address)?)),
        None => (lower, None),
    };
    match kind.as_str() {
        "splash" => Some(Box::new(SplashGauge::new())),
        "dial" => Some(Box::new(DialGauge::new(address))),
        "bars" => Some(Box::new(BarsGauge::new(address.unwrap_or(0)))),
        _ => None,
    }
}

/// Returns a list of available gauge names.
pub fn available_gauges() -> Vec<&'static str> {
    vec!["splash", "dial", "bars"]
}
