//! FIP Panel Hardware Library
//!
//! Provides the raster format, image normalization, button identities and the
//! device adapter seam for multi-page flight instrument panels (320x240 display,
//! six soft buttons, two rotary knobs and page up/down).

pub mod buttons;
pub mod device;
pub mod error;
pub mod frame;
pub mod normalize;
pub mod sim;

pub use buttons::{ButtonIdentity, Edge, PanelControl, ProfilePage};
pub use device::{DeviceAdapter, DeviceEvent, DeviceStatus, EventSink};
pub use error::{Error, Result};
pub use frame::Frame;
pub use normalize::ImageNormalizer;
pub use sim::SimulatedDevice;

/// Display dimensions.
pub const FIP_WIDTH: u32 = 320;
pub const FIP_HEIGHT: u32 = 240;

/// Reference aspect ratio deciding whether width or height limits a thumbnail.
pub const FIP_ASPECT: f32 = FIP_WIDTH as f32 / FIP_HEIGHT as f32;

/// Bytes per packed pixel (24-bit BGR).
pub const BYTES_PER_PIXEL: usize = 3;
