//! Error types for the FIP Panel hardware library.

use thiserror::Error;

use crate::device::DeviceStatus;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when interacting with the panel.
#[derive(Error, Debug)]
pub enum Error {
    /// Absent or malformed argument (e.g. no source image).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The device adapter reported a non-success status.
    #[error("Device {op} failed: {status}")]
    Device {
        op: &'static str,
        status: DeviceStatus,
    },

    /// Frame buffer size mismatch.
    #[error("Frame size mismatch: expected {expected}, got {actual}")]
    FrameSize { expected: usize, actual: usize },

    /// Image processing or encoding error.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Unknown button name or code.
    #[error("Invalid button: {0}")]
    InvalidButton(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns the device status if this is a device failure.
    pub fn device_status(&self) -> Option<DeviceStatus> {
        match self {
            Error::Device { status, .. } => Some(*status),
            _ => None,
        }
    }
}
