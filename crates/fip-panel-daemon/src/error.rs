//! Error types for the panel daemon.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the panel state and binding engine.
#[derive(Error, Debug)]
pub enum Error {
    /// Absent or malformed argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Device adapter or image pipeline failure.
    #[error(transparent)]
    Device(#[from] fip_panel_hw::Error),

    /// Malformed settings record or binding text.
    #[error("Cannot parse '{record}': {reason}")]
    Parse { record: String, reason: String },

    /// The panel has been shut down.
    #[error("Panel is closed")]
    Closed,

    /// Operation not valid in the current controller state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Builds a parse error for a record.
    pub fn parse(record: &str, reason: impl Into<String>) -> Self {
        Error::Parse {
            record: record.to_string(),
            reason: reason.into(),
        }
    }
}
