//! Protocol control commands sent to the simulation.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// A single `CONTROL ARGUMENT` instruction, e.g. `AHCP_MASTER_ARM TOGGLE`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProtocolCommand {
    control: String,
    argument: String,
}

impl ProtocolCommand {
    pub fn new(control: &str, argument: &str) -> Result<Self> {
        let control = control.trim();
        let argument = argument.trim();
        if control.is_empty()
            || !control
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(Error::parse(control, "invalid control identifier"));
        }
        if argument.is_empty() || argument.contains(['|', ';', '\n', '\r']) {
            return Err(Error::parse(argument, "invalid command argument"));
        }
        Ok(Self {
            control: control.to_string(),
            argument: argument.to_string(),
        })
    }

    pub fn control(&self) -> &str {
        &self.control
    }

    pub fn argument(&self) -> &str {
        &self.argument
    }

    /// Line sent over the wire.
    pub fn to_wire(&self) -> String {
        format!("{} {}\n", self.control, self.argument)
    }
}

impl fmt::Display for ProtocolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.control, self.argument)
    }
}

impl FromStr for ProtocolCommand {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (control, argument) = s
            .split_once(char::is_whitespace)
            .ok_or_else(|| Error::parse(s, "expected 'CONTROL ARGUMENT'"))?;
        Self::new(control, argument)
    }
}
