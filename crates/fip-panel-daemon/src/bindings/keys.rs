//! Timed keystroke sequences.
//!
//! # Syntax
//!
//! ```text
//! A:Press@0ms,A:Release@50ms         press A, release it 50ms later
//! LCONTROL:Press@0ms,C:Press@10ms,C:Release@60ms,LCONTROL:Release@70ms
//! ```
//!
//! Each step carries its offset from the start of the sequence. Steps are
//! kept in offset order; steps sharing an offset keep their written order.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};

/// Direction of a key event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyAction {
    Press,
    Release,
}

impl fmt::Display for KeyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyAction::Press => write!(f, "Press"),
            KeyAction::Release => write!(f, "Release"),
        }
    }
}

impl FromStr for KeyAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "press" | "down" => Ok(KeyAction::Press),
            "release" | "up" => Ok(KeyAction::Release),
            other => Err(Error::parse(
                s,
                format!("unknown key action '{}' (expected Press or Release)", other),
            )),
        }
    }
}

/// One key event at an offset from the start of its sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyStep {
    key: String,
    action: KeyAction,
    at: Duration,
}

impl KeyStep {
    /// Creates a step; key names are upper-cased virtual key names.
    pub fn new(key: &str, action: KeyAction, at: Duration) -> Result<Self> {
        let key = key.trim();
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(Error::parse(key, "invalid key name"));
        }
        Ok(Self {
            key: key.to_ascii_uppercase(),
            action,
            at,
        })
    }

    pub fn press(key: &str, at_ms: u64) -> Result<Self> {
        Self::new(key, KeyAction::Press, Duration::from_millis(at_ms))
    }

    pub fn release(key: &str, at_ms: u64) -> Result<Self> {
        Self::new(key, KeyAction::Release, Duration::from_millis(at_ms))
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn action(&self) -> KeyAction {
        self.action
    }

    pub fn at(&self) -> Duration {
        self.at
    }
}

impl fmt::Display for KeyStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}@{}ms", self.key, self.action, self.at.as_millis())
    }
}

impl FromStr for KeyStep {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (event, offset) = s
            .split_once('@')
            .ok_or_else(|| Error::parse(s, "missing '@<offset>ms'"))?;
        let (key, action) = event
            .split_once(':')
            .ok_or_else(|| Error::parse(s, "missing ':Press' or ':Release'"))?;
        let millis = offset
            .trim()
            .strip_suffix("ms")
            .and_then(|n| n.trim().parse::<u64>().ok())
            .ok_or_else(|| Error::parse(s, format!("invalid offset '{}'", offset)))?;
        Self::new(key, action.parse()?, Duration::from_millis(millis))
    }
}

/// Ordered keystroke steps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct KeySequence {
    steps: Vec<KeyStep>,
}

impl KeySequence {
    pub fn new(mut steps: Vec<KeyStep>) -> Self {
        steps.sort_by_key(|s| s.at);
        Self { steps }
    }

    /// Press and release of a single key, `hold` apart.
    pub fn tap(key: &str, hold: Duration) -> Result<Self> {
        Ok(Self::new(vec![
            KeyStep::new(key, KeyAction::Press, Duration::ZERO)?,
            KeyStep::new(key, KeyAction::Release, hold)?,
        ]))
    }

    pub fn steps(&self) -> &[KeyStep] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Offset of the final step.
    pub fn duration(&self) -> Duration {
        self.steps.last().map(|s| s.at).unwrap_or_default()
    }

    /// Keys pressed by this sequence, for log lines.
    pub fn pressed_keys(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter(|s| s.action == KeyAction::Press)
            .map(|s| s.key.as_str())
            .collect()
    }
}

impl fmt::Display for KeySequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", step)?;
        }
        Ok(())
    }
}

impl FromStr for KeySequence {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(Self::default());
        }
        let steps = s
            .split(',')
            .map(str::parse)
            .collect::<Result<Vec<KeyStep>>>()?;
        Ok(Self::new(steps))
    }
}
