//! Keystroke emulation.

use tokio::time::{sleep_until, Instant};
use tracing::{debug, info};

use crate::bindings::{KeyAction, KeySequence};

/// Receives individual key events from a playing sequence.
pub trait KeyEmitter: Send + Sync {
    fn emit(&self, key: &str, action: KeyAction);
}

/// Logs keystrokes instead of injecting them into the host.
#[derive(Debug, Default)]
pub struct LogKeyEmitter;

impl KeyEmitter for LogKeyEmitter {
    fn emit(&self, key: &str, action: KeyAction) {
        info!("Key {} {}", key, action);
    }
}

/// Keeps every emitted event with its time offset.
#[cfg(test)]
#[derive(Debug)]
pub struct RecordingKeyEmitter {
    origin: Instant,
    events: std::sync::Mutex<Vec<(String, KeyAction, std::time::Duration)>>,
}

#[cfg(test)]
impl RecordingKeyEmitter {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            events: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Events as `(key, action, elapsed since creation)`.
    pub fn events(&self) -> Vec<(String, KeyAction, std::time::Duration)> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
impl Default for RecordingKeyEmitter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
impl KeyEmitter for RecordingKeyEmitter {
    fn emit(&self, key: &str, action: KeyAction) {
        if let Ok(mut events) = self.events.lock() {
            events.push((key.to_string(), action, self.origin.elapsed()));
        }
    }
}

/// Plays a sequence, emitting each step at its offset from now.
pub async fn play_sequence(emitter: &dyn KeyEmitter, sequence: &KeySequence) {
    let start = Instant::now();
    debug!(
        "Playing {} key step(s) over {:?}",
        sequence.len(),
        sequence.duration()
    );
    for step in sequence.steps() {
        sleep_until(start + step.at()).await;
        emitter.emit(step.key(), step.action());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings::KeyStep;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_steps_follow_offsets() {
        let emitter = RecordingKeyEmitter::new();
        let sequence = KeySequence::new(vec![
            KeyStep::release("LSHIFT", 120).unwrap(),
            KeyStep::press("LSHIFT", 0).unwrap(),
            KeyStep::press("F", 40).unwrap(),
            KeyStep::release("F", 80).unwrap(),
        ]);

        play_sequence(&emitter, &sequence).await;

        assert_eq!(
            emitter.events(),
            vec![
                ("LSHIFT".to_string(), KeyAction::Press, Duration::ZERO),
                ("F".to_string(), KeyAction::Press, Duration::from_millis(40)),
                ("F".to_string(), KeyAction::Release, Duration::from_millis(80)),
                ("LSHIFT".to_string(), KeyAction::Release, Duration::from_millis(120)),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_sequence_emits_nothing() {
        let emitter = RecordingKeyEmitter::new();
        play_sequence(&emitter, &KeySequence::default()).await;
        assert!(emitter.events().is_empty());
    }
}
