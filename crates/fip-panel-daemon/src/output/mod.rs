//! Destinations for bound actions.

mod command;
mod keyboard;

pub use command::{CommandSink, UdpCommandSink};
pub use keyboard::{play_sequence, KeyEmitter, LogKeyEmitter};

#[cfg(test)]
pub use command::RecordingCommandSink;
#[cfg(test)]
pub use keyboard::RecordingKeyEmitter;
