//! Button bindings: timed keystrokes and protocol commands.

mod keys;
mod protocol;
mod store;

pub use keys::{KeyAction, KeySequence, KeyStep};
pub use protocol::ProtocolCommand;
pub use store::{BindingKey, BindingStore, KeyBinding, ProtocolBinding};
