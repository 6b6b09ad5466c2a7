//! Keystroke and protocol binding tables.
//!
//! Both tables share the `(ButtonIdentity, Edge)` key but stay separate maps:
//! a button event consults each of them independently.

use std::collections::HashMap;

use fip_panel_hw::{ButtonIdentity, Edge};
use tracing::debug;

use super::keys::KeySequence;
use super::protocol::ProtocolCommand;

/// Composite key shared by both tables.
pub type BindingKey = (ButtonIdentity, Edge);

/// Keystroke emulation bound to a button edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBinding {
    pub sequence: KeySequence,
    /// Free text shown next to the binding.
    pub information: String,
}

/// Protocol commands bound to a button edge.
///
/// An empty command list is a configured but inert binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolBinding {
    pub commands: Vec<ProtocolCommand>,
    pub description: String,
}

type Observer = Box<dyn Fn() + Send + Sync>;

/// Owner of every binding on one panel.
#[derive(Default)]
pub struct BindingStore {
    keys: HashMap<BindingKey, KeyBinding>,
    protocol: HashMap<BindingKey, ProtocolBinding>,
    dirty: bool,
    observer: Option<Observer>,
}

impl std::fmt::Debug for BindingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindingStore")
            .field("keys", &self.keys.len())
            .field("protocol", &self.protocol.len())
            .field("dirty", &self.dirty)
            .finish()
    }
}

impl BindingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the settings-changed observer called after every mutation.
    pub fn set_observer<F>(&mut self, observer: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.observer = Some(Box::new(observer));
    }

    /// Sets or clears the keystroke binding for a button edge.
    ///
    /// An empty sequence removes the binding. Any protocol binding on the same
    /// button edge loses its commands.
    pub fn set_key_binding(
        &mut self,
        button: ButtonIdentity,
        edge: Edge,
        sequence: KeySequence,
        information: &str,
    ) {
        if let Some(binding) = self.protocol.get_mut(&(button, edge)) {
            binding.commands.clear();
        }

        if sequence.is_empty() {
            self.keys.remove(&(button, edge));
            debug!("Key binding cleared for {} ({})", button, edge);
        } else {
            self.keys.insert(
                (button, edge),
                KeyBinding {
                    sequence,
                    information: information.to_string(),
                },
            );
            debug!("Key binding set for {} ({})", button, edge);
        }
        self.touch();
    }

    /// Sets the protocol binding for a button edge, replacing any previous one.
    ///
    /// Any keystroke binding on the same button edge is removed.
    pub fn set_protocol_binding(
        &mut self,
        button: ButtonIdentity,
        edge: Edge,
        commands: Vec<ProtocolCommand>,
        description: &str,
    ) {
        self.keys.remove(&(button, edge));
        debug!(
            "Protocol binding set for {} ({}): {} command(s)",
            button,
            edge,
            commands.len()
        );
        self.protocol.insert(
            (button, edge),
            ProtocolBinding {
                commands,
                description: description.to_string(),
            },
        );
        self.touch();
    }

    /// Removes every binding of `button` on both edges.
    ///
    /// Linear in the number of bindings.
    pub fn clear_all(&mut self, button: ButtonIdentity) {
        self.keys.retain(|(b, _), _| *b != button);
        self.protocol.retain(|(b, _), _| *b != button);
        debug!(
            "Cleared bindings for {}: {} key, {} protocol remaining",
            button,
            self.keys.len(),
            self.protocol.len()
        );
        self.touch();
    }

    /// Removes everything.
    pub fn clear(&mut self) {
        self.reset();
        self.touch();
    }

    pub fn lookup_key(&self, button: ButtonIdentity, edge: Edge) -> Option<KeySequence> {
        self.keys.get(&(button, edge)).map(|b| b.sequence.clone())
    }

    pub fn lookup_protocol(
        &self,
        button: ButtonIdentity,
        edge: Edge,
    ) -> Option<Vec<ProtocolCommand>> {
        self.protocol.get(&(button, edge)).map(|b| b.commands.clone())
    }

    pub fn key_binding(&self, button: ButtonIdentity, edge: Edge) -> Option<&KeyBinding> {
        self.keys.get(&(button, edge))
    }

    pub fn protocol_binding(&self, button: ButtonIdentity, edge: Edge) -> Option<&ProtocolBinding> {
        self.protocol.get(&(button, edge))
    }

    /// Key bindings ordered by button code, then edge.
    pub fn key_bindings(&self) -> Vec<(BindingKey, &KeyBinding)> {
        let mut entries: Vec<_> = self.keys.iter().map(|(k, v)| (*k, v)).collect();
        entries.sort_by_key(|((button, edge), _)| (button.code(), *edge));
        entries
    }

    /// Protocol bindings ordered by button code, then edge.
    pub fn protocol_bindings(&self) -> Vec<(BindingKey, &ProtocolBinding)> {
        let mut entries: Vec<_> = self.protocol.iter().map(|(k, v)| (*k, v)).collect();
        entries.sort_by_key(|((button, edge), _)| (button.code(), *edge));
        entries
    }

    /// Pressed keys of every sequence bound to `button`, for log lines.
    pub fn describe_keys(&self, button: ButtonIdentity) -> String {
        self.key_bindings()
            .into_iter()
            .filter(|((b, _), _)| *b == button)
            .map(|(_, binding)| binding.sequence.pressed_keys().join("+"))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty() && self.protocol.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// Empties both tables without notifying.
    pub(crate) fn reset(&mut self) {
        self.keys.clear();
        self.protocol.clear();
    }

    /// Flags unsaved changes again after a failed save.
    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Upserts a key binding without touching the other table or notifying.
    ///
    /// Used while importing; callers finish with [`BindingStore::touch`].
    pub(crate) fn restore_key_binding(&mut self, key: BindingKey, binding: KeyBinding) {
        if binding.sequence.is_empty() {
            self.keys.remove(&key);
        } else {
            self.keys.insert(key, binding);
        }
    }

    /// Upserts a protocol binding without touching the other table or notifying.
    pub(crate) fn restore_protocol_binding(&mut self, key: BindingKey, binding: ProtocolBinding) {
        self.protocol.insert(key, binding);
    }

    /// Marks settings dirty and notifies the observer.
    pub(crate) fn touch(&mut self) {
        self.dirty = true;
        if let Some(observer) = &self.observer {
            observer();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fip_panel_hw::{PanelControl, ProfilePage};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const S1: ButtonIdentity = ButtonIdentity::new(PanelControl::SoftButton1);
    const S2: ButtonIdentity = ButtonIdentity::new(PanelControl::SoftButton2);

    fn tap(key: &str) -> KeySequence {
        KeySequence::tap(key, std::time::Duration::from_millis(50)).unwrap()
    }

    fn cmd(text: &str) -> ProtocolCommand {
        text.parse().unwrap()
    }

    #[test]
    fn test_key_upsert_overwrites() {
        let mut store = BindingStore::new();
        store.set_key_binding(S1, Edge::OnTurnedOn, tap("A"), "first");
        store.set_key_binding(S1, Edge::OnTurnedOn, tap("B"), "second");

        assert_eq!(store.key_bindings().len(), 1);
        assert_eq!(store.lookup_key(S1, Edge::OnTurnedOn), Some(tap("B")));
        assert_eq!(
            store.key_binding(S1, Edge::OnTurnedOn).unwrap().information,
            "second"
        );
    }

    #[test]
    fn test_empty_sequence_clears() {
        let mut store = BindingStore::new();
        store.set_key_binding(S1, Edge::OnTurnedOn, tap("A"), "");
        store.set_key_binding(S1, Edge::OnTurnedOff, tap("B"), "");
        store.set_key_binding(S1, Edge::OnTurnedOn, KeySequence::default(), "");

        assert_eq!(store.lookup_key(S1, Edge::OnTurnedOn), None);
        assert_eq!(store.lookup_key(S1, Edge::OnTurnedOff), Some(tap("B")));
    }

    #[test]
    fn test_empty_protocol_list_is_kept() {
        let mut store = BindingStore::new();
        store.set_protocol_binding(S1, Edge::OnTurnedOn, vec![], "inert");

        assert_eq!(store.lookup_protocol(S1, Edge::OnTurnedOn), Some(vec![]));
        assert_eq!(store.lookup_protocol(S1, Edge::OnTurnedOff), None);
    }

    #[test]
    fn test_setters_clear_the_other_table() {
        let mut store = BindingStore::new();
        store.set_protocol_binding(S1, Edge::OnTurnedOn, vec![cmd("GEAR TOGGLE")], "gear");
        store.set_key_binding(S1, Edge::OnTurnedOn, tap("G"), "");
        assert_eq!(store.lookup_protocol(S1, Edge::OnTurnedOn), Some(vec![]));

        store.set_protocol_binding(S1, Edge::OnTurnedOn, vec![cmd("GEAR TOGGLE")], "gear");
        assert_eq!(store.lookup_key(S1, Edge::OnTurnedOn), None);

        // Other edges are untouched
        store.set_key_binding(S1, Edge::OnTurnedOff, tap("H"), "");
        assert_eq!(
            store.lookup_protocol(S1, Edge::OnTurnedOn),
            Some(vec![cmd("GEAR TOGGLE")])
        );
    }

    #[test]
    fn test_clear_all_only_hits_button() {
        let mut store = BindingStore::new();
        let s1_p1 = ButtonIdentity::on_page(PanelControl::SoftButton1, ProfilePage::P1);
        store.set_key_binding(S1, Edge::OnTurnedOn, tap("A"), "");
        store.set_key_binding(S1, Edge::OnTurnedOff, tap("B"), "");
        store.set_protocol_binding(S1, Edge::OnTurnedOn, vec![], "");
        store.set_key_binding(S2, Edge::OnTurnedOn, tap("C"), "");
        store.set_key_binding(s1_p1, Edge::OnTurnedOn, tap("D"), "");

        store.clear_all(S1);

        assert_eq!(store.lookup_key(S1, Edge::OnTurnedOn), None);
        assert_eq!(store.lookup_key(S1, Edge::OnTurnedOff), None);
        assert_eq!(store.lookup_protocol(S1, Edge::OnTurnedOn), None);
        assert_eq!(store.lookup_key(S2, Edge::OnTurnedOn), Some(tap("C")));
        assert_eq!(store.lookup_key(s1_p1, Edge::OnTurnedOn), Some(tap("D")));
    }

    #[test]
    fn test_every_mutation_notifies() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut store = BindingStore::new();
        let seen = count.clone();
        store.set_observer(move || {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        assert!(!store.is_dirty());
        store.set_key_binding(S1, Edge::OnTurnedOn, tap("A"), "");
        store.set_protocol_binding(S2, Edge::OnTurnedOn, vec![], "");
        store.clear_all(S1);
        store.clear();

        assert_eq!(count.load(Ordering::SeqCst), 4);
        assert!(store.is_dirty());
        store.mark_clean();
        assert!(!store.is_dirty());
    }

    #[test]
    fn test_snapshots_are_ordered() {
        let mut store = BindingStore::new();
        store.set_key_binding(S2, Edge::OnTurnedOn, tap("B"), "");
        store.set_key_binding(S1, Edge::OnTurnedOff, tap("A"), "");
        store.set_key_binding(S1, Edge::OnTurnedOn, tap("A"), "");

        let order: Vec<_> = store.key_bindings().into_iter().map(|(k, _)| k).collect();
        assert_eq!(
            order,
            vec![
                (S1, Edge::OnTurnedOn),
                (S1, Edge::OnTurnedOff),
                (S2, Edge::OnTurnedOn)
            ]
        );
        assert_eq!(store.describe_keys(S1), "A A");
    }
}
