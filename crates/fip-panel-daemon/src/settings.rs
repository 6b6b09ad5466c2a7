//! Line-oriented settings records for the binding tables.
//!
//! # Format
//!
//! ```text
//! # comment
//! KeyBinding{1SOFTBUTTON_1};;Drop flare;;A:Press@0ms,A:Release@50ms
//! ProtocolBinding{0KNOB_LEFT_INC_P2};;COM1 up;;UFC_COMM1_CHANNEL_SELECT INC|UFC_COMM1_CHANNEL_SELECT INC
//! ```
//!
//! The digit after the brace is the edge (`1` turned on, `0` turned off).
//! Export only writes bindings that do something, so inert protocol
//! bindings do not survive a round trip.

use fip_panel_hw::{ButtonIdentity, Edge};
use tracing::{debug, warn};

use crate::bindings::{
    BindingKey, BindingStore, KeyBinding, KeySequence, ProtocolBinding, ProtocolCommand,
};
use crate::error::{Error, Result};

/// Tag of keystroke records.
pub const KEY_TAG: &str = "KeyBinding{";

/// Tag of protocol command records.
pub const PROTOCOL_TAG: &str = "ProtocolBinding{";

/// Field separator.
const SEPARATOR: &str = ";;";

/// Separator between commands of one protocol record.
const COMMAND_SEPARATOR: &str = "|";

/// A record that could not be imported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportIssue {
    /// 1-based position in the input.
    pub line: usize,
    pub record: String,
    pub reason: String,
}

/// Outcome of an import.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub key_bindings: usize,
    pub protocol_bindings: usize,
    pub skipped: usize,
    pub issues: Vec<ImportIssue>,
}

impl ImportReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Serializes configured bindings, key records first.
pub fn export_all(store: &BindingStore) -> Vec<String> {
    let mut records = Vec::new();

    for (key, binding) in store.key_bindings() {
        if !binding.sequence.is_empty() {
            records.push(encode_key_record(key, binding));
        }
    }
    for (key, binding) in store.protocol_bindings() {
        if !binding.commands.is_empty() {
            records.push(encode_protocol_record(key, binding));
        }
    }

    debug!("Exported {} binding record(s)", records.len());
    records
}

/// Replaces the contents of `store` with the bindings in `records`.
///
/// Malformed records are collected in the report and logged; they never
/// stop the rest of the import.
pub fn import_all<I, S>(records: I, store: &mut BindingStore) -> ImportReport
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut report = ImportReport::default();
    store.reset();

    for (idx, record) in records.into_iter().enumerate() {
        let record = record.as_ref().trim_end_matches(['\r', '\n']);
        if record.trim().is_empty() || record.starts_with('#') || record.len() <= 2 {
            report.skipped += 1;
            continue;
        }

        let result = if record.starts_with(KEY_TAG) {
            decode_key_record(record).map(|(key, binding)| {
                store.restore_key_binding(key, binding);
                report.key_bindings += 1;
            })
        } else if record.starts_with(PROTOCOL_TAG) {
            decode_protocol_record(record).map(|(key, binding)| {
                store.restore_protocol_binding(key, binding);
                report.protocol_bindings += 1;
            })
        } else {
            Err(Error::parse(record, "unknown record tag"))
        };

        if let Err(e) = result {
            warn!("Skipping settings line {}: {}", idx + 1, e);
            report.issues.push(ImportIssue {
                line: idx + 1,
                record: record.to_string(),
                reason: e.to_string(),
            });
        }
    }

    store.touch();
    debug!(
        "Imported {} key and {} protocol binding(s), {} issue(s)",
        report.key_bindings,
        report.protocol_bindings,
        report.issues.len()
    );
    report
}

/// Encodes one key binding.
pub fn encode_key_record(key: BindingKey, binding: &KeyBinding) -> String {
    format!(
        "{}{}{}{}{}",
        encode_header(KEY_TAG, key),
        SEPARATOR,
        sanitize(&binding.information),
        SEPARATOR,
        binding.sequence
    )
}

/// Encodes one protocol binding.
pub fn encode_protocol_record(key: BindingKey, binding: &ProtocolBinding) -> String {
    let commands = binding
        .commands
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(COMMAND_SEPARATOR);
    format!(
        "{}{}{}{}{}",
        encode_header(PROTOCOL_TAG, key),
        SEPARATOR,
        sanitize(&binding.description),
        SEPARATOR,
        commands
    )
}

/// Decodes a `KeyBinding{...}` record.
pub fn decode_key_record(record: &str) -> Result<(BindingKey, KeyBinding)> {
    let (key, text, payload) = split_record(record, KEY_TAG)?;
    let sequence: KeySequence = payload
        .parse()
        .map_err(|e: Error| Error::parse(record, e.to_string()))?;
    if sequence.is_empty() {
        return Err(Error::parse(record, "empty key sequence"));
    }
    Ok((
        key,
        KeyBinding {
            sequence,
            information: text.to_string(),
        },
    ))
}

/// Decodes a `ProtocolBinding{...}` record.
pub fn decode_protocol_record(record: &str) -> Result<(BindingKey, ProtocolBinding)> {
    let (key, text, payload) = split_record(record, PROTOCOL_TAG)?;
    let commands = payload
        .split(COMMAND_SEPARATOR)
        .filter(|c| !c.trim().is_empty())
        .map(|c| {
            c.parse::<ProtocolCommand>()
                .map_err(|e| Error::parse(record, e.to_string()))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok((
        key,
        ProtocolBinding {
            commands,
            description: text.to_string(),
        },
    ))
}

fn encode_header(tag: &str, (button, edge): BindingKey) -> String {
    format!(
        "{}{}{}}}",
        tag,
        if edge.is_turned_on() { '1' } else { '0' },
        button
    )
}

/// Splits a record into its key, free text and payload.
fn split_record<'a>(record: &'a str, tag: &str) -> Result<(BindingKey, &'a str, &'a str)> {
    let body = record
        .strip_prefix(tag)
        .ok_or_else(|| Error::parse(record, "missing tag"))?;
    let (header, rest) = body
        .split_once('}')
        .ok_or_else(|| Error::parse(record, "unterminated header"))?;

    let mut chars = header.chars();
    let edge = match chars.next() {
        Some('1') => Edge::OnTurnedOn,
        Some('0') => Edge::OnTurnedOff,
        _ => return Err(Error::parse(record, "header must start with edge flag 0 or 1")),
    };
    let button: ButtonIdentity = chars
        .as_str()
        .parse()
        .map_err(|e: fip_panel_hw::Error| Error::parse(record, e.to_string()))?;

    let fields = rest
        .strip_prefix(SEPARATOR)
        .ok_or_else(|| Error::parse(record, "missing field separator"))?;
    let (text, payload) = fields
        .rsplit_once(SEPARATOR)
        .ok_or_else(|| Error::parse(record, "missing payload"))?;

    Ok(((button, edge), text, payload))
}

/// Keeps free text on one line and away from the separator.
fn sanitize(text: &str) -> String {
    text.replace(SEPARATOR, "; ").replace(['\r', '\n'], " ")
}
