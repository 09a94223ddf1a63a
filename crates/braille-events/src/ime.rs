//! IME wire protocol.
//!
//! Both directions are closed serde-tagged enums matched exhaustively at both
//! ends; the JSON layout (`{"type": "replaceText", ...}`) is fixed by the
//! input-method host. Edits are fire-and-forget; only the backspace round trip
//! carries a request id and expects an answer.

use serde::{Deserialize, Serialize};

/// Editing context of the focused field, supplied by the IME. Replaced
/// wholesale on every `inputContext` message; replacement invalidates any
/// in-progress cell entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputContext {
    pub context_id: String,
    /// Field-type tag such as "text", "url", "email". URL and email fields
    /// are always entered uncontracted.
    pub field_type: String,
}

impl InputContext {
    pub fn new(context_id: impl Into<String>, field_type: impl Into<String>) -> Self {
        Self {
            context_id: context_id.into(),
            field_type: field_type.into(),
        }
    }

    /// Whether this field type is entered uncontracted regardless of the
    /// surrounding text.
    pub fn always_uncontracted(&self) -> bool {
        matches!(self.field_type.as_str(), "url" | "email")
    }
}

/// Messages posted to the IME.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ImeOutbound {
    /// Delete `delete_before` characters before the cursor, then insert
    /// `new_text` at the cursor.
    #[serde(rename_all = "camelCase")]
    ReplaceText {
        context_id: String,
        delete_before: usize,
        new_text: String,
    },
    /// Replace the uncommitted preview text (deferred entry only).
    #[serde(rename_all = "camelCase")]
    SetUncommitted { context_id: String, text: String },
    /// Finalize the current uncommitted preview into the field.
    #[serde(rename_all = "camelCase")]
    CommitUncommitted { context_id: String },
    /// Answer to an inbound `backspace` request.
    #[serde(rename_all = "camelCase")]
    KeyEventHandled { request_id: u64, result: bool },
}

/// Messages received from the IME.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ImeInbound {
    /// The IME engine became active or inactive.
    ActiveState { active: bool },
    /// Focus moved; `None` when no editable field has focus.
    InputContext { context: Option<InputContext> },
    /// A dots pattern forwarded by the IME itself.
    BrailleDots { dots: u8 },
    /// Backspace pressed inside the IME. Must be answered with
    /// `KeyEventHandled` carrying the same `request_id`; never re-synthesized
    /// as an OS key press, which would loop back into the IME.
    #[serde(rename_all = "camelCase")]
    Backspace { request_id: u64 },
    /// Unconditionally discard any in-progress cell entry.
    Reset,
}

impl ImeInbound {
    /// Parse one inbound message. Anything malformed or unknown is logged
    /// and discarded; the connection stays up.
    pub fn parse(json: &str) -> Option<Self> {
        match serde_json::from_str(json) {
            Ok(msg) => Some(msg),
            Err(err) => {
                tracing::warn!(target: "input.ime", %err, "malformed ime message ignored");
                None
            }
        }
    }
}
