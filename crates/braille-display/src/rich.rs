//! Annotated editor content.
//!
//! The IME reports the focused field as text plus typed sub-ranges: the
//! editable value, the selection nested inside it, and a zero-width writable
//! marker the display pipeline inserts to host uncommitted preview cells.
//! Offsets are character positions, the unit shared with the translation
//! position maps.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpanKind {
    /// The editable value of the focused field.
    Value,
    /// The selection inside the value; collapsed means caret.
    Selection,
    /// Zero-width writable marker carrying uncommitted preview cells.
    Cells(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub kind: SpanKind,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RichText {
    pub text: String,
    pub spans: Vec<Span>,
}

impl RichText {
    /// Non-editable content: no value, no selection.
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            spans: Vec::new(),
        }
    }

    /// An editable field whose whole text is the value, with a selection at
    /// the given character offsets.
    pub fn editable(value: impl Into<String>, sel_start: usize, sel_end: usize) -> Self {
        let text: String = value.into();
        let len = text.chars().count();
        Self {
            spans: vec![
                Span {
                    kind: SpanKind::Value,
                    start: 0,
                    end: len,
                },
                Span {
                    kind: SpanKind::Selection,
                    start: sel_start,
                    end: sel_end,
                },
            ],
            text,
        }
    }

    pub fn value(&self) -> Option<&Span> {
        self.spans.iter().find(|s| s.kind == SpanKind::Value)
    }

    pub fn selection(&self) -> Option<&Span> {
        self.spans.iter().find(|s| s.kind == SpanKind::Selection)
    }
}

/// Slice `text` by character positions `[a, b)`.
pub(crate) fn char_range(text: &str, a: usize, b: usize) -> &str {
    let mut indices = text.char_indices().map(|(i, _)| i);
    let start = indices.by_ref().nth(a).unwrap_or(text.len());
    let end = if b > a {
        indices.nth(b - a - 1).unwrap_or(text.len())
    } else {
        start
    };
    &text[start..end]
}
