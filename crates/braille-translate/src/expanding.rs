//! Expanding forward translation.
//!
//! Contracted braille is unreadable while it is being edited: the word under
//! the cursor keeps changing shape as contractions form and dissolve. The
//! expanding translator therefore renders a chosen region uncontracted and
//! the rest with the default (usually contracted) translator, stitching the
//! per-segment position maps into one consistent pair.

use crate::{ForwardTranslation, ForwardTranslator};
use std::sync::Arc;

/// How much of the field to render uncontracted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpansionType {
    /// Whole field with the default translator.
    None,
    /// The word at the focus position uncontracted, the rest default.
    Selection,
    /// Whole field uncontracted.
    All,
}

pub struct ExpandingForwardTranslator {
    default: Arc<dyn ForwardTranslator>,
    uncontracted: Arc<dyn ForwardTranslator>,
}

impl ExpandingForwardTranslator {
    pub fn new(
        default: Arc<dyn ForwardTranslator>,
        uncontracted: Arc<dyn ForwardTranslator>,
    ) -> Self {
        Self {
            default,
            uncontracted,
        }
    }

    /// Translate `text`, expanding according to `expansion`. `focus_char` is
    /// the character position of the selection start and only matters for
    /// `Selection` expansion.
    pub fn translate(
        &self,
        text: &str,
        focus_char: usize,
        expansion: ExpansionType,
    ) -> Option<ForwardTranslation> {
        match expansion {
            ExpansionType::None => self.default.forward_translate(text),
            ExpansionType::All => self.uncontracted.forward_translate(text),
            ExpansionType::Selection => {
                let Some((start, end)) = word_bounds(text, focus_char) else {
                    // Focus is surrounded by whitespace; nothing to expand.
                    return self.default.forward_translate(text);
                };
                tracing::trace!(
                    target: "translate.expand",
                    word_start = start,
                    word_end = end,
                    "expanding word at focus"
                );
                let mut out = ForwardTranslation::default();
                let n = text.chars().count();
                let segments: [(usize, usize, &dyn ForwardTranslator); 3] = [
                    (0, start, self.default.as_ref()),
                    (start, end, self.uncontracted.as_ref()),
                    (end, n, self.default.as_ref()),
                ];
                for (a, b, translator) in segments {
                    if a == b {
                        continue;
                    }
                    let seg = translator.forward_translate(char_slice(text, a, b))?;
                    append_segment(&mut out, seg, a);
                }
                Some(out)
            }
        }
    }
}

/// Character bounds of the maximal non-whitespace run containing `focus`, or
/// ending immediately before it. `None` when the focus touches no word.
fn word_bounds(text: &str, focus: usize) -> Option<(usize, usize)> {
    let chars: Vec<char> = text.chars().collect();
    let n = chars.len();
    let focus = focus.min(n);
    let anchor = if focus < n && !chars[focus].is_whitespace() {
        focus
    } else if focus > 0 && !chars[focus - 1].is_whitespace() {
        focus - 1
    } else {
        return None;
    };
    let mut start = anchor;
    while start > 0 && !chars[start - 1].is_whitespace() {
        start -= 1;
    }
    let mut end = anchor + 1;
    while end < n && !chars[end].is_whitespace() {
        end += 1;
    }
    Some((start, end))
}

fn char_slice(text: &str, a: usize, b: usize) -> &str {
    let mut indices = text.char_indices().map(|(i, _)| i);
    let start = indices.by_ref().nth(a).unwrap_or(text.len());
    let end = if b > a {
        indices.nth(b - a - 1).unwrap_or(text.len())
    } else {
        start
    };
    &text[start..end]
}

fn append_segment(out: &mut ForwardTranslation, seg: ForwardTranslation, char_base: usize) {
    let cell_base = out.cells.len();
    out.cells.extend_from_slice(&seg.cells);
    out.text_to_cell
        .extend(seg.text_to_cell.iter().map(|&c| c + cell_base));
    out.cell_to_text
        .extend(seg.cell_to_text.iter().map(|&t| t + char_base));
    debug_assert_eq!(out.text_to_cell.len(), char_base + seg.text_to_cell.len());
}
