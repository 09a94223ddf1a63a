//! Translation seam between the input/display pipelines and a braille
//! translation engine.
//!
//! Back-translation is callback-shaped in every real engine binding, so the
//! seam models it as an explicit completion message: the caller hands the
//! engine a [`TranslationSink`] stamped with the entry-state generation and a
//! per-state sequence number, and the engine fires it whenever it finishes.
//! The consumer drains completions from the paired channel and discards any
//! stamp that no longer matches — that single check covers both the teardown
//! race (the entry state died while a translation was in flight) and
//! out-of-order delivery (an older completion must not clobber a newer edit).

use tokio::sync::mpsc::UnboundedSender;

pub mod diff;
pub mod expanding;
pub mod letter;

pub use expanding::{ExpandingForwardTranslator, ExpansionType};
pub use letter::LetterTranslator;

/// Result of forward-translating text into cells, with both position maps.
///
/// `text_to_cell[i]` is the cell index where character `i` starts;
/// `cell_to_text[j]` is the character index cell `j` came from. Both maps are
/// monotonically non-decreasing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ForwardTranslation {
    pub cells: Vec<u8>,
    pub text_to_cell: Vec<usize>,
    pub cell_to_text: Vec<usize>,
}

/// Text → cells. `None` means the engine failed; callers keep whatever they
/// displayed before.
pub trait ForwardTranslator: Send + Sync {
    fn forward_translate(&self, text: &str) -> Option<ForwardTranslation>;
}

/// Cells → text, completion delivered through `sink`. Implementations may
/// complete synchronously before returning or asynchronously from another
/// task; consumers must not assume either.
pub trait BackTranslator: Send + Sync {
    fn back_translate(&self, cells: &[u8], sink: TranslationSink);
}

/// A finished back-translation, stamped with the identity of the request.
/// `text` is `None` when the engine failed.
#[derive(Debug, Clone)]
pub struct TranslationDone {
    pub generation: u64,
    pub seq: u64,
    pub text: Option<String>,
}

/// One-shot completion handle for a single back-translation request.
#[derive(Debug)]
pub struct TranslationSink {
    generation: u64,
    seq: u64,
    tx: UnboundedSender<TranslationDone>,
}

impl TranslationSink {
    pub fn new(generation: u64, seq: u64, tx: UnboundedSender<TranslationDone>) -> Self {
        Self {
            generation,
            seq,
            tx,
        }
    }

    /// Deliver the completion. A closed receiver means the session is gone;
    /// the completion is dropped silently.
    pub fn complete(self, text: Option<String>) {
        let done = TranslationDone {
            generation: self.generation,
            seq: self.seq,
            text,
        };
        if self.tx.send(done).is_err() {
            tracing::trace!(target: "translate.sink", "completion dropped, receiver closed");
        }
    }
}
