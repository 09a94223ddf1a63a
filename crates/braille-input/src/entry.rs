//! Cell entry state: one uninterrupted run of typed cells.
//!
//! Two variants share the machinery. `Immediate` keeps the real field in sync
//! on every retranslation by diffing old against new text and posting one
//! delete-then-insert edit; because the IME echoes the field back
//! asynchronously, every edit first records the text-before-cursor strings it
//! expects to observe, so a later echo can be told apart from external
//! interference. `Deferred` never touches the real field per keystroke; it
//! posts uncommitted previews and finalizes in one step on commit.
//!
//! Translation completions arrive out of band, stamped with this state's
//! generation and a per-request sequence number. A completion whose sequence
//! is not newer than the last applied one is dropped, which keeps edits in
//! logical request order no matter how the engine schedules its callbacks.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::Ordering::Relaxed;

use braille_events::{
    BLANK_CELL, BrailleCell, EDITS_SENT, ENTRY_COMMITS, STALE_TRANSLATIONS_DROPPED,
    ime::ImeOutbound,
};
use braille_translate::diff::edit_between;
use braille_translate::{BackTranslator, TranslationDone, TranslationSink};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, trace, warn};

use crate::{InputEffect, Outbox};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EntryVariant {
    /// Edits the real field on every keystroke.
    Immediate,
    /// Previews text as uncommitted; finalizes on commit only.
    Deferred,
}

/// What remains of the state after `delete_last_cell`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EntryAfterDelete {
    Active,
    Empty,
}

/// Classification of an observed text-before-cursor change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TextChange {
    SelfCaused,
    External,
}

/// Outcome of applying a translation completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Applied {
    Ignored,
    Applied,
    /// The completion belonged to the finalizing (blank-cell) request; the
    /// coordinator must commit-and-clear.
    Finalize,
}

pub(crate) struct CellEntryState {
    variant: EntryVariant,
    translator: Arc<dyn BackTranslator>,
    translations: UnboundedSender<TranslationDone>,
    generation: u64,
    cells: Vec<BrailleCell>,
    /// Last applied back-translation of `cells`.
    text: String,
    /// Text-before-cursor strings we expect the IME to echo, oldest first.
    pending_echoes: VecDeque<String>,
    next_seq: u64,
    last_applied_seq: u64,
    /// Sequence of the blank-cell request, while one is in flight.
    final_seq: Option<u64>,
}

impl CellEntryState {
    pub(crate) fn new(
        variant: EntryVariant,
        translator: Arc<dyn BackTranslator>,
        translations: UnboundedSender<TranslationDone>,
        generation: u64,
    ) -> Self {
        Self {
            variant,
            translator,
            translations,
            generation,
            cells: Vec::new(),
            text: String::new(),
            pending_echoes: VecDeque::new(),
            next_seq: 0,
            last_applied_seq: 0,
            final_seq: None,
        }
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn uses_uncommitted_cells(&self) -> bool {
        self.variant == EntryVariant::Deferred
    }

    pub(crate) fn cells(&self) -> &[BrailleCell] {
        &self.cells
    }

    pub(crate) fn translator(&self) -> &Arc<dyn BackTranslator> {
        &self.translator
    }

    /// Push a cell and retranslate the whole sequence. A blank cell marks the
    /// pending request as finalizing: once its completion is applied, the
    /// coordinator commits and destroys this state.
    pub(crate) fn append_cell(&mut self, cell: BrailleCell) {
        self.cells.push(cell);
        let seq = self.issue_seq();
        if cell == BLANK_CELL {
            self.final_seq = Some(seq);
        }
        trace!(target: "input.entry", cells = self.cells.len(), seq, "append");
        self.dispatch(seq);
    }

    /// Pop the last cell. An emptied sequence sends an empty-text edit and
    /// reports `Empty` so the coordinator clears this state; otherwise the
    /// remainder is retranslated.
    pub(crate) fn delete_last_cell(
        &mut self,
        outbox: &Outbox<'_>,
        current_text_before: &str,
    ) -> EntryAfterDelete {
        self.cells.pop();
        self.final_seq = None;
        if self.cells.is_empty() {
            let old = std::mem::take(&mut self.text);
            self.send_text_change(&old, "", outbox, current_text_before);
            EntryAfterDelete::Empty
        } else {
            let seq = self.issue_seq();
            trace!(target: "input.entry", cells = self.cells.len(), seq, "delete");
            self.dispatch(seq);
            EntryAfterDelete::Active
        }
    }

    /// Match an observed text-before-cursor change against the expected
    /// echoes. A match consumes everything up to and including it, so a host
    /// that coalesces several edits into one notification is still
    /// recognized as self-caused.
    pub(crate) fn on_text_before_changed(&mut self, new_text: &str) -> TextChange {
        if let Some(pos) = self.pending_echoes.iter().position(|e| e == new_text) {
            self.pending_echoes.drain(..=pos);
            TextChange::SelfCaused
        } else {
            TextChange::External
        }
    }

    /// Apply a stamped completion for this state. Generation is checked by
    /// the coordinator; sequence is checked here.
    pub(crate) fn apply_translation(
        &mut self,
        done: &TranslationDone,
        outbox: &Outbox<'_>,
        current_text_before: &str,
    ) -> Applied {
        if done.seq <= self.last_applied_seq {
            STALE_TRANSLATIONS_DROPPED.fetch_add(1, Relaxed);
            trace!(target: "input.entry", seq = done.seq, "stale completion dropped");
            return Applied::Ignored;
        }
        self.last_applied_seq = done.seq;
        let Some(new_text) = done.text.as_deref() else {
            warn!(target: "input.entry", seq = done.seq, "back-translation failed, edit dropped");
            return Applied::Ignored;
        };
        let finalizes = self.final_seq == Some(done.seq);
        let old = std::mem::take(&mut self.text);
        self.send_text_change(&old, new_text, outbox, current_text_before);
        if self.uses_uncommitted_cells() && !finalizes {
            outbox.send(InputEffect::UncommittedCells(self.cells.clone()));
        }
        if finalizes { Applied::Finalize } else { Applied::Applied }
    }

    /// Finalize. Immediate entry is already committed edit by edit; deferred
    /// entry commits its preview and drops the preview cells.
    pub(crate) fn commit(&mut self, outbox: &Outbox<'_>) {
        ENTRY_COMMITS.fetch_add(1, Relaxed);
        debug!(target: "input.entry", cells = self.cells.len(), "commit");
        if self.variant == EntryVariant::Deferred {
            outbox.send_ime(ImeOutbound::CommitUncommitted {
                context_id: outbox.context_id().to_string(),
            });
            outbox.send(InputEffect::UncommittedCells(Vec::new()));
        }
    }

    fn issue_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn dispatch(&self, seq: u64) {
        let sink = TranslationSink::new(self.generation, seq, self.translations.clone());
        self.translator.back_translate(&self.cells, sink);
    }

    /// Record `new` as the current text and post the edit that produces it.
    /// For the immediate variant the expected echoes are chained off the most
    /// recent expectation (several edits can be in flight before the IME
    /// reports any of them); only when none is pending does the live
    /// text-before-cursor serve as the base.
    fn send_text_change(
        &mut self,
        old: &str,
        new: &str,
        outbox: &Outbox<'_>,
        current_text_before: &str,
    ) {
        match self.variant {
            EntryVariant::Immediate => {
                let edit = edit_between(old, new);
                if edit.is_empty() {
                    self.text = new.to_string();
                    return;
                }
                let mut expected = self
                    .pending_echoes
                    .back()
                    .cloned()
                    .unwrap_or_else(|| current_text_before.to_string());
                if edit.delete_before > 0 {
                    expected = drop_last_chars(&expected, edit.delete_before);
                    self.pending_echoes.push_back(expected.clone());
                }
                if !edit.insert.is_empty() {
                    expected.push_str(&edit.insert);
                    self.pending_echoes.push_back(expected);
                }
                trace!(
                    target: "input.entry",
                    delete_before = edit.delete_before,
                    insert_len = edit.insert.len(),
                    "replace_text"
                );
                outbox.send_ime(ImeOutbound::ReplaceText {
                    context_id: outbox.context_id().to_string(),
                    delete_before: edit.delete_before,
                    new_text: edit.insert,
                });
                EDITS_SENT.fetch_add(1, Relaxed);
            }
            EntryVariant::Deferred => {
                trace!(target: "input.entry", text_len = new.len(), "set_uncommitted");
                outbox.send_ime(ImeOutbound::SetUncommitted {
                    context_id: outbox.context_id().to_string(),
                    text: new.to_string(),
                });
                EDITS_SENT.fetch_add(1, Relaxed);
            }
        }
        self.text = new.to_string();
    }
}

fn drop_last_chars(s: &str, n: usize) -> String {
    let keep = s.chars().count().saturating_sub(n);
    s.chars().take(keep).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn state(variant: EntryVariant) -> (CellEntryState, mpsc::UnboundedReceiver<TranslationDone>) {
        let (tr_tx, tr_rx) = mpsc::unbounded_channel();
        let translator: Arc<dyn BackTranslator> =
            Arc::new(braille_translate::LetterTranslator::new());
        (CellEntryState::new(variant, translator, tr_tx, 1), tr_rx)
    }

    fn outbox_pair() -> (
        mpsc::UnboundedSender<InputEffect>,
        mpsc::UnboundedReceiver<InputEffect>,
    ) {
        mpsc::unbounded_channel()
    }

    #[test]
    fn echo_queue_matches_and_drains_through() {
        let (mut st, _tr) = state(EntryVariant::Immediate);
        st.pending_echoes.extend(["a".to_string(), "ab".to_string(), "abc".to_string()]);
        assert_eq!(st.on_text_before_changed("ab"), TextChange::SelfCaused);
        assert_eq!(st.pending_echoes, ["abc"]);
        assert_eq!(st.on_text_before_changed("zzz"), TextChange::External);
    }

    #[test]
    fn echoes_chain_off_latest_expectation() {
        let (mut st, _tr) = state(EntryVariant::Immediate);
        let (fx_tx, mut fx_rx) = outbox_pair();
        let outbox = Outbox::for_tests(&fx_tx, "ctx");
        // Two edits before any echo arrives: "x" then "xy", live text "pre".
        st.send_text_change("", "x", &outbox, "pre");
        st.send_text_change("x", "xy", &outbox, "pre");
        assert_eq!(
            st.pending_echoes,
            ["prex".to_string(), "prexy".to_string()]
        );
        let first = fx_rx.try_recv().unwrap();
        match first {
            InputEffect::Ime(ImeOutbound::ReplaceText { delete_before, new_text, .. }) => {
                assert_eq!((delete_before, new_text.as_str()), (0, "x"));
            }
            other => panic!("unexpected effect: {other:?}"),
        }
    }

    #[test]
    fn replacement_records_post_delete_and_post_insert_echoes() {
        let (mut st, _tr) = state(EntryVariant::Immediate);
        let (fx_tx, _fx_rx) = outbox_pair();
        let outbox = Outbox::for_tests(&fx_tx, "ctx");
        st.send_text_change("abc", "abd", &outbox, "abc");
        assert_eq!(st.pending_echoes, ["ab".to_string(), "abd".to_string()]);
    }

    #[test]
    fn stale_sequence_is_ignored() {
        let (mut st, _tr) = state(EntryVariant::Immediate);
        let (fx_tx, mut fx_rx) = outbox_pair();
        let outbox = Outbox::for_tests(&fx_tx, "ctx");
        st.last_applied_seq = 5;
        let done = TranslationDone { generation: 1, seq: 4, text: Some("late".into()) };
        assert_eq!(st.apply_translation(&done, &outbox, ""), Applied::Ignored);
        assert!(fx_rx.try_recv().is_err(), "no effect for a stale completion");
    }

    #[test]
    fn failed_translation_drops_edit_but_keeps_state() {
        let (mut st, _tr) = state(EntryVariant::Immediate);
        let (fx_tx, mut fx_rx) = outbox_pair();
        let outbox = Outbox::for_tests(&fx_tx, "ctx");
        st.cells.push(0x01);
        let done = TranslationDone { generation: 1, seq: 1, text: None };
        assert_eq!(st.apply_translation(&done, &outbox, ""), Applied::Ignored);
        assert!(fx_rx.try_recv().is_err());
    }

    #[test]
    fn drop_last_chars_is_char_safe() {
        assert_eq!(drop_last_chars("héllo", 2), "hél");
        assert_eq!(drop_last_chars("ab", 5), "");
    }
}
