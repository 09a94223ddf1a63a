//! Braille input coordination.
//!
//! One [`InputCoordinator`] per session, owned by the host event loop and
//! called directly; there is no global state. Device key events and inbound
//! IME messages go in; everything the host must act on comes out of a single
//! ordered [`InputEffect`] channel (IME edits, synthesized key presses,
//! uncommitted-cell previews for the display pipeline). Back-translation
//! completions return through a second channel and are handed back via
//! [`InputCoordinator::on_translation_done`]; completions stamped with a dead
//! generation or an already-superseded sequence are dropped there, which is
//! the entire teardown-race and ordering story.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::Ordering::Relaxed;

use braille_events::{
    BrailleCell, BrailleKeyEvent, CELLS_BUFFERED, CELLS_REPLAYED, IME_MESSAGES_IN,
    INTERFERENCE_RESETS, KeyCommand, KeyModifiers, STALE_TRANSLATIONS_DROPPED, StandardKey,
    ime::{ImeInbound, ImeOutbound, InputContext},
};
use braille_translate::{BackTranslator, ExpansionType, TranslationDone};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, trace, warn};

mod entry;
pub mod keymap;

pub use keymap::KeySynthesisError;

use entry::{Applied, CellEntryState, EntryAfterDelete, EntryVariant, TextChange};

/// Host-facing side effects, in the order they must be acted on.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEffect {
    /// Post this message to the IME.
    Ime(ImeOutbound),
    /// Synthesize a down+up key-press pair with the given code and
    /// modifiers.
    KeyPress {
        key: StandardKey,
        code: u32,
        mods: KeyModifiers,
    },
    /// The uncommitted preview cells changed; the display pipeline shows
    /// them at the cursor. Empty means cleared.
    UncommittedCells(Vec<BrailleCell>),
}

/// Sender half bundled with the id of the field the effect targets.
pub(crate) struct Outbox<'a> {
    effects: &'a UnboundedSender<InputEffect>,
    context_id: &'a str,
}

impl<'a> Outbox<'a> {
    pub(crate) fn new(
        effects: &'a UnboundedSender<InputEffect>,
        context: &'a Option<InputContext>,
    ) -> Self {
        Self {
            effects,
            context_id: context
                .as_ref()
                .map(|c| c.context_id.as_str())
                .unwrap_or(""),
        }
    }

    #[cfg(test)]
    pub(crate) fn for_tests(
        effects: &'a UnboundedSender<InputEffect>,
        context_id: &'a str,
    ) -> Self {
        Self {
            effects,
            context_id,
        }
    }

    pub(crate) fn context_id(&self) -> &str {
        self.context_id
    }

    pub(crate) fn send_ime(&self, msg: ImeOutbound) {
        self.send(InputEffect::Ime(msg));
    }

    pub(crate) fn send(&self, effect: InputEffect) {
        if self.effects.send(effect).is_err() {
            trace!(target: "input.effects", "effect dropped, host receiver closed");
        }
    }
}

pub struct InputCoordinator {
    /// Whether the IME engine is active.
    active: bool,
    context: Option<InputContext>,
    /// Dots buffered while the IME is not yet active; replayed FIFO exactly
    /// once on activation.
    pending_cells: VecDeque<BrailleCell>,
    entry: Option<CellEntryState>,
    /// Field text around the selection as last reported by the display
    /// pipeline.
    text_before: String,
    text_after: String,
    default_translator: Arc<dyn BackTranslator>,
    uncontracted_translator: Option<Arc<dyn BackTranslator>>,
    effects: UnboundedSender<InputEffect>,
    translations: UnboundedSender<TranslationDone>,
    next_generation: u64,
}

impl InputCoordinator {
    pub fn new(
        default_translator: Arc<dyn BackTranslator>,
        uncontracted_translator: Option<Arc<dyn BackTranslator>>,
        effects: UnboundedSender<InputEffect>,
        translations: UnboundedSender<TranslationDone>,
    ) -> Self {
        Self {
            active: false,
            context: None,
            pending_cells: VecDeque::new(),
            entry: None,
            text_before: String::new(),
            text_after: String::new(),
            default_translator,
            uncontracted_translator,
            effects,
            translations,
            next_generation: 0,
        }
    }

    /// Route a device key event. Returns whether the event was consumed; an
    /// unconsumed event falls through to generic navigation (routing, pan).
    /// The only error is a missing key-code mapping while synthesizing a
    /// standard key press, a translation-table contract violation surfaced
    /// synchronously.
    pub fn on_braille_key_event(
        &mut self,
        ev: &BrailleKeyEvent,
    ) -> Result<bool, KeySynthesisError> {
        match ev.command {
            KeyCommand::Dots => {
                let Some(dots) = ev.braille_dots else {
                    warn!(target: "input.dots", "dots event without a pattern, ignored");
                    return Ok(false);
                };
                Ok(self.handle_dots(dots))
            }
            KeyCommand::StandardKey => {
                self.pending_cells.clear();
                let Some(key) = ev.standard_key else {
                    warn!(target: "input.dots", "standard-key event without a key, ignored");
                    return Ok(false);
                };
                if key == StandardKey::Backspace
                    && ev.mods.is_empty()
                    && self.handle_backspace()
                {
                    return Ok(true);
                }
                self.commit_and_clear_entry_state();
                let code = keymap::key_code_for(key)?;
                trace!(target: "input.dots", code, mods = ?ev.mods, "synthesize key press");
                let _ = self.effects.send(InputEffect::KeyPress {
                    key,
                    code,
                    mods: ev.mods,
                });
                Ok(true)
            }
            _ => {
                self.pending_cells.clear();
                Ok(false)
            }
        }
    }

    /// Handle an inbound IME message. Malformed messages never reach this
    /// point (the wire enum is closed); cross-component failures become state
    /// resets here, never errors.
    pub fn on_ime_message(&mut self, msg: ImeInbound) {
        IME_MESSAGES_IN.fetch_add(1, Relaxed);
        match msg {
            ImeInbound::ActiveState { active } => {
                debug!(target: "input.ime", active, "active state");
                self.active = active;
            }
            ImeInbound::InputContext { context } => {
                debug!(
                    target: "input.ime",
                    has_context = context.is_some(),
                    "input context replaced"
                );
                self.context = context;
                self.clear_entry_state();
                if self.active && self.context.is_some() {
                    let queued: Vec<BrailleCell> = self.pending_cells.drain(..).collect();
                    for dots in queued {
                        CELLS_REPLAYED.fetch_add(1, Relaxed);
                        self.handle_dots(dots);
                    }
                }
            }
            ImeInbound::BrailleDots { dots } => {
                self.handle_dots(dots);
            }
            ImeInbound::Backspace { request_id } => {
                // Answered in place; re-synthesizing an OS backspace here
                // would loop straight back into the IME.
                let result = self.handle_backspace();
                let _ = self.effects.send(InputEffect::Ime(ImeOutbound::KeyEventHandled {
                    request_id,
                    result,
                }));
            }
            ImeInbound::Reset => {
                debug!(target: "input.ime", "reset");
                self.clear_entry_state();
            }
        }
    }

    /// The IME message channel went away. Deactivates, forgets the context,
    /// and discards (never commits) any in-progress entry.
    pub fn on_ime_disconnected(&mut self) {
        debug!(target: "input.ime", "ime disconnected");
        self.active = false;
        self.context = None;
        self.clear_entry_state();
    }

    /// Deliver a back-translation completion. Dead-generation and
    /// superseded-sequence completions are dropped.
    pub fn on_translation_done(&mut self, done: TranslationDone) {
        let outcome = {
            let Some(entry) = self.entry.as_mut() else {
                STALE_TRANSLATIONS_DROPPED.fetch_add(1, Relaxed);
                trace!(target: "input.entry", "completion for a torn-down entry dropped");
                return;
            };
            if entry.generation() != done.generation {
                STALE_TRANSLATIONS_DROPPED.fetch_add(1, Relaxed);
                trace!(
                    target: "input.entry",
                    generation = done.generation,
                    "completion for a stale generation dropped"
                );
                return;
            }
            let outbox = Outbox::new(&self.effects, &self.context);
            entry.apply_translation(&done, &outbox, &self.text_before)
        };
        if outcome == Applied::Finalize {
            self.commit_and_clear_entry_state();
        }
    }

    /// Record the field text around the selection and classify the change.
    /// A before-text not matching any expected echo is external interference
    /// and discards (never commits) the entry state.
    pub fn on_text_changed(&mut self, before: &str, after: &str) {
        if before != self.text_before
            && let Some(entry) = self.entry.as_mut()
            && entry.on_text_before_changed(before) == TextChange::External
        {
            INTERFERENCE_RESETS.fetch_add(1, Relaxed);
            warn!(target: "input.entry", "external field change, discarding entry state");
            self.clear_entry_state();
        }
        self.text_before.clear();
        self.text_before.push_str(before);
        self.text_after.clear();
        self.text_after.push_str(after);
    }

    /// How much of the field the display should render uncontracted.
    pub fn expansion_type(&self) -> ExpansionType {
        if self.context.as_ref().is_some_and(|c| c.always_uncontracted()) {
            return ExpansionType::All;
        }
        match &self.entry {
            Some(e) if Arc::ptr_eq(e.translator(), &self.default_translator) => {
                ExpansionType::None
            }
            _ => ExpansionType::Selection,
        }
    }

    /// Preview cells of a deferred entry, empty otherwise.
    pub fn uncommitted_cells(&self) -> Vec<BrailleCell> {
        match &self.entry {
            Some(e) if e.uses_uncommitted_cells() => e.cells().to_vec(),
            _ => Vec::new(),
        }
    }

    /// Finalize the entry state (deferred preview text is committed into the
    /// field), then destroy it.
    pub fn commit_and_clear_entry_state(&mut self) {
        if let Some(mut e) = self.entry.take() {
            let outbox = Outbox::new(&self.effects, &self.context);
            e.commit(&outbox);
        }
    }

    /// Destroy the entry state without finalizing. Used on interference,
    /// context replacement, reset, and teardown.
    pub fn clear_entry_state(&mut self) {
        if let Some(e) = self.entry.take() {
            debug!(target: "input.entry", "entry state discarded");
            if e.uses_uncommitted_cells() {
                let _ = self
                    .effects
                    .send(InputEffect::UncommittedCells(Vec::new()));
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn context(&self) -> Option<&InputContext> {
        self.context.as_ref()
    }

    pub fn has_entry_state(&self) -> bool {
        self.entry.is_some()
    }

    pub fn pending_cell_count(&self) -> usize {
        self.pending_cells.len()
    }

    fn handle_dots(&mut self, dots: BrailleCell) -> bool {
        if !self.active {
            self.pending_cells.push_back(dots);
            CELLS_BUFFERED.fetch_add(1, Relaxed);
            trace!(
                target: "input.dots",
                queued = self.pending_cells.len(),
                "buffered while inactive"
            );
            return true;
        }
        if self.context.is_none() {
            return false;
        }
        if self.entry.is_none() {
            let state = self.create_entry_state();
            self.entry = Some(state);
        }
        if let Some(entry) = self.entry.as_mut() {
            entry.append_cell(dots);
        }
        true
    }

    fn handle_backspace(&mut self) -> bool {
        if !self.active {
            return false;
        }
        let emptied = {
            let outbox = Outbox::new(&self.effects, &self.context);
            match self.entry.as_mut() {
                Some(entry) => Some(
                    entry.delete_last_cell(&outbox, &self.text_before) == EntryAfterDelete::Empty,
                ),
                None => None,
            }
        };
        match emptied {
            None => false,
            Some(true) => {
                self.clear_entry_state();
                true
            }
            Some(false) => true,
        }
    }

    fn create_entry_state(&mut self) -> CellEntryState {
        self.next_generation += 1;
        let (variant, translator) = self.select_variant();
        debug!(
            target: "input.entry",
            ?variant,
            generation = self.next_generation,
            "entry state created"
        );
        CellEntryState::new(
            variant,
            translator,
            self.translations.clone(),
            self.next_generation,
        )
    }

    /// Pick the variant and translator for a fresh entry state. Contracted
    /// input is only safe when the run starts a new word in an ordinary
    /// field; anything touching existing text, and any always-uncontracted
    /// field type, edits immediately with the uncontracted table.
    fn select_variant(&self) -> (EntryVariant, Arc<dyn BackTranslator>) {
        let Some(uncontracted) = &self.uncontracted_translator else {
            return (EntryVariant::Immediate, self.default_translator.clone());
        };
        let always = self
            .context
            .as_ref()
            .is_some_and(|c| c.always_uncontracted());
        let joins_before = self
            .text_before
            .chars()
            .next_back()
            .is_some_and(|c| !c.is_whitespace());
        let joins_after = self
            .text_after
            .chars()
            .next()
            .is_some_and(|c| !c.is_whitespace());
        if always || joins_before || joins_after {
            (EntryVariant::Immediate, uncontracted.clone())
        } else {
            (EntryVariant::Deferred, self.default_translator.clone())
        }
    }
}
