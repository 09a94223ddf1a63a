//! End-to-end coordinator scenarios driven through the public API.
//!
//! The harness owns both channel receivers and pumps translation completions
//! back into the coordinator after every stimulus, which makes the
//! asynchronous translator deterministic without hiding the message hop.

use std::sync::{Arc, Mutex};

use braille_events::{
    BrailleKeyEvent, KeyCommand, KeyModifiers, StandardKey,
    ime::{ImeInbound, ImeOutbound, InputContext},
};
use braille_input::{InputCoordinator, InputEffect, KeySynthesisError};
use braille_translate::{
    BackTranslator, ExpansionType, LetterTranslator, TranslationDone, TranslationSink,
};
use tokio::sync::mpsc::{self, UnboundedReceiver};

struct Harness {
    coord: InputCoordinator,
    effects: UnboundedReceiver<InputEffect>,
    translations: UnboundedReceiver<TranslationDone>,
}

impl Harness {
    fn build(
        default: Arc<dyn BackTranslator>,
        uncontracted: Option<Arc<dyn BackTranslator>>,
    ) -> Self {
        let (fx_tx, fx_rx) = mpsc::unbounded_channel();
        let (tr_tx, tr_rx) = mpsc::unbounded_channel();
        Self {
            coord: InputCoordinator::new(default, uncontracted, fx_tx, tr_tx),
            effects: fx_rx,
            translations: tr_rx,
        }
    }

    /// Letter translator only; no uncontracted alternative.
    fn contracted_only() -> Self {
        Self::build(Arc::new(LetterTranslator::new()), None)
    }

    /// Separate default and uncontracted letter translators.
    fn with_uncontracted() -> Self {
        Self::build(
            Arc::new(LetterTranslator::new()),
            Some(Arc::new(LetterTranslator::new())),
        )
    }

    fn activate(&mut self, field_type: &str) {
        self.coord
            .on_ime_message(ImeInbound::ActiveState { active: true });
        self.coord.on_ime_message(ImeInbound::InputContext {
            context: Some(InputContext::new("ctx", field_type)),
        });
    }

    fn pump(&mut self) {
        while let Ok(done) = self.translations.try_recv() {
            self.coord.on_translation_done(done);
        }
    }

    fn type_dots(&mut self, dots: u8) -> bool {
        let consumed = self
            .coord
            .on_braille_key_event(&BrailleKeyEvent::dots(dots))
            .unwrap();
        self.pump();
        consumed
    }

    fn drain_effects(&mut self) -> Vec<InputEffect> {
        let mut out = Vec::new();
        while let Ok(fx) = self.effects.try_recv() {
            out.push(fx);
        }
        out
    }
}

/// The replace-text edits among `effects`, as (delete_before, new_text).
fn replace_texts(effects: &[InputEffect]) -> Vec<(usize, String)> {
    effects
        .iter()
        .filter_map(|fx| match fx {
            InputEffect::Ime(ImeOutbound::ReplaceText {
                delete_before,
                new_text,
                ..
            }) => Some((*delete_before, new_text.clone())),
            _ => None,
        })
        .collect()
}

/// Replay replace-text edits against a model of the text before the cursor.
fn replay(edits: &[(usize, String)]) -> String {
    let mut field = String::new();
    for (delete, insert) in edits {
        let keep = field.chars().count().saturating_sub(*delete);
        field = field.chars().take(keep).collect();
        field.push_str(insert);
    }
    field
}

// Letter cells used throughout: a, b, c.
const CELL_A: u8 = 0x01;
const CELL_B: u8 = 0x03;
const CELL_C: u8 = 0x09;

#[test]
fn immediate_entry_edits_per_cell_and_commits_on_blank() {
    // Only a contracted translator available: immediate variant, default table.
    let mut h = Harness::contracted_only();
    h.activate("text");
    h.drain_effects();

    assert!(h.type_dots(CELL_A));
    assert!(h.coord.has_entry_state());
    assert_eq!(
        replace_texts(&h.drain_effects()),
        vec![(0, "a".to_string())]
    );

    assert!(h.type_dots(CELL_B));
    assert_eq!(
        replace_texts(&h.drain_effects()),
        vec![(0, "b".to_string())],
        "second edit extends the first translation"
    );

    assert!(h.type_dots(0x00));
    assert_eq!(
        replace_texts(&h.drain_effects()),
        vec![(0, " ".to_string())]
    );
    assert!(!h.coord.has_entry_state(), "blank cell commits and clears");
}

#[test]
fn fresh_sequence_after_blank_commit() {
    let mut h = Harness::contracted_only();
    h.activate("text");
    h.type_dots(CELL_A);
    h.type_dots(0x00);
    h.drain_effects();

    h.type_dots(CELL_B);
    assert_eq!(
        replace_texts(&h.drain_effects()),
        vec![(0, "b".to_string())],
        "the next cell starts a sequence of length one"
    );
    assert!(h.coord.has_entry_state());
}

#[test]
fn diff_round_trip_reconstructs_back_translation() {
    /// Contraction stand-in: "ab" collapses into the single letter x, so the
    /// third edit has to delete and rewrite.
    struct ContractingTranslator;

    impl BackTranslator for ContractingTranslator {
        fn back_translate(&self, cells: &[u8], sink: TranslationSink) {
            let text = match cells {
                [CELL_A] => "a",
                [CELL_A, CELL_B] => "x",
                [CELL_A, CELL_B, CELL_C] => "xc",
                _ => panic!("unexpected cells {cells:?}"),
            };
            sink.complete(Some(text.to_string()));
        }
    }

    let mut h = Harness::build(Arc::new(ContractingTranslator), None);
    h.activate("text");
    h.drain_effects();

    h.type_dots(CELL_A);
    h.type_dots(CELL_B);
    h.type_dots(CELL_C);

    let edits = replace_texts(&h.drain_effects());
    assert_eq!(
        edits,
        vec![
            (0, "a".to_string()),
            (1, "x".to_string()),
            (0, "c".to_string()),
        ]
    );
    assert_eq!(replay(&edits), "xc");
}

#[test]
fn backspace_on_single_cell_clears_state_with_empty_edit() {
    let mut h = Harness::contracted_only();
    h.activate("text");
    h.type_dots(CELL_A);
    h.drain_effects();

    let consumed = h
        .coord
        .on_braille_key_event(&BrailleKeyEvent::standard(
            StandardKey::Backspace,
            KeyModifiers::empty(),
        ))
        .unwrap();
    h.pump();
    assert!(consumed);
    assert!(!h.coord.has_entry_state());
    assert_eq!(
        replace_texts(&h.drain_effects()),
        vec![(1, String::new())],
        "the typed character is removed from the field"
    );
}

#[test]
fn backspace_on_longer_sequence_retranslates_and_stays_active() {
    let mut h = Harness::contracted_only();
    h.activate("text");
    h.type_dots(CELL_A);
    h.type_dots(CELL_B);
    h.drain_effects();

    let consumed = h
        .coord
        .on_braille_key_event(&BrailleKeyEvent::standard(
            StandardKey::Backspace,
            KeyModifiers::empty(),
        ))
        .unwrap();
    h.pump();
    assert!(consumed);
    assert!(h.coord.has_entry_state());
    assert_eq!(
        replace_texts(&h.drain_effects()),
        vec![(1, String::new())],
        "retranslation trims back to the remaining cell"
    );
}

#[test]
fn expected_echo_keeps_state_unknown_text_discards_it() {
    let mut h = Harness::contracted_only();
    h.activate("text");
    h.type_dots(CELL_A);
    h.drain_effects();

    // The IME echoes exactly what the edit produced.
    h.coord.on_text_changed("a", "");
    assert!(h.coord.has_entry_state(), "self-caused change is ignored");

    // Something else edited the field.
    h.coord.on_text_changed("abz", "");
    assert!(!h.coord.has_entry_state(), "external change discards state");
}

#[test]
fn pending_cells_replay_in_order_on_activation() {
    let mut h = Harness::contracted_only();

    for dots in [CELL_A, CELL_B, CELL_C] {
        assert!(h.type_dots(dots), "dots are consumed while inactive");
    }
    assert_eq!(h.coord.pending_cell_count(), 3);
    assert!(h.drain_effects().is_empty(), "nothing edited while inactive");

    h.activate("text");
    h.pump();
    assert_eq!(h.coord.pending_cell_count(), 0);
    assert_eq!(
        replace_texts(&h.drain_effects()),
        vec![
            (0, "a".to_string()),
            (0, "b".to_string()),
            (0, "c".to_string()),
        ]
    );
}

#[test]
fn dots_unhandled_when_active_without_context() {
    let mut h = Harness::contracted_only();
    h.coord
        .on_ime_message(ImeInbound::ActiveState { active: true });
    assert!(!h.type_dots(CELL_A), "generic navigation takes over");
    assert!(!h.coord.has_entry_state());
}

#[test]
fn non_dots_command_clears_pending_cells() {
    let mut h = Harness::contracted_only();
    h.type_dots(CELL_A);
    h.type_dots(CELL_B);
    assert_eq!(h.coord.pending_cell_count(), 2);

    let consumed = h
        .coord
        .on_braille_key_event(&BrailleKeyEvent::command(KeyCommand::PanLeft))
        .unwrap();
    assert!(!consumed);
    assert_eq!(h.coord.pending_cell_count(), 0);
}

#[test]
fn standard_key_commits_entry_and_synthesizes_press() {
    let mut h = Harness::contracted_only();
    h.activate("text");
    h.type_dots(CELL_A);
    h.drain_effects();

    let consumed = h
        .coord
        .on_braille_key_event(&BrailleKeyEvent::standard(
            StandardKey::Enter,
            KeyModifiers::CTRL,
        ))
        .unwrap();
    assert!(consumed);
    assert!(!h.coord.has_entry_state());
    let effects = h.drain_effects();
    assert_eq!(
        effects,
        vec![InputEffect::KeyPress {
            key: StandardKey::Enter,
            code: 13,
            mods: KeyModifiers::CTRL,
        }]
    );
}

#[test]
fn unmapped_key_fails_synthesis_synchronously() {
    let mut h = Harness::contracted_only();
    h.activate("text");
    let err = h
        .coord
        .on_braille_key_event(&BrailleKeyEvent::standard(
            StandardKey::Char('é'),
            KeyModifiers::empty(),
        ))
        .unwrap_err();
    assert_eq!(
        err,
        KeySynthesisError::MissingMapping(StandardKey::Char('é'))
    );
    assert!(h.drain_effects().is_empty(), "no key press was synthesized");
}

#[test]
fn ime_backspace_is_answered_not_synthesized() {
    let mut h = Harness::contracted_only();
    h.activate("text");
    h.type_dots(CELL_A);
    h.drain_effects();

    h.coord
        .on_ime_message(ImeInbound::Backspace { request_id: 42 });
    h.pump();
    let effects = h.drain_effects();
    assert!(
        effects.contains(&InputEffect::Ime(ImeOutbound::KeyEventHandled {
            request_id: 42,
            result: true,
        })),
        "missing handled answer in {effects:?}"
    );
    assert!(
        !effects
            .iter()
            .any(|fx| matches!(fx, InputEffect::KeyPress { .. })),
        "an OS backspace would loop back into the IME"
    );

    // Without an entry state the request is answered negatively.
    h.coord.clear_entry_state();
    h.drain_effects();
    h.coord
        .on_ime_message(ImeInbound::Backspace { request_id: 43 });
    assert_eq!(
        h.drain_effects(),
        vec![InputEffect::Ime(ImeOutbound::KeyEventHandled {
            request_id: 43,
            result: false,
        })]
    );
}

#[test]
fn ime_disconnect_deactivates_and_discards() {
    let mut h = Harness::with_uncontracted();
    h.activate("text");
    h.type_dots(CELL_A);
    h.drain_effects();

    h.coord.on_ime_disconnected();
    assert!(!h.coord.is_active());
    assert!(h.coord.context().is_none());
    assert!(!h.coord.has_entry_state());
    let effects = h.drain_effects();
    assert!(
        !effects
            .iter()
            .any(|fx| matches!(fx, InputEffect::Ime(ImeOutbound::CommitUncommitted { .. }))),
        "disconnect must never commit: {effects:?}"
    );
}

#[test]
fn reset_discards_without_committing() {
    let mut h = Harness::with_uncontracted();
    h.activate("text");
    h.type_dots(CELL_A);
    h.drain_effects();

    h.coord.on_ime_message(ImeInbound::Reset);
    assert!(!h.coord.has_entry_state());
    let effects = h.drain_effects();
    assert!(
        !effects
            .iter()
            .any(|fx| matches!(fx, InputEffect::Ime(ImeOutbound::CommitUncommitted { .. }))),
        "discard must not commit: {effects:?}"
    );
}

// ---------------------------------------------------------------------------
// Deferred variant
// ---------------------------------------------------------------------------

#[test]
fn deferred_entry_previews_then_commits_on_blank() {
    let mut h = Harness::with_uncontracted();
    h.activate("text");
    h.drain_effects();

    // Empty field, word start: deferred variant with the default table.
    h.type_dots(CELL_A);
    assert_eq!(h.coord.uncommitted_cells(), vec![CELL_A]);
    assert_eq!(h.coord.expansion_type(), ExpansionType::None);
    assert_eq!(
        h.drain_effects(),
        vec![
            InputEffect::Ime(ImeOutbound::SetUncommitted {
                context_id: "ctx".into(),
                text: "a".into(),
            }),
            InputEffect::UncommittedCells(vec![CELL_A]),
        ]
    );

    h.type_dots(0x00);
    assert!(!h.coord.has_entry_state());
    assert_eq!(
        h.drain_effects(),
        vec![
            InputEffect::Ime(ImeOutbound::SetUncommitted {
                context_id: "ctx".into(),
                text: "a ".into(),
            }),
            InputEffect::Ime(ImeOutbound::CommitUncommitted {
                context_id: "ctx".into(),
            }),
            InputEffect::UncommittedCells(Vec::new()),
        ]
    );
}

#[test]
fn variant_selection_follows_context_and_surrounding_text() {
    // Always-uncontracted field type.
    let mut h = Harness::with_uncontracted();
    h.activate("url");
    h.type_dots(CELL_A);
    assert_eq!(h.coord.expansion_type(), ExpansionType::All);
    assert!(
        replace_texts(&h.drain_effects()).len() == 1,
        "url fields edit immediately"
    );

    // Mid-word cursor in an ordinary field.
    let mut h = Harness::with_uncontracted();
    h.activate("text");
    h.coord.on_text_changed("wor", "d");
    h.type_dots(CELL_A);
    assert_eq!(
        h.coord.expansion_type(),
        ExpansionType::Selection,
        "immediate with the uncontracted table"
    );
    assert_eq!(replace_texts(&h.drain_effects()).len(), 1);
}

// ---------------------------------------------------------------------------
// Completion stamping: teardown races and out-of-order delivery
// ---------------------------------------------------------------------------

#[derive(Default)]
struct ManualTranslator {
    pending: Mutex<Vec<(Vec<u8>, TranslationSink)>>,
}

impl ManualTranslator {
    fn fire(&self, index: usize) {
        let (cells, sink) = self.pending.lock().unwrap().remove(index);
        let text: String = cells
            .iter()
            .map(|&c| match c {
                0x00 => ' ',
                CELL_A => 'a',
                CELL_B => 'b',
                CELL_C => 'c',
                _ => '?',
            })
            .collect();
        sink.complete(Some(text));
    }

    fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }
}

impl BackTranslator for ManualTranslator {
    fn back_translate(&self, cells: &[u8], sink: TranslationSink) {
        self.pending.lock().unwrap().push((cells.to_vec(), sink));
    }
}

#[test]
fn completion_after_teardown_is_dropped() {
    let translator = Arc::new(ManualTranslator::default());
    let mut h = Harness::build(translator.clone(), None);
    h.activate("text");
    h.drain_effects();

    h.type_dots(CELL_A);
    assert_eq!(translator.pending_count(), 1);
    h.coord.on_ime_message(ImeInbound::Reset);

    translator.fire(0);
    h.pump();
    assert!(h.drain_effects().is_empty(), "no edit from a dead entry");
    assert!(!h.coord.has_entry_state());
}

#[test]
fn completion_for_previous_generation_is_dropped() {
    let translator = Arc::new(ManualTranslator::default());
    let mut h = Harness::build(translator.clone(), None);
    h.activate("text");
    h.drain_effects();

    h.type_dots(CELL_A);
    h.coord.on_ime_message(ImeInbound::Reset);
    h.type_dots(CELL_B);
    assert_eq!(translator.pending_count(), 2);

    // The old state's completion lands while the new state is live.
    translator.fire(0);
    h.pump();
    assert!(h.drain_effects().is_empty());

    translator.fire(0);
    h.pump();
    assert_eq!(
        replace_texts(&h.drain_effects()),
        vec![(0, "b".to_string())]
    );
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

mod log_capture {
    use std::fmt;
    use std::sync::{Arc, Mutex};
    use tracing::Subscriber;
    use tracing::field::{Field, Visit};
    use tracing_subscriber::layer::{Context, Layer};

    #[derive(Clone, Default)]
    pub struct Capture {
        pub events: Arc<Mutex<Vec<(String, Vec<(String, String)>)>>>,
    }

    #[derive(Default)]
    struct FieldCollector {
        fields: Vec<(String, String)>,
    }

    impl Visit for FieldCollector {
        fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
            self.fields
                .push((field.name().to_string(), format!("{value:?}")));
        }
    }

    impl<S> Layer<S> for Capture
    where
        S: Subscriber,
    {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            let mut collector = FieldCollector::default();
            event.record(&mut collector);
            self.events
                .lock()
                .unwrap()
                .push((event.metadata().target().to_string(), collector.fields));
        }
    }
}

#[test]
fn edit_logging_redacts_field_text() {
    use tracing_subscriber::filter::LevelFilter;
    use tracing_subscriber::layer::{Layer, SubscriberExt};
    use tracing_subscriber::registry::Registry;

    /// Always produces the same distinctive text, standing in for whatever
    /// the user actually typed.
    struct SecretTranslator;
    impl BackTranslator for SecretTranslator {
        fn back_translate(&self, _cells: &[u8], sink: TranslationSink) {
            sink.complete(Some("confidential payload".to_string()));
        }
    }

    let capture = log_capture::Capture::default();
    let events = capture.events.clone();
    let subscriber = Registry::default().with(capture.with_filter(LevelFilter::TRACE));
    let dispatch = tracing::Dispatch::new(subscriber);
    let _guard = tracing::dispatcher::set_default(&dispatch);

    let mut h = Harness::build(Arc::new(SecretTranslator), None);
    h.activate("text");
    h.type_dots(CELL_A);
    h.coord.on_text_changed("something else entirely", "");

    let events = events.lock().unwrap();
    assert!(
        events.iter().any(|(target, _)| target.starts_with("input.")),
        "expected input events, captured: {events:?}"
    );
    for (target, fields) in events.iter() {
        for (_, value) in fields {
            assert!(
                !value.contains("confidential"),
                "{target} leaked field text: {value}"
            );
        }
    }
}

#[test]
fn out_of_order_completions_do_not_reorder_edits() {
    let translator = Arc::new(ManualTranslator::default());
    let mut h = Harness::build(translator.clone(), None);
    h.activate("text");
    h.drain_effects();

    h.coord
        .on_braille_key_event(&BrailleKeyEvent::dots(CELL_A))
        .unwrap();
    h.coord
        .on_braille_key_event(&BrailleKeyEvent::dots(CELL_B))
        .unwrap();
    assert_eq!(translator.pending_count(), 2);

    // Newest first, then the straggler.
    translator.fire(1);
    h.pump();
    translator.fire(0);
    h.pump();

    assert_eq!(
        replace_texts(&h.drain_effects()),
        vec![(0, "ab".to_string())],
        "the superseded completion must not produce a second edit"
    );
}
