//! Core event types shared by the braille input and display pipelines.

use std::fmt;
use std::sync::atomic::AtomicU64;

pub mod ime;

pub use ime::{ImeInbound, ImeOutbound, InputContext};

/// One braille cell: a bit pattern over up to 8 dot positions. Dot `n`
/// occupies bit `n - 1`, so dots 1+2 encode as `0b0000_0011`.
pub type BrailleCell = u8;

/// The blank (space) cell. Appending it to an input sequence finalizes the
/// sequence and commits the entry state.
pub const BLANK_CELL: BrailleCell = 0;

/// Dots 7 and 8, OR'd into translated output to mark the cursor.
pub const CURSOR_DOTS: BrailleCell = 0b1100_0000;

// -------------------------------------------------------------------------------------------------
// Telemetry
// -------------------------------------------------------------------------------------------------
// Atomic counters (fetch_add relaxed, no locking). Inspected in unit tests and
// available for periodic logging by the host; a metrics exporter can wrap them
// later without touching the input path.
// -------------------------------------------------------------------------------------------------
pub static CELLS_BUFFERED: AtomicU64 = AtomicU64::new(0); // dots received while the IME was inactive
pub static CELLS_REPLAYED: AtomicU64 = AtomicU64::new(0); // buffered dots replayed on activation
pub static EDITS_SENT: AtomicU64 = AtomicU64::new(0); // replaceText / setUncommitted messages posted
pub static ENTRY_COMMITS: AtomicU64 = AtomicU64::new(0); // entry states finalized (blank cell or explicit)
pub static INTERFERENCE_RESETS: AtomicU64 = AtomicU64::new(0); // entry states discarded on external edits
pub static IME_MESSAGES_IN: AtomicU64 = AtomicU64::new(0); // inbound IME messages handled
pub static STALE_TRANSLATIONS_DROPPED: AtomicU64 = AtomicU64::new(0); // completions dropped by generation/sequence guard

/// Commands a braille device can report. `Dots` carries a cell pattern in
/// `BrailleKeyEvent::braille_dots`; `StandardKey` carries a logical key in
/// `BrailleKeyEvent::standard_key`. The remaining commands are navigation
/// chords handled outside the input pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCommand {
    Dots,
    StandardKey,
    Routing,
    PanLeft,
    PanRight,
    LineUp,
    LineDown,
}

/// Logical keys a braille keyboard can emulate. `Char` keys are synthesized
/// into OS key presses through the key-code table; characters without a
/// mapping fail synthesis synchronously.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StandardKey {
    Enter,
    Tab,
    Backspace,
    Escape,
    Delete,
    Insert,
    Home,
    End,
    PageUp,
    PageDown,
    Up,
    Down,
    Left,
    Right,
    Char(char),
}

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct KeyModifiers: u8 {
        const SHIFT = 0b0000_0001;
        const CTRL  = 0b0000_0010;
        const ALT   = 0b0000_0100;
    }
}

/// A normalized key event from a braille device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrailleKeyEvent {
    pub command: KeyCommand,
    pub braille_dots: Option<BrailleCell>,
    pub standard_key: Option<StandardKey>,
    pub mods: KeyModifiers,
}

impl BrailleKeyEvent {
    /// A dots event carrying a cell pattern.
    pub fn dots(pattern: BrailleCell) -> Self {
        Self {
            command: KeyCommand::Dots,
            braille_dots: Some(pattern),
            standard_key: None,
            mods: KeyModifiers::empty(),
        }
    }

    /// A standard-key event with modifiers.
    pub fn standard(key: StandardKey, mods: KeyModifiers) -> Self {
        Self {
            command: KeyCommand::StandardKey,
            braille_dots: None,
            standard_key: Some(key),
            mods,
        }
    }

    /// A bare navigation command (routing, pan, line movement).
    pub fn command(command: KeyCommand) -> Self {
        Self {
            command,
            braille_dots: None,
            standard_key: None,
            mods: KeyModifiers::empty(),
        }
    }
}

impl fmt::Display for BrailleKeyEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.command {
            KeyCommand::Dots => write!(
                f,
                "Dots({:#04x})",
                self.braille_dots.unwrap_or(BLANK_CELL)
            ),
            KeyCommand::StandardKey => {
                write!(f, "{:?}{:?}", self.standard_key, self.mods)
            }
            other => write!(f, "{other:?}"),
        }
    }
}
