//! Built-in uncontracted letter translator.
//!
//! Letter-for-letter six-dot patterns for ASCII letters plus the blank cell
//! for space. One character maps to exactly one cell, so both position maps
//! are the identity. Hosts with a real translation engine supply their own
//! [`ForwardTranslator`]/[`BackTranslator`] implementations; this one keeps
//! the pipeline usable (and testable) without one.

use crate::{BackTranslator, ForwardTranslation, ForwardTranslator, TranslationSink};
use braille_events::BLANK_CELL;

// Dots for a-z, indexed by letter. Dot n is bit n-1.
const LETTERS: [u8; 26] = [
    0x01, // a: 1
    0x03, // b: 12
    0x09, // c: 14
    0x19, // d: 145
    0x11, // e: 15
    0x0B, // f: 124
    0x1B, // g: 1245
    0x13, // h: 125
    0x0A, // i: 24
    0x1A, // j: 245
    0x05, // k: 13
    0x07, // l: 123
    0x0D, // m: 134
    0x1D, // n: 1345
    0x15, // o: 135
    0x0F, // p: 1234
    0x1F, // q: 12345
    0x17, // r: 1235
    0x0E, // s: 234
    0x1E, // t: 2345
    0x25, // u: 136
    0x27, // v: 1236
    0x3A, // w: 2456
    0x2D, // x: 1346
    0x3D, // y: 13456
    0x35, // z: 1356
];

// Full cell for characters with no pattern of their own.
const UNKNOWN_CELL: u8 = 0x3F;
const UNKNOWN_CHAR: char = '?';

fn cell_for(ch: char) -> u8 {
    match ch {
        ' ' => BLANK_CELL,
        'a'..='z' => LETTERS[(ch as u8 - b'a') as usize],
        'A'..='Z' => LETTERS[(ch as u8 - b'A') as usize],
        _ => UNKNOWN_CELL,
    }
}

fn char_for(cell: u8) -> char {
    if cell == BLANK_CELL {
        return ' ';
    }
    match LETTERS.iter().position(|&c| c == cell) {
        Some(i) => (b'a' + i as u8) as char,
        None => UNKNOWN_CHAR,
    }
}

#[derive(Debug, Default)]
pub struct LetterTranslator;

impl LetterTranslator {
    pub fn new() -> Self {
        Self
    }
}

impl ForwardTranslator for LetterTranslator {
    fn forward_translate(&self, text: &str) -> Option<ForwardTranslation> {
        let mut out = ForwardTranslation::default();
        for (i, ch) in text.chars().enumerate() {
            out.cells.push(cell_for(ch));
            out.text_to_cell.push(i);
            out.cell_to_text.push(i);
        }
        Some(out)
    }
}

impl BackTranslator for LetterTranslator {
    fn back_translate(&self, cells: &[u8], sink: TranslationSink) {
        let text: String = cells.iter().map(|&c| char_for(c)).collect();
        sink.complete(Some(text));
    }
}
