//! Key-code table for synthesized key presses.
//!
//! Standard keys typed on a braille keyboard are forwarded to the OS as a
//! down+up pair carrying a legacy key code. A key with no entry here is a
//! contract violation in the device's translation table; the failure is
//! surfaced synchronously and aborts only that key press.

use braille_events::StandardKey;
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum KeySynthesisError {
    #[error("no key code mapping for {0:?}")]
    MissingMapping(StandardKey),
}

pub fn key_code_for(key: StandardKey) -> Result<u32, KeySynthesisError> {
    let code = match key {
        StandardKey::Backspace => 8,
        StandardKey::Tab => 9,
        StandardKey::Enter => 13,
        StandardKey::Escape => 27,
        StandardKey::PageUp => 33,
        StandardKey::PageDown => 34,
        StandardKey::End => 35,
        StandardKey::Home => 36,
        StandardKey::Left => 37,
        StandardKey::Up => 38,
        StandardKey::Right => 39,
        StandardKey::Down => 40,
        StandardKey::Insert => 45,
        StandardKey::Delete => 46,
        StandardKey::Char(' ') => 32,
        StandardKey::Char(c) if c.is_ascii_alphanumeric() => c.to_ascii_uppercase() as u32,
        other => return Err(KeySynthesisError::MissingMapping(other)),
    };
    Ok(code)
}
