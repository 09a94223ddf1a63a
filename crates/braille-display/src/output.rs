//! Output seams for the display pipeline.
//!
//! A physical display may or may not be attached; the pipeline stays fully
//! functional in caption-only mode. Both sinks receive the already-sliced
//! viewport window.

pub trait DisplayDevice: Send {
    /// Write one window of cells to the hardware.
    fn write_cells(&mut self, cells: &[u8]);
}

/// Mirrors the visible window for sighted observers: the text the window
/// corresponds to plus the raw cell bytes.
pub trait CaptionSink: Send {
    fn show(&mut self, text: &str, cells: &[u8]);
}
