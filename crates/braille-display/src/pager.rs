//! Viewport paging over translated cell content.
//!
//! The pager owns a half-open window `[start, end)` into the current cell
//! buffer, never wider than the attached display. `WordWrap` computes a
//! breakpoint at every word start (the cell following a blank→non-blank
//! transition) and pans prefer landing a window edge on one, so words are
//! only split when a single word is wider than the display.

use std::ops::Range;

use braille_events::BLANK_CELL;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapPolicy {
    /// Fixed windows of exactly one display width.
    Fixed,
    /// Prefer window edges at word starts.
    WordWrap,
}

#[derive(Debug, Clone)]
pub struct ViewportPager {
    policy: WrapPolicy,
    /// 0 means no device is attached.
    display_size: usize,
    content_len: usize,
    /// Ascending word-start positions; empty under `Fixed`.
    breakpoints: Vec<usize>,
    start: usize,
    end: usize,
}

impl ViewportPager {
    pub fn new(policy: WrapPolicy) -> Self {
        Self {
            policy,
            display_size: 0,
            content_len: 0,
            breakpoints: Vec::new(),
            start: 0,
            end: 0,
        }
    }

    pub fn viewport(&self) -> Range<usize> {
        self.start..self.end
    }

    pub fn display_size(&self) -> usize {
        self.display_size
    }

    pub fn set_display_size(&mut self, size: usize) {
        self.display_size = size;
        let anchor = self.start;
        self.pan_to_position(anchor);
    }

    /// Install new content and reposition so the window overlaps `target`.
    pub fn set_content(&mut self, cells: &[u8], target: usize) {
        self.content_len = cells.len();
        self.breakpoints = match self.policy {
            WrapPolicy::Fixed => Vec::new(),
            WrapPolicy::WordWrap => word_starts(cells),
        };
        trace!(
            target: "display.pan",
            content_len = self.content_len,
            breakpoints = self.breakpoints.len(),
            target,
            "content set"
        );
        self.pan_to_position(target);
    }

    /// Advance by up to one display width. Returns whether the window moved.
    pub fn next(&mut self) -> bool {
        if self.display_size == 0 || self.end >= self.content_len {
            return false;
        }
        self.start = self.end;
        self.end = self.extend_right(self.start);
        true
    }

    /// Retreat by up to one display width, preferring to restart at the
    /// nearest word start inside the retreat range. Returns whether the
    /// window moved.
    pub fn previous(&mut self) -> bool {
        if self.display_size == 0 || self.start == 0 {
            return false;
        }
        let naive = self.start.saturating_sub(self.display_size);
        let start = self
            .breakpoints
            .iter()
            .rev()
            .find(|&&b| b > naive && b < self.start)
            .copied()
            .unwrap_or(naive);
        self.start = start;
        self.end = self.extend_right(start);
        true
    }

    /// Rewind and advance until the window covers `position`. With no
    /// display attached the window degenerates to the empty `[p, p)`.
    pub fn pan_to_position(&mut self, position: usize) {
        if self.display_size == 0 {
            self.start = position.min(self.content_len);
            self.end = self.start;
            return;
        }
        self.start = 0;
        self.end = 0;
        while self.end <= position {
            if !self.next() {
                break;
            }
        }
    }

    /// Right edge of a window starting at `from`: the largest breakpoint
    /// within one display width if any, else a hard wrap. A remainder that
    /// fits entirely is always taken whole.
    pub fn extend_right(&self, from: usize) -> usize {
        let naive = from + self.display_size;
        if naive >= self.content_len {
            return self.content_len;
        }
        self.breakpoints
            .iter()
            .rev()
            .find(|&&b| b > from && b <= naive)
            .copied()
            .unwrap_or(naive)
    }
}

fn word_starts(cells: &[u8]) -> Vec<usize> {
    cells
        .windows(2)
        .enumerate()
        .filter(|(_, pair)| pair[0] == BLANK_CELL && pair[1] != BLANK_CELL)
        .map(|(i, _)| i + 1)
        .collect()
}
