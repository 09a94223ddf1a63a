//! Braille display pipeline: field content in, paged cell windows out.
//!
//! [`DisplayContentTranslator`] turns annotated field content into a cell
//! buffer with the cursor overlaid, keeps both position maps, and windows the
//! result through a [`ViewportPager`]. It also closes the echo-suppression
//! loop: every content update is routed through the input coordinator so a
//! self-caused edit is recognized and external interference tears the entry
//! state down.

use braille_events::{BLANK_CELL, CURSOR_DOTS, KeyCommand};
use braille_input::InputCoordinator;
use braille_translate::{ExpandingForwardTranslator, ExpansionType, ForwardTranslation};
use thiserror::Error;
use tracing::{trace, warn};

mod output;
mod pager;
mod rich;

pub use output::{CaptionSink, DisplayDevice};
pub use pager::{ViewportPager, WrapPolicy};
pub use rich::{RichText, Span, SpanKind};

use rich::char_range;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ContentError {
    #[error("content has no selection span")]
    MissingSelection,
    #[error("selection extends outside the value range")]
    SelectionOutsideValue,
}

pub struct DisplayContentTranslator {
    expander: ExpandingForwardTranslator,
    pager: ViewportPager,
    device: Option<Box<dyn DisplayDevice>>,
    caption: Option<Box<dyn CaptionSink>>,
    /// Last accepted content, annotated with the uncommitted-cells marker.
    content: RichText,
    /// Characters of the value span, and the selection within it.
    value_text: String,
    value_chars: usize,
    selection: (usize, usize),
    editable: bool,
    /// Displayed cell buffer (cursor already overlaid) and its text map.
    cells: Vec<u8>,
    cell_to_text: Vec<usize>,
}

impl DisplayContentTranslator {
    pub fn new(expander: ExpandingForwardTranslator, policy: WrapPolicy) -> Self {
        Self {
            expander,
            pager: ViewportPager::new(policy),
            device: None,
            caption: None,
            content: RichText::default(),
            value_text: String::new(),
            value_chars: 0,
            selection: (0, 0),
            editable: false,
            cells: Vec::new(),
            cell_to_text: Vec::new(),
        }
    }

    /// Attach or detach the physical display. `size` 0 detaches the window;
    /// caption-only mode keeps working either way.
    pub fn set_device(&mut self, device: Option<Box<dyn DisplayDevice>>, size: usize) {
        self.device = device;
        self.pager.set_display_size(size);
        self.refresh();
    }

    pub fn set_caption(&mut self, caption: Option<Box<dyn CaptionSink>>) {
        self.caption = caption;
        self.refresh();
    }

    pub fn set_display_size(&mut self, size: usize) {
        self.pager.set_display_size(size);
        self.refresh();
    }

    pub fn displayed_cells(&self) -> &[u8] {
        &self.cells
    }

    pub fn viewport(&self) -> std::ops::Range<usize> {
        self.pager.viewport()
    }

    /// Accept a content update from the IME side.
    ///
    /// Content without a value span is not editable and is shown whole with
    /// no cursor. Editable content is validated (a selection escaping the
    /// value logs, clears the entry state, and keeps the previous display),
    /// routed through the coordinator's interference check, annotated with
    /// the zero-width uncommitted-cells marker at the selection start, and
    /// re-rendered.
    pub fn on_content_changed(
        &mut self,
        rich: &RichText,
        coordinator: &mut InputCoordinator,
    ) -> Result<(), ContentError> {
        let Some(value) = rich.value() else {
            self.editable = false;
            self.value_text = rich.text.clone();
            self.value_chars = self.value_text.chars().count();
            self.content = rich.clone();
            self.render(coordinator);
            return Ok(());
        };
        let (value_start, value_end) = (value.start, value.end);
        let Some(sel) = rich.selection() else {
            warn!(target: "display.content", "editable content without a selection, dropped");
            coordinator.clear_entry_state();
            return Err(ContentError::MissingSelection);
        };
        if sel.start < value_start || sel.end > value_end || sel.start > sel.end {
            warn!(
                target: "display.content",
                sel_start = sel.start,
                sel_end = sel.end,
                "selection outside value, dropped"
            );
            coordinator.clear_entry_state();
            return Err(ContentError::SelectionOutsideValue);
        }

        let before = char_range(&rich.text, value_start, sel.start);
        let after = char_range(&rich.text, sel.end, value_end);
        coordinator.on_text_changed(before, after);

        self.editable = true;
        self.selection = (sel.start - value_start, sel.end - value_start);
        self.value_text = char_range(&rich.text, value_start, value_end).to_string();
        self.value_chars = self.value_text.chars().count();
        let marker = coordinator.uncommitted_cells();
        self.content = rich.clone();
        self.content.spans.push(Span {
            kind: SpanKind::Cells(marker),
            start: sel.start,
            end: sel.start,
        });
        self.render(coordinator);
        Ok(())
    }

    /// The uncommitted preview changed: write the buffer into the marker and
    /// re-render.
    pub fn on_uncommitted_cells(&mut self, cells: &[u8], coordinator: &InputCoordinator) {
        if let Some(span) = self
            .content
            .spans
            .iter_mut()
            .find(|s| matches!(s.kind, SpanKind::Cells(_)))
        {
            span.kind = SpanKind::Cells(cells.to_vec());
        }
        self.render(coordinator);
    }

    /// Route a pan key. Returns whether the window moved.
    pub fn on_pan_key(&mut self, command: KeyCommand) -> bool {
        let moved = match command {
            KeyCommand::PanLeft => self.pager.previous(),
            KeyCommand::PanRight => self.pager.next(),
            _ => return false,
        };
        if moved {
            self.refresh();
        }
        moved
    }

    /// Write the current window to the device (when attached) and mirror the
    /// corresponding text plus raw cells to the caption sink (when enabled).
    pub fn refresh(&mut self) {
        let vp = self.pager.viewport();
        let window: &[u8] = self.cells.get(vp.clone()).unwrap_or(&[]);
        let caption_text = if self.caption.is_some() {
            let t0 = self.cell_to_text.get(vp.start).copied().unwrap_or(0);
            let t1 = if vp.end < self.cell_to_text.len() {
                self.cell_to_text[vp.end]
            } else {
                self.value_chars
            };
            Some(char_range(&self.value_text, t0, t1).to_string())
        } else {
            None
        };
        if let Some(device) = self.device.as_mut() {
            device.write_cells(window);
        }
        if let Some(caption) = self.caption.as_mut()
            && let Some(text) = caption_text
        {
            caption.show(&text, window);
        }
        trace!(target: "display.pan", start = vp.start, end = vp.end, "refresh");
    }

    fn marker_cells(&self) -> Vec<u8> {
        self.content
            .spans
            .iter()
            .find_map(|s| match &s.kind {
                SpanKind::Cells(cells) if !cells.is_empty() => Some(cells.clone()),
                _ => None,
            })
            .unwrap_or_default()
    }

    /// Translate the value, splice the uncommitted preview, overlay the
    /// cursor, and hand the result to the pager targeting the caret.
    fn render(&mut self, coordinator: &InputCoordinator) {
        if !self.editable {
            let Some(tr) = self
                .expander
                .translate(&self.value_text, 0, ExpansionType::None)
            else {
                warn!(target: "display.content", "translation failed, keeping prior content");
                return;
            };
            self.cells = tr.cells;
            self.cell_to_text = tr.cell_to_text;
            self.pager.set_content(&self.cells, 0);
            self.refresh();
            return;
        }

        let (sel_start, sel_end) = self.selection;
        let expansion = coordinator.expansion_type();
        let Some(mut tr) = self.expander.translate(&self.value_text, sel_start, expansion) else {
            warn!(target: "display.content", "translation failed, keeping prior content");
            return;
        };

        let mut cursor_start = map_char(&tr, sel_start);
        let mut cursor_end = map_char(&tr, sel_end);

        let extra = self.marker_cells();
        if !extra.is_empty() {
            let at = cursor_start;
            tr.cells.splice(at..at, extra.iter().copied());
            for cell in tr.text_to_cell.iter_mut() {
                if *cell >= at {
                    *cell += extra.len();
                }
            }
            let anchor = sel_start.min(self.value_chars);
            tr.cell_to_text
                .splice(at..at, std::iter::repeat_n(anchor, extra.len()));
            // The caret sits on the cell right after the preview, where the
            // next typed cell lands.
            cursor_start = at + extra.len();
            cursor_end = cursor_start;
        }

        if cursor_start == tr.cells.len() {
            tr.cells.push(BLANK_CELL);
            tr.cell_to_text.push(self.value_chars);
        }
        if cursor_end <= cursor_start {
            cursor_end = cursor_start + 1;
        }
        let limit = tr.cells.len();
        for cell in &mut tr.cells[cursor_start..cursor_end.min(limit)] {
            *cell |= CURSOR_DOTS;
        }

        self.cells = tr.cells;
        self.cell_to_text = tr.cell_to_text;
        self.pager.set_content(&self.cells, cursor_start);
        self.refresh();
    }
}

/// Map a character position through the forward map; one past the last
/// character maps one past the last cell.
fn map_char(tr: &ForwardTranslation, index: usize) -> usize {
    tr.text_to_cell
        .get(index)
        .copied()
        .unwrap_or(tr.cells.len())
}
