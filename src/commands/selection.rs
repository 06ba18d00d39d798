// ============================================================================
// SELECTION COMMANDS: create, pull, move, resize/scale, deselect, delete
// ============================================================================

use ab_glyph::FontArc;

use crate::color::Color;
use crate::components::history::{Command, CommandState};
use crate::dimensions;
use crate::document::Document;
use crate::geometry::{Point, Rect};
use crate::selection::{Selection, SelectionTransparency};

use super::SavedArea;

fn text_or_selection(sel: &Selection, text: &str, image: &str) -> String {
    if sel.is_text() { format!("Text: {}", text) } else { format!("Selection: {}", image) }
}

/// Saved doc pixels under `rect`, clipped to the document.
fn saved_under(doc: &Document, rect: Rect) -> Option<SavedArea> {
    let rect = rect.intersected(&doc.rect());
    (!rect.is_empty()).then(|| SavedArea::of(doc, rect))
}

// ---------------------------------------------------------------------------
//  Create
// ---------------------------------------------------------------------------

/// Puts a new selection on the document.  Whatever selection was there is
/// put back on undo.
pub struct SelectionCreateCommand {
    selection: Selection,
    previous: Option<Selection>,
    state: CommandState,
}

impl SelectionCreateCommand {
    pub fn new(selection: Selection) -> Self {
        Self {
            selection,
            previous: None,
            state: CommandState::Created,
        }
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }
}

impl Command for SelectionCreateCommand {
    fn execute(&mut self, doc: &mut Document) {
        if self.state.try_apply(&self.name()) {
            self.previous = doc.take_selection();
            doc.set_selection(self.selection.clone());
        }
    }

    fn unexecute(&mut self, doc: &mut Document) {
        if !self.state.try_revert(&self.name()) {
            return;
        }
        match self.previous.take() {
            Some(prev) => doc.set_selection(prev),
            None => doc.selection_delete(),
        }
    }

    fn name(&self) -> String {
        text_or_selection(&self.selection, "Create Box", "Create")
    }

    fn size(&self) -> i32 {
        dimensions::sum_sizes([self.selection.size(), self.previous.as_ref().map_or(0, Selection::size)])
    }

    fn state(&self) -> CommandState {
        self.state
    }
}

// ---------------------------------------------------------------------------
//  Pull
// ---------------------------------------------------------------------------

/// Lifts the pixels under the selection border into the selection.
pub struct SelectionPullCommand {
    background: Color,
    saved: Option<SavedArea>,
    state: CommandState,
}

impl SelectionPullCommand {
    /// `background` fills the hole left in the document.
    pub fn new(background: Color) -> Self {
        Self {
            background,
            saved: None,
            state: CommandState::Created,
        }
    }
}

impl Command for SelectionPullCommand {
    fn execute(&mut self, doc: &mut Document) {
        if !self.state.try_apply(&self.name()) {
            return;
        }
        let Some(rect) = doc.selection().map(Selection::rect) else {
            log_err!("{}: no selection", self.name());
            return;
        };
        self.saved = saved_under(doc, rect);
        doc.selection_pull_from_document(self.background);
    }

    fn unexecute(&mut self, doc: &mut Document) {
        if !self.state.try_revert(&self.name()) {
            return;
        }
        if let Some(saved) = self.saved.take() {
            saved.restore(doc);
        }
        if let Some(sel) = doc.selection_mut() {
            sel.set_pixmap(None);
        }
    }

    fn name(&self) -> String {
        "Selection: Pull From Document".to_string()
    }

    fn size(&self) -> i32 {
        self.saved.as_ref().map_or(0, SavedArea::size)
    }

    fn state(&self) -> CommandState {
        self.state
    }
}

// ---------------------------------------------------------------------------
//  Move
// ---------------------------------------------------------------------------

/// Drags the selection around, optionally stamping copies of it onto the
/// document on the way (copy with control, smear with shift).
///
/// The move is built live by the selection tool and recorded applied.
pub struct SelectionMoveCommand {
    name: String,
    start: Point,
    end: Point,
    saved: Option<SavedArea>,
    copy_points: Vec<Point>,
    document_bounding_rect: Rect,
    state: CommandState,
}

impl SelectionMoveCommand {
    pub fn new(name: impl Into<String>, doc: &Document) -> Self {
        let start = doc.selection().map_or(Point::default(), Selection::top_left);
        Self {
            name: name.into(),
            start,
            end: start,
            saved: None,
            copy_points: Vec::new(),
            document_bounding_rect: Rect::default(),
            state: CommandState::Created,
        }
    }

    pub fn start_point(&self) -> Point {
        self.start
    }

    pub fn end_point(&self) -> Point {
        self.end
    }

    pub fn moved(&self) -> bool {
        self.start != self.end || !self.copy_points.is_empty()
    }

    pub fn move_to(&mut self, doc: &mut Document, top_left: Point) {
        if let Some(sel) = doc.selection_mut() {
            sel.move_to(top_left);
            self.end = top_left;
        }
    }

    /// Stamps the selection onto the document where it is now.
    pub fn copy_onto_document(&mut self, doc: &mut Document) {
        let Some(rect) = doc.selection().filter(|s| s.has_pixmap()).map(Selection::rect) else {
            log_err!("{}: copy onto document needs a pulled selection", self.name);
            return;
        };
        if self.saved.is_none() {
            self.saved = Some(SavedArea::whole(doc));
        }
        doc.selection_copy_onto_document(true);
        self.document_bounding_rect = self.document_bounding_rect.united(&rect);
        self.copy_points.push(rect.top_left());
    }

    /// Ends the drag.  Only the stamped area of the old document is kept.
    pub fn finalize(&mut self) {
        if let Some(saved) = &mut self.saved {
            let rect = self.document_bounding_rect.intersected(&saved.rect());
            if rect.is_empty() {
                self.saved = None;
            } else {
                saved.crop(rect);
            }
        }
        self.state.try_apply(&self.name);
    }

    /// Aborts the drag: stamps are removed and the selection goes back.
    pub fn cancel(&mut self, doc: &mut Document) {
        if !self.state.try_cancel(&self.name) {
            return;
        }
        if let Some(saved) = self.saved.take() {
            saved.restore(doc);
        }
        let start = self.start;
        if let Some(sel) = doc.selection_mut() {
            sel.move_to(start);
        }
    }
}

impl Command for SelectionMoveCommand {
    fn execute(&mut self, doc: &mut Document) {
        if !self.state.try_apply(&self.name) {
            return;
        }
        if let Some(saved) = &mut self.saved {
            saved.swap(doc);
        }
        let end = self.end;
        if let Some(sel) = doc.selection_mut() {
            sel.move_to(end);
        }
    }

    fn unexecute(&mut self, doc: &mut Document) {
        if !self.state.try_revert(&self.name) {
            return;
        }
        if let Some(saved) = &mut self.saved {
            saved.swap(doc);
        }
        let start = self.start;
        if let Some(sel) = doc.selection_mut() {
            sel.move_to(start);
        }
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn size(&self) -> i32 {
        dimensions::sum_sizes([
            self.saved.as_ref().map_or(0, SavedArea::size),
            dimensions::point_array_size(&self.copy_points),
        ])
    }

    fn state(&self) -> CommandState {
        self.state
    }
}

// ---------------------------------------------------------------------------
//  Resize / scale from the handles
// ---------------------------------------------------------------------------

/// Resizes the selection to a new rect, always scaling from the pixels it
/// had when the drag began so repeated previews do not degrade them.
pub struct SelectionResizeScaleCommand {
    original: Selection,
    new_rect: Rect,
    smooth: bool,
    font: Option<FontArc>,
    state: CommandState,
}

impl SelectionResizeScaleCommand {
    /// `None` without a selection.
    pub fn new(doc: &Document, smooth: bool, font: Option<FontArc>) -> Option<Self> {
        let original = doc.selection()?.clone();
        Some(Self {
            new_rect: original.rect(),
            original,
            smooth,
            font,
            state: CommandState::Created,
        })
    }

    pub fn original_selection(&self) -> &Selection {
        &self.original
    }

    pub fn new_rect(&self) -> Rect {
        self.new_rect
    }

    fn resized(&self) -> Selection {
        let r = self.new_rect;
        let mut sel = if r.width == self.original.width() && r.height == self.original.height() {
            self.original.clone()
        } else {
            self.original.resized_scaled(r.width, r.height, self.smooth, self.font.as_ref())
        };
        sel.move_to(r.top_left());
        sel
    }

    /// Live update while dragging a handle.
    pub fn resize_and_move_to(&mut self, doc: &mut Document, rect: Rect) {
        self.new_rect = Rect::new(rect.x, rect.y, rect.width.max(1), rect.height.max(1));
        doc.set_selection(self.resized());
    }

    pub fn finalize(&mut self) {
        self.state.try_apply(&self.name());
    }

    pub fn cancel(&mut self, doc: &mut Document) {
        if self.state.try_cancel(&self.name()) {
            doc.set_selection(self.original.clone());
        }
    }
}

impl Command for SelectionResizeScaleCommand {
    fn execute(&mut self, doc: &mut Document) {
        if self.state.try_apply(&self.name()) {
            doc.set_selection(self.resized());
        }
    }

    fn unexecute(&mut self, doc: &mut Document) {
        if self.state.try_revert(&self.name()) {
            doc.set_selection(self.original.clone());
        }
    }

    fn name(&self) -> String {
        let image = if self.smooth { "Smooth Scale" } else { "Scale" };
        text_or_selection(&self.original, "Resize Box", image)
    }

    fn size(&self) -> i32 {
        self.original.size()
    }

    fn state(&self) -> CommandState {
        self.state
    }
}

// ---------------------------------------------------------------------------
//  Deselect / delete
// ---------------------------------------------------------------------------

/// Removes the selection.  Deselecting composites its pixels onto the
/// document first; deleting throws them away.
pub struct SelectionDestroyCommand {
    push_onto_document: bool,
    old_selection: Option<Selection>,
    saved: Option<SavedArea>,
    state: CommandState,
}

impl SelectionDestroyCommand {
    pub fn deselect() -> Self {
        Self::new(true)
    }

    pub fn delete() -> Self {
        Self::new(false)
    }

    fn new(push_onto_document: bool) -> Self {
        Self {
            push_onto_document,
            old_selection: None,
            saved: None,
            state: CommandState::Created,
        }
    }
}

impl Command for SelectionDestroyCommand {
    fn execute(&mut self, doc: &mut Document) {
        if !self.state.try_apply(&self.name()) {
            return;
        }
        let Some(sel) = doc.selection().cloned() else {
            log_warn!("{}: nothing selected", self.name());
            return;
        };
        if self.push_onto_document && sel.has_pixmap() {
            self.saved = saved_under(doc, sel.rect());
            doc.selection_push_onto_document();
        } else {
            doc.selection_delete();
        }
        self.old_selection = Some(sel);
    }

    fn unexecute(&mut self, doc: &mut Document) {
        if !self.state.try_revert(&self.name()) {
            return;
        }
        if let Some(saved) = self.saved.take() {
            saved.restore(doc);
        }
        if let Some(sel) = self.old_selection.take() {
            doc.set_selection(sel);
        }
    }

    fn name(&self) -> String {
        let is_text = self.old_selection.as_ref().is_some_and(Selection::is_text);
        match (self.push_onto_document, is_text) {
            (true, true) => "Text: Finish".to_string(),
            (true, false) => "Selection: Deselect".to_string(),
            (false, true) => "Text: Delete Box".to_string(),
            (false, false) => "Selection: Delete".to_string(),
        }
    }

    fn size(&self) -> i32 {
        dimensions::sum_sizes([
            self.old_selection.as_ref().map_or(0, Selection::size),
            self.saved.as_ref().map_or(0, SavedArea::size),
        ])
    }

    fn state(&self) -> CommandState {
        self.state
    }
}

// ---------------------------------------------------------------------------
//  Transparency
// ---------------------------------------------------------------------------

/// Switches the selection between opaque and transparent compositing.
///
/// The tool setting and the selection's own setting are kept apart: a
/// floating selection may carry a transparency the tool no longer has.
pub struct SelectionTransparencyCommand {
    /// Value to put into the tool colours on the next swap.
    tool: SelectionTransparency,
    /// Value to put onto the selection on the next swap.
    selection: SelectionTransparency,
    state: CommandState,
}

impl SelectionTransparencyCommand {
    pub fn new(transparency: SelectionTransparency) -> Self {
        Self {
            tool: transparency,
            selection: transparency,
            state: CommandState::Created,
        }
    }

    fn swap(&mut self, doc: &mut Document) {
        let old_tool = std::mem::replace(&mut doc.colors.selection_transparency, self.tool);
        self.tool = old_tool;
        if let Some(sel) = doc.selection_mut() {
            let old_selection = sel.transparency();
            sel.set_transparency(self.selection);
            self.selection = old_selection;
        }
    }
}

impl Command for SelectionTransparencyCommand {
    fn execute(&mut self, doc: &mut Document) {
        if self.state.try_apply(&self.name()) {
            self.swap(doc);
        }
    }

    fn unexecute(&mut self, doc: &mut Document) {
        if self.state.try_revert(&self.name()) {
            self.swap(doc);
        }
    }

    fn name(&self) -> String {
        "Selection: Transparency".to_string()
    }

    fn size(&self) -> i32 {
        0
    }

    fn state(&self) -> CommandState {
        self.state
    }
}
