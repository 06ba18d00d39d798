use crate::components::history::{Command, CommandState};
use crate::document::Document;
use crate::geometry::{Point, Rect};
use crate::ops::shapes::{ShapeKind, ShapeStyle};

use super::SavedArea;

/// A polygonal or rectangular shape drawn onto the document.
///
/// Used two ways.  Built with all its points and pushed, `execute` saves
/// the area under the shape and draws it.  Driven by a drag, `preview`
/// redraws the shape over a snapshot on every pointer move and `finalize`
/// keeps only the area the final shape covers; the command is then
/// recorded with `HistoryManager::push_applied`.
pub struct ShapeCommand {
    kind: ShapeKind,
    points: Vec<Point>,
    style: ShapeStyle,
    saved: Option<SavedArea>,
    state: CommandState,
}

impl ShapeCommand {
    pub fn new(kind: ShapeKind, points: Vec<Point>, style: ShapeStyle) -> Self {
        Self {
            kind,
            points,
            style,
            saved: None,
            state: CommandState::Created,
        }
    }

    pub fn kind(&self) -> ShapeKind {
        self.kind
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn style(&self) -> &ShapeStyle {
        &self.style
    }

    /// Document area the shape covers.
    pub fn bounding_rect(&self, doc: &Document) -> Rect {
        self.kind.bounding_rect(&self.points, &self.style).intersected(&doc.rect())
    }

    fn draw(&self, doc: &mut Document) {
        let (kind, style) = (self.kind, self.style);
        kind.render(doc.pixmap_mut(), &self.points, &style);
        if !doc.pixmap().is_indexed() {
            doc.pixmap_mut().drop_opaque_mask();
        }
    }

    /// Replaces the points and redraws over the pre-drag document.
    pub fn preview(&mut self, doc: &mut Document, points: Vec<Point>) {
        if self.state != CommandState::Created {
            log_err!("{}: preview after the gesture ended", self.name());
            return;
        }
        match &self.saved {
            Some(saved) => saved.restore(doc),
            None => self.saved = Some(SavedArea::whole(doc)),
        }
        self.points = points;
        self.draw(doc);
    }

    /// Ends the drag with the shape on the document.
    pub fn finalize(&mut self, doc: &Document) {
        let rect = self.bounding_rect(doc);
        if let Some(saved) = &mut self.saved
            && !rect.is_empty()
        {
            saved.crop(rect);
        }
        self.state.try_apply(self.kind.label());
    }

    /// Aborts the drag, putting the document back.
    pub fn cancel(&mut self, doc: &mut Document) {
        if self.state.try_cancel(self.kind.label())
            && let Some(saved) = self.saved.take()
        {
            saved.restore(doc);
        }
    }
}

impl Command for ShapeCommand {
    fn execute(&mut self, doc: &mut Document) {
        if !self.state.try_apply(self.kind.label()) {
            return;
        }
        match &mut self.saved {
            Some(saved) => saved.swap(doc),
            None => {
                let rect = self.bounding_rect(doc);
                if rect.is_empty() {
                    return;
                }
                self.saved = Some(SavedArea::of(doc, rect));
                self.draw(doc);
            }
        }
    }

    fn unexecute(&mut self, doc: &mut Document) {
        if !self.state.try_revert(self.kind.label()) {
            return;
        }
        if let Some(saved) = &mut self.saved {
            saved.swap(doc);
        }
    }

    fn name(&self) -> String {
        self.kind.label().to_string()
    }

    fn size(&self) -> i32 {
        let saved = self.saved.as_ref().map_or(0, SavedArea::size);
        crate::dimensions::sum_sizes([saved, crate::dimensions::point_array_size(&self.points)])
    }

    fn state(&self) -> CommandState {
        self.state
    }
}
