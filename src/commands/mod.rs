//! Concrete undoable commands.  Every command receives the `Document` it
//! acts upon; none of them keeps a reference to it between calls.

pub mod color_picker;
pub mod effect;
pub mod flow;
pub mod selection;
pub mod shape;
pub mod transform;

pub use color_picker::ColorPickerCommand;
pub use effect::{EffectCommand, EffectKind};
pub use flow::{Brush, BrushShape, FlowCommand, FlowTool, SprayRng};
pub use selection::{
    SelectionCreateCommand, SelectionDestroyCommand, SelectionMoveCommand, SelectionPullCommand,
    SelectionResizeScaleCommand, SelectionTransparencyCommand,
};
pub use shape::ShapeCommand;
pub use transform::{AutoCropCommand, FlipCommand, ResizeScaleCommand, ResizeScaleMode, RotateCommand, SkewCommand};

use crate::document::Document;
use crate::geometry::Rect;
use crate::pixmap::Pixmap;

/// "Selection: " prefix for commands acting on a pulled selection.
pub fn selection_prefixed(acts_on_selection: bool, name: &str) -> String {
    if acts_on_selection {
        format!("Selection: {}", name)
    } else {
        name.to_string()
    }
}

/// Document pixels saved before an in-place edit.
///
/// Starts as a copy of the whole document and is cropped to the touched
/// area once the edit is known.  Indexed documents stay whole: drawing
/// promotes them to direct colour, and only a full swap gives the palette
/// data back.
#[derive(Clone, Debug)]
pub(crate) struct SavedArea {
    rect: Rect,
    pixmap: Pixmap,
    /// Whether the document carried a mask when `pixmap` was taken.
    doc_had_mask: bool,
}

impl SavedArea {
    pub(crate) fn whole(doc: &Document) -> Self {
        Self {
            rect: doc.rect(),
            pixmap: doc.pixmap().clone(),
            doc_had_mask: doc.pixmap().has_mask(),
        }
    }

    pub(crate) fn of(doc: &Document, rect: Rect) -> Self {
        if doc.pixmap().is_indexed() {
            return Self::whole(doc);
        }
        Self {
            rect,
            pixmap: doc.region(rect),
            doc_had_mask: doc.pixmap().has_mask(),
        }
    }

    pub(crate) fn rect(&self) -> Rect {
        self.rect
    }

    pub(crate) fn is_whole(&self, doc: &Document) -> bool {
        self.rect == doc.rect() && self.pixmap.width() == doc.width() && self.pixmap.height() == doc.height()
    }

    /// Keeps only `rect` of a whole-document copy.
    pub(crate) fn crop(&mut self, rect: Rect) {
        if self.pixmap.is_indexed() || rect == self.rect {
            return;
        }
        let local = rect.translated(-self.rect.x, -self.rect.y);
        self.pixmap = self.pixmap.region(local);
        self.rect = rect;
    }

    /// Puts the saved pixels back and keeps the ones they replaced.
    pub(crate) fn swap(&mut self, doc: &mut Document) {
        if self.is_whole(doc) || self.pixmap.is_indexed() {
            let saved = std::mem::replace(&mut self.pixmap, Pixmap::default());
            self.pixmap = doc.replace_pixmap(saved);
            self.doc_had_mask = self.pixmap.has_mask();
            self.rect = doc.rect();
            return;
        }
        let current = doc.region(self.rect);
        let had_mask = doc.pixmap().has_mask();
        self.put_back(doc);
        self.pixmap = current;
        self.doc_had_mask = had_mask;
    }

    /// Restores the saved pixels, discarding the current ones.
    pub(crate) fn restore(&self, doc: &mut Document) {
        if self.is_whole(doc) || self.pixmap.is_indexed() {
            doc.set_pixmap(self.pixmap.clone());
            return;
        }
        self.put_back(doc);
    }

    /// Writes the saved pixels and gives the document its old mask state.
    fn put_back(&self, doc: &mut Document) {
        if self.doc_had_mask {
            doc.pixmap_mut().ensure_mask();
        }
        doc.set_pixmap_at(&self.pixmap, self.rect.top_left());
        if !self.doc_had_mask {
            doc.pixmap_mut().drop_opaque_mask();
        }
    }

    pub(crate) fn size(&self) -> i32 {
        self.pixmap.byte_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Color;
    use crate::geometry::Point;

    #[test]
    fn crop_then_swap_restores_region() {
        let mut doc = Document::new(8, 8, Color::WHITE);
        let mut saved = SavedArea::whole(&doc);
        doc.pixmap_mut().fill_rect(Rect::new(2, 2, 2, 2), Color::RED);
        saved.crop(Rect::new(2, 2, 2, 2));
        assert_eq!(saved.rect(), Rect::new(2, 2, 2, 2));

        saved.swap(&mut doc);
        assert_eq!(doc.color_at(Point::new(3, 3)), Color::WHITE);
        saved.swap(&mut doc);
        assert_eq!(doc.color_at(Point::new(3, 3)), Color::RED);
    }

    #[test]
    fn swap_keeps_an_opaque_mask() {
        let mut doc = Document::new(8, 8, Color::WHITE);
        doc.pixmap_mut().ensure_mask();
        let before = doc.pixmap().clone();
        let mut saved = SavedArea::of(&doc, Rect::new(1, 1, 3, 3));
        doc.pixmap_mut().fill_rect(Rect::new(1, 1, 3, 3), Color::RED);

        saved.swap(&mut doc);
        assert!(doc.pixmap().has_mask());
        assert_eq!(doc.pixmap(), &before);

        saved.swap(&mut doc);
        assert_eq!(doc.color_at(Point::new(2, 2)), Color::RED);
        saved.restore(&mut doc);
        assert_eq!(doc.pixmap(), &before);
    }

    #[test]
    fn swap_drops_a_mask_the_document_never_had() {
        let mut doc = Document::new(8, 8, Color::WHITE);
        let mut saved = SavedArea::of(&doc, Rect::new(0, 0, 2, 2));
        doc.pixmap_mut().set_pixel(Point::new(1, 1), Color::TRANSPARENT);
        assert!(doc.pixmap().has_mask());

        saved.swap(&mut doc);
        assert!(!doc.pixmap().has_mask());
        saved.swap(&mut doc);
        assert!(doc.color_at(Point::new(1, 1)).is_transparent());
    }

    #[test]
    fn prefix_only_for_selection() {
        assert_eq!(selection_prefixed(true, "Invert"), "Selection: Invert");
        assert_eq!(selection_prefixed(false, "Invert"), "Invert");
    }
}
