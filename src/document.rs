// ============================================================================
// DOCUMENT: the image being edited and everything commands act upon
// ============================================================================

use std::collections::BTreeMap;
use std::path::PathBuf;

use uuid::Uuid;

use crate::color::{Color, ColorSimilarity};
use crate::geometry::{Point, Rect};
use crate::pixmap::{MASK_TRANSPARENT, Pixmap};
use crate::selection::{Selection, SelectionKind, SelectionTransparency};

/// Dots per metre is what PNG stores; 0 means unspecified.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MetaInfo {
    pub dots_per_meter_x: i32,
    pub dots_per_meter_y: i32,
    pub offset: Point,
    pub text: BTreeMap<String, String>,
}

impl MetaInfo {
    pub fn dpi(&self) -> Option<(f64, f64)> {
        if self.dots_per_meter_x <= 0 || self.dots_per_meter_y <= 0 {
            return None;
        }
        let to_dpi = |dpm: i32| dpm as f64 * 0.0254;
        Some((to_dpi(self.dots_per_meter_x), to_dpi(self.dots_per_meter_y)))
    }

    pub fn set_dpi(&mut self, x: f64, y: f64) {
        self.dots_per_meter_x = (x / 0.0254).round() as i32;
        self.dots_per_meter_y = (y / 0.0254).round() as i32;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SaveOptions {
    /// 1, 8, 24 or 32; `None` keeps whatever the image needs.
    pub color_depth: Option<u8>,
    pub dither: bool,
    /// JPEG/WebP quality, 1..=100.
    pub quality: u8,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            color_depth: None,
            dither: false,
            quality: 90,
        }
    }
}

/// Colours and tolerances the tools draw with.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ToolColors {
    pub foreground: Color,
    pub background: Color,
    pub similarity: ColorSimilarity,
    pub selection_transparency: SelectionTransparency,
}

impl Default for ToolColors {
    fn default() -> Self {
        Self {
            foreground: Color::BLACK,
            background: Color::WHITE,
            similarity: ColorSimilarity::EXACT,
            selection_transparency: SelectionTransparency::default(),
        }
    }
}

impl ToolColors {
    /// Foreground for the left button, background for the right one.
    pub fn color(&self, button: usize) -> Color {
        if button == 0 { self.foreground } else { self.background }
    }

    pub fn set_color(&mut self, button: usize, color: Color) {
        if button == 0 {
            self.foreground = color;
        } else {
            self.background = color;
        }
    }
}

#[derive(Debug)]
pub struct Document {
    pixmap: Pixmap,
    selection: Option<Selection>,
    pub meta: MetaInfo,
    pub save_options: SaveOptions,
    pub colors: ToolColors,
    pub uuid: Uuid,
    pub path: Option<PathBuf>,
    modified: bool,
}

impl Document {
    /// New `width x height` document filled with `background`.
    pub fn new(width: i32, height: i32, background: Color) -> Self {
        Self::from_pixmap(Pixmap::filled(width, height, background))
    }

    pub fn from_pixmap(pixmap: Pixmap) -> Self {
        Self {
            pixmap,
            selection: None,
            meta: MetaInfo::default(),
            save_options: SaveOptions::default(),
            colors: ToolColors::default(),
            uuid: Uuid::new_v4(),
            path: None,
            modified: false,
        }
    }

    pub fn width(&self) -> i32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> i32 {
        self.pixmap.height()
    }

    pub fn rect(&self) -> Rect {
        self.pixmap.rect()
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn set_modified(&mut self, modified: bool) {
        self.modified = modified;
    }

    // ---------------------------------------------------------------------
    //  Pixels
    // ---------------------------------------------------------------------

    pub fn pixmap(&self) -> &Pixmap {
        &self.pixmap
    }

    /// Mutable pixels; marks the document modified.
    pub fn pixmap_mut(&mut self) -> &mut Pixmap {
        self.modified = true;
        &mut self.pixmap
    }

    pub fn set_pixmap(&mut self, pixmap: Pixmap) {
        self.pixmap = pixmap;
        self.modified = true;
    }

    /// Swaps in `pixmap` and returns the old one.
    pub fn replace_pixmap(&mut self, pixmap: Pixmap) -> Pixmap {
        self.modified = true;
        std::mem::replace(&mut self.pixmap, pixmap)
    }

    /// Pixels of `rect`; outside the document reads as transparent.
    pub fn region(&self, rect: Rect) -> Pixmap {
        self.pixmap.region(rect)
    }

    /// Writes `pm` with its top-left at `at`, replacing colour and opacity.
    pub fn set_pixmap_at(&mut self, pm: &Pixmap, at: Point) {
        if pm.is_null() {
            return;
        }
        let had_mask = self.pixmap.has_mask();
        self.pixmap.set_region(Rect::new(at.x, at.y, pm.width(), pm.height()), pm);
        if !had_mask {
            self.pixmap.drop_opaque_mask();
        }
        self.modified = true;
    }

    pub fn paint_pixmap_at(&mut self, pm: &Pixmap, at: Point) {
        self.pixmap.paint_region(at, pm);
        self.modified = true;
    }

    pub fn color_at(&self, p: Point) -> Color {
        self.pixmap.color_at(p)
    }

    /// Document with any pulled selection composited on top.
    pub fn flattened(&self) -> Pixmap {
        let mut out = self.pixmap.clone();
        if let Some(sel) = &self.selection
            && let Some(pm) = sel.transparent_pixmap()
        {
            out.paint_region(sel.top_left(), &pm);
        }
        out
    }

    // ---------------------------------------------------------------------
    //  Selection
    // ---------------------------------------------------------------------

    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    pub fn selection_mut(&mut self) -> Option<&mut Selection> {
        self.selection.as_mut()
    }

    pub fn set_selection(&mut self, selection: Selection) {
        self.selection = Some(selection);
    }

    pub fn take_selection(&mut self) -> Option<Selection> {
        self.selection.take()
    }

    pub fn has_pulled_selection(&self) -> bool {
        self.selection.as_ref().is_some_and(Selection::has_pixmap)
    }

    /// Drops the selection without touching the document.
    pub fn selection_delete(&mut self) {
        self.selection = None;
    }

    /// Moves the pixels under the selection into it.  The hole left behind
    /// gets `background`, or turns transparent when that is not opaque.
    pub fn selection_pull_from_document(&mut self, background: Color) {
        let Some(sel) = self.selection.as_mut() else {
            debug_assert!(false, "pull without a selection");
            log_err!("selection_pull_from_document: no selection");
            return;
        };
        if sel.has_pixmap() {
            debug_assert!(false, "selection already pulled");
            log_err!("selection_pull_from_document: already pulled");
            return;
        }
        let rect = sel.rect();
        let pulled = sel.apply_shape_mask(&self.pixmap.region(rect));
        let hole = if background.is_opaque() { background } else { Color::TRANSPARENT };
        match sel.kind() {
            SelectionKind::Rectangle | SelectionKind::Text => self.pixmap.fill_rect(rect, hole),
            _ => {
                let shape = sel.shape_mask();
                for (x, y, m) in shape.enumerate_pixels() {
                    if m[0] != MASK_TRANSPARENT {
                        self.pixmap
                            .set_pixel(Point::new(rect.x + x as i32, rect.y + y as i32), hole);
                    }
                }
            }
        }
        sel.set_pixmap(Some(pulled));
        self.modified = true;
    }

    /// Composites the pulled selection onto the document, keeping the
    /// selection.  `use_transparency` applies the knock-out colour.
    pub fn selection_copy_onto_document(&mut self, use_transparency: bool) {
        let Some(sel) = &self.selection else {
            return;
        };
        let pm = if use_transparency { sel.transparent_pixmap() } else { sel.opaque_pixmap() };
        let Some(pm) = pm else {
            debug_assert!(false, "copy onto document before pull");
            log_err!("selection_copy_onto_document: selection not pulled");
            return;
        };
        self.pixmap.paint_region(sel.top_left(), &pm);
        self.modified = true;
    }

    /// Composites the selection onto the document and drops it.  A border
    /// that was never pulled simply disappears.
    pub fn selection_push_onto_document(&mut self) {
        if self.has_pulled_selection() {
            self.selection_copy_onto_document(true);
        }
        self.selection = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn striped() -> Document {
        let mut doc = Document::new(6, 6, Color::WHITE);
        doc.pixmap_mut().fill_rect(Rect::new(0, 0, 3, 6), Color::RED);
        doc.set_modified(false);
        doc
    }

    #[test]
    fn pull_leaves_background_hole() {
        let mut doc = striped();
        doc.set_selection(Selection::rectangle(Rect::new(1, 1, 3, 3)));
        doc.selection_pull_from_document(Color::BLUE);
        assert!(doc.is_modified());
        assert_eq!(doc.color_at(Point::new(2, 2)), Color::BLUE);
        let pm = doc.selection().and_then(Selection::pixmap).cloned().unwrap();
        assert_eq!(pm.color_at(Point::new(0, 0)), Color::RED);
        assert_eq!(pm.color_at(Point::new(2, 0)), Color::WHITE);
    }

    #[test]
    fn transparent_background_hole() {
        let mut doc = striped();
        doc.set_selection(Selection::rectangle(Rect::new(0, 0, 2, 2)));
        doc.selection_pull_from_document(Color::TRANSPARENT);
        assert!(doc.color_at(Point::new(1, 1)).is_transparent());
    }

    #[test]
    fn push_back_after_move() {
        let mut doc = striped();
        doc.set_selection(Selection::rectangle(Rect::new(0, 0, 1, 1)));
        doc.selection_pull_from_document(Color::WHITE);
        doc.selection_mut().unwrap().move_to(Point::new(5, 5));
        doc.selection_push_onto_document();
        assert!(doc.selection().is_none());
        assert_eq!(doc.color_at(Point::new(0, 0)), Color::WHITE);
        assert_eq!(doc.color_at(Point::new(5, 5)), Color::RED);
    }

    #[test]
    fn unpulled_border_push_is_noop() {
        let mut doc = striped();
        let before = doc.pixmap().clone();
        doc.set_selection(Selection::ellipse(Rect::new(0, 0, 4, 4)));
        doc.selection_push_onto_document();
        assert_eq!(doc.pixmap(), &before);
    }

    #[test]
    fn dpi_round_trip() {
        let mut meta = MetaInfo::default();
        assert!(meta.dpi().is_none());
        meta.set_dpi(72.0, 72.0);
        assert_eq!(meta.dots_per_meter_x, 2835);
        let (x, _) = meta.dpi().unwrap();
        assert!((x - 72.0).abs() < 0.1);
    }
}
