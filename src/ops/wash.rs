// ============================================================================
// COLOR WASH: replace runs of similar pixels (colour eraser)
// ============================================================================
//
// Rows are scanned left to right and every maximal run of pixels similar to
// the colour being replaced becomes one horizontal line, instead of one write
// per pixel.

use crate::color::Color;
use crate::geometry::{Point, Rect, interpolate_points, needed_rect};
use crate::pixmap::Pixmap;

/// One horizontal run, inclusive on both ends, in image coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WashRun {
    pub y: i32,
    pub x0: i32,
    pub x1: i32,
}

impl WashRun {
    pub fn len(&self) -> i32 {
        self.x1 - self.x0 + 1
    }

    pub fn is_empty(&self) -> bool {
        self.x1 < self.x0
    }
}

/// Scans `draw_rect` (document coordinates) of `image`, whose top-left sits
/// at `image_rect`'s top-left, and hands every run matching
/// `color_to_replace` to `sink`.  Returns whether any run was emitted.
///
/// Pixels outside `image` read as `Color::Invalid` and never match.
pub fn wash(
    image: &Pixmap,
    image_rect: Rect,
    draw_rect: Rect,
    color_to_replace: Color,
    processed_similarity: i32,
    mut sink: impl FnMut(WashRun),
) -> bool {
    if draw_rect.is_empty() {
        return false;
    }
    let mut did_something = false;
    let min_x = draw_rect.left() - image_rect.left();
    let max_x = draw_rect.right() - image_rect.left();
    let min_y = draw_rect.top() - image_rect.top();
    let max_y = draw_rect.bottom() - image_rect.top();

    for y in min_y..=max_y {
        let mut start: Option<i32> = None;
        for x in min_x..=max_x {
            let similar = image
                .color_at(Point::new(x, y))
                .is_similar_to(&color_to_replace, processed_similarity);
            match (similar, start) {
                (true, None) => start = Some(x),
                (false, Some(x0)) => {
                    sink(WashRun { y, x0, x1: x - 1 });
                    did_something = true;
                    start = None;
                }
                _ => {}
            }
        }
        if let Some(x0) = start {
            sink(WashRun { y, x0, x1: max_x });
            did_something = true;
        }
    }
    did_something
}

/// Collected runs of a `wash` over `draw_rect`.
pub fn wash_runs(
    image: &Pixmap,
    image_rect: Rect,
    draw_rect: Rect,
    color_to_replace: Color,
    processed_similarity: i32,
) -> Vec<WashRun> {
    let mut runs = Vec::new();
    wash(image, image_rect, draw_rect, color_to_replace, processed_similarity, |r| {
        runs.push(r)
    });
    runs
}

/// Brush footprint centred on `p`.
pub fn hot_rect(p: Point, brush_width: i32, brush_height: i32) -> Rect {
    Rect::new(p.x - brush_width / 2, p.y - brush_height / 2, brush_width, brush_height)
}

/// Parameters of a colour wash.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WashStyle {
    pub color_to_replace: Color,
    pub replacement: Color,
    pub processed_similarity: i32,
    pub brush_width: i32,
    pub brush_height: i32,
}

impl WashStyle {
    /// Nothing could change: replacing a colour with itself exactly.
    pub fn is_noop(&self) -> bool {
        self.color_to_replace == self.replacement && self.processed_similarity == 0
    }
}

/// Washes along the segment `last -> this` with the brush footprint.
///
/// Returns the touched document rect and its new pixels, or `None` when no
/// pixel matched.
pub fn wash_line(doc: &Pixmap, this: Point, last: Point, style: &WashStyle) -> Option<(Rect, Pixmap)> {
    if style.is_noop() {
        return None;
    }
    let doc_rect = needed_rect(
        Rect::from_points(this, last),
        style.brush_width.max(style.brush_height),
    );
    let snapshot = doc.region(doc_rect);
    let mut out = snapshot.clone();
    let mut did_something = false;
    for p in interpolate_points(this, last) {
        let hot = hot_rect(p, style.brush_width, style.brush_height);
        did_something |= wash(
            &snapshot,
            doc_rect,
            hot,
            style.color_to_replace,
            style.processed_similarity,
            |run| out.draw_hline(run.y, run.x0, run.x1, style.replacement),
        );
    }
    did_something.then_some((doc_rect, out))
}

/// Washes the whole image.  `None` when nothing matched.
pub fn global_wash(doc: &Pixmap, style: &WashStyle) -> Option<Pixmap> {
    if style.is_noop() {
        return None;
    }
    let rect = doc.rect();
    let mut out = doc.clone();
    let did_something = wash(
        doc,
        rect,
        rect,
        style.color_to_replace,
        style.processed_similarity,
        |run| out.draw_hline(run.y, run.x0, run.x1, style.replacement),
    );
    did_something.then_some(out)
}
