// ============================================================================
// AUTOCROP: locate uniform borders around the image content
// ============================================================================

use crate::color::Color;
use crate::geometry::{Point, Rect};
use crate::pixmap::Pixmap;

/// A strip along one edge whose pixels all match `color`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CropBorder {
    pub rect: Rect,
    pub color: Color,
}

impl CropBorder {
    pub fn exists(&self) -> bool {
        !self.rect.is_empty()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CropBorders {
    pub left: CropBorder,
    pub right: CropBorder,
    pub top: CropBorder,
    pub bottom: CropBorder,
}

impl CropBorders {
    pub fn iter(&self) -> impl Iterator<Item = &CropBorder> {
        [&self.left, &self.right, &self.top, &self.bottom].into_iter()
    }

    pub fn any(&self) -> bool {
        self.iter().any(CropBorder::exists)
    }
}

fn line_matches(pm: &Pixmap, points: impl Iterator<Item = Point>, color: &Color, sim: i32) -> bool {
    let mut any = false;
    for p in points {
        any = true;
        if !pm.color_at(p).is_similar_to(color, sim) {
            return false;
        }
    }
    any
}

/// Counts the lines from one edge whose pixels all match the edge's
/// reference colour.  `line(i)` yields the pixels of the i-th line inward.
fn scan_border<I: Iterator<Item = Point>>(
    pm: &Pixmap,
    count: i32,
    reference: Point,
    sim: i32,
    line: impl Fn(i32) -> I,
) -> (i32, Color) {
    let color = pm.color_at(reference);
    let mut n = 0;
    while n < count && line_matches(pm, line(n), &color, sim) {
        n += 1;
    }
    (n, color)
}

/// Finds the uniform borders of `pm`.
///
/// Each edge compares against the colour of its first corner pixel, under
/// `processed_similarity`.  With `transparent_only`, borders of any other
/// colour are ignored.  Returns `None` when the image is one colour
/// throughout or has no border to remove.
pub fn find_borders(pm: &Pixmap, processed_similarity: i32, transparent_only: bool) -> Option<CropBorders> {
    let (w, h) = (pm.width(), pm.height());
    if w == 0 || h == 0 {
        return None;
    }
    let sim = processed_similarity;

    let (left_n, left_c) = scan_border(pm, w, Point::new(0, 0), sim, |i| (0..h).map(move |y| Point::new(i, y)));
    if left_n == w {
        log_debug!("autocrop: image is a single colour");
        return None;
    }
    let (right_n, right_c) =
        scan_border(pm, w - left_n, Point::new(w - 1, 0), sim, |i| (0..h).map(move |y| Point::new(w - 1 - i, y)));
    let (x0, x1) = (left_n, w - 1 - right_n);
    let (top_n, top_c) =
        scan_border(pm, h, Point::new(x0, 0), sim, |i| (x0..=x1).map(move |x| Point::new(x, i)));
    let (bottom_n, bottom_c) = scan_border(pm, h - top_n, Point::new(x0, h - 1), sim, |i| {
        (x0..=x1).map(move |x| Point::new(x, h - 1 - i))
    });

    let keep = |n: i32, c: Color| if transparent_only && !c.is_transparent() { 0 } else { n };
    let (left_n, right_n) = (keep(left_n, left_c), keep(right_n, right_c));
    let (top_n, bottom_n) = (keep(top_n, top_c), keep(bottom_n, bottom_c));
    let (x0, x1) = (left_n, w - 1 - right_n);

    let borders = CropBorders {
        left: CropBorder { rect: Rect::new(0, 0, left_n, h), color: left_c },
        right: CropBorder { rect: Rect::new(w - right_n, 0, right_n, h), color: right_c },
        top: CropBorder { rect: Rect::from_edges(x0, 0, x1, top_n - 1), color: top_c },
        bottom: CropBorder { rect: Rect::from_edges(x0, h - bottom_n, x1, h - 1), color: bottom_c },
    };
    borders.any().then_some(borders)
}

/// What is left of `pm` once `borders` are removed.
pub fn content_rect(pm: &Pixmap, borders: &CropBorders) -> Rect {
    Rect::from_edges(
        borders.left.rect.width,
        if borders.top.exists() { borders.top.rect.bottom() + 1 } else { 0 },
        pm.width() - 1 - borders.right.rect.width,
        if borders.bottom.exists() { borders.bottom.rect.top() - 1 } else { pm.height() - 1 },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn framed() -> Pixmap {
        let mut p = Pixmap::filled(10, 8, Color::WHITE);
        p.fill_rect(Rect::new(2, 3, 5, 3), Color::RED);
        p
    }

    #[test]
    fn finds_frame() {
        let p = framed();
        let b = find_borders(&p, 0, false).unwrap();
        assert_eq!(b.left.rect, Rect::new(0, 0, 2, 8));
        assert_eq!(b.right.rect, Rect::new(7, 0, 3, 8));
        assert_eq!(b.top.rect, Rect::new(2, 0, 5, 3));
        assert_eq!(b.bottom.rect, Rect::new(2, 6, 5, 2));
        assert_eq!(content_rect(&p, &b), Rect::new(2, 3, 5, 3));
    }

    #[test]
    fn single_colour_cannot_crop() {
        assert!(find_borders(&Pixmap::filled(5, 5, Color::BLUE), 0, false).is_none());
    }

    #[test]
    fn content_touching_edges_has_no_border() {
        let mut p = Pixmap::filled(4, 4, Color::WHITE);
        p.set_pixel(Point::new(0, 0), Color::RED);
        p.set_pixel(Point::new(3, 3), Color::RED);
        p.set_pixel(Point::new(3, 0), Color::RED);
        p.set_pixel(Point::new(0, 3), Color::RED);
        assert!(find_borders(&p, 0, false).is_none());
    }

    #[test]
    fn transparent_only_ignores_opaque_frame() {
        let p = framed();
        assert!(find_borders(&p, 0, true).is_none());
        let mut t = Pixmap::filled(6, 6, Color::TRANSPARENT);
        t.fill_rect(Rect::new(1, 1, 3, 3), Color::RED);
        let b = find_borders(&t, 0, true).unwrap();
        assert_eq!(content_rect(&t, &b), Rect::new(1, 1, 3, 3));
    }
}
