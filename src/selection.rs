// ============================================================================
// SELECTION: floating region with pulled/not-pulled pixel ownership
// ============================================================================
//
// A selection starts as a border only: the document still owns the pixels
// under it.  Pulling copies those pixels into the selection and leaves a
// hole in the document; from then on the selection is authoritative until it
// is pushed back or deleted.  Text boxes are created with their rendered
// pixels and are always considered pulled.

use ab_glyph::FontArc;
use image::{GrayImage, Luma};

use crate::color::{Color, ColorSimilarity};
use crate::dimensions::{self, point_array_size, string_size};
use crate::geometry::{Point, Rect, bounding_rect, interpolate_points, polygon_contains};
use crate::ops::text::{TextStyle, render_text_box};
use crate::pixmap::{MASK_OPAQUE, MASK_TRANSPARENT, Pixmap};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SelectionKind {
    Rectangle,
    Ellipse,
    Points,
    Text,
}

/// How a pulled selection composites back onto the document.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SelectionTransparency {
    pub opaque: bool,
    /// Pixels similar to this colour are see-through when not opaque.
    pub transparent_color: Color,
    pub similarity: ColorSimilarity,
}

impl Default for SelectionTransparency {
    fn default() -> Self {
        Self {
            opaque: true,
            transparent_color: Color::WHITE,
            similarity: ColorSimilarity::EXACT,
        }
    }
}

impl SelectionTransparency {
    pub fn transparent(color: Color, similarity: ColorSimilarity) -> Self {
        Self {
            opaque: false,
            transparent_color: color,
            similarity,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TextContent {
    pub lines: Vec<String>,
    pub style: TextStyle,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Selection {
    kind: SelectionKind,
    rect: Rect,
    /// Free-form outline in document coordinates; empty for other kinds.
    points: Vec<Point>,
    pixmap: Option<Pixmap>,
    transparency: SelectionTransparency,
    text: Option<TextContent>,
}

impl Selection {
    pub fn rectangle(rect: Rect) -> Self {
        Self::border(SelectionKind::Rectangle, rect, Vec::new())
    }

    pub fn ellipse(rect: Rect) -> Self {
        Self::border(SelectionKind::Ellipse, rect, Vec::new())
    }

    pub fn free_form(points: Vec<Point>) -> Self {
        Self::border(SelectionKind::Points, bounding_rect(&points), points)
    }

    fn border(kind: SelectionKind, rect: Rect, points: Vec<Point>) -> Self {
        Self {
            kind,
            rect,
            points,
            pixmap: None,
            transparency: SelectionTransparency::default(),
            text: None,
        }
    }

    /// Rectangle selection already holding `pixmap`, e.g. a pasted image.
    pub fn floating(top_left: Point, pixmap: Pixmap, transparency: SelectionTransparency) -> Self {
        Self {
            kind: SelectionKind::Rectangle,
            rect: Rect::new(top_left.x, top_left.y, pixmap.width(), pixmap.height()),
            points: Vec::new(),
            pixmap: Some(pixmap),
            transparency,
            text: None,
        }
    }

    pub fn text(rect: Rect, lines: Vec<String>, style: TextStyle, font: Option<&FontArc>) -> Self {
        let pixmap = render_text_box(font, &lines, &style, rect.width, rect.height);
        Self {
            kind: SelectionKind::Text,
            rect,
            points: Vec::new(),
            pixmap: Some(pixmap),
            transparency: SelectionTransparency::default(),
            text: Some(TextContent { lines, style }),
        }
    }

    pub fn kind(&self) -> SelectionKind {
        self.kind
    }

    pub fn is_text(&self) -> bool {
        self.kind == SelectionKind::Text
    }

    pub fn rect(&self) -> Rect {
        self.rect
    }

    pub fn top_left(&self) -> Point {
        self.rect.top_left()
    }

    pub fn width(&self) -> i32 {
        self.rect.width
    }

    pub fn height(&self) -> i32 {
        self.rect.height
    }

    /// Outline in document coordinates.
    pub fn points(&self) -> Vec<Point> {
        match self.kind {
            SelectionKind::Points => self.points.clone(),
            _ => {
                let r = self.rect;
                vec![
                    r.top_left(),
                    Point::new(r.right(), r.top()),
                    r.bottom_right(),
                    Point::new(r.left(), r.bottom()),
                ]
            }
        }
    }

    pub fn move_to(&mut self, top_left: Point) {
        let (dx, dy) = (top_left.x - self.rect.x, top_left.y - self.rect.y);
        self.move_by(dx, dy);
    }

    pub fn move_by(&mut self, dx: i32, dy: i32) {
        if dx == 0 && dy == 0 {
            return;
        }
        self.rect = self.rect.translated(dx, dy);
        for p in &mut self.points {
            *p = Point::new(p.x + dx, p.y + dy);
        }
    }

    // ---------------------------------------------------------------------
    //  Pixels
    // ---------------------------------------------------------------------

    pub fn has_pixmap(&self) -> bool {
        self.pixmap.is_some()
    }

    pub fn pixmap(&self) -> Option<&Pixmap> {
        self.pixmap.as_ref()
    }

    pub fn pixmap_mut(&mut self) -> Option<&mut Pixmap> {
        self.pixmap.as_mut()
    }

    /// Replaces the selection's pixels.  A pixmap of a different size
    /// resizes the selection rect (free-form outlines are dropped).
    pub fn set_pixmap(&mut self, pixmap: Option<Pixmap>) {
        if let Some(pm) = &pixmap
            && (pm.width() != self.rect.width || pm.height() != self.rect.height)
        {
            self.rect = Rect::new(self.rect.x, self.rect.y, pm.width(), pm.height());
            if self.kind == SelectionKind::Points {
                self.kind = SelectionKind::Rectangle;
                self.points.clear();
            }
        }
        self.pixmap = pixmap;
    }

    pub fn take_pixmap(&mut self) -> Option<Pixmap> {
        self.pixmap.take()
    }

    pub fn transparency(&self) -> SelectionTransparency {
        self.transparency
    }

    pub fn set_transparency(&mut self, transparency: SelectionTransparency) {
        self.transparency = transparency;
    }

    /// Opacity of the selection shape, sized to `rect`.
    pub fn shape_mask(&self) -> GrayImage {
        let (w, h) = (self.rect.width.max(0) as u32, self.rect.height.max(0) as u32);
        match self.kind {
            SelectionKind::Rectangle | SelectionKind::Text => GrayImage::from_pixel(w, h, Luma([MASK_OPAQUE])),
            SelectionKind::Ellipse => {
                let (rx, ry) = (w as f64 / 2.0, h as f64 / 2.0);
                GrayImage::from_fn(w, h, |x, y| {
                    let nx = (x as f64 + 0.5 - rx) / rx;
                    let ny = (y as f64 + 0.5 - ry) / ry;
                    Luma([if nx * nx + ny * ny <= 1.0 { MASK_OPAQUE } else { MASK_TRANSPARENT }])
                })
            }
            SelectionKind::Points => {
                let local: Vec<Point> = self
                    .points
                    .iter()
                    .map(|p| Point::new(p.x - self.rect.x, p.y - self.rect.y))
                    .collect();
                let mut mask = GrayImage::from_fn(w, h, |x, y| {
                    let inside = polygon_contains(&local, x as f64, y as f64);
                    Luma([if inside { MASK_OPAQUE } else { MASK_TRANSPARENT }])
                });
                if let Some(&first) = local.first() {
                    let mut closed = local.clone();
                    closed.push(first);
                    for seg in closed.windows(2) {
                        for p in interpolate_points(seg[0], seg[1]) {
                            if p.x >= 0 && p.y >= 0 && (p.x as u32) < w && (p.y as u32) < h {
                                mask.put_pixel(p.x as u32, p.y as u32, Luma([MASK_OPAQUE]));
                            }
                        }
                    }
                }
                mask
            }
        }
    }

    /// Whether the document point `p` lies inside the selection shape.
    pub fn contains(&self, p: Point) -> bool {
        if !self.rect.contains(p) {
            return false;
        }
        match self.kind {
            SelectionKind::Rectangle | SelectionKind::Text => true,
            _ => {
                let m = self.shape_mask();
                m.get_pixel((p.x - self.rect.x) as u32, (p.y - self.rect.y) as u32)[0] != MASK_TRANSPARENT
            }
        }
    }

    /// `pm` with everything outside the selection shape made transparent.
    pub fn apply_shape_mask(&self, pm: &Pixmap) -> Pixmap {
        if matches!(self.kind, SelectionKind::Rectangle | SelectionKind::Text) {
            return pm.clone();
        }
        let shape = self.shape_mask();
        let mut mask = pm.non_null_mask();
        for (m, s) in mask.iter_mut().zip(shape.as_raw()) {
            if *s == MASK_TRANSPARENT {
                *m = MASK_TRANSPARENT;
            }
        }
        let mut out = pm.clone();
        out.set_mask(Some(mask));
        out.drop_opaque_mask();
        out
    }

    /// Pulled pixels clipped to the shape, ignoring the transparency colour.
    pub fn opaque_pixmap(&self) -> Option<Pixmap> {
        self.pixmap.as_ref().map(|pm| self.apply_shape_mask(pm))
    }

    /// Pulled pixels as they composite onto the document: clipped to the
    /// shape and, when not opaque, with the transparent colour knocked out.
    pub fn transparent_pixmap(&self) -> Option<Pixmap> {
        let mut pm = self.opaque_pixmap()?;
        if self.transparency.opaque || self.is_text() {
            return Some(pm);
        }
        let sim = self.transparency.similarity.processed();
        let knock_out = self.transparency.transparent_color;
        let mut mask = pm.non_null_mask();
        let mut changed = false;
        for y in 0..pm.height() {
            for x in 0..pm.width() {
                if pm.color_at(Point::new(x, y)).is_similar_to(&knock_out, sim) {
                    mask.put_pixel(x as u32, y as u32, Luma([MASK_TRANSPARENT]));
                    changed = true;
                }
            }
        }
        if changed {
            pm.set_mask(Some(mask));
        }
        Some(pm)
    }

    /// New rectangle selection at the same position with the pixels scaled
    /// to `width x height`.  Text boxes are resized instead and re-rendered.
    pub fn resized_scaled(&self, width: i32, height: i32, smooth: bool, font: Option<&FontArc>) -> Selection {
        if let Some(text) = &self.text {
            return Selection::text(
                Rect::new(self.rect.x, self.rect.y, width, height),
                text.lines.clone(),
                text.style,
                font,
            );
        }
        let scaled = self.opaque_pixmap().map(|pm| pm.scaled(width, height, smooth));
        Selection {
            kind: SelectionKind::Rectangle,
            rect: Rect::new(self.rect.x, self.rect.y, width, height),
            points: Vec::new(),
            pixmap: scaled,
            transparency: self.transparency,
            text: None,
        }
    }

    // ---------------------------------------------------------------------
    //  Text
    // ---------------------------------------------------------------------

    pub fn text_content(&self) -> Option<&TextContent> {
        self.text.as_ref()
    }

    /// Replaces the text and re-renders the box.
    pub fn set_text(&mut self, lines: Vec<String>, style: TextStyle, font: Option<&FontArc>) {
        if !self.is_text() {
            log_err!("set_text on a {:?} selection", self.kind);
            return;
        }
        self.pixmap = Some(render_text_box(font, &lines, &style, self.rect.width, self.rect.height));
        self.text = Some(TextContent { lines, style });
    }

    /// Bytes held by the pulled pixels, the outline and the text.
    pub fn size(&self) -> i32 {
        let pixels = self.pixmap.as_ref().map_or(0, Pixmap::byte_size);
        let text = self
            .text
            .as_ref()
            .map_or(0, |t| dimensions::sum_sizes(t.lines.iter().map(|l| string_size(l))));
        dimensions::sum_sizes([pixels, point_array_size(&self.points), text])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ellipse_mask_excludes_corners() {
        let sel = Selection::ellipse(Rect::new(5, 5, 10, 10));
        let m = sel.shape_mask();
        assert_eq!(m.get_pixel(0, 0)[0], MASK_TRANSPARENT);
        assert_eq!(m.get_pixel(5, 5)[0], MASK_OPAQUE);
        assert!(sel.contains(Point::new(10, 10)));
        assert!(!sel.contains(Point::new(5, 5)));
    }

    #[test]
    fn free_form_includes_outline() {
        let sel = Selection::free_form(vec![Point::new(0, 0), Point::new(8, 0), Point::new(0, 8)]);
        assert_eq!(sel.rect(), Rect::new(0, 0, 9, 9));
        assert!(sel.contains(Point::new(8, 0)));
        assert!(sel.contains(Point::new(2, 2)));
        assert!(!sel.contains(Point::new(7, 7)));
    }

    #[test]
    fn move_translates_outline() {
        let mut sel = Selection::free_form(vec![Point::new(1, 1), Point::new(4, 1), Point::new(1, 4)]);
        sel.move_to(Point::new(11, 21));
        assert_eq!(sel.rect(), Rect::new(11, 21, 4, 4));
        assert_eq!(sel.points()[1], Point::new(14, 21));
    }

    #[test]
    fn transparency_knocks_out_colour() {
        let mut pm = Pixmap::filled(3, 1, Color::WHITE);
        pm.set_pixel(Point::new(1, 0), Color::RED);
        let mut sel = Selection::floating(Point::new(0, 0), pm, SelectionTransparency::default());
        assert!(sel.transparent_pixmap().unwrap().is_fully_opaque());
        sel.set_transparency(SelectionTransparency::transparent(Color::WHITE, ColorSimilarity::EXACT));
        let out = sel.transparent_pixmap().unwrap();
        assert!(out.color_at(Point::new(0, 0)).is_transparent());
        assert_eq!(out.color_at(Point::new(1, 0)), Color::RED);
    }

    #[test]
    fn scaling_makes_rectangle() {
        let mut sel = Selection::ellipse(Rect::new(0, 0, 4, 4));
        sel.set_pixmap(Some(Pixmap::filled(4, 4, Color::BLUE)));
        let big = sel.resized_scaled(8, 6, false, None);
        assert_eq!(big.kind(), SelectionKind::Rectangle);
        assert_eq!(big.pixmap().map(|p| (p.width(), p.height())), Some((8, 6)));
    }
}
