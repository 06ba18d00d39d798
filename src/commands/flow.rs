// ============================================================================
// FLOW: freehand tools (pen, brush, eraser, spraycan, colour washer)
// ============================================================================
//
// Flow tools draw straight onto the document while the pointer moves.  The
// command snapshots the document when the stroke begins, grows a bounding
// rect with every draw step and only keeps that rect once the stroke ends,
// so the whole stroke is one undo entry.

use image::{GrayImage, Luma};

use crate::color::Color;
use crate::document::{Document, ToolColors};
use crate::geometry::{Point, Rect, interpolate_points, needed_rect};
use crate::ops::wash::{self, WashStyle};
use crate::pixmap::{MASK_OPAQUE, MASK_TRANSPARENT, Pixmap};

use super::SavedArea;
use crate::components::history::{Command, CommandState};

/// Brush sizes per shape, largest first.
pub const BRUSH_SIZES: [[i32; 3]; 4] = [[8, 4, 1], [9, 5, 2], [9, 5, 2], [9, 5, 2]];
pub const ERASER_SIZES: [i32; 6] = [2, 3, 5, 9, 17, 29];
pub const SPRAYCAN_SIZES: [i32; 3] = [9, 17, 29];
/// Spray attempts per sprayed point.
pub const SPRAY_DOTS_PER_POINT: usize = 10;

// ============================================================================
// Brushes
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BrushShape {
    Circle,
    Square,
    Slash,
    Backslash,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Brush {
    pub shape: BrushShape,
    pub size: i32,
}

impl Brush {
    pub fn new(shape: BrushShape, size: i32) -> Self {
        Self { shape, size: size.max(1) }
    }

    pub fn square(size: i32) -> Self {
        Self::new(BrushShape::Square, size)
    }

    /// Footprint: 255 where the brush paints.
    pub fn footprint(&self) -> GrayImage {
        let n = self.size as u32;
        let on = |b: bool| Luma([if b { MASK_OPAQUE } else { MASK_TRANSPARENT }]);
        match self.shape {
            BrushShape::Square => GrayImage::from_pixel(n, n, Luma([MASK_OPAQUE])),
            BrushShape::Circle => {
                let r = n as f64 / 2.0;
                GrayImage::from_fn(n, n, |x, y| {
                    let (dx, dy) = (x as f64 + 0.5 - r, y as f64 + 0.5 - r);
                    on(n <= 2 || dx * dx + dy * dy <= r * r)
                })
            }
            BrushShape::Slash => GrayImage::from_fn(n, n, |x, y| on(x + y == n - 1)),
            BrushShape::Backslash => GrayImage::from_fn(n, n, |x, y| on(x == y)),
        }
    }

    /// Top-left of the footprint when centred on `p`.
    pub fn hot_point(&self, p: Point) -> Point {
        Point::new(p.x - self.size / 2, p.y - self.size / 2)
    }
}

/// Seedable xorshift64 generator for the spraycan.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SprayRng(u64);

impl SprayRng {
    pub fn new(seed: u64) -> Self {
        Self(if seed == 0 { 0x9E37_79B9_7F4A_7C15 } else { seed })
    }

    pub fn next_u64(&mut self) -> u64 {
        let mut s = self.0;
        s ^= s << 13;
        s ^= s >> 7;
        s ^= s << 17;
        self.0 = s;
        s
    }

    /// Uniform in `0.0 .. 1.0`.
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Uniform in `0 .. n`.
    pub fn below(&mut self, n: i32) -> i32 {
        if n <= 0 {
            return 0;
        }
        (self.next_u64() % n as u64) as i32
    }
}

// ============================================================================
// Flow tools
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FlowTool {
    Pen,
    Brush(Brush),
    Eraser { size: i32 },
    Spraycan { size: i32 },
    ColorWasher { size: i32 },
}

impl FlowTool {
    pub fn name(&self) -> &'static str {
        match self {
            FlowTool::Pen => "Pen",
            FlowTool::Brush(_) => "Brush",
            FlowTool::Eraser { .. } => "Eraser",
            FlowTool::Spraycan { .. } => "Spraycan",
            FlowTool::ColorWasher { .. } => "Color Eraser",
        }
    }

    /// Erasers paint with the opposite button's colour.
    fn swaps_colors(&self) -> bool {
        matches!(self, FlowTool::Eraser { .. } | FlowTool::ColorWasher { .. })
    }

    /// Colour `button` paints with.
    pub fn paint_color(&self, colors: &ToolColors, button: usize) -> Color {
        if self.swaps_colors() { colors.color(1 - button.min(1)) } else { colors.color(button) }
    }

    /// Whether a stroke could change anything.  The colour washer skips
    /// strokes that would replace a colour with itself.
    pub fn should_draw(&self, colors: &ToolColors) -> bool {
        match self {
            FlowTool::ColorWasher { .. } => {
                !(colors.foreground == colors.background && colors.similarity.processed() == 0)
            }
            _ => true,
        }
    }

    fn brush_width(&self) -> i32 {
        match self {
            FlowTool::Pen => 1,
            FlowTool::Brush(b) => b.size,
            FlowTool::Eraser { size } | FlowTool::Spraycan { size } | FlowTool::ColorWasher { size } => *size,
        }
    }

    /// Draws the single point `p`.  Returns the touched rect.
    pub fn draw_point(
        &self,
        doc: &mut Document,
        p: Point,
        colors: &ToolColors,
        button: usize,
        rng: &mut SprayRng,
    ) -> Option<Rect> {
        self.draw_line(doc, p, p, colors, button, rng)
    }

    /// Draws the segment `last -> this`.  Returns the touched rect, or
    /// `None` when nothing changed.
    pub fn draw_line(
        &self,
        doc: &mut Document,
        this: Point,
        last: Point,
        colors: &ToolColors,
        button: usize,
        rng: &mut SprayRng,
    ) -> Option<Rect> {
        let color = self.paint_color(colors, button);
        match self {
            FlowTool::Pen => {
                let rect = Rect::from_points(this, last);
                let pm = doc.pixmap_mut();
                for p in interpolate_points(last, this) {
                    pm.set_pixel(p, color);
                }
                Some(rect)
            }
            FlowTool::Brush(brush) => Some(stamp_line(doc, *brush, this, last, color)),
            FlowTool::Eraser { size } => Some(stamp_line(doc, Brush::square(*size), this, last, color)),
            FlowTool::Spraycan { .. } => {
                let probability = if this == last { 1.0 } else { 0.1 };
                self.spray(doc, this, last, color, probability, rng)
            }
            FlowTool::ColorWasher { size } => {
                if !self.should_draw(colors) {
                    return None;
                }
                let style = WashStyle {
                    color_to_replace: colors.color(button.min(1)),
                    replacement: color,
                    processed_similarity: colors.similarity.processed(),
                    brush_width: *size,
                    brush_height: *size,
                };
                let (rect, washed) = wash::wash_line(doc.pixmap(), this, last, &style)?;
                doc.set_pixmap_at(&washed, rect.top_left());
                Some(rect)
            }
        }
    }

    /// Sprays around every interpolated point of `last -> this` picked with
    /// `probability`.  The spraycan's timer tick calls this with
    /// `this == last` and probability 1.
    pub fn spray(
        &self,
        doc: &mut Document,
        this: Point,
        last: Point,
        color: Color,
        probability: f64,
        rng: &mut SprayRng,
    ) -> Option<Rect> {
        let size = self.brush_width();
        let mut points: Vec<Point> = interpolate_points(last, this)
            .into_iter()
            .filter(|_| probability >= 1.0 || rng.next_f64() < probability)
            .collect();
        // `last` was sprayed by the previous step.
        if this != last && points.first() == Some(&last) {
            points.remove(0);
        }
        if points.is_empty() {
            return None;
        }
        let radius = size / 2;
        let pm = doc.pixmap_mut();
        for p in &points {
            for _ in 0..SPRAY_DOTS_PER_POINT {
                let dx = rng.below(size) - radius;
                let dy = rng.below(size) - radius;
                if dx * dx + dy * dy <= radius * radius {
                    pm.set_pixel(Point::new(p.x + dx, p.y + dy), color);
                }
            }
        }
        Some(needed_rect(Rect::from_points(this, last), size))
    }
}

/// Stamps `brush` along `last -> this`.  Transparent paint clears opacity
/// under the footprint.
fn stamp_line(doc: &mut Document, brush: Brush, this: Point, last: Point, color: Color) -> Rect {
    let footprint = brush.footprint();
    let stamp = if color.is_transparent() {
        None
    } else {
        let mut pm = Pixmap::filled(brush.size, brush.size, color);
        let mut mask = footprint.clone();
        if color.alpha() != MASK_OPAQUE {
            for v in mask.iter_mut() {
                *v = (*v as u16 * color.alpha() as u16 / 255) as u8;
            }
        }
        pm.set_mask(Some(mask));
        Some(pm)
    };
    let pm = doc.pixmap_mut();
    for p in interpolate_points(last, this) {
        let at = brush.hot_point(p);
        match &stamp {
            Some(s) => pm.paint_region(at, s),
            None => pm.paint_mask_transparent_with_brush(at, &footprint),
        }
    }
    needed_rect(Rect::from_points(this, last), brush.size)
}

// ============================================================================
// Flow command
// ============================================================================

pub struct FlowCommand {
    name: String,
    saved: SavedArea,
    bounding_rect: Rect,
    state: CommandState,
}

impl FlowCommand {
    /// Starts a stroke on `doc`.
    pub fn new(name: impl Into<String>, doc: &Document) -> Self {
        Self {
            name: name.into(),
            saved: SavedArea::whole(doc),
            bounding_rect: Rect::default(),
            state: CommandState::Created,
        }
    }

    pub fn bounding_rect(&self) -> Rect {
        self.bounding_rect
    }

    pub fn update_bounding_rect(&mut self, rect: Rect) {
        self.bounding_rect = self.bounding_rect.united(&rect);
    }

    /// Whether any draw step touched the document.
    pub fn did_something(&self) -> bool {
        !self.bounding_rect.is_empty()
    }

    /// Ends the stroke: keeps only the touched pixels and counts as applied.
    pub fn finalize(&mut self) {
        let rect = self.bounding_rect.intersected(&self.saved.rect());
        if !rect.is_empty() {
            self.saved.crop(rect);
        }
        self.state.try_apply(&self.name);
    }

    /// Aborts the stroke, restoring the document.
    pub fn cancel(&mut self, doc: &mut Document) {
        if self.state.try_cancel(&self.name) {
            self.saved.restore(doc);
        }
    }
}

impl Command for FlowCommand {
    fn execute(&mut self, doc: &mut Document) {
        if self.state.try_apply(&self.name) {
            self.saved.swap(doc);
        }
    }

    fn unexecute(&mut self, doc: &mut Document) {
        if self.state.try_revert(&self.name) {
            self.saved.swap(doc);
        }
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn size(&self) -> i32 {
        self.saved.size()
    }

    fn state(&self) -> CommandState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn colors() -> ToolColors {
        ToolColors {
            foreground: Color::RED,
            background: Color::WHITE,
            ..ToolColors::default()
        }
    }

    #[test]
    fn pen_stroke_undoes_exactly() {
        let mut doc = Document::new(10, 10, Color::WHITE);
        let before = doc.pixmap().clone();
        let mut rng = SprayRng::new(1);
        let mut cmd = FlowCommand::new("Pen", &doc);
        let r = FlowTool::Pen
            .draw_line(&mut doc, Point::new(8, 2), Point::new(1, 2), &colors(), 0, &mut rng)
            .unwrap();
        cmd.update_bounding_rect(r);
        cmd.finalize();
        assert_eq!(cmd.state(), CommandState::Applied);
        assert_eq!(doc.color_at(Point::new(4, 2)), Color::RED);
        assert!(cmd.size() < before.byte_size());

        cmd.unexecute(&mut doc);
        assert_eq!(doc.pixmap(), &before);
        cmd.execute(&mut doc);
        assert_eq!(doc.color_at(Point::new(4, 2)), Color::RED);
    }

    #[test]
    fn eraser_paints_background_with_left_button() {
        let mut doc = Document::new(10, 10, Color::BLUE);
        let mut rng = SprayRng::new(1);
        let tool = FlowTool::Eraser { size: 3 };
        tool.draw_point(&mut doc, Point::new(5, 5), &colors(), 0, &mut rng);
        assert_eq!(doc.color_at(Point::new(4, 4)), Color::WHITE);
        assert_eq!(doc.color_at(Point::new(6, 6)), Color::WHITE);
        assert_eq!(doc.color_at(Point::new(7, 7)), Color::BLUE);
    }

    #[test]
    fn transparent_eraser_clears_mask() {
        let mut doc = Document::new(6, 6, Color::BLUE);
        let mut c = colors();
        c.background = Color::TRANSPARENT;
        let mut rng = SprayRng::new(1);
        FlowTool::Eraser { size: 2 }.draw_point(&mut doc, Point::new(3, 3), &c, 0, &mut rng);
        assert!(doc.color_at(Point::new(3, 3)).is_transparent());
        assert_eq!(doc.color_at(Point::new(0, 0)), Color::BLUE);
    }

    #[test]
    fn cancel_restores_and_ends() {
        let mut doc = Document::new(6, 6, Color::WHITE);
        let before = doc.pixmap().clone();
        let mut cmd = FlowCommand::new("Brush", &doc);
        let mut rng = SprayRng::new(7);
        let r = FlowTool::Brush(Brush::square(2))
            .draw_line(&mut doc, Point::new(5, 5), Point::new(0, 0), &colors(), 0, &mut rng)
            .unwrap();
        cmd.update_bounding_rect(r);
        cmd.cancel(&mut doc);
        assert_eq!(cmd.state(), CommandState::Cancelled);
        assert!(doc.pixmap().same_pixels(&before));
    }

    #[test]
    fn spray_is_deterministic_for_a_seed() {
        let run = |seed| {
            let mut doc = Document::new(40, 40, Color::WHITE);
            let mut rng = SprayRng::new(seed);
            FlowTool::Spraycan { size: 9 }.draw_point(&mut doc, Point::new(20, 20), &colors(), 0, &mut rng);
            doc.pixmap().clone()
        };
        assert_eq!(run(42), run(42));
        let sprayed = run(42);
        assert!(sprayed.color_at(Point::new(0, 0)) == Color::WHITE);
        let red = (0..40)
            .flat_map(|y| (0..40).map(move |x| Point::new(x, y)))
            .filter(|p| sprayed.color_at(*p) == Color::RED)
            .count();
        assert!(red > 0 && red <= SPRAY_DOTS_PER_POINT);
    }

    #[test]
    fn washer_replaces_foreground_only() {
        let mut doc = Document::new(5, 1, Color::WHITE);
        doc.pixmap_mut().fill_rect(Rect::new(1, 0, 2, 1), Color::RED);
        let mut rng = SprayRng::new(1);
        let r = FlowTool::ColorWasher { size: 3 }.draw_line(
            &mut doc,
            Point::new(4, 0),
            Point::new(0, 0),
            &ToolColors {
                foreground: Color::RED,
                background: Color::GREEN,
                ..ToolColors::default()
            },
            0,
            &mut rng,
        );
        assert!(r.is_some());
        assert_eq!(doc.color_at(Point::new(1, 0)), Color::GREEN);
        assert_eq!(doc.color_at(Point::new(0, 0)), Color::WHITE);
    }

    #[test]
    fn slash_brush_is_diagonal() {
        let f = Brush::new(BrushShape::Slash, 3).footprint();
        assert_eq!(f.get_pixel(2, 0)[0], MASK_OPAQUE);
        assert_eq!(f.get_pixel(0, 0)[0], MASK_TRANSPARENT);
    }
}
