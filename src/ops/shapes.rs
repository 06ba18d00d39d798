// ============================================================================
// SHAPES: line, polyline, polygon, curve and rectangle-family rendering
// ============================================================================
//
// Every shape tool hands a point list to `ShapeKind::render`.  Line-like
// shapes are stroked with a square pen along Bresenham segments; the
// rectangle family is rasterised from signed distance functions evaluated at
// pixel centres, which keeps outlines exactly `pen_width` pixels thick.

use rayon::prelude::*;

use crate::color::Color;
use crate::geometry::{Point, Rect, bounding_rect, interpolate_points, needed_rect, polygon_contains};
use crate::pixmap::Pixmap;

/// Most points a polyline or polygon accepts.
pub const MAX_POLY_POINTS: usize = 50;
/// A curve is a start, an end and up to two control points.
pub const CURVE_POINTS: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShapeKind {
    Line,
    Polyline,
    Polygon,
    Curve,
    Rectangle,
    RoundedRectangle,
    Ellipse,
}

impl ShapeKind {
    pub fn label(&self) -> &'static str {
        match self {
            ShapeKind::Line => "Line",
            ShapeKind::Polyline => "Polyline",
            ShapeKind::Polygon => "Polygon",
            ShapeKind::Curve => "Curve",
            ShapeKind::Rectangle => "Rectangle",
            ShapeKind::RoundedRectangle => "Rounded Rectangle",
            ShapeKind::Ellipse => "Ellipse",
        }
    }

    pub fn all() -> &'static [ShapeKind] {
        &[
            ShapeKind::Line,
            ShapeKind::Polyline,
            ShapeKind::Polygon,
            ShapeKind::Curve,
            ShapeKind::Rectangle,
            ShapeKind::RoundedRectangle,
            ShapeKind::Ellipse,
        ]
    }

    /// Shapes defined by two opposite corners.
    pub fn is_rectangular(&self) -> bool {
        matches!(
            self,
            ShapeKind::Rectangle | ShapeKind::RoundedRectangle | ShapeKind::Ellipse
        )
    }

    /// Shapes whose interior can be filled.
    pub fn is_fillable(&self) -> bool {
        matches!(
            self,
            ShapeKind::Polygon | ShapeKind::Rectangle | ShapeKind::RoundedRectangle | ShapeKind::Ellipse
        )
    }

    pub fn max_points(&self) -> usize {
        match self {
            ShapeKind::Polyline | ShapeKind::Polygon => MAX_POLY_POINTS,
            ShapeKind::Curve => CURVE_POINTS,
            _ => 2,
        }
    }

    /// Document area `render` may touch for these points.
    pub fn bounding_rect(&self, points: &[Point], style: &ShapeStyle) -> Rect {
        needed_rect(bounding_rect(&self.outline_points(points)), style.pen_width)
    }

    /// Draws the shape onto `pm`.  Points are in `pm` coordinates.
    pub fn render(&self, pm: &mut Pixmap, points: &[Point], style: &ShapeStyle) {
        if points.is_empty() {
            return;
        }
        match self {
            ShapeKind::Line | ShapeKind::Polyline => stroke_polyline(pm, points, style),
            ShapeKind::Curve => stroke_polyline(pm, &self.outline_points(points), style),
            ShapeKind::Polygon => {
                if let Some(fill) = style.fill_color() {
                    fill_polygon(pm, points, fill);
                }
                let mut closed = points.to_vec();
                closed.push(points[0]);
                stroke_polyline(pm, &closed, style);
            }
            ShapeKind::Rectangle | ShapeKind::RoundedRectangle | ShapeKind::Ellipse => {
                let last = points[points.len() - 1];
                render_rectangular(pm, *self, Rect::from_points(points[0], last), style);
            }
        }
    }

    fn outline_points(&self, points: &[Point]) -> Vec<Point> {
        match self {
            ShapeKind::Curve => flatten_curve(points),
            _ => points.to_vec(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FillStyle {
    #[default]
    NoFill,
    FillWithBackground,
    FillWithForeground,
}

impl FillStyle {
    pub fn label(&self) -> &'static str {
        match self {
            FillStyle::NoFill => "No Fill",
            FillStyle::FillWithBackground => "Fill with Background Color",
            FillStyle::FillWithForeground => "Fill with Foreground Color",
        }
    }

    /// Colour used for the interior, `Color::Invalid` when not filling.
    pub fn drawing_background_color(&self, foreground: Color, background: Color) -> Color {
        match self {
            FillStyle::NoFill => Color::Invalid,
            FillStyle::FillWithBackground => background,
            FillStyle::FillWithForeground => foreground,
        }
    }
}

impl std::str::FromStr for FillStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "nofill" | "no_fill" => Ok(FillStyle::NoFill),
            "background" | "bg" => Ok(FillStyle::FillWithBackground),
            "foreground" | "fg" => Ok(FillStyle::FillWithForeground),
            other => Err(format!("unknown fill style '{}'", other)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShapeStyle {
    pub foreground: Color,
    pub background: Color,
    pub pen_width: i32,
    pub fill: FillStyle,
}

impl ShapeStyle {
    pub fn new(foreground: Color, background: Color, pen_width: i32, fill: FillStyle) -> Self {
        Self {
            foreground,
            background,
            pen_width: pen_width.max(1),
            fill,
        }
    }

    fn fill_color(&self) -> Option<Color> {
        Some(self.fill.drawing_background_color(self.foreground, self.background))
            .filter(Color::is_valid)
    }
}

// ============================================================================
// Pen strokes
// ============================================================================

/// Square pen footprint centred on `p`.
pub fn pen_rect(p: Point, pen_width: i32) -> Rect {
    let w = pen_width.max(1);
    Rect::new(p.x - (w - 1) / 2, p.y - (w - 1) / 2, w, w)
}

fn stroke_polyline(pm: &mut Pixmap, points: &[Point], style: &ShapeStyle) {
    if points.len() == 1 {
        pm.fill_rect(pen_rect(points[0], style.pen_width), style.foreground);
        return;
    }
    for seg in points.windows(2) {
        for p in interpolate_points(seg[0], seg[1]) {
            if style.pen_width == 1 {
                pm.set_pixel(p, style.foreground);
            } else {
                pm.fill_rect(pen_rect(p, style.pen_width), style.foreground);
            }
        }
    }
}

/// Even-odd scanline fill of the polygon through `points`.
fn fill_polygon(pm: &mut Pixmap, points: &[Point], color: Color) {
    let area = bounding_rect(points).intersected(&pm.rect());
    if area.is_empty() || points.len() < 3 {
        return;
    }
    for y in area.top()..=area.bottom() {
        let mut run: Option<i32> = None;
        for x in area.left()..=area.right() {
            let inside = polygon_contains(points, x as f64, y as f64);
            match (inside, run) {
                (true, None) => run = Some(x),
                (false, Some(x0)) => {
                    pm.draw_hline(y, x0, x - 1, color);
                    run = None;
                }
                _ => {}
            }
        }
        if let Some(x0) = run {
            pm.draw_hline(y, x0, area.right(), color);
        }
    }
}

/// Points of the cubic Bézier `start, c1, c2, end`.  The point list is
/// ordered start, end, first control, second control; a missing second
/// control point repeats the first.
pub fn flatten_curve(points: &[Point]) -> Vec<Point> {
    let Some(&start) = points.first() else {
        return Vec::new();
    };
    let end = points.get(1).copied().unwrap_or(start);
    if points.len() <= 2 {
        return vec![start, end];
    }
    let c1 = points[2];
    let c2 = points.get(3).copied().unwrap_or(c1);

    let hull = (c1 - start).manhattan_length() + (c2 - c1).manhattan_length() + (end - c2).manhattan_length();
    let steps = (hull / 2).clamp(8, 512);
    let (p0, p1, p2, p3) = (to_f(start), to_f(c1), to_f(c2), to_f(end));
    let mut out: Vec<Point> = Vec::with_capacity(steps as usize + 1);
    for i in 0..=steps {
        let t = i as f64 / steps as f64;
        let u = 1.0 - t;
        let (a, b, c, d) = (u * u * u, 3.0 * u * u * t, 3.0 * u * t * t, t * t * t);
        let p = Point::new(
            (a * p0.0 + b * p1.0 + c * p2.0 + d * p3.0).round() as i32,
            (a * p0.1 + b * p1.1 + c * p2.1 + d * p3.1).round() as i32,
        );
        if out.last() != Some(&p) {
            out.push(p);
        }
    }
    out
}

fn to_f(p: Point) -> (f64, f64) {
    (p.x as f64, p.y as f64)
}

// ============================================================================
// Rectangle family, rasterised from signed distance (negative = inside)
// ============================================================================

#[inline]
fn sdf_box(px: f32, py: f32, hx: f32, hy: f32) -> f32 {
    let dx = px.abs() - hx;
    let dy = py.abs() - hy;
    let outside = (dx.max(0.0) * dx.max(0.0) + dy.max(0.0) * dy.max(0.0)).sqrt();
    let inside = dx.max(dy).min(0.0);
    outside + inside
}

#[inline]
fn sdf_rounded_box(px: f32, py: f32, hx: f32, hy: f32, r: f32) -> f32 {
    let r = r.min(hx).min(hy);
    sdf_box(px, py, hx - r, hy - r) - r
}

/// Approximate: distance in circle space scaled back by the local gradient.
#[inline]
fn sdf_ellipse(px: f32, py: f32, rx: f32, ry: f32) -> f32 {
    let nx = px / rx;
    let ny = py / ry;
    let len = (nx * nx + ny * ny).sqrt();
    if len < 1e-8 {
        return -rx.min(ry);
    }
    let scale = (rx * rx * ny * ny + ry * ry * nx * nx).sqrt() / (rx * ry * len);
    (len - 1.0) / scale
}

/// Corner radius of a rounded rectangle of this size.
pub fn rounded_corner_radius(width: i32, height: i32) -> f32 {
    width.min(height) as f32 / 4.0
}

fn shape_sdf(kind: ShapeKind, px: f32, py: f32, hx: f32, hy: f32, radius: f32) -> f32 {
    match kind {
        ShapeKind::RoundedRectangle => sdf_rounded_box(px, py, hx, hy, radius),
        ShapeKind::Ellipse => sdf_ellipse(px, py, hx, hy),
        _ => sdf_box(px, py, hx, hy),
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Coverage {
    None,
    Outline,
    Interior,
}

fn render_rectangular(pm: &mut Pixmap, kind: ShapeKind, rect: Rect, style: &ShapeStyle) {
    let area = rect.intersected(&pm.rect());
    if area.is_empty() {
        return;
    }
    let hx = rect.width as f32 * 0.5;
    let hy = rect.height as f32 * 0.5;
    let cx = rect.x as f32 + hx;
    let cy = rect.y as f32 + hy;
    let radius = rounded_corner_radius(rect.width, rect.height);
    let pen = style.pen_width as f32;

    let cols = area.width as usize;
    let mut cover = vec![Coverage::None; cols * area.height as usize];
    cover.par_chunks_mut(cols).enumerate().for_each(|(row, out)| {
        let py = (area.y + row as i32) as f32 + 0.5 - cy;
        for (col, c) in out.iter_mut().enumerate() {
            let px = (area.x + col as i32) as f32 + 0.5 - cx;
            let d = shape_sdf(kind, px, py, hx, hy, radius);
            *c = if d >= 0.0 {
                Coverage::None
            } else if d > -pen {
                Coverage::Outline
            } else {
                Coverage::Interior
            };
        }
    });

    let fill = style.fill_color();
    for (row, line) in cover.chunks(cols).enumerate() {
        let y = area.y + row as i32;
        let mut x = 0;
        while x < cols {
            let kind_here = line[x];
            let start = x;
            while x < cols && line[x] == kind_here {
                x += 1;
            }
            let color = match kind_here {
                Coverage::Outline => Some(style.foreground),
                Coverage::Interior => fill,
                Coverage::None => None,
            };
            if let Some(color) = color {
                pm.draw_hline(y, area.x + start as i32, area.x + x as i32 - 1, color);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn style(pen: i32, fill: FillStyle) -> ShapeStyle {
        ShapeStyle::new(Color::BLACK, Color::RED, pen, fill)
    }

    #[test]
    fn rectangle_outline_is_pen_thick() {
        let mut pm = Pixmap::filled(10, 10, Color::WHITE);
        ShapeKind::Rectangle.render(
            &mut pm,
            &[Point::new(1, 1), Point::new(8, 8)],
            &style(2, FillStyle::NoFill),
        );
        assert_eq!(pm.color_at(Point::new(0, 0)), Color::WHITE);
        assert_eq!(pm.color_at(Point::new(1, 1)), Color::BLACK);
        assert_eq!(pm.color_at(Point::new(2, 5)), Color::BLACK);
        assert_eq!(pm.color_at(Point::new(3, 5)), Color::WHITE);
        assert_eq!(pm.color_at(Point::new(8, 8)), Color::BLACK);
        assert_eq!(pm.color_at(Point::new(9, 9)), Color::WHITE);
    }

    #[test]
    fn rectangle_fill_with_background() {
        let mut pm = Pixmap::filled(10, 10, Color::WHITE);
        ShapeKind::Rectangle.render(
            &mut pm,
            &[Point::new(8, 8), Point::new(1, 1)],
            &style(1, FillStyle::FillWithBackground),
        );
        assert_eq!(pm.color_at(Point::new(1, 4)), Color::BLACK);
        assert_eq!(pm.color_at(Point::new(4, 4)), Color::RED);
    }

    #[test]
    fn ellipse_skips_corners() {
        let mut pm = Pixmap::filled(20, 20, Color::WHITE);
        ShapeKind::Ellipse.render(
            &mut pm,
            &[Point::new(0, 0), Point::new(19, 19)],
            &style(1, FillStyle::FillWithForeground),
        );
        assert_eq!(pm.color_at(Point::new(0, 0)), Color::WHITE);
        assert_eq!(pm.color_at(Point::new(10, 10)), Color::BLACK);
        assert_eq!(pm.color_at(Point::new(0, 10)), Color::BLACK);
    }

    #[test]
    fn line_uses_square_pen() {
        let mut pm = Pixmap::filled(10, 10, Color::WHITE);
        ShapeKind::Line.render(
            &mut pm,
            &[Point::new(2, 5), Point::new(7, 5)],
            &style(3, FillStyle::NoFill),
        );
        for x in 1..=8 {
            for y in 4..=6 {
                assert_eq!(pm.color_at(Point::new(x, y)), Color::BLACK, "({x},{y})");
            }
        }
        assert_eq!(pm.color_at(Point::new(0, 5)), Color::WHITE);
        assert_eq!(pm.color_at(Point::new(4, 3)), Color::WHITE);
    }

    #[test]
    fn polygon_fill_and_close() {
        let mut pm = Pixmap::filled(12, 12, Color::WHITE);
        let tri = [Point::new(1, 1), Point::new(10, 1), Point::new(1, 10)];
        ShapeKind::Polygon.render(&mut pm, &tri, &style(1, FillStyle::FillWithBackground));
        assert_eq!(pm.color_at(Point::new(5, 6)), Color::BLACK);
        assert_eq!(pm.color_at(Point::new(1, 5)), Color::BLACK);
        assert_eq!(pm.color_at(Point::new(3, 3)), Color::RED);
        assert_eq!(pm.color_at(Point::new(5, 5)), Color::RED);
        assert_eq!(pm.color_at(Point::new(9, 9)), Color::WHITE);
    }

    #[test]
    fn polygon_fill_meets_its_outline() {
        let mut pm = Pixmap::filled(12, 12, Color::WHITE);
        let tri = [Point::new(1, 1), Point::new(10, 1), Point::new(1, 10)];
        ShapeKind::Polygon.render(&mut pm, &tri, &style(1, FillStyle::FillWithBackground));
        for y in 1..=10 {
            for x in 1..=10 {
                let c = pm.color_at(Point::new(x, y));
                if x + y <= 11 {
                    assert_ne!(c, Color::WHITE, "gap at ({x}, {y})");
                } else {
                    assert_eq!(c, Color::WHITE, "spill at ({x}, {y})");
                }
            }
        }
    }

    #[test]
    fn curve_passes_through_endpoints() {
        let pts = [Point::new(0, 0), Point::new(20, 0), Point::new(5, 10), Point::new(15, 10)];
        let flat = flatten_curve(&pts);
        assert_eq!(flat.first(), Some(&Point::new(0, 0)));
        assert_eq!(flat.last(), Some(&Point::new(20, 0)));
        assert!(flat.iter().any(|p| p.y >= 6));
    }

    #[test]
    fn bounding_rect_grows_with_pen() {
        let s = style(3, FillStyle::NoFill);
        let r = ShapeKind::Line.bounding_rect(&[Point::new(5, 5), Point::new(10, 5)], &s);
        assert_eq!(r, Rect::from_edges(3, 3, 12, 7));
        for p in interpolate_points(Point::new(5, 5), Point::new(10, 5)) {
            assert!(r.contains_rect(&pen_rect(p, 3)));
        }
    }

    #[test]
    fn no_fill_has_invalid_background() {
        assert_eq!(
            FillStyle::NoFill.drawing_background_color(Color::BLACK, Color::WHITE),
            Color::Invalid
        );
        assert_eq!("fg".parse::<FillStyle>(), Ok(FillStyle::FillWithForeground));
    }
}
