// ============================================================================
// GEOMETRY: integer points and rectangles in document coordinates
// ============================================================================
//
// `Rect` uses inclusive right/bottom edges: a rect at x=2 with width 3 covers
// columns 2, 3 and 4 and `right()` is 4.  Empty rects (width or height <= 0)
// never contain anything and vanish in `unite`.

use std::ops::{Add, Sub};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn manhattan_length(self) -> i32 {
        self.x.saturating_abs().saturating_add(self.y.saturating_abs())
    }
}

impl Add for Point {
    type Output = Point;
    fn add(self, rhs: Point) -> Point {
        Point::new(self.x.saturating_add(rhs.x), self.y.saturating_add(rhs.y))
    }
}

impl Sub for Point {
    type Output = Point;
    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x.saturating_sub(rhs.x), self.y.saturating_sub(rhs.y))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    pub const fn from_size(width: i32, height: i32) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Normalised rect spanning both points (both inclusive).
    pub fn from_points(a: Point, b: Point) -> Self {
        let (x1, x2) = if a.x <= b.x { (a.x, b.x) } else { (b.x, a.x) };
        let (y1, y2) = if a.y <= b.y { (a.y, b.y) } else { (b.y, a.y) };
        Self::from_edges(x1, y1, x2, y2)
    }

    /// Rect from inclusive edges.  Yields an empty rect if `right < left`.
    pub fn from_edges(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self::new(
            left,
            top,
            right.saturating_sub(left).saturating_add(1),
            bottom.saturating_sub(top).saturating_add(1),
        )
    }

    pub fn left(&self) -> i32 {
        self.x
    }

    pub fn top(&self) -> i32 {
        self.y
    }

    pub fn right(&self) -> i32 {
        self.x.saturating_add(self.width).saturating_sub(1)
    }

    pub fn bottom(&self) -> i32 {
        self.y.saturating_add(self.height).saturating_sub(1)
    }

    pub fn top_left(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn bottom_right(&self) -> Point {
        Point::new(self.right(), self.bottom())
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2, self.y + self.height / 2)
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn contains(&self, p: Point) -> bool {
        !self.is_empty()
            && p.x >= self.left()
            && p.x <= self.right()
            && p.y >= self.top()
            && p.y <= self.bottom()
    }

    pub fn contains_rect(&self, other: &Rect) -> bool {
        !other.is_empty()
            && self.contains(other.top_left())
            && self.contains(other.bottom_right())
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        !self.intersected(other).is_empty()
    }

    /// Overlap of both rects, or an empty rect.
    pub fn intersected(&self, other: &Rect) -> Rect {
        if self.is_empty() || other.is_empty() {
            return Rect::default();
        }
        let l = self.left().max(other.left());
        let t = self.top().max(other.top());
        let r = self.right().min(other.right());
        let b = self.bottom().min(other.bottom());
        if r < l || b < t {
            return Rect::default();
        }
        Rect::from_edges(l, t, r, b)
    }

    /// Smallest rect containing both.  Empty operands are ignored.
    pub fn united(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        Rect::from_edges(
            self.left().min(other.left()),
            self.top().min(other.top()),
            self.right().max(other.right()),
            self.bottom().max(other.bottom()),
        )
    }

    pub fn translated(&self, dx: i32, dy: i32) -> Rect {
        Rect::new(
            self.x.saturating_add(dx),
            self.y.saturating_add(dy),
            self.width,
            self.height,
        )
    }

    pub fn moved_to(&self, p: Point) -> Rect {
        Rect::new(p.x, p.y, self.width, self.height)
    }

    /// Moves each edge by the given offsets (positive grows right/bottom).
    pub fn adjusted(&self, dl: i32, dt: i32, dr: i32, db: i32) -> Rect {
        Rect::from_edges(
            self.left().saturating_add(dl),
            self.top().saturating_add(dt),
            self.right().saturating_add(dr),
            self.bottom().saturating_add(db),
        )
    }
}

/// Bounding rect of a point list, empty for no points.
pub fn bounding_rect(points: &[Point]) -> Rect {
    let Some(first) = points.first() else {
        return Rect::default();
    };
    let (mut l, mut t, mut r, mut b) = (first.x, first.y, first.x, first.y);
    for p in &points[1..] {
        l = l.min(p.x);
        t = t.min(p.y);
        r = r.max(p.x);
        b = b.max(p.y);
    }
    Rect::from_edges(l, t, r, b)
}

/// Area touched when stroking `rect`'s points with a pen of `pen_width`.
pub fn needed_rect(rect: Rect, pen_width: i32) -> Rect {
    if rect.is_empty() {
        return rect;
    }
    let grow = pen_width.max(1) - 1;
    rect.adjusted(-grow, -grow, grow, grow)
}

/// Every integer point on the segment `a..=b` (Bresenham).
pub fn interpolate_points(a: Point, b: Point) -> Vec<Point> {
    let dx = (b.x as i64 - a.x as i64).abs();
    let dy = -(b.y as i64 - a.y as i64).abs();
    let sx: i64 = if a.x < b.x { 1 } else { -1 };
    let sy: i64 = if a.y < b.y { 1 } else { -1 };

    let mut out = Vec::with_capacity((dx.max(-dy) + 1) as usize);
    let (mut x, mut y) = (a.x as i64, a.y as i64);
    let mut err = dx + dy;
    loop {
        out.push(Point::new(x as i32, y as i32));
        if x == b.x as i64 && y == b.y as i64 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
    out
}

/// Even-odd containment test.  Polygon vertices name pixels, so pixel
/// `(x, y)` is sampled at `(x as f64, y as f64)`, the same lattice the
/// Bresenham outline walks.
pub fn polygon_contains(points: &[Point], x: f64, y: f64) -> bool {
    if points.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = points.len() - 1;
    for i in 0..points.len() {
        let (xi, yi) = (points[i].x as f64, points[i].y as f64);
        let (xj, yj) = (points[j].x as f64, points[j].y as f64);
        if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}
