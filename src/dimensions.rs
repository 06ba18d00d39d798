// ============================================================================
// DIMENSIONS: saturating arithmetic for sizes, areas and byte counts
// ============================================================================
//
// Every width/height/area/byte computation goes through these helpers.  The
// result saturates at `i32::MAX` instead of wrapping; negative operands are
// treated as overflow.

use crate::geometry::Point;

/// Value returned whenever a computation would not fit.
pub const DIMENSION_MAX: i32 = i32::MAX;

pub fn add_dimensions(lhs: i32, rhs: i32) -> i32 {
    if lhs < 0 || rhs < 0 || lhs > DIMENSION_MAX - rhs {
        return DIMENSION_MAX;
    }
    lhs + rhs
}

pub fn multiply_dimensions(lhs: i32, rhs: i32) -> i32 {
    if lhs < 0 || rhs < 0 {
        return DIMENSION_MAX;
    }
    if rhs == 0 {
        return 0;
    }
    if lhs > DIMENSION_MAX / rhs {
        return DIMENSION_MAX;
    }
    lhs * rhs
}

/// Number of pixels in a `width x height` buffer.
pub fn pixmap_area(width: i32, height: i32) -> i32 {
    multiply_dimensions(width, height)
}

/// Approximate bytes held by a pixmap of the given size and bit depth.
///
/// Depths above 8 are rounded up to whole bytes per pixel.
pub fn pixmap_size(width: i32, height: i32, depth: i32) -> i32 {
    let rounded = if depth > 8 { (depth + 7) / 8 * 8 } else { depth };
    multiply_dimensions(pixmap_area(width, height), rounded) / 8
}

pub fn point_array_size(points: &[Point]) -> i32 {
    let len = i32::try_from(points.len()).unwrap_or(DIMENSION_MAX);
    multiply_dimensions(len, std::mem::size_of::<Point>() as i32)
}

pub fn string_size(s: &str) -> i32 {
    let len = i32::try_from(s.chars().count()).unwrap_or(DIMENSION_MAX);
    multiply_dimensions(len, 2)
}

/// Saturating sum of many sizes.
pub fn sum_sizes(sizes: impl IntoIterator<Item = i32>) -> i32 {
    sizes.into_iter().fold(0, add_dimensions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_in_range_is_exact() {
        assert_eq!(add_dimensions(3, 4), 7);
        assert_eq!(add_dimensions(0, 0), 0);
        assert_eq!(add_dimensions(DIMENSION_MAX - 1, 1), DIMENSION_MAX);
    }

    #[test]
    fn add_saturates() {
        assert_eq!(add_dimensions(DIMENSION_MAX, 1), DIMENSION_MAX);
        assert_eq!(add_dimensions(1 << 30, 1 << 30), DIMENSION_MAX);
        assert_eq!(add_dimensions(-1, 5), DIMENSION_MAX);
        assert_eq!(add_dimensions(5, -1), DIMENSION_MAX);
    }

    #[test]
    fn multiply_in_range_is_exact() {
        for (a, b) in [(0, 0), (1, 1), (7, 13), (46340, 46340), (65535, 32767)] {
            assert_eq!(multiply_dimensions(a, b), a * b);
        }
        assert_eq!(multiply_dimensions(DIMENSION_MAX, 0), 0);
        assert_eq!(multiply_dimensions(0, DIMENSION_MAX), 0);
    }

    #[test]
    fn multiply_saturates() {
        assert_eq!(multiply_dimensions(65536, 32768), DIMENSION_MAX);
        assert_eq!(multiply_dimensions(DIMENSION_MAX, 2), DIMENSION_MAX);
        assert_eq!(multiply_dimensions(-3, 2), DIMENSION_MAX);
        assert_eq!(multiply_dimensions(2, -3), DIMENSION_MAX);
    }

    #[test]
    fn multiply_is_monotonic() {
        let mut last = 0;
        for a in (0..200_000).step_by(997) {
            let r = multiply_dimensions(a, 20_000);
            assert!(r >= last);
            last = r;
        }
        assert_eq!(last, DIMENSION_MAX);
    }

    #[test]
    fn pixmap_size_rounds_depth() {
        assert_eq!(pixmap_size(8, 1, 1), 1);
        assert_eq!(pixmap_size(10, 10, 8), 100);
        assert_eq!(pixmap_size(10, 10, 24), 300);
        assert_eq!(pixmap_size(10, 10, 15), 200);
        assert_eq!(pixmap_size(100_000, 100_000, 32), DIMENSION_MAX / 8);
    }

    #[test]
    fn string_and_point_sizes() {
        assert_eq!(string_size("abc"), 6);
        let pts = [Point::new(0, 0), Point::new(1, 1)];
        assert_eq!(point_array_size(&pts), 2 * std::mem::size_of::<Point>() as i32);
        assert_eq!(sum_sizes([1, 2, DIMENSION_MAX]), DIMENSION_MAX);
    }
}
