// ============================================================================
// TRANSFORM ENGINE: skew, rotate, flip and scale of pixmaps
// ============================================================================
//
// Matrices follow the row-vector convention:
//
//     x' = m11 * x + m21 * y + dx
//     y' = m12 * x + m22 * y + dy
//
// and `a * b` means "apply `a`, then `b`".  Rendering is nearest neighbour by
// inverse mapping of destination pixel centres, so flips and right-angle
// rotations are exact permutations of the source pixels.

use image::{GrayImage, Luma, RgbImage, imageops};
use rayon::prelude::*;
use std::ops::Mul;

use crate::color::Color;
use crate::geometry::{Point, Rect};
use crate::pixmap::{MASK_OPAQUE, Pixmap};

/// Coefficients this close to an integer are snapped to it.
pub const TRUE_MATRIX_EPSILON: f64 = 0.000001;

/// Angles (degrees) this close to a multiple of 90 are treated as exactly
/// that multiple.
pub fn angle_epsilon() -> f64 {
    (1.0f64 / 10000.0).atan().to_degrees() / 4.0
}

/// Interpolation method for smooth scaling.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub enum Interpolation {
    Nearest,
    #[default]
    Bilinear,
    Bicubic,
    Lanczos3,
}

impl Interpolation {
    pub fn label(&self) -> &'static str {
        match self {
            Interpolation::Nearest => "Nearest",
            Interpolation::Bilinear => "Bilinear",
            Interpolation::Bicubic => "Bicubic",
            Interpolation::Lanczos3 => "Lanczos3",
        }
    }

    pub fn to_filter(&self) -> imageops::FilterType {
        match self {
            Interpolation::Nearest => imageops::FilterType::Nearest,
            Interpolation::Bilinear => imageops::FilterType::Triangle,
            Interpolation::Bicubic => imageops::FilterType::CatmullRom,
            Interpolation::Lanczos3 => imageops::FilterType::Lanczos3,
        }
    }
}

// ---------------------------------------------------------------------------
//  Matrix
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AffineMatrix {
    pub m11: f64,
    pub m12: f64,
    pub m21: f64,
    pub m22: f64,
    pub dx: f64,
    pub dy: f64,
}

impl Default for AffineMatrix {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl AffineMatrix {
    pub const IDENTITY: AffineMatrix = AffineMatrix::new(1.0, 0.0, 0.0, 1.0, 0.0, 0.0);

    pub const fn new(m11: f64, m12: f64, m21: f64, m22: f64, dx: f64, dy: f64) -> Self {
        Self { m11, m12, m21, m22, dx, dy }
    }

    pub fn scaling(sx: f64, sy: f64) -> Self {
        Self::new(sx, 0.0, 0.0, sy, 0.0, 0.0)
    }

    pub fn translation(dx: f64, dy: f64) -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0, dx, dy)
    }

    /// `(x, y) -> (x + sh * y, y + sv * x)`
    pub fn shearing(sh: f64, sv: f64) -> Self {
        Self::new(1.0, sv, sh, 1.0, 0.0, 0.0)
    }

    /// Clockwise on screen (y grows downwards).
    pub fn rotation(degrees: f64) -> Self {
        let (s, c) = degrees.to_radians().sin_cos();
        Self::new(c, s, -s, c, 0.0, 0.0)
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    pub fn determinant(&self) -> f64 {
        self.m11 * self.m22 - self.m12 * self.m21
    }

    pub fn map(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.m11 * x + self.m21 * y + self.dx,
            self.m12 * x + self.m22 * y + self.dy,
        )
    }

    /// Exact bounding box `(xmin, ymin, xmax, ymax)` of the mapped rect
    /// `(x, y) .. (x + w, y + h)`.
    pub fn map_rect_f(&self, rect: Rect) -> (f64, f64, f64, f64) {
        let (x0, y0) = (rect.x as f64, rect.y as f64);
        let (x1, y1) = (x0 + rect.width as f64, y0 + rect.height as f64);
        let corners = [self.map(x0, y0), self.map(x1, y0), self.map(x0, y1), self.map(x1, y1)];
        corners.iter().fold(
            (f64::MAX, f64::MAX, f64::MIN, f64::MIN),
            |(l, t, r, b), &(x, y)| (l.min(x), t.min(y), r.max(x), b.max(y)),
        )
    }

    /// Integer bounding rect of the mapped rect, edges rounded to nearest.
    pub fn map_rect(&self, rect: Rect) -> Rect {
        let (l, t, r, b) = self.map_rect_f(rect);
        let (l, t, r, b) = (l.round(), t.round(), r.round(), b.round());
        Rect::new(l as i32, t as i32, (r - l) as i32, (b - t) as i32)
    }

    pub fn inverted(&self) -> Option<AffineMatrix> {
        let det = self.determinant();
        if det.abs() < f64::EPSILON {
            return None;
        }
        let inv = 1.0 / det;
        let m11 = self.m22 * inv;
        let m12 = -self.m12 * inv;
        let m21 = -self.m21 * inv;
        let m22 = self.m11 * inv;
        Some(Self::new(
            m11,
            m12,
            m21,
            m22,
            -(self.dx * m11 + self.dy * m21),
            -(self.dx * m12 + self.dy * m22),
        ))
    }
}

impl Mul for AffineMatrix {
    type Output = AffineMatrix;

    fn mul(self, b: AffineMatrix) -> AffineMatrix {
        let a = self;
        AffineMatrix::new(
            a.m11 * b.m11 + a.m12 * b.m21,
            a.m11 * b.m12 + a.m12 * b.m22,
            a.m21 * b.m11 + a.m22 * b.m21,
            a.m21 * b.m12 + a.m22 * b.m22,
            a.dx * b.m11 + a.dy * b.m21 + b.dx,
            a.dx * b.m12 + a.dy * b.m22 + b.dy,
        )
    }
}

pub fn fix_int(x: f64) -> f64 {
    if (x - x.round()).abs() < TRUE_MATRIX_EPSILON { x.round() } else { x }
}

/// Re-translates `matrix` so the mapped `(0, 0, w, h)` starts at the origin.
pub fn matrix_with_zero_origin(matrix: &AffineMatrix, width: i32, height: i32) -> AffineMatrix {
    let (l, t, _, _) = matrix.map_rect_f(Rect::from_size(width, height));
    AffineMatrix {
        dx: matrix.dx - l,
        dy: matrix.dy - t,
        ..*matrix
    }
}

/// The matrix actually used for rendering a `width x height` source: the
/// translation comes from the exact bounding box and near-integer terms are
/// snapped, so right-angle cases do not drift by a pixel.
pub fn true_matrix(matrix: &AffineMatrix, width: i32, height: i32) -> AffineMatrix {
    let m = matrix_with_zero_origin(matrix, width, height);
    AffineMatrix::new(
        fix_int(m.m11),
        fix_int(m.m12),
        fix_int(m.m21),
        fix_int(m.m22),
        fix_int(m.dx),
        fix_int(m.dy),
    )
}

// ---------------------------------------------------------------------------
//  Rendering
// ---------------------------------------------------------------------------

/// Source pixel sampled by destination pixel `(x, y)`, if any.
#[inline]
fn sample_at(inverse: &AffineMatrix, x: usize, y: usize, sw: u32, sh: u32) -> Option<(u32, u32)> {
    let (fx, fy) = inverse.map(x as f64 + 0.5, y as f64 + 0.5);
    let (sx, sy) = (fx.floor(), fy.floor());
    if sx >= 0.0 && sy >= 0.0 && sx < sw as f64 && sy < sh as f64 {
        Some((sx as u32, sy as u32))
    } else {
        None
    }
}

/// Writes every covered destination pixel from `src`.  The destination mask,
/// when present, receives the source opacity.
fn warp_into(src: &Pixmap, inverse: &AffineMatrix, dst: &mut RgbImage, dst_mask: Option<&mut GrayImage>) {
    let (dw, _) = dst.dimensions();
    let (sw, sh) = (src.width() as u32, src.height() as u32);
    if dw == 0 || sw == 0 || sh == 0 {
        return;
    }
    let src_rgb = src.rgb_image();
    let src_rgb: &RgbImage = &src_rgb;
    let src_mask = src.mask();
    let stride = dw as usize * 3;
    let raw: &mut [u8] = dst;

    let write_row = |y: usize, row: &mut [u8], mut mrow: Option<&mut [u8]>| {
        for x in 0..dw as usize {
            let Some((sx, sy)) = sample_at(inverse, x, y, sw, sh) else {
                continue;
            };
            let p = src_rgb.get_pixel(sx, sy);
            row[x * 3..x * 3 + 3].copy_from_slice(&p.0);
            if let Some(m) = mrow.as_deref_mut() {
                m[x] = src_mask.map_or(MASK_OPAQUE, |sm| sm.get_pixel(sx, sy)[0]);
            }
        }
    };

    match dst_mask {
        Some(mask) => {
            let mraw: &mut [u8] = mask;
            raw.par_chunks_mut(stride)
                .zip(mraw.par_chunks_mut(dw as usize))
                .enumerate()
                .for_each(|(y, (row, mrow))| write_row(y, row, Some(mrow)));
        }
        None => {
            raw.par_chunks_mut(stride)
                .enumerate()
                .for_each(|(y, row)| write_row(y, row, None));
        }
    }
}

/// Destination pixels the transformed source rectangle covers (255).
fn coverage_mask(sw: u32, sh: u32, inverse: &AffineMatrix, dw: u32, dh: u32) -> GrayImage {
    let mut cov = GrayImage::new(dw, dh);
    if dw == 0 || dh == 0 {
        return cov;
    }
    let raw: &mut [u8] = &mut cov;
    raw.par_chunks_mut(dw as usize).enumerate().for_each(|(y, row)| {
        for (x, v) in row.iter_mut().enumerate() {
            if sample_at(inverse, x, y, sw, sh).is_some() {
                *v = MASK_OPAQUE;
            }
        }
    });
    cov
}

/// Renders `pm` through `matrix`.
///
/// The output is the mapped bounding rect, or `target_width x target_height`
/// when given (> 0), in which case a scale is composed so the content fills
/// it exactly.  Area not covered by the transformed source gets `background`
/// (an opaque colour paints it, any other valid colour makes it
/// transparent); with `Color::Invalid` the uncovered area is left
/// transparent.
pub fn transform_pixmap(
    pm: &Pixmap,
    matrix: &AffineMatrix,
    background: Color,
    target_width: i32,
    target_height: i32,
) -> Pixmap {
    let src_rect = pm.rect();
    let mut matrix = *matrix;
    let mut new_rect = matrix.map_rect(src_rect);

    let scale_x = if target_width > 0 && target_width != new_rect.width && new_rect.width > 0 {
        target_width as f64 / new_rect.width as f64
    } else {
        1.0
    };
    let scale_y = if target_height > 0 && target_height != new_rect.height && new_rect.height > 0 {
        target_height as f64 / new_rect.height as f64
    } else {
        1.0
    };
    if scale_x != 1.0 || scale_y != 1.0 {
        matrix = matrix * AffineMatrix::scaling(scale_x, scale_y);
        new_rect = matrix.map_rect(src_rect);
    }

    let dest_w = if target_width > 0 { target_width } else { new_rect.width };
    let dest_h = if target_height > 0 { target_height } else { new_rect.height };
    if (target_width > 0 && target_width != new_rect.width)
        || (target_height > 0 && target_height != new_rect.height)
    {
        log_debug!(
            "transform_pixmap: target {}x{} differs from mapped {:?} (rounding)",
            target_width,
            target_height,
            new_rect
        );
    }

    let matrix = true_matrix(&matrix, pm.width(), pm.height());

    let mut dest = if background.is_valid() {
        Pixmap::filled(dest_w, dest_h, background)
    } else {
        Pixmap::filled(dest_w, dest_h, Color::TRANSPARENT)
    };
    if pm.has_mask() {
        dest.ensure_mask();
    }

    let Some(inverse) = matrix.inverted() else {
        log_err!("transform_pixmap: singular matrix {:?}", matrix);
        return dest;
    };

    let mut mask = dest.take_mask();
    warp_into(pm, &inverse, dest.make_direct(), mask.as_mut());
    dest.set_mask(mask);

    if background.is_valid() {
        let (dw, dh) = (dest.width() as u32, dest.height() as u32);
        let mut uncovered = coverage_mask(pm.width() as u32, pm.height() as u32, &inverse, dw, dh);
        for v in uncovered.pixels_mut() {
            *v = Luma([MASK_OPAQUE - v[0]]);
        }
        if background.is_opaque() {
            let mut fill = Pixmap::filled(dest_w, dest_h, background);
            fill.set_mask(Some(uncovered));
            dest.paint_region(Point::new(0, 0), &fill);
        } else {
            dest.paint_mask_transparent_with_brush(Point::new(0, 0), &uncovered);
        }
    }

    dest.drop_opaque_mask();
    dest
}

// ---------------------------------------------------------------------------
//  Skew
// ---------------------------------------------------------------------------

pub fn skew_matrix(width: i32, height: i32, hangle: f64, vangle: f64) -> AffineMatrix {
    let eps = angle_epsilon();
    if hangle.abs() < eps && vangle.abs() < eps {
        return AffineMatrix::IDENTITY;
    }
    let m = AffineMatrix::shearing(hangle.to_radians().tan(), vangle.to_radians().tan());
    matrix_with_zero_origin(&m, width, height)
}

/// Size a skew of `width x height` produces.
pub fn skew_result_size(width: i32, height: i32, hangle: f64, vangle: f64) -> Rect {
    skew_matrix(width, height, hangle, vangle).map_rect(Rect::from_size(width, height))
}

/// Shears `pm` by the given angles in degrees.  Angles of 90 or more are
/// rejected: the input is returned unchanged and a warning is logged.
pub fn skew(
    pm: &Pixmap,
    hangle: f64,
    vangle: f64,
    background: Color,
    target_width: i32,
    target_height: i32,
) -> Pixmap {
    let eps = angle_epsilon();
    if hangle.abs() < eps && vangle.abs() < eps && target_width <= 0 && target_height <= 0 {
        return pm.clone();
    }
    if hangle.abs() > 90.0 - eps || vangle.abs() > 90.0 - eps {
        log_warn!(
            "skew: rejected angles h={} v={} (must be within +/-90 degrees)",
            hangle,
            vangle
        );
        return pm.clone();
    }
    let m = skew_matrix(pm.width(), pm.height(), hangle, vangle);
    transform_pixmap(pm, &m, background, target_width, target_height)
}

// ---------------------------------------------------------------------------
//  Rotate
// ---------------------------------------------------------------------------

/// Snaps angles within epsilon of a multiple of 90 onto that multiple.
fn snap_right_angle(angle: f64) -> f64 {
    let nearest = (angle / 90.0).round() * 90.0;
    if (angle - nearest).abs() < angle_epsilon() { nearest } else { angle }
}

pub fn rotate_matrix(width: i32, height: i32, angle: f64) -> AffineMatrix {
    if angle.abs() < angle_epsilon() {
        return AffineMatrix::IDENTITY;
    }
    let m = AffineMatrix::rotation(snap_right_angle(angle));
    matrix_with_zero_origin(&m, width, height)
}

pub fn rotate_result_size(width: i32, height: i32, angle: f64) -> Rect {
    rotate_matrix(width, height, angle).map_rect(Rect::from_size(width, height))
}

/// True when rotating by `angle` only permutes pixels.
pub fn is_lossless_rotation(angle: f64) -> bool {
    let mut angle = angle.abs();
    angle -= (angle / 90.0).trunc() * 90.0;
    if !(0.0..=90.0).contains(&angle) {
        return false;
    }
    let eps = angle_epsilon();
    angle < eps || 90.0 - angle < eps
}

/// Rotates `pm` clockwise by `angle` degrees.
pub fn rotate(
    pm: &Pixmap,
    angle: f64,
    background: Color,
    target_width: i32,
    target_height: i32,
) -> Pixmap {
    if angle.abs() < angle_epsilon() && target_width <= 0 && target_height <= 0 {
        return pm.clone();
    }
    let m = rotate_matrix(pm.width(), pm.height(), angle);
    transform_pixmap(pm, &m, background, target_width, target_height)
}

// ---------------------------------------------------------------------------
//  Flip
// ---------------------------------------------------------------------------

pub fn flip_matrix(width: i32, height: i32, horz: bool, vert: bool) -> AffineMatrix {
    if width <= 0 || height <= 0 {
        return AffineMatrix::IDENTITY;
    }
    AffineMatrix::new(
        if horz { -1.0 } else { 1.0 },
        0.0,
        0.0,
        if vert { -1.0 } else { 1.0 },
        if horz { (width - 1) as f64 } else { 0.0 },
        if vert { (height - 1) as f64 } else { 0.0 },
    )
}

/// Mirrors `pm`.  Palette pixmaps (including 1-bit ones) flip their index
/// plane directly and stay indexed.
pub fn flip(pm: &Pixmap, horz: bool, vert: bool) -> Pixmap {
    if !horz && !vert {
        return pm.clone();
    }
    if pm.is_indexed() {
        return flip_indexed(pm, horz, vert);
    }
    let m = flip_matrix(pm.width(), pm.height(), horz, vert);
    transform_pixmap(pm, &m, Color::Invalid, pm.width(), pm.height())
}

fn flip_gray(img: &GrayImage, horz: bool, vert: bool) -> GrayImage {
    let mut out = if horz { imageops::flip_horizontal(img) } else { img.clone() };
    if vert {
        imageops::flip_vertical_in_place(&mut out);
    }
    out
}

fn flip_indexed(pm: &Pixmap, horz: bool, vert: bool) -> Pixmap {
    use crate::pixmap::PixelData;
    let PixelData::Indexed { depth, palette, indices } = pm.data() else {
        return pm.clone();
    };
    let mask = pm.mask().map(|m| flip_gray(m, horz, vert));
    Pixmap::from_indexed(*depth, palette.clone(), flip_gray(indices, horz, vert), mask)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(w: i32, h: i32) -> Pixmap {
        let mut p = Pixmap::new(w, h);
        for y in 0..h {
            for x in 0..w {
                p.set_pixel(Point::new(x, y), Color::rgb(x as u8 * 10, y as u8 * 10, 1));
            }
        }
        p
    }

    #[test]
    fn epsilon_value() {
        assert!((angle_epsilon() - 0.0014323944).abs() < 1e-9);
    }

    #[test]
    fn multiplication_order() {
        let a = AffineMatrix::translation(5.0, 0.0);
        let b = AffineMatrix::scaling(2.0, 2.0);
        // translate first, then scale
        assert_eq!((a * b).map(1.0, 1.0), (12.0, 2.0));
        assert_eq!((b * a).map(1.0, 1.0), (7.0, 2.0));
    }

    #[test]
    fn inverse_round_trip() {
        let m = AffineMatrix::rotation(33.0) * AffineMatrix::translation(4.0, -2.0);
        let inv = m.inverted().unwrap();
        let (x, y) = inv.map(m.map(3.0, 7.0).0, m.map(3.0, 7.0).1);
        assert!((x - 3.0).abs() < 1e-9 && (y - 7.0).abs() < 1e-9);
        assert!(AffineMatrix::scaling(0.0, 1.0).inverted().is_none());
    }

    #[test]
    fn zero_origin_normalises_translation() {
        let m = rotate_matrix(10, 20, 30.0);
        let (l, t, _, _) = m.map_rect_f(Rect::from_size(10, 20));
        assert!(l.abs() < 1e-9 && t.abs() < 1e-9);
    }

    #[test]
    fn flip_matrix_true_matrix_is_exact() {
        let m = true_matrix(&flip_matrix(7, 3, true, false), 7, 3);
        assert_eq!(m, AffineMatrix::new(-1.0, 0.0, 0.0, 1.0, 7.0, 0.0));
    }

    #[test]
    fn flip_twice_is_identity() {
        let p = numbered(5, 4);
        let h = flip(&p, true, false);
        assert_eq!(h.color_at(Point::new(0, 0)), p.color_at(Point::new(4, 0)));
        assert!(flip(&h, true, false).same_pixels(&p));
        let v = flip(&p, false, true);
        assert_eq!(v.color_at(Point::new(2, 0)), p.color_at(Point::new(2, 3)));
        assert!(flip(&v, false, true).same_pixels(&p));
    }

    #[test]
    fn right_angle_rotations_permute_pixels() {
        let p = numbered(4, 3);
        let r90 = rotate(&p, 90.0, Color::Invalid, 0, 0);
        assert_eq!((r90.width(), r90.height()), (3, 4));
        // clockwise: top-left goes to top-right
        assert_eq!(r90.color_at(Point::new(2, 0)), p.color_at(Point::new(0, 0)));
        assert_eq!(r90.color_at(Point::new(0, 3)), p.color_at(Point::new(3, 2)));
        assert!(!r90.has_mask());

        let r180 = rotate(&p, 180.0, Color::WHITE, 0, 0);
        assert_eq!(r180.color_at(Point::new(0, 0)), p.color_at(Point::new(3, 2)));

        let back = rotate(&rotate(&r90, 90.0, Color::Invalid, 0, 0), 180.0, Color::Invalid, 0, 0);
        assert!(back.same_pixels(&p));
    }

    #[test]
    fn lossless_rotation_detection() {
        for a in [0.0, 90.0, -180.0, 270.0, 360.0, 90.0005] {
            assert!(is_lossless_rotation(a), "{a}");
        }
        for a in [1.0, 45.0, -30.0, 89.9] {
            assert!(!is_lossless_rotation(a), "{a}");
        }
    }

    #[test]
    fn skew_rejects_right_angles() {
        let p = numbered(3, 3);
        assert!(skew(&p, 90.0, 0.0, Color::WHITE, 0, 0).same_pixels(&p));
        assert!(skew(&p, 0.0, -95.0, Color::WHITE, 0, 0).same_pixels(&p));
    }

    #[test]
    fn skew_grows_width() {
        let size = skew_result_size(100, 100, 30.0, 0.0);
        assert_eq!(size.width, 158);
        assert_eq!(size.height, 100);
    }

    #[test]
    fn target_size_is_honoured() {
        let p = numbered(10, 10);
        let out = rotate(&p, 30.0, Color::WHITE, 20, 15);
        assert_eq!((out.width(), out.height()), (20, 15));
    }

    #[test]
    fn transparent_background_leaves_corners_transparent() {
        let p = Pixmap::filled(20, 20, Color::RED);
        let out = rotate(&p, 45.0, Color::TRANSPARENT, 0, 0);
        assert!(out.color_at(Point::new(0, 0)).is_transparent());
        let c = out.rect().center();
        assert_eq!(out.color_at(c), Color::RED);
    }

    #[test]
    fn invalid_background_keeps_source_mask() {
        let mut p = Pixmap::filled(4, 4, Color::RED);
        p.ensure_transparent_at(Rect::new(0, 0, 1, 1));
        let out = flip(&p, true, false);
        assert!(out.color_at(Point::new(3, 0)).is_transparent());
        assert_eq!(out.color_at(Point::new(0, 0)), Color::RED);
    }

    #[test]
    fn indexed_flip_stays_indexed() {
        use image::Rgb;
        let idx = GrayImage::from_raw(3, 1, vec![0, 0, 1]).unwrap();
        let p = Pixmap::from_indexed(1, vec![Rgb([0, 0, 0]), Rgb([255, 255, 255])], idx, None);
        let f = flip(&p, true, false);
        assert!(f.is_indexed());
        assert_eq!(f.color_at(Point::new(0, 0)), Color::WHITE);
    }
}
