// ============================================================================
// PIXMAP: pixel buffer with optional opacity mask, region primitives
// ============================================================================
//
// Colour bytes and opacity are stored separately: the colour data is either
// direct RGB or palette indices (1 or 8 bit), and the mask is an optional
// 8-bit plane where 0 is transparent and 255 opaque.  A pixmap without a mask
// is fully opaque.  Every mutating primitive that writes colour promotes
// indexed data to direct RGB first.

use image::{GrayImage, ImageBuffer, Luma, Pixel, Rgb, RgbImage, Rgba, RgbaImage, imageops};
use std::borrow::Cow;

use crate::color::Color;
use crate::dimensions::{self, pixmap_area};
use crate::geometry::{Point, Rect};
use crate::ops::transform::{self, AffineMatrix, Interpolation};

/// Largest number of pixels a single pixmap may hold.
pub const MAX_PIXMAP_AREA: i32 = 1 << 28;

pub const MASK_OPAQUE: u8 = 255;
pub const MASK_TRANSPARENT: u8 = 0;

#[derive(Clone, Debug, PartialEq)]
pub enum PixelData {
    Direct(RgbImage),
    Indexed {
        depth: u8,
        palette: Vec<Rgb<u8>>,
        indices: GrayImage,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Pixmap {
    data: PixelData,
    mask: Option<GrayImage>,
}

impl Default for Pixmap {
    fn default() -> Self {
        Pixmap::new(0, 0)
    }
}

/// Clamp requested dimensions to something allocatable.
fn clamp_size(width: i32, height: i32) -> (u32, u32) {
    let w = width.max(0);
    let mut h = height.max(0);
    if pixmap_area(w, h) > MAX_PIXMAP_AREA {
        let clamped = MAX_PIXMAP_AREA / w.max(1);
        log_warn!(
            "Pixmap {}x{} exceeds the {} pixel limit, clamping height to {}",
            w,
            h,
            MAX_PIXMAP_AREA,
            clamped
        );
        h = clamped;
    }
    (w as u32, h as u32)
}

fn expand_indexed(palette: &[Rgb<u8>], indices: &GrayImage) -> RgbImage {
    let (w, h) = indices.dimensions();
    let mut out = Vec::with_capacity(w as usize * h as usize * 3);
    for idx in indices.as_raw() {
        let c = palette.get(*idx as usize).copied().unwrap_or(Rgb([0, 0, 0]));
        out.extend_from_slice(&c.0);
    }
    RgbImage::from_raw(w, h, out).unwrap_or_else(|| RgbImage::new(w, h))
}

/// Copy a `w x h` block between two buffers of the same pixel type.
pub(crate) fn copy_rect<P: Pixel<Subpixel = u8>>(
    src: &ImageBuffer<P, Vec<u8>>,
    dst: &mut ImageBuffer<P, Vec<u8>>,
    (sx, sy): (u32, u32),
    (dx, dy): (u32, u32),
    (w, h): (u32, u32),
) {
    let ch = P::CHANNEL_COUNT as usize;
    let src_stride = src.width() as usize * ch;
    let dst_stride = dst.width() as usize * ch;
    let row = w as usize * ch;
    let s: &[u8] = src;
    let d: &mut [u8] = dst;
    for r in 0..h as usize {
        let so = (sy as usize + r) * src_stride + sx as usize * ch;
        let dof = (dy as usize + r) * dst_stride + dx as usize * ch;
        d[dof..dof + row].copy_from_slice(&s[so..so + row]);
    }
}

pub(crate) fn fill_mask_rect(mask: &mut GrayImage, (x, y): (u32, u32), (w, h): (u32, u32), value: u8) {
    let stride = mask.width() as usize;
    let raw: &mut [u8] = mask;
    for r in 0..h as usize {
        let o = (y as usize + r) * stride + x as usize;
        raw[o..o + w as usize].fill(value);
    }
}

impl Pixmap {
    // ---------------------------------------------------------------------
    //  Construction
    // ---------------------------------------------------------------------

    /// Opaque black pixmap.
    pub fn new(width: i32, height: i32) -> Self {
        let (w, h) = clamp_size(width, height);
        Self {
            data: PixelData::Direct(RgbImage::new(w, h)),
            mask: None,
        }
    }

    pub fn filled(width: i32, height: i32, color: Color) -> Self {
        let mut p = Self::new(width, height);
        p.fill(color);
        p
    }

    /// Builds a pixmap from colour data and an optional mask.  A mask of the
    /// wrong size is discarded.
    pub fn from_parts(rgb: RgbImage, mask: Option<GrayImage>) -> Self {
        let mask = mask.filter(|m| {
            let ok = m.dimensions() == rgb.dimensions();
            if !ok {
                log_err!("Discarding mask with mismatched size {:?}", m.dimensions());
            }
            ok
        });
        Self { data: PixelData::Direct(rgb), mask }
    }

    pub fn from_indexed(
        depth: u8,
        palette: Vec<Rgb<u8>>,
        indices: GrayImage,
        mask: Option<GrayImage>,
    ) -> Self {
        debug_assert!(depth == 1 || depth == 8, "indexed depth must be 1 or 8");
        let mask = mask.filter(|m| m.dimensions() == indices.dimensions());
        Self {
            data: PixelData::Indexed { depth, palette, indices },
            mask,
        }
    }

    /// Splits RGBA into colour + mask; the mask is kept only when some pixel
    /// is not fully opaque.
    pub fn from_rgba(img: &RgbaImage) -> Self {
        let (w, h) = img.dimensions();
        let mut rgb = Vec::with_capacity(w as usize * h as usize * 3);
        let mut alpha = Vec::with_capacity(w as usize * h as usize);
        for px in img.as_raw().chunks_exact(4) {
            rgb.extend_from_slice(&px[..3]);
            alpha.push(px[3]);
        }
        let mask = if alpha.iter().all(|&a| a == MASK_OPAQUE) {
            None
        } else {
            GrayImage::from_raw(w, h, alpha)
        };
        let rgb = RgbImage::from_raw(w, h, rgb).unwrap_or_else(|| RgbImage::new(w, h));
        Self::from_parts(rgb, mask)
    }

    pub fn to_rgba(&self) -> RgbaImage {
        let (w, h) = self.dims();
        let rgb = self.rgb_image();
        let mut out = Vec::with_capacity(w as usize * h as usize * 4);
        match &self.mask {
            Some(m) => {
                for (px, a) in rgb.as_raw().chunks_exact(3).zip(m.as_raw()) {
                    out.extend_from_slice(&[px[0], px[1], px[2], *a]);
                }
            }
            None => {
                for px in rgb.as_raw().chunks_exact(3) {
                    out.extend_from_slice(&[px[0], px[1], px[2], MASK_OPAQUE]);
                }
            }
        }
        RgbaImage::from_raw(w, h, out).unwrap_or_else(|| RgbaImage::new(w, h))
    }

    // ---------------------------------------------------------------------
    //  Geometry and representation
    // ---------------------------------------------------------------------

    fn dims(&self) -> (u32, u32) {
        match &self.data {
            PixelData::Direct(img) => img.dimensions(),
            PixelData::Indexed { indices, .. } => indices.dimensions(),
        }
    }

    pub fn width(&self) -> i32 {
        self.dims().0 as i32
    }

    pub fn height(&self) -> i32 {
        self.dims().1 as i32
    }

    pub fn rect(&self) -> Rect {
        Rect::from_size(self.width(), self.height())
    }

    pub fn is_null(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Bits per pixel: 1 or 8 for indexed data, 24 for RGB, 32 for RGB with mask.
    pub fn depth(&self) -> u8 {
        match &self.data {
            PixelData::Indexed { depth, .. } => *depth,
            PixelData::Direct(_) if self.mask.is_some() => 32,
            PixelData::Direct(_) => 24,
        }
    }

    pub fn is_indexed(&self) -> bool {
        matches!(self.data, PixelData::Indexed { .. })
    }

    pub fn data(&self) -> &PixelData {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut PixelData {
        &mut self.data
    }

    pub fn palette(&self) -> Option<&[Rgb<u8>]> {
        match &self.data {
            PixelData::Indexed { palette, .. } => Some(palette),
            PixelData::Direct(_) => None,
        }
    }

    /// Memory held by the colour data and the mask.
    pub fn byte_size(&self) -> i32 {
        let (w, h) = (self.width(), self.height());
        let colour_depth = match &self.data {
            PixelData::Indexed { depth, .. } => *depth as i32,
            PixelData::Direct(_) => 24,
        };
        let mask = if self.mask.is_some() { dimensions::pixmap_size(w, h, 8) } else { 0 };
        dimensions::add_dimensions(dimensions::pixmap_size(w, h, colour_depth), mask)
    }

    /// Colour data as RGB, expanding palette indices when needed.
    pub fn rgb_image(&self) -> Cow<'_, RgbImage> {
        match &self.data {
            PixelData::Direct(img) => Cow::Borrowed(img),
            PixelData::Indexed { palette, indices, .. } => Cow::Owned(expand_indexed(palette, indices)),
        }
    }

    /// Converts palette data to RGB in place and returns it.
    pub fn make_direct(&mut self) -> &mut RgbImage {
        if let PixelData::Indexed { palette, indices, .. } = &self.data {
            let rgb = expand_indexed(palette, indices);
            self.data = PixelData::Direct(rgb);
        }
        match &mut self.data {
            PixelData::Direct(img) => img,
            PixelData::Indexed { .. } => unreachable!("indexed data promoted above"),
        }
    }

    // ---------------------------------------------------------------------
    //  Mask
    // ---------------------------------------------------------------------

    pub fn mask(&self) -> Option<&GrayImage> {
        self.mask.as_ref()
    }

    pub fn has_mask(&self) -> bool {
        self.mask.is_some()
    }

    /// Replaces the mask.  A mask of the wrong size is ignored.
    pub fn set_mask(&mut self, mask: Option<GrayImage>) {
        match mask {
            Some(m) if m.dimensions() != self.dims() => {
                debug_assert!(false, "mask size mismatch");
                log_err!("set_mask: size {:?} does not match {:?}", m.dimensions(), self.dims());
            }
            other => self.mask = other,
        }
    }

    pub fn take_mask(&mut self) -> Option<GrayImage> {
        self.mask.take()
    }

    /// Materialises an all-opaque mask if there is none.
    pub fn ensure_mask(&mut self) {
        self.ensure_mask_mut();
    }

    fn ensure_mask_mut(&mut self) -> &mut GrayImage {
        let (w, h) = self.dims();
        self.mask
            .get_or_insert_with(|| GrayImage::from_pixel(w, h, Luma([MASK_OPAQUE])))
    }

    /// The mask, or an all-opaque one.
    pub fn non_null_mask(&self) -> GrayImage {
        match &self.mask {
            Some(m) => m.clone(),
            None => {
                let (w, h) = self.dims();
                GrayImage::from_pixel(w, h, Luma([MASK_OPAQUE]))
            }
        }
    }

    /// Drops the mask when every pixel is opaque.
    pub fn drop_opaque_mask(&mut self) {
        if self.mask.as_ref().is_some_and(|m| m.as_raw().iter().all(|&a| a == MASK_OPAQUE)) {
            self.mask = None;
        }
    }

    pub fn is_fully_opaque(&self) -> bool {
        self.mask.as_ref().is_none_or(|m| m.as_raw().iter().all(|&a| a == MASK_OPAQUE))
    }

    fn clip(&self, rect: Rect) -> Option<((u32, u32), (u32, u32))> {
        let r = rect.intersected(&self.rect());
        if r.is_empty() {
            return None;
        }
        Some(((r.x as u32, r.y as u32), (r.width as u32, r.height as u32)))
    }

    pub fn ensure_transparent_at(&mut self, rect: Rect) {
        if let Some((at, size)) = self.clip(rect) {
            fill_mask_rect(self.ensure_mask_mut(), at, size, MASK_TRANSPARENT);
        }
    }

    pub fn ensure_opaque_at(&mut self, rect: Rect) {
        if let Some((at, size)) = self.clip(rect)
            && let Some(m) = &mut self.mask
        {
            fill_mask_rect(m, at, size, MASK_OPAQUE);
        }
    }

    /// Every non-zero pixel of `brush`, placed at `at`, becomes transparent.
    pub fn paint_mask_transparent_with_brush(&mut self, at: Point, brush: &GrayImage) {
        let footprint = Rect::new(at.x, at.y, brush.width() as i32, brush.height() as i32);
        let Some(((x0, y0), (w, h))) = self.clip(footprint) else {
            return;
        };
        if !brush.as_raw().iter().any(|&v| v != 0) {
            return;
        }
        let mask = self.ensure_mask_mut();
        for y in y0..y0 + h {
            for x in x0..x0 + w {
                let b = brush.get_pixel((x as i32 - at.x) as u32, (y as i32 - at.y) as u32)[0];
                if b != 0 {
                    mask.put_pixel(x, y, Luma([MASK_TRANSPARENT]));
                }
            }
        }
    }

    /// Copy whose transparent pixels carry `color` in their colour bytes.
    pub fn with_defined_transparent_pixels(&self, color: Color) -> Pixmap {
        let mut out = self.clone();
        let (Some(mask), Some(rgb)) = (self.mask.clone(), color.rgb_bytes()) else {
            return out;
        };
        let img = out.make_direct();
        for (px, a) in img.pixels_mut().zip(mask.as_raw()) {
            if *a == MASK_TRANSPARENT {
                *px = Rgb(rgb);
            }
        }
        out
    }

    // ---------------------------------------------------------------------
    //  Pixel access
    // ---------------------------------------------------------------------

    fn rgba_unchecked(&self, x: u32, y: u32) -> Rgba<u8> {
        let rgb = match &self.data {
            PixelData::Direct(img) => *img.get_pixel(x, y),
            PixelData::Indexed { palette, indices, .. } => palette
                .get(indices.get_pixel(x, y)[0] as usize)
                .copied()
                .unwrap_or(Rgb([0, 0, 0])),
        };
        let a = self.mask.as_ref().map_or(MASK_OPAQUE, |m| m.get_pixel(x, y)[0]);
        Rgba([rgb[0], rgb[1], rgb[2], a])
    }

    /// Colour at `p`, or `Color::Invalid` outside the pixmap.
    pub fn color_at(&self, p: Point) -> Color {
        if !self.rect().contains(p) {
            return Color::Invalid;
        }
        Color::Rgba(self.rgba_unchecked(p.x as u32, p.y as u32))
    }

    /// Writes one pixel.  Transparent colours only touch the mask.
    pub fn set_pixel(&mut self, p: Point, color: Color) {
        let Color::Rgba(c) = color else {
            return;
        };
        if !self.rect().contains(p) {
            return;
        }
        let (x, y) = (p.x as u32, p.y as u32);
        if c[3] == MASK_TRANSPARENT {
            self.ensure_mask_mut().put_pixel(x, y, Luma([MASK_TRANSPARENT]));
            return;
        }
        self.make_direct().put_pixel(x, y, Rgb([c[0], c[1], c[2]]));
        if c[3] != MASK_OPAQUE || self.mask.is_some() {
            self.ensure_mask_mut().put_pixel(x, y, Luma([c[3]]));
        }
    }

    /// Fills `rect` (clipped) with `color`, replacing colour and opacity.
    pub fn fill_rect(&mut self, rect: Rect, color: Color) {
        let Color::Rgba(c) = color else {
            return;
        };
        let Some((at, size)) = self.clip(rect) else {
            return;
        };
        if c[3] != MASK_TRANSPARENT {
            let img = self.make_direct();
            for y in at.1..at.1 + size.1 {
                for x in at.0..at.0 + size.0 {
                    img.put_pixel(x, y, Rgb([c[0], c[1], c[2]]));
                }
            }
        }
        if c[3] != MASK_OPAQUE || self.mask.is_some() {
            fill_mask_rect(self.ensure_mask_mut(), at, size, c[3]);
        }
    }

    /// Horizontal run `x0..=x1` on row `y`.
    pub fn draw_hline(&mut self, y: i32, x0: i32, x1: i32, color: Color) {
        let (l, r) = if x0 <= x1 { (x0, x1) } else { (x1, x0) };
        self.fill_rect(Rect::from_edges(l, y, r, y), color);
    }

    // ---------------------------------------------------------------------
    //  Regions
    // ---------------------------------------------------------------------

    /// New pixmap holding `rect`.  Parts outside this pixmap are transparent.
    pub fn region(&self, rect: Rect) -> Pixmap {
        if rect.is_empty() {
            return Pixmap::new(0, 0);
        }
        if self.rect().contains_rect(&rect) {
            let (x, y, w, h) = (rect.x as u32, rect.y as u32, rect.width as u32, rect.height as u32);
            let data = match &self.data {
                PixelData::Direct(img) => {
                    PixelData::Direct(imageops::crop_imm(img, x, y, w, h).to_image())
                }
                PixelData::Indexed { depth, palette, indices } => PixelData::Indexed {
                    depth: *depth,
                    palette: palette.clone(),
                    indices: imageops::crop_imm(indices, x, y, w, h).to_image(),
                },
            };
            let mask = self
                .mask
                .as_ref()
                .map(|m| imageops::crop_imm(m, x, y, w, h).to_image());
            return Pixmap { data, mask };
        }

        let mut out = Pixmap::filled(rect.width, rect.height, Color::TRANSPARENT);
        let inside = rect.intersected(&self.rect());
        if !inside.is_empty() {
            let part = self.region(inside);
            out.set_region(inside.translated(-rect.x, -rect.y), &part);
        }
        out
    }

    /// Overwrites `rect` with `src`'s colour and opacity (no blending).
    ///
    /// `rect` must fit inside `src`; oversize rects are clamped in release
    /// builds.  Parts of `rect` outside this pixmap are ignored.
    pub fn set_region(&mut self, rect: Rect, src: &Pixmap) {
        debug_assert!(
            rect.width <= src.width() && rect.height <= src.height(),
            "set_region: rect {:?} larger than source {}x{}",
            rect,
            src.width(),
            src.height()
        );
        let rect = Rect::new(
            rect.x,
            rect.y,
            rect.width.min(src.width()),
            rect.height.min(src.height()),
        );
        let target = rect.intersected(&self.rect());
        if target.is_empty() {
            return;
        }
        let from = ((target.x - rect.x) as u32, (target.y - rect.y) as u32);
        let to = (target.x as u32, target.y as u32);
        let size = (target.width as u32, target.height as u32);

        let shared_palette = matches!(
            (&self.data, &src.data),
            (PixelData::Indexed { palette: a, .. }, PixelData::Indexed { palette: b, .. }) if a == b
        );
        let mut copied = false;
        if shared_palette
            && let (PixelData::Indexed { indices: dst, .. }, PixelData::Indexed { indices: s, .. }) =
                (&mut self.data, &src.data)
        {
            copy_rect(s, dst, from, to, size);
            copied = true;
        }
        if !copied {
            let src_rgb = src.rgb_image();
            copy_rect(&src_rgb, self.make_direct(), from, to, size);
        }

        match &src.mask {
            Some(sm) => copy_rect(sm, self.ensure_mask_mut(), from, to, size),
            None => {
                if let Some(dm) = &mut self.mask {
                    fill_mask_rect(dm, to, size, MASK_OPAQUE);
                }
            }
        }
    }

    /// Alpha-over composite of `src` with its top-left at `at`.
    pub fn paint_region(&mut self, at: Point, src: &Pixmap) {
        let footprint = src.rect().translated(at.x, at.y);
        let target = footprint.intersected(&self.rect());
        if target.is_empty() {
            return;
        }
        let Some(src_mask) = src.mask() else {
            self.set_region(target, &src.region(target.translated(-at.x, -at.y)));
            return;
        };

        let src_rgb = src.rgb_image();
        let mut dst_mask = self.mask.take();
        let dst = self.make_direct();
        for y in target.top()..=target.bottom() {
            for x in target.left()..=target.right() {
                let (sx, sy) = ((x - at.x) as u32, (y - at.y) as u32);
                let (dx, dy) = (x as u32, y as u32);
                let sa = src_mask.get_pixel(sx, sy)[0];
                if sa == MASK_TRANSPARENT {
                    continue;
                }
                let s = *src_rgb.get_pixel(sx, sy);
                if sa == MASK_OPAQUE {
                    dst.put_pixel(dx, dy, s);
                    if let Some(m) = &mut dst_mask {
                        m.put_pixel(dx, dy, Luma([MASK_OPAQUE]));
                    }
                    continue;
                }
                let da = dst_mask.as_ref().map_or(MASK_OPAQUE, |m| m.get_pixel(dx, dy)[0]);
                let (saf, daf) = (sa as f32 / 255.0, da as f32 / 255.0);
                let out_a = saf + daf * (1.0 - saf);
                let d = *dst.get_pixel(dx, dy);
                let mut out = [0u8; 3];
                for c in 0..3 {
                    let v = (s[c] as f32 * saf + d[c] as f32 * daf * (1.0 - saf)) / out_a;
                    out[c] = v.round().clamp(0.0, 255.0) as u8;
                }
                dst.put_pixel(dx, dy, Rgb(out));
                if let Some(m) = &mut dst_mask {
                    m.put_pixel(dx, dy, Luma([(out_a * 255.0).round() as u8]));
                }
            }
        }
        self.mask = dst_mask;
    }

    // ---------------------------------------------------------------------
    //  Whole-buffer operations
    // ---------------------------------------------------------------------

    /// Opaque colours clear the mask, the transparent colour only clears
    /// opacity, `Invalid` does nothing.
    pub fn fill(&mut self, color: Color) {
        let Color::Rgba(c) = color else {
            return;
        };
        let (w, h) = self.dims();
        if c[3] == MASK_TRANSPARENT {
            let raw: &mut [u8] = self.ensure_mask_mut();
            raw.fill(MASK_TRANSPARENT);
            return;
        }
        self.data = PixelData::Direct(RgbImage::from_pixel(w, h, Rgb([c[0], c[1], c[2]])));
        self.mask = if c[3] == MASK_OPAQUE {
            None
        } else {
            Some(GrayImage::from_pixel(w, h, Luma([c[3]])))
        };
    }

    /// Changes the canvas size, anchored at the top-left.  New area gets
    /// `background`, or becomes transparent when that is not opaque paint.
    pub fn resize(&mut self, width: i32, height: i32, background: Color) {
        if width == self.width() && height == self.height() {
            return;
        }
        let fill = if background.is_valid() && !background.is_transparent() {
            background
        } else {
            Color::TRANSPARENT
        };
        let mut out = Pixmap::filled(width, height, fill);
        let keep = Rect::from_size(width.min(self.width()), height.min(self.height()));
        if !keep.is_empty() {
            out.set_region(keep, self);
        }
        out.drop_opaque_mask();
        *self = out;
    }

    /// Scaled copy.  `smooth` filters; otherwise nearest neighbour through
    /// the transform engine.
    pub fn scaled(&self, width: i32, height: i32, smooth: bool) -> Pixmap {
        if width <= 0 || height <= 0 || self.is_null() {
            return Pixmap::new(width, height);
        }
        if width == self.width() && height == self.height() {
            return self.clone();
        }
        if smooth {
            let (w, h) = clamp_size(width, height);
            let rgba = self.to_rgba();
            let resized = imageops::resize(&rgba, w, h, Interpolation::Bilinear.to_filter());
            return Pixmap::from_rgba(&resized);
        }
        let matrix = AffineMatrix::scaling(
            width as f64 / self.width() as f64,
            height as f64 / self.height() as f64,
        );
        transform::transform_pixmap(self, &matrix, Color::Invalid, width, height)
    }

    /// True when both pixmaps show the same pixels, whatever their storage.
    pub fn same_pixels(&self, other: &Pixmap) -> bool {
        self.dims() == other.dims() && self.to_rgba() == other.to_rgba()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(w: i32, h: i32) -> Pixmap {
        let mut p = Pixmap::new(w, h);
        for y in 0..h {
            for x in 0..w {
                p.set_pixel(Point::new(x, y), Color::rgb((x * 20) as u8, (y * 20) as u8, 7));
            }
        }
        p
    }

    #[test]
    fn region_outside_is_transparent() {
        let p = gradient(4, 4);
        let r = p.region(Rect::new(10, 10, 3, 2));
        assert_eq!((r.width(), r.height()), (3, 2));
        for y in 0..2 {
            for x in 0..3 {
                assert!(r.color_at(Point::new(x, y)).is_transparent());
            }
        }
    }

    #[test]
    fn region_partially_outside() {
        let p = gradient(4, 4);
        let r = p.region(Rect::new(2, 2, 4, 4));
        assert_eq!(r.color_at(Point::new(0, 0)), p.color_at(Point::new(2, 2)));
        assert_eq!(r.color_at(Point::new(1, 1)), p.color_at(Point::new(3, 3)));
        assert!(r.color_at(Point::new(2, 0)).is_transparent());
        assert!(r.color_at(Point::new(0, 3)).is_transparent());
    }

    #[test]
    fn set_region_of_own_region_is_identity() {
        let mut p = gradient(6, 5);
        p.ensure_transparent_at(Rect::new(1, 1, 2, 1));
        let before = p.clone();
        for rect in [Rect::new(0, 0, 6, 5), Rect::new(1, 2, 3, 2), Rect::new(5, 4, 1, 1)] {
            let part = p.region(rect);
            p.set_region(rect, &part);
            assert!(p.same_pixels(&before));
        }
    }

    #[test]
    fn set_region_replaces_opacity() {
        let mut dst = Pixmap::filled(4, 4, Color::RED);
        let src = Pixmap::filled(2, 2, Color::TRANSPARENT);
        dst.set_region(Rect::new(1, 1, 2, 2), &src);
        assert!(dst.color_at(Point::new(1, 1)).is_transparent());
        assert_eq!(dst.color_at(Point::new(0, 0)), Color::RED);

        let opaque = Pixmap::filled(2, 2, Color::BLUE);
        dst.set_region(Rect::new(1, 1, 2, 2), &opaque);
        assert_eq!(dst.color_at(Point::new(2, 2)), Color::BLUE);
    }

    #[test]
    fn color_at_out_of_bounds_is_invalid() {
        let p = Pixmap::filled(3, 3, Color::WHITE);
        assert_eq!(p.color_at(Point::new(-1, 0)), Color::Invalid);
        assert_eq!(p.color_at(Point::new(3, 0)), Color::Invalid);
        assert_eq!(p.color_at(Point::new(2, 2)), Color::WHITE);
    }

    #[test]
    fn fill_semantics() {
        let mut p = Pixmap::filled(3, 3, Color::RED);
        p.fill(Color::TRANSPARENT);
        assert!(p.has_mask());
        let raw = p.rgb_image();
        assert_eq!(raw.get_pixel(1, 1), &Rgb([255, 0, 0]));
        drop(raw);

        p.fill(Color::BLUE);
        assert!(!p.has_mask());
        assert_eq!(p.color_at(Point::new(0, 0)), Color::BLUE);

        p.fill(Color::Invalid);
        assert_eq!(p.color_at(Point::new(0, 0)), Color::BLUE);

        p.fill(Color::rgba(10, 20, 30, 128));
        assert_eq!(p.color_at(Point::new(2, 2)), Color::rgba(10, 20, 30, 128));
    }

    #[test]
    fn resize_grows_with_background() {
        let mut p = Pixmap::filled(2, 2, Color::RED);
        p.resize(4, 3, Color::WHITE);
        assert_eq!((p.width(), p.height()), (4, 3));
        assert_eq!(p.color_at(Point::new(1, 1)), Color::RED);
        assert_eq!(p.color_at(Point::new(3, 2)), Color::WHITE);
        assert!(!p.has_mask());

        p.resize(5, 3, Color::TRANSPARENT);
        assert!(p.color_at(Point::new(4, 0)).is_transparent());
        assert_eq!(p.color_at(Point::new(0, 0)), Color::RED);

        p.resize(1, 1, Color::WHITE);
        assert_eq!(p.color_at(Point::new(0, 0)), Color::RED);
        assert!(!p.has_mask());
    }

    #[test]
    fn paint_region_blends() {
        let mut dst = Pixmap::filled(2, 1, Color::rgb(0, 0, 200));
        let mut src = Pixmap::filled(2, 1, Color::rgb(200, 0, 0));
        src.ensure_mask();
        src.set_mask(Some(GrayImage::from_raw(2, 1, vec![0, 128]).unwrap()));
        dst.paint_region(Point::new(0, 0), &src);
        assert_eq!(dst.color_at(Point::new(0, 0)), Color::rgb(0, 0, 200));
        let Color::Rgba(mixed) = dst.color_at(Point::new(1, 0)) else {
            panic!("in bounds")
        };
        assert_eq!(mixed[3], 255);
        assert!((mixed[0] as i32 - 100).abs() <= 1);
        assert!((mixed[2] as i32 - 100).abs() <= 1);
    }

    #[test]
    fn indexed_crop_stays_indexed() {
        let indices = GrayImage::from_raw(2, 2, vec![0, 1, 1, 0]).unwrap();
        let p = Pixmap::from_indexed(1, vec![Rgb([0, 0, 0]), Rgb([255, 255, 255])], indices, None);
        let r = p.region(Rect::new(1, 0, 1, 2));
        assert!(r.is_indexed());
        assert_eq!(r.color_at(Point::new(0, 0)), Color::WHITE);
        assert_eq!(r.color_at(Point::new(0, 1)), Color::BLACK);
    }

    #[test]
    fn brush_mask_clears_opacity() {
        let mut p = Pixmap::filled(3, 3, Color::RED);
        let brush = GrayImage::from_raw(2, 1, vec![255, 0]).unwrap();
        p.paint_mask_transparent_with_brush(Point::new(1, 1), &brush);
        assert!(p.color_at(Point::new(1, 1)).is_transparent());
        assert_eq!(p.color_at(Point::new(2, 1)), Color::RED);
    }

    #[test]
    fn defined_transparent_pixels() {
        let mut p = Pixmap::filled(2, 1, Color::RED);
        p.ensure_transparent_at(Rect::new(0, 0, 1, 1));
        let q = p.with_defined_transparent_pixels(Color::GREEN);
        assert_eq!(q.rgb_image().get_pixel(0, 0), &Rgb([0, 255, 0]));
        assert!(q.color_at(Point::new(0, 0)).is_transparent());
    }

    #[test]
    fn oversized_allocation_is_clamped() {
        let (w, h) = clamp_size(1 << 16, 1 << 16);
        assert_eq!(w, 1 << 16);
        assert!(pixmap_area(w as i32, h as i32) <= MAX_PIXMAP_AREA);
        assert_eq!(clamp_size(-4, 10), (0, 10));
    }

    #[test]
    fn sharp_scale_is_pixel_replication() {
        let p = gradient(2, 2);
        let s = p.scaled(4, 4, false);
        assert_eq!((s.width(), s.height()), (4, 4));
        assert_eq!(s.color_at(Point::new(0, 0)), p.color_at(Point::new(0, 0)));
        assert_eq!(s.color_at(Point::new(3, 1)), p.color_at(Point::new(1, 0)));
        assert_eq!(s.color_at(Point::new(2, 3)), p.color_at(Point::new(1, 1)));
    }
}
