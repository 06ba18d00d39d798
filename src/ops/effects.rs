// ============================================================================
// COLOR EFFECTS: grayscale, colour depth reduction, blur/sharpen, loss checks
// ============================================================================

use image::{GrayImage, Luma, Rgb, RgbImage, imageops};
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::pixmap::{MASK_OPAQUE, MASK_TRANSPARENT, PixelData, Pixmap};

// ---------------------------------------------------------------------------
//  Grayscale
// ---------------------------------------------------------------------------

/// Rec. 709 luminance, integer weights summing to 1 000 000.
#[inline]
pub fn luminance(r: u8, g: u8, b: u8) -> u8 {
    ((212_671 * r as u32 + 715_160 * g as u32 + 72_169 * b as u32) / 1_000_000) as u8
}

/// Grayscale copy.  Opacity is kept; palette pixmaps only convert their
/// palette.
pub fn grayscale(pm: &Pixmap) -> Pixmap {
    let mut out = pm.clone();
    match out.data_mut() {
        PixelData::Indexed { palette, .. } => {
            for c in palette.iter_mut() {
                let l = luminance(c[0], c[1], c[2]);
                *c = Rgb([l, l, l]);
            }
        }
        PixelData::Direct(img) => {
            let stride = img.width() as usize * 3;
            if stride == 0 {
                return out;
            }
            let raw: &mut [u8] = img;
            raw.par_chunks_mut(stride).for_each(|row| {
                for px in row.chunks_exact_mut(3) {
                    let l = luminance(px[0], px[1], px[2]);
                    px.fill(l);
                }
            });
        }
    }
    out
}

// ---------------------------------------------------------------------------
//  Colour depth reduction
// ---------------------------------------------------------------------------

const MONO_THRESHOLD: f32 = 128.0;

fn monochrome_palette() -> Vec<Rgb<u8>> {
    vec![Rgb([0, 0, 0]), Rgb([255, 255, 255])]
}

/// Adds a Floyd-Steinberg share of `err` around `(x, y)` in a `w`-wide
/// buffer of `ch`-channel errors.
fn diffuse(errs: &mut [f32], w: usize, h: usize, ch: usize, x: usize, y: usize, err: &[f32]) {
    let mut push = |nx: isize, ny: usize, weight: f32| {
        if nx < 0 || nx as usize >= w || ny >= h {
            return;
        }
        let o = (ny * w + nx as usize) * ch;
        for c in 0..ch {
            errs[o + c] += err[c] * weight;
        }
    };
    let xi = x as isize;
    push(xi + 1, y, 7.0 / 16.0);
    push(xi - 1, y + 1, 3.0 / 16.0);
    push(xi, y + 1, 5.0 / 16.0);
    push(xi + 1, y + 1, 1.0 / 16.0);
}

fn reduce_to_monochrome(rgb: &RgbImage, dither: bool) -> GrayImage {
    let (w, h) = (rgb.width() as usize, rgb.height() as usize);
    let mut indices = GrayImage::new(w as u32, h as u32);
    let lum: Vec<f32> = rgb
        .pixels()
        .map(|p| luminance(p[0], p[1], p[2]) as f32)
        .collect();

    if !dither {
        for (i, v) in indices.iter_mut().enumerate() {
            *v = u8::from(lum[i] >= MONO_THRESHOLD);
        }
        return indices;
    }

    let mut errs = vec![0.0f32; w * h];
    for y in 0..h {
        for x in 0..w {
            let i = y * w + x;
            let old = lum[i] + errs[i];
            let white = old >= MONO_THRESHOLD;
            indices.put_pixel(x as u32, y as u32, Luma([u8::from(white)]));
            let err = old - if white { 255.0 } else { 0.0 };
            diffuse(&mut errs, w, h, 1, x, y, &[err]);
        }
    }
    indices
}

/// Palette of every distinct colour when there are at most `max` of them.
fn exact_palette(rgb: &RgbImage, max: usize) -> Option<(Vec<Rgb<u8>>, HashMap<[u8; 3], u8>)> {
    let mut lookup = HashMap::new();
    let mut palette = Vec::new();
    for p in rgb.pixels() {
        if !lookup.contains_key(&p.0) {
            if palette.len() == max {
                return None;
            }
            lookup.insert(p.0, palette.len() as u8);
            palette.push(*p);
        }
    }
    Some((palette, lookup))
}

fn reduce_to_256(rgb: &RgbImage, dither: bool) -> (Vec<Rgb<u8>>, GrayImage) {
    let (w, h) = (rgb.width() as usize, rgb.height() as usize);
    let mut indices = GrayImage::new(w as u32, h as u32);

    if let Some((palette, lookup)) = exact_palette(rgb, 256) {
        for (i, p) in indices.iter_mut().zip(rgb.pixels()) {
            *i = lookup.get(&p.0).copied().unwrap_or(0);
        }
        return (palette, indices);
    }

    let rgba: Vec<u8> = rgb
        .pixels()
        .flat_map(|p| [p[0], p[1], p[2], MASK_OPAQUE])
        .collect();
    let nq = color_quant::NeuQuant::new(10, 256, &rgba);
    let palette: Vec<Rgb<u8>> = nq
        .color_map_rgb()
        .chunks_exact(3)
        .map(|c| Rgb([c[0], c[1], c[2]]))
        .collect();

    if !dither {
        for (i, px) in indices.iter_mut().zip(rgba.chunks_exact(4)) {
            *i = nq.index_of(px) as u8;
        }
        return (palette, indices);
    }

    let mut errs = vec![0.0f32; w * h * 3];
    for y in 0..h {
        for x in 0..w {
            let o = (y * w + x) * 3;
            let src = rgb.get_pixel(x as u32, y as u32);
            let want = [
                src[0] as f32 + errs[o],
                src[1] as f32 + errs[o + 1],
                src[2] as f32 + errs[o + 2],
            ];
            let clamped = want.map(|v| v.round().clamp(0.0, 255.0) as u8);
            let idx = nq.index_of(&[clamped[0], clamped[1], clamped[2], MASK_OPAQUE]);
            indices.put_pixel(x as u32, y as u32, Luma([idx as u8]));
            let got = palette.get(idx).copied().unwrap_or(Rgb([0, 0, 0]));
            let err = [
                want[0] - got[0] as f32,
                want[1] - got[1] as f32,
                want[2] - got[2] as f32,
            ];
            diffuse(&mut errs, w, h, 3, x, y, &err);
        }
    }
    (palette, indices)
}

/// Quantises to a 1-bit (black/white) or 8-bit (256 colour palette) pixmap.
/// `dither` selects Floyd-Steinberg error diffusion instead of a threshold.
///
/// The 1-bit path drops the mask: a monochrome pixmap carries no opacity.
/// Callers that must keep transparency re-apply the mask afterwards (see
/// `reduce_colors`).  Other depths return the input unchanged.
pub fn reduce_color_depth(pm: &Pixmap, depth: u8, dither: bool) -> Pixmap {
    let rgb = pm.rgb_image();
    match depth {
        1 => {
            let indices = reduce_to_monochrome(&rgb, dither);
            Pixmap::from_indexed(1, monochrome_palette(), indices, None)
        }
        8 => {
            let (palette, indices) = reduce_to_256(&rgb, dither);
            Pixmap::from_indexed(8, palette, indices, pm.mask().cloned())
        }
        _ => {
            log_warn!("reduce_color_depth: unsupported depth {}", depth);
            pm.clone()
        }
    }
}

/// `reduce_color_depth` with the original mask put back.
pub fn reduce_colors(pm: &Pixmap, depth: u8, dither: bool) -> Pixmap {
    let mut out = reduce_color_depth(pm, depth, dither);
    if let Some(mask) = pm.mask() {
        out.set_mask(Some(mask.clone()));
    }
    out
}

// ---------------------------------------------------------------------------
//  Queries
// ---------------------------------------------------------------------------

/// True when some pixel is partially transparent (not just on/off opacity).
pub fn has_translucency(pm: &Pixmap) -> bool {
    pm.mask()
        .is_some_and(|m| m.as_raw().iter().any(|&a| a != MASK_OPAQUE && a != MASK_TRANSPARENT))
}

pub fn has_transparency(pm: &Pixmap) -> bool {
    pm.mask().is_some_and(|m| m.as_raw().contains(&MASK_TRANSPARENT))
}

/// Distinct RGBA values, counting stops once `max` is reached.
pub fn num_colors_up_to(pm: &Pixmap, max: usize) -> usize {
    let rgba = pm.to_rgba();
    let mut seen = HashSet::new();
    for p in rgba.pixels() {
        if seen.len() >= max {
            break;
        }
        seen.insert(p.0);
    }
    seen.len()
}

/// Smallest standard depth that stores `pm` without loss.
pub fn effective_depth(pm: &Pixmap) -> u8 {
    if pm.has_mask() && !pm.is_fully_opaque() {
        return 32;
    }
    match num_colors_up_to(pm, 257) {
        0..=2 => 1,
        3..=256 => 8,
        _ => 24,
    }
}

// ---------------------------------------------------------------------------
//  Blur / sharpen
// ---------------------------------------------------------------------------

pub const BLUR_SHARPEN_MIN: i32 = -10;
pub const BLUR_SHARPEN_MAX: i32 = 10;

/// Negative `amount` blurs, positive sharpens, zero is a no-op.  Only the
/// colour bytes change; opacity is kept.
pub fn blur_sharpen(pm: &Pixmap, amount: i32) -> Pixmap {
    let amount = amount.clamp(BLUR_SHARPEN_MIN, BLUR_SHARPEN_MAX);
    if amount == 0 || pm.is_null() {
        return pm.clone();
    }
    let rgb = pm.rgb_image();
    let sigma = amount.unsigned_abs() as f32 * 0.5;
    let out: RgbImage = if amount < 0 {
        imageops::blur(&*rgb, sigma)
    } else {
        imageops::unsharpen(&*rgb, sigma, 0)
    };
    Pixmap::from_parts(out, pm.mask().cloned())
}

// ---------------------------------------------------------------------------
//  Save loss analysis
// ---------------------------------------------------------------------------

/// What a save destination can store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LossTarget {
    /// Deepest colour depth the file format supports.
    pub format_max_depth: u8,
    /// Depth the user asked for (`<= format_max_depth`).
    pub color_depth: u8,
    pub supports_alpha: bool,
    pub lossy_compression: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LossWarning {
    FormatDepthTooLow { format_max_depth: u8, image_depth: u8 },
    ColorDepthTooLow { color_depth: u8, image_depth: u8 },
    TranslucencyLost,
    TransparencyLost,
    LossyCompression,
}

impl fmt::Display for LossWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LossWarning::FormatDepthTooLow { format_max_depth, image_depth } => write!(
                f,
                "the format stores at most {}-bit colour but the image needs {}-bit",
                format_max_depth, image_depth
            ),
            LossWarning::ColorDepthTooLow { color_depth, image_depth } => write!(
                f,
                "saving at {}-bit colour loses detail from a {}-bit image",
                color_depth, image_depth
            ),
            LossWarning::TranslucencyLost => write!(f, "partial transparency will be lost"),
            LossWarning::TransparencyLost => write!(f, "transparent pixels will become opaque"),
            LossWarning::LossyCompression => write!(f, "the format compresses lossily"),
        }
    }
}

/// Advisory warnings for saving `pm` to `target`.  Never an error.
pub fn analyze_loss(pm: &Pixmap, target: &LossTarget) -> Vec<LossWarning> {
    let mut out = Vec::new();
    let image_depth = effective_depth(pm);
    let colour_depth = image_depth.min(24);

    if target.format_max_depth < colour_depth {
        out.push(LossWarning::FormatDepthTooLow {
            format_max_depth: target.format_max_depth,
            image_depth: colour_depth,
        });
    } else if target.color_depth < colour_depth {
        out.push(LossWarning::ColorDepthTooLow {
            color_depth: target.color_depth,
            image_depth: colour_depth,
        });
    }
    if has_translucency(pm) && (!target.supports_alpha || target.color_depth < 32) {
        out.push(LossWarning::TranslucencyLost);
    } else if has_transparency(pm) && !target.supports_alpha {
        out.push(LossWarning::TransparencyLost);
    }
    if target.lossy_compression {
        out.push(LossWarning::LossyCompression);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Color;
    use crate::geometry::{Point, Rect};

    fn four_colours() -> Pixmap {
        let mut p = Pixmap::new(4, 4);
        let cols = [
            Color::BLACK,
            Color::rgb(90, 10, 10),
            Color::rgb(250, 240, 120),
            Color::WHITE,
        ];
        for y in 0..4 {
            for x in 0..4 {
                p.set_pixel(Point::new(x, y), cols[((x + y) % 4) as usize]);
            }
        }
        p
    }

    #[test]
    fn luminance_weights() {
        assert_eq!(luminance(255, 255, 255), 255);
        assert_eq!(luminance(0, 0, 0), 0);
        assert_eq!(luminance(255, 0, 0), 54);
        assert_eq!(luminance(0, 255, 0), 182);
    }

    #[test]
    fn grayscale_keeps_alpha() {
        let mut p = Pixmap::filled(2, 2, Color::rgb(255, 0, 0));
        p.ensure_transparent_at(Rect::new(0, 0, 1, 1));
        let g = grayscale(&p);
        assert!(g.color_at(Point::new(0, 0)).is_transparent());
        assert_eq!(g.color_at(Point::new(1, 1)), Color::rgb(54, 54, 54));
    }

    #[test]
    fn grayscale_on_palette_touches_only_palette() {
        let idx = GrayImage::from_raw(2, 1, vec![0, 1]).unwrap();
        let p = Pixmap::from_indexed(8, vec![Rgb([255, 0, 0]), Rgb([0, 255, 0])], idx, None);
        let g = grayscale(&p);
        assert!(g.is_indexed());
        assert_eq!(g.palette().unwrap(), &[Rgb([54, 54, 54]), Rgb([182, 182, 182])]);
    }

    #[test]
    fn monochrome_has_two_colours_and_drops_mask() {
        let mut p = four_colours();
        p.ensure_transparent_at(Rect::new(0, 0, 2, 2));
        let mono = reduce_color_depth(&p, 1, false);
        assert_eq!(mono.depth(), 1);
        assert!(!mono.has_mask());
        assert_eq!(num_colors_up_to(&mono, 10), 2);
        assert_eq!(mono.color_at(Point::new(1, 0)), Color::BLACK);
        assert_eq!(mono.color_at(Point::new(2, 0)), Color::WHITE);

        let kept = reduce_colors(&p, 1, false);
        assert!(kept.color_at(Point::new(0, 0)).is_transparent());
    }

    #[test]
    fn dithered_monochrome_mixes_grey() {
        let p = Pixmap::filled(8, 8, Color::rgb(128, 128, 128));
        let mono = reduce_color_depth(&p, 1, true);
        let whites = mono.to_rgba().pixels().filter(|px| px[0] == 255).count();
        assert!(whites > 16 && whites < 48, "whites = {whites}");
    }

    #[test]
    fn few_colours_reduce_to_exact_palette() {
        let p = four_colours();
        let r = reduce_color_depth(&p, 8, false);
        assert_eq!(r.depth(), 8);
        assert!(r.same_pixels(&p));
    }

    #[test]
    fn many_colours_quantise_to_256() {
        let mut p = Pixmap::new(32, 32);
        for y in 0..32 {
            for x in 0..32 {
                p.set_pixel(Point::new(x, y), Color::rgb((x * 8) as u8, (y * 8) as u8, 100));
            }
        }
        let r = reduce_color_depth(&p, 8, true);
        assert!(r.palette().unwrap().len() <= 256);
        assert!(num_colors_up_to(&r, 1000) <= 256);
    }

    #[test]
    fn unsupported_depth_is_identity() {
        let p = four_colours();
        assert_eq!(reduce_color_depth(&p, 4, false), p);
    }

    #[test]
    fn translucency_versus_binary_mask() {
        let mut p = Pixmap::filled(2, 1, Color::RED);
        assert!(!has_translucency(&p));
        p.ensure_transparent_at(Rect::new(0, 0, 1, 1));
        assert!(!has_translucency(&p));
        p.set_pixel(Point::new(1, 0), Color::rgba(1, 2, 3, 100));
        assert!(has_translucency(&p));
    }

    #[test]
    fn blur_changes_edges_only_in_colour() {
        let mut p = Pixmap::filled(9, 9, Color::BLACK);
        p.fill_rect(Rect::new(4, 0, 5, 9), Color::WHITE);
        p.ensure_transparent_at(Rect::new(0, 0, 1, 1));
        let b = blur_sharpen(&p, -4);
        assert!(b.color_at(Point::new(0, 0)).is_transparent());
        let Color::Rgba(edge) = b.color_at(Point::new(4, 4)) else { panic!() };
        assert!(edge[0] > 0 && edge[0] < 255);
        assert_eq!(blur_sharpen(&p, 0), p);
    }

    #[test]
    fn loss_warnings() {
        let mut p = four_colours();
        let png = LossTarget { format_max_depth: 32, color_depth: 32, supports_alpha: true, lossy_compression: false };
        assert!(analyze_loss(&p, &png).is_empty());

        let mono = LossTarget { format_max_depth: 1, color_depth: 1, supports_alpha: false, lossy_compression: false };
        assert_eq!(
            analyze_loss(&p, &mono),
            vec![LossWarning::FormatDepthTooLow { format_max_depth: 1, image_depth: 8 }]
        );

        p.set_pixel(Point::new(0, 0), Color::rgba(5, 5, 5, 77));
        let jpeg = LossTarget { format_max_depth: 24, color_depth: 24, supports_alpha: false, lossy_compression: true };
        assert_eq!(
            analyze_loss(&p, &jpeg),
            vec![LossWarning::TranslucencyLost, LossWarning::LossyCompression]
        );
    }
}
