use ab_glyph::{Font, FontArc, GlyphId, ScaleFont, point};

use crate::color::Color;
use crate::geometry::{Point, Rect};
use crate::pixmap::Pixmap;

/// Font metrics and colours of a text box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TextStyle {
    pub font_size: f32,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub strike_through: bool,
    pub foreground: Color,
    /// Box fill; any non-opaque colour leaves the box transparent.
    pub background: Color,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            font_size: 14.0,
            bold: false,
            italic: false,
            underline: false,
            strike_through: false,
            foreground: Color::BLACK,
            background: Color::TRANSPARENT,
        }
    }
}

impl TextStyle {
    pub fn is_background_opaque(&self) -> bool {
        self.background.is_opaque()
    }
}

/// Lay out one line, left aligned at x=0 with the baseline at `ascent`.
/// Returns `(glyphs, width)`.
pub fn layout_line(font: &FontArc, text: &str, font_size: f32) -> (Vec<(GlyphId, f32, f32)>, f32) {
    let scaled = font.as_scaled(font_size);
    let ascent = scaled.ascent();
    let mut glyphs = Vec::new();
    let mut cursor_x = 0.0f32;
    let mut last_glyph: Option<GlyphId> = None;

    for ch in text.chars() {
        let glyph_id = font.glyph_id(ch);
        if let Some(prev) = last_glyph {
            cursor_x += scaled.kern(prev, glyph_id);
        }
        glyphs.push((glyph_id, cursor_x, ascent));
        cursor_x += scaled.h_advance(glyph_id);
        last_glyph = Some(glyph_id);
    }
    (glyphs, cursor_x)
}

/// Height of one text line in pixels; 0 without a font.
pub fn line_height(font: Option<&FontArc>, font_size: f32) -> i32 {
    font.map_or(0, |f| f.as_scaled(font_size).height().ceil() as i32)
}

/// Renders `lines` into a `width x height` box.
///
/// Text is drawn aliased (coverage above one half) so the result only holds
/// fully opaque or fully transparent pixels.  Lines that do not fit are
/// clipped.  Without a font only the box background is produced.
pub fn render_text_box(
    font: Option<&FontArc>,
    lines: &[String],
    style: &TextStyle,
    width: i32,
    height: i32,
) -> Pixmap {
    let mut pm = if style.is_background_opaque() {
        Pixmap::filled(width, height, style.background)
    } else {
        Pixmap::filled(width, height, Color::TRANSPARENT)
    };
    let Some(font) = font else {
        if lines.iter().any(|l| !l.is_empty()) {
            log_warn!("Text box rendered without a font; {} line(s) skipped", lines.len());
        }
        return pm;
    };

    let scaled = font.as_scaled(style.font_size);
    let line_h = scaled.height();
    let ascent = scaled.ascent();
    for (row, line) in lines.iter().enumerate() {
        let top = row as f32 * line_h;
        if top >= height as f32 {
            break;
        }
        let (glyphs, line_w) = layout_line(font, line, style.font_size);
        for (id, gx, gy) in glyphs {
            let glyph = id.with_scale_and_position(style.font_size, point(gx, top + gy));
            let Some(outlined) = font.outline_glyph(glyph) else {
                continue;
            };
            let bounds = outlined.px_bounds();
            let baseline = top + ascent;
            outlined.draw(|px, py, cov| {
                if cov <= 0.5 {
                    return;
                }
                let y = bounds.min.y + py as f32;
                let mut x = bounds.min.x + px as f32;
                if style.italic {
                    x += (baseline - y) * 0.2;
                }
                let p = Point::new(x.round() as i32, y.round() as i32);
                pm.set_pixel(p, style.foreground);
                if style.bold {
                    pm.set_pixel(Point::new(p.x + 1, p.y), style.foreground);
                }
            });
        }
        let thickness = (style.font_size / 14.0).ceil().max(1.0) as i32;
        let w = line_w.ceil() as i32;
        if style.underline {
            let y = (top + ascent).round() as i32 + 1;
            pm.fill_rect(Rect::new(0, y, w, thickness), style.foreground);
        }
        if style.strike_through {
            let y = (top + ascent * 0.65).round() as i32;
            pm.fill_rect(Rect::new(0, y, w, thickness), style.foreground);
        }
    }
    pm
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opaque_background_fills_box() {
        let style = TextStyle {
            background: Color::WHITE,
            ..TextStyle::default()
        };
        let pm = render_text_box(None, &[], &style, 8, 4);
        assert_eq!((pm.width(), pm.height()), (8, 4));
        assert_eq!(pm.color_at(Point::new(7, 3)), Color::WHITE);
    }

    #[test]
    fn translucent_background_is_transparent() {
        let style = TextStyle {
            background: Color::rgba(255, 255, 255, 100),
            ..TextStyle::default()
        };
        let pm = render_text_box(None, &["hi".to_string()], &style, 3, 3);
        assert!(pm.color_at(Point::new(1, 1)).is_transparent());
        assert_eq!(line_height(None, 14.0), 0);
    }
}
