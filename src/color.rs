// ============================================================================
// COLOR: concrete RGBA colours, the invalid sentinel, similarity matching
// ============================================================================

use image::Rgba;
use std::fmt;
use std::str::FromStr;

/// A drawing colour.
///
/// `Invalid` is the "no colour" sentinel: out-of-bounds reads return it and
/// transform fills skip the background when handed it.  A valid colour with
/// alpha 0 is the transparent colour.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Color {
    #[default]
    Invalid,
    Rgba(Rgba<u8>),
}

impl Color {
    pub const TRANSPARENT: Color = Color::Rgba(Rgba([0, 0, 0, 0]));
    pub const BLACK: Color = Color::Rgba(Rgba([0, 0, 0, 255]));
    pub const WHITE: Color = Color::Rgba(Rgba([255, 255, 255, 255]));
    pub const RED: Color = Color::Rgba(Rgba([255, 0, 0, 255]));
    pub const GREEN: Color = Color::Rgba(Rgba([0, 255, 0, 255]));
    pub const BLUE: Color = Color::Rgba(Rgba([0, 0, 255, 255]));

    pub const fn rgb(r: u8, g: u8, b: u8) -> Color {
        Color::Rgba(Rgba([r, g, b, 255]))
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Color {
        Color::Rgba(Rgba([r, g, b, a]))
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Color::Rgba(_))
    }

    pub fn is_opaque(&self) -> bool {
        matches!(self, Color::Rgba(c) if c[3] == 255)
    }

    pub fn is_transparent(&self) -> bool {
        matches!(self, Color::Rgba(c) if c[3] == 0)
    }

    pub fn alpha(&self) -> u8 {
        match self {
            Color::Rgba(c) => c[3],
            Color::Invalid => 0,
        }
    }

    pub fn to_rgba(&self) -> Option<Rgba<u8>> {
        match self {
            Color::Rgba(c) => Some(*c),
            Color::Invalid => None,
        }
    }

    pub fn rgb_bytes(&self) -> Option<[u8; 3]> {
        self.to_rgba().map(|c| [c[0], c[1], c[2]])
    }

    /// Compare with a processed similarity (see `ColorSimilarity::processed`).
    ///
    /// `0` is exact match.  Otherwise two transparent colours match, a
    /// transparent and an opaque one never do, and the rest compare by RGB
    /// distance.  `Invalid` never matches anything.
    pub fn is_similar_to(&self, other: &Color, processed_similarity: i32) -> bool {
        let (Color::Rgba(a), Color::Rgba(b)) = (self, other) else {
            return false;
        };
        let (at, bt) = (a[3] == 0, b[3] == 0);
        if processed_similarity == 0 {
            return (at && bt) || a == b;
        }
        if at || bt {
            return at && bt;
        }
        let dr = a[0] as i64 - b[0] as i64;
        let dg = a[1] as i64 - b[1] as i64;
        let db = a[2] as i64 - b[2] as i64;
        let s = processed_similarity as i64;
        dr * dr + dg * dg + db * db <= s * s
    }
}

impl From<Rgba<u8>> for Color {
    fn from(c: Rgba<u8>) -> Self {
        Color::Rgba(c)
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Color::Invalid => write!(f, "invalid"),
            Color::Rgba(c) if c[3] == 255 => write!(f, "#{:02x}{:02x}{:02x}", c[0], c[1], c[2]),
            Color::Rgba(c) => write!(f, "#{:02x}{:02x}{:02x}{:02x}", c[0], c[1], c[2], c[3]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorParseError(pub String);

impl fmt::Display for ColorParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid colour '{}' (expected #rrggbb, #rrggbbaa or a name)", self.0)
    }
}

impl std::error::Error for ColorParseError {}

impl FromStr for Color {
    type Err = ColorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = s.trim().to_ascii_lowercase();
        match t.as_str() {
            "transparent" | "none" => return Ok(Color::TRANSPARENT),
            "black" => return Ok(Color::BLACK),
            "white" => return Ok(Color::WHITE),
            "red" => return Ok(Color::RED),
            "green" => return Ok(Color::GREEN),
            "blue" => return Ok(Color::BLUE),
            _ => {}
        }
        let hex = t.strip_prefix('#').unwrap_or(&t);
        if !(hex.len() == 6 || hex.len() == 8) || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ColorParseError(s.to_string()));
        }
        let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16);
        let parse = || -> Result<Color, std::num::ParseIntError> {
            let a = if hex.len() == 8 { byte(6)? } else { 255 };
            Ok(Color::rgba(byte(0)?, byte(2)?, byte(4)?, a))
        };
        parse().map_err(|_| ColorParseError(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
//  Similarity
// ---------------------------------------------------------------------------

/// Colour similarity as a fraction of the RGB cube diagonal.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct ColorSimilarity(f64);

impl ColorSimilarity {
    pub const MAX: f64 = 0.30;
    pub const EXACT: ColorSimilarity = ColorSimilarity(0.0);

    /// Clamped into `0.0 ..= MAX`.
    pub fn new(value: f64) -> Self {
        if value.is_nan() {
            return Self::EXACT;
        }
        Self(value.clamp(0.0, Self::MAX))
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    /// Euclidean RGB distance this similarity allows.
    pub fn processed(&self) -> i32 {
        let diagonal = (3.0f64 * 255.0 * 255.0).sqrt();
        (self.0 * diagonal).round() as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_and_names() {
        assert_eq!("#ff0000".parse::<Color>(), Ok(Color::RED));
        assert_eq!("00ff0080".parse::<Color>(), Ok(Color::rgba(0, 255, 0, 128)));
        assert_eq!("Transparent".parse::<Color>(), Ok(Color::TRANSPARENT));
        assert!("#12345".parse::<Color>().is_err());
        assert!("#gg0000".parse::<Color>().is_err());
    }

    #[test]
    fn display_round_trips() {
        for c in [Color::rgb(1, 2, 3), Color::rgba(10, 20, 30, 40)] {
            assert_eq!(c.to_string().parse::<Color>(), Ok(c));
        }
    }

    #[test]
    fn exact_similarity() {
        assert!(Color::RED.is_similar_to(&Color::RED, 0));
        assert!(!Color::RED.is_similar_to(&Color::rgb(254, 0, 0), 0));
        assert!(Color::TRANSPARENT.is_similar_to(&Color::rgba(9, 9, 9, 0), 0));
        assert!(!Color::Invalid.is_similar_to(&Color::Invalid, 0));
    }

    #[test]
    fn tolerant_similarity() {
        let sim = ColorSimilarity::new(0.05).processed();
        assert_eq!(sim, 22);
        assert!(Color::RED.is_similar_to(&Color::rgb(240, 10, 5), sim));
        assert!(!Color::RED.is_similar_to(&Color::rgb(200, 0, 0), sim));
        assert!(!Color::RED.is_similar_to(&Color::TRANSPARENT, sim));
    }

    #[test]
    fn similarity_is_clamped() {
        assert_eq!(ColorSimilarity::new(2.0).value(), ColorSimilarity::MAX);
        assert_eq!(ColorSimilarity::new(-1.0).processed(), 0);
    }
}
