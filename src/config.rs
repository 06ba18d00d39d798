// ============================================================================
// SESSION CONFIG: "last used" dialog values and tool defaults
// ============================================================================
//
// One value owned by the caller (CLI run, test, embedding app) and passed to
// whatever needs it.  Overrides use the `key=value` line format of the
// settings file; nothing here is written to disk.

use std::fmt;
use std::str::FromStr;

use crate::color::ColorSimilarity;
use crate::components::history::HistoryManager;
use crate::document::Document;
use crate::ops::shapes::FillStyle;
use crate::selection::SelectionTransparency;

/// Spraycan diameters the tool offers.
pub const SPRAYCAN_SIZES: [i32; 3] = [9, 17, 29];

#[derive(Debug)]
pub enum ConfigError {
    /// Line without `=`.
    Malformed(String),
    UnknownKey(String),
    InvalidValue { key: String, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Malformed(line) => write!(f, "expected key=value, got '{}'", line),
            ConfigError::UnknownKey(key) => write!(f, "unknown setting '{}'", key),
            ConfigError::InvalidValue { key, value } => write!(f, "invalid value '{}' for '{}'", value, key),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Clone, Debug, PartialEq)]
pub struct SessionConfig {
    pub skew_last_horizontal_angle: f64,
    pub skew_last_vertical_angle: f64,
    pub rotate_last_angle: f64,
    pub resize_scale_last_keep_aspect: bool,
    pub resize_scale_last_smooth: bool,
    pub reduce_colors_last_depth: u8,
    pub reduce_colors_last_dither: bool,
    pub color_similarity: ColorSimilarity,
    pub pen_width: i32,
    pub brush_size: i32,
    pub spraycan_size: i32,
    pub fill_style: FillStyle,
    pub selection_transparent: bool,
    pub max_undo_steps: usize,
    /// `None` disables the memory cap.
    pub max_undo_memory_bytes: Option<usize>,
    /// Opened images with more colours than this are dithered when reduced.
    pub dither_on_open_if_colors_greater_than: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            skew_last_horizontal_angle: 0.0,
            skew_last_vertical_angle: 0.0,
            rotate_last_angle: 90.0,
            resize_scale_last_keep_aspect: false,
            resize_scale_last_smooth: true,
            reduce_colors_last_depth: 1,
            reduce_colors_last_dither: false,
            color_similarity: ColorSimilarity::EXACT,
            pen_width: 1,
            brush_size: 9,
            spraycan_size: 9,
            fill_style: FillStyle::NoFill,
            selection_transparent: false,
            max_undo_steps: 50,
            max_undo_memory_bytes: Some(100 * 1024 * 1024),
            dither_on_open_if_colors_greater_than: 323,
        }
    }
}

fn parse<T: FromStr>(key: &str, val: &str) -> Result<T, ConfigError> {
    val.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: val.to_string(),
    })
}

fn parse_bool(key: &str, val: &str) -> Result<bool, ConfigError> {
    match val {
        "true" | "1" | "on" => Ok(true),
        "false" | "0" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: val.to_string(),
        }),
    }
}

impl SessionConfig {
    /// Applies one `key=value` override.  On error the config is unchanged.
    pub fn apply_override(&mut self, line: &str) -> Result<(), ConfigError> {
        let Some((key, val)) = line.split_once('=') else {
            return Err(ConfigError::Malformed(line.to_string()));
        };
        let key = key.trim();
        let val = val.trim();
        let invalid = || ConfigError::InvalidValue {
            key: key.to_string(),
            value: val.to_string(),
        };
        match key {
            "skew_last_horizontal_angle" => self.skew_last_horizontal_angle = parse(key, val)?,
            "skew_last_vertical_angle" => self.skew_last_vertical_angle = parse(key, val)?,
            "rotate_last_angle" => self.rotate_last_angle = parse(key, val)?,
            "resize_scale_last_keep_aspect" => self.resize_scale_last_keep_aspect = parse_bool(key, val)?,
            "resize_scale_last_smooth" => self.resize_scale_last_smooth = parse_bool(key, val)?,
            "reduce_colors_last_depth" => {
                let depth: u8 = parse(key, val)?;
                if depth != 1 && depth != 8 {
                    return Err(invalid());
                }
                self.reduce_colors_last_depth = depth;
            }
            "reduce_colors_last_dither" => self.reduce_colors_last_dither = parse_bool(key, val)?,
            "color_similarity" => {
                let v: f64 = parse(key, val)?;
                if !(0.0..=ColorSimilarity::MAX).contains(&v) {
                    return Err(invalid());
                }
                self.color_similarity = ColorSimilarity::new(v);
            }
            "pen_width" => {
                let w: i32 = parse(key, val)?;
                if w < 1 {
                    return Err(invalid());
                }
                self.pen_width = w;
            }
            "brush_size" => {
                let s: i32 = parse(key, val)?;
                if s < 1 {
                    return Err(invalid());
                }
                self.brush_size = s;
            }
            "spraycan_size" => {
                let s: i32 = parse(key, val)?;
                if !SPRAYCAN_SIZES.contains(&s) {
                    return Err(invalid());
                }
                self.spraycan_size = s;
            }
            "fill_style" => self.fill_style = val.parse().map_err(|_| invalid())?,
            "selection_transparent" => self.selection_transparent = parse_bool(key, val)?,
            "max_undo_steps" => {
                let n: usize = parse(key, val)?;
                if n == 0 {
                    return Err(invalid());
                }
                self.max_undo_steps = n;
            }
            "max_undo_memory_bytes" => {
                self.max_undo_memory_bytes = match val {
                    "none" | "0" => None,
                    _ => Some(parse(key, val)?),
                };
            }
            "dither_on_open_if_colors_greater_than" => {
                self.dither_on_open_if_colors_greater_than = parse(key, val)?;
            }
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }
        log_debug!("Config override {}={}", key, val);
        Ok(())
    }

    /// Applies every non-empty, non-comment line of `content`.
    pub fn apply_lines(&mut self, content: &str) -> Result<(), ConfigError> {
        content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .try_for_each(|l| self.apply_override(l))
    }

    /// The config in the same `key=value` format `apply_lines` reads.
    pub fn to_config_lines(&self) -> Vec<String> {
        let fill = match self.fill_style {
            FillStyle::NoFill => "none",
            FillStyle::FillWithBackground => "background",
            FillStyle::FillWithForeground => "foreground",
        };
        let memory = self
            .max_undo_memory_bytes
            .map_or_else(|| "none".to_string(), |b| b.to_string());
        vec![
            format!("skew_last_horizontal_angle={}", self.skew_last_horizontal_angle),
            format!("skew_last_vertical_angle={}", self.skew_last_vertical_angle),
            format!("rotate_last_angle={}", self.rotate_last_angle),
            format!("resize_scale_last_keep_aspect={}", self.resize_scale_last_keep_aspect),
            format!("resize_scale_last_smooth={}", self.resize_scale_last_smooth),
            format!("reduce_colors_last_depth={}", self.reduce_colors_last_depth),
            format!("reduce_colors_last_dither={}", self.reduce_colors_last_dither),
            format!("color_similarity={}", self.color_similarity.value()),
            format!("pen_width={}", self.pen_width),
            format!("brush_size={}", self.brush_size),
            format!("spraycan_size={}", self.spraycan_size),
            format!("fill_style={}", fill),
            format!("selection_transparent={}", self.selection_transparent),
            format!("max_undo_steps={}", self.max_undo_steps),
            format!("max_undo_memory_bytes={}", memory),
            format!(
                "dither_on_open_if_colors_greater_than={}",
                self.dither_on_open_if_colors_greater_than
            ),
        ]
    }

    /// History sized by the undo limits.
    pub fn history(&self) -> HistoryManager {
        HistoryManager::with_limits(self.max_undo_steps, self.max_undo_memory_bytes)
    }

    /// Copies the tool tolerances into `doc`.  A transparent selection
    /// drops pixels matching the background colour.
    pub fn apply_to_document(&self, doc: &mut Document) {
        doc.colors.similarity = self.color_similarity;
        doc.colors.selection_transparency = if self.selection_transparent {
            SelectionTransparency::transparent(doc.colors.background, self.color_similarity)
        } else {
            SelectionTransparency::default()
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = SessionConfig::default();
        assert_eq!(c.dither_on_open_if_colors_greater_than, 323);
        assert_eq!(c.spraycan_size, 9);
        assert_eq!(c.max_undo_steps, 50);
    }

    #[test]
    fn overrides_parse_and_validate() {
        let mut c = SessionConfig::default();
        c.apply_override("rotate_last_angle = 45").unwrap();
        c.apply_override("fill_style=foreground").unwrap();
        c.apply_override("max_undo_memory_bytes=none").unwrap();
        assert_eq!(c.rotate_last_angle, 45.0);
        assert_eq!(c.fill_style, FillStyle::FillWithForeground);
        assert_eq!(c.max_undo_memory_bytes, None);

        assert!(matches!(c.apply_override("spraycan_size=10"), Err(ConfigError::InvalidValue { .. })));
        assert!(matches!(c.apply_override("nonsense=1"), Err(ConfigError::UnknownKey(_))));
        assert!(matches!(c.apply_override("pen_width"), Err(ConfigError::Malformed(_))));
        assert_eq!(c.spraycan_size, 9);
    }

    #[test]
    fn config_lines_read_back() {
        let mut c = SessionConfig::default();
        c.apply_lines("# tools\nspraycan_size=29\n\nselection_transparent=true\ncolor_similarity=0.05\n")
            .unwrap();
        let mut d = SessionConfig::default();
        d.apply_lines(&c.to_config_lines().join("\n")).unwrap();
        assert_eq!(c, d);
        assert_eq!(d.spraycan_size, 29);
    }

    #[test]
    fn transparent_selection_uses_background() {
        let mut doc = Document::new(2, 2, crate::color::Color::WHITE);
        let c = SessionConfig {
            selection_transparent: true,
            ..SessionConfig::default()
        };
        c.apply_to_document(&mut doc);
        assert!(!doc.colors.selection_transparency.opaque);
        assert_eq!(doc.colors.selection_transparency.transparent_color, doc.colors.background);
    }
}
