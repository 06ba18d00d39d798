// ============================================================================
// DOCUMENT I/O: load into a Document, save with loss analysis
// ============================================================================
//
// Decoding and encoding go through the `image` crate.  Saving never fails
// because of quality loss: what would be lost comes back as warnings in the
// `SaveReport`.

use std::fmt;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use image::codecs::bmp::BmpEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::tga::TgaEncoder;
use image::{ColorType, DynamicImage, ImageEncoder, ImageError, ImageOutputFormat, RgbaImage};

use crate::document::{Document, SaveOptions};
use crate::ops::effects::{self, LossTarget, LossWarning};
use crate::pixmap::Pixmap;

#[derive(Debug)]
pub enum DocumentError {
    Io(std::io::Error),
    Codec(ImageError),
    UnsupportedFormat(String),
    InvalidOptions(String),
}

impl fmt::Display for DocumentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentError::Io(e) => write!(f, "I/O error: {}", e),
            DocumentError::Codec(e) => write!(f, "Codec error: {}", e),
            DocumentError::UnsupportedFormat(e) => write!(f, "Unsupported format: {}", e),
            DocumentError::InvalidOptions(e) => write!(f, "Invalid save options: {}", e),
        }
    }
}

impl std::error::Error for DocumentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DocumentError::Io(e) => Some(e),
            DocumentError::Codec(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for DocumentError {
    fn from(e: std::io::Error) -> Self {
        DocumentError::Io(e)
    }
}

impl From<ImageError> for DocumentError {
    fn from(e: ImageError) -> Self {
        match e {
            ImageError::IoError(io) => DocumentError::Io(io),
            other => DocumentError::Codec(other),
        }
    }
}

/// File formats a document can be saved as.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FileFormat {
    Png,
    Jpeg,
    Webp,
    Bmp,
    Tga,
    Ico,
    Tiff,
}

impl FileFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "png" => Some(FileFormat::Png),
            "jpg" | "jpeg" => Some(FileFormat::Jpeg),
            "webp" => Some(FileFormat::Webp),
            "bmp" => Some(FileFormat::Bmp),
            "tga" => Some(FileFormat::Tga),
            "ico" => Some(FileFormat::Ico),
            "tif" | "tiff" => Some(FileFormat::Tiff),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension().and_then(|e| e.to_str()).and_then(Self::from_extension)
    }

    pub fn extension(&self) -> &'static str {
        match self {
            FileFormat::Png => "png",
            FileFormat::Jpeg => "jpg",
            FileFormat::Webp => "webp",
            FileFormat::Bmp => "bmp",
            FileFormat::Tga => "tga",
            FileFormat::Ico => "ico",
            FileFormat::Tiff => "tiff",
        }
    }

    pub fn supports_alpha(&self) -> bool {
        !matches!(self, FileFormat::Jpeg)
    }

    pub fn max_depth(&self) -> u8 {
        if self.supports_alpha() { 32 } else { 24 }
    }

    pub fn is_lossy(&self) -> bool {
        matches!(self, FileFormat::Jpeg)
    }
}

/// Outcome of a successful save.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SaveReport {
    pub path: PathBuf,
    pub warnings: Vec<LossWarning>,
}

/// Depth the decoder delivered: 8 grey, 24 colour, 32 with alpha.
fn decoded_depth(color: ColorType) -> u8 {
    match color {
        ColorType::L8 | ColorType::L16 => 8,
        ColorType::Rgb8 | ColorType::Rgb16 | ColorType::Rgb32F => 24,
        _ => 32,
    }
}

/// Loads `path` into a new, unmodified document.
pub fn load_document(path: &Path) -> Result<Document, DocumentError> {
    let img = image::open(path)?;
    let depth = decoded_depth(img.color());
    let pixmap = Pixmap::from_rgba(&img.to_rgba8());
    let mut doc = Document::from_pixmap(pixmap);
    doc.save_options.color_depth = Some(depth);
    doc.path = Some(path.to_path_buf());
    log_info!(
        "Loaded {} ({}x{}, {}-bit)",
        path.display(),
        doc.width(),
        doc.height(),
        depth
    );
    Ok(doc)
}

/// True when reducing `pm` should dither: it has more than `threshold`
/// distinct colours.
pub fn should_dither(pm: &Pixmap, threshold: usize) -> bool {
    effects::num_colors_up_to(pm, threshold.saturating_add(1)) > threshold
}

/// The pixels `save_document` would write, after any depth reduction.
pub fn pixmap_for_save(doc: &Document, options: &SaveOptions) -> Result<Pixmap, DocumentError> {
    let flat = doc.flattened();
    match options.color_depth {
        None | Some(24) | Some(32) => Ok(flat),
        Some(depth @ (1 | 8)) => Ok(effects::reduce_colors(&flat, depth, options.dither)),
        Some(other) => Err(DocumentError::InvalidOptions(format!("colour depth {}", other))),
    }
}

/// Encodes the document (selection included) to `path`.  The format comes
/// from the extension.
pub fn save_document(doc: &Document, path: &Path, options: &SaveOptions) -> Result<SaveReport, DocumentError> {
    let format = FileFormat::from_path(path)
        .ok_or_else(|| DocumentError::UnsupportedFormat(path.display().to_string()))?;
    let pixmap = pixmap_for_save(doc, options)?;

    let color_depth = options.color_depth.unwrap_or(32).min(format.max_depth());
    let target = LossTarget {
        format_max_depth: format.max_depth(),
        color_depth,
        supports_alpha: format.supports_alpha() && color_depth == 32,
        lossy_compression: format.is_lossy(),
    };
    let warnings = effects::analyze_loss(&doc.flattened(), &target);
    for w in &warnings {
        log_warn!("Saving {}: {}", path.display(), w);
    }

    let rgba = pixmap.to_rgba();
    encode_and_write(&rgba, path, format, options.quality.clamp(1, 100), target.supports_alpha)?;
    log_info!("Saved {} ({:?}, {}-bit)", path.display(), format, color_depth);

    Ok(SaveReport {
        path: path.to_path_buf(),
        warnings,
    })
}

fn encode_and_write(
    image: &RgbaImage,
    path: &Path,
    format: FileFormat,
    quality: u8,
    keep_alpha: bool,
) -> Result<(), ImageError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    let (w, h) = image.dimensions();
    let rgb;
    let (bytes, color) = if keep_alpha {
        (image.as_raw(), ColorType::Rgba8)
    } else {
        rgb = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
        (rgb.as_raw(), ColorType::Rgb8)
    };

    match format {
        FileFormat::Png => PngEncoder::new(&mut writer).write_image(bytes, w, h, color)?,
        FileFormat::Jpeg => JpegEncoder::new_with_quality(&mut writer, quality).encode(bytes, w, h, color)?,
        FileFormat::Bmp => BmpEncoder::new(&mut writer).encode(bytes, w, h, color)?,
        FileFormat::Tga => TgaEncoder::new(&mut writer).encode(bytes, w, h, color)?,
        FileFormat::Webp => {
            drop(writer);
            DynamicImage::ImageRgba8(image.clone()).save(path)?;
        }
        FileFormat::Ico => {
            // ICO entries are limited to 256x256
            let dyn_img = if w > 256 || h > 256 {
                let scale = 256.0 / w.max(h) as f32;
                let nw = ((w as f32 * scale) as u32).max(1);
                let nh = ((h as f32 * scale) as u32).max(1);
                DynamicImage::ImageRgba8(image::imageops::resize(
                    image,
                    nw,
                    nh,
                    image::imageops::FilterType::Lanczos3,
                ))
            } else {
                DynamicImage::ImageRgba8(image.clone())
            };
            dyn_img.write_to(&mut writer, ImageOutputFormat::Ico)?;
        }
        FileFormat::Tiff => {
            let dyn_img = if keep_alpha {
                DynamicImage::ImageRgba8(image.clone())
            } else {
                DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(image.clone()).to_rgb8())
            };
            dyn_img.write_to(&mut writer, ImageOutputFormat::Tiff)?;
        }
    }
    Ok(())
}
