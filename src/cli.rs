// ============================================================================
// PaintFX CLI: headless batch processing via command-line arguments
// ============================================================================
//
// Usage examples:
//   PaintFX -i photo.png --rotate 90 -o rotated.png
//   PaintFX -i scan.png --autocrop --reduce 1 --dither -o mono.png
//   PaintFX -i "shots/*.jpg" --scale 640x480 --smooth --output-dir small/
//   PaintFX -i a.png --skew 30,0 --background transparent --verify-undo -o b.png
//
// Every operation runs as an undoable command through a HistoryManager, in
// the fixed order autocrop, resize, scale, rotate, skew, flip, grayscale,
// blur/sharpen, reduce.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;

use crate::color::Color;
use crate::commands::{
    AutoCropCommand, EffectCommand, EffectKind, FlipCommand, ResizeScaleCommand, ResizeScaleMode, RotateCommand,
    SkewCommand,
};
use crate::components::history::{Command, HistoryManager};
use crate::config::SessionConfig;
use crate::document::{Document, SaveOptions};
use crate::io::{self, FileFormat};
use crate::logger;

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// PaintFX headless image processor.
#[derive(Parser, Debug)]
#[command(
    name = "PaintFX",
    about = "PaintFX headless batch image processor",
    long_about = "Apply transforms and colour effects to image files without a GUI.\n\
                  Every operation is recorded as an undoable command; --verify-undo\n\
                  checks that undoing them all restores the input exactly.\n\n\
                  Example:\n  \
                  PaintFX -i photo.png --rotate 90 -o rotated.png\n  \
                  PaintFX -i \"*.png\" --reduce 1 --dither --output-dir mono/"
)]
pub struct CliArgs {
    /// Input file(s). Glob patterns accepted (e.g. "*.png", "shots/*.jpg").
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<String>,

    /// Output file path. Only valid for single-file input.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output directory for batch processing.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Output format extension (png, jpg, webp, bmp, tga, ico, tiff).
    /// Inferred from --output when omitted, defaulting to png.
    #[arg(short, long, value_name = "FORMAT")]
    pub format: Option<String>,

    /// JPEG quality (1-100).
    #[arg(short, long, default_value_t = 90, value_name = "1-100")]
    pub quality: u8,

    /// Rotate clockwise by DEG degrees.
    #[arg(long, value_name = "DEG", allow_hyphen_values = true)]
    pub rotate: Option<f64>,

    /// Skew by H,V degrees (each strictly between -90 and 90).
    #[arg(long, value_name = "H,V", value_parser = parse_angles, allow_hyphen_values = true)]
    pub skew: Option<(f64, f64)>,

    /// Flip: h, v or hv.
    #[arg(long, value_name = "h|v|hv", value_parser = parse_flip)]
    pub flip: Option<(bool, bool)>,

    /// Scale the image to WxH.
    #[arg(long, value_name = "WxH", value_parser = parse_size)]
    pub scale: Option<(i32, i32)>,

    /// Use smooth (filtered) scaling with --scale.
    #[arg(long)]
    pub smooth: bool,

    /// Resize the canvas to WxH, filling new area with --background.
    #[arg(long, value_name = "WxH", value_parser = parse_size)]
    pub resize: Option<(i32, i32)>,

    /// Reduce to grayscale.
    #[arg(long)]
    pub grayscale: bool,

    /// Reduce to 1 (monochrome) or 8 (256 colour) bits.
    #[arg(long, value_name = "1|8", value_parser = clap::builder::PossibleValuesParser::new(["1", "8"]))]
    pub reduce: Option<String>,

    /// Dither when reducing colours.
    #[arg(long)]
    pub dither: bool,

    /// Blur strength (1-10).
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(i32).range(1..=10))]
    pub blur: Option<i32>,

    /// Sharpen strength (1-10).
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(i32).range(1..=10))]
    pub sharpen: Option<i32>,

    /// Remove uniform borders.
    #[arg(long)]
    pub autocrop: bool,

    /// Colour for areas uncovered by transforms (name, #rrggbb, #rrggbbaa or "transparent").
    #[arg(long, default_value = "white", value_name = "COLOR")]
    pub background: Color,

    /// Session setting override, key=value. Repeatable.
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub set: Vec<String>,

    /// Undo every operation afterwards and check the input is restored exactly.
    #[arg(long)]
    pub verify_undo: bool,

    /// Print per-file timing and the recorded history.
    #[arg(short, long)]
    pub verbose: bool,

    /// Session log location (defaults to the platform data directory).
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

fn parse_size(s: &str) -> Result<(i32, i32), String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WxH, got '{}'", s))?;
    let w: i32 = w.trim().parse().map_err(|_| format!("bad width '{}'", w))?;
    let h: i32 = h.trim().parse().map_err(|_| format!("bad height '{}'", h))?;
    if w < 1 || h < 1 {
        return Err(format!("size must be at least 1x1, got {}x{}", w, h));
    }
    Ok((w, h))
}

fn parse_angles(s: &str) -> Result<(f64, f64), String> {
    let (h, v) = s.split_once(',').ok_or_else(|| format!("expected H,V, got '{}'", s))?;
    let h: f64 = h.trim().parse().map_err(|_| format!("bad angle '{}'", h))?;
    let v: f64 = v.trim().parse().map_err(|_| format!("bad angle '{}'", v))?;
    if h.abs() >= 90.0 || v.abs() >= 90.0 {
        return Err(format!("skew angles must be within (-90, 90), got {},{}", h, v));
    }
    Ok((h, v))
}

fn parse_flip(s: &str) -> Result<(bool, bool), String> {
    match s.to_lowercase().as_str() {
        "h" => Ok((true, false)),
        "v" => Ok((false, true)),
        "hv" | "vh" => Ok((true, true)),
        _ => Err(format!("expected h, v or hv, got '{}'", s)),
    }
}

// ============================================================================
// Operations
// ============================================================================

/// One requested operation, turned into a command against the document as
/// it is when the operation's turn comes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Op {
    AutoCrop,
    Resize(i32, i32),
    Scale { width: i32, height: i32, smooth: bool },
    Rotate(f64),
    Skew(f64, f64),
    Flip { horizontal: bool, vertical: bool },
    Effect(EffectKind),
}

impl Op {
    fn command(&self, doc: &Document, background: Color, config: &SessionConfig) -> Option<Box<dyn Command>> {
        let cmd: Box<dyn Command> = match *self {
            Op::AutoCrop => {
                let processed = config.color_similarity.processed();
                Box::new(AutoCropCommand::new(doc, processed, false)?)
            }
            Op::Resize(w, h) => Box::new(ResizeScaleCommand::new(doc, ResizeScaleMode::Resize, w, h, background)),
            Op::Scale { width, height, smooth } => {
                let mode = if smooth { ResizeScaleMode::SmoothScale } else { ResizeScaleMode::Scale };
                Box::new(ResizeScaleCommand::new(doc, mode, width, height, background))
            }
            Op::Rotate(angle) => Box::new(RotateCommand::new(doc, angle, background)),
            Op::Skew(h, v) => Box::new(SkewCommand::new(doc, h, v, background)),
            Op::Flip { horizontal, vertical } => Box::new(FlipCommand::new(doc, horizontal, vertical)),
            Op::Effect(kind) if kind.is_noop() => return None,
            Op::Effect(kind) => Box::new(EffectCommand::new(kind, doc)),
        };
        Some(cmd)
    }

    /// Writes the operation's parameters back as "last used" values.
    fn remember(&self, config: &mut SessionConfig) {
        match *self {
            Op::Rotate(angle) => config.rotate_last_angle = angle,
            Op::Skew(h, v) => {
                config.skew_last_horizontal_angle = h;
                config.skew_last_vertical_angle = v;
            }
            Op::Scale { smooth, .. } => config.resize_scale_last_smooth = smooth,
            Op::Effect(EffectKind::ReduceColors { depth, dither }) => {
                config.reduce_colors_last_depth = depth;
                config.reduce_colors_last_dither = dither;
            }
            _ => {}
        }
    }
}

/// The operations `args` asks for, in application order.  `dither` is
/// decided per document, so reduce is built by `run_one`.
pub fn planned_ops(args: &CliArgs) -> Vec<Op> {
    let mut ops = Vec::new();
    if args.autocrop {
        ops.push(Op::AutoCrop);
    }
    if let Some((w, h)) = args.resize {
        ops.push(Op::Resize(w, h));
    }
    if let Some((width, height)) = args.scale {
        ops.push(Op::Scale {
            width,
            height,
            smooth: args.smooth,
        });
    }
    if let Some(angle) = args.rotate {
        ops.push(Op::Rotate(angle));
    }
    if let Some((h, v)) = args.skew {
        ops.push(Op::Skew(h, v));
    }
    if let Some((horizontal, vertical)) = args.flip {
        ops.push(Op::Flip { horizontal, vertical });
    }
    if args.grayscale {
        ops.push(Op::Effect(EffectKind::Grayscale));
    }
    if let Some(n) = args.blur {
        ops.push(Op::Effect(EffectKind::BlurSharpen(-n)));
    }
    if let Some(n) = args.sharpen {
        ops.push(Op::Effect(EffectKind::BlurSharpen(n)));
    }
    ops
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run all CLI processing and return an OS exit code.
/// `0` = all files succeeded, `1` = one or more files failed.
pub fn run(args: CliArgs) -> ExitCode {
    match &args.log_file {
        Some(path) => logger::init_at(path),
        None => logger::init(),
    }
    if args.verbose {
        logger::set_max_level(logger::Level::Debug);
    }

    let mut config = SessionConfig::default();
    for line in &args.set {
        if let Err(e) = config.apply_override(line) {
            eprintln!("error: --set {}: {}", line, e);
            return ExitCode::FAILURE;
        }
    }

    let inputs = resolve_inputs(&args.input);
    if inputs.is_empty() {
        eprintln!("error: no input files matched the given pattern(s).");
        return ExitCode::FAILURE;
    }

    if inputs.len() > 1 && args.output.is_some() && args.output_dir.is_none() {
        eprintln!(
            "error: {} input files given but --output only accepts a single file path.\n\
             Use --output-dir to specify a destination directory for batch processing.",
            inputs.len()
        );
        return ExitCode::FAILURE;
    }

    let format = match parse_format(args.format.as_deref(), args.output.as_deref()) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Some(dir) = &args.output_dir
        && let Err(e) = std::fs::create_dir_all(dir)
    {
        eprintln!("error: could not create output directory '{}': {}", dir.display(), e);
        return ExitCode::FAILURE;
    }

    let ops = planned_ops(&args);
    let total = inputs.len();
    let multi = total > 1;
    let mut any_failure = false;

    for (idx, input_path) in inputs.iter().enumerate() {
        if multi || args.verbose {
            println!("[{}/{}] {}", idx + 1, total, input_path.display());
        }
        let file_start = Instant::now();

        let Some(output_path) =
            build_output_path(input_path, args.output.as_deref(), args.output_dir.as_deref(), format)
        else {
            eprintln!("  error: cannot determine output path for '{}'.", input_path.display());
            any_failure = true;
            continue;
        };

        match run_one(input_path, &output_path, &args, &ops, &mut config) {
            Ok(report) => {
                for w in &report.warnings {
                    println!("  warning: {}", w);
                }
                if args.verbose || multi {
                    println!(
                        "  -> {} ({:.0}ms)",
                        output_path.display(),
                        file_start.elapsed().as_secs_f64() * 1000.0
                    );
                }
                log_info!("CLI: {} -> {}", input_path.display(), output_path.display());
            }
            Err(e) => {
                eprintln!("  error: {}", e);
                log_err!("CLI: {} failed: {}", input_path.display(), e);
                any_failure = true;
            }
        }
    }

    if any_failure { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}

// ============================================================================
// Per-file processing pipeline
// ============================================================================

fn run_one(
    input: &Path,
    output: &Path,
    args: &CliArgs,
    ops: &[Op],
    config: &mut SessionConfig,
) -> Result<io::SaveReport, String> {
    // -- Step 1: Load ----------------------------------------------------
    let mut doc = io::load_document(input).map_err(|e| format!("load failed: {}", e))?;
    doc.colors.background = args.background;
    config.apply_to_document(&mut doc);

    let mut ops = ops.to_vec();
    if let Some(depth) = args.reduce.as_deref().and_then(|d| d.parse::<u8>().ok()) {
        let dither = args.dither
            || (depth == 8 && io::should_dither(doc.pixmap(), config.dither_on_open_if_colors_greater_than));
        ops.push(Op::Effect(EffectKind::ReduceColors { depth, dither }));
    }

    // -- Step 2: Apply operations as commands ----------------------------
    let mut history = if args.verify_undo {
        HistoryManager::with_limits(ops.len().max(1), None)
    } else {
        config.history()
    };
    let original = args.verify_undo.then(|| doc.pixmap().clone());

    for op in &ops {
        match op.command(&doc, args.background, config) {
            Some(cmd) => {
                history.push(cmd, &mut doc);
                op.remember(config);
            }
            None => log_info!("CLI: {:?} has nothing to do on {}", op, input.display()),
        }
    }

    if args.verbose {
        for name in history.undo_history() {
            println!("  [history] {}", name);
        }
    }

    // -- Step 3: Verify undo (optional) ----------------------------------
    if let Some(original) = original {
        verify_undo(&mut history, &mut doc, &original)?;
    }

    // -- Step 4: Save ----------------------------------------------------
    let options = SaveOptions {
        color_depth: None,
        dither: false,
        quality: args.quality,
    };
    io::save_document(&doc, output, &options).map_err(|e| format!("save failed: {}", e))
}

/// Undoes everything, checks the pixels match `original`, then redoes.
fn verify_undo(history: &mut HistoryManager, doc: &mut Document, original: &crate::pixmap::Pixmap) -> Result<(), String> {
    let done = doc.pixmap().clone();
    let steps = history.undo_count();
    history.undo_to(steps, doc);
    if !doc.pixmap().same_pixels(original) {
        return Err(format!("undo check failed: {} step(s) did not restore the input", steps));
    }
    history.redo_to(steps, doc);
    if !doc.pixmap().same_pixels(&done) {
        return Err("undo check failed: redo did not reproduce the result".to_string());
    }
    log_info!("CLI: undo check passed ({} steps)", steps);
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

/// Expand glob patterns and literal paths into a deduplicated, ordered list.
fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let as_path = Path::new(pattern);
        if as_path.exists() {
            if !result.iter().any(|p| p.as_path() == as_path) {
                result.push(as_path.to_path_buf());
            }
            continue;
        }

        match glob::glob(pattern) {
            Ok(entries) => {
                let mut matched = false;
                for entry in entries.flatten() {
                    if !result.contains(&entry) {
                        result.push(entry);
                    }
                    matched = true;
                }
                if !matched {
                    eprintln!("warning: pattern '{}' matched no files.", pattern);
                }
            }
            Err(e) => {
                eprintln!("warning: invalid glob '{}': {}", pattern, e);
            }
        }
    }

    result
}

/// `--format` wins, then the `--output` extension, then PNG.
fn parse_format(format_arg: Option<&str>, output: Option<&Path>) -> Result<FileFormat, String> {
    if let Some(f) = format_arg {
        return FileFormat::from_extension(f).ok_or_else(|| format!("unknown format '{}'", f));
    }
    if let Some(out) = output {
        return FileFormat::from_path(out).ok_or_else(|| format!("cannot infer format from '{}'", out.display()));
    }
    Ok(FileFormat::Png)
}

/// Compute the output path for a single input file.
///
/// Priority:
/// 1. `--output`
/// 2. `--output-dir` with the input's stem
/// 3. next to the input, `_out` appended to the stem if it would collide
fn build_output_path(input: &Path, output: Option<&Path>, output_dir: Option<&Path>, format: FileFormat) -> Option<PathBuf> {
    if let Some(out) = output {
        return Some(out.to_path_buf());
    }

    let ext = format.extension();
    let stem = input.file_stem()?.to_string_lossy().into_owned();

    if let Some(dir) = output_dir {
        return Some(dir.join(format!("{}.{}", stem, ext)));
    }

    let parent = input.parent().unwrap_or(Path::new("."));
    let candidate = parent.join(format!("{}.{}", stem, ext));
    if candidate == input {
        Some(parent.join(format!("{}_out.{}", stem, ext)))
    } else {
        Some(candidate)
    }
}
