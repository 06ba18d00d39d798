// ============================================================================
// TRANSFORM COMMANDS: resize/scale, skew, rotate, flip, autocrop
// ============================================================================

use ab_glyph::FontArc;

use crate::color::Color;
use crate::components::history::{Command, CommandState};
use crate::dimensions;
use crate::document::Document;
use crate::geometry::{Point, Rect};
use crate::ops::autocrop::{self, CropBorders};
use crate::ops::transform;
use crate::pixmap::Pixmap;
use crate::selection::Selection;

use super::selection_prefixed;

/// What the transform acts upon, decided when the command is created.
#[derive(Clone, Debug)]
enum Target {
    Document { old: Option<Pixmap> },
    Selection { old: Option<Selection> },
}

impl Target {
    fn for_doc(doc: &Document) -> Self {
        if doc.has_pulled_selection() {
            Target::Selection { old: None }
        } else {
            Target::Document { old: None }
        }
    }

    fn is_selection(&self) -> bool {
        matches!(self, Target::Selection { .. })
    }

    fn size(&self) -> i32 {
        match self {
            Target::Document { old } => old.as_ref().map_or(0, Pixmap::byte_size),
            Target::Selection { old } => old.as_ref().map_or(0, Selection::size),
        }
    }

    /// Replaces the document pixmap with `f(current)`, saving the old one.
    fn apply_document(&mut self, doc: &mut Document, f: impl FnOnce(&Pixmap) -> Pixmap) {
        let new = f(doc.pixmap());
        let old = doc.replace_pixmap(new);
        if let Target::Document { old: slot } = self {
            *slot = Some(old);
        }
    }

    /// Replaces the pulled selection with a floating one holding
    /// `f(pixels)`, centred where the old one was.
    fn apply_selection(&mut self, doc: &mut Document, name: &str, f: impl FnOnce(&Pixmap) -> Pixmap) {
        let Some(sel) = doc.take_selection() else {
            log_err!("{}: selection vanished", name);
            return;
        };
        let Some(pixels) = sel.opaque_pixmap() else {
            log_err!("{}: selection was not pulled", name);
            doc.set_selection(sel);
            return;
        };
        let new = f(&pixels);
        let center = sel.rect().center();
        let top_left = Point::new(center.x - new.width() / 2, center.y - new.height() / 2);
        doc.set_selection(Selection::floating(top_left, new, sel.transparency()));
        if let Target::Selection { old } = self {
            *old = Some(sel);
        }
    }

    /// Puts back whatever `apply_*` saved.  Returns false when nothing was.
    fn restore(&mut self, doc: &mut Document) -> bool {
        match self {
            Target::Document { old } => match old.take() {
                Some(pm) => {
                    doc.set_pixmap(pm);
                    true
                }
                None => false,
            },
            Target::Selection { old } => match old.take() {
                Some(sel) => {
                    doc.set_selection(sel);
                    true
                }
                None => false,
            },
        }
    }
}

// ---------------------------------------------------------------------------
//  Resize / scale
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResizeScaleMode {
    /// Changes the canvas; content keeps its size.
    Resize,
    Scale,
    SmoothScale,
}

impl ResizeScaleMode {
    pub fn label(&self) -> &'static str {
        match self {
            ResizeScaleMode::Resize => "Resize",
            ResizeScaleMode::Scale => "Scale",
            ResizeScaleMode::SmoothScale => "Smooth Scale",
        }
    }
}

pub struct ResizeScaleCommand {
    mode: ResizeScaleMode,
    new_width: i32,
    new_height: i32,
    background: Color,
    font: Option<FontArc>,
    target: Target,
    /// Old document size when the canvas grew and nothing was saved.
    old_size: Option<(i32, i32)>,
    state: CommandState,
}

impl ResizeScaleCommand {
    pub fn new(doc: &Document, mode: ResizeScaleMode, new_width: i32, new_height: i32, background: Color) -> Self {
        Self {
            mode,
            new_width: new_width.max(1),
            new_height: new_height.max(1),
            background,
            font: None,
            target: Target::for_doc(doc),
            old_size: None,
            state: CommandState::Created,
        }
    }

    /// Font used to re-render a text selection.
    pub fn with_font(mut self, font: Option<FontArc>) -> Self {
        self.font = font;
        self
    }

    pub fn mode(&self) -> ResizeScaleMode {
        self.mode
    }

    fn execute_on_selection(&mut self, doc: &mut Document) {
        let Some(sel) = doc.take_selection() else {
            log_err!("{}: selection vanished", self.name());
            return;
        };
        let (w, h) = (self.new_width, self.new_height);
        let resized = match self.mode {
            ResizeScaleMode::Resize if !sel.is_text() => {
                let mut s = sel.clone();
                if let Some(mut pm) = sel.opaque_pixmap() {
                    pm.resize(w, h, self.background);
                    s.set_pixmap(Some(pm));
                }
                s
            }
            mode => sel.resized_scaled(w, h, mode == ResizeScaleMode::SmoothScale, self.font.as_ref()),
        };
        doc.set_selection(resized);
        self.target = Target::Selection { old: Some(sel) };
    }

    fn execute_on_document(&mut self, doc: &mut Document) {
        let (w, h) = (self.new_width, self.new_height);
        match self.mode {
            ResizeScaleMode::Resize => {
                let pm = doc.pixmap();
                let grows_only = w >= pm.width() && h >= pm.height();
                if grows_only && !pm.is_indexed() && !pm.has_mask() {
                    self.old_size = Some((pm.width(), pm.height()));
                    let bg = self.background;
                    doc.pixmap_mut().resize(w, h, bg);
                } else {
                    let bg = self.background;
                    self.target.apply_document(doc, |pm| {
                        let mut out = pm.clone();
                        out.resize(w, h, bg);
                        out
                    });
                }
            }
            ResizeScaleMode::Scale | ResizeScaleMode::SmoothScale => {
                let smooth = self.mode == ResizeScaleMode::SmoothScale;
                self.target.apply_document(doc, |pm| pm.scaled(w, h, smooth));
            }
        }
    }
}

impl Command for ResizeScaleCommand {
    fn execute(&mut self, doc: &mut Document) {
        if !self.state.try_apply(&self.name()) {
            return;
        }
        log_debug!("{} to {}x{}", self.name(), self.new_width, self.new_height);
        if self.target.is_selection() {
            self.execute_on_selection(doc);
        } else {
            self.execute_on_document(doc);
        }
    }

    fn unexecute(&mut self, doc: &mut Document) {
        if !self.state.try_revert(&self.name()) {
            return;
        }
        if let Some((w, h)) = self.old_size.take() {
            doc.pixmap_mut().resize(w, h, Color::Invalid);
            return;
        }
        self.target.restore(doc);
    }

    fn name(&self) -> String {
        selection_prefixed(self.target.is_selection(), self.mode.label())
    }

    fn size(&self) -> i32 {
        self.target.size()
    }

    fn state(&self) -> CommandState {
        self.state
    }
}

// ---------------------------------------------------------------------------
//  Skew
// ---------------------------------------------------------------------------

pub struct SkewCommand {
    horizontal_angle: f64,
    vertical_angle: f64,
    background: Color,
    target: Target,
    state: CommandState,
}

impl SkewCommand {
    pub fn new(doc: &Document, horizontal_angle: f64, vertical_angle: f64, background: Color) -> Self {
        Self {
            horizontal_angle,
            vertical_angle,
            background,
            target: Target::for_doc(doc),
            state: CommandState::Created,
        }
    }
}

impl Command for SkewCommand {
    fn execute(&mut self, doc: &mut Document) {
        if !self.state.try_apply(&self.name()) {
            return;
        }
        let (h, v, bg) = (self.horizontal_angle, self.vertical_angle, self.background);
        let skew = |pm: &Pixmap| transform::skew(pm, h, v, bg, 0, 0);
        if self.target.is_selection() {
            let name = self.name();
            self.target.apply_selection(doc, &name, skew);
        } else {
            self.target.apply_document(doc, skew);
        }
    }

    fn unexecute(&mut self, doc: &mut Document) {
        if self.state.try_revert(&self.name()) {
            self.target.restore(doc);
        }
    }

    fn name(&self) -> String {
        selection_prefixed(self.target.is_selection(), "Skew")
    }

    fn size(&self) -> i32 {
        self.target.size()
    }

    fn state(&self) -> CommandState {
        self.state
    }
}

// ---------------------------------------------------------------------------
//  Rotate
// ---------------------------------------------------------------------------

pub struct RotateCommand {
    angle: f64,
    background: Color,
    target: Target,
    /// Right-angle rotations of direct documents undo by rotating back.
    reversible: bool,
    state: CommandState,
}

impl RotateCommand {
    pub fn new(doc: &Document, angle: f64, background: Color) -> Self {
        let target = Target::for_doc(doc);
        let reversible =
            !target.is_selection() && transform::is_lossless_rotation(angle) && !doc.pixmap().is_indexed();
        Self {
            angle,
            background,
            target,
            reversible,
            state: CommandState::Created,
        }
    }

    pub fn angle(&self) -> f64 {
        self.angle
    }
}

impl Command for RotateCommand {
    fn execute(&mut self, doc: &mut Document) {
        if !self.state.try_apply(&self.name()) {
            return;
        }
        let (angle, bg) = (self.angle, self.background);
        let rotate = |pm: &Pixmap| transform::rotate(pm, angle, bg, 0, 0);
        if self.target.is_selection() {
            let name = self.name();
            self.target.apply_selection(doc, &name, rotate);
        } else if self.reversible {
            let rotated = rotate(doc.pixmap());
            doc.set_pixmap(rotated);
        } else {
            self.target.apply_document(doc, rotate);
        }
    }

    fn unexecute(&mut self, doc: &mut Document) {
        if !self.state.try_revert(&self.name()) {
            return;
        }
        if self.reversible {
            let back = transform::rotate(doc.pixmap(), -self.angle, self.background, 0, 0);
            doc.set_pixmap(back);
        } else {
            self.target.restore(doc);
        }
    }

    fn name(&self) -> String {
        let base = if (self.angle - 90.0).abs() < transform::angle_epsilon() {
            "Rotate Right".to_string()
        } else if (self.angle + 90.0).abs() < transform::angle_epsilon() {
            "Rotate Left".to_string()
        } else {
            "Rotate".to_string()
        };
        selection_prefixed(self.target.is_selection(), &base)
    }

    fn size(&self) -> i32 {
        self.target.size()
    }

    fn state(&self) -> CommandState {
        self.state
    }
}

// ---------------------------------------------------------------------------
//  Flip
// ---------------------------------------------------------------------------

pub struct FlipCommand {
    horizontal: bool,
    vertical: bool,
    target: Target,
    state: CommandState,
}

impl FlipCommand {
    pub fn new(doc: &Document, horizontal: bool, vertical: bool) -> Self {
        Self {
            horizontal,
            vertical,
            target: Target::for_doc(doc),
            state: CommandState::Created,
        }
    }

    fn flip_document(&self, doc: &mut Document) {
        let flipped = transform::flip(doc.pixmap(), self.horizontal, self.vertical);
        doc.set_pixmap(flipped);
    }
}

impl Command for FlipCommand {
    fn execute(&mut self, doc: &mut Document) {
        if !self.state.try_apply(&self.name()) {
            return;
        }
        if self.target.is_selection() {
            let (h, v) = (self.horizontal, self.vertical);
            let name = self.name();
            self.target.apply_selection(doc, &name, |pm| transform::flip(pm, h, v));
        } else {
            self.flip_document(doc);
        }
    }

    fn unexecute(&mut self, doc: &mut Document) {
        if !self.state.try_revert(&self.name()) {
            return;
        }
        if self.target.is_selection() {
            self.target.restore(doc);
        } else {
            self.flip_document(doc);
        }
    }

    fn name(&self) -> String {
        let base = match (self.horizontal, self.vertical) {
            (true, false) => "Flip Horizontally",
            (false, true) => "Flip Vertically",
            _ => "Flip",
        };
        selection_prefixed(self.target.is_selection(), base)
    }

    fn size(&self) -> i32 {
        self.target.size()
    }

    fn state(&self) -> CommandState {
        self.state
    }
}

// ---------------------------------------------------------------------------
//  Autocrop
// ---------------------------------------------------------------------------

/// Removes the uniform borders found at creation.  Undo rebuilds the
/// original image from the content and the saved border strips.
pub struct AutoCropCommand {
    borders: CropBorders,
    content: Rect,
    old_width: i32,
    old_height: i32,
    had_mask: bool,
    strips: Vec<(Rect, Pixmap)>,
    target: Target,
    state: CommandState,
}

impl AutoCropCommand {
    /// `None` when there is no border to remove.
    pub fn new(doc: &Document, processed_similarity: i32, transparent_only: bool) -> Option<Self> {
        let target = Target::for_doc(doc);
        let source = match &target {
            Target::Selection { .. } => doc.selection().and_then(Selection::opaque_pixmap)?,
            Target::Document { .. } => doc.pixmap().clone(),
        };
        let Some(borders) = autocrop::find_borders(&source, processed_similarity, transparent_only) else {
            log_info!("Autocrop: no border to remove");
            return None;
        };
        let content = autocrop::content_rect(&source, &borders);
        if content.is_empty() {
            return None;
        }
        Some(Self {
            borders,
            content,
            old_width: source.width(),
            old_height: source.height(),
            had_mask: source.has_mask(),
            strips: Vec::new(),
            target,
            state: CommandState::Created,
        })
    }

    pub fn borders(&self) -> &CropBorders {
        &self.borders
    }

    pub fn content_rect(&self) -> Rect {
        self.content
    }

    fn rebuild(&self, content: &Pixmap) -> Pixmap {
        let mut out = Pixmap::new(self.old_width, self.old_height);
        for (rect, strip) in &self.strips {
            out.set_region(*rect, strip);
        }
        out.set_region(self.content, content);
        if !self.had_mask {
            out.drop_opaque_mask();
        }
        out
    }
}

impl Command for AutoCropCommand {
    fn execute(&mut self, doc: &mut Document) {
        if !self.state.try_apply(&self.name()) {
            return;
        }
        let content = self.content;
        if self.target.is_selection() {
            let name = self.name();
            self.target.apply_selection(doc, &name, |pm| pm.region(content));
            // Keep the content where it was on the document.
            if let Some(sel) = doc.selection_mut()
                && let Target::Selection { old: Some(old) } = &self.target
            {
                sel.move_to(Point::new(old.rect().x + content.x, old.rect().y + content.y));
            }
            return;
        }
        if doc.pixmap().is_indexed() {
            self.target.apply_document(doc, |pm| pm.region(content));
            return;
        }
        self.strips = self
            .borders
            .iter()
            .filter(|b| b.exists())
            .map(|b| (b.rect, doc.region(b.rect)))
            .collect();
        let cropped = doc.region(content);
        doc.set_pixmap(cropped);
    }

    fn unexecute(&mut self, doc: &mut Document) {
        if !self.state.try_revert(&self.name()) {
            return;
        }
        if self.target.restore(doc) {
            return;
        }
        let rebuilt = self.rebuild(doc.pixmap());
        doc.set_pixmap(rebuilt);
        self.strips.clear();
    }

    fn name(&self) -> String {
        selection_prefixed(self.target.is_selection(), "Autocrop")
    }

    fn size(&self) -> i32 {
        let strips = self.strips.iter().map(|(_, pm)| pm.byte_size());
        dimensions::sum_sizes(strips.chain([self.target.size()]))
    }

    fn state(&self) -> CommandState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marked(w: i32, h: i32) -> Document {
        let mut doc = Document::new(w, h, Color::WHITE);
        doc.pixmap_mut().set_pixel(Point::new(0, 0), Color::RED);
        doc.pixmap_mut().set_pixel(Point::new(w - 1, 0), Color::BLUE);
        doc
    }

    fn round_trip(doc: &mut Document, cmd: &mut dyn Command) {
        let before = doc.pixmap().clone();
        cmd.execute(doc);
        cmd.unexecute(doc);
        assert!(doc.pixmap().same_pixels(&before), "{} did not undo", cmd.name());
        cmd.execute(doc);
    }

    #[test]
    fn resize_grow_then_undo() {
        let mut doc = marked(4, 3);
        let mut cmd = ResizeScaleCommand::new(&doc, ResizeScaleMode::Resize, 6, 5, Color::GREEN);
        round_trip(&mut doc, &mut cmd);
        assert_eq!((doc.width(), doc.height()), (6, 5));
        assert_eq!(doc.color_at(Point::new(5, 4)), Color::GREEN);
        assert_eq!(doc.color_at(Point::new(0, 0)), Color::RED);
        assert_eq!(cmd.size(), 0);
    }

    #[test]
    fn shrink_keeps_old_pixels() {
        let mut doc = marked(4, 3);
        let mut cmd = ResizeScaleCommand::new(&doc, ResizeScaleMode::Resize, 2, 2, Color::WHITE);
        round_trip(&mut doc, &mut cmd);
        assert!(cmd.size() > 0);
        assert_eq!(doc.width(), 2);
    }

    #[test]
    fn scale_doubles() {
        let mut doc = marked(4, 3);
        let mut cmd = ResizeScaleCommand::new(&doc, ResizeScaleMode::Scale, 8, 6, Color::WHITE);
        round_trip(&mut doc, &mut cmd);
        assert_eq!(doc.color_at(Point::new(1, 1)), Color::RED);
        assert_eq!(cmd.name(), "Scale");
    }

    #[test]
    fn rotate_right_swaps_size() {
        let mut doc = marked(4, 3);
        let mut cmd = RotateCommand::new(&doc, 90.0, Color::WHITE);
        assert_eq!(cmd.name(), "Rotate Right");
        round_trip(&mut doc, &mut cmd);
        assert_eq!((doc.width(), doc.height()), (3, 4));
        assert_eq!(doc.color_at(Point::new(2, 0)), Color::RED);
        assert_eq!(cmd.size(), 0);
    }

    #[test]
    fn arbitrary_rotation_saves_pixmap() {
        let mut doc = marked(10, 10);
        let mut cmd = RotateCommand::new(&doc, 30.0, Color::WHITE);
        round_trip(&mut doc, &mut cmd);
        assert!(cmd.size() > 0);
        assert!(doc.width() > 10);
    }

    #[test]
    fn flip_is_its_own_inverse() {
        let mut doc = marked(4, 3);
        let mut cmd = FlipCommand::new(&doc, true, false);
        round_trip(&mut doc, &mut cmd);
        assert_eq!(doc.color_at(Point::new(3, 0)), Color::RED);
        assert_eq!(doc.color_at(Point::new(0, 0)), Color::BLUE);
    }

    #[test]
    fn skew_on_selection_keeps_document() {
        let mut doc = marked(8, 8);
        doc.set_selection(Selection::rectangle(Rect::new(2, 2, 4, 4)));
        doc.selection_pull_from_document(Color::WHITE);
        let doc_before = doc.pixmap().clone();
        let sel_before = doc.selection().cloned();
        let mut cmd = SkewCommand::new(&doc, 30.0, 0.0, Color::WHITE);
        assert_eq!(cmd.name(), "Selection: Skew");
        cmd.execute(&mut doc);
        assert_eq!(doc.pixmap(), &doc_before);
        assert!(doc.selection().is_some_and(|s| s.width() > 4));
        cmd.unexecute(&mut doc);
        assert_eq!(doc.selection().cloned(), sel_before);
    }

    #[test]
    fn autocrop_round_trip() {
        let mut doc = Document::new(10, 8, Color::WHITE);
        doc.pixmap_mut().fill_rect(Rect::new(2, 3, 5, 3), Color::RED);
        let mut cmd = AutoCropCommand::new(&doc, 0, false).unwrap();
        round_trip(&mut doc, &mut cmd);
        assert_eq!((doc.width(), doc.height()), (5, 3));
        assert_eq!(doc.color_at(Point::new(0, 0)), Color::RED);
    }

    #[test]
    fn autocrop_needs_a_border() {
        let doc = Document::new(4, 4, Color::BLUE);
        assert!(AutoCropCommand::new(&doc, 0, false).is_none());
    }
}
