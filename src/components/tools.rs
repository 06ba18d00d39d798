use std::f64::consts::PI;
use std::time::Duration;

use crate::color::Color;
use crate::commands::{
    ColorPickerCommand, FlowCommand, FlowTool, SelectionCreateCommand, SelectionDestroyCommand,
    SelectionMoveCommand, SelectionPullCommand, SelectionResizeScaleCommand, ShapeCommand, SprayRng,
};
use crate::components::history::{Command, HistoryManager, MacroCommand};
use crate::document::Document;
use crate::geometry::{Point, Rect};
use crate::ops::shapes::{FillStyle, ShapeKind, ShapeStyle};
use crate::selection::Selection;

/// Spraycan timer period while the button is held.
pub const SPRAY_TICK: Duration = Duration::from_millis(25);

/// Pixels outside the selection rect that still grab a resize handle.
pub const HANDLE_REACH: i32 = 3;

// ============================================================================
// POINTER INPUT
// ============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub shift: bool,
    pub control: bool,
}

/// One pointer event in document coordinates.  Button 0 is the left
/// (foreground) button, 1 the right one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PointerEvent {
    pub point: Point,
    pub button: usize,
    pub modifiers: Modifiers,
}

impl PointerEvent {
    pub fn new(x: i32, y: i32, button: usize) -> Self {
        Self {
            point: Point::new(x, y),
            button: button.min(1),
            modifiers: Modifiers::default(),
        }
    }

    pub fn with_shift(mut self) -> Self {
        self.modifiers.shift = true;
        self
    }

    pub fn with_control(mut self) -> Self {
        self.modifiers.control = true;
        self
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GesturePhase {
    #[default]
    Idle,
    Dragging,
    Finished,
    Cancelled,
}

/// Press / move / release bookkeeping shared by every tool.
///
/// `Idle -> Dragging -> Finished | Cancelled`; a finished or cancelled
/// gesture may begin again.  Cancelling is only possible mid-drag.
#[derive(Clone, Copy, Debug, Default)]
pub struct DragGesture {
    phase: GesturePhase,
    button: usize,
    start: Point,
    last: Point,
    current: Point,
    modifiers: Modifiers,
}

impl DragGesture {
    pub fn phase(&self) -> GesturePhase {
        self.phase
    }

    pub fn is_dragging(&self) -> bool {
        self.phase == GesturePhase::Dragging
    }

    pub fn button(&self) -> usize {
        self.button
    }

    pub fn start(&self) -> Point {
        self.start
    }

    pub fn current(&self) -> Point {
        self.current
    }

    pub fn modifiers(&self) -> Modifiers {
        self.modifiers
    }

    pub fn begin(&mut self, ev: PointerEvent) -> bool {
        if self.is_dragging() {
            log_err!("DragGesture::begin while already dragging");
            return false;
        }
        *self = Self {
            phase: GesturePhase::Dragging,
            button: ev.button,
            start: ev.point,
            last: ev.point,
            current: ev.point,
            modifiers: ev.modifiers,
        };
        true
    }

    /// Moves the pointer.  Returns `(this, last)` when it actually moved.
    pub fn drag_to(&mut self, ev: PointerEvent) -> Option<(Point, Point)> {
        if !self.is_dragging() {
            return None;
        }
        self.modifiers = ev.modifiers;
        if ev.point == self.current {
            return None;
        }
        self.last = self.current;
        self.current = ev.point;
        Some((self.current, self.last))
    }

    pub fn finish(&mut self) -> bool {
        if !self.is_dragging() {
            return false;
        }
        self.phase = GesturePhase::Finished;
        true
    }

    pub fn cancel(&mut self) -> bool {
        if !self.is_dragging() {
            return false;
        }
        self.phase = GesturePhase::Cancelled;
        true
    }
}

/// What every tool does with pointer input.  Commands reach `history`
/// only once their gesture is complete.
pub trait ToolDriver {
    fn name(&self) -> &'static str;
    fn press(&mut self, doc: &mut Document, history: &mut HistoryManager, ev: PointerEvent);
    fn drag(&mut self, doc: &mut Document, ev: PointerEvent);
    fn release(&mut self, doc: &mut Document, history: &mut HistoryManager, ev: PointerEvent);
    /// Aborts the current operation, restoring the document.  Returns
    /// false when there was nothing to cancel.
    fn cancel(&mut self, doc: &mut Document) -> bool;
}

// ============================================================================
// MODIFIER GEOMETRY
// ============================================================================

/// Snaps `end` so the line from `start` sits on an allowed angle: shift
/// allows 0/45/90 degrees, control 0/30/60/90, both 0/30/45/60/90.
pub fn snap_line_end(start: Point, end: Point, shift: bool, control: bool) -> Point {
    if !shift && !control {
        return end;
    }
    let (dx, dy) = (end.x - start.x, end.y - start.y);
    let ratio = if dx == 0 { f64::MAX } else { (dy as f64 / dx as f64).abs() };

    let mut angles = vec![0.0];
    if control {
        angles.push(PI / 6.0);
    }
    if shift {
        angles.push(PI / 4.0);
    }
    if control {
        angles.push(PI / 3.0);
    }
    angles.push(PI / 2.0);

    let mut angle = PI / 2.0;
    for pair in angles.windows(2) {
        if ratio < ((pair[0] + pair[1]) / 2.0).tan() {
            angle = pair[0];
            break;
        }
    }

    if angle == 0.0 {
        return Point::new(end.x, start.y);
    }
    if angle == PI / 2.0 {
        return Point::new(start.x, end.y);
    }
    let sign = |v: i32| if v < 0 { -1.0 } else { 1.0 };
    let dist = (dx as f64).hypot(dy as f64);
    let new_dx = (dist * angle.cos() * sign(dx)).round() as i32;
    let new_dy = (dist * angle.sin() * sign(dy)).round() as i32;
    Point::new(start.x + new_dx, start.y + new_dy)
}

/// Drag rect for the rectangular tools.  Control centres the shape on
/// `start`; shift makes it square, keeping the corner at `start` (or the
/// centre, with control).
pub fn rect_with_modifiers(start: Point, current: Point, shift: bool, control: bool) -> Rect {
    let mut rect = Rect::from_points(start, current);
    if control {
        let xdiff = (start.x - current.x).abs();
        let ydiff = (start.y - current.y).abs();
        rect = Rect::new(start.x - xdiff, start.y - ydiff, xdiff * 2 + 1, ydiff * 2 + 1);
    }
    if !shift {
        return rect;
    }
    let side = rect.width.min(rect.height);
    if control {
        let center = rect.center();
        return Rect::new(center.x - side / 2, center.y - side / 2, side, side);
    }
    let x = if start.x == rect.x { rect.x } else { rect.right() - side + 1 };
    let y = if start.y == rect.y { rect.y } else { rect.bottom() - side + 1 };
    Rect::new(x, y, side, side)
}

/// Keeps at least one pixel of `rect` on a `width x height` document.
pub fn clamp_onto_document(rect: Rect, width: i32, height: i32) -> Rect {
    let mut r = rect;
    if r.right() < 0 {
        r = r.translated(-r.right(), 0);
    } else if r.left() >= width {
        r = r.translated(width - r.left() - 1, 0);
    }
    if r.bottom() < 0 {
        r = r.translated(0, -r.bottom());
    } else if r.top() >= height {
        r = r.translated(0, height - r.top() - 1);
    }
    r
}

/// Foreground/background a shape drawn with `button` uses.
fn shape_style(doc: &Document, button: usize, pen_width: i32, fill: FillStyle) -> ShapeStyle {
    let fg = doc.colors.color(button);
    let bg = doc.colors.color(1 - button.min(1));
    ShapeStyle::new(fg, bg, pen_width, fill)
}

// ============================================================================
// FLOW TOOLS
// ============================================================================

/// Drives a freehand tool: every move draws straight onto the document and
/// the whole stroke is recorded as one `FlowCommand` on release.
pub struct FlowDriver {
    tool: FlowTool,
    gesture: DragGesture,
    command: Option<FlowCommand>,
    rng: SprayRng,
    since_tick: Duration,
}

impl FlowDriver {
    pub fn new(tool: FlowTool, seed: u64) -> Self {
        Self {
            tool,
            gesture: DragGesture::default(),
            command: None,
            rng: SprayRng::new(seed),
            since_tick: Duration::ZERO,
        }
    }

    pub fn tool(&self) -> FlowTool {
        self.tool
    }

    pub fn gesture(&self) -> &DragGesture {
        &self.gesture
    }

    /// Advances the spraycan timer; every full period sprays at the
    /// pointer again.  Other tools ignore time.
    pub fn tick(&mut self, doc: &mut Document, elapsed: Duration) {
        if !matches!(self.tool, FlowTool::Spraycan { .. }) || !self.gesture.is_dragging() {
            return;
        }
        let Some(cmd) = self.command.as_mut() else {
            return;
        };
        self.since_tick += elapsed;
        let colors = doc.colors;
        let (p, button) = (self.gesture.current(), self.gesture.button());
        while self.since_tick >= SPRAY_TICK {
            self.since_tick -= SPRAY_TICK;
            if let Some(r) = self.tool.draw_point(doc, p, &colors, button, &mut self.rng) {
                cmd.update_bounding_rect(r);
            }
        }
    }
}

impl ToolDriver for FlowDriver {
    fn name(&self) -> &'static str {
        self.tool.name()
    }

    fn press(&mut self, doc: &mut Document, _history: &mut HistoryManager, ev: PointerEvent) {
        if self.gesture.is_dragging() {
            if ev.button != self.gesture.button() {
                self.cancel(doc);
            }
            return;
        }
        self.gesture.begin(ev);
        self.since_tick = Duration::ZERO;
        let colors = doc.colors;
        if !self.tool.should_draw(&colors) {
            log_debug!("{}: nothing to do with these colours", self.tool.name());
            return;
        }
        let mut cmd = FlowCommand::new(self.tool.name(), doc);
        if let Some(r) = self.tool.draw_point(doc, ev.point, &colors, ev.button, &mut self.rng) {
            cmd.update_bounding_rect(r);
        }
        self.command = Some(cmd);
    }

    fn drag(&mut self, doc: &mut Document, ev: PointerEvent) {
        let Some((this, last)) = self.gesture.drag_to(ev) else {
            return;
        };
        let Some(cmd) = self.command.as_mut() else {
            return;
        };
        let colors = doc.colors;
        if let Some(r) = self.tool.draw_line(doc, this, last, &colors, self.gesture.button(), &mut self.rng) {
            cmd.update_bounding_rect(r);
        }
    }

    fn release(&mut self, doc: &mut Document, history: &mut HistoryManager, ev: PointerEvent) {
        self.drag(doc, ev);
        if !self.gesture.finish() {
            return;
        }
        let Some(mut cmd) = self.command.take() else {
            return;
        };
        if cmd.did_something() {
            cmd.finalize();
            history.push_applied(Box::new(cmd));
        } else {
            cmd.cancel(doc);
        }
    }

    fn cancel(&mut self, doc: &mut Document) -> bool {
        if !self.gesture.cancel() {
            return false;
        }
        if let Some(mut cmd) = self.command.take() {
            cmd.cancel(doc);
        }
        true
    }
}

// ============================================================================
// POLYGONAL TOOLS: line, polyline, polygon, curve
// ============================================================================

/// Builds a line, polyline, polygon or curve over one or more drags.
///
/// Each drag adds a point (the curve's second and third drags place its
/// control points).  The shape ends when it has all its points, when the
/// other button is pressed, or on `end_shape`.
pub struct PolygonalDriver {
    kind: ShapeKind,
    pen_width: i32,
    fill: FillStyle,
    gesture: DragGesture,
    points: Vec<Point>,
    /// Button that started the shape.
    shape_button: Option<usize>,
    command: Option<ShapeCommand>,
}

impl PolygonalDriver {
    pub fn new(kind: ShapeKind, pen_width: i32, fill: FillStyle) -> Self {
        debug_assert!(!kind.is_rectangular(), "{:?} is not polygonal", kind);
        Self {
            kind,
            pen_width: pen_width.max(1),
            fill,
            gesture: DragGesture::default(),
            points: Vec::new(),
            shape_button: None,
            command: None,
        }
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn is_drawing(&self) -> bool {
        self.command.is_some()
    }

    fn preview(&mut self, doc: &mut Document) {
        if let Some(cmd) = self.command.as_mut() {
            cmd.preview(doc, self.points.clone());
        }
    }

    /// Moves the point being placed.  Line segments snap to angles; curve
    /// control points do not.
    fn place_last_point(&mut self, p: Point, mods: Modifiers) {
        let n = self.points.len();
        if n == 0 {
            return;
        }
        let placing_control = self.kind == ShapeKind::Curve && n > 2;
        let p = if placing_control || n < 2 {
            p
        } else {
            snap_line_end(self.points[n - 2], p, mods.shift, mods.control)
        };
        self.points[n - 1] = p;
    }

    /// Finishes the current shape and records it.
    pub fn end_shape(&mut self, doc: &mut Document, history: &mut HistoryManager) {
        if self.gesture.is_dragging() {
            self.gesture.finish();
        }
        self.shape_button = None;
        let Some(mut cmd) = self.command.take() else {
            return;
        };
        let points = std::mem::take(&mut self.points);
        cmd.preview(doc, points);
        cmd.finalize(doc);
        history.push_applied(Box::new(cmd));
    }
}

impl ToolDriver for PolygonalDriver {
    fn name(&self) -> &'static str {
        self.kind.label()
    }

    fn press(&mut self, doc: &mut Document, history: &mut HistoryManager, ev: PointerEvent) {
        if self.gesture.is_dragging() {
            if ev.button != self.gesture.button() {
                self.cancel(doc);
            }
            return;
        }
        if let Some(button) = self.shape_button
            && button != ev.button
        {
            self.end_shape(doc, history);
            return;
        }
        self.gesture.begin(ev);
        if self.command.is_none() {
            let style = shape_style(doc, ev.button, self.pen_width, self.fill);
            self.command = Some(ShapeCommand::new(self.kind, Vec::new(), style));
            self.shape_button = Some(ev.button);
            self.points = vec![ev.point, ev.point];
        } else {
            self.points.push(ev.point);
            self.place_last_point(ev.point, ev.modifiers);
        }
        self.preview(doc);
    }

    fn drag(&mut self, doc: &mut Document, ev: PointerEvent) {
        if self.gesture.drag_to(ev).is_none() {
            return;
        }
        self.place_last_point(ev.point, ev.modifiers);
        self.preview(doc);
    }

    fn release(&mut self, doc: &mut Document, history: &mut HistoryManager, ev: PointerEvent) {
        self.drag(doc, ev);
        if !self.gesture.finish() {
            return;
        }
        let done = match self.kind {
            ShapeKind::Line => true,
            kind => self.points.len() >= kind.max_points(),
        };
        if done {
            self.end_shape(doc, history);
        }
    }

    /// Cancels the whole shape, not just the current segment.
    fn cancel(&mut self, doc: &mut Document) -> bool {
        self.gesture.cancel();
        self.points.clear();
        self.shape_button = None;
        match self.command.take() {
            Some(mut cmd) => {
                cmd.cancel(doc);
                true
            }
            None => false,
        }
    }
}

// ============================================================================
// RECTANGULAR TOOLS: rectangle, rounded rectangle, ellipse
// ============================================================================

pub struct RectangularDriver {
    kind: ShapeKind,
    pen_width: i32,
    fill: FillStyle,
    gesture: DragGesture,
    command: Option<ShapeCommand>,
}

impl RectangularDriver {
    pub fn new(kind: ShapeKind, pen_width: i32, fill: FillStyle) -> Self {
        debug_assert!(kind.is_rectangular(), "{:?} is not rectangular", kind);
        Self {
            kind,
            pen_width: pen_width.max(1),
            fill,
            gesture: DragGesture::default(),
            command: None,
        }
    }

    fn update(&mut self, doc: &mut Document) {
        let m = self.gesture.modifiers();
        let rect = rect_with_modifiers(self.gesture.start(), self.gesture.current(), m.shift, m.control);
        if let Some(cmd) = self.command.as_mut() {
            cmd.preview(doc, vec![rect.top_left(), rect.bottom_right()]);
        }
    }
}

impl ToolDriver for RectangularDriver {
    fn name(&self) -> &'static str {
        self.kind.label()
    }

    fn press(&mut self, doc: &mut Document, _history: &mut HistoryManager, ev: PointerEvent) {
        if self.gesture.is_dragging() {
            if ev.button != self.gesture.button() {
                self.cancel(doc);
            }
            return;
        }
        self.gesture.begin(ev);
        let style = shape_style(doc, ev.button, self.pen_width, self.fill);
        self.command = Some(ShapeCommand::new(self.kind, Vec::new(), style));
        self.update(doc);
    }

    fn drag(&mut self, doc: &mut Document, ev: PointerEvent) {
        let modifiers_changed = self.gesture.is_dragging() && self.gesture.modifiers() != ev.modifiers;
        if self.gesture.drag_to(ev).is_some() || modifiers_changed {
            self.update(doc);
        }
    }

    fn release(&mut self, doc: &mut Document, history: &mut HistoryManager, ev: PointerEvent) {
        self.drag(doc, ev);
        if !self.gesture.finish() {
            return;
        }
        if let Some(mut cmd) = self.command.take() {
            cmd.finalize(doc);
            history.push_applied(Box::new(cmd));
        }
    }

    fn cancel(&mut self, doc: &mut Document) -> bool {
        if !self.gesture.cancel() {
            return false;
        }
        if let Some(mut cmd) = self.command.take() {
            cmd.cancel(doc);
        }
        true
    }
}

// ============================================================================
// SELECTION TOOL
// ============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SelectionMode {
    #[default]
    Rectangle,
    Ellipse,
    FreeForm,
}

/// Which sides of the selection a resize handle moves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Handle {
    /// -1 left, 1 right, 0 neither.
    pub x_sign: i32,
    /// -1 top, 1 bottom, 0 neither.
    pub y_sign: i32,
}

/// The handle grabbed by pressing at `p`: any point in the thin band just
/// outside `rect`.
pub fn handle_at(rect: Rect, p: Point) -> Option<Handle> {
    let band = rect.adjusted(-HANDLE_REACH, -HANDLE_REACH, HANDLE_REACH, HANDLE_REACH);
    if rect.is_empty() || !band.contains(p) || rect.contains(p) {
        return None;
    }
    let side = |v: i32, lo: i32, hi: i32| {
        if v < lo {
            -1
        } else if v > hi {
            1
        } else {
            0
        }
    };
    Some(Handle {
        x_sign: side(p.x, rect.left(), rect.right()),
        y_sign: side(p.y, rect.top(), rect.bottom()),
    })
}

/// New rect when `handle` of `original` is dragged by `delta`.  Shift
/// keeps the aspect ratio (not for text boxes).
pub fn resized_rect(original: Rect, handle: Handle, delta: Point, keep_aspect: bool) -> Rect {
    let extent = |v: i64| v.clamp(1, i32::MAX as i64);
    let coord = |v: i64| v.clamp(i32::MIN as i64, i32::MAX as i64) as i32;

    let (ow, oh) = (original.width.max(1) as i64, original.height.max(1) as i64);
    let mut w = extent(ow + handle.x_sign as i64 * delta.x as i64);
    let mut h = extent(oh + handle.y_sign as i64 * delta.y as i64);
    if keep_aspect {
        let rx = if handle.x_sign != 0 { w as f64 / ow as f64 } else { 0.0 };
        let ry = if handle.y_sign != 0 { h as f64 / oh as f64 } else { 0.0 };
        if rx >= ry {
            h = extent(w * oh / ow);
        } else {
            w = extent(h * ow / oh);
        }
    }
    let x = if handle.x_sign < 0 { original.x as i64 - (w - ow) } else { original.x as i64 };
    let y = if handle.y_sign < 0 { original.y as i64 - (h - oh) } else { original.y as i64 };
    Rect::new(coord(x), coord(y), w as i32, h as i32)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SelectionDrag {
    Create,
    Move { grab: Point },
    ResizeScale(Handle),
}

/// Creates, moves and resizes selections.
///
/// Moving pulls the pixels on the first real move; control leaves a copy
/// where the selection started and shift smears copies along the drag.
/// The pull and the move (or resize) are recorded as one history entry.
pub struct SelectionDriver {
    mode: SelectionMode,
    smooth_scale: bool,
    gesture: DragGesture,
    drag: Option<SelectionDrag>,
    free_form: Vec<Point>,
    pull: Option<SelectionPullCommand>,
    mover: Option<SelectionMoveCommand>,
    smear: bool,
    resizer: Option<SelectionResizeScaleCommand>,
}

impl SelectionDriver {
    pub fn new(mode: SelectionMode, smooth_scale: bool) -> Self {
        Self {
            mode,
            smooth_scale,
            gesture: DragGesture::default(),
            drag: None,
            free_form: Vec::new(),
            pull: None,
            mover: None,
            smear: false,
            resizer: None,
        }
    }

    fn pull_if_needed(&mut self, doc: &mut Document) {
        if doc.has_pulled_selection() || self.pull.is_some() {
            return;
        }
        let mut pull = SelectionPullCommand::new(doc.colors.background);
        pull.execute(doc);
        self.pull = Some(pull);
    }

    fn preview_create(&mut self, doc: &mut Document) {
        let (start, current) = (self.gesture.start(), self.gesture.current());
        let sel = match self.mode {
            SelectionMode::Rectangle => {
                let rect = Rect::from_points(start, current).intersected(&doc.rect());
                (!rect.is_empty()).then(|| Selection::rectangle(rect))
            }
            SelectionMode::Ellipse => {
                let rect = Rect::from_points(start, current);
                (rect.width > 1 || rect.height > 1).then(|| Selection::ellipse(rect))
            }
            SelectionMode::FreeForm => (self.free_form.len() > 2).then(|| Selection::free_form(self.free_form.clone())),
        };
        match sel {
            Some(mut sel) => {
                sel.set_transparency(doc.colors.selection_transparency);
                doc.set_selection(sel);
            }
            None => doc.selection_delete(),
        }
    }

    fn drag_move(&mut self, doc: &mut Document, grab: Point, ev: PointerEvent) {
        let Some((w, h)) = doc.selection().map(|s| (s.width(), s.height())) else {
            return;
        };
        let target = Rect::new(ev.point.x - grab.x, ev.point.y - grab.y, w, h);
        let target = clamp_onto_document(target, doc.width(), doc.height());
        let first_move = self.mover.is_none();
        if first_move && doc.selection().is_some_and(|s| s.top_left() == target.top_left()) {
            return;
        }
        self.pull_if_needed(doc);
        if first_move {
            let is_text = doc.selection().is_some_and(Selection::is_text);
            let name = if is_text { "Text: Move Box" } else { "Selection: Move" };
            self.mover = Some(SelectionMoveCommand::new(name, doc));
        }
        let Some(mover) = self.mover.as_mut() else {
            return;
        };
        if ev.modifiers.shift {
            self.smear = true;
        }
        if first_move && (ev.modifiers.control || ev.modifiers.shift) {
            mover.copy_onto_document(doc);
        }
        mover.move_to(doc, target.top_left());
        if ev.modifiers.shift {
            mover.copy_onto_document(doc);
        }
    }

    fn drag_resize(&mut self, doc: &mut Document, handle: Handle, ev: PointerEvent) {
        if self.resizer.is_none() {
            if ev.point == self.gesture.start() {
                return;
            }
            self.pull_if_needed(doc);
            self.resizer = SelectionResizeScaleCommand::new(doc, self.smooth_scale, None);
        }
        let Some(resizer) = self.resizer.as_mut() else {
            return;
        };
        let original = resizer.original_selection();
        let keep_aspect = ev.modifiers.shift && !original.is_text();
        let delta = ev.point - self.gesture.start();
        let rect = resized_rect(original.rect(), handle, delta, keep_aspect);
        resizer.resize_and_move_to(doc, rect);
    }

    fn finish_create(&mut self, doc: &mut Document, history: &mut HistoryManager) {
        self.free_form.clear();
        if let Some(sel) = doc.take_selection() {
            history.push(Box::new(SelectionCreateCommand::new(sel)), doc);
        }
    }

    fn finish_transform(&mut self, doc: &mut Document, history: &mut HistoryManager) {
        let pull = self.pull.take();
        let (name, child): (String, Box<dyn Command>) = if let Some(mut mover) = self.mover.take() {
            mover.finalize();
            let name = if self.smear {
                let prefix = if doc.selection().is_some_and(Selection::is_text) { "Text" } else { "Selection" };
                format!("{}: Smear", prefix)
            } else {
                mover.name()
            };
            (name, Box::new(mover))
        } else if let Some(mut resizer) = self.resizer.take() {
            resizer.finalize();
            (resizer.name(), Box::new(resizer))
        } else {
            // A click that never moved.
            if let Some(mut pull) = pull {
                pull.unexecute(doc);
            }
            return;
        };
        let mut cmd = MacroCommand::new(name);
        if let Some(pull) = pull {
            cmd.add(Box::new(pull));
        }
        cmd.add(child);
        history.push_applied(Box::new(cmd));
    }
}

impl ToolDriver for SelectionDriver {
    fn name(&self) -> &'static str {
        match self.mode {
            SelectionMode::Rectangle => "Selection (Rectangular)",
            SelectionMode::Ellipse => "Selection (Elliptical)",
            SelectionMode::FreeForm => "Selection (Free-Form)",
        }
    }

    fn press(&mut self, doc: &mut Document, history: &mut HistoryManager, ev: PointerEvent) {
        if self.gesture.is_dragging() {
            if ev.button != self.gesture.button() {
                self.cancel(doc);
            }
            return;
        }
        self.gesture.begin(ev);
        self.smear = false;
        let p = ev.point;
        let hit = doc.selection().map(|sel| {
            match handle_at(sel.rect(), p) {
                Some(handle) => Some(SelectionDrag::ResizeScale(handle)),
                None if sel.contains(p) => Some(SelectionDrag::Move { grab: p - sel.top_left() }),
                None => None,
            }
        });
        let drag = match hit {
            Some(Some(drag)) => drag,
            Some(None) => {
                history.push(Box::new(SelectionDestroyCommand::deselect()), doc);
                SelectionDrag::Create
            }
            None => SelectionDrag::Create,
        };
        if drag == SelectionDrag::Create {
            self.free_form = vec![p];
        }
        self.drag = Some(drag);
    }

    fn drag(&mut self, doc: &mut Document, ev: PointerEvent) {
        if self.gesture.drag_to(ev).is_none() {
            return;
        }
        match self.drag {
            Some(SelectionDrag::Create) => {
                if self.free_form.last() != Some(&ev.point) {
                    self.free_form.push(ev.point);
                }
                self.preview_create(doc);
            }
            Some(SelectionDrag::Move { grab }) => self.drag_move(doc, grab, ev),
            Some(SelectionDrag::ResizeScale(handle)) => self.drag_resize(doc, handle, ev),
            None => {}
        }
    }

    fn release(&mut self, doc: &mut Document, history: &mut HistoryManager, ev: PointerEvent) {
        self.drag(doc, ev);
        if !self.gesture.finish() {
            return;
        }
        match self.drag.take() {
            Some(SelectionDrag::Create) => self.finish_create(doc, history),
            Some(_) => self.finish_transform(doc, history),
            None => {}
        }
    }

    fn cancel(&mut self, doc: &mut Document) -> bool {
        if !self.gesture.cancel() {
            return false;
        }
        match self.drag.take() {
            Some(SelectionDrag::Create) => {
                self.free_form.clear();
                doc.selection_delete();
            }
            Some(_) => {
                if let Some(mut mover) = self.mover.take() {
                    mover.cancel(doc);
                }
                if let Some(mut resizer) = self.resizer.take() {
                    resizer.cancel(doc);
                }
                if let Some(mut pull) = self.pull.take() {
                    pull.unexecute(doc);
                }
            }
            None => {}
        }
        true
    }
}

// ============================================================================
// COLOR PICKER
// ============================================================================

#[derive(Default)]
pub struct ColorPickerDriver {
    gesture: DragGesture,
}

impl ColorPickerDriver {
    /// Colour the picker would take at `p`.
    pub fn peek(doc: &Document, p: Point) -> Color {
        doc.color_at(p)
    }
}

impl ToolDriver for ColorPickerDriver {
    fn name(&self) -> &'static str {
        "Color Picker"
    }

    fn press(&mut self, _doc: &mut Document, _history: &mut HistoryManager, ev: PointerEvent) {
        if !self.gesture.is_dragging() {
            self.gesture.begin(ev);
        }
    }

    fn drag(&mut self, _doc: &mut Document, ev: PointerEvent) {
        self.gesture.drag_to(ev);
    }

    fn release(&mut self, doc: &mut Document, history: &mut HistoryManager, ev: PointerEvent) {
        if !self.gesture.finish() {
            return;
        }
        if let Some(cmd) = ColorPickerCommand::new(doc, ev.point, self.gesture.button()) {
            history.push(Box::new(cmd), doc);
        }
    }

    fn cancel(&mut self, _doc: &mut Document) -> bool {
        self.gesture.cancel()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gesture_cancel_only_while_dragging() {
        let mut g = DragGesture::default();
        assert!(!g.cancel());
        assert!(g.begin(PointerEvent::new(1, 1, 0)));
        assert_eq!(g.drag_to(PointerEvent::new(2, 1, 0)), Some((Point::new(2, 1), Point::new(1, 1))));
        assert_eq!(g.drag_to(PointerEvent::new(2, 1, 0)), None);
        assert!(g.cancel());
        assert_eq!(g.phase(), GesturePhase::Cancelled);
        assert!(!g.finish());
        assert!(g.begin(PointerEvent::new(0, 0, 1)));
        assert_eq!(g.button(), 1);
    }

    #[test]
    fn shift_snaps_to_45() {
        let s = Point::new(0, 0);
        assert_eq!(snap_line_end(s, Point::new(10, 1), true, false), Point::new(10, 0));
        assert_eq!(snap_line_end(s, Point::new(1, -10), true, false), Point::new(0, -10));
        assert_eq!(snap_line_end(s, Point::new(10, 9), true, false), Point::new(10, 10));
        assert_eq!(snap_line_end(s, Point::new(-10, 9), true, false), Point::new(-10, 10));
    }

    #[test]
    fn control_snaps_to_30_and_60() {
        let s = Point::new(0, 0);
        assert_eq!(snap_line_end(s, Point::new(10, 6), false, true), Point::new(10, 6));
        assert_eq!(snap_line_end(s, Point::new(10, 5), false, true), Point::new(10, 6));
        assert_eq!(snap_line_end(s, Point::new(10, 10), false, false), Point::new(10, 10));
    }

    #[test]
    fn rect_modifiers() {
        let s = Point::new(5, 5);
        assert_eq!(rect_with_modifiers(s, Point::new(8, 6), false, false), Rect::new(5, 5, 4, 2));
        assert_eq!(rect_with_modifiers(s, Point::new(8, 6), false, true), Rect::new(2, 4, 7, 3));
        assert_eq!(rect_with_modifiers(s, Point::new(8, 6), true, false), Rect::new(5, 5, 2, 2));
        assert_eq!(rect_with_modifiers(s, Point::new(2, 1), true, false), Rect::new(2, 2, 4, 4));
        assert_eq!(rect_with_modifiers(s, Point::new(8, 6), true, true), Rect::new(4, 4, 3, 3));
    }

    #[test]
    fn clamp_keeps_a_pixel() {
        assert_eq!(clamp_onto_document(Rect::new(-20, 3, 5, 5), 10, 10), Rect::new(-4, 3, 5, 5));
        assert_eq!(clamp_onto_document(Rect::new(30, 30, 5, 5), 10, 10), Rect::new(9, 9, 5, 5));
        assert_eq!(clamp_onto_document(Rect::new(2, 2, 5, 5), 10, 10), Rect::new(2, 2, 5, 5));
    }

    #[test]
    fn handles_and_resizing() {
        let r = Rect::new(10, 10, 10, 4);
        assert_eq!(handle_at(r, Point::new(15, 12)), None);
        assert_eq!(handle_at(r, Point::new(21, 12)), Some(Handle { x_sign: 1, y_sign: 0 }));
        assert_eq!(handle_at(r, Point::new(8, 8)), Some(Handle { x_sign: -1, y_sign: -1 }));
        assert_eq!(handle_at(r, Point::new(40, 12)), None);

        let right = Handle { x_sign: 1, y_sign: 0 };
        assert_eq!(resized_rect(r, right, Point::new(10, 0), false), Rect::new(10, 10, 20, 4));
        assert_eq!(resized_rect(r, right, Point::new(10, 0), true), Rect::new(10, 10, 20, 8));
        let top_left = Handle { x_sign: -1, y_sign: -1 };
        assert_eq!(resized_rect(r, top_left, Point::new(-2, -1), false), Rect::new(8, 9, 12, 5));
        assert_eq!(resized_rect(r, right, Point::new(-50, 0), false).width, 1);
    }

    #[test]
    fn long_drags_on_wide_documents() {
        let s = Point::new(0, 0);
        assert_eq!(snap_line_end(s, Point::new(50_000, 48_000), true, false), Point::new(49_010, 49_010));
        assert_eq!(snap_line_end(s, Point::new(50_000, 1), true, true), Point::new(50_000, 0));

        let r = Rect::new(0, 0, 50_000, 40_000);
        let bottom_right = Handle { x_sign: 1, y_sign: 1 };
        assert_eq!(
            resized_rect(r, bottom_right, Point::new(10_000, 2_000), true),
            Rect::new(0, 0, 60_000, 48_000)
        );
        let top_left = Handle { x_sign: -1, y_sign: -1 };
        assert_eq!(
            resized_rect(r, top_left, Point::new(-10_000, -5_000), false),
            Rect::new(-10_000, -5_000, 60_000, 45_000)
        );
        let right = Handle { x_sign: 1, y_sign: 0 };
        let huge = Rect::new(0, 0, i32::MAX - 5, 10);
        assert_eq!(resized_rect(huge, right, Point::new(100, 0), false).width, i32::MAX);
    }
}
