use crate::components::history::{Command, CommandState};
use crate::document::Document;
use crate::ops::effects;
use crate::pixmap::Pixmap;

use super::selection_prefixed;

/// Colour effects that rewrite every pixel of the document or selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EffectKind {
    Grayscale,
    ReduceColors { depth: u8, dither: bool },
    /// Negative blurs, positive sharpens.
    BlurSharpen(i32),
}

impl EffectKind {
    pub fn name(&self) -> String {
        match self {
            EffectKind::Grayscale => "Reduce to Grayscale".to_string(),
            EffectKind::ReduceColors { depth: 1, dither } => {
                format!("Reduce to Monochrome{}", if *dither { " (Dithered)" } else { "" })
            }
            EffectKind::ReduceColors { depth, dither } => {
                let colors = if *depth == 8 { "256 Color".to_string() } else { format!("{}-bit", depth) };
                format!("Reduce to {}{}", colors, if *dither { " (Dithered)" } else { "" })
            }
            EffectKind::BlurSharpen(a) if *a < 0 => "Blur".to_string(),
            EffectKind::BlurSharpen(_) => "Sharpen".to_string(),
        }
    }

    /// Does nothing to any image.
    pub fn is_noop(&self) -> bool {
        matches!(self, EffectKind::BlurSharpen(0))
    }

    pub fn apply(&self, pm: &Pixmap) -> Pixmap {
        match self {
            EffectKind::Grayscale => effects::grayscale(pm),
            EffectKind::ReduceColors { depth, dither } => effects::reduce_colors(pm, *depth, *dither),
            EffectKind::BlurSharpen(amount) => effects::blur_sharpen(pm, *amount),
        }
    }
}

/// Applies an `EffectKind` to the pulled selection if there is one,
/// otherwise to the whole document.
pub struct EffectCommand {
    kind: EffectKind,
    acts_on_selection: bool,
    old: Option<Pixmap>,
    state: CommandState,
}

impl EffectCommand {
    pub fn new(kind: EffectKind, doc: &Document) -> Self {
        Self {
            kind,
            acts_on_selection: doc.has_pulled_selection(),
            old: None,
            state: CommandState::Created,
        }
    }

    pub fn kind(&self) -> EffectKind {
        self.kind
    }

    fn target<'a>(&self, doc: &'a mut Document) -> Option<&'a mut Pixmap> {
        if self.acts_on_selection {
            let pm = doc.selection_mut().and_then(|s| s.pixmap_mut());
            if pm.is_none() {
                log_err!("{}: selection was not pulled", self.name());
            }
            pm
        } else {
            Some(doc.pixmap_mut())
        }
    }
}

impl Command for EffectCommand {
    fn execute(&mut self, doc: &mut Document) {
        if !self.state.try_apply(&self.kind.name()) {
            return;
        }
        let kind = self.kind;
        if let Some(pm) = self.target(doc) {
            let new = kind.apply(pm);
            self.old = Some(std::mem::replace(pm, new));
        }
    }

    fn unexecute(&mut self, doc: &mut Document) {
        if !self.state.try_revert(&self.kind.name()) {
            return;
        }
        let Some(old) = self.old.take() else {
            return;
        };
        if let Some(pm) = self.target(doc) {
            *pm = old;
        }
    }

    fn name(&self) -> String {
        selection_prefixed(self.acts_on_selection, &self.kind.name())
    }

    fn size(&self) -> i32 {
        self.old.as_ref().map_or(0, Pixmap::byte_size)
    }

    fn state(&self) -> CommandState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Color;
    use crate::geometry::{Point, Rect};
    use crate::selection::Selection;

    #[test]
    fn names_follow_parameters() {
        assert_eq!(EffectKind::ReduceColors { depth: 1, dither: true }.name(), "Reduce to Monochrome (Dithered)");
        assert_eq!(EffectKind::ReduceColors { depth: 8, dither: false }.name(), "Reduce to 256 Color");
        assert_eq!(EffectKind::BlurSharpen(-3).name(), "Blur");
    }

    #[test]
    fn grayscale_round_trip() {
        let mut doc = Document::new(4, 4, Color::RED);
        let before = doc.pixmap().clone();
        let mut cmd = EffectCommand::new(EffectKind::Grayscale, &doc);
        cmd.execute(&mut doc);
        let c = doc.color_at(Point::new(1, 1));
        assert_eq!(c, Color::rgb(54, 54, 54));
        assert!(cmd.size() > 0);
        cmd.unexecute(&mut doc);
        assert_eq!(doc.pixmap(), &before);
    }

    #[test]
    fn selection_effect_leaves_document() {
        let mut doc = Document::new(6, 6, Color::RED);
        doc.set_selection(Selection::rectangle(Rect::new(0, 0, 2, 2)));
        doc.selection_pull_from_document(Color::WHITE);
        let mut cmd = EffectCommand::new(EffectKind::Grayscale, &doc);
        assert_eq!(cmd.name(), "Selection: Reduce to Grayscale");
        cmd.execute(&mut doc);
        assert_eq!(doc.color_at(Point::new(4, 4)), Color::RED);
        let sel_px = doc.selection().and_then(|s| s.pixmap()).map(|p| p.color_at(Point::new(0, 0)));
        assert_eq!(sel_px, Some(Color::rgb(54, 54, 54)));
    }
}
