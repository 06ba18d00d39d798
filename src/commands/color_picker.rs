use crate::color::Color;
use crate::components::history::{Command, CommandState};
use crate::document::Document;
use crate::geometry::Point;

/// Sets the foreground (left button) or background colour to a document
/// pixel.  Only the tool colour changes; the image is untouched.
pub struct ColorPickerCommand {
    button: usize,
    color: Color,
    state: CommandState,
}

impl ColorPickerCommand {
    /// `None` when `p` is off the document.
    pub fn new(doc: &Document, p: Point, button: usize) -> Option<Self> {
        let color = doc.color_at(p);
        if !color.is_valid() {
            return None;
        }
        Some(Self {
            button,
            color,
            state: CommandState::Created,
        })
    }

    pub fn color(&self) -> Color {
        self.color
    }

    fn swap(&mut self, doc: &mut Document) {
        let old = doc.colors.color(self.button);
        doc.colors.set_color(self.button, self.color);
        self.color = old;
    }
}

impl Command for ColorPickerCommand {
    fn execute(&mut self, doc: &mut Document) {
        if self.state.try_apply(&self.name()) {
            self.swap(doc);
        }
    }

    fn unexecute(&mut self, doc: &mut Document) {
        if self.state.try_revert(&self.name()) {
            self.swap(doc);
        }
    }

    fn name(&self) -> String {
        "Color Picker".to_string()
    }

    fn size(&self) -> i32 {
        0
    }

    fn state(&self) -> CommandState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_and_restores_background() {
        let mut doc = Document::new(3, 3, Color::RED);
        let mut cmd = ColorPickerCommand::new(&doc, Point::new(1, 1), 1).unwrap();
        cmd.execute(&mut doc);
        assert_eq!(doc.colors.background, Color::RED);
        assert_eq!(doc.colors.foreground, Color::BLACK);
        cmd.unexecute(&mut doc);
        assert_eq!(doc.colors.background, Color::WHITE);
    }

    #[test]
    fn off_document_is_none() {
        let doc = Document::new(3, 3, Color::RED);
        assert!(ColorPickerCommand::new(&doc, Point::new(5, 0), 0).is_none());
    }
}
