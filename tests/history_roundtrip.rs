use paintfx::color::Color;
use paintfx::commands::{
    AutoCropCommand, EffectCommand, EffectKind, FlipCommand, ResizeScaleCommand, ResizeScaleMode, RotateCommand,
    SelectionCreateCommand, SelectionDestroyCommand, SelectionPullCommand, ShapeCommand, SkewCommand,
};
use paintfx::components::history::{Command, HistoryManager};
use paintfx::document::Document;
use paintfx::geometry::{Point, Rect};
use paintfx::ops::shapes::{FillStyle, ShapeKind, ShapeStyle};
use paintfx::pixmap::Pixmap;
use paintfx::selection::Selection;

fn picture() -> Document {
    let mut doc = Document::new(30, 20, Color::WHITE);
    for y in 0..20 {
        for x in 0..30 {
            doc.pixmap_mut()
                .set_pixel(Point::new(x, y), Color::rgb((x * 8) as u8, (y * 12) as u8, 40));
        }
    }
    doc.pixmap_mut().fill_rect(Rect::new(4, 4, 6, 5), Color::RED);
    doc
}

type Step = Box<dyn Fn(&Document) -> Box<dyn Command>>;

#[test]
fn every_step_undoes_to_its_predecessor() {
    let mut doc = picture();
    let mut history = HistoryManager::with_limits(100, None);

    let steps: Vec<Step> = vec![
        Box::new(|d| Box::new(ResizeScaleCommand::new(d, ResizeScaleMode::Resize, 40, 30, Color::BLUE))),
        Box::new(|d| Box::new(RotateCommand::new(d, 30.0, Color::WHITE))),
        Box::new(|d| Box::new(SkewCommand::new(d, 20.0, 10.0, Color::TRANSPARENT))),
        Box::new(|d| Box::new(FlipCommand::new(d, true, false))),
        Box::new(|d| Box::new(RotateCommand::new(d, 90.0, Color::WHITE))),
        Box::new(|d| Box::new(ResizeScaleCommand::new(d, ResizeScaleMode::SmoothScale, 25, 25, Color::WHITE))),
        Box::new(|d| Box::new(EffectCommand::new(EffectKind::Grayscale, d))),
        Box::new(|d| Box::new(EffectCommand::new(EffectKind::BlurSharpen(-3), d))),
        Box::new(|d| Box::new(EffectCommand::new(EffectKind::ReduceColors { depth: 1, dither: true }, d))),
        Box::new(|_| {
            let style = ShapeStyle::new(Color::RED, Color::WHITE, 2, FillStyle::NoFill);
            Box::new(ShapeCommand::new(
                ShapeKind::Ellipse,
                vec![Point::new(2, 2), Point::new(10, 12)],
                style,
            ))
        }),
    ];

    let mut snapshots: Vec<Pixmap> = vec![doc.pixmap().clone()];
    for step in &steps {
        let cmd = step(&doc);
        history.push(cmd, &mut doc);
        snapshots.push(doc.pixmap().clone());
    }
    assert_eq!(history.undo_count(), steps.len());

    for expected in snapshots.iter().rev().skip(1) {
        assert!(history.undo(&mut doc).is_some());
        assert!(doc.pixmap().same_pixels(expected));
    }
    assert!(!history.can_undo());

    history.redo_to(steps.len(), &mut doc);
    assert!(doc.pixmap().same_pixels(&snapshots[steps.len()]));
}

#[test]
fn autocrop_restores_borders() {
    let mut doc = Document::new(20, 20, Color::WHITE);
    doc.pixmap_mut().fill_rect(Rect::new(5, 5, 8, 6), Color::RED);
    let before = doc.pixmap().clone();
    let mut history = HistoryManager::default();

    let cmd = AutoCropCommand::new(&doc, 0, false).expect("white border");
    history.push(Box::new(cmd), &mut doc);
    assert_eq!((doc.width(), doc.height()), (8, 6));
    assert_eq!(doc.color_at(Point::new(0, 0)), Color::RED);

    history.undo(&mut doc);
    assert!(doc.pixmap().same_pixels(&before));
    assert!(AutoCropCommand::new(&Document::new(5, 5, Color::RED), 0, false).is_none());
}

#[test]
fn selection_pipeline_round_trips() {
    let mut doc = picture();
    let original = doc.pixmap().clone();
    let mut history = HistoryManager::default();

    history.push(
        Box::new(SelectionCreateCommand::new(Selection::rectangle(Rect::new(3, 3, 8, 8)))),
        &mut doc,
    );
    history.push(Box::new(SelectionPullCommand::new(Color::WHITE)), &mut doc);
    assert!(doc.has_pulled_selection());
    assert_eq!(doc.color_at(Point::new(5, 5)), Color::WHITE);

    let effect = EffectCommand::new(EffectKind::Grayscale, &doc);
    assert_eq!(effect.name(), "Selection: Reduce to Grayscale");
    history.push(Box::new(effect), &mut doc);
    history.push(Box::new(SelectionDestroyCommand::deselect()), &mut doc);
    assert!(doc.selection().is_none());
    assert_eq!(doc.color_at(Point::new(5, 5)), Color::rgb(54, 54, 54));

    assert_eq!(
        history.undo_history(),
        vec![
            "Selection: Create".to_string(),
            "Selection: Pull From Document".to_string(),
            "Selection: Reduce to Grayscale".to_string(),
            "Selection: Deselect".to_string(),
        ]
    );

    history.undo_to(4, &mut doc);
    assert!(doc.selection().is_none());
    assert!(doc.pixmap().same_pixels(&original));
}

#[test]
fn push_after_undo_drops_redo() {
    let mut doc = picture();
    let mut history = HistoryManager::default();
    history.push(Box::new(FlipCommand::new(&doc, true, false)), &mut doc);
    history.undo(&mut doc);
    assert!(history.can_redo());

    history.push(Box::new(RotateCommand::new(&doc, -90.0, Color::WHITE)), &mut doc);
    assert!(!history.can_redo());
    assert_eq!(history.undo_description().as_deref(), Some("Rotate Left"));
    assert_eq!((doc.width(), doc.height()), (20, 30));
}

#[test]
fn limits_prune_oldest() {
    let mut doc = picture();
    let mut history = HistoryManager::with_limits(3, None);
    for _ in 0..5 {
        history.push(Box::new(FlipCommand::new(&doc, false, true)), &mut doc);
    }
    assert_eq!(history.undo_count(), 3);
    history.undo_to(10, &mut doc);
    assert!(!history.can_undo());
    assert_eq!(history.redo_count(), 3);
}
