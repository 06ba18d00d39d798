use criterion::{Criterion, black_box, criterion_group, criterion_main};
use paintfx::{
    color::Color,
    geometry::{Point, Rect},
    ops::{transform, wash},
    pixmap::Pixmap,
};

fn gradient(w: i32, h: i32) -> Pixmap {
    let mut p = Pixmap::new(w, h);
    for y in 0..h {
        for x in 0..w {
            p.set_pixel(Point::new(x, y), Color::rgb((x % 256) as u8, (y % 256) as u8, 90));
        }
    }
    p
}

fn bench_rotate(c: &mut Criterion) {
    let pm = gradient(512, 512);

    c.bench_function("rotate_30deg_512px", |b| {
        b.iter(|| transform::rotate(black_box(&pm), 30.0, Color::WHITE, 0, 0));
    });
    c.bench_function("rotate_90deg_512px", |b| {
        b.iter(|| transform::rotate(black_box(&pm), 90.0, Color::WHITE, 0, 0));
    });
    c.bench_function("skew_30x10_512px", |b| {
        b.iter(|| transform::skew(black_box(&pm), 30.0, 10.0, Color::TRANSPARENT, 0, 0));
    });
}

fn bench_wash(c: &mut Criterion) {
    // Stripes so every row yields several runs.
    let mut pm = Pixmap::filled(512, 512, Color::WHITE);
    for x in (0..512).step_by(16) {
        pm.fill_rect(Rect::new(x, 0, 8, 512), Color::RED);
    }
    let style = wash::WashStyle {
        color_to_replace: Color::RED,
        replacement: Color::BLUE,
        processed_similarity: 10,
        brush_width: 9,
        brush_height: 9,
    };

    c.bench_function("global_wash_512px", |b| {
        b.iter(|| wash::global_wash(black_box(&pm), &style));
    });
    c.bench_function("wash_line_512px", |b| {
        b.iter(|| wash::wash_line(black_box(&pm), Point::new(500, 480), Point::new(10, 20), &style));
    });
}

criterion_group!(benches, bench_rotate, bench_wash);
criterion_main!(benches);
