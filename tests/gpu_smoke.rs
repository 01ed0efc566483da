use std::sync::Arc;

use tweenvis::gpu::{GpuContext, OffscreenCanvas};
use tweenvis::points_draw::PointsDrawFactory;
use tweenvis::schema::ZoomTransform;
use tweenvis::{AnimatedObject, Point, PropsPatch, Stage, TweenChannel, UpdateMode, VisProps};

const SIZE: u32 = 16;
const RED: [u8; 4] = [255, 0, 0, 255];
const WHITE: [u8; 4] = [255, 255, 255, 255];

fn headless_gpu() -> Option<Arc<GpuContext>> {
    match pollster::block_on(GpuContext::headless()) {
        Ok(gpu) => Some(Arc::new(gpu)),
        Err(e) => {
            if e.to_string().contains("no suitable GPU adapter found") {
                eprintln!("Skipping test: no GPU adapter found");
                return None;
            }
            panic!("gpu failed to initialize: {e:?}");
        }
    }
}

/// Draws one red point of size 4 on a white 16x16 canvas and reads it back.
fn render_point(gpu: Arc<GpuContext>, x: f32, y: f32, transform: ZoomTransform) -> Vec<u8> {
    let canvas = OffscreenCanvas::new(Arc::clone(&gpu), SIZE, SIZE).expect("canvas should build");
    let factory = PointsDrawFactory::new(gpu, OffscreenCanvas::FORMAT);
    let props = VisProps {
        point_size: 4.0,
        stage_width: SIZE as f32,
        stage_height: SIZE as f32,
        ..VisProps::default()
    };
    let object = AnimatedObject::new(&TweenChannel::default_set(), props, factory)
        .expect("object should build");

    let mut stage = Stage::new(canvas, [1.0, 1.0, 1.0, 1.0]);
    let id = stage.add(object);
    let points = [Point::new(1_i64, x, y, [1.0, 0.0, 0.0, 1.0])];
    let patch = PropsPatch {
        transform: Some(transform),
        ..PropsPatch::default()
    };
    stage
        .with_object(id, 0.0, |vis| vis.update(Some(&points), Some(&patch), UpdateMode::Draw))
        .expect("object should exist")
        .expect("draw should succeed");

    let rgba = stage.canvas().read_rgba().expect("readback should succeed");
    assert_eq!(rgba.len(), (SIZE * SIZE * 4) as usize);
    rgba
}

fn pixel(rgba: &[u8], x: u32, y: u32) -> [u8; 4] {
    let offset = ((y * SIZE + x) * 4) as usize;
    [rgba[offset], rgba[offset + 1], rgba[offset + 2], rgba[offset + 3]]
}

#[test]
fn point_draws_over_cleared_background() {
    let Some(gpu) = headless_gpu() else {
        return;
    };
    let rgba = render_point(gpu, 8.0, 8.0, ZoomTransform::default());

    assert_eq!(pixel(&rgba, 8, 8), RED);
    assert_eq!(pixel(&rgba, 0, 0), WHITE);
    assert_eq!(pixel(&rgba, SIZE - 1, SIZE - 1), WHITE);
}

#[test]
fn small_y_lands_in_the_top_rows() {
    let Some(gpu) = headless_gpu() else {
        return;
    };
    // quad spans x 2..6, y 0..4
    let rgba = render_point(gpu, 4.0, 2.0, ZoomTransform::default());

    assert_eq!(pixel(&rgba, 4, 2), RED);
    assert_eq!(pixel(&rgba, 2, 0), RED);
    assert_eq!(pixel(&rgba, 4, SIZE - 3), WHITE);
    assert_eq!(pixel(&rgba, SIZE - 5, 2), WHITE);
    assert_eq!(pixel(&rgba, 4, 6), WHITE);
}

#[test]
fn zoom_transform_moves_and_scales_points() {
    let Some(gpu) = headless_gpu() else {
        return;
    };
    // edge = min(2 * 4, max_point_size 8) = 8
    let transform = ZoomTransform { k: 2.0, x: 3.0, y: 1.0 };
    let rgba = render_point(Arc::clone(&gpu), 1.0, 3.0, transform);
    let rgba_moved = render_point(gpu, 2.0, 3.0, transform);

    // (1, 3) * 2 + (3, 1) = (5, 7); quad spans x 1..9
    assert_eq!(pixel(&rgba, 1, 7), RED);
    assert_eq!(pixel(&rgba, 9, 7), WHITE);

    // (2, 3) * 2 + (3, 1) = (7, 7); quad spans 3..11
    assert_eq!(pixel(&rgba_moved, 7, 7), RED);
    assert_eq!(pixel(&rgba_moved, 3, 3), RED);
    assert_eq!(pixel(&rgba_moved, 10, 10), RED);
    assert_eq!(pixel(&rgba_moved, 2, 7), WHITE);
    assert_eq!(pixel(&rgba_moved, 11, 7), WHITE);
    assert_eq!(pixel(&rgba_moved, 7, 11), WHITE);
    // untransformed position would sit at (2, 3)
    assert_eq!(pixel(&rgba_moved, 2, 3), WHITE);
}
