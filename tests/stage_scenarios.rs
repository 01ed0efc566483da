use tweenvis::recording::{RecordedDraw, RecordingCanvas, RecordingFactory, RecordingFrame};
use tweenvis::{
    AnimatedObject, ObjectId, Point, PropsPatch, Stage, TweenChannel, UpdateMode, VisProps,
};

const WHITE: [f32; 4] = [1.0, 1.0, 1.0, 1.0];
const BLACK: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

fn new_object() -> AnimatedObject<RecordingFrame> {
    let props = VisProps {
        stage_width: 100.0,
        stage_height: 100.0,
        ..VisProps::default()
    };
    AnimatedObject::new(&TweenChannel::default_set(), props, RecordingFactory::default())
        .expect("object should build")
}

fn stage_with(objects: usize) -> (Stage<RecordingCanvas>, Vec<ObjectId>) {
    let mut stage = Stage::new(RecordingCanvas::default(), WHITE);
    let ids = (0..objects).map(|_| stage.add(new_object())).collect();
    (stage, ids)
}

fn update(
    stage: &mut Stage<RecordingCanvas>,
    id: ObjectId,
    now: f64,
    points: &[Point],
    props: Option<PropsPatch>,
    mode: UpdateMode,
) {
    stage
        .with_object(id, now, |vis| vis.update(Some(points), props.as_ref(), mode))
        .expect("object should exist")
        .expect("update should succeed");
}

fn last_draw(stage: &Stage<RecordingCanvas>, slot: usize) -> &RecordedDraw {
    let frame = stage.canvas().last_frame().expect("a frame was drawn");
    &frame.draws[slot]
}

fn x_at(stage: &Stage<RecordingCanvas>, index: u32) -> f32 {
    last_draw(stage, 0).channel_at(index, "x").expect("x channel")[0]
}

#[test]
fn moving_a_point_eases_through_the_midpoint() {
    let (mut stage, ids) = stage_with(1);
    let timing = Some(PropsPatch::timing(1000.0, 0.0));

    update(&mut stage, ids[0], 0.0, &[Point::new(1_i64, 0.0, 0.0, BLACK)], timing, UpdateMode::Animate);
    stage.tick(0.0).expect("tick");
    assert_eq!(x_at(&stage, 0), 0.0);
    stage.tick(1.0).expect("tick");
    assert!(!stage.is_looping());

    update(&mut stage, ids[0], 2.0, &[Point::new(1_i64, 10.0, 0.0, BLACK)], timing, UpdateMode::Animate);
    let mut previous = f32::NEG_INFINITY;
    for now in [2.0, 2.25, 2.5, 2.75, 3.0] {
        stage.tick(now).expect("tick");
        let x = x_at(&stage, 0);
        assert!(x >= previous, "x must not go backwards: {x} < {previous}");
        previous = x;
        if now == 2.5 {
            assert!(x > 0.0 && x < 10.0);
            assert!((x - 5.0).abs() < 1e-4);
        }
    }
    assert_eq!(previous, 10.0);
    assert!(!stage.is_looping());
}

#[test]
fn immediate_update_draws_every_point_in_place() {
    let (mut stage, ids) = stage_with(1);
    let points = vec![
        Point::new(1_i64, 10.0, 20.0, [1.0, 0.0, 0.0, 1.0]),
        Point::new("b", 30.0, 40.0, [0.0, 1.0, 0.0, 1.0]),
    ];
    update(&mut stage, ids[0], 0.0, &points, Some(PropsPatch::timing(1000.0, 5.0)), UpdateMode::Draw);

    let draw = last_draw(&stage, 0);
    for (index, point) in points.iter().enumerate() {
        let index = index as u32;
        assert_eq!(draw.channel_at(index, "x").expect("x"), vec![point.x]);
        assert_eq!(draw.channel_at(index, "y").expect("y"), vec![point.y]);
        assert_eq!(draw.channel_at(index, "color").expect("color"), point.color.to_vec());
    }
    assert!(!stage.is_looping());
}

#[test]
fn reanimating_mid_flight_has_no_jump() {
    let (mut stage, ids) = stage_with(1);
    let timing = Some(PropsPatch::timing(1000.0, 0.0));
    update(&mut stage, ids[0], 0.0, &[Point::new(1_i64, 0.0, 0.0, BLACK)], timing, UpdateMode::Draw);

    update(&mut stage, ids[0], 1.0, &[Point::new(1_i64, 10.0, 0.0, BLACK)], timing, UpdateMode::Animate);
    stage.tick(1.5).expect("tick");
    let before = x_at(&stage, 0);

    update(&mut stage, ids[0], 1.5, &[Point::new(1_i64, 10.0, 0.0, BLACK)], timing, UpdateMode::Animate);
    stage.tick(1.5).expect("tick");
    let after = x_at(&stage, 0);

    assert!((before - 5.0).abs() < 1e-4);
    assert!((after - before).abs() < 1e-4);
    assert_eq!(stage.animating_count(), 1);
}

#[test]
fn new_points_pop_in_at_their_destination() {
    let (mut stage, ids) = stage_with(1);
    let timing = Some(PropsPatch::timing(1000.0, 0.0));
    update(&mut stage, ids[0], 0.0, &[Point::new(1_i64, 0.0, 0.0, BLACK)], timing, UpdateMode::Draw);

    let next = [
        Point::new(1_i64, 10.0, 0.0, BLACK),
        Point::new(2_i64, 7.0, 7.0, BLACK),
    ];
    update(&mut stage, ids[0], 1.0, &next, timing, UpdateMode::Animate);
    for now in [1.0, 1.3, 1.8] {
        stage.tick(now).expect("tick");
        assert_eq!(x_at(&stage, 1), 7.0);
    }
}

#[test]
fn one_loop_runs_while_any_object_animates() {
    let (mut stage, ids) = stage_with(2);
    let short = Some(PropsPatch::timing(500.0, 0.0));
    let long = Some(PropsPatch::timing(1000.0, 0.0));
    let points = [Point::new(1_i64, 0.0, 0.0, BLACK)];

    update(&mut stage, ids[0], 0.0, &points, short, UpdateMode::Animate);
    assert!(stage.is_looping());
    update(&mut stage, ids[1], 0.0, &points, long, UpdateMode::Animate);
    assert!(stage.is_looping());
    assert_eq!(stage.animating_count(), 2);

    stage.tick(0.5).expect("tick");
    assert!(!stage.is_animating(ids[0]));
    assert!(stage.is_looping());

    stage.tick(1.0).expect("tick");
    assert!(!stage.is_looping());
    let drawn = stage.canvas().frames.len();

    stage.tick(1.5).expect("tick");
    assert_eq!(stage.canvas().frames.len(), drawn, "halted loop must not draw");

    update(&mut stage, ids[0], 2.0, &points, None, UpdateMode::Draw);
    assert_eq!(stage.canvas().frames.len(), drawn + 1);
    assert_eq!(last_draw(&stage, 0).count, 1);
    assert_eq!(stage.canvas().last_frame().expect("frame").draws.len(), 2);
}

#[test]
fn empty_dataset_draws_nothing_without_error() {
    let (mut stage, ids) = stage_with(1);
    update(&mut stage, ids[0], 0.0, &[], None, UpdateMode::Draw);

    let draw = last_draw(&stage, 0);
    assert_eq!(draw.count, 0);
    assert!(draw.attributes.is_empty());
    assert_eq!(stage.canvas().last_frame().expect("frame").background, WHITE);
}

#[test]
fn stagger_delays_later_points() {
    let (mut stage, ids) = stage_with(1);
    let timing = Some(PropsPatch::timing(100.0, 100.0));
    let start: Vec<Point> = (0..3_i64).map(|i| Point::new(i, 0.0, 0.0, BLACK)).collect();
    let end: Vec<Point> = (0..3_i64).map(|i| Point::new(i, 10.0, 0.0, BLACK)).collect();
    update(&mut stage, ids[0], 0.0, &start, timing, UpdateMode::Draw);
    update(&mut stage, ids[0], 1.0, &end, timing, UpdateMode::Animate);

    stage.tick(1.15).expect("tick");
    assert_eq!(x_at(&stage, 0), 10.0);
    assert!(x_at(&stage, 1) > 0.0 && x_at(&stage, 1) < 10.0);
    assert_eq!(x_at(&stage, 2), 0.0);

    // last point lands (100 + 100 * 3) ms after the start
    stage.tick(1.35).expect("tick");
    assert!(stage.is_looping());
    stage.tick(1.45).expect("tick");
    assert!(!stage.is_looping());
}
