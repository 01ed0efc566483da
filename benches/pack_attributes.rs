//! Attribute packing for a full-size cloud, the CPU work behind every data update.
//! Run: cargo bench

use std::collections::HashMap;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tweenvis::attributes::AttributeLayout;
use tweenvis::layout::{phyllotaxis_layout, random_points, XorShift64};
use tweenvis::{Point, PointId, TweenChannel};

const POINTS: usize = 30_000;

fn bench_pack(c: &mut Criterion) {
    let layout = AttributeLayout::new(&TweenChannel::default_set()).expect("layout");
    let mut rng = XorShift64::from_seed(42);
    let source = random_points(POINTS, 1000.0, 700.0, &mut rng);
    let dest = phyllotaxis_layout(&source, 1.5, 1.5, 500.0, 350.0);
    let by_id: HashMap<PointId, Point> = source
        .iter()
        .map(|point| (point.id.clone(), point.clone()))
        .collect();

    let mut group = c.benchmark_group("pack_attributes");
    group.sample_size(50);

    group.bench_function("phyllotaxis_from_random_30k", |b| {
        b.iter(|| black_box(layout.pack(&dest, |id| by_id.get(id)).expect("pack")));
    });
    group.bench_function("snap_in_place_30k", |b| {
        b.iter(|| black_box(layout.pack(&dest, |_| None).expect("pack")));
    });

    group.finish();
}

criterion_group!(benches, bench_pack);
criterion_main!(benches);
