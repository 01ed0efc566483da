//! Point generators and layouts for driving a stage: seeded random scatter,
//! phyllotaxis spirals and phyllotaxis clusters coloured from a fixed palette.

use crate::schema::Point;

/// Golden angle, the per-index rotation of a phyllotaxis spiral.
pub const PHYLLOTAXIS_THETA: f32 = std::f32::consts::PI * 0.763_932; // π(3 − √5)

/// Ten samples of the viridis ramp, dark to light.
pub const PALETTE: [[f32; 4]; 10] = [
    [0.2667, 0.0039, 0.3294, 1.0],
    [0.2824, 0.1412, 0.4588, 1.0],
    [0.2549, 0.2667, 0.5294, 1.0],
    [0.2078, 0.3725, 0.5529, 1.0],
    [0.1647, 0.4706, 0.5569, 1.0],
    [0.1294, 0.5686, 0.5490, 1.0],
    [0.1333, 0.6588, 0.5176, 1.0],
    [0.2667, 0.7490, 0.4392, 1.0],
    [0.4784, 0.8196, 0.3176, 1.0],
    [0.7412, 0.8745, 0.1490, 1.0],
];

/// Deterministic xorshift generator; the same seed always yields the same
/// layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    /// `seed = 0` is remapped so the state never sticks at zero.
    pub const fn from_seed(seed: u64) -> Self {
        let mixed = seed ^ 0x9E37_79B9_7F4A_7C15;
        let state = if mixed == 0 {
            0xA076_1D64_78BD_642F
        } else {
            mixed
        };
        Self { state }
    }

    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    /// Uniform in `[0, 1)`.
    pub fn next_f32(&mut self) -> f32 {
        (self.next_u64() >> 40) as f32 / (1_u64 << 24) as f32
    }

    /// Uniform in `[0, bound)`; `bound` must be non-zero.
    pub fn next_below(&mut self, bound: usize) -> usize {
        (self.next_u64() % bound as u64) as usize
    }

    /// Standard normal sample (Box-Muller).
    pub fn next_normal(&mut self) -> f32 {
        let u1 = self.next_f32().max(f32::MIN_POSITIVE);
        let u2 = self.next_f32();
        (-2.0 * u1.ln()).sqrt() * (std::f32::consts::TAU * u2).cos()
    }

    /// Fisher-Yates shuffle in place.
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = self.next_below(i + 1);
            items.swap(i, j);
        }
    }
}

/// `count` points with ids `0..count`, uniformly scattered over the stage and
/// coloured a random grey in `[0.1, 0.9]`.
pub fn random_points(count: usize, width: f32, height: f32, rng: &mut XorShift64) -> Vec<Point> {
    (0..count)
        .map(|id| {
            let grey = rng.next_f32() * 0.8 + 0.1;
            let x = rng.next_f32() * width;
            let y = rng.next_f32() * height;
            Point::new(id, x, y, [grey, grey, grey, 1.0])
        })
        .collect()
}

/// Copies `points` with positions moved onto a phyllotaxis spiral centred at
/// `(x_offset, y_offset)`. Point `i` sits at radius `sqrt(i)` scaled by the
/// per-axis radius.
pub fn phyllotaxis_layout(
    points: &[Point],
    radius_x: f32,
    radius_y: f32,
    x_offset: f32,
    y_offset: f32,
) -> Vec<Point> {
    points
        .iter()
        .enumerate()
        .map(|(i, point)| {
            let (x, y) = phyllotaxis_position(i, radius_x, radius_y);
            Point {
                x: x_offset + x,
                y: y_offset + y,
                ..point.clone()
            }
        })
        .collect()
}

fn phyllotaxis_position(index: usize, radius_x: f32, radius_y: f32) -> (f32, f32) {
    let i = index as f32;
    let angle = i * PHYLLOTAXIS_THETA;
    (
        radius_x * i.sqrt() * angle.cos(),
        radius_y * i.sqrt() * angle.sin(),
    )
}

/// A group of points drawn as its own spiral around `(x, y)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cluster {
    pub size: usize,
    pub x: f32,
    pub y: f32,
}

/// Splits `count` points into `cluster_count` normally distributed cluster
/// sizes and places the cluster centres on a spiral around the stage centre.
pub fn generate_clusters(
    count: usize,
    cluster_count: usize,
    point_size: f32,
    point_margin: f32,
    width: f32,
    height: f32,
    rng: &mut XorShift64,
) -> Vec<Cluster> {
    let cluster_count = cluster_count.max(1);
    let samples: Vec<f32> = (0..count).map(|_| rng.next_normal()).collect();
    let (min, max) = samples
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(*v), hi.max(*v))
        });

    let mut sizes = vec![0_usize; cluster_count];
    let span = max - min;
    for sample in &samples {
        let bucket = if span > 0.0 {
            (((sample - min) / span) * cluster_count as f32) as usize
        } else {
            0
        };
        sizes[bucket.min(cluster_count - 1)] += 1;
    }

    let point_radius = point_size / 2.0 + point_margin;
    let mean_radius = sizes
        .iter()
        .map(|size| (*size as f32).sqrt() * point_radius)
        .sum::<f32>()
        / cluster_count as f32;
    let spacing = 2.0 * mean_radius + 3.0;

    sizes
        .into_iter()
        .enumerate()
        .map(|(i, size)| {
            let (x, y) = phyllotaxis_position(i, spacing, spacing);
            Cluster {
                size,
                x: width / 2.0 + x,
                y: height / 2.0 + y,
            }
        })
        .collect()
}

/// Shuffles `points` into `cluster_count` clusters, lays each cluster out as a
/// spiral and paints it with one palette colour.
pub fn cluster_layout(
    points: &[Point],
    cluster_count: usize,
    point_size: f32,
    width: f32,
    height: f32,
    rng: &mut XorShift64,
) -> Vec<Point> {
    let point_margin = 1.0;
    let radius = point_size / 2.0 + point_margin;
    let clusters = generate_clusters(
        points.len(),
        cluster_count,
        point_size,
        point_margin,
        width,
        height,
        rng,
    );

    let mut shuffled = points.to_vec();
    rng.shuffle(&mut shuffled);
    let mut palette = PALETTE;
    rng.shuffle(&mut palette);

    let mut laid_out = Vec::with_capacity(points.len());
    let mut start = 0;
    for (cluster_index, cluster) in clusters.iter().enumerate() {
        let end = (start + cluster.size).min(shuffled.len());
        let color = palette[cluster_index % palette.len()];
        laid_out.extend(
            phyllotaxis_layout(&shuffled[start..end], radius, radius, cluster.x, cluster.y)
                .into_iter()
                .map(|point| Point { color, ..point }),
        );
        start = end;
    }
    laid_out
}

/// `[-1, 1]` normalized coordinates to `[0, width] x [0, height]` pixels.
pub fn to_pixel_space([x, y]: [f32; 2], width: f32, height: f32) -> [f32; 2] {
    [(x / 2.0 + 0.5) * width, (y / 2.0 + 0.5) * height]
}

/// Pixels back to `[-1, 1]` normalized coordinates.
pub fn to_normal_space([x, y]: [f32; 2], width: f32, height: f32) -> [f32; 2] {
    [2.0 * (x / width - 0.5), 2.0 * (y / height - 0.5)]
}
