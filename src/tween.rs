//! CPU side of the per-point easing. `points_draw` emits the same math in
//! WGSL; the two must agree so an interrupted animation resumes exactly where
//! the GPU had drawn it.

/// Cubic in-out easing over doubled progress `p` in `[0, 2]`.
pub fn ease_cubic_in_out(p: f32) -> f32 {
    let p = p.clamp(0.0, 2.0);
    let eased = if p <= 1.0 {
        p * p * p
    } else {
        let q = p - 2.0;
        q * q * q + 2.0
    };
    (eased / 2.0).clamp(0.0, 1.0)
}

/// Interpolation factor for the point at `index`.
///
/// `elapsed`, `duration` and `delay_by_index` are milliseconds.
pub fn progress(elapsed: f32, duration: f32, delay_by_index: f32, index: u32) -> f32 {
    if duration == 0.0 {
        return 1.0;
    }

    let delay = delay_by_index * index as f32;
    if elapsed < delay {
        return 0.0;
    }

    ease_cubic_in_out(2.0 * (elapsed - delay) / duration)
}

pub fn lerp(from: f32, to: f32, t: f32) -> f32 {
    (1.0 - t) * from + t * to
}

pub fn mix(from: &[f32], to: &[f32], t: f32) -> Vec<f32> {
    from.iter()
        .zip(to.iter())
        .map(|(a, b)| lerp(*a, *b, t))
        .collect()
}

/// Seconds until the last point of `count` finishes.
pub fn max_duration_secs(duration: f32, delay_by_index: f32, count: usize) -> f64 {
    (f64::from(duration) + f64::from(delay_by_index) * count as f64) / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_are_stable() {
        assert_eq!(progress(0.0, 1000.0, 0.0, 0), 0.0);
        assert_eq!(progress(1000.0, 1000.0, 0.0, 0), 1.0);
        assert_eq!(progress(5000.0, 1000.0, 0.0, 0), 1.0);
        assert_eq!(progress(1250.0, 1000.0, 25.0, 10), 1.0);
    }

    #[test]
    fn zero_duration_shows_destination() {
        assert_eq!(progress(0.0, 0.0, 10.0, 50), 1.0);
    }

    #[test]
    fn delay_holds_points_at_source() {
        assert_eq!(progress(99.0, 1000.0, 10.0, 10), 0.0);
        assert!(progress(101.0, 1000.0, 10.0, 10) > 0.0);
    }

    #[test]
    fn easing_is_monotonic() {
        let mut previous = 0.0;
        for step in 0..=200 {
            let t = progress(step as f32 * 6.0, 1000.0, 1.0, 40);
            assert!(t >= previous, "t dropped at step {step}");
            previous = t;
        }
        assert_eq!(previous, 1.0);
    }

    #[test]
    fn midpoint_is_half_way() {
        let t = progress(500.0, 1000.0, 0.0, 0);
        assert!((t - 0.5).abs() < 1e-6);
        let quarter = progress(250.0, 1000.0, 0.0, 0);
        assert!((quarter - 0.0625).abs() < 1e-6);
    }

    #[test]
    fn mix_is_component_wise() {
        assert_eq!(
            mix(&[0.0, 10.0, 1.0], &[10.0, 20.0, 1.0], 0.5),
            vec![5.0, 15.0, 1.0]
        );
    }

    #[test]
    fn max_duration_adds_stagger_per_point() {
        assert_eq!(max_duration_secs(2000.0, 0.0, 100), 2.0);
        assert_eq!(max_duration_secs(1000.0, 2.0, 500), 2.0);
        assert_eq!(max_duration_secs(0.0, 0.0, 0), 0.0);
    }
}
