//! Scalar helpers shared by generators and frame drivers.

pub use std::f32::consts::{PI, TAU};

/// Linearly maps `value` from `[in_start, in_end]` into `[out_start, out_end]`.
///
/// The input is not clamped. A collapsed input range (`in_start == in_end`)
/// has no meaningful slope, so the result is `out_start`. Both endpoints map
/// exactly, however far apart the ranges are in magnitude.
pub fn remap(value: f32, in_start: f32, in_end: f32, out_start: f32, out_end: f32) -> f32 {
    if in_start == in_end {
        return out_start;
    }
    // f64 keeps the span finite for any pair of finite f32 endpoints.
    let span = f64::from(in_end) - f64::from(in_start);
    if !span.is_finite() {
        return out_start;
    }
    let t = (f64::from(value) - f64::from(in_start)) / span;
    (f64::from(out_start) * (1.0 - t) + f64::from(out_end) * t) as f32
}

/// [`remap`] followed by a clamp to the output range, whichever way it runs.
pub fn remap_clamped(value: f32, in_start: f32, in_end: f32, out_start: f32, out_end: f32) -> f32 {
    let mapped = remap(value, in_start, in_end, out_start, out_end);
    let (low, high) = if out_start <= out_end {
        (out_start, out_end)
    } else {
        (out_end, out_start)
    };
    mapped.clamp(low, high)
}

pub fn lerp(from: f32, to: f32, t: f32) -> f32 {
    from + (to - from) * t
}

/// One step of exponential smoothing.
///
/// `factor` is the weight kept from `previous`: `0.0` jumps straight to
/// `target`, values near `1.0` move slowly. Out-of-range factors are clamped.
pub fn smooth_toward(previous: f32, target: f32, factor: f32) -> f32 {
    let keep = factor.clamp(0.0, 1.0);
    previous * keep + target * (1.0 - keep)
}

/// Easing applied to a normalized `[0, 1]` progress value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Curve {
    #[default]
    Linear,
    Smoothstep,
    EaseInOut,
}

impl Curve {
    pub fn sample(self, t: f32) -> f32 {
        let clamped = t.clamp(0.0, 1.0);
        match self {
            Curve::Linear => clamped,
            Curve::Smoothstep => clamped * clamped * (3.0 - 2.0 * clamped),
            Curve::EaseInOut => {
                if clamped < 0.5 {
                    2.0 * clamped * clamped
                } else {
                    -1.0 + (4.0 - 2.0 * clamped) * clamped
                }
            }
        }
    }
}

/// Maps `[-1, 1]` onto `[0, 1]`; the usual way a sine or noise sample becomes
/// a brightness or mix factor.
pub fn unipolar(value: f32) -> f32 {
    value * 0.5 + 0.5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remap_hits_both_endpoints() {
        for (a, b, c, d) in [
            (0.0, 1.0, 0.0, 10.0),
            (-100.0, 0.0, 0.0, 1.0),
            (-40.0, 0.0, 0.0, 255.0),
            (5.0, -5.0, 1.0, -1.0),
        ] {
            assert_eq!(remap(a, a, b, c, d), c);
            assert_eq!(remap(b, a, b, c, d), d);
        }
    }

    #[test]
    fn endpoints_survive_extreme_ranges() {
        for (a, b, c, d) in [
            (0.0, 1.0, 100_000_000.0, 1.0),
            (-3e38, 3e38, 0.0, 1.0),
            (f32::MIN, f32::MAX, -1.0, 1.0),
            (1e-30, 2e-30, 0.0, 1e30),
            (0.1, 0.7, 0.3, -0.9),
        ] {
            assert_eq!(remap(a, a, b, c, d), c);
            assert_eq!(remap(b, a, b, c, d), d);
        }
        assert_eq!(remap(0.0, -3e38, 3e38, 0.0, 1.0), 0.5);
    }

    #[test]
    fn collapsed_input_range_returns_output_start() {
        assert_eq!(remap(3.0, 2.0, 2.0, 7.0, 9.0), 7.0);
        assert_eq!(remap(2.0, 2.0, 2.0, -1.0, 1.0), -1.0);
    }

    #[test]
    fn remap_extrapolates_unless_clamped() {
        assert!((remap(-120.0, -100.0, 0.0, 0.0, 1.0) + 0.2).abs() < 1e-6);
        assert_eq!(remap_clamped(-120.0, -100.0, 0.0, 0.0, 1.0), 0.0);
        assert_eq!(remap_clamped(12.0, 0.0, 10.0, 1.0, 0.0), 0.0);
    }

    #[test]
    fn smoothing_converges_on_target() {
        let mut value = 0.0;
        for _ in 0..200 {
            value = smooth_toward(value, 1.0, 0.8);
        }
        assert!((value - 1.0).abs() < 1e-4);
        assert_eq!(smooth_toward(0.25, 1.0, 0.0), 1.0);
        assert_eq!(smooth_toward(0.25, 1.0, 1.0), 0.25);
    }

    #[test]
    fn curves_are_anchored_and_monotonic() {
        for curve in [Curve::Linear, Curve::Smoothstep, Curve::EaseInOut] {
            assert!(curve.sample(0.0).abs() < 1e-6);
            assert!((curve.sample(1.0) - 1.0).abs() < 1e-6);
            let mut last = 0.0;
            for step in 0..=20 {
                let sample = curve.sample(step as f32 / 20.0);
                assert!(sample >= last - f32::EPSILON);
                last = sample;
            }
        }
        assert!((Curve::Smoothstep.sample(0.5) - 0.5).abs() < 1e-6);
    }
}
