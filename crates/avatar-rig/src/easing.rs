//! CSS-style cubic bezier easing.

/// A cubic bezier through (0,0), (x1,y1), (x2,y2), (1,1), evaluated as
/// `y(x)` by solving for the curve parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CubicBezier {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
}

impl CubicBezier {
    /// The strong ease-out used for fly, activate and eye-target blends.
    pub const EASE_OUT: Self = Self::new(0.0, 1.0, 0.0, 1.0);

    #[must_use]
    pub const fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    fn curve(a1: f32, a2: f32, t: f32) -> f32 {
        let u = 1.0 - t;
        3.0 * u * u * t * a1 + 3.0 * u * t * t * a2 + t * t * t
    }

    fn slope(a1: f32, a2: f32, t: f32) -> f32 {
        let u = 1.0 - t;
        3.0 * u * u * a1 + 6.0 * u * t * (a2 - a1) + 3.0 * t * t * (1.0 - a2)
    }

    /// Eased value for progress `x`, clamped to `[0, 1]`.
    #[must_use]
    pub fn ease(&self, x: f32) -> f32 {
        let x = x.clamp(0.0, 1.0);
        if x == 0.0 || x == 1.0 {
            return x;
        }

        // Newton iterations, falling back to bisection on flat slopes.
        let mut t = x;
        for _ in 0..8 {
            let error = Self::curve(self.x1, self.x2, t) - x;
            if error.abs() < 1e-6 {
                return Self::curve(self.y1, self.y2, t);
            }
            let d = Self::slope(self.x1, self.x2, t);
            if d.abs() < 1e-6 {
                break;
            }
            t = (t - error / d).clamp(0.0, 1.0);
        }

        let (mut lo, mut hi) = (0.0_f32, 1.0_f32);
        t = x;
        for _ in 0..32 {
            let value = Self::curve(self.x1, self.x2, t);
            if (value - x).abs() < 1e-6 {
                break;
            }
            if value < x {
                lo = t;
            } else {
                hi = t;
            }
            t = 0.5 * (lo + hi);
        }
        Self::curve(self.y1, self.y2, t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_are_fixed() {
        let e = CubicBezier::EASE_OUT;
        assert_eq!(e.ease(0.0), 0.0);
        assert_eq!(e.ease(1.0), 1.0);
        assert_eq!(e.ease(-3.0), 0.0);
        assert_eq!(e.ease(4.0), 1.0);
    }

    #[test]
    fn linear_control_points_are_identity() {
        let linear = CubicBezier::new(1.0 / 3.0, 1.0 / 3.0, 2.0 / 3.0, 2.0 / 3.0);
        for i in 1..10 {
            let x = i as f32 / 10.0;
            assert!((linear.ease(x) - x).abs() < 1e-4);
        }
    }

    #[test]
    fn ease_out_is_monotonic_and_front_loaded() {
        let e = CubicBezier::EASE_OUT;
        let mut last = 0.0;
        for i in 1..=20 {
            let y = e.ease(i as f32 / 20.0);
            assert!(y >= last - 1e-5);
            last = y;
        }
        assert!(e.ease(0.25) > 0.5);
    }
}
