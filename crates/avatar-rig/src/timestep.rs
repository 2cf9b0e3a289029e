//! Fixed-timestep accumulator.

/// Converts variable frame deltas into a whole number of fixed sub-steps.
#[derive(Debug, Clone)]
pub struct FixedTimeStep {
    step: f32,
    accumulator: f32,
    max_steps: usize,
}

impl FixedTimeStep {
    /// `rate` sub-steps per second, at most `max_steps` per call to
    /// [`FixedTimeStep::advance`]. Time beyond that budget is dropped.
    #[must_use]
    pub fn new(rate: f32, max_steps: usize) -> Self {
        Self {
            step: 1.0 / rate.max(f32::EPSILON),
            accumulator: 0.0,
            max_steps,
        }
    }

    /// Length of one sub-step in seconds.
    #[must_use]
    pub fn step(&self) -> f32 {
        self.step
    }

    /// Add `dt` seconds and return how many sub-steps are now due.
    pub fn advance(&mut self, dt: f32) -> usize {
        self.accumulator += dt.max(0.0);
        let mut steps = 0;
        while self.accumulator >= self.step && steps < self.max_steps {
            self.accumulator -= self.step;
            steps += 1;
        }
        if steps == self.max_steps {
            self.accumulator = self.accumulator.min(self.step);
        }
        steps
    }

    pub fn reset(&mut self) {
        self.accumulator = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_partial_frames() {
        let mut ts = FixedTimeStep::new(60.0, 8);
        assert_eq!(ts.advance(0.01), 0);
        assert_eq!(ts.advance(0.01), 1);
        assert_eq!(ts.advance(1.0 / 30.0), 2);
    }

    #[test]
    fn jitter_does_not_change_total_steps() {
        let mut steady = FixedTimeStep::new(60.0, 8);
        let mut jittery = FixedTimeStep::new(60.0, 8);
        let steady_total: usize = (0..120).map(|_| steady.advance(1.0 / 60.0 + 1e-6)).sum();
        // Same mean frame time, uneven spacing.
        let jitter = [0.5, 1.5, 1.0, 0.25, 1.75];
        let mut jitter_total = 0;
        for i in 0..120 {
            jitter_total += jittery.advance(jitter[i % jitter.len()] / 60.0);
        }
        assert!(steady_total.abs_diff(120) <= 1);
        assert!(jitter_total.abs_diff(120) <= 2);
    }

    #[test]
    fn long_frames_are_capped() {
        let mut ts = FixedTimeStep::new(60.0, 4);
        assert_eq!(ts.advance(10.0), 4);
        assert!(ts.advance(0.0) <= 1);
    }
}
