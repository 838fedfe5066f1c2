//! Exponential parameter smoothing.
//!
//! [`SmoothedParam`] approaches its target with a fixed time constant, the
//! same curve an audio graph produces for a "set target at time" automation.
//! Every control-rate change of gain, pan, send level or filter setting goes
//! through one of these so block-rate updates never step audibly.

/// One-pole smoother toward a target value.
#[derive(Debug, Clone, Copy)]
pub struct SmoothedParam {
    current: f32,
    target: f32,
    coeff: f32,
}

impl SmoothedParam {
    /// Creates a smoother resting at `value`.
    ///
    /// # Parameters
    ///
    /// - `value`: Initial (and target) value
    /// - `time_constant_s`: Time to cover ~63% of any step, in seconds
    /// - `sample_rate`: Rate at which [`next`](Self::next) is called
    pub fn new(value: f32, time_constant_s: f32, sample_rate: f32) -> Self {
        Self {
            current: value,
            target: value,
            coeff: smoothing_coeff(time_constant_s, sample_rate),
        }
    }

    /// Starts approaching `target` from the current output value.
    ///
    /// Non-finite targets are ignored.
    pub fn set_target(&mut self, target: f32) {
        if target.is_finite() {
            self.target = target;
        }
    }

    /// Advances one sample and returns the new output value.
    #[inline]
    pub fn next(&mut self) -> f32 {
        let delta = self.target - self.current;
        if delta.abs() <= settle_threshold(self.target) {
            self.current = self.target;
        } else {
            self.current += delta * self.coeff;
        }
        self.current
    }

    pub fn value(&self) -> f32 {
        self.current
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    pub fn is_settled(&self) -> bool {
        self.current == self.target
    }
}

fn smoothing_coeff(time_constant_s: f32, sample_rate: f32) -> f32 {
    if !time_constant_s.is_finite() || time_constant_s <= 0.0 {
        return 1.0;
    }
    if !sample_rate.is_finite() || sample_rate <= 0.0 {
        return 1.0;
    }

    1.0 - (-1.0 / (time_constant_s * sample_rate)).exp()
}

fn settle_threshold(target: f32) -> f32 {
    1e-6 * target.abs().max(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_settled() {
        let param = SmoothedParam::new(0.8, 0.02, 48_000.0);
        assert!(param.is_settled());
        assert!((param.value() - 0.8).abs() < f32::EPSILON);
    }

    #[test]
    fn test_approaches_target_without_jumping() {
        let mut param = SmoothedParam::new(0.0, 0.02, 48_000.0);
        param.set_target(1.0);

        let first = param.next();
        assert!(first > 0.0 && first < 0.01);

        // After one time constant the output is ~63% of the way there.
        for _ in 1..960 {
            param.next();
        }
        assert!((param.value() - 0.632).abs() < 0.01);
    }

    #[test]
    fn test_monotonic_toward_target() {
        let mut param = SmoothedParam::new(20_000.0, 0.02, 44_100.0);
        param.set_target(200.0);

        let mut previous = param.value();
        for _ in 0..2_000 {
            let value = param.next();
            assert!(value <= previous);
            assert!(value >= 200.0);
            previous = value;
        }
    }

    #[test]
    fn test_eventually_settles() {
        let mut param = SmoothedParam::new(0.0, 0.001, 48_000.0);
        param.set_target(0.5);
        for _ in 0..10_000 {
            param.next();
        }
        assert!(param.is_settled());
        assert_eq!(param.value(), 0.5);
    }

    #[test]
    fn test_ignores_non_finite_target() {
        let mut param = SmoothedParam::new(0.3, 0.02, 48_000.0);
        param.set_target(f32::NAN);
        assert_eq!(param.target(), 0.3);
    }

    #[test]
    fn test_zero_time_constant_is_instant() {
        let mut param = SmoothedParam::new(0.0, 0.0, 48_000.0);
        param.set_target(1.0);
        assert_eq!(param.next(), 1.0);
    }
}
