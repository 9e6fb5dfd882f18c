use std::time::Duration;

use crate::constants::timing::MAX_DT;

/// Turns host timestamps into integration steps.
#[derive(Debug, Clone)]
pub struct FrameClock {
    last: Option<Duration>,
    max_dt: f32,
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new(MAX_DT)
    }
}

impl FrameClock {
    pub fn new(max_dt: f32) -> Self {
        Self { last: None, max_dt }
    }

    pub fn max_dt(&self) -> f32 {
        self.max_dt
    }

    /// Seconds since the previous call, clamped to `[0, max_dt]`.
    ///
    /// The first call has no reference point and returns 0. Timestamps that
    /// go backwards also give 0.
    pub fn advance(&mut self, now: Duration) -> f32 {
        let dt = self
            .last
            .map_or(0.0, |last| now.saturating_sub(last).as_secs_f32());
        self.last = Some(now);
        dt.min(self.max_dt)
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_step_is_zero() {
        let mut clock = FrameClock::default();
        assert_eq!(clock.advance(Duration::from_secs(100)), 0.0);
    }

    #[test]
    fn test_long_pause_clamped() {
        let mut clock = FrameClock::default();
        clock.advance(Duration::ZERO);
        assert_eq!(clock.advance(Duration::from_secs(5)), MAX_DT);
    }

    #[test]
    fn test_short_step_passes_through() {
        let mut clock = FrameClock::default();
        clock.advance(Duration::from_millis(1000));
        let dt = clock.advance(Duration::from_millis(1010));
        assert!((dt - 0.010).abs() < 1e-6);
    }

    #[test]
    fn test_backwards_time_is_zero() {
        let mut clock = FrameClock::default();
        clock.advance(Duration::from_millis(50));
        assert_eq!(clock.advance(Duration::from_millis(10)), 0.0);
    }
}
