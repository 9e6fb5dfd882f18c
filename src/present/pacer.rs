use std::time::Duration;

/// Caps how often a frame's simulation and rendering work runs.
///
/// The host still calls `tick` on every display refresh. Frames arriving
/// sooner than the target interval after the last executed one are skipped.
#[derive(Debug, Clone)]
pub struct FramePacer {
    interval: Duration,
    last_executed: Option<Duration>,
}

impl FramePacer {
    /// A non-positive `target_fps` disables the cap.
    pub fn new(target_fps: f32) -> Self {
        let interval = if target_fps.is_finite() && target_fps > 0.0 {
            Duration::from_secs_f32(1.0 / target_fps)
        } else {
            Duration::ZERO
        };
        Self {
            interval,
            last_executed: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether a frame at host time `now` should run. Running frames become
    /// the new reference point.
    pub fn should_run(&mut self, now: Duration) -> bool {
        if let Some(last) = self.last_executed {
            if now.saturating_sub(last) < self.interval {
                return false;
            }
        }
        self.last_executed = Some(now);
        true
    }

    pub fn reset(&mut self) {
        self.last_executed = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_frame_always_runs() {
        let mut pacer = FramePacer::new(35.0);
        assert!(pacer.should_run(Duration::from_millis(3)));
    }

    #[test]
    fn test_frames_inside_interval_skipped() {
        let mut pacer = FramePacer::new(35.0);
        let ms = Duration::from_millis;
        assert!(pacer.should_run(ms(0)));
        assert!(!pacer.should_run(ms(16)));
        assert!(pacer.should_run(ms(33)));
        assert!(!pacer.should_run(ms(50)));
        assert!(pacer.should_run(ms(66)));
    }

    #[test]
    fn test_uncapped() {
        let mut pacer = FramePacer::new(0.0);
        assert_eq!(pacer.interval(), Duration::ZERO);
        assert!(pacer.should_run(Duration::ZERO));
        assert!(pacer.should_run(Duration::ZERO));
    }
}
