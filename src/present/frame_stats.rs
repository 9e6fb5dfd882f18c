use std::collections::VecDeque;
use std::time::Duration;

use crate::constants::timing::{FRAME_HISTORY, STATS_LOG_INTERVAL};

/// Performance status
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PerformanceStatus {
    /// At or above the frame cap.
    Good,
    /// Above half the frame cap.
    Acceptable,
    Poor,
}

/// Rolling frame statistics for the presenter.
///
/// Intervals come from the host clock handed to `tick`, so the monitor
/// never reads a system clock itself.
#[derive(Debug, Clone)]
pub struct FrameStats {
    intervals: VecDeque<Duration>,
    history_size: usize,
    last_frame: Option<Duration>,
    executed: u64,
    skipped: u64,
    failed_passes: u64,
}

impl Default for FrameStats {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameStats {
    pub fn new() -> Self {
        Self {
            intervals: VecDeque::with_capacity(FRAME_HISTORY),
            history_size: FRAME_HISTORY,
            last_frame: None,
            executed: 0,
            skipped: 0,
            failed_passes: 0,
        }
    }

    /// Record an executed frame at host time `now`.
    pub fn record_frame(&mut self, now: Duration) {
        if let Some(last) = self.last_frame {
            self.intervals.push_back(now.saturating_sub(last));
            if self.intervals.len() > self.history_size {
                self.intervals.pop_front();
            }
        }
        self.last_frame = Some(now);
        self.executed += 1;
    }

    pub fn record_skip(&mut self) {
        self.skipped += 1;
    }

    pub fn record_failed_pass(&mut self) {
        self.failed_passes += 1;
    }

    pub fn executed_frames(&self) -> u64 {
        self.executed
    }

    pub fn skipped_frames(&self) -> u64 {
        self.skipped
    }

    pub fn failed_passes(&self) -> u64 {
        self.failed_passes
    }

    pub fn average_frame_ms(&self) -> Option<f32> {
        if self.intervals.is_empty() {
            return None;
        }
        let total: Duration = self.intervals.iter().sum();
        Some(total.as_secs_f32() * 1000.0 / self.intervals.len() as f32)
    }

    pub fn fps(&self) -> Option<f32> {
        self.average_frame_ms()
            .filter(|ms| *ms > 0.0)
            .map(|ms| 1000.0 / ms)
    }

    /// Status relative to the configured frame cap.
    pub fn status(&self, target_fps: f32) -> PerformanceStatus {
        match self.fps() {
            None => PerformanceStatus::Good,
            Some(fps) if fps >= target_fps * 0.95 => PerformanceStatus::Good,
            Some(fps) if fps >= target_fps * 0.5 => PerformanceStatus::Acceptable,
            Some(_) => PerformanceStatus::Poor,
        }
    }

    /// Whether this frame should emit the periodic statistics line.
    pub fn should_log(&self) -> bool {
        self.executed > 0 && self.executed % STATS_LOG_INTERVAL == 0
    }

    pub fn log_summary(&self, target_fps: f32) {
        log::debug!(
            "[FrameStats] {} frames ({} skipped, {} failed passes), {:.1} FPS avg, {:?}",
            self.executed,
            self.skipped,
            self.failed_passes,
            self.fps().unwrap_or(0.0),
            self.status(target_fps)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_average_from_intervals() {
        let mut stats = FrameStats::new();
        assert_eq!(stats.average_frame_ms(), None);

        for frame in 0..5u64 {
            stats.record_frame(Duration::from_millis(frame * 20));
        }
        assert_eq!(stats.executed_frames(), 5);
        assert!((stats.average_frame_ms().unwrap() - 20.0).abs() < 1e-3);
        assert!((stats.fps().unwrap() - 50.0).abs() < 1e-2);
        assert_eq!(stats.status(35.0), PerformanceStatus::Good);
        assert_eq!(stats.status(120.0), PerformanceStatus::Poor);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut stats = FrameStats::new();
        for frame in 0..(FRAME_HISTORY as u64 * 3) {
            stats.record_frame(Duration::from_millis(frame * 10));
        }
        assert_eq!(stats.intervals.len(), FRAME_HISTORY);
    }

    #[test]
    fn test_skips_counted_separately() {
        let mut stats = FrameStats::new();
        stats.record_skip();
        stats.record_skip();
        stats.record_frame(Duration::ZERO);
        assert_eq!(stats.skipped_frames(), 2);
        assert_eq!(stats.executed_frames(), 1);
    }
}
