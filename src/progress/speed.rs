//! Smoothed throughput and ETA.
//!
//! Samples closer together than [`SpeedEstimator::MIN_INTERVAL`] are ignored
//! so that bursts of small chunks do not produce spikes; accepted samples are
//! folded into an exponential moving average.

use std::time::{Duration, Instant};

/// Exponential-moving-average throughput estimator.
#[derive(Debug, Clone, Default)]
pub struct SpeedEstimator {
    last_sample_time: Option<Instant>,
    last_sample_bytes: u64,
    speed: f64,
}

impl SpeedEstimator {
    /// Minimum time between two accepted samples.
    pub const MIN_INTERVAL: Duration = Duration::from_millis(500);
    /// Weight of the newest instantaneous rate.
    pub const ALPHA: f64 = 0.7;

    /// Creates an estimator with no samples.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current smoothed speed in bytes per second.
    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Feed the byte counter observed at `now`; returns the smoothed speed.
    ///
    /// The first sample only sets the baseline. A counter lower than the
    /// previous sample (a new item started) rebases without touching speed.
    pub fn sample(&mut self, bytes: u64, now: Instant) -> f64 {
        let Some(last_time) = self.last_sample_time else {
            self.rebase(bytes, now);
            return self.speed;
        };
        if bytes < self.last_sample_bytes {
            self.rebase(bytes, now);
            return self.speed;
        }

        let elapsed = now.saturating_duration_since(last_time);
        if elapsed < Self::MIN_INTERVAL {
            return self.speed;
        }

        let instant = (bytes - self.last_sample_bytes) as f64 / elapsed.as_secs_f64();
        self.speed = if self.speed == 0.0 {
            instant
        } else {
            Self::ALPHA * instant + (1.0 - Self::ALPHA) * self.speed
        };
        self.rebase(bytes, now);
        self.speed
    }

    /// Estimated time left, `None` without a total or a positive speed.
    pub fn eta(&self, downloaded: u64, total: Option<u64>) -> Option<Duration> {
        let total = total?;
        if self.speed <= 0.0 {
            return None;
        }
        let remaining = total.saturating_sub(downloaded) as f64;
        Some(Duration::from_secs_f64(remaining / self.speed))
    }

    /// Forget all samples.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn rebase(&mut self, bytes: u64, now: Instant) {
        self.last_sample_time = Some(now);
        self.last_sample_bytes = bytes;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_sample_is_baseline() {
        let mut est = SpeedEstimator::new();
        let t0 = Instant::now();
        assert_eq!(est.sample(400, t0), 0.0);
        assert_eq!(est.eta(400, Some(1000)), None);
    }

    #[test]
    fn test_samples_inside_interval_are_ignored() {
        let mut est = SpeedEstimator::new();
        let t0 = Instant::now();
        est.sample(0, t0);
        assert_eq!(est.sample(10_000, t0 + Duration::from_millis(100)), 0.0);
        // The ignored sample does not move the baseline.
        let speed = est.sample(1_000, t0 + Duration::from_secs(1));
        assert!((speed - 1_000.0).abs() < 1e-6);
    }

    #[test]
    fn test_moving_average() {
        let mut est = SpeedEstimator::new();
        let t0 = Instant::now();
        est.sample(0, t0);
        est.sample(1_000, t0 + Duration::from_secs(1));
        let speed = est.sample(4_000, t0 + Duration::from_secs(2));
        // 0.7 * 3000 + 0.3 * 1000
        assert!((speed - 2_400.0).abs() < 1e-6);
    }

    #[test]
    fn test_eta() {
        let mut est = SpeedEstimator::new();
        let t0 = Instant::now();
        est.sample(0, t0);
        est.sample(500, t0 + Duration::from_secs(1));
        assert_eq!(est.eta(500, Some(1_500)), Some(Duration::from_secs(2)));
        assert_eq!(est.eta(500, None), None);
    }

    #[test]
    fn test_counter_going_backwards_rebases() {
        let mut est = SpeedEstimator::new();
        let t0 = Instant::now();
        est.sample(0, t0);
        est.sample(1_000, t0 + Duration::from_secs(1));
        let kept = est.sample(10, t0 + Duration::from_secs(2));
        assert!((kept - 1_000.0).abs() < 1e-6);
        let next = est.sample(1_010, t0 + Duration::from_secs(3));
        assert!((next - 1_000.0).abs() < 1e-6);
    }
}
