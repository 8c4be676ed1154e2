//! Per-sensor sliding window

use std::collections::VecDeque;
use std::time::Duration;

use super::statistics::{linear_slope, mean};

const SECS_PER_HOUR: f64 = 3600.0;

/// One reading's contribution to the window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowSample {
    /// Monotonic receipt time
    pub at: Duration,
    pub displacement_mm: f64,
}

/// Bounded window of recent samples, oldest first
#[derive(Debug, Clone)]
pub struct AnalysisWindow {
    samples: VecDeque<WindowSample>,
    capacity: usize,
}

impl AnalysisWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Insert, dropping the oldest sample when full
    pub fn push(&mut self, sample: WindowSample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// Drop samples more than `horizon` older than `now`. Returns how many went.
    pub fn evict_older_than(&mut self, now: Duration, horizon: Duration) -> usize {
        let before = self.samples.len();
        self.samples.retain(|s| now.saturating_sub(s.at) <= horizon);
        before - self.samples.len()
    }

    /// Mean displacement of the newest `k` samples
    pub fn baseline(&self, k: usize) -> Option<f64> {
        let recent: Vec<f64> = self
            .samples
            .iter()
            .rev()
            .take(k)
            .map(|s| s.displacement_mm)
            .collect();
        mean(&recent)
    }

    /// Least-squares displacement trend in mm/hour
    pub fn trend_mm_per_hour(&self) -> Option<f64> {
        let origin = self.samples.front()?.at;
        let points: Vec<(f64, f64)> = self
            .samples
            .iter()
            .map(|s| (s.at.saturating_sub(origin).as_secs_f64() / SECS_PER_HOUR, s.displacement_mm))
            .collect();
        linear_slope(&points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(secs: u64, displacement_mm: f64) -> WindowSample {
        WindowSample {
            at: Duration::from_secs(secs),
            displacement_mm,
        }
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut window = AnalysisWindow::new(3);
        for i in 0..5 {
            window.push(sample(i, i as f64));
        }
        assert_eq!(window.len(), 3);
        assert_eq!(window.baseline(3), Some(3.0));
    }

    #[test]
    fn test_time_eviction() {
        let mut window = AnalysisWindow::new(10);
        window.push(sample(0, 0.0));
        window.push(sample(100, 0.0));
        window.push(sample(200, 0.0));

        assert_eq!(window.evict_older_than(Duration::from_secs(250), Duration::from_secs(150)), 1);
        assert_eq!(window.len(), 2);
    }

    #[test]
    fn test_baseline_uses_newest() {
        let mut window = AnalysisWindow::new(10);
        for (i, d) in [10.0, 1.0, 2.0, 3.0].into_iter().enumerate() {
            window.push(sample(i as u64, d));
        }
        assert_eq!(window.baseline(3), Some(2.0));
        assert_eq!(AnalysisWindow::new(4).baseline(3), None);
    }

    #[test]
    fn test_trend_per_hour() {
        let mut window = AnalysisWindow::new(10);
        window.push(sample(0, 1.0));
        window.push(sample(1800, 1.5));
        window.push(sample(3600, 2.0));
        assert!((window.trend_mm_per_hour().unwrap() - 1.0).abs() < 1e-9);
    }
}
