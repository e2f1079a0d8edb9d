use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;

/// Point-in-time view of the frame-rate statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MetricsSnapshot {
    /// `1 / latency` of the most recent frame.
    pub instant_fps: f64,
    /// Frames in the window divided by their summed latency.
    pub average_fps: f64,
    pub last_latency_ms: f64,
    pub average_latency_ms: f64,
    /// Frames recorded since the last reset.
    pub frame_count: u64,
}

struct MetricsState {
    window: VecDeque<Duration>,
    window_sum: Duration,
    frame_count: u64,
    total_latency: Duration,
    started_at: Instant,
}

/// Rolling latency/FPS statistics over a fixed-capacity FIFO window.
///
/// `record` is called by the frame loop; `snapshot` reads the last published
/// value and never waits on the recorder.
pub struct MetricsAggregator {
    capacity: usize,
    state: Mutex<MetricsState>,
    published: ArcSwap<MetricsSnapshot>,
}

impl MetricsAggregator {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            state: Mutex::new(MetricsState {
                window: VecDeque::with_capacity(capacity),
                window_sum: Duration::ZERO,
                frame_count: 0,
                total_latency: Duration::ZERO,
                started_at: Instant::now(),
            }),
            published: ArcSwap::from_pointee(MetricsSnapshot::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn record(&self, latency: Duration) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());

        if state.window.len() == self.capacity {
            if let Some(evicted) = state.window.pop_front() {
                state.window_sum -= evicted;
            }
        }
        state.window.push_back(latency);
        state.window_sum += latency;
        state.frame_count += 1;
        state.total_latency += latency;

        let latency_s = latency.as_secs_f64();
        let sum_s = state.window_sum.as_secs_f64();
        let n = state.window.len() as f64;

        let snapshot = MetricsSnapshot {
            instant_fps: if latency_s > 0.0 { 1.0 / latency_s } else { 0.0 },
            average_fps: if sum_s > 0.0 { n / sum_s } else { 0.0 },
            last_latency_ms: latency_s * 1000.0,
            average_latency_ms: sum_s * 1000.0 / n,
            frame_count: state.frame_count,
        };
        self.published.store(Arc::new(snapshot));
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        **self.published.load()
    }

    /// Clears the window and counters, e.g. at the start of a run.
    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.window.clear();
        state.window_sum = Duration::ZERO;
        state.frame_count = 0;
        state.total_latency = Duration::ZERO;
        state.started_at = Instant::now();
        self.published.store(Arc::new(MetricsSnapshot::default()));
    }

    /// Returns an end-of-run summary, or `None` if nothing was recorded.
    pub fn summary_string(&self) -> Option<String> {
        let state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        if state.frame_count == 0 {
            return None;
        }

        let elapsed_s = state.started_at.elapsed().as_secs_f64();
        let frames = state.frame_count;
        let avg_ms = state.total_latency.as_secs_f64() * 1000.0 / frames as f64;

        let mut lines = vec![format!("Run summary ({frames} frames, {elapsed_s:.1}s total):")];
        lines.push(format!("  latency   : avg {avg_ms:6.1}ms"));
        if elapsed_s > 0.0 {
            let fps = frames as f64 / elapsed_s;
            lines.push(format!("  Throughput: {fps:.1} fps"));
        }
        Some(lines.join("\n"))
    }
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new(crate::shared::constants::DEFAULT_METRICS_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_empty_snapshot_is_zero() {
        let m = MetricsAggregator::new(5);
        assert_eq!(m.snapshot(), MetricsSnapshot::default());
        assert!(m.summary_string().is_none());
    }

    #[test]
    fn test_single_sample() {
        let m = MetricsAggregator::new(5);
        m.record(ms(20));
        let s = m.snapshot();
        assert_relative_eq!(s.instant_fps, 50.0, epsilon = 1e-9);
        assert_relative_eq!(s.average_fps, 50.0, epsilon = 1e-9);
        assert_relative_eq!(s.average_latency_ms, 20.0, epsilon = 1e-9);
        assert_eq!(s.frame_count, 1);
    }

    #[test]
    fn test_rolling_average_over_window() {
        let m = MetricsAggregator::new(4);
        for v in [10, 20, 30, 40] {
            m.record(ms(v));
        }
        let s = m.snapshot();
        // 4 frames in 100ms
        assert_relative_eq!(s.average_fps, 40.0, epsilon = 1e-9);
        assert_relative_eq!(s.average_latency_ms, 25.0, epsilon = 1e-9);
        assert_relative_eq!(s.instant_fps, 25.0, epsilon = 1e-9);
        assert_relative_eq!(s.last_latency_ms, 40.0, epsilon = 1e-9);
    }

    #[test]
    fn test_oldest_sample_evicted_first() {
        let m = MetricsAggregator::new(2);
        m.record(ms(100));
        m.record(ms(10));
        m.record(ms(30));
        // window holds [10, 30]
        let s = m.snapshot();
        assert_relative_eq!(s.average_latency_ms, 20.0, epsilon = 1e-9);
        assert_relative_eq!(s.average_fps, 50.0, epsilon = 1e-9);
        assert_eq!(s.frame_count, 3);
    }

    #[rstest]
    #[case(0)]
    #[case(1)]
    fn test_minimum_capacity_is_one(#[case] capacity: usize) {
        let m = MetricsAggregator::new(capacity);
        assert_eq!(m.capacity(), 1);
        m.record(ms(10));
        m.record(ms(50));
        assert_relative_eq!(m.snapshot().average_latency_ms, 50.0, epsilon = 1e-9);
    }

    #[test]
    fn test_zero_latency_does_not_divide_by_zero() {
        let m = MetricsAggregator::new(3);
        m.record(Duration::ZERO);
        let s = m.snapshot();
        assert_eq!(s.instant_fps, 0.0);
        assert_eq!(s.average_fps, 0.0);
        assert_eq!(s.average_latency_ms, 0.0);
    }

    #[test]
    fn test_reset_clears_state() {
        let m = MetricsAggregator::new(3);
        m.record(ms(10));
        m.reset();
        assert_eq!(m.snapshot(), MetricsSnapshot::default());
        assert!(m.summary_string().is_none());
    }

    #[test]
    fn test_summary_mentions_frames_and_throughput() {
        let m = MetricsAggregator::new(3);
        m.record(ms(10));
        m.record(ms(30));
        std::thread::sleep(ms(5));
        let summary = m.summary_string().unwrap();
        assert!(summary.contains("2 frames"));
        assert!(summary.contains("avg   20.0ms"));
        assert!(summary.contains("fps"));
    }
}
