//! Throughput and latency tracking for the frame loop.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Smoothing factor for both moving averages.
const EMA_ALPHA: f64 = 0.1;

/// Point-in-time view of pipeline performance.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PerformanceSnapshot {
    pub fps: f64,
    pub avg_processing_time_ms: f64,
    pub total_detections: u64,
    pub frames_processed: u64,
    pub alerts_sent: u64,
}

/// Exponential moving averages of FPS and per-frame processing time.
///
/// Purely informational; nothing in the pipeline branches on these numbers.
pub struct PerformanceMonitor {
    fps: f64,
    avg_processing_secs: f64,
    total_detections: u64,
    frames_processed: u64,
    alerts_sent: Arc<AtomicU64>,
    report_interval: Duration,
    last_report: Instant,
}

impl PerformanceMonitor {
    pub fn new(report_interval: Duration) -> Self {
        Self::with_alert_counter(report_interval, Arc::new(AtomicU64::new(0)))
    }

    /// Monitor that reads delivered-alert totals from a shared counter.
    pub fn with_alert_counter(report_interval: Duration, alerts_sent: Arc<AtomicU64>) -> Self {
        Self {
            fps: 0.0,
            avg_processing_secs: 0.0,
            total_detections: 0,
            frames_processed: 0,
            alerts_sent,
            report_interval,
            last_report: Instant::now(),
        }
    }

    /// Folds one processed frame into the averages.
    ///
    /// A zero processing time leaves the FPS average untouched.
    pub fn record_frame(&mut self, processing_time: Duration, detections: usize) {
        let secs = processing_time.as_secs_f64();
        if secs > 0.0 {
            let instant_fps = 1.0 / secs;
            self.fps = EMA_ALPHA * instant_fps + (1.0 - EMA_ALPHA) * self.fps;
        }
        self.avg_processing_secs = EMA_ALPHA * secs + (1.0 - EMA_ALPHA) * self.avg_processing_secs;
        self.total_detections += detections as u64;
        self.frames_processed += 1;
    }

    pub fn snapshot(&self) -> PerformanceSnapshot {
        PerformanceSnapshot {
            fps: self.fps,
            avg_processing_time_ms: self.avg_processing_secs * 1000.0,
            total_detections: self.total_detections,
            frames_processed: self.frames_processed,
            alerts_sent: self.alerts_sent.load(Ordering::Relaxed),
        }
    }

    /// Logs a snapshot if the report interval has elapsed since the last one.
    pub fn maybe_report(&mut self, now: Instant) -> Option<PerformanceSnapshot> {
        if now.saturating_duration_since(self.last_report) < self.report_interval {
            return None;
        }
        self.last_report = now;
        let snapshot = self.snapshot();
        log::info!(
            "performance: fps={:.1} avg_processing={:.1}ms frames={} detections={} alerts={}",
            snapshot.fps,
            snapshot.avg_processing_time_ms,
            snapshot.frames_processed,
            snapshot.total_detections,
            snapshot.alerts_sent
        );
        Some(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> PerformanceMonitor {
        PerformanceMonitor::new(Duration::from_secs(30))
    }

    #[test]
    fn ema_moves_a_tenth_of_the_way() {
        let mut m = monitor();
        m.record_frame(Duration::from_millis(100), 3);
        let s = m.snapshot();
        assert!((s.fps - 1.0).abs() < 1e-9);
        assert!((s.avg_processing_time_ms - 10.0).abs() < 1e-9);

        m.record_frame(Duration::from_millis(100), 2);
        let s = m.snapshot();
        assert!((s.fps - 1.9).abs() < 1e-9);
        assert_eq!(s.total_detections, 5);
        assert_eq!(s.frames_processed, 2);
    }

    #[test]
    fn zero_processing_time_skips_fps() {
        let mut m = monitor();
        m.record_frame(Duration::from_millis(50), 1);
        let fps = m.snapshot().fps;
        m.record_frame(Duration::ZERO, 1);
        let s = m.snapshot();
        assert_eq!(s.fps, fps);
        assert_eq!(s.frames_processed, 2);
        assert!(s.fps.is_finite());
    }

    #[test]
    fn reports_once_per_interval() {
        let mut m = monitor();
        let start = Instant::now();
        assert!(m.maybe_report(start).is_none());
        assert!(m.maybe_report(start + Duration::from_secs(31)).is_some());
        assert!(m.maybe_report(start + Duration::from_secs(40)).is_none());
        assert!(m.maybe_report(start + Duration::from_secs(62)).is_some());
    }

    #[test]
    fn alert_counter_is_shared() {
        let counter = Arc::new(AtomicU64::new(0));
        let m = PerformanceMonitor::with_alert_counter(Duration::from_secs(30), counter.clone());
        counter.fetch_add(4, Ordering::Relaxed);
        assert_eq!(m.snapshot().alerts_sent, 4);
    }

    #[test]
    fn snapshot_serializes() {
        let value = serde_json::to_value(monitor().snapshot()).unwrap();
        assert_eq!(value["frames_processed"], 0);
        assert!(value.get("avg_processing_time_ms").is_some());
    }
}
