//! Stream orchestrator.
//!
//! `Pipeline` owns the per-stream state (tracker, history, performance
//! monitor, cooldown gate) and drives the frame loop:
//!
//! ```text
//! Idle -> Running -> Stopping -> Stopped
//!   \___________________________/  (source failed to open)
//! ```
//!
//! Alert delivery runs on a `DispatchWorker` thread so retries never stall
//! frame ingestion. A stop request is observed between frames and during
//! reconnect backoff.

use anyhow::{anyhow, bail, Result};
use chrono::Utc;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::alert::{build_sink, AlertDispatcher, AlertSink, DispatchWorker};
use crate::classify::{classify_frame, FrameContext};
use crate::config::SafezoneConfig;
use crate::detect::normalize_detections;
use crate::ingest::{DetectionSource, SourceFrame};
use crate::perf::{PerformanceMonitor, PerformanceSnapshot};
use crate::tracker::{DetectionHistory, FrameRecord, HistoryEntry, TemporalTracker};
use crate::DetectionEvent;

/// Poll slice used while waiting on the stop flag.
const STOP_POLL: Duration = Duration::from_millis(50);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PipelineState::Idle => "idle",
            PipelineState::Running => "running",
            PipelineState::Stopping => "stopping",
            PipelineState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Cloneable stop request shared with signal handlers and other threads.
#[derive(Clone, Debug, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Sleeps up to `timeout`, returning early (and `true`) once a stop is requested.
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_requested() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            std::thread::sleep(STOP_POLL.min(deadline - now));
        }
    }
}

/// Totals for one `run`.
#[derive(Clone, Debug, Default, Serialize)]
pub struct RunSummary {
    pub frames_read: u64,
    pub frames_processed: u64,
    pub frames_skipped: u64,
    pub frames_rejected: u64,
    pub events_detected: u64,
    pub alerts_enqueued: u64,
    pub alerts_suppressed: u64,
    /// Admitted alerts that exhausted their retries.
    pub alerts_failed: u64,
    /// Admitted alerts still queued when the run stopped.
    pub alerts_dropped: u64,
    pub reconnects: u64,
    pub performance: PerformanceSnapshot,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum StopReason {
    EndOfStream,
    Requested,
}

pub struct Pipeline {
    config: SafezoneConfig,
    state: PipelineState,
    tracker: TemporalTracker,
    history: DetectionHistory,
    monitor: PerformanceMonitor,
    dispatcher: Arc<AlertDispatcher>,
    stop: ShutdownFlag,
    frame_number: u64,
}

impl Pipeline {
    pub fn new(config: SafezoneConfig, sink: Arc<dyn AlertSink>) -> Result<Self> {
        config.validate()?;
        let dispatcher = Arc::new(AlertDispatcher::from_settings(sink, &config.alerts));
        let monitor = PerformanceMonitor::with_alert_counter(
            config.source.stats_interval,
            dispatcher.dispatched_counter(),
        );
        Ok(Self {
            tracker: TemporalTracker::new(config.tracker.frame_buffer_size),
            history: DetectionHistory::new(config.tracker.history_size),
            monitor,
            dispatcher,
            stop: ShutdownFlag::new(),
            frame_number: 0,
            state: PipelineState::Idle,
            config,
        })
    }

    /// Pipeline with the sink the alert settings call for.
    pub fn from_config(config: SafezoneConfig) -> Result<Self> {
        let sink = build_sink(&config.alerts)?;
        Self::new(config, sink)
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn config(&self) -> &SafezoneConfig {
        &self.config
    }

    /// Handle that stops `run` from another thread.
    pub fn stop_handle(&self) -> ShutdownFlag {
        self.stop.clone()
    }

    pub fn tracker(&self) -> &TemporalTracker {
        &self.tracker
    }

    pub fn history(&self) -> &DetectionHistory {
        &self.history
    }

    pub fn dispatcher(&self) -> &Arc<AlertDispatcher> {
        &self.dispatcher
    }

    /// Number of frames processed so far.
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    pub fn performance(&self) -> PerformanceSnapshot {
        self.monitor.snapshot()
    }

    /// Normalizes, tracks and classifies one frame.
    ///
    /// The frame is appended to the tracker before classification, so loitering
    /// sees it. A frame with a zero dimension is rejected and leaves all state
    /// untouched.
    pub fn process_frame(&mut self, frame: &SourceFrame) -> Result<Vec<DetectionEvent>> {
        let started = Instant::now();
        let dimensions = frame.dimensions;
        if dimensions.width == 0 || dimensions.height == 0 {
            bail!(
                "invalid frame dimensions {}x{}",
                dimensions.width,
                dimensions.height
            );
        }

        self.frame_number += 1;
        let timestamp = Utc::now();
        let detections = normalize_detections(&frame.detections, &self.config.detection);

        self.tracker.push(FrameRecord {
            frame_number: self.frame_number,
            timestamp,
            detections: detections.clone(),
        });

        let ctx = FrameContext {
            frame_number: self.frame_number,
            timestamp,
            dimensions,
            location: &self.config.alerts.location,
        };
        let events = classify_frame(&detections, &self.tracker, &ctx, &self.config.classifiers);

        for event in &events {
            log::info!(
                "{} detected: frame={} people={} conf={:.2} severity={}",
                event.event_type,
                event.frame_number,
                event.person_count,
                event.confidence,
                event.severity
            );
        }

        self.history.record(HistoryEntry {
            frame_number: self.frame_number,
            timestamp,
            person_count: detections.len(),
            events: events.iter().map(|e| e.event_type).collect(),
        });
        self.monitor.record_frame(started.elapsed(), detections.len());

        Ok(events)
    }

    /// Runs the frame loop until end of stream, a stop request, or an
    /// unrecoverable source failure.
    ///
    /// A pipeline runs once. Opening the source is the only fatal startup
    /// step; later read failures go through bounded reconnection.
    pub fn run(&mut self, source: &mut dyn DetectionSource) -> Result<RunSummary> {
        if self.state != PipelineState::Idle {
            bail!("pipeline already {}", self.state);
        }

        let description = source.describe();
        if let Err(e) = source.connect() {
            self.transition(PipelineState::Stopped);
            return Err(e.context(format!("failed to open source {}", description)));
        }
        let worker = match DispatchWorker::spawn(Arc::clone(&self.dispatcher)) {
            Ok(worker) => worker,
            Err(e) => {
                source.release();
                self.transition(PipelineState::Stopped);
                return Err(e);
            }
        };

        self.transition(PipelineState::Running);
        log::info!(
            "processing {} (frame_skip={}, location={})",
            description,
            self.config.source.frame_skip,
            self.config.alerts.location
        );

        let mut summary = RunSummary::default();
        let worker_stats = worker.stats_handle();
        let outcome = self.run_loop(source, &worker, &mut summary);

        self.transition(PipelineState::Stopping);
        let drained = match outcome {
            Ok(StopReason::EndOfStream) => {
                log::info!("{}: end of stream", description);
                worker.finish()
            }
            Ok(StopReason::Requested) => {
                log::info!("{}: stop requested", description);
                worker.shutdown()
            }
            Err(_) => worker.shutdown(),
        };
        source.release();
        self.transition(PipelineState::Stopped);

        summary.performance = self.monitor.snapshot();
        summary.alerts_failed = worker_stats.failed.load(Ordering::Relaxed);
        summary.alerts_dropped = worker_stats.dropped.load(Ordering::Relaxed);
        log::info!(
            "{}: {} frames processed, {} events, {} alerts delivered, {} failed, {} dropped",
            description,
            summary.frames_processed,
            summary.events_detected,
            summary.performance.alerts_sent,
            summary.alerts_failed,
            summary.alerts_dropped
        );

        outcome?;
        drained?;
        Ok(summary)
    }

    fn run_loop(
        &mut self,
        source: &mut dyn DetectionSource,
        worker: &DispatchWorker,
        summary: &mut RunSummary,
    ) -> Result<StopReason> {
        let frame_skip = u64::from(self.config.source.frame_skip.max(1));
        // Read failures since the last good frame. A source that reconnects
        // fine but never yields a frame must not loop forever.
        let mut failed_reads: u32 = 0;

        loop {
            if self.stop.is_requested() {
                return Ok(StopReason::Requested);
            }

            let frame = match source.next_frame() {
                Ok(Some(frame)) => {
                    failed_reads = 0;
                    frame
                }
                Ok(None) => return Ok(StopReason::EndOfStream),
                Err(e) => {
                    log::warn!("{}: read failed: {}", source.describe(), e);
                    failed_reads += 1;
                    if failed_reads > self.config.source.reconnect_attempts {
                        bail!(
                            "source {} failed {} consecutive reads across reconnects",
                            source.describe(),
                            failed_reads
                        );
                    }
                    if !self.reconnect(source)? {
                        return Ok(StopReason::Requested);
                    }
                    summary.reconnects += 1;
                    continue;
                }
            };

            summary.frames_read += 1;
            if (summary.frames_read - 1) % frame_skip != 0 {
                summary.frames_skipped += 1;
                continue;
            }

            let events = match self.process_frame(&frame) {
                Ok(events) => events,
                Err(e) => {
                    log::warn!("skipping frame {}: {}", summary.frames_read, e);
                    summary.frames_rejected += 1;
                    continue;
                }
            };
            summary.frames_processed += 1;
            summary.events_detected += events.len() as u64;

            for event in events {
                match self.dispatcher.admit(&event, Instant::now())? {
                    Some(permit) => {
                        worker.submit(event, permit)?;
                        summary.alerts_enqueued += 1;
                    }
                    None => summary.alerts_suppressed += 1,
                }
            }

            if self.monitor.maybe_report(Instant::now()).is_some() {
                let stats = source.stats();
                let latest_people = self.tracker.latest().map_or(0, |r| r.detections.len());
                log::info!(
                    "source health={} frames={} source={} buffered={} people={} avg={:.1}",
                    source.is_healthy(),
                    stats.frames_read,
                    stats.source,
                    self.tracker.len(),
                    latest_people,
                    self.history.average_person_count()
                );
            }
        }
    }

    /// Releases and reopens the source with a fixed backoff.
    ///
    /// Returns `Ok(false)` if a stop was requested while backing off.
    fn reconnect(&mut self, source: &mut dyn DetectionSource) -> Result<bool> {
        let attempts = self.config.source.reconnect_attempts;
        let delay = self.config.source.reconnect_delay;
        source.release();

        for attempt in 1..=attempts {
            if self.stop.wait(delay) {
                return Ok(false);
            }
            match source.connect() {
                Ok(()) => {
                    log::info!(
                        "{}: reconnected (attempt {}/{})",
                        source.describe(),
                        attempt,
                        attempts
                    );
                    return Ok(true);
                }
                Err(e) => log::warn!(
                    "{}: reconnect attempt {}/{} failed: {}",
                    source.describe(),
                    attempt,
                    attempts,
                    e
                ),
            }
        }

        Err(anyhow!(
            "source {} unavailable after {} reconnect attempts",
            source.describe(),
            attempts
        ))
    }

    fn transition(&mut self, next: PipelineState) {
        log::debug!("pipeline {} -> {}", self.state, next);
        self.state = next;
    }
}
