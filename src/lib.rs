//! SafeZone safety event engine.
//!
//! This crate turns per-frame person detections from an external detector into
//! deduplicated safety alerts.
//!
//! # Architecture
//!
//! Detections flow leaf-first through:
//!
//! 1. **Normalizer** (`detect`): keeps valid person boxes and derives geometry.
//! 2. **Temporal tracker** (`tracker`): bounded ring buffer of recent frames.
//! 3. **Classifiers** (`classify`): overcrowding, fall, fight and loitering
//!    heuristics over the current frame plus tracker history.
//! 4. **Cooldown gate + dispatcher** (`alert`): per-event-type deduplication and
//!    bounded-retry delivery on a worker thread.
//! 5. **Orchestrator** (`pipeline`): the frame loop, reconnection and shutdown.
//!
//! # Module Structure
//!
//! - `config`: file + environment configuration
//! - `ingest`: detection sources (synthetic `stub://`, JSON-lines replay)
//! - `perf`: EMA throughput and latency tracking
//! - Core types: `EventType`, `Severity`, `DetectionEvent`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod alert;
pub mod classify;
pub mod config;
pub mod detect;
pub mod ingest;
pub mod perf;
pub mod pipeline;
pub mod tracker;

pub use alert::{
    build_sink, AlertDispatcher, AlertPayload, AlertSink, CooldownGate, CooldownPermit, Delivery,
    DispatchOutcome, DispatchWorker, HttpAlertSink, LogAlertSink, RetryPolicy, WorkerStats,
};
pub use classify::{classify_frame, FrameContext};
pub use config::SafezoneConfig;
pub use detect::{normalize_detections, BoundingBox, Detection, FrameDimensions, RawDetection};
pub use ingest::{
    open_source, DetectionSource, ReplaySource, SourceFrame, SourceStats, SyntheticSource,
};
pub use perf::{PerformanceMonitor, PerformanceSnapshot};
pub use pipeline::{Pipeline, PipelineState, RunSummary, ShutdownFlag};
pub use tracker::{DetectionHistory, FrameRecord, HistoryEntry, TemporalTracker};

// -------------------- Event Types --------------------

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Overcrowding,
    Fall,
    Fight,
    Loitering,
}

impl EventType {
    pub const ALL: [EventType; 4] = [
        EventType::Overcrowding,
        EventType::Fall,
        EventType::Fight,
        EventType::Loitering,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Overcrowding => "overcrowding",
            EventType::Fall => "fall",
            EventType::Fight => "fight",
            EventType::Loitering => "loitering",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        };
        f.write_str(s)
    }
}

// -------------------- Events --------------------

/// Candidate safety event produced by a classifier.
///
/// Events are transient: they pass through the cooldown gate and dispatcher
/// and are never stored by this crate.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DetectionEvent {
    pub event_type: EventType,
    /// 0..=1
    pub confidence: f32,
    pub timestamp: DateTime<Utc>,
    pub frame_number: u64,
    pub person_count: usize,
    pub bounding_boxes: Vec<BoundingBox>,
    pub description: String,
    pub severity: Severity,
    pub location: String,
}

impl DetectionEvent {
    /// Starts an event with no people, no boxes and zero confidence.
    pub fn new(event_type: EventType, severity: Severity, ctx: &FrameContext<'_>) -> Self {
        Self {
            event_type,
            confidence: 0.0,
            timestamp: ctx.timestamp,
            frame_number: ctx.frame_number,
            person_count: 0,
            bounding_boxes: Vec::new(),
            description: String::new(),
            severity,
            location: ctx.location.to_string(),
        }
    }

    /// Sets the confidence, clipped to 0..=1.
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self
    }

    pub fn with_people(mut self, person_count: usize, boxes: Vec<BoundingBox>) -> Self {
        self.person_count = person_count;
        self.bounding_boxes = boxes;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Wire payload for the alert sink.
    pub fn payload(&self) -> AlertPayload {
        AlertPayload::from(self)
    }
}
