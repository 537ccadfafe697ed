//! Bounded temporal state.
//!
//! - `TemporalTracker`: fixed-capacity ring buffer of per-frame detections, read
//!   by the loitering classifier.
//! - `DetectionHistory`: fixed-capacity log of per-frame person counts and the
//!   event types raised, kept for observability only.
//!
//! Neither structure ever grows past the capacity chosen at construction. The
//! oldest entry is evicted first.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;

use crate::detect::Detection;
use crate::EventType;

/// One frame's detections as stored in the tracker.
#[derive(Clone, Debug)]
pub struct FrameRecord {
    pub frame_number: u64,
    pub timestamp: DateTime<Utc>,
    pub detections: Vec<Detection>,
}

// ----------------------------------------------------------------------------
// TemporalTracker
// ----------------------------------------------------------------------------

/// Rolling window of the most recent frames.
///
/// Single writer: the pipeline appends once per processed frame. Classifiers
/// only read.
pub struct TemporalTracker {
    buffer: VecDeque<FrameRecord>,
    capacity: usize,
}

impl TemporalTracker {
    /// Creates a tracker holding at most `capacity` frames (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends a frame, evicting the oldest when full.
    pub fn push(&mut self, record: FrameRecord) {
        if self.buffer.len() == self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(record);
    }

    /// The last `k` frames, oldest first. Yields fewer when fewer are buffered.
    pub fn recent(&self, k: usize) -> impl Iterator<Item = &FrameRecord> + '_ {
        let skip = self.buffer.len().saturating_sub(k);
        self.buffer.iter().skip(skip)
    }

    pub fn latest(&self) -> Option<&FrameRecord> {
        self.buffer.back()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

// ----------------------------------------------------------------------------
// DetectionHistory
// ----------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize)]
pub struct HistoryEntry {
    pub frame_number: u64,
    pub timestamp: DateTime<Utc>,
    pub person_count: usize,
    pub events: Vec<EventType>,
}

pub struct DetectionHistory {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl DetectionHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn record(&mut self, entry: HistoryEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> + '_ {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Mean person count across the retained window.
    pub fn average_person_count(&self) -> f32 {
        if self.entries.is_empty() {
            return 0.0;
        }
        let total: usize = self.entries.iter().map(|e| e.person_count).sum();
        total as f32 / self.entries.len() as f32
    }
}
