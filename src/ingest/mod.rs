//! Detection ingestion sources.
//!
//! A source yields one `SourceFrame` per video frame: the frame dimensions plus
//! the raw detector output for that frame. Sources available:
//! - `stub://<name>`: synthetic scripted scene, deterministic per name
//! - `file://<path>` or any path ending in `.jsonl`: replay of recorded
//!   detector output, one JSON object per line
//!
//! Sources are opened lazily: `open_source` only parses the URL, and the
//! pipeline calls `connect` before the first read and again on reconnect.

mod replay;
mod stub;

use anyhow::{anyhow, Result};

use crate::detect::{FrameDimensions, RawDetection};

pub use replay::ReplaySource;
pub use stub::SyntheticSource;

/// One frame's worth of detector output.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SourceFrame {
    pub dimensions: FrameDimensions,
    pub detections: Vec<RawDetection>,
}

impl SourceFrame {
    pub fn new(dimensions: FrameDimensions, detections: Vec<RawDetection>) -> Self {
        Self {
            dimensions,
            detections,
        }
    }
}

/// Statistics for a detection source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceStats {
    pub frames_read: u64,
    pub source: String,
}

/// A stream of per-frame detections.
///
/// `next_frame` returns `Ok(None)` at a clean end of stream. An `Err` is treated
/// as transient by the pipeline, which releases the source and reconnects.
pub trait DetectionSource: Send {
    /// Human-readable source identifier for logs.
    fn describe(&self) -> String;

    fn connect(&mut self) -> Result<()>;

    fn next_frame(&mut self) -> Result<Option<SourceFrame>>;

    /// Releases any underlying handle. Called before a reconnect and at stop.
    fn release(&mut self) {}

    fn is_healthy(&self) -> bool;

    fn stats(&self) -> SourceStats;
}

/// Builds the source named by `url` without connecting it.
pub fn open_source(url: &str) -> Result<Box<dyn DetectionSource>> {
    let url = url.trim();
    if url.is_empty() {
        return Err(anyhow!("source url is empty"));
    }
    if let Some(name) = url.strip_prefix("stub://") {
        return Ok(Box::new(SyntheticSource::new(name)));
    }
    if let Some(path) = url.strip_prefix("file://") {
        return Ok(Box::new(ReplaySource::new(path)));
    }
    if url.ends_with(".jsonl") {
        return Ok(Box::new(ReplaySource::new(url)));
    }
    Err(anyhow!(
        "unsupported source '{}': expected stub://<name>, file://<path> or a .jsonl path",
        url
    ))
}
