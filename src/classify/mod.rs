//! Safety event classifiers.
//!
//! Every classifier is a pure function of the current frame's detections, the
//! frame context and (for loitering) a read-only view of the temporal tracker.
//! None of them keep state between calls.

mod fall;
mod interaction;
mod loitering;
mod overcrowding;

use chrono::{DateTime, Utc};

use crate::config::ClassifierSettings;
use crate::detect::{Detection, FrameDimensions};
use crate::tracker::TemporalTracker;
use crate::DetectionEvent;

pub use fall::detect_falls;
pub use interaction::{detect_fights, interaction_score, within_interaction_range};
pub use loitering::{detect_loitering, is_loitering};
pub use overcrowding::{crowd_density, detect_overcrowding};

/// Per-frame facts stamped onto every event raised for that frame.
#[derive(Clone, Copy, Debug)]
pub struct FrameContext<'a> {
    pub frame_number: u64,
    pub timestamp: DateTime<Utc>,
    pub dimensions: FrameDimensions,
    pub location: &'a str,
}

/// Runs all classifiers in a fixed order: overcrowding, fall, fight, loitering.
///
/// `history` must already contain the current frame.
pub fn classify_frame(
    detections: &[Detection],
    history: &TemporalTracker,
    ctx: &FrameContext<'_>,
    settings: &ClassifierSettings,
) -> Vec<DetectionEvent> {
    let mut events = Vec::new();
    events.extend(detect_overcrowding(detections, ctx, settings));
    events.extend(detect_falls(detections, ctx, settings));
    events.extend(detect_fights(detections, ctx, settings));
    events.extend(detect_loitering(detections, history, ctx, settings));
    events
}
