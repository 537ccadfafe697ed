use crate::config::ClassifierSettings;
use crate::detect::Detection;
use crate::tracker::TemporalTracker;
use crate::{DetectionEvent, EventType, Severity};

use super::FrameContext;

const LOITERING_CONFIDENCE: f32 = 0.7;

/// Flags people who have stayed put across most of the recent window.
///
/// Silent until the tracker holds `loiter_min_frames` frames.
pub fn detect_loitering(
    detections: &[Detection],
    history: &TemporalTracker,
    ctx: &FrameContext<'_>,
    settings: &ClassifierSettings,
) -> Vec<DetectionEvent> {
    if history.len() < settings.loiter_min_frames {
        return Vec::new();
    }

    detections
        .iter()
        .filter(|det| is_loitering(det, history, settings))
        .map(|det| {
            DetectionEvent::new(EventType::Loitering, Severity::Low, ctx)
                .with_confidence(LOITERING_CONFIDENCE)
                .with_people(1, vec![det.bbox])
                .with_description("Suspicious loitering behavior detected")
        })
        .collect()
}

/// Counts recent frames holding a detection within `movement_threshold` of `det`.
///
/// Each frame contributes at most one match.
pub fn is_loitering(
    det: &Detection,
    history: &TemporalTracker,
    settings: &ClassifierSettings,
) -> bool {
    let matches = history
        .recent(settings.loiter_window)
        .filter(|frame| {
            frame
                .detections
                .iter()
                .any(|past| past.center.distance_to(&det.center) < settings.movement_threshold)
        })
        .count();
    matches >= settings.loiter_min_matches
}
