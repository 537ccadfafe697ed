use crate::config::ClassifierSettings;
use crate::detect::Detection;
use crate::{DetectionEvent, EventType, Severity};

use super::FrameContext;

const CONFIDENCE_BOOST: f32 = 0.1;
const MAX_CONFIDENCE: f32 = 0.9;

/// One event per wide box whose bottom edge sits in the ground band of the frame.
///
/// The ground band is everything below `fall_ground_fraction * frame height`.
pub fn detect_falls(
    detections: &[Detection],
    ctx: &FrameContext<'_>,
    settings: &ClassifierSettings,
) -> Vec<DetectionEvent> {
    let ground_line = ctx.dimensions.height as f32 * settings.fall_ground_fraction;

    detections
        .iter()
        .filter(|det| det.aspect_ratio > settings.fall_threshold && det.bbox.y2 > ground_line)
        .map(|det| {
            DetectionEvent::new(EventType::Fall, Severity::High, ctx)
                .with_confidence(MAX_CONFIDENCE.min(det.confidence + CONFIDENCE_BOOST))
                .with_people(1, vec![det.bbox])
                .with_description(format!(
                    "Person fall detected (aspect ratio: {:.2})",
                    det.aspect_ratio
                ))
        })
        .collect()
}
