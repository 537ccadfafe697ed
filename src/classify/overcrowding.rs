use crate::config::ClassifierSettings;
use crate::detect::{Detection, Point};
use crate::{DetectionEvent, EventType, Severity};

use super::FrameContext;

/// Average pairwise distance at which density reaches zero.
const DENSITY_DISTANCE_SCALE: f32 = 200.0;
const BASE_CONFIDENCE: f32 = 0.7;
const DENSITY_WEIGHT: f32 = 0.25;
const MAX_CONFIDENCE: f32 = 0.95;
const HIGH_SEVERITY_FACTOR: f32 = 1.5;

/// Raises at most one overcrowding event when the head count reaches the threshold.
pub fn detect_overcrowding(
    detections: &[Detection],
    ctx: &FrameContext<'_>,
    settings: &ClassifierSettings,
) -> Option<DetectionEvent> {
    let count = detections.len();
    if count < settings.crowd_threshold {
        return None;
    }

    let centers: Vec<Point> = detections.iter().map(|d| d.center).collect();
    let density = crowd_density(&centers);
    let severity = if count as f32 > settings.crowd_threshold as f32 * HIGH_SEVERITY_FACTOR {
        Severity::High
    } else {
        Severity::Medium
    };

    Some(
        DetectionEvent::new(EventType::Overcrowding, severity, ctx)
            .with_confidence(MAX_CONFIDENCE.min(BASE_CONFIDENCE + density * DENSITY_WEIGHT))
            .with_people(count, detections.iter().map(|d| d.bbox).collect())
            .with_description(format!(
                "Overcrowding detected: {} people (density: {:.2})",
                count, density
            )),
    )
}

/// Inverse of the mean pairwise center distance, scaled into `0..=1`.
///
/// Zero when fewer than two centers are given.
pub fn crowd_density(centers: &[Point]) -> f32 {
    if centers.len() < 2 {
        return 0.0;
    }

    let mut total = 0.0f32;
    let mut pairs = 0u32;
    for (i, a) in centers.iter().enumerate() {
        for b in &centers[i + 1..] {
            total += a.distance_to(b);
            pairs += 1;
        }
    }
    let avg_distance = total / pairs as f32;
    (1.0 - avg_distance / DENSITY_DISTANCE_SCALE).clamp(0.0, 1.0)
}
