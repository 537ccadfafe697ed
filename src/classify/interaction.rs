use crate::config::ClassifierSettings;
use crate::detect::Detection;
use crate::{DetectionEvent, EventType, Severity};

use super::FrameContext;

/// Side length (px) of a "unit" person used to scale the proximity gate.
const SIZE_NORMALIZER: f32 = 50.0;
/// Pixels per unit of `fight_proximity_threshold`.
const PROXIMITY_SCALE: f32 = 30.0;
/// Distance at which the proximity score reaches zero.
const DISTANCE_SCALE: f32 = 100.0;

const DISTANCE_WEIGHT: f32 = 0.5;
const SIZE_WEIGHT: f32 = 0.2;
const CONFIDENCE_WEIGHT: f32 = 0.3;

const MIN_INTERACTION_SCORE: f32 = 0.6;
const MAX_CONFIDENCE: f32 = 0.85;

/// Scans unordered pairs for close, similar-sized, confidently detected people.
///
/// For each first element the inner scan stops at the first pair that raises an
/// event, then moves on. A frame can therefore raise more than one fight.
pub fn detect_fights(
    detections: &[Detection],
    ctx: &FrameContext<'_>,
    settings: &ClassifierSettings,
) -> Vec<DetectionEvent> {
    let mut events = Vec::new();

    for (i, a) in detections.iter().enumerate() {
        for b in &detections[i + 1..] {
            if !within_interaction_range(a, b, settings.fight_proximity_threshold) {
                continue;
            }
            let score = interaction_score(a, b);
            if score > MIN_INTERACTION_SCORE {
                let mean_confidence = (a.confidence + b.confidence) / 2.0;
                events.push(
                    DetectionEvent::new(EventType::Fight, Severity::High, ctx)
                        .with_confidence(MAX_CONFIDENCE.min(mean_confidence))
                        .with_people(2, vec![a.bbox, b.bbox])
                        .with_description(format!(
                            "Potential fight detected (interaction score: {:.2})",
                            score
                        )),
                );
                break;
            }
        }
    }

    events
}

/// Proximity gate scaled by the pair's average size.
pub fn within_interaction_range(a: &Detection, b: &Detection, proximity_threshold: f32) -> bool {
    let avg_area = (a.area + b.area) / 2.0;
    let size_factor = avg_area.max(0.0).sqrt() / SIZE_NORMALIZER;
    let threshold = size_factor * proximity_threshold * PROXIMITY_SCALE;
    a.center.distance_to(&b.center) < threshold
}

/// Weighted blend of closeness, size similarity and detector confidence.
pub fn interaction_score(a: &Detection, b: &Detection) -> f32 {
    let distance = a.center.distance_to(&b.center);
    let distance_score = (1.0 - distance / DISTANCE_SCALE).max(0.0);

    let larger = a.area.max(b.area);
    let size_score = if larger > 0.0 {
        1.0 - (a.area - b.area).abs() / larger
    } else {
        0.0
    };

    let confidence_score = (a.confidence + b.confidence) / 2.0;

    distance_score * DISTANCE_WEIGHT
        + size_score * SIZE_WEIGHT
        + confidence_score * CONFIDENCE_WEIGHT
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::detect::FrameDimensions;

    #[test]
    fn close_similar_pair_is_a_fight() {
        let a = person_at(200.0, 200.0, 50.0, 100.0, 0.8);
        let b = person_at(215.0, 200.0, 50.0, 100.0, 0.75);
        let events = detect_fights(
            &[a, b],
            &ctx(FrameDimensions::default()),
            &ClassifierSettings::default(),
        );
        assert_eq!(events.len(), 1);
        let ev = &events[0];
        assert_eq!(ev.person_count, 2);
        assert_eq!(ev.severity, Severity::High);
        assert_eq!(ev.bounding_boxes.len(), 2);
        assert!((ev.confidence - 0.775).abs() < 1e-6);
    }

    #[test]
    fn confidence_is_capped() {
        let a = person_at(200.0, 200.0, 50.0, 100.0, 0.95);
        let b = person_at(210.0, 200.0, 50.0, 100.0, 0.95);
        let events = detect_fights(
            &[a, b],
            &ctx(FrameDimensions::default()),
            &ClassifierSettings::default(),
        );
        assert_eq!(events[0].confidence, 0.85);
    }

    #[test]
    fn distant_pair_is_ignored() {
        let a = person_at(100.0, 200.0, 50.0, 100.0, 0.9);
        let b = person_at(400.0, 200.0, 50.0, 100.0, 0.9);
        assert!(!within_interaction_range(&a, &b, 1.5));
        assert!(detect_fights(
            &[a, b],
            &ctx(FrameDimensions::default()),
            &ClassifierSettings::default()
        )
        .is_empty());
    }

    #[test]
    fn score_does_not_increase_with_distance() {
        let a = person_at(200.0, 200.0, 50.0, 100.0, 0.8);
        let mut previous = f32::INFINITY;
        for step in 0..40 {
            let b = person_at(200.0 + step as f32 * 5.0, 200.0, 50.0, 100.0, 0.8);
            let score = interaction_score(&a, &b);
            assert!(score <= previous);
            previous = score;
        }
    }

    #[test]
    fn low_score_pair_in_range_is_not_a_fight() {
        // Large boxes widen the proximity gate, but 90px apart with low confidence
        // and mismatched sizes keeps the score under 0.6.
        let a = person_at(200.0, 200.0, 150.0, 300.0, 0.3);
        let b = person_at(290.0, 200.0, 80.0, 160.0, 0.3);
        assert!(within_interaction_range(&a, &b, 1.5));
        assert!(interaction_score(&a, &b) <= 0.6);
        assert!(detect_fights(
            &[a, b],
            &ctx(FrameDimensions::default()),
            &ClassifierSettings::default()
        )
        .is_empty());
    }

    #[test]
    fn separate_pairs_can_each_raise_a_fight() {
        let dets = vec![
            person_at(100.0, 200.0, 50.0, 100.0, 0.8),
            person_at(110.0, 200.0, 50.0, 100.0, 0.8),
            person_at(500.0, 200.0, 50.0, 100.0, 0.8),
            person_at(510.0, 200.0, 50.0, 100.0, 0.8),
        ];
        let events = detect_fights(
            &dets,
            &ctx(FrameDimensions::default()),
            &ClassifierSettings::default(),
        );
        // (0,1) from the first outer pass, (2,3) from the third.
        assert_eq!(events.len(), 2);
    }
}
