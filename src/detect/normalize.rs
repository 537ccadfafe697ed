use crate::config::DetectionSettings;

use super::result::{BoundingBox, Detection, RawDetection};

/// Filters raw detector output down to person boxes that pass the size gates.
///
/// Malformed entries (non-finite values, inverted boxes) are dropped the same
/// way as undersized ones. An empty result is a normal outcome.
pub fn normalize_detections(raw: &[RawDetection], settings: &DetectionSettings) -> Vec<Detection> {
    raw.iter()
        .filter(|det| det.class_id == settings.person_class_id)
        .filter_map(|det| normalize_one(det, settings))
        .collect()
}

fn normalize_one(det: &RawDetection, settings: &DetectionSettings) -> Option<Detection> {
    if !det.confidence.is_finite() || det.bbox.iter().any(|v| !v.is_finite()) {
        log::debug!("dropping non-finite detection: {:?}", det);
        return None;
    }
    if det.confidence < settings.confidence_threshold {
        return None;
    }

    let [x1, y1, x2, y2] = det.bbox;
    let bbox = BoundingBox::new(x1, y1, x2, y2);
    let width = bbox.width();
    let height = bbox.height();
    let area = width * height;

    // Strict bounds; inverted boxes fail the width/height gates.
    if area > settings.min_area
        && area < settings.max_area
        && width > settings.min_width
        && height > settings.min_height
    {
        Some(Detection::from_bbox(bbox, det.confidence))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person(bbox: [f32; 4], confidence: f32) -> RawDetection {
        RawDetection {
            class_id: 0,
            bbox,
            confidence,
        }
    }

    #[test]
    fn keeps_person_boxes_and_derives_geometry() {
        let settings = DetectionSettings::default();
        let out = normalize_detections(&[person([100.0, 100.0, 150.0, 200.0], 0.8)], &settings);

        assert_eq!(out.len(), 1);
        let det = &out[0];
        assert_eq!(det.center.x, 125.0);
        assert_eq!(det.center.y, 150.0);
        assert_eq!(det.area, 5000.0);
        assert!((det.aspect_ratio - 0.5).abs() < 1e-6);
    }

    #[test]
    fn drops_other_classes_and_low_confidence() {
        let settings = DetectionSettings::default();
        let raw = vec![
            RawDetection {
                class_id: 2,
                bbox: [100.0, 100.0, 150.0, 200.0],
                confidence: 0.9,
            },
            person([100.0, 100.0, 150.0, 200.0], 0.3),
        ];
        assert!(normalize_detections(&raw, &settings).is_empty());
    }

    #[test]
    fn applies_size_filter_bounds() {
        let settings = DetectionSettings::default();
        let raw = vec![
            // too narrow
            person([0.0, 0.0, 15.0, 100.0], 0.9),
            // too short
            person([0.0, 0.0, 100.0, 30.0], 0.9),
            // too large
            person([0.0, 0.0, 300.0, 300.0], 0.9),
            // exactly min height is rejected (strict)
            person([0.0, 0.0, 50.0, 40.0], 0.9),
        ];
        assert!(normalize_detections(&raw, &settings).is_empty());
    }

    #[test]
    fn drops_malformed_boxes() {
        let settings = DetectionSettings::default();
        let raw = vec![
            person([f32::NAN, 0.0, 50.0, 100.0], 0.9),
            person([150.0, 200.0, 100.0, 100.0], 0.9),
            person([0.0, 0.0, 50.0, 100.0], f32::INFINITY),
        ];
        assert!(normalize_detections(&raw, &settings).is_empty());
    }

    #[test]
    fn clips_confidence_into_unit_range() {
        let settings = DetectionSettings::default();
        let out = normalize_detections(&[person([0.0, 0.0, 50.0, 100.0], 1.7)], &settings);
        assert_eq!(out[0].confidence, 1.0);
    }

    #[test]
    fn respects_configured_person_class() {
        let settings = DetectionSettings {
            person_class_id: 1,
            ..DetectionSettings::default()
        };
        let raw = vec![RawDetection {
            class_id: 1,
            bbox: [0.0, 0.0, 50.0, 100.0],
            confidence: 0.9,
        }];
        assert_eq!(normalize_detections(&raw, &settings).len(), 1);
    }
}
