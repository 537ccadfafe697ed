use serde::{Deserialize, Serialize};

/// One object reported by the external detector for a frame.
///
/// Nothing here is trusted: coordinates may be inverted or non-finite and the
/// confidence may fall outside `0..=1`. `normalize_detections` is the only
/// path from `RawDetection` to `Detection`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    pub class_id: u32,
    /// `[x1, y1, x2, y2]` in pixels.
    pub bbox: [f32; 4],
    pub confidence: f32,
}

/// Axis-aligned box in pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn center(&self) -> Point {
        Point {
            x: (self.x1 + self.x2) / 2.0,
            y: (self.y1 + self.y2) / 2.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn distance_to(&self, other: &Point) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// A validated person box with derived geometry.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
    /// Clipped to `0..=1`.
    pub confidence: f32,
    pub center: Point,
    pub area: f32,
    /// width / height
    pub aspect_ratio: f32,
}

impl Detection {
    /// Builds a detection from a box, deriving center, area and aspect ratio.
    ///
    /// Callers are expected to have rejected degenerate boxes already.
    pub fn from_bbox(bbox: BoundingBox, confidence: f32) -> Self {
        let height = bbox.height();
        Self {
            bbox,
            confidence: confidence.clamp(0.0, 1.0),
            center: bbox.center(),
            area: bbox.area(),
            aspect_ratio: if height > 0.0 {
                bbox.width() / height
            } else {
                0.0
            },
        }
    }
}

/// Pixel dimensions of the analysed frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameDimensions {
    pub width: u32,
    pub height: u32,
}

impl FrameDimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for FrameDimensions {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
        }
    }
}
