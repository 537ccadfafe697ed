mod normalize;
mod result;

pub use normalize::normalize_detections;
pub use result::{BoundingBox, Detection, FrameDimensions, Point, RawDetection};
