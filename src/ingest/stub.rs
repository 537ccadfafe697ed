use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{DetectionSource, SourceFrame, SourceStats};
use crate::detect::{FrameDimensions, RawDetection};

const PERSON: u32 = 0;
const VEHICLE: u32 = 2;

/// Scripted synthetic scene for `stub://` URLs.
///
/// Each frame carries a mostly stationary bystander and a pedestrian crossing
/// the frame. On top of that, recurring segments stage a fall, a close-range
/// scuffle and a crowd burst. Positions get a little jitter from an RNG seeded
/// by the stub name, so the same name always replays the same scene.
pub struct SyntheticSource {
    name: String,
    dimensions: FrameDimensions,
    seed: u64,
    rng: StdRng,
    frame_count: u64,
    connected: bool,
}

impl SyntheticSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_dimensions(name, FrameDimensions::default())
    }

    pub fn with_dimensions(name: impl Into<String>, dimensions: FrameDimensions) -> Self {
        let name = name.into();
        let seed = seed_from_name(&name);
        Self {
            name,
            dimensions,
            seed,
            rng: StdRng::seed_from_u64(seed),
            frame_count: 0,
            connected: false,
        }
    }

    fn jitter(&mut self, amount: f32) -> f32 {
        self.rng.gen_range(-amount..=amount)
    }

    fn confidence(&mut self) -> f32 {
        self.rng.gen_range(0.7..0.95)
    }

    /// Box of `w`x`h` centred on `(cx, cy)`, clipped to the frame.
    fn person(&mut self, cx: f32, cy: f32, w: f32, h: f32) -> RawDetection {
        let max_x = self.dimensions.width as f32;
        let max_y = self.dimensions.height as f32;
        let x1 = (cx - w / 2.0).clamp(0.0, max_x);
        let y1 = (cy - h / 2.0).clamp(0.0, max_y);
        let x2 = (cx + w / 2.0).clamp(0.0, max_x);
        let y2 = (cy + h / 2.0).clamp(0.0, max_y);
        RawDetection {
            class_id: PERSON,
            bbox: [x1, y1, x2, y2],
            confidence: self.confidence(),
        }
    }

    fn scene(&mut self, n: u64) -> Vec<RawDetection> {
        let width = self.dimensions.width as f32;
        let height = self.dimensions.height as f32;
        let mut detections = Vec::new();

        // Bystander near the middle of the frame.
        let (jx, jy) = (self.jitter(3.0), self.jitter(3.0));
        detections.push(self.person(width * 0.5 + jx, height * 0.45 + jy, 50.0, 110.0));

        // Pedestrian walking left to right.
        let span = (width - 80.0).max(1.0);
        let x = 40.0 + (n as f32 * 7.0) % span;
        detections.push(self.person(x, height * 0.35, 45.0, 100.0));

        // A parked car the normalizer should discard.
        detections.push(RawDetection {
            class_id: VEHICLE,
            bbox: [20.0, height - 120.0, 220.0, height - 20.0],
            confidence: 0.9,
        });

        // Someone lying near the bottom edge.
        if (60..65).contains(&(n % 120)) {
            let cy = height * 0.9;
            detections.push(self.person(width * 0.25, cy, 150.0, 45.0));
        }

        // Two people squaring off.
        if (40..43).contains(&(n % 90)) {
            let cx = width * 0.78;
            let cy = height * 0.5;
            detections.push(self.person(cx, cy, 50.0, 100.0));
            detections.push(self.person(cx + 15.0, cy, 50.0, 100.0));
        }

        // Crowd burst.
        if (150..160).contains(&(n % 200)) {
            for i in 0..12 {
                let dx = (i % 4) as f32 * 25.0 + self.jitter(2.0);
                let dy = (i / 4) as f32 * 30.0 + self.jitter(2.0);
                detections.push(self.person(width * 0.2 + dx, height * 0.55 + dy, 30.0, 60.0));
            }
        }

        detections
    }
}

impl DetectionSource for SyntheticSource {
    fn describe(&self) -> String {
        format!("stub://{}", self.name)
    }

    /// Synthetic sources are always reachable. Reconnecting restarts the scene.
    fn connect(&mut self) -> Result<()> {
        self.rng = StdRng::seed_from_u64(self.seed);
        self.frame_count = 0;
        self.connected = true;
        log::info!("{}: connected (synthetic)", self.describe());
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<SourceFrame>> {
        self.frame_count += 1;
        let detections = self.scene(self.frame_count);
        Ok(Some(SourceFrame::new(self.dimensions, detections)))
    }

    fn release(&mut self) {
        self.connected = false;
    }

    fn is_healthy(&self) -> bool {
        self.connected
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_read: self.frame_count,
            source: self.describe(),
        }
    }
}

/// FNV-1a over the stub name.
fn seed_from_name(name: &str) -> u64 {
    name.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ byte as u64).wrapping_mul(0x0100_0000_01b3)
    })
}
