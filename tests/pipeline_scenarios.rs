use anyhow::{anyhow, Result};
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tempfile::NamedTempFile;

use safezone_core::{
    AlertPayload, AlertSink, DetectionSource, EventType, FrameDimensions, Pipeline,
    PipelineState, RawDetection, ReplaySource, SafezoneConfig, Severity, SourceFrame,
    SourceStats,
};

#[derive(Default)]
struct RecordingSink {
    seen: Mutex<Vec<AlertPayload>>,
}

impl RecordingSink {
    fn event_types(&self) -> Vec<EventType> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .map(|p| p.event_type)
            .collect()
    }
}

impl AlertSink for RecordingSink {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn deliver(&self, payload: &AlertPayload) -> Result<()> {
        self.seen.lock().unwrap().push(payload.clone());
        Ok(())
    }
}

/// Rejects every delivery.
struct DownSink;

impl AlertSink for DownSink {
    fn name(&self) -> &'static str {
        "down"
    }

    fn deliver(&self, _payload: &AlertPayload) -> Result<()> {
        Err(anyhow!("endpoint unreachable"))
    }
}

fn fast_config() -> SafezoneConfig {
    let mut config = SafezoneConfig::default();
    config.alerts.retry_delay = Duration::from_millis(5);
    config.source.reconnect_delay = Duration::from_millis(5);
    config.source.reconnect_attempts = 3;
    config
}

fn pipeline_with(config: SafezoneConfig) -> (Arc<RecordingSink>, Pipeline) {
    let sink = Arc::new(RecordingSink::default());
    let pipeline = Pipeline::new(config, sink.clone()).expect("pipeline");
    (sink, pipeline)
}

fn person(cx: f32, cy: f32, w: f32, h: f32, confidence: f32) -> RawDetection {
    RawDetection {
        class_id: 0,
        bbox: [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0],
        confidence,
    }
}

fn frame(detections: Vec<RawDetection>) -> SourceFrame {
    SourceFrame::new(FrameDimensions::new(640, 480), detections)
}

// -------------------- Classification scenarios --------------------

#[test]
fn scenario_overcrowding_cluster() {
    let (_, mut pipeline) = pipeline_with(fast_config());
    // 4x3 grid, 40px apart: close enough to be dense, far enough apart to
    // stay out of fight range.
    let crowd = (0..12)
        .map(|i| {
            let cx = 200.0 + (i % 4) as f32 * 40.0;
            let cy = 200.0 + (i / 4) as f32 * 40.0;
            person(cx, cy, 30.0, 60.0, 0.8)
        })
        .collect();

    let events = pipeline.process_frame(&frame(crowd)).unwrap();
    assert_eq!(events.len(), 1);
    let ev = &events[0];
    assert_eq!(ev.event_type, EventType::Overcrowding);
    assert_eq!(ev.severity, Severity::Medium);
    assert_eq!(ev.person_count, 12);
    assert!(ev.confidence > 0.7 && ev.confidence <= 0.95);
}

#[test]
fn scenario_fall_near_ground() {
    let mut config = fast_config();
    // A 150x30 box is shorter than the default detector height gate.
    config.detection.min_height = 20.0;
    let (_, mut pipeline) = pipeline_with(config);

    let fallen = RawDetection {
        class_id: 0,
        bbox: [100.0, 420.0, 250.0, 450.0],
        confidence: 0.75,
    };
    let events = pipeline.process_frame(&frame(vec![fallen])).unwrap();
    assert_eq!(events.len(), 1);
    let ev = &events[0];
    assert_eq!(ev.event_type, EventType::Fall);
    assert_eq!(ev.severity, Severity::High);
    assert!((ev.confidence - 0.85).abs() < 1e-6);
}

#[test]
fn scenario_fight_pair() {
    let (_, mut pipeline) = pipeline_with(fast_config());
    let pair = vec![
        person(300.0, 200.0, 50.0, 100.0, 0.8),
        person(315.0, 200.0, 50.0, 100.0, 0.7),
    ];
    let events = pipeline.process_frame(&frame(pair)).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, EventType::Fight);
    assert_eq!(events[0].person_count, 2);
    assert_eq!(events[0].bounding_boxes.len(), 2);
}

#[test]
fn scenario_loitering_after_twenty_frames() {
    let (_, mut pipeline) = pipeline_with(fast_config());
    for i in 0..19 {
        let jitter = (i % 5) as f32;
        let events = pipeline
            .process_frame(&frame(vec![person(320.0 + jitter, 240.0, 40.0, 90.0, 0.8)]))
            .unwrap();
        assert!(events.is_empty(), "no loitering before 20 frames (frame {})", i + 1);
    }

    let events = pipeline
        .process_frame(&frame(vec![person(322.0, 241.0, 40.0, 90.0, 0.8)]))
        .unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, EventType::Loitering);
    assert_eq!(events[0].severity, Severity::Low);
    assert_eq!(events[0].frame_number, 20);
}

#[test]
fn tracker_and_history_stay_bounded() {
    let (_, mut pipeline) = pipeline_with(fast_config());
    for _ in 0..250 {
        pipeline
            .process_frame(&frame(vec![person(100.0, 100.0, 40.0, 90.0, 0.9)]))
            .unwrap();
    }
    assert_eq!(pipeline.tracker().len(), 30);
    assert_eq!(pipeline.history().len(), 100);
    assert_eq!(pipeline.frame_number(), 250);
}

// -------------------- Full runs --------------------

#[test]
fn replay_run_delivers_deduplicated_alerts() {
    let mut file = NamedTempFile::new().unwrap();
    let fight = r#"{"width":640,"height":480,"detections":[{"class_id":0,"bbox":[275,150,325,250],"confidence":0.8},{"class_id":0,"bbox":[290,150,340,250],"confidence":0.8}]}"#;
    let fall = r#"{"width":640,"height":480,"detections":[{"class_id":0,"bbox":[100,410,250,460],"confidence":0.8}]}"#;
    let empty = r#"{"width":640,"height":480,"detections":[]}"#;
    for line in [fight, "garbage", fight, empty, fall, "", fall] {
        writeln!(file, "{}", line).unwrap();
    }
    file.flush().unwrap();

    let (sink, mut pipeline) = pipeline_with(fast_config());
    let mut source = ReplaySource::new(file.path());
    let summary = pipeline.run(&mut source).unwrap();

    assert_eq!(pipeline.state(), PipelineState::Stopped);
    assert_eq!(summary.frames_read, 5);
    assert_eq!(summary.frames_processed, 5);
    assert_eq!(summary.events_detected, 4);
    assert_eq!(summary.alerts_enqueued, 2);
    assert_eq!(summary.alerts_suppressed, 2);
    assert_eq!(summary.performance.alerts_sent, 2);
    assert_eq!(sink.event_types(), vec![EventType::Fight, EventType::Fall]);
    assert_eq!(source.skipped(), 2);
}

#[test]
fn failed_deliveries_are_reported_in_summary() {
    let mut config = fast_config();
    config.detection.min_height = 20.0;
    let mut pipeline = Pipeline::new(config, Arc::new(DownSink)).expect("pipeline");
    let fallen = RawDetection {
        class_id: 0,
        bbox: [100.0, 420.0, 250.0, 450.0],
        confidence: 0.75,
    };
    let mut source = FlakySource::new(vec![Some(frame(vec![fallen]))], usize::MAX);

    let summary = pipeline.run(&mut source).unwrap();
    assert_eq!(summary.events_detected, 1);
    assert_eq!(summary.alerts_enqueued, 1);
    assert_eq!(summary.alerts_failed, 1);
    assert_eq!(summary.alerts_dropped, 0);
    assert_eq!(summary.performance.alerts_sent, 0);
}

#[test]
fn missing_source_never_enters_running() {
    let (sink, mut pipeline) = pipeline_with(fast_config());
    let mut source = ReplaySource::new("/nonexistent/safezone/recording.jsonl");
    assert!(pipeline.run(&mut source).is_err());
    assert_eq!(pipeline.state(), PipelineState::Stopped);
    assert!(sink.event_types().is_empty());
}

/// Fails reads at the scripted positions; optionally refuses reconnects.
struct FlakySource {
    script: Vec<Option<SourceFrame>>,
    cursor: usize,
    connects: usize,
    max_connects: usize,
    connected: bool,
    frames_read: u64,
}

impl FlakySource {
    fn new(script: Vec<Option<SourceFrame>>, max_connects: usize) -> Self {
        Self {
            script,
            cursor: 0,
            connects: 0,
            max_connects,
            connected: false,
            frames_read: 0,
        }
    }
}

impl DetectionSource for FlakySource {
    fn describe(&self) -> String {
        "flaky".to_string()
    }

    fn connect(&mut self) -> Result<()> {
        if self.connects >= self.max_connects {
            return Err(anyhow!("camera offline"));
        }
        self.connects += 1;
        self.connected = true;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<SourceFrame>> {
        if !self.connected {
            return Err(anyhow!("not connected"));
        }
        let Some(step) = self.script.get(self.cursor).cloned() else {
            return Ok(None);
        };
        self.cursor += 1;
        match step {
            Some(frame) => {
                self.frames_read += 1;
                Ok(Some(frame))
            }
            None => Err(anyhow!("read timeout")),
        }
    }

    fn release(&mut self) {
        self.connected = false;
    }

    fn is_healthy(&self) -> bool {
        self.connected
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_read: self.frames_read,
            source: self.describe(),
        }
    }
}

#[test]
fn transient_read_failure_reconnects() {
    let (_, mut pipeline) = pipeline_with(fast_config());
    let mut source = FlakySource::new(
        vec![Some(frame(vec![])), None, Some(frame(vec![])), Some(frame(vec![]))],
        usize::MAX,
    );
    let summary = pipeline.run(&mut source).unwrap();
    assert_eq!(summary.reconnects, 1);
    assert_eq!(summary.frames_processed, 3);
    assert_eq!(source.connects, 2);
    assert!(!source.is_healthy());
}

#[test]
fn exhausted_reconnects_stop_with_error() {
    let (_, mut pipeline) = pipeline_with(fast_config());
    let mut source = FlakySource::new(vec![Some(frame(vec![])), None], 1);
    let err = pipeline.run(&mut source).unwrap_err();
    assert!(err.to_string().contains("reconnect"));
    assert_eq!(pipeline.state(), PipelineState::Stopped);
}

#[test]
fn stop_during_reconnect_backoff_is_prompt() {
    let mut config = fast_config();
    config.source.reconnect_delay = Duration::from_secs(10);
    let (_, mut pipeline) = pipeline_with(config);
    let stop = pipeline.stop_handle();
    let mut source = FlakySource::new(vec![None], 1);

    let stopper = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(100));
        stop.request();
    });
    let started = Instant::now();
    pipeline.run(&mut source).unwrap();
    stopper.join().unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(pipeline.state(), PipelineState::Stopped);
}
