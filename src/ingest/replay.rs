use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use super::{DetectionSource, SourceFrame, SourceStats};
use crate::detect::{FrameDimensions, RawDetection};

/// One line of a recording.
#[derive(Debug, Deserialize)]
struct ReplayRecord {
    width: u32,
    height: u32,
    #[serde(default)]
    detections: Vec<RawDetection>,
}

/// Replays recorded detector output from a JSON-lines file.
///
/// Blank and malformed lines are logged and skipped. End of file ends the
/// stream. A reconnect resumes after the last line already consumed.
pub struct ReplaySource {
    path: PathBuf,
    reader: Option<BufReader<File>>,
    /// Lines consumed so far, good or bad.
    line_no: u64,
    frames_read: u64,
    skipped: u64,
}

impl ReplaySource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            reader: None,
            line_no: 0,
            frames_read: 0,
            skipped: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Malformed or blank lines skipped so far.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}

impl DetectionSource for ReplaySource {
    fn describe(&self) -> String {
        format!("file://{}", self.path.display())
    }

    fn connect(&mut self) -> Result<()> {
        let file = File::open(&self.path)
            .with_context(|| format!("open replay file {}", self.path.display()))?;
        let mut reader = BufReader::new(file);

        let mut buf = Vec::new();
        for _ in 0..self.line_no {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
        }

        self.reader = Some(reader);
        log::info!(
            "{}: connected (replay, resuming after line {})",
            self.describe(),
            self.line_no
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<SourceFrame>> {
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| anyhow!("replay source not connected"))?;

        // Raw bytes so a line that is not UTF-8 is skipped like any other bad line.
        let mut line = Vec::new();
        loop {
            line.clear();
            if reader.read_until(b'\n', &mut line)? == 0 {
                return Ok(None);
            }
            self.line_no += 1;

            if line.iter().all(u8::is_ascii_whitespace) {
                self.skipped += 1;
                continue;
            }
            match serde_json::from_slice::<ReplayRecord>(&line) {
                Ok(record) => {
                    self.frames_read += 1;
                    return Ok(Some(SourceFrame::new(
                        FrameDimensions::new(record.width, record.height),
                        record.detections,
                    )));
                }
                Err(e) => {
                    log::warn!(
                        "{}: skipping malformed line {}: {}",
                        self.path.display(),
                        self.line_no,
                        e
                    );
                    self.skipped += 1;
                }
            }
        }
    }

    fn release(&mut self) {
        self.reader = None;
    }

    fn is_healthy(&self) -> bool {
        self.reader.is_some()
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_read: self.frames_read,
            source: self.describe(),
        }
    }
}
