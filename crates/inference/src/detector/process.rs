//! A detector living in a separate process.
//!
//! Each request is one JSON header line followed by the raw frame bytes,
//! back to back in header order:
//!
//! ```text
//! {"track":true,"frames":[{"index":0,"width":1080,"height":1080}, ...]}\n
//! <bgr24 bytes of frame 0><bgr24 bytes of frame 1>...
//! ```
//!
//! The reply is one JSON line, either
//! `{"frames":[[{"class":7,"confidence":0.91,"box":[x1,y1,x2,y2],"track_id":3}, ...], ...]}`
//! with one list per requested frame, or `{"error":"..."}`.

use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};

use kinetrace_common::{KinetraceError, KinetraceResult};
use kinetrace_model::{DetectionBox, DetectionClass, Rect};

use super::{Detector, DetectorInput};

/// How long a detector gets to exit on its own after stdin closes.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);
const SHUTDOWN_POLL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessDetectorConfig {
    /// Executable speaking the detector protocol.
    pub program: PathBuf,
    pub args: Vec<String>,

    /// Whether the process accepts more than one frame per request.
    pub batching: bool,

    /// Whether the process keeps track ids stable across requests.
    pub tracking: bool,
}

impl Default for ProcessDetectorConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("kinetrace-detector"),
            args: Vec::new(),
            batching: true,
            tracking: true,
        }
    }
}

#[derive(Serialize)]
struct RequestHeader {
    track: bool,
    frames: Vec<FrameHeader>,
}

#[derive(Serialize)]
struct FrameHeader {
    index: u64,
    width: u32,
    height: u32,
}

#[derive(Deserialize)]
struct Reply {
    #[serde(default)]
    frames: Option<Vec<Vec<WireDetection>>>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct WireDetection {
    class: u8,
    confidence: f64,
    #[serde(rename = "box")]
    bbox: [f64; 4],
    #[serde(default)]
    track_id: u32,
}

impl WireDetection {
    fn into_detection(self) -> Option<DetectionBox> {
        let class = DetectionClass::from_id(self.class)?;
        let [x1, y1, x2, y2] = self.bbox;
        Some(DetectionBox::new(
            Rect::new(x1, y1, x2, y2),
            self.confidence.clamp(0.0, 1.0),
            class,
            self.track_id,
        ))
    }
}

/// Drives an external detector over its stdin/stdout.
pub struct ProcessDetector {
    config: ProcessDetectorConfig,
    name: String,
    child: Child,
    stdin: Option<BufWriter<ChildStdin>>,
    stdout: BufReader<ChildStdout>,
}

impl ProcessDetector {
    pub fn spawn(config: ProcessDetectorConfig) -> KinetraceResult<Self> {
        let mut child = Command::new(&config.program)
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| {
                KinetraceError::detector(format!(
                    "Failed to start detector {}: {e}",
                    config.program.display()
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| KinetraceError::detector("Failed to capture detector stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| KinetraceError::detector("Failed to capture detector stdout"))?;

        let name = config
            .program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "process".to_string());
        tracing::info!(detector = %name, pid = child.id(), "Detector process started");

        Ok(Self {
            config,
            name,
            child,
            stdin: Some(BufWriter::new(stdin)),
            stdout: BufReader::new(stdout),
        })
    }

    fn exchange(&mut self, batch: &[DetectorInput<'_>]) -> anyhow::Result<Vec<Vec<DetectionBox>>> {
        let header = RequestHeader {
            track: self.config.tracking,
            frames: batch
                .iter()
                .map(|input| FrameHeader {
                    index: input.frame_index,
                    width: input.width,
                    height: input.height,
                })
                .collect(),
        };

        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| anyhow!("detector input already closed"))?;
        serde_json::to_writer(&mut *stdin, &header).context("encoding request header")?;
        stdin.write_all(b"\n").context("writing request header")?;
        for input in batch {
            stdin.write_all(input.pixels).context("writing frame pixels")?;
        }
        stdin.flush().context("flushing request")?;

        let mut line = String::new();
        let read = self.stdout.read_line(&mut line).context("reading reply")?;
        if read == 0 {
            return Err(anyhow!("detector exited without replying"));
        }
        let reply: Reply = serde_json::from_str(line.trim()).context("decoding reply")?;

        if let Some(error) = reply.error {
            return Err(anyhow!("detector reported: {error}"));
        }
        let frames = reply.frames.ok_or_else(|| anyhow!("reply carries no frames"))?;

        let mut unknown = 0usize;
        let results: Vec<Vec<DetectionBox>> = frames
            .into_iter()
            .map(|detections| {
                detections
                    .into_iter()
                    .filter_map(|d| {
                        let converted = d.into_detection();
                        if converted.is_none() {
                            unknown += 1;
                        }
                        converted
                    })
                    .collect()
            })
            .collect();
        if unknown > 0 {
            tracing::warn!(detections = unknown, "Skipped detections with unknown class ids");
        }
        Ok(results)
    }
}

impl Detector for ProcessDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports_batching(&self) -> bool {
        self.config.batching
    }

    fn supports_tracking(&self) -> bool {
        self.config.tracking
    }

    fn detect_batch(&mut self, batch: &[DetectorInput<'_>]) -> KinetraceResult<Vec<Vec<DetectionBox>>> {
        self.exchange(batch).map_err(|e| {
            KinetraceError::detector(format!(
                "{} failed on frames {}..={}: {e:#}",
                self.name,
                batch.first().map_or(0, |b| b.frame_index),
                batch.last().map_or(0, |b| b.frame_index),
            ))
        })
    }
}

impl Drop for ProcessDetector {
    fn drop(&mut self) {
        // Closing stdin asks the process to exit.
        drop(self.stdin.take());
        if !wait_for_exit(&mut self.child, SHUTDOWN_GRACE) {
            tracing::warn!(detector = %self.name, "Detector did not exit after stdin closed, killing it");
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// Poll the child until it exits or `grace` runs out. Returns whether it exited.
fn wait_for_exit(child: &mut Child, grace: Duration) -> bool {
    let deadline = Instant::now() + grace;
    loop {
        match child.try_wait() {
            Ok(Some(_)) => return true,
            Ok(None) if Instant::now() < deadline => std::thread::sleep(SHUTDOWN_POLL),
            _ => return false,
        }
    }
}
