//! Final stage: flattens detections into the detection log.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use kinetrace_common::{KinetraceError, KinetraceResult};
use kinetrace_model::DetectionLog;

use crate::frame::FrameTask;
use crate::stage::{Emitter, Stage};

/// Appends each frame's detections to a [`DetectionLog`] and saves it once
/// the stream ends cleanly.
///
/// An aborted run leaves any file already at the output path untouched.
pub struct ResultRecorder {
    log: DetectionLog,
    output: Option<PathBuf>,
    completed: Arc<AtomicU64>,
    last_frame: Option<u64>,
    timing_totals: BTreeMap<&'static str, Duration>,
    frames: u64,
    saved: bool,
}

impl ResultRecorder {
    pub fn new(output: Option<PathBuf>) -> Self {
        Self {
            log: DetectionLog::new(),
            output,
            completed: Arc::new(AtomicU64::new(0)),
            last_frame: None,
            timing_totals: BTreeMap::new(),
            frames: 0,
            saved: false,
        }
    }

    /// Frames recorded so far, shared with the progress monitor.
    pub fn completed_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.completed)
    }

    pub fn frames_recorded(&self) -> u64 {
        self.frames
    }

    pub fn is_saved(&self) -> bool {
        self.saved
    }

    /// Mean time per frame spent in each stage.
    pub fn stage_means(&self) -> BTreeMap<&'static str, Duration> {
        let frames = u32::try_from(self.frames.max(1)).unwrap_or(u32::MAX);
        self.timing_totals
            .iter()
            .map(|(stage, total)| (*stage, *total / frames))
            .collect()
    }

    pub fn log(&self) -> &DetectionLog {
        &self.log
    }

    pub fn into_log(self) -> DetectionLog {
        self.log
    }
}

impl Stage for ResultRecorder {
    fn name(&self) -> &'static str {
        "record"
    }

    fn process(&mut self, mut task: FrameTask, _out: &mut Emitter<'_>) -> KinetraceResult<()> {
        if let Some(last) = self.last_frame {
            if task.frame_index <= last {
                return Err(KinetraceError::pipeline(format!(
                    "frame {} arrived after frame {last}",
                    task.frame_index
                )));
            }
        }
        self.last_frame = Some(task.frame_index);

        task.release_frame();
        self.log
            .append_frame(task.frame_index, &task.detections)
            .map_err(|e| KinetraceError::model(e.to_string()))?;

        for (stage, elapsed) in task.timings.snapshot() {
            *self.timing_totals.entry(stage).or_default() += elapsed;
        }
        self.frames += 1;
        self.completed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn finish(&mut self, _out: &mut Emitter<'_>) -> KinetraceResult<()> {
        for (stage, mean) in self.stage_means() {
            tracing::info!(
                stage,
                mean_ms = mean.as_secs_f64() * 1000.0,
                frames = self.frames,
                "Stage performance"
            );
        }

        if let Some(path) = &self.output {
            self.log
                .save(path)
                .map_err(|e| KinetraceError::model(e.to_string()))?;
            self.saved = true;
            tracing::info!(
                path = %path.display(),
                records = self.log.len(),
                frames = self.frames,
                "Detection log saved"
            );
        }
        Ok(())
    }

    fn abort(&mut self, reason: &str) {
        tracing::warn!(
            frames = self.frames,
            reason,
            "Recording aborted, detection log not saved"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::RawFrame;
    use kinetrace_model::{DetectionBox, DetectionClass, Rect};

    fn task(i: u64, detections: usize) -> FrameTask {
        let mut task = FrameTask::new(i, RawFrame::new(1, 1, vec![0; 3]));
        task.detections = (0..detections)
            .map(|k| {
                DetectionBox::new(
                    Rect::new(0.0, 0.0, 10.0, 10.0),
                    0.8,
                    DetectionClass::Reference,
                    k as u32,
                )
            })
            .collect();
        task.timings.record("detect", Duration::from_millis(4));
        task
    }

    #[test]
    fn test_records_and_counts() {
        let mut recorder = ResultRecorder::new(None);
        let counter = recorder.completed_counter();
        let mut out = Emitter::new(None);

        recorder.process(task(0, 2), &mut out).unwrap();
        recorder.process(task(1, 0), &mut out).unwrap();
        recorder.process(task(3, 1), &mut out).unwrap();
        recorder.finish(&mut out).unwrap();

        assert_eq!(counter.load(Ordering::Relaxed), 3);
        assert_eq!(recorder.log().len(), 3);
        assert_eq!(recorder.log().last_frame(), Some(3));
        assert_eq!(recorder.stage_means().get("detect"), Some(&Duration::from_millis(4)));
        assert!(!recorder.is_saved());
    }

    #[test]
    fn test_out_of_order_frame_is_an_error() {
        let mut recorder = ResultRecorder::new(None);
        let mut out = Emitter::new(None);
        recorder.process(task(5, 1), &mut out).unwrap();
        assert!(recorder.process(task(5, 1), &mut out).is_err());
    }

    #[test]
    fn test_saves_only_on_finish() {
        let path = std::env::temp_dir().join(format!(
            "kinetrace-recorder-{}.json",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);

        let mut recorder = ResultRecorder::new(Some(path.clone()));
        let mut out = Emitter::new(None);
        recorder.process(task(0, 1), &mut out).unwrap();
        recorder.abort("test");
        assert!(!path.exists());

        recorder.finish(&mut out).unwrap();
        assert!(recorder.is_saved());
        let loaded = DetectionLog::load(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        std::fs::remove_file(&path).unwrap();
    }
}
