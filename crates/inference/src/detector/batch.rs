use std::time::Instant;

use kinetrace_common::{KinetraceError, KinetraceResult};

use super::{Detector, DetectorInput};
use crate::frame::FrameTask;
use crate::stage::{Emitter, Stage};

/// Groups frames into batches for a [`Detector`] and attaches the results to
/// the frames they came from.
///
/// Frames leave in the order they arrived. A partial batch is flushed at end
/// of stream. A failed call fails the stage, so no frame is skipped silently.
pub struct BatchDetector {
    detector: Box<dyn Detector>,
    batch_size: usize,
    pending: Vec<FrameTask>,
    batches: u64,
}

impl BatchDetector {
    pub fn new(detector: Box<dyn Detector>, batch_size: usize) -> Self {
        let batch_size = if detector.supports_batching() {
            batch_size.max(1)
        } else {
            1
        };
        if !detector.supports_tracking() {
            tracing::warn!(
                detector = detector.name(),
                "Detector has no persistent tracking; track ids may not be stable"
            );
        }
        tracing::info!(detector = detector.name(), batch_size, "Detector ready");
        Self {
            detector,
            batch_size,
            pending: Vec::with_capacity(batch_size),
            batches: 0,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn flush(&mut self, out: &mut Emitter<'_>) -> KinetraceResult<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let mut tasks = std::mem::take(&mut self.pending);

        let results = {
            let mut inputs = Vec::with_capacity(tasks.len());
            for task in &tasks {
                let frame = task.frame.as_ref().ok_or_else(|| {
                    KinetraceError::pipeline(format!(
                        "frame {} reached the detector without pixels",
                        task.frame_index
                    ))
                })?;
                inputs.push(DetectorInput {
                    frame_index: task.frame_index,
                    width: frame.width,
                    height: frame.height,
                    pixels: &frame.pixels,
                });
            }

            let started = Instant::now();
            let results = self.detector.detect_batch(&inputs)?;
            let per_frame = started.elapsed() / inputs.len() as u32;
            for task in &tasks {
                task.timings.record("detect", per_frame);
            }
            results
        };

        if results.len() != tasks.len() {
            return Err(KinetraceError::detector(format!(
                "{} returned {} results for a batch of {} frames starting at {}",
                self.detector.name(),
                results.len(),
                tasks.len(),
                tasks[0].frame_index
            )));
        }

        self.batches += 1;
        for (task, detections) in tasks.iter_mut().zip(results) {
            task.detections = detections;
        }
        for task in tasks {
            out.emit(task)?;
        }
        Ok(())
    }
}

impl Stage for BatchDetector {
    fn name(&self) -> &'static str {
        "detect"
    }

    fn process(&mut self, task: FrameTask, out: &mut Emitter<'_>) -> KinetraceResult<()> {
        self.pending.push(task);
        if self.pending.len() >= self.batch_size {
            self.flush(out)?;
        }
        Ok(())
    }

    fn finish(&mut self, out: &mut Emitter<'_>) -> KinetraceResult<()> {
        self.flush(out)?;
        tracing::debug!(batches = self.batches, "Detection finished");
        Ok(())
    }

    fn abort(&mut self, reason: &str) {
        if !self.pending.is_empty() {
            tracing::debug!(frames = self.pending.len(), reason, "Dropping pending batch");
        }
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use kinetrace_common::StopFlag;
    use kinetrace_model::{DetectionBox, DetectionClass, Rect};

    use super::*;
    use crate::frame::RawFrame;
    use crate::queue::{stage_channel, Packet, Received};

    /// Reports each call's batch size through the first detection's track id.
    struct Counting {
        batching: bool,
        short_by: usize,
    }

    impl Detector for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        fn supports_batching(&self) -> bool {
            self.batching
        }

        fn detect_batch(
            &mut self,
            batch: &[DetectorInput<'_>],
        ) -> KinetraceResult<Vec<Vec<DetectionBox>>> {
            let n = batch.len().saturating_sub(self.short_by);
            Ok((0..n)
                .map(|_| {
                    vec![DetectionBox::new(
                        Rect::new(0.0, 0.0, 1.0, 1.0),
                        0.9,
                        DetectionClass::Hand,
                        batch.len() as u32,
                    )]
                })
                .collect())
        }
    }

    fn task(i: u64) -> FrameTask {
        FrameTask::new(i, RawFrame::new(1, 1, vec![0; 3]))
    }

    fn collect(rx: &crate::queue::StageReceiver) -> Vec<(u64, u32)> {
        let mut seen = Vec::new();
        while let Received::Packet(Packet::Frame(t)) = rx.recv() {
            seen.push((t.frame_index, t.detections[0].track_id));
            if rx.gauge().depth() == 0 {
                break;
            }
        }
        seen
    }

    #[test]
    fn test_partial_batch_flushed_on_finish() {
        let (tx, rx) = stage_channel("out", 16, StopFlag::new(), Duration::from_millis(10));
        let mut stage = BatchDetector::new(
            Box::new(Counting {
                batching: true,
                short_by: 0,
            }),
            4,
        );
        let mut out = Emitter::new(Some(&tx));
        for i in 0..6 {
            stage.process(task(i), &mut out).unwrap();
        }
        assert_eq!(tx.gauge().depth(), 4);
        stage.finish(&mut out).unwrap();

        let seen = collect(&rx);
        assert_eq!(seen, vec![(0, 4), (1, 4), (2, 4), (3, 4), (4, 2), (5, 2)]);
    }

    #[test]
    fn test_no_batching_support_means_single_frames() {
        let stage = BatchDetector::new(
            Box::new(Counting {
                batching: false,
                short_by: 0,
            }),
            30,
        );
        assert_eq!(stage.batch_size(), 1);
    }

    #[test]
    fn test_result_count_mismatch_is_fatal() {
        let (tx, _rx) = stage_channel("out", 16, StopFlag::new(), Duration::from_millis(10));
        let mut stage = BatchDetector::new(
            Box::new(Counting {
                batching: true,
                short_by: 1,
            }),
            2,
        );
        let mut out = Emitter::new(Some(&tx));
        stage.process(task(0), &mut out).unwrap();
        let err = stage.process(task(1), &mut out).unwrap_err();
        assert!(matches!(err, KinetraceError::Detector { .. }));
        assert_eq!(tx.gauge().depth(), 0);
    }
}
