//! Detector seam and the batching stage around it.

mod batch;
mod process;

pub use batch::BatchDetector;
pub use process::{ProcessDetector, ProcessDetectorConfig};

use kinetrace_common::KinetraceResult;
use kinetrace_model::DetectionBox;

/// One frame handed to a detector.
#[derive(Debug, Clone, Copy)]
pub struct DetectorInput<'a> {
    pub frame_index: u64,
    pub width: u32,
    pub height: u32,
    /// Packed `bgr24` pixels.
    pub pixels: &'a [u8],
}

/// An object detector the pipeline can drive.
pub trait Detector: Send {
    fn name(&self) -> &str;

    /// Whether more than one frame may be passed per call.
    fn supports_batching(&self) -> bool {
        true
    }

    /// Whether `track_id`s stay stable across calls.
    fn supports_tracking(&self) -> bool {
        true
    }

    /// Detect objects in every input. Returns exactly one list per input, in
    /// input order.
    fn detect_batch(&mut self, batch: &[DetectorInput<'_>]) -> KinetraceResult<Vec<Vec<DetectionBox>>>;
}
