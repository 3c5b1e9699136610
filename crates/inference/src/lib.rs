//! Kinetrace Inference Pipeline
//!
//! Turns a video into a detection log with one worker thread per stage:
//!
//! ```text
//! FrameSource ─▶ Reprojector ─▶ BatchDetector ─▶ ResultRecorder
//! ```
//!
//! Stages are joined by bounded queues. A full queue blocks its producer, so
//! no frame is ever dropped. End of stream and failures travel downstream as
//! sentinels; every stage drains, forwards the sentinel and exits. The first
//! failure is returned once all stages have joined.

pub mod backend;
pub mod context;
pub mod detector;
pub mod frame;
pub mod monitor;
pub mod pipeline;
pub mod queue;
pub mod recorder;
pub mod reproject;
pub mod source;
pub mod stage;

pub use backend::{HwAccel, HwAccelChoice};
pub use context::{PipelineConfig, RunContext};
pub use detector::{BatchDetector, Detector, DetectorInput, ProcessDetector, ProcessDetectorConfig};
pub use frame::{FrameTask, RawFrame, TaskTimings};
pub use pipeline::{InferencePipeline, PipelineOutput};
pub use recorder::ResultRecorder;
pub use reproject::{ReprojectMode, Reprojector};
pub use source::{FfmpegFrameSource, FrameSource, SyntheticFrameSource};
