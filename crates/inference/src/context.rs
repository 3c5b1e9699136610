//! Per-run settings and shared handles.

use std::time::Duration;

use kinetrace_common::{PipelineDefaults, RunClock, StopFlag, MIN_PROGRESS_INTERVAL};

use crate::reproject::ReprojectMode;

/// Tunables of one inference run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Capacity of every inter-stage queue, in frames.
    pub queue_capacity: usize,

    /// Frames per detector call, for detectors that batch.
    pub batch_size: usize,

    /// Interval between progress reports.
    pub progress_interval: Duration,

    /// How often a blocked consumer wakes to check for a stop request.
    pub poll_interval: Duration,

    pub reproject: ReprojectMode,

    /// Square side length of panoramic detection frames.
    pub render_resolution: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from(&PipelineDefaults::default())
    }
}

impl From<&PipelineDefaults> for PipelineConfig {
    fn from(defaults: &PipelineDefaults) -> Self {
        Self {
            queue_capacity: defaults.queue_capacity.max(1),
            batch_size: defaults.batch_size.max(1),
            progress_interval: defaults.progress_interval(),
            poll_interval: Duration::from_secs(1),
            reproject: ReprojectMode::Decoder,
            render_resolution: defaults.render_resolution,
        }
    }
}

impl PipelineConfig {
    pub fn progress_interval(&self) -> Duration {
        self.progress_interval.max(MIN_PROGRESS_INTERVAL)
    }
}

/// Everything a stage needs from its run. Created once per run and handed to
/// stage constructors; there is no process-wide run state.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub config: PipelineConfig,
    pub stop: StopFlag,
    pub clock: RunClock,

    /// Frames the source is expected to yield.
    pub total_frames: u64,
}

impl RunContext {
    pub fn new(config: PipelineConfig, stop: StopFlag, total_frames: u64) -> Self {
        Self {
            config,
            stop,
            clock: RunClock::start(),
            total_frames,
        }
    }
}
