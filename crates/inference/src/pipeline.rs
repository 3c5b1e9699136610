//! Wiring and lifetime of one inference run.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use kinetrace_common::{KinetraceError, KinetraceResult, ProgressCallback, StopFlag};
use kinetrace_model::{DetectionLog, Projection};

use crate::context::{PipelineConfig, RunContext};
use crate::detector::{BatchDetector, Detector};
use crate::monitor::{MonitorTargets, ProgressMonitor};
use crate::queue::{stage_channel, StageReceiver, StageSender};
use crate::recorder::ResultRecorder;
use crate::reproject::Reprojector;
use crate::source::FrameSource;
use crate::stage::{run_source, run_stage, Stage, StageExit};

/// Result of a completed run.
#[derive(Debug)]
pub struct PipelineOutput {
    pub log: DetectionLog,
    pub frames_recorded: u64,

    /// Mean time per frame spent in each stage.
    pub stage_timings: BTreeMap<&'static str, Duration>,

    pub elapsed: Duration,

    /// Whether the log was written to the configured output path.
    pub saved: bool,
}

/// Runs decode, optional reprojection, detection and recording as one thread
/// per stage joined by bounded queues.
pub struct InferencePipeline {
    config: PipelineConfig,
    stop: StopFlag,
    projection: Projection,
    output: Option<PathBuf>,
    progress: Option<ProgressCallback>,
}

type StageHandle = JoinHandle<KinetraceResult<StageExit>>;

impl InferencePipeline {
    pub fn new(config: PipelineConfig, stop: StopFlag) -> Self {
        Self {
            config,
            stop,
            projection: Projection::Flat,
            output: None,
            progress: None,
        }
    }

    /// Projection of the source frames; decides whether a reprojection stage runs.
    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }

    /// Save the detection log here when the run completes.
    pub fn with_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = Some(path.into());
        self
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Run to completion. Blocks the calling thread.
    ///
    /// Returns the root-cause error once every stage has joined. A stop
    /// request yields [`KinetraceError::Cancelled`].
    pub fn run(
        self,
        source: Box<dyn FrameSource>,
        detector: Box<dyn Detector>,
    ) -> KinetraceResult<PipelineOutput> {
        let ctx = RunContext::new(self.config, self.stop, source.total_frames());

        let mut stages: Vec<Box<dyn Stage>> = Vec::new();
        if let Some(reprojector) = Reprojector::for_source(
            ctx.config.reproject,
            &self.projection,
            ctx.config.render_resolution,
        ) {
            stages.push(Box::new(reprojector));
        }
        stages.push(Box::new(BatchDetector::new(detector, ctx.config.batch_size)));

        let recorder = ResultRecorder::new(self.output);
        let completed = recorder.completed_counter();

        tracing::info!(
            total_frames = ctx.total_frames,
            stages = stages.len() + 2,
            queue_capacity = ctx.config.queue_capacity,
            batch_size = ctx.config.batch_size,
            "Inference pipeline starting"
        );

        let channel = |name| {
            stage_channel(
                name,
                ctx.config.queue_capacity,
                ctx.stop.clone(),
                ctx.config.poll_interval,
            )
        };

        let mut gauges = Vec::new();
        let mut handles: Vec<(&'static str, StageHandle)> = Vec::new();

        let (source_tx, mut upstream): (StageSender, StageReceiver) = channel("decoded");
        gauges.push(source_tx.gauge());
        let stop = ctx.stop.clone();
        let mut source = source;
        handles.push((
            "decode",
            spawn_named("decode", move || run_source(&mut *source, source_tx, &stop))?,
        ));

        for mut stage in stages {
            let name = stage.name();
            let (tx, rx) = channel(name);
            gauges.push(tx.gauge());
            let input = std::mem::replace(&mut upstream, rx);
            handles.push((
                name,
                spawn_named(name, move || run_stage(&mut *stage, input, Some(tx)))?,
            ));
        }

        let recorder_handle = spawn_named("record", move || {
            let mut recorder = recorder;
            let result = run_stage(&mut recorder, upstream, None);
            (recorder, result)
        })?;

        let monitor = match ProgressMonitor::spawn(
            ctx.config.progress_interval(),
            MonitorTargets {
                total_frames: ctx.total_frames,
                completed,
                gauges,
                clock: ctx.clock.clone(),
            },
            self.progress,
        ) {
            Ok(monitor) => Some(monitor),
            Err(e) => {
                tracing::warn!(error = %e, "Progress monitor unavailable");
                None
            }
        };

        let mut results: Vec<KinetraceResult<StageExit>> = handles
            .into_iter()
            .map(|(name, handle)| join_stage(name, handle))
            .collect();

        let recorder = match recorder_handle.join() {
            Ok((recorder, result)) => {
                results.push(result);
                Some(recorder)
            }
            Err(_) => {
                results.push(Err(KinetraceError::pipeline("record stage panicked")));
                None
            }
        };

        if let Some(monitor) = monitor {
            monitor.finish();
        }

        let elapsed = ctx.clock.elapsed();
        if let Some(error) = root_cause(results, &ctx.stop) {
            if error.is_cancelled() {
                tracing::info!(elapsed_secs = elapsed.as_secs_f64(), "Inference cancelled");
            } else {
                tracing::error!(error = %error, "Inference failed");
            }
            return Err(error);
        }

        let recorder =
            recorder.ok_or_else(|| KinetraceError::pipeline("recorder did not report back"))?;
        let frames_recorded = recorder.frames_recorded();
        tracing::info!(
            frames = frames_recorded,
            records = recorder.log().len(),
            elapsed_secs = elapsed.as_secs_f64(),
            fps = frames_recorded as f64 / elapsed.as_secs_f64().max(1e-9),
            "Inference finished"
        );

        Ok(PipelineOutput {
            frames_recorded,
            stage_timings: recorder.stage_means(),
            saved: recorder.is_saved(),
            log: recorder.into_log(),
            elapsed,
        })
    }
}

fn spawn_named<F, T>(name: &str, f: F) -> KinetraceResult<JoinHandle<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    thread::Builder::new()
        .name(format!("kinetrace-{name}"))
        .spawn(f)
        .map_err(|e| KinetraceError::pipeline(format!("Failed to start {name} stage: {e}")))
}

fn join_stage(name: &'static str, handle: StageHandle) -> KinetraceResult<StageExit> {
    handle
        .join()
        .unwrap_or_else(|_| Err(KinetraceError::pipeline(format!("{name} stage panicked"))))
}

/// Pick the error to report from per-stage results, listed upstream first.
///
/// A failing stage aborts everything downstream and makes every upstream
/// stage fail on a closed queue, so the most downstream failure is the cause.
fn root_cause(results: Vec<KinetraceResult<StageExit>>, stop: &StopFlag) -> Option<KinetraceError> {
    let mut cancelled = false;
    let mut aborted: Option<String> = None;
    let mut cause: Option<KinetraceError> = None;

    for result in results {
        match result {
            Ok(StageExit::Completed) => {}
            Ok(StageExit::Aborted(reason)) => {
                aborted.get_or_insert(reason);
            }
            Err(e) if e.is_cancelled() => cancelled = true,
            Err(e) => cause = Some(e),
        }
    }

    if cause.is_some() {
        return cause;
    }
    if cancelled || stop.is_stopped() {
        return Some(KinetraceError::Cancelled);
    }
    aborted.map(KinetraceError::pipeline)
}
