//! Worker loop shared by every pipeline stage.
//!
//! # Shutdown contract
//!
//! 1. A frame is handed to [`Stage::process`], which may emit any number of
//!    frames downstream.
//! 2. On `End` the stage flushes through [`Stage::finish`], then forwards `End`.
//! 3. On `Abort`, or a stop request, the stage drops in-flight work through
//!    [`Stage::abort`] and forwards `Abort`.
//! 4. A stage error is logged, turned into `Abort` for downstream and
//!    returned to the pipeline, which reports it once every stage has joined.

use std::time::Instant;

use kinetrace_common::{KinetraceError, KinetraceResult, StopFlag};

use crate::frame::FrameTask;
use crate::queue::{Packet, PushError, Received, StageReceiver, StageSender};
use crate::source::FrameSource;

/// How a stage ended when it did not fail itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageExit {
    Completed,
    /// Upstream aborted; carries the reason.
    Aborted(String),
}

/// Downstream handle passed to a stage. The last stage has no queue and its
/// emits are dropped.
pub struct Emitter<'a> {
    output: Option<&'a StageSender>,
}

impl<'a> Emitter<'a> {
    pub fn new(output: Option<&'a StageSender>) -> Self {
        Self { output }
    }

    pub fn emit(&mut self, task: FrameTask) -> KinetraceResult<()> {
        match self.output {
            Some(tx) => tx.send(Packet::Frame(task)).map_err(push_error),
            None => Ok(()),
        }
    }

    fn forward(&self, packet: Packet) {
        if let Some(tx) = self.output {
            // Downstream may already be gone or stopping; either way it exits on its own.
            let _ = tx.send(packet);
        }
    }
}

fn push_error(e: PushError) -> KinetraceError {
    match e {
        PushError::Stopped => KinetraceError::Cancelled,
        PushError::Closed => KinetraceError::pipeline("downstream stage exited early"),
    }
}

/// One worker of the pipeline.
pub trait Stage: Send {
    fn name(&self) -> &'static str;

    fn process(&mut self, task: FrameTask, out: &mut Emitter<'_>) -> KinetraceResult<()>;

    /// Flush buffered work at end of stream.
    fn finish(&mut self, _out: &mut Emitter<'_>) -> KinetraceResult<()> {
        Ok(())
    }

    /// Drop buffered work after an upstream failure or stop.
    fn abort(&mut self, _reason: &str) {}
}

/// Drive `stage` until its input ends.
pub fn run_stage(
    stage: &mut dyn Stage,
    input: StageReceiver,
    output: Option<StageSender>,
) -> KinetraceResult<StageExit> {
    let name = stage.name();
    let mut out = Emitter::new(output.as_ref());
    let mut frames = 0u64;
    tracing::debug!(stage = name, "Stage started");

    loop {
        let packet = match input.recv() {
            Received::Packet(packet) => packet,
            Received::Stopped => {
                tracing::info!(stage = name, frames, "Stage stopped");
                stage.abort("stopped");
                out.forward(Packet::Abort("stopped".into()));
                return Err(KinetraceError::Cancelled);
            }
        };

        match packet {
            Packet::Frame(task) => {
                let frame_index = task.frame_index;
                if let Err(e) = stage.process(task, &mut out) {
                    return Err(fail(stage, &out, e, Some(frame_index)));
                }
                frames += 1;
            }
            Packet::End => {
                if let Err(e) = stage.finish(&mut out) {
                    return Err(fail(stage, &out, e, None));
                }
                out.forward(Packet::End);
                tracing::debug!(stage = name, frames, "Stage finished");
                return Ok(StageExit::Completed);
            }
            Packet::Abort(reason) => {
                tracing::debug!(stage = name, frames, reason = %reason, "Stage aborted by upstream");
                stage.abort(&reason);
                out.forward(Packet::Abort(reason.clone()));
                return Ok(StageExit::Aborted(reason));
            }
        }
    }
}

fn fail(
    stage: &mut dyn Stage,
    out: &Emitter<'_>,
    error: KinetraceError,
    frame_index: Option<u64>,
) -> KinetraceError {
    if error.is_cancelled() {
        tracing::info!(stage = stage.name(), "Stage cancelled");
    } else {
        tracing::error!(stage = stage.name(), frame = ?frame_index, error = %error, "Stage failed");
    }
    let reason = format!("{} failed: {error}", stage.name());
    stage.abort(&reason);
    out.forward(Packet::Abort(reason));
    error
}

/// Pull frames from `source` into the first queue until it ends.
///
/// The source is closed before the sentinel goes out, on every path.
pub fn run_source(
    source: &mut dyn FrameSource,
    output: StageSender,
    stop: &StopFlag,
) -> KinetraceResult<StageExit> {
    let result = pump(source, &output, stop);
    source.close();

    match &result {
        Ok(frames) => {
            let _ = output.send(Packet::End);
            tracing::debug!(source = source.name(), frames, "Source finished");
        }
        Err(e) => {
            if e.is_cancelled() {
                tracing::info!(source = source.name(), "Source stopped");
            } else {
                tracing::error!(source = source.name(), error = %e, "Source failed");
            }
            let _ = output.send(Packet::Abort(format!("source failed: {e}")));
        }
    }
    result.map(|_| StageExit::Completed)
}

fn pump(source: &mut dyn FrameSource, output: &StageSender, stop: &StopFlag) -> KinetraceResult<u64> {
    let mut frames = 0u64;
    let mut last_index: Option<u64> = None;
    loop {
        if stop.is_stopped() {
            return Err(KinetraceError::Cancelled);
        }

        let started = Instant::now();
        let Some((frame_index, frame)) = source.next_frame()? else {
            return Ok(frames);
        };
        if last_index.is_some_and(|last| frame_index <= last) {
            return Err(KinetraceError::decode(format!(
                "source yielded frame {frame_index} after frame {}",
                last_index.unwrap_or_default()
            )));
        }
        last_index = Some(frame_index);

        let task = FrameTask::new(frame_index, frame);
        task.timings.record("decode", started.elapsed());
        output.send(Packet::Frame(task)).map_err(push_error)?;
        frames += 1;
    }
}
