//! Progress monitor thread of an inference run.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{channel, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use kinetrace_common::{ProgressCallback, ProgressReport, RunClock, MIN_PROGRESS_INTERVAL};

use crate::queue::QueueGauge;

/// Samples completed frames and queue depths at a fixed interval.
pub struct ProgressMonitor {
    done: Sender<()>,
    handle: JoinHandle<()>,
}

/// What the monitor watches.
pub struct MonitorTargets {
    pub total_frames: u64,
    pub completed: Arc<AtomicU64>,
    pub gauges: Vec<Arc<QueueGauge>>,
    pub clock: RunClock,
}

impl ProgressMonitor {
    pub fn spawn(
        interval: Duration,
        targets: MonitorTargets,
        callback: Option<ProgressCallback>,
    ) -> io::Result<Self> {
        let interval = interval.max(MIN_PROGRESS_INTERVAL);
        let (done, wake) = channel::<()>();

        let handle = thread::Builder::new()
            .name("kinetrace-progress".into())
            .spawn(move || {
                loop {
                    match wake.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => report(&targets, callback.as_ref()),
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                report(&targets, callback.as_ref());
            })?;

        Ok(Self { done, handle })
    }

    /// Stop sampling after one last report.
    pub fn finish(self) {
        let _ = self.done.send(());
        if self.handle.join().is_err() {
            tracing::warn!("Progress monitor panicked");
        }
    }
}

fn report(targets: &MonitorTargets, callback: Option<&ProgressCallback>) {
    let processed = targets.completed.load(Ordering::Relaxed);
    let report = ProgressReport::new(
        "inference",
        processed,
        targets.total_frames,
        targets.clock.elapsed(),
    );

    let depths: Vec<String> = targets
        .gauges
        .iter()
        .map(|g| format!("{}={}/{}", g.name(), g.depth(), g.capacity()))
        .collect();
    tracing::debug!(
        processed,
        total = targets.total_frames,
        eta = %report.eta_string(),
        queues = %depths.join(" "),
        "Inference progress"
    );

    if let Some(cb) = callback {
        cb(report);
    }
}
