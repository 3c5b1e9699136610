//! Tracking pass: detection log to raw distance signal.

use anyhow::anyhow;

use kinetrace_common::{KinetraceError, StopFlag};
use kinetrace_model::{DetectionLog, RawSignal};
use kinetrace_processing::tracking::{TrackerConfig, TrackingAnalyzer};

use super::shared::{self, Job, VideoArgs};

pub async fn run(config: kinetrace_common::config::AppConfig, video: VideoArgs) -> anyhow::Result<()> {
    let stop = shared::stop_on_ctrl_c();
    shared::blocking(move || {
        let job = Job::prepare(config, &video)?;
        let path = job.layout.detection_log();
        let log = DetectionLog::load(&path).map_err(|e| {
            anyhow!(
                "No usable detection log at {} ({e}); run `kinetrace detect` first",
                path.display()
            )
        })?;
        println!("Tracking: {}", job.video.path.display());
        track_video(&job, &log, stop)?;
        Ok(())
    })
    .await
}

/// Run the tracker over `log` and save the raw signal.
pub fn track_video(job: &Job, log: &DetectionLog, stop: StopFlag) -> anyhow::Result<RawSignal> {
    let analyzer = TrackingAnalyzer::new(TrackerConfig::default(), job.tracking_context())
        .with_progress(Box::new(shared::print_progress))
        .with_progress_interval(job.config.pipeline.progress_interval())
        .with_stop(stop);

    let result = analyzer.analyze(log, job.range);
    println!();
    let output = match result {
        Ok(output) => output,
        Err(KinetraceError::NoReferenceFound { frames }) => {
            return Err(anyhow!(
                "No reference object found in {frames} frames with detections; nothing to track"
            ))
        }
        Err(KinetraceError::Cancelled) => return Err(anyhow!("Tracking cancelled")),
        Err(e) => return Err(anyhow!("Tracking failed: {e}")),
    };

    println!(
        "  Frames analyzed: {} (from frame {})",
        output.frames_analyzed, output.start_frame
    );
    println!("  Mode changes: {}", output.mode_changes.len());

    let signal = RawSignal::new(job.video.fps, output.samples);
    let path = job.layout.raw_signal();
    signal
        .save(&path)
        .map_err(|e| anyhow!("Failed to save raw signal: {e}"))?;
    println!("  Raw signal: {}", path.display());

    let mut metadata = job.metadata();
    metadata.mark_tracking();
    job.save_metadata(&metadata);

    Ok(signal)
}
