//! Run the detection pipeline over a video.

use anyhow::anyhow;

use kinetrace_common::{KinetraceError, StopFlag};
use kinetrace_inference::backend::resolve_backend;
use kinetrace_inference::{
    FfmpegFrameSource, HwAccelChoice, InferencePipeline, PipelineConfig, ProcessDetector,
    ProcessDetectorConfig,
};
use kinetrace_model::DetectionLog;

use super::shared::{self, DetectArgs, Job, VideoArgs};

pub async fn run(
    config: kinetrace_common::config::AppConfig,
    video: VideoArgs,
    detect: DetectArgs,
) -> anyhow::Result<()> {
    let stop = shared::stop_on_ctrl_c();
    let log = shared::blocking(move || {
        let job = Job::prepare(config, &video)?;
        println!("Detecting objects in: {}", job.video.path.display());
        let log = detect_video(&job, &detect, stop)?;
        println!("  Detection log: {}", job.layout.detection_log().display());
        Ok(log)
    })
    .await?;

    println!("  Records: {}", log.len());
    Ok(())
}

/// Produce the detection log for `job`, reusing a current one unless forced.
pub fn detect_video(job: &Job, args: &DetectArgs, stop: StopFlag) -> anyhow::Result<DetectionLog> {
    let path = job.layout.detection_log();
    if !args.force {
        if let Some(log) = DetectionLog::load_current(&path) {
            tracing::info!(path = %path.display(), records = log.len(), "Reusing detection log");
            println!("  Reusing existing detection log");
            return Ok(log);
        }
    }

    let choice_str = args
        .hwaccel
        .clone()
        .unwrap_or_else(|| job.config.pipeline.hwaccel.clone());
    let choice = choice_str
        .parse::<HwAccelChoice>()
        .map_err(|e| anyhow!(e))?;
    let mut decode = job.decode.clone();
    decode.hwaccel = resolve_backend(choice, &decode.ffmpeg_path);

    let mut pipeline_config = PipelineConfig::from(&job.config.pipeline);
    pipeline_config.reproject = decode.reproject;
    if let Some(batch_size) = args.batch_size {
        pipeline_config.batch_size = batch_size.max(1);
    }
    if let Some(capacity) = args.queue_capacity {
        pipeline_config.queue_capacity = capacity.max(1);
    }

    let detector = ProcessDetector::spawn(ProcessDetectorConfig {
        program: args.detector.clone(),
        args: args.detector_args.clone(),
        batching: !args.no_batching,
        tracking: !args.no_tracking,
    })
    .map_err(|e| anyhow!("Failed to start detector: {e}"))?;
    let detector_name = args.detector.display().to_string();

    println!(
        "  Decode: {} ({})",
        decode.hwaccel.map_or("software", |hw| hw.name()),
        decode.reproject
    );

    let source = FfmpegFrameSource::new(job.video.clone(), decode);
    let result = InferencePipeline::new(pipeline_config, stop)
        .with_projection(job.video.projection)
        .with_output(&path)
        .with_progress(Box::new(shared::print_progress))
        .run(Box::new(source), Box::new(detector));
    println!();

    let output = match result {
        Ok(output) => output,
        Err(KinetraceError::Cancelled) => return Err(anyhow!("Detection cancelled")),
        Err(e) => return Err(anyhow!("Detection failed: {e}")),
    };

    for (stage, mean) in &output.stage_timings {
        println!("  {stage}: {:.2} ms/frame", mean.as_secs_f64() * 1000.0);
    }
    println!(
        "  Frames: {} in {:.1}s",
        output.frames_recorded,
        output.elapsed.as_secs_f64()
    );

    let mut metadata = job.metadata();
    metadata.mark_detection(detector_name);
    job.save_metadata(&metadata);

    Ok(output.log)
}
