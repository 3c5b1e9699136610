//! Detect, track and build in one run.

use std::time::Instant;

use kinetrace_common::config::AppConfig;

use super::build::build_script;
use super::detect::detect_video;
use super::shared::{self, CurveArgs, DetectArgs, Job, VideoArgs};
use super::track::track_video;

pub async fn run(
    config: AppConfig,
    video: VideoArgs,
    detect: DetectArgs,
    curve: CurveArgs,
) -> anyhow::Result<()> {
    let stop = shared::stop_on_ctrl_c();
    shared::blocking(move || {
        let started = Instant::now();
        let job = Job::prepare(config, &video)?;
        println!("Generating motion script for: {}", job.video.path.display());
        println!(
            "  Video: {}x{} @ {:.2}fps, {} frames{}",
            job.video.width,
            job.video.height,
            job.video.fps,
            job.video.total_frames,
            if job.video.projection.is_panoramic() {
                " (panoramic)"
            } else {
                ""
            }
        );

        let log = detect_video(&job, &detect, stop.clone())?;
        let signal = track_video(&job, &log, stop)?;
        build_script(&job, &signal, &curve)?;

        println!("Done in {:.1}s", started.elapsed().as_secs_f64());
        Ok(())
    })
    .await
}
