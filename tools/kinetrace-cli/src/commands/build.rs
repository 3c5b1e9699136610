//! Curve building: raw signal to motion script.

use anyhow::anyhow;

use kinetrace_model::{script_beside_video, ExportOutcome, MotionScript, RawSignal};
use kinetrace_processing::CurveBuilder;

use super::shared::{self, CurveArgs, Job, VideoArgs};

pub async fn run(
    config: kinetrace_common::config::AppConfig,
    video: VideoArgs,
    curve: CurveArgs,
) -> anyhow::Result<()> {
    shared::blocking(move || {
        let job = Job::prepare(config, &video)?;
        let path = job.layout.raw_signal();
        let signal = RawSignal::load_current(&path).ok_or_else(|| {
            anyhow!(
                "No usable raw signal at {}; run `kinetrace track` first",
                path.display()
            )
        })?;
        build_script(&job, &signal, &curve)?;
        Ok(())
    })
    .await
}

/// Build, save and optionally export the motion script.
pub fn build_script(job: &Job, signal: &RawSignal, args: &CurveArgs) -> anyhow::Result<MotionScript> {
    let defaults = &job.config.script;
    let config = args.curve_config(defaults)?;
    let author = args.author.clone().unwrap_or_else(|| defaults.author.clone());

    let script = CurveBuilder::new(config, signal.fps).build(&signal.samples, &author);
    script
        .validate()
        .map_err(|e| anyhow!("Built an invalid script: {e}"))?;

    let path = job.layout.script();
    script
        .save(&path)
        .map_err(|e| anyhow!("Failed to save script: {e}"))?;
    println!(
        "Script: {} ({} actions from {} samples)",
        path.display(),
        script.actions.len(),
        signal.samples.len()
    );

    if args.copy_to_video_dir || defaults.copy_to_video_dir {
        let dest = script_beside_video(&job.video.path);
        match script
            .export_to(&dest, defaults.make_backup)
            .map_err(|e| anyhow!("Failed to copy script next to the video: {e}"))?
        {
            ExportOutcome::Written { backup } => {
                println!("  Copied to: {}", dest.display());
                if let Some(backup) = backup {
                    println!("  Previous script kept as: {}", backup.display());
                }
            }
            ExportOutcome::SkippedForeign => {
                println!("  Not copied: {} was written by someone else", dest.display());
            }
        }
    }

    let mut metadata = job.metadata();
    metadata.mark_script();
    job.save_metadata(&metadata);

    Ok(script)
}
