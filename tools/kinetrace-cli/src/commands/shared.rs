//! Arguments and helpers shared by the processing commands.

use std::io::Write;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::Args;

use kinetrace_common::config::{AppConfig, ScriptDefaults};
use kinetrace_common::{ProgressReport, StopFlag};
use kinetrace_inference::source::{decode_command, probe_video, DecodeSettings};
use kinetrace_inference::ReprojectMode;
use kinetrace_model::{OutputLayout, RunMetadata, VideoInfo};
use kinetrace_processing::curve::{
    BoostConfig, CurveConfig, Rounding, SimplifyConfig, SmoothingConfig, ThresholdConfig,
};
use kinetrace_processing::tracking::{AnalysisRange, TrackingContext};

#[derive(Args, Debug, Clone)]
pub struct VideoArgs {
    /// Video file to process
    pub video: PathBuf,

    /// Output directory (defaults to the configured one)
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// First frame to process
    #[arg(long, default_value = "0")]
    pub frame_start: u64,

    /// Stop before this frame
    #[arg(long)]
    pub frame_end: Option<u64>,

    /// Panoramic flattening: decoder|in-process|passthrough
    #[arg(long, default_value = "decoder")]
    pub reproject: String,
}

#[derive(Args, Debug, Clone)]
pub struct DetectArgs {
    /// Detector executable speaking the kinetrace detector protocol
    #[arg(long, default_value = "kinetrace-detector")]
    pub detector: PathBuf,

    /// Extra argument for the detector (repeatable)
    #[arg(long = "detector-arg")]
    pub detector_args: Vec<String>,

    /// The detector takes one frame per request
    #[arg(long)]
    pub no_batching: bool,

    /// The detector cannot keep track ids stable
    #[arg(long)]
    pub no_tracking: bool,

    /// Frames per detector request
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Capacity of each pipeline queue, in frames
    #[arg(long)]
    pub queue_capacity: Option<usize>,

    /// Hardware decode: auto|none|cuda|vaapi|amf|videotoolbox|qsv|d3d11va
    #[arg(long)]
    pub hwaccel: Option<String>,

    /// Recompute even when a current detection log exists
    #[arg(long)]
    pub force: bool,
}

#[derive(Args, Debug, Clone)]
pub struct CurveArgs {
    /// Skip Savitzky-Golay smoothing
    #[arg(long)]
    pub no_smoothing: bool,

    /// Smoothing window (odd); derived from fps when omitted
    #[arg(long)]
    pub smoothing_window: Option<usize>,

    /// Skip simplification (also disables rounding by default)
    #[arg(long)]
    pub no_simplify: bool,

    /// Simplification factor (minimum triangle area)
    #[arg(long)]
    pub simplify_factor: Option<f64>,

    /// Skip thresholding
    #[arg(long)]
    pub no_threshold: bool,

    /// Values below this snap to 0
    #[arg(long)]
    pub threshold_low: Option<f64>,

    /// Values above this snap to 100
    #[arg(long)]
    pub threshold_high: Option<f64>,

    /// Skip peak boosting
    #[arg(long)]
    pub no_boost: bool,

    /// Percentage peaks are pushed up
    #[arg(long)]
    pub boost_up: Option<f64>,

    /// Percentage lows are pushed down
    #[arg(long)]
    pub boost_down: Option<f64>,

    /// Rounding: with-simplification|always|off
    #[arg(long)]
    pub rounding: Option<String>,

    /// Round positions to multiples of this
    #[arg(long)]
    pub rounding_step: Option<u32>,

    /// Author written into the script
    #[arg(long)]
    pub author: Option<String>,

    /// Also copy the script next to the video
    #[arg(long)]
    pub copy_to_video_dir: bool,
}

impl CurveArgs {
    /// Curve configuration from config defaults with these flags applied.
    pub fn curve_config(&self, defaults: &ScriptDefaults) -> anyhow::Result<CurveConfig> {
        let mut config = CurveConfig::from(defaults);

        config.smoothing = (!self.no_smoothing).then(|| SmoothingConfig {
            window: self.smoothing_window,
            ..SmoothingConfig::default()
        });
        config.simplify = (!self.no_simplify).then(|| SimplifyConfig {
            factor: self.simplify_factor.unwrap_or(defaults.simplify_factor),
        });
        config.threshold = (!self.no_threshold).then(|| ThresholdConfig {
            low: self.threshold_low.unwrap_or(defaults.threshold_low),
            high: self.threshold_high.unwrap_or(defaults.threshold_high),
        });
        config.boost = (!self.no_boost).then(|| BoostConfig {
            up_pct: self.boost_up.unwrap_or(defaults.boost_up_pct),
            down_pct: self.boost_down.unwrap_or(defaults.boost_down_pct),
            ..BoostConfig::default()
        });
        if let Some(rounding) = &self.rounding {
            config.rounding = rounding.parse::<Rounding>().map_err(|e| anyhow!(e))?;
        }
        if let Some(step) = self.rounding_step {
            config.rounding_step = step;
        }

        if let Some(t) = &config.threshold {
            if t.low > t.high {
                return Err(anyhow!(
                    "threshold low ({}) must not exceed threshold high ({})",
                    t.low,
                    t.high
                ));
            }
        }
        Ok(config)
    }
}

/// A probed video and where its outputs go.
pub struct Job {
    pub config: AppConfig,
    pub video: VideoInfo,
    pub layout: OutputLayout,
    pub decode: DecodeSettings,
    pub range: AnalysisRange,
}

impl Job {
    pub fn prepare(config: AppConfig, args: &VideoArgs) -> anyhow::Result<Self> {
        let video = probe_video(&config.pipeline.ffprobe_path, &args.video)
            .map_err(|e| anyhow!("Failed to probe {}: {e}", args.video.display()))?;

        if let Some(end) = args.frame_end {
            if end <= args.frame_start {
                return Err(anyhow!(
                    "--frame-end ({end}) must be after --frame-start ({})",
                    args.frame_start
                ));
            }
        }

        let output_dir = args
            .output_dir
            .clone()
            .unwrap_or_else(|| config.output_dir.clone());
        let layout = OutputLayout::new(&output_dir, &args.video);
        std::fs::create_dir_all(layout.dir())
            .map_err(|e| anyhow!("Failed to create {}: {e}", layout.dir().display()))?;

        let mut decode = DecodeSettings::from_defaults(&config.pipeline, None);
        decode.reproject = args.reproject.parse::<ReprojectMode>().map_err(|e| anyhow!(e))?;
        decode.frame_start = args.frame_start;
        decode.frame_end = args.frame_end;

        Ok(Self {
            config,
            video,
            layout,
            decode,
            range: AnalysisRange {
                frame_start: args.frame_start,
                frame_end: args.frame_end,
            },
        })
    }

    /// Size of the frames the detector sees; detection boxes live in this space.
    pub fn detection_frame_size(&self) -> (u32, u32) {
        match self.decode.reproject.for_projection(&self.video.projection) {
            ReprojectMode::InProcess => (self.decode.render_resolution, self.decode.render_resolution),
            _ => {
                let command = decode_command(&self.video, &self.decode);
                (command.width, command.height)
            }
        }
    }

    pub fn tracking_context(&self) -> TrackingContext {
        let (frame_width, frame_height) = self.detection_frame_size();
        TrackingContext {
            fps: self.video.fps,
            frame_width,
            frame_height,
            total_frames: self.video.total_frames,
            panoramic: self.video.projection.is_panoramic(),
        }
    }

    pub fn metadata(&self) -> RunMetadata {
        RunMetadata::load_or_new(self.layout.metadata(), &self.video)
    }

    pub fn save_metadata(&self, metadata: &RunMetadata) {
        if let Err(e) = metadata.save(self.layout.metadata()) {
            tracing::warn!(error = %e, "Failed to save run metadata");
        }
    }
}

/// Stop flag raised by Ctrl+C.
pub fn stop_on_ctrl_c() -> StopFlag {
    let stop = StopFlag::new();
    let flag = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nStopping...");
            flag.request_stop();
        }
    });
    stop
}

/// Run blocking work off the async runtime.
pub async fn blocking<T, F>(f: F) -> anyhow::Result<T>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| anyhow!("Worker task failed: {e}"))?
}

pub fn print_progress(report: ProgressReport) {
    print!(
        "\r  {}: {:.1}% ({}/{} frames, ETA: {})  ",
        report.process_name,
        report.fraction() * 100.0,
        report.frames_processed,
        report.total_frames,
        report.eta_string(),
    );
    let _ = std::io::stdout().flush();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn curve_args() -> CurveArgs {
        CurveArgs {
            no_smoothing: false,
            smoothing_window: None,
            no_simplify: false,
            simplify_factor: None,
            no_threshold: false,
            threshold_low: None,
            threshold_high: None,
            no_boost: false,
            boost_up: None,
            boost_down: None,
            rounding: None,
            rounding_step: None,
            author: None,
            copy_to_video_dir: false,
        }
    }

    #[test]
    fn test_curve_flags_override_defaults() {
        let mut args = curve_args();
        args.no_boost = true;
        args.threshold_low = Some(3.0);
        args.rounding = Some("off".into());

        let config = args.curve_config(&ScriptDefaults::default()).unwrap();
        assert!(config.boost.is_none());
        assert_eq!(config.threshold.map(|t| (t.low, t.high)), Some((3.0, 90.0)));
        assert_eq!(config.rounding, Rounding::Off);
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        let mut args = curve_args();
        args.threshold_low = Some(95.0);
        assert!(args.curve_config(&ScriptDefaults::default()).is_err());
    }
}
