//! Kinetrace CLI: video to motion script.
//!
//! Usage:
//!   kinetrace detect <VIDEO>     Run the detector over a video
//!   kinetrace track <VIDEO>      Turn detections into a raw distance signal
//!   kinetrace build <VIDEO>      Build the motion script from the raw signal
//!   kinetrace generate <VIDEO>   All of the above
//!   kinetrace info <FILE>        Summarize a detection log, raw signal or script
//!   kinetrace check              Check ffmpeg and hardware decode support

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

use commands::shared::{CurveArgs, DetectArgs, VideoArgs};

#[derive(Parser)]
#[command(
    name = "kinetrace",
    about = "Generate motion scripts from video with object detection",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file to use instead of the standard location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the detector over a video and save the detection log
    Detect {
        #[command(flatten)]
        video: VideoArgs,

        #[command(flatten)]
        detect: DetectArgs,
    },

    /// Run the tracking pass over an existing detection log
    Track {
        #[command(flatten)]
        video: VideoArgs,
    },

    /// Build the motion script from an existing raw signal
    Build {
        #[command(flatten)]
        video: VideoArgs,

        #[command(flatten)]
        curve: CurveArgs,
    },

    /// Detect, track and build in one go
    Generate {
        #[command(flatten)]
        video: VideoArgs,

        #[command(flatten)]
        detect: DetectArgs,

        #[command(flatten)]
        curve: CurveArgs,
    },

    /// Summarize a detection log, raw signal or motion script
    Info {
        /// File to inspect
        path: PathBuf,
    },

    /// Check ffmpeg, ffprobe and hardware decode support
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => kinetrace_common::config::AppConfig::load_from(path),
        None => kinetrace_common::config::AppConfig::load(),
    };

    let mut logging = config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    kinetrace_common::logging::init_logging(&logging);

    match cli.command {
        Commands::Detect { video, detect } => commands::detect::run(config, video, detect).await,
        Commands::Track { video } => commands::track::run(config, video).await,
        Commands::Build { video, curve } => commands::build::run(config, video, curve).await,
        Commands::Generate {
            video,
            detect,
            curve,
        } => commands::generate::run(config, video, detect, curve).await,
        Commands::Info { path } => commands::info::run(path),
        Commands::Check => commands::check::run(config),
    }
}
