//! Check external tools and hardware decode support.

use kinetrace_common::config::AppConfig;
use kinetrace_inference::backend::{probe_ffmpeg_backend, resolve_backend, HwAccel};
use kinetrace_inference::source::command_exists;
use kinetrace_inference::HwAccelChoice;

pub fn run(config: AppConfig) -> anyhow::Result<()> {
    println!("Kinetrace System Check");
    println!("{}", "=".repeat(50));

    let ffmpeg = &config.pipeline.ffmpeg_path;
    let ffprobe = &config.pipeline.ffprobe_path;
    let ffmpeg_ok = command_exists(ffmpeg);
    let ffprobe_ok = command_exists(ffprobe);
    report(ffmpeg_ok, &format!("ffmpeg: {}", ffmpeg.display()));
    report(ffprobe_ok, &format!("ffprobe: {}", ffprobe.display()));

    if ffmpeg_ok {
        println!();
        println!("Hardware decode backends:");
        for backend in HwAccel::PRIORITY {
            let ok = probe_ffmpeg_backend(ffmpeg, backend);
            println!("  [{}] {backend}", if ok { "OK" } else { "--" });
        }

        let choice = config
            .pipeline
            .hwaccel
            .parse::<HwAccelChoice>()
            .map_err(|e| anyhow::anyhow!("Invalid pipeline.hwaccel: {e}"))?;
        let selected = resolve_backend(choice, ffmpeg);
        println!(
            "  Selected: {}",
            selected.map_or("software".to_string(), |hw| hw.to_string())
        );
    }

    println!();
    println!("Output directory: {}", config.output_dir.display());
    println!(
        "Config file: {}",
        kinetrace_common::config::config_file_path().display()
    );

    println!();
    if ffmpeg_ok && ffprobe_ok {
        println!("All required tools are available. Kinetrace is ready.");
    } else {
        println!("ffmpeg and ffprobe are required. Install them or set their paths in the config.");
    }
    Ok(())
}

fn report(ok: bool, what: &str) {
    if ok {
        println!("[OK] {what}");
    } else {
        println!("[MISSING] {what}");
    }
}
