//! Summarize a kinetrace output file.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::anyhow;

use kinetrace_model::{DetectionLog, MotionScript, RawSignal};

pub fn run(path: PathBuf) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(&path)
        .map_err(|e| anyhow!("Failed to read {}: {e}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&content)
        .map_err(|e| anyhow!("{} is not JSON: {e}", path.display()))?;

    if value.get("actions").is_some() {
        let script =
            MotionScript::load(&path).map_err(|e| anyhow!("Failed to load script: {e}"))?;
        print_script(&script);
    } else if value.get("samples").is_some() {
        let signal =
            RawSignal::load(&path).map_err(|e| anyhow!("Failed to load raw signal: {e}"))?;
        print_signal(&signal);
    } else if value.get("data").is_some() {
        let log =
            DetectionLog::load(&path).map_err(|e| anyhow!("Failed to load detection log: {e}"))?;
        print_log(&log);
    } else {
        return Err(anyhow!(
            "{} is not a detection log, raw signal or motion script",
            path.display()
        ));
    }
    Ok(())
}

fn print_log(log: &DetectionLog) {
    let frames = log.frames();
    println!("Detection log (version {})", log.version);
    println!("  Records: {}", log.len());
    println!("  Frames with detections: {}", frames.len());
    if let (Some(first), Some(last)) = (frames.first(), frames.last()) {
        println!("  Frame range: {}..={}", first.frame_index, last.frame_index);
    }

    let mut per_class: BTreeMap<u8, (String, usize)> = BTreeMap::new();
    for record in &log.data {
        let name = record
            .class()
            .map(|c| c.name().to_string())
            .unwrap_or_else(|| format!("unknown({})", record.class_id));
        per_class.entry(record.class_id).or_insert((name, 0)).1 += 1;
    }
    println!();
    println!("Classes:");
    for (name, count) in per_class.values() {
        println!("  {name}: {count}");
    }
}

fn print_signal(signal: &RawSignal) {
    println!("Raw signal (version {})", signal.version);
    println!("  FPS: {:.3}", signal.fps);
    println!("  Samples: {}", signal.samples.len());
    if let (Some(first), Some(last)) = (signal.samples.first(), signal.samples.last()) {
        println!("  Span: {}ms..{}ms", first.at_ms, last.at_ms);
    }
    let (min, max) = signal
        .samples
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), s| {
            (lo.min(s.distance), hi.max(s.distance))
        });
    if min.is_finite() {
        println!("  Distance: {min:.1}..{max:.1}");
    }
}

fn print_script(script: &MotionScript) {
    println!("Motion script (version {})", script.version);
    println!("  Author: {}", script.author);
    println!("  Actions: {}", script.actions.len());
    println!("  Duration: {:.1}s", script.duration_ms() as f64 / 1000.0);

    let strokes = script
        .actions
        .windows(2)
        .filter(|w| w[0].pos != w[1].pos)
        .count();
    println!("  Moves: {strokes}");
    match script.validate() {
        Ok(()) => println!("  [OK] Timestamps strictly increasing, positions in range"),
        Err(e) => println!("  [WARN] {e}"),
    }
}
