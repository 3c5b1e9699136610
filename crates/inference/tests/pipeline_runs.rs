use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use kinetrace_common::{KinetraceError, KinetraceResult, ProgressReport, StopFlag};
use kinetrace_inference::{
    Detector, DetectorInput, InferencePipeline, PipelineConfig, ReprojectMode,
    SyntheticFrameSource,
};
use kinetrace_model::{DetectionBox, DetectionClass, DetectionLog, PanoramicLayout, Projection, Rect};

/// Emits one reference box per frame carrying the frame index as track id,
/// sleeping a varying amount per frame.
struct Scripted {
    batch_sizes: Arc<Mutex<Vec<usize>>>,
    widths: Arc<Mutex<Vec<u32>>>,
    fail_at: Option<u64>,
    latency: Duration,
}

impl Scripted {
    fn new() -> Self {
        Self {
            batch_sizes: Arc::default(),
            widths: Arc::default(),
            fail_at: None,
            latency: Duration::ZERO,
        }
    }
}

impl Detector for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }

    fn detect_batch(&mut self, batch: &[DetectorInput<'_>]) -> KinetraceResult<Vec<Vec<DetectionBox>>> {
        self.batch_sizes.lock().unwrap().push(batch.len());
        let mut results = Vec::with_capacity(batch.len());
        for input in batch {
            if self.fail_at == Some(input.frame_index) {
                return Err(KinetraceError::detector("scripted failure"));
            }
            self.widths.lock().unwrap().push(input.width);
            thread::sleep(self.latency * (input.frame_index % 3) as u32);
            results.push(vec![DetectionBox::new(
                Rect::new(10.0, 10.0, 50.0, 90.0),
                0.9,
                DetectionClass::Reference,
                input.frame_index as u32,
            )]);
        }
        Ok(results)
    }
}

fn config(queue_capacity: usize, batch_size: usize) -> PipelineConfig {
    PipelineConfig {
        queue_capacity,
        batch_size,
        poll_interval: Duration::from_millis(20),
        progress_interval: Duration::from_millis(100),
        ..PipelineConfig::default()
    }
}

fn temp_path(tag: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("kinetrace-pipeline-{tag}-{}.json", std::process::id()))
}

#[test]
fn test_records_every_frame_in_order() {
    let mut detector = Scripted::new();
    detector.latency = Duration::from_millis(2);

    let output = InferencePipeline::new(config(4, 5), StopFlag::new())
        .run(Box::new(SyntheticFrameSource::new(8, 8, 40)), Box::new(detector))
        .unwrap();

    assert_eq!(output.frames_recorded, 40);
    let frames: Vec<u64> = output.log.data.iter().map(|r| r.frame_index).collect();
    assert_eq!(frames, (0..40).collect::<Vec<_>>());
    assert!(output
        .log
        .data
        .iter()
        .all(|r| u64::from(r.track_id) == r.frame_index));
    assert!(output.stage_timings.contains_key("decode"));
    assert!(output.stage_timings.contains_key("detect"));
}

#[test]
fn test_partial_batch_is_flushed_at_end() {
    let detector = Scripted::new();
    let sizes = Arc::clone(&detector.batch_sizes);

    let output = InferencePipeline::new(config(16, 4), StopFlag::new())
        .run(Box::new(SyntheticFrameSource::new(4, 4, 10)), Box::new(detector))
        .unwrap();

    assert_eq!(output.frames_recorded, 10);
    assert_eq!(*sizes.lock().unwrap(), vec![4, 4, 2]);
}

#[test]
fn test_detector_failure_is_reported_and_nothing_saved() {
    let path = temp_path("fail");
    let _ = std::fs::remove_file(&path);

    let mut detector = Scripted::new();
    detector.fail_at = Some(17);

    let err = InferencePipeline::new(config(2, 3), StopFlag::new())
        .with_output(&path)
        .run(Box::new(SyntheticFrameSource::new(4, 4, 100)), Box::new(detector))
        .unwrap_err();

    assert!(matches!(err, KinetraceError::Detector { .. }), "{err}");
    assert!(!path.exists());
}

#[test]
fn test_source_failure_is_reported() {
    let err = InferencePipeline::new(config(2, 1), StopFlag::new())
        .run(
            Box::new(SyntheticFrameSource::new(4, 4, 50).with_failure_at(12)),
            Box::new(Scripted::new()),
        )
        .unwrap_err();
    assert!(matches!(err, KinetraceError::Decode { .. }), "{err}");
}

#[test]
fn test_stop_request_cancels_run() {
    let stop = StopFlag::new();
    let trigger = stop.clone();
    let stopper = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        trigger.request_stop();
    });

    let started = Instant::now();
    let err = InferencePipeline::new(config(2, 1), stop)
        .run(
            Box::new(SyntheticFrameSource::new(4, 4, 10_000).with_delay(Duration::from_millis(5))),
            Box::new(Scripted::new()),
        )
        .unwrap_err();
    stopper.join().unwrap();

    assert!(err.is_cancelled(), "{err}");
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn test_saved_log_matches_output() {
    let path = temp_path("save");
    let output = InferencePipeline::new(config(8, 8), StopFlag::new())
        .with_output(&path)
        .run(Box::new(SyntheticFrameSource::new(4, 4, 12)), Box::new(Scripted::new()))
        .unwrap();

    assert!(output.saved);
    let loaded = DetectionLog::load(&path).unwrap();
    assert_eq!(loaded, output.log);
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn test_in_process_reprojection_feeds_square_frames() {
    let detector = Scripted::new();
    let widths = Arc::clone(&detector.widths);

    let mut cfg = config(4, 2);
    cfg.reproject = ReprojectMode::InProcess;
    cfg.render_resolution = 16;

    InferencePipeline::new(cfg, StopFlag::new())
        .with_projection(Projection::Panoramic {
            layout: PanoramicLayout::SideBySide,
            fov: 180,
            fisheye: false,
        })
        .run(Box::new(SyntheticFrameSource::new(64, 32, 6)), Box::new(detector))
        .unwrap();

    assert_eq!(*widths.lock().unwrap(), vec![16; 6]);
}

#[test]
fn test_progress_ends_with_full_count() {
    let reports = Arc::new(Mutex::new(Vec::<ProgressReport>::new()));
    let sink = Arc::clone(&reports);

    InferencePipeline::new(config(4, 4), StopFlag::new())
        .with_progress(Box::new(move |r| sink.lock().unwrap().push(r)))
        .run(Box::new(SyntheticFrameSource::new(4, 4, 20)), Box::new(Scripted::new()))
        .unwrap();

    let reports = reports.lock().unwrap();
    let last = reports.last().unwrap();
    assert_eq!(last.process_name, "inference");
    assert_eq!((last.frames_processed, last.total_frames), (20, 20));
    assert_eq!(last.eta_string(), "00:00:00");
}
