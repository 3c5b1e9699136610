use kinetrace_common::KinetraceError;
use kinetrace_model::{DetectionBox, DetectionClass, DetectionLog, Rect};
use kinetrace_processing::tracking::{
    AnalysisRange, InteractionMode, TrackerConfig, TrackingAnalyzer, TrackingContext,
};

fn context(total_frames: u64) -> TrackingContext {
    TrackingContext {
        fps: 30.0,
        frame_width: 1000,
        frame_height: 1000,
        total_frames,
        panoramic: false,
    }
}

fn boxed(class: DetectionClass, rect: Rect, track_id: u32) -> DetectionBox {
    DetectionBox::new(rect, 0.85, class, track_id)
}

/// Reference box standing still while a front region slides along it with a
/// one-second period.
fn strokes_log(frames: u64) -> DetectionLog {
    let mut log = DetectionLog::new();
    for frame in 0..frames {
        let reference = boxed(
            DetectionClass::Reference,
            Rect::new(400.0, 400.0, 600.0, 800.0),
            1,
        );
        let phase = (frame as f64 / 30.0 * std::f64::consts::TAU).sin();
        let y2 = 600.0 + 120.0 * phase;
        let front = boxed(
            DetectionClass::FrontRegion,
            Rect::new(420.0, y2 - 160.0, 580.0, y2),
            2,
        );
        log.append_frame(frame, &[reference, front]).unwrap();
    }
    log
}

#[test]
fn log_without_reference_yields_no_samples() {
    let mut log = DetectionLog::new();
    for frame in 0..120 {
        let hand = boxed(DetectionClass::Hand, Rect::new(10.0, 10.0, 90.0, 90.0), 3);
        log.append_frame(frame, &[hand]).unwrap();
    }

    let analyzer = TrackingAnalyzer::new(TrackerConfig::default(), context(120));
    match analyzer.analyze(&log, AnalysisRange::default()) {
        Err(KinetraceError::NoReferenceFound { frames }) => assert_eq!(frames, 120),
        other => panic!("expected NoReferenceFound, got {other:?}"),
    }
}

#[test]
fn strokes_produce_bounded_varying_signal() {
    let log = strokes_log(600);
    let analyzer = TrackingAnalyzer::new(TrackerConfig::default(), context(600));
    let output = analyzer.analyze(&log, AnalysisRange::default()).unwrap();

    assert_eq!(output.samples.len(), 600);
    assert!(output.samples.iter().all(|s| (0.0..=100.0).contains(&s.distance)));

    let tail = &output.samples[300..];
    let min = tail.iter().map(|s| s.distance).fold(f64::INFINITY, f64::min);
    let max = tail.iter().map(|s| s.distance).fold(f64::NEG_INFINITY, f64::max);
    assert!(max - min > 30.0, "signal barely moves: {min}..{max}");

    let last = output.frame_states.last().unwrap();
    assert_eq!(last.mode, InteractionMode::FrontContact);
    assert!(output
        .mode_changes
        .iter()
        .any(|c| c.mode == InteractionMode::FrontContact));
}

#[test]
fn locked_height_never_decreases() {
    let mut log = DetectionLog::new();
    let heights = [200.0, 260.0, 240.0, 300.0, 120.0, 280.0, 310.0, 50.0];
    for frame in 0..160u64 {
        let h = heights[(frame / 20) as usize];
        let reference = boxed(
            DetectionClass::Reference,
            Rect::new(400.0, 800.0 - h, 600.0, 800.0),
            1,
        );
        log.append_frame(frame, &[reference]).unwrap();
    }

    let analyzer = TrackingAnalyzer::new(TrackerConfig::default(), context(160));
    let output = analyzer.analyze(&log, AnalysisRange::default()).unwrap();

    let locked: Vec<f64> = output
        .frame_states
        .iter()
        .filter(|s| s.locked_box.is_some())
        .map(|s| s.locked_height)
        .collect();
    assert!(!locked.is_empty());
    for pair in locked.windows(2) {
        assert!(pair[1] >= pair[0], "height shrank: {pair:?}");
    }
    assert_eq!(locked.last().copied(), Some(310.0));
}

#[test]
fn analysis_is_deterministic() {
    let log = strokes_log(300);
    let analyzer = TrackingAnalyzer::new(TrackerConfig::default(), context(300));
    let a = analyzer.analyze(&log, AnalysisRange::default()).unwrap();
    let b = analyzer.analyze(&log, AnalysisRange::default()).unwrap();
    assert_eq!(a.samples, b.samples);
    assert_eq!(a.frame_states, b.frame_states);
}

#[test]
fn frame_states_serialize() {
    let log = strokes_log(60);
    let analyzer = TrackingAnalyzer::new(TrackerConfig::default(), context(60));
    let output = analyzer.analyze(&log, AnalysisRange::default()).unwrap();
    let json = serde_json::to_string(&output.frame_states[40]).unwrap();
    assert!(json.contains("\"mode\""));
    assert!(json.contains("\"touching\""));
}
