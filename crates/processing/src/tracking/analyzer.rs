//! Sequential tracking pass over a persisted detection log.

use std::time::Duration;

use kinetrace_common::{
    KinetraceError, KinetraceResult, ProgressCallback, ProgressReport, RateController, RunClock,
    StopFlag,
};
use kinetrace_model::{DetectionClass, DetectionLog, RawSample};
use tracing::{debug, info};

use super::{ContactTracker, FrameState, ModeChange, TrackerConfig, TrackingContext};

/// Frames the caller wants analyzed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnalysisRange {
    pub frame_start: u64,

    /// Exclusive end; `None` runs to the end of the video.
    pub frame_end: Option<u64>,
}

/// Everything a tracking pass produces.
#[derive(Debug, Clone)]
pub struct TrackingOutput {
    /// One sample per analyzed frame that carried detections.
    pub samples: Vec<RawSample>,

    /// Tracker state after each of those frames.
    pub frame_states: Vec<FrameState>,

    pub mode_changes: Vec<ModeChange>,

    /// First frame actually analyzed.
    pub start_frame: u64,

    pub frames_analyzed: u64,
}

/// Drives a [`ContactTracker`] over a detection log.
pub struct TrackingAnalyzer {
    config: TrackerConfig,
    ctx: TrackingContext,
    progress: Option<ProgressCallback>,
    progress_interval: Duration,
    stop: StopFlag,
}

impl TrackingAnalyzer {
    pub fn new(config: TrackerConfig, ctx: TrackingContext) -> Self {
        Self {
            config,
            ctx,
            progress: None,
            progress_interval: Duration::from_millis(250),
            stop: StopFlag::new(),
        }
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    pub fn with_stop(mut self, stop: StopFlag) -> Self {
        self.stop = stop;
        self
    }

    /// Run the tracker over `log` and emit raw samples.
    ///
    /// Fails with [`KinetraceError::NoReferenceFound`] when the reference class
    /// never shows up confidently; nothing is emitted in that case.
    pub fn analyze(
        &self,
        log: &DetectionLog,
        range: AnalysisRange,
    ) -> KinetraceResult<TrackingOutput> {
        let frames = log.frames();
        let Some(first_reference) = find_first_reference_frame(log, &self.config) else {
            return Err(KinetraceError::NoReferenceFound {
                frames: frames.len() as u64,
            });
        };

        let lead_in = self.ctx.whole_fps();
        let start_frame = first_reference
            .saturating_sub(lead_in)
            .max(range.frame_start.saturating_sub(lead_in));
        let end_frame = range.frame_end.unwrap_or(self.ctx.total_frames);
        let total = end_frame.saturating_sub(start_frame);
        info!(
            first_reference,
            start_frame, end_frame, "Starting tracking analysis"
        );

        let mut tracker = ContactTracker::new(self.config.clone(), self.ctx);
        let mut samples = Vec::new();
        let mut frame_states = Vec::new();
        let mut rate = RateController::new(self.progress_interval);
        let clock = RunClock::start();

        for frame in frames
            .iter()
            .filter(|f| f.frame_index >= start_frame && f.frame_index < end_frame)
        {
            if self.stop.is_stopped() {
                info!(frame = frame.frame_index, "Tracking analysis cancelled");
                return Err(KinetraceError::Cancelled);
            }

            let state = tracker.process_frame(frame.frame_index, &frame.boxes);
            samples.push(RawSample::from_frame(
                frame.frame_index,
                self.ctx.fps,
                state.distance as f64,
            ));
            frame_states.push(state);

            if let Some(callback) = &self.progress {
                if rate.should_tick(clock.elapsed()) {
                    let processed = frame.frame_index - start_frame + 1;
                    callback(ProgressReport::new(
                        "tracking",
                        processed,
                        total,
                        clock.elapsed(),
                    ));
                }
            }
        }

        if let Some(callback) = &self.progress {
            callback(ProgressReport::new("tracking", total, total, clock.elapsed()));
        }

        let mode_changes = tracker.into_mode_changes();
        debug!(
            samples = samples.len(),
            mode_changes = mode_changes.len(),
            elapsed_secs = clock.elapsed_secs(),
            "Tracking analysis finished"
        );

        Ok(TrackingOutput {
            frames_analyzed: samples.len() as u64,
            samples,
            frame_states,
            mode_changes,
            start_frame,
        })
    }
}

/// First frame of a sustained, confident run of reference detections.
///
/// Returns the frame where the run started counting, `None` if the log never
/// holds such a run.
pub fn find_first_reference_frame(log: &DetectionLog, config: &TrackerConfig) -> Option<u64> {
    let reference = DetectionClass::Reference.id();
    let run = config.first_reference_run;
    let mut previous: Option<u64> = None;
    let mut consecutive = 0u64;

    for record in &log.data {
        if record.class_id != reference || record.confidence < config.first_reference_confidence {
            continue;
        }
        let frame = record.frame_index;
        match previous {
            Some(p) if p == frame => continue,
            Some(p) if p + 1 == frame => consecutive += 1,
            _ => consecutive = 0,
        }
        previous = Some(frame);
        if consecutive > run {
            return Some(frame - run);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use kinetrace_model::{DetectionBox, Rect};

    fn ctx(total_frames: u64) -> TrackingContext {
        TrackingContext {
            fps: 10.0,
            frame_width: 1000,
            frame_height: 1000,
            total_frames,
            panoramic: false,
        }
    }

    fn reference(confidence: f64) -> DetectionBox {
        DetectionBox::new(
            Rect::new(400.0, 400.0, 600.0, 800.0),
            confidence,
            DetectionClass::Reference,
            1,
        )
    }

    fn log_with_reference(frames: impl IntoIterator<Item = u64>, confidence: f64) -> DetectionLog {
        let mut log = DetectionLog::new();
        for frame in frames {
            log.append_frame(frame, &[reference(confidence)]).unwrap();
        }
        log
    }

    #[test]
    fn test_first_reference_needs_a_run() {
        let config = TrackerConfig::default();
        let log = log_with_reference([3, 4, 5, 20, 21, 22, 23, 24, 25, 26, 27], 0.9);
        // The run through frame 26 is the sixth consecutive follow-up.
        assert_eq!(find_first_reference_frame(&log, &config), Some(21));

        let short = log_with_reference(0..5, 0.9);
        assert_eq!(find_first_reference_frame(&short, &config), None);

        let weak = log_with_reference(0..50, 0.4);
        assert_eq!(find_first_reference_frame(&weak, &config), None);
    }

    #[test]
    fn test_analyze_emits_one_sample_per_frame() {
        let log = log_with_reference(0..40, 0.9);
        let analyzer = TrackingAnalyzer::new(TrackerConfig::default(), ctx(40));
        let output = analyzer.analyze(&log, AnalysisRange::default()).unwrap();

        assert_eq!(output.start_frame, 0);
        assert_eq!(output.samples.len(), 40);
        assert_eq!(output.frame_states.len(), 40);
        assert_eq!(output.samples[10].at_ms, 1000);
        assert!(output.samples.iter().all(|s| s.distance <= 100.0));
    }

    #[test]
    fn test_range_limits_frames() {
        let log = log_with_reference(0..100, 0.9);
        let analyzer = TrackingAnalyzer::new(TrackerConfig::default(), ctx(100));
        let range = AnalysisRange {
            frame_start: 50,
            frame_end: Some(70),
        };
        let output = analyzer.analyze(&log, range).unwrap();

        // One second of lead-in before the requested start.
        assert_eq!(output.start_frame, 40);
        assert_eq!(output.frames_analyzed, 30);
    }

    #[test]
    fn test_stop_flag_cancels() {
        let log = log_with_reference(0..40, 0.9);
        let stop = StopFlag::new();
        stop.request_stop();
        let analyzer =
            TrackingAnalyzer::new(TrackerConfig::default(), ctx(40)).with_stop(stop);
        let err = analyzer.analyze(&log, AnalysisRange::default()).unwrap_err();
        assert!(err.is_cancelled());
    }
}
