//! Clock and timing utilities for progress reporting.
//!
//! Every long-running pass (inference, tracking) anchors a [`RunClock`] at its
//! start and pushes [`ProgressReport`]s through a throttled callback. ETA is
//! `elapsed * remaining / processed`.

use std::time::{Duration, Instant};

/// Smallest interval at which progress may be pushed to a caller.
pub const MIN_PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

/// A monotonic clock anchored at the start of a run.
#[derive(Debug, Clone)]
pub struct RunClock {
    /// The instant the run started.
    epoch: Instant,

    /// Wall-clock time at epoch (RFC 3339 string).
    epoch_wall: String,
}

impl RunClock {
    /// Create a new clock anchored to now.
    pub fn start() -> Self {
        Self {
            epoch: Instant::now(),
            epoch_wall: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Time elapsed since the run started.
    pub fn elapsed(&self) -> Duration {
        self.epoch.elapsed()
    }

    /// Seconds elapsed since the run started.
    pub fn elapsed_secs(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    /// Wall-clock time at run start.
    pub fn epoch_wall(&self) -> &str {
        &self.epoch_wall
    }

    /// The underlying epoch instant.
    pub fn epoch(&self) -> Instant {
        self.epoch
    }
}

/// Rate limiter for progress pushes.
#[derive(Debug)]
pub struct RateController {
    interval: Duration,
    last_tick: Option<Duration>,
}

impl RateController {
    /// Create a controller with the given interval, floored at [`MIN_PROGRESS_INTERVAL`].
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(MIN_PROGRESS_INTERVAL),
            last_tick: None,
        }
    }

    /// Check if enough time has passed for the next tick.
    /// Returns true and updates internal state if ready.
    /// The first call always returns true.
    pub fn should_tick(&mut self, now: Duration) -> bool {
        match self.last_tick {
            None => {
                self.last_tick = Some(now);
                true
            }
            Some(last) if now >= last + self.interval => {
                self.last_tick = Some(now);
                true
            }
            _ => false,
        }
    }

    /// Effective interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

/// Progress pushed to callers of long-running passes.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressReport {
    /// Which pass is reporting ("inference", "tracking").
    pub process_name: String,

    /// Frames fully handled so far.
    pub frames_processed: u64,

    /// Frames expected in total.
    pub total_frames: u64,

    /// Estimated time remaining, once at least one frame is done.
    pub eta: Option<Duration>,
}

impl ProgressReport {
    pub fn new(
        process_name: impl Into<String>,
        frames_processed: u64,
        total_frames: u64,
        elapsed: Duration,
    ) -> Self {
        Self {
            process_name: process_name.into(),
            frames_processed,
            total_frames,
            eta: estimate_eta(elapsed, frames_processed, total_frames),
        }
    }

    /// ETA rendered as `HH:MM:SS`, or `Calculating...` before the first frame.
    pub fn eta_string(&self) -> String {
        format_eta(self.eta)
    }

    /// Completed fraction in `[0.0, 1.0]`.
    pub fn fraction(&self) -> f64 {
        if self.total_frames == 0 {
            return 0.0;
        }
        (self.frames_processed as f64 / self.total_frames as f64).clamp(0.0, 1.0)
    }
}

/// Callback receiving progress reports.
pub type ProgressCallback = Box<dyn Fn(ProgressReport) + Send>;

/// `elapsed * remaining / processed`; `None` until something was processed.
pub fn estimate_eta(elapsed: Duration, processed: u64, total: u64) -> Option<Duration> {
    if processed == 0 {
        return None;
    }
    let remaining = total.saturating_sub(processed);
    Some(elapsed.mul_f64(remaining as f64 / processed as f64))
}

/// Format an ETA as `HH:MM:SS`.
pub fn format_eta(eta: Option<Duration>) -> String {
    match eta {
        Some(eta) => {
            let secs = eta.as_secs();
            format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
        }
        None => "Calculating...".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_elapsed() {
        let clock = RunClock::start();
        assert!(clock.elapsed() < Duration::from_secs(1));
        assert!(!clock.epoch_wall().is_empty());
    }

    #[test]
    fn test_rate_controller() {
        let mut ctrl = RateController::new(Duration::from_millis(250));
        assert!(ctrl.should_tick(Duration::ZERO));
        assert!(!ctrl.should_tick(Duration::from_millis(100)));
        assert!(ctrl.should_tick(Duration::from_millis(260)));
    }

    #[test]
    fn test_rate_controller_floor() {
        let ctrl = RateController::new(Duration::from_millis(5));
        assert_eq!(ctrl.interval(), MIN_PROGRESS_INTERVAL);
    }

    #[test]
    fn test_eta_formula() {
        let eta = estimate_eta(Duration::from_secs(10), 100, 400).unwrap();
        assert_eq!(eta, Duration::from_secs(30));
        assert!(estimate_eta(Duration::from_secs(10), 0, 400).is_none());
        assert_eq!(
            estimate_eta(Duration::from_secs(10), 500, 400),
            Some(Duration::ZERO)
        );
    }

    #[test]
    fn test_eta_string() {
        assert_eq!(format_eta(None), "Calculating...");
        assert_eq!(format_eta(Some(Duration::from_secs(3725))), "01:02:05");
    }

    #[test]
    fn test_report_fraction() {
        let report = ProgressReport::new("inference", 25, 100, Duration::from_secs(5));
        assert!((report.fraction() - 0.25).abs() < 1e-9);
        assert_eq!(report.eta_string(), "00:00:15");
    }
}
