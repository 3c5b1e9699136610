//! Raw contact-distance signal emitted by the tracker.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::io::{read_json, write_json};
use crate::version::{version_is_less_than, RAW_SIGNAL_VERSION};

/// One raw distance sample, persisted as `[at_ms, distance]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "(u64, f64)", into = "(u64, f64)")]
pub struct RawSample {
    pub at_ms: u64,

    /// Contact distance in `[0, 100]`; 100 is "fully apart".
    pub distance: f64,
}

impl RawSample {
    pub fn new(at_ms: u64, distance: f64) -> Self {
        Self { at_ms, distance }
    }

    /// Sample for a frame index at the given frame rate.
    pub fn from_frame(frame_index: u64, fps: f64, distance: f64) -> Self {
        Self {
            at_ms: frame_to_ms(frame_index, fps),
            distance,
        }
    }
}

impl From<(u64, f64)> for RawSample {
    fn from((at_ms, distance): (u64, f64)) -> Self {
        Self { at_ms, distance }
    }
}

impl From<RawSample> for (u64, f64) {
    fn from(s: RawSample) -> Self {
        (s.at_ms, s.distance)
    }
}

/// Milliseconds at which a frame is shown, truncated.
pub fn frame_to_ms(frame_index: u64, fps: f64) -> u64 {
    if fps <= 0.0 {
        return 0;
    }
    (frame_index as f64 * 1000.0 / fps) as u64
}

/// On-disk raw signal: `{version, fps, samples: [[at_ms, distance], ...]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSignal {
    pub version: String,
    pub fps: f64,
    pub samples: Vec<RawSample>,
}

impl RawSignal {
    pub fn new(fps: f64, samples: Vec<RawSample>) -> Self {
        Self {
            version: RAW_SIGNAL_VERSION.to_string(),
            fps,
            samples,
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let signal: RawSignal = read_json(path)?;
        if version_is_less_than(&signal.version, RAW_SIGNAL_VERSION) {
            return Err(ModelError::Outdated {
                path: path.to_path_buf(),
                found: signal.version,
                expected: RAW_SIGNAL_VERSION.to_string(),
            });
        }
        if signal.fps <= 0.0 {
            return Err(ModelError::validation(format!(
                "raw signal at {} has fps {}",
                path.display(),
                signal.fps
            )));
        }
        Ok(signal)
    }

    /// Load a signal that can be reused, `None` when missing or unusable.
    pub fn load_current(path: impl AsRef<Path>) -> Option<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return None;
        }
        match Self::load(path) {
            Ok(signal) => Some(signal),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring unusable raw signal");
                None
            }
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ModelError> {
        write_json(path.as_ref(), self, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_to_ms() {
        assert_eq!(frame_to_ms(0, 25.0), 0);
        assert_eq!(frame_to_ms(1, 25.0), 40);
        assert_eq!(frame_to_ms(1, 29.97), 33);
        assert_eq!(frame_to_ms(10, 0.0), 0);
    }

    #[test]
    fn test_sample_serializes_as_pair() {
        let signal = RawSignal::new(25.0, vec![RawSample::from_frame(2, 25.0, 42.0)]);
        let json = serde_json::to_string(&signal).unwrap();
        assert!(json.contains("[[80,42.0]]"));
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!(
            "kinetrace-signal-{}.json",
            std::process::id()
        ));
        let signal = RawSignal::new(30.0, vec![RawSample::new(0, 100.0), RawSample::new(33, 90.0)]);
        signal.save(&path).unwrap();
        assert_eq!(RawSignal::load(&path).unwrap(), signal);
        std::fs::remove_file(&path).ok();
    }
}
