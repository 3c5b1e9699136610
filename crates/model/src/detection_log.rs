//! Versioned detection log written by the inference pipeline.
//!
//! On disk: `{"version": "...", "data": [[frame, class, conf, x1, y1, x2, y2, track], ...]}`.
//! Records are ascending by frame; frames without detections are absent.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::detection::{sort_by_priority, DetectionBox, DetectionRecord};
use crate::error::ModelError;
use crate::io::{read_json, write_json};
use crate::version::{version_is_less_than, DETECTION_LOG_VERSION};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionLog {
    pub version: String,
    pub data: Vec<DetectionRecord>,
}

/// All detections of one frame, in analysis order.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameDetections {
    pub frame_index: u64,
    pub boxes: Vec<DetectionBox>,
}

impl Default for DetectionLog {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectionLog {
    /// An empty log at the current version.
    pub fn new() -> Self {
        Self {
            version: DETECTION_LOG_VERSION.to_string(),
            data: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Index of the last frame holding records.
    pub fn last_frame(&self) -> Option<u64> {
        self.data.last().map(|r| r.frame_index)
    }

    /// Append one frame's detections. Frames must arrive in increasing order.
    pub fn append_frame(
        &mut self,
        frame_index: u64,
        detections: &[DetectionBox],
    ) -> Result<(), ModelError> {
        if detections.is_empty() {
            return Ok(());
        }
        if let Some(last) = self.last_frame() {
            if frame_index <= last {
                return Err(ModelError::validation(format!(
                    "frame {frame_index} recorded after frame {last}"
                )));
            }
        }
        self.data.extend(
            detections
                .iter()
                .map(|d| DetectionRecord::from_detection(frame_index, d)),
        );
        Ok(())
    }

    /// Check that records are ascending by frame.
    pub fn validate(&self) -> Result<(), ModelError> {
        for pair in self.data.windows(2) {
            if pair[1].frame_index < pair[0].frame_index {
                return Err(ModelError::validation(format!(
                    "record for frame {} follows frame {}",
                    pair[1].frame_index, pair[0].frame_index
                )));
            }
        }
        Ok(())
    }

    /// Group records per frame, sorted by class priority.
    ///
    /// Records with unknown class ids are dropped with a warning.
    pub fn frames(&self) -> Vec<FrameDetections> {
        let mut frames: Vec<FrameDetections> = Vec::new();
        let mut unknown = 0usize;

        for record in &self.data {
            let Some(detection) = record.to_detection() else {
                unknown += 1;
                continue;
            };
            match frames.last_mut() {
                Some(frame) if frame.frame_index == record.frame_index => {
                    frame.boxes.push(detection);
                    continue;
                }
                _ => {}
            }
            frames.push(FrameDetections {
                frame_index: record.frame_index,
                boxes: vec![detection],
            });
        }

        if unknown > 0 {
            tracing::warn!(records = unknown, "Skipped detections with unknown class ids");
        }

        for frame in &mut frames {
            sort_by_priority(&mut frame.boxes);
        }
        frames
    }

    /// Load a log, rejecting older versions and unordered data.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let log: DetectionLog = read_json(path)?;
        if version_is_less_than(&log.version, DETECTION_LOG_VERSION) {
            return Err(ModelError::Outdated {
                path: path.to_path_buf(),
                found: log.version,
                expected: DETECTION_LOG_VERSION.to_string(),
            });
        }
        log.validate()?;
        Ok(log)
    }

    /// Load a log that can be reused as-is.
    ///
    /// Missing, empty, outdated, or malformed logs yield `None` so the caller
    /// recomputes instead of failing.
    pub fn load_current(path: impl AsRef<Path>) -> Option<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No detection log yet");
            return None;
        }
        match Self::load(path) {
            Ok(log) if log.is_empty() => {
                tracing::warn!(path = %path.display(), "Detection log is empty, recomputing");
                None
            }
            Ok(log) => Some(log),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring unusable detection log");
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
    use crate::detection::{DetectionClass, Rect};

    fn temp_path(tag: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!(
            "kinetrace-log-{tag}-{}.json",
            std::process::id()
        ))
    }

    fn detection(class: DetectionClass, conf: f64, track: u32) -> DetectionBox {
        DetectionBox::new(Rect::new(1.0, 2.0, 3.0, 4.0), conf, class, track)
    }

    #[test]
    fn test_empty_frames_are_omitted() {
        let mut log = DetectionLog::new();
        log.append_frame(0, &[detection(DetectionClass::Hand, 0.9, 1)])
            .unwrap();
        log.append_frame(1, &[]).unwrap();
        log.append_frame(2, &[detection(DetectionClass::Face, 0.8, 2)])
            .unwrap();

        let frames: Vec<u64> = log.frames().iter().map(|f| f.frame_index).collect();
        assert_eq!(frames, vec![0, 2]);
    }

    #[test]
    fn test_out_of_order_append_rejected() {
        let mut log = DetectionLog::new();
        log.append_frame(5, &[detection(DetectionClass::Hand, 0.9, 1)])
            .unwrap();
        assert!(log
            .append_frame(5, &[detection(DetectionClass::Hand, 0.9, 1)])
            .is_err());
    }

    #[test]
    fn test_frames_sorted_by_priority() {
        let mut log = DetectionLog::new();
        log.append_frame(
            0,
            &[
                detection(DetectionClass::Hand, 0.9, 1),
                detection(DetectionClass::Reference, 0.7, 2),
            ],
        )
        .unwrap();
        let frames = log.frames();
        assert_eq!(frames[0].boxes[0].class, DetectionClass::Reference);
    }

    #[test]
    fn test_save_and_load() {
        let path = temp_path("roundtrip");
        let mut log = DetectionLog::new();
        log.append_frame(3, &[detection(DetectionClass::Tip, 0.5, 0)])
            .unwrap();
        log.save(&path).unwrap();

        let loaded = DetectionLog::load(&path).unwrap();
        assert_eq!(loaded, log);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_outdated_log_is_treated_as_absent() {
        let path = temp_path("outdated");
        std::fs::write(&path, r#"{"version":"0.0.1","data":[[0,0,0.9,0,0,1,1,0]]}"#).unwrap();

        assert!(matches!(
            DetectionLog::load(&path),
            Err(ModelError::Outdated { .. })
        ));
        assert!(DetectionLog::load_current(&path).is_none());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_malformed_log_is_treated_as_absent() {
        let path = temp_path("malformed");
        std::fs::write(&path, "{\"version\":").unwrap();
        assert!(DetectionLog::load_current(&path).is_none());
        std::fs::remove_file(&path).ok();
    }
}
