//! Run metadata sidecar recording which passes produced the outputs.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::io::{read_json, write_json};
use crate::version::{DETECTION_LOG_VERSION, SCRIPT_VERSION, TRACKING_VERSION};
use crate::video::VideoInfo;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub video: VideoInfo,
    pub created: String,
    pub updated: String,
    #[serde(default)]
    pub detector: Option<String>,
    #[serde(default)]
    pub detection_version: Option<String>,
    #[serde(default)]
    pub detection_date: Option<String>,
    #[serde(default)]
    pub tracking_version: Option<String>,
    #[serde(default)]
    pub tracking_date: Option<String>,
    #[serde(default)]
    pub script_version: Option<String>,
    #[serde(default)]
    pub script_date: Option<String>,
}

impl RunMetadata {
    pub fn new(video: VideoInfo) -> Self {
        let now = now_rfc3339();
        Self {
            video,
            created: now.clone(),
            updated: now,
            detector: None,
            detection_version: None,
            detection_date: None,
            tracking_version: None,
            tracking_date: None,
            script_version: None,
            script_date: None,
        }
    }

    /// Load the sidecar at `path`, or start a fresh one for `video`.
    pub fn load_or_new(path: impl AsRef<Path>, video: &VideoInfo) -> Self {
        let path = path.as_ref();
        if path.exists() {
            match read_json::<RunMetadata>(path) {
                Ok(mut meta) => {
                    meta.video = video.clone();
                    return meta;
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Replacing unreadable metadata");
                }
            }
        }
        Self::new(video.clone())
    }

    pub fn mark_detection(&mut self, detector: impl Into<String>) {
        let now = now_rfc3339();
        self.detector = Some(detector.into());
        self.detection_version = Some(DETECTION_LOG_VERSION.to_string());
        self.detection_date = Some(now.clone());
        self.updated = now;
    }

    pub fn mark_tracking(&mut self) {
        let now = now_rfc3339();
        self.tracking_version = Some(TRACKING_VERSION.to_string());
        self.tracking_date = Some(now.clone());
        self.updated = now;
    }

    pub fn mark_script(&mut self) {
        let now = now_rfc3339();
        self.script_version = Some(SCRIPT_VERSION.to_string());
        self.script_date = Some(now.clone());
        self.updated = now;
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ModelError> {
        write_json(path.as_ref(), self, true)
    }
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
