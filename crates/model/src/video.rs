//! Source video description.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// How the source frames map onto the viewer's field of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Projection {
    /// Ordinary flat video.
    Flat,
    /// Wide stereo/panoramic video that needs flattening before detection.
    Panoramic {
        layout: PanoramicLayout,
        fov: u32,
        fisheye: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PanoramicLayout {
    SideBySide,
    TopBottom,
    Mono,
}

impl Projection {
    pub fn is_panoramic(&self) -> bool {
        matches!(self, Self::Panoramic { .. })
    }

    /// Panoramic format implied by markers in a file name.
    ///
    /// Unmarked files default to side-by-side 180°.
    pub fn panoramic_from_file_name(name: &str) -> Self {
        const MARKERS: &[(&str, PanoramicLayout, u32, bool)] = &[
            ("180_sbs", PanoramicLayout::SideBySide, 180, false),
            ("_LR_180", PanoramicLayout::SideBySide, 180, false),
            ("_MONO_360", PanoramicLayout::Mono, 360, false),
            ("_TB_360", PanoramicLayout::TopBottom, 360, false),
            ("_MKX200", PanoramicLayout::SideBySide, 200, true),
            ("_MKX220", PanoramicLayout::SideBySide, 220, true),
            ("_RF52", PanoramicLayout::SideBySide, 190, true),
            ("_FISHEYE190", PanoramicLayout::SideBySide, 190, true),
            ("_VRCA220", PanoramicLayout::SideBySide, 220, true),
            ("180x180_3dh", PanoramicLayout::SideBySide, 180, false),
            ("VR180", PanoramicLayout::SideBySide, 180, false),
            ("oculusrift_", PanoramicLayout::SideBySide, 180, false),
        ];

        let name = name.replace("_FB360", "");
        MARKERS
            .iter()
            .find(|(marker, ..)| name.contains(marker))
            .map(|&(_, layout, fov, fisheye)| Self::Panoramic {
                layout,
                fov,
                fisheye,
            })
            .unwrap_or(Self::Panoramic {
                layout: PanoramicLayout::SideBySide,
                fov: 180,
                fisheye: false,
            })
    }
}

/// Metadata of the video being processed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    pub path: PathBuf,
    pub codec: String,
    pub width: u32,
    pub height: u32,
    pub duration_secs: f64,
    pub total_frames: u64,
    pub fps: f64,
    pub projection: Projection,
}

impl VideoInfo {
    /// Parse `ffprobe -show_entries stream=...:format=duration -of json` output.
    ///
    /// A 2:1 frame is treated as panoramic; when the stream lacks a frame
    /// count it is estimated from duration and frame rate.
    pub fn from_ffprobe_json(path: impl AsRef<Path>, json: &str) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let value: serde_json::Value =
            serde_json::from_str(json).map_err(|e| ModelError::ParseError {
                path: path.to_path_buf(),
                source: e,
            })?;

        let stream = value
            .get("streams")
            .and_then(|s| s.get(0))
            .ok_or_else(|| ModelError::validation("no video stream found"))?;

        let codec = stream
            .get("codec_name")
            .and_then(|c| c.as_str())
            .unwrap_or("unknown")
            .to_string();
        let width = json_u64(stream.get("width")).unwrap_or(0) as u32;
        let height = json_u64(stream.get("height")).unwrap_or(0) as u32;
        let fps = stream
            .get("r_frame_rate")
            .and_then(|r| r.as_str())
            .map(parse_frame_rate)
            .unwrap_or(0.0);
        let duration_secs = value
            .get("format")
            .and_then(|f| json_f64(f.get("duration")))
            .unwrap_or(0.0);

        if width == 0 || height == 0 || fps <= 0.0 {
            return Err(ModelError::validation(format!(
                "unusable stream: {width}x{height} @ {fps} fps"
            )));
        }

        let total_frames = json_u64(stream.get("nb_frames"))
            .filter(|n| *n > 0)
            .unwrap_or_else(|| (duration_secs * fps) as u64);

        let projection = if height == width / 2 {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            Projection::panoramic_from_file_name(&name)
        } else {
            Projection::Flat
        };

        Ok(Self {
            path: path.to_path_buf(),
            codec,
            width,
            height,
            duration_secs,
            total_frames,
            fps,
            projection,
        })
    }

    pub fn is_panoramic(&self) -> bool {
        self.projection.is_panoramic()
    }

    /// File name without extension, used to name output folders.
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "video".to_string())
    }
}

/// `"30000/1001"` → 29.97; a zero denominator yields 0.
pub fn parse_frame_rate(rate: &str) -> f64 {
    match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().unwrap_or(0.0);
            let den: f64 = den.trim().parse().unwrap_or(0.0);
            if den > 0.0 {
                num / den
            } else {
                0.0
            }
        }
        None => rate.trim().parse().unwrap_or(0.0),
    }
}

// ffprobe emits some numbers as strings.
fn json_u64(value: Option<&serde_json::Value>) -> Option<u64> {
    let value = value?;
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

fn json_f64(value: Option<&serde_json::Value>) -> Option<f64> {
    let value = value?;
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}
