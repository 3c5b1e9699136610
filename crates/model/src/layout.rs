//! Where per-video outputs live.

use std::path::{Path, PathBuf};

/// `<output_dir>/<stem>/<stem><suffix>` for every artifact of one video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    dir: PathBuf,
    stem: String,
}

impl OutputLayout {
    pub fn new(output_dir: impl AsRef<Path>, video_path: impl AsRef<Path>) -> Self {
        let stem = video_path
            .as_ref()
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "video".to_string());
        Self {
            dir: output_dir.as_ref().join(&stem),
            stem,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn detection_log(&self) -> PathBuf {
        self.file("_detections.json")
    }

    pub fn raw_signal(&self) -> PathBuf {
        self.file("_raw_signal.json")
    }

    pub fn script(&self) -> PathBuf {
        self.file(".funscript")
    }

    pub fn metadata(&self) -> PathBuf {
        self.file("_metadata.json")
    }

    fn file(&self, suffix: &str) -> PathBuf {
        self.dir.join(format!("{}{suffix}", self.stem))
    }
}

/// Script path next to the video itself.
pub fn script_beside_video(video_path: impl AsRef<Path>) -> PathBuf {
    video_path.as_ref().with_extension("funscript")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_paths() {
        let layout = OutputLayout::new("/out", "/videos/My Clip.mp4");
        assert_eq!(layout.dir(), Path::new("/out/My Clip"));
        assert_eq!(
            layout.detection_log(),
            PathBuf::from("/out/My Clip/My Clip_detections.json")
        );
        assert_eq!(layout.script(), PathBuf::from("/out/My Clip/My Clip.funscript"));
        assert_eq!(
            script_beside_video("/videos/My Clip.mp4"),
            PathBuf::from("/videos/My Clip.funscript")
        );
    }
}
