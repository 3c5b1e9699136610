//! Frame sources and the ffmpeg decode command.

mod ffmpeg;
mod synthetic;

pub use ffmpeg::FfmpegFrameSource;
pub use synthetic::SyntheticFrameSource;

use std::path::{Path, PathBuf};
use std::process::Command;

use kinetrace_common::{KinetraceError, KinetraceResult, PipelineDefaults};
use kinetrace_model::{Projection, VideoInfo};

use crate::backend::HwAccel;
use crate::frame::RawFrame;
use crate::reproject::ReprojectMode;

/// Yields decoded frames in increasing index order.
pub trait FrameSource: Send {
    fn name(&self) -> &str;

    /// Frames this source is expected to yield from its current position.
    fn total_frames(&self) -> u64;

    /// Next frame, or `None` at end of stream.
    fn next_frame(&mut self) -> KinetraceResult<Option<(u64, RawFrame)>>;

    /// Reposition so the next frame yielded is `frame_index`.
    fn seek(&mut self, frame_index: u64) -> KinetraceResult<()>;

    /// Release external resources. Called once the source is no longer read.
    fn close(&mut self);
}

/// Everything that shapes the decode command of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeSettings {
    pub ffmpeg_path: PathBuf,
    pub hwaccel: Option<HwAccel>,
    pub reproject: ReprojectMode,
    pub render_resolution: u32,

    /// Camera pitch in degrees for the panoramic remap.
    pub pitch: i32,

    /// First frame to decode.
    pub frame_start: u64,

    /// Stop before this frame.
    pub frame_end: Option<u64>,
}

impl DecodeSettings {
    pub fn from_defaults(defaults: &PipelineDefaults, hwaccel: Option<HwAccel>) -> Self {
        Self {
            ffmpeg_path: defaults.ffmpeg_path.clone(),
            hwaccel,
            reproject: ReprojectMode::Decoder,
            render_resolution: defaults.render_resolution,
            pitch: defaults.pitch,
            frame_start: 0,
            frame_end: None,
        }
    }
}

/// A ready-to-spawn decode command and the frame geometry it produces.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub width: u32,
    pub height: u32,
}

impl DecodeCommand {
    pub fn frame_bytes(&self) -> usize {
        RawFrame::byte_len(self.width, self.height)
    }
}

/// Filter chain flattening a panoramic source's primary view to a square.
fn panoramic_filter(fisheye: bool, resolution: u32, pitch: i32) -> String {
    let (input, fov) = if fisheye { ("fisheye", 190) } else { ("he", 180) };
    [
        format!("scale={}:-2", resolution * 2),
        format!("crop={resolution}:{resolution}:0:0"),
        format!(
            "v360={input}:in_stereo=2d:output=sg:iv_fov={fov}:ih_fov={fov}:d_fov=180:v_fov=90:h_fov=90:\
             pitch={pitch}:yaw=0:roll=0:w={resolution}:h={resolution}:interp=lanczos:reset_rot=1"
        ),
        "lutyuv=y=gammaval(0.7)".to_string(),
    ]
    .join(",")
}

/// Build the ffmpeg command reading `video` as raw `bgr24` frames on stdout.
///
/// Panoramic sources are remapped by the filter chain in
/// [`ReprojectMode::Decoder`] mode and decoded untouched otherwise. Flat
/// sources taller than the render resolution are scaled down to a square.
pub fn decode_command(video: &VideoInfo, settings: &DecodeSettings) -> DecodeCommand {
    let res = settings.render_resolution;
    let (filter, width, height) = match (&video.projection, settings.reproject) {
        (Projection::Panoramic { fisheye, .. }, ReprojectMode::Decoder) => {
            (Some(panoramic_filter(*fisheye, res, settings.pitch)), res, res)
        }
        (Projection::Panoramic { .. }, _) => (None, video.width, video.height),
        (Projection::Flat, _) if video.height > res => (Some(format!("scale={res}:{res}")), res, res),
        (Projection::Flat, _) => (None, video.width, video.height),
    };

    let mut args: Vec<String> = Vec::new();
    if let Some(hw) = settings.hwaccel {
        args.extend(hw.read_args());
    }
    let start_secs = if video.fps > 0.0 {
        settings.frame_start as f64 / video.fps
    } else {
        0.0
    };
    args.extend(
        ["-nostats", "-loglevel", "warning", "-ss"]
            .iter()
            .map(|s| s.to_string()),
    );
    args.push(format!("{start_secs:.6}"));
    args.push("-i".to_string());
    args.push(video.path.to_string_lossy().into_owned());
    args.push("-an".to_string());
    if let Some(filter) = filter {
        args.push("-vf".to_string());
        args.push(filter);
    }
    args.extend(
        ["-f", "rawvideo", "-pix_fmt", "bgr24", "-threads", "0", "-"]
            .iter()
            .map(|s| s.to_string()),
    );

    DecodeCommand {
        program: settings.ffmpeg_path.clone(),
        args,
        width,
        height,
    }
}

/// Read stream metadata with ffprobe.
pub fn probe_video(ffprobe: &Path, path: &Path) -> KinetraceResult<VideoInfo> {
    if !path.exists() {
        return Err(KinetraceError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let output = Command::new(ffprobe)
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=r_frame_rate,width,height,codec_name,nb_frames",
            "-show_entries",
            "format=duration",
            "-of",
            "json",
        ])
        .arg(path)
        .output()
        .map_err(|e| KinetraceError::decode(format!("Failed to start ffprobe: {e}")))?;

    if !output.status.success() {
        return Err(KinetraceError::decode(format!(
            "ffprobe failed (status {}): {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let json = String::from_utf8_lossy(&output.stdout);
    let info = VideoInfo::from_ffprobe_json(path, &json)
        .map_err(|e| KinetraceError::decode(e.to_string()))?;
    tracing::info!(
        path = %path.display(),
        width = info.width,
        height = info.height,
        fps = info.fps,
        frames = info.total_frames,
        panoramic = info.projection.is_panoramic(),
        "Probed video"
    );
    Ok(info)
}

/// Whether `binary` resolves to an executable.
pub fn command_exists(binary: &Path) -> bool {
    if binary.components().count() > 1 {
        return binary.is_file();
    }
    Command::new("sh")
        .arg("-c")
        .arg(format!("command -v {} >/dev/null 2>&1", binary.display()))
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kinetrace_model::PanoramicLayout;

    fn video(width: u32, height: u32, projection: Projection) -> VideoInfo {
        VideoInfo {
            path: PathBuf::from("/videos/clip.mp4"),
            codec: "h264".into(),
            width,
            height,
            duration_secs: 10.0,
            total_frames: 300,
            fps: 30.0,
            projection,
        }
    }

    fn settings() -> DecodeSettings {
        DecodeSettings {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            hwaccel: None,
            reproject: ReprojectMode::Decoder,
            render_resolution: 1080,
            pitch: -25,
            frame_start: 0,
            frame_end: None,
        }
    }

    fn arg_after<'a>(cmd: &'a DecodeCommand, flag: &str) -> Option<&'a str> {
        let pos = cmd.args.iter().position(|a| a == flag)?;
        cmd.args.get(pos + 1).map(String::as_str)
    }

    #[test]
    fn test_flat_small_video_is_not_filtered() {
        let cmd = decode_command(&video(640, 360, Projection::Flat), &settings());
        assert_eq!(arg_after(&cmd, "-vf"), None);
        assert_eq!((cmd.width, cmd.height), (640, 360));
        assert_eq!(cmd.args.last().map(String::as_str), Some("-"));
        assert_eq!(arg_after(&cmd, "-pix_fmt"), Some("bgr24"));
    }

    #[test]
    fn test_flat_tall_video_is_scaled() {
        let cmd = decode_command(&video(3840, 2160, Projection::Flat), &settings());
        assert_eq!(arg_after(&cmd, "-vf"), Some("scale=1080:1080"));
        assert_eq!(cmd.frame_bytes(), 1080 * 1080 * 3);
    }

    #[test]
    fn test_panoramic_filter_chain() {
        let projection = Projection::Panoramic {
            layout: PanoramicLayout::SideBySide,
            fov: 190,
            fisheye: true,
        };
        let cmd = decode_command(&video(5760, 2880, projection), &settings());
        let vf = arg_after(&cmd, "-vf").unwrap();
        assert!(vf.starts_with("scale=2160:-2,crop=1080:1080:0:0,v360=fisheye:"));
        assert!(vf.contains("iv_fov=190:ih_fov=190"));
        assert!(vf.contains("pitch=-25"));
        assert!(vf.ends_with("lutyuv=y=gammaval(0.7)"));
        assert_eq!((cmd.width, cmd.height), (1080, 1080));
    }

    #[test]
    fn test_in_process_mode_decodes_untouched() {
        let projection = Projection::panoramic_from_file_name("clip_180_sbs.mp4");
        let mut s = settings();
        s.reproject = ReprojectMode::InProcess;
        let cmd = decode_command(&video(5760, 2880, projection), &s);
        assert_eq!(arg_after(&cmd, "-vf"), None);
        assert_eq!((cmd.width, cmd.height), (5760, 2880));
    }

    #[test]
    fn test_seek_and_hwaccel_args() {
        let mut s = settings();
        s.frame_start = 45;
        s.hwaccel = Some(HwAccel::Cuda);
        let cmd = decode_command(&video(640, 360, Projection::Flat), &s);
        assert_eq!(&cmd.args[..2], &["-hwaccel".to_string(), "cuda".to_string()]);
        assert_eq!(arg_after(&cmd, "-ss"), Some("1.500000"));
        assert_eq!(arg_after(&cmd, "-i"), Some("/videos/clip.mp4"));
    }

    #[test]
    fn test_probe_missing_file() {
        let err = probe_video(Path::new("ffprobe"), Path::new("/definitely/missing.mp4")).unwrap_err();
        assert!(matches!(err, KinetraceError::FileNotFound { .. }));
    }
}
