//! Hardware decode backend selection.
//!
//! Candidates are probed in [`HwAccel::PRIORITY`] order with a one-frame
//! trial job; the first that succeeds is used for the run. The result of
//! an automatic probe is cached for the life of the process.

use std::fmt;
use std::path::Path;
use std::process::{Command, Stdio};
use std::str::FromStr;
use std::sync::OnceLock;

/// A hardware decode backend ffmpeg can use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HwAccel {
    Cuda,
    Vaapi,
    Amf,
    VideoToolbox,
    Qsv,
    D3d11va,
}

const VAAPI_DEVICE: &str = "/dev/dri/renderD128";

impl HwAccel {
    /// Probe order, most preferred first.
    pub const PRIORITY: [HwAccel; 6] = [
        HwAccel::Cuda,
        HwAccel::Vaapi,
        HwAccel::Amf,
        HwAccel::VideoToolbox,
        HwAccel::Qsv,
        HwAccel::D3d11va,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Cuda => "cuda",
            Self::Vaapi => "vaapi",
            Self::Amf => "amf",
            Self::VideoToolbox => "videotoolbox",
            Self::Qsv => "qsv",
            Self::D3d11va => "d3d11va",
        }
    }

    /// Input-side ffmpeg arguments enabling this backend. Decoded frames are
    /// downloaded to system memory before the software filter chain.
    pub fn read_args(self) -> Vec<String> {
        let mut args = vec!["-hwaccel".to_string(), self.name().to_string()];
        if self == Self::Vaapi {
            args.extend(["-hwaccel_device".to_string(), VAAPI_DEVICE.to_string()]);
        }
        args
    }

    fn device_spec(self) -> String {
        match self {
            Self::Vaapi => format!("vaapi=probe:{VAAPI_DEVICE}"),
            other => other.name().to_string(),
        }
    }

    /// Arguments of a trial job that only succeeds when the device can be opened.
    fn probe_args(self) -> Vec<String> {
        let device = self.device_spec();
        [
            "-hide_banner",
            "-loglevel",
            "error",
            "-init_hw_device",
            device.as_str(),
            "-f",
            "lavfi",
            "-i",
            "nullsrc=s=64x64:d=0.04",
            "-frames:v",
            "1",
            "-f",
            "null",
            "-",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }
}

impl fmt::Display for HwAccel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HwAccel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Self::PRIORITY
            .iter()
            .copied()
            .find(|hw| hw.name() == normalized)
            .ok_or_else(|| format!("unknown hardware backend: {s}"))
    }
}

/// Configured backend choice, parsed once from `pipeline.hwaccel` or `--hwaccel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HwAccelChoice {
    /// Probe candidates and take the first that works.
    #[default]
    Auto,
    /// Software decode only.
    Software,
    /// Use this backend without probing.
    Fixed(HwAccel),
}

impl FromStr for HwAccelChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "auto" => Ok(Self::Auto),
            "none" | "software" | "cpu" => Ok(Self::Software),
            other => other.parse().map(Self::Fixed),
        }
    }
}

/// First candidate, in order, for which `probe` succeeds.
pub fn select_backend<F>(candidates: &[HwAccel], mut probe: F) -> Option<HwAccel>
where
    F: FnMut(HwAccel) -> bool,
{
    for &candidate in candidates {
        if probe(candidate) {
            tracing::info!(backend = %candidate, "Hardware decode backend available");
            return Some(candidate);
        }
        tracing::debug!(backend = %candidate, "Hardware decode backend unavailable");
    }
    tracing::info!("No hardware decode backend available, using software decode");
    None
}

/// Run the trial job for `backend` with the given ffmpeg binary.
pub fn probe_ffmpeg_backend(ffmpeg: &Path, backend: HwAccel) -> bool {
    Command::new(ffmpeg)
        .args(backend.probe_args())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

static DETECTED: OnceLock<Option<HwAccel>> = OnceLock::new();

/// Resolve a configured choice into the backend the run will use.
pub fn resolve_backend(choice: HwAccelChoice, ffmpeg: &Path) -> Option<HwAccel> {
    match choice {
        HwAccelChoice::Software => None,
        HwAccelChoice::Fixed(backend) => Some(backend),
        HwAccelChoice::Auto => *DETECTED.get_or_init(|| {
            select_backend(&HwAccel::PRIORITY, |hw| probe_ffmpeg_backend(ffmpeg, hw))
        }),
    }
}
