//! Flattening of panoramic frames before detection.

use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use kinetrace_common::{KinetraceError, KinetraceResult};
use kinetrace_model::{PanoramicLayout, Projection};

use crate::frame::{FrameTask, RawFrame};
use crate::stage::{Emitter, Stage};

/// Where panoramic frames get flattened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReprojectMode {
    /// Frames go to the detector as decoded.
    Passthrough,
    /// The decoder's filter chain does the remap; the stage is elided.
    #[default]
    Decoder,
    /// A pipeline stage crops the primary view to a square.
    InProcess,
}

impl ReprojectMode {
    /// Mode that actually applies to a source. Flat video never needs a remap.
    pub fn for_projection(self, projection: &Projection) -> Self {
        if projection.is_panoramic() {
            self
        } else {
            Self::Passthrough
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Passthrough => "passthrough",
            Self::Decoder => "decoder",
            Self::InProcess => "in-process",
        }
    }
}

impl fmt::Display for ReprojectMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ReprojectMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "passthrough" | "none" => Ok(Self::Passthrough),
            "decoder" | "ffmpeg" => Ok(Self::Decoder),
            "in-process" | "inprocess" | "process" => Ok(Self::InProcess),
            other => Err(format!("unknown reprojection mode: {other}")),
        }
    }
}

/// Resample the primary view of a panoramic frame into a `size × size` square
/// with nearest-neighbour lookup.
///
/// Side-by-side frames use the left half, top-bottom frames the top half, and
/// mono frames the whole image.
pub fn crop_primary_view(frame: &RawFrame, layout: PanoramicLayout, size: u32) -> RawFrame {
    let (view_w, view_h) = match layout {
        PanoramicLayout::SideBySide => ((frame.width / 2).max(1), frame.height),
        PanoramicLayout::TopBottom => (frame.width, (frame.height / 2).max(1)),
        PanoramicLayout::Mono => (frame.width, frame.height),
    };

    let size = size.max(1);
    let channels = RawFrame::CHANNELS;
    let src_stride = frame.width as usize * channels;
    let mut pixels = vec![0u8; RawFrame::byte_len(size, size)];

    for y in 0..size as usize {
        let sy = (y * view_h as usize / size as usize).min(view_h.saturating_sub(1) as usize);
        let src_row = sy * src_stride;
        let dst_row = y * size as usize * channels;
        for x in 0..size as usize {
            let sx = (x * view_w as usize / size as usize).min(view_w.saturating_sub(1) as usize);
            let src = src_row + sx * channels;
            let dst = dst_row + x * channels;
            if let Some(px) = frame.pixels.get(src..src + channels) {
                pixels[dst..dst + channels].copy_from_slice(px);
            }
        }
    }

    RawFrame::new(size, size, pixels)
}

/// Pipeline stage running [`crop_primary_view`] on every frame.
pub struct Reprojector {
    layout: PanoramicLayout,
    size: u32,
}

impl Reprojector {
    /// Stage for a source, or `None` when no in-process remap is needed.
    pub fn for_source(mode: ReprojectMode, projection: &Projection, size: u32) -> Option<Self> {
        match (mode.for_projection(projection), projection) {
            (ReprojectMode::InProcess, Projection::Panoramic { layout, .. }) => Some(Self {
                layout: *layout,
                size,
            }),
            _ => None,
        }
    }
}

impl Stage for Reprojector {
    fn name(&self) -> &'static str {
        "reproject"
    }

    fn process(&mut self, mut task: FrameTask, out: &mut Emitter<'_>) -> KinetraceResult<()> {
        let started = Instant::now();
        let frame = task.frame.take().ok_or_else(|| {
            KinetraceError::pipeline(format!("frame {} reached reprojection without pixels", task.frame_index))
        })?;
        task.frame = Some(crop_primary_view(&frame, self.layout, self.size));
        task.timings.record("reproject", started.elapsed());
        out.emit(task)
    }
}
