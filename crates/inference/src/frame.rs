//! Units of work moving through the pipeline.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use kinetrace_model::DetectionBox;

/// Packed `bgr24` pixels of one decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl RawFrame {
    pub const CHANNELS: usize = 3;

    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Bytes one `width × height` frame occupies.
    pub fn byte_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * Self::CHANNELS
    }

    /// Pixel at `(x, y)`, `None` outside the frame.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * Self::CHANNELS;
        let px = self.pixels.get(offset..offset + Self::CHANNELS)?;
        Some([px[0], px[1], px[2]])
    }
}

/// Per-frame stage durations.
///
/// Shared between stages through an `Arc`; the lock is held only to insert or
/// copy out.
#[derive(Debug, Default)]
pub struct TaskTimings(Mutex<BTreeMap<&'static str, Duration>>);

impl TaskTimings {
    pub fn record(&self, stage: &'static str, elapsed: Duration) {
        let mut map = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        *map.entry(stage).or_default() += elapsed;
    }

    pub fn get(&self, stage: &str) -> Option<Duration> {
        let map = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        map.get(stage).copied()
    }

    pub fn snapshot(&self) -> BTreeMap<&'static str, Duration> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// One frame on its way from the source to the recorder.
///
/// Exactly one stage owns a task at any time; it moves between stages
/// through the queues.
#[derive(Debug)]
pub struct FrameTask {
    pub frame_index: u64,

    /// Pixel buffer; released once detections have been extracted.
    pub frame: Option<RawFrame>,

    pub detections: Vec<DetectionBox>,

    pub timings: Arc<TaskTimings>,
}

impl FrameTask {
    pub fn new(frame_index: u64, frame: RawFrame) -> Self {
        Self {
            frame_index,
            frame: Some(frame),
            detections: Vec::new(),
            timings: Arc::new(TaskTimings::default()),
        }
    }

    /// Drop the pixel buffer, keeping detections and timings.
    pub fn release_frame(&mut self) {
        self.frame = None;
    }
}
