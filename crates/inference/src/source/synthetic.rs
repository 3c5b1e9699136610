use std::thread;
use std::time::Duration;

use kinetrace_common::{KinetraceError, KinetraceResult};

use super::FrameSource;
use crate::frame::RawFrame;

/// Generates solid frames in memory. Used by tests and dry runs.
///
/// Each frame's first byte carries the low byte of its index.
#[derive(Debug, Clone)]
pub struct SyntheticFrameSource {
    width: u32,
    height: u32,
    total: u64,
    next_index: u64,
    delay: Option<Duration>,
    fail_at: Option<u64>,
    closed: bool,
}

impl SyntheticFrameSource {
    pub fn new(width: u32, height: u32, total: u64) -> Self {
        Self {
            width,
            height,
            total,
            next_index: 0,
            delay: None,
            fail_at: None,
            closed: false,
        }
    }

    /// Sleep this long before yielding each frame.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail with a decode error instead of yielding this frame.
    pub fn with_failure_at(mut self, frame_index: u64) -> Self {
        self.fail_at = Some(frame_index);
        self
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl FrameSource for SyntheticFrameSource {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn total_frames(&self) -> u64 {
        self.total.saturating_sub(self.next_index)
    }

    fn next_frame(&mut self) -> KinetraceResult<Option<(u64, RawFrame)>> {
        if self.closed || self.next_index >= self.total {
            return Ok(None);
        }
        if self.fail_at == Some(self.next_index) {
            return Err(KinetraceError::decode(format!(
                "synthetic read failure at frame {}",
                self.next_index
            )));
        }
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }

        let mut pixels = vec![0u8; RawFrame::byte_len(self.width, self.height)];
        if let Some(first) = pixels.first_mut() {
            *first = (self.next_index & 0xff) as u8;
        }
        let index = self.next_index;
        self.next_index += 1;
        Ok(Some((index, RawFrame::new(self.width, self.height, pixels))))
    }

    fn seek(&mut self, frame_index: u64) -> KinetraceResult<()> {
        if frame_index > self.total {
            return Err(KinetraceError::decode(format!(
                "seek to frame {frame_index} past end ({})",
                self.total
            )));
        }
        self.next_index = frame_index;
        Ok(())
    }

    fn close(&mut self) {
        self.closed = true;
    }
}
