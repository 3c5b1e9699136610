use std::io::{BufReader, Read};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;

use kinetrace_common::{KinetraceError, KinetraceResult};
use kinetrace_model::VideoInfo;

use super::{decode_command, DecodeCommand, DecodeSettings, FrameSource};
use crate::frame::RawFrame;

/// Decodes a video through an ffmpeg subprocess writing raw frames to stdout.
///
/// The process is spawned on the first read and respawned on seek.
pub struct FfmpegFrameSource {
    video: VideoInfo,
    settings: DecodeSettings,
    command: DecodeCommand,
    process: Option<DecodeProcess>,
    next_index: u64,
    finished: bool,
}

struct DecodeProcess {
    child: Child,
    stdout: BufReader<ChildStdout>,
    stderr_task: Option<JoinHandle<String>>,
    frames_read: u64,
}

impl DecodeProcess {
    fn spawn(command: &DecodeCommand) -> KinetraceResult<Self> {
        tracing::debug!(program = %command.program.display(), args = ?command.args, "Running ffmpeg");
        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| KinetraceError::decode(format!("Failed to start ffmpeg: {e}")))?;

        tracing::info!(
            pid = child.id(),
            width = command.width,
            height = command.height,
            "ffmpeg decode process started"
        );

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| KinetraceError::decode("Failed to capture ffmpeg stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| KinetraceError::decode("Failed to capture ffmpeg stderr"))?;

        // Drained concurrently so ffmpeg never blocks on a full stderr pipe.
        let stderr_task = std::thread::spawn(move || -> String {
            let mut reader = BufReader::new(stderr);
            let mut output = String::new();
            match reader.read_to_string(&mut output) {
                Ok(_) => output,
                Err(err) => format!("<failed to read ffmpeg stderr: {err}>"),
            }
        });

        Ok(Self {
            child,
            stdout: BufReader::with_capacity(command.frame_bytes().max(8192), stdout),
            stderr_task: Some(stderr_task),
            frames_read: 0,
        })
    }

    /// Fill `buf` from stdout. Returns the bytes read, short only at end of stream.
    fn read_frame(&mut self, buf: &mut [u8]) -> KinetraceResult<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.stdout.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(KinetraceError::decode(format!("Failed reading ffmpeg output: {e}")))
                }
            }
        }
        Ok(filled)
    }

    fn stderr_output(&mut self) -> String {
        self.stderr_task
            .take()
            .map(|task| {
                task.join()
                    .unwrap_or_else(|_| "<failed to join stderr reader>".to_string())
            })
            .unwrap_or_default()
    }

    /// Wait for a process that reached end of stream on its own.
    fn finish(mut self) -> KinetraceResult<()> {
        let status = self
            .child
            .wait()
            .map_err(|e| KinetraceError::decode(format!("Failed to wait on ffmpeg: {e}")))?;
        let stderr = self.stderr_output();

        if !status.success() {
            return Err(KinetraceError::decode(format!(
                "ffmpeg decode failed (status {status}): {}",
                stderr.trim()
            )));
        }
        if self.frames_read == 0 {
            return Err(KinetraceError::decode(format!(
                "ffmpeg could not read frames from this video: {}",
                stderr.trim()
            )));
        }
        if !stderr.trim().is_empty() {
            tracing::debug!(stderr = stderr.trim(), "ffmpeg warnings");
        }
        Ok(())
    }

    fn kill(mut self) {
        if let Err(e) = self.child.kill() {
            tracing::debug!(error = %e, "ffmpeg already exited");
        }
        let _ = self.child.wait();
        let _ = self.stderr_output();
    }
}

impl FfmpegFrameSource {
    pub fn new(video: VideoInfo, settings: DecodeSettings) -> Self {
        let command = decode_command(&video, &settings);
        Self {
            next_index: settings.frame_start,
            video,
            settings,
            command,
            process: None,
            finished: false,
        }
    }

    /// Geometry of the frames this source yields.
    pub fn frame_size(&self) -> (u32, u32) {
        (self.command.width, self.command.height)
    }

    pub fn command(&self) -> &DecodeCommand {
        &self.command
    }

    fn end_index(&self) -> u64 {
        self.settings.frame_end.unwrap_or(self.video.total_frames)
    }
}

impl FrameSource for FfmpegFrameSource {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn total_frames(&self) -> u64 {
        self.end_index().saturating_sub(self.next_index)
    }

    fn next_frame(&mut self) -> KinetraceResult<Option<(u64, RawFrame)>> {
        if self.finished {
            return Ok(None);
        }
        if self
            .settings
            .frame_end
            .is_some_and(|end| self.next_index >= end)
        {
            self.close();
            self.finished = true;
            return Ok(None);
        }

        if self.process.is_none() {
            self.process = Some(DecodeProcess::spawn(&self.command)?);
        }
        let Some(process) = self.process.as_mut() else {
            return Ok(None);
        };

        let mut pixels = vec![0u8; self.command.frame_bytes()];
        let filled = process.read_frame(&mut pixels)?;

        if filled < pixels.len() {
            if filled > 0 {
                tracing::warn!(
                    frame = self.next_index,
                    bytes = filled,
                    expected = pixels.len(),
                    "Discarding truncated trailing frame"
                );
            }
            self.finished = true;
            if let Some(process) = self.process.take() {
                process.finish()?;
            }
            tracing::info!(last_frame = self.next_index.checked_sub(1), "ffmpeg received last frame");
            return Ok(None);
        }

        process.frames_read += 1;
        let index = self.next_index;
        self.next_index += 1;
        Ok(Some((
            index,
            RawFrame::new(self.command.width, self.command.height, pixels),
        )))
    }

    fn seek(&mut self, frame_index: u64) -> KinetraceResult<()> {
        if let Some(process) = self.process.take() {
            process.kill();
        }
        self.settings.frame_start = frame_index;
        self.command = decode_command(&self.video, &self.settings);
        self.next_index = frame_index;
        self.finished = false;
        tracing::debug!(frame = frame_index, "Decoder repositioned");
        Ok(())
    }

    fn close(&mut self) {
        if let Some(process) = self.process.take() {
            process.kill();
            tracing::debug!(next_frame = self.next_index, "ffmpeg decode process closed");
        }
    }
}

impl Drop for FfmpegFrameSource {
    fn drop(&mut self) {
        self.close();
    }
}
