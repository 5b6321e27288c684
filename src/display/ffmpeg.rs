use anyhow::{Context, Result};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use super::{DisplayEvent, DisplaySink};
use crate::render::frame::Canvas;

pub enum FfmpegMode {
    /// Live window through ffplay.
    Window,
    /// Encode to a file, muxing in the original audio.
    Record { output: PathBuf, audio: PathBuf },
}

/// Raw frames piped into an ffplay or ffmpeg child process.
pub struct FfmpegSink {
    child: Child,
    program: &'static str,
    last_frame: Vec<u8>,
    closed: bool,
}

pub fn pixel_format(bits_per_pixel: u8) -> &'static str {
    if bits_per_pixel == 24 { "bgr24" } else { "bgr0" }
}

impl FfmpegSink {
    pub fn new(
        mode: &FfmpegMode,
        width: usize,
        height: usize,
        bits_per_pixel: u8,
        tick_ms: u64,
    ) -> Result<Self> {
        let input = vec![
            "-loglevel".to_string(), "error".into(),
            "-f".into(), "rawvideo".into(),
            "-pixel_format".into(), pixel_format(bits_per_pixel).into(),
            "-video_size".into(), format!("{}x{}", width, height),
            "-framerate".into(), format!("1000/{}", tick_ms),
        ];

        let (program, args) = match mode {
            FfmpegMode::Window => {
                let mut args = input;
                args.extend([
                    "-window_title".to_string(), "barscope".into(),
                    "-autoexit".into(),
                    "pipe:0".into(),
                ]);
                ("ffplay", args)
            }
            FfmpegMode::Record { output, audio } => {
                let mut args = vec!["-y".to_string()];
                args.extend(input);
                args.extend([
                    "-i".to_string(), "pipe:0".into(),
                    "-i".into(), path_arg(audio)?,
                    "-c:v".into(), "libx264".into(),
                    "-pix_fmt".into(), "yuv420p".into(),
                    "-crf".into(), "18".into(),
                    "-preset".into(), "medium".into(),
                    "-c:a".into(), "aac".into(),
                    "-b:a".into(), "192k".into(),
                    "-shortest".into(),
                    path_arg(output)?,
                ]);
                ("ffmpeg", args)
            }
        };

        let child = Command::new(program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to spawn {}. Is ffmpeg installed?", program))?;

        log::info!(
            "{} display started: {}x{} {} @ 1000/{}fps",
            program,
            width,
            height,
            pixel_format(bits_per_pixel),
            tick_ms
        );

        Ok(Self {
            child,
            program,
            last_frame: Vec::new(),
            closed: false,
        })
    }

    fn write_frame(&mut self, pixels: &[u8]) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let stdin = self.child.stdin.as_mut().context("Display stdin not available")?;
        match stdin.write_all(pixels) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::BrokenPipe => {
                log::info!("{} closed its input", self.program);
                self.closed = true;
                Ok(())
            }
            Err(err) => Err(err).with_context(|| format!("Failed to write frame to {}", self.program)),
        }
    }
}

impl DisplaySink for FfmpegSink {
    fn blit(&mut self, canvas: &Canvas) -> Result<()> {
        self.last_frame.clear();
        self.last_frame.extend_from_slice(canvas.pixels());
        let frame = std::mem::take(&mut self.last_frame);
        let result = self.write_frame(&frame);
        self.last_frame = frame;
        result
    }

    /// The child runs at a fixed frame rate, so a repeated frame keeps its
    /// timeline level with the audio clock.
    fn refresh(&mut self) -> Result<()> {
        if self.last_frame.is_empty() {
            return Ok(());
        }
        let frame = std::mem::take(&mut self.last_frame);
        let result = self.write_frame(&frame);
        self.last_frame = frame;
        result
    }

    fn poll_event(&mut self) -> Option<DisplayEvent> {
        if self.closed {
            return Some(DisplayEvent::Quit);
        }
        match self.child.try_wait() {
            Ok(Some(_)) | Err(_) => {
                self.closed = true;
                Some(DisplayEvent::Quit)
            }
            Ok(None) => None,
        }
    }

    fn close(&mut self) -> Result<()> {
        // Close stdin to signal EOF
        drop(self.child.stdin.take());

        let status = self
            .child
            .wait()
            .with_context(|| format!("Failed to wait for {}", self.program))?;

        let mut stderr = String::new();
        if let Some(mut pipe) = self.child.stderr.take() {
            pipe.read_to_string(&mut stderr).ok();
        }

        if !status.success() && !self.closed {
            anyhow::bail!("{} exited with error:\n{}", self.program, stderr);
        }

        log::info!("{} finished", self.program);
        Ok(())
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

fn path_arg(path: &Path) -> Result<String> {
    path.to_str()
        .map(str::to_string)
        .with_context(|| format!("Path is not valid UTF-8: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_format_follows_depth() {
        assert_eq!(pixel_format(32), "bgr0");
        assert_eq!(pixel_format(24), "bgr24");
    }
}
