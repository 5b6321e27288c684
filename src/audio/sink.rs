use anyhow::{Context, Result};
use std::io::{ErrorKind, Write};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use super::decode::PcmStream;
use crate::error::SinkError;

/// Playback device fed one tick of interleaved frames at a time.
pub trait AudioSink {
    /// Queue whole frames. Blocks while the device is ahead of the audio clock.
    fn write(&mut self, frames: &[u8]) -> Result<(), SinkError>;

    /// Reset the stream after an underrun so playback can continue.
    fn recover(&mut self) -> Result<(), SinkError>;

    /// Wait for queued audio to finish playing.
    fn drain(&mut self) -> Result<(), SinkError>;
}

/// Holds writes back to real time so ticks follow the audio clock.
#[derive(Debug)]
pub struct Pacer {
    sample_rate: u32,
    frame_size: usize,
    started: Option<Instant>,
    frames: u64,
}

impl Pacer {
    pub fn new(sample_rate: u32, frame_size: usize) -> Self {
        Self {
            sample_rate,
            frame_size,
            started: None,
            frames: 0,
        }
    }

    /// Account for `bytes` of audio and sleep until the clock reaches its end.
    pub fn advance(&mut self, bytes: usize) {
        let started = *self.started.get_or_insert_with(Instant::now);
        self.frames += (bytes / self.frame_size) as u64;
        let due = started + Duration::from_secs_f64(self.frames as f64 / self.sample_rate as f64);
        let now = Instant::now();
        if due > now {
            std::thread::sleep(due - now);
        }
    }

    pub fn reset(&mut self) {
        self.started = None;
        self.frames = 0;
    }

    pub fn played(&self) -> Duration {
        Duration::from_secs_f64(self.frames as f64 / self.sample_rate as f64)
    }
}

/// Plays nothing; only keeps time.
pub struct SilentSink {
    pacer: Pacer,
}

impl SilentSink {
    pub fn new(stream: &PcmStream) -> Self {
        Self {
            pacer: Pacer::new(stream.sample_rate, stream.frame_size),
        }
    }
}

impl AudioSink for SilentSink {
    fn write(&mut self, frames: &[u8]) -> Result<(), SinkError> {
        self.pacer.advance(frames.len());
        Ok(())
    }

    fn recover(&mut self) -> Result<(), SinkError> {
        self.pacer.reset();
        Ok(())
    }

    fn drain(&mut self) -> Result<(), SinkError> {
        log::debug!("Silent sink kept time for {:.1}s", self.pacer.played().as_secs_f32());
        Ok(())
    }
}

/// Streams raw S16_LE frames into an `aplay` child process.
///
/// aplay recovers from device underruns on its own, so writes never report
/// `SinkError::Underrun`.
pub struct PipeSink {
    child: Child,
    pacer: Pacer,
}

impl PipeSink {
    pub fn new(stream: &PcmStream, device: &str) -> Result<Self> {
        let args = vec![
            "-q".to_string(),
            "-t".into(), "raw".into(),
            "-f".into(), "S16_LE".into(),
            "-r".into(), stream.sample_rate.to_string(),
            "-c".into(), stream.channels.to_string(),
            "-D".into(), device.to_string(),
            "-".into(),
        ];

        let child = Command::new("aplay")
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()
            .context("Failed to spawn aplay. Is alsa-utils installed?")?;

        log::info!(
            "aplay sink started: {}Hz, {} channel(s), device={}",
            stream.sample_rate,
            stream.channels,
            device
        );

        Ok(Self {
            child,
            pacer: Pacer::new(stream.sample_rate, stream.frame_size),
        })
    }
}

impl AudioSink for PipeSink {
    fn write(&mut self, frames: &[u8]) -> Result<(), SinkError> {
        let stdin = self
            .child
            .stdin
            .as_mut()
            .ok_or_else(|| SinkError::Stream("aplay stdin already closed".into()))?;
        stdin.write_all(frames).map_err(|err| {
            if err.kind() == ErrorKind::BrokenPipe {
                SinkError::Stream("aplay exited".into())
            } else {
                SinkError::Io(err)
            }
        })?;
        self.pacer.advance(frames.len());
        Ok(())
    }

    fn recover(&mut self) -> Result<(), SinkError> {
        self.pacer.reset();
        Ok(())
    }

    fn drain(&mut self) -> Result<(), SinkError> {
        // Closing stdin lets aplay play out what it has buffered and exit.
        drop(self.child.stdin.take());
        let status = self.child.wait()?;
        if !status.success() {
            return Err(SinkError::Stream(format!("aplay exited with {}", status)));
        }
        Ok(())
    }
}

impl Drop for PipeSink {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pacer_tracks_written_audio() {
        let mut pacer = Pacer::new(1000, 4);
        let before = Instant::now();
        pacer.advance(4 * 20);
        assert!(before.elapsed() >= Duration::from_millis(19));
        assert!((pacer.played().as_secs_f64() - 0.02).abs() < 1e-6);

        pacer.reset();
        assert_eq!(pacer.played(), Duration::ZERO);
    }

    #[test]
    fn silent_sink_never_underruns() {
        let bytes = crate::audio::decode::tests::wav_bytes(8000, &[(0, 0); 8]);
        let stream = crate::audio::decode::parse_pcm(std::io::Cursor::new(bytes)).unwrap();
        let mut sink = SilentSink::new(&stream);
        assert!(sink.write(stream.data()).is_ok());
        assert!(sink.recover().is_ok());
        assert!(sink.drain().is_ok());
    }
}
