use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::{HeapConsumer, HeapProducer, HeapRb};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::decode::PcmStream;
use super::sink::AudioSink;
use crate::error::SinkError;

/// Ring capacity in seconds of audio. The device itself keeps its default buffer size.
const RING_SECONDS: f32 = 0.5;

#[derive(Default)]
struct StreamFlags {
    primed: AtomicBool,
    underrun: AtomicBool,
}

/// Native output through cpal, fed from a lock-free ring.
pub struct CpalSink {
    stream: cpal::Stream,
    producer: HeapProducer<i16>,
    flags: Arc<StreamFlags>,
}

impl CpalSink {
    pub fn new(pcm: &PcmStream, device_name: &str) -> Result<Self> {
        let host = cpal::default_host();
        let device = if device_name == "default" {
            host.default_output_device()
        } else {
            host.output_devices()
                .context("Failed to enumerate output devices")?
                .find(|d| d.name().map(|n| n == device_name).unwrap_or(false))
        }
        .context("No audio output device found")?;

        let config = cpal::StreamConfig {
            channels: pcm.channels,
            sample_rate: cpal::SampleRate(pcm.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let capacity = (pcm.sample_rate as f32 * RING_SECONDS) as usize * pcm.channels as usize;
        let (producer, mut consumer) = HeapRb::<i16>::new(capacity).split();

        let flags = Arc::new(StreamFlags::default());
        let callback_flags = Arc::clone(&flags);

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    fill_output(data, &mut consumer, &callback_flags);
                },
                |err| log::warn!("Audio stream error: {}", err),
                None,
            )
            .context("Failed to build audio output stream")?;

        stream.play().context("Failed to start audio stream")?;

        log::info!(
            "cpal sink started: {} @ {}Hz, {} channel(s)",
            device.name().unwrap_or_else(|_| "Unknown".to_string()),
            pcm.sample_rate,
            pcm.channels
        );

        Ok(Self {
            stream,
            producer,
            flags,
        })
    }
}

impl AudioSink for CpalSink {
    fn write(&mut self, frames: &[u8]) -> Result<(), SinkError> {
        // An underrun drops this tick's samples; the driver recovers and
        // playback resumes with the next tick.
        if self.flags.underrun.load(Ordering::Acquire) {
            return Err(SinkError::Underrun);
        }

        let samples: Vec<i16> = frames
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();

        let mut pushed = 0;
        while pushed < samples.len() {
            pushed += self.producer.push_slice(&samples[pushed..]);
            if pushed < samples.len() {
                std::thread::sleep(Duration::from_millis(1));
            }
        }
        self.flags.primed.store(true, Ordering::Release);

        // Keep at most two ticks queued so the driver stays on the device clock.
        while self.producer.len() > samples.len() * 2 {
            if self.flags.underrun.load(Ordering::Acquire) {
                break;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        Ok(())
    }

    fn recover(&mut self) -> Result<(), SinkError> {
        log::debug!("Recovering audio stream after underrun");
        self.flags.underrun.store(false, Ordering::Release);
        self.stream
            .play()
            .map_err(|e| SinkError::Stream(e.to_string()))
    }

    fn drain(&mut self) -> Result<(), SinkError> {
        while !self.producer.is_empty() {
            std::thread::sleep(Duration::from_millis(5));
        }
        self.stream
            .pause()
            .map_err(|e| SinkError::Stream(e.to_string()))
    }
}

/// Copy queued samples into the device buffer, padding with silence. Running
/// dry only counts as an underrun once the first write has primed the ring.
fn fill_output(data: &mut [i16], consumer: &mut HeapConsumer<i16>, flags: &StreamFlags) {
    let mut starved = false;
    for out in data.iter_mut() {
        *out = match consumer.pop() {
            Some(sample) => sample,
            None => {
                starved = true;
                0
            }
        };
    }
    if starved && flags.primed.load(Ordering::Acquire) {
        flags.underrun.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startup_silence_is_not_an_underrun() {
        let (_producer, mut consumer) = HeapRb::<i16>::new(8).split();
        let flags = StreamFlags::default();
        let mut data = [7i16; 4];

        fill_output(&mut data, &mut consumer, &flags);
        assert_eq!(data, [0; 4]);
        assert!(!flags.underrun.load(Ordering::Acquire));
    }

    #[test]
    fn running_dry_after_priming_flags_underrun() {
        let (mut producer, mut consumer) = HeapRb::<i16>::new(8).split();
        let flags = StreamFlags::default();
        producer.push_slice(&[1, 2, 3]);
        flags.primed.store(true, Ordering::Release);

        let mut data = [0i16; 4];
        fill_output(&mut data, &mut consumer, &flags);
        assert_eq!(data, [1, 2, 3, 0]);
        assert!(flags.underrun.load(Ordering::Acquire));
    }

    #[test]
    fn full_buffer_keeps_flag_clear() {
        let (mut producer, mut consumer) = HeapRb::<i16>::new(8).split();
        let flags = StreamFlags::default();
        producer.push_slice(&[4, 5, 6, 7, 8]);
        flags.primed.store(true, Ordering::Release);

        let mut data = [0i16; 4];
        fill_output(&mut data, &mut consumer, &flags);
        assert_eq!(data, [4, 5, 6, 7]);
        assert!(!flags.underrun.load(Ordering::Acquire));
    }
}
