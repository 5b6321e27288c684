use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, ImageFormat};
use std::io::{BufRead, Cursor, Seek};
use std::path::Path;
use std::time::{Duration, Instant};

use crate::error::OverlayError;

/// Bytes per overlay pixel; frames are always expanded to RGBA.
pub const OVERLAY_CHANNELS: usize = 4;

/// Decoded animation, all frames stored back to back, origin top-left.
#[derive(Clone, Debug)]
pub struct OverlayAsset {
    pub width: usize,
    pub height: usize,
    pub frame_count: usize,
    /// Delay between frames in milliseconds, taken from the first frame.
    pub delay_ms: u64,
    pixels: Vec<u8>,
}

impl OverlayAsset {
    pub fn from_frames(
        width: usize,
        height: usize,
        delay_ms: u64,
        frames: Vec<Vec<u8>>,
    ) -> Result<Self, OverlayError> {
        if frames.is_empty() {
            return Err(OverlayError::Empty);
        }
        let frame_count = frames.len();
        Ok(Self {
            width,
            height,
            frame_count,
            delay_ms,
            pixels: frames.concat(),
        })
    }

    pub fn frame_bytes(&self) -> usize {
        self.width * self.height * OVERLAY_CHANNELS
    }

    /// RGB of pixel (x, y) in `frame`.
    pub fn pixel(&self, frame: usize, x: usize, y: usize) -> [u8; 3] {
        let at = frame * self.frame_bytes() + (y * self.width + x) * OVERLAY_CHANNELS;
        [self.pixels[at], self.pixels[at + 1], self.pixels[at + 2]]
    }
}

/// Decode `path` and check it fits inside a `max_width` x `max_height` canvas.
pub fn decode_overlay(
    path: &Path,
    max_width: usize,
    max_height: usize,
) -> Result<OverlayAsset, OverlayError> {
    let bytes = std::fs::read(path)?;
    let asset = match image::guess_format(&bytes)? {
        ImageFormat::Gif => decode_gif(Cursor::new(bytes))?,
        _ => {
            let still = image::load_from_memory(&bytes)?.to_rgba8();
            let (w, h) = still.dimensions();
            OverlayAsset::from_frames(w as usize, h as usize, 0, vec![still.into_raw()])?
        }
    };

    if asset.width > max_width || asset.height > max_height {
        return Err(OverlayError::TooLarge {
            width: asset.width as u32,
            height: asset.height as u32,
            max_width,
            max_height,
        });
    }

    log::info!(
        "Decoded overlay: {}x{}, {} frame(s), {}ms delay",
        asset.width,
        asset.height,
        asset.frame_count,
        asset.delay_ms
    );

    Ok(asset)
}

pub fn decode_gif<R: BufRead + Seek>(reader: R) -> Result<OverlayAsset, OverlayError> {
    let frames = GifDecoder::new(reader)?.into_frames().collect_frames()?;
    let first = frames.first().ok_or(OverlayError::Empty)?;

    let (numer, denom) = first.delay().numer_denom_ms();
    let delay_ms = if denom == 0 { 0 } else { (numer / denom) as u64 };
    let (width, height) = first.buffer().dimensions();

    let buffers = frames
        .into_iter()
        .map(|frame| frame.into_buffer().into_raw())
        .collect();

    OverlayAsset::from_frames(width as usize, height as usize, delay_ms, buffers)
}

/// Index that follows `frame` in an animation of `frame_count` frames.
///
/// Past the last frame playback wraps to frame 1, so frame 0 is only ever
/// shown at the start of the session.
pub fn next_frame(frame: usize, frame_count: usize) -> usize {
    if frame_count <= 1 {
        return 0;
    }
    frame % (frame_count - 1) + 1
}

/// Wall-clock driven frame selection, independent of the audio cursor.
#[derive(Debug)]
pub struct OverlayClock {
    frame: usize,
    frame_count: usize,
    delay: Duration,
    last_advance: Instant,
}

impl OverlayClock {
    pub fn new(asset: &OverlayAsset, now: Instant) -> Self {
        Self {
            frame: 0,
            frame_count: asset.frame_count,
            delay: Duration::from_millis(asset.delay_ms),
            last_advance: now,
        }
    }

    pub fn current(&self) -> usize {
        self.frame
    }

    /// Step to the next frame once strictly more than one delay has passed.
    pub fn tick(&mut self, now: Instant) -> usize {
        if now.saturating_duration_since(self.last_advance) > self.delay {
            self.frame = next_frame(self.frame, self.frame_count);
            self.last_advance = now;
        }
        self.frame
    }
}
