use thiserror::Error;

/// Errors produced while parsing a RIFF/WAVE container.
#[derive(Debug, Error)]
pub enum WavError {
    #[error("bad {chunk} signature: expected {expected:02x?}, found {found:02x?}")]
    BadSignature {
        chunk: &'static str,
        expected: [u8; 4],
        found: [u8; 4],
    },

    #[error("unsupported PCM layout: format {format}, {channels} channel(s), {bits_per_sample} bits")]
    UnsupportedLayout {
        format: u16,
        channels: u16,
        bits_per_sample: u16,
    },

    #[error("failed to read PCM data: {0}")]
    Io(#[from] std::io::Error),
}

impl WavError {
    /// True when the container itself is malformed, as opposed to an I/O failure.
    pub fn is_format(&self) -> bool {
        matches!(self, Self::BadSignature { .. } | Self::UnsupportedLayout { .. })
    }
}

#[derive(Debug, Error)]
pub enum OverlayError {
    #[error("failed to decode overlay image: {0}")]
    Image(#[from] image::ImageError),

    #[error("failed to open overlay image: {0}")]
    Io(#[from] std::io::Error),

    #[error("overlay image contains no frames")]
    Empty,

    #[error("overlay is {width}x{height}, larger than the {max_width}x{max_height} canvas")]
    TooLarge {
        width: u32,
        height: u32,
        max_width: usize,
        max_height: usize,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ComputeError {
    #[error("transform length {0} is not a power of two in 1..=262144")]
    InvalidLength(usize),
}

#[derive(Debug, Error)]
pub enum SinkError {
    /// The device ran dry. Only the cpal backend reports this; aplay recovers
    /// from its own underruns and the silent sink has no device.
    #[cfg_attr(not(feature = "playback"), allow(dead_code))]
    #[error("audio sink underrun")]
    Underrun,

    #[error("sink i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("sink stream error: {0}")]
    Stream(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("spectrum window size {0} must be a power of two no larger than 262144")]
    WindowSize(usize),

    #[error("smooth factor {smooth_factor} leaves no bars for a window of {window_size}")]
    SmoothFactor {
        smooth_factor: usize,
        window_size: usize,
    },

    #[error("too many bars for this window: {bars} bars need {needed}px, canvas is {width}px wide")]
    TooManyBars {
        bars: usize,
        needed: usize,
        width: usize,
    },

    #[error("unsupported canvas depth {0} (expected 24 or 32 bits per pixel)")]
    Depth(u8),

    #[error("invalid canvas geometry {width}x{height} with overlay top {overlay_top}")]
    Geometry {
        width: usize,
        height: usize,
        overlay_top: usize,
    },

    #[error("tick interval must be at least 1ms")]
    TickInterval,

    #[error("unknown {kind} backend '{name}'")]
    Backend { kind: &'static str, name: String },
}
