use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::audio::fft;
use crate::audio::spectrum;
use crate::error::ConfigError;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub canvas: CanvasConfig,
    #[serde(default)]
    pub spectrum: SpectrumConfig,
    #[serde(default)]
    pub bars: BarsConfig,
    #[serde(default)]
    pub overlay: OverlayConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub display: DisplayConfig,
}

#[derive(Debug, Deserialize)]
pub struct CanvasConfig {
    #[serde(default = "default_width")]
    pub width: usize,
    #[serde(default = "default_height")]
    pub height: usize,
    /// Bits per pixel, 24 or 32.
    #[serde(default = "default_depth")]
    pub depth: u8,
    #[serde(default = "default_overlay_top")]
    pub overlay_top: usize,
}

#[derive(Debug, Deserialize)]
pub struct SpectrumConfig {
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    #[serde(default = "default_smooth_factor")]
    pub smooth_factor: usize,
}

#[derive(Debug, Deserialize)]
pub struct BarsConfig {
    #[serde(default = "default_bar_width")]
    pub width: usize,
    #[serde(default = "default_bar_gap")]
    pub gap: usize,
    #[serde(default = "default_bar_color")]
    pub color: u32,
}

#[derive(Debug, Deserialize)]
pub struct OverlayConfig {
    #[serde(default = "default_gray_threshold")]
    pub gray_threshold: u8,
    #[serde(default)]
    pub invert: u8,
}

#[derive(Debug, Deserialize)]
pub struct PlaybackConfig {
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct AudioConfig {
    #[serde(default = "default_audio_backend")]
    pub backend: String,
    #[serde(default = "default_device")]
    pub device: String,
}

#[derive(Debug, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_display_backend")]
    pub backend: String,
    #[serde(default = "default_record_path")]
    pub record_path: PathBuf,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AudioBackend {
    Pipe,
    Silent,
    Cpal,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisplayBackend {
    Window,
    Record,
    None,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            depth: default_depth(),
            overlay_top: default_overlay_top(),
        }
    }
}

impl Default for SpectrumConfig {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            smooth_factor: default_smooth_factor(),
        }
    }
}

impl Default for BarsConfig {
    fn default() -> Self {
        Self {
            width: default_bar_width(),
            gap: default_bar_gap(),
            color: default_bar_color(),
        }
    }
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            gray_threshold: default_gray_threshold(),
            invert: 0,
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            backend: default_audio_backend(),
            device: default_device(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            backend: default_display_backend(),
            record_path: default_record_path(),
        }
    }
}

fn default_width() -> usize { 1024 }
fn default_height() -> usize { 600 }
fn default_depth() -> u8 { 32 }
fn default_overlay_top() -> usize { 50 }
fn default_window_size() -> usize { 1024 }
fn default_smooth_factor() -> usize { 2 }
fn default_bar_width() -> usize { 2 }
fn default_bar_gap() -> usize { 2 }
fn default_bar_color() -> u32 { 0xFFFFFF }
fn default_gray_threshold() -> u8 { 100 }
fn default_tick_ms() -> u64 { 23 }
fn default_audio_backend() -> String { "pipe".into() }
fn default_device() -> String { "default".into() }
fn default_display_backend() -> String { "window".into() }
fn default_record_path() -> PathBuf { PathBuf::from("barscope.mp4") }

impl Config {
    pub fn total_bars(&self) -> usize {
        spectrum::total_bars(self.spectrum.window_size, self.spectrum.smooth_factor.max(1))
    }

    pub fn audio_backend(&self) -> Result<AudioBackend, ConfigError> {
        match self.audio.backend.as_str() {
            "pipe" => Ok(AudioBackend::Pipe),
            "silent" => Ok(AudioBackend::Silent),
            "cpal" => Ok(AudioBackend::Cpal),
            other => Err(ConfigError::Backend {
                kind: "audio",
                name: other.to_string(),
            }),
        }
    }

    pub fn display_backend(&self) -> Result<DisplayBackend, ConfigError> {
        match self.display.backend.as_str() {
            "window" => Ok(DisplayBackend::Window),
            "record" => Ok(DisplayBackend::Record),
            "none" => Ok(DisplayBackend::None),
            other => Err(ConfigError::Backend {
                kind: "display",
                name: other.to_string(),
            }),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let canvas = &self.canvas;
        if canvas.depth != 24 && canvas.depth != 32 {
            return Err(ConfigError::Depth(canvas.depth));
        }
        if canvas.width == 0 || canvas.height == 0 || canvas.overlay_top >= canvas.height {
            return Err(ConfigError::Geometry {
                width: canvas.width,
                height: canvas.height,
                overlay_top: canvas.overlay_top,
            });
        }

        let window_size = self.spectrum.window_size;
        if !fft::is_valid_len(window_size) {
            return Err(ConfigError::WindowSize(window_size));
        }

        let smooth_factor = self.spectrum.smooth_factor;
        if smooth_factor == 0 || self.total_bars() == 0 {
            return Err(ConfigError::SmoothFactor {
                smooth_factor,
                window_size,
            });
        }

        let bars = self.total_bars();
        let needed = bars.saturating_mul(self.bars.width + self.bars.gap);
        if needed > canvas.width {
            return Err(ConfigError::TooManyBars {
                bars,
                needed,
                width: canvas.width,
            });
        }

        if self.playback.tick_ms == 0 {
            return Err(ConfigError::TickInterval);
        }

        self.audio_backend()?;
        self.display_backend()?;
        Ok(())
    }
}

/// First config file found: `./barscope.toml`, then the XDG-style path under
/// the home directory, then the platform config directory.
pub fn find_config() -> Option<PathBuf> {
    let local = PathBuf::from("barscope.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("barscope").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("barscope").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}

pub fn load_config(path: &Path) -> Option<Config> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(err) => {
            log::debug!("Config parse error in {}: {}", path.display(), err);
            None
        }
    }
}
