mod audio;
mod cli;
mod config;
mod display;
mod error;
mod playback;
mod render;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

use audio::sink::{AudioSink, PipeSink, SilentSink};
use audio::spectrum::SpectrumEngine;
use cli::Cli;
use config::{AudioBackend, Config, DisplayBackend};
use display::ffmpeg::{FfmpegMode, FfmpegSink};
use display::{DisplaySink, NullDisplay};
use playback::worker::Visualizer;
use playback::SessionContext;
use render::bars::BarSet;
use render::compose::Compositor;
use render::frame::Canvas;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    let config = match config::find_config() {
        Some(path) => match config::load_config(&path) {
            Some(cfg) => {
                log::info!("Loaded config from {}", path.display());
                cfg
            }
            None => {
                log::warn!("Failed to load config from {}, using defaults", path.display());
                Config::default()
            }
        },
        None => Config::default(),
    };
    config.validate().context("Invalid configuration")?;

    log::info!("barscope - audio-reactive bar graph");
    log::info!("Audio: {}", cli.audio.display());
    log::info!("Overlay: {}", cli.overlay.display());

    // 1. Decode inputs
    let stream = match audio::decode::decode_pcm(&cli.audio) {
        Ok(stream) => stream,
        Err(err) if err.is_format() => {
            anyhow::bail!("{} is not a 16-bit stereo PCM WAV file: {}", cli.audio.display(), err)
        }
        Err(err) => {
            return Err(err).with_context(|| format!("Failed to read {}", cli.audio.display()))
        }
    };
    let mono = stream.downmix();
    let overlay = render::overlay::decode_overlay(&cli.overlay, config.canvas.width, config.canvas.height)
        .with_context(|| format!("Failed to load overlay {}", cli.overlay.display()))?;

    // 2. Render state
    let canvas = Canvas::new(config.canvas.width, config.canvas.height, config.canvas.depth);
    let spectrum = SpectrumEngine::new(config.spectrum.window_size, config.spectrum.smooth_factor)?;
    let bars = BarSet::new(spectrum.total_bars(), config.bars.width, config.bars.gap);
    let compositor = Compositor {
        gray_threshold: config.overlay.gray_threshold,
        invert: config.overlay.invert,
        overlay_top: config.canvas.overlay_top,
        bar_color: config.bars.color,
    };
    let tick_frames = playback::tick_frames(stream.sample_rate, config.playback.tick_ms);

    log::info!(
        "Canvas: {}x{} @ {}bpp, {} bars, {} frames per {}ms tick",
        canvas.width,
        canvas.height,
        canvas.bits_per_pixel,
        spectrum.total_bars(),
        tick_frames,
        config.playback.tick_ms
    );

    // 3. Sinks
    let mut audio_sink = open_audio(&config, &stream)?;
    let mut display = open_display(&config, &cli, &canvas)?;

    // 4. Play
    let pb = ProgressBar::new(stream.frame_count() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} frames ({eta} remaining)")?
            .progress_chars("=>-"),
    );

    let ctx = SessionContext::new();
    let visualizer = Visualizer::new(mono.samples(), &overlay, spectrum, bars, compositor, tick_frames);
    let summary = playback::run(
        &ctx,
        &stream,
        tick_frames,
        canvas,
        visualizer,
        audio_sink.as_mut(),
        display.as_mut(),
        &pb,
    )?;

    pb.finish_with_message("Playback complete");

    log::info!(
        "Done: {} ticks, {} blits, {} skipped, {} failed computes, running max {}",
        summary.ticks,
        summary.blits,
        summary.skipped,
        summary.failed,
        summary.running_max
    );
    Ok(())
}

fn open_audio(config: &Config, stream: &audio::decode::PcmStream) -> Result<Box<dyn AudioSink>> {
    let sink: Box<dyn AudioSink> = match config.audio_backend()? {
        AudioBackend::Pipe => Box::new(PipeSink::new(stream, &config.audio.device)?),
        AudioBackend::Silent => {
            log::info!("Silent audio backend, keeping time only");
            Box::new(SilentSink::new(stream))
        }
        #[cfg(feature = "playback")]
        AudioBackend::Cpal => Box::new(audio::cpal_sink::CpalSink::new(stream, &config.audio.device)?),
        #[cfg(not(feature = "playback"))]
        AudioBackend::Cpal => anyhow::bail!(
            "The cpal audio backend requires the 'playback' feature. \
             Rebuild with: cargo build --features playback"
        ),
    };
    Ok(sink)
}

fn open_display(config: &Config, cli: &Cli, canvas: &Canvas) -> Result<Box<dyn DisplaySink>> {
    let mode = match config.display_backend()? {
        DisplayBackend::None => {
            log::info!("Headless display, frames are discarded");
            return Ok(Box::new(NullDisplay::default()));
        }
        DisplayBackend::Window => FfmpegMode::Window,
        DisplayBackend::Record => {
            log::info!("Recording to {}", config.display.record_path.display());
            FfmpegMode::Record {
                output: config.display.record_path.clone(),
                audio: cli.audio.clone(),
            }
        }
    };

    let sink = FfmpegSink::new(
        &mode,
        canvas.width,
        canvas.height,
        canvas.bits_per_pixel,
        config.playback.tick_ms,
    )?;
    Ok(Box::new(sink))
}
