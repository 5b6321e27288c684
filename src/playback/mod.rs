pub mod worker;

use anyhow::{anyhow, Result};
use indicatif::ProgressBar;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SendError, Sender};
use std::thread;

use crate::audio::decode::PcmStream;
use crate::audio::sink::AudioSink;
use crate::audio::spectrum::RunningMax;
use crate::display::{DisplayEvent, DisplaySink};
use crate::error::SinkError;
use crate::render::frame::Canvas;
use worker::{RenderRequest, TickRenderer};

/// State shared by the driver and the render worker for one session.
#[derive(Debug)]
pub struct SessionContext {
    running: AtomicBool,
    pub running_max: RunningMax,
    pub stats: TickStats,
}

#[derive(Debug, Default)]
pub struct TickStats {
    pub ticks: AtomicU64,
    pub blits: AtomicU64,
    pub skipped: AtomicU64,
    pub failed: AtomicU64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionSummary {
    pub ticks: u64,
    pub blits: u64,
    pub skipped: u64,
    pub failed: u64,
    pub running_max: u64,
}

impl SessionContext {
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(true),
            running_max: RunningMax::new(),
            stats: TickStats::default(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            ticks: self.stats.ticks.load(Ordering::Relaxed),
            blits: self.stats.blits.load(Ordering::Relaxed),
            skipped: self.stats.skipped.load(Ordering::Relaxed),
            failed: self.stats.failed.load(Ordering::Relaxed),
            running_max: self.running_max.get(),
        }
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Audio frames played per tick.
pub fn tick_frames(sample_rate: u32, tick_ms: u64) -> usize {
    ((sample_rate as f64 / 1000.0 * tick_ms as f64) as usize).max(1)
}

/// Driver side of the canvas exchange. While the worker holds the canvas an
/// update is outstanding and nothing may be blitted.
struct Handoff {
    requests: Option<Sender<RenderRequest>>,
    finished: Receiver<Canvas>,
    held: Option<Canvas>,
}

impl Handoff {
    /// Pass the canvas to the worker unless an update is already in flight.
    fn request(&mut self, offset: usize) {
        let Some(requests) = &self.requests else {
            return;
        };
        if let Some(canvas) = self.held.take() {
            if let Err(SendError(request)) = requests.send(RenderRequest { offset, canvas }) {
                self.held = Some(request.canvas);
            }
        }
    }

    /// The finished canvas, if the worker has handed it back.
    fn collect(&mut self) -> Option<&Canvas> {
        if self.held.is_none() {
            self.held = self.finished.try_recv().ok();
        }
        self.held.as_ref()
    }
}

/// Play `stream` to completion (or until the display quits) while the worker
/// renders into `canvas` with `renderer`.
#[allow(clippy::too_many_arguments)]
pub fn run<R, A, D>(
    ctx: &SessionContext,
    stream: &PcmStream,
    tick_frames: usize,
    canvas: Canvas,
    renderer: R,
    audio: &mut A,
    display: &mut D,
    progress: &ProgressBar,
) -> Result<SessionSummary>
where
    R: TickRenderer,
    A: AudioSink + ?Sized,
    D: DisplaySink + ?Sized,
{
    let (request_tx, request_rx) = mpsc::channel();
    let (finished_tx, finished_rx) = mpsc::channel();

    let outcome = thread::scope(|scope| {
        let worker = scope.spawn(move || worker::worker_loop(ctx, renderer, request_rx, finished_tx));

        let mut handoff = Handoff {
            requests: Some(request_tx),
            finished: finished_rx,
            held: Some(canvas),
        };
        let outcome = drive(ctx, stream, tick_frames, &mut handoff, audio, display, progress);

        ctx.stop();
        handoff.requests.take();
        if let Err(err) = audio.drain() {
            log::warn!("Failed to drain audio: {}", err);
        }
        worker.join().map_err(|_| anyhow!("Render worker panicked"))?;
        outcome
    });

    let closed = display.close();
    outcome?;
    closed?;
    Ok(ctx.summary())
}

fn drive<A, D>(
    ctx: &SessionContext,
    stream: &PcmStream,
    tick_frames: usize,
    handoff: &mut Handoff,
    audio: &mut A,
    display: &mut D,
    progress: &ProgressBar,
) -> Result<()>
where
    A: AudioSink + ?Sized,
    D: DisplaySink + ?Sized,
{
    let total_frames = stream.frame_count();
    let mut offset = 0usize;

    'ticks: loop {
        while let Some(event) = display.poll_event() {
            match event {
                DisplayEvent::Expose => display.refresh()?,
                DisplayEvent::Quit => {
                    log::info!("Display closed, stopping playback");
                    break 'ticks;
                }
            }
        }

        // The worker sees the offset as it stood when the canvas was handed over.
        handoff.request(offset);

        let bytes = stream.frames(offset, offset + tick_frames);
        if !bytes.is_empty() {
            match audio.write(bytes) {
                Ok(()) => {}
                Err(SinkError::Underrun) => {
                    log::warn!("Audio underrun at frame {}, recovering", offset);
                    audio.recover()?;
                }
                Err(err) => return Err(err.into()),
            }
        }
        offset += tick_frames;
        ctx.stats.ticks.fetch_add(1, Ordering::Relaxed);

        match handoff.collect() {
            Some(canvas) => {
                display.blit(canvas)?;
                ctx.stats.blits.fetch_add(1, Ordering::Relaxed);
            }
            None => {
                log::trace!("Render still in flight at frame {}, repeating last image", offset);
                display.refresh()?;
                ctx.stats.skipped.fetch_add(1, Ordering::Relaxed);
            }
        }

        progress.set_position(offset.min(total_frames) as u64);

        if offset > total_frames {
            break;
        }
    }

    Ok(())
}
