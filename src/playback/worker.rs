use std::sync::atomic::Ordering;
use std::sync::mpsc::{Receiver, Sender};
use std::time::Instant;

use super::SessionContext;
use crate::audio::spectrum::{RunningMax, SpectrumEngine};
use crate::error::ComputeError;
use crate::render::bars::BarSet;
use crate::render::compose::Compositor;
use crate::render::frame::Canvas;
use crate::render::overlay::{OverlayAsset, OverlayClock};

/// One outstanding update: the canvas to draw into and the audio frame the
/// driver had reached when it asked.
pub struct RenderRequest {
    pub offset: usize,
    pub canvas: Canvas,
}

/// Work done on the render thread once per requested update.
pub trait TickRenderer: Send {
    /// Draw a complete frame. An error means the canvas holds the overlay
    /// but no bars for this tick.
    fn render(
        &mut self,
        canvas: &mut Canvas,
        offset: usize,
        running_max: &RunningMax,
    ) -> Result<(), ComputeError>;
}

pub fn worker_loop<R: TickRenderer>(
    ctx: &SessionContext,
    mut renderer: R,
    requests: Receiver<RenderRequest>,
    finished: Sender<Canvas>,
) {
    while ctx.is_running() {
        let Ok(mut request) = requests.recv() else {
            break;
        };

        if let Err(err) = renderer.render(&mut request.canvas, request.offset, &ctx.running_max) {
            log::debug!("Skipping bar update at frame {}: {}", request.offset, err);
            ctx.stats.failed.fetch_add(1, Ordering::Relaxed);
        }

        if finished.send(request.canvas).is_err() {
            break;
        }
    }
    log::debug!("Render worker stopped");
}

/// Overlay, spectrum and bars for one tick of the session.
pub struct Visualizer<'a> {
    mono: &'a [u16],
    overlay: &'a OverlayAsset,
    clock: OverlayClock,
    spectrum: SpectrumEngine,
    bars: BarSet,
    compositor: Compositor,
    tick_frames: usize,
}

impl<'a> Visualizer<'a> {
    pub fn new(
        mono: &'a [u16],
        overlay: &'a OverlayAsset,
        spectrum: SpectrumEngine,
        bars: BarSet,
        compositor: Compositor,
        tick_frames: usize,
    ) -> Self {
        Self {
            mono,
            overlay,
            clock: OverlayClock::new(overlay, Instant::now()),
            spectrum,
            bars,
            compositor,
            tick_frames,
        }
    }
}

impl TickRenderer for Visualizer<'_> {
    fn render(
        &mut self,
        canvas: &mut Canvas,
        offset: usize,
        running_max: &RunningMax,
    ) -> Result<(), ComputeError> {
        let overlay_frame = self.clock.current();
        self.clock.tick(Instant::now());

        match self.spectrum.compute(self.mono, offset, self.tick_frames) {
            Ok(frame) => {
                let max = running_max.observe(frame.peak());
                self.bars.update(&frame, canvas.height, max);
                self.compositor.compose(canvas, self.overlay, overlay_frame, &self.bars);
                Ok(())
            }
            Err(err) => {
                self.compositor.draw_overlay(canvas, self.overlay, overlay_frame);
                Err(err)
            }
        }
    }
}
