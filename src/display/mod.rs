pub mod ffmpeg;

use anyhow::Result;

use crate::render::frame::Canvas;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisplayEvent {
    /// The visible area was damaged and should be redrawn from the last image.
    ///
    /// Reserved for in-process window backends. The ffplay window repaints
    /// itself and `NullDisplay` has nothing to damage, so neither raises it.
    #[allow(dead_code)]
    Expose,
    Quit,
}

/// Where finished canvases are presented.
pub trait DisplaySink {
    /// Upload a complete canvas and show it.
    fn blit(&mut self, canvas: &Canvas) -> Result<()>;

    /// Show the last uploaded image again.
    fn refresh(&mut self) -> Result<()>;

    fn poll_event(&mut self) -> Option<DisplayEvent>;

    fn close(&mut self) -> Result<()>;
}

/// Discards frames. Used for headless runs.
#[derive(Debug, Default)]
pub struct NullDisplay {
    pub blits: u64,
}

impl DisplaySink for NullDisplay {
    fn blit(&mut self, _canvas: &Canvas) -> Result<()> {
        self.blits += 1;
        Ok(())
    }

    fn refresh(&mut self) -> Result<()> {
        Ok(())
    }

    fn poll_event(&mut self) -> Option<DisplayEvent> {
        None
    }

    fn close(&mut self) -> Result<()> {
        log::debug!("Headless display received {} frame(s)", self.blits);
        Ok(())
    }
}
