use super::bars::{Bar, BarSet};
use super::frame::Canvas;
use super::overlay::OverlayAsset;

/// ITU-R 601 luma, truncated.
pub fn luma(r: u8, g: u8, b: u8) -> u8 {
    (0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64) as u8
}

/// Canvas channel bytes for a packed bar color: the top byte lands in
/// channel 0 (blue on the display) and the low byte in channel 2 (red).
pub fn bar_channels(color: u32) -> [u8; 3] {
    [(color >> 16) as u8, (color >> 8) as u8, color as u8]
}

#[derive(Clone, Debug)]
pub struct Compositor {
    pub gray_threshold: u8,
    /// XORed into white pixels and ORed into black ones.
    pub invert: u8,
    /// Distance from the canvas top to the overlay's first row.
    pub overlay_top: usize,
    pub bar_color: u32,
}

impl Compositor {
    pub fn compose(&self, canvas: &mut Canvas, overlay: &OverlayAsset, frame: usize, bars: &BarSet) {
        self.draw_overlay(canvas, overlay, frame);
        for bar in bars.bars() {
            self.draw_bar(canvas, bar);
        }
    }

    /// Paint every canvas pixel: thresholded overlay inside its rectangle,
    /// black everywhere else.
    pub fn draw_overlay(&self, canvas: &mut Canvas, overlay: &OverlayAsset, frame: usize) {
        let frame = if frame >= overlay.frame_count { 0 } else { frame };
        let start_x = (canvas.width / 2).saturating_sub(overlay.width / 2);
        let start_y = self.overlay_top;

        let white = 0xFF ^ self.invert;
        let black = 0x00 | self.invert;

        for y in 0..canvas.height {
            for x in 0..canvas.width {
                let inside = x >= start_x
                    && x < start_x + overlay.width
                    && y >= start_y
                    && y < start_y + overlay.height;

                if !inside {
                    canvas.put(x, y, [0, 0, 0]);
                    continue;
                }

                let [r, g, b] = overlay.pixel(frame, x - start_x, y - start_y);
                let value = if luma(r, g, b) > self.gray_threshold { white } else { black };
                canvas.put(x, y, [value; 3]);
            }
        }
    }

    /// Solid rectangle standing on the bottom edge.
    pub fn draw_bar(&self, canvas: &mut Canvas, bar: &Bar) {
        let channels = bar_channels(self.bar_color);
        let top = canvas.height.saturating_sub(bar.height);
        let right = (bar.x + bar.width).min(canvas.width);

        for y in top..canvas.height {
            for x in bar.x..right {
                canvas.put(x, y, channels);
            }
        }
    }
}
