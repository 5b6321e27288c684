use crate::audio::spectrum::SpectrumFrame;

/// Visual state of one band.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Bar {
    pub x: usize,
    pub width: usize,
    pub height: usize,
}

/// Height in pixels for `magnitude` against the session maximum.
///
/// The tallest bar reaches half the canvas.
pub fn bar_height(magnitude: u64, canvas_height: usize, running_max: u64) -> usize {
    (magnitude.saturating_mul(canvas_height as u64) / 2 / running_max.max(1)) as usize
}

#[derive(Clone, Debug)]
pub struct BarSet {
    bars: Vec<Bar>,
}

impl BarSet {
    /// Lay out `count` bars left to right, `gap` pixels apart.
    pub fn new(count: usize, width: usize, gap: usize) -> Self {
        let bars = (0..count)
            .map(|i| Bar {
                x: i * (width + gap),
                width,
                height: 1,
            })
            .collect();
        Self { bars }
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn update(&mut self, frame: &SpectrumFrame, canvas_height: usize, running_max: u64) {
        for (bar, &magnitude) in self.bars.iter_mut().zip(frame.bands()) {
            bar.height = bar_height(magnitude, canvas_height, running_max);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustfft::num_complex::Complex64;

    #[test]
    fn layout_steps_by_width_and_gap() {
        let set = BarSet::new(3, 2, 2);
        let xs: Vec<usize> = set.bars().iter().map(|b| b.x).collect();
        assert_eq!(xs, vec![0, 4, 8]);
        assert!(set.bars().iter().all(|b| b.height == 1 && b.width == 2));
    }

    #[test]
    fn height_is_floored_against_running_max() {
        assert_eq!(bar_height(0, 600, 1), 0);
        assert_eq!(bar_height(7, 600, 7), 300);
        assert_eq!(bar_height(1, 600, 7), 42);
        assert_eq!(bar_height(5, 601, 3), 500);
        assert_eq!(bar_height(5, 600, 0), 1500);
    }

    #[test]
    fn update_scales_every_bar() {
        let spectrum: Vec<Complex64> = (0..16).map(|i| Complex64::new(i as f64 * 10.0, 0.0)).collect();
        let frame = crate::audio::spectrum::band(&spectrum, 1, 4);
        let max = frame.peak();

        let mut set = BarSet::new(4, 1, 0);
        set.update(&frame, 100, max);

        let heights: Vec<usize> = set.bars().iter().map(|b| b.height).collect();
        let expected: Vec<usize> = frame.bands().iter().map(|&m| bar_height(m, 100, max)).collect();
        assert_eq!(heights, expected);
        assert_eq!(heights[3], 50);
    }
}
