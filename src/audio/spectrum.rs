use rustfft::num_complex::Complex64;
use std::sync::atomic::{AtomicU64, Ordering};

use super::fft::Transform;
use crate::error::ComputeError;

/// Lowest bins dropped before banding; they carry mostly DC offset.
pub const SKIPPED_BINS: usize = 4;

/// Number of displayed bands for a window and smoothing factor.
pub fn total_bars(window_size: usize, smooth_factor: usize) -> usize {
    window_size / 2 / smooth_factor
}

/// Per-tick band magnitudes. Discarded once the bars are updated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpectrumFrame {
    bands: Vec<u64>,
}

impl SpectrumFrame {
    pub fn bands(&self) -> &[u64] {
        &self.bands
    }

    pub fn peak(&self) -> u64 {
        self.bands.iter().copied().max().unwrap_or(0)
    }
}

/// Session-wide maximum band magnitude. Starts at 1 and never decreases.
#[derive(Debug)]
pub struct RunningMax(AtomicU64);

impl RunningMax {
    pub fn new() -> Self {
        Self(AtomicU64::new(1))
    }

    /// Fold `value` in and return the maximum including it.
    pub fn observe(&self, value: u64) -> u64 {
        self.0.fetch_max(value, Ordering::AcqRel).max(value)
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }
}

impl Default for RunningMax {
    fn default() -> Self {
        Self::new()
    }
}

pub struct SpectrumEngine {
    transform: Transform,
    window: Vec<Complex64>,
    smooth_factor: usize,
    total_bars: usize,
}

impl SpectrumEngine {
    pub fn new(window_size: usize, smooth_factor: usize) -> Result<Self, ComputeError> {
        let transform = Transform::new(window_size)?;
        Ok(Self {
            window: vec![Complex64::new(0.0, 0.0); transform.len()],
            transform,
            smooth_factor,
            total_bars: total_bars(window_size, smooth_factor),
        })
    }

    pub fn total_bars(&self) -> usize {
        self.total_bars
    }

    /// Transform the `frames` samples starting at `offset` and band the result.
    ///
    /// At most one window is read; anything past `frames` or past the end of
    /// `mono` is zero.
    pub fn compute(
        &mut self,
        mono: &[u16],
        offset: usize,
        frames: usize,
    ) -> Result<SpectrumFrame, ComputeError> {
        let take = frames.min(self.window.len());
        let available = mono.get(offset..).unwrap_or(&[]);
        for (i, slot) in self.window.iter_mut().enumerate() {
            let sample = if i < take {
                available.get(i).copied().unwrap_or(0)
            } else {
                0
            };
            *slot = Complex64::new(sample as f64, 0.0);
        }

        let spectrum = self.transform.process(&self.window)?;
        Ok(band(spectrum, self.smooth_factor, self.total_bars))
    }
}

/// Group the lower half of `spectrum` into bands of `smooth_factor` bins.
///
/// Bins below [`SKIPPED_BINS`] are ignored. Each bin's magnitude is truncated
/// to an integer before summing and the sum is divided by `smooth_factor`
/// with truncation. Slots with no bins left stay at zero.
pub fn band(spectrum: &[Complex64], smooth_factor: usize, total_bars: usize) -> SpectrumFrame {
    let half = spectrum.len() / 2;
    let mut bands = vec![0u64; total_bars];

    let starts = (SKIPPED_BINS..half).step_by(smooth_factor.max(1));
    for (slot, start) in bands.iter_mut().zip(starts) {
        let sum: u64 = (start..start + smooth_factor)
            .filter_map(|bin| spectrum.get(bin))
            .map(|v| v.norm() as u64)
            .sum();
        *slot = sum / smooth_factor as u64;
    }

    SpectrumFrame { bands }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn argmax(values: &[u64]) -> usize {
        values
            .iter()
            .enumerate()
            .max_by_key(|(_, v)| **v)
            .map(|(i, _)| i)
            .unwrap()
    }

    #[test]
    fn default_geometry_has_256_bars() {
        let engine = SpectrumEngine::new(1024, 2).unwrap();
        assert_eq!(engine.total_bars(), 256);
    }

    #[test]
    fn silence_gives_zero_bands() {
        let mut engine = SpectrumEngine::new(1024, 2).unwrap();
        let frame = engine.compute(&vec![0u16; 4096], 0, 1024).unwrap();
        assert_eq!(frame.bands().len(), 256);
        assert!(frame.bands().iter().all(|&b| b == 0));
    }

    #[test]
    fn sinusoid_lands_in_its_band() {
        let k = 100;
        let mono: Vec<u16> = (0..1024)
            .map(|i| (20_000.0 + 10_000.0 * (2.0 * PI * k as f64 * i as f64 / 1024.0).cos()) as u16)
            .collect();

        let mut engine = SpectrumEngine::new(1024, 2).unwrap();
        let frame = engine.compute(&mono, 0, 1024).unwrap();

        assert_eq!(argmax(frame.bands()), (k - SKIPPED_BINS) / 2);
    }

    #[test]
    fn first_bins_are_excluded() {
        let mut spectrum = vec![Complex64::new(0.0, 0.0); 16];
        for bin in spectrum.iter_mut().take(SKIPPED_BINS) {
            *bin = Complex64::new(1000.0, 0.0);
        }
        spectrum[4] = Complex64::new(3.0, 4.0);
        spectrum[5] = Complex64::new(2.9, 0.0);

        let frame = band(&spectrum, 2, 4);
        // (5 + 2) / 2 with truncation at each step
        assert_eq!(frame.bands(), &[3, 0, 0, 0]);
    }

    #[test]
    fn trailing_slots_stay_zero() {
        let spectrum = vec![Complex64::new(10.0, 0.0); 1024];
        let frame = band(&spectrum, 2, 256);
        assert!(frame.bands()[..254].iter().all(|&b| b == 10));
        assert_eq!(&frame.bands()[254..], &[0, 0]);
    }

    #[test]
    fn short_tail_is_zero_padded() {
        let mono = vec![500u16; 10];
        let mut engine = SpectrumEngine::new(16, 1).unwrap();
        let padded = engine.compute(&mono, 6, 16).unwrap();

        let mut explicit = vec![0u16; 16];
        explicit[..4].copy_from_slice(&[500; 4]);
        let expected = engine.compute(&explicit, 0, 16).unwrap();

        assert_eq!(padded, expected);
    }

    #[test]
    fn offset_past_end_reads_silence() {
        let mut engine = SpectrumEngine::new(16, 1).unwrap();
        let frame = engine.compute(&[9u16; 4], 100, 16).unwrap();
        assert_eq!(frame.peak(), 0);
    }

    #[test]
    fn running_max_only_grows() {
        let max = RunningMax::new();
        assert_eq!(max.get(), 1);
        let mut last = max.get();
        for value in [0, 5, 3, 12, 7, 12, 40, 2] {
            let seen = max.observe(value);
            assert!(seen >= last);
            assert_eq!(seen, max.get());
            last = seen;
        }
        assert_eq!(max.get(), 40);
    }

    #[test]
    fn rejects_invalid_window() {
        assert!(SpectrumEngine::new(1000, 2).is_err());
    }
}
