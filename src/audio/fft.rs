//! Recursive radix-2 decimation-in-time transform.
//!
//! Each level reads its even and odd subsequences through strided views of
//! the caller's input and writes into the two halves of one pre-sized output
//! buffer, so a transform allocates nothing after construction.

use rustfft::num_complex::Complex64;
use std::f64::consts::PI;

use crate::error::ComputeError;

pub const MAX_TRANSFORM_LEN: usize = 262_144;

pub fn is_valid_len(len: usize) -> bool {
    len.is_power_of_two() && len <= MAX_TRANSFORM_LEN
}

/// A reusable transform of one fixed length.
pub struct Transform {
    twiddles: Vec<Complex64>,
    output: Vec<Complex64>,
}

impl Transform {
    pub fn new(len: usize) -> Result<Self, ComputeError> {
        if !is_valid_len(len) {
            return Err(ComputeError::InvalidLength(len));
        }
        let twiddles = (0..len / 2)
            .map(|k| Complex64::from_polar(1.0, -2.0 * PI * k as f64 / len as f64))
            .collect();
        Ok(Self {
            twiddles,
            output: vec![Complex64::new(0.0, 0.0); len],
        })
    }

    pub fn len(&self) -> usize {
        self.output.len()
    }

    pub fn process(&mut self, input: &[Complex64]) -> Result<&[Complex64], ComputeError> {
        if input.len() != self.output.len() {
            return Err(ComputeError::InvalidLength(input.len()));
        }
        split_combine(input, 1, &mut self.output, &self.twiddles, 1);
        Ok(&self.output)
    }
}

/// One-shot transform of `samples`.
#[cfg(test)]
pub fn transform(samples: &[Complex64]) -> Result<Vec<Complex64>, ComputeError> {
    let mut plan = Transform::new(samples.len())?;
    plan.process(samples).map(|out| out.to_vec())
}

/// `input[i * stride]` for `i in 0..out.len()` is the sequence to transform.
/// `twiddle_step` maps this level's rotation index onto the full-size table.
fn split_combine(
    input: &[Complex64],
    stride: usize,
    out: &mut [Complex64],
    twiddles: &[Complex64],
    twiddle_step: usize,
) {
    let n = out.len();
    if n == 1 {
        out[0] = input[0];
        return;
    }

    let half = n / 2;
    let (even, odd) = out.split_at_mut(half);
    split_combine(input, stride * 2, even, twiddles, twiddle_step * 2);
    split_combine(&input[stride..], stride * 2, odd, twiddles, twiddle_step * 2);

    for k in 0..half {
        let rotated = twiddles[k * twiddle_step] * odd[k];
        let e = even[k];
        even[k] = e + rotated;
        odd[k] = e - rotated;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustfft::FftPlanner;

    fn c(re: f64) -> Complex64 {
        Complex64::new(re, 0.0)
    }

    #[test]
    fn rejects_invalid_lengths() {
        for len in [0, 3, 5, 1000, 262_145] {
            let input = vec![c(0.0); len];
            assert_eq!(transform(&input), Err(ComputeError::InvalidLength(len)));
        }
        assert!(Transform::new(524_288).is_err());
    }

    #[test]
    fn single_point_is_identity() {
        let out = transform(&[Complex64::new(3.5, -1.0)]).unwrap();
        assert_eq!(out, vec![Complex64::new(3.5, -1.0)]);
    }

    #[test]
    fn zero_input_gives_zero_spectrum() {
        let out = transform(&vec![c(0.0); 1024]).unwrap();
        assert!(out.iter().all(|v| v.norm() == 0.0));
    }

    #[test]
    fn impulse_is_flat() {
        let mut input = vec![c(0.0); 64];
        input[0] = c(1.0);
        let out = transform(&input).unwrap();
        for v in out {
            assert!((v - c(1.0)).norm() < 1e-12);
        }
    }

    #[test]
    fn matches_reference_fft() {
        let len = 1024;
        let input: Vec<Complex64> = (0..len)
            .map(|i| {
                let t = i as f64;
                Complex64::new((t * 0.37).sin() * 900.0 + (t * 0.011).cos() * 300.0, 0.0)
            })
            .collect();

        let ours = transform(&input).unwrap();

        let mut reference = input.clone();
        FftPlanner::<f64>::new().plan_fft_forward(len).process(&mut reference);

        for (a, b) in ours.iter().zip(reference.iter()) {
            assert!((a - b).norm() < 1e-6 * (1.0 + b.norm()));
        }
    }

    #[test]
    fn reuses_plan_across_calls() {
        let mut plan = Transform::new(8).unwrap();
        let first = plan.process(&[c(1.0); 8]).unwrap().to_vec();
        assert!((first[0] - c(8.0)).norm() < 1e-12);
        let second = plan.process(&[c(0.0); 8]).unwrap();
        assert!(second.iter().all(|v| v.norm() == 0.0));
        assert!(plan.process(&[c(0.0); 4]).is_err());
    }
}
