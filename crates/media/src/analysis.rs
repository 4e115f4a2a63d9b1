//! Windowed FFT magnitudes in decibels.

use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use crate::error::MediaError;

/// Lowest level reported; silence and exact zeros land here instead of
/// negative infinity.
pub const SILENCE_DB: f32 = -160.0;

/// Computes `bins` decibel magnitudes from a window of `2 * bins` samples.
pub struct SpectrumAnalyzer {
    bins: usize,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    window_gain: f32,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl std::fmt::Debug for SpectrumAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectrumAnalyzer")
            .field("bins", &self.bins)
            .finish()
    }
}

impl SpectrumAnalyzer {
    pub fn new(bins: usize) -> Result<Self, MediaError> {
        if bins < 2 || !bins.is_power_of_two() {
            return Err(MediaError::InvalidBins(bins));
        }
        let size = bins * 2;
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(size);
        let window: Vec<f32> = (0..size)
            .map(|i| {
                let t = i as f32 / (size - 1) as f32;
                0.5 * (1.0 - (std::f32::consts::TAU * t).cos())
            })
            .collect();
        let window_gain = window.iter().sum::<f32>();
        let scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];
        Ok(Self {
            bins,
            fft,
            window,
            window_gain,
            buffer: vec![Complex::new(0.0, 0.0); size],
            scratch,
        })
    }

    pub fn bins(&self) -> usize {
        self.bins
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    /// Analyses the window starting at `start`, wrapping around the end of
    /// `samples` so looping audio has no seam.
    pub fn analyze(&mut self, samples: &[f32], start: usize) -> Vec<f32> {
        if samples.is_empty() {
            return vec![SILENCE_DB; self.bins];
        }
        for (i, slot) in self.buffer.iter_mut().enumerate() {
            let sample = samples[(start + i) % samples.len()];
            *slot = Complex::new(sample * self.window[i], 0.0);
        }
        self.fft
            .process_with_scratch(&mut self.buffer, &mut self.scratch);

        // A full-scale sine peaks at 0 dB after this normalisation.
        let norm = 2.0 / self.window_gain;
        self.buffer[..self.bins]
            .iter()
            .map(|c| {
                let magnitude = c.norm() * norm;
                if magnitude > 0.0 {
                    (20.0 * magnitude.log10()).max(SILENCE_DB)
                } else {
                    SILENCE_DB
                }
            })
            .collect()
    }
}
