//! Audio feature snapshots and their per-frame normalisation.
//!
//! A [`FeatureSource`] hands the frame driver at most one snapshot of
//! frequency magnitudes per frame. [`AudioProcessor`] turns that snapshot
//! into normalised, smoothed levels. When no snapshot is available the
//! levels fall back to zero so audio-driven terms drop out of the frame.

use std::sync::Arc;

use crate::color::Rgba;
use crate::error::SetupError;
use crate::math::{remap_clamped, smooth_toward};
use crate::playhead::FrameTime;

/// Magnitudes in decibels, one per frequency bin.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFeatures {
    magnitudes: Arc<[f32]>,
}

impl AudioFeatures {
    pub fn new(magnitudes: impl Into<Arc<[f32]>>) -> Self {
        Self {
            magnitudes: magnitudes.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.magnitudes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.magnitudes.is_empty()
    }

    pub fn magnitudes(&self) -> &[f32] {
        &self.magnitudes
    }
}

/// Provider of spectrum snapshots, typically an analysed audio asset.
///
/// `features` is called at most once per frame. `None` means nothing is
/// available yet (or any more) and is not an error.
pub trait FeatureSource: Send {
    fn bins(&self) -> usize;
    fn features(&mut self, time: &FrameTime) -> Option<AudioFeatures>;
}

/// A feature source still being prepared off the frame thread.
///
/// The runner blocks on every pending source before the first frame, so a
/// failure here is reported as a setup error.
pub trait PendingSource: Send {
    fn describe(&self) -> String;
    fn wait(self: Box<Self>) -> Result<Box<dyn FeatureSource>, SetupError>;
}

/// Where a sketch's audio comes from.
#[derive(Default)]
pub enum AudioInput {
    #[default]
    None,
    Ready(Box<dyn FeatureSource>),
    Pending(Box<dyn PendingSource>),
}

impl std::fmt::Debug for AudioInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioInput::None => f.write_str("AudioInput::None"),
            AudioInput::Ready(source) => write!(f, "AudioInput::Ready({} bins)", source.bins()),
            AudioInput::Pending(pending) => write!(f, "AudioInput::Pending({})", pending.describe()),
        }
    }
}

impl AudioInput {
    /// Blocks until the source is usable.
    pub fn resolve(self) -> Result<Option<Box<dyn FeatureSource>>, SetupError> {
        match self {
            AudioInput::None => Ok(None),
            AudioInput::Ready(source) => Ok(Some(source)),
            AudioInput::Pending(pending) => pending.wait().map(Some),
        }
    }
}

/// Decibel window mapped linearly onto `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecibelRange {
    pub floor: f32,
    pub ceiling: f32,
}

impl Default for DecibelRange {
    fn default() -> Self {
        Self {
            floor: -100.0,
            ceiling: 0.0,
        }
    }
}

impl DecibelRange {
    pub fn new(floor: f32, ceiling: f32) -> Self {
        Self { floor, ceiling }
    }

    /// Clamped linear position of `db` inside the window. A collapsed window
    /// maps everything to zero.
    pub fn normalize(&self, db: f32) -> f32 {
        if !db.is_finite() {
            return 0.0;
        }
        remap_clamped(db, self.floor, self.ceiling, 0.0, 1.0)
    }
}

/// Normalised per-bin levels for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    levels: Vec<f32>,
    live: bool,
}

impl AudioFrame {
    /// All-zero levels; the neutral baseline.
    pub fn silent(bins: usize) -> Self {
        Self {
            levels: vec![0.0; bins],
            live: false,
        }
    }

    /// Whether this frame carries real analysis rather than the baseline.
    pub fn is_live(&self) -> bool {
        self.live
    }

    pub fn levels(&self) -> &[f32] {
        &self.levels
    }

    /// Level of one bin; zero outside the spectrum.
    pub fn level(&self, bin: usize) -> f32 {
        self.levels.get(bin).copied().unwrap_or(0.0)
    }

    /// Mean level over `[start, end)`, clipped to the spectrum.
    pub fn band(&self, start: usize, end: usize) -> f32 {
        let end = end.min(self.levels.len());
        if start >= end {
            return 0.0;
        }
        self.levels[start..end].iter().sum::<f32>() / (end - start) as f32
    }

    pub fn overall(&self) -> f32 {
        self.band(0, self.levels.len())
    }

    /// Lays the levels out as greyscale pixels, row-major, for upload into
    /// a data texture. Cells past the last bin are black.
    pub fn to_pixels(&self, width: u32, height: u32) -> Vec<Rgba> {
        (0..(width * height) as usize)
            .map(|index| {
                if index < self.levels.len() {
                    Rgba::grey(self.levels[index])
                } else {
                    Rgba::BLACK
                }
            })
            .collect()
    }
}

/// Turns raw snapshots into smoothed, normalised levels.
#[derive(Debug, Clone)]
pub struct AudioProcessor {
    bins: usize,
    range: DecibelRange,
    smoothing: f32,
    previous: Vec<f32>,
    warned_missing: bool,
    warned_length: bool,
}

impl AudioProcessor {
    /// `smoothing` is the weight kept from the previous frame, in `[0, 1)`.
    pub fn new(bins: usize, range: DecibelRange, smoothing: f32) -> Self {
        Self {
            bins,
            range,
            smoothing: smoothing.clamp(0.0, 0.999),
            previous: vec![0.0; bins],
            warned_missing: false,
            warned_length: false,
        }
    }

    pub fn bins(&self) -> usize {
        self.bins
    }

    /// Whether a configured source has failed to deliver usable features.
    pub fn degraded(&self) -> bool {
        self.warned_missing || self.warned_length
    }

    /// Processes the snapshot a configured source returned for this frame.
    ///
    /// Sketches without a source skip this and use [`AudioFrame::silent`].
    pub fn process(&mut self, snapshot: Option<&AudioFeatures>) -> AudioFrame {
        let Some(features) = snapshot else {
            if !self.warned_missing {
                tracing::warn!(bins = self.bins, "audio features unavailable; using silence");
                self.warned_missing = true;
            }
            self.previous.iter_mut().for_each(|v| *v = 0.0);
            return AudioFrame::silent(self.bins);
        };

        if features.len() != self.bins {
            if !self.warned_length {
                tracing::warn!(
                    expected = self.bins,
                    received = features.len(),
                    "audio snapshot has the wrong bin count; using silence"
                );
                self.warned_length = true;
            }
            self.previous.iter_mut().for_each(|v| *v = 0.0);
            return AudioFrame::silent(self.bins);
        }

        let levels: Vec<f32> = features
            .magnitudes()
            .iter()
            .zip(self.previous.iter())
            .map(|(db, previous)| smooth_toward(*previous, self.range.normalize(*db), self.smoothing))
            .collect();
        self.previous.clone_from(&levels);
        AudioFrame { levels, live: true }
    }
}

/// A fixed spectrum, handy for stills and tests.
#[derive(Debug, Clone)]
pub struct StaticSource {
    features: AudioFeatures,
}

impl StaticSource {
    pub fn new(features: AudioFeatures) -> Self {
        Self { features }
    }
}

impl FeatureSource for StaticSource {
    fn bins(&self) -> usize {
        self.features.len()
    }

    fn features(&mut self, _time: &FrameTime) -> Option<AudioFeatures> {
        Some(self.features.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decibel_window_maps_to_unit_range() {
        let range = DecibelRange::default();
        assert_eq!(range.normalize(-100.0), 0.0);
        assert_eq!(range.normalize(0.0), 1.0);
        assert!((range.normalize(-50.0) - 0.5).abs() < 1e-6);
        assert_eq!(range.normalize(-140.0), 0.0);
        assert_eq!(range.normalize(f32::NEG_INFINITY), 0.0);
        assert_eq!(DecibelRange::new(-40.0, -40.0).normalize(-10.0), 0.0);
    }

    #[test]
    fn missing_snapshot_is_neutral() {
        let mut processor = AudioProcessor::new(8, DecibelRange::default(), 0.5);
        let frame = processor.process(None);
        assert_eq!(frame, AudioFrame::silent(8));
        assert!(!frame.is_live());
        assert_eq!(frame.overall(), 0.0);
        assert!(processor.degraded());
    }

    #[test]
    fn wrong_length_is_treated_as_missing() {
        let mut processor = AudioProcessor::new(4, DecibelRange::default(), 0.0);
        let frame = processor.process(Some(&AudioFeatures::new(vec![0.0; 3])));
        assert_eq!(frame, AudioFrame::silent(4));
        assert!(processor.degraded());
    }

    #[test]
    fn smoothing_moves_toward_new_levels() {
        let mut processor = AudioProcessor::new(2, DecibelRange::default(), 0.5);
        let loud = AudioFeatures::new(vec![0.0, -100.0]);
        let first = processor.process(Some(&loud));
        assert!((first.level(0) - 0.5).abs() < 1e-6);
        let second = processor.process(Some(&loud));
        assert!((second.level(0) - 0.75).abs() < 1e-6);
        assert_eq!(second.level(1), 0.0);
        assert_eq!(second.level(9), 0.0);
        assert!(!processor.degraded());
    }

    #[test]
    fn unsmoothed_levels_follow_input() {
        let mut processor = AudioProcessor::new(3, DecibelRange::new(-40.0, 0.0), 0.0);
        let frame = processor.process(Some(&AudioFeatures::new(vec![-40.0, -20.0, 0.0])));
        assert_eq!(frame.levels(), &[0.0, 0.5, 1.0]);
        assert!((frame.band(1, 3) - 0.75).abs() < 1e-6);
        assert_eq!(frame.band(2, 2), 0.0);
    }

    #[test]
    fn pixels_pad_with_black() {
        let frame = AudioFrame {
            levels: vec![1.0, 0.5],
            live: true,
        };
        let pixels = frame.to_pixels(2, 2);
        assert_eq!(pixels[0], Rgba::WHITE);
        assert_eq!(pixels[1], Rgba::grey(0.5));
        assert_eq!(pixels[3], Rgba::BLACK);
    }
}
