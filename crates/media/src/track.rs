use procgen::{AudioFeatures, FeatureSource, FrameTime};

use crate::analysis::SpectrumAnalyzer;
use crate::decode::DecodedAudio;
use crate::error::MediaError;

/// A decoded track analysed on demand at the frame's position.
///
/// Frame time maps straight onto track time and wraps at the end of the
/// track, so a loop shorter than the audio keeps replaying its opening.
#[derive(Debug)]
pub struct AnalysedTrack {
    audio: DecodedAudio,
    analyzer: SpectrumAnalyzer,
}

impl AnalysedTrack {
    pub fn new(audio: DecodedAudio, bins: usize) -> Result<Self, MediaError> {
        Ok(Self {
            audio,
            analyzer: SpectrumAnalyzer::new(bins)?,
        })
    }

    pub fn audio(&self) -> &DecodedAudio {
        &self.audio
    }

    /// Sample index whose analysis window is centred on `seconds`.
    fn window_start(&self, seconds: f32) -> usize {
        let len = self.audio.samples.len();
        if len == 0 {
            return 0;
        }
        let centre = (seconds.max(0.0) as f64 * self.audio.sample_rate as f64) as usize;
        let half = self.analyzer.window_len() / 2;
        (centre % len + len - half % len) % len
    }

    pub fn spectrum_at(&mut self, seconds: f32) -> Vec<f32> {
        let start = self.window_start(seconds);
        self.analyzer.analyze(&self.audio.samples, start)
    }
}

impl FeatureSource for AnalysedTrack {
    fn bins(&self) -> usize {
        self.analyzer.bins()
    }

    fn features(&mut self, time: &FrameTime) -> Option<AudioFeatures> {
        if self.audio.is_empty() {
            return None;
        }
        Some(AudioFeatures::new(self.spectrum_at(time.seconds)))
    }
}
