use std::path::Path;
use std::time::Duration;

use hound::{SampleFormat, WavReader};

use crate::error::MediaError;

/// Mono PCM in `[-1, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub sample_rate: u32,
    pub samples: Vec<f32>,
}

impl DecodedAudio {
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Reads a WAV file and mixes all channels down to mono.
pub fn decode_wav(path: &Path) -> Result<DecodedAudio, MediaError> {
    let mut reader = WavReader::open(path).map_err(|source| MediaError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;
    let decode_err = |source| MediaError::Decode {
        path: path.to_path_buf(),
        source,
    };

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => {
            if spec.bits_per_sample != 32 {
                return Err(MediaError::Format {
                    path: path.to_path_buf(),
                    detail: format!("{}-bit float", spec.bits_per_sample),
                });
            }
            reader
                .samples::<f32>()
                .collect::<Result<_, _>>()
                .map_err(decode_err)?
        }
        SampleFormat::Int => {
            if spec.bits_per_sample == 0 || spec.bits_per_sample > 32 {
                return Err(MediaError::Format {
                    path: path.to_path_buf(),
                    detail: format!("{}-bit integer", spec.bits_per_sample),
                });
            }
            let scale = 1.0 / (1u64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|sample| sample.map(|value| value as f32 * scale))
                .collect::<Result<_, _>>()
                .map_err(decode_err)?
        }
    };

    if interleaved.is_empty() {
        return Err(MediaError::Empty {
            path: path.to_path_buf(),
        });
    }

    let samples: Vec<f32> = interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect();

    tracing::debug!(
        path = %path.display(),
        sample_rate = spec.sample_rate,
        channels,
        frames = samples.len(),
        "decoded audio"
    );

    Ok(DecodedAudio {
        sample_rate: spec.sample_rate,
        samples,
    })
}
