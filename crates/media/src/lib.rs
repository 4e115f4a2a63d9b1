//! Audio bridge for sketches: decode a WAV file, analyse its spectrum at the
//! frame's position, and hand the result to the frame driver as
//! [`procgen::AudioFeatures`].

mod analysis;
mod decode;
mod error;
mod loader;
mod track;

pub use analysis::{SpectrumAnalyzer, SILENCE_DB};
pub use decode::{decode_wav, DecodedAudio};
pub use error::MediaError;
pub use loader::{load_async, PendingTrack};
pub use track::AnalysedTrack;
