use std::path::Path;

use media::{decode_wav, load_async, AnalysedTrack, SILENCE_DB};
use procgen::{AudioInput, FeatureSource, FrameTime, Playhead, PendingSource};
use tempfile::TempDir;

fn write_sine(path: &Path, frequency: f32, seconds: f32, channels: u16) {
    let spec = hound::WavSpec {
        channels,
        sample_rate: 8_000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    let frames = (spec.sample_rate as f32 * seconds) as usize;
    for i in 0..frames {
        let t = i as f32 / spec.sample_rate as f32;
        let value = (std::f32::consts::TAU * frequency * t).sin() * 0.8;
        for _ in 0..channels {
            writer.write_sample((value * i16::MAX as f32) as i16).unwrap();
        }
    }
    writer.finalize().unwrap();
}

#[test]
fn decode_mixes_to_mono_and_scales() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("stereo.wav");
    write_sine(&path, 440.0, 0.5, 2);

    let audio = decode_wav(&path).unwrap();
    assert_eq!(audio.sample_rate, 8_000);
    assert_eq!(audio.samples.len(), 4_000);
    assert!(audio.samples.iter().all(|s| s.abs() <= 1.0));
    let peak = audio.samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
    assert!(peak > 0.7 && peak < 0.85, "peak {peak}");
}

#[test]
fn track_spectrum_peaks_at_tone() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tone.wav");
    // 8 kHz over 256 samples: 31.25 Hz per bin, so 1 kHz lands in bin 32.
    write_sine(&path, 1_000.0, 1.0, 1);

    let mut track = AnalysedTrack::new(decode_wav(&path).unwrap(), 128).unwrap();
    assert_eq!(track.bins(), 128);
    let time = FrameTime::new(Playhead::new(0.5), 10, 0.5);
    let features = track.features(&time).expect("features");
    assert_eq!(features.len(), 128);
    let loudest = features
        .magnitudes()
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
        .unwrap();
    assert_eq!(loudest, 32);
    assert!(features.magnitudes()[100] > SILENCE_DB - 1.0);
}

#[test]
fn async_load_resolves_through_readiness_gate() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tone.wav");
    write_sine(&path, 500.0, 0.25, 1);

    let input = AudioInput::Pending(Box::new(load_async(&path, 64)));
    let mut source = input.resolve().unwrap().expect("source");
    assert_eq!(source.bins(), 64);
    assert!(source.features(&FrameTime::at(0.0)).is_some());
}

#[test]
fn async_load_failure_names_the_asset() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("absent.wav");

    let pending = load_async(&path, 64);
    let err = Box::new(pending).wait().err().expect("load must fail");
    let message = err.to_string();
    assert!(message.contains("absent.wav"), "{message}");
}

#[test]
fn invalid_bin_count_fails_the_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tone.wav");
    write_sine(&path, 500.0, 0.1, 1);

    let mut pending = load_async(&path, 100);
    while !pending.is_ready() {
        std::thread::yield_now();
    }
    assert!(pending.wait_track().is_err());
}
