//! Audio loading: container decode, mono downmix, and resampling.

pub(crate) mod decode;
pub(crate) mod prep;
pub(crate) mod resample;
pub(crate) mod silence;

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors raised while turning an audio file into a mono waveform.
#[derive(Debug, Error)]
pub enum AudioError {
    /// The file could not be opened or read.
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The container or codec is not supported.
    #[error("unsupported audio format for {path}: {detail}")]
    Unsupported { path: PathBuf, detail: String },
    /// The file probed fine but decoding its packets failed.
    #[error("decode failed for {path}: {detail}")]
    Decode { path: PathBuf, detail: String },
    /// Decoding finished without producing a single sample.
    #[error("decoded no samples from {path}")]
    Empty { path: PathBuf },
}

/// Mono waveform resampled to the requested rate.
#[derive(Debug, Clone)]
pub struct LoadedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl LoadedAudio {
    pub fn duration_seconds(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

/// Decode `path`, downmix to mono, and resample to `target_rate`.
pub fn load_mono(path: &Path, target_rate: u32) -> Result<LoadedAudio, AudioError> {
    let decoded = decode::decode_file(path)?;
    let mono = prep::downmix_to_mono(&decoded.samples, decoded.channels);
    let samples = if decoded.sample_rate == target_rate {
        mono
    } else {
        resample::resample_linear(&mono, decoded.sample_rate, target_rate)
    };
    Ok(LoadedAudio {
        samples,
        sample_rate: target_rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_wav(path: &Path, sample_rate: u32, samples: &[f32]) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for &sample in samples {
            writer
                .write_sample((sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                .unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn load_mono_resamples_to_target_rate() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let samples: Vec<f32> = (0..32_000)
            .map(|i| (i as f32 * 0.05).sin() * 0.5)
            .collect();
        write_wav(&path, 32_000, &samples);

        let loaded = load_mono(&path, 16_000).unwrap();
        assert_eq!(loaded.sample_rate, 16_000);
        assert!((loaded.duration_seconds() - 1.0).abs() < 0.01);
    }

    #[test]
    fn load_mono_reports_missing_file_as_open_error() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope.wav");
        match load_mono(&missing, 16_000) {
            Err(AudioError::Open { .. }) => {}
            other => panic!("expected Open error, got {other:?}"),
        }
    }

    #[test]
    fn load_mono_rejects_non_audio_bytes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("garbage.wav");
        std::fs::write(&path, b"this is not a riff header").unwrap();
        match load_mono(&path, 16_000) {
            Err(AudioError::Unsupported { .. } | AudioError::Decode { .. }) => {}
            other => panic!("expected decode failure, got {other:?}"),
        }
    }
}
