//! Pipeline configuration shared by the corpus writer and reader.
//!
//! The writer and the training-time reader must reconstruct the identical
//! record schema from the same configuration value, so everything that
//! shapes a record lives here and is validated up front. Nothing reads
//! ambient global state.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::corpus::schema::SchemaKind;
use crate::dsp::stft::expected_frame_count;

/// Errors raised when loading or validating a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("sample_rate must be positive")]
    BadSampleRate,
    #[error("nfft must be a power of two, got {0}")]
    BadNfft(usize),
    #[error("hop_length must be in 1..=nfft, got {hop} with nfft {nfft}")]
    BadHop { hop: usize, nfft: usize },
    #[error("num_features must equal nfft/2 + 1 = {expected}, got {got}")]
    BadNumFeatures { expected: usize, got: usize },
    #[error(
        "num_segments {got} does not match the {expected} frames a {duration}s crop produces"
    )]
    BadNumSegments {
        got: usize,
        expected: usize,
        duration: f32,
    },
    #[error("audio_max_duration must be positive, got {0}")]
    BadDuration(f32),
    #[error("num_segments must be positive")]
    ZeroNumSegments,
    #[error("subset_size must be positive")]
    BadSubsetSize,
}

/// Immutable settings for building and reading a corpus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Record schema the corpus is built for.
    #[serde(default = "default_schema")]
    pub schema: SchemaKind,
    /// Target sample rate every input is resampled to.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// FFT size; also the analysis window length.
    #[serde(default = "default_nfft")]
    pub nfft: usize,
    /// Hop between successive analysis frames.
    #[serde(default = "default_hop_length")]
    pub hop_length: usize,
    /// Zero-pad `nfft/2` samples at both edges before framing.
    #[serde(default = "default_true")]
    pub center: bool,
    /// Crop window length in seconds.
    #[serde(default = "default_audio_max_duration")]
    pub audio_max_duration: f32,
    /// Optional override for the frequency bin count; must equal `nfft/2 + 1`.
    #[serde(default)]
    pub num_features: Option<usize>,
    /// Fixed time-frame count the spectral schemas serialize.
    #[serde(default = "default_num_segments")]
    pub num_segments: usize,
    /// Source pairs per shard file.
    #[serde(default = "default_subset_size")]
    pub subset_size: usize,
    /// Project the clean magnitude onto the noisy phase when building the
    /// CNN target, instead of the plain magnitude.
    #[serde(default = "default_true")]
    pub phase_aware_target: bool,
    /// Drop silent stretches before cropping.
    #[serde(default)]
    pub trim_silence: bool,
    /// Silence threshold in dB below the loudest frame.
    #[serde(default = "default_top_db")]
    pub top_db: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            schema: default_schema(),
            sample_rate: default_sample_rate(),
            nfft: default_nfft(),
            hop_length: default_hop_length(),
            center: default_true(),
            audio_max_duration: default_audio_max_duration(),
            num_features: None,
            num_segments: default_num_segments(),
            subset_size: default_subset_size(),
            phase_aware_target: default_true(),
            trim_silence: false,
            top_db: default_top_db(),
        }
    }
}

impl PipelineConfig {
    /// Load and validate a TOML configuration file.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Frequency bin count of the configured transform.
    pub fn num_features(&self) -> usize {
        self.nfft / 2 + 1
    }

    /// Crop window length in samples.
    pub fn crop_samples(&self) -> usize {
        (self.audio_max_duration as f64 * self.sample_rate as f64).floor() as usize
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate == 0 {
            return Err(ConfigError::BadSampleRate);
        }
        if self.nfft == 0 || !self.nfft.is_power_of_two() {
            return Err(ConfigError::BadNfft(self.nfft));
        }
        if self.hop_length == 0 || self.hop_length > self.nfft {
            return Err(ConfigError::BadHop {
                hop: self.hop_length,
                nfft: self.nfft,
            });
        }
        if !(self.audio_max_duration > 0.0) {
            return Err(ConfigError::BadDuration(self.audio_max_duration));
        }
        if self.num_segments == 0 {
            return Err(ConfigError::ZeroNumSegments);
        }
        if self.subset_size == 0 {
            return Err(ConfigError::BadSubsetSize);
        }
        if let Some(got) = self.num_features {
            let expected = self.num_features();
            if got != expected {
                return Err(ConfigError::BadNumFeatures { expected, got });
            }
        }
        if self.schema == SchemaKind::LstmFreq {
            let expected = expected_frame_count(
                self.crop_samples(),
                self.nfft,
                self.hop_length,
                self.center,
            );
            if self.num_segments != expected {
                return Err(ConfigError::BadNumSegments {
                    got: self.num_segments,
                    expected,
                    duration: self.audio_max_duration,
                });
            }
        }
        Ok(())
    }
}

fn default_schema() -> SchemaKind {
    SchemaKind::LstmFreq
}

fn default_sample_rate() -> u32 {
    16_000
}

fn default_nfft() -> usize {
    512
}

fn default_hop_length() -> usize {
    256
}

fn default_true() -> bool {
    true
}

fn default_audio_max_duration() -> f32 {
    1.008
}

fn default_num_segments() -> usize {
    64
}

fn default_subset_size() -> usize {
    256
}

fn default_top_db() -> f32 {
    20.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_are_internally_consistent() {
        let config = PipelineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.num_features(), 257);
        assert_eq!(config.crop_samples(), 16_128);
    }

    #[test]
    fn num_segments_must_match_crop_frames() {
        let config = PipelineConfig {
            num_segments: 62,
            ..PipelineConfig::default()
        };
        match config.validate() {
            Err(ConfigError::BadNumSegments { expected: 64, .. }) => {}
            other => panic!("expected BadNumSegments, got {other:?}"),
        }

        let uncentered = PipelineConfig {
            center: false,
            num_segments: 62,
            ..PipelineConfig::default()
        };
        uncentered.validate().unwrap();
    }

    #[test]
    fn num_features_override_must_agree_with_nfft() {
        let config = PipelineConfig {
            num_features: Some(129),
            ..PipelineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::BadNumFeatures {
                expected: 257,
                got: 129
            })
        ));
    }

    #[test]
    fn loads_partial_toml_with_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pipeline.toml");
        std::fs::write(
            &path,
            "schema = \"cnn-freq\"\nnfft = 256\nhop_length = 64\nnum_segments = 8\n",
        )
        .unwrap();

        let config = PipelineConfig::from_path(&path).unwrap();
        assert_eq!(config.schema, SchemaKind::CnnFreq);
        assert_eq!(config.nfft, 256);
        assert_eq!(config.num_features(), 129);
        assert_eq!(config.sample_rate, 16_000);
    }

    #[test]
    fn rejects_zero_hop() {
        let config = PipelineConfig {
            hop_length: 0,
            ..PipelineConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::BadHop { .. })));
    }
}
