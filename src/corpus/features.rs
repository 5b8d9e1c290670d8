//! Per-schema feature extraction: waveform pair in, serializable records out.

use thiserror::Error;

use crate::config::PipelineConfig;
use crate::corpus::WaveformPair;
use crate::corpus::record::{RecordField, RecordFields};
use crate::corpus::schema::SchemaKind;
use crate::dsp::stft::{Spectrogram, StftPlan, phase_aware_scaling};

#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("transform failed: {0}")]
    Transform(String),
    /// The pair framed to fewer frames than the schema's fixed shape needs;
    /// it cannot fill a record and is dropped.
    #[error("pair produced {got} frames, schema needs {expected}")]
    FrameCount { expected: usize, got: usize },
}

/// Turn one cropped pair into the records its schema serializes.
///
/// The cnn-freq schema yields one record per time frame; the lstm schemas
/// yield one record per pair.
pub fn extract_records(
    pair: &WaveformPair,
    config: &PipelineConfig,
) -> Result<Vec<RecordFields>, FeatureError> {
    match config.schema {
        SchemaKind::LstmTime => Ok(vec![RecordFields::new(vec![
            RecordField::new("noisy", pair.noisy.clone()),
            RecordField::new("clean", pair.clean.clone()),
        ])]),
        SchemaKind::LstmFreq => lstm_freq_records(pair, config),
        SchemaKind::CnnFreq => cnn_freq_records(pair, config),
    }
}

fn lstm_freq_records(
    pair: &WaveformPair,
    config: &PipelineConfig,
) -> Result<Vec<RecordFields>, FeatureError> {
    let (clean_spec, noisy_spec) = spectrogram_pair(pair, config)?;
    if clean_spec.frames != config.num_segments {
        return Err(FeatureError::FrameCount {
            expected: config.num_segments,
            got: clean_spec.frames,
        });
    }

    Ok(vec![RecordFields::new(vec![
        RecordField::new("noisy_stft_magnitude", frame_major_magnitude(&noisy_spec)),
        RecordField::new("clean_stft_magnitude", frame_major_magnitude(&clean_spec)),
        RecordField::new("noise_stft_phase", frame_major_phase(&noisy_spec)),
        RecordField::new("clean_stft_phase", frame_major_phase(&clean_spec)),
    ])])
}

fn cnn_freq_records(
    pair: &WaveformPair,
    config: &PipelineConfig,
) -> Result<Vec<RecordFields>, FeatureError> {
    let (clean_spec, noisy_spec) = spectrogram_pair(pair, config)?;
    let num_features = clean_spec.freq_bins;
    let num_segments = config.num_segments;
    let frames = clean_spec.frames;
    // The edge pad borrows the first num_segments-1 frames; a clip shorter
    // than that cannot fill even one context window.
    if frames + 1 < num_segments {
        return Err(FeatureError::FrameCount {
            expected: num_segments - 1,
            got: frames,
        });
    }

    let mut records = Vec::with_capacity(frames);
    for frame in 0..frames {
        let mut context = Vec::with_capacity(num_features * num_segments);
        for bin in 0..num_features {
            for segment in 0..num_segments {
                context.push(noisy_spec.magnitude_at(bin, padded_frame(frame, segment, num_segments)));
            }
        }

        let clean_magnitude = clean_spec.magnitude_frame(frame);
        let target = if config.phase_aware_target {
            phase_aware_scaling(
                &clean_magnitude,
                &clean_spec.phase_frame(frame),
                &noisy_spec.phase_frame(frame),
            )
            .map_err(FeatureError::Transform)?
        } else {
            clean_magnitude
        };

        records.push(RecordFields::new(vec![
            RecordField::new("noise_stft_mag_features", context),
            RecordField::new("noise_stft_phase", noisy_spec.phase_frame(frame)),
            RecordField::new("clean_stft_magnitude", target),
        ]));
    }
    Ok(records)
}

/// Source frame for context slot `segment` of the window targeting `frame`.
///
/// The spectrogram is logically prefixed with a copy of its first
/// `num_segments - 1` frames, so every window is full-width and the window
/// for target frame `t` ends on frame `t` itself.
fn padded_frame(frame: usize, segment: usize, num_segments: usize) -> usize {
    let padded_index = frame + segment;
    if padded_index < num_segments - 1 {
        padded_index
    } else {
        padded_index - (num_segments - 1)
    }
}

fn spectrogram_pair(
    pair: &WaveformPair,
    config: &PipelineConfig,
) -> Result<(Spectrogram, Spectrogram), FeatureError> {
    let plan = StftPlan::new(config.nfft, config.hop_length, config.center)
        .map_err(FeatureError::Transform)?;
    let clean = plan
        .compute(&pair.clean)
        .map_err(FeatureError::Transform)?;
    let noisy = plan
        .compute(&pair.noisy)
        .map_err(FeatureError::Transform)?;
    Ok((clean, noisy))
}

/// Serialize magnitudes in `(frames, bins)` order, the layout the reader
/// reshapes to `(1, num_segments, num_features)`.
fn frame_major_magnitude(spec: &Spectrogram) -> Vec<f32> {
    let mut out = Vec::with_capacity(spec.frames * spec.freq_bins);
    for frame in 0..spec.frames {
        for bin in 0..spec.freq_bins {
            out.push(spec.magnitude_at(bin, frame));
        }
    }
    out
}

fn frame_major_phase(spec: &Spectrogram) -> Vec<f32> {
    let mut out = Vec::with_capacity(spec.frames * spec.freq_bins);
    for frame in 0..spec.frames {
        for bin in 0..spec.freq_bins {
            out.push(spec.phase_at(bin, frame));
        }
    }
    out
}
