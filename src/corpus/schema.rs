//! Record schemas: the field/shape/dtype contract between writer and reader.
//!
//! The schema is not stored in the records. Both sides derive it from the
//! same [`PipelineConfig`](crate::config::PipelineConfig); a corpus read with
//! the wrong configuration fails loudly instead of yielding garbage tensors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::corpus::record::RecordFields;

/// Closed set of record schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SchemaKind {
    /// Per-frame CNN examples: a sliding context of noisy magnitude frames
    /// predicting one clean magnitude frame.
    CnnFreq,
    /// Whole-utterance LSTM examples: fixed-length magnitude and phase
    /// frames for both signals.
    LstmFreq,
    /// Raw time-domain sample pairs.
    LstmTime,
}

impl SchemaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SchemaKind::CnnFreq => "cnn-freq",
            SchemaKind::LstmFreq => "lstm-freq",
            SchemaKind::LstmTime => "lstm-time",
        }
    }

    /// Directory the shards for this schema live under.
    pub fn records_dir_name(self) -> &'static str {
        match self {
            SchemaKind::CnnFreq => "records_cnn",
            SchemaKind::LstmFreq => "records_lstm",
            SchemaKind::LstmTime => "records_lstm_time",
        }
    }

    pub fn is_spectral(self) -> bool {
        !matches!(self, SchemaKind::LstmTime)
    }

    /// Field layout for the given transform dimensions, in serialized order.
    pub fn layout(self, num_features: usize, num_segments: usize) -> Vec<FieldSpec> {
        match self {
            SchemaKind::CnnFreq => vec![
                FieldSpec::fixed(
                    "noise_stft_mag_features",
                    vec![num_features, num_segments, 1],
                ),
                FieldSpec::fixed("noise_stft_phase", vec![num_features]),
                FieldSpec::fixed("clean_stft_magnitude", vec![num_features, 1, 1]),
            ],
            SchemaKind::LstmFreq => vec![
                FieldSpec::fixed("noisy_stft_magnitude", vec![1, num_segments, num_features]),
                FieldSpec::fixed("clean_stft_magnitude", vec![1, num_segments, num_features]),
                FieldSpec::fixed("noise_stft_phase", vec![1, num_segments, num_features]),
                FieldSpec::fixed("clean_stft_phase", vec![1, num_segments, num_features]),
            ],
            SchemaKind::LstmTime => vec![
                FieldSpec::flat("noisy"),
                FieldSpec::flat("clean"),
            ],
        }
    }
}

/// Expected name and shape of one record field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub shape: FieldShape,
}

impl FieldSpec {
    fn fixed(name: &'static str, shape: Vec<usize>) -> Self {
        Self {
            name,
            shape: FieldShape::Fixed(shape),
        }
    }

    fn flat(name: &'static str) -> Self {
        Self {
            name,
            shape: FieldShape::Flat,
        }
    }
}

/// Tensor shape a field decodes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldShape {
    /// Exact shape; the value count must equal the product.
    Fixed(Vec<usize>),
    /// Variable-length sample sequence, decoded as `(1, N)`.
    Flat,
}

impl FieldShape {
    fn value_count(&self) -> Option<usize> {
        match self {
            FieldShape::Fixed(dims) => Some(dims.iter().product()),
            FieldShape::Flat => None,
        }
    }
}

/// Dense row-major tensor of `f32` values.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl Tensor {
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Self {
        debug_assert_eq!(shape.iter().product::<usize>(), data.len());
        Self { shape, data }
    }
}

/// One decoded training example: the pair handed to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingExample {
    pub noisy: Tensor,
    pub clean: Tensor,
}

/// Schema-contract violations found while decoding a record.
///
/// Every variant is fatal to the read: the downstream tensors would be
/// structurally invalid.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("record has {got} fields, schema {schema} expects {expected}")]
    FieldCount {
        schema: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("field {index} is named {got:?}, schema {schema} expects {expected:?}")]
    FieldName {
        schema: &'static str,
        index: usize,
        expected: &'static str,
        got: String,
    },
    #[error("field {name} holds {got} values, expected {expected}")]
    ValueCount {
        name: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("field {name} is empty")]
    EmptyField { name: &'static str },
    #[error("noisy and clean sample counts differ: {noisy} vs {clean}")]
    PairLengthMismatch { noisy: usize, clean: usize },
}

/// Decode a raw record into the training-example pair for `schema`.
///
/// The lstm-freq magnitudes are divided by `2 * (num_features - 1)` here, at
/// read time; the writer stores them raw. That scaling is part of the schema
/// contract.
pub fn decode_example(
    record: &RecordFields,
    schema: SchemaKind,
    num_features: usize,
    num_segments: usize,
) -> Result<TrainingExample, SchemaError> {
    let layout = schema.layout(num_features, num_segments);
    validate_fields(record, schema, &layout)?;

    match schema {
        SchemaKind::CnnFreq => {
            let noisy = Tensor::new(
                vec![num_features, num_segments, 1],
                record.fields[0].values.clone(),
            );
            let clean = Tensor::new(vec![num_features, 1, 1], record.fields[2].values.clone());
            Ok(TrainingExample { noisy, clean })
        }
        SchemaKind::LstmFreq => {
            let scale = magnitude_scale(num_features);
            let noisy = stacked_spectral(
                &record.fields[0].values,
                &record.fields[2].values,
                scale,
                num_segments,
                num_features,
            );
            let clean = stacked_spectral(
                &record.fields[1].values,
                &record.fields[3].values,
                scale,
                num_segments,
                num_features,
            );
            Ok(TrainingExample { noisy, clean })
        }
        SchemaKind::LstmTime => {
            let noisy = &record.fields[0].values;
            let clean = &record.fields[1].values;
            if noisy.len() != clean.len() {
                return Err(SchemaError::PairLengthMismatch {
                    noisy: noisy.len(),
                    clean: clean.len(),
                });
            }
            Ok(TrainingExample {
                noisy: Tensor::new(vec![1, noisy.len()], noisy.clone()),
                clean: Tensor::new(vec![1, clean.len()], clean.clone()),
            })
        }
    }
}

/// Read-time magnitude divisor for the lstm-freq schema.
pub fn magnitude_scale(num_features: usize) -> f32 {
    (2 * (num_features.max(2) - 1)) as f32
}

/// Stack a normalized magnitude plane and a phase plane into a
/// `(2, 1, segments, features)` tensor.
fn stacked_spectral(
    magnitude: &[f32],
    phase: &[f32],
    scale: f32,
    num_segments: usize,
    num_features: usize,
) -> Tensor {
    let mut data = Vec::with_capacity(magnitude.len() + phase.len());
    data.extend(magnitude.iter().map(|value| value / scale));
    data.extend_from_slice(phase);
    Tensor::new(vec![2, 1, num_segments, num_features], data)
}

fn validate_fields(
    record: &RecordFields,
    schema: SchemaKind,
    layout: &[FieldSpec],
) -> Result<(), SchemaError> {
    if record.fields.len() != layout.len() {
        return Err(SchemaError::FieldCount {
            schema: schema.as_str(),
            expected: layout.len(),
            got: record.fields.len(),
        });
    }
    for (index, (field, spec)) in record.fields.iter().zip(layout.iter()).enumerate() {
        if field.name != spec.name {
            return Err(SchemaError::FieldName {
                schema: schema.as_str(),
                index,
                expected: spec.name,
                got: field.name.clone(),
            });
        }
        match spec.shape.value_count() {
            Some(expected) => {
                if field.values.len() != expected {
                    return Err(SchemaError::ValueCount {
                        name: spec.name,
                        expected,
                        got: field.values.len(),
                    });
                }
            }
            None => {
                if field.values.is_empty() {
                    return Err(SchemaError::EmptyField { name: spec.name });
                }
            }
        }
    }
    Ok(())
}
