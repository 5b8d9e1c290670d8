//! Corpus building, record serialization, and streaming reads.

pub mod builder;
pub mod crop;
pub mod features;
pub mod record;
pub mod schema;
pub mod shard;
pub mod stream;

/// Default seed wherever randomness is configurable, so repeated builds and
/// reads of the same corpus line up without extra flags.
pub const DEFAULT_SEED: u64 = 999;

/// Aligned clean/noisy waveforms sharing one sample rate.
///
/// Both signals are the same acoustic event; after cropping they are always
/// the same length.
#[derive(Debug, Clone)]
pub struct WaveformPair {
    pub clean: Vec<f32>,
    pub noisy: Vec<f32>,
    pub sample_rate: u32,
}
