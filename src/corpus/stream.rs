//! Training-time streaming: an inexhaustible, shuffled read over shards.
//!
//! Mirrors the consumption side of the pipeline: shards are cycled
//! indefinitely, records are decoded through the schema, and a bounded
//! shuffle buffer decorrelates neighboring examples. The buffer trades
//! memory for shuffle quality; it never holds more than its capacity.

use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

use crate::config::PipelineConfig;
use crate::corpus::DEFAULT_SEED;
use crate::corpus::schema::{self, SchemaError, Tensor, TrainingExample};
use crate::corpus::shard::{SHARD_EXTENSION, ShardError, ShardReader};
use crate::dsp::stft::{Spectrogram, StftPlan};

/// Errors that abort a streaming read.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("no shards to read")]
    NoShards,
    #[error(transparent)]
    Shard(#[from] ShardError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("spectral preparation failed: {0}")]
    Transform(String),
}

/// Consumption settings for [`ExampleStream`].
#[derive(Debug, Clone)]
pub struct StreamOptions {
    /// Shuffle buffer capacity; `0` or `1` reads sequentially.
    pub shuffle_buffer: usize,
    pub seed: u64,
    /// Restart from the first shard after the last, forever.
    pub cycle: bool,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            shuffle_buffer: 8192,
            seed: DEFAULT_SEED,
            cycle: true,
        }
    }
}

/// Sorted shard files for `prefix` under a records directory.
pub fn list_shards(dir: &Path, prefix: &str) -> Result<Vec<PathBuf>, ReadError> {
    let entries = std::fs::read_dir(dir).map_err(|source| {
        ReadError::Shard(ShardError::Io {
            path: dir.to_path_buf(),
            source,
        })
    })?;
    let wanted_prefix = format!("{prefix}_");
    let mut shards: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension().and_then(|ext| ext.to_str()) == Some(SHARD_EXTENSION)
                && path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.starts_with(&wanted_prefix))
        })
        .collect();
    shards.sort();
    Ok(shards)
}

/// Iterator of decoded training examples over a set of shards.
///
/// Yields `Err` once on the first schema or shard failure and then fuses:
/// a corpus read with the wrong configuration cannot be resumed.
pub struct ExampleStream {
    shards: Vec<PathBuf>,
    config: PipelineConfig,
    options: StreamOptions,
    buffer: Vec<TrainingExample>,
    rng: StdRng,
    current: Option<ShardReader>,
    next_shard: usize,
    opens_since_yield: usize,
    failed: bool,
}

impl ExampleStream {
    pub fn open(
        shards: Vec<PathBuf>,
        config: PipelineConfig,
        options: StreamOptions,
    ) -> Result<Self, ReadError> {
        if shards.is_empty() {
            return Err(ReadError::NoShards);
        }
        let rng = StdRng::seed_from_u64(options.seed);
        Ok(Self {
            shards,
            config,
            options,
            buffer: Vec::new(),
            rng,
            current: None,
            next_shard: 0,
            opens_since_yield: 0,
            failed: false,
        })
    }

    fn next_decoded(&mut self) -> Option<Result<TrainingExample, ReadError>> {
        loop {
            if self.current.is_none() {
                if self.next_shard >= self.shards.len() {
                    if !self.options.cycle {
                        return None;
                    }
                    self.next_shard = 0;
                }
                // A full cycle without one record means every shard is
                // empty; keeping going would spin forever.
                if self.opens_since_yield > self.shards.len() {
                    return None;
                }
                let path = &self.shards[self.next_shard];
                self.next_shard += 1;
                self.opens_since_yield += 1;
                match ShardReader::open(path) {
                    Ok(reader) => self.current = Some(reader),
                    Err(err) => return Some(Err(err.into())),
                }
            }
            match self.current.as_mut().expect("reader just set").next() {
                Some(Ok(record)) => {
                    self.opens_since_yield = 0;
                    return Some(
                        schema::decode_example(
                            &record,
                            self.config.schema,
                            self.config.num_features(),
                            self.config.num_segments,
                        )
                        .map_err(Into::into),
                    );
                }
                Some(Err(err)) => return Some(Err(err.into())),
                None => self.current = None,
            }
        }
    }
}

impl Iterator for ExampleStream {
    type Item = Result<TrainingExample, ReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        if self.options.shuffle_buffer <= 1 {
            let item = self.next_decoded();
            if matches!(item, Some(Err(_))) {
                self.failed = true;
            }
            return item;
        }

        while self.buffer.len() < self.options.shuffle_buffer {
            match self.next_decoded() {
                Some(Ok(example)) => self.buffer.push(example),
                Some(Err(err)) => {
                    self.failed = true;
                    return Some(Err(err));
                }
                None => break,
            }
        }
        if self.buffer.is_empty() {
            return None;
        }
        let index = self.rng.random_range(0..self.buffer.len());
        Some(Ok(self.buffer.swap_remove(index)))
    }
}

/// Recreate the spectral view of a time-domain example.
///
/// The training parser for the time schema computes the STFT of both raw
/// signals on the fly and stacks normalized magnitude with phase, exactly
/// like the lstm-freq decode path.
pub fn spectral_from_time(
    example: &TrainingExample,
    config: &PipelineConfig,
) -> Result<TrainingExample, ReadError> {
    let plan = StftPlan::new(config.nfft, config.hop_length, config.center)
        .map_err(ReadError::Transform)?;
    let noisy_spec = plan
        .compute(&example.noisy.data)
        .map_err(ReadError::Transform)?;
    let clean_spec = plan
        .compute(&example.clean.data)
        .map_err(ReadError::Transform)?;
    Ok(TrainingExample {
        noisy: stacked_tensor(&noisy_spec, config.num_features()),
        clean: stacked_tensor(&clean_spec, config.num_features()),
    })
}

fn stacked_tensor(spec: &Spectrogram, num_features: usize) -> Tensor {
    let scale = schema::magnitude_scale(num_features);
    let mut data = Vec::with_capacity(2 * spec.frames * spec.freq_bins);
    for frame in 0..spec.frames {
        for bin in 0..spec.freq_bins {
            data.push(spec.magnitude_at(bin, frame) / scale);
        }
    }
    for frame in 0..spec.frames {
        for bin in 0..spec.freq_bins {
            data.push(spec.phase_at(bin, frame));
        }
    }
    Tensor::new(vec![2, 1, spec.frames, spec.freq_bins], data)
}
