//! Corpus build: pair input files, extract features in parallel, serialize
//! shards deterministically.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, mpsc};

use rand::SeedableRng;
use rand::rngs::StdRng;
use thiserror::Error;
use tracing::{info, warn};

use crate::audio::{self, AudioError, silence};
use crate::config::{ConfigError, PipelineConfig};
use crate::corpus::crop::random_crop_aligned;
use crate::corpus::features::{FeatureError, extract_records};
use crate::corpus::shard::{ShardError, ShardWriter, shard_file_name};
use crate::corpus::{DEFAULT_SEED, WaveformPair};

const AUDIO_EXTENSIONS: &[&str] = &["wav", "flac", "ogg"];

/// How the per-pair pipeline is mapped over the input list.
///
/// Both strategies return results in input order, so shard contents never
/// depend on worker completion timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Executor {
    Sequential,
    Pool { workers: usize },
}

impl Executor {
    /// Worker pool sized to the machine, leaving a few cores free.
    pub fn auto() -> Self {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let workers = if cores > 4 { cores - 3 } else { 1 };
        Executor::Pool { workers }
    }

    /// Map `f` over `items`, preserving input order in the result.
    ///
    /// A panicking worker propagates and fails the whole build; silently
    /// dropping samples would corrupt shard determinism.
    fn map<T, R, F>(self, items: Vec<T>, f: F) -> Vec<R>
    where
        T: Send,
        R: Send,
        F: Fn(T) -> R + Sync,
    {
        match self {
            Executor::Sequential => items.into_iter().map(f).collect(),
            Executor::Pool { workers } => {
                let total = items.len();
                if total == 0 {
                    return Vec::new();
                }
                let queue: Mutex<VecDeque<(usize, T)>> =
                    Mutex::new(items.into_iter().enumerate().collect());
                let (tx, rx) = mpsc::channel::<(usize, R)>();
                let mut slots: Vec<Option<R>> = Vec::new();
                std::thread::scope(|scope| {
                    for _ in 0..workers.max(1).min(total) {
                        let tx = tx.clone();
                        let queue = &queue;
                        let f = &f;
                        scope.spawn(move || {
                            loop {
                                let job = queue.lock().expect("worker queue poisoned").pop_front();
                                let Some((index, item)) = job else { break };
                                let result = f(item);
                                if tx.send((index, result)).is_err() {
                                    break;
                                }
                            }
                        });
                    }
                    drop(tx);
                    let mut collected: Vec<Option<R>> = (0..total).map(|_| None).collect();
                    for (index, result) in rx {
                        collected[index] = Some(result);
                    }
                    slots = collected;
                });
                slots
                    .into_iter()
                    .map(|slot| slot.expect("worker delivered every result"))
                    .collect()
            }
        }
    }
}

/// Options for one corpus build run.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Directory of clean recordings.
    pub clean_dir: PathBuf,
    /// Directory of noisy recordings; file names must mirror `clean_dir`.
    pub noisy_dir: PathBuf,
    /// Root under which the schema's records directory is created.
    pub out_root: PathBuf,
    /// Shard file prefix, `train` or `val`.
    pub prefix: String,
    /// Process-wide seed for crop offsets.
    pub seed: u64,
    pub executor: Executor,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            clean_dir: PathBuf::from("clean"),
            noisy_dir: PathBuf::from("noisy"),
            out_root: PathBuf::from("."),
            prefix: "train".to_string(),
            seed: DEFAULT_SEED,
            executor: Executor::auto(),
        }
    }
}

/// Counts reported by a build run.
#[derive(Debug, Clone, Default)]
pub struct BuildSummary {
    pub shards_written: usize,
    pub shards_skipped: usize,
    pub records_written: usize,
    pub pairs_processed: usize,
    pub pairs_skipped: usize,
    pub records_dir: PathBuf,
}

/// Errors that abort the whole build.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to list {path}: {source}")]
    ListDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("clean and noisy file lists differ in length: {clean} vs {noisy}")]
    UnevenPairing { clean: usize, noisy: usize },
    #[error("no audio files found under {0}")]
    NoInput(PathBuf),
    #[error("failed to create {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Shard(#[from] ShardError),
    #[error("failed to write manifest {path}: {source}")]
    Manifest {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Errors that abort one pair and leave the rest of the build running.
#[derive(Debug, Error)]
pub enum PairError {
    /// Clean and noisy files represent the same utterance and must share a
    /// file name; checked before any decoding happens.
    #[error("clean/noisy file names must match: {clean} vs {noisy}")]
    StemMismatch { clean: PathBuf, noisy: PathBuf },
    #[error(transparent)]
    Audio(#[from] AudioError),
    #[error(transparent)]
    Feature(#[from] FeatureError),
}

/// Build every missing shard for `options.prefix` under the schema's
/// records directory.
pub fn build_corpus(
    options: &BuildOptions,
    config: &PipelineConfig,
) -> Result<BuildSummary, BuildError> {
    config.validate()?;

    let clean_files = collect_audio_files(&options.clean_dir)?;
    let noisy_files = collect_audio_files(&options.noisy_dir)?;
    if clean_files.is_empty() {
        return Err(BuildError::NoInput(options.clean_dir.clone()));
    }
    if clean_files.len() != noisy_files.len() {
        return Err(BuildError::UnevenPairing {
            clean: clean_files.len(),
            noisy: noisy_files.len(),
        });
    }

    let records_dir = options.out_root.join(config.schema.records_dir_name());
    std::fs::create_dir_all(&records_dir).map_err(|source| BuildError::CreateDir {
        path: records_dir.clone(),
        source,
    })?;

    let pairs: Vec<(usize, PathBuf, PathBuf)> = clean_files
        .into_iter()
        .zip(noisy_files)
        .enumerate()
        .map(|(index, (clean, noisy))| (index, clean, noisy))
        .collect();

    let mut summary = BuildSummary {
        records_dir: records_dir.clone(),
        ..BuildSummary::default()
    };
    let mut manifest_shards = Vec::new();

    for (shard_index, chunk) in pairs.chunks(config.subset_size).enumerate() {
        let file_name = shard_file_name(&options.prefix, shard_index);
        let shard_path = records_dir.join(&file_name);
        if shard_path.exists() {
            info!("Skipping existing shard {}", shard_path.display());
            summary.shards_skipped += 1;
            manifest_shards.push((file_name, None));
            continue;
        }

        info!(
            "Processing pairs {}..{} into {}",
            chunk[0].0,
            chunk[chunk.len() - 1].0 + 1,
            shard_path.display()
        );
        let seed = options.seed;
        let results = options.executor.map(chunk.to_vec(), |(index, clean, noisy)| {
            process_pair(&clean, &noisy, config, seed, index)
        });

        let records = match write_shard(&shard_path, results, &mut summary) {
            Ok(records) => records,
            Err(err) => {
                // Never leave a truncated shard behind.
                let _ = std::fs::remove_file(&shard_path);
                return Err(err.into());
            }
        };
        summary.shards_written += 1;
        summary.records_written += records;
        manifest_shards.push((file_name, Some(records)));
    }

    write_manifest(&records_dir, options, config, &manifest_shards, &summary)?;
    Ok(summary)
}

/// Decode, crop, and featurize one clean/noisy pair.
fn process_pair(
    clean_path: &Path,
    noisy_path: &Path,
    config: &PipelineConfig,
    seed: u64,
    pair_index: usize,
) -> Result<Vec<crate::corpus::record::RecordFields>, PairError> {
    if clean_path.file_name() != noisy_path.file_name() {
        return Err(PairError::StemMismatch {
            clean: clean_path.to_path_buf(),
            noisy: noisy_path.to_path_buf(),
        });
    }

    let clean = audio::load_mono(clean_path, config.sample_rate)?;
    let noisy = audio::load_mono(noisy_path, config.sample_rate)?;

    let (clean_samples, noisy_samples) = if config.trim_silence {
        (
            silence::trim_silence(&clean.samples, config.hop_length, config.top_db),
            silence::trim_silence(&noisy.samples, config.hop_length, config.top_db),
        )
    } else {
        (clean.samples, noisy.samples)
    };

    let mut rng = pair_rng(seed, pair_index);
    let (clean_cropped, noisy_cropped) = random_crop_aligned(
        &clean_samples,
        &noisy_samples,
        config.sample_rate,
        config.audio_max_duration,
        &mut rng,
    );

    let pair = WaveformPair {
        clean: clean_cropped,
        noisy: noisy_cropped,
        sample_rate: config.sample_rate,
    };
    Ok(extract_records(&pair, config)?)
}

/// Crop offsets must not depend on worker scheduling, so every pair derives
/// its own RNG from the process seed and its input-order index.
fn pair_rng(seed: u64, pair_index: usize) -> StdRng {
    StdRng::seed_from_u64(seed ^ (pair_index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15))
}

type PairResult = Result<Vec<crate::corpus::record::RecordFields>, PairError>;

fn write_shard(
    shard_path: &Path,
    results: Vec<PairResult>,
    summary: &mut BuildSummary,
) -> Result<usize, ShardError> {
    let mut writer = ShardWriter::create(shard_path)?;
    for result in results {
        match result {
            Ok(records) => {
                for record in &records {
                    writer.append(record)?;
                }
                summary.pairs_processed += 1;
            }
            Err(err) => {
                warn!("Skipping pair: {err}");
                summary.pairs_skipped += 1;
            }
        }
    }
    writer.finish()
}

fn collect_audio_files(dir: &Path) -> Result<Vec<PathBuf>, BuildError> {
    let entries = std::fs::read_dir(dir).map_err(|source| BuildError::ListDir {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| {
                        AUDIO_EXTENSIONS
                            .iter()
                            .any(|known| ext.eq_ignore_ascii_case(known))
                    })
        })
        .collect();
    files.sort();
    Ok(files)
}

fn write_manifest(
    records_dir: &Path,
    options: &BuildOptions,
    config: &PipelineConfig,
    shards: &[(String, Option<usize>)],
    summary: &BuildSummary,
) -> Result<(), BuildError> {
    let manifest_path = records_dir.join(format!("{}_manifest.json", options.prefix));
    let shard_entries: Vec<serde_json::Value> = shards
        .iter()
        .map(|(file, records)| match records {
            Some(count) => serde_json::json!({ "file": file, "records": count }),
            None => serde_json::json!({ "file": file, "skipped": true }),
        })
        .collect();
    let manifest = serde_json::json!({
        "schema": config.schema.as_str(),
        "sample_rate": config.sample_rate,
        "nfft": config.nfft,
        "hop_length": config.hop_length,
        "center": config.center,
        "num_features": config.num_features(),
        "num_segments": config.num_segments,
        "audio_max_duration": config.audio_max_duration,
        "subset_size": config.subset_size,
        "seed": options.seed,
        "prefix": options.prefix,
        "pairs_processed": summary.pairs_processed,
        "pairs_skipped": summary.pairs_skipped,
        "shards": shard_entries,
    });
    let text = serde_json::to_string_pretty(&manifest).expect("manifest is valid json");
    std::fs::write(&manifest_path, text).map_err(|source| BuildError::Manifest {
        path: manifest_path,
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::schema::SchemaKind;
    use tempfile::tempdir;

    #[test]
    fn executor_pool_preserves_input_order() {
        let items: Vec<usize> = (0..100).collect();
        let executor = Executor::Pool { workers: 8 };
        let results = executor.map(items, |i| {
            if i % 7 == 0 {
                std::thread::sleep(std::time::Duration::from_millis(2));
            }
            i * 2
        });
        assert_eq!(results, (0..100).map(|i| i * 2).collect::<Vec<_>>());
    }

    #[test]
    fn executor_sequential_matches_pool() {
        let items: Vec<usize> = (0..32).collect();
        let sequential = Executor::Sequential.map(items.clone(), |i| i + 1);
        let pooled = Executor::Pool { workers: 4 }.map(items, |i| i + 1);
        assert_eq!(sequential, pooled);
    }

    fn write_wav(path: &Path, samples: &[f32]) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16_000,
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

    fn seed_pair_dirs(root: &Path, names: &[&str]) -> (PathBuf, PathBuf) {
        let clean_dir = root.join("clean");
        let noisy_dir = root.join("noisy");
        std::fs::create_dir_all(&clean_dir).unwrap();
        std::fs::create_dir_all(&noisy_dir).unwrap();
        let samples: Vec<f32> = (0..32_000).map(|i| (i as f32 * 0.07).sin() * 0.5).collect();
        for name in names {
            write_wav(&clean_dir.join(name), &samples);
            write_wav(&noisy_dir.join(name), &samples);
        }
        (clean_dir, noisy_dir)
    }

    fn time_options(root: &Path, clean_dir: PathBuf, noisy_dir: PathBuf) -> BuildOptions {
        BuildOptions {
            clean_dir,
            noisy_dir,
            out_root: root.to_path_buf(),
            prefix: "train".to_string(),
            seed: DEFAULT_SEED,
            executor: Executor::Sequential,
        }
    }

    fn time_config() -> PipelineConfig {
        PipelineConfig {
            schema: SchemaKind::LstmTime,
            subset_size: 4,
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn mismatched_stems_abort_only_that_pair() {
        let dir = tempdir().unwrap();
        let (clean_dir, noisy_dir) = seed_pair_dirs(dir.path(), &["a.wav", "b.wav"]);
        // Rename one noisy file so the sorted lists pair b.wav with c.wav.
        std::fs::rename(noisy_dir.join("b.wav"), noisy_dir.join("c.wav")).unwrap();

        let options = time_options(dir.path(), clean_dir, noisy_dir);
        let summary = build_corpus(&options, &time_config()).unwrap();
        assert_eq!(summary.pairs_processed, 1);
        assert_eq!(summary.pairs_skipped, 1);
        assert_eq!(summary.records_written, 1);
    }

    #[test]
    fn second_run_skips_existing_shards_without_rewriting() {
        let dir = tempdir().unwrap();
        let (clean_dir, noisy_dir) = seed_pair_dirs(dir.path(), &["a.wav", "b.wav", "c.wav"]);
        let options = time_options(dir.path(), clean_dir, noisy_dir);
        let config = time_config();

        let first = build_corpus(&options, &config).unwrap();
        assert_eq!(first.shards_written, 1);
        let shard_path = first.records_dir.join("train_0.rec");
        let bytes_before = std::fs::read(&shard_path).unwrap();

        let second = build_corpus(&options, &config).unwrap();
        assert_eq!(second.shards_written, 0);
        assert_eq!(second.shards_skipped, 1);
        let bytes_after = std::fs::read(&shard_path).unwrap();
        assert_eq!(bytes_before, bytes_after);
    }

    #[test]
    fn pool_and_sequential_builds_are_byte_identical() {
        let dir = tempdir().unwrap();
        let (clean_dir, noisy_dir) =
            seed_pair_dirs(dir.path(), &["a.wav", "b.wav", "c.wav", "d.wav"]);

        let seq_root = dir.path().join("seq");
        let pool_root = dir.path().join("pool");
        std::fs::create_dir_all(&seq_root).unwrap();
        std::fs::create_dir_all(&pool_root).unwrap();

        let config = time_config();
        let seq_options = time_options(&seq_root, clean_dir.clone(), noisy_dir.clone());
        let mut pool_options = time_options(&pool_root, clean_dir, noisy_dir);
        pool_options.executor = Executor::Pool { workers: 3 };

        let seq_summary = build_corpus(&seq_options, &config).unwrap();
        let pool_summary = build_corpus(&pool_options, &config).unwrap();

        let seq_bytes = std::fs::read(seq_summary.records_dir.join("train_0.rec")).unwrap();
        let pool_bytes = std::fs::read(pool_summary.records_dir.join("train_0.rec")).unwrap();
        assert_eq!(seq_bytes, pool_bytes);
    }
}
