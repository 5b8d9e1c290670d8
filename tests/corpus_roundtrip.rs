//! End-to-end corpus build and read-back.

use std::path::{Path, PathBuf};

use clearwave::config::PipelineConfig;
use clearwave::corpus::builder::{BuildOptions, Executor, build_corpus};
use clearwave::corpus::schema::SchemaKind;
use clearwave::corpus::stream::{ExampleStream, StreamOptions, list_shards};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::tempdir;

const SAMPLE_RATE: u32 = 16_000;

fn write_wav(path: &Path, samples: &[f32]) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
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

/// Ten 2-second utterances: clean tones plus seeded noise on the noisy side.
fn seed_voice_bank(root: &Path, count: usize) -> (PathBuf, PathBuf) {
    let clean_dir = root.join("clean");
    let noisy_dir = root.join("noisy");
    std::fs::create_dir_all(&clean_dir).unwrap();
    std::fs::create_dir_all(&noisy_dir).unwrap();

    let mut rng = StdRng::seed_from_u64(4242);
    for index in 0..count {
        let name = format!("p{index:03}.wav");
        let tone_step = 0.04 + index as f32 * 0.01;
        let clean: Vec<f32> = (0..2 * SAMPLE_RATE as usize)
            .map(|i| (i as f32 * tone_step).sin() * 0.6)
            .collect();
        let noisy: Vec<f32> = clean
            .iter()
            .map(|s| s + rng.random_range(-0.05..0.05))
            .collect();
        write_wav(&clean_dir.join(&name), &clean);
        write_wav(&noisy_dir.join(&name), &noisy);
    }
    (clean_dir, noisy_dir)
}

fn build_options(root: &Path, clean_dir: PathBuf, noisy_dir: PathBuf) -> BuildOptions {
    BuildOptions {
        clean_dir,
        noisy_dir,
        out_root: root.to_path_buf(),
        prefix: "train".to_string(),
        seed: 999,
        executor: Executor::Pool { workers: 3 },
    }
}

#[test]
fn ten_pairs_build_one_time_domain_shard_and_read_back() {
    let dir = tempdir().unwrap();
    let (clean_dir, noisy_dir) = seed_voice_bank(dir.path(), 10);
    let config = PipelineConfig {
        schema: SchemaKind::LstmTime,
        subset_size: 10,
        ..PipelineConfig::default()
    };
    let options = build_options(dir.path(), clean_dir, noisy_dir);

    let summary = build_corpus(&options, &config).unwrap();
    assert_eq!(summary.shards_written, 1);
    assert_eq!(summary.records_written, 10);
    assert_eq!(summary.pairs_processed, 10);
    assert_eq!(summary.pairs_skipped, 0);

    let shards = list_shards(&summary.records_dir, "train").unwrap();
    assert_eq!(shards.len(), 1);

    let stream = ExampleStream::open(
        shards,
        config,
        StreamOptions {
            shuffle_buffer: 0,
            seed: 1,
            cycle: false,
        },
    )
    .unwrap();
    let examples: Vec<_> = stream.collect::<Result<_, _>>().unwrap();
    assert_eq!(examples.len(), 10);
    for example in &examples {
        // A 2.0 s clip cropped to 1.008 s at 16 kHz is 16128 samples.
        assert_eq!(example.noisy.shape, vec![1, 16_128]);
        assert_eq!(example.clean.shape, vec![1, 16_128]);
        assert!(example.noisy.data.iter().all(|v| v.abs() <= 1.0));
    }
}

#[test]
fn rebuilding_skips_and_leaves_shards_byte_identical() {
    let dir = tempdir().unwrap();
    let (clean_dir, noisy_dir) = seed_voice_bank(dir.path(), 4);
    let config = PipelineConfig {
        schema: SchemaKind::LstmTime,
        subset_size: 2,
        ..PipelineConfig::default()
    };
    let options = build_options(dir.path(), clean_dir, noisy_dir);

    let first = build_corpus(&options, &config).unwrap();
    assert_eq!(first.shards_written, 2);
    let shard_bytes: Vec<Vec<u8>> = list_shards(&first.records_dir, "train")
        .unwrap()
        .iter()
        .map(|path| std::fs::read(path).unwrap())
        .collect();

    let second = build_corpus(&options, &config).unwrap();
    assert_eq!(second.shards_written, 0);
    assert_eq!(second.shards_skipped, 2);
    let after: Vec<Vec<u8>> = list_shards(&second.records_dir, "train")
        .unwrap()
        .iter()
        .map(|path| std::fs::read(path).unwrap())
        .collect();
    assert_eq!(shard_bytes, after);
}

#[test]
fn freq_corpus_reads_back_with_fixed_spectral_shapes() {
    let dir = tempdir().unwrap();
    let (clean_dir, noisy_dir) = seed_voice_bank(dir.path(), 3);
    let config = PipelineConfig {
        schema: SchemaKind::LstmFreq,
        subset_size: 3,
        ..PipelineConfig::default()
    };
    let options = build_options(dir.path(), clean_dir, noisy_dir);

    let summary = build_corpus(&options, &config).unwrap();
    assert_eq!(summary.records_written, 3);
    assert!(summary.records_dir.ends_with("records_lstm"));

    let shards = list_shards(&summary.records_dir, "train").unwrap();
    let stream = ExampleStream::open(
        shards,
        config,
        StreamOptions {
            shuffle_buffer: 0,
            seed: 1,
            cycle: false,
        },
    )
    .unwrap();
    for example in stream {
        let example = example.unwrap();
        assert_eq!(example.noisy.shape, vec![2, 1, 64, 257]);
        assert_eq!(example.clean.shape, vec![2, 1, 64, 257]);
    }
}

#[test]
fn val_prefix_lives_beside_train_shards() {
    let dir = tempdir().unwrap();
    let (clean_dir, noisy_dir) = seed_voice_bank(dir.path(), 2);
    let config = PipelineConfig {
        schema: SchemaKind::LstmTime,
        subset_size: 4,
        ..PipelineConfig::default()
    };
    let mut options = build_options(dir.path(), clean_dir, noisy_dir);
    build_corpus(&options, &config).unwrap();
    options.prefix = "val".to_string();
    let summary = build_corpus(&options, &config).unwrap();
    assert_eq!(summary.shards_written, 1);

    assert_eq!(list_shards(&summary.records_dir, "train").unwrap().len(), 1);
    assert_eq!(list_shards(&summary.records_dir, "val").unwrap().len(), 1);
}
