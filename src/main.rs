//! Corpus builder CLI: turns paired clean/noisy recordings into shards.

use std::path::PathBuf;

use clearwave::config::PipelineConfig;
use clearwave::corpus::builder::{BuildOptions, Executor, build_corpus};
use clearwave::logging;

fn main() {
    if let Err(err) = logging::init() {
        eprintln!("Logging disabled: {err}");
    }
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let Some((options, config)) = parse_args(std::env::args().skip(1).collect())? else {
        return Ok(());
    };

    let summary = build_corpus(&options, &config).map_err(|err| err.to_string())?;
    println!(
        "Wrote {} records across {} shards into {}",
        summary.records_written,
        summary.shards_written,
        summary.records_dir.display()
    );
    if summary.shards_skipped > 0 {
        println!("Skipped {} existing shards", summary.shards_skipped);
    }
    if summary.pairs_skipped > 0 {
        println!(
            "Skipped {} of {} pairs (see log for reasons)",
            summary.pairs_skipped,
            summary.pairs_skipped + summary.pairs_processed
        );
    }
    Ok(())
}

fn parse_args(args: Vec<String>) -> Result<Option<(BuildOptions, PipelineConfig)>, String> {
    let mut options = BuildOptions::default();
    let mut config = PipelineConfig::default();
    let mut clean_dir = None;
    let mut noisy_dir = None;

    let mut idx = 0usize;
    while idx < args.len() {
        match args[idx].as_str() {
            "-h" | "--help" => {
                println!("{}", help_text());
                return Ok(None);
            }
            "--clean" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--clean requires a value".to_string())?;
                clean_dir = Some(PathBuf::from(value));
            }
            "--noisy" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--noisy requires a value".to_string())?;
                noisy_dir = Some(PathBuf::from(value));
            }
            "--out" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--out requires a value".to_string())?;
                options.out_root = PathBuf::from(value);
            }
            "--config" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--config requires a value".to_string())?;
                config = PipelineConfig::from_path(&PathBuf::from(value))
                    .map_err(|err| err.to_string())?;
            }
            "--prefix" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--prefix requires a value".to_string())?;
                if value != "train" && value != "val" {
                    return Err(format!("--prefix must be train or val, got {value}"));
                }
                options.prefix = value.to_string();
            }
            "--seed" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--seed requires a value".to_string())?;
                options.seed = value
                    .parse::<u64>()
                    .map_err(|_| format!("Invalid --seed value: {value}"))?;
            }
            "--workers" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--workers requires a value".to_string())?;
                let workers = value
                    .parse::<usize>()
                    .map_err(|_| format!("Invalid --workers value: {value}"))?;
                options.executor = Executor::Pool {
                    workers: workers.max(1),
                };
            }
            "--sequential" => {
                options.executor = Executor::Sequential;
            }
            unknown => {
                return Err(format!("Unknown argument: {unknown}\n\n{}", help_text()));
            }
        }
        idx += 1;
    }

    options.clean_dir = clean_dir.ok_or_else(|| "--clean is required".to_string())?;
    options.noisy_dir = noisy_dir.ok_or_else(|| "--noisy is required".to_string())?;
    Ok(Some((options, config)))
}

fn help_text() -> String {
    [
        "clearwave",
        "",
        "Builds a serialized denoising corpus from paired clean/noisy audio.",
        "",
        "Usage:",
        "  clearwave --clean <dir> --noisy <dir> [options]",
        "",
        "Options:",
        "  --clean <dir>      Directory of clean recordings (required).",
        "  --noisy <dir>      Directory of noisy recordings; file names must",
        "                     match the clean directory (required).",
        "  --out <dir>        Root for the records directory (default: .).",
        "  --config <path>    Pipeline TOML (defaults: lstm-freq at 16 kHz).",
        "  --prefix <name>    Shard prefix, train or val (default: train).",
        "  --seed <u64>       Crop-offset seed (default: 999).",
        "  --workers <n>      Worker pool size (default: cores - 3).",
        "  --sequential       Process pairs on the calling thread.",
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requires_clean_and_noisy() {
        let err = parse_args(vec!["--clean".into(), "a".into()]).unwrap_err();
        assert!(err.contains("--noisy"));
    }

    #[test]
    fn parses_executor_flags() {
        let (options, _) = parse_args(vec![
            "--clean".into(),
            "c".into(),
            "--noisy".into(),
            "n".into(),
            "--sequential".into(),
        ])
        .unwrap()
        .unwrap();
        assert_eq!(options.executor, Executor::Sequential);

        let (options, _) = parse_args(vec![
            "--clean".into(),
            "c".into(),
            "--noisy".into(),
            "n".into(),
            "--workers".into(),
            "2".into(),
        ])
        .unwrap()
        .unwrap();
        assert_eq!(options.executor, Executor::Pool { workers: 2 });
    }

    #[test]
    fn rejects_unknown_prefix() {
        let err = parse_args(vec![
            "--clean".into(),
            "c".into(),
            "--noisy".into(),
            "n".into(),
            "--prefix".into(),
            "test".into(),
        ])
        .unwrap_err();
        assert!(err.contains("--prefix"));
    }
}
