//! Developer utility to dump the contents of a shard file.

use std::path::PathBuf;

use clearwave::config::PipelineConfig;
use clearwave::corpus::schema::decode_example;
use clearwave::corpus::shard::ShardReader;

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let Some((shard_path, config)) = parse_args(std::env::args().skip(1).collect())? else {
        return Ok(());
    };

    println!("Shard: {}", shard_path.display());
    let reader = ShardReader::open(&shard_path).map_err(|err| err.to_string())?;

    let mut records = 0usize;
    let mut values = 0usize;
    let mut decoded_ok = 0usize;
    for record in reader {
        let record = record.map_err(|err| err.to_string())?;
        if records == 0 {
            println!("Fields of record 0:");
            for field in &record.fields {
                println!("  {}: {} f32 values", field.name, field.values.len());
            }
        }
        values += record
            .fields
            .iter()
            .map(|field| field.values.len())
            .sum::<usize>();
        if let Some(config) = &config {
            let example = decode_example(
                &record,
                config.schema,
                config.num_features(),
                config.num_segments,
            )
            .map_err(|err| format!("record {records}: {err}"))?;
            if records == 0 {
                println!(
                    "Decoded shapes: noisy {:?}, clean {:?}",
                    example.noisy.shape, example.clean.shape
                );
            }
            decoded_ok += 1;
        }
        records += 1;
    }

    println!("{records} records, {values} f32 values total");
    if config.is_some() {
        println!("All {decoded_ok} records decode against the configured schema");
    }
    Ok(())
}

fn parse_args(args: Vec<String>) -> Result<Option<(PathBuf, Option<PipelineConfig>)>, String> {
    let mut shard = None;
    let mut config = None;

    let mut idx = 0usize;
    while idx < args.len() {
        match args[idx].as_str() {
            "-h" | "--help" => {
                println!("{}", help_text());
                return Ok(None);
            }
            "--shard" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--shard requires a value".to_string())?;
                shard = Some(PathBuf::from(value));
            }
            "--config" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--config requires a value".to_string())?;
                config = Some(
                    PipelineConfig::from_path(&PathBuf::from(value))
                        .map_err(|err| err.to_string())?,
                );
            }
            unknown => {
                return Err(format!("Unknown argument: {unknown}\n\n{}", help_text()));
            }
        }
        idx += 1;
    }

    let shard = shard.ok_or_else(|| "--shard is required".to_string())?;
    Ok(Some((shard, config)))
}

fn help_text() -> String {
    [
        "clearwave-shard-inspect",
        "",
        "Dumps record counts and field layouts from a shard file.",
        "",
        "Usage:",
        "  clearwave-shard-inspect --shard <file> [--config <path>]",
        "",
        "Options:",
        "  --shard <file>    Shard file to inspect (required).",
        "  --config <path>   Validate every record against this pipeline",
        "                    config and print the decoded tensor shapes.",
    ]
    .join("\n")
}
