use std::path::{Path, PathBuf};
use std::time::Instant;
use std::fs;
use anyhow::{bail, Context};
use clap::Parser;
use log::{error, info};
use rayon::prelude::*;

use retinopathy_rust_lib::config::{AnalysisMode, Config};
use retinopathy_rust_lib::image_io::get_fundus_files_in_dir;
use retinopathy_rust_lib::output::{write_diagnosis_json, write_summary_csv, BatchEntry};
use retinopathy_rust_lib::Analyzer;

const DEFAULT_CONFIG: &str = "config.toml";

/// Command-line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about = "Diabetic retinopathy grading from fundus photographs")]
struct Args {
    /// Path to input image or directory
    #[clap(short, long)]
    input: Option<String>,

    /// Path to output directory (JSON records and summary.csv)
    #[clap(short, long)]
    output: Option<String>,

    /// Path to configuration file (defaults are used when absent)
    #[clap(short, long)]
    config: Option<String>,

    /// ONNX weights for the learned classifier (overwrites config)
    #[clap(short, long)]
    weights: Option<String>,

    /// Produce filename-seeded simulated results without analysing pixels
    #[clap(long)]
    simulate: bool,

    /// Save intermediate images and log at debug level
    #[clap(short, long)]
    debug: bool,

    /// Write the default configuration to this path and exit
    #[clap(long)]
    write_default_config: Option<String>,
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None if Path::new(DEFAULT_CONFIG).is_file() => Config::from_file(DEFAULT_CONFIG)?,
        None => Config::default(),
    };

    // Override config with command-line arguments
    if let Some(input) = args.input.clone() {
        config.input_path = input;
    }

    if let Some(output) = args.output.clone() {
        config.output_base_dir = output;
    }

    if let Some(weights) = args.weights.clone() {
        config.weights_path = Some(weights);
    }

    if args.simulate {
        config.mode = AnalysisMode::Simulation;
    }

    config.validate()?;
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    if let Some(path) = &args.write_default_config {
        Config::default()
            .save_to_file(path)
            .with_context(|| format!("writing default config to {}", path))?;
        info!("Default configuration written to {}", path);
        return Ok(());
    }

    let config = load_config(&args)?;
    let start_time = Instant::now();

    let output_base = PathBuf::from(&config.output_base_dir);
    fs::create_dir_all(&output_base)
        .with_context(|| format!("creating output directory {}", output_base.display()))?;
    let debug_dir = args.debug.then(|| output_base.join("debug"));

    let input_path = config.input();
    let images = if input_path.is_file() {
        vec![input_path.clone()]
    } else if input_path.is_dir() {
        get_fundus_files_in_dir(&input_path, &config.overlay_prefix)?
    } else {
        bail!("Invalid input path: {}", input_path.display());
    };

    info!("Found {} fundus image(s) in {}", images.len(), input_path.display());

    let analyzer = Analyzer::new(config)?;

    let diagnose = |path: &PathBuf| -> BatchEntry {
        info!("Analyzing: {}", path.display());
        let outcome = analyzer
            .diagnose_with_debug(path, debug_dir.as_deref())
            .and_then(|result| {
                write_diagnosis_json(&result, &output_base, path, &input_path)?;
                Ok(result)
            })
            .map_err(|e| {
                error!("Error processing {}: {}", path.display(), e);
                e.to_string()
            });

        BatchEntry { image_path: path.clone(), outcome }
    };

    let entries: Vec<BatchEntry> = if analyzer.config().use_parallel {
        images.par_iter().map(&diagnose).collect()
    } else {
        images.iter().map(&diagnose).collect()
    };

    for entry in &entries {
        if let Ok(result) = &entry.outcome {
            println!("{}", entry.image_path.display());
            println!("  Diagnosis:  {}", result.diagnosis);
            println!("  Confidence: {:.2}%", result.confidence * 100.0);
            println!("  Details:    {}", result.details);
        }
    }

    let summary = write_summary_csv(&entries, &output_base)?;
    let failures = entries.iter().filter(|e| e.outcome.is_err()).count();

    info!(
        "Processed {} image(s), {} failed, summary at {} ({:.2} s)",
        entries.len(),
        failures,
        summary.display(),
        start_time.elapsed().as_secs_f64()
    );

    Ok(())
}
