// External crates
use anyhow::{Context, Result};
use env_logger::Env;
use std::env;
use std::path::PathBuf;

// Local modules
use indicator_uplift::constants::DATA_FILE_PATH;
use indicator_uplift::pipeline::{run_experiment, ExperimentConfig};

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    // Optional CSV path as the first argument
    let args: Vec<String> = env::args().collect();
    let data_path = args.get(1).map(|s| s.as_str()).unwrap_or(DATA_FILE_PATH);
    println!("Using data file: {}", data_path);

    let config = ExperimentConfig {
        data_path: PathBuf::from(data_path),
        ..Default::default()
    };

    let report = run_experiment(&config)
        .with_context(|| format!("Experiment on {} failed", config.data_path.display()))?;

    if let Some(base) = report.metrics.records().first() {
        println!("Training data from {} to {}", base.train_start, base.train_end);
        println!("Testing data from {} to {}", base.test_start, base.test_end);
    }
    println!("Best hyperparameters: {}", report.hyperparameters);

    for failure in &report.failures {
        eprintln!("Skipped {}: {}", failure.model_name, failure.error);
    }

    let table = report
        .metrics
        .to_dataframe()
        .context("Failed to build the metrics table")?;
    println!("{}", table);
    println!("Metrics saved to {}", report.metrics_csv.display());

    Ok(())
}
