//! Experiment orchestration: one base model, then one model per indicator.

use std::path::{Path, PathBuf};

use log::{info, warn};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::constants::{
    ALL_METRICS_FILE_NAME, BASE_FEATURES, BASE_MODEL_NAME, DATA_FILE_PATH,
    INDICATOR_MODEL_PREFIX, METRICS_DIR, PLOTS_DIR, RANDOM_SEED, TARGET_COLUMN,
    TRAIN_SPLIT_RATIO,
};
use crate::error::{PipelineError, Result};
use crate::forest::step_1_dataset_preparation::split_data;
use crate::forest::step_4_hyperparameter_tuning::{tune_hyperparameters, Hyperparameters, TunerConfig};
use crate::forest::step_5_train_and_evaluate::train_and_evaluate_model;
use crate::util::feature_engineering::Indicator;
use crate::util::model_logger::{save_hyperparameters, MetricsRecord, MetricsTable};
use crate::util::plotting::plot_and_save_results;
use crate::util::pre_processor::{
    create_target_variable, load_and_prepare_data, z_score_volume, z_score_volume_with_reference,
};

/// Statistics used to z-score volume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VolumeScaling {
    /// Mean and std over every row, test period included
    FullSeries,
    /// Mean and std over the leading training share of rows only
    TrainingSegment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentConfig {
    pub data_path: PathBuf,
    pub metrics_dir: PathBuf,
    pub plots_dir: PathBuf,
    /// Evaluated in this order after the base model
    pub indicators: Vec<Indicator>,
    pub split_ratio: f64,
    pub seed: u64,
    pub tuner: TunerConfig,
    pub volume_scaling: VolumeScaling,
    pub save_plots: bool,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from(DATA_FILE_PATH),
            metrics_dir: PathBuf::from(METRICS_DIR),
            plots_dir: PathBuf::from(PLOTS_DIR),
            indicators: Indicator::ALL.to_vec(),
            split_ratio: TRAIN_SPLIT_RATIO,
            seed: RANDOM_SEED,
            tuner: TunerConfig::default(),
            volume_scaling: VolumeScaling::FullSeries,
            save_plots: true,
        }
    }
}

impl ExperimentConfig {
    pub fn metrics_csv_path(&self) -> PathBuf {
        self.metrics_dir.join(ALL_METRICS_FILE_NAME)
    }
}

/// A model variant that could not be trained
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantFailure {
    pub model_name: String,
    pub error: String,
}

/// Everything one experiment run produced
#[derive(Debug, Clone)]
pub struct ExperimentReport {
    pub metrics: MetricsTable,
    pub hyperparameters: Hyperparameters,
    pub failures: Vec<VariantFailure>,
    pub metrics_csv: PathBuf,
}

pub fn base_features() -> Vec<String> {
    BASE_FEATURES.iter().map(|s| s.to_string()).collect()
}

/// `Base_Random_Forest` or `Random_Forest_with_<Name>`
pub fn model_name_for(indicator: Option<Indicator>) -> String {
    match indicator {
        None => BASE_MODEL_NAME.to_string(),
        Some(indicator) => format!("{}{}", INDICATOR_MODEL_PREFIX, indicator.name()),
    }
}

/// Loads the price file and builds the base feature table
///
/// Log returns, the next-bar target and the volume z-score are added; the
/// final bar is dropped because it has no target.
pub fn build_base_table(config: &ExperimentConfig) -> Result<DataFrame> {
    let prices = load_and_prepare_data(&config.data_path)?;
    let labelled = create_target_variable(&prices)?;
    match config.volume_scaling {
        VolumeScaling::FullSeries => z_score_volume(&labelled),
        VolumeScaling::TrainingSegment => {
            let reference_rows = ((labelled.height() as f64 * config.split_ratio) as usize).max(1);
            z_score_volume_with_reference(&labelled, reference_rows)
        }
    }
}

/// Splits, trains and scores one feature set, then writes its JSON record
/// and plot
fn evaluate_feature_set(
    df: &DataFrame,
    features: &[String],
    model_name: &str,
    indicator: Option<Indicator>,
    params: &Hyperparameters,
    config: &ExperimentConfig,
) -> Result<MetricsRecord> {
    let split = split_data(df, features, TARGET_COLUMN, config.split_ratio)?;
    let evaluation = train_and_evaluate_model(&split, params, config.seed, model_name)?;

    let record = MetricsRecord::from_evaluation(
        model_name,
        indicator.map(|i| i.name()),
        &split,
        params,
        evaluation.metrics,
    );
    record.save_json(&config.metrics_dir)?;

    if config.save_plots {
        let path = plot_and_save_results(&config.plots_dir, model_name, &split, &evaluation)?;
        info!("Saved plot to {}", path.display());
    }
    Ok(record)
}

/// Trains the base features plus one indicator with the shared hyperparameters
///
/// # Arguments
///
/// * `base_df` - Base feature table from [`build_base_table`]
/// * `indicator` - Indicator whose columns are appended to the base features
/// * `params` - Hyperparameters tuned on the base feature set
/// * `config` - Experiment configuration
///
/// # Returns
///
/// Returns the metrics record of the variant
pub fn process_and_evaluate_with_indicator(
    base_df: &DataFrame,
    indicator: Indicator,
    params: &Hyperparameters,
    config: &ExperimentConfig,
) -> Result<MetricsRecord> {
    let model_name = model_name_for(Some(indicator));
    info!("Processing {}", model_name);

    let df = indicator.apply(base_df)?;
    let mut features = base_features();
    features.extend(indicator.column_names());

    evaluate_feature_set(&df, &features, &model_name, Some(indicator), params, config)
}

/// Runs the full experiment and writes the combined metrics CSV
///
/// Hyperparameters are tuned once on the base feature set. A failing
/// indicator variant is recorded in the report and skipped; input and I/O
/// errors abort the run.
pub fn run_experiment(config: &ExperimentConfig) -> Result<ExperimentReport> {
    if !(config.split_ratio > 0.0 && config.split_ratio < 1.0) {
        return Err(PipelineError::InvalidConfig(format!(
            "Split ratio must lie in (0, 1), got {}",
            config.split_ratio
        )));
    }

    let base_df = build_base_table(config)?;
    let features = base_features();

    let base_split = split_data(&base_df, &features, TARGET_COLUMN, config.split_ratio)?;
    let (train_start, train_end) = base_split.train_range();
    let (test_start, test_end) = base_split.test_range();
    info!("Training data from {} to {}", train_start, train_end);
    info!("Testing data from {} to {}", test_start, test_end);

    let params = tune_hyperparameters(
        base_split.x_train.view(),
        base_split.y_train.view(),
        &config.tuner,
    )?;
    info!("Best hyperparameters: {}", params);
    save_hyperparameters(&config.metrics_dir, &params)?;

    let mut metrics = MetricsTable::new();
    let base_record = evaluate_feature_set(
        &base_df,
        &features,
        &model_name_for(None),
        None,
        &params,
        config,
    )?;
    metrics.push(base_record);

    let mut failures = Vec::new();
    for &indicator in &config.indicators {
        match process_and_evaluate_with_indicator(&base_df, indicator, &params, config) {
            Ok(record) => metrics.push(record),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                let model_name = model_name_for(Some(indicator));
                warn!("Skipping {}: {}", model_name, e);
                failures.push(VariantFailure {
                    model_name,
                    error: e.to_string(),
                });
            }
        }
    }

    let metrics_csv = config.metrics_csv_path();
    metrics.write_csv(&metrics_csv)?;

    Ok(ExperimentReport {
        metrics,
        hyperparameters: params,
        failures,
        metrics_csv,
    })
}

/// Config with every output directory placed under `root`
pub fn config_with_output_root(root: &Path, data_path: &Path) -> ExperimentConfig {
    ExperimentConfig {
        data_path: data_path.to_path_buf(),
        metrics_dir: root.join(METRICS_DIR),
        plots_dir: root.join(PLOTS_DIR),
        ..Default::default()
    }
}
