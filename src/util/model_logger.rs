use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;
use log::info;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::build_info;
use crate::constants::BEST_PARAMS_FILE_NAME;
use crate::error::Result;
use crate::forest::step_1_dataset_preparation::SplitData;
use crate::forest::step_4_hyperparameter_tuning::Hyperparameters;
use crate::forest::step_5_train_and_evaluate::RegressionMetrics;

/// Scores and context of one trained model variant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsRecord {
    pub model_name: String,
    /// Empty for the base model
    pub indicator: String,
    pub features: Vec<String>,
    pub n_train: usize,
    pub n_test: usize,
    pub train_start: String,
    pub train_end: String,
    pub test_start: String,
    pub test_end: String,
    pub hyperparameters: Hyperparameters,
    pub metrics: RegressionMetrics,
    pub created_at: String,
    pub crate_version: String,
}

impl MetricsRecord {
    pub fn from_evaluation(
        model_name: &str,
        indicator: Option<&str>,
        split: &SplitData,
        hyperparameters: &Hyperparameters,
        metrics: RegressionMetrics,
    ) -> Self {
        let (train_start, train_end) = split.train_range();
        let (test_start, test_end) = split.test_range();
        Self {
            model_name: model_name.to_string(),
            indicator: indicator.unwrap_or_default().to_string(),
            features: split.feature_names.clone(),
            n_train: split.n_train(),
            n_test: split.n_test(),
            train_start,
            train_end,
            test_start,
            test_end,
            hyperparameters: hyperparameters.clone(),
            metrics,
            created_at: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            crate_version: build_info::PKG_VERSION.to_string(),
        }
    }

    /// Writes the record as `<dir>/<model_name>.json`
    pub fn save_json(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let file_path = dir.join(format!("{}.json", sanitize_file_name(&self.model_name)));

        let json = serde_json::to_string_pretty(&self)?;
        let mut file = fs::File::create(&file_path)?;
        file.write_all(json.as_bytes())?;

        Ok(file_path)
    }
}

/// Metrics of every model variant, in the order they were trained
#[derive(Debug, Clone, Default)]
pub struct MetricsTable {
    records: Vec<MetricsRecord>,
}

impl MetricsTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: MetricsRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[MetricsRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// One row per model with flattened train and test metrics
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let r = &self.records;
        let text = |f: fn(&MetricsRecord) -> String| -> Vec<String> { r.iter().map(f).collect() };
        let count = |f: fn(&MetricsRecord) -> usize| -> Vec<u64> { r.iter().map(|x| f(x) as u64).collect() };
        let metric = |f: fn(&MetricsRecord) -> f64| -> Vec<f64> { r.iter().map(f).collect() };

        let columns: Vec<Column> = vec![
            Series::new("model".into(), text(|x| x.model_name.clone())).into(),
            Series::new("indicator".into(), text(|x| x.indicator.clone())).into(),
            Series::new("features".into(), text(|x| x.features.join(";"))).into(),
            Series::new("n_train".into(), count(|x| x.n_train)).into(),
            Series::new("n_test".into(), count(|x| x.n_test)).into(),
            Series::new("train_start".into(), text(|x| x.train_start.clone())).into(),
            Series::new("train_end".into(), text(|x| x.train_end.clone())).into(),
            Series::new("test_start".into(), text(|x| x.test_start.clone())).into(),
            Series::new("test_end".into(), text(|x| x.test_end.clone())).into(),
            Series::new("train_mse".into(), metric(|x| x.metrics.train.mse)).into(),
            Series::new("train_rmse".into(), metric(|x| x.metrics.train.rmse)).into(),
            Series::new("train_mae".into(), metric(|x| x.metrics.train.mae)).into(),
            Series::new("train_r2".into(), metric(|x| x.metrics.train.r2)).into(),
            Series::new(
                "train_directional_accuracy".into(),
                metric(|x| x.metrics.train.directional_accuracy),
            )
            .into(),
            Series::new("test_mse".into(), metric(|x| x.metrics.test.mse)).into(),
            Series::new("test_rmse".into(), metric(|x| x.metrics.test.rmse)).into(),
            Series::new("test_mae".into(), metric(|x| x.metrics.test.mae)).into(),
            Series::new("test_r2".into(), metric(|x| x.metrics.test.r2)).into(),
            Series::new(
                "test_directional_accuracy".into(),
                metric(|x| x.metrics.test.directional_accuracy),
            )
            .into(),
        ];

        Ok(DataFrame::new(columns)?)
    }

    /// Writes the table as CSV, creating the parent directory if needed
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut df = self.to_dataframe()?;
        let mut file = fs::File::create(path)?;
        CsvWriter::new(&mut file).include_header(true).finish(&mut df)?;
        info!("Saved {} metric rows to {}", self.len(), path.display());
        Ok(())
    }
}

/// Writes the tuned hyperparameters to `<dir>/best_hyperparameters.json`
pub fn save_hyperparameters(dir: &Path, params: &Hyperparameters) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let file_path = dir.join(BEST_PARAMS_FILE_NAME);
    let json = serde_json::to_string_pretty(params)?;
    fs::write(&file_path, json)?;
    Ok(file_path)
}

/// Replaces characters that are awkward in file names with underscores
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}
