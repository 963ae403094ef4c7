// External crates
use log::debug;
use ndarray::{Array1, Array2};
use polars::prelude::*;

// Internal modules
use crate::error::{PipelineError, Result};
use crate::util::file_utils::column_as_f64;
use crate::util::pre_processor::{format_timestamp, timestamps_millis};

/// Chronological train/test partition of the usable rows of a feature table
#[derive(Debug, Clone)]
pub struct SplitData {
    pub feature_names: Vec<String>,
    pub x_train: Array2<f64>,
    pub x_test: Array2<f64>,
    pub y_train: Array1<f64>,
    pub y_test: Array1<f64>,
    /// Epoch milliseconds of every training row
    pub train_timestamps: Vec<i64>,
    /// Epoch milliseconds of every testing row
    pub test_timestamps: Vec<i64>,
}

impl SplitData {
    pub fn n_train(&self) -> usize {
        self.y_train.len()
    }

    pub fn n_test(&self) -> usize {
        self.y_test.len()
    }

    /// First and last training timestamps, formatted
    pub fn train_range(&self) -> (String, String) {
        range_of(&self.train_timestamps)
    }

    /// First and last testing timestamps, formatted
    pub fn test_range(&self) -> (String, String) {
        range_of(&self.test_timestamps)
    }
}

fn range_of(timestamps: &[i64]) -> (String, String) {
    match (timestamps.first(), timestamps.last()) {
        (Some(first), Some(last)) => (format_timestamp(*first), format_timestamp(*last)),
        _ => (String::new(), String::new()),
    }
}

/// Extracts the selected feature columns and the target as row vectors,
/// keeping only rows where every value is defined and finite
pub fn usable_rows(
    df: &DataFrame,
    features: &[String],
    target: &str,
) -> Result<(Vec<Vec<f64>>, Vec<f64>, Vec<i64>)> {
    let timestamps = timestamps_millis(df)?;
    let feature_columns = features
        .iter()
        .map(|name| column_as_f64(df, name))
        .collect::<Result<Vec<_>>>()?;
    let target_column = column_as_f64(df, target)?;

    let mut rows = Vec::with_capacity(df.height());
    let mut labels = Vec::with_capacity(df.height());
    let mut kept_timestamps = Vec::with_capacity(df.height());

    'rows: for i in 0..df.height() {
        let Some(label) = target_column[i].filter(|v| v.is_finite()) else {
            continue;
        };
        let mut row = Vec::with_capacity(feature_columns.len());
        for column in &feature_columns {
            match column[i] {
                Some(v) if v.is_finite() => row.push(v),
                _ => continue 'rows,
            }
        }
        rows.push(row);
        labels.push(label);
        kept_timestamps.push(timestamps[i]);
    }

    debug!(
        "{} of {} rows usable for {} features",
        rows.len(),
        df.height(),
        features.len()
    );
    Ok((rows, labels, kept_timestamps))
}

fn to_matrix(rows: &[Vec<f64>], n_features: usize) -> Array2<f64> {
    Array2::from_shape_fn((rows.len(), n_features), |(i, j)| rows[i][j])
}

/// Splits a feature table into training and testing segments by position
///
/// Rows with an undefined feature or target are dropped first; the first
/// `floor(n_usable * split_ratio)` remaining rows form the training segment
/// and the rest the testing segment, so training always precedes testing.
///
/// # Arguments
///
/// * `df` - Feature table with a `timestamp` column
/// * `features` - Ordered feature column names
/// * `target` - Target column name
/// * `split_ratio` - Fraction of usable rows assigned to training, in (0, 1)
///
/// # Returns
///
/// Returns the four segments together with their timestamps
pub fn split_data(
    df: &DataFrame,
    features: &[String],
    target: &str,
    split_ratio: f64,
) -> Result<SplitData> {
    if !(split_ratio > 0.0 && split_ratio < 1.0) {
        return Err(PipelineError::InvalidConfig(format!(
            "Split ratio must lie in (0, 1), got {}",
            split_ratio
        )));
    }
    if features.is_empty() {
        return Err(PipelineError::InvalidConfig("No feature columns selected".into()));
    }

    let (rows, labels, timestamps) = usable_rows(df, features, target)?;
    let n_rows = rows.len();
    let split_idx = (n_rows as f64 * split_ratio) as usize;

    if split_idx == 0 || split_idx == n_rows {
        return Err(PipelineError::InsufficientData(format!(
            "{} usable rows cannot be split {:.0}/{:.0} into non-empty segments",
            n_rows,
            split_ratio * 100.0,
            (1.0 - split_ratio) * 100.0
        )));
    }

    let n_features = features.len();
    Ok(SplitData {
        feature_names: features.to_vec(),
        x_train: to_matrix(&rows[..split_idx], n_features),
        x_test: to_matrix(&rows[split_idx..], n_features),
        y_train: Array1::from_vec(labels[..split_idx].to_vec()),
        y_test: Array1::from_vec(labels[split_idx..].to_vec()),
        train_timestamps: timestamps[..split_idx].to_vec(),
        test_timestamps: timestamps[split_idx..].to_vec(),
    })
}
