// External imports
use log::{debug, info};
use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};

// Internal imports
use super::step_1_dataset_preparation::SplitData;
use super::step_3_random_forest::RandomForest;
use super::step_4_hyperparameter_tuning::Hyperparameters;
use crate::error::{PipelineError, Result};

/// Error and direction metrics for one data segment
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SegmentMetrics {
    pub mse: f64,
    pub rmse: f64,
    pub mae: f64,
    pub r2: f64,
    /// Share of rows where prediction and actual have the same sign
    pub directional_accuracy: f64,
}

impl SegmentMetrics {
    /// Computes all metrics for aligned actual and predicted values
    pub fn compute(actual: ArrayView1<f64>, predicted: ArrayView1<f64>) -> Result<Self> {
        if actual.len() != predicted.len() {
            return Err(PipelineError::Fitting(format!(
                "{} actual values but {} predictions",
                actual.len(),
                predicted.len()
            )));
        }
        if actual.is_empty() {
            return Err(PipelineError::Fitting("cannot score an empty segment".into()));
        }

        let n = actual.len() as f64;
        let mse = mean_squared_error(actual, predicted);
        let mae = actual
            .iter()
            .zip(predicted.iter())
            .map(|(a, p)| (a - p).abs())
            .sum::<f64>()
            / n;

        let mean = actual.sum() / n;
        let ss_tot: f64 = actual.iter().map(|a| (a - mean).powi(2)).sum();
        // Constant actuals leave R² undefined
        let r2 = if ss_tot > 0.0 {
            1.0 - mse * n / ss_tot
        } else {
            f64::NAN
        };

        let hits = actual
            .iter()
            .zip(predicted.iter())
            .filter(|(a, p)| direction(**a) == direction(**p))
            .count();

        Ok(Self {
            mse,
            rmse: mse.sqrt(),
            mae,
            r2,
            directional_accuracy: hits as f64 / n,
        })
    }
}

/// Sign of a return, with zero as its own direction
fn direction(value: f64) -> i8 {
    if value > 0.0 {
        1
    } else if value < 0.0 {
        -1
    } else {
        0
    }
}

/// Metrics for both segments of a split
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    pub train: SegmentMetrics,
    pub test: SegmentMetrics,
}

/// A fitted model together with its predictions and scores
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub model: RandomForest,
    pub y_train_pred: Array1<f64>,
    pub y_test_pred: Array1<f64>,
    pub metrics: RegressionMetrics,
}

pub fn mean_squared_error(actual: ArrayView1<f64>, predicted: ArrayView1<f64>) -> f64 {
    if actual.is_empty() {
        return f64::NAN;
    }
    actual
        .iter()
        .zip(predicted.iter())
        .map(|(a, p)| (a - p).powi(2))
        .sum::<f64>()
        / actual.len() as f64
}

/// Fits a random forest on the training segment and scores both segments
///
/// # Arguments
///
/// * `split` - Train/test segments
/// * `params` - Hyperparameters shared by all model variants
/// * `seed` - Seed for bootstrap sampling
/// * `model_name` - Label used in log output
///
/// # Returns
///
/// Returns the fitted model, its predictions and the regression metrics
pub fn train_and_evaluate_model(
    split: &SplitData,
    params: &Hyperparameters,
    seed: u64,
    model_name: &str,
) -> Result<Evaluation> {
    if split.n_train() == 0 || split.n_test() == 0 {
        return Err(PipelineError::Fitting(format!(
            "{}: empty segment (train {}, test {})",
            model_name,
            split.n_train(),
            split.n_test()
        )));
    }

    info!(
        "Training {} on {} rows with {} features",
        model_name,
        split.n_train(),
        split.feature_names.len()
    );

    let mut model = RandomForest::new(params.forest_config(seed));
    model.fit(split.x_train.view(), split.y_train.view())?;

    let y_train_pred = model.predict(split.x_train.view())?;
    let y_test_pred = model.predict(split.x_test.view())?;

    let metrics = RegressionMetrics {
        train: SegmentMetrics::compute(split.y_train.view(), y_train_pred.view())?,
        test: SegmentMetrics::compute(split.y_test.view(), y_test_pred.view())?,
    };

    info!(
        "{}: train RMSE {:.6e}, test RMSE {:.6e}, test R2 {:.4}",
        model_name, metrics.train.rmse, metrics.test.rmse, metrics.test.r2
    );
    for (feature, importance) in model.feature_importance_ranking(&split.feature_names) {
        debug!("{} importance {}: {:.4}", model_name, feature, importance);
    }

    Ok(Evaluation {
        model,
        y_train_pred,
        y_test_pred,
        metrics,
    })
}
