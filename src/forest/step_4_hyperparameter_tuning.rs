// External imports
use log::{debug, info};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

// Internal imports
use super::step_3_random_forest::{ForestConfig, MaxFeatures, RandomForest};
use super::step_5_train_and_evaluate::mean_squared_error;
use crate::constants::{
    CV_FOLDS, GRID_MAX_DEPTH, GRID_MIN_SAMPLES_LEAF, GRID_MIN_SAMPLES_SPLIT, GRID_N_ESTIMATORS,
    RANDOM_SEED,
};
use crate::error::{PipelineError, Result};

/// Chosen regressor configuration, shared by every model variant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hyperparameters {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
}

impl Hyperparameters {
    /// Forest configuration for these hyperparameters and a seed
    pub fn forest_config(&self, seed: u64) -> ForestConfig {
        ForestConfig {
            n_estimators: self.n_estimators,
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            min_samples_leaf: self.min_samples_leaf,
            max_features: self.max_features,
            bootstrap: true,
            seed,
        }
    }
}

impl fmt::Display for Hyperparameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let depth = self
            .max_depth
            .map_or_else(|| "None".to_string(), |d| d.to_string());
        write!(
            f,
            "{{n_estimators: {}, max_depth: {}, min_samples_split: {}, min_samples_leaf: {}, max_features: {}}}",
            self.n_estimators,
            depth,
            self.min_samples_split,
            self.min_samples_leaf,
            self.max_features
        )
    }
}

/// Values searched for each hyperparameter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HyperparameterGrid {
    pub n_estimators: Vec<usize>,
    pub max_depth: Vec<Option<usize>>,
    pub min_samples_split: Vec<usize>,
    pub min_samples_leaf: Vec<usize>,
    pub max_features: Vec<MaxFeatures>,
}

impl Default for HyperparameterGrid {
    fn default() -> Self {
        Self {
            n_estimators: GRID_N_ESTIMATORS.to_vec(),
            max_depth: GRID_MAX_DEPTH.to_vec(),
            min_samples_split: GRID_MIN_SAMPLES_SPLIT.to_vec(),
            min_samples_leaf: GRID_MIN_SAMPLES_LEAF.to_vec(),
            max_features: vec![MaxFeatures::All],
        }
    }
}

impl HyperparameterGrid {
    /// Cartesian product in a fixed order (n_estimators outermost)
    pub fn candidates(&self) -> Vec<Hyperparameters> {
        let mut candidates = Vec::new();
        for &n_estimators in &self.n_estimators {
            for &max_depth in &self.max_depth {
                for &min_samples_split in &self.min_samples_split {
                    for &min_samples_leaf in &self.min_samples_leaf {
                        for &max_features in &self.max_features {
                            candidates.push(Hyperparameters {
                                n_estimators,
                                max_depth,
                                min_samples_split,
                                min_samples_leaf,
                                max_features,
                            });
                        }
                    }
                }
            }
        }
        candidates
    }
}

/// How candidates are drawn from the grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchStrategy {
    /// Every combination
    Grid,
    /// `n_iter` combinations sampled without replacement
    Randomized { n_iter: usize },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunerConfig {
    pub grid: HyperparameterGrid,
    pub strategy: SearchStrategy,
    pub cv_folds: usize,
    pub seed: u64,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            grid: HyperparameterGrid::default(),
            strategy: SearchStrategy::Grid,
            cv_folds: CV_FOLDS,
            seed: RANDOM_SEED,
        }
    }
}

/// Contiguous k-fold boundaries over `n` rows, without shuffling
///
/// The first `n % k` folds take one extra row.
pub fn kfold_ranges(n: usize, k: usize) -> Result<Vec<(usize, usize)>> {
    if k < 2 {
        return Err(PipelineError::InvalidConfig(format!(
            "cross-validation needs at least 2 folds, got {}",
            k
        )));
    }
    if n < k {
        return Err(PipelineError::InsufficientData(format!(
            "{} training rows cannot be split into {} folds",
            n, k
        )));
    }

    let base = n / k;
    let extra = n % k;
    let mut ranges = Vec::with_capacity(k);
    let mut start = 0;
    for fold in 0..k {
        let len = base + usize::from(fold < extra);
        ranges.push((start, start + len));
        start += len;
    }
    Ok(ranges)
}

fn rows_except(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    start: usize,
    end: usize,
) -> (Array2<f64>, Array1<f64>) {
    let keep: Vec<usize> = (0..x.nrows()).filter(|i| *i < start || *i >= end).collect();
    (x.select(Axis(0), &keep), y.select(Axis(0), &keep))
}

/// Mean validation MSE of one candidate across the folds
///
/// A fold whose training part cannot be fitted scores as infinitely bad.
fn cross_validate(
    params: &Hyperparameters,
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    folds: &[(usize, usize)],
    seed: u64,
) -> f64 {
    let mut total = 0.0;
    for &(start, end) in folds {
        let (x_fit, y_fit) = rows_except(x, y, start, end);
        let x_val = x.slice(ndarray::s![start..end, ..]);
        let y_val = y.slice(ndarray::s![start..end]);

        let mut model = RandomForest::new(params.forest_config(seed));
        let score = model
            .fit(x_fit.view(), y_fit.view())
            .and_then(|_| model.predict(x_val))
            .map(|pred| mean_squared_error(y_val, pred.view()));
        match score {
            Ok(mse) => total += mse,
            Err(e) => {
                debug!("Candidate {} failed on fold {}..{}: {}", params, start, end, e);
                return f64::INFINITY;
            }
        }
    }
    total / folds.len() as f64
}

/// Searches the grid for the configuration with the lowest cross-validated MSE
///
/// Only the supplied training segment is used. Ties keep the earlier
/// candidate, so the result is reproducible for a fixed seed.
///
/// # Arguments
///
/// * `x_train` - Training features
/// * `y_train` - Training targets
/// * `config` - Grid, search strategy, fold count and seed
///
/// # Returns
///
/// Returns the best hyperparameters
pub fn tune_hyperparameters(
    x_train: ArrayView2<f64>,
    y_train: ArrayView1<f64>,
    config: &TunerConfig,
) -> Result<Hyperparameters> {
    let folds = kfold_ranges(x_train.nrows(), config.cv_folds)?;

    let mut candidates = config.grid.candidates();
    if candidates.is_empty() {
        return Err(PipelineError::InvalidConfig("hyperparameter grid is empty".into()));
    }
    if let SearchStrategy::Randomized { n_iter } = config.strategy {
        let mut rng = StdRng::seed_from_u64(config.seed);
        candidates.shuffle(&mut rng);
        candidates.truncate(n_iter.max(1));
    }

    info!(
        "Evaluating {} hyperparameter candidates with {}-fold cross-validation",
        candidates.len(),
        folds.len()
    );

    let scores: Vec<f64> = candidates
        .par_iter()
        .map(|params| cross_validate(params, x_train, y_train, &folds, config.seed))
        .collect();

    let mut best: Option<(usize, f64)> = None;
    for (idx, &score) in scores.iter().enumerate() {
        debug!("{} -> cv mse {:.6e}", candidates[idx], score);
        if score.is_finite() && best.map_or(true, |(_, s)| score < s) {
            best = Some((idx, score));
        }
    }

    match best {
        Some((idx, score)) => {
            info!("Best cross-validated MSE {:.6e}", score);
            Ok(candidates[idx].clone())
        }
        None => Err(PipelineError::Fitting(
            "no hyperparameter candidate could be fitted".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kfold_ranges_cover_all_rows() {
        let ranges = kfold_ranges(11, 3).unwrap();
        assert_eq!(ranges, vec![(0, 4), (4, 8), (8, 11)]);
        assert!(kfold_ranges(2, 3).is_err());
        assert!(kfold_ranges(10, 1).is_err());
    }

    #[test]
    fn test_grid_candidates_order() {
        let grid = HyperparameterGrid {
            n_estimators: vec![10, 20],
            max_depth: vec![Some(2), None],
            min_samples_split: vec![2],
            min_samples_leaf: vec![1],
            max_features: vec![MaxFeatures::All, MaxFeatures::Sqrt],
        };
        let candidates = grid.candidates();
        assert_eq!(candidates.len(), 8);
        assert_eq!(candidates[0].n_estimators, 10);
        assert_eq!(candidates[0].max_depth, Some(2));
        assert_eq!(candidates[0].max_features, MaxFeatures::All);
        assert_eq!(candidates[1].max_features, MaxFeatures::Sqrt);
        assert_eq!(candidates[2].max_depth, None);
        assert_eq!(candidates[7].n_estimators, 20);
    }

    #[test]
    fn test_tuner_prefers_deeper_trees_on_nonlinear_target() {
        // Shuffled positions so every fold spans the whole input range
        let x = Array2::from_shape_fn((120, 1), |(i, _)| ((i * 7) % 120) as f64);
        let y = Array1::from_shape_fn(120, |i| (x[[i, 0]] / 6.0).sin());
        let config = TunerConfig {
            grid: HyperparameterGrid {
                n_estimators: vec![5],
                max_depth: vec![Some(1), Some(8)],
                min_samples_split: vec![2],
                min_samples_leaf: vec![1],
                max_features: vec![MaxFeatures::All],
            },
            strategy: SearchStrategy::Grid,
            cv_folds: 3,
            seed: 7,
        };

        let best = tune_hyperparameters(x.view(), y.view(), &config).unwrap();
        assert_eq!(best.max_depth, Some(8));
    }

    #[test]
    fn test_randomized_search_is_reproducible() {
        let x = Array2::from_shape_fn((60, 2), |(i, j)| (i * (j + 1)) as f64);
        let y = Array1::from_shape_fn(60, |i| (i as f64).sqrt());
        let config = TunerConfig {
            grid: HyperparameterGrid {
                n_estimators: vec![3, 5],
                max_depth: vec![Some(2), Some(4), None],
                min_samples_split: vec![2, 4],
                min_samples_leaf: vec![1],
                max_features: vec![MaxFeatures::All, MaxFeatures::Fraction(0.5)],
            },
            strategy: SearchStrategy::Randomized { n_iter: 4 },
            cv_folds: 3,
            seed: 11,
        };

        let first = tune_hyperparameters(x.view(), y.view(), &config).unwrap();
        let second = tune_hyperparameters(x.view(), y.view(), &config).unwrap();
        assert_eq!(first, second);
    }
}
