//! Bagged ensemble of regression trees

use log::debug;
use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::step_2_decision_tree::{DecisionTree, TreeConfig};
use crate::error::{PipelineError, Result};

/// Features considered at each split
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MaxFeatures {
    All,
    Sqrt,
    Fraction(f64),
}

impl MaxFeatures {
    fn resolve(&self, n_features: usize) -> usize {
        let k = match self {
            MaxFeatures::All => n_features,
            MaxFeatures::Sqrt => (n_features as f64).sqrt().ceil() as usize,
            MaxFeatures::Fraction(f) => (n_features as f64 * f).ceil() as usize,
        };
        k.clamp(1, n_features.max(1))
    }
}

impl fmt::Display for MaxFeatures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaxFeatures::All => f.write_str("all"),
            MaxFeatures::Sqrt => f.write_str("sqrt"),
            MaxFeatures::Fraction(fraction) => write!(f, "{}", fraction),
        }
    }
}

/// Random forest configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestConfig {
    /// Number of trees in the forest
    pub n_estimators: usize,
    /// Maximum depth of each tree
    pub max_depth: Option<usize>,
    /// Minimum samples to split
    pub min_samples_split: usize,
    /// Minimum samples in leaf
    pub min_samples_leaf: usize,
    /// Features considered per split
    pub max_features: MaxFeatures,
    /// Bootstrap sampling
    pub bootstrap: bool,
    /// Random seed
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::All,
            bootstrap: true,
            seed: 42,
        }
    }
}

/// Random forest regressor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    config: ForestConfig,
    trees: Vec<DecisionTree>,
    feature_importances: Vec<f64>,
}

/// Rejects inputs no model can be fitted on
fn validate_training_data(x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<()> {
    if x.nrows() == 0 {
        return Err(PipelineError::Fitting("training segment is empty".into()));
    }
    if x.ncols() == 0 {
        return Err(PipelineError::Fitting("no feature columns".into()));
    }
    if x.nrows() != y.len() {
        return Err(PipelineError::Fitting(format!(
            "feature rows ({}) and targets ({}) differ",
            x.nrows(),
            y.len()
        )));
    }
    if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
        return Err(PipelineError::Fitting("training data contains non-finite values".into()));
    }
    let first = y[0];
    if y.iter().all(|v| *v == first) {
        return Err(PipelineError::Fitting("target has zero variance".into()));
    }
    Ok(())
}

impl RandomForest {
    pub fn new(config: ForestConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            feature_importances: Vec::new(),
        }
    }

    /// Fits the forest; trees are grown in parallel and kept in index order,
    /// so the result depends only on the seed
    pub fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<()> {
        validate_training_data(x, y)?;
        if self.config.n_estimators == 0 {
            return Err(PipelineError::InvalidConfig("n_estimators must be positive".into()));
        }

        let n_samples = x.nrows();
        let n_features = x.ncols();
        let max_features = self.config.max_features.resolve(n_features);

        let trees: Vec<DecisionTree> = (0..self.config.n_estimators)
            .into_par_iter()
            .map(|i| {
                let tree_seed = self.config.seed.wrapping_add(i as u64);
                let tree_config = TreeConfig {
                    max_depth: self.config.max_depth,
                    min_samples_split: self.config.min_samples_split,
                    min_samples_leaf: self.config.min_samples_leaf,
                    max_features: Some(max_features),
                    seed: tree_seed,
                };

                let indices = if self.config.bootstrap {
                    bootstrap_indices(n_samples, tree_seed)
                } else {
                    (0..n_samples).collect()
                };

                let mut tree = DecisionTree::new(tree_config);
                tree.fit(x, y, &indices);
                tree
            })
            .collect();

        self.trees = trees;

        // Aggregate feature importances
        self.feature_importances = vec![0.0; n_features];
        for tree in &self.trees {
            for (i, &imp) in tree.feature_importances().iter().enumerate() {
                self.feature_importances[i] += imp;
            }
        }
        let sum: f64 = self.feature_importances.iter().sum();
        if sum > 0.0 {
            for imp in &mut self.feature_importances {
                *imp /= sum;
            }
        }

        debug!(
            "Fitted {} trees on {} rows x {} features",
            self.trees.len(),
            n_samples,
            n_features
        );
        Ok(())
    }

    /// Mean prediction of all trees for one row
    pub fn predict_one(&self, features: ArrayView1<f64>) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        let total: f64 = self.trees.iter().map(|t| t.predict_one(features)).sum();
        total / self.trees.len() as f64
    }

    /// Predicts every row of `x`
    pub fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        if !self.trees.is_empty() && x.ncols() != self.feature_importances.len() {
            return Err(PipelineError::Fitting(format!(
                "model expects {} features, got {}",
                self.feature_importances.len(),
                x.ncols()
            )));
        }
        let predictions: Vec<f64> = (0..x.nrows())
            .into_par_iter()
            .map(|i| self.predict_one(x.row(i)))
            .collect();
        Ok(Array1::from_vec(predictions))
    }

    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }

    /// Feature names paired with importances, most important first
    pub fn feature_importance_ranking<'a>(&self, feature_names: &'a [String]) -> Vec<(&'a str, f64)> {
        let mut ranking: Vec<(&str, f64)> = feature_names
            .iter()
            .zip(self.feature_importances.iter())
            .map(|(n, &i)| (n.as_str(), i))
            .collect();
        ranking.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranking
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

/// Draws `n` row indices with replacement
fn bootstrap_indices(n: usize, seed: u64) -> Vec<usize> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n).map(|_| rng.random_range(0..n)).collect()
}
