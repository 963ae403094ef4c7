//! CART regression tree grown by variance reduction

use ndarray::{ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// Smallest squared-error reduction accepted for a split
const MIN_IMPURITY_DECREASE: f64 = 1e-18;

/// Regression tree configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeConfig {
    /// Maximum depth of tree (None = grow until leaves are pure or too small)
    pub max_depth: Option<usize>,
    /// Minimum samples required to split an internal node
    pub min_samples_split: usize,
    /// Minimum samples in each leaf
    pub min_samples_leaf: usize,
    /// Features considered per split (None = all)
    pub max_features: Option<usize>,
    /// Seed for feature subsampling
    pub seed: u64,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            seed: 42,
        }
    }
}

/// Tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    Leaf {
        value: f64,
        n_samples: usize,
    },
    Split {
        feature_idx: usize,
        threshold: f64,
        n_samples: usize,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

impl TreeNode {
    pub fn depth(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 1,
            TreeNode::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }

    pub fn n_leaves(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 1,
            TreeNode::Split { left, right, .. } => left.n_leaves() + right.n_leaves(),
        }
    }

    pub fn n_samples(&self) -> usize {
        match self {
            TreeNode::Leaf { n_samples, .. } | TreeNode::Split { n_samples, .. } => *n_samples,
        }
    }
}

/// Best split found for a node
struct SplitCandidate {
    feature_idx: usize,
    threshold: f64,
    gain: f64,
}

/// Regression tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    config: TreeConfig,
    root: Option<TreeNode>,
    feature_importances: Vec<f64>,
}

impl DecisionTree {
    pub fn new(config: TreeConfig) -> Self {
        Self {
            config,
            root: None,
            feature_importances: Vec::new(),
        }
    }

    /// Fits the tree on the rows of `x` listed in `indices` (duplicates allowed)
    ///
    /// Callers validate shapes; an empty index set leaves the tree unfitted.
    pub fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView1<f64>, indices: &[usize]) {
        self.feature_importances = vec![0.0; x.ncols()];
        if indices.is_empty() {
            self.root = None;
            return;
        }

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut indices = indices.to_vec();
        let root = self.build_tree(x, y, &mut indices, 0, &mut rng);
        self.root = Some(root);

        let sum: f64 = self.feature_importances.iter().sum();
        if sum > 0.0 {
            for imp in &mut self.feature_importances {
                *imp /= sum;
            }
        }
    }

    fn build_tree(
        &mut self,
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
        indices: &mut [usize],
        depth: usize,
        rng: &mut StdRng,
    ) -> TreeNode {
        let n = indices.len();
        let value = indices.iter().map(|&i| y[i]).sum::<f64>() / n as f64;
        let sse: f64 = indices.iter().map(|&i| (y[i] - value).powi(2)).sum();

        let depth_reached = self.config.max_depth.is_some_and(|max| depth >= max);
        if depth_reached
            || n < self.config.min_samples_split
            || n < 2 * self.config.min_samples_leaf
            || sse <= MIN_IMPURITY_DECREASE
        {
            return TreeNode::Leaf {
                value,
                n_samples: n,
            };
        }

        let Some(best) = self.find_best_split(x, y, indices, sse, rng) else {
            return TreeNode::Leaf {
                value,
                n_samples: n,
            };
        };

        // Partition in place: rows at or below the threshold first
        let mut boundary = 0;
        for k in 0..n {
            if x[[indices[k], best.feature_idx]] <= best.threshold {
                indices.swap(k, boundary);
                boundary += 1;
            }
        }
        if boundary == 0 || boundary == n {
            return TreeNode::Leaf {
                value,
                n_samples: n,
            };
        }
        self.feature_importances[best.feature_idx] += best.gain;
        let (left_idx, right_idx) = indices.split_at_mut(boundary);

        let left = self.build_tree(x, y, left_idx, depth + 1, rng);
        let right = self.build_tree(x, y, right_idx, depth + 1, rng);

        TreeNode::Split {
            feature_idx: best.feature_idx,
            threshold: best.threshold,
            n_samples: n,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Sorted sweep over each candidate feature, minimising the summed
    /// squared error of the two children
    fn find_best_split(
        &self,
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
        indices: &[usize],
        parent_sse: f64,
        rng: &mut StdRng,
    ) -> Option<SplitCandidate> {
        let n_features = x.ncols();
        let max_features = self
            .config
            .max_features
            .unwrap_or(n_features)
            .clamp(1, n_features);

        let mut feature_indices: Vec<usize> = (0..n_features).collect();
        if max_features < n_features {
            feature_indices.shuffle(rng);
            feature_indices.truncate(max_features);
        }

        let n = indices.len();
        let min_leaf = self.config.min_samples_leaf.max(1);
        let mut best: Option<SplitCandidate> = None;
        let mut pairs: Vec<(f64, f64)> = Vec::with_capacity(n);

        for &feature_idx in &feature_indices {
            pairs.clear();
            pairs.extend(indices.iter().map(|&i| (x[[i, feature_idx]], y[i])));
            pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

            let total_sum: f64 = pairs.iter().map(|p| p.1).sum();
            let total_sq: f64 = pairs.iter().map(|p| p.1 * p.1).sum();

            let mut left_sum = 0.0;
            let mut left_sq = 0.0;
            for k in 1..n {
                let (prev_value, prev_label) = pairs[k - 1];
                left_sum += prev_label;
                left_sq += prev_label * prev_label;

                if k < min_leaf || n - k < min_leaf || pairs[k].0 <= prev_value {
                    continue;
                }

                let n_left = k as f64;
                let n_right = (n - k) as f64;
                let right_sum = total_sum - left_sum;
                let right_sq = total_sq - left_sq;
                let child_sse = (left_sq - left_sum * left_sum / n_left)
                    + (right_sq - right_sum * right_sum / n_right);
                let gain = parent_sse - child_sse;

                if gain > MIN_IMPURITY_DECREASE && best.as_ref().map_or(true, |b| gain > b.gain) {
                    let midpoint = (prev_value + pairs[k].0) / 2.0;
                    best = Some(SplitCandidate {
                        feature_idx,
                        threshold: if midpoint < pairs[k].0 { midpoint } else { prev_value },
                        gain,
                    });
                }
            }
        }

        best
    }

    /// Predicts a single row; an unfitted tree predicts 0
    pub fn predict_one(&self, features: ArrayView1<f64>) -> f64 {
        let mut node = match &self.root {
            Some(node) => node,
            None => return 0.0,
        };
        loop {
            match node {
                TreeNode::Leaf { value, .. } => return *value,
                TreeNode::Split {
                    feature_idx,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    node = if features[*feature_idx] <= *threshold {
                        left
                    } else {
                        right
                    };
                }
            }
        }
    }

    /// Impurity decrease per feature, normalised to sum to 1
    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }

    pub fn root(&self) -> Option<&TreeNode> {
        self.root.as_ref()
    }
}
