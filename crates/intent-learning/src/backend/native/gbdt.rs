//! Gradient boosted regression trees.
//!
//! Squared-error boosting: the model starts at the label mean and each round
//! fits one tree to the current gradients (`prediction - target`, unit
//! hessians). Trees grow leaf-wise: the leaf whose best split gains the most is
//! split next, until `num_leaves` is reached or no split gains anything.
//!
//! Leaf outputs are `-T(G, l1) / (H + l2)` scaled by the learning rate, where
//! `T` soft-thresholds the gradient sum. Missing values (and zeros, when
//! `use_zero_as_missing_value` is set) always go to the left child.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{IntentError, Result};
use crate::pipeline::GradientBoostOptions;

/// How missing feature values are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingPolicy {
    handle_missing: bool,
    zero_as_missing: bool,
}

impl MissingPolicy {
    fn from_options(options: &GradientBoostOptions) -> Self {
        Self {
            handle_missing: options.handle_missing_value,
            zero_as_missing: options.use_zero_as_missing_value,
        }
    }

    /// `None` means "missing": routed left.
    fn resolve(&self, value: f32) -> Option<f32> {
        let missing = value.is_nan() || (self.zero_as_missing && value == 0.0);
        match (missing, self.handle_missing) {
            (false, _) => Some(value),
            (true, true) => None,
            (true, false) if value.is_nan() => Some(0.0),
            (true, false) => Some(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TreeNode {
    Leaf {
        value: f32,
    },
    Split {
        feature: usize,
        threshold: f32,
        left: usize,
        right: usize,
    },
}

/// One regression tree; node 0 is the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<TreeNode>,
}

impl RegressionTree {
    fn evaluate(&self, row: &[f32], missing: MissingPolicy) -> f32 {
        let mut idx = 0usize;
        loop {
            match self.nodes.get(idx) {
                Some(TreeNode::Leaf { value }) => return *value,
                Some(TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    let value = row.get(*feature).copied().unwrap_or(f32::NAN);
                    idx = match missing.resolve(value) {
                        None => *left,
                        Some(v) if v <= *threshold => *left,
                        Some(_) => *right,
                    };
                }
                None => return 0.0,
            }
        }
    }

    pub fn leaf_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, TreeNode::Leaf { .. }))
            .count()
    }
}

/// A fitted boosted ensemble.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostedTrees {
    bias: f32,
    trees: Vec<RegressionTree>,
    feature_count: usize,
    missing: MissingPolicy,
}

impl BoostedTrees {
    /// Fit on dense `rows` against regression `targets`.
    pub fn fit(rows: &[Vec<f32>], targets: &[f32], options: &GradientBoostOptions) -> Result<Self> {
        let Some(first) = rows.first() else {
            return Err(IntentError::TrainingFailed(
                "gradient boosting needs at least one row".to_string(),
            ));
        };
        let feature_count = first.len();

        if rows.len() != targets.len() {
            return Err(IntentError::TrainingFailed(format!(
                "{} feature rows but {} labels",
                rows.len(),
                targets.len()
            )));
        }
        if let Some(row) = rows.iter().find(|r| r.len() != feature_count) {
            return Err(IntentError::TrainingFailed(format!(
                "feature vectors differ in width ({} vs {})",
                feature_count,
                row.len()
            )));
        }
        if targets.iter().any(|t| !t.is_finite()) {
            return Err(IntentError::TrainingFailed(
                "labels must be finite numbers".to_string(),
            ));
        }

        let bias = (targets.iter().map(|&t| f64::from(t)).sum::<f64>() / targets.len() as f64) as f32;
        let missing = MissingPolicy::from_options(options);
        let mut predictions = vec![bias; rows.len()];
        let mut trees = Vec::with_capacity(options.num_iterations as usize);

        for round in 0..options.num_iterations {
            let gradients: Vec<f64> = predictions
                .iter()
                .zip(targets)
                .map(|(p, t)| f64::from(p - t))
                .collect();

            let tree = TreeBuilder {
                rows,
                gradients: &gradients,
                options,
                missing,
            }
            .build();

            for (prediction, row) in predictions.iter_mut().zip(rows) {
                *prediction += tree.evaluate(row, missing);
            }

            let stalled = tree.leaf_count() == 1;
            trees.push(tree);

            // No split gains anything any more; later rounds would only nudge
            // the constant.
            if stalled {
                debug!("Boosting stalled after {} round(s)", round + 1);
                break;
            }
        }

        debug!(
            "Fitted {} tree(s) on {} rows x {} features (bias {:.4})",
            trees.len(),
            rows.len(),
            feature_count,
            bias
        );

        Ok(Self {
            bias,
            trees,
            feature_count,
            missing,
        })
    }

    pub fn predict(&self, row: &[f32]) -> f32 {
        self.bias
            + self
                .trees
                .iter()
                .map(|t| t.evaluate(row, self.missing))
                .sum::<f32>()
    }

    pub fn feature_count(&self) -> usize {
        self.feature_count
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }
}

struct SplitCandidate {
    feature: usize,
    threshold: f32,
    gain: f64,
    left: Vec<usize>,
    right: Vec<usize>,
}

struct OpenLeaf {
    node: usize,
    split: Option<SplitCandidate>,
}

struct TreeBuilder<'a> {
    rows: &'a [Vec<f32>],
    gradients: &'a [f64],
    options: &'a GradientBoostOptions,
    missing: MissingPolicy,
}

impl TreeBuilder<'_> {
    fn build(&self) -> RegressionTree {
        let root: Vec<usize> = (0..self.rows.len()).collect();
        let mut nodes = vec![TreeNode::Leaf {
            value: self.leaf_value(&root),
        }];
        let mut open = vec![OpenLeaf {
            node: 0,
            split: self.find_best_split(&root),
        }];
        let mut leaves = 1usize;

        while leaves < self.options.num_leaves as usize {
            let mut best: Option<(usize, f64)> = None;
            for (i, leaf) in open.iter().enumerate() {
                let Some(split) = &leaf.split else { continue };
                if best.is_none_or(|(_, gain)| split.gain > gain) {
                    best = Some((i, split.gain));
                }
            }
            let Some((chosen, _)) = best else { break };

            let leaf = open.remove(chosen);
            let Some(split) = leaf.split else { break };

            let left = nodes.len();
            nodes.push(TreeNode::Leaf {
                value: self.leaf_value(&split.left),
            });
            let right = nodes.len();
            nodes.push(TreeNode::Leaf {
                value: self.leaf_value(&split.right),
            });
            nodes[leaf.node] = TreeNode::Split {
                feature: split.feature,
                threshold: split.threshold,
                left,
                right,
            };

            open.push(OpenLeaf {
                node: left,
                split: self.find_best_split(&split.left),
            });
            open.push(OpenLeaf {
                node: right,
                split: self.find_best_split(&split.right),
            });
            leaves += 1;
        }

        RegressionTree { nodes }
    }

    fn gradient_sum(&self, indices: &[usize]) -> f64 {
        indices.iter().map(|&i| self.gradients[i]).sum()
    }

    fn leaf_value(&self, indices: &[usize]) -> f32 {
        let g = soft_threshold(self.gradient_sum(indices), f64::from(self.options.l1_regularization));
        let h = indices.len() as f64 + f64::from(self.options.l2_regularization);
        if h <= 0.0 {
            return 0.0;
        }
        (-g / h * f64::from(self.options.learning_rate)) as f32
    }

    fn leaf_gain(&self, g: f64, h: f64) -> f64 {
        let t = soft_threshold(g, f64::from(self.options.l1_regularization));
        let denom = h + f64::from(self.options.l2_regularization);
        if denom <= 0.0 { 0.0 } else { t * t / denom }
    }

    fn find_best_split(&self, indices: &[usize]) -> Option<SplitCandidate> {
        let min_leaf = (self.options.min_examples_per_leaf as usize).max(1);
        if indices.len() < 2 * min_leaf {
            return None;
        }

        let feature_count = self.rows.first().map_or(0, Vec::len);
        let total_g = self.gradient_sum(indices);
        let total_h = indices.len() as f64;
        let parent_gain = self.leaf_gain(total_g, total_h);

        let mut best: Option<(usize, f32, f64)> = None;

        for feature in 0..feature_count {
            let mut missing_g = 0.0;
            let mut missing_count = 0usize;
            let mut present: Vec<(f32, usize)> = Vec::with_capacity(indices.len());

            for &i in indices {
                match self.missing.resolve(self.rows[i][feature]) {
                    None => {
                        missing_g += self.gradients[i];
                        missing_count += 1;
                    }
                    Some(v) => present.push((v, i)),
                }
            }
            present.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut left_g = missing_g;
            for k in 0..present.len().saturating_sub(1) {
                left_g += self.gradients[present[k].1];
                let (here, next) = (present[k].0, present[k + 1].0);
                if here == next {
                    continue;
                }

                let left_count = missing_count + k + 1;
                let right_count = indices.len() - left_count;
                if left_count < min_leaf || right_count < min_leaf {
                    continue;
                }

                let gain = self.leaf_gain(left_g, left_count as f64)
                    + self.leaf_gain(total_g - left_g, right_count as f64)
                    - parent_gain;

                if gain > 1e-12 && best.is_none_or(|(_, _, g)| gain > g) {
                    let mid = here + (next - here) / 2.0;
                    let threshold = if mid < next { mid } else { here };
                    best = Some((feature, threshold, gain));
                }
            }
        }

        let (feature, threshold, gain) = best?;
        let (left, right) = indices.iter().copied().partition(|&i| {
            match self.missing.resolve(self.rows[i][feature]) {
                None => true,
                Some(v) => v <= threshold,
            }
        });

        Some(SplitCandidate {
            feature,
            threshold,
            gain,
            left,
            right,
        })
    }
}

fn soft_threshold(g: f64, l1: f64) -> f64 {
    if l1 <= 0.0 {
        return g;
    }
    g.signum() * (g.abs() - l1).max(0.0)
}
