//! Random forest of CART trees for the binary "did team1 win" label.
//!
//! Trees are grown on bootstrap samples with Gini impurity, a random subset
//! of `sqrt(n_features)` candidate features per split, and the usual
//! depth / split-size / leaf-size limits. Each tree has its own seeded RNG so
//! a forest is reproducible regardless of how rayon schedules the work.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{PredictorError, Result};

/// Tree-ensemble hyperparameters searched by the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HyperParams {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
}

impl Default for HyperParams {
    fn default() -> Self {
        HyperParams {
            n_estimators: 200,
            max_depth: 10,
            min_samples_split: 5,
            min_samples_leaf: 2,
        }
    }
}

impl HyperParams {
    pub fn validate(&self) -> Result<()> {
        if self.n_estimators == 0 {
            return Err(PredictorError::validation("n_estimators must be at least 1"));
        }
        if self.min_samples_split < 2 {
            return Err(PredictorError::validation("min_samples_split must be at least 2"));
        }
        if self.min_samples_leaf == 0 {
            return Err(PredictorError::validation("min_samples_leaf must be at least 1"));
        }
        Ok(())
    }
}

impl fmt::Display for HyperParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "n_estimators={} max_depth={} min_samples_split={} min_samples_leaf={}",
            self.n_estimators, self.max_depth, self.min_samples_split, self.min_samples_leaf
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    /// Fraction of class-1 samples that reached this leaf.
    Leaf { p_one: f64 },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecisionTree {
    nodes: Vec<Node>,
}

impl DecisionTree {
    pub fn predict_proba(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { p_one } => return *p_one,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    #[cfg(test)]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

/// Gini impurity of a binary node with `ones` positives out of `n`.
fn gini(ones: usize, n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let p = ones as f64 / n as f64;
    2.0 * p * (1.0 - p)
}

struct SplitChoice {
    feature: usize,
    threshold: f64,
    /// Weighted impurity decrease: n·G(parent) − nL·G(left) − nR·G(right).
    decrease: f64,
}

struct TreeBuilder<'a> {
    rows: &'a [Vec<f64>],
    labels: &'a [u8],
    params: HyperParams,
    max_features: usize,
    rng: StdRng,
    nodes: Vec<Node>,
    importances: Vec<f64>,
}

impl<'a> TreeBuilder<'a> {
    fn grow(&mut self, samples: Vec<usize>, depth: usize) -> usize {
        let n = samples.len();
        let ones = samples.iter().filter(|&&i| self.labels[i] == 1).count();
        let leaf = Node::Leaf {
            p_one: if n == 0 { 0.5 } else { ones as f64 / n as f64 },
        };

        let stop = ones == 0
            || ones == n
            || depth >= self.params.max_depth
            || n < self.params.min_samples_split
            || n < 2 * self.params.min_samples_leaf;
        let split = if stop { None } else { self.best_split(&samples, ones) };

        let idx = self.nodes.len();
        self.nodes.push(leaf);
        let Some(split) = split else {
            return idx;
        };

        self.importances[split.feature] += split.decrease;
        let (left, right): (Vec<usize>, Vec<usize>) = samples
            .into_iter()
            .partition(|&i| self.rows[i][split.feature] <= split.threshold);
        let left = self.grow(left, depth + 1);
        let right = self.grow(right, depth + 1);
        self.nodes[idx] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        idx
    }

    fn best_split(&mut self, samples: &[usize], ones: usize) -> Option<SplitChoice> {
        let n = samples.len();
        let width = self.rows[samples[0]].len();
        let parent = n as f64 * gini(ones, n);
        let min_leaf = self.params.min_samples_leaf;

        let candidates = rand::seq::index::sample(&mut self.rng, width, self.max_features);
        let mut best: Option<SplitChoice> = None;
        let mut best_impurity = f64::INFINITY;

        for feature in candidates.iter() {
            let mut column: Vec<(f64, u8)> = samples
                .iter()
                .map(|&i| (self.rows[i][feature], self.labels[i]))
                .collect();
            column.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut left_ones = 0usize;
            for i in 1..n {
                left_ones += column[i - 1].1 as usize;
                if column[i - 1].0 == column[i].0 || i < min_leaf || n - i < min_leaf {
                    continue;
                }
                let impurity =
                    i as f64 * gini(left_ones, i) + (n - i) as f64 * gini(ones - left_ones, n - i);
                if impurity < best_impurity {
                    best_impurity = impurity;
                    best = Some(SplitChoice {
                        feature,
                        threshold: (column[i - 1].0 + column[i].0) / 2.0,
                        decrease: (parent - impurity).max(0.0),
                    });
                }
            }
        }
        best
    }
}

fn normalize(values: &mut [f64]) {
    let total: f64 = values.iter().sum();
    if total > 0.0 {
        for v in values.iter_mut() {
            *v /= total;
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
    n_features: usize,
    importances: Vec<f64>,
}

impl RandomForest {
    /// Fit a forest on `rows` with binary `labels`. The same seed always
    /// yields the same forest.
    pub fn fit(rows: &[Vec<f64>], labels: &[u8], params: HyperParams, seed: u64) -> Result<Self> {
        params.validate()?;
        let first = rows
            .first()
            .ok_or_else(|| PredictorError::insufficient("cannot fit a forest on zero rows"))?;
        if rows.len() != labels.len() {
            return Err(PredictorError::validation(format!(
                "{} feature rows but {} labels",
                rows.len(),
                labels.len()
            )));
        }
        let n_features = first.len();
        if n_features == 0 {
            return Err(PredictorError::validation("feature rows are empty"));
        }
        if let Some(bad) = rows.iter().find(|r| r.len() != n_features) {
            return Err(PredictorError::SchemaMismatch {
                expected: n_features,
                actual: bad.len(),
            });
        }

        let n = rows.len();
        let max_features = ((n_features as f64).sqrt() as usize).max(1);

        let grown: Vec<(DecisionTree, Vec<f64>)> = (0..params.n_estimators)
            .into_par_iter()
            .map(|t| {
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(t as u64));
                let bootstrap: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                let mut builder = TreeBuilder {
                    rows,
                    labels,
                    params,
                    max_features,
                    rng,
                    nodes: Vec::new(),
                    importances: vec![0.0; n_features],
                };
                builder.grow(bootstrap, 0);
                normalize(&mut builder.importances);
                (DecisionTree { nodes: builder.nodes }, builder.importances)
            })
            .collect();

        let mut importances = vec![0.0; n_features];
        let mut trees = Vec::with_capacity(grown.len());
        for (tree, imp) in grown {
            for (acc, v) in importances.iter_mut().zip(&imp) {
                *acc += v;
            }
            trees.push(tree);
        }
        normalize(&mut importances);

        Ok(RandomForest {
            trees,
            n_features,
            importances,
        })
    }

    /// Probability of class 1 (team1 wins): mean of the trees' leaf frequencies.
    pub fn predict_proba(&self, row: &[f64]) -> Result<f64> {
        if row.len() != self.n_features {
            return Err(PredictorError::SchemaMismatch {
                expected: self.n_features,
                actual: row.len(),
            });
        }
        let sum: f64 = self.trees.iter().map(|t| t.predict_proba(row)).sum();
        Ok(sum / self.trees.len() as f64)
    }

    pub fn predict(&self, row: &[f64]) -> Result<u8> {
        Ok(u8::from(self.predict_proba(row)? > 0.5))
    }

    /// Mean decrease in impurity per feature, normalized to sum to 1
    /// (all zeros when no tree ever split).
    pub fn feature_importances(&self) -> &[f64] {
        &self.importances
    }

    #[cfg(test)]
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    #[cfg(test)]
    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Label is x0 >= 20; x1 is noise.
    fn threshold_data() -> (Vec<Vec<f64>>, Vec<u8>) {
        let rows: Vec<Vec<f64>> = (0..40)
            .map(|i| vec![i as f64, ((i * 7) % 5) as f64])
            .collect();
        let labels = (0..40).map(|i| u8::from(i >= 20)).collect();
        (rows, labels)
    }

    fn small() -> HyperParams {
        HyperParams {
            n_estimators: 25,
            max_depth: 5,
            min_samples_split: 2,
            min_samples_leaf: 1,
        }
    }

    #[test]
    fn gini_of_pure_and_balanced_nodes() {
        assert_relative_eq!(gini(0, 10), 0.0);
        assert_relative_eq!(gini(10, 10), 0.0);
        assert_relative_eq!(gini(5, 10), 0.5);
    }

    #[test]
    fn learns_a_threshold() {
        let (rows, labels) = threshold_data();
        let forest = RandomForest::fit(&rows, &labels, small(), 42).unwrap();
        assert!(forest.predict_proba(&[35.0, 1.0]).unwrap() > 0.7);
        assert!(forest.predict_proba(&[3.0, 1.0]).unwrap() < 0.3);
        assert_eq!(forest.predict(&[30.0, 4.0]).unwrap(), 1);
        assert_eq!(forest.trees().len(), 25);
    }

    #[test]
    fn importances_favor_the_informative_feature() {
        let (rows, labels) = threshold_data();
        let forest = RandomForest::fit(&rows, &labels, small(), 7).unwrap();
        let imp = forest.feature_importances();
        assert!(imp[0] > imp[1]);
        assert!(imp.iter().all(|v| *v >= 0.0));
        assert_relative_eq!(imp.iter().sum::<f64>(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn same_seed_same_forest() {
        let (rows, labels) = threshold_data();
        let a = RandomForest::fit(&rows, &labels, small(), 3).unwrap();
        let b = RandomForest::fit(&rows, &labels, small(), 3).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn single_sample_gives_a_constant_leaf() {
        let forest = RandomForest::fit(&[vec![1.0, 2.0]], &[1], small(), 0).unwrap();
        assert_eq!(forest.predict_proba(&[9.0, 9.0]).unwrap(), 1.0);
        assert!(forest.trees().iter().all(|t| t.node_count() == 1));
        assert!(forest.feature_importances().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn leaf_limits_are_respected() {
        let (rows, labels) = threshold_data();
        let params = HyperParams {
            n_estimators: 5,
            max_depth: 0,
            ..small()
        };
        let forest = RandomForest::fit(&rows, &labels, params, 1).unwrap();
        assert!(forest.trees().iter().all(|t| t.node_count() == 1));
    }

    #[test]
    fn wrong_width_is_schema_mismatch() {
        let (rows, labels) = threshold_data();
        let forest = RandomForest::fit(&rows, &labels, small(), 1).unwrap();
        assert_eq!(
            forest.predict_proba(&[1.0]),
            Err(PredictorError::SchemaMismatch { expected: 2, actual: 1 })
        );
    }

    #[test]
    fn invalid_params_are_rejected() {
        let (rows, labels) = threshold_data();
        let params = HyperParams {
            n_estimators: 0,
            ..small()
        };
        assert!(matches!(
            RandomForest::fit(&rows, &labels, params, 1),
            Err(PredictorError::Validation(_))
        ));
    }
}
