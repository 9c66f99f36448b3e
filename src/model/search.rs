//! Cross-validated grid search over forest hyperparameters.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{PredictorError, Result};

use super::forest::{HyperParams, RandomForest};

/// Candidate values per hyperparameter. Loaded from TOML or defaulted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamGrid {
    pub n_estimators: Vec<usize>,
    pub max_depth: Vec<usize>,
    pub min_samples_split: Vec<usize>,
    pub min_samples_leaf: Vec<usize>,
}

impl Default for ParamGrid {
    fn default() -> Self {
        ParamGrid {
            n_estimators: vec![100, 200, 300],
            max_depth: vec![5, 10, 15],
            min_samples_split: vec![2, 5, 10],
            min_samples_leaf: vec![1, 2, 4],
        }
    }
}

impl ParamGrid {
    /// A grid holding exactly one combination.
    #[cfg(test)]
    pub fn single(params: HyperParams) -> Self {
        ParamGrid {
            n_estimators: vec![params.n_estimators],
            max_depth: vec![params.max_depth],
            min_samples_split: vec![params.min_samples_split],
            min_samples_leaf: vec![params.min_samples_leaf],
        }
    }

    /// Cartesian product in fixed order: `n_estimators` outermost,
    /// `min_samples_leaf` innermost. This order is the tie-break order.
    pub fn candidates(&self) -> Vec<HyperParams> {
        let mut out = Vec::new();
        for &n_estimators in &self.n_estimators {
            for &max_depth in &self.max_depth {
                for &min_samples_split in &self.min_samples_split {
                    for &min_samples_leaf in &self.min_samples_leaf {
                        out.push(HyperParams {
                            n_estimators,
                            max_depth,
                            min_samples_split,
                            min_samples_leaf,
                        });
                    }
                }
            }
        }
        out
    }

    pub fn validate(&self) -> Result<()> {
        let candidates = self.candidates();
        if candidates.is_empty() {
            return Err(PredictorError::validation(
                "hyperparameter grid has an empty axis",
            ));
        }
        candidates.iter().try_for_each(HyperParams::validate)
    }
}

/// Assign each sample a fold so every fold sees each class in proportion.
/// The i-th sample of a class (in input order) goes to fold `i % k`.
pub fn stratified_folds(labels: &[u8], k: usize) -> Vec<usize> {
    let mut seen = [0usize; 2];
    labels
        .iter()
        .map(|&y| {
            let c = usize::from(y == 1);
            let fold = seen[c] % k;
            seen[c] += 1;
            fold
        })
        .collect()
}

/// Number of folds actually usable: no more than the smaller class count.
pub fn effective_folds(labels: &[u8], requested: usize) -> usize {
    let ones = labels.iter().filter(|&&y| y == 1).count();
    let zeros = labels.len() - ones;
    requested.min(ones).min(zeros)
}

/// Mean held-out accuracy of `params` over `k` stratified folds.
pub fn cross_val_accuracy(
    rows: &[Vec<f64>],
    labels: &[u8],
    params: HyperParams,
    k: usize,
    seed: u64,
) -> Result<f64> {
    if k < 2 {
        return Err(PredictorError::insufficient(format!(
            "cross-validation needs at least 2 folds, got {}",
            k
        )));
    }
    let folds = stratified_folds(labels, k);
    let mut total = 0.0;
    for fold in 0..k {
        let mut train_rows = Vec::new();
        let mut train_labels = Vec::new();
        let mut test = Vec::new();
        for (i, &f) in folds.iter().enumerate() {
            if f == fold {
                test.push(i);
            } else {
                train_rows.push(rows[i].clone());
                train_labels.push(labels[i]);
            }
        }
        let forest = RandomForest::fit(&train_rows, &train_labels, params, seed)?;
        let mut correct = 0usize;
        for &i in &test {
            if forest.predict(&rows[i])? == labels[i] {
                correct += 1;
            }
        }
        total += correct as f64 / test.len() as f64;
    }
    Ok(total / k as f64)
}

/// Outcome of one grid point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CandidateScore {
    pub params: HyperParams,
    /// `None` when the deadline passed before this candidate started.
    pub cv_accuracy: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchOutcome {
    pub best: HyperParams,
    /// `None` when no candidate could be cross-validated.
    pub best_cv_accuracy: Option<f64>,
    pub folds: usize,
    pub scores: Vec<CandidateScore>,
}

#[derive(Debug, Clone)]
pub struct GridSearch {
    pub grid: ParamGrid,
    pub folds: usize,
    pub seed: u64,
    /// Candidates not yet started when this instant passes are skipped.
    pub deadline: Option<Instant>,
}

impl GridSearch {
    /// Evaluate every grid point (in parallel, each against the same
    /// read-only split) and keep the highest CV accuracy. Ties go to the
    /// earliest candidate in grid order.
    pub fn run(&self, rows: &[Vec<f64>], labels: &[u8]) -> Result<SearchOutcome> {
        self.grid.validate()?;
        let candidates = self.grid.candidates();
        let folds = effective_folds(labels, self.folds);

        if folds < 2 {
            warn!(
                "Only {} usable CV fold(s) for {} training rows; using first grid candidate {}",
                folds,
                labels.len(),
                candidates[0]
            );
            return Ok(SearchOutcome {
                best: candidates[0],
                best_cv_accuracy: None,
                folds,
                scores: candidates
                    .into_iter()
                    .map(|params| CandidateScore {
                        params,
                        cv_accuracy: None,
                    })
                    .collect(),
            });
        }
        if folds < self.folds {
            warn!("Reducing CV folds from {} to {} (smallest class size)", self.folds, folds);
        }

        info!(
            "Grid search: {} candidates x {} folds on {} rows",
            candidates.len(),
            folds,
            rows.len()
        );

        let scores: Vec<CandidateScore> = candidates
            .par_iter()
            .map(|&params| -> Result<CandidateScore> {
                if self.deadline.is_some_and(|d| Instant::now() >= d) {
                    return Ok(CandidateScore {
                        params,
                        cv_accuracy: None,
                    });
                }
                let acc = cross_val_accuracy(rows, labels, params, folds, self.seed)?;
                debug!("CV accuracy {:.4} for {}", acc, params);
                Ok(CandidateScore {
                    params,
                    cv_accuracy: Some(acc),
                })
            })
            .collect::<Result<_>>()?;

        let mut best: Option<(HyperParams, f64)> = None;
        for s in &scores {
            if let Some(acc) = s.cv_accuracy {
                if best.map_or(true, |(_, b)| acc > b) {
                    best = Some((s.params, acc));
                }
            }
        }

        let skipped = scores.iter().filter(|s| s.cv_accuracy.is_none()).count();
        if skipped > 0 {
            warn!("Search deadline reached: {} of {} candidates skipped", skipped, scores.len());
        }

        let (best, best_cv_accuracy) = match best {
            Some((p, acc)) => (p, Some(acc)),
            None => (candidates[0], None),
        };
        info!("Best hyperparameters: {} (cv accuracy {:?})", best, best_cv_accuracy);

        Ok(SearchOutcome {
            best,
            best_cv_accuracy,
            folds,
            scores,
        })
    }
}
