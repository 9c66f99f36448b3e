use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::data::MatchRecord;
use crate::error::{PredictorError, Result};

use super::encoder::{CategoryField, EncoderBank, UnknownCategoryPolicy};
use super::features::{self, FeatureSchema, MatchView};
use super::forest::RandomForest;
use super::metrics::{rank_importances, EvaluationReport};
use super::scaler::StandardScaler;
use super::search::{GridSearch, ParamGrid};

#[derive(Debug, Clone)]
pub struct TrainingConfig {
    pub grid: ParamGrid,
    pub cv_folds: usize,
    /// Share of records held out for evaluation.
    pub test_fraction: f64,
    pub seed: u64,
    pub unknown_policy: UnknownCategoryPolicy,
    /// Wall-clock budget for the grid search; best-so-far wins when it runs out.
    pub search_budget: Option<Duration>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            grid: ParamGrid::default(),
            cv_folds: 5,
            test_fraction: 0.2,
            seed: 42,
            unknown_policy: UnknownCategoryPolicy::default(),
            search_budget: None,
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(PredictorError::validation(format!(
                "test_fraction must be in (0, 1), got {}",
                self.test_fraction
            )));
        }
        if self.cv_folds < 2 {
            return Err(PredictorError::validation("cv_folds must be at least 2"));
        }
        self.grid.validate()
    }
}

/// Encoders, scaler and forest fitted together. They are only valid as a
/// unit, so the fields stay private and the model is immutable once built.
#[derive(Debug, Clone)]
pub struct TrainedModel {
    encoders: EncoderBank,
    scaler: StandardScaler,
    forest: RandomForest,
    schema: FeatureSchema,
    trained_at: DateTime<Utc>,
}

/// Model output for one match.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchScore {
    /// P(team1 wins).
    pub team1_win: f64,
    /// Categorical inputs that were resolved by the unknown-category policy.
    pub unknown_categories: usize,
}

impl TrainedModel {
    pub fn schema(&self) -> FeatureSchema {
        self.schema
    }

    #[cfg(test)]
    pub fn forest(&self) -> &RandomForest {
        &self.forest
    }

    pub fn trained_at(&self) -> DateTime<Utc> {
        self.trained_at
    }

    /// Score one match. The vector width is checked against the training
    /// schema before scaling.
    pub fn score(&self, view: MatchView<'_>) -> Result<MatchScore> {
        let fv = features::build(view, &self.encoders)?;
        if fv.values.len() != self.schema.width() {
            return Err(PredictorError::SchemaMismatch {
                expected: self.schema.width(),
                actual: fv.values.len(),
            });
        }
        let scaled = self.scaler.transform_row(&fv.values)?;
        Ok(MatchScore {
            team1_win: self.forest.predict_proba(&scaled)?,
            unknown_categories: fv.unknown_categories,
        })
    }
}

/// Split indices into (train, test), keeping both classes in proportion.
/// Both lists come back sorted.
pub fn stratified_split(labels: &[u8], test_fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let n = labels.len();
    if n < 2 {
        return ((0..n).collect(), Vec::new());
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let mut by_class: [Vec<usize>; 2] = [Vec::new(), Vec::new()];
    for (i, &y) in labels.iter().enumerate() {
        by_class[usize::from(y == 1)].push(i);
    }
    for members in by_class.iter_mut() {
        members.shuffle(&mut rng);
    }

    let n_test = ((n as f64 * test_fraction).ceil() as usize).clamp(1, n - 1);
    let exact: Vec<f64> = by_class
        .iter()
        .map(|c| c.len() as f64 * n_test as f64 / n as f64)
        .collect();
    let mut take: Vec<usize> = exact.iter().map(|e| e.floor() as usize).collect();
    let mut remaining = n_test.saturating_sub(take.iter().sum());

    // Hand leftover test slots to the class with the larger fractional share.
    let mut order = [0usize, 1];
    order.sort_by(|&a, &b| (exact[b] - exact[b].floor()).total_cmp(&(exact[a] - exact[a].floor())));
    for c in order {
        if remaining > 0 && take[c] < by_class[c].len() {
            take[c] += 1;
            remaining -= 1;
        }
    }

    let mut train = Vec::with_capacity(n - n_test);
    let mut test = Vec::with_capacity(n_test);
    for (c, members) in by_class.iter().enumerate() {
        test.extend_from_slice(&members[..take[c]]);
        train.extend_from_slice(&members[take[c]..]);
    }
    train.sort_unstable();
    test.sort_unstable();
    (train, test)
}

/// Fit the full encoder → scaler → forest chain and evaluate it on a
/// stratified held-out split.
///
/// Vocabularies and the scaler are fit on all records before the split, so
/// the held-out score measures classifier generalization only; encoder and
/// scaler statistics have seen the evaluation rows.
pub fn train(records: &[MatchRecord], config: &TrainingConfig) -> Result<(TrainedModel, EvaluationReport)> {
    config.validate()?;
    if records.is_empty() {
        return Err(PredictorError::insufficient("no match records"));
    }

    let labels: Vec<u8> = records.iter().map(MatchRecord::label).collect::<Result<_>>()?;
    let team1_wins = labels.iter().filter(|&&y| y == 1).count();
    if team1_wins == 0 || team1_wins == labels.len() {
        return Err(PredictorError::insufficient(format!(
            "all {} records have the same outcome; both a team1 win and a team2 win are required",
            labels.len()
        )));
    }

    let encoders = EncoderBank::fit(records, config.unknown_policy)?;
    info!(
        "Vocabularies: {} teams, {} cities, {} venues",
        encoders.vocabulary(CategoryField::Team).len(),
        encoders.vocabulary(CategoryField::City).len(),
        encoders.vocabulary(CategoryField::Venue).len()
    );
    let matrix = features::build_training_matrix(records, &encoders)?;
    if matrix.unknown_categories > 0 {
        warn!(
            "{} training values fell outside the team vocabulary and were encoded via {:?}",
            matrix.unknown_categories, config.unknown_policy
        );
    }
    let scaler = StandardScaler::fit(&matrix.rows)?;
    let scaled = scaler.transform(&matrix.rows)?;

    let (train_idx, test_idx) = stratified_split(&matrix.labels, config.test_fraction, config.seed);
    let pick = |idx: &[usize]| -> (Vec<Vec<f64>>, Vec<u8>) {
        idx.iter()
            .map(|&i| (scaled[i].clone(), matrix.labels[i]))
            .unzip()
    };
    let (train_rows, train_labels) = pick(&train_idx);
    let (test_rows, test_labels) = pick(&test_idx);
    info!(
        "Training on {} records ({} features, {:?}): {} train / {} held out",
        records.len(),
        matrix.schema.width(),
        matrix.schema,
        train_rows.len(),
        test_rows.len()
    );

    let search = GridSearch {
        grid: config.grid.clone(),
        folds: config.cv_folds,
        seed: config.seed,
        deadline: config.search_budget.map(|b| Instant::now() + b),
    }
    .run(&train_rows, &train_labels)?;

    let forest = RandomForest::fit(&train_rows, &train_labels, search.best, config.seed)?;

    let scores: Vec<f64> = test_rows
        .iter()
        .map(|r| forest.predict_proba(r))
        .collect::<Result<_>>()?;
    let importances = rank_importances(
        &FeatureSchema::all_names(),
        &matrix.schema.names(),
        forest.feature_importances(),
    );
    let report = EvaluationReport::build(&test_labels, &scores, importances, &search, train_rows.len());
    info!("Held-out accuracy {:.4} on {} matches", report.accuracy, report.test_size);

    let model = TrainedModel {
        encoders,
        scaler,
        forest,
        schema: matrix.schema,
        trained_at: Utc::now(),
    };
    Ok((model, report))
}
