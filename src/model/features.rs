//! Feature vector construction.
//!
//! The column order defined here is the single schema shared by training and
//! inference. Everything downstream (scaler, forest, importances) indexes
//! columns by position, so the order must never depend on the call site.

use serde::Serialize;

use crate::data::{InningsTarget, MatchRecord};
use crate::error::{PredictorError, Result};

use super::encoder::{CategoryField, EncoderBank};

/// Columns present in every feature vector, in order.
pub const BASE_FEATURES: [&str; 10] = [
    "team1_encoded",
    "team2_encoded",
    "city_encoded",
    "venue_encoded",
    "toss_winner_encoded",
    "toss_decision_encoded",
    "is_toss_winner_team1",
    "is_batting_first",
    "team1_batting_first",
    "team2_batting_first",
];

/// Optional in-match columns, appended after the base block.
pub const INNINGS_FEATURES: [&str; 2] = ["target_runs", "target_overs"];

/// Which columns a batch carries. Decided once per fit/predict call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureSchema {
    Base,
    WithInningsTarget,
}

impl FeatureSchema {
    pub fn width(&self) -> usize {
        match self {
            FeatureSchema::Base => BASE_FEATURES.len(),
            FeatureSchema::WithInningsTarget => BASE_FEATURES.len() + INNINGS_FEATURES.len(),
        }
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names = BASE_FEATURES.to_vec();
        if *self == FeatureSchema::WithInningsTarget {
            names.extend(INNINGS_FEATURES);
        }
        names
    }

    /// All reportable feature names, whether or not this schema uses them.
    pub fn all_names() -> Vec<&'static str> {
        FeatureSchema::WithInningsTarget.names()
    }

    pub fn for_target(target: Option<&InningsTarget>) -> Self {
        if target.is_some() {
            FeatureSchema::WithInningsTarget
        } else {
            FeatureSchema::Base
        }
    }

    /// Schema of a batch. Mixing rows with and without in-match numbers is
    /// rejected rather than padded.
    pub fn for_batch(records: &[MatchRecord]) -> Result<Self> {
        let first = records
            .first()
            .map(|r| FeatureSchema::for_target(r.target.as_ref()))
            .ok_or_else(|| PredictorError::insufficient("no match records"))?;
        if let Some((i, _)) = records
            .iter()
            .enumerate()
            .find(|(_, r)| FeatureSchema::for_target(r.target.as_ref()) != first)
        {
            return Err(PredictorError::validation(format!(
                "record {} {} target_runs/target_overs while record 0 {}; \
                 a batch must use one feature schema",
                i,
                if first == FeatureSchema::Base { "has" } else { "lacks" },
                if first == FeatureSchema::Base { "does not" } else { "does" },
            )));
        }
        Ok(first)
    }
}

/// Borrowed view of the fields the builder reads. Lets fully validated
/// training records and partially filled prediction requests share one
/// code path.
#[derive(Debug, Clone, Copy)]
pub struct MatchView<'a> {
    pub team1: &'a str,
    pub team2: &'a str,
    pub city: &'a str,
    pub venue: &'a str,
    pub toss_winner: &'a str,
    pub toss_decision: &'a str,
    pub target: Option<InningsTarget>,
}

impl<'a> From<&'a MatchRecord> for MatchView<'a> {
    fn from(r: &'a MatchRecord) -> Self {
        MatchView {
            team1: &r.team1,
            team2: &r.team2,
            city: &r.city,
            venue: &r.venue,
            toss_winner: &r.toss_winner,
            toss_decision: r.toss_decision.as_str(),
            target: r.target,
        }
    }
}

/// Fixed-order numeric representation of one match.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    pub values: Vec<f64>,
    /// Number of categorical values that went through the fallback policy.
    pub unknown_categories: usize,
}

fn flag(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

/// Build the feature vector for one match.
pub fn build(view: MatchView<'_>, encoders: &EncoderBank) -> Result<FeatureVector> {
    let mut unknown = 0usize;
    let mut code = |field: CategoryField, value: &str| -> Result<f64> {
        let enc = encoders.encode(field, value)?;
        if enc.fallback {
            unknown += 1;
        }
        Ok(enc.code as f64)
    };

    let mut values = vec![
        code(CategoryField::Team, view.team1)?,
        code(CategoryField::Team, view.team2)?,
        code(CategoryField::City, view.city)?,
        code(CategoryField::Venue, view.venue)?,
        code(CategoryField::Team, view.toss_winner)?,
        code(CategoryField::TossDecision, view.toss_decision)?,
    ];

    let toss_team1 = view.toss_winner == view.team1;
    let toss_team2 = view.toss_winner == view.team2;
    let bat = view.toss_decision == "bat";
    values.extend([
        flag(toss_team1),
        flag(bat),
        flag(toss_team1 && bat),
        flag(toss_team2 && bat),
    ]);

    if let Some(t) = view.target {
        values.extend([t.runs, t.overs]);
    }

    Ok(FeatureVector {
        values,
        unknown_categories: unknown,
    })
}

/// A batch of training rows with their labels.
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    pub schema: FeatureSchema,
    pub rows: Vec<Vec<f64>>,
    pub labels: Vec<u8>,
    /// Fallback-encoded categorical values across the whole batch.
    pub unknown_categories: usize,
}

/// Build features and "did team1 win" labels for a training batch.
pub fn build_training_matrix(records: &[MatchRecord], encoders: &EncoderBank) -> Result<FeatureMatrix> {
    let schema = FeatureSchema::for_batch(records)?;
    let mut rows = Vec::with_capacity(records.len());
    let mut labels = Vec::with_capacity(records.len());
    let mut unknown_categories = 0;
    for r in records {
        r.validate()?;
        let fv = build(MatchView::from(r), encoders)?;
        debug_assert_eq!(fv.values.len(), schema.width());
        unknown_categories += fv.unknown_categories;
        rows.push(fv.values);
        labels.push(r.label()?);
    }
    Ok(FeatureMatrix {
        schema,
        rows,
        labels,
        unknown_categories,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::models::fixtures::record;
    use crate::data::models::TossDecision;
    use crate::model::encoder::UnknownCategoryPolicy;

    fn bank() -> EncoderBank {
        let records = vec![
            record("A", "B", "A", TossDecision::Bat, "A"),
            record("A", "B", "B", TossDecision::Field, "B"),
        ];
        EncoderBank::fit(&records, UnknownCategoryPolicy::FirstKnown).unwrap()
    }

    #[test]
    fn base_vector_layout() {
        let rec = record("B", "A", "A", TossDecision::Bat, "B");
        let fv = build(MatchView::from(&rec), &bank()).unwrap();
        assert_eq!(
            fv.values,
            vec![1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 1.0]
        );
        assert_eq!(fv.unknown_categories, 0);
    }

    #[test]
    fn innings_target_appends_two_columns() {
        let mut rec = record("A", "B", "A", TossDecision::Field, "A");
        rec.target = Some(InningsTarget { runs: 180.0, overs: 20.0 });
        let fv = build(MatchView::from(&rec), &bank()).unwrap();
        assert_eq!(fv.values.len(), FeatureSchema::WithInningsTarget.width());
        assert_eq!(&fv.values[10..], &[180.0, 20.0]);
        assert_eq!(fv.values[8], 0.0);
    }

    #[test]
    fn training_and_inference_share_schema() {
        let rec = record("A", "B", "B", TossDecision::Field, "B");
        let encoders = bank();
        let train = build_training_matrix(std::slice::from_ref(&rec), &encoders).unwrap();
        let mut upcoming = rec.clone();
        upcoming.winner = None;
        let infer = build(MatchView::from(&upcoming), &encoders).unwrap();
        assert_eq!(train.rows[0], infer.values);
        assert_eq!(train.schema.names().len(), infer.values.len());
    }

    #[test]
    fn unseen_categories_count_as_unknown() {
        let view = MatchView {
            team1: "A",
            team2: "Z-unseen-team",
            city: "Nowhere",
            venue: "Y",
            toss_winner: "A",
            toss_decision: "bat",
            target: None,
        };
        let fv = build(view, &bank()).unwrap();
        assert_eq!(fv.unknown_categories, 2);
        assert_eq!(fv.values[1], 0.0);
    }

    #[test]
    fn mixed_schema_batch_is_rejected() {
        let plain = record("A", "B", "A", TossDecision::Bat, "A");
        let mut chase = plain.clone();
        chase.target = Some(InningsTarget { runs: 150.0, overs: 20.0 });
        let err = build_training_matrix(&[plain, chase], &bank()).unwrap_err();
        assert!(matches!(err, PredictorError::Validation(_)));
    }

    #[test]
    fn labels_follow_team1() {
        let records = vec![
            record("A", "B", "A", TossDecision::Bat, "A"),
            record("A", "B", "B", TossDecision::Field, "B"),
        ];
        let m = build_training_matrix(&records, &bank()).unwrap();
        assert_eq!(m.labels, vec![1, 0]);
        assert_eq!(m.schema, FeatureSchema::Base);
        assert_eq!(m.unknown_categories, 0);
    }

    #[test]
    fn batch_counts_fallback_encoded_toss_winners() {
        let records = vec![
            record("A", "B", "A", TossDecision::Bat, "A"),
            record("A", "B", "B-renamed", TossDecision::Field, "B"),
        ];
        let encoders = EncoderBank::fit(&records, UnknownCategoryPolicy::FirstKnown).unwrap();
        let m = build_training_matrix(&records, &encoders).unwrap();
        assert_eq!(m.unknown_categories, 1);
        assert_eq!(m.rows[1][4], 0.0);
    }
}
