use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data::InningsTarget;
use crate::error::{PredictorError, Result};

use super::features::MatchView;
use super::trainer::TrainedModel;

/// An upcoming (or in-progress) match as submitted for prediction.
///
/// Only the two teams are mandatory. Missing categorical context is treated
/// as an unknown category and goes through the model's fallback policy.
/// Unrecognized fields (e.g. `required_runs`) are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchInfo {
    pub team1: Option<String>,
    pub team2: Option<String>,
    pub city: Option<String>,
    pub venue: Option<String>,
    pub toss_winner: Option<String>,
    pub toss_decision: Option<String>,
    pub target_runs: Option<f64>,
    pub target_overs: Option<f64>,
}

/// Per-team win probabilities. `team2_probability` is defined as
/// `1 - team1_probability`, never estimated separately.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub team1: String,
    pub team2: String,
    pub team1_probability: f64,
    pub team2_probability: f64,
    /// Request values the model had never seen, resolved by the fallback policy.
    pub unknown_categories: usize,
}

fn team(name: &'static str, value: &Option<String>) -> Result<String> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(PredictorError::validation(format!("'{}' is required", name))),
    }
}

/// Predict win probabilities for `info` with a fitted model.
///
/// Requests are validated before the model is touched; identical requests
/// against the same model always return identical probabilities.
pub fn predict(info: &MatchInfo, model: &TrainedModel) -> Result<Prediction> {
    let team1 = team("team1", &info.team1)?;
    let team2 = team("team2", &info.team2)?;
    if team1 == team2 {
        return Err(PredictorError::validation("team1 and team2 must be different teams"));
    }
    let target = InningsTarget::from_parts(info.target_runs, info.target_overs)?;

    let text = |v: &Option<String>| v.as_deref().map(str::trim).unwrap_or("").to_string();
    let city = text(&info.city);
    let venue = text(&info.venue);
    let toss_winner = text(&info.toss_winner);
    let toss_decision = text(&info.toss_decision).to_lowercase();

    let view = MatchView {
        team1: &team1,
        team2: &team2,
        city: &city,
        venue: &venue,
        toss_winner: &toss_winner,
        toss_decision: &toss_decision,
        target,
    };
    let score = model.score(view)?;
    let p = score.team1_win.clamp(0.0, 1.0);
    debug!(
        "P({} beats {}) = {:.4} ({} unknown categories)",
        team1, team2, p, score.unknown_categories
    );

    Ok(Prediction {
        team1,
        team2,
        team1_probability: p,
        team2_probability: 1.0 - p,
        unknown_categories: score.unknown_categories,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::models::fixtures::{record, toss_league};
    use crate::data::models::TossDecision;
    use crate::model::search::ParamGrid;
    use crate::model::trainer::{train, TrainingConfig};
    use approx::assert_relative_eq;

    fn model() -> TrainedModel {
        let config = TrainingConfig {
            grid: ParamGrid {
                n_estimators: vec![10],
                max_depth: vec![4],
                min_samples_split: vec![2],
                min_samples_leaf: vec![1],
            },
            cv_folds: 3,
            ..TrainingConfig::default()
        };
        train(&toss_league(10), &config).unwrap().0
    }

    fn info(team1: &str, team2: &str) -> MatchInfo {
        MatchInfo {
            team1: Some(team1.into()),
            team2: Some(team2.into()),
            city: Some("Mumbai".into()),
            venue: Some("Wankhede".into()),
            toss_winner: Some(team1.into()),
            toss_decision: Some("bat".into()),
            ..MatchInfo::default()
        }
    }

    #[test]
    fn probabilities_sum_to_one() {
        let model = model();
        for (a, b) in [("Mumbai", "Delhi"), ("Chennai", "Kolkata"), ("Delhi", "Chennai")] {
            let p = predict(&info(a, b), &model).unwrap();
            assert_relative_eq!(p.team1_probability + p.team2_probability, 1.0, epsilon = 1e-12);
            assert!((0.0..=1.0).contains(&p.team1_probability));
        }
    }

    #[test]
    fn unseen_team_uses_fallback_encoding() {
        let model = model();
        let req = MatchInfo {
            team1: Some("A".into()),
            team2: Some("Z-unseen-team".into()),
            ..MatchInfo::default()
        };
        let p = predict(&req, &model).unwrap();
        assert_relative_eq!(p.team1_probability + p.team2_probability, 1.0, epsilon = 1e-12);
        // team1, team2, and the four empty context fields
        assert_eq!(p.unknown_categories, 6);
    }

    #[test]
    fn known_request_reports_no_unknowns() {
        let p = predict(&info("Mumbai", "Delhi"), &model()).unwrap();
        assert_eq!(p.unknown_categories, 0);
    }

    #[test]
    fn prediction_is_idempotent() {
        let model = model();
        let req = info("Kolkata", "Mumbai");
        assert_eq!(predict(&req, &model).unwrap(), predict(&req, &model).unwrap());
    }

    #[test]
    fn missing_team_is_validation_error() {
        let model = model();
        let req = MatchInfo {
            team1: Some("Mumbai".into()),
            ..MatchInfo::default()
        };
        assert!(matches!(predict(&req, &model), Err(PredictorError::Validation(_))));
        let blank = MatchInfo {
            team2: Some("  ".into()),
            ..info("Mumbai", "Delhi")
        };
        assert!(matches!(predict(&blank, &model), Err(PredictorError::Validation(_))));
    }

    #[test]
    fn in_match_fields_against_base_model_is_schema_mismatch() {
        let model = model();
        let req = MatchInfo {
            target_runs: Some(180.0),
            target_overs: Some(20.0),
            ..info("Mumbai", "Delhi")
        };
        assert_eq!(
            predict(&req, &model),
            Err(PredictorError::SchemaMismatch {
                expected: 10,
                actual: 12
            })
        );
    }

    #[test]
    fn two_record_model_still_predicts() {
        let records = vec![
            record("A", "B", "A", TossDecision::Bat, "A"),
            record("A", "B", "B", TossDecision::Field, "B"),
        ];
        let (model, _) = train(&records, &TrainingConfig::default()).unwrap();
        let p = predict(&info("A", "Z-unseen-team"), &model).unwrap();
        assert_relative_eq!(p.team1_probability + p.team2_probability, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn extra_request_fields_are_ignored() {
        let req: MatchInfo = serde_json::from_str(
            r#"{"team1":"Mumbai","team2":"Delhi","required_runs":60,"remaining_overs":5.0}"#,
        )
        .unwrap();
        assert_eq!(req.team1.as_deref(), Some("Mumbai"));
        assert_eq!(req.city, None);
    }
}
