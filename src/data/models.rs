use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{PredictorError, Result};

/// What the toss winner elected to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TossDecision {
    Bat,
    Field,
}

impl TossDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            TossDecision::Bat => "bat",
            TossDecision::Field => "field",
        }
    }
}

impl fmt::Display for TossDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TossDecision {
    type Err = PredictorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "bat" => Ok(TossDecision::Bat),
            "field" => Ok(TossDecision::Field),
            other => Err(PredictorError::validation(format!(
                "toss_decision must be 'bat' or 'field', got '{}'",
                other
            ))),
        }
    }
}

/// In-match chase state: runs to chase and overs to chase them in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InningsTarget {
    pub runs: f64,
    pub overs: f64,
}

impl InningsTarget {
    /// Pair up the two optional numeric columns. They must appear together.
    pub fn from_parts(runs: Option<f64>, overs: Option<f64>) -> Result<Option<Self>> {
        match (runs, overs) {
            (None, None) => Ok(None),
            (Some(runs), Some(overs)) => {
                let target = InningsTarget { runs, overs };
                target.validate()?;
                Ok(Some(target))
            }
            _ => Err(PredictorError::validation(
                "target_runs and target_overs must be given together",
            )),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.runs.is_finite() || self.runs < 0.0 {
            return Err(PredictorError::validation(format!(
                "target_runs must be a non-negative number, got {}",
                self.runs
            )));
        }
        if !self.overs.is_finite() || self.overs <= 0.0 {
            return Err(PredictorError::validation(format!(
                "target_overs must be a positive number, got {}",
                self.overs
            )));
        }
        Ok(())
    }
}

/// One historical (or, with `winner: None`, upcoming) match.
///
/// Label orientation is fixed to "did team1 win", so the position of the two
/// teams matters even though they form an unordered pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub team1: String,
    pub team2: String,
    pub city: String,
    pub venue: String,
    pub toss_winner: String,
    pub toss_decision: TossDecision,
    pub target: Option<InningsTarget>,
    pub winner: Option<String>,
}

impl MatchRecord {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("team1", &self.team1),
            ("team2", &self.team2),
            ("city", &self.city),
            ("venue", &self.venue),
            ("toss_winner", &self.toss_winner),
        ] {
            if value.trim().is_empty() {
                return Err(PredictorError::validation(format!("{} is empty", name)));
            }
        }
        if let Some(winner) = &self.winner {
            if winner != &self.team1 && winner != &self.team2 {
                return Err(PredictorError::validation(format!(
                    "winner '{}' is neither '{}' nor '{}'",
                    winner, self.team1, self.team2
                )));
            }
        }
        if let Some(target) = &self.target {
            target.validate()?;
        }
        Ok(())
    }

    /// Training label: 1 when team1 won, 0 when team2 won.
    pub fn label(&self) -> Result<u8> {
        match &self.winner {
            Some(w) if w == &self.team1 => Ok(1),
            Some(w) if w == &self.team2 => Ok(0),
            Some(w) => Err(PredictorError::validation(format!(
                "winner '{}' is neither '{}' nor '{}'",
                w, self.team1, self.team2
            ))),
            None => Err(PredictorError::validation(format!(
                "match {} vs {} has no winner",
                self.team1, self.team2
            ))),
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn record(
        team1: &str,
        team2: &str,
        toss_winner: &str,
        decision: TossDecision,
        winner: &str,
    ) -> MatchRecord {
        MatchRecord {
            team1: team1.into(),
            team2: team2.into(),
            city: "X".into(),
            venue: "Y".into(),
            toss_winner: toss_winner.into(),
            toss_decision: decision,
            target: None,
            winner: Some(winner.into()),
        }
    }

    /// A league where whoever wins the toss and bats first wins the match.
    /// Large enough to exercise stratified splits and k-fold CV.
    pub fn toss_league(rounds: usize) -> Vec<MatchRecord> {
        let teams = ["Chennai", "Delhi", "Kolkata", "Mumbai"];
        let grounds = [("Chennai", "Chepauk"), ("Mumbai", "Wankhede")];
        let mut out = Vec::new();
        for r in 0..rounds {
            for (i, t1) in teams.iter().enumerate() {
                let t2 = teams[(i + 1 + r) % teams.len()];
                if *t1 == t2 {
                    continue;
                }
                let toss_t1 = (r + i) % 2 == 0;
                let decision = if (r / 2 + i) % 2 == 0 {
                    TossDecision::Bat
                } else {
                    TossDecision::Field
                };
                let toss_winner = if toss_t1 { *t1 } else { t2 };
                let batting_first = if decision == TossDecision::Bat {
                    toss_winner
                } else if toss_t1 {
                    t2
                } else {
                    *t1
                };
                let (city, venue) = grounds[(r + i) % grounds.len()];
                out.push(MatchRecord {
                    team1: t1.to_string(),
                    team2: t2.to_string(),
                    city: city.into(),
                    venue: venue.into(),
                    toss_winner: toss_winner.into(),
                    toss_decision: decision,
                    target: None,
                    winner: Some(batting_first.into()),
                });
            }
        }
        out
    }
}
