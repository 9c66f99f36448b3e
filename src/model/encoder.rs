//! Label encoding for categorical match fields.
//!
//! Each field gets a frozen [`Vocabulary`]: the sorted set of values seen at
//! training time. Codes are positions in that sorted list, so re-fitting on
//! the same values always reproduces the same codes. Values absent from the
//! vocabulary are resolved by an explicit [`UnknownCategoryPolicy`].

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use tracing::warn;

use crate::data::MatchRecord;
use crate::error::{PredictorError, Result};

/// What to do with a category that was never seen during training.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum UnknownCategoryPolicy {
    /// Use the code of the lexicographically first known value.
    #[default]
    FirstKnown,
    /// Use a dedicated code one past the last known value.
    Sentinel,
    /// Refuse the request with a validation error.
    Reject,
}

/// The categorical namespaces. The team vocabulary is fit on the `team1`
/// and `team2` columns; `toss_winner` is encoded through it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CategoryField {
    Team,
    City,
    Venue,
    TossDecision,
}

impl fmt::Display for CategoryField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CategoryField::Team => "team",
            CategoryField::City => "city",
            CategoryField::Venue => "venue",
            CategoryField::TossDecision => "toss_decision",
        })
    }
}

/// Result of encoding one value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Encoded {
    pub code: usize,
    /// True when the value was unknown and the fallback policy supplied the code.
    pub fallback: bool,
}

/// Sorted known values of one field plus a reverse lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct Vocabulary {
    values: Vec<String>,
    index: HashMap<String, usize>,
}

impl Vocabulary {
    /// Fit a vocabulary on a set of category strings. Duplicates collapse;
    /// codes follow lexicographic order.
    pub fn fit<I, S>(values: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let sorted: BTreeSet<String> = values
            .into_iter()
            .map(|v| v.as_ref().to_string())
            .collect();
        if sorted.is_empty() {
            return Err(PredictorError::insufficient("cannot fit a vocabulary on no values"));
        }
        let values: Vec<String> = sorted.into_iter().collect();
        let index = values
            .iter()
            .enumerate()
            .map(|(code, v)| (v.clone(), code))
            .collect();
        Ok(Vocabulary { values, index })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[cfg(test)]
    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn code_of(&self, value: &str) -> Option<usize> {
        self.index.get(value).copied()
    }

    /// Encode `value`, resolving unknowns through `policy`.
    pub fn encode(&self, value: &str, policy: UnknownCategoryPolicy) -> Option<Encoded> {
        if let Some(code) = self.code_of(value) {
            return Some(Encoded { code, fallback: false });
        }
        match policy {
            UnknownCategoryPolicy::FirstKnown => Some(Encoded { code: 0, fallback: true }),
            UnknownCategoryPolicy::Sentinel => Some(Encoded {
                code: self.values.len(),
                fallback: true,
            }),
            UnknownCategoryPolicy::Reject => None,
        }
    }
}

/// Frozen vocabularies for every categorical field, fit once on training data.
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderBank {
    teams: Vocabulary,
    cities: Vocabulary,
    venues: Vocabulary,
    toss_decisions: Vocabulary,
    policy: UnknownCategoryPolicy,
}

impl EncoderBank {
    pub fn fit(records: &[MatchRecord], policy: UnknownCategoryPolicy) -> Result<Self> {
        let teams = Vocabulary::fit(
            records
                .iter()
                .flat_map(|r| [&r.team1, &r.team2]),
        )?;
        let cities = Vocabulary::fit(records.iter().map(|r| &r.city))?;
        let venues = Vocabulary::fit(records.iter().map(|r| &r.venue))?;
        let toss_decisions = Vocabulary::fit(records.iter().map(|r| r.toss_decision.as_str()))?;
        Ok(EncoderBank {
            teams,
            cities,
            venues,
            toss_decisions,
            policy,
        })
    }

    pub fn vocabulary(&self, field: CategoryField) -> &Vocabulary {
        match field {
            CategoryField::Team => &self.teams,
            CategoryField::City => &self.cities,
            CategoryField::Venue => &self.venues,
            CategoryField::TossDecision => &self.toss_decisions,
        }
    }

    /// Encode a value of `field`. Unknown values are logged and resolved by
    /// the bank's policy; only `Reject` turns them into an error.
    pub fn encode(&self, field: CategoryField, value: &str) -> Result<Encoded> {
        match self.vocabulary(field).encode(value, self.policy) {
            Some(enc) => {
                if enc.fallback {
                    warn!(
                        "Unknown {} '{}' encoded via {:?} fallback (code {})",
                        field, value, self.policy, enc.code
                    );
                }
                Ok(enc)
            }
            None => Err(PredictorError::validation(format!(
                "unknown {} '{}'",
                field, value
            ))),
        }
    }
}
