use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

pub mod models;

pub use models::{InningsTarget, MatchRecord};

use crate::error::PredictorError;

/// One CSV row as it appears on disk. Every column is optional here so that a
/// missing value rejects only its own row.
#[derive(Debug, Deserialize)]
struct RawMatchRow {
    team1: Option<String>,
    team2: Option<String>,
    city: Option<String>,
    venue: Option<String>,
    toss_winner: Option<String>,
    toss_decision: Option<String>,
    winner: Option<String>,
    target_runs: Option<f64>,
    target_overs: Option<f64>,
}

fn required(field: &'static str, value: Option<String>) -> Result<String, PredictorError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(PredictorError::validation(format!("missing required column '{}'", field))),
    }
}

impl TryFrom<RawMatchRow> for MatchRecord {
    type Error = PredictorError;

    fn try_from(row: RawMatchRow) -> Result<Self, PredictorError> {
        let record = MatchRecord {
            team1: required("team1", row.team1)?,
            team2: required("team2", row.team2)?,
            city: required("city", row.city)?,
            venue: required("venue", row.venue)?,
            toss_winner: required("toss_winner", row.toss_winner)?,
            toss_decision: required("toss_decision", row.toss_decision)?.parse()?,
            target: InningsTarget::from_parts(row.target_runs, row.target_overs)?,
            winner: Some(required("winner", row.winner)?),
        };
        record.validate()?;
        Ok(record)
    }
}

/// A row that was dropped during ingestion.
#[derive(Debug, Clone, PartialEq)]
pub struct RowRejection {
    /// 1-based data row number (header excluded).
    pub row: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct LoadedMatches {
    pub records: Vec<MatchRecord>,
    pub rejected: Vec<RowRejection>,
    /// Names from every readable row, rejected ones included.
    pub dropdown: DropdownData,
}

/// Load match history from a CSV file with columns
/// `team1, team2, city, venue, toss_winner, toss_decision, winner[, target_runs, target_overs]`.
pub fn load_csv(path: impl AsRef<Path>) -> Result<LoadedMatches> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open match data {}", path.display()))?;
    let loaded = read_matches(file)
        .with_context(|| format!("Failed to read match data {}", path.display()))?;
    info!(
        "Loaded {} match records from {} ({} rejected)",
        loaded.records.len(),
        path.display(),
        loaded.rejected.len()
    );
    Ok(loaded)
}

/// Parse match rows from any reader. Malformed rows are collected in
/// `rejected`, never coerced into a label.
pub fn read_matches<R: Read>(reader: R) -> Result<LoadedMatches> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let mut loaded = LoadedMatches::default();
    for (i, result) in rdr.deserialize::<RawMatchRow>().enumerate() {
        let row = i + 1;
        let outcome = result.map_err(|e| e.to_string()).and_then(|raw| {
            loaded.dropdown.add(
                raw.team1.as_deref(),
                raw.team2.as_deref(),
                raw.city.as_deref(),
            );
            MatchRecord::try_from(raw).map_err(|e| e.to_string())
        });
        match outcome {
            Ok(record) => loaded.records.push(record),
            Err(reason) => {
                warn!("Rejecting match row {}: {}", row, reason);
                loaded.rejected.push(RowRejection { row, reason });
            }
        }
    }
    Ok(loaded)
}

/// Distinct names for UI dropdown population, kept sorted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DropdownData {
    pub team1: BTreeSet<String>,
    pub team2: BTreeSet<String>,
    pub cities: BTreeSet<String>,
}

impl DropdownData {
    /// Record the names from one row. Blank or missing values are skipped.
    pub fn add(&mut self, team1: Option<&str>, team2: Option<&str>, city: Option<&str>) {
        for (set, value) in [
            (&mut self.team1, team1),
            (&mut self.team2, team2),
            (&mut self.cities, city),
        ] {
            if let Some(v) = value.map(str::trim).filter(|v| !v.is_empty()) {
                set.insert(v.to_string());
            }
        }
    }

    #[cfg(test)]
    pub fn from_records(records: &[MatchRecord]) -> Self {
        let mut dropdown = DropdownData::default();
        for r in records {
            dropdown.add(Some(&r.team1), Some(&r.team2), Some(&r.city));
        }
        dropdown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "\
team1,team2,city,venue,toss_winner,toss_decision,winner
Mumbai Indians,Chennai Super Kings,Mumbai,Wankhede Stadium,Mumbai Indians,bat,Mumbai Indians
Delhi Capitals,Mumbai Indians,Delhi,Feroz Shah Kotla,Mumbai Indians,field,Mumbai Indians
Delhi Capitals,Mumbai Indians,Delhi,Feroz Shah Kotla,Mumbai Indians,field,no result
Delhi Capitals,,Delhi,Feroz Shah Kotla,Delhi Capitals,bat,Delhi Capitals
Kolkata Knight Riders,Delhi Capitals,Kolkata,Eden Gardens,Delhi Capitals,bowl,Delhi Capitals
";

    #[test]
    fn malformed_rows_are_rejected_not_mislabeled() {
        let loaded = read_matches(CSV.as_bytes()).unwrap();
        assert_eq!(loaded.records.len(), 2);
        let rows: Vec<usize> = loaded.rejected.iter().map(|r| r.row).collect();
        assert_eq!(rows, vec![3, 4, 5]);
        assert!(loaded.rejected[0].reason.contains("no result"));
        assert!(loaded.rejected[1].reason.contains("team2"));
        assert_eq!(loaded.records[1].label().unwrap(), 0);
    }

    #[test]
    fn numeric_in_match_columns_are_read_when_present() {
        let csv = "\
team1,team2,city,venue,toss_winner,toss_decision,winner,target_runs,target_overs
A,B,X,Y,A,bat,A,180,20.0
A,B,X,Y,B,field,B,,20
";
        let loaded = read_matches(csv.as_bytes()).unwrap();
        assert_eq!(loaded.records.len(), 1);
        assert_eq!(
            loaded.records[0].target,
            Some(InningsTarget { runs: 180.0, overs: 20.0 })
        );
        assert_eq!(loaded.rejected[0].row, 2);
    }

    fn names(set: &BTreeSet<String>) -> Vec<&str> {
        set.iter().map(String::as_str).collect()
    }

    #[test]
    fn dropdown_lists_are_distinct() {
        let loaded = read_matches(CSV.as_bytes()).unwrap();
        let dd = DropdownData::from_records(&loaded.records);
        assert_eq!(names(&dd.team1), ["Delhi Capitals", "Mumbai Indians"]);
        assert_eq!(names(&dd.team2), ["Chennai Super Kings", "Mumbai Indians"]);
        assert_eq!(names(&dd.cities), ["Delhi", "Mumbai"]);
    }

    #[test]
    fn dropdown_includes_names_from_rejected_rows() {
        let loaded = read_matches(CSV.as_bytes()).unwrap();
        assert_eq!(
            names(&loaded.dropdown.team1),
            ["Delhi Capitals", "Kolkata Knight Riders", "Mumbai Indians"]
        );
        assert_eq!(
            names(&loaded.dropdown.team2),
            ["Chennai Super Kings", "Delhi Capitals", "Mumbai Indians"]
        );
        assert_eq!(names(&loaded.dropdown.cities), ["Delhi", "Kolkata", "Mumbai"]);
    }
}
