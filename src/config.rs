use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::model::{ParamGrid, TrainingConfig, UnknownCategoryPolicy};

/// Cricket match win-probability predictor
#[derive(Parser, Debug, Clone)]
#[command(name = "cricket-win-predictor", version, about)]
pub struct Config {
    #[command(subcommand)]
    pub command: Command,

    /// Match history CSV (team1, team2, city, venue, toss_winner, toss_decision, winner[, target_runs, target_overs])
    #[arg(long, env = "MATCH_DATA_PATH", default_value = "matches.csv", global = true)]
    pub data_path: PathBuf,

    /// TOML file with the hyperparameter grid (defaults to the built-in 81-point grid)
    #[arg(long, env = "PARAM_GRID_PATH", global = true)]
    pub grid_path: Option<PathBuf>,

    /// Number of cross-validation folds used by the grid search
    #[arg(long, env = "CV_FOLDS", default_value = "5", global = true)]
    pub cv_folds: usize,

    /// Fraction of matches held out for evaluation
    #[arg(long, env = "TEST_FRACTION", default_value = "0.2", global = true)]
    pub test_fraction: f64,

    /// Seed for the split, bootstrap samples and feature bagging
    #[arg(long, env = "SEED", default_value = "42", global = true)]
    pub seed: u64,

    /// How to encode teams, cities or venues never seen in training
    #[arg(long, env = "UNKNOWN_CATEGORY_POLICY", value_enum, default_value = "first-known", global = true)]
    pub unknown_policy: UnknownCategoryPolicy,

    /// Stop starting new grid-search candidates after this many seconds
    #[arg(long, env = "SEARCH_DEADLINE_SECS", global = true)]
    pub search_deadline_secs: Option<u64>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Train and evaluate, printing the report
    Train {
        /// Also write the evaluation report as JSON
        #[arg(long, env = "REPORT_PATH")]
        report_path: Option<PathBuf>,
    },
    /// Train at startup, then serve /predict, /dropdown_data and /live_matches
    Serve {
        /// HTTP listen address
        #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:5000")]
        listen_addr: String,

        /// Live scores API base URL
        #[arg(
            long,
            env = "LIVE_SCORES_API_URL",
            default_value = "https://cricbuzz-cricket.p.rapidapi.com"
        )]
        live_scores_api_url: String,

        /// RapidAPI host header for the live scores API
        #[arg(
            long,
            env = "LIVE_SCORES_API_HOST",
            default_value = "cricbuzz-cricket.p.rapidapi.com"
        )]
        live_scores_api_host: String,

        /// RapidAPI key; /live_matches is disabled without it
        #[arg(long, env = "LIVE_SCORES_API_KEY")]
        live_scores_api_key: Option<String>,
    },
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.cv_folds < 2 {
            anyhow::bail!("cv_folds must be at least 2");
        }
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            anyhow::bail!("test_fraction must be between 0.0 and 1.0 (exclusive)");
        }
        if self.search_deadline_secs == Some(0) {
            anyhow::bail!("search_deadline_secs must be positive");
        }
        Ok(())
    }

    /// Load the grid file if one was given.
    pub fn param_grid(&self) -> anyhow::Result<ParamGrid> {
        let Some(path) = &self.grid_path else {
            return Ok(ParamGrid::default());
        };
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read grid config file: {}", path.display()))?;
        let grid: ParamGrid = toml::from_str(&content)
            .with_context(|| format!("Failed to parse grid config TOML: {}", path.display()))?;
        grid.validate()?;
        Ok(grid)
    }

    pub fn training_config(&self) -> anyhow::Result<TrainingConfig> {
        Ok(TrainingConfig {
            grid: self.param_grid()?,
            cv_folds: self.cv_folds,
            test_fraction: self.test_fraction,
            seed: self.seed,
            unknown_policy: self.unknown_policy,
            search_budget: self.search_deadline_secs.map(Duration::from_secs),
        })
    }
}
