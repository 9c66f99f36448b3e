use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

mod config;
mod data;
mod error;
mod live_scores;
mod model;
mod server;

use config::{Command, Config};
use data::MatchRecord;
use live_scores::{Cricbuzz, LiveScoreProvider};
use model::{EvaluationReport, TrainedModel, TrainingConfig};
use server::AppState;

/// Run the grid search and final fit off the async runtime.
async fn fit(records: Vec<MatchRecord>, config: TrainingConfig) -> Result<(TrainedModel, EvaluationReport)> {
    let fitted = tokio::task::spawn_blocking(move || model::train(&records, &config))
        .await
        .context("Training task panicked")??;
    Ok(fitted)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;
    let training = config.training_config()?;

    let loaded = data::load_csv(&config.data_path)?;
    if !loaded.rejected.is_empty() {
        warn!(
            "{} match rows were skipped; first: row {} ({})",
            loaded.rejected.len(),
            loaded.rejected[0].row,
            loaded.rejected[0].reason
        );
    }
    let dropdown = loaded.dropdown;

    info!(
        "Grid search over {} candidates with {}-fold CV (seed {})",
        training.grid.candidates().len(),
        training.cv_folds,
        training.seed
    );
    let (trained, report) = fit(loaded.records, training).await?;
    info!(
        "Model trained at {} ({} features, {:?} schema)",
        trained.trained_at().to_rfc3339(),
        trained.schema().width(),
        trained.schema()
    );

    match config.command {
        Command::Train { report_path } => {
            println!("{}", report);
            if let Some(path) = report_path {
                let json = serde_json::to_string_pretty(&report)?;
                std::fs::write(&path, json)
                    .with_context(|| format!("Failed to write report to {}", path.display()))?;
                info!("Evaluation report written to {}", path.display());
            }
        }
        Command::Serve {
            listen_addr,
            live_scores_api_url,
            live_scores_api_host,
            live_scores_api_key,
        } => {
            info!(
                "Model ready: accuracy {:.4} on {} held-out matches, best params {}",
                report.accuracy, report.test_size, report.best_params
            );

            let live_scores: Option<Arc<dyn LiveScoreProvider>> = match live_scores_api_key {
                Some(key) => Some(Arc::new(Cricbuzz::new(
                    &live_scores_api_url,
                    &live_scores_api_host,
                    &key,
                )?)),
                None => {
                    warn!("LIVE_SCORES_API_KEY not set; /live_matches is disabled");
                    None
                }
            };

            let state = AppState {
                model: Arc::new(trained),
                dropdown,
                live_scores,
            };
            let app = server::router(state);
            let addr: SocketAddr = listen_addr.parse()?;
            info!("Prediction API listening on http://{}", addr);
            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, app).await?;
        }
    }

    Ok(())
}
