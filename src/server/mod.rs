use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::warn;

use crate::data::DropdownData;
use crate::error::PredictorError;
use crate::live_scores::LiveScoreProvider;
use crate::model::{predict, MatchInfo, Prediction, TrainedModel};

#[derive(Clone)]
pub struct AppState {
    /// Fitted once at startup and shared read-only by every request.
    pub model: Arc<TrainedModel>,
    pub dropdown: DropdownData,
    /// `None` when no live-score API key is configured.
    pub live_scores: Option<Arc<dyn LiveScoreProvider>>,
}

type ApiError = (StatusCode, Json<Value>);

fn api_error(status: StatusCode, error: &str, message: impl ToString) -> ApiError {
    (
        status,
        Json(json!({ "error": error, "message": message.to_string() })),
    )
}

fn predictor_error(err: PredictorError) -> ApiError {
    let status = match err {
        PredictorError::Validation(_) => StatusCode::BAD_REQUEST,
        PredictorError::SchemaMismatch { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        PredictorError::DataInsufficient(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    api_error(status, "Prediction failed", err)
}

/// Build the Axum router for the prediction API.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/predict", post(predict_handler))
        .route("/dropdown_data", get(dropdown_handler))
        .route("/live_matches", get(live_matches_handler))
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

/// POST /predict
async fn predict_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<MatchInfo>, JsonRejection>,
) -> Result<Json<Prediction>, ApiError> {
    let Json(info) = payload.map_err(|rejection| {
        api_error(StatusCode::BAD_REQUEST, "Invalid request body", rejection.body_text())
    })?;
    predict(&info, &state.model)
        .map(Json)
        .map_err(predictor_error)
}

#[derive(Debug, Serialize)]
struct TeamOption {
    name: String,
    icon: &'static str,
}

#[derive(Debug, Serialize)]
struct DropdownResponse {
    team1: Vec<TeamOption>,
    team2: Vec<TeamOption>,
    cities: Vec<String>,
}

fn team_options(names: &BTreeSet<String>) -> Vec<TeamOption> {
    names
        .iter()
        .map(|name| TeamOption {
            name: name.clone(),
            icon: "🏏",
        })
        .collect()
}

/// GET /dropdown_data
async fn dropdown_handler(State(state): State<Arc<AppState>>) -> Json<DropdownResponse> {
    Json(DropdownResponse {
        team1: team_options(&state.dropdown.team1),
        team2: team_options(&state.dropdown.team2),
        cities: state.dropdown.cities.iter().cloned().collect(),
    })
}

/// GET /live_matches
async fn live_matches_handler(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let Some(provider) = &state.live_scores else {
        return Err(api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "Failed to fetch live matches",
            "no live-score provider configured",
        ));
    };
    provider.recent_matches().await.map(Json).map_err(|e| {
        warn!("{} lookup failed: {:#}", provider.name(), e);
        api_error(StatusCode::BAD_GATEWAY, "Failed to fetch live matches", format!("{:#}", e))
    })
}
