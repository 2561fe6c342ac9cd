//! Thin collaborator-facing HTTP surface: health, manual trigger, last report.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

use crate::model::Category;
use crate::orchestrator::{Orchestrator, TriggerError};

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub cancel: CancellationToken,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/trigger/{category}", post(trigger))
        .route("/report/last", get(last_report))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

fn valid_categories() -> Vec<&'static str> {
    Category::ALL.iter().map(|c| c.as_str()).collect()
}

async fn trigger(State(state): State<AppState>, Path(raw): Path<String>) -> Response {
    let category: Category = match raw.parse() {
        Ok(c) => c,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "message": e.to_string(),
                    "valid_categories": valid_categories(),
                })),
            )
                .into_response();
        }
    };

    match state.orchestrator.trigger_aggregation(category, &state.cancel).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(TriggerError::Busy) => (
            StatusCode::CONFLICT,
            Json(json!({ "message": TriggerError::Busy.to_string() })),
        )
            .into_response(),
    }
}

async fn last_report(State(state): State<AppState>) -> Response {
    match state.orchestrator.last_report().await {
        Some(r) => Json(r).into_response(),
        None => (StatusCode::NOT_FOUND, Json(json!({ "message": "no run has completed yet" }))).into_response(),
    }
}
