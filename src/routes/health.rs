use axum::{extract::State, Json};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthData {
    status: &'static str,
    timestamp: String,
    version: String,
}

/// Liveness only; the store is not consulted.
pub async fn health(State(state): State<AppState>) -> Json<HealthData> {
    Json(HealthData {
        status: "healthy",
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        version: state.version.to_string(),
    })
}
