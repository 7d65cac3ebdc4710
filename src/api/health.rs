use axum::{extract::State, Json};
use serde::Serialize;

use super::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub completion: String,
    pub ledger: String,
    pub active_sessions: usize,
}

fn configured_label(configured: bool) -> String {
    if configured {
        "configured".to_string()
    } else {
        "not_configured".to_string()
    }
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        completion: configured_label(state.config.completion_configured()),
        ledger: configured_label(state.config.ledger_configured()),
        active_sessions: state.sessions.len().await,
    })
}
