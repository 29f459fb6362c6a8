//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub providers: Vec<ProviderHealth>,
}

#[derive(Serialize)]
pub struct ProviderHealth {
    pub name: String,
    pub healthy: bool,
}

/// GET /health: service liveness plus each supplier's last observed health.
///
/// Never calls the suppliers; the status reflects the last registry check.
pub async fn check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let providers: Vec<ProviderHealth> = state
        .registry
        .last_known_health()
        .into_iter()
        .map(|(name, healthy)| ProviderHealth { name, healthy })
        .collect();
    let status = if providers.iter().any(|p| p.healthy) {
        "ok"
    } else {
        "degraded"
    };
    Json(HealthResponse { status, providers })
}
