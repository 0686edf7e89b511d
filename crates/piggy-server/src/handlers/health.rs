//! Health check handler

use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Serialize;

use crate::AppState;
use piggy_core::SearchBackend;

#[derive(Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub store: &'static str,
    pub search_configured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_model: Option<String>,
}

/// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let store = if state.db.ping() {
        "connected"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        ok: true,
        store,
        search_configured: state.search.is_some(),
        search_model: state.search.as_ref().map(|s| s.model().to_string()),
    })
}
