//! Better deals handler

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use crate::{handlers::check_limit, AppError, AppState};
use piggy_core::models::DealSuggestion;
use piggy_core::suggest_deals;

#[derive(Debug, Deserialize)]
pub struct DealsQuery {
    pub user_id: String,
    pub limit: Option<i64>,
}

/// GET /api/better-deals
pub async fn better_deals(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DealsQuery>,
) -> Result<Json<Vec<DealSuggestion>>, AppError> {
    let limit = check_limit(params.limit, 10, 20)?;

    let deals = suggest_deals(
        &state.db,
        state.catalog,
        &params.user_id,
        limit as usize,
        &state.config.deals_allowed_categories,
    )?;
    Ok(Json(deals))
}
