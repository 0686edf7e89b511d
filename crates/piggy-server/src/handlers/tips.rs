//! Smart tips handler

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use crate::{handlers::check_limit, AppError, AppState};
use piggy_core::models::Tip;
use piggy_core::TipEngine;

#[derive(Debug, Deserialize)]
pub struct TipsQuery {
    pub user_id: String,
    pub limit: Option<i64>,
}

/// GET /api/smart-tips
pub async fn smart_tips(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TipsQuery>,
) -> Result<Json<Vec<Tip>>, AppError> {
    let limit = check_limit(params.limit, 6, 20)?;

    let tips = TipEngine::new(&state.db).generate(&params.user_id, limit as usize)?;
    Ok(Json(tips))
}
