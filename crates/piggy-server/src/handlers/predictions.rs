//! Purchase prediction handler

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use crate::{handlers::check_limit, AppError, AppState};
use piggy_core::models::Prediction;
use piggy_core::Predictor;

#[derive(Debug, Deserialize)]
pub struct PredictQuery {
    pub user_id: String,
    pub limit: Option<i64>,
}

/// GET /api/predict
pub async fn predict(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PredictQuery>,
) -> Result<Json<Vec<Prediction>>, AppError> {
    let limit = check_limit(params.limit, 5, 20)?;

    let predictions = Predictor::new(&state.db).predict_next(&params.user_id, limit as usize)?;
    Ok(Json(predictions))
}
