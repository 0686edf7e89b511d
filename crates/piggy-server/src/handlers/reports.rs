//! Weekly alternatives report handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use crate::{
    handlers::{check_limit, parse_week},
    AppError, AppState,
};
use piggy_core::models::{WeeklyReport, WeeklyReportSummary};

#[derive(Debug, Deserialize)]
pub struct WeekQuery {
    pub week: Option<String>,
}

/// GET /api/user/:user_id/weekly_alternatives
///
/// The exact week when `week` is given, else the most recent stored
/// report. 404 when the user has no matching report.
pub async fn get_weekly_alternatives(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Query(params): Query<WeekQuery>,
) -> Result<Json<WeeklyReport>, AppError> {
    let week = parse_week(params.week.as_deref())?;

    let report = state
        .db
        .get_weekly_report(&user_id, week)?
        .ok_or_else(|| AppError::not_found("No weekly report for this user"))?;

    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

/// GET /api/user/:user_id/weekly_alternatives/history
pub async fn weekly_alternatives_history(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<Vec<WeeklyReportSummary>>, AppError> {
    let limit = check_limit(params.limit, 4, 20)?;

    let history = state.db.list_report_history(&user_id, limit)?;
    Ok(Json(history))
}
