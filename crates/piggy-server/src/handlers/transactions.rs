//! Transaction feed, text search, category stats, and need/want feedback

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{handlers::check_limit, AppError, AppState, OkResponse};
use piggy_core::models::{CategoryWeekSummary, NeedWant, PurchaseItem};
use piggy_core::rollup;

/// Simplified transaction shape for the frontend feed
#[derive(Debug, Serialize)]
pub struct TransactionView {
    pub id: String,
    pub item: String,
    pub amount: f64,
    pub date: DateTime<Utc>,
    pub category: String,
}

#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    pub limit: Option<i64>,
}

/// GET /api/user/:user_id/transactions
///
/// Recent receipt-level rollups in the simplified feed shape. Amounts are
/// decimal USD.
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Query(params): Query<FeedQuery>,
) -> Result<Json<Vec<TransactionView>>, AppError> {
    let limit = check_limit(params.limit, 20, 100)?;

    let rollups = rollup::transaction_rollups(&state.db, &user_id, limit as usize)?;
    let out = rollups
        .into_iter()
        .map(|r| TransactionView {
            id: r.id,
            item: r.item_text,
            amount: r.amount,
            date: r.occurred_at,
            category: r.category,
        })
        .collect();

    Ok(Json(out))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
    pub user_id: String,
    pub limit: Option<i64>,
}

/// GET /api/semantic-search
///
/// Case-insensitive text match over item name, merchant, and category,
/// returning rows shaped like the transactions feed.
pub async fn semantic_search(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchQuery>,
) -> Result<Json<Vec<TransactionView>>, AppError> {
    let limit = check_limit(params.limit, 5, 50)?;
    if params.q.trim().is_empty() {
        return Err(AppError::bad_request("q must not be empty"));
    }

    let items = state
        .db
        .search_items_text(&params.user_id, &params.q, limit)?;
    let out = items.into_iter().map(item_view).collect();

    Ok(Json(out))
}

fn item_view(item: PurchaseItem) -> TransactionView {
    TransactionView {
        id: item.item_id.clone(),
        item: if item.item_name.is_empty() {
            item.merchant.clone()
        } else {
            item.item_name.clone()
        },
        amount: item.line_total(),
        date: item.ts,
        category: item.category,
    }
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub user_id: String,
    pub days: Option<i64>,
}

/// GET /api/stats/category
pub async fn category_stats(
    State(state): State<Arc<AppState>>,
    Query(params): Query<StatsQuery>,
) -> Result<Json<Vec<CategoryWeekSummary>>, AppError> {
    let days = params.days.unwrap_or(30);
    if !(1..=365).contains(&days) {
        return Err(AppError::bad_request("days must be between 1 and 365"));
    }

    let summaries = rollup::category_week_summaries(&state.db, &params.user_id, days)?;
    Ok(Json(summaries))
}

#[derive(Debug, Deserialize)]
pub struct ReplyRequest {
    pub item_id: String,
    pub user_needwant: NeedWant,
}

/// POST /api/reply
///
/// Records the one-time user override of the detected need/want label.
pub async fn record_reply(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ReplyRequest>,
) -> Result<Json<OkResponse>, AppError> {
    let updated = state
        .db
        .set_user_needwant(&body.item_id, body.user_needwant)?;
    if !updated {
        return Err(AppError::not_found("No such purchase item"));
    }

    Ok(Json(OkResponse { ok: true }))
}
