//! HTTP handlers, organized by surface area

mod deals;
mod health;
mod predictions;
mod reports;
mod stream;
mod tips;
mod transactions;

pub use deals::better_deals;
pub use health::health;
pub use predictions::predict;
pub use reports::{get_weekly_alternatives, weekly_alternatives_history};
pub use stream::stream_weekly_alternatives;
pub use tips::smart_tips;
pub use transactions::{category_stats, list_transactions, record_reply, semantic_search};

use crate::AppError;

/// Bound-check an optional limit parameter against `[1, max]`.
pub(crate) fn check_limit(limit: Option<i64>, default: i64, max: i64) -> Result<i64, AppError> {
    let limit = limit.unwrap_or(default);
    if limit < 1 || limit > max {
        return Err(AppError::bad_request(&format!(
            "limit must be between 1 and {}",
            max
        )));
    }
    Ok(limit)
}

/// Parse an optional `week=YYYY-MM-DD` parameter.
pub(crate) fn parse_week(week: Option<&str>) -> Result<Option<chrono::NaiveDate>, AppError> {
    match week {
        None => Ok(None),
        Some(raw) => chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| AppError::bad_request("week must be a YYYY-MM-DD date")),
    }
}
