//! Error types for piggy

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Search capability unavailable: {0}")]
    CapabilityUnavailable(String),

    #[error("Search capability quota exhausted: {0}")]
    CapabilityQuota(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Persist conflict: {0}")]
    PersistConflict(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl Error {
    /// Stable machine-readable kind, used by the HTTP facade and in
    /// streaming error events.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::BadRequest(_) => "bad_request",
            Error::NotFound(_) => "not_found",
            Error::Database(_) | Error::Pool(_) | Error::StoreUnavailable(_) => "store_unavailable",
            Error::Http(_) | Error::CapabilityUnavailable(_) => "capability_unavailable",
            Error::CapabilityQuota(_) => "capability_quota",
            Error::Parse(_) => "parse_error",
            Error::PersistConflict(_) => "persist_conflict",
            Error::Timeout(_) => "timeout",
            Error::Cancelled(_) => "cancelled",
            Error::Io(_) | Error::Json(_) | Error::InvalidData(_) => "internal",
        }
    }

    /// Whether the error comes from the purchase/report store and is worth
    /// retrying with backoff.
    pub fn is_store_error(&self) -> bool {
        matches!(
            self,
            Error::Database(_) | Error::Pool(_) | Error::StoreUnavailable(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
