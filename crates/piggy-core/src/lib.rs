//! piggy Core Library
//!
//! Shared functionality for the piggy personal-finance analytics service:
//! - Purchase and report storage with pooled SQLite access
//! - Aggregation views (transaction rollups, category/week summaries)
//! - Behavioural purchase prediction with calibrated confidence
//! - Rule-based savings tips and the static deal catalog
//! - Weekly alternative-suggestions pipeline (batch and streaming)
//! - Pluggable web-search capability backends

pub mod db;
pub mod deals;
pub mod error;
pub mod models;
pub mod predict;
pub mod rollup;
pub mod search;
pub mod suggest;
pub mod tips;
pub mod weeks;

/// Test utilities including seeding helpers
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use db::Database;
pub use deals::{suggest_deals, Bundle, DealCatalog};
pub use error::{Error, Result};
pub use predict::Predictor;
pub use search::{
    HttpSearchBackend, MockSearchBackend, SearchBackend, SearchClient, SearchOutcome,
};
pub use suggest::{
    run_batch, BatchOptions, FailedUser, ItemBrief, JobLog, SuggestEvent, SuggesterConfig,
    WeeklySuggester, EVENT_BUFFER,
};
pub use tips::TipEngine;
