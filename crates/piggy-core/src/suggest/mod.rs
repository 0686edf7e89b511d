//! Weekly alternative-suggestions pipeline
//!
//! The core pipeline (`pipeline`) selects a user's top-priced items for a
//! week, asks the web-search capability for cheaper substitutes, validates
//! the findings, and persists one report per (user, week). `batch` wraps
//! it as the scheduled job; `events` defines the live streaming frames.

mod batch;
mod events;
mod pipeline;

pub use batch::{run_batch, BatchOptions, FailedUser, JobLog};
pub use events::{ItemBrief, SuggestEvent, EVENT_BUFFER};
pub use pipeline::{SuggesterConfig, WeeklySuggester};
