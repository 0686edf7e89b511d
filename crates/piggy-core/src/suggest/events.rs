//! Streaming events for the weekly suggester
//!
//! One streaming run emits a strictly ordered sequence:
//! `start · items_loaded · analyzing · progress* · found* · complete`,
//! or a terminal `error` event. The emitter buffers at most 16 pending
//! events; a consumer that falls behind cancels the stream.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::models::Finding;

/// Bound on pending events per stream.
pub const EVENT_BUFFER: usize = 16;

/// A line item echoed back to the consumer after selection
#[derive(Debug, Clone, Serialize)]
pub struct ItemBrief {
    pub name: String,
    pub price: f64,
    pub merchant: String,
}

/// One frame of the weekly-suggestions live view
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SuggestEvent {
    Start {
        user_id: String,
        week_start: NaiveDate,
        at: DateTime<Utc>,
    },
    ItemsLoaded {
        count: usize,
        items: Vec<ItemBrief>,
    },
    Analyzing {
        message: String,
    },
    Progress {
        chunk: String,
    },
    Found {
        #[serde(flatten)]
        finding: Finding,
    },
    Complete {
        items_analyzed: i64,
        items_with_alternatives: i64,
        total_savings: f64,
        processing_time_ms: i64,
    },
    Error {
        kind: String,
        message: String,
        at: DateTime<Utc>,
    },
}

impl SuggestEvent {
    pub fn error(kind: &str, message: impl Into<String>) -> Self {
        SuggestEvent::Error {
            kind: kind.to_string(),
            message: message.into(),
            at: Utc::now(),
        }
    }

    /// The `event` discriminator this frame serialises with.
    pub fn name(&self) -> &'static str {
        match self {
            SuggestEvent::Start { .. } => "start",
            SuggestEvent::ItemsLoaded { .. } => "items_loaded",
            SuggestEvent::Analyzing { .. } => "analyzing",
            SuggestEvent::Progress { .. } => "progress",
            SuggestEvent::Found { .. } => "found",
            SuggestEvent::Complete { .. } => "complete",
            SuggestEvent::Error { .. } => "error",
        }
    }
}
