//! Live weekly-suggestions stream (Server-Sent Events)
//!
//! Each event is a single `data:` line of compact JSON; the event kind is
//! the `event` property of the payload, not an SSE `event:` field. The
//! pipeline feeds a bounded channel; a client that disconnects cancels
//! the run at its next suspension point.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderName, HeaderValue},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
};
use chrono::Utc;
use tokio::sync::mpsc;
use tokio_stream::{wrappers::ReceiverStream, StreamExt};
use tracing::debug;

use crate::{handlers::parse_week, AppError, AppState};
use piggy_core::{weeks, SuggestEvent, EVENT_BUFFER};

use super::reports::WeekQuery;

/// GET /api/user/:user_id/weekly_alternatives/stream
///
/// Runs the pipeline live and streams its events. When `week` is omitted
/// the most recent completed ISO week is analysed, matching the batch
/// job's default. The HTTP status is 200 once the stream starts; failures
/// arrive as a terminal `error` event.
pub async fn stream_weekly_alternatives(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Query(params): Query<WeekQuery>,
) -> Result<Response, AppError> {
    let week_start = parse_week(params.week.as_deref())?
        .unwrap_or_else(|| weeks::most_recent_completed_week(Utc::now()));

    let (tx, rx) = mpsc::channel::<SuggestEvent>(EVENT_BUFFER);
    let suggester = state.suggester();
    let stream_user = user_id.clone();
    tokio::spawn(async move {
        suggester
            .run_stream(&stream_user, week_start, false, tx)
            .await;
    });

    debug!(user_id = %user_id, week = %week_start, "Opened weekly suggestions stream");

    let stream = ReceiverStream::new(rx).map(|event| {
        let payload = serde_json::to_string(&event).unwrap_or_else(|e| {
            format!(
                r#"{{"event":"error","kind":"internal","message":"serialisation failed: {}"}}"#,
                e
            )
        });
        Ok::<_, Infallible>(Event::default().data(payload))
    });

    let mut response = Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response();

    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    // Hint reverse proxies not to buffer the stream
    headers.insert(
        HeaderName::from_static("x-accel-buffering"),
        HeaderValue::from_static("no"),
    );

    Ok(response)
}
