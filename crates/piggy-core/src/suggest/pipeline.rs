//! Weekly suggester core pipeline
//!
//! Select the week's top-priced items, determine the prevailing location,
//! build the search prompt, call the web-search capability, parse and
//! validate findings, assemble the report, persist it. Batch mode and
//! streaming mode share this pipeline; streaming re-expresses each step as
//! an ordered event.

use std::collections::HashMap;
use std::time::Instant;

use chrono::{NaiveDate, Utc};
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, info, warn};

use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::{round_cents, Finding, PurchaseItem, ReportLocation, WeeklyReport};
use crate::search::{parsing::parse_findings, SearchBackend, SearchClient, SearchOutcome};
use crate::weeks;

use super::events::{ItemBrief, SuggestEvent, EVENT_BUFFER};

/// Store retries: up to 3 attempts with exponential backoff.
const STORE_RETRIES: u32 = 3;
const STORE_BACKOFF_BASE_MS: u64 = 200;
const STORE_BACKOFF_CAP_MS: u64 = 2_000;

/// End-to-end deadline for one streaming run.
const STREAM_DEADLINE: Duration = Duration::from_secs(60);

/// Pipeline phase, for logging and error context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Selecting,
    Searching,
    Parsing,
    Persisting,
    Skipping,
}

/// Tuning knobs for the weekly suggester
#[derive(Debug, Clone)]
pub struct SuggesterConfig {
    /// Items analysed per user per week
    pub top_n: usize,
    /// Minimum savings per finding, USD
    pub min_savings_usd: f64,
    /// Upper bound on findings parsed per report
    pub max_findings: usize,
    /// Parallel users in batch mode
    pub users_concurrency: usize,
}

impl Default for SuggesterConfig {
    fn default() -> Self {
        Self {
            top_n: 5,
            min_savings_usd: 10.0,
            max_findings: 20,
            users_concurrency: 10,
        }
    }
}

impl SuggesterConfig {
    /// Read overrides from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            top_n: env_parse("PIGGY_WEEKLY_TOP_N", defaults.top_n),
            min_savings_usd: env_parse("PIGGY_MIN_SAVINGS_USD", defaults.min_savings_usd),
            max_findings: env_parse("PIGGY_SEARCH_MAX_FINDINGS", defaults.max_findings),
            users_concurrency: env_parse("PIGGY_CONCURRENCY_USERS", defaults.users_concurrency),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Why a streaming run stopped before producing a report.
enum Abort {
    /// Engine failure: surfaces as an `error` event / batch error
    Engine(Error),
    /// The event consumer disconnected; stop quietly
    ConsumerGone,
    /// The event consumer fell behind the bounded buffer
    ConsumerSlow,
}

impl From<Error> for Abort {
    fn from(e: Error) -> Self {
        Abort::Engine(e)
    }
}

/// Bounded, strictly ordered event emitter. `None` in batch mode.
struct EventSink<'a> {
    tx: Option<&'a mpsc::Sender<SuggestEvent>>,
}

impl<'a> EventSink<'a> {
    fn emit(&self, event: SuggestEvent) -> std::result::Result<(), Abort> {
        let Some(tx) = self.tx else { return Ok(()) };
        match tx.try_send(event) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(Abort::ConsumerGone),
            Err(mpsc::error::TrySendError::Full(_)) => Err(Abort::ConsumerSlow),
        }
    }
}

/// Generates and persists weekly alternative-suggestion reports
#[derive(Clone)]
pub struct WeeklySuggester {
    db: Database,
    search: Option<SearchClient>,
    config: SuggesterConfig,
}

impl WeeklySuggester {
    pub fn new(db: Database, search: Option<SearchClient>, config: SuggesterConfig) -> Self {
        Self { db, search, config }
    }

    pub fn config(&self) -> &SuggesterConfig {
        &self.config
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Run the pipeline to completion and return the report (batch mode).
    pub async fn run(
        &self,
        user_id: &str,
        week_start: NaiveDate,
        dry_run: bool,
    ) -> Result<WeeklyReport> {
        match self.drive(user_id, week_start, dry_run, &EventSink { tx: None }).await {
            Ok(report) => Ok(report),
            // Without a sink these cannot occur, but keep the mapping total
            Err(Abort::Engine(e)) => Err(e),
            Err(Abort::ConsumerGone) | Err(Abort::ConsumerSlow) => {
                Err(Error::Cancelled("event consumer aborted".to_string()))
            }
        }
    }

    /// Run the pipeline as an ordered event stream (live view).
    ///
    /// Events go to `tx`, which must be created with capacity
    /// [`EVENT_BUFFER`]. The stream always ends with `complete` or `error`;
    /// a disconnected consumer aborts the run and skips persistence if it
    /// has not happened yet.
    pub async fn run_stream(
        &self,
        user_id: &str,
        week_start: NaiveDate,
        dry_run: bool,
        tx: mpsc::Sender<SuggestEvent>,
    ) {
        debug_assert!(tx.max_capacity() <= EVENT_BUFFER);

        let sink = EventSink { tx: Some(&tx) };
        let outcome = timeout(
            STREAM_DEADLINE,
            self.drive(user_id, week_start, dry_run, &sink),
        )
        .await;

        match outcome {
            Ok(Ok(_)) => {}
            Ok(Err(Abort::Engine(e))) => {
                warn!(user_id = %user_id, error = %e, "Streaming weekly run failed");
                let _ = tx.try_send(SuggestEvent::error(e.kind(), e.to_string()));
            }
            Ok(Err(Abort::ConsumerGone)) => {
                debug!(user_id = %user_id, "Stream consumer disconnected, run aborted");
            }
            Ok(Err(Abort::ConsumerSlow)) => {
                warn!(user_id = %user_id, "Stream consumer fell behind, run aborted");
                let _ = tx.try_send(SuggestEvent::error(
                    "consumer_slow",
                    "event buffer overflowed; stream cancelled",
                ));
            }
            Err(_) => {
                warn!(user_id = %user_id, "Streaming weekly run hit the 60s deadline");
                let _ = tx.try_send(SuggestEvent::error(
                    "timeout",
                    "weekly suggestions run exceeded its deadline",
                ));
            }
        }
    }

    /// The shared pipeline. Emits events through `sink` when streaming.
    async fn drive(
        &self,
        user_id: &str,
        week_start: NaiveDate,
        dry_run: bool,
        sink: &EventSink<'_>,
    ) -> std::result::Result<WeeklyReport, Abort> {
        let started = Instant::now();

        sink.emit(SuggestEvent::Start {
            user_id: user_id.to_string(),
            week_start,
            at: Utc::now(),
        })?;

        // Step 1: select the week's top-priced items
        debug!(user_id = %user_id, week = %week_start, phase = ?Phase::Selecting, "Selecting items");
        let items = self
            .with_store_retries(|| self.db.top_items_by_price(user_id, week_start, self.config.top_n as i64))
            .await?;

        sink.emit(SuggestEvent::ItemsLoaded {
            count: items.len(),
            items: items
                .iter()
                .map(|i| ItemBrief {
                    name: i.item_name.clone(),
                    price: i.price,
                    merchant: i.merchant.clone(),
                })
                .collect(),
        })?;

        if items.is_empty() {
            // No purchases this week: an empty report, still persisted so
            // the (user, week) row exists
            let report = self.assemble(
                user_id, week_start, None, 0, Vec::new(), None, 0, started,
            );
            self.persist(&report, dry_run).await?;
            sink.emit(SuggestEvent::Complete {
                items_analyzed: 0,
                items_with_alternatives: 0,
                total_savings: 0.0,
                processing_time_ms: report.processing_time_ms,
            })?;
            return Ok(report);
        }

        // Step 2: prevailing location for the week
        let location = prevailing_location(&items);

        // Step 3: build the prompt
        let prompt = build_prompt(&items, location.as_ref(), self.config.min_savings_usd);

        // Step 4: call the web-search capability
        sink.emit(SuggestEvent::Analyzing {
            message: "Searching retailers for cheaper alternatives...".to_string(),
        })?;
        debug!(user_id = %user_id, phase = ?Phase::Searching, "Calling search capability");
        let outcome = self.call_capability(&prompt, sink).await?;

        // Step 5: parse and validate
        debug!(user_id = %user_id, phase = ?Phase::Parsing, "Parsing findings");
        let (findings, parse_failure) = match parse_findings(
            &outcome.final_text,
            self.config.min_savings_usd,
            self.config.max_findings,
        ) {
            Ok(findings) => (findings, None),
            // Recorded, not thrown: the report persists with zero findings
            Err(Error::Parse(msg)) => (Vec::new(), Some(msg)),
            Err(e) => return Err(e.into()),
        };

        for finding in &findings {
            sink.emit(SuggestEvent::Found {
                finding: finding.clone(),
            })?;
        }

        // Steps 6 & 7: assemble and persist
        let notes = parse_failure
            .as_ref()
            .map(|msg| format!("parse_error: {}", msg));
        let report = self.assemble(
            user_id,
            week_start,
            location,
            items.len() as i64,
            findings,
            notes,
            outcome.calls_made,
            started,
        );
        self.persist(&report, dry_run).await?;

        if let Some(msg) = parse_failure {
            sink.emit(SuggestEvent::error("parse_error", msg))?;
        } else {
            sink.emit(SuggestEvent::Complete {
                items_analyzed: report.items_analyzed,
                items_with_alternatives: report.items_with_alternatives,
                total_savings: report.total_savings,
                processing_time_ms: report.processing_time_ms,
            })?;
        }

        info!(
            user_id = %user_id,
            week = %week_start,
            items = report.items_analyzed,
            alternatives = report.items_with_alternatives,
            savings = report.total_savings,
            "Weekly suggestions run finished"
        );
        Ok(report)
    }

    /// Call the capability: stream chunks when a sink is attached, retry
    /// once on transport failure, never retry quota errors.
    async fn call_capability(
        &self,
        prompt: &str,
        sink: &EventSink<'_>,
    ) -> std::result::Result<SearchOutcome, Abort> {
        let Some(search) = &self.search else {
            return Err(Abort::Engine(Error::CapabilityUnavailable(
                "no search backend configured".to_string(),
            )));
        };

        let mut attempts = 0;
        loop {
            attempts += 1;
            let result = if sink.tx.is_some() {
                self.call_streaming(search, prompt, sink).await
            } else {
                search.run(prompt).await.map_err(Abort::Engine)
            };

            match result {
                Ok(outcome) => return Ok(outcome),
                Err(Abort::Engine(Error::CapabilityUnavailable(msg))) if attempts < 2 => {
                    warn!(error = %msg, "Search capability unavailable, retrying once");
                }
                Err(other) => return Err(other),
            }
        }
    }

    /// Streaming capability call: forward chunks to the sink as
    /// `progress` events while the backend works.
    async fn call_streaming(
        &self,
        search: &SearchClient,
        prompt: &str,
        sink: &EventSink<'_>,
    ) -> std::result::Result<SearchOutcome, Abort> {
        let (chunk_tx, mut chunk_rx) = mpsc::channel::<String>(EVENT_BUFFER);
        let backend = search.clone();
        let prompt = prompt.to_string();
        let call = tokio::spawn(async move { backend.run_stream(&prompt, chunk_tx).await });

        let mut forward_error: Option<Abort> = None;
        while let Some(chunk) = chunk_rx.recv().await {
            if forward_error.is_none() {
                if let Err(abort) = sink.emit(SuggestEvent::Progress { chunk }) {
                    // Keep draining so the backend task can finish, but
                    // remember why forwarding stopped
                    forward_error = Some(abort);
                }
            }
        }

        let outcome = call
            .await
            .map_err(|e| Abort::Engine(Error::InvalidData(format!("search task panicked: {}", e))))?
            .map_err(Abort::Engine);

        match forward_error {
            Some(abort) => Err(abort),
            None => outcome,
        }
    }

    /// Retry a store operation with exponential backoff.
    async fn with_store_retries<T>(
        &self,
        op: impl Fn() -> Result<T>,
    ) -> std::result::Result<T, Abort> {
        let mut backoff = STORE_BACKOFF_BASE_MS;
        for attempt in 1..=STORE_RETRIES {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if e.is_store_error() && attempt < STORE_RETRIES => {
                    warn!(error = %e, attempt, "Store query failed, backing off");
                    sleep(Duration::from_millis(backoff)).await;
                    backoff = (backoff * 2).min(STORE_BACKOFF_CAP_MS);
                }
                Err(e) => return Err(Abort::Engine(e)),
            }
        }
        unreachable!("retry loop always returns")
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        &self,
        user_id: &str,
        week_start: NaiveDate,
        location: Option<ReportLocation>,
        items_analyzed: i64,
        findings: Vec<Finding>,
        notes: Option<String>,
        mcp_calls_made: i64,
        started: Instant,
    ) -> WeeklyReport {
        let total_savings = round_cents(findings.iter().map(|f| f.total_savings).sum());
        let now = Utc::now();
        WeeklyReport {
            report_id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            week_start,
            week_end: weeks::week_end(week_start),
            location,
            items_analyzed,
            items_with_alternatives: findings.len() as i64,
            total_savings,
            findings,
            notes,
            mcp_calls_made,
            processing_time_ms: started.elapsed().as_millis() as i64,
            created_at: now,
            updated_at: now,
        }
    }

    /// Persist unless dry-run; on a lost upsert race, read-modify-retry once.
    async fn persist(&self, report: &WeeklyReport, dry_run: bool) -> std::result::Result<(), Abort> {
        if dry_run {
            debug!(user_id = %report.user_id, phase = ?Phase::Skipping, "Dry run, skipping persist");
            return Ok(());
        }

        debug!(user_id = %report.user_id, phase = ?Phase::Persisting, "Persisting report");
        match self.db.upsert_weekly_report(report) {
            Ok(()) => Ok(()),
            Err(Error::PersistConflict(_)) => {
                warn!(user_id = %report.user_id, "Upsert conflict, retrying once");
                self.db
                    .upsert_weekly_report(report)
                    .map_err(|e| Abort::Engine(e))
            }
            Err(e) => Err(Abort::Engine(e)),
        }
    }
}

/// Mode of the week's buyer locations; ties broken by most recent sighting.
fn prevailing_location(items: &[PurchaseItem]) -> Option<ReportLocation> {
    let mut counts: HashMap<(String, String, String), (usize, chrono::DateTime<Utc>)> =
        HashMap::new();
    for item in items {
        let Some(loc) = &item.buyer_location else {
            continue;
        };
        let key = (loc.city.clone(), loc.state.clone(), loc.country.clone());
        let entry = counts.entry(key).or_insert((0, item.ts));
        entry.0 += 1;
        if item.ts > entry.1 {
            entry.1 = item.ts;
        }
    }

    counts
        .into_iter()
        .max_by_key(|(_, (count, latest))| (*count, *latest))
        .map(|((city, state, country), _)| ReportLocation {
            city,
            state,
            country,
        })
}

/// Assemble the capability prompt: the items, the location, and the
/// constraints a valid findings array must satisfy.
fn build_prompt(items: &[PurchaseItem], location: Option<&ReportLocation>, min_savings: f64) -> String {
    let mut lines = Vec::new();
    for (i, item) in items.iter().enumerate() {
        lines.push(format!(
            "{}. {} - paid ${:.2} at {} ({})",
            i + 1,
            item.item_name,
            item.price,
            item.merchant,
            item.category,
        ));
    }
    let items_text = lines.join("\n");

    let location_text = location
        .map(|l| format!("{}, {}, {}", l.city, l.state, l.country))
        .unwrap_or_else(|| "unknown".to_string());

    format!(
        "You are a shopping assistant finding cheaper alternatives for recent purchases.\n\
         \n\
         BUYER LOCATION: {location_text}\n\
         \n\
         PURCHASES (top {count} by price):\n\
         {items_text}\n\
         \n\
         For each item, search major retailers for a cheaper exact or equivalent product.\n\
         Requirements:\n\
         - Verify the exact product (UPC, model number, or exact name).\n\
         - Compare the total landed cost: price + shipping + taxes.\n\
         - Only report alternatives saving more than ${min_savings:.2} in total.\n\
         - Each alternative must have a purchasable URL.\n\
         - Mark each finding's channel as \"local\" or \"online\".\n\
         \n\
         Respond with ONLY a JSON array. Each entry must have exactly these fields:\n\
         item_name, original_price, original_merchant, alternative_merchant,\n\
         alternative_price, shipping_cost, tax_estimate, total_landed_cost,\n\
         total_savings, url, notes, channel, confidence.\n\
         If nothing qualifies, respond with an empty array: []",
        location_text = location_text,
        count = items.len(),
        items_text = items_text,
        min_savings = min_savings,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BuyerLocation;
    use crate::search::{MockFailure, MockSearchBackend};
    use crate::test_utils::item_at;
    use chrono::TimeZone;

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 11, 10).unwrap()
    }

    fn seed_week(db: &Database, n: usize) {
        for i in 0..n {
            let ts = Utc.with_ymd_and_hms(2025, 11, 10 + i as u32, 12, 0, 0).unwrap();
            let mut item = item_at("u1", &format!("i{i}"), &format!("p{i}"), ts);
            item.price = 50.0 + i as f64;
            db.insert_purchase_item(&item).unwrap();
        }
    }

    fn finding_json() -> &'static str {
        r#"[{
            "item_name": "Latte",
            "original_price": 51.0,
            "original_merchant": "Starbucks",
            "alternative_merchant": "Dunkin",
            "alternative_price": 30.0,
            "shipping_cost": 0.0,
            "tax_estimate": 2.0,
            "total_landed_cost": 32.0,
            "total_savings": 19.0,
            "url": "https://dunkin.example/latte",
            "notes": "same size",
            "channel": "local",
            "confidence": 0.8
        }]"#
    }

    fn suggester(db: &Database, mock: MockSearchBackend) -> WeeklySuggester {
        WeeklySuggester::new(
            db.clone(),
            Some(SearchClient::mock(mock)),
            SuggesterConfig::default(),
        )
    }

    async fn collect_events(
        suggester: &WeeklySuggester,
        user: &str,
        week: NaiveDate,
    ) -> Vec<SuggestEvent> {
        let (tx, mut rx) = mpsc::channel(EVENT_BUFFER);
        let s = suggester.clone();
        let user = user.to_string();
        let task = tokio::spawn(async move { s.run_stream(&user, week, false, tx).await });

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        task.await.unwrap();
        events
    }

    #[tokio::test]
    async fn test_batch_happy_path() {
        let db = Database::in_memory().unwrap();
        seed_week(&db, 2);
        let s = suggester(&db, MockSearchBackend::with_response(finding_json()));

        let report = s.run("u1", monday(), false).await.unwrap();
        assert_eq!(report.items_analyzed, 2);
        assert_eq!(report.items_with_alternatives, 1);
        assert_eq!(report.total_savings, 19.0);
        assert_eq!(report.mcp_calls_made, 1);
        assert!(report.notes.is_none());

        // Persisted and readable back
        let stored = db.get_weekly_report("u1", Some(monday())).unwrap().unwrap();
        assert_eq!(stored.items_with_alternatives, 1);
        assert_eq!(stored.findings.len(), 1);
        assert_eq!(stored.findings[0].alternative_merchant, "Dunkin");
    }

    #[tokio::test]
    async fn test_empty_week_persists_empty_report() {
        let db = Database::in_memory().unwrap();
        let s = suggester(&db, MockSearchBackend::with_response("[]"));

        let report = s.run("u1", monday(), false).await.unwrap();
        assert_eq!(report.items_analyzed, 0);
        assert!(report.findings.is_empty());
        assert_eq!(report.mcp_calls_made, 0);

        // Invariant: the empty report is upserted like any other
        let stored = db.get_weekly_report("u1", Some(monday())).unwrap().unwrap();
        assert_eq!(stored.items_analyzed, 0);
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let db = Database::in_memory().unwrap();
        seed_week(&db, 2);
        let s = suggester(&db, MockSearchBackend::with_response(finding_json()));

        let report = s.run("u1", monday(), true).await.unwrap();
        assert_eq!(report.items_with_alternatives, 1);
        assert!(db.get_weekly_report("u1", Some(monday())).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_parse_failure_is_recorded_not_thrown() {
        let db = Database::in_memory().unwrap();
        seed_week(&db, 2);
        let s = suggester(&db, MockSearchBackend::with_response("no json here, sorry"));

        let report = s.run("u1", monday(), false).await.unwrap();
        assert_eq!(report.items_analyzed, 2);
        assert_eq!(report.items_with_alternatives, 0);
        assert!(report.notes.as_deref().unwrap().starts_with("parse_error"));

        let stored = db.get_weekly_report("u1", Some(monday())).unwrap().unwrap();
        assert_eq!(stored.items_with_alternatives, 0);
        assert!(stored.notes.is_some());
    }

    #[tokio::test]
    async fn test_capability_unavailable_retries_once() {
        let db = Database::in_memory().unwrap();
        seed_week(&db, 2);
        let mock = MockSearchBackend::flaky(1, MockFailure::Unavailable, finding_json());
        let s = suggester(&db, mock.clone());

        let report = s.run("u1", monday(), false).await.unwrap();
        assert_eq!(report.items_with_alternatives, 1);
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_capability_down_fails_after_retry() {
        let db = Database::in_memory().unwrap();
        seed_week(&db, 2);
        let mock = MockSearchBackend::failing(MockFailure::Unavailable);
        let s = suggester(&db, mock.clone());

        let err = s.run("u1", monday(), false).await.unwrap_err();
        assert_eq!(err.kind(), "capability_unavailable");
        assert_eq!(mock.call_count(), 2);
        assert!(db.get_weekly_report("u1", Some(monday())).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_quota_error_is_terminal() {
        let db = Database::in_memory().unwrap();
        seed_week(&db, 2);
        let mock = MockSearchBackend::failing(MockFailure::Quota);
        let s = suggester(&db, mock.clone());

        let err = s.run("u1", monday(), false).await.unwrap_err();
        assert_eq!(err.kind(), "capability_quota");
        // No retry on quota
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_stream_happy_path_event_order() {
        let db = Database::in_memory().unwrap();
        seed_week(&db, 2);
        let s = suggester(
            &db,
            MockSearchBackend::with_chunks(vec![
                "searching Best Buy...".to_string(),
                finding_json().to_string(),
            ]),
        );

        let events = collect_events(&s, "u1", monday()).await;
        let names: Vec<&str> = events.iter().map(|e| e.name()).collect();

        assert_eq!(names[0], "start");
        assert_eq!(names[1], "items_loaded");
        assert_eq!(names[2], "analyzing");
        assert_eq!(*names.last().unwrap(), "complete");

        let progress = names.iter().filter(|n| **n == "progress").count();
        assert_eq!(progress, 2);
        let found = names.iter().filter(|n| **n == "found").count();
        assert_eq!(found, 1);

        // Chunk text must not concatenate in a way that corrupts the parse
        match &events[1] {
            SuggestEvent::ItemsLoaded { count, items } => {
                assert_eq!(*count, 2);
                assert_eq!(items.len(), 2);
            }
            other => panic!("expected items_loaded, got {:?}", other.name()),
        }
        match events.last().unwrap() {
            SuggestEvent::Complete {
                items_analyzed,
                items_with_alternatives,
                total_savings,
                ..
            } => {
                assert_eq!(*items_analyzed, 2);
                assert_eq!(*items_with_alternatives, 1);
                assert_eq!(*total_savings, 19.0);
            }
            other => panic!("expected complete, got {:?}", other.name()),
        }
    }

    #[tokio::test]
    async fn test_stream_parse_failure_persists_then_errors() {
        let db = Database::in_memory().unwrap();
        seed_week(&db, 2);
        let s = suggester(&db, MockSearchBackend::with_response("malformed {{"));

        let events = collect_events(&s, "u1", monday()).await;
        let names: Vec<&str> = events.iter().map(|e| e.name()).collect();

        assert_eq!(names[0], "start");
        assert_eq!(names[1], "items_loaded");
        assert_eq!(names[2], "analyzing");
        match events.last().unwrap() {
            SuggestEvent::Error { kind, .. } => assert_eq!(kind, "parse_error"),
            other => panic!("expected error, got {:?}", other.name()),
        }

        // The report was still persisted with zero findings and a note
        let stored = db.get_weekly_report("u1", Some(monday())).unwrap().unwrap();
        assert_eq!(stored.items_with_alternatives, 0);
        assert!(stored.notes.is_some());
    }

    #[tokio::test]
    async fn test_stream_empty_week_completes() {
        let db = Database::in_memory().unwrap();
        let s = suggester(&db, MockSearchBackend::with_response("[]"));

        let events = collect_events(&s, "u1", monday()).await;
        let names: Vec<&str> = events.iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["start", "items_loaded", "complete"]);
    }

    #[tokio::test]
    async fn test_stream_capability_error_event() {
        let db = Database::in_memory().unwrap();
        seed_week(&db, 2);
        let s = suggester(&db, MockSearchBackend::failing(MockFailure::Quota));

        let events = collect_events(&s, "u1", monday()).await;
        match events.last().unwrap() {
            SuggestEvent::Error { kind, .. } => assert_eq!(kind, "capability_quota"),
            other => panic!("expected error, got {:?}", other.name()),
        }
    }

    #[tokio::test]
    async fn test_disconnected_consumer_skips_persistence() {
        let db = Database::in_memory().unwrap();
        seed_week(&db, 2);
        let s = suggester(&db, MockSearchBackend::with_response(finding_json()));

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        drop(rx);
        s.run_stream("u1", monday(), false, tx).await;

        assert!(db.get_weekly_report("u1", Some(monday())).unwrap().is_none());
    }

    fn located_item(
        item_id: &str,
        ts: chrono::DateTime<Utc>,
        loc: &BuyerLocation,
    ) -> PurchaseItem {
        PurchaseItem {
            item_id: item_id.to_string(),
            purchase_id: format!("p-{item_id}"),
            user_id: "u1".to_string(),
            merchant: "Starbucks".to_string(),
            item_name: "Latte".to_string(),
            category: "Coffee".to_string(),
            subcategory: None,
            item_text: "Starbucks · Coffee · Latte".to_string(),
            price: 7.25,
            qty: 1.0,
            ts,
            detected_needwant: crate::models::NeedWant::Want,
            user_needwant: crate::models::NeedWant::Unset,
            confidence: 0.9,
            buyer_location: Some(loc.clone()),
            item_embed: None,
            status: crate::models::ItemStatus::Active,
            created_at: ts,
        }
    }

    #[test]
    fn test_prevailing_location_mode_with_recency_tiebreak() {
        let base = Utc.with_ymd_and_hms(2025, 11, 10, 8, 0, 0).unwrap();
        let princeton = BuyerLocation {
            city: "Princeton".into(),
            state: "NJ".into(),
            country: "US".into(),
            postal_code: None,
        };
        let nyc = BuyerLocation {
            city: "New York".into(),
            state: "NY".into(),
            country: "US".into(),
            postal_code: None,
        };

        let a = located_item("a", base, &princeton);
        let b = located_item("b", base + chrono::Duration::hours(1), &nyc);
        // One sighting each: the more recent wins the tie
        let location = prevailing_location(&[a.clone(), b.clone()]).unwrap();
        assert_eq!(location.city, "New York");

        // A second Princeton sighting outweighs recency
        let c = located_item("c", base + chrono::Duration::minutes(30), &princeton);
        let location = prevailing_location(&[a, b, c]).unwrap();
        assert_eq!(location.city, "Princeton");
    }

    #[test]
    fn test_build_prompt_mentions_constraints() {
        let base = Utc.with_ymd_and_hms(2025, 11, 10, 8, 0, 0).unwrap();
        let princeton = BuyerLocation {
            city: "Princeton".into(),
            state: "NJ".into(),
            country: "US".into(),
            postal_code: None,
        };
        let item = located_item("a", base, &princeton);
        let report_loc = ReportLocation {
            city: princeton.city.clone(),
            state: princeton.state.clone(),
            country: princeton.country.clone(),
        };

        let prompt = build_prompt(&[item], Some(&report_loc), 10.0);
        assert!(prompt.contains("Latte"));
        assert!(prompt.contains("Princeton"));
        assert!(prompt.contains("$10.00"));
        assert!(prompt.contains("total_landed_cost"));
        assert!(prompt.contains("JSON array"));
    }
}
