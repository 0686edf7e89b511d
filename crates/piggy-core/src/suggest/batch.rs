//! Scheduled weekly-suggestions job
//!
//! Iterates the week's active users with bounded parallelism, one report
//! per user. A failed user is recorded in the job log and never blocks the
//! others. A per-week lease file prevents two jobs from racing on the same
//! week; re-running simply replaces each report via upsert.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::models::round_cents;
use crate::weeks;

use super::pipeline::WeeklySuggester;

/// Batch invocation parameters
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    /// Week to process; defaults to the most recent completed ISO week (UTC)
    pub week_start: Option<NaiveDate>,
    /// Restrict the run to one user
    pub user_id: Option<String>,
    /// Compute everything but write no reports
    pub dry_run: bool,
    /// Override the configured user parallelism
    pub concurrency: Option<usize>,
    /// Where the week lease file lives; defaults to the system temp dir
    pub lease_dir: Option<PathBuf>,
}

/// One failed user in the job log
#[derive(Debug, Clone, Serialize)]
pub struct FailedUser {
    pub user_id: String,
    pub kind: String,
    pub message: String,
}

/// JSON job log emitted after a batch run
#[derive(Debug, Clone, Serialize)]
pub struct JobLog {
    pub job_at: DateTime<Utc>,
    pub week_start: NaiveDate,
    pub dry_run: bool,
    pub total_users: i64,
    pub successful: i64,
    pub failed: i64,
    pub failed_users: Vec<FailedUser>,
    pub items_analyzed: i64,
    pub alternatives_found: i64,
    pub total_savings: f64,
    pub mcp_calls_made: i64,
    pub processing_time_ms: i64,
}

/// Advisory lease preventing two concurrent jobs for the same week.
///
/// Best-effort: a lock file named for the week, removed on drop.
struct WeekLease {
    path: PathBuf,
}

impl WeekLease {
    fn acquire(dir: &Path, week_start: NaiveDate) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("piggy-weekly-{}.lock", week_start));

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => Ok(Self { path }),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(Error::PersistConflict(format!(
                    "weekly job already running for {} (lease: {})",
                    week_start,
                    path.display()
                )))
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for WeekLease {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Run the weekly-suggestions job.
///
/// `cancel` is a cooperative stop signal: in-flight users finish their
/// current report, queued users are skipped.
pub async fn run_batch(
    suggester: &WeeklySuggester,
    opts: BatchOptions,
    cancel: Option<Arc<AtomicBool>>,
) -> Result<JobLog> {
    let started = Instant::now();
    let job_at = Utc::now();
    let week_start = opts
        .week_start
        .unwrap_or_else(|| weeks::most_recent_completed_week(Utc::now()));

    let lease_dir = opts.lease_dir.clone().unwrap_or_else(std::env::temp_dir);
    let _lease = WeekLease::acquire(&lease_dir, week_start)?;

    let users = match &opts.user_id {
        Some(user) => vec![user.clone()],
        None => suggester.db().active_users_for_week(week_start)?,
    };

    info!(
        week = %week_start,
        users = users.len(),
        dry_run = opts.dry_run,
        "Starting weekly suggestions job"
    );

    let concurrency = opts
        .concurrency
        .unwrap_or(suggester.config().users_concurrency)
        .max(1);
    let semaphore = Arc::new(Semaphore::new(concurrency));

    let mut handles = Vec::new();
    for user_id in users {
        if let Some(cancel) = &cancel {
            if cancel.load(Ordering::SeqCst) {
                warn!(user_id = %user_id, "Job cancelled, skipping remaining users");
                break;
            }
        }

        let semaphore = semaphore.clone();
        let suggester = suggester.clone();
        let dry_run = opts.dry_run;
        handles.push(tokio::spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    return (
                        user_id,
                        Err(Error::Cancelled("job semaphore closed".to_string())),
                    )
                }
            };
            let result = suggester.run(&user_id, week_start, dry_run).await;
            (user_id, result)
        }));
    }

    let total_users = handles.len() as i64;
    let mut log = JobLog {
        job_at,
        week_start,
        dry_run: opts.dry_run,
        total_users,
        successful: 0,
        failed: 0,
        failed_users: Vec::new(),
        items_analyzed: 0,
        alternatives_found: 0,
        total_savings: 0.0,
        mcp_calls_made: 0,
        processing_time_ms: 0,
    };

    for handle in handles {
        match handle.await {
            Ok((user_id, Ok(report))) => {
                log.successful += 1;
                log.items_analyzed += report.items_analyzed;
                log.alternatives_found += report.items_with_alternatives;
                log.total_savings += report.total_savings;
                log.mcp_calls_made += report.mcp_calls_made;
                if report.notes.is_some() {
                    // Parse failures persist an empty report and count as
                    // success; surface them in the log anyway
                    warn!(user_id = %user_id, "Report persisted with a recorded parse failure");
                }
            }
            Ok((user_id, Err(e))) => {
                warn!(user_id = %user_id, error = %e, "User failed in weekly job");
                log.failed += 1;
                log.failed_users.push(FailedUser {
                    user_id,
                    kind: e.kind().to_string(),
                    message: e.to_string(),
                });
            }
            Err(join_err) => {
                log.failed += 1;
                log.failed_users.push(FailedUser {
                    user_id: "unknown".to_string(),
                    kind: "internal".to_string(),
                    message: format!("user task panicked: {}", join_err),
                });
            }
        }
    }

    log.total_savings = round_cents(log.total_savings);
    log.processing_time_ms = started.elapsed().as_millis() as i64;

    info!(
        week = %week_start,
        successful = log.successful,
        failed = log.failed,
        savings = log.total_savings,
        elapsed_ms = log.processing_time_ms,
        "Weekly suggestions job finished"
    );

    Ok(log)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::search::{MockFailure, MockSearchBackend, SearchClient};
    use crate::suggest::SuggesterConfig;
    use crate::test_utils::seed_item;
    use chrono::TimeZone;

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 11, 10).unwrap()
    }

    fn suggester(db: &Database, mock: MockSearchBackend) -> WeeklySuggester {
        WeeklySuggester::new(
            db.clone(),
            Some(SearchClient::mock(mock)),
            SuggesterConfig::default(),
        )
    }

    fn opts(lease_dir: &tempfile::TempDir) -> BatchOptions {
        BatchOptions {
            week_start: Some(monday()),
            lease_dir: Some(lease_dir.path().to_path_buf()),
            ..Default::default()
        }
    }

    fn seed_three_users(db: &Database) {
        for (u, user) in ["u1", "u2", "u3"].iter().enumerate() {
            let ts = Utc.with_ymd_and_hms(2025, 11, 11, 9 + u as u32, 0, 0).unwrap();
            seed_item(db, user, &format!("{user}-i1"), &format!("{user}-p1"), ts);
        }
    }

    #[tokio::test]
    async fn test_batch_processes_all_users() {
        let db = Database::in_memory().unwrap();
        seed_three_users(&db);
        let dir = tempfile::tempdir().unwrap();
        let s = suggester(&db, MockSearchBackend::with_response("[]"));

        let log = run_batch(&s, opts(&dir), None).await.unwrap();
        assert_eq!(log.total_users, 3);
        assert_eq!(log.successful, 3);
        assert_eq!(log.failed, 0);
        assert_eq!(log.items_analyzed, 3);

        for user in ["u1", "u2", "u3"] {
            assert!(db.get_weekly_report(user, Some(monday())).unwrap().is_some());
        }
    }

    #[tokio::test]
    async fn test_single_user_run() {
        let db = Database::in_memory().unwrap();
        seed_three_users(&db);
        let dir = tempfile::tempdir().unwrap();
        let s = suggester(&db, MockSearchBackend::with_response("[]"));

        let mut options = opts(&dir);
        options.user_id = Some("u2".to_string());
        let log = run_batch(&s, options, None).await.unwrap();

        assert_eq!(log.total_users, 1);
        assert!(db.get_weekly_report("u2", Some(monday())).unwrap().is_some());
        assert!(db.get_weekly_report("u1", Some(monday())).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_one_failure_does_not_block_others() {
        let db = Database::in_memory().unwrap();
        seed_three_users(&db);
        let dir = tempfile::tempdir().unwrap();
        // Every user's first call fails; the retry succeeds, except the
        // quota variant below which is terminal
        let s = suggester(&db, MockSearchBackend::failing(MockFailure::Quota));

        let log = run_batch(&s, opts(&dir), None).await.unwrap();
        assert_eq!(log.total_users, 3);
        assert_eq!(log.successful, 0);
        assert_eq!(log.failed, 3);
        for failure in &log.failed_users {
            assert_eq!(failure.kind, "capability_quota");
        }
    }

    #[tokio::test]
    async fn test_dry_run_counters_match_without_rows() {
        let db = Database::in_memory().unwrap();
        seed_three_users(&db);
        let dir = tempfile::tempdir().unwrap();
        let s = suggester(&db, MockSearchBackend::with_response("[]"));

        let mut dry = opts(&dir);
        dry.dry_run = true;
        let dry_log = run_batch(&s, dry, None).await.unwrap();

        let dir2 = tempfile::tempdir().unwrap();
        let mut wet = opts(&dir2);
        wet.lease_dir = Some(dir2.path().to_path_buf());
        let wet_log = run_batch(&s, wet, None).await.unwrap();

        assert_eq!(dry_log.total_users, wet_log.total_users);
        assert_eq!(dry_log.successful, wet_log.successful);
        assert_eq!(dry_log.items_analyzed, wet_log.items_analyzed);
        assert_eq!(dry_log.alternatives_found, wet_log.alternatives_found);
        assert_eq!(dry_log.total_savings, wet_log.total_savings);

        // Only the real run wrote rows; the dry run preceded it
        assert!(db.get_weekly_report("u1", Some(monday())).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_lease_blocks_concurrent_week() {
        let db = Database::in_memory().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let s = suggester(&db, MockSearchBackend::with_response("[]"));

        let _held = WeekLease::acquire(dir.path(), monday()).unwrap();

        let err = run_batch(&s, opts(&dir), None).await.unwrap_err();
        assert_eq!(err.kind(), "persist_conflict");
    }

    #[tokio::test]
    async fn test_lease_released_after_run() {
        let db = Database::in_memory().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let s = suggester(&db, MockSearchBackend::with_response("[]"));

        run_batch(&s, opts(&dir), None).await.unwrap();
        // Second run acquires the lease again without trouble
        run_batch(&s, opts(&dir), None).await.unwrap();
    }

    #[tokio::test]
    async fn test_cancel_skips_queued_users() {
        let db = Database::in_memory().unwrap();
        seed_three_users(&db);
        let dir = tempfile::tempdir().unwrap();
        let s = suggester(&db, MockSearchBackend::with_response("[]"));

        let cancel = Arc::new(AtomicBool::new(true));
        let log = run_batch(&s, opts(&dir), Some(cancel)).await.unwrap();
        assert_eq!(log.total_users, 0);
        assert_eq!(log.successful, 0);
    }
}
