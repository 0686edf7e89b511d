//! Weekly suggestions batch command

use std::path::Path;

use chrono::NaiveDate;
use tracing::{error, info, warn};

use piggy_core::{run_batch, BatchOptions, SearchClient, SuggesterConfig, WeeklySuggester};

use super::open_db;

/// `piggy weekly-suggestions`
///
/// Returns the process exit code: 0 all users succeeded (or no users),
/// 1 at least one user failed, 2 configuration error.
pub async fn cmd_weekly_suggestions(
    db_path: &Path,
    week: Option<&str>,
    user: Option<&str>,
    dry_run: bool,
    concurrency: Option<usize>,
) -> i32 {
    let week_start = match week {
        None => None,
        Some(raw) => match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            Ok(date) => Some(date),
            Err(_) => {
                error!(week = %raw, "Invalid --week, expected YYYY-MM-DD");
                return 2;
            }
        },
    };

    let db = match open_db(db_path) {
        Ok(db) => db,
        Err(e) => {
            error!(error = %e, "Failed to open database");
            return 2;
        }
    };

    let search = SearchClient::from_env();
    if search.is_none() {
        warn!("PIGGY_SEARCH_HOST not set; runs will fail unless weeks are empty");
    }

    let suggester = WeeklySuggester::new(db, search, SuggesterConfig::from_env());
    let opts = BatchOptions {
        week_start,
        user_id: user.map(str::to_string),
        dry_run,
        concurrency,
        lease_dir: None,
    };

    let log = match run_batch(&suggester, opts, None).await {
        Ok(log) => log,
        Err(e) => {
            error!(error = %e, "Weekly suggestions job failed to start");
            return 1;
        }
    };

    match serde_json::to_string_pretty(&log) {
        Ok(json) => {
            println!("{}", json);
            if !log.dry_run {
                if let Err(e) = write_job_log(&json, log.job_at) {
                    warn!(error = %e, "Could not write job log file");
                }
            }
        }
        Err(e) => warn!(error = %e, "Could not serialise job log"),
    }

    info!(
        successful = log.successful,
        failed = log.failed,
        "Weekly suggestions job done"
    );

    if log.failed > 0 {
        1
    } else {
        0
    }
}

fn write_job_log(json: &str, job_at: chrono::DateTime<chrono::Utc>) -> std::io::Result<()> {
    let dir = Path::new("logs");
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!(
        "weekly_suggestions_{}.json",
        job_at.format("%Y%m%d_%H%M%S")
    ));
    std::fs::write(&path, json)?;
    info!(path = %path.display(), "Job log written");
    Ok(())
}
