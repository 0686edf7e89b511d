//! Report Store operations
//!
//! Weekly reports are keyed by `(user_id, week_start)`. Upserts replace the
//! payload in place, preserve `created_at`, and refresh `updated_at`, so
//! re-running a week's job is idempotent.

use chrono::{NaiveDate, Utc};
use rusqlite::{params, Row};

use super::{parse_datetime, Database};
use crate::error::Result;
use crate::models::{ReportLocation, WeeklyReport, WeeklyReportSummary};

const REPORT_COLUMNS: &str = "report_id, user_id, week_start, week_end, loc_city, loc_state, loc_country, \
     items_analyzed, items_with_alternatives, total_savings, findings, notes, \
     mcp_calls_made, processing_time_ms, created_at, updated_at";

impl Database {
    /// Write-or-replace a weekly report
    ///
    /// `created_at` is only set on first insert; `updated_at` is refreshed
    /// on every write. The stored `created_at`/`updated_at` are
    /// authoritative — the values on the passed report are ignored.
    pub fn upsert_weekly_report(&self, report: &WeeklyReport) -> Result<()> {
        let conn = self.conn()?;

        let findings_json = serde_json::to_string(&report.findings)?;
        let loc = report.location.as_ref();
        let now = Utc::now().to_rfc3339();

        conn.execute(
            r#"
            INSERT INTO weekly_reports
                (report_id, user_id, week_start, week_end,
                 loc_city, loc_state, loc_country,
                 items_analyzed, items_with_alternatives, total_savings,
                 findings, notes, mcp_calls_made, processing_time_ms,
                 created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?15, ?15)
            ON CONFLICT(user_id, week_start) DO UPDATE SET
                report_id = excluded.report_id,
                week_end = excluded.week_end,
                loc_city = excluded.loc_city,
                loc_state = excluded.loc_state,
                loc_country = excluded.loc_country,
                items_analyzed = excluded.items_analyzed,
                items_with_alternatives = excluded.items_with_alternatives,
                total_savings = excluded.total_savings,
                findings = excluded.findings,
                notes = excluded.notes,
                mcp_calls_made = excluded.mcp_calls_made,
                processing_time_ms = excluded.processing_time_ms,
                updated_at = excluded.updated_at
            "#,
            params![
                report.report_id,
                report.user_id,
                report.week_start.to_string(),
                report.week_end.to_string(),
                loc.map(|l| l.city.as_str()),
                loc.map(|l| l.state.as_str()),
                loc.map(|l| l.country.as_str()),
                report.items_analyzed,
                report.items_with_alternatives,
                report.total_savings,
                findings_json,
                report.notes,
                report.mcp_calls_made,
                report.processing_time_ms,
                now,
            ],
        )?;

        Ok(())
    }

    /// Fetch a report: the exact week when given, else the most recent one.
    pub fn get_weekly_report(
        &self,
        user_id: &str,
        week_start: Option<NaiveDate>,
    ) -> Result<Option<WeeklyReport>> {
        let conn = self.conn()?;

        let sql = format!(
            r#"
            SELECT {REPORT_COLUMNS}
            FROM weekly_reports
            WHERE user_id = ?
              AND (?2 IS NULL OR week_start = ?2)
            ORDER BY week_start DESC
            LIMIT 1
            "#
        );

        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt
            .query_map(
                params![user_id, week_start.map(|d| d.to_string())],
                Self::row_to_report,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows.pop())
    }

    /// Recent reports for a user, newest week first
    pub fn list_report_history(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<WeeklyReportSummary>> {
        let conn = self.conn()?;

        let sql = format!(
            r#"
            SELECT {REPORT_COLUMNS}
            FROM weekly_reports
            WHERE user_id = ?
            ORDER BY week_start DESC
            LIMIT ?
            "#
        );

        let mut stmt = conn.prepare(&sql)?;
        let reports = stmt
            .query_map(params![user_id, limit], Self::row_to_report)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(reports.iter().map(WeeklyReport::summary).collect())
    }

    fn row_to_report(row: &Row<'_>) -> rusqlite::Result<WeeklyReport> {
        let week_start: String = row.get(2)?;
        let week_end: String = row.get(3)?;
        let findings_json: String = row.get(10)?;
        let created_at: String = row.get(14)?;
        let updated_at: String = row.get(15)?;

        let loc_city: Option<String> = row.get(4)?;
        let loc_state: Option<String> = row.get(5)?;
        let loc_country: Option<String> = row.get(6)?;
        let location = match (loc_city, loc_state, loc_country) {
            (Some(city), Some(state), Some(country)) => Some(ReportLocation {
                city,
                state,
                country,
            }),
            _ => None,
        };

        Ok(WeeklyReport {
            report_id: row.get(0)?,
            user_id: row.get(1)?,
            week_start: week_start.parse().unwrap_or_default(),
            week_end: week_end.parse().unwrap_or_default(),
            location,
            items_analyzed: row.get(7)?,
            items_with_alternatives: row.get(8)?,
            total_savings: row.get(9)?,
            findings: serde_json::from_str(&findings_json).unwrap_or_default(),
            notes: row.get(11)?,
            mcp_calls_made: row.get(12)?,
            processing_time_ms: row.get(13)?,
            created_at: parse_datetime(&created_at),
            updated_at: parse_datetime(&updated_at),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::empty_report;

    #[test]
    fn test_upsert_preserves_created_at() {
        let db = Database::in_memory().unwrap();
        let week = NaiveDate::from_ymd_opt(2025, 11, 10).unwrap();

        let mut report = empty_report("u1", week);
        report.items_analyzed = 2;
        db.upsert_weekly_report(&report).unwrap();

        let first = db.get_weekly_report("u1", Some(week)).unwrap().unwrap();

        std::thread::sleep(std::time::Duration::from_millis(1100));

        report.report_id = "second-run".into();
        report.items_analyzed = 5;
        report.total_savings = 42.5;
        db.upsert_weekly_report(&report).unwrap();

        let second = db.get_weekly_report("u1", Some(week)).unwrap().unwrap();
        assert_eq!(second.report_id, "second-run");
        assert_eq!(second.items_analyzed, 5);
        assert_eq!(second.total_savings, 42.5);
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at > first.updated_at);

        // Still exactly one row
        let history = db.list_report_history("u1", 10).unwrap();
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let db = Database::in_memory().unwrap();
        let week = NaiveDate::from_ymd_opt(2025, 11, 10).unwrap();
        let report = empty_report("u1", week);

        db.upsert_weekly_report(&report).unwrap();
        db.upsert_weekly_report(&report).unwrap();
        db.upsert_weekly_report(&report).unwrap();

        assert_eq!(db.list_report_history("u1", 10).unwrap().len(), 1);
        let stored = db.get_weekly_report("u1", Some(week)).unwrap().unwrap();
        assert_eq!(stored.report_id, report.report_id);
    }

    #[test]
    fn test_get_latest_when_week_omitted() {
        let db = Database::in_memory().unwrap();
        let older = NaiveDate::from_ymd_opt(2025, 11, 3).unwrap();
        let newer = NaiveDate::from_ymd_opt(2025, 11, 10).unwrap();

        db.upsert_weekly_report(&empty_report("u1", older)).unwrap();
        db.upsert_weekly_report(&empty_report("u1", newer)).unwrap();

        let latest = db.get_weekly_report("u1", None).unwrap().unwrap();
        assert_eq!(latest.week_start, newer);

        let exact = db.get_weekly_report("u1", Some(older)).unwrap().unwrap();
        assert_eq!(exact.week_start, older);

        assert!(db.get_weekly_report("u2", None).unwrap().is_none());
    }

    #[test]
    fn test_history_is_prefix_ordered() {
        let db = Database::in_memory().unwrap();
        for week_offset in 0..5 {
            let week = NaiveDate::from_ymd_opt(2025, 10, 6).unwrap()
                + chrono::Duration::days(7 * week_offset);
            db.upsert_weekly_report(&empty_report("u1", week)).unwrap();
        }

        let four = db.list_report_history("u1", 4).unwrap();
        let five = db.list_report_history("u1", 5).unwrap();

        assert_eq!(four.len(), 4);
        assert_eq!(five.len(), 5);
        // limit=k is a prefix of limit=k+1, by decreasing week_start
        for (a, b) in four.iter().zip(five.iter()) {
            assert_eq!(a.week_start, b.week_start);
        }
        for window in five.windows(2) {
            assert!(window[0].week_start > window[1].week_start);
        }
    }
}
