//! Behavioural purchase prediction
//!
//! Groups a user's active history by (item name, category), measures the
//! intervals between consecutive purchases, and forecasts the next
//! occurrence with a calibrated confidence score:
//!
//! `confidence = 0.2 + 0.4 · min(samples, 10)/10 + 0.4 · clamp(1 − sd/avg, 0, 1)`
//!
//! Predictions below 0.5 confidence are suppressed. Overdue predictions
//! (next_time already in the past) are still emitted; the UI highlights
//! them rather than silently advancing the forecast.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::db::Database;
use crate::error::Result;
use crate::models::Prediction;

const CONFIDENCE_FLOOR: f64 = 0.5;
const SAMPLE_SATURATION: f64 = 10.0;

/// Forecasts the next occurrence of recurring items
pub struct Predictor<'a> {
    db: &'a Database,
}

impl<'a> Predictor<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Predict a user's next purchases, soonest first, truncated to `limit`.
    ///
    /// Fails as a whole if the store query fails — no partial lists.
    pub fn predict_next(&self, user_id: &str, limit: usize) -> Result<Vec<Prediction>> {
        let mut items = self.db.list_items(user_id, None, None, None)?;
        items.sort_by_key(|i| i.ts);

        // Group timestamps by (item_name, category); item_name compares
        // case-insensitively after trimming
        let mut series: HashMap<(String, String), (String, Vec<DateTime<Utc>>)> = HashMap::new();
        for item in &items {
            let name = item.item_name.trim();
            if name.is_empty() {
                continue;
            }
            let key = (name.to_lowercase(), item.category.clone());
            series
                .entry(key)
                .or_insert_with(|| (name.to_string(), Vec::new()))
                .1
                .push(item.ts);
        }

        let mut predictions = Vec::new();
        for ((_, category), (display_name, times)) in series {
            if let Some(prediction) = Self::predict_group(&display_name, &category, &times) {
                predictions.push(prediction);
            }
        }

        // Soonest next_time first; ties by confidence desc then item asc
        predictions.sort_by(|a, b| {
            a.next_time
                .cmp(&b.next_time)
                .then_with(|| {
                    b.confidence
                        .partial_cmp(&a.confidence)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| a.item.cmp(&b.item))
        });
        predictions.truncate(limit);

        debug!(
            user_id = %user_id,
            count = predictions.len(),
            "Computed purchase predictions"
        );

        Ok(predictions)
    }

    /// Forecast one (item, category) group. Returns None when there is not
    /// enough history or confidence stays below the floor.
    fn predict_group(
        item: &str,
        category: &str,
        times: &[DateTime<Utc>],
    ) -> Option<Prediction> {
        if times.len() < 2 {
            return None;
        }

        let mut sorted = times.to_vec();
        sorted.sort();

        let intervals_days: Vec<f64> = sorted
            .windows(2)
            .map(|w| (w[1] - w[0]).num_milliseconds() as f64 / 86_400_000.0)
            .collect();

        let avg = intervals_days.iter().sum::<f64>() / intervals_days.len() as f64;
        let variance = intervals_days
            .iter()
            .map(|d| (d - avg).powi(2))
            .sum::<f64>()
            / intervals_days.len() as f64;
        let sd = variance.sqrt();

        let samples = sorted.len();
        let sample_factor = (samples as f64 / SAMPLE_SATURATION).min(1.0);
        let regularity_factor = if avg > 0.0 {
            (1.0 - sd / avg).clamp(0.0, 1.0)
        } else {
            0.0
        };

        let confidence = 0.2 + 0.4 * sample_factor + 0.4 * regularity_factor;
        let confidence = (confidence.clamp(0.0, 1.0) * 1000.0).round() / 1000.0;
        if confidence < CONFIDENCE_FLOOR {
            return None;
        }

        // The interval floor keeps next_time strictly after last_time even
        // for same-day repeats
        let avg_interval_days = avg.max(1.0);
        let last_time = *sorted.last()?;
        let next_time =
            last_time + Duration::milliseconds((avg_interval_days * 86_400_000.0).round() as i64);

        Some(Prediction {
            item: item.to_string(),
            category: category.to_string(),
            next_time,
            last_time,
            avg_interval_days,
            samples: samples as i64,
            confidence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ItemStatus;
    use crate::test_utils::{item_at, seed_item, seed_item_full};
    use chrono::TimeZone;

    #[test]
    fn test_daily_coffee_prediction() {
        let db = Database::in_memory().unwrap();

        // 10 purchases on 10 consecutive days, latest 2025-11-10T08:30:00Z
        for day in 0..10 {
            let ts = Utc.with_ymd_and_hms(2025, 11, 1 + day, 8, 30, 0).unwrap();
            seed_item(&db, "u1", &format!("i{day}"), &format!("p{day}"), ts);
        }

        let predictions = Predictor::new(&db).predict_next("u1", 5).unwrap();
        assert_eq!(predictions.len(), 1);

        let p = &predictions[0];
        assert_eq!(p.item, "Latte");
        assert_eq!(p.category, "Coffee");
        assert_eq!(p.samples, 10);
        assert_eq!(p.avg_interval_days, 1.0);
        assert_eq!(p.confidence, 1.0);
        assert_eq!(
            p.last_time,
            Utc.with_ymd_and_hms(2025, 11, 10, 8, 30, 0).unwrap()
        );
        assert_eq!(
            p.next_time,
            Utc.with_ymd_and_hms(2025, 11, 11, 8, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_two_samples_confidence() {
        let db = Database::in_memory().unwrap();

        // Two Netflix charges exactly 30 days apart
        let first = Utc.with_ymd_and_hms(2025, 10, 1, 0, 0, 0).unwrap();
        let second = Utc.with_ymd_and_hms(2025, 10, 31, 0, 0, 0).unwrap();
        seed_item_full(&db, "u1", "i1", "p1", "Netflix", "Netflix", "Entertainment", 15.49, first);
        seed_item_full(&db, "u1", "i2", "p2", "Netflix", "Netflix", "Entertainment", 15.49, second);

        let predictions = Predictor::new(&db).predict_next("u1", 5).unwrap();
        assert_eq!(predictions.len(), 1);

        let p = &predictions[0];
        assert_eq!(p.samples, 2);
        // regularity 1.0, sample factor 0.2: 0.2 + 0.4*0.2 + 0.4 = 0.68
        assert_eq!(p.confidence, 0.68);
        assert_eq!(p.avg_interval_days, 30.0);
        assert_eq!(p.next_time, second + Duration::days(30));
    }

    #[test]
    fn test_single_sample_yields_nothing() {
        let db = Database::in_memory().unwrap();
        seed_item(&db, "u1", "i1", "p1", Utc::now());

        let predictions = Predictor::new(&db).predict_next("u1", 5).unwrap();
        assert!(predictions.is_empty());
    }

    #[test]
    fn test_equal_intervals_confidence_formula() {
        let db = Database::in_memory().unwrap();

        // 4 weekly purchases: sd = 0, so confidence = 0.2 + 0.4*(4/10) + 0.4
        for week in 0..4 {
            let ts = Utc.with_ymd_and_hms(2025, 10, 6, 12, 0, 0).unwrap()
                + Duration::days(7 * week);
            seed_item(&db, "u1", &format!("i{week}"), &format!("p{week}"), ts);
        }

        let predictions = Predictor::new(&db).predict_next("u1", 5).unwrap();
        assert_eq!(predictions.len(), 1);
        assert_eq!(predictions[0].confidence, 0.76);
        assert_eq!(predictions[0].avg_interval_days, 7.0);
    }

    #[test]
    fn test_irregular_intervals_suppressed() {
        let db = Database::in_memory().unwrap();

        // Wildly irregular gaps: 1 day then 60 days. The coefficient of
        // variation is near 1, so regularity contributes almost nothing
        // and confidence stays well under 0.5
        let base = Utc.with_ymd_and_hms(2025, 8, 1, 12, 0, 0).unwrap();
        seed_item(&db, "u1", "i1", "p1", base);
        seed_item(&db, "u1", "i2", "p2", base + Duration::days(1));
        seed_item(&db, "u1", "i3", "p3", base + Duration::days(61));

        let predictions = Predictor::new(&db).predict_next("u1", 5).unwrap();
        assert!(predictions.is_empty());
    }

    #[test]
    fn test_refunded_items_do_not_count() {
        let db = Database::in_memory().unwrap();
        let base = Utc.with_ymd_and_hms(2025, 11, 1, 8, 0, 0).unwrap();
        for day in 0..3 {
            seed_item(&db, "u1", &format!("i{day}"), &format!("p{day}"), base + Duration::days(day));
        }
        db.set_item_status("i2", ItemStatus::Refunded).unwrap();

        let predictions = Predictor::new(&db).predict_next("u1", 5).unwrap();
        // Only 2 active samples remain
        assert_eq!(predictions[0].samples, 2);
    }

    #[test]
    fn test_ordering_and_truncation() {
        let db = Database::in_memory().unwrap();
        let base = Utc.with_ymd_and_hms(2025, 11, 1, 8, 0, 0).unwrap();

        // Daily latte: next purchase due one day after its last
        for day in 0..5 {
            seed_item(&db, "u1", &format!("latte{day}"), &format!("lp{day}"), base + Duration::days(day));
        }
        // Weekly groceries: due later
        for week in 0..3 {
            seed_item_full(
                &db,
                "u1",
                &format!("egg{week}"),
                &format!("ep{week}"),
                "Aldi",
                "Eggs",
                "Groceries",
                4.99,
                base + Duration::days(7 * week),
            );
        }

        let predictions = Predictor::new(&db).predict_next("u1", 5).unwrap();
        assert_eq!(predictions.len(), 2);
        assert_eq!(predictions[0].item, "Latte");
        assert_eq!(predictions[1].item, "Eggs");
        assert!(predictions[0].next_time < predictions[1].next_time);

        let truncated = Predictor::new(&db).predict_next("u1", 1).unwrap();
        assert_eq!(truncated.len(), 1);
        assert_eq!(truncated[0].item, "Latte");
    }

    #[test]
    fn test_case_insensitive_item_grouping() {
        let db = Database::in_memory().unwrap();
        let base = Utc.with_ymd_and_hms(2025, 11, 1, 8, 0, 0).unwrap();

        let mut upper = item_at("u1", "i1", "p1", base);
        upper.item_name = "LATTE".into();
        let mut spaced = item_at("u1", "i2", "p2", base + Duration::days(1));
        spaced.item_name = " latte ".into();
        db.insert_purchase_item(&upper).unwrap();
        db.insert_purchase_item(&spaced).unwrap();

        let predictions = Predictor::new(&db).predict_next("u1", 5).unwrap();
        assert_eq!(predictions.len(), 1);
        assert_eq!(predictions[0].samples, 2);
    }
}
