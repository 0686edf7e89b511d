//! Test utilities: purchase seeding helpers and report builders

use chrono::{DateTime, NaiveDate, Utc};

use crate::db::Database;
use crate::models::{NeedWant, NewPurchaseItem, WeeklyReport};
use crate::weeks;

/// A Starbucks latte at the given instant — the default fixture item.
pub fn item_at(user_id: &str, item_id: &str, purchase_id: &str, ts: DateTime<Utc>) -> NewPurchaseItem {
    NewPurchaseItem {
        item_id: item_id.to_string(),
        purchase_id: purchase_id.to_string(),
        user_id: user_id.to_string(),
        merchant: "Starbucks".to_string(),
        item_name: "Latte".to_string(),
        category: "Coffee".to_string(),
        subcategory: None,
        price: 7.25,
        qty: 1.0,
        ts,
        detected_needwant: NeedWant::Want,
        confidence: 0.9,
        buyer_location: None,
        item_embed: None,
    }
}

/// Insert the default fixture item.
pub fn seed_item(db: &Database, user_id: &str, item_id: &str, purchase_id: &str, ts: DateTime<Utc>) {
    db.insert_purchase_item(&item_at(user_id, item_id, purchase_id, ts))
        .expect("seed item");
}

/// Insert a fully customised item.
#[allow(clippy::too_many_arguments)]
pub fn seed_item_full(
    db: &Database,
    user_id: &str,
    item_id: &str,
    purchase_id: &str,
    merchant: &str,
    item_name: &str,
    category: &str,
    price: f64,
    ts: DateTime<Utc>,
) {
    let mut item = item_at(user_id, item_id, purchase_id, ts);
    item.merchant = merchant.to_string();
    item.item_name = item_name.to_string();
    item.category = category.to_string();
    item.price = price;
    db.insert_purchase_item(&item).expect("seed item");
}

/// An empty report for (user, week), the shape a no-purchases week produces.
pub fn empty_report(user_id: &str, week_start: NaiveDate) -> WeeklyReport {
    WeeklyReport {
        report_id: uuid::Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        week_start,
        week_end: weeks::week_end(week_start),
        location: None,
        items_analyzed: 0,
        items_with_alternatives: 0,
        total_savings: 0.0,
        findings: Vec::new(),
        notes: None,
        mcp_calls_made: 0,
        processing_time_ms: 0,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}
