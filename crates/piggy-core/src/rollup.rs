//! Aggregation views over the Purchase Store
//!
//! Pure logical projections, computed on demand; re-evaluating them is
//! idempotent. `TransactionRollup` folds items back into receipt-level
//! transactions for the frontend feed; `CategoryWeekSummary` buckets spend
//! per (category, subcategory, ISO week).

use std::collections::HashMap;

use chrono::{Duration, Utc};

use crate::db::Database;
use crate::error::Result;
use crate::models::{
    round_cents, CategoryWeekSummary, NeedWant, PurchaseItem, TransactionRollup,
};
use crate::weeks;

/// Most frequent value; ties broken by first appearance.
fn mode<'a, I: Iterator<Item = &'a str>>(values: I) -> String {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for v in values {
        match counts.iter_mut().find(|(k, _)| *k == v) {
            Some((_, n)) => *n += 1,
            None => counts.push((v, 1)),
        }
    }
    let mut best: Option<(&str, usize)> = None;
    for (v, n) in counts {
        // Strict comparison keeps the first-seen value on ties
        if best.map_or(true, |(_, bn)| n > bn) {
            best = Some((v, n));
        }
    }
    best.map(|(v, _)| v.to_string()).unwrap_or_default()
}

fn mode_label(items: &[&PurchaseItem]) -> NeedWant {
    let mut counts = [0usize; 3];
    for item in items {
        match item.effective_needwant() {
            NeedWant::Need => counts[0] += 1,
            NeedWant::Want => counts[1] += 1,
            NeedWant::Unset => counts[2] += 1,
        }
    }
    if counts[0] >= counts[1] && counts[0] >= counts[2] && counts[0] > 0 {
        NeedWant::Need
    } else if counts[1] >= counts[2] && counts[1] > 0 {
        NeedWant::Want
    } else {
        NeedWant::Unset
    }
}

/// Receipt-level rollups for a user, newest first.
pub fn transaction_rollups(
    db: &Database,
    user_id: &str,
    limit: usize,
) -> Result<Vec<TransactionRollup>> {
    let items = db.list_items(user_id, None, None, None)?;

    // Group by purchase_id, preserving newest-first order of first appearance
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<&PurchaseItem>> = HashMap::new();
    for item in &items {
        if !groups.contains_key(&item.purchase_id) {
            order.push(item.purchase_id.clone());
        }
        groups.entry(item.purchase_id.clone()).or_default().push(item);
    }

    let mut rollups = Vec::new();
    for purchase_id in order.into_iter().take(limit) {
        let mut members = groups.remove(&purchase_id).unwrap_or_default();
        members.sort_by(|a, b| a.item_id.cmp(&b.item_id));

        let amount = round_cents(members.iter().map(|i| i.line_total()).sum());
        let confidence = members.iter().map(|i| i.confidence).sum::<f64>() / members.len() as f64;
        let occurred_at = members
            .iter()
            .map(|i| i.ts)
            .max()
            .unwrap_or_else(Utc::now);
        let item_text = members
            .iter()
            .map(|i| i.item_name.as_str())
            .collect::<Vec<_>>()
            .join(" · ");

        rollups.push(TransactionRollup {
            id: purchase_id,
            user_id: user_id.to_string(),
            merchant: members[0].merchant.clone(),
            amount,
            category: mode(members.iter().map(|i| i.category.as_str())),
            need_or_want: mode_label(&members),
            confidence,
            occurred_at,
            item_text,
            embed: members.iter().find_map(|i| i.item_embed.clone()),
        });
    }

    Ok(rollups)
}

/// Weekly spend summaries per (category, subcategory) over a trailing window.
pub fn category_week_summaries(
    db: &Database,
    user_id: &str,
    days: i64,
) -> Result<Vec<CategoryWeekSummary>> {
    let since = Utc::now() - Duration::days(days);
    let items = db.list_items(user_id, Some(since), None, None)?;

    type Key = (String, Option<String>, chrono::NaiveDate);
    struct Bucket {
        purchase_ids: Vec<String>,
        item_count: i64,
        total_spend: f64,
        need_spend: f64,
        want_spend: f64,
        confidence_sum: f64,
        user_labeled: i64,
    }

    let mut buckets: HashMap<Key, Bucket> = HashMap::new();
    for item in &items {
        let key = (
            item.category.clone(),
            item.subcategory.clone(),
            weeks::week_of(item.ts),
        );
        let bucket = buckets.entry(key).or_insert_with(|| Bucket {
            purchase_ids: Vec::new(),
            item_count: 0,
            total_spend: 0.0,
            need_spend: 0.0,
            want_spend: 0.0,
            confidence_sum: 0.0,
            user_labeled: 0,
        });

        if !bucket.purchase_ids.contains(&item.purchase_id) {
            bucket.purchase_ids.push(item.purchase_id.clone());
        }
        bucket.item_count += 1;
        bucket.total_spend += item.line_total();
        match item.effective_needwant() {
            NeedWant::Need => bucket.need_spend += item.line_total(),
            NeedWant::Want => bucket.want_spend += item.line_total(),
            NeedWant::Unset => {}
        }
        bucket.confidence_sum += item.confidence;
        if item.user_needwant != NeedWant::Unset {
            bucket.user_labeled += 1;
        }
    }

    let mut summaries: Vec<CategoryWeekSummary> = buckets
        .into_iter()
        .map(|((category, subcategory, week_start), b)| CategoryWeekSummary {
            category,
            subcategory,
            week_start,
            purchase_count: b.purchase_ids.len() as i64,
            item_count: b.item_count,
            total_spend: round_cents(b.total_spend),
            need_spend: round_cents(b.need_spend),
            want_spend: round_cents(b.want_spend),
            avg_confidence: b.confidence_sum / b.item_count as f64,
            user_labeled: b.user_labeled,
        })
        .collect();

    summaries.sort_by(|a, b| {
        a.category
            .cmp(&b.category)
            .then(a.subcategory.cmp(&b.subcategory))
            .then(b.week_start.cmp(&a.week_start))
    });

    Ok(summaries)
}
