//! Rule-based savings tips
//!
//! Four independent detectors run over a 60-day window of active history:
//!
//! - D1: high-frequency items in habit categories (coffee, food delivery)
//! - D2: categories far above the user's median category spend
//! - D3: subscriptions with little recent activity at the merchant
//! - D4: separate streaming subscriptions that a catalog bundle undercuts
//!
//! Outputs are merged by title (higher savings wins), ordered by projected
//! monthly savings, and truncated to the requested count.

use std::collections::HashMap;

use chrono::{Duration, Utc};
use tracing::debug;

use crate::db::Database;
use crate::deals::DealCatalog;
use crate::error::Result;
use crate::models::{round_cents, PurchaseItem, Tip};

/// Analysis window for all detectors, in days.
const WINDOW_DAYS: i64 = 60;

/// D1: minimum purchases of one item inside the window.
const FREQUENT_ITEM_MIN_COUNT: usize = 4;
/// D1: categories where frequent small purchases are addressable habits.
const FREQUENT_ITEM_CATEGORIES: [&str; 2] = ["Coffee", "Food"];
/// D1: share of the item's monthly spend considered recoverable.
const FREQUENT_ITEM_SAVINGS_RATE: f64 = 0.60;

/// D2: how many top categories to look at.
const OVERSPEND_TOP_N: usize = 3;
/// D2: a category must exceed the median by this factor.
const OVERSPEND_MEDIAN_FACTOR: f64 = 1.5;
/// D2: share of the category's monthly spend considered recoverable.
const OVERSPEND_SAVINGS_RATE: f64 = 0.30;

/// D3: inter-arrival bounds (days) that mark a monthly subscription.
const SUBSCRIPTION_GAP_DAYS: (f64, f64) = (28.0, 32.0);
/// D3: at most this many merchant transactions in 30 days counts as unused.
const SUBSCRIPTION_USAGE_MAX: i64 = 4;

/// A detected recurring (merchant, price) charge.
#[derive(Debug, Clone)]
struct DetectedSubscription {
    merchant: String,
    price: f64,
    category: String,
}

/// Generates savings tips from spending patterns
pub struct TipEngine<'a> {
    db: &'a Database,
    catalog: &'a DealCatalog,
}

impl<'a> TipEngine<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self {
            db,
            catalog: DealCatalog::builtin(),
        }
    }

    pub fn with_catalog(db: &'a Database, catalog: &'a DealCatalog) -> Self {
        Self { db, catalog }
    }

    /// Run every detector and merge the results, best savings first.
    pub fn generate(&self, user_id: &str, limit: usize) -> Result<Vec<Tip>> {
        let since = Utc::now() - Duration::days(WINDOW_DAYS);
        let items = self.db.list_items(user_id, Some(since), None, None)?;

        if items.is_empty() {
            return Ok(Vec::new());
        }

        let subscriptions = Self::detect_subscriptions(&items);

        let mut tips = Vec::new();
        tips.extend(Self::frequent_items(&items));
        tips.extend(Self::category_overspend(&items));
        tips.extend(self.underused_subscriptions(user_id, &subscriptions)?);
        tips.extend(self.bundle_opportunities(&subscriptions));

        // Dedupe by title, keeping the higher savings
        let mut by_title: HashMap<String, Tip> = HashMap::new();
        for tip in tips {
            match by_title.get(&tip.title) {
                Some(existing) if existing.monthly_savings >= tip.monthly_savings => {}
                _ => {
                    by_title.insert(tip.title.clone(), tip);
                }
            }
        }

        let mut merged: Vec<Tip> = by_title.into_values().collect();
        merged.sort_by(|a, b| {
            b.monthly_savings
                .partial_cmp(&a.monthly_savings)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.title.cmp(&b.title))
        });
        merged.truncate(limit);

        debug!(user_id = %user_id, count = merged.len(), "Generated smart tips");
        Ok(merged)
    }

    /// Project a window total onto a 30-day month.
    fn monthly(total: f64) -> f64 {
        total * (30.0 / WINDOW_DAYS as f64)
    }

    /// D1 - the same item bought over and over in a habit category.
    fn frequent_items(items: &[PurchaseItem]) -> Vec<Tip> {
        struct Group {
            display: String,
            category: String,
            count: usize,
            total: f64,
        }

        let mut groups: HashMap<String, Group> = HashMap::new();
        for item in items {
            let key = item.item_name.trim().to_lowercase();
            if key.is_empty() {
                continue;
            }
            let group = groups.entry(key).or_insert_with(|| Group {
                display: item.item_name.trim().to_string(),
                category: item.category.clone(),
                count: 0,
                total: 0.0,
            });
            group.count += 1;
            group.total += item.line_total();
        }

        groups
            .into_values()
            .filter(|g| {
                g.count >= FREQUENT_ITEM_MIN_COUNT
                    && FREQUENT_ITEM_CATEGORIES
                        .iter()
                        .any(|c| c.eq_ignore_ascii_case(&g.category))
            })
            .map(|g| {
                let monthly_spend = Self::monthly(g.total);
                let icon = if g.category.eq_ignore_ascii_case("Coffee") {
                    "☕"
                } else {
                    "🍔"
                };
                Tip {
                    icon: icon.to_string(),
                    title: format!("Frequent buys: {}", g.display),
                    subtitle: format!("{} purchases in {} days", g.count, WINDOW_DAYS),
                    description: format!(
                        "You bought {} {} times recently, about ${:.2} a month. \
                         Making it at home or buying in bulk would cover most of that.",
                        g.display,
                        g.count,
                        round_cents(monthly_spend)
                    ),
                    monthly_savings: round_cents(FREQUENT_ITEM_SAVINGS_RATE * monthly_spend),
                    action_tag: "Cut Back".to_string(),
                    category: g.category,
                }
            })
            .collect()
    }

    /// D2 - categories well above the user's own median category spend.
    fn category_overspend(items: &[PurchaseItem]) -> Vec<Tip> {
        let mut totals: HashMap<String, (f64, usize)> = HashMap::new();
        for item in items {
            let entry = totals.entry(item.category.clone()).or_insert((0.0, 0));
            entry.0 += item.line_total();
            entry.1 += 1;
        }

        let mut sorted: Vec<(String, f64, usize)> = totals
            .into_iter()
            .map(|(category, (total, count))| (category, total, count))
            .collect();
        sorted.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });

        let mut amounts: Vec<f64> = sorted.iter().map(|(_, total, _)| *total).collect();
        amounts.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let median = if amounts.is_empty() {
            0.0
        } else if amounts.len() % 2 == 1 {
            amounts[amounts.len() / 2]
        } else {
            (amounts[amounts.len() / 2 - 1] + amounts[amounts.len() / 2]) / 2.0
        };

        sorted
            .into_iter()
            .take(OVERSPEND_TOP_N)
            .filter(|(_, total, _)| median > 0.0 && *total >= OVERSPEND_MEDIAN_FACTOR * median)
            .map(|(category, total, count)| {
                let monthly_spend = Self::monthly(total);
                Tip {
                    icon: "📊".to_string(),
                    title: format!("High {} spending", category),
                    subtitle: format!("${:.2} across {} purchases", round_cents(total), count),
                    description: format!(
                        "{} is running well above your other categories, around ${:.2} a month. \
                         A weekly budget here would free up real money.",
                        category,
                        round_cents(monthly_spend)
                    ),
                    monthly_savings: round_cents(OVERSPEND_SAVINGS_RATE * monthly_spend),
                    action_tag: "Set Budget".to_string(),
                    category,
                }
            })
            .collect()
    }

    /// Find recurring (merchant, price) charges with monthly cadence.
    fn detect_subscriptions(items: &[PurchaseItem]) -> Vec<DetectedSubscription> {
        let mut groups: HashMap<(String, i64), Vec<&PurchaseItem>> = HashMap::new();
        for item in items {
            let key = (item.merchant.clone(), (item.price * 100.0).round() as i64);
            groups.entry(key).or_default().push(item);
        }

        let mut found = Vec::new();
        for ((merchant, cents), mut members) in groups {
            if members.len() < 2 {
                continue;
            }
            members.sort_by_key(|i| i.ts);

            let monthly_cadence = members.windows(2).all(|w| {
                let gap = (w[1].ts - w[0].ts).num_milliseconds() as f64 / 86_400_000.0;
                (SUBSCRIPTION_GAP_DAYS.0..=SUBSCRIPTION_GAP_DAYS.1).contains(&gap)
            });
            if !monthly_cadence {
                continue;
            }

            found.push(DetectedSubscription {
                merchant,
                price: cents as f64 / 100.0,
                category: members[0].category.clone(),
            });
        }
        found.sort_by(|a, b| a.merchant.cmp(&b.merchant));
        found
    }

    /// D3 - a subscription whose merchant sees almost no other activity.
    fn underused_subscriptions(
        &self,
        user_id: &str,
        subscriptions: &[DetectedSubscription],
    ) -> Result<Vec<Tip>> {
        if subscriptions.is_empty() {
            return Ok(Vec::new());
        }

        let since = Utc::now() - Duration::days(30);
        let recent = self.db.list_items(user_id, Some(since), None, None)?;

        let mut tips = Vec::new();
        for sub in subscriptions {
            let usage = recent
                .iter()
                .filter(|i| i.merchant == sub.merchant)
                .count() as i64;
            if usage > SUBSCRIPTION_USAGE_MAX {
                continue;
            }

            tips.push(Tip {
                icon: "📺".to_string(),
                title: format!("Under-used subscription: {}", sub.merchant),
                subtitle: format!("${:.2}/mo with little recent activity", sub.price),
                description: format!(
                    "{} keeps charging ${:.2} a month but you barely used it lately. \
                     Cancelling (or rotating it back in later) saves the full amount.",
                    sub.merchant, sub.price
                ),
                monthly_savings: round_cents(sub.price),
                action_tag: "Review".to_string(),
                category: sub.category.clone(),
            });
        }
        Ok(tips)
    }

    /// D4 - multiple entertainment subscriptions that a bundle undercuts.
    fn bundle_opportunities(&self, subscriptions: &[DetectedSubscription]) -> Vec<Tip> {
        let entertainment: Vec<&DetectedSubscription> = subscriptions
            .iter()
            .filter(|s| s.category.eq_ignore_ascii_case("Entertainment"))
            .collect();
        if entertainment.len() < 2 {
            return Vec::new();
        }

        let mut tips = Vec::new();
        for bundle in self.catalog.bundles() {
            let members: Vec<&&DetectedSubscription> = entertainment
                .iter()
                .filter(|s| {
                    bundle
                        .components
                        .iter()
                        .any(|c| s.merchant.to_lowercase().contains(&c.to_lowercase()))
                })
                .collect();
            if members.len() < 2 {
                continue;
            }

            let combined: f64 = members.iter().map(|s| s.price).sum();
            if combined <= bundle.price {
                continue;
            }

            let names: Vec<&str> = members.iter().map(|s| s.merchant.as_str()).collect();
            tips.push(Tip {
                icon: "🎬".to_string(),
                title: format!("Switch to the {}", bundle.name),
                subtitle: format!("Paying ${:.2}/mo separately", round_cents(combined)),
                description: format!(
                    "You pay for {} separately. The {} costs ${:.2}/mo for all of them.",
                    names.join(" and "),
                    bundle.name,
                    bundle.price
                ),
                monthly_savings: round_cents(combined - bundle.price),
                action_tag: "Bundle".to_string(),
                category: "Entertainment".to_string(),
            });
        }
        tips
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{seed_item, seed_item_full};
    use chrono::Duration;

    #[test]
    fn test_frequent_coffee_tip() {
        let db = Database::in_memory().unwrap();
        let now = Utc::now();

        // 22 Starbucks lattes at $7.25 over the last 60 days
        for i in 0..22 {
            seed_item(
                &db,
                "u1",
                &format!("i{i}"),
                &format!("p{i}"),
                now - Duration::days(55) + Duration::days((i * 5 / 2) as i64),
            );
        }

        let tips = TipEngine::new(&db).generate("u1", 6).unwrap();
        let tip = tips
            .iter()
            .find(|t| t.title == "Frequent buys: Latte")
            .unwrap();

        // monthly spend = 22 * 7.25 * (30/60) = 79.75; savings = 0.60 * 79.75
        assert_eq!(tip.monthly_savings, 47.85);
        assert_eq!(tip.category, "Coffee");
        assert_eq!(tip.icon, "☕");
        // Ordered first: it is the largest (only) tip here
        assert_eq!(tips[0].title, tip.title);
    }

    #[test]
    fn test_frequent_item_needs_habit_category() {
        let db = Database::in_memory().unwrap();
        let now = Utc::now();

        // 6 electronics purchases: frequent, but not a habit category
        for i in 0..6 {
            seed_item_full(
                &db,
                "u1",
                &format!("i{i}"),
                &format!("p{i}"),
                "Best Buy",
                "HDMI Cable",
                "Shopping",
                12.99,
                now - Duration::days(i as i64 * 3),
            );
        }

        let tips = TipEngine::new(&db).generate("u1", 6).unwrap();
        assert!(!tips.iter().any(|t| t.title.starts_with("Frequent buys")));
    }

    #[test]
    fn test_category_overspend_tip() {
        let db = Database::in_memory().unwrap();
        let now = Utc::now();

        // Transport dwarfs three modest categories
        for i in 0..8 {
            seed_item_full(
                &db,
                "u1",
                &format!("t{i}"),
                &format!("tp{i}"),
                "Uber",
                "Ride",
                "Transport",
                40.0,
                now - Duration::days(i as i64 * 7),
            );
        }
        seed_item_full(&db, "u1", "g1", "gp1", "Aldi", "Eggs", "Groceries", 20.0, now);
        seed_item_full(&db, "u1", "h1", "hp1", "CVS", "Vitamins", "Health", 15.0, now);
        seed_item_full(&db, "u1", "s1", "sp1", "Target", "Socks", "Shopping", 10.0, now);

        let tips = TipEngine::new(&db).generate("u1", 6).unwrap();
        let tip = tips
            .iter()
            .find(|t| t.title == "High Transport spending")
            .unwrap();

        // 320 over 60 days -> 160/month -> 30% recoverable
        assert_eq!(tip.monthly_savings, 48.0);
        assert_eq!(tip.action_tag, "Set Budget");
    }

    #[test]
    fn test_underused_subscription_tip() {
        let db = Database::in_memory().unwrap();
        let now = Utc::now();

        // Netflix charged twice, 30 days apart, no other Netflix activity
        seed_item_full(
            &db, "u1", "n1", "np1", "Netflix", "Netflix", "Entertainment", 15.49,
            now - Duration::days(45),
        );
        seed_item_full(
            &db, "u1", "n2", "np2", "Netflix", "Netflix", "Entertainment", 15.49,
            now - Duration::days(15),
        );

        let tips = TipEngine::new(&db).generate("u1", 6).unwrap();
        let tip = tips
            .iter()
            .find(|t| t.title == "Under-used subscription: Netflix")
            .unwrap();
        assert_eq!(tip.monthly_savings, 15.49);
    }

    #[test]
    fn test_heavily_used_merchant_is_not_flagged() {
        let db = Database::in_memory().unwrap();
        let now = Utc::now();

        // Recurring Amazon Prime charge plus lots of Amazon orders
        seed_item_full(
            &db, "u1", "a1", "ap1", "Amazon", "Prime", "Shopping", 14.99,
            now - Duration::days(40),
        );
        seed_item_full(
            &db, "u1", "a2", "ap2", "Amazon", "Prime", "Shopping", 14.99,
            now - Duration::days(10),
        );
        for i in 0..6 {
            seed_item_full(
                &db,
                "u1",
                &format!("o{i}"),
                &format!("op{i}"),
                "Amazon",
                "Household order",
                "Shopping",
                23.50,
                now - Duration::days(i as i64 * 4),
            );
        }

        let tips = TipEngine::new(&db).generate("u1", 6).unwrap();
        assert!(!tips
            .iter()
            .any(|t| t.title == "Under-used subscription: Amazon"));
    }

    #[test]
    fn test_bundle_opportunity_tip() {
        let db = Database::in_memory().unwrap();
        let now = Utc::now();

        // Hulu and Disney+ both billed monthly, combined above the bundle
        seed_item_full(
            &db, "u1", "h1", "hp1", "Hulu", "Hulu", "Entertainment", 17.99,
            now - Duration::days(40),
        );
        seed_item_full(
            &db, "u1", "h2", "hp2", "Hulu", "Hulu", "Entertainment", 17.99,
            now - Duration::days(10),
        );
        seed_item_full(
            &db, "u1", "d1", "dp1", "Disney+", "Disney+", "Entertainment", 13.99,
            now - Duration::days(41),
        );
        seed_item_full(
            &db, "u1", "d2", "dp2", "Disney+", "Disney+", "Entertainment", 13.99,
            now - Duration::days(11),
        );

        let tips = TipEngine::new(&db).generate("u1", 6).unwrap();
        let tip = tips
            .iter()
            .find(|t| t.title.starts_with("Switch to the"))
            .unwrap();

        // 17.99 + 13.99 = 31.98 vs 19.99 bundle
        assert_eq!(tip.monthly_savings, 11.99);
        assert_eq!(tip.category, "Entertainment");
    }

    #[test]
    fn test_merge_orders_by_savings_and_truncates() {
        let db = Database::in_memory().unwrap();
        let now = Utc::now();

        // Big coffee habit and a small subscription
        for i in 0..22 {
            seed_item(
                &db,
                "u1",
                &format!("c{i}"),
                &format!("cp{i}"),
                now - Duration::days(55) + Duration::days((i * 5 / 2) as i64),
            );
        }
        seed_item_full(
            &db, "u1", "n1", "np1", "Netflix", "Netflix", "Entertainment", 7.99,
            now - Duration::days(45),
        );
        seed_item_full(
            &db, "u1", "n2", "np2", "Netflix", "Netflix", "Entertainment", 7.99,
            now - Duration::days(15),
        );

        let tips = TipEngine::new(&db).generate("u1", 6).unwrap();
        assert!(tips.len() >= 2);
        for window in tips.windows(2) {
            assert!(window[0].monthly_savings >= window[1].monthly_savings);
        }

        let one = TipEngine::new(&db).generate("u1", 1).unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].title, tips[0].title);
    }

    #[test]
    fn test_no_history_no_tips() {
        let db = Database::in_memory().unwrap();
        assert!(TipEngine::new(&db).generate("u1", 6).unwrap().is_empty());
    }
}
