//! Static merchant-alternative catalog and deal suggestions
//!
//! The catalog is a pure reference table compiled into the binary; editing
//! it requires redeployment. `suggest_deals` joins it against the user's
//! 30-day merchant spend and projects monthly savings for switching.

use std::collections::HashMap;
use std::sync::OnceLock;

use chrono::{Duration, Utc};
use tracing::debug;

use crate::db::Database;
use crate::error::Result;
use crate::models::{round_cents, DealAlternative, DealSuggestion};

/// Minimum purchases at a merchant before a switch is worth suggesting.
const MIN_PURCHASES: i64 = 2;

/// A bundle offer that can replace several separate subscriptions.
#[derive(Debug, Clone)]
pub struct Bundle {
    pub name: String,
    pub components: Vec<String>,
    pub price: f64,
}

/// Versioned merchant → alternatives mapping plus bundle offers.
#[derive(Debug, Clone)]
pub struct DealCatalog {
    merchants: Vec<(String, Vec<DealAlternative>)>,
    bundles: Vec<Bundle>,
}

fn alt(name: &str, savings_percent: f64, icon: &str) -> DealAlternative {
    DealAlternative {
        name: name.to_string(),
        savings_percent,
        icon: icon.to_string(),
    }
}

impl DealCatalog {
    /// The built-in catalog, loaded once at start-up.
    pub fn builtin() -> &'static DealCatalog {
        static CATALOG: OnceLock<DealCatalog> = OnceLock::new();
        CATALOG.get_or_init(|| DealCatalog {
            merchants: vec![
                (
                    "Starbucks".to_string(),
                    vec![
                        alt("Dunkin", 0.40, "☕"),
                        alt("Home Brew", 0.80, "🏠"),
                        alt("McDonald's", 0.50, "🍟"),
                    ],
                ),
                (
                    "Trader Joe's".to_string(),
                    vec![
                        alt("Aldi", 0.30, "🛒"),
                        alt("Costco", 0.25, "📦"),
                        alt("Walmart", 0.20, "🏪"),
                    ],
                ),
                (
                    "Target".to_string(),
                    vec![
                        alt("Walmart", 0.15, "🏪"),
                        alt("Costco (Bulk)", 0.25, "📦"),
                        alt("Amazon", 0.10, "📦"),
                    ],
                ),
                (
                    "Amazon".to_string(),
                    vec![
                        alt("Walmart", 0.12, "🏪"),
                        alt("Target", 0.08, "🎯"),
                        alt("AliExpress", 0.50, "🌍"),
                    ],
                ),
                (
                    "Whole Foods".to_string(),
                    vec![
                        alt("Trader Joe's", 0.35, "🛒"),
                        alt("Sprouts", 0.25, "🥬"),
                        alt("Regular Grocery", 0.40, "🏪"),
                    ],
                ),
                (
                    "DoorDash".to_string(),
                    vec![
                        alt("Pickup Instead", 0.60, "🚗"),
                        alt("Cook at Home", 0.70, "👨‍🍳"),
                        alt("Uber Eats (promo)", 0.20, "🍔"),
                    ],
                ),
                (
                    "Disney+".to_string(),
                    vec![
                        alt("Disney+ Hulu Bundle", 0.35, "🎬"),
                        alt("Family Plan Split", 0.50, "👨‍👩‍👧"),
                    ],
                ),
                (
                    "Hulu".to_string(),
                    vec![
                        alt("Disney+ Hulu Bundle", 0.35, "🎬"),
                        alt("Hulu (w/ads)", 0.45, "📺"),
                    ],
                ),
                (
                    "Netflix".to_string(),
                    vec![
                        alt("Share with Family", 0.60, "👨‍👩‍👧"),
                        alt("Cancel & Rotate", 1.00, "🔄"),
                        alt("Basic Plan", 0.40, "📺"),
                    ],
                ),
                (
                    "Planet Fitness".to_string(),
                    vec![
                        alt("Home Workouts", 0.90, "🏠"),
                        alt("YouTube Fitness", 1.00, "📱"),
                        alt("Community Rec Center", 0.70, "🏊"),
                    ],
                ),
            ],
            bundles: vec![Bundle {
                name: "Disney+ Hulu Bundle".to_string(),
                components: vec!["Hulu".to_string(), "Disney+".to_string()],
                price: 19.99,
            }],
        })
    }

    /// Alternatives for a merchant, matched by case-insensitive containment
    /// of the catalog name in the observed merchant string.
    pub fn lookup(&self, merchant: &str) -> Option<&[DealAlternative]> {
        let lower = merchant.to_lowercase();
        self.merchants
            .iter()
            .find(|(name, _)| lower.contains(&name.to_lowercase()))
            .map(|(_, alternatives)| alternatives.as_slice())
    }

    pub fn bundles(&self) -> &[Bundle] {
        &self.bundles
    }
}

/// Suggest cheaper merchants for where the user already shops.
pub fn suggest_deals(
    db: &Database,
    catalog: &DealCatalog,
    user_id: &str,
    limit: usize,
    allowed_categories: &[String],
) -> Result<Vec<DealSuggestion>> {
    let since = Utc::now() - Duration::days(30);
    let items = db.list_items(user_id, Some(since), None, None)?;

    struct MerchantSpend {
        total: f64,
        count: i64,
        categories: HashMap<String, usize>,
    }

    let mut per_merchant: HashMap<String, MerchantSpend> = HashMap::new();
    for item in &items {
        let entry = per_merchant
            .entry(item.merchant.clone())
            .or_insert_with(|| MerchantSpend {
                total: 0.0,
                count: 0,
                categories: HashMap::new(),
            });
        entry.total += item.line_total();
        entry.count += 1;
        *entry.categories.entry(item.category.clone()).or_insert(0) += 1;
    }

    let mut suggestions = Vec::new();
    for (merchant, spend) in per_merchant {
        if spend.count < MIN_PURCHASES {
            continue;
        }
        let Some(alternatives) = catalog.lookup(&merchant) else {
            continue;
        };

        let mut categories: Vec<(&String, &usize)> = spend.categories.iter().collect();
        categories.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
        let category = categories
            .first()
            .map(|(c, _)| (*c).clone())
            .unwrap_or_default();
        if !allowed_categories
            .iter()
            .any(|c| c.eq_ignore_ascii_case(&category))
        {
            continue;
        }

        let best = alternatives
            .iter()
            .max_by(|a, b| {
                a.savings_percent
                    .partial_cmp(&b.savings_percent)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .cloned();
        let Some(best) = best else { continue };

        suggestions.push(DealSuggestion {
            current_store: merchant,
            current_spending_month: round_cents(spend.total),
            alternative_store: best.name.clone(),
            savings_percent: best.savings_percent,
            monthly_savings: round_cents(spend.total * best.savings_percent),
            purchase_count: spend.count,
            category,
            all_alternatives: alternatives.to_vec(),
        });
    }

    suggestions.sort_by(|a, b| {
        b.monthly_savings
            .partial_cmp(&a.monthly_savings)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.current_store.cmp(&b.current_store))
    });
    suggestions.truncate(limit);

    debug!(user_id = %user_id, count = suggestions.len(), "Suggested better deals");
    Ok(suggestions)
}
