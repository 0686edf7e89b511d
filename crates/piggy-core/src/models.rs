//! Domain models for piggy

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Round a dollar amount to 2 fractional digits (half-to-even).
pub fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round_ties_even() / 100.0
}

/// Canonical normalised item text: `"merchant · category · subcategory · item_name"`.
///
/// Empty segments are skipped so items without a subcategory still produce
/// a clean string.
pub fn canonical_item_text(
    merchant: &str,
    category: &str,
    subcategory: Option<&str>,
    item_name: &str,
) -> String {
    let mut parts: Vec<&str> = vec![merchant, category];
    if let Some(sub) = subcategory {
        if !sub.trim().is_empty() {
            parts.push(sub);
        }
    }
    parts.push(item_name);
    parts
        .into_iter()
        .filter(|p| !p.trim().is_empty())
        .collect::<Vec<_>>()
        .join(" · ")
}

/// Need/want classification label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NeedWant {
    Need,
    Want,
    #[default]
    Unset,
}

impl NeedWant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Need => "need",
            Self::Want => "want",
            Self::Unset => "unset",
        }
    }
}

impl std::str::FromStr for NeedWant {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "need" => Ok(Self::Need),
            "want" => Ok(Self::Want),
            "unset" | "" => Ok(Self::Unset),
            _ => Err(format!("Unknown need/want label: {}", s)),
        }
    }
}

impl std::fmt::Display for NeedWant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle status of a purchase item
///
/// Only `active` items participate in analytics; refunded and reversed
/// items are excluded from every read path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    #[default]
    Active,
    Refunded,
    Reversed,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Refunded => "refunded",
            Self::Reversed => "reversed",
        }
    }
}

impl std::str::FromStr for ItemStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "refunded" => Ok(Self::Refunded),
            "reversed" => Ok(Self::Reversed),
            _ => Err(format!("Unknown item status: {}", s)),
        }
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Coarse buyer location snapshot
///
/// Never carries latitude/longitude, even when the ingestion payload
/// provided them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyerLocation {
    pub city: String,
    pub state: String,
    pub country: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
}

/// A single itemised purchase record
///
/// Created by ingestion; never mutated after insert except for `status`
/// and the one-time `user_needwant` override.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseItem {
    pub item_id: String,
    /// Groups items from a single receipt/order
    pub purchase_id: String,
    pub user_id: String,
    pub merchant: String,
    pub item_name: String,
    pub category: String,
    pub subcategory: Option<String>,
    /// Canonical `"merchant · category · subcategory · item_name"` form
    pub item_text: String,
    pub price: f64,
    pub qty: f64,
    /// Purchase instant
    pub ts: DateTime<Utc>,
    pub detected_needwant: NeedWant,
    pub user_needwant: NeedWant,
    /// Classifier's self-reported confidence, 0..1
    pub confidence: f64,
    pub buyer_location: Option<BuyerLocation>,
    /// Fixed-length embedding vector produced by an external service;
    /// consumed passively
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_embed: Option<Vec<f32>>,
    pub status: ItemStatus,
    pub created_at: DateTime<Utc>,
}

impl PurchaseItem {
    /// The effective need/want label: the user's override if set, else the
    /// classifier's.
    pub fn effective_needwant(&self) -> NeedWant {
        match self.user_needwant {
            NeedWant::Unset => self.detected_needwant,
            label => label,
        }
    }

    /// Line total for this item.
    pub fn line_total(&self) -> f64 {
        self.price * self.qty
    }
}

/// A new purchase item to insert (before DB insertion)
#[derive(Debug, Clone)]
pub struct NewPurchaseItem {
    pub item_id: String,
    pub purchase_id: String,
    pub user_id: String,
    pub merchant: String,
    pub item_name: String,
    pub category: String,
    pub subcategory: Option<String>,
    pub price: f64,
    pub qty: f64,
    pub ts: DateTime<Utc>,
    pub detected_needwant: NeedWant,
    pub confidence: f64,
    pub buyer_location: Option<BuyerLocation>,
    pub item_embed: Option<Vec<f32>>,
}

// ========== Weekly Report Models ==========

/// Location snapshot stored on a weekly report (city/state/country only)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportLocation {
    pub city: String,
    pub state: String,
    pub country: String,
}

/// Sales channel of a cheaper alternative
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingChannel {
    Local,
    Online,
}

impl FindingChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Online => "online",
        }
    }
}

impl std::str::FromStr for FindingChannel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "online" => Ok(Self::Online),
            _ => Err(format!("Unknown finding channel: {}", s)),
        }
    }
}

/// A validated cheaper-substitute record for a single purchased item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub item_name: String,
    pub original_price: f64,
    pub original_merchant: String,
    pub alternative_merchant: String,
    pub alternative_price: f64,
    pub shipping_cost: f64,
    pub tax_estimate: f64,
    /// Price + shipping + tax at the alternative merchant
    pub total_landed_cost: f64,
    pub total_savings: f64,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub channel: FindingChannel,
    pub confidence: f64,
}

/// A weekly alternative-suggestions report, unique per (user, week)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeeklyReport {
    pub report_id: String,
    pub user_id: String,
    /// ISO-week Monday
    pub week_start: NaiveDate,
    /// `week_start + 6 days`
    pub week_end: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<ReportLocation>,
    pub items_analyzed: i64,
    pub items_with_alternatives: i64,
    pub total_savings: f64,
    pub findings: Vec<Finding>,
    /// Set when parsing failed: the report is still persisted with zero
    /// findings and the failure recorded here
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub mcp_calls_made: i64,
    pub processing_time_ms: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Compact report view for history listings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeeklyReportSummary {
    pub report_id: String,
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
    pub items_analyzed: i64,
    pub items_with_alternatives: i64,
    pub total_savings: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WeeklyReport {
    pub fn summary(&self) -> WeeklyReportSummary {
        WeeklyReportSummary {
            report_id: self.report_id.clone(),
            week_start: self.week_start,
            week_end: self.week_end,
            items_analyzed: self.items_analyzed,
            items_with_alternatives: self.items_with_alternatives,
            total_savings: self.total_savings,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

// ========== Engine Output Models ==========

/// A forecast for the next occurrence of a recurring item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub item: String,
    pub category: String,
    pub next_time: DateTime<Utc>,
    pub last_time: DateTime<Utc>,
    pub avg_interval_days: f64,
    pub samples: i64,
    pub confidence: f64,
}

/// An actionable savings tip
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tip {
    pub icon: String,
    pub title: String,
    pub subtitle: String,
    pub description: String,
    pub monthly_savings: f64,
    pub action_tag: String,
    pub category: String,
}

/// A cheaper-merchant alternative from the static deal catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DealAlternative {
    pub name: String,
    /// Fraction of spend saved by switching, 0..1
    pub savings_percent: f64,
    pub icon: String,
}

/// A suggestion to switch merchants, with projected monthly savings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DealSuggestion {
    pub current_store: String,
    pub current_spending_month: f64,
    pub alternative_store: String,
    pub savings_percent: f64,
    pub monthly_savings: f64,
    pub purchase_count: i64,
    pub category: String,
    pub all_alternatives: Vec<DealAlternative>,
}

// ========== Aggregation View Models ==========

/// Receipt-level rollup of purchase items, grouped by purchase_id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRollup {
    /// The purchase_id of the grouped items
    pub id: String,
    pub user_id: String,
    pub merchant: String,
    /// Σ price · qty across the receipt
    pub amount: f64,
    /// Most frequent category among the items
    pub category: String,
    pub need_or_want: NeedWant,
    /// Mean classifier confidence
    pub confidence: f64,
    pub occurred_at: DateTime<Utc>,
    /// Item names joined with " · ", ordered by item_id
    pub item_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embed: Option<Vec<f32>>,
}

/// Per-(category, subcategory, ISO week) spending summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryWeekSummary {
    pub category: String,
    pub subcategory: Option<String>,
    pub week_start: NaiveDate,
    pub purchase_count: i64,
    pub item_count: i64,
    pub total_spend: f64,
    pub need_spend: f64,
    pub want_spend: f64,
    pub avg_confidence: f64,
    /// Items carrying a user need/want override
    pub user_labeled: i64,
}
