//! Purchase Store operations
//!
//! Every read filters `status = 'active'` implicitly; refunded and reversed
//! items never reach the engines.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rusqlite::{params, Row};

use super::{parse_datetime, Database};
use crate::error::Result;
use crate::models::{BuyerLocation, ItemStatus, NeedWant, NewPurchaseItem, PurchaseItem};

const ITEM_COLUMNS: &str = "item_id, purchase_id, user_id, merchant, item_name, category, subcategory, \
     item_text, price, qty, ts, detected_needwant, user_needwant, confidence, \
     loc_city, loc_state, loc_country, loc_postal_code, item_embed, status, created_at";

impl Database {
    /// Insert a purchase item (skips duplicates on item_id)
    ///
    /// Returns true if a row was inserted, false if the item already existed.
    pub fn insert_purchase_item(&self, item: &NewPurchaseItem) -> Result<bool> {
        let conn = self.conn()?;

        let item_text = crate::models::canonical_item_text(
            &item.merchant,
            &item.category,
            item.subcategory.as_deref(),
            &item.item_name,
        );
        let embed_json = match &item.item_embed {
            Some(v) => Some(serde_json::to_string(v)?),
            None => None,
        };
        let loc = item.buyer_location.as_ref();

        let inserted = conn.execute(
            r#"
            INSERT INTO purchase_items
                (item_id, purchase_id, user_id, merchant, item_name, category, subcategory,
                 item_text, price, qty, ts, detected_needwant, confidence,
                 loc_city, loc_state, loc_country, loc_postal_code, item_embed)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(item_id) DO NOTHING
            "#,
            params![
                item.item_id,
                item.purchase_id,
                item.user_id,
                item.merchant,
                item.item_name,
                item.category,
                item.subcategory,
                item_text,
                item.price,
                item.qty,
                item.ts.to_rfc3339(),
                item.detected_needwant.as_str(),
                item.confidence,
                loc.map(|l| l.city.as_str()),
                loc.map(|l| l.state.as_str()),
                loc.map(|l| l.country.as_str()),
                loc.and_then(|l| l.postal_code.as_deref()),
                embed_json,
            ],
        )?;

        Ok(inserted > 0)
    }

    /// List a user's active items, newest first
    pub fn list_items(
        &self,
        user_id: &str,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
        limit: Option<i64>,
    ) -> Result<Vec<PurchaseItem>> {
        let conn = self.conn()?;

        let sql = format!(
            r#"
            SELECT {ITEM_COLUMNS}
            FROM purchase_items
            WHERE user_id = ?
              AND status = 'active'
              AND (?2 IS NULL OR ts >= ?2)
              AND (?3 IS NULL OR ts < ?3)
            ORDER BY ts DESC, item_id ASC
            LIMIT ?4
            "#
        );

        let mut stmt = conn.prepare(&sql)?;
        let items = stmt
            .query_map(
                params![
                    user_id,
                    since.map(|t| t.to_rfc3339()),
                    until.map(|t| t.to_rfc3339()),
                    limit.unwrap_or(-1),
                ],
                Self::row_to_item,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(items)
    }

    /// List a user's active items in one category, newest first
    pub fn list_items_by_category(
        &self,
        user_id: &str,
        category: &str,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Result<Vec<PurchaseItem>> {
        let conn = self.conn()?;

        let sql = format!(
            r#"
            SELECT {ITEM_COLUMNS}
            FROM purchase_items
            WHERE user_id = ?
              AND category = ? COLLATE NOCASE
              AND status = 'active'
              AND (?3 IS NULL OR ts >= ?3)
              AND (?4 IS NULL OR ts < ?4)
            ORDER BY ts DESC, item_id ASC
            "#
        );

        let mut stmt = conn.prepare(&sql)?;
        let items = stmt
            .query_map(
                params![
                    user_id,
                    category,
                    since.map(|t| t.to_rfc3339()),
                    until.map(|t| t.to_rfc3339()),
                ],
                Self::row_to_item,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(items)
    }

    /// Top-priced active items of an ISO week, ordered by `price * qty`
    /// descending, ties broken by `ts` desc then `item_id` asc.
    pub fn top_items_by_price(
        &self,
        user_id: &str,
        week_start: NaiveDate,
        n: i64,
    ) -> Result<Vec<PurchaseItem>> {
        let conn = self.conn()?;

        let start = week_start
            .and_hms_opt(0, 0, 0)
            .unwrap_or_default()
            .and_utc();
        let end = start + Duration::days(7);

        let sql = format!(
            r#"
            SELECT {ITEM_COLUMNS}
            FROM purchase_items
            WHERE user_id = ?
              AND status = 'active'
              AND ts >= ?
              AND ts < ?
            ORDER BY price * qty DESC, ts DESC, item_id ASC
            LIMIT ?
            "#
        );

        let mut stmt = conn.prepare(&sql)?;
        let items = stmt
            .query_map(
                params![user_id, start.to_rfc3339(), end.to_rfc3339(), n],
                Self::row_to_item,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(items)
    }

    /// Distinct users with at least one active item in the given ISO week
    pub fn active_users_for_week(&self, week_start: NaiveDate) -> Result<Vec<String>> {
        let conn = self.conn()?;

        let start = week_start
            .and_hms_opt(0, 0, 0)
            .unwrap_or_default()
            .and_utc();
        let end = start + Duration::days(7);

        let mut stmt = conn.prepare(
            r#"
            SELECT DISTINCT user_id
            FROM purchase_items
            WHERE status = 'active'
              AND ts >= ?
              AND ts < ?
            ORDER BY user_id
            "#,
        )?;

        let users = stmt
            .query_map(params![start.to_rfc3339(), end.to_rfc3339()], |row| {
                row.get::<_, String>(0)
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(users)
    }

    /// Case-insensitive substring search over item name, merchant, and
    /// category. Same simplified shape as the transactions feed.
    pub fn search_items_text(
        &self,
        user_id: &str,
        query: &str,
        limit: i64,
    ) -> Result<Vec<PurchaseItem>> {
        let conn = self.conn()?;

        let pattern = format!("%{}%", query.trim());
        let sql = format!(
            r#"
            SELECT {ITEM_COLUMNS}
            FROM purchase_items
            WHERE user_id = ?
              AND status = 'active'
              AND (item_name LIKE ? COLLATE NOCASE
                   OR merchant LIKE ? COLLATE NOCASE
                   OR category LIKE ? COLLATE NOCASE)
            ORDER BY ts DESC, item_id ASC
            LIMIT ?
            "#
        );

        let mut stmt = conn.prepare(&sql)?;
        let items = stmt
            .query_map(
                params![user_id, pattern, pattern, pattern, limit],
                Self::row_to_item,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(items)
    }

    /// Record the one-time user need/want override
    ///
    /// Returns false when no such item exists.
    pub fn set_user_needwant(&self, item_id: &str, label: NeedWant) -> Result<bool> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE purchase_items SET user_needwant = ? WHERE item_id = ?",
            params![label.as_str(), item_id],
        )?;
        Ok(updated > 0)
    }

    /// Logically retire or restore an item
    pub fn set_item_status(&self, item_id: &str, status: ItemStatus) -> Result<bool> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE purchase_items SET status = ? WHERE item_id = ?",
            params![status.as_str(), item_id],
        )?;
        Ok(updated > 0)
    }

    fn row_to_item(row: &Row<'_>) -> rusqlite::Result<PurchaseItem> {
        let ts: String = row.get(10)?;
        let detected: String = row.get(11)?;
        let user_label: String = row.get(12)?;
        let status: String = row.get(19)?;
        let created_at: String = row.get(20)?;

        let loc_city: Option<String> = row.get(14)?;
        let loc_state: Option<String> = row.get(15)?;
        let loc_country: Option<String> = row.get(16)?;
        let buyer_location = match (loc_city, loc_state, loc_country) {
            (Some(city), Some(state), Some(country)) => Some(BuyerLocation {
                city,
                state,
                country,
                postal_code: row.get(17)?,
            }),
            _ => None,
        };

        let embed_json: Option<String> = row.get(18)?;
        let item_embed = embed_json.and_then(|j| serde_json::from_str(&j).ok());

        Ok(PurchaseItem {
            item_id: row.get(0)?,
            purchase_id: row.get(1)?,
            user_id: row.get(2)?,
            merchant: row.get(3)?,
            item_name: row.get(4)?,
            category: row.get(5)?,
            subcategory: row.get(6)?,
            item_text: row.get(7)?,
            price: row.get(8)?,
            qty: row.get(9)?,
            ts: parse_datetime(&ts),
            detected_needwant: detected.parse().unwrap_or_default(),
            user_needwant: user_label.parse().unwrap_or_default(),
            confidence: row.get(13)?,
            buyer_location,
            item_embed,
            status: status.parse().unwrap_or_default(),
            created_at: parse_datetime(&created_at),
        })
    }
}
