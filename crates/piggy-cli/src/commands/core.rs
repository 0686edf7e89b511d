//! Database initialization and demo seeding

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use tracing::info;

use piggy_core::models::{BuyerLocation, NeedWant, NewPurchaseItem};
use piggy_core::Database;

/// Open (and migrate) the database at the given path.
pub fn open_db(path: &Path) -> Result<Database> {
    Database::new(&path.to_string_lossy())
        .with_context(|| format!("Failed to open database at {}", path.display()))
}

/// `piggy init`
pub fn cmd_init(path: &Path) -> Result<()> {
    let db = open_db(path)?;
    info!("Database initialized at {}", db.path());
    println!("Initialized database: {}", db.path());
    Ok(())
}

/// `piggy seed` - a deterministic demo history so the API surface is
/// explorable without a real ingestion pipeline.
pub fn cmd_seed(path: &Path, user: &str) -> Result<()> {
    let db = open_db(path)?;
    let now = Utc::now();
    let location = BuyerLocation {
        city: "Princeton".to_string(),
        state: "NJ".to_string(),
        country: "US".to_string(),
        postal_code: Some("08540".to_string()),
    };

    let mut inserted = 0usize;
    let mut seed = |item_id: String,
                    purchase_id: String,
                    merchant: &str,
                    item_name: &str,
                    category: &str,
                    price: f64,
                    needwant: NeedWant,
                    days_ago: i64|
     -> Result<()> {
        let item = NewPurchaseItem {
            item_id,
            purchase_id,
            user_id: user.to_string(),
            merchant: merchant.to_string(),
            item_name: item_name.to_string(),
            category: category.to_string(),
            subcategory: None,
            price,
            qty: 1.0,
            ts: now - Duration::days(days_ago),
            detected_needwant: needwant,
            confidence: 0.85,
            buyer_location: Some(location.clone()),
            item_embed: None,
        };
        if db.insert_purchase_item(&item)? {
            inserted += 1;
        }
        Ok(())
    };

    // Daily coffee habit
    for day in 0..21 {
        seed(
            format!("{user}-coffee-{day}"),
            format!("{user}-coffee-order-{day}"),
            "Starbucks",
            "Latte",
            "Coffee",
            7.25,
            NeedWant::Want,
            day,
        )?;
    }

    // Weekly groceries
    for week in 0..6 {
        seed(
            format!("{user}-groceries-{week}"),
            format!("{user}-groceries-order-{week}"),
            "Trader Joe's",
            "Weekly shop",
            "Groceries",
            62.40,
            NeedWant::Need,
            week * 7 + 2,
        )?;
    }

    // Monthly streaming subscriptions
    for month in 0..2 {
        seed(
            format!("{user}-netflix-{month}"),
            format!("{user}-netflix-order-{month}"),
            "Netflix",
            "Netflix",
            "Entertainment",
            15.49,
            NeedWant::Want,
            month * 30 + 5,
        )?;
        seed(
            format!("{user}-hulu-{month}"),
            format!("{user}-hulu-order-{month}"),
            "Hulu",
            "Hulu",
            "Entertainment",
            17.99,
            NeedWant::Want,
            month * 30 + 8,
        )?;
        seed(
            format!("{user}-disney-{month}"),
            format!("{user}-disney-order-{month}"),
            "Disney+",
            "Disney+",
            "Entertainment",
            13.99,
            NeedWant::Want,
            month * 30 + 11,
        )?;
    }

    // A few rides and one big-ticket purchase for the weekly suggester
    for i in 0..5 {
        seed(
            format!("{user}-uber-{i}"),
            format!("{user}-uber-order-{i}"),
            "Uber",
            "Ride",
            "Transport",
            18.50,
            NeedWant::Want,
            i * 4 + 1,
        )?;
    }
    seed(
        format!("{user}-doorbell"),
        format!("{user}-doorbell-order"),
        "Amazon",
        "Ring Video Doorbell",
        "Shopping",
        99.99,
        NeedWant::Want,
        3,
    )?;

    info!(user = %user, inserted, "Demo data seeded");
    println!("Seeded {} purchase items for {}", inserted, user);
    Ok(())
}
