//! Alert decisions: once-per-day drop suppression, the per-product outcome
//! state machine, and the staleness scan.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::history::PriceStore;
use crate::Result;

/// Suppression entries older than this are pruned on save, so a long gap
/// between runs cannot carry stale suppression forward.
pub const SUPPRESSION_RETENTION_DAYS: i64 = 2;

/// A product whose newest log row is older than this is considered stale.
pub const STALE_AFTER_HOURS: i64 = 24;

/// Product key → the day it last triggered a drop alert. Persisted as a
/// JSON object with `YYYY-MM-DD` values.
#[derive(Debug, Default)]
pub struct AlertLog {
    entries: HashMap<String, NaiveDate>,
}

impl AlertLog {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(AlertLog::default());
        }
        let raw = fs::read_to_string(path)?;
        let entries = serde_json::from_str(&raw)?;
        Ok(AlertLog { entries })
    }

    pub fn save(&self, path: &Path, today: NaiveDate) -> Result<()> {
        let cutoff = today - Duration::days(SUPPRESSION_RETENTION_DAYS);
        let pruned: HashMap<&String, &NaiveDate> = self
            .entries
            .iter()
            .filter(|(_, date)| **date >= cutoff)
            .collect();
        fs::write(path, serde_json::to_string_pretty(&pruned)?)?;
        Ok(())
    }

    pub fn alerted_today(&self, name: &str, today: NaiveDate) -> bool {
        self.entries.get(name) == Some(&today)
    }

    pub fn mark(&mut self, name: &str, today: NaiveDate) {
        self.entries.insert(name.to_string(), today);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PriceDropEvent {
    pub name: String,
    pub url: String,
    pub old_price: f64,
    pub new_price: f64,
    pub drop: f64,
    pub pct: f64,
}

impl PriceDropEvent {
    pub fn new(name: &str, url: &str, old_price: f64, new_price: f64) -> Self {
        let drop = old_price - new_price;
        PriceDropEvent {
            name: name.to_string(),
            url: url.to_string(),
            old_price,
            new_price,
            drop,
            pct: drop / old_price * 100.0,
        }
    }
}

/// Per-product transition for one run.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// No price extracted; the retailer is invisible this cycle and
    /// nothing is logged.
    Skipped,
    /// Sold out. The reading is still logged for trend continuity but
    /// alerting is skipped regardless of price movement.
    OutOfStock { price: f64 },
    /// First recorded price for this product.
    Baseline { price: f64 },
    /// New price at or above the previous one.
    Steady { price: f64, previous: f64 },
    /// Price fell while in stock. `suppressed` is set when this product
    /// already alerted today; otherwise the alert log is marked.
    Drop { event: PriceDropEvent, suppressed: bool },
}

pub fn evaluate(
    name: &str,
    url: &str,
    price: Option<f64>,
    in_stock: bool,
    previous: Option<f64>,
    alerted: &mut AlertLog,
    today: NaiveDate,
) -> Outcome {
    let Some(price) = price else {
        return Outcome::Skipped;
    };
    if !in_stock {
        return Outcome::OutOfStock { price };
    }
    let Some(previous) = previous else {
        return Outcome::Baseline { price };
    };
    if price >= previous {
        return Outcome::Steady { price, previous };
    }

    let event = PriceDropEvent::new(name, url, previous, price);
    if alerted.alerted_today(name, today) {
        Outcome::Drop { event, suppressed: true }
    } else {
        alerted.mark(name, today);
        Outcome::Drop { event, suppressed: false }
    }
}

/// A configured product with no fresh log row; a liveness signal for the
/// scraper itself, not a price signal.
#[derive(Debug, Clone, PartialEq)]
pub struct StaleProduct {
    pub name: String,
    pub last_seen: Option<NaiveDateTime>,
}

impl StaleProduct {
    pub fn describe(&self, now: NaiveDateTime) -> String {
        match self.last_seen {
            None => format!("{} (no data yet)", self.name),
            Some(ts) => format!("{} (last seen {}h ago)", self.name, (now - ts).num_hours()),
        }
    }
}

/// Every configured product whose most recent reading is absent or older
/// than [`STALE_AFTER_HOURS`].
pub fn stale_products(
    keys: &[String],
    store: &PriceStore,
    now: NaiveDateTime,
) -> Result<Vec<StaleProduct>> {
    let cutoff = now - Duration::hours(STALE_AFTER_HOURS);
    let mut stale = Vec::new();
    for name in keys {
        match store.last_timestamp(name)? {
            None => stale.push(StaleProduct {
                name: name.clone(),
                last_seen: None,
            }),
            Some(ts) if ts < cutoff => stale.push(StaleProduct {
                name: name.clone(),
                last_seen: Some(ts),
            }),
            Some(_) => {}
        }
    }
    Ok(stale)
}
