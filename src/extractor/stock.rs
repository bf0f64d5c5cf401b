//! Out-of-stock detection.
//!
//! Only signals specific to the requested variant are consulted. Visible
//! page text is deliberately never scanned: multi-variant pages render
//! "Sold Out" for other sizes and colors while the selected variant is
//! still purchasable, and a text scan would turn those into false alarms.
//! Absent any negative signal the item is reported in stock.

use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;
use std::sync::LazyLock;

use super::structured;

const OOS_AVAILABILITY: [&str; 4] = ["OutOfStock", "SoldOut", "Discontinued", "BackOrder"];

const META_OUT_OF_STOCK: [&str; 5] = ["out of stock", "oos", "sold out", "backorder", "preorder"];
const META_IN_STOCK: [&str; 3] = ["in stock", "instock", "available"];

/// Purchase-action phrases a disabled primary button may carry.
const PURCHASE_ACTIONS: [&str; 5] = ["add to cart", "add to bag", "buy now", "purchase", "checkout"];

/// Upper bound on how many buttons are inspected per page.
const BUTTON_SCAN_LIMIT: usize = 100;

static META_AVAILABILITY_PROPERTY: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"meta[property="product:availability"]"#).unwrap());
static META_AVAILABILITY_NAME: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"meta[name="availability"]"#).unwrap());
static BUTTON: LazyLock<Selector> = LazyLock::new(|| Selector::parse("button").unwrap());

/// Trailing qualifier after a dash, e.g. "Add to cart — Sold out".
static DASH_QUALIFIER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\-–—].*$").unwrap());

/// Evaluates the availability signals in precedence order; the first
/// decisive one wins. Returns `true` when the item is in stock.
pub fn extract_stock_status(doc: &Html, source_url: &str) -> bool {
    if let Some(in_stock) = structured_availability(doc, source_url) {
        return in_stock;
    }
    if let Some(in_stock) = meta_availability(doc) {
        return in_stock;
    }
    if has_disabled_purchase_button(doc) {
        return false;
    }
    true
}

/// Structured offer availability, filtered to the URL's variant exactly as
/// in price extraction. An in-stock value short-circuits so later signals
/// cannot override it.
fn structured_availability(doc: &Html, source_url: &str) -> Option<bool> {
    let variant = structured::variant_id(source_url);
    for item in structured::ld_items(doc) {
        let offers = structured::collect_offers(&item);
        for offer in structured::candidate_offers(&offers, variant.as_deref()) {
            let availability = offer
                .get("availability")
                .and_then(Value::as_str)
                .unwrap_or("");
            if OOS_AVAILABILITY.iter().any(|s| availability.contains(s)) {
                return Some(false);
            }
            if availability.contains("InStock") {
                return Some(true);
            }
        }
    }
    None
}

fn meta_availability(doc: &Html) -> Option<bool> {
    let meta = doc
        .select(&META_AVAILABILITY_PROPERTY)
        .next()
        .or_else(|| doc.select(&META_AVAILABILITY_NAME).next())?;
    let value = meta.value().attr("content").unwrap_or("").trim().to_lowercase();
    if META_OUT_OF_STOCK.contains(&value.as_str()) {
        return Some(false);
    }
    if META_IN_STOCK.contains(&value.as_str()) {
        return Some(true);
    }
    None
}

/// A disabled button whose normalized text is exactly a purchase action.
/// Enabled buttons and disabled buttons with other labels say nothing.
fn has_disabled_purchase_button(doc: &Html) -> bool {
    for button in doc.select(&BUTTON).take(BUTTON_SCAN_LIMIT) {
        if button.value().attr("disabled").is_none() {
            continue;
        }
        let text = button.text().collect::<Vec<_>>().join(" ").to_lowercase();
        let core = DASH_QUALIFIER.replace(&text, "");
        let normalized = core.split_whitespace().collect::<Vec<_>>().join(" ");
        if PURCHASE_ACTIONS.contains(&normalized.as_str()) {
            return true;
        }
    }
    false
}
