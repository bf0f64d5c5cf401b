//! schema.org structured data embedded in product pages.
//!
//! Retailers expose machine-readable Product/Offer blocks in
//! `<script type="application/ld+json">` tags. These reflect the actual
//! purchase price and per-variant availability, so the extractors consult
//! them before any visible markup.

use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;
use std::sync::LazyLock;

static LD_JSON: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"script[type="application/ld+json"]"#).unwrap());

/// Variant/SKU identifier in a product URL, e.g. `?variant=41773030113355`.
static VARIANT_PARAM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[?&](?:variant|sku_id|sku)=([\w\-]+)").unwrap());

pub fn variant_id(url: &str) -> Option<String> {
    VARIANT_PARAM
        .captures(url)
        .map(|c| c[1].to_string())
}

/// All top-level JSON-LD items in the document. Script bodies that fail to
/// parse are skipped; top-level arrays are flattened into their elements.
pub fn ld_items(doc: &Html) -> Vec<Value> {
    let mut items = Vec::new();
    for script in doc.select(&LD_JSON) {
        let raw: String = script.text().collect();
        let Ok(data) = serde_json::from_str::<Value>(&raw) else {
            continue;
        };
        match data {
            Value::Array(elements) => items.extend(elements),
            other => items.push(other),
        }
    }
    items
}

/// Collects every offer object reachable from one item: the direct `offers`
/// field (object or list) and offers nested under `hasVariant` entries
/// (the ProductGroup pattern used by Shopify variant pages).
pub fn collect_offers(item: &Value) -> Vec<&Value> {
    let mut offers = Vec::new();
    push_offers(item.get("offers"), &mut offers);
    if let Some(variants) = item.get("hasVariant").and_then(Value::as_array) {
        for variant in variants {
            if variant.is_object() {
                push_offers(variant.get("offers"), &mut offers);
            }
        }
    }
    offers
}

fn push_offers<'a>(field: Option<&'a Value>, out: &mut Vec<&'a Value>) {
    match field {
        Some(offer @ Value::Object(_)) => out.push(offer),
        Some(Value::Array(list)) => out.extend(list.iter().filter(|o| o.is_object())),
        _ => {}
    }
}

/// Restricts offers to those whose own URL contains the variant identifier.
/// Falls back to the full set when no offer matches — variant filtering is
/// a precision refinement, never grounds for failure.
pub fn candidate_offers<'a>(offers: &[&'a Value], variant_id: Option<&str>) -> Vec<&'a Value> {
    if let Some(id) = variant_id {
        let matched: Vec<&Value> = offers
            .iter()
            .copied()
            .filter(|o| offer_url(o).contains(id))
            .collect();
        if !matched.is_empty() {
            return matched;
        }
    }
    offers.to_vec()
}

fn offer_url(offer: &Value) -> &str {
    offer.get("url").and_then(Value::as_str).unwrap_or("")
}
