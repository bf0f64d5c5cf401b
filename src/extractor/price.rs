//! Price extraction cascade.
//!
//! Sources are tried in a fixed precedence order and the first usable
//! price wins:
//!
//! 1. Structured offer data. Checked before any markup because pages
//!    commonly render the crossed-out "original" price ahead of the sale
//!    price in document order.
//! 2. Sale/current price elements, most specific selector first, with
//!    compare-at containers excluded by class pattern.
//! 3. Any span whose classes mention "price", excluding compare-at
//!    matches and struck-through elements.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use std::sync::LazyLock;

use super::structured;

/// Classes that mark a crossed-out reference price rather than the
/// purchase price. Anything in this context must never be extracted.
static COMPARE_AT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)compare[_\-]?at|was[_\-]?price|original[_\-]?price|price[_\-]?was|price--compare|price__compare|crossed|strikethrough|line-through",
    )
    .unwrap()
});

static SALE_PRICE_CLASSES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)price__sale|sale[_\-]?price|current[_\-]?price|price--sale").unwrap());

static CURRENT_PRICE_CLASSES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)price__current|product__price|ProductPrice").unwrap());

static PRODUCT_PRICE_CLASSES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)product-price|current-price").unwrap());

static ANY_PRICE_CLASS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)price").unwrap());

static SPAN: LazyLock<Selector> = LazyLock::new(|| Selector::parse("span").unwrap());
static DIV: LazyLock<Selector> = LazyLock::new(|| Selector::parse("div").unwrap());

pub fn extract_price(doc: &Html, source_url: &str) -> Option<f64> {
    structured_price(doc, source_url)
        .or_else(|| markup_price(doc))
        .or_else(|| broad_price(doc))
}

/// Strips thousands separators and any non-digit/non-decimal-point
/// characters, then parses. Non-numeric input is an extraction miss.
pub fn clean_price(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok()
}

fn structured_price(doc: &Html, source_url: &str) -> Option<f64> {
    let variant = structured::variant_id(source_url);
    for item in structured::ld_items(doc) {
        let offers = structured::collect_offers(&item);
        if offers.is_empty() {
            continue;
        }
        for offer in structured::candidate_offers(&offers, variant.as_deref()) {
            let Some(raw) = offer_price_field(offer) else {
                continue;
            };
            if let Some(price) = clean_price(&raw).filter(|p| *p > 0.0) {
                return Some(price);
            }
        }
    }
    None
}

/// Exact-price field, or the low end of a price range.
fn offer_price_field(offer: &Value) -> Option<String> {
    for key in ["price", "lowPrice"] {
        match offer.get(key) {
            Some(Value::String(s)) if !s.is_empty() => return Some(s.clone()),
            Some(Value::Number(n)) if n.as_f64().is_some_and(|v| v != 0.0) => {
                return Some(n.to_string());
            }
            _ => {}
        }
    }
    None
}

fn markup_price(doc: &Html) -> Option<f64> {
    let tiers: [(&Selector, &Regex); 3] = [
        (&SPAN, &SALE_PRICE_CLASSES),
        (&DIV, &CURRENT_PRICE_CLASSES),
        (&SPAN, &PRODUCT_PRICE_CLASSES),
    ];

    for (selector, classes) in tiers {
        let Some(el) = doc.select(selector).find(|e| classes.is_match(class_attr(e))) else {
            continue;
        };
        if in_compare_at_context(el) {
            continue;
        }
        let text: String = el.text().collect();
        if let Some(price) = clean_price(&text).filter(|p| *p > 0.0) {
            return Some(price);
        }
    }
    None
}

fn broad_price(doc: &Html) -> Option<f64> {
    for el in doc
        .select(&SPAN)
        .filter(|e| ANY_PRICE_CLASS.is_match(class_attr(e)))
    {
        if COMPARE_AT.is_match(class_attr(&el)) {
            continue;
        }
        if in_strikethrough(el) {
            continue;
        }
        let text: String = el.text().collect();
        if let Some(price) = clean_price(&text).filter(|p| *p > 0.0) {
            return Some(price);
        }
    }
    None
}

fn class_attr<'a>(el: &ElementRef<'a>) -> &'a str {
    el.value().attr("class").unwrap_or("")
}

/// The element or any of its ancestors carries a compare-at class.
fn in_compare_at_context(el: ElementRef) -> bool {
    if COMPARE_AT.is_match(class_attr(&el)) {
        return true;
    }
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .any(|a| COMPARE_AT.is_match(class_attr(&a)))
}

/// The element is, or is nested inside, a struck-through element.
fn in_strikethrough(el: ElementRef) -> bool {
    let struck = |name: &str| name == "s" || name == "del";
    if struck(el.value().name()) {
        return true;
    }
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .any(|a| struck(a.value().name()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn price_of(html: &str, url: &str) -> Option<f64> {
        let doc = Html::parse_document(html);
        extract_price(&doc, url)
    }

    #[test]
    fn test_clean_price_currency_and_separators() {
        assert_eq!(clean_price("$1,299.99"), Some(1299.99));
        assert_eq!(clean_price("£49.50"), Some(49.50));
        assert_eq!(clean_price("  399.00 USD "), Some(399.0));
        assert_eq!(clean_price("1 234,.. nope"), None);
        assert_eq!(clean_price(""), None);
        assert_eq!(clean_price("price unavailable"), None);
    }

    #[test]
    fn test_structured_price_wins_over_markup() {
        let html = r#"
            <html><head>
            <script type="application/ld+json">
            {"@type":"Product","offers":{"price":"349.00"}}
            </script>
            </head><body>
            <span class="sale-price">$399.00</span>
            </body></html>
        "#;
        assert_eq!(price_of(html, "https://x.example.com/p"), Some(349.0));
    }

    #[test]
    fn test_structured_price_accepts_low_price_range() {
        let html = r#"
            <html><head><script type="application/ld+json">
            {"@type":"Product","offers":{"lowPrice":"89.00","highPrice":"129.00"}}
            </script></head><body></body></html>
        "#;
        assert_eq!(price_of(html, "https://x.example.com/p"), Some(89.0));
    }

    #[test]
    fn test_variant_offer_selected_over_earlier_offer() {
        let html = r#"
            <html><head><script type="application/ld+json">
            {"@type":"ProductGroup","hasVariant":[
                {"offers":{"url":"/p?variant=111","price":"50.00"}},
                {"offers":{"url":"/p?variant=222","price":"45.00"}}
            ]}
            </script></head><body></body></html>
        "#;
        assert_eq!(
            price_of(html, "https://x.example.com/p?variant=222"),
            Some(45.0)
        );
    }

    #[test]
    fn variant_fallback_uses_all_offers() {
        let html = r#"
            <html><head><script type="application/ld+json">
            {"@type":"Product","offers":[{"price":"50.00"},{"price":"45.00"}]}
            </script></head><body></body></html>
        "#;
        // No offer URL mentions the variant id; the unfiltered set applies.
        assert_eq!(
            price_of(html, "https://x.example.com/p?variant=999"),
            Some(50.0)
        );
    }

    #[test]
    fn test_markup_sale_price_extracted() {
        let html = r#"
            <html><body>
            <span class="price__sale">$29.99</span>
            </body></html>
        "#;
        assert_eq!(price_of(html, "https://x.example.com/p"), Some(29.99));
    }

    #[test]
    fn test_compare_at_ancestor_excluded() {
        // First candidate in priority order sits inside a compare-at
        // container and must never be selected.
        let html = r#"
            <html><body>
            <div class="price--compare">
                <span class="sale-price">$399.00</span>
            </div>
            <div class="price__current">$349.00</div>
            </body></html>
        "#;
        assert_eq!(price_of(html, "https://x.example.com/p"), Some(349.0));
    }

    #[test]
    fn test_compare_at_own_class_excluded() {
        let html = r#"
            <html><body>
            <span class="price price--compare">$499.00</span>
            <span class="price">$449.00</span>
            </body></html>
        "#;
        assert_eq!(price_of(html, "https://x.example.com/p"), Some(449.0));
    }

    #[test]
    fn test_strikethrough_parent_excluded_in_broad_fallback() {
        let html = r#"
            <html><body>
            <s><span class="price">$99.00</span></s>
            <span class="price">$79.00</span>
            </body></html>
        "#;
        assert_eq!(price_of(html, "https://x.example.com/p"), Some(79.0));
    }

    #[test]
    fn test_nonpositive_price_falls_through() {
        let html = r#"
            <html><body>
            <span class="sale-price">$0.00</span>
            <span class="price">$19.99</span>
            </body></html>
        "#;
        assert_eq!(price_of(html, "https://x.example.com/p"), Some(19.99));
    }

    #[test]
    fn test_no_price_found() {
        let html = "<html><body><p>Contact us for pricing</p></body></html>";
        assert_eq!(price_of(html, "https://x.example.com/p"), None);
    }
}
