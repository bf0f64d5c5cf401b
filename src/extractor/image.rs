//! Product image extraction: structured data first, OpenGraph fallback.

use scraper::{Html, Selector};
use serde_json::Value;
use std::sync::LazyLock;
use url::Url;

use super::structured;

static OG_IMAGE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"meta[property="og:image"]"#).unwrap());

pub fn extract_image(doc: &Html, source_url: &str) -> Option<String> {
    structured_image(doc, source_url).or_else(|| og_image(doc, source_url))
}

fn structured_image(doc: &Html, source_url: &str) -> Option<String> {
    for item in structured::ld_items(doc) {
        let mut image = item.get("image");
        if let Some(Value::Array(list)) = image {
            image = list.first();
        }
        if let Some(Value::Object(obj)) = image {
            image = obj.get("url");
        }
        let Some(raw) = image.and_then(Value::as_str) else {
            continue;
        };
        if let Some(cleaned) = clean_image_url(raw, source_url) {
            return Some(cleaned);
        }
    }
    None
}

fn og_image(doc: &Html, source_url: &str) -> Option<String> {
    let content = doc
        .select(&OG_IMAGE)
        .next()
        .and_then(|el| el.value().attr("content"))?;
    clean_image_url(content, source_url)
}

/// Normalizes an image URL: protocol-relative and page-relative references
/// are resolved, plain HTTP is upgraded, and anything without a resolvable
/// host is rejected.
pub fn clean_image_url(img: &str, page_url: &str) -> Option<String> {
    let img = img.trim();
    if img.is_empty() {
        return None;
    }

    let mut img = if let Some(rest) = img.strip_prefix("//") {
        format!("https://{}", rest)
    } else {
        img.to_string()
    };
    if !img.starts_with("http") {
        img = Url::parse(page_url).ok()?.join(&img).ok()?.to_string();
    }
    if let Some(rest) = img.strip_prefix("http://") {
        img = format!("https://{}", rest);
    }

    let parsed = Url::parse(&img).ok()?;
    match parsed.host_str() {
        Some(host) if !host.is_empty() => Some(img),
        _ => None,
    }
}
