//! The extraction engine: turns fetched markup into a normalized
//! `(price, image, in_stock)` triple.

pub mod image;
pub mod price;
pub mod stock;
pub mod structured;

use scraper::Html;

#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    /// `None` means extraction failed, which is distinct from the item
    /// being out of stock.
    pub price: Option<f64>,
    pub image: Option<String>,
    pub in_stock: bool,
}

pub fn extract(html: &str, source_url: &str) -> Extraction {
    let doc = Html::parse_document(html);
    let price = price::extract_price(&doc, source_url);
    let image = image::extract_image(&doc, source_url);
    let in_stock = stock::extract_stock_status(&doc, source_url);
    Extraction {
        price,
        image,
        in_stock,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_full_triple() {
        let html = r#"
            <html><head>
            <script type="application/ld+json">
            {"@type":"Product","offers":{"price":"399.00","availability":"https://schema.org/InStock"},
             "image":"//cdn.example.com/widget.jpg"}
            </script>
            </head><body></body></html>
        "#;
        let extraction = extract(html, "https://shop.example.com/products/widget");
        assert_eq!(extraction.price, Some(399.0));
        assert_eq!(
            extraction.image,
            Some("https://cdn.example.com/widget.jpg".to_string())
        );
        assert!(extraction.in_stock);
    }

    #[test]
    fn test_extract_empty_document() {
        let extraction = extract("<html><body></body></html>", "https://shop.example.com/p");
        assert_eq!(extraction.price, None);
        assert_eq!(extraction.image, None);
        assert!(extraction.in_stock);
    }
}
