//! Field extraction from rendered pages
//!
//! `FieldExtractor` turns a rendered page into a `ProductRecord`. The scheduler
//! only knows the trait, so site-specific rules can be plugged in without
//! touching discovery, scheduling or reconciliation.
//!
//! `MicrodataExtractor` reads the generic schema.org vocabulary:
//! - `itemprop` microdata (name, sku, gtin, price, availability, brand)
//! - `application/ld+json` Product blocks, filling whatever microdata left empty
//! - Open Graph title and the first `<h1>` as name fallbacks
//! - Breadcrumb trails for category and subcategory

use crate::catalog::ProductRecord;
use crate::crawler::renderer::RenderedPage;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use thiserror::Error;

/// Errors raised by a field extractor
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The page has not rendered its product content; counted as skipped
    #[error("Page content not ready: {0}")]
    NotReady(String),

    #[error("Extraction failed: {0}")]
    Failed(String),
}

/// Pluggable product field extraction
pub trait FieldExtractor: Send + Sync {
    /// Extracts a product from a page
    ///
    /// # Returns
    ///
    /// * `Ok(Some(record))` - The page describes a product
    /// * `Ok(None)` - Not a product page
    /// * `Err(ExtractionError)` - The page could not be read
    fn extract(&self, page: &RenderedPage) -> Result<Option<ProductRecord>, ExtractionError>;
}

/// Extractor for schema.org microdata and JSON-LD
pub struct MicrodataExtractor {
    default_currency: String,
}

impl MicrodataExtractor {
    /// Creates an extractor
    ///
    /// # Arguments
    ///
    /// * `default_currency` - Recorded for priced products that state no currency
    pub fn new(default_currency: impl Into<String>) -> Self {
        Self {
            default_currency: default_currency.into(),
        }
    }
}

impl FieldExtractor for MicrodataExtractor {
    fn extract(&self, page: &RenderedPage) -> Result<Option<ProductRecord>, ExtractionError> {
        if page.html.trim().is_empty() {
            return Err(ExtractionError::NotReady(format!(
                "empty document at {}",
                page.url
            )));
        }

        let document = Html::parse_document(&page.html);
        let mut record = ProductRecord::new(page.url.clone());

        extract_microdata(&document, &mut record);
        if let Some(product) = find_json_ld_product(&document) {
            fill_from_json_ld(&product, &mut record);
        }

        if record.name.is_none() {
            record.name = meta_content(&document, r#"meta[property="og:title"]"#)
                .or_else(|| first_text(&document, "h1"));
        }

        let crumbs = breadcrumbs(&document);
        if record.category.is_none() {
            record.category = crumbs.get(1).cloned();
        }
        if record.subcategory.is_none() {
            record.subcategory = crumbs.get(2).cloned();
        }

        let has_product_data = record.sku.is_some()
            || record.ean.is_some()
            || record.vvs.is_some()
            || record.price_text.is_some();
        if !has_product_data {
            return Ok(None);
        }

        let mut record = record.with_normalized_price();
        if record.price_numeric.is_some() && record.currency.is_none() {
            record.currency = Some(self.default_currency.clone());
        }

        Ok(Some(record))
    }
}

fn extract_microdata(document: &Html, record: &mut ProductRecord) {
    let scope = Selector::parse(r#"[itemtype*="schema.org/Product"]"#)
        .ok()
        .and_then(|s| document.select(&s).next());

    let lookup = |prop: &str| -> Option<String> {
        let css = format!(r#"[itemprop="{}"]"#, prop);
        let selector = Selector::parse(&css).ok()?;
        let element = match scope {
            Some(root) => root.select(&selector).next(),
            None => document.select(&selector).next(),
        }?;
        itemprop_value(element)
    };

    record.name = lookup("name");
    record.sku = lookup("sku");
    record.ean = lookup("gtin13")
        .or_else(|| lookup("gtin"))
        .or_else(|| lookup("gtin8"));
    record.vvs = lookup("vvs").or_else(|| attr_value(document, "[data-vvs]", "data-vvs"));
    record.price_text =
        lookup("price").or_else(|| meta_content(document, r#"meta[property="product:price:amount"]"#));
    record.currency = lookup("priceCurrency")
        .or_else(|| meta_content(document, r#"meta[property="product:price:currency"]"#));
    record.in_stock = lookup("availability").and_then(|a| parse_availability(&a));
    record.brand = lookup("brand");
}

/// Reads a microdata value the way schema.org defines it per element type
fn itemprop_value(element: ElementRef<'_>) -> Option<String> {
    let el = element.value();
    let raw = el
        .attr("content")
        .or_else(|| match el.name() {
            "a" | "link" => el.attr("href"),
            "meta" => el.attr("content"),
            _ => None,
        })
        .map(str::to_string)
        .unwrap_or_else(|| element.text().collect::<String>());

    non_empty(&raw)
}

fn find_json_ld_product(document: &Html) -> Option<Value> {
    let selector = Selector::parse(r#"script[type="application/ld+json"]"#).ok()?;
    document
        .select(&selector)
        .filter_map(|script| serde_json::from_str::<Value>(&script.inner_html()).ok())
        .find_map(|value| product_node(&value).cloned())
}

/// Finds a Product node in a JSON-LD value, an array of values, or an `@graph`
fn product_node(value: &Value) -> Option<&Value> {
    match value {
        Value::Array(items) => items.iter().find_map(product_node),
        Value::Object(map) => {
            let is_product = match map.get("@type") {
                Some(Value::String(t)) => t == "Product",
                Some(Value::Array(types)) => types.iter().any(|t| t == "Product"),
                _ => false,
            };
            if is_product {
                Some(value)
            } else {
                map.get("@graph").and_then(product_node)
            }
        }
        _ => None,
    }
}

fn fill_from_json_ld(product: &Value, record: &mut ProductRecord) {
    fill(&mut record.name, json_text(product.get("name")));
    fill(&mut record.sku, json_text(product.get("sku")));
    fill(
        &mut record.ean,
        json_text(product.get("gtin13"))
            .or_else(|| json_text(product.get("gtin")))
            .or_else(|| json_text(product.get("gtin8"))),
    );

    let brand = product
        .get("brand")
        .and_then(|b| json_text(b.get("name")).or_else(|| json_text(Some(b))));
    fill(&mut record.brand, brand);

    let offer = match product.get("offers") {
        Some(Value::Array(offers)) => offers.first(),
        other => other,
    };
    if let Some(offer) = offer {
        fill(&mut record.price_text, json_text(offer.get("price")));
        fill(&mut record.currency, json_text(offer.get("priceCurrency")));
        if record.in_stock.is_none() {
            record.in_stock = json_text(offer.get("availability"))
                .as_deref()
                .and_then(parse_availability);
        }
    }
}

fn json_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => non_empty(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn fill(slot: &mut Option<String>, value: Option<String>) {
    if slot.is_none() {
        *slot = value;
    }
}

/// Maps schema.org availability values to a stock flag
fn parse_availability(value: &str) -> Option<bool> {
    let lowered = value.to_lowercase();
    if lowered.contains("instock") || lowered.contains("limitedavailability") {
        Some(true)
    } else if lowered.contains("outofstock")
        || lowered.contains("soldout")
        || lowered.contains("discontinued")
    {
        Some(false)
    } else {
        None
    }
}

/// Breadcrumb labels, home first
fn breadcrumbs(document: &Html) -> Vec<String> {
    let candidates = [
        r#"[itemtype*="BreadcrumbList"] [itemprop="name"]"#,
        r#"[class*="breadcrumb"] a"#,
    ];

    for css in candidates {
        let Ok(selector) = Selector::parse(css) else {
            continue;
        };
        let crumbs: Vec<String> = document
            .select(&selector)
            .filter_map(|el| non_empty(&el.text().collect::<String>()))
            .collect();
        if !crumbs.is_empty() {
            return crumbs;
        }
    }

    Vec::new()
}

fn meta_content(document: &Html, css: &str) -> Option<String> {
    attr_value(document, css, "content")
}

fn attr_value(document: &Html, css: &str, attr: &str) -> Option<String> {
    let selector = Selector::parse(css).ok()?;
    document
        .select(&selector)
        .find_map(|el| el.value().attr(attr).and_then(non_empty))
}

fn first_text(document: &Html, css: &str) -> Option<String> {
    let selector = Selector::parse(css).ok()?;
    document
        .select(&selector)
        .find_map(|el| non_empty(&el.text().collect::<String>()))
}

/// Collapses whitespace runs and drops empty strings
fn non_empty(raw: &str) -> Option<String> {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(html: &str) -> RenderedPage {
        RenderedPage {
            url: "https://shop.example.com/vaerktoej/drill?id=1234-567890".to_string(),
            status: 200,
            html: html.to_string(),
        }
    }

    fn extractor() -> MicrodataExtractor {
        MicrodataExtractor::new("DKK")
    }

    #[test]
    fn test_microdata_product() {
        let html = r#"
<html><body>
  <nav class="breadcrumbs">
    <a href="/">Forside</a> <a href="/vaerktoej/">Vaerktoej</a> <a href="/vaerktoej/el/">El-vaerktoej</a>
  </nav>
  <div itemscope itemtype="https://schema.org/Product">
    <h1 itemprop="name">Cordless drill   18V</h1>
    <span itemprop="sku">1234-567890</span>
    <meta itemprop="gtin13" content="5701234567890">
    <span itemprop="brand">Bosch</span>
    <div itemprop="offers" itemscope itemtype="https://schema.org/Offer">
      <span itemprop="price" content="1299.95">1.299,95 kr.</span>
      <meta itemprop="priceCurrency" content="DKK">
      <link itemprop="availability" href="https://schema.org/InStock">
    </div>
  </div>
</body></html>"#;

        let record = extractor().extract(&page(html)).unwrap().unwrap();
        assert_eq!(record.name.as_deref(), Some("Cordless drill 18V"));
        assert_eq!(record.sku.as_deref(), Some("1234-567890"));
        assert_eq!(record.ean.as_deref(), Some("5701234567890"));
        assert_eq!(record.brand.as_deref(), Some("Bosch"));
        assert_eq!(record.price_numeric, Some(1299.95));
        assert_eq!(record.currency.as_deref(), Some("DKK"));
        assert_eq!(record.in_stock, Some(true));
        assert_eq!(record.category.as_deref(), Some("Vaerktoej"));
        assert_eq!(record.subcategory.as_deref(), Some("El-vaerktoej"));
    }

    #[test]
    fn test_json_ld_product() {
        let html = r#"
<html><head>
<script type="application/ld+json">
{"@context":"https://schema.org","@graph":[
  {"@type":"WebSite","name":"Shop"},
  {"@type":"Product","name":"Spirit level 60 cm","sku":"LV-60","gtin13":"5709876543210",
   "brand":{"@type":"Brand","name":"Stabila"},
   "offers":[{"@type":"Offer","price":249,"priceCurrency":"EUR",
              "availability":"https://schema.org/OutOfStock"}]}
]}
</script>
</head><body><h1>Ignored heading</h1></body></html>"#;

        let record = extractor().extract(&page(html)).unwrap().unwrap();
        assert_eq!(record.name.as_deref(), Some("Spirit level 60 cm"));
        assert_eq!(record.sku.as_deref(), Some("LV-60"));
        assert_eq!(record.ean.as_deref(), Some("5709876543210"));
        assert_eq!(record.brand.as_deref(), Some("Stabila"));
        assert_eq!(record.price_numeric, Some(249.0));
        assert_eq!(record.currency.as_deref(), Some("EUR"));
        assert_eq!(record.in_stock, Some(false));
    }

    #[test]
    fn test_h1_fallback_and_default_currency() {
        let html = r#"<html><body>
<h1>  Wood screws 4x40  </h1>
<span data-vvs="398012345"></span>
<meta property="product:price:amount" content="89,95">
</body></html>"#;

        let record = extractor().extract(&page(html)).unwrap().unwrap();
        assert_eq!(record.name.as_deref(), Some("Wood screws 4x40"));
        assert_eq!(record.vvs.as_deref(), Some("398012345"));
        assert_eq!(record.price_numeric, Some(89.95));
        assert_eq!(record.currency.as_deref(), Some("DKK"));
    }

    #[test]
    fn test_non_product_page_is_none() {
        let html = "<html><body><h1>Customer service</h1><p>Call us</p></body></html>";
        assert!(extractor().extract(&page(html)).unwrap().is_none());
    }

    #[test]
    fn test_empty_document_not_ready() {
        let result = extractor().extract(&page("   "));
        assert!(matches!(result, Err(ExtractionError::NotReady(_))));
    }

    #[test]
    fn test_malformed_json_ld_ignored() {
        let html = r#"<html><head><script type="application/ld+json">{not json</script></head>
<body><span itemprop="sku">A-1</span></body></html>"#;
        let record = extractor().extract(&page(html)).unwrap().unwrap();
        assert_eq!(record.sku.as_deref(), Some("A-1"));
        assert!(record.price_numeric.is_none());
        assert!(record.currency.is_none());
    }

    #[test]
    fn test_parse_availability() {
        assert_eq!(parse_availability("https://schema.org/InStock"), Some(true));
        assert_eq!(parse_availability("http://schema.org/OutOfStock"), Some(false));
        assert_eq!(parse_availability("PreOrder"), None);
    }
}
