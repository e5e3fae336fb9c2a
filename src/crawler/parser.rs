//! HTML parsing for listing and detail pages
//!
//! This module handles parsing page content to extract:
//! - Item identifiers from listing pages
//! - Title, brand, model and store from desktop detail pages
//! - The same fields from mobile detail pages (embedded page config JSON)
//!
//! Each field is read from several places in priority order, since the site
//! moves them around between page templates.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use std::collections::HashSet;
use thiserror::Error;

static SHOP_NAME_JSON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""shopName"\s*:\s*"([^"]+)""#).expect("valid shop name regex"));

static PAGE_CONFIG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)window\.pageConfig\s*=\s*(\{.*?\});").expect("valid page config regex")
});

static MOBILE_MODEL_MARKUP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"规格型号</span>\s*<span>([^<]+)</span>").expect("valid mobile model regex")
});

static MOBILE_BRAND_MARKUP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"品牌</span>\s*<span>([^<]+)</span>").expect("valid mobile brand regex")
});

/// A page could not be read at all
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("empty response body")]
    EmptyBody,

    #[error("malformed page config: {0}")]
    MalformedConfig(String),
}

/// Fields read from one detail page variant
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedFields {
    pub title: Option<String>,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub store: Option<String>,
}

/// Extracts item identifiers from a listing page
///
/// Identifiers come from `data-sku` attributes. Only all-digit values are
/// accepted; the first occurrence wins when an item is marked up more than
/// once on the same page.
///
/// # Example
///
/// ```
/// use shelf_scout::crawler::parse_listing;
///
/// let html = r#"<ul><li data-sku="100"></li><li data-sku="200"></li></ul>"#;
/// assert_eq!(parse_listing(html), vec!["100", "200"]);
/// ```
pub fn parse_listing(html: &str) -> Vec<String> {
    let document = Html::parse_fragment(html);
    let Ok(selector) = Selector::parse("[data-sku]") else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    document
        .select(&selector)
        .filter_map(|element| element.value().attr("data-sku"))
        .map(str::trim)
        .filter(|sku| !sku.is_empty() && sku.bytes().all(|b| b.is_ascii_digit()))
        .filter(|sku| seen.insert(sku.to_string()))
        .map(str::to_string)
        .collect()
}

/// Parses a desktop detail page
///
/// # Extraction Order
///
/// - **Brand**: `#parameter-brand` link, then a parameter-list entry labelled 品牌
/// - **Model**: a parameter-list entry labelled 规格型号 or 型号, then the
///   specification table (`.Ptable-item`)
/// - **Store**: embedded `"shopName"` JSON, then the shop header link
///
/// # Returns
///
/// * `Ok(ExtractedFields)` - Whatever fields could be found
/// * `Err(ExtractError)` - The body was empty
pub fn parse_pc_detail(html: &str) -> Result<ExtractedFields, ExtractError> {
    if html.trim().is_empty() {
        return Err(ExtractError::EmptyBody);
    }

    let document = Html::parse_document(html);
    let params = parameter_entries(&document);

    let brand = select_text(&document, "#parameter-brand a")
        .or_else(|| param_value(&params, |label| label == "品牌"));

    let model = param_value(&params, is_model_label).or_else(|| spec_table_model(&document));

    let store = SHOP_NAME_JSON
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| select_text(&document, ".J-hove-wrap .name a, .shopName a, .popbox-inner .mt h3 a"));

    Ok(ExtractedFields {
        title: extract_title(&document),
        brand,
        model,
        store,
    })
}

/// Parses a mobile detail page
///
/// The `window.pageConfig` object is preferred; the parameter markup is
/// the fallback for brand and model.
///
/// # Returns
///
/// * `Ok(ExtractedFields)` - Whatever fields could be found
/// * `Err(ExtractError)` - The body was empty, or the page config was
///   malformed and no markup fallback exists
pub fn parse_mobile_detail(html: &str) -> Result<ExtractedFields, ExtractError> {
    if html.trim().is_empty() {
        return Err(ExtractError::EmptyBody);
    }

    let document = Html::parse_document(html);
    let markup_model = capture_text(&MOBILE_MODEL_MARKUP, html);
    let markup_brand = capture_text(&MOBILE_BRAND_MARKUP, html);

    let mut fields = ExtractedFields {
        title: extract_title(&document),
        ..Default::default()
    };

    if let Some(raw) = PAGE_CONFIG.captures(html).and_then(|c| c.get(1)) {
        match serde_json::from_str::<Value>(raw.as_str()) {
            Ok(config) => {
                fields.brand = json_text(&config, &["product", "extend", "brand"])
                    .or_else(|| json_text(&config, &["product", "brand"]));
                fields.model = json_text(&config, &["product", "extend", "model"])
                    .or_else(|| json_text(&config, &["product", "extend", "skuModel"]));
                fields.store = json_text(&config, &["product", "shopName"]);
            }
            Err(e) if markup_model.is_none() && markup_brand.is_none() => {
                return Err(ExtractError::MalformedConfig(e.to_string()));
            }
            Err(e) => {
                tracing::debug!("Ignoring malformed page config, using markup: {}", e);
            }
        }
    }

    fields.brand = fields.brand.or(markup_brand);
    fields.model = fields.model.or(markup_model);
    Ok(fields)
}

/// Extracts the page title from the HTML document
fn extract_title(document: &Html) -> Option<String> {
    select_text(document, "title")
}

/// Trimmed text of the first element matching `selector`, if non-empty
fn select_text(document: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    document
        .select(&selector)
        .map(element_text)
        .find(|text| !text.is_empty())
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Collects `(label, value)` pairs from the product parameter list
///
/// Handles both `<li title="V">label：V</li>` and the split form where the
/// label item is followed by a separate value item.
fn parameter_entries(document: &Html) -> Vec<(String, String)> {
    let Ok(selector) = Selector::parse("ul.p-parameter-list li, ul.parameter2 li") else {
        return Vec::new();
    };

    let items: Vec<ElementRef<'_>> = document.select(&selector).collect();
    let mut entries = Vec::new();

    for (i, item) in items.iter().enumerate() {
        let text = element_text(*item);
        let Some((label, rest)) = split_label(&text) else {
            continue;
        };

        let value = if rest.is_empty() {
            items.get(i + 1).map(|next| title_or_text(*next))
        } else {
            Some(
                item.value()
                    .attr("title")
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .unwrap_or(rest)
                    .to_string(),
            )
        };

        if let Some(value) = value.filter(|v| !v.is_empty()) {
            entries.push((label.to_string(), value));
        }
    }

    entries
}

/// Splits `label：value` on the first full-width or ASCII colon
fn split_label(text: &str) -> Option<(&str, &str)> {
    let idx = text.find(|c| c == '：' || c == ':')?;
    let colon_len = text[idx..].chars().next().map_or(1, char::len_utf8);
    let label = text[..idx].trim();
    let label = label.strip_prefix("能效网").unwrap_or(label);
    Some((label, text[idx + colon_len..].trim()))
}

fn title_or_text(element: ElementRef<'_>) -> String {
    element
        .value()
        .attr("title")
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| element_text(element))
}

fn param_value(entries: &[(String, String)], matches: impl Fn(&str) -> bool) -> Option<String> {
    entries
        .iter()
        .find(|(label, _)| matches(label))
        .map(|(_, value)| value.clone())
}

fn is_model_label(label: &str) -> bool {
    label == "型号" || label.ends_with("规格型号")
}

/// Reads the model from the specification table (`dt` label, `dd` value)
fn spec_table_model(document: &Html) -> Option<String> {
    let selector = Selector::parse(".Ptable-item dt").ok()?;
    document
        .select(&selector)
        .filter(|dt| is_model_label(&element_text(*dt)))
        .filter_map(|dt| {
            dt.next_siblings()
                .filter_map(ElementRef::wrap)
                .find(|sibling| sibling.value().name() == "dd")
        })
        .map(element_text)
        .find(|value| !value.is_empty())
}

fn capture_text(pattern: &Regex, html: &str) -> Option<String> {
    pattern
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Non-empty string at a nested JSON path
fn json_text(value: &Value, path: &[&str]) -> Option<String> {
    path.iter()
        .try_fold(value, |current, key| current.get(key))?
        .as_str()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
