//! Tabular export of scraped listings
//!
//! Projects each raw record onto a fixed set of columns and writes them as
//! CSV. Rows without a GEL price are left out.

use crate::model::PropertyRecord;
use crate::HarvestError;
use csv::Writer;
use serde::Serialize;
use serde_json::Value;
use std::path::Path;

/// Public listing page for an id
pub const LISTING_URL_PREFIX: &str = "https://home.ss.ge/real-estate/";

const DESCRIPTION_LIMIT: usize = 300;

/// One exported row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListingRow {
    #[serde(rename = "ID")]
    pub id: Option<String>,
    #[serde(rename = "Title")]
    pub title: Option<String>,
    #[serde(rename = "Price_GEL")]
    pub price_gel: f64,
    #[serde(rename = "Price_USD")]
    pub price_usd: Option<f64>,
    #[serde(rename = "PricePerSqm_GEL")]
    pub price_per_sqm_gel: Option<f64>,
    #[serde(rename = "PricePerSqm_USD")]
    pub price_per_sqm_usd: Option<f64>,
    #[serde(rename = "Area_SqM")]
    pub area_sqm: Option<f64>,
    #[serde(rename = "City")]
    pub city: Option<String>,
    #[serde(rename = "District")]
    pub district: Option<String>,
    #[serde(rename = "Subdistrict")]
    pub subdistrict: Option<String>,
    #[serde(rename = "Street")]
    pub street: Option<String>,
    #[serde(rename = "Description")]
    pub description: String,
    #[serde(rename = "MainImage")]
    pub main_image: Option<String>,
    #[serde(rename = "URL")]
    pub url: String,
    #[serde(rename = "Price_Per_SqM_USD")]
    pub computed_price_per_sqm_usd: Option<f64>,
}

impl ListingRow {
    /// Projects a raw record, or `None` when it has no usable GEL price
    pub fn from_record(record: &PropertyRecord) -> Option<Self> {
        let price = record.get("price");
        let address = record.get("address");

        let price_gel = nested_number(price, "priceGeo")?;
        let price_usd = nested_number(price, "priceUsd");
        let area_sqm = record.get("totalArea").and_then(as_number);

        let computed_price_per_sqm_usd = match (price_usd, area_sqm) {
            (Some(usd), Some(area)) if area != 0.0 => Some(round2(usd / area)),
            _ => None,
        };

        let id = record.identity();
        let url = format!(
            "{}{}",
            LISTING_URL_PREFIX,
            id.as_deref().unwrap_or("None")
        );

        let description = record
            .get("description")
            .and_then(Value::as_str)
            .map(|text| text.trim().chars().take(DESCRIPTION_LIMIT).collect())
            .unwrap_or_default();

        Some(Self {
            id,
            title: record.get("title").and_then(as_text),
            price_gel,
            price_usd,
            price_per_sqm_gel: nested_number(price, "unitPriceGeo"),
            price_per_sqm_usd: nested_number(price, "unitPriceUsd"),
            area_sqm,
            city: nested_text(address, "cityTitle"),
            district: nested_text(address, "districtTitle"),
            subdistrict: nested_text(address, "subdistrictTitle"),
            street: nested_text(address, "streetTitle"),
            description,
            main_image: main_image(record),
            url,
            computed_price_per_sqm_usd,
        })
    }
}

/// Writes the rows for `records` to `path`
///
/// # Returns
///
/// * `Ok(usize)` - Number of rows written; nothing is written for an empty input
/// * `Err(HarvestError)` - The file couldn't be created or written
pub fn write_csv(records: &[PropertyRecord], path: &Path) -> Result<usize, HarvestError> {
    if records.is_empty() {
        tracing::warn!("No properties to process");
        return Ok(0);
    }

    tracing::info!("Processing {} properties...", records.len());

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut writer = Writer::from_path(path)?;
    let mut written = 0;
    for row in records.iter().filter_map(ListingRow::from_record) {
        writer.serialize(&row)?;
        written += 1;
    }
    writer.flush()?;

    tracing::info!(
        "Saved {} rows to {} ({} skipped without price)",
        written,
        path.display(),
        records.len() - written
    );
    Ok(written)
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn nested_number(parent: Option<&Value>, field: &str) -> Option<f64> {
    parent?.get(field).and_then(as_number)
}

fn nested_text(parent: Option<&Value>, field: &str) -> Option<String> {
    parent?.get(field).and_then(as_text)
}

fn main_image(record: &PropertyRecord) -> Option<String> {
    record
        .get("appImages")?
        .as_array()?
        .iter()
        .find(|image| image.get("isMain").and_then(Value::as_bool) == Some(true))
        .and_then(|image| image.get("fileName"))
        .and_then(as_text)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
