//! Core data types shared by the fetcher, the orchestrator and the store
//!
//! - `SearchFilters`: the fixed query shape sent with every page request
//! - `PropertyRecord`: one opaque listing document from upstream
//! - `PageResult`: the tri-state outcome of fetching one page

use crate::config::FilterConfig;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field holding the list of listings in a search response
pub const ITEMS_FIELD: &str = "realStateItemModel";

/// Field carrying a record's unique identity
pub const IDENTITY_FIELD: &str = "applicationId";

/// Fixed search filters for the listing endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchFilters {
    pub real_estate_type: u32,
    pub real_estate_deal_type: u32,
    pub city_id_list: Vec<u32>,
    pub sub_district_ids: Vec<u32>,
    pub currency_id: u32,
    pub page_size: u32,
}

impl From<&FilterConfig> for SearchFilters {
    fn from(config: &FilterConfig) -> Self {
        Self {
            real_estate_type: config.real_estate_type,
            real_estate_deal_type: config.deal_type,
            city_id_list: vec![config.city_id],
            sub_district_ids: config.sub_district_ids.clone(),
            currency_id: config.currency_id,
            page_size: config.page_size,
        }
    }
}

/// One page of the search, as sent over the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest<'a> {
    #[serde(flatten)]
    pub filters: &'a SearchFilters,
    pub page: u32,
}

impl<'a> PageRequest<'a> {
    pub fn new(filters: &'a SearchFilters, page: u32) -> Self {
        Self { filters, page }
    }
}

/// A raw listing record
///
/// The orchestration core only ever looks at the identity; every other field
/// passes through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyRecord(Map<String, Value>);

impl PropertyRecord {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Returns the record identity, accepting both string and numeric ids
    pub fn identity(&self) -> Option<String> {
        match self.0.get(IDENTITY_FIELD)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl TryFrom<Value> for PropertyRecord {
    type Error = Value;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(fields) => Ok(Self(fields)),
            other => Err(other),
        }
    }
}

/// Records of one successfully fetched page, plus what the page says about paging
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingPage {
    pub records: Vec<PropertyRecord>,

    /// The response signalled that no further pages exist
    pub is_last: bool,

    /// Total page count reported by the response, if any
    pub total_pages: Option<u32>,
}

impl ListingPage {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Outcome of one fetch cycle, after internal retries
#[derive(Debug, Clone, PartialEq)]
pub enum PageResult {
    /// The page was fetched (possibly with zero records)
    Items(ListingPage),

    /// The token is missing or was rejected; the caller must re-authenticate
    AuthExpired,

    /// Every attempt failed
    Failure,
}
