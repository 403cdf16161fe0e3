//! Wire envelopes and search filters shared by every XDR endpoint.
//!
//! Requests are wrapped as `{"request_data": {...}}` and replies come back
//! as `{"reply": ...}`. The list endpoints (incidents, endpoints, audit
//! logs) share one search shape:
//!
//! ```json
//! {
//!   "filters": [{"field": "modification_time", "operator": "gte", "value": 1577836800000}],
//!   "search_from": 0,
//!   "search_to": 100,
//!   "sort": {"field": "modification_time", "keyword": "asc"}
//! }
//! ```
//!
//! [`SearchRequest`] builds that body; filters with no value are skipped
//! so callers can pass optional arguments straight through.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::error::{Result, XdrError};

/// Outbound envelope: every XDR request body is `{"request_data": ...}`.
#[derive(Debug, Serialize)]
pub struct RequestData<T> {
    pub request_data: T,
}

/// Inbound envelope: every XDR reply body is `{"reply": ...}`.
#[derive(Debug, Deserialize)]
pub struct Reply<T> {
    pub reply: T,
}

/// Unwraps the `reply` field of a raw response into `T`.
pub fn parse_reply<T: DeserializeOwned>(raw: &Value) -> Result<T> {
    let reply: Reply<T> = serde_json::from_value(raw.clone())?;
    Ok(reply.reply)
}

/// Comparison operator of a search filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    In,
    Gte,
    Lte,
}

/// One `{field, operator, value}` search filter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Filter {
    pub field: String,
    pub operator: Operator,
    pub value: Value,
}

/// Sort direction, spelled `asc` / `desc` on the wire and on the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortOrder::Asc => f.write_str("asc"),
            SortOrder::Desc => f.write_str("desc"),
        }
    }
}

impl FromStr for SortOrder {
    type Err = XdrError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(XdrError::validation(
                "sort order",
                format!("expected `asc` or `desc`, got `{other}`"),
            )),
        }
    }
}

/// Sort clause: `{"field": ..., "keyword": "asc"|"desc"}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sort {
    pub field: String,
    pub keyword: SortOrder,
}

/// Body of the paged search endpoints.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchRequest {
    pub filters: Vec<Filter>,
    pub search_from: u32,
    pub search_to: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<Sort>,
}

impl SearchRequest {
    /// Starts a search for page `page` (zero-based) of `limit` results.
    pub fn page(page: u32, limit: u32) -> Self {
        let search_from = page.saturating_mul(limit);
        SearchRequest {
            filters: Vec::new(),
            search_from,
            search_to: search_from.saturating_add(limit),
            sort: None,
        }
    }

    /// Adds `field in values`, unless `values` is empty.
    pub fn filter_in(mut self, field: &str, values: &[String]) -> Self {
        if !values.is_empty() {
            self.filters.push(Filter {
                field: field.to_string(),
                operator: Operator::In,
                value: Value::from(values.to_vec()),
            });
        }
        self
    }

    /// Adds `field gte value` when a value is given.
    pub fn filter_gte(self, field: &str, value: Option<i64>) -> Self {
        self.filter_range(field, Operator::Gte, value)
    }

    /// Adds `field lte value` when a value is given.
    pub fn filter_lte(self, field: &str, value: Option<i64>) -> Self {
        self.filter_range(field, Operator::Lte, value)
    }

    fn filter_range(mut self, field: &str, operator: Operator, value: Option<i64>) -> Self {
        if let Some(value) = value {
            self.filters.push(Filter {
                field: field.to_string(),
                operator,
                value: Value::from(value),
            });
        }
        self
    }

    /// Sets the sort clause.
    pub fn sorted_by(mut self, field: &str, order: SortOrder) -> Self {
        self.sort = Some(Sort {
            field: field.to_string(),
            keyword: order,
        });
        self
    }
}

/// One "sort by X" argument: its name, the field it sorts on, and the
/// requested order, if any.
pub(crate) type SortArg<'a> = (&'a str, &'static str, Option<SortOrder>);

/// Resolves two mutually exclusive sort arguments into at most one sort
/// clause.
pub(crate) fn exclusive_sort(
    first: SortArg<'_>,
    second: SortArg<'_>,
) -> Result<Option<(&'static str, SortOrder)>> {
    match (first.2, second.2) {
        (Some(_), Some(_)) => Err(XdrError::validation(
            second.0,
            format!("provide either {} or {}, not both", first.0, second.0),
        )),
        (Some(order), None) => Ok(Some((first.1, order))),
        (None, Some(order)) => Ok(Some((second.1, order))),
        (None, None) => Ok(None),
    }
}
