//! Command results and their human-readable rendering.
//!
//! Every command returns a [`CommandOutput`]: a markdown summary for
//! people, structured output keyed by an entity path for the host
//! platform, and the untouched raw reply. Entity paths embed the merge key
//! the host uses to deduplicate records (e.g. "same `incident_id`"); the
//! strings are opaque here and only need to be spelled exactly.

use serde::Serialize;
use serde_json::{Map, Value};

/// Entity path for incidents, merged by `incident_id`.
pub const INCIDENT_PATH: &str = "PaloAltoNetworksXDR.Incident(val.incident_id==obj.incident_id)";
/// Entity path for endpoints.
pub const ENDPOINT_PATH: &str = "PaloAltoNetworksXDR.Endpoint(val.endpoint_id == val.endpoint_id)";
/// Entity path for distributions, merged by `id`.
pub const DISTRIBUTION_PATH: &str = "PaloAltoNetworksXDR.Distribution(val.id == obj.id)";
/// Entity path for the per-platform agent version lists.
pub const DISTRIBUTION_VERSIONS_PATH: &str = "PaloAltoNetworksXDR.DistributionVersions";
/// Entity path for management audit logs, merged by `AUDIT_ID`.
pub const AUDIT_MANAGEMENT_LOGS_PATH: &str =
    "PaloAltoNetworksXDR.AuditManagementLogs(val.AUDIT_ID == obj.AUDIT_ID)";
/// Entity path for agent audit reports.
pub const AUDIT_AGENT_REPORTS_PATH: &str = "PaloAltoNetworksXDR.AuditAgentReports";

/// The `(markdown, structured output, raw response)` triple a command
/// produces.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandOutput {
    pub readable: String,
    pub outputs: Option<Map<String, Value>>,
    pub raw: Value,
}

impl CommandOutput {
    /// A result with text only and no structured output.
    pub fn text(readable: impl Into<String>, raw: Value) -> Self {
        CommandOutput {
            readable: readable.into(),
            outputs: None,
            raw,
        }
    }

    /// A result with one entity under `path`.
    pub fn entity(readable: impl Into<String>, path: &str, value: Value, raw: Value) -> Self {
        let mut outputs = Map::new();
        outputs.insert(path.to_string(), value);
        CommandOutput {
            readable: readable.into(),
            outputs: Some(outputs),
            raw,
        }
    }

    /// The structured value stored under `path`, if any.
    pub fn output(&self, path: &str) -> Option<&Value> {
        self.outputs.as_ref().and_then(|outputs| outputs.get(path))
    }
}

/// Renders `rows` (JSON objects) as a markdown table under a `###` title.
///
/// Columns are `headers` when given, otherwise the keys of the first row.
/// Missing cells are left empty; an empty row set renders
/// `**No entries.**`.
pub fn markdown_table(title: &str, rows: &[Value], headers: Option<&[&str]>) -> String {
    let mut out = format!("### {title}\n");
    if rows.is_empty() {
        out.push_str("**No entries.**\n");
        return out;
    }

    let columns: Vec<String> = match headers {
        Some(headers) => headers.iter().map(|h| h.to_string()).collect(),
        None => rows
            .iter()
            .find_map(Value::as_object)
            .map(|first| first.keys().cloned().collect())
            .unwrap_or_default(),
    };
    if columns.is_empty() {
        out.push_str("**No entries.**\n");
        return out;
    }

    out.push('|');
    out.push_str(&columns.join("|"));
    out.push_str("|\n|");
    out.push_str(&vec!["---"; columns.len()].join("|"));
    out.push_str("|\n");

    for row in rows {
        let cells: Vec<String> = columns
            .iter()
            .map(|column| row.get(column).map(cell).unwrap_or_default())
            .collect();
        out.push('|');
        out.push_str(&cells.join("|"));
        out.push_str("|\n");
    }
    out
}

/// Formats one JSON value as a table cell.
fn cell(value: &Value) -> String {
    let text = match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(cell).collect::<Vec<_>>().join(", "),
        Value::Object(_) => value.to_string(),
        other => other.to_string(),
    };
    text.replace('|', "\\|").replace('\n', "<br>")
}
