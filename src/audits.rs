//! Audit trails: management (console) logs and agent reports.
//!
//! | Command | API Path |
//! |---------|----------|
//! | [`get_audit_management_logs_command`] | POST `audits/management_logs/` |
//! | [`get_audit_agent_reports_command`] | POST `audits/agents_reports/` |
//!
//! Both use the shared search body, but with upper-case field names.
//! The CLI takes friendly names (`type`, `timestamp`, ...) and each
//! command maps them onto its own columns.

use serde::Deserialize;
use serde_json::Value;

use crate::args::parse_timestamp;
use crate::client::XdrClient;
use crate::error::{Result, XdrError};
use crate::output::{
    AUDIT_AGENT_REPORTS_PATH, AUDIT_MANAGEMENT_LOGS_PATH, CommandOutput, markdown_table,
};
use crate::request::{SearchRequest, SortOrder, parse_reply};

pub const MANAGEMENT_LOGS_PATH: &str = "audits/management_logs/";
pub const AGENTS_REPORTS_PATH: &str = "audits/agents_reports/";

const DEFAULT_AUDIT_LIMIT: u32 = 50;

/// `(cli name, API column)` of the sortable management log columns.
const MANAGEMENT_SORT_FIELDS: &[(&str, &str)] = &[
    ("type", "AUDIT_ENTITY"),
    ("sub_type", "AUDIT_ENTITY_SUBTYPE"),
    ("result", "AUDIT_RESULT"),
    ("timestamp", "AUDIT_INSERT_TIME"),
];

/// `(cli name, API column)` of the sortable agent report columns.
const AGENT_REPORT_SORT_FIELDS: &[(&str, &str)] = &[
    ("type", "TYPE"),
    ("category", "CATEGORY"),
    ("trapsversion", "TRAPSVERSION"),
    ("timestamp", "TIMESTAMP"),
    ("domain", "DOMAIN"),
];

#[derive(Debug, Deserialize)]
struct AuditReply {
    #[serde(default)]
    data: Vec<Value>,
}

/// Page and sort arguments shared by both audit commands.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct AuditPaging {
    /// Column to sort by.
    #[arg(long)]
    pub sort_by: Option<String>,

    /// Sort direction (asc|desc, default desc). Only valid with
    /// `--sort-by`.
    #[arg(long, requires = "sort_by")]
    pub sort_order: Option<SortOrder>,

    /// Zero-based page number.
    #[arg(long, default_value_t = 0)]
    pub page: u32,

    /// Page size (default 50).
    #[arg(long)]
    pub limit: Option<u32>,
}

impl AuditPaging {
    /// Starts a search with the page window and sort applied; `columns`
    /// maps sortable CLI names to API columns.
    fn search(&self, columns: &[(&str, &'static str)]) -> Result<SearchRequest> {
        let limit = match self.limit {
            Some(0) => return Err(XdrError::validation("limit", "must be at least 1")),
            Some(limit) => limit,
            None => DEFAULT_AUDIT_LIMIT,
        };
        let mut request = SearchRequest::page(self.page, limit);

        if self.sort_by.is_none() && self.sort_order.is_some() {
            return Err(XdrError::validation("sort_order", "requires sort_by"));
        }
        if let Some(sort_by) = self.sort_by.as_deref() {
            let wanted = sort_by.trim().to_ascii_lowercase();
            let column = columns
                .iter()
                .find(|(name, _)| *name == wanted)
                .map(|(_, column)| *column)
                .ok_or_else(|| {
                    let names: Vec<&str> = columns.iter().map(|(name, _)| *name).collect();
                    XdrError::validation(
                        "sort_by",
                        format!("`{sort_by}` is not one of {}", names.join(", ")),
                    )
                })?;
            request = request.sorted_by(column, self.sort_order.unwrap_or(SortOrder::Desc));
        }
        Ok(request)
    }
}

// ── Management logs ────────────────────────────────────────────────────

/// Arguments of `get-audit-management-logs`.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct ManagementLogsArgs {
    /// Acting user e-mails (comma-separated).
    #[arg(long, value_delimiter = ',')]
    pub email: Vec<String>,

    /// Audited entity types.
    #[arg(long = "type", value_delimiter = ',')]
    pub entity_type: Vec<String>,

    /// Audited entity sub-types.
    #[arg(long, value_delimiter = ',')]
    pub sub_type: Vec<String>,

    /// Outcomes (SUCCESS, FAIL, PARTIAL).
    #[arg(long, value_delimiter = ',')]
    pub result: Vec<String>,

    /// Logged at or after this time.
    #[arg(long, value_parser = parse_timestamp)]
    pub timestamp_gte: Option<i64>,

    /// Logged at or before this time.
    #[arg(long, value_parser = parse_timestamp)]
    pub timestamp_lte: Option<i64>,

    #[command(flatten)]
    pub paging: AuditPaging,
}

impl ManagementLogsArgs {
    pub fn build_search(&self) -> Result<SearchRequest> {
        Ok(self
            .paging
            .search(MANAGEMENT_SORT_FIELDS)?
            .filter_in("AUDIT_OWNER_EMAIL", &self.email)
            .filter_in("AUDIT_ENTITY", &self.entity_type)
            .filter_in("AUDIT_ENTITY_SUBTYPE", &self.sub_type)
            .filter_in("AUDIT_RESULT", &self.result)
            .filter_gte("AUDIT_INSERT_TIME", self.timestamp_gte)
            .filter_lte("AUDIT_INSERT_TIME", self.timestamp_lte))
    }
}

/// `get-audit-management-logs`: console audit trail.
pub async fn get_audit_management_logs_command(
    client: &XdrClient,
    args: &ManagementLogsArgs,
) -> Result<CommandOutput> {
    let request = args.build_search()?;
    let raw = client.call(MANAGEMENT_LOGS_PATH, &request).await?;
    let reply: AuditReply = parse_reply(&raw)?;

    let readable = markdown_table("Audit Management Logs", &reply.data, None);
    Ok(CommandOutput::entity(
        readable,
        AUDIT_MANAGEMENT_LOGS_PATH,
        Value::Array(reply.data),
        raw,
    ))
}

// ── Agent reports ──────────────────────────────────────────────────────

/// Arguments of `get-audit-agent-reports`.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct AgentReportsArgs {
    #[arg(long, value_delimiter = ',')]
    pub endpoint_ids: Vec<String>,

    #[arg(long, value_delimiter = ',')]
    pub endpoint_names: Vec<String>,

    #[arg(long, value_delimiter = ',')]
    pub result: Vec<String>,

    /// Report categories.
    #[arg(long = "type", value_delimiter = ',')]
    pub category: Vec<String>,

    /// Report types.
    #[arg(long, value_delimiter = ',')]
    pub sub_type: Vec<String>,

    #[arg(long, value_parser = parse_timestamp)]
    pub timestamp_gte: Option<i64>,

    #[arg(long, value_parser = parse_timestamp)]
    pub timestamp_lte: Option<i64>,

    #[command(flatten)]
    pub paging: AuditPaging,
}

impl AgentReportsArgs {
    pub fn build_search(&self) -> Result<SearchRequest> {
        Ok(self
            .paging
            .search(AGENT_REPORT_SORT_FIELDS)?
            .filter_in("ENDPOINTID", &self.endpoint_ids)
            .filter_in("ENDPOINTNAME", &self.endpoint_names)
            .filter_in("RESULT", &self.result)
            .filter_in("CATEGORY", &self.category)
            .filter_in("TYPE", &self.sub_type)
            .filter_gte("TIMESTAMP", self.timestamp_gte)
            .filter_lte("TIMESTAMP", self.timestamp_lte))
    }
}

/// `get-audit-agent-reports`: reports sent by endpoint agents.
pub async fn get_audit_agent_reports_command(
    client: &XdrClient,
    args: &AgentReportsArgs,
) -> Result<CommandOutput> {
    let request = args.build_search()?;
    let raw = client.call(AGENTS_REPORTS_PATH, &request).await?;
    let reply: AuditReply = parse_reply(&raw)?;

    let readable = markdown_table("Audit Agent Reports", &reply.data, None);
    Ok(CommandOutput::entity(
        readable,
        AUDIT_AGENT_REPORTS_PATH,
        Value::Array(reply.data),
        raw,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn management_log_filters_use_audit_columns() {
        let args = ManagementLogsArgs {
            email: vec!["woo@demisto.com".to_string()],
            timestamp_gte: Some(1_000),
            paging: AuditPaging {
                limit: Some(3),
                sort_by: Some("Timestamp".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(args.build_search().unwrap()).unwrap(),
            json!({
                "filters": [
                    {"field": "AUDIT_OWNER_EMAIL", "operator": "in", "value": ["woo@demisto.com"]},
                    {"field": "AUDIT_INSERT_TIME", "operator": "gte", "value": 1000}
                ],
                "search_from": 0,
                "search_to": 3,
                "sort": {"field": "AUDIT_INSERT_TIME", "keyword": "desc"}
            })
        );
    }

    #[test]
    fn agent_report_type_maps_to_category_column() {
        let args = AgentReportsArgs {
            category: vec!["Audit".to_string()],
            sub_type: vec!["Heartbeat".to_string()],
            paging: AuditPaging {
                sort_by: Some("trapsversion".to_string()),
                sort_order: Some(SortOrder::Asc),
                ..Default::default()
            },
            ..Default::default()
        };
        let request = args.build_search().unwrap();
        let fields: Vec<&str> = request.filters.iter().map(|f| f.field.as_str()).collect();
        assert_eq!(fields, ["CATEGORY", "TYPE"]);
        assert_eq!(request.search_to, 50);
        assert_eq!(
            serde_json::to_value(request.sort).unwrap(),
            json!({"field": "TRAPSVERSION", "keyword": "asc"})
        );
    }

    #[test]
    fn sort_columns_are_per_command() {
        let args = ManagementLogsArgs {
            paging: AuditPaging {
                sort_by: Some("domain".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            args.build_search(),
            Err(XdrError::Validation { .. })
        ));
    }

    #[test]
    fn sort_order_without_sort_by_is_rejected() {
        let args = AgentReportsArgs {
            paging: AuditPaging {
                sort_order: Some(SortOrder::Asc),
                ..Default::default()
            },
            ..Default::default()
        };
        let err = args.build_search().unwrap_err();
        assert!(matches!(err, XdrError::Validation { ref argument, .. } if argument == "sort_order"));
    }
}
