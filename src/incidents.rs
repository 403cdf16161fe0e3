//! Incident endpoints of the XDR public API.
//!
//! | Command | API Path |
//! |---------|----------|
//! | [`get_incidents_command`] | POST `incidents/get_incidents/` |
//! | [`get_incident_extra_data_command`] | POST `incidents/get_incident_extra_data/` |
//! | [`update_incident_command`] | POST `incidents/update_incident/` |
//!
//! [`search_incidents`] is the raw listing call shared with the incident
//! poller in [`crate::fetch`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::args::{one_of, parse_timestamp, required};
use crate::client::XdrClient;
use crate::error::{Result, XdrError};
use crate::output::{CommandOutput, INCIDENT_PATH, markdown_table};
use crate::request::{SearchRequest, SortOrder, exclusive_sort, parse_reply};

pub const GET_INCIDENTS_PATH: &str = "incidents/get_incidents/";
pub const GET_INCIDENT_EXTRA_DATA_PATH: &str = "incidents/get_incident_extra_data/";
pub const UPDATE_INCIDENT_PATH: &str = "incidents/update_incident/";

/// The API returns at most this many incidents per call.
pub const MAX_INCIDENTS_LIMIT: u32 = 100;
const DEFAULT_ALERTS_LIMIT: u32 = 1000;

const INCIDENT_HEADERS: &[&str] = &[
    "incident_id",
    "description",
    "status",
    "severity",
    "assigned_user_mail",
    "alert_count",
    "creation_time",
    "modification_time",
    "hosts",
];

const ALERT_HEADERS: &[&str] = &[
    "alert_id",
    "detection_timestamp",
    "severity",
    "name",
    "category",
    "action_pretty",
    "description",
    "host_name",
    "host_ip",
    "user_name",
];

const INCIDENT_STATUSES: &[&str] = &[
    "new",
    "under_investigation",
    "resolved_threat_handled",
    "resolved_known_issue",
    "resolved_duplicate",
    "resolved_false_positive",
    "resolved_other",
];

const INCIDENT_SEVERITIES: &[&str] = &["low", "medium", "high"];

// ── Listing ────────────────────────────────────────────────────────────

/// `reply` of the incident listing endpoint.
#[derive(Debug, Deserialize)]
pub struct IncidentList {
    #[serde(default)]
    pub total_count: Option<u64>,
    #[serde(default)]
    pub result_count: Option<u64>,
    /// Incidents as returned by the API; kept as raw JSON since the
    /// payload is opaque beyond a few well-known fields.
    #[serde(default)]
    pub incidents: Vec<Value>,
}

/// Runs one incident search and returns the parsed page with the raw reply.
pub async fn search_incidents(
    client: &XdrClient,
    request: &SearchRequest,
) -> Result<(IncidentList, Value)> {
    let raw = client.call(GET_INCIDENTS_PATH, request).await?;
    let list: IncidentList = parse_reply(&raw)?;
    debug!(
        returned = list.incidents.len(),
        total = ?list.total_count,
        "incident search completed"
    );
    Ok((list, raw))
}

/// Arguments of `get-incidents`.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct GetIncidentsArgs {
    /// Incident IDs to fetch (comma-separated).
    #[arg(long, value_delimiter = ',')]
    pub incident_id_list: Vec<String>,

    /// Only incidents created at or before this time.
    #[arg(long, value_parser = parse_timestamp)]
    pub lte_creation_time: Option<i64>,

    /// Only incidents created at or after this time.
    #[arg(long, value_parser = parse_timestamp)]
    pub gte_creation_time: Option<i64>,

    /// Only incidents modified at or before this time.
    #[arg(long, value_parser = parse_timestamp)]
    pub lte_modification_time: Option<i64>,

    /// Only incidents modified at or after this time.
    #[arg(long, value_parser = parse_timestamp)]
    pub gte_modification_time: Option<i64>,

    /// Sort by modification time (asc|desc).
    #[arg(long)]
    pub sort_by_modification_time: Option<SortOrder>,

    /// Sort by creation time (asc|desc).
    #[arg(long)]
    pub sort_by_creation_time: Option<SortOrder>,

    /// Zero-based page number.
    #[arg(long, default_value_t = 0)]
    pub page: u32,

    /// Page size (1-100, default 100).
    #[arg(long)]
    pub limit: Option<u32>,
}

impl GetIncidentsArgs {
    /// Validates the arguments and builds the search body.
    pub fn build_search(&self) -> Result<SearchRequest> {
        let sort = exclusive_sort(
            (
                "sort_by_modification_time",
                "modification_time",
                self.sort_by_modification_time,
            ),
            (
                "sort_by_creation_time",
                "creation_time",
                self.sort_by_creation_time,
            ),
        )?;

        let limit = match self.limit {
            Some(0) => return Err(XdrError::validation("limit", "must be at least 1")),
            Some(limit) => limit.min(MAX_INCIDENTS_LIMIT),
            None => MAX_INCIDENTS_LIMIT,
        };

        let mut request = SearchRequest::page(self.page, limit)
            .filter_in("incident_id_list", &self.incident_id_list)
            .filter_lte("creation_time", self.lte_creation_time)
            .filter_gte("creation_time", self.gte_creation_time)
            .filter_lte("modification_time", self.lte_modification_time)
            .filter_gte("modification_time", self.gte_modification_time);
        if let Some((field, order)) = sort {
            request = request.sorted_by(field, order);
        }
        Ok(request)
    }
}

/// `get-incidents`: lists incidents matching the filters.
pub async fn get_incidents_command(
    client: &XdrClient,
    args: &GetIncidentsArgs,
) -> Result<CommandOutput> {
    let request = args.build_search()?;
    let (list, raw) = search_incidents(client, &request).await?;

    let readable = markdown_table("Incidents", &list.incidents, Some(INCIDENT_HEADERS));
    Ok(CommandOutput::entity(
        readable,
        INCIDENT_PATH,
        Value::Array(list.incidents),
        raw,
    ))
}

// ── Extra data ─────────────────────────────────────────────────────────

/// Arguments of `get-incident-extra-data`.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct IncidentExtraDataArgs {
    /// The incident to fetch.
    #[arg(long)]
    pub incident_id: String,

    /// Maximum number of related alerts to return (default 1000).
    #[arg(long)]
    pub alerts_limit: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ExtraDataRequest<'a> {
    incident_id: &'a str,
    alerts_limit: u32,
}

/// `{total_count, data}` sections of the extra-data reply.
#[derive(Debug, Default, Deserialize)]
struct Section {
    #[serde(default)]
    data: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct ExtraDataReply {
    incident: Map<String, Value>,
    #[serde(default)]
    alerts: Section,
    #[serde(default)]
    network_artifacts: Section,
    #[serde(default)]
    file_artifacts: Section,
}

/// `get-incident-extra-data`: one incident with its alerts and artifacts
/// folded in as `alerts`, `network_artifacts` and `file_artifacts`.
pub async fn get_incident_extra_data_command(
    client: &XdrClient,
    args: &IncidentExtraDataArgs,
) -> Result<CommandOutput> {
    let incident_id = required("incident_id", &args.incident_id)?;
    let request = ExtraDataRequest {
        incident_id,
        alerts_limit: args.alerts_limit.unwrap_or(DEFAULT_ALERTS_LIMIT),
    };
    let raw = client.call(GET_INCIDENT_EXTRA_DATA_PATH, &request).await?;
    let reply: ExtraDataReply = parse_reply(&raw)?;

    let mut readable = markdown_table(
        &format!("Incident {incident_id}"),
        &[Value::Object(reply.incident.clone())],
        None,
    );
    readable.push('\n');
    readable.push_str(&markdown_table("Alerts", &reply.alerts.data, Some(ALERT_HEADERS)));
    readable.push('\n');
    readable.push_str(&markdown_table("Network Artifacts", &reply.network_artifacts.data, None));
    readable.push('\n');
    readable.push_str(&markdown_table("File Artifacts", &reply.file_artifacts.data, None));

    let mut incident = reply.incident;
    incident.insert("alerts".to_string(), Value::Array(reply.alerts.data));
    incident.insert(
        "network_artifacts".to_string(),
        Value::Array(reply.network_artifacts.data),
    );
    incident.insert(
        "file_artifacts".to_string(),
        Value::Array(reply.file_artifacts.data),
    );

    Ok(CommandOutput::entity(
        readable,
        INCIDENT_PATH,
        Value::Object(incident),
        raw,
    ))
}

// ── Update ─────────────────────────────────────────────────────────────

/// Arguments of `update-incident`.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct UpdateIncidentArgs {
    /// The incident to update.
    #[arg(long)]
    pub incident_id: String,

    /// Email of the user to assign the incident to.
    #[arg(long)]
    pub assigned_user_mail: Option<String>,

    /// Display name of the assigned user.
    #[arg(long)]
    pub assigned_user_pretty_name: Option<String>,

    /// New status (new, under_investigation, resolved_threat_handled,
    /// resolved_known_issue, resolved_duplicate, resolved_false_positive,
    /// resolved_other).
    #[arg(long)]
    pub status: Option<String>,

    /// New severity (low, medium, high).
    #[arg(long)]
    pub severity: Option<String>,

    /// Comment explaining why the incident was resolved.
    #[arg(long)]
    pub resolve_comment: Option<String>,

    /// Remove the current assignee.
    #[arg(long)]
    pub unassign_user: bool,
}

/// Body of the update endpoint.
#[derive(Debug, Serialize, PartialEq)]
pub struct UpdateIncidentRequest {
    pub incident_id: String,
    pub update_data: UpdateData,
}

/// Fields to change; absent fields are left untouched server-side.
#[derive(Debug, Default, Serialize, PartialEq)]
pub struct UpdateData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_user_mail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_user_pretty_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolve_comment: Option<String>,
}

impl UpdateIncidentArgs {
    /// Validates the arguments and builds the update body.
    pub fn build_request(&self) -> Result<UpdateIncidentRequest> {
        let incident_id = required("incident_id", &self.incident_id)?;

        let assigns = self.assigned_user_mail.is_some() || self.assigned_user_pretty_name.is_some();
        if self.unassign_user && assigns {
            return Err(XdrError::validation(
                "unassign_user",
                "cannot be combined with assigned_user_mail or assigned_user_pretty_name",
            ));
        }

        let mut update_data = UpdateData {
            assigned_user_mail: self.assigned_user_mail.clone(),
            assigned_user_pretty_name: self.assigned_user_pretty_name.clone(),
            status: one_of("status", self.status.as_deref(), INCIDENT_STATUSES)?,
            severity: one_of("severity", self.severity.as_deref(), INCIDENT_SEVERITIES)?,
            resolve_comment: self.resolve_comment.clone(),
        };
        if self.unassign_user {
            update_data.assigned_user_mail = Some("none".to_string());
        }

        Ok(UpdateIncidentRequest {
            incident_id: incident_id.to_string(),
            update_data,
        })
    }
}

/// `update-incident`: changes assignee, status, severity or resolve comment.
pub async fn update_incident_command(
    client: &XdrClient,
    args: &UpdateIncidentArgs,
) -> Result<CommandOutput> {
    let request = args.build_request()?;
    let raw = client.call(UPDATE_INCIDENT_PATH, &request).await?;
    Ok(CommandOutput::text(
        format!("Incident {} has been updated", request.incident_id),
        raw,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_search_caps_page_at_api_limit() {
        let request = GetIncidentsArgs {
            limit: Some(500),
            ..Default::default()
        }
        .build_search()
        .unwrap();
        assert_eq!(request.search_from, 0);
        assert_eq!(request.search_to, MAX_INCIDENTS_LIMIT);
        assert!(request.filters.is_empty());
        assert!(request.sort.is_none());
    }

    #[test]
    fn search_carries_time_filters_and_sort() {
        let request = GetIncidentsArgs {
            incident_id_list: vec!["1".to_string(), "2".to_string()],
            gte_modification_time: Some(1_000),
            lte_creation_time: Some(2_000),
            sort_by_creation_time: Some(SortOrder::Desc),
            page: 1,
            limit: Some(10),
            ..Default::default()
        }
        .build_search()
        .unwrap();

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "filters": [
                    {"field": "incident_id_list", "operator": "in", "value": ["1", "2"]},
                    {"field": "creation_time", "operator": "lte", "value": 2000},
                    {"field": "modification_time", "operator": "gte", "value": 1000}
                ],
                "search_from": 10,
                "search_to": 20,
                "sort": {"field": "creation_time", "keyword": "desc"}
            })
        );
    }

    #[test]
    fn both_sort_arguments_are_rejected() {
        let err = GetIncidentsArgs {
            sort_by_modification_time: Some(SortOrder::Asc),
            sort_by_creation_time: Some(SortOrder::Asc),
            ..Default::default()
        }
        .build_search()
        .unwrap_err();
        assert!(matches!(err, XdrError::Validation { .. }));
    }

    #[test]
    fn zero_limit_is_rejected() {
        let err = GetIncidentsArgs {
            limit: Some(0),
            ..Default::default()
        }
        .build_search()
        .unwrap_err();
        assert!(matches!(err, XdrError::Validation { ref argument, .. } if argument == "limit"));
    }

    #[test]
    fn update_request_omits_unset_fields() {
        let request = UpdateIncidentArgs {
            incident_id: "1".to_string(),
            status: Some("NEW".to_string()),
            ..Default::default()
        }
        .build_request()
        .unwrap();
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"incident_id": "1", "update_data": {"status": "new"}})
        );
    }

    #[test]
    fn unassign_sets_assignee_to_none() {
        let request = UpdateIncidentArgs {
            incident_id: "7".to_string(),
            unassign_user: true,
            ..Default::default()
        }
        .build_request()
        .unwrap();
        assert_eq!(request.update_data.assigned_user_mail.as_deref(), Some("none"));
    }

    #[test]
    fn unassign_conflicts_with_assignee() {
        let err = UpdateIncidentArgs {
            incident_id: "7".to_string(),
            unassign_user: true,
            assigned_user_mail: Some("analyst@example.com".to_string()),
            ..Default::default()
        }
        .build_request()
        .unwrap_err();
        assert!(matches!(err, XdrError::Validation { .. }));
    }

    #[test]
    fn unknown_status_and_blank_id_are_rejected() {
        let bad_status = UpdateIncidentArgs {
            incident_id: "1".to_string(),
            status: Some("closed".to_string()),
            ..Default::default()
        };
        assert!(bad_status.build_request().is_err());

        let blank_id = UpdateIncidentArgs {
            incident_id: "  ".to_string(),
            ..Default::default()
        };
        assert!(blank_id.build_request().is_err());
    }
}
