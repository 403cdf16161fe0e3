//! Endpoint lookup and network isolation.
//!
//! | Command | API Path |
//! |---------|----------|
//! | [`get_endpoints_command`] | POST `endpoints/get_endpoint/` |
//! | [`isolate_endpoint_command`] | POST `endpoints/get_endpoint/`, then `endpoints/isolate` |
//! | [`unisolate_endpoint_command`] | POST `endpoints/get_endpoint/`, then `endpoints/unisolate` |
//!
//! Isolation is not idempotent on the XDR side: asking to isolate an
//! endpoint that is already isolated (or disconnected, or mid
//! cancellation) fails or races. Both isolation commands therefore look
//! the endpoint up first and only send the action when its current state
//! allows it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::args::{parse_timestamp, required};
use crate::client::XdrClient;
use crate::error::{Result, XdrError};
use crate::output::{CommandOutput, ENDPOINT_PATH, markdown_table};
use crate::request::{SearchRequest, SortOrder, exclusive_sort, parse_reply};

pub const GET_ENDPOINT_PATH: &str = "endpoints/get_endpoint/";
pub const ISOLATE_PATH: &str = "endpoints/isolate";
pub const UNISOLATE_PATH: &str = "endpoints/unisolate";

const DEFAULT_ENDPOINTS_LIMIT: u32 = 30;

const ENDPOINT_HEADERS: &[&str] = &[
    "endpoint_id",
    "endpoint_name",
    "endpoint_type",
    "endpoint_status",
    "os_type",
    "ip",
    "users",
    "domain",
    "alias",
    "first_seen",
    "last_seen",
    "content_version",
    "installation_package",
    "active_directory",
    "install_date",
    "endpoint_version",
    "is_isolated",
    "group_name",
];

/// Isolation states reported in an endpoint's `is_isolated` field.
pub mod isolation {
    pub const ISOLATED: &str = "AGENT_ISOLATED";
    pub const UNISOLATED: &str = "AGENT_UNISOLATED";
    pub const PENDING_ISOLATION: &str = "AGENT_PENDING_ISOLATION";
    pub const PENDING_ISOLATION_CANCELLATION: &str = "AGENT_PENDING_ISOLATION_CANCELLATION";
}

/// `endpoint_status` of an agent that cannot receive actions.
pub const DISCONNECTED: &str = "DISCONNECTED";

/// The endpoint fields isolation decisions are based on.
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointState {
    pub endpoint_id: String,
    #[serde(default)]
    pub endpoint_status: Option<String>,
    #[serde(default)]
    pub is_isolated: Option<String>,
}

/// `reply` of the endpoint listing endpoint.
#[derive(Debug, Deserialize)]
struct EndpointList {
    #[serde(default)]
    endpoints: Vec<Value>,
}

/// Arguments of `get-endpoints`. List arguments are comma-separated.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct GetEndpointsArgs {
    /// Endpoint IDs.
    #[arg(long, value_delimiter = ',')]
    pub endpoint_id_list: Vec<String>,

    /// Distribution (installation package) names.
    #[arg(long, value_delimiter = ',')]
    pub dist_name: Vec<String>,

    /// IP addresses.
    #[arg(long, value_delimiter = ',')]
    pub ip_list: Vec<String>,

    /// Endpoint group names.
    #[arg(long, value_delimiter = ',')]
    pub group_name: Vec<String>,

    /// Platforms (windows, linux, macos, android).
    #[arg(long, value_delimiter = ',')]
    pub platform: Vec<String>,

    /// Endpoint aliases.
    #[arg(long, value_delimiter = ',')]
    pub alias_name: Vec<String>,

    /// Isolation state (isolated, unisolated).
    #[arg(long)]
    pub isolate: Option<String>,

    /// Host names.
    #[arg(long, value_delimiter = ',')]
    pub hostname: Vec<String>,

    /// First seen at or after this time.
    #[arg(long, value_parser = parse_timestamp)]
    pub first_seen_gte: Option<i64>,

    /// First seen at or before this time.
    #[arg(long, value_parser = parse_timestamp)]
    pub first_seen_lte: Option<i64>,

    /// Last seen at or after this time.
    #[arg(long, value_parser = parse_timestamp)]
    pub last_seen_gte: Option<i64>,

    /// Last seen at or before this time.
    #[arg(long, value_parser = parse_timestamp)]
    pub last_seen_lte: Option<i64>,

    /// Zero-based page number.
    #[arg(long, default_value_t = 0)]
    pub page: u32,

    /// Page size (default 30).
    #[arg(long)]
    pub limit: Option<u32>,

    /// Sort by first seen time (asc|desc).
    #[arg(long)]
    pub sort_by_first_seen: Option<SortOrder>,

    /// Sort by last seen time (asc|desc).
    #[arg(long)]
    pub sort_by_last_seen: Option<SortOrder>,
}

impl GetEndpointsArgs {
    /// Lookup of a single endpoint by ID.
    pub fn by_id(endpoint_id: &str) -> Self {
        GetEndpointsArgs {
            endpoint_id_list: vec![endpoint_id.to_string()],
            ..Default::default()
        }
    }

    /// Validates the arguments and builds the search body.
    pub fn build_search(&self) -> Result<SearchRequest> {
        let sort = exclusive_sort(
            ("sort_by_first_seen", "first_seen", self.sort_by_first_seen),
            ("sort_by_last_seen", "last_seen", self.sort_by_last_seen),
        )?;

        let limit = match self.limit {
            Some(0) => return Err(XdrError::validation("limit", "must be at least 1")),
            Some(limit) => limit,
            None => DEFAULT_ENDPOINTS_LIMIT,
        };

        let isolate = match self.isolate.as_deref().map(str::trim) {
            None => Vec::new(),
            Some(state @ ("isolated" | "unisolated")) => vec![state.to_string()],
            Some(other) => {
                return Err(XdrError::validation(
                    "isolate",
                    format!("`{other}` is not one of isolated, unisolated"),
                ));
            }
        };

        let mut request = SearchRequest::page(self.page, limit)
            .filter_in("endpoint_id_list", &self.endpoint_id_list)
            .filter_in("dist_name", &self.dist_name)
            .filter_gte("first_seen", self.first_seen_gte)
            .filter_lte("first_seen", self.first_seen_lte)
            .filter_gte("last_seen", self.last_seen_gte)
            .filter_lte("last_seen", self.last_seen_lte)
            .filter_in("ip_list", &self.ip_list)
            .filter_in("group_name", &self.group_name)
            .filter_in("platform", &self.platform)
            .filter_in("alias", &self.alias_name)
            .filter_in("isolate", &isolate)
            .filter_in("hostname", &self.hostname);
        if let Some((field, order)) = sort {
            request = request.sorted_by(field, order);
        }
        Ok(request)
    }
}

async fn search_endpoints(client: &XdrClient, request: &SearchRequest) -> Result<(Vec<Value>, Value)> {
    let raw = client.call(GET_ENDPOINT_PATH, request).await?;
    let list: EndpointList = parse_reply(&raw)?;
    Ok((list.endpoints, raw))
}

/// `get-endpoints`: lists endpoints matching the filters.
pub async fn get_endpoints_command(
    client: &XdrClient,
    args: &GetEndpointsArgs,
) -> Result<CommandOutput> {
    let request = args.build_search()?;
    let (endpoints, raw) = search_endpoints(client, &request).await?;
    let readable = markdown_table("Endpoints", &endpoints, Some(ENDPOINT_HEADERS));
    Ok(CommandOutput::entity(
        readable,
        ENDPOINT_PATH,
        Value::Array(endpoints),
        raw,
    ))
}

/// Fetches the isolation-relevant state of one endpoint.
pub async fn get_endpoint_state(client: &XdrClient, endpoint_id: &str) -> Result<EndpointState> {
    let request = GetEndpointsArgs::by_id(endpoint_id).build_search()?;
    let (endpoints, _) = search_endpoints(client, &request).await?;
    let first = endpoints
        .into_iter()
        .next()
        .ok_or_else(|| XdrError::Rejected(format!("Endpoint {endpoint_id} was not found")))?;
    Ok(serde_json::from_value(first)?)
}

/// Arguments of `isolate-endpoint` and `unisolate-endpoint`.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct EndpointIdArgs {
    /// The endpoint to act on.
    #[arg(long)]
    pub endpoint_id: String,
}

#[derive(Debug, Serialize)]
struct EndpointAction<'a> {
    endpoint_id: &'a str,
}

/// What an isolation command should do given the endpoint's state.
#[derive(Debug, PartialEq, Eq)]
enum Decision {
    /// Nothing to send; report this message.
    AlreadyDone(String),
    /// Send the action.
    Proceed,
}

fn isolate_decision(endpoint: &EndpointState) -> Result<Decision> {
    let id = &endpoint.endpoint_id;
    match endpoint.is_isolated.as_deref() {
        Some(isolation::ISOLATED) => {
            return Ok(Decision::AlreadyDone(format!("Endpoint {id} already isolated.")));
        }
        Some(isolation::PENDING_ISOLATION) => {
            return Ok(Decision::AlreadyDone(format!("Endpoint {id} pending isolation.")));
        }
        _ => {}
    }
    if endpoint.endpoint_status.as_deref() == Some(DISCONNECTED) {
        return Err(XdrError::Rejected(format!(
            "Endpoint {id} is disconnected and therefore can not be isolated."
        )));
    }
    if endpoint.is_isolated.as_deref() == Some(isolation::PENDING_ISOLATION_CANCELLATION) {
        return Err(XdrError::Rejected(format!(
            "Endpoint {id} is pending isolation cancellation and therefore can not be isolated."
        )));
    }
    Ok(Decision::Proceed)
}

fn unisolate_decision(endpoint: &EndpointState) -> Result<Decision> {
    let id = &endpoint.endpoint_id;
    match endpoint.is_isolated.as_deref() {
        Some(isolation::UNISOLATED) => {
            return Ok(Decision::AlreadyDone(format!("Endpoint {id} already unisolated.")));
        }
        Some(isolation::PENDING_ISOLATION_CANCELLATION) => {
            return Ok(Decision::AlreadyDone(format!(
                "Endpoint {id} pending isolation cancellation."
            )));
        }
        _ => {}
    }
    if endpoint.endpoint_status.as_deref() == Some(DISCONNECTED) {
        return Err(XdrError::Rejected(format!(
            "Endpoint {id} is disconnected and therefore can not be un-isolated."
        )));
    }
    if endpoint.is_isolated.as_deref() == Some(isolation::PENDING_ISOLATION) {
        return Err(XdrError::Rejected(format!(
            "Endpoint {id} is pending isolation and therefore can not be un-isolated."
        )));
    }
    Ok(Decision::Proceed)
}

/// `isolate-endpoint`: cuts an endpoint off the network.
pub async fn isolate_endpoint_command(
    client: &XdrClient,
    args: &EndpointIdArgs,
) -> Result<CommandOutput> {
    let endpoint_id = required("endpoint_id", &args.endpoint_id)?;
    let state = get_endpoint_state(client, endpoint_id).await?;
    if let Decision::AlreadyDone(message) = isolate_decision(&state)? {
        return Ok(CommandOutput::text(message, Value::Null));
    }

    let raw = client
        .call(ISOLATE_PATH, &EndpointAction { endpoint_id })
        .await?;
    info!(endpoint_id, "endpoint isolation requested");
    Ok(CommandOutput::text(
        format!("Endpoint {endpoint_id} has isolated successfully"),
        raw,
    ))
}

/// `unisolate-endpoint`: releases an endpoint from isolation.
pub async fn unisolate_endpoint_command(
    client: &XdrClient,
    args: &EndpointIdArgs,
) -> Result<CommandOutput> {
    let endpoint_id = required("endpoint_id", &args.endpoint_id)?;
    let state = get_endpoint_state(client, endpoint_id).await?;
    if let Decision::AlreadyDone(message) = unisolate_decision(&state)? {
        return Ok(CommandOutput::text(message, Value::Null));
    }

    let raw = client
        .call(UNISOLATE_PATH, &EndpointAction { endpoint_id })
        .await?;
    info!(endpoint_id, "endpoint un-isolation requested");
    Ok(CommandOutput::text(
        format!("Endpoint {endpoint_id} has un-isolated successfully"),
        raw,
    ))
}
