//! Agent installation packages ("distributions").
//!
//! | Command | API Path |
//! |---------|----------|
//! | [`get_distribution_url_command`] | POST `distributions/get_dist_url/` |
//! | [`get_distribution_status_command`] | POST `distributions/get_status/` (once per id) |
//! | [`get_distribution_versions_command`] | POST `distributions/get_versions/` |
//! | [`create_distribution_command`] | POST `distributions/create/` |

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::args::{one_of, required};
use crate::client::XdrClient;
use crate::error::{Result, XdrError};
use crate::output::{CommandOutput, DISTRIBUTION_PATH, DISTRIBUTION_VERSIONS_PATH, markdown_table};
use crate::request::parse_reply;

pub const GET_DIST_URL_PATH: &str = "distributions/get_dist_url/";
pub const GET_STATUS_PATH: &str = "distributions/get_status/";
pub const GET_VERSIONS_PATH: &str = "distributions/get_versions/";
pub const CREATE_PATH: &str = "distributions/create/";

const DOWNLOAD_PACKAGE_TYPES: &[&str] = &["sh", "rpm", "deb", "pkg", "x86", "x64"];
const PLATFORMS: &[&str] = &["windows", "linux", "macos", "android"];
const CREATE_PACKAGE_TYPES: &[&str] = &["standalone", "upgrade"];

// ── Download URL ───────────────────────────────────────────────────────

/// Arguments of `get-distribution-url`.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct DistributionUrlArgs {
    #[arg(long)]
    pub distribution_id: String,

    /// Package flavor: sh, rpm, deb, pkg, x86 or x64.
    #[arg(long)]
    pub package_type: String,
}

#[derive(Debug, Serialize)]
struct DistributionUrlRequest<'a> {
    distribution_id: &'a str,
    package_type: String,
}

#[derive(Debug, Deserialize)]
struct DistributionUrlReply {
    distribution_url: String,
}

/// `get-distribution-url`: download link of a distribution package.
pub async fn get_distribution_url_command(
    client: &XdrClient,
    args: &DistributionUrlArgs,
) -> Result<CommandOutput> {
    let distribution_id = required("distribution_id", &args.distribution_id)?;
    let package_type = one_of("package_type", Some(args.package_type.as_str()), DOWNLOAD_PACKAGE_TYPES)?
        .ok_or_else(|| XdrError::validation("package_type", "is required"))?;

    let raw = client
        .call(
            GET_DIST_URL_PATH,
            &DistributionUrlRequest {
                distribution_id,
                package_type,
            },
        )
        .await?;
    let reply: DistributionUrlReply = parse_reply(&raw)?;

    Ok(CommandOutput::entity(
        format!("[Distribution URL]({})", reply.distribution_url),
        DISTRIBUTION_PATH,
        json!({"id": distribution_id, "url": reply.distribution_url}),
        raw,
    ))
}

// ── Status ─────────────────────────────────────────────────────────────

/// Arguments of `get-distribution-status`.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct DistributionStatusArgs {
    /// Distribution IDs (comma-separated).
    #[arg(long, value_delimiter = ',', required = true)]
    pub distribution_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
struct DistributionStatusRequest<'a> {
    distribution_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct DistributionStatusReply {
    status: Value,
}

/// `get-distribution-status`: build status of each requested distribution.
///
/// The API answers for one distribution at a time, so this issues one
/// request per id, in order. The raw output is the list of raw replies.
pub async fn get_distribution_status_command(
    client: &XdrClient,
    args: &DistributionStatusArgs,
) -> Result<CommandOutput> {
    let ids: Vec<&str> = args
        .distribution_ids
        .iter()
        .map(|id| id.trim())
        .filter(|id| !id.is_empty())
        .collect();
    if ids.is_empty() {
        return Err(XdrError::validation("distribution_ids", "at least one id is required"));
    }

    let mut statuses = Vec::with_capacity(ids.len());
    let mut raws = Vec::with_capacity(ids.len());
    for distribution_id in ids {
        let raw = client
            .call(GET_STATUS_PATH, &DistributionStatusRequest { distribution_id })
            .await?;
        let reply: DistributionStatusReply = parse_reply(&raw)?;
        debug!(distribution_id, status = %reply.status, "distribution status");
        statuses.push(json!({"id": distribution_id, "status": reply.status}));
        raws.push(raw);
    }

    let readable = markdown_table("Distribution Status", &statuses, Some(&["id", "status"][..]));
    Ok(CommandOutput::entity(
        readable,
        DISTRIBUTION_PATH,
        Value::Array(statuses),
        Value::Array(raws),
    ))
}

// ── Versions ───────────────────────────────────────────────────────────

/// `get-distribution-versions`: agent versions available per platform.
pub async fn get_distribution_versions_command(client: &XdrClient) -> Result<CommandOutput> {
    let raw = client.call(GET_VERSIONS_PATH, &Map::new()).await?;
    let versions: Map<String, Value> = parse_reply(&raw)?;

    let readable: String = versions
        .iter()
        .map(|(platform, list)| {
            let rows: Vec<Value> = list
                .as_array()
                .map(|items| items.iter().map(|v| json!({"versions": v})).collect())
                .unwrap_or_default();
            markdown_table(platform, &rows, Some(&["versions"][..]))
        })
        .collect::<Vec<_>>()
        .join("\n");

    Ok(CommandOutput::entity(
        readable,
        DISTRIBUTION_VERSIONS_PATH,
        Value::Object(versions),
        raw,
    ))
}

// ── Create ─────────────────────────────────────────────────────────────

/// Arguments of `create-distribution`.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct CreateDistributionArgs {
    #[arg(long)]
    pub name: String,

    /// windows, linux, macos or android.
    #[arg(long)]
    pub platform: String,

    /// standalone or upgrade.
    #[arg(long)]
    pub package_type: String,

    #[arg(long)]
    pub agent_version: String,

    #[arg(long)]
    pub description: Option<String>,
}

/// Body of `distributions/create/`; also the structured output, with the
/// new id added.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewDistribution {
    pub name: String,
    pub platform: String,
    pub package_type: String,
    pub agent_version: String,
    pub description: Option<String>,
}

impl CreateDistributionArgs {
    /// Validates the arguments into a creation body.
    pub fn build_request(&self) -> Result<NewDistribution> {
        let platform = one_of("platform", Some(self.platform.as_str()), PLATFORMS)?
            .ok_or_else(|| XdrError::validation("platform", "is required"))?;
        let package_type = one_of("package_type", Some(self.package_type.as_str()), CREATE_PACKAGE_TYPES)?
            .ok_or_else(|| XdrError::validation("package_type", "is required"))?;
        Ok(NewDistribution {
            name: required("name", &self.name)?.to_string(),
            platform,
            package_type,
            agent_version: required("agent_version", &self.agent_version)?.to_string(),
            description: self.description.clone(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct CreateDistributionReply {
    distribution_id: String,
}

/// `create-distribution`: registers a new installation package.
pub async fn create_distribution_command(
    client: &XdrClient,
    args: &CreateDistributionArgs,
) -> Result<CommandOutput> {
    let request = args.build_request()?;
    let raw = client.call(CREATE_PATH, &request).await?;
    let reply: CreateDistributionReply = parse_reply(&raw)?;
    let id = reply.distribution_id;

    Ok(CommandOutput::entity(
        format!("Distribution {id} created successfully"),
        DISTRIBUTION_PATH,
        json!({
            "id": id,
            "name": request.name,
            "platform": request.platform,
            "package_type": request.package_type,
            "agent_version": request.agent_version,
            "description": request.description,
        }),
        raw,
    ))
}
