//! CLI entry point for xdr-adapter, a Cortex XDR public API client.
//!
//! Connection settings come from global flags or their `XDR_*` environment
//! variables; each subcommand maps to one command adapter. Results print
//! as markdown by default, or as `{outputs, raw}` JSON with `--json`.
//!
//! Exit codes:
//! - 0: success
//! - 1: runtime error (API error, rejected command, bad argument value, etc.)
//! - 2: argument parsing error (clap handles this automatically)

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use chrono::Utc;
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::filter::EnvFilter;

use xdr_adapter::alerts::{
    InsertCefAlertsArgs, InsertParsedAlertArgs, insert_cef_alerts_command,
    insert_parsed_alert_command,
};
use xdr_adapter::args::RelativeTime;
use xdr_adapter::audits::{
    AgentReportsArgs, ManagementLogsArgs, get_audit_agent_reports_command,
    get_audit_management_logs_command,
};
use xdr_adapter::client::XdrClient;
use xdr_adapter::config::ConnectionArgs;
use xdr_adapter::distributions::{
    CreateDistributionArgs, DistributionStatusArgs, DistributionUrlArgs,
    create_distribution_command, get_distribution_status_command, get_distribution_url_command,
    get_distribution_versions_command,
};
use xdr_adapter::endpoints::{
    EndpointIdArgs, GetEndpointsArgs, get_endpoints_command, isolate_endpoint_command,
    unisolate_endpoint_command,
};
use xdr_adapter::error::{Result, XdrError};
use xdr_adapter::fetch::{Cursor, FetchConfig, fetch_incidents, test_module};
use xdr_adapter::incidents::{
    GetIncidentsArgs, IncidentExtraDataArgs, MAX_INCIDENTS_LIMIT, UpdateIncidentArgs,
    get_incident_extra_data_command, get_incidents_command, update_incident_command,
};
use xdr_adapter::output::CommandOutput;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    /// Print structured output and the raw API response as JSON instead
    /// of markdown.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List incidents.
    GetIncidents(GetIncidentsArgs),
    /// Show one incident with its alerts and artifacts.
    GetIncidentExtraData(IncidentExtraDataArgs),
    /// Change an incident's assignee, status or severity.
    UpdateIncident(UpdateIncidentArgs),
    /// List endpoints.
    GetEndpoints(GetEndpointsArgs),
    /// Isolate an endpoint from the network.
    IsolateEndpoint(EndpointIdArgs),
    /// Release an endpoint from isolation.
    UnisolateEndpoint(EndpointIdArgs),
    /// Insert one parsed alert.
    InsertParsedAlert(InsertParsedAlertArgs),
    /// Insert CEF-formatted alerts.
    InsertCefAlerts(InsertCefAlertsArgs),
    /// Get the download URL of a distribution.
    GetDistributionUrl(DistributionUrlArgs),
    /// Get the build status of distributions.
    GetDistributionStatus(DistributionStatusArgs),
    /// List agent versions available per platform.
    GetDistributionVersions,
    /// Create a distribution.
    CreateDistribution(CreateDistributionArgs),
    /// Query management audit logs.
    GetAuditManagementLogs(ManagementLogsArgs),
    /// Query agent audit reports.
    GetAuditAgentReports(AgentReportsArgs),
    /// Poll for new or modified incidents since the last run.
    FetchIncidents(FetchArgs),
    /// Check that the URL and credentials work.
    TestModule,
}

#[derive(clap::Args)]
struct FetchArgs {
    /// JSON file holding the poll cursor between runs. Created on the
    /// first successful poll.
    #[arg(long)]
    state_file: PathBuf,

    /// How far back the first poll reaches, e.g. "3 days".
    #[arg(long, default_value = "3 days")]
    first_fetch: RelativeTime,

    /// Maximum incidents per poll.
    #[arg(
        long,
        default_value_t = 50,
        value_parser = clap::value_parser!(u32).range(1..=i64::from(MAX_INCIDENTS_LIMIT))
    )]
    page_size: u32,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // stdout is reserved for command output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli, &mut std::io::stdout()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, out: &mut impl Write) -> Result<()> {
    let client = cli.connection.connect()?;

    let output = match &cli.command {
        Command::GetIncidents(args) => get_incidents_command(&client, args).await?,
        Command::GetIncidentExtraData(args) => {
            get_incident_extra_data_command(&client, args).await?
        }
        Command::UpdateIncident(args) => update_incident_command(&client, args).await?,
        Command::GetEndpoints(args) => get_endpoints_command(&client, args).await?,
        Command::IsolateEndpoint(args) => isolate_endpoint_command(&client, args).await?,
        Command::UnisolateEndpoint(args) => unisolate_endpoint_command(&client, args).await?,
        Command::InsertParsedAlert(args) => insert_parsed_alert_command(&client, args).await?,
        Command::InsertCefAlerts(args) => insert_cef_alerts_command(&client, args).await?,
        Command::GetDistributionUrl(args) => get_distribution_url_command(&client, args).await?,
        Command::GetDistributionStatus(args) => {
            get_distribution_status_command(&client, args).await?
        }
        Command::GetDistributionVersions => get_distribution_versions_command(&client).await?,
        Command::CreateDistribution(args) => create_distribution_command(&client, args).await?,
        Command::GetAuditManagementLogs(args) => {
            get_audit_management_logs_command(&client, args).await?
        }
        Command::GetAuditAgentReports(args) => {
            get_audit_agent_reports_command(&client, args).await?
        }
        Command::FetchIncidents(args) => return poll(&client, args, out).await,
        Command::TestModule => return emit(out, &test_module(&client).await?),
    };
    emit(out, &render(&output, cli.json)?)
}

/// One poll: load the cursor, fetch, write the incidents to `out`, then
/// persist the advanced cursor. The state file is only touched once the
/// incidents have been written and flushed.
async fn poll(client: &XdrClient, args: &FetchArgs, out: &mut impl Write) -> Result<()> {
    let config = FetchConfig {
        first_fetch_window: args.first_fetch,
        page_size: args.page_size,
    };
    let previous = Cursor::load(&args.state_file)?;
    let (incidents, next) = fetch_incidents(client, &config, previous.as_ref(), Utc::now()).await?;
    emit(out, &serde_json::to_string_pretty(&incidents)?)?;
    next.save(&args.state_file)
}

/// Writes one result and flushes it.
fn emit(out: &mut impl Write, text: &str) -> Result<()> {
    writeln!(out, "{text}")
        .and_then(|()| out.flush())
        .map_err(XdrError::Output)
}

fn render(output: &CommandOutput, as_json: bool) -> Result<String> {
    if as_json {
        Ok(serde_json::to_string_pretty(
            &json!({"outputs": output.outputs, "raw": output.raw}),
        )?)
    } else {
        Ok(output.readable.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};
    use xdr_adapter::auth::ApiKey;
    use xdr_adapter::client::DEFAULT_REQUEST_TIMEOUT;
    use xdr_adapter::request::SortOrder;

    /// Connection flags that satisfy every subcommand.
    fn base_args() -> Vec<&'static str> {
        vec![
            "xdr-adapter",
            "--url",
            "https://api-acme.xdr.us.paloaltonetworks.com",
            "--api-key-id",
            "7",
            "--api-key",
            "s3cret",
        ]
    }

    #[test]
    fn missing_subcommand_is_rejected() {
        assert!(Cli::try_parse_from(base_args()).is_err());
    }

    #[test]
    fn connection_flags_are_global() {
        let cli = Cli::try_parse_from([
            "xdr-adapter",
            "test-module",
            "--url",
            "https://x",
            "--api-key-id",
            "1",
            "--api-key",
            "k",
        ])
        .expect("connection flags should be accepted after the subcommand");
        assert_eq!(cli.connection.url.as_deref(), Some("https://x"));
        assert_eq!(cli.connection.timeout_secs, 60);
        assert!(matches!(cli.command, Command::TestModule));
    }

    #[test]
    fn get_incidents_parses_lists_times_and_sort() {
        let mut args = base_args();
        args.extend_from_slice(&[
            "get-incidents",
            "--incident-id-list",
            "1,2",
            "--gte-creation-time",
            "2020-01-01",
            "--sort-by-creation-time",
            "DESC",
        ]);
        let cli = Cli::try_parse_from(args).expect("should parse get-incidents");
        let Command::GetIncidents(incidents) = cli.command else {
            panic!("expected get-incidents");
        };
        assert_eq!(incidents.incident_id_list, ["1", "2"]);
        assert_eq!(incidents.gte_creation_time, Some(1_577_836_800_000));
        assert_eq!(incidents.sort_by_creation_time, Some(SortOrder::Desc));
    }

    #[test]
    fn malformed_time_is_rejected_at_parse_time() {
        let mut args = base_args();
        args.extend_from_slice(&["get-incidents", "--lte-creation-time", "yesterday-ish"]);
        assert!(Cli::try_parse_from(args).is_err());
    }

    #[test]
    fn isolate_endpoint_requires_endpoint_id() {
        let mut args = base_args();
        args.push("isolate-endpoint");
        assert!(Cli::try_parse_from(args).is_err());
    }

    #[test]
    fn cef_alerts_repeat() {
        let mut args = base_args();
        args.extend_from_slice(&[
            "insert-cef-alerts",
            "--cef-alert",
            "CEF:0|a",
            "--cef-alert",
            "CEF:0|b",
        ]);
        let cli = Cli::try_parse_from(args).expect("should parse repeated --cef-alert");
        let Command::InsertCefAlerts(alerts) = cli.command else {
            panic!("expected insert-cef-alerts");
        };
        assert_eq!(alerts.cef_alerts, ["CEF:0|a", "CEF:0|b"]);
    }

    #[test]
    fn fetch_incidents_defaults_window_and_page_size() {
        let mut args = base_args();
        args.extend_from_slice(&["fetch-incidents", "--state-file", "/tmp/xdr-cursor.json"]);
        let cli = Cli::try_parse_from(args).expect("should parse fetch-incidents");
        let Command::FetchIncidents(fetch) = cli.command else {
            panic!("expected fetch-incidents");
        };
        assert_eq!(fetch.first_fetch.to_string(), "3 days");
        assert_eq!(fetch.page_size, 50);
    }

    #[test]
    fn fetch_page_size_is_bounded() {
        let mut args = base_args();
        args.extend_from_slice(&[
            "fetch-incidents",
            "--state-file",
            "c.json",
            "--page-size",
            "500",
        ]);
        assert!(Cli::try_parse_from(args).is_err());
    }

    #[test]
    fn audit_type_flag_maps_to_entity_type() {
        let mut args = base_args();
        args.extend_from_slice(&[
            "get-audit-management-logs",
            "--type",
            "INCIDENT",
            "--sort-by",
            "timestamp",
            "--limit",
            "3",
        ]);
        let cli = Cli::try_parse_from(args).expect("should parse audit flags");
        let Command::GetAuditManagementLogs(logs) = cli.command else {
            panic!("expected get-audit-management-logs");
        };
        assert_eq!(logs.entity_type, ["INCIDENT"]);
        assert_eq!(logs.paging.limit, Some(3));
    }

    #[test]
    fn json_rendering_includes_outputs_and_raw() {
        let output = CommandOutput::text("done", json!({"reply": true}));
        let rendered = render(&output, true).unwrap();
        let value: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(value, json!({"outputs": null, "raw": {"reply": true}}));
        assert_eq!(render(&output, false).unwrap(), "done");
    }

    // ── fetch-incidents delivery ───────────────────────────────────────

    /// A stdout whose reader has gone away.
    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }
    }

    const SAVED_STATE: &str = r#"{"last_fetch_time":100}"#;

    /// A listing that returns incident 9, modified at 200.
    async fn incident_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/public_api/v1/incidents/get_incidents/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "reply": {
                    "total_count": 1,
                    "result_count": 1,
                    "incidents": [{"incident_id": "9", "modification_time": 200}]
                }
            })))
            .expect(1)
            .mount(&server)
            .await;
        server
    }

    fn fetch_args(state_file: PathBuf) -> FetchArgs {
        FetchArgs {
            state_file,
            first_fetch: "3 days".parse().unwrap(),
            page_size: 50,
        }
    }

    #[tokio::test]
    async fn undelivered_incidents_leave_state_file_unchanged() {
        let server = incident_server().await;
        let client =
            XdrClient::new(&server.uri(), ApiKey::new("7", "mock-key"), DEFAULT_REQUEST_TIMEOUT)
                .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("cursor.json");
        std::fs::write(&state, SAVED_STATE).unwrap();

        let err = poll(&client, &fetch_args(state.clone()), &mut ClosedPipe)
            .await
            .unwrap_err();
        assert!(matches!(err, XdrError::Output(_)));
        assert_eq!(std::fs::read_to_string(&state).unwrap(), SAVED_STATE);
    }

    #[tokio::test]
    async fn delivered_incidents_advance_state_file() {
        let server = incident_server().await;
        let client =
            XdrClient::new(&server.uri(), ApiKey::new("7", "mock-key"), DEFAULT_REQUEST_TIMEOUT)
                .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("cursor.json");
        std::fs::write(&state, SAVED_STATE).unwrap();

        let mut out = Vec::new();
        poll(&client, &fetch_args(state.clone()), &mut out).await.unwrap();

        let printed: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(printed[0]["id"], "9");
        let saved = Cursor::load(&state).unwrap().unwrap();
        assert_eq!(saved.last_fetch_time, 200);
        assert!(saved.last_fetch_ids.contains("9"));
    }
}
