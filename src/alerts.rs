//! Alert ingestion.
//!
//! | Command | API Path |
//! |---------|----------|
//! | [`insert_parsed_alert_command`] | POST `alerts/insert_parsed_alerts/` |
//! | [`insert_cef_alerts_command`] | POST `alerts/insert_cef_alerts/` |

use chrono::Utc;
use serde::Serialize;

use crate::args::{parse_timestamp, required};
use crate::client::XdrClient;
use crate::error::{Result, XdrError};
use crate::output::CommandOutput;

pub const INSERT_PARSED_ALERTS_PATH: &str = "alerts/insert_parsed_alerts/";
pub const INSERT_CEF_ALERTS_PATH: &str = "alerts/insert_cef_alerts/";

const ALERT_SEVERITIES: &[&str] = &["Informational", "Low", "Medium", "High", "Unknown"];
const DEFAULT_SEVERITY: &str = "Medium";

#[derive(Debug, Serialize)]
struct Alerts<T> {
    alerts: Vec<T>,
}

// ── Parsed alerts ──────────────────────────────────────────────────────

/// Arguments of `insert-parsed-alert`.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct InsertParsedAlertArgs {
    /// Product reporting the alert.
    #[arg(long)]
    pub product: String,

    /// Vendor of the reporting product.
    #[arg(long)]
    pub vendor: String,

    #[arg(long)]
    pub local_ip: String,

    #[arg(long)]
    pub local_port: u16,

    #[arg(long)]
    pub remote_ip: String,

    #[arg(long)]
    pub remote_port: u16,

    /// When the event happened (default: now).
    #[arg(long, value_parser = parse_timestamp)]
    pub event_timestamp: Option<i64>,

    /// Informational, Low, Medium, High or Unknown (default Medium).
    #[arg(long)]
    pub severity: Option<String>,

    #[arg(long)]
    pub alert_name: String,

    #[arg(long)]
    pub alert_description: Option<String>,
}

/// One entry of the parsed-alert payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedAlert {
    pub product: String,
    pub vendor: String,
    pub local_ip: String,
    pub local_port: u16,
    pub remote_ip: String,
    pub remote_port: u16,
    pub event_timestamp: i64,
    pub severity: String,
    pub alert_name: String,
    pub alert_description: Option<String>,
}

impl InsertParsedAlertArgs {
    /// Validates the arguments, stamping `now_ms` when no event time is set.
    pub fn build_alert(&self, now_ms: i64) -> Result<ParsedAlert> {
        let severity = match self.severity.as_deref().map(str::trim) {
            None => DEFAULT_SEVERITY.to_string(),
            Some(value) => ALERT_SEVERITIES
                .iter()
                .find(|allowed| allowed.eq_ignore_ascii_case(value))
                .map(|allowed| allowed.to_string())
                .ok_or_else(|| {
                    XdrError::validation(
                        "severity",
                        format!("`{value}` is not one of {}", ALERT_SEVERITIES.join(", ")),
                    )
                })?,
        };

        Ok(ParsedAlert {
            product: required("product", &self.product)?.to_string(),
            vendor: required("vendor", &self.vendor)?.to_string(),
            local_ip: required("local_ip", &self.local_ip)?.to_string(),
            local_port: self.local_port,
            remote_ip: required("remote_ip", &self.remote_ip)?.to_string(),
            remote_port: self.remote_port,
            event_timestamp: self.event_timestamp.unwrap_or(now_ms),
            severity,
            alert_name: required("alert_name", &self.alert_name)?.to_string(),
            alert_description: self.alert_description.clone(),
        })
    }
}

/// `insert-parsed-alert`: pushes one pre-parsed alert into XDR.
pub async fn insert_parsed_alert_command(
    client: &XdrClient,
    args: &InsertParsedAlertArgs,
) -> Result<CommandOutput> {
    let alert = args.build_alert(Utc::now().timestamp_millis())?;
    let raw = client
        .call(INSERT_PARSED_ALERTS_PATH, &Alerts { alerts: vec![alert] })
        .await?;
    Ok(CommandOutput::text("Alert inserted successfully", raw))
}

// ── CEF alerts ─────────────────────────────────────────────────────────

/// Arguments of `insert-cef-alerts`.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct InsertCefAlertsArgs {
    /// A CEF-formatted alert line. Repeat for several alerts.
    #[arg(long = "cef-alert")]
    pub cef_alerts: Vec<String>,
}

/// `insert-cef-alerts`: pushes raw CEF lines into XDR.
pub async fn insert_cef_alerts_command(
    client: &XdrClient,
    args: &InsertCefAlertsArgs,
) -> Result<CommandOutput> {
    // Blank lines are skipped; the rest go out verbatim.
    let alerts: Vec<&str> = args
        .cef_alerts
        .iter()
        .map(String::as_str)
        .filter(|line| !line.trim().is_empty())
        .collect();
    if alerts.is_empty() {
        return Err(XdrError::validation("cef_alerts", "at least one alert is required"));
    }
    let raw = client
        .call(INSERT_CEF_ALERTS_PATH, &Alerts { alerts })
        .await?;
    Ok(CommandOutput::text("Alerts inserted successfully", raw))
}
