//! Async Rust client library for the Cortex XDR public API.
//!
//! Wraps the incident, endpoint, alert, distribution and audit endpoints
//! as command adapters (typed arguments in, [`output::CommandOutput`] out)
//! and provides a cursor-based incident poller for incremental ingestion.
//!
//! # Modules
//!
//! - [`alerts`]: parsed and CEF alert insertion.
//! - [`args`]: time argument coercion and shared argument checks.
//! - [`audits`]: management audit logs and agent reports.
//! - [`auth`]: API key pair and header injection.
//! - [`client`]: authenticated HTTP wrapper for the public API.
//! - [`config`]: connection settings from flags and environment.
//! - [`distributions`]: installation package URLs, status, versions, creation.
//! - [`endpoints`]: endpoint search and network isolation.
//! - [`error`]: typed error hierarchy (`XdrError`) for all operations.
//! - [`fetch`]: incident poller with a persisted [`fetch::Cursor`].
//! - [`incidents`]: incident search, extra data and updates.
//! - [`output`]: command results and markdown rendering.
//! - [`request`]: `request_data` / `reply` envelopes and search filters.
//!
//! # Quick Start
//!
//! ```ignore
//! use xdr_adapter::auth::ApiKey;
//! use xdr_adapter::client::{DEFAULT_REQUEST_TIMEOUT, XdrClient};
//! use xdr_adapter::endpoints::{EndpointIdArgs, isolate_endpoint_command};
//!
//! let client = XdrClient::new(
//!     "https://api-acme.xdr.us.paloaltonetworks.com",
//!     ApiKey::new("7", "key"),
//!     DEFAULT_REQUEST_TIMEOUT,
//! )?;
//! let args = EndpointIdArgs { endpoint_id: "1111".to_string() };
//! let result = isolate_endpoint_command(&client, &args).await?;
//! println!("{}", result.readable);
//! ```

pub mod alerts;
pub mod args;
pub mod audits;
pub mod auth;
pub mod client;
pub mod config;
pub mod distributions;
pub mod endpoints;
pub mod error;
pub mod fetch;
pub mod incidents;
pub mod output;
pub mod request;
