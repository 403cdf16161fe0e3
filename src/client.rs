//! HTTP client for the XDR public REST API.
//!
//! `XdrClient` wraps a `reqwest::Client`, the tenant's API base URL and a
//! static [`ApiKey`]. Every endpoint the crate talks to is a JSON POST
//! under `{server}/public_api/v1/`, so the client exposes one generic
//! [`XdrClient::send`] and [`XdrClient::call`] on top of it, which wraps a
//! payload in the `request_data` envelope XDR expects and returns the raw
//! JSON reply. Command adapters keep that reply as their "raw response".
//!
//! Failures are never retried. A non-success status is turned into
//! `XdrError::Api` with the response body intact.

use std::time::Duration;

use reqwest::{Client, Method};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::auth::ApiKey;
use crate::error::{Result, XdrError};
use crate::request::RequestData;

/// Path prefix of the public API, appended to the tenant server URL.
pub const API_PREFIX: &str = "public_api/v1/";

/// Connect timeout (TCP + TLS handshake only).
const API_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default overall request timeout, used when the caller does not
/// configure one.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

fn build_api_client(timeout: Duration) -> Result<Client> {
    Ok(Client::builder()
        .connect_timeout(API_CONNECT_TIMEOUT)
        .timeout(timeout)
        .build()?)
}

/// Authenticated HTTP client for the XDR public API.
///
/// `base_url` always ends with `public_api/v1/`, so endpoint paths are
/// written without a leading slash (e.g. `"incidents/get_incidents/"`).
#[derive(Debug)]
pub struct XdrClient {
    client: Client,
    base_url: String,
    api_key: ApiKey,
}

impl XdrClient {
    /// Builds a client for the tenant at `server_url`
    /// (e.g. `https://api-acme.xdr.us.paloaltonetworks.com`).
    pub fn new(server_url: &str, api_key: ApiKey, timeout: Duration) -> Result<Self> {
        let base_url = format!("{}/{API_PREFIX}", server_url.trim_end_matches('/'));
        Ok(XdrClient {
            client: build_api_client(timeout)?,
            base_url,
            api_key,
        })
    }

    /// The fully qualified API base URL requests are resolved against.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Sends one authenticated request and returns the parsed JSON body.
    ///
    /// An empty success body is returned as `Value::Null`. Any non-2xx
    /// status becomes `XdrError::Api` carrying the body text.
    pub async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path.trim_start_matches('/'));
        debug!(%method, %url, key_id = self.api_key.key_id(), "sending XDR API request");

        let mut request = self.api_key.apply(self.client.request(method, &url));
        if let Some(payload) = body {
            request = request.json(payload);
        }
        let response = request.send().await?;

        // Read the body before looking at the status so an error reply
        // keeps XDR's err_msg.
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            warn!(%status, %url, "XDR API rejected request");
            return Err(XdrError::Api { status, body: text });
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }

    /// POSTs `{"request_data": data}` and returns the raw JSON reply.
    pub async fn call<D: Serialize + ?Sized>(&self, path: &str, data: &D) -> Result<Value> {
        self.send(Method::POST, path, Some(&RequestData { request_data: data }))
            .await
    }
}
