//! Connection settings shared by every subcommand.
//!
//! Each value can come from a flag or its environment variable. Prefer the
//! environment for the API key so it stays out of process listings and
//! shell history.

use std::time::Duration;

use crate::auth::ApiKey;
use crate::client::XdrClient;
use crate::error::Result;

/// Tenant URL, credentials and request timeout.
#[derive(Clone, clap::Args)]
pub struct ConnectionArgs {
    /// Tenant API server, e.g. https://api-acme.xdr.us.paloaltonetworks.com
    #[arg(long, env = "XDR_URL", global = true)]
    pub url: Option<String>,

    /// API key ID (sent as `x-xdr-auth-id`).
    #[arg(long, env = "XDR_API_KEY_ID", global = true)]
    pub api_key_id: Option<String>,

    /// API key (sent as `Authorization`).
    #[arg(long, env = "XDR_API_KEY", hide_env_values = true, global = true)]
    pub api_key: Option<String>,

    /// Overall timeout of one HTTP request, in seconds.
    #[arg(long, env = "XDR_TIMEOUT_SECS", default_value_t = 60, global = true)]
    pub timeout_secs: u64,
}

impl std::fmt::Debug for ConnectionArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionArgs")
            .field("url", &self.url)
            .field("api_key_id", &self.api_key_id)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl ConnectionArgs {
    /// Builds the authenticated client. Missing settings are reported as
    /// validation errors naming the flag to set.
    pub fn connect(&self) -> Result<XdrClient> {
        let url = present("url", self.url.as_deref())?;
        let key_id = present("api_key_id", self.api_key_id.as_deref())?;
        let key = present("api_key", self.api_key.as_deref())?;
        XdrClient::new(
            url,
            ApiKey::new(key_id, key),
            Duration::from_secs(self.timeout_secs),
        )
    }
}

fn present<'a>(argument: &str, value: Option<&'a str>) -> Result<&'a str> {
    crate::args::required(argument, value.unwrap_or_default())
}
