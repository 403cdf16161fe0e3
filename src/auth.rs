//! Static API-key authentication for the XDR public API.
//!
//! XDR "standard" API keys are a pair: a numeric key ID and the key
//! itself. Every request carries both as headers; there is no token
//! exchange and nothing expires client-side, so `ApiKey` is just an
//! immutable credential that decorates outgoing requests.

use std::fmt;

use reqwest::RequestBuilder;
use reqwest::header::AUTHORIZATION;

/// Header carrying the API key ID.
pub const AUTH_ID_HEADER: &str = "x-xdr-auth-id";

/// An XDR API key pair.
///
/// `Debug` redacts the key so the credential can sit inside structs that
/// end up in logs.
#[derive(Clone)]
pub struct ApiKey {
    key_id: String,
    key: String,
}

impl ApiKey {
    pub fn new(key_id: &str, key: &str) -> Self {
        ApiKey {
            key_id: key_id.to_string(),
            key: key.to_string(),
        }
    }

    /// The API key ID sent in [`AUTH_ID_HEADER`].
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Attaches both authentication headers to a request.
    pub fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header(AUTH_ID_HEADER, &self.key_id)
            .header(AUTHORIZATION, &self.key)
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKey")
            .field("key_id", &self.key_id)
            .field("key", &"<redacted>")
            .finish()
    }
}
