//! Typed error hierarchy for the xdr-adapter crate.
//!
//! `XdrError` separates the failure boundaries a command can hit:
//! - Argument validation, which always happens before any request is sent.
//! - The XDR REST API answering with a non-success status (the response
//!   body is kept, it carries the API's `err_code` / `err_msg` payload).
//! - Transport failures that never produced a status code.
//! - Reply bodies that do not have the expected shape.
//! - Remote state that forbids a command (e.g. isolating a disconnected
//!   endpoint).
//! - Local cursor file I/O for the incident poller.
//! - Writing command output (e.g. a closed stdout pipe).
//!
//! `Api` and `Network` together form the "request error" category:
//! neither is retried, and the poller leaves its cursor untouched when
//! one occurs.

use std::path::PathBuf;

use reqwest::StatusCode;

/// Unified error type for all xdr-adapter operations.
#[derive(Debug, thiserror::Error)]
pub enum XdrError {
    /// The XDR API returned a non-success HTTP status code.
    ///
    /// The raw body is preserved instead of being dropped by
    /// `error_for_status()`, since XDR puts its diagnostic `err_msg`
    /// and `err_extra` fields there.
    #[error("API error {status}: {body}")]
    Api {
        /// The HTTP status code returned by the XDR API.
        status: StatusCode,
        /// The raw response body text, or an empty string if unreadable.
        body: String,
    },

    /// A network-level failure occurred (DNS, TCP, TLS, request timeout).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// JSON deserialization failed when parsing a reply body.
    #[error("failed to parse response: {0}")]
    Parse(#[from] serde_json::Error),

    /// A command argument was missing, malformed, or inconsistent with
    /// another argument. Raised before any network call.
    #[error("invalid argument `{argument}`: {message}")]
    Validation {
        /// Name of the offending argument as the command surface spells it.
        argument: String,
        /// What was wrong with it.
        message: String,
    },

    /// The remote state does not allow the command to proceed.
    #[error("{0}")]
    Rejected(String),

    /// Reading or writing the persisted poller cursor failed.
    #[error("failed to access cursor state {}: {source}", path.display())]
    State {
        /// The state file that was being accessed.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Command output could not be written.
    #[error("failed to write output: {0}")]
    Output(#[source] std::io::Error),
}

impl XdrError {
    /// Shorthand for building a [`XdrError::Validation`].
    pub fn validation(argument: &str, message: impl Into<String>) -> Self {
        XdrError::Validation {
            argument: argument.to_string(),
            message: message.into(),
        }
    }

    /// Returns `true` for failures of the HTTP round trip itself
    /// (non-2xx status or transport error).
    pub fn is_request_error(&self) -> bool {
        matches!(self, XdrError::Api { .. } | XdrError::Network(_))
    }
}

/// Convenience alias used throughout the library.
pub type Result<T> = std::result::Result<T, XdrError>;
