//! Error types for the BIR registry client.

use thiserror::Error;
use tracing::error;

/// Registry client errors.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("SOAP fault [{code}]: {reason}")]
    Fault { code: String, reason: String },

    #[error("Invalid SOAP envelope: {0}")]
    Envelope(String),

    #[error("XML parsing error: {0}")]
    XmlParse(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl RegistryError {
    /// Build a fault error, falling back to placeholders for missing parts.
    pub fn fault(code: Option<String>, reason: Option<String>) -> Self {
        Self::Fault {
            code: code.unwrap_or_else(|| "unknown".to_string()),
            reason: reason.unwrap_or_else(|| "no reason given".to_string()),
        }
    }
}

/// Receives every error contained at the validator boundary.
///
/// Implementations must not fail; the return value is never consumed.
pub trait ErrorObserver: Send + Sync {
    fn observe(&self, error: &RegistryError);
}

/// Reports contained errors through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingErrorObserver;

impl ErrorObserver for TracingErrorObserver {
    fn observe(&self, err: &RegistryError) {
        error!(error = %err, "BIR registry call failed");
    }
}
