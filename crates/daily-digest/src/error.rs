//! Error types for the digest pipeline.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Upstream system a collector talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Jira,
    Confluence,
}

impl Source {
    /// Lowercase tag used in logs and JSON output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Jira => "jira",
            Self::Confluence => "confluence",
        }
    }

    /// Human-readable product name.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Jira => "Jira",
            Self::Confluence => "Confluence",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a vendor API call failed.
#[derive(Debug, Error)]
pub enum CollectionErrorKind {
    /// Transport-level failure (DNS, connect, TLS, request timeout).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Credentials were rejected.
    #[error("authentication rejected ({status}): {message}")]
    Unauthorized { status: u16, message: String },

    /// The vendor is throttling us.
    #[error("rate limited by the API: {message}")]
    RateLimited { message: String },

    /// Any other non-success status.
    #[error("API error: {status} - {message}")]
    Status { status: u16, message: String },

    /// Response body did not match the expected shape.
    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The whole collection exceeded its time budget.
    #[error("collection timed out after {0} seconds")]
    Timeout(u64),
}

/// A collector could not produce its results for this run.
#[derive(Debug, Error)]
#[error("{system} collection failed: {kind}")]
pub struct CollectionError {
    pub system: Source,
    #[source]
    pub kind: CollectionErrorKind,
}

impl CollectionError {
    pub fn new(system: Source, kind: impl Into<CollectionErrorKind>) -> Self {
        Self {
            system,
            kind: kind.into(),
        }
    }

    #[must_use]
    pub fn timeout(system: Source, secs: u64) -> Self {
        Self {
            system,
            kind: CollectionErrorKind::Timeout(secs),
        }
    }
}

/// Template or formatting failure while rendering the email.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to register template {name}: {message}")]
    Template { name: &'static str, message: String },

    #[error("failed to render template {name}: {message}")]
    Render { name: &'static str, message: String },
}

/// SMTP delivery failure.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("invalid address {address:?}: {message}")]
    Address { address: String, message: String },

    #[error("failed to build message: {0}")]
    Message(String),

    #[error("SMTP authentication failed: {0}")]
    Authentication(String),

    #[error("SMTP transport error: {0}")]
    Transport(String),
}

/// A run that ended without an email being sent.
#[derive(Debug, Error)]
pub enum RunError {
    /// Every collector failed, so there is nothing meaningful to send.
    #[error("all sources unavailable: {0}")]
    AllSourcesUnavailable(String),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

/// Invalid or incomplete configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variables: {}", .0.join(", "))]
    Missing(Vec<&'static str>),

    #[error("Invalid value for {var}: {message}")]
    Invalid { var: &'static str, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_error_display_names_source() {
        let err = CollectionError::new(
            Source::Jira,
            CollectionErrorKind::Unauthorized {
                status: 401,
                message: "bad token".to_string(),
            },
        );
        let rendered = err.to_string();
        assert!(rendered.starts_with("jira collection failed"));
        assert!(rendered.contains("bad token"));
    }

    #[test]
    fn test_missing_config_lists_all_vars() {
        let err = ConfigError::Missing(vec!["JIRA_URL", "SMTP_HOST"]);
        assert_eq!(
            err.to_string(),
            "Missing required environment variables: JIRA_URL, SMTP_HOST"
        );
    }
}
