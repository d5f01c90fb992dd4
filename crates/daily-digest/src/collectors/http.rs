//! Authenticated JSON GET helper shared by the Atlassian collectors.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::config::{AtlassianConfig, Secret};
use crate::error::{CollectionError, CollectionErrorKind, Source};

/// Basic-auth REST client for one Atlassian product.
#[derive(Clone)]
pub struct AtlassianHttp {
    client: Client,
    base_url: String,
    username: String,
    api_token: Secret,
    source: Source,
}

impl AtlassianHttp {
    /// Build a client whose every request is bounded by `timeout`.
    pub fn new(
        source: Source,
        config: &AtlassianConfig,
        timeout: Duration,
    ) -> Result<Self, CollectionError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CollectionError::new(source, e))?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            username: config.username.clone(),
            api_token: config.api_token.clone(),
            source,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET `{base_url}{path}` with query parameters and decode the JSON body.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, CollectionError> {
        let url = format!("{}{path}", self.base_url);
        debug!(source = %self.source, url = %url, "GET request");

        let response = self
            .client
            .get(&url)
            .basic_auth(&self.username, Some(self.api_token.expose()))
            .header(reqwest::header::ACCEPT, "application/json")
            .query(query)
            .send()
            .await
            .map_err(|e| self.err(e))?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let text = response.text().await.map_err(|e| self.err(e))?;

        if status.is_success() {
            return serde_json::from_str(&text).map_err(|e| {
                warn!(source = %self.source, error = %e, "Failed to parse response");
                self.err(e)
            });
        }

        let kind = match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => CollectionErrorKind::Unauthorized {
                status: status.as_u16(),
                message: text,
            },
            StatusCode::TOO_MANY_REQUESTS => CollectionErrorKind::RateLimited {
                message: retry_after.map_or(text, |secs| format!("retry after {secs}s")),
            },
            _ => CollectionErrorKind::Status {
                status: status.as_u16(),
                message: text,
            },
        };
        Err(CollectionError::new(self.source, kind))
    }

    fn err(&self, kind: impl Into<CollectionErrorKind>) -> CollectionError {
        CollectionError::new(self.source, kind)
    }
}

/// Parse an Atlassian timestamp.
///
/// Jira emits `2024-01-01T10:00:00.000+0000`; Confluence emits RFC 3339.
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z"))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

/// Slack added to relative query bounds, covering clock skew and the time a
/// run spends paging.
pub const QUERY_MARGIN_MINUTES: i64 = 60;

/// Minutes to reach back from the server's "now" so a query covers `start`.
///
/// JQL and CQL read absolute dates in the API account's profile zone, while a
/// relative offset is zone-free. Callers re-check the exact window
/// client-side, so over-fetching by the margin is harmless.
#[must_use]
pub fn minutes_back(start: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let seconds = (now - start).num_seconds().max(0);
    (seconds + 59) / 60 + QUERY_MARGIN_MINUTES
}

/// Quote a key for use inside a JQL/CQL `in (...)` clause.
#[must_use]
pub fn quote_key(key: &str) -> String {
    format!("\"{}\"", key.replace('\\', "\\\\").replace('"', "\\\""))
}
