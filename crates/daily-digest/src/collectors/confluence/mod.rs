//! Confluence collector.
//!
//! Runs a CQL content search for pages modified since the window start and
//! keeps the latest in-window edit of each page.

pub mod models;

use std::collections::HashMap;
use std::fmt::Write;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use self::models::{Content, SearchResponse};
use super::http::{minutes_back, parse_timestamp, quote_key, AtlassianHttp};
use super::PageSource;
use crate::config::AtlassianConfig;
use crate::error::{CollectionError, Source};
use crate::model::PageChange;
use crate::window::TimeWindow;

/// Results requested per search page.
pub const DEFAULT_PAGE_SIZE: u32 = 50;

const EXPAND: &str = "version,space,history.lastUpdated";

/// REST-backed [`PageSource`].
#[derive(Clone)]
pub struct ConfluenceCollector {
    http: AtlassianHttp,
    page_size: u32,
}

impl ConfluenceCollector {
    pub fn new(config: &AtlassianConfig, timeout: Duration) -> Result<Self, CollectionError> {
        Ok(Self {
            http: AtlassianHttp::new(Source::Confluence, config, timeout)?,
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Build the CQL for a window and optional space filter.
    ///
    /// The lower bound is `now("-Nm")`, relative to the server clock.
    #[must_use]
    pub fn build_cql(
        &self,
        window: TimeWindow,
        space_filter: &[String],
        now: DateTime<Utc>,
    ) -> String {
        let minutes = minutes_back(window.start, now);
        let mut cql = format!("type = page AND lastModified >= now(\"-{minutes}m\")");

        if !space_filter.is_empty() {
            let keys: Vec<_> = space_filter.iter().map(|k| quote_key(k)).collect();
            let _ = write!(cql, " AND space in ({})", keys.join(", "));
        }

        cql.push_str(" ORDER BY lastModified DESC");
        cql
    }

    async fn search(&self, cql: &str) -> Result<Vec<Content>, CollectionError> {
        let mut results = Vec::new();
        let mut start: u64 = 0;

        loop {
            let page: SearchResponse = self
                .http
                .get_json(
                    "/rest/api/content/search",
                    &[
                        ("cql", cql.to_string()),
                        ("start", start.to_string()),
                        ("limit", self.page_size.to_string()),
                        ("expand", EXPAND.to_string()),
                    ],
                )
                .await?;

            let fetched = page.results.len() as u64;
            debug!(start = page.start, size = page.size, fetched, "Fetched search page");
            results.extend(page.results);
            start += fetched;

            let limit = if page.limit > 0 { page.limit } else { u64::from(self.page_size) };
            if fetched == 0 || fetched < limit || page.links.next.is_none() {
                break;
            }
        }

        Ok(results)
    }
}

/// Convert search results into one entry per page inside the window.
///
/// When a page shows up more than once the latest timestamp wins. Output is
/// ascending by timestamp.
pub fn page_changes(results: Vec<Content>, window: TimeWindow, base_url: &str) -> Vec<PageChange> {
    let mut latest: HashMap<String, PageChange> = HashMap::new();

    for content in results {
        let last_updated = content.history.as_ref().and_then(|h| h.last_updated.as_ref());
        let when = last_updated
            .and_then(|v| v.when.as_deref())
            .or_else(|| content.version.as_ref().and_then(|v| v.when.as_deref()));

        let Some(timestamp) = when.and_then(parse_timestamp) else {
            warn!(page_id = %content.id, "Skipping page without a usable modification time");
            continue;
        };
        if !window.contains(timestamp) {
            continue;
        }

        let last_editor = last_updated
            .and_then(|v| v.by.as_ref())
            .or_else(|| content.version.as_ref().and_then(|v| v.by.as_ref()))
            .and_then(|u| u.display_name.clone())
            .unwrap_or_else(|| "Unknown".to_string());

        let Some(space) = content.space.as_ref().filter(|s| !s.key.is_empty()) else {
            warn!(page_id = %content.id, "Skipping page without a space");
            continue;
        };
        let space_key = space.key.clone();
        let space_name = space.name.clone().unwrap_or_else(|| space.key.clone());

        let change = PageChange {
            space_key,
            space_name,
            page_id: content.id.clone(),
            page_title: content.title,
            last_editor,
            version: content.version.as_ref().and_then(|v| v.number),
            timestamp,
            url: format!("{base_url}/pages/viewpage.action?pageId={}", content.id),
        };

        match latest.get(&change.page_id) {
            Some(existing) if existing.timestamp >= change.timestamp => {}
            _ => {
                latest.insert(change.page_id.clone(), change);
            }
        }
    }

    let mut changes: Vec<PageChange> = latest.into_values().collect();
    changes.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.page_id.cmp(&b.page_id))
    });
    changes
}

#[async_trait]
impl PageSource for ConfluenceCollector {
    #[instrument(skip(self, space_filter), fields(start = %window.start, end = %window.end))]
    async fn collect(
        &self,
        window: TimeWindow,
        space_filter: &[String],
    ) -> Result<Vec<PageChange>, CollectionError> {
        let cql = self.build_cql(window, space_filter, Utc::now());
        info!(cql = %cql, "Fetching Confluence pages");

        let results = self.search(&cql).await?;
        let candidates = results.len();

        let changes: Vec<PageChange> = page_changes(results, window, self.http.base_url())
            .into_iter()
            .filter(|p| space_filter.is_empty() || space_filter.contains(&p.space_key))
            .collect();

        info!(candidates, pages = changes.len(), "Confluence collection complete");
        Ok(changes)
    }
}
