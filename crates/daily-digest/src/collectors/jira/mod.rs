//! Jira collector.
//!
//! Finds issues created or updated in the window with a JQL search, then
//! walks each candidate's changelog and comments to emit one
//! [`IssueChange`] per creation, status transition, assignment, and comment.
//!
//! All three endpoints are paginated and fully drained before returning.

mod events;
pub mod models;

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, info, instrument};

use self::models::{ChangelogPage, Comment, CommentPage, History, Issue, SearchResponse};
use super::http::{minutes_back, parse_timestamp, quote_key, AtlassianHttp};
use super::IssueSource;
use crate::config::AtlassianConfig;
use crate::error::{CollectionError, Source};
use crate::model::IssueChange;
use crate::window::TimeWindow;

pub use events::{issue_events, COMMENT_EXCERPT_CHARS};

/// Issues requested per search page.
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Token-paginated issue search.
pub const SEARCH_PATH: &str = "/rest/api/3/search/jql";

/// Issues whose changelog/comments are fetched concurrently.
const DETAIL_CONCURRENCY: usize = 4;

const SEARCH_FIELDS: &str = "summary,status,assignee,project,issuetype,created,updated";

/// REST-backed [`IssueSource`].
#[derive(Clone)]
pub struct JiraCollector {
    http: AtlassianHttp,
    page_size: u32,
}

impl JiraCollector {
    pub fn new(config: &AtlassianConfig, timeout: Duration) -> Result<Self, CollectionError> {
        Ok(Self {
            http: AtlassianHttp::new(Source::Jira, config, timeout)?,
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    /// Override the page size used for every paginated endpoint.
    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Build the JQL for a window and optional project filter.
    ///
    /// The lower bound is relative to `now` (`"-Nm"`), so it means the same
    /// instant whatever zone the API account is set to. Results are ordered
    /// by key, which does not move while we page.
    #[must_use]
    pub fn build_jql(
        &self,
        window: TimeWindow,
        project_filter: &[String],
        now: DateTime<Utc>,
    ) -> String {
        let since = format!("-{}m", minutes_back(window.start, now));
        let activity = format!("(created >= \"{since}\" OR updated >= \"{since}\")");

        if project_filter.is_empty() {
            format!("{activity} ORDER BY key ASC")
        } else {
            let keys: Vec<_> = project_filter.iter().map(|k| quote_key(k)).collect();
            format!(
                "project in ({}) AND {activity} ORDER BY key ASC",
                keys.join(", ")
            )
        }
    }

    /// Run the search and return every matching issue across all pages.
    ///
    /// An issue the server returns more than once is kept only the first time.
    #[instrument(skip(self, jql))]
    async fn search(&self, jql: &str) -> Result<Vec<Issue>, CollectionError> {
        let mut issues = Vec::new();
        let mut seen = HashSet::new();
        let mut token: Option<String> = None;

        loop {
            let mut query = vec![
                ("jql", jql.to_string()),
                ("maxResults", self.page_size.to_string()),
                ("fields", SEARCH_FIELDS.to_string()),
            ];
            if let Some(token) = &token {
                query.push(("nextPageToken", token.clone()));
            }

            let page: SearchResponse = self.http.get_json(SEARCH_PATH, &query).await?;

            let fetched = page.issues.len();
            let is_last = page.is_last == Some(true);
            for issue in page.issues {
                if seen.insert(issue.key.clone()) {
                    issues.push(issue);
                } else {
                    debug!(issue = %issue.key, "Skipping issue already returned");
                }
            }
            debug!(fetched, total = issues.len(), "Fetched search page");

            match page.next_page_token.filter(|_| !is_last) {
                Some(next) if fetched > 0 && token.as_ref() != Some(&next) => token = Some(next),
                _ => break,
            }
        }

        Ok(issues)
    }

    async fn changelog(&self, issue_key: &str) -> Result<Vec<History>, CollectionError> {
        let path = format!("/rest/api/2/issue/{issue_key}/changelog");
        let mut histories = Vec::new();
        let mut start_at: u64 = 0;

        loop {
            let page: ChangelogPage = self
                .http
                .get_json(
                    &path,
                    &[
                        ("startAt", start_at.to_string()),
                        ("maxResults", self.page_size.to_string()),
                    ],
                )
                .await?;

            let fetched = page.values.len() as u64;
            histories.extend(page.values);
            start_at += fetched;

            let last = page.is_last.unwrap_or(start_at >= page.total);
            if fetched == 0 || last {
                break;
            }
        }

        Ok(histories)
    }

    async fn comments(&self, issue_key: &str) -> Result<Vec<Comment>, CollectionError> {
        let path = format!("/rest/api/2/issue/{issue_key}/comment");
        let mut comments = Vec::new();
        let mut start_at: u64 = 0;

        loop {
            let page: CommentPage = self
                .http
                .get_json(
                    &path,
                    &[
                        ("startAt", start_at.to_string()),
                        ("maxResults", self.page_size.to_string()),
                    ],
                )
                .await?;

            let fetched = page.comments.len() as u64;
            comments.extend(page.comments);
            start_at += fetched;

            if fetched == 0 || start_at >= page.total {
                break;
            }
        }

        Ok(comments)
    }

    /// Events for one issue, fetching its changelog and comments when it
    /// was touched inside the window.
    async fn events_for(
        &self,
        issue: Issue,
        window: TimeWindow,
    ) -> Result<Vec<IssueChange>, CollectionError> {
        let touched = issue
            .fields
            .updated
            .as_deref()
            .and_then(parse_timestamp)
            .is_none_or(|updated| updated >= window.start);

        let (histories, comments) = if touched {
            tokio::try_join!(self.changelog(&issue.key), self.comments(&issue.key))?
        } else {
            (Vec::new(), Vec::new())
        };

        Ok(issue_events(
            &issue,
            &histories,
            &comments,
            window,
            self.http.base_url(),
        ))
    }
}

#[async_trait]
impl IssueSource for JiraCollector {
    #[instrument(skip(self, project_filter), fields(start = %window.start, end = %window.end))]
    async fn collect(
        &self,
        window: TimeWindow,
        project_filter: &[String],
    ) -> Result<Vec<IssueChange>, CollectionError> {
        let jql = self.build_jql(window, project_filter, Utc::now());
        info!(jql = %jql, "Fetching Jira issues");

        let issues = self.search(&jql).await?;
        let candidates = issues.len();

        let per_issue: Vec<Vec<IssueChange>> = stream::iter(
            issues
                .into_iter()
                .map(|issue| self.events_for(issue, window)),
        )
        .buffered(DETAIL_CONCURRENCY)
        .try_collect()
        .await?;

        let mut changes: Vec<IssueChange> = per_issue
            .into_iter()
            .flatten()
            .filter(|c| project_filter.is_empty() || project_filter.contains(&c.project_key))
            .collect();
        changes.sort_by_key(|c| c.timestamp);

        info!(candidates, changes = changes.len(), "Jira collection complete");
        Ok(changes)
    }
}
