//! Collectors: one per upstream system, each answering "what changed in this window".
//!
//! The pipeline only sees the [`IssueSource`] and [`PageSource`] traits, so
//! the REST clients can be swapped for canned stand-ins in tests.

pub mod confluence;
pub mod http;
pub mod jira;

use async_trait::async_trait;

use crate::error::CollectionError;
use crate::model::{IssueChange, PageChange};
use crate::window::TimeWindow;

pub use confluence::ConfluenceCollector;
pub use jira::JiraCollector;

/// Source of Jira issue activity.
#[async_trait]
pub trait IssueSource: Send + Sync {
    /// Every issue event inside `window`, ascending by timestamp.
    ///
    /// An empty `project_filter` means all visible projects. Pagination is
    /// exhausted before returning; partial results are never exposed.
    async fn collect(
        &self,
        window: TimeWindow,
        project_filter: &[String],
    ) -> Result<Vec<IssueChange>, CollectionError>;
}

/// Source of Confluence page activity.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// One entry per page edited inside `window`, ascending by timestamp.
    ///
    /// An empty `space_filter` means all visible spaces.
    async fn collect(
        &self,
        window: TimeWindow,
        space_filter: &[String],
    ) -> Result<Vec<PageChange>, CollectionError>;
}
