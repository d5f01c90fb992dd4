//! Data types flowing through one digest run.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Source;
use crate::window::TimeWindow;

/// Placeholder used when an issue has no assignee.
pub const UNASSIGNED: &str = "Unassigned";

/// What happened to an issue inside the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    StatusChanged,
    Assigned,
    Commented,
}

impl ChangeKind {
    /// Label shown in the email.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Created => "Created",
            Self::StatusChanged => "Status changed",
            Self::Assigned => "Assigned",
            Self::Commented => "Commented",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One observed event on a Jira issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssueChange {
    pub project_key: String,
    pub project_name: String,
    pub issue_key: String,
    pub summary: String,
    pub issue_type: String,
    pub status: String,
    pub assignee: String,
    pub change_kind: ChangeKind,
    /// `"Open → In Progress"`, `"Alice → Bob"`, `"Carol: looks good"`, or nothing for creation.
    pub detail: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub url: String,
}

/// Latest edit of a Confluence page inside the window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageChange {
    pub space_key: String,
    pub space_name: String,
    pub page_id: String,
    pub page_title: String,
    pub last_editor: String,
    pub version: Option<u64>,
    pub timestamp: DateTime<Utc>,
    pub url: String,
}

/// Entries sharing one project or space key, in ascending timestamp order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Group<T> {
    pub key: String,
    pub entries: Vec<T>,
}

/// A collector that failed this run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFailure {
    pub source: Source,
    pub detail: String,
}

/// Everything one run observed, ready for rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Digest {
    pub window: TimeWindow,
    pub issues_by_project: Vec<Group<IssueChange>>,
    pub pages_by_space: Vec<Group<PageChange>>,
    /// Sources whose data is missing from this digest.
    pub unavailable: Vec<SourceFailure>,
}

impl Digest {
    #[must_use]
    pub fn issue_count(&self) -> usize {
        self.issues_by_project.iter().map(|g| g.entries.len()).sum()
    }

    #[must_use]
    pub fn page_count(&self) -> usize {
        self.pages_by_space.iter().map(|g| g.entries.len()).sum()
    }

    #[must_use]
    pub fn is_unavailable(&self, source: Source) -> bool {
        self.unavailable.iter().any(|f| f.source == source)
    }

    /// Detail message for a failed source, if it failed.
    #[must_use]
    pub fn unavailable_detail(&self, source: Source) -> Option<&str> {
        self.unavailable
            .iter()
            .find(|f| f.source == source)
            .map(|f| f.detail.as_str())
    }
}

/// Outcome of one send attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryResult {
    pub success: bool,
    pub error_detail: Option<String>,
}

impl DeliveryResult {
    #[must_use]
    pub const fn delivered() -> Self {
        Self {
            success: true,
            error_detail: None,
        }
    }

    #[must_use]
    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            success: false,
            error_detail: Some(detail.into()),
        }
    }
}
