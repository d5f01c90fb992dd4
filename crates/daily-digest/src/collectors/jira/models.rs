//! Jira REST response shapes (only the fields the digest reads).

use serde::Deserialize;

/// `GET /rest/api/3/search/jql`, paginated by an opaque token.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    #[serde(default)]
    pub issues: Vec<Issue>,
    pub next_page_token: Option<String>,
    pub is_last: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Issue {
    pub key: String,
    #[serde(default)]
    pub fields: IssueFields,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IssueFields {
    pub summary: Option<String>,
    pub status: Option<Named>,
    pub assignee: Option<User>,
    pub project: Option<Project>,
    pub issuetype: Option<Named>,
    pub created: Option<String>,
    pub updated: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Named {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Project {
    pub key: String,
    pub name: Option<String>,
}

/// `GET /rest/api/2/issue/{key}/changelog`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangelogPage {
    #[serde(default)]
    pub total: u64,
    pub is_last: Option<bool>,
    #[serde(default)]
    pub values: Vec<History>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct History {
    pub created: String,
    #[serde(default)]
    pub items: Vec<HistoryItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryItem {
    pub field: String,
    #[serde(rename = "fromString")]
    pub from_display: Option<String>,
    #[serde(rename = "toString")]
    pub to_display: Option<String>,
}

/// `GET /rest/api/2/issue/{key}/comment`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentPage {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub comments: Vec<Comment>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Comment {
    pub author: Option<User>,
    #[serde(default)]
    pub body: String,
    pub created: String,
}
