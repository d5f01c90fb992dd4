//! Confluence REST content-search response shapes.

use serde::Deserialize;

/// `GET /rest/api/content/search`
#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub results: Vec<Content>,
    #[serde(default)]
    pub start: u64,
    #[serde(default)]
    pub limit: u64,
    #[serde(default)]
    pub size: u64,
    #[serde(rename = "_links", default)]
    pub links: Links,
}

#[derive(Debug, Default, Deserialize)]
pub struct Links {
    pub next: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Content {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub space: Option<Space>,
    pub version: Option<Version>,
    pub history: Option<History>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Space {
    pub key: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Version {
    pub number: Option<u64>,
    pub when: Option<String>,
    pub by: Option<User>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct History {
    pub last_updated: Option<Version>,
}
