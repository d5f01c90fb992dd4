//! Email rendering with Handlebars.
//!
//! The digest is flattened into a [`DigestView`] of display strings and fed
//! to two templates: an auto-escaped HTML body and a markup-free text body.
//! Both see the same view, so they carry the same content.

use std::path::Path;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use handlebars::Handlebars;
use serde::Serialize;
use tracing::debug;

use crate::error::{RenderError, Source};
use crate::model::{Digest, Group, IssueChange, PageChange};

const HTML_TEMPLATE: &str = include_str!("../templates/digest.html.hbs");
const TEXT_TEMPLATE: &str = include_str!("../templates/digest.txt.hbs");

const HTML_NAME: &str = "digest.html";
const TEXT_NAME: &str = "digest.txt";

/// Subject prefix for every digest email.
pub const SUBJECT_PREFIX: &str = "Daily Digest - Jira & Confluence Updates";

/// A rendered email ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// Everything the templates can reference.
#[derive(Debug, Serialize)]
pub struct DigestView {
    pub subject: String,
    pub window_start: String,
    pub window_end: String,
    pub issue_count: usize,
    pub page_count: usize,
    pub project_count: usize,
    pub space_count: usize,
    pub jira_unavailable: Option<String>,
    pub confluence_unavailable: Option<String>,
    pub projects: Vec<GroupView<IssueRow>>,
    pub spaces: Vec<GroupView<PageRow>>,
}

#[derive(Debug, Serialize)]
pub struct GroupView<T> {
    pub key: String,
    pub name: String,
    pub entries: Vec<T>,
}

#[derive(Debug, Serialize)]
pub struct IssueRow {
    pub issue_key: String,
    pub summary: String,
    pub issue_type: String,
    pub change: String,
    pub detail: Option<String>,
    pub status: String,
    pub assignee: String,
    pub time: String,
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct PageRow {
    pub title: String,
    pub editor: String,
    pub version: String,
    pub time: String,
    pub url: String,
}

/// Renders digests into HTML and plain-text email bodies.
pub struct EmailRenderer {
    html: Handlebars<'static>,
    text: Handlebars<'static>,
    timezone: Tz,
}

impl EmailRenderer {
    /// Create a renderer using the embedded templates.
    pub fn new(timezone: Tz) -> Result<Self, RenderError> {
        Self::with_templates(HTML_TEMPLATE, TEXT_TEMPLATE, timezone)
    }

    /// Create a renderer with custom template sources.
    pub fn with_templates(html: &str, text: &str, timezone: Tz) -> Result<Self, RenderError> {
        let mut html_registry = Handlebars::new();
        html_registry.set_strict_mode(false);
        html_registry
            .register_template_string(HTML_NAME, html)
            .map_err(|e| RenderError::Template {
                name: HTML_NAME,
                message: e.to_string(),
            })?;

        let mut text_registry = Handlebars::new();
        text_registry.set_strict_mode(false);
        text_registry.register_escape_fn(handlebars::no_escape);
        text_registry
            .register_template_string(TEXT_NAME, text)
            .map_err(|e| RenderError::Template {
                name: TEXT_NAME,
                message: e.to_string(),
            })?;

        Ok(Self {
            html: html_registry,
            text: text_registry,
            timezone,
        })
    }

    /// Create a renderer loading `digest.html.hbs` / `digest.txt.hbs` from
    /// `dir`, falling back to the embedded template for any file not present.
    pub fn from_dir(dir: &Path, timezone: Tz) -> Result<Self, RenderError> {
        let load = |file: &str, name: &'static str, fallback: &str| -> Result<String, RenderError> {
            let path = dir.join(file);
            if path.exists() {
                debug!(path = %path.display(), "Loading template override");
                std::fs::read_to_string(&path).map_err(|e| RenderError::Template {
                    name,
                    message: format!("{}: {e}", path.display()),
                })
            } else {
                Ok(fallback.to_string())
            }
        };

        let html = load("digest.html.hbs", HTML_NAME, HTML_TEMPLATE)?;
        let text = load("digest.txt.hbs", TEXT_NAME, TEXT_TEMPLATE)?;
        Self::with_templates(&html, &text, timezone)
    }

    /// Render both bodies and the subject line.
    pub fn render(&self, digest: &Digest) -> Result<RenderedEmail, RenderError> {
        let view = self.view(digest);

        let html = self
            .html
            .render(HTML_NAME, &view)
            .map_err(|e| RenderError::Render {
                name: HTML_NAME,
                message: e.to_string(),
            })?;
        let text = self
            .text
            .render(TEXT_NAME, &view)
            .map_err(|e| RenderError::Render {
                name: TEXT_NAME,
                message: e.to_string(),
            })?;

        Ok(RenderedEmail {
            subject: view.subject,
            html,
            text,
        })
    }

    /// Flatten a digest into display strings.
    #[must_use]
    pub fn view(&self, digest: &Digest) -> DigestView {
        let end_date = digest
            .window
            .end
            .with_timezone(&self.timezone)
            .format("%Y-%m-%d");

        DigestView {
            subject: format!("{SUBJECT_PREFIX} ({end_date})"),
            window_start: self.format_full(digest.window.start),
            window_end: self.format_full(digest.window.end),
            issue_count: digest.issue_count(),
            page_count: digest.page_count(),
            project_count: digest.issues_by_project.len(),
            space_count: digest.pages_by_space.len(),
            jira_unavailable: digest.unavailable_detail(Source::Jira).map(String::from),
            confluence_unavailable: digest
                .unavailable_detail(Source::Confluence)
                .map(String::from),
            projects: digest
                .issues_by_project
                .iter()
                .map(|g| self.project_view(g))
                .collect(),
            spaces: digest
                .pages_by_space
                .iter()
                .map(|g| self.space_view(g))
                .collect(),
        }
    }

    fn project_view(&self, group: &Group<IssueChange>) -> GroupView<IssueRow> {
        GroupView {
            key: group.key.clone(),
            name: group
                .entries
                .first()
                .map(|e| e.project_name.clone())
                .unwrap_or_else(|| group.key.clone()),
            entries: group
                .entries
                .iter()
                .map(|e| IssueRow {
                    issue_key: e.issue_key.clone(),
                    summary: e.summary.clone(),
                    issue_type: e.issue_type.clone(),
                    change: e.change_kind.label().to_string(),
                    detail: e.detail.clone(),
                    status: e.status.clone(),
                    assignee: e.assignee.clone(),
                    time: self.format_short(e.timestamp),
                    url: e.url.clone(),
                })
                .collect(),
        }
    }

    fn space_view(&self, group: &Group<PageChange>) -> GroupView<PageRow> {
        GroupView {
            key: group.key.clone(),
            name: group
                .entries
                .first()
                .map(|e| e.space_name.clone())
                .unwrap_or_else(|| group.key.clone()),
            entries: group
                .entries
                .iter()
                .map(|p| PageRow {
                    title: p.page_title.clone(),
                    editor: p.last_editor.clone(),
                    version: p.version.map(|v| v.to_string()).unwrap_or_default(),
                    time: self.format_short(p.timestamp),
                    url: p.url.clone(),
                })
                .collect(),
        }
    }

    fn format_full(&self, ts: DateTime<Utc>) -> String {
        ts.with_timezone(&self.timezone)
            .format("%Y-%m-%d %H:%M %Z")
            .to_string()
    }

    fn format_short(&self, ts: DateTime<Utc>) -> String {
        ts.with_timezone(&self.timezone)
            .format("%m-%d %H:%M")
            .to_string()
    }
}
