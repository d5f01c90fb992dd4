//! Turning one issue's changelog and comments into digest entries.

use tracing::warn;

use super::models::{Comment, History, Issue};
use crate::collectors::http::parse_timestamp;
use crate::model::{ChangeKind, IssueChange, UNASSIGNED};
use crate::window::TimeWindow;

/// Comment bodies are cut to this many characters.
pub const COMMENT_EXCERPT_CHARS: usize = 200;

/// Every event on `issue` that happened inside `window`.
///
/// Emits one `Created` entry when the issue was created in the window, one
/// `StatusChanged`/`Assigned` per matching changelog item, and one
/// `Commented` per comment. Unparseable timestamps are skipped.
pub fn issue_events(
    issue: &Issue,
    histories: &[History],
    comments: &[Comment],
    window: TimeWindow,
    base_url: &str,
) -> Vec<IssueChange> {
    let fields = &issue.fields;
    let (project_key, project_name) = fields
        .project
        .as_ref()
        .map(|p| (p.key.clone(), p.name.clone().unwrap_or_else(|| p.key.clone())))
        .unwrap_or_else(|| {
            let prefix = issue.key.split('-').next().unwrap_or_default().to_string();
            (prefix.clone(), prefix)
        });

    let template = IssueChange {
        project_key,
        project_name,
        issue_key: issue.key.clone(),
        summary: fields.summary.clone().unwrap_or_default(),
        issue_type: fields
            .issuetype
            .as_ref()
            .map(|t| t.name.clone())
            .unwrap_or_default(),
        status: fields
            .status
            .as_ref()
            .map(|s| s.name.clone())
            .unwrap_or_default(),
        assignee: fields
            .assignee
            .as_ref()
            .and_then(|a| a.display_name.clone())
            .unwrap_or_else(|| UNASSIGNED.to_string()),
        change_kind: ChangeKind::Created,
        detail: None,
        timestamp: window.start,
        url: format!("{base_url}/browse/{}", issue.key),
    };

    let mut events = Vec::new();

    if let Some(created) = fields.created.as_deref().and_then(parse_timestamp) {
        if window.contains(created) {
            events.push(IssueChange {
                timestamp: created,
                ..template.clone()
            });
        }
    }

    for history in histories {
        let Some(when) = parse_timestamp(&history.created) else {
            warn!(issue = %issue.key, raw = %history.created, "Skipping changelog entry with bad timestamp");
            continue;
        };
        if !window.contains(when) {
            continue;
        }

        for item in &history.items {
            let kind = match item.field.as_str() {
                "status" => ChangeKind::StatusChanged,
                "assignee" => ChangeKind::Assigned,
                _ => continue,
            };
            let placeholder = if kind == ChangeKind::Assigned { UNASSIGNED } else { "None" };
            let from = item.from_display.as_deref().unwrap_or(placeholder);
            let to = item.to_display.as_deref().unwrap_or(placeholder);

            events.push(IssueChange {
                change_kind: kind,
                detail: Some(format!("{from} → {to}")),
                timestamp: when,
                ..template.clone()
            });
        }
    }

    for comment in comments {
        let Some(when) = parse_timestamp(&comment.created) else {
            warn!(issue = %issue.key, raw = %comment.created, "Skipping comment with bad timestamp");
            continue;
        };
        if !window.contains(when) {
            continue;
        }

        let author = comment
            .author
            .as_ref()
            .and_then(|a| a.display_name.as_deref())
            .unwrap_or("Unknown");

        events.push(IssueChange {
            change_kind: ChangeKind::Commented,
            detail: Some(format!("{author}: {}", excerpt(&comment.body))),
            timestamp: when,
            ..template.clone()
        });
    }

    events
}

fn excerpt(body: &str) -> String {
    let flattened = body.split_whitespace().collect::<Vec<_>>().join(" ");
    if flattened.chars().count() <= COMMENT_EXCERPT_CHARS {
        flattened
    } else {
        let cut: String = flattened.chars().take(COMMENT_EXCERPT_CHARS).collect();
        format!("{cut}…")
    }
}
