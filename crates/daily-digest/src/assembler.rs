//! Digest assembly: grouping collector output by project and space.

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::error::CollectionError;
use crate::model::{Digest, Group, IssueChange, PageChange, SourceFailure};
use crate::window::TimeWindow;

/// Build a digest from successful collector output.
///
/// Groups appear in first-seen key order; within a group entries are stably
/// sorted by ascending timestamp. Empty inputs give empty groupings.
#[must_use]
pub fn assemble(window: TimeWindow, issues: &[IssueChange], pages: &[PageChange]) -> Digest {
    Digest {
        window,
        issues_by_project: group_by(issues, |c| &c.project_key, |c| c.timestamp),
        pages_by_space: group_by(pages, |p| &p.space_key, |p| p.timestamp),
        unavailable: Vec::new(),
    }
}

/// Build a digest where either collector may have failed.
///
/// A failed source contributes no groups and is recorded in
/// [`Digest::unavailable`] so the email can say the data is missing.
#[must_use]
pub fn assemble_outcomes(
    window: TimeWindow,
    issues: Result<Vec<IssueChange>, CollectionError>,
    pages: Result<Vec<PageChange>, CollectionError>,
) -> Digest {
    let mut unavailable = Vec::new();

    let issues = issues.unwrap_or_else(|e| {
        warn!(source = %e.system, error = %e.kind, "Source unavailable, marking in digest");
        unavailable.push(SourceFailure {
            source: e.system,
            detail: e.kind.to_string(),
        });
        Vec::new()
    });
    let pages = pages.unwrap_or_else(|e| {
        warn!(source = %e.system, error = %e.kind, "Source unavailable, marking in digest");
        unavailable.push(SourceFailure {
            source: e.system,
            detail: e.kind.to_string(),
        });
        Vec::new()
    });

    let mut digest = assemble(window, &issues, &pages);
    digest.unavailable = unavailable;
    digest
}

fn group_by<T, K, S>(items: &[T], key: K, stamp: S) -> Vec<Group<T>>
where
    T: Clone,
    K: Fn(&T) -> &String,
    S: Fn(&T) -> DateTime<Utc>,
{
    let mut groups: Vec<Group<T>> = Vec::new();

    for item in items {
        let k = key(item);
        match groups.iter_mut().find(|g| &g.key == k) {
            Some(group) => group.entries.push(item.clone()),
            None => groups.push(Group {
                key: k.clone(),
                entries: vec![item.clone()],
            }),
        }
    }

    for group in &mut groups {
        group.entries.sort_by_key(&stamp);
    }

    groups
}
