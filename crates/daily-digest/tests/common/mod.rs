//! Canned sources and mail transports shared by the integration tests.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use lettre::Message;

use daily_digest::collectors::{IssueSource, PageSource};
use daily_digest::error::{CollectionError, CollectionErrorKind, DeliveryError, Source};
use daily_digest::mail::{EmailSender, MailTransport};
use daily_digest::model::{ChangeKind, IssueChange, PageChange};
use daily_digest::pipeline::DigestPipeline;
use daily_digest::render::EmailRenderer;
use daily_digest::window::TimeWindow;

pub const RECIPIENT: &str = "team@acme.test";

/// Run time whose window is `[2024-01-01T00:00Z, 2024-01-02T00:00Z)`.
pub fn run_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()
}

pub fn issue(project: &str, key: &str, hour: u32) -> IssueChange {
    IssueChange {
        project_key: project.to_string(),
        project_name: format!("{project} Project"),
        issue_key: key.to_string(),
        summary: format!("Summary of {key}"),
        issue_type: "Task".to_string(),
        status: "Open".to_string(),
        assignee: "Alice".to_string(),
        change_kind: ChangeKind::Created,
        detail: None,
        timestamp: Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap(),
        url: format!("https://jira.acme.test/browse/{key}"),
    }
}

pub fn page(space: &str, id: &str, title: &str, hour: u32) -> PageChange {
    PageChange {
        space_key: space.to_string(),
        space_name: format!("{space} Space"),
        page_id: id.to_string(),
        page_title: title.to_string(),
        last_editor: "Bob".to_string(),
        version: Some(2),
        timestamp: Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap(),
        url: format!("https://wiki.acme.test/pages/viewpage.action?pageId={id}"),
    }
}

pub fn unauthorized(source: Source) -> CollectionError {
    CollectionError::new(
        source,
        CollectionErrorKind::Unauthorized {
            status: 401,
            message: "token revoked".to_string(),
        },
    )
}

/// Issue source returning canned events, honoring the project filter.
pub enum StubIssues {
    Ok(Vec<IssueChange>),
    Fail,
    Hang,
}

#[async_trait]
impl IssueSource for StubIssues {
    async fn collect(
        &self,
        window: TimeWindow,
        project_filter: &[String],
    ) -> Result<Vec<IssueChange>, CollectionError> {
        match self {
            Self::Ok(changes) => Ok(changes
                .iter()
                .filter(|c| window.contains(c.timestamp))
                .filter(|c| project_filter.is_empty() || project_filter.contains(&c.project_key))
                .cloned()
                .collect()),
            Self::Fail => Err(unauthorized(Source::Jira)),
            Self::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(Vec::new())
            }
        }
    }
}

/// Page source returning canned edits, honoring the space filter.
pub enum StubPages {
    Ok(Vec<PageChange>),
    Fail,
}

#[async_trait]
impl PageSource for StubPages {
    async fn collect(
        &self,
        window: TimeWindow,
        space_filter: &[String],
    ) -> Result<Vec<PageChange>, CollectionError> {
        match self {
            Self::Ok(pages) => Ok(pages
                .iter()
                .filter(|p| window.contains(p.timestamp))
                .filter(|p| space_filter.is_empty() || space_filter.contains(&p.space_key))
                .cloned()
                .collect()),
            Self::Fail => Err(unauthorized(Source::Confluence)),
        }
    }
}

/// A delivered message, decoded enough for assertions.
#[derive(Debug, Clone)]
pub struct Sent {
    pub to: Vec<String>,
    pub raw: String,
}

/// Transport that records messages instead of sending them.
#[derive(Default)]
pub struct RecordingTransport {
    pub sent: Mutex<Vec<Sent>>,
}

impl RecordingTransport {
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailTransport for RecordingTransport {
    async fn deliver(&self, message: Message) -> Result<(), DeliveryError> {
        let to = message
            .envelope()
            .to()
            .iter()
            .map(ToString::to_string)
            .collect();
        let raw = String::from_utf8_lossy(&message.formatted()).into_owned();
        self.sent.lock().unwrap().push(Sent { to, raw });
        Ok(())
    }

    async fn check(&self) -> Result<(), DeliveryError> {
        Ok(())
    }
}

/// Transport whose server rejects our credentials.
pub struct RejectingTransport;

#[async_trait]
impl MailTransport for RejectingTransport {
    async fn deliver(&self, _message: Message) -> Result<(), DeliveryError> {
        Err(DeliveryError::Authentication(
            "permanent error (535): 5.7.8 Username and Password not accepted".to_string(),
        ))
    }

    async fn check(&self) -> Result<(), DeliveryError> {
        Err(DeliveryError::Authentication("535".to_string()))
    }
}

pub fn pipeline(
    issues: StubIssues,
    pages: StubPages,
    transport: Arc<dyn MailTransport>,
) -> DigestPipeline {
    DigestPipeline::new(
        Arc::new(issues),
        Arc::new(pages),
        EmailRenderer::new(chrono_tz::UTC).unwrap(),
        EmailSender::with_transport("digest@acme.test", transport),
        RECIPIENT,
    )
}
