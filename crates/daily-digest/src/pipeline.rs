//! One digest run: window, collection, assembly, rendering, delivery.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::assembler::assemble_outcomes;
use crate::collectors::{ConfluenceCollector, IssueSource, JiraCollector, PageSource};
use crate::config::AppConfig;
use crate::error::{CollectionError, RunError, Source};
use crate::mail::EmailSender;
use crate::render::EmailRenderer;
use crate::window::{compute_window, TimeWindow};

/// Summary of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub window: TimeWindow,
    pub subject: String,
    pub issue_count: usize,
    pub page_count: usize,
    pub project_count: usize,
    pub space_count: usize,
    /// Sources reported as unavailable in the email.
    pub unavailable: Vec<Source>,
}

/// Wires collectors, renderer and sender into a single run.
#[derive(Clone)]
pub struct DigestPipeline {
    issues: Arc<dyn IssueSource>,
    pages: Arc<dyn PageSource>,
    renderer: Arc<EmailRenderer>,
    sender: EmailSender,
    recipient: String,
    project_filter: Vec<String>,
    space_filter: Vec<String>,
    lookback: chrono::Duration,
    collector_timeout: Duration,
}

impl DigestPipeline {
    pub fn new(
        issues: Arc<dyn IssueSource>,
        pages: Arc<dyn PageSource>,
        renderer: EmailRenderer,
        sender: EmailSender,
        recipient: impl Into<String>,
    ) -> Self {
        Self {
            issues,
            pages,
            renderer: Arc::new(renderer),
            sender,
            recipient: recipient.into(),
            project_filter: Vec::new(),
            space_filter: Vec::new(),
            lookback: chrono::Duration::hours(crate::window::DEFAULT_LOOKBACK_HOURS),
            collector_timeout: Duration::from_secs(120),
        }
    }

    /// Build the production pipeline from configuration.
    pub fn from_config(config: &AppConfig, renderer: EmailRenderer) -> anyhow::Result<Self> {
        let jira = JiraCollector::new(&config.jira, config.http_timeout)?;
        let confluence = ConfluenceCollector::new(&config.confluence, config.http_timeout)?;
        let sender = EmailSender::new(&config.smtp)?;

        Ok(Self::new(
            Arc::new(jira),
            Arc::new(confluence),
            renderer,
            sender,
            config.recipient.clone(),
        )
        .with_filters(config.jira.filter.clone(), config.confluence.filter.clone())
        .with_lookback(config.lookback)
        .with_collector_timeout(config.collector_timeout))
    }

    #[must_use]
    pub fn with_filters(mut self, projects: Vec<String>, spaces: Vec<String>) -> Self {
        self.project_filter = projects;
        self.space_filter = spaces;
        self
    }

    #[must_use]
    pub fn with_lookback(mut self, lookback: chrono::Duration) -> Self {
        self.lookback = lookback;
        self
    }

    #[must_use]
    pub fn with_collector_timeout(mut self, timeout: Duration) -> Self {
        self.collector_timeout = timeout;
        self
    }

    /// Run once for the window ending at `now`.
    ///
    /// Both collectors run concurrently. One failed source is reported in
    /// the email; if both fail nothing is sent.
    #[instrument(skip(self), fields(run_id = tracing::field::Empty))]
    pub async fn run(&self, now: DateTime<Utc>) -> Result<RunReport, RunError> {
        let run_id = Uuid::new_v4();
        tracing::Span::current().record("run_id", tracing::field::display(run_id));

        let window = compute_window(now, self.lookback);
        info!(start = %window.start, end = %window.end, "Starting digest run");

        let (issues, pages) = tokio::join!(
            bounded(
                Source::Jira,
                self.collector_timeout,
                self.issues.collect(window, &self.project_filter),
            ),
            bounded(
                Source::Confluence,
                self.collector_timeout,
                self.pages.collect(window, &self.space_filter),
            ),
        );

        if let (Err(jira), Err(confluence)) = (&issues, &pages) {
            warn!(jira = %jira, confluence = %confluence, "Both sources failed, skipping email");
            return Err(RunError::AllSourcesUnavailable(format!("{jira}; {confluence}")));
        }

        let digest = assemble_outcomes(window, issues, pages);
        let email = self.renderer.render(&digest)?;

        self.sender
            .try_send(&self.recipient, &email.subject, &email.html, &email.text)
            .await?;

        let report = RunReport {
            run_id,
            window,
            subject: email.subject,
            issue_count: digest.issue_count(),
            page_count: digest.page_count(),
            project_count: digest.issues_by_project.len(),
            space_count: digest.pages_by_space.len(),
            unavailable: digest.unavailable.iter().map(|f| f.source).collect(),
        };
        info!(
            issues = report.issue_count,
            pages = report.page_count,
            unavailable = report.unavailable.len(),
            "Digest run complete"
        );
        Ok(report)
    }
}

async fn bounded<T, F>(source: Source, limit: Duration, fut: F) -> Result<T, CollectionError>
where
    F: Future<Output = Result<T, CollectionError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(CollectionError::timeout(source, limit.as_secs())),
    }
}
