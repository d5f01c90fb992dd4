//! Daily Jira & Confluence digest.
//!
//! This crate provides:
//! - Time-windowed collection of Jira issue activity and Confluence page edits
//! - Grouping of that activity into a digest by project and space
//! - HTML and plain-text email rendering with Handlebars
//! - SMTP delivery with lettre
//! - An HTTP trigger and a daily scheduler that run the same pipeline

pub mod assembler;
pub mod collectors;
pub mod config;
pub mod error;
pub mod mail;
pub mod model;
pub mod pipeline;
pub mod render;
pub mod scheduler;
pub mod server;
pub mod window;

// Re-export main types
pub use assembler::{assemble, assemble_outcomes};
pub use collectors::{ConfluenceCollector, IssueSource, JiraCollector, PageSource};
pub use config::AppConfig;
pub use error::{CollectionError, CollectionErrorKind, DeliveryError, RenderError, RunError, Source};
pub use mail::{EmailSender, MailTransport};
pub use model::{ChangeKind, DeliveryResult, Digest, Group, IssueChange, PageChange};
pub use pipeline::{DigestPipeline, RunReport};
pub use render::{EmailRenderer, RenderedEmail};
pub use scheduler::next_run_after;
pub use window::{compute_window, TimeWindow};
