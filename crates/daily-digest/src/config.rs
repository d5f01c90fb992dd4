//! Process-wide configuration, loaded once from the environment.
//!
//! # Required Environment Variables
//! - `JIRA_URL`, `JIRA_USERNAME`, `JIRA_API_TOKEN`
//! - `CONFLUENCE_URL`, `CONFLUENCE_USERNAME`, `CONFLUENCE_API_TOKEN`
//! - `SMTP_HOST`, `SMTP_USERNAME`, `SMTP_PASSWORD`
//! - `RECIPIENT_EMAIL`
//!
//! # Optional Environment Variables
//! - `SMTP_PORT` (default: 587), `SMTP_SECURITY` (`starttls` | `tls` | `none`),
//!   `SMTP_FROM` (default: `SMTP_USERNAME`)
//! - `SCHEDULE_TIME` (default: `07:00`), `TIMEZONE` (default: `Europe/Berlin`)
//! - `JIRA_PROJECTS`, `CONFLUENCE_SPACES`: comma-separated key filters
//! - `DIGEST_LOOKBACK_HOURS` (default: 24)
//! - `HTTP_TIMEOUT_SECS` (default: 30), `COLLECTOR_TIMEOUT_SECS` (default: 120),
//!   `SMTP_TIMEOUT_SECS` (default: 30)
//! - `PORT` (default: 8080), `TRIGGER_TOKEN`

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::NaiveTime;
use chrono_tz::Tz;
use tracing::info;

use crate::error::ConfigError;
use crate::window::DEFAULT_LOOKBACK_HOURS;

/// Default SMTP port (STARTTLS submission).
pub const DEFAULT_SMTP_PORT: u16 = 587;

/// Default daily send time.
pub const DEFAULT_SCHEDULE_TIME: &str = "07:00";

/// Default timezone for the schedule and rendered timestamps.
pub const DEFAULT_TIMEZONE: &str = "Europe/Berlin";

/// Default HTTP port for the trigger endpoint.
pub const DEFAULT_PORT: u16 = 8080;

const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
const DEFAULT_COLLECTOR_TIMEOUT_SECS: u64 = 120;
const DEFAULT_SMTP_TIMEOUT_SECS: u64 = 30;

/// A credential that never shows up in `Debug` output or logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Connection settings for one Atlassian product.
#[derive(Debug, Clone)]
pub struct AtlassianConfig {
    /// Base URL without trailing slash.
    pub base_url: String,
    pub username: String,
    pub api_token: Secret,
    /// Project keys (Jira) or space keys (Confluence); empty means everything.
    pub filter: Vec<String>,
}

/// How the SMTP session is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpSecurity {
    /// Plain connection upgraded with STARTTLS.
    StartTls,
    /// Implicit TLS from the first byte (usually port 465).
    Tls,
    /// No encryption. Only for local relays and tests.
    None,
}

impl FromStr for SmtpSecurity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "starttls" => Ok(Self::StartTls),
            "tls" | "ssl" => Ok(Self::Tls),
            "none" | "plain" => Ok(Self::None),
            other => Err(format!("expected starttls, tls or none, got {other:?}")),
        }
    }
}

/// SMTP delivery settings.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: Secret,
    /// Sender address (defaults to the username).
    pub from: String,
    pub security: SmtpSecurity,
    pub timeout: Duration,
}

/// When the in-process scheduler fires.
#[derive(Debug, Clone, Copy)]
pub struct ScheduleConfig {
    pub time: NaiveTime,
    pub timezone: Tz,
}

/// Trigger endpoint settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Bearer token required on `POST /run-digest`, when set.
    pub trigger_token: Option<Secret>,
}

/// Immutable configuration shared by every component.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub jira: AtlassianConfig,
    pub confluence: AtlassianConfig,
    pub smtp: SmtpConfig,
    pub recipient: String,
    pub schedule: ScheduleConfig,
    pub lookback: chrono::Duration,
    /// Per-request timeout for vendor API calls.
    pub http_timeout: Duration,
    /// Overall budget for one collector.
    pub collector_timeout: Duration,
    pub server: ServerConfig,
}

impl AppConfig {
    /// Load configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self::from_lookup(|name| std::env::var(name).ok())?;
        info!(
            jira = %config.jira.base_url,
            confluence = %config.confluence.base_url,
            smtp_host = %config.smtp.host,
            timezone = %config.schedule.timezone,
            "Configuration validated successfully"
        );
        Ok(config)
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Every missing required variable is reported in a single error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let mut missing = Vec::new();
        let mut require = |name: &'static str| {
            get(name).unwrap_or_else(|| {
                missing.push(name);
                String::new()
            })
        };

        let jira_url = require("JIRA_URL");
        let jira_username = require("JIRA_USERNAME");
        let jira_token = require("JIRA_API_TOKEN");
        let confluence_url = require("CONFLUENCE_URL");
        let confluence_username = require("CONFLUENCE_USERNAME");
        let confluence_token = require("CONFLUENCE_API_TOKEN");
        let smtp_host = require("SMTP_HOST");
        let smtp_username = require("SMTP_USERNAME");
        let smtp_password = require("SMTP_PASSWORD");
        let recipient = require("RECIPIENT_EMAIL");

        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        let smtp_port = parse_or("SMTP_PORT", get("SMTP_PORT"), DEFAULT_SMTP_PORT)?;
        let security = parse_or("SMTP_SECURITY", get("SMTP_SECURITY"), SmtpSecurity::StartTls)?;
        let from = get("SMTP_FROM").unwrap_or_else(|| smtp_username.clone());

        let time = match get("SCHEDULE_TIME") {
            Some(raw) => parse_schedule_time(&raw)?,
            None => parse_schedule_time(DEFAULT_SCHEDULE_TIME)?,
        };
        let timezone_name = get("TIMEZONE").unwrap_or_else(|| DEFAULT_TIMEZONE.to_string());
        let timezone: Tz = timezone_name.parse().map_err(|e| ConfigError::Invalid {
            var: "TIMEZONE",
            message: format!("{e}"),
        })?;

        let lookback_hours: i64 = parse_or(
            "DIGEST_LOOKBACK_HOURS",
            get("DIGEST_LOOKBACK_HOURS"),
            DEFAULT_LOOKBACK_HOURS,
        )?;
        if lookback_hours <= 0 {
            return Err(ConfigError::Invalid {
                var: "DIGEST_LOOKBACK_HOURS",
                message: "must be a positive number of hours".to_string(),
            });
        }

        let http_timeout = parse_or(
            "HTTP_TIMEOUT_SECS",
            get("HTTP_TIMEOUT_SECS"),
            DEFAULT_HTTP_TIMEOUT_SECS,
        )?;
        let collector_timeout = parse_or(
            "COLLECTOR_TIMEOUT_SECS",
            get("COLLECTOR_TIMEOUT_SECS"),
            DEFAULT_COLLECTOR_TIMEOUT_SECS,
        )?;
        let smtp_timeout = parse_or(
            "SMTP_TIMEOUT_SECS",
            get("SMTP_TIMEOUT_SECS"),
            DEFAULT_SMTP_TIMEOUT_SECS,
        )?;
        let port = parse_or("PORT", get("PORT"), DEFAULT_PORT)?;

        Ok(Self {
            jira: AtlassianConfig {
                base_url: trim_base_url(&jira_url),
                username: jira_username,
                api_token: Secret::new(jira_token),
                filter: split_keys(get("JIRA_PROJECTS").as_deref()),
            },
            confluence: AtlassianConfig {
                base_url: trim_base_url(&confluence_url),
                username: confluence_username,
                api_token: Secret::new(confluence_token),
                filter: split_keys(get("CONFLUENCE_SPACES").as_deref()),
            },
            smtp: SmtpConfig {
                host: smtp_host,
                port: smtp_port,
                username: smtp_username,
                password: Secret::new(smtp_password),
                from,
                security,
                timeout: Duration::from_secs(smtp_timeout),
            },
            recipient,
            schedule: ScheduleConfig { time, timezone },
            lookback: chrono::Duration::hours(lookback_hours),
            http_timeout: Duration::from_secs(http_timeout),
            collector_timeout: Duration::from_secs(collector_timeout),
            server: ServerConfig {
                port,
                trigger_token: get("TRIGGER_TOKEN").map(Secret::new),
            },
        })
    }
}

fn parse_or<T>(var: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match raw {
        Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            message: format!("{value:?}: {e}"),
        }),
        None => Ok(default),
    }
}

/// Parse an `HH:MM` wall-clock time.
pub fn parse_schedule_time(raw: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M").map_err(|e| ConfigError::Invalid {
        var: "SCHEDULE_TIME",
        message: format!("{raw:?} is not HH:MM ({e})"),
    })
}

/// Split a comma-separated key list, dropping blanks.
#[must_use]
pub fn split_keys(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(String::from)
            .collect()
    })
    .unwrap_or_default()
}

fn trim_base_url(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}
