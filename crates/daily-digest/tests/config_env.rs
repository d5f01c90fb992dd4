//! Loading configuration from the real process environment.

use serial_test::serial;

use daily_digest::config::{AppConfig, SmtpSecurity};
use daily_digest::error::ConfigError;

const REQUIRED: &[(&str, &str)] = &[
    ("JIRA_URL", "https://acme.atlassian.net"),
    ("JIRA_USERNAME", "bot@acme.test"),
    ("JIRA_API_TOKEN", "jira-token"),
    ("CONFLUENCE_URL", "https://acme.atlassian.net/wiki/"),
    ("CONFLUENCE_USERNAME", "bot@acme.test"),
    ("CONFLUENCE_API_TOKEN", "wiki-token"),
    ("SMTP_HOST", "smtp.acme.test"),
    ("SMTP_USERNAME", "digest@acme.test"),
    ("SMTP_PASSWORD", "hunter2"),
    ("RECIPIENT_EMAIL", "team@acme.test"),
];

const OPTIONAL: &[&str] = &[
    "SMTP_PORT",
    "SMTP_SECURITY",
    "SMTP_FROM",
    "SCHEDULE_TIME",
    "TIMEZONE",
    "JIRA_PROJECTS",
    "CONFLUENCE_SPACES",
    "DIGEST_LOOKBACK_HOURS",
    "HTTP_TIMEOUT_SECS",
    "COLLECTOR_TIMEOUT_SECS",
    "SMTP_TIMEOUT_SECS",
    "PORT",
    "TRIGGER_TOKEN",
];

fn clear_env() {
    for (name, _) in REQUIRED {
        std::env::remove_var(name);
    }
    for name in OPTIONAL {
        std::env::remove_var(name);
    }
}

fn set_required() {
    for (name, value) in REQUIRED {
        std::env::set_var(name, value);
    }
}

#[test]
#[serial]
fn test_from_env_with_overrides() {
    clear_env();
    set_required();
    std::env::set_var("SMTP_PORT", "465");
    std::env::set_var("SMTP_SECURITY", "tls");
    std::env::set_var("SCHEDULE_TIME", "06:30");
    std::env::set_var("TIMEZONE", "America/New_York");
    std::env::set_var("CONFLUENCE_SPACES", "ENG,OPS");
    std::env::set_var("TRIGGER_TOKEN", "s3cret");

    let config = AppConfig::from_env().unwrap();

    assert_eq!(config.confluence.base_url, "https://acme.atlassian.net/wiki");
    assert_eq!(config.confluence.filter, vec!["ENG", "OPS"]);
    assert_eq!(config.smtp.port, 465);
    assert_eq!(config.smtp.security, SmtpSecurity::Tls);
    assert_eq!(config.schedule.time.format("%H:%M").to_string(), "06:30");
    assert_eq!(config.schedule.timezone, chrono_tz::America::New_York);
    assert_eq!(
        config.server.trigger_token.as_ref().map(|t| t.expose()),
        Some("s3cret")
    );

    clear_env();
}

#[test]
#[serial]
fn test_from_env_reports_every_missing_variable() {
    clear_env();

    let err = AppConfig::from_env().unwrap_err();

    match err {
        ConfigError::Missing(names) => {
            assert_eq!(names.len(), REQUIRED.len());
            for (name, _) in REQUIRED {
                assert!(names.contains(name), "{name} not reported");
            }
        }
        other => panic!("unexpected error: {other}"),
    }
}
