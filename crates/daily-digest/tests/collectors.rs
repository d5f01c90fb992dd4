//! Collector tests against mocked Jira and Confluence REST APIs.

use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde_json::json;
use wiremock::matchers::{header, method, path, path_regex, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

use daily_digest::collectors::jira::SEARCH_PATH;
use daily_digest::collectors::{ConfluenceCollector, IssueSource, JiraCollector, PageSource};
use daily_digest::config::{AtlassianConfig, Secret};
use daily_digest::{compute_window, ChangeKind, CollectionErrorKind, Source, TimeWindow};

const BASIC_AUTH: &str = "Basic Ym90OnRva2Vu";

fn window() -> TimeWindow {
    compute_window(
        Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
        chrono::Duration::hours(24),
    )
}

fn atlassian(base_url: String) -> AtlassianConfig {
    AtlassianConfig {
        base_url,
        username: "bot".to_string(),
        api_token: Secret::new("token"),
        filter: Vec::new(),
    }
}

fn jira_issue(key: &str, project: &str, created: &str, updated: &str) -> serde_json::Value {
    json!({
        "key": key,
        "fields": {
            "summary": format!("Summary of {key}"),
            "status": { "name": "In Progress" },
            "assignee": { "displayName": "Alice" },
            "project": { "key": project, "name": format!("{project} Project") },
            "issuetype": { "name": "Task" },
            "created": created,
            "updated": updated
        }
    })
}

async fn mount_empty_details(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path_regex(r"^/rest/api/2/issue/[A-Z]+-\d+/changelog$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total": 0, "isLast": true, "values": []
        })))
        .with_priority(10)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/rest/api/2/issue/[A-Z]+-\d+/comment$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total": 0, "comments": []
        })))
        .with_priority(10)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_jira_drains_every_page_and_orders_events() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .and(query_param_is_missing("nextPageToken"))
        .and(query_param("maxResults", "2"))
        .and(header("authorization", BASIC_AUTH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "nextPageToken": "page-2",
            "isLast": false,
            "issues": [
                jira_issue("PROJ-1", "PROJ", "2024-01-01T09:00:00.000+0000", "2024-01-01T12:00:00.000+0000"),
                jira_issue("PROJ-2", "PROJ", "2023-12-01T09:00:00.000+0000", "2024-01-01T13:00:00.000+0000")
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .and(query_param("nextPageToken", "page-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "isLast": true,
            "issues": [
                jira_issue("OPS-7", "OPS", "2024-01-01T08:00:00.000+0000", "2024-01-01T08:00:00.000+0000")
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/api/2/issue/PROJ-1/changelog"))
        .and(query_param("startAt", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total": 2,
            "isLast": false,
            "values": [{
                "created": "2024-01-01T10:00:00.000+0000",
                "items": [
                    { "field": "status", "fromString": "Open", "toString": "In Progress" },
                    { "field": "labels", "fromString": "", "toString": "backend" }
                ]
            }]
        })))
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/api/2/issue/PROJ-1/changelog"))
        .and(query_param("startAt", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total": 2,
            "isLast": true,
            "values": [{
                "created": "2024-01-01T11:00:00.000+0000",
                "items": [
                    { "field": "assignee", "fromString": null, "toString": "Alice" }
                ]
            }]
        })))
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/api/2/issue/PROJ-1/comment"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total": 1,
            "comments": [{
                "author": { "displayName": "Carol" },
                "body": "Looks\n\ngood",
                "created": "2024-01-01T12:00:00.000+0000"
            }]
        })))
        .with_priority(1)
        .mount(&server)
        .await;
    mount_empty_details(&server).await;

    let collector = JiraCollector::new(&atlassian(server.uri()), Duration::from_secs(5))
        .unwrap()
        .with_page_size(2);

    let changes = collector.collect(window(), &[]).await.unwrap();

    let summary: Vec<_> = changes
        .iter()
        .map(|c| (c.issue_key.as_str(), c.change_kind))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("OPS-7", ChangeKind::Created),
            ("PROJ-1", ChangeKind::Created),
            ("PROJ-1", ChangeKind::StatusChanged),
            ("PROJ-1", ChangeKind::Assigned),
            ("PROJ-1", ChangeKind::Commented),
        ]
    );
    assert_eq!(changes[2].detail.as_deref(), Some("Open → In Progress"));
    assert_eq!(changes[3].detail.as_deref(), Some("Unassigned → Alice"));
    assert_eq!(changes[4].detail.as_deref(), Some("Carol: Looks good"));
    assert_eq!(changes[1].url, format!("{}/browse/PROJ-1", server.uri()));
    assert_eq!(changes[1].project_name, "PROJ Project");
}

#[tokio::test]
async fn test_jira_project_filter_applies_client_side() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "isLast": true,
            "issues": [
                jira_issue("PROJ-1", "PROJ", "2024-01-01T09:00:00.000+0000", "2024-01-01T09:00:00.000+0000"),
                jira_issue("OTHER-1", "OTHER", "2024-01-01T09:30:00.000+0000", "2024-01-01T09:30:00.000+0000")
            ]
        })))
        .mount(&server)
        .await;
    mount_empty_details(&server).await;

    let collector =
        JiraCollector::new(&atlassian(server.uri()), Duration::from_secs(5)).unwrap();

    let changes = collector
        .collect(window(), &["PROJ".to_string()])
        .await
        .unwrap();

    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].project_key, "PROJ");
}

#[tokio::test]
async fn test_jira_issue_repeated_across_pages_is_collected_once() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .and(query_param_is_missing("nextPageToken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "nextPageToken": "page-2",
            "isLast": false,
            "issues": [
                jira_issue("PROJ-1", "PROJ", "2024-01-01T09:00:00.000+0000", "2024-01-01T09:00:00.000+0000"),
                jira_issue("PROJ-2", "PROJ", "2024-01-01T10:00:00.000+0000", "2024-01-01T10:00:00.000+0000")
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .and(query_param("nextPageToken", "page-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "isLast": true,
            "issues": [
                jira_issue("PROJ-1", "PROJ", "2024-01-01T09:00:00.000+0000", "2024-01-01T14:00:00.000+0000")
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/api/2/issue/PROJ-1/changelog"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total": 0, "isLast": true, "values": []
        })))
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    mount_empty_details(&server).await;

    let collector = JiraCollector::new(&atlassian(server.uri()), Duration::from_secs(5))
        .unwrap()
        .with_page_size(2);

    let changes = collector.collect(window(), &[]).await.unwrap();

    let keys: Vec<_> = changes.iter().map(|c| c.issue_key.as_str()).collect();
    assert_eq!(keys, vec!["PROJ-1", "PROJ-2"]);
}

#[tokio::test]
async fn test_jira_query_bound_is_relative() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "isLast": true,
            "issues": []
        })))
        .expect(1)
        .mount(&server)
        .await;

    let collector = JiraCollector::new(&atlassian(server.uri()), Duration::from_secs(5)).unwrap();
    collector.collect(window(), &[]).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let jql = requests[0]
        .url
        .query_pairs()
        .find(|(name, _)| name == "jql")
        .map(|(_, value)| value.into_owned())
        .unwrap();
    assert!(jql.contains("updated >= \"-"));
    assert!(jql.ends_with("ORDER BY key ASC"));
    assert!(!jql.contains("2024/"));
}

#[tokio::test]
async fn test_jira_unauthorized_is_typed() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_string("Client must be authenticated"))
        .mount(&server)
        .await;

    let collector =
        JiraCollector::new(&atlassian(server.uri()), Duration::from_secs(5)).unwrap();

    let err = collector.collect(window(), &[]).await.unwrap_err();

    assert_eq!(err.system, Source::Jira);
    match err.kind {
        CollectionErrorKind::Unauthorized { status, message } => {
            assert_eq!(status, 401);
            assert!(message.contains("authenticated"));
        }
        other => panic!("unexpected error kind: {other}"),
    }
}

#[tokio::test]
async fn test_jira_rate_limit_and_server_errors() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "30"))
        .mount(&server)
        .await;

    let collector =
        JiraCollector::new(&atlassian(server.uri()), Duration::from_secs(5)).unwrap();
    let err = collector.collect(window(), &[]).await.unwrap_err();
    assert!(matches!(err.kind, CollectionErrorKind::RateLimited { .. }));
    assert!(err.to_string().contains("retry after 30s"));

    server.reset().await;
    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;
    let err = collector.collect(window(), &[]).await.unwrap_err();
    assert!(matches!(err.kind, CollectionErrorKind::Decode(_)));
}

fn confluence_page(id: &str, space: &str, when: &str, editor: &str) -> serde_json::Value {
    json!({
        "id": id,
        "title": format!("Page {id}"),
        "space": { "key": space, "name": format!("{space} Space") },
        "version": {
            "number": 3,
            "when": when,
            "by": { "displayName": editor }
        }
    })
}

#[tokio::test]
async fn test_confluence_follows_next_links() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/api/content/search"))
        .and(query_param("start", "0"))
        .and(header("authorization", BASIC_AUTH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [
                confluence_page("100", "ENG", "2024-01-01T15:00:00.000Z", "Dana"),
                confluence_page("101", "HR", "2024-01-01T09:00:00.000Z", "Eli")
            ],
            "start": 0,
            "limit": 2,
            "size": 2,
            "_links": { "next": "/rest/api/content/search?start=2" }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/api/content/search"))
        .and(query_param("start", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [
                confluence_page("102", "ENG", "2024-01-01T11:00:00.000Z", "Fay")
            ],
            "start": 2,
            "limit": 2,
            "size": 1,
            "_links": {}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let collector =
        ConfluenceCollector::new(&atlassian(server.uri()), Duration::from_secs(5))
            .unwrap()
            .with_page_size(2);

    let pages = collector.collect(window(), &[]).await.unwrap();

    let ids: Vec<_> = pages.iter().map(|p| p.page_id.as_str()).collect();
    assert_eq!(ids, vec!["101", "102", "100"]);
    assert_eq!(pages[2].last_editor, "Dana");
    assert_eq!(pages[2].version, Some(3));
}

#[tokio::test]
async fn test_confluence_space_filter_and_errors() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/api/content/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [
                confluence_page("100", "ENG", "2024-01-01T15:00:00.000Z", "Dana"),
                confluence_page("101", "HR", "2024-01-01T09:00:00.000Z", "Eli")
            ],
            "start": 0,
            "limit": 50,
            "size": 2,
            "_links": {}
        })))
        .mount(&server)
        .await;

    let collector =
        ConfluenceCollector::new(&atlassian(server.uri()), Duration::from_secs(5))
            .unwrap();

    let pages = collector
        .collect(window(), &["ENG".to_string()])
        .await
        .unwrap();
    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].space_key, "ENG");

    server.reset().await;
    Mock::given(method("GET"))
        .and(path("/rest/api/content/search"))
        .respond_with(ResponseTemplate::new(503).set_body_string("down"))
        .mount(&server)
        .await;

    let err = collector.collect(window(), &[]).await.unwrap_err();
    assert_eq!(err.system, Source::Confluence);
    assert!(matches!(
        err.kind,
        CollectionErrorKind::Status { status: 503, .. }
    ));
}
