//! Commands that read the notification feed, proposals and tags.

use std::fs;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::json;
use tempfile::{TempDir, tempdir};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn signed_in(server: &MockServer) -> TempDir {
    let dir = tempdir().unwrap();
    fs::write(
        dir.path().join("credentials.json"),
        json!({"auth_token": "T"}).to_string(),
    )
    .unwrap();

    Mock::given(method("GET"))
        .and(path("/api/auth/me"))
        .and(header("authorization", "Bearer T"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "user": {"id": 1, "name": "Ada", "email": "ada@example.com", "role": "reviewer"},
            "must_verify_email": false
        })))
        .mount(server)
        .await;

    dir
}

#[tokio::test]
async fn test_notifications_list_marks_unread() {
    let server = MockServer::start().await;
    let dir = signed_in(&server).await;

    Mock::given(method("GET"))
        .and(path("/api/notifications"))
        .and(query_param("limit", "5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "items": [
                    {"id": "n2", "type": "ProposalReviewed", "read_at": null,
                     "created_at": "2024-05-01T10:00:00Z", "data": {"message": "New review on your talk"}},
                    {"id": "n1", "type": "ProposalStatusChanged", "read_at": "2024-04-01T10:00:00Z",
                     "created_at": "2024-04-01T09:00:00Z", "data": {"title": "Talk approved"}}
                ],
                "unread": 1
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    cargo_bin_cmd!("cfp")
        .env("CFP_HOME", dir.path())
        .env("CFP_API_BASE_URL", server.uri())
        .args(["notifications", "list", "--limit", "5"])
        .assert()
        .success()
        .stdout(predicate::str::contains("● "))
        .stdout(predicate::str::contains("New review on your talk"))
        .stdout(predicate::str::contains("Talk approved"))
        .stdout(predicate::str::contains("1 unread"));
}

#[tokio::test]
async fn test_notifications_rejected_token_reports_expired_session() {
    let server = MockServer::start().await;
    let dir = signed_in(&server).await;

    Mock::given(method("GET"))
        .and(path("/api/notifications/unread-count"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "Unauthenticated."})))
        .mount(&server)
        .await;

    cargo_bin_cmd!("cfp")
        .env("CFP_HOME", dir.path())
        .env("CFP_API_BASE_URL", server.uri())
        .args(["notifications", "unread"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Session expired"));

    let credentials = fs::read_to_string(dir.path().join("credentials.json")).unwrap_or_default();
    assert!(!credentials.contains("\"T\""));
}

#[tokio::test]
async fn test_watch_without_realtime_key_fails() {
    let server = MockServer::start().await;
    let dir = signed_in(&server).await;

    cargo_bin_cmd!("cfp")
        .env("CFP_HOME", dir.path())
        .env("CFP_API_BASE_URL", server.uri())
        .env_remove("CFP_PUSHER_APP_KEY")
        .args(["notifications", "watch"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Live notifications are not configured"));
}

#[tokio::test]
async fn test_tags_list() {
    let server = MockServer::start().await;
    let dir = signed_in(&server).await;

    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .and(query_param("search", "ru"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 3, "name": "rust"},
            {"id": 9, "name": "ruby"}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    cargo_bin_cmd!("cfp")
        .env("CFP_HOME", dir.path())
        .env("CFP_API_BASE_URL", server.uri())
        .args(["tags", "list", "--search", "ru"])
        .assert()
        .success()
        .stdout(predicate::str::contains("rust"))
        .stdout(predicate::str::contains("ruby"));
}

#[tokio::test]
async fn test_proposal_download_writes_file() {
    let server = MockServer::start().await;
    let dir = signed_in(&server).await;
    let out = dir.path().join("slides.pdf");

    Mock::given(method("GET"))
        .and(path("/api/proposals/12/attachment"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/pdf")
                .insert_header("content-disposition", "attachment; filename=\"talk.pdf\"")
                .set_body_bytes(b"%PDF-1.7".to_vec()),
        )
        .expect(1)
        .mount(&server)
        .await;

    cargo_bin_cmd!("cfp")
        .env("CFP_HOME", dir.path())
        .env("CFP_API_BASE_URL", server.uri())
        .args(["proposals", "download", "12", "--out"])
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("8 bytes"));

    assert_eq!(fs::read(&out).unwrap(), b"%PDF-1.7");
}
