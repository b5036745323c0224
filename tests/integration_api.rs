#![allow(clippy::unwrap_used, clippy::panic, clippy::todo, clippy::missing_panics_doc, clippy::must_use_candidate, missing_debug_implementations, clippy::clone_on_ref_ptr, clippy::items_after_statements, unreachable_pub, clippy::print_stdout, clippy::similar_names)]
use axum::http::StatusCode;
use courier_server::domain::{MailStatus, RelayEndpoint};
use serde_json::json;

mod common;

fn relays() -> Vec<RelayEndpoint> {
    vec![RelayEndpoint::new("primary", "smtp.example.com", 587).with_priority(10)]
}

#[tokio::test]
async fn test_post_mail_returns_accepted_with_id() {
    let app = common::TestApp::spawn(relays()).await;

    let resp = app
        .client
        .post(format!("{}/v1/mail", app.server_url))
        .json(&json!({ "to": "rcpt@example.com", "subject": "Hello", "body": "Hi", "toName": "Rcpt" }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    assert!(resp.headers().contains_key("x-request-id"));
    let body: serde_json::Value = resp.json().await.unwrap();
    let id: uuid::Uuid = body["id"].as_str().unwrap().parse().unwrap();

    let resp = app.client.get(format!("{}/v1/mail/{id}", app.server_url)).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let task: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(task["status"], "SENT");
    assert_eq!(task["toName"], "Rcpt");
    assert_eq!(task["from"], "noreply@courier.test");
}

#[tokio::test]
async fn test_unknown_relay_is_not_found() {
    let app = common::TestApp::spawn(relays()).await;
    let missing = uuid::Uuid::now_v7();

    let resp = app
        .client
        .post(format!("{}/v1/mail", app.server_url))
        .json(&json!({ "to": "rcpt@example.com", "subject": "Hi", "body": "x", "relayId": missing }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains(&missing.to_string()));
    assert!(app.store.is_empty());
}

#[tokio::test]
async fn test_blank_subject_is_bad_request() {
    let app = common::TestApp::spawn(relays()).await;

    let resp = app
        .client
        .post(format!("{}/v1/mail", app.server_url))
        .json(&json!({ "to": "rcpt@example.com", "subject": "  ", "body": "x" }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_bad_attachment_encoding_is_bad_request() {
    let app = common::TestApp::spawn(relays()).await;

    let resp = app
        .client
        .post(format!("{}/v1/mail", app.server_url))
        .json(&json!({
            "to": "rcpt@example.com",
            "subject": "Files",
            "body": "x",
            "attachments": [{ "name": "a.bin", "mimeType": "application/octet-stream", "content": "%%%" }]
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_scheduled_mail_is_listed_as_pending() {
    let app = common::TestApp::spawn(relays()).await;

    let resp = app
        .client
        .post(format!("{}/v1/mail", app.server_url))
        .json(&json!({
            "to": "rcpt@example.com",
            "subject": "Reminder",
            "body": "x",
            "scheduledAt": "2099-01-01T00:00:00Z"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);

    let resp = app.client.get(format!("{}/v1/mail/pending", app.server_url)).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let pending: Vec<serde_json::Value> = resp.json().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0]["subject"], "Reminder");
    assert_eq!(pending[0]["status"], "PENDING");
}

#[tokio::test]
async fn test_resend_endpoint_redelivers() {
    let app = common::TestApp::spawn(relays()).await;
    app.transport.set_behavior(common::Behavior::Reject);

    let resp = app
        .client
        .post(format!("{}/v1/mail", app.server_url))
        .json(&json!({ "to": "rcpt@example.com", "subject": "Retry", "body": "x" }))
        .send()
        .await
        .unwrap();
    let id: uuid::Uuid = resp.json::<serde_json::Value>().await.unwrap()["id"].as_str().unwrap().parse().unwrap();

    app.transport.set_behavior(common::Behavior::Accept);
    let resp = app.client.post(format!("{}/v1/mail/{id}/resend", app.server_url)).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["dispatched"], true);

    use courier_server::core::TaskStore;
    assert_eq!(app.store.find_by_id(id).await.unwrap().unwrap().status, MailStatus::Sent);
}

#[tokio::test]
async fn test_unknown_task_is_not_found() {
    let app = common::TestApp::spawn(relays()).await;

    let resp = app.client.get(format!("{}/v1/mail/{}", app.server_url, uuid::Uuid::now_v7())).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp =
        app.client.post(format!("{}/v1/mail/{}/resend", app.server_url, uuid::Uuid::now_v7())).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_health_probes_without_external_dependencies() {
    let app = common::TestApp::spawn(relays()).await;

    let resp = app.client.get(format!("{}/livez", app.mgmt_url)).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app.client.get(format!("{}/readyz", app.mgmt_url)).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database"], "disabled");
    assert_eq!(body["queue"], "disabled");
}

#[tokio::test]
async fn test_server_file_attachment_is_rejected() {
    let app = common::TestApp::spawn(relays()).await;

    let resp = app
        .client
        .post(format!("{}/v1/mail", app.server_url))
        .json(&json!({
            "to": "rcpt@example.com",
            "subject": "Files",
            "body": "x",
            "attachments": [{ "name": "passwd.txt", "mimeType": "text/plain", "path": "/etc/passwd" }]
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(app.store.is_empty());
    assert!(app.transport.deliveries().is_empty());
}

#[tokio::test]
async fn test_resend_of_sent_mail_conflicts() {
    let app = common::TestApp::spawn(relays()).await;

    let resp = app
        .client
        .post(format!("{}/v1/mail", app.server_url))
        .json(&json!({ "to": "rcpt@example.com", "subject": "Once", "body": "x" }))
        .send()
        .await
        .unwrap();
    let id: uuid::Uuid = resp.json::<serde_json::Value>().await.unwrap()["id"].as_str().unwrap().parse().unwrap();

    let resp = app.client.post(format!("{}/v1/mail/{id}/resend", app.server_url)).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    assert_eq!(app.transport.deliveries().len(), 1);
}
