mod common;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use chrono::{Duration, Utc};
use serde_json::json;

use common::TestApp;

async fn share(app: &TestApp, token: &str, document_id: &str, body: serde_json::Value) -> (String, String) {
    let resp = app
        .post(&format!("/api/v1/documents/{document_id}/shares"), token, body)
        .await;
    assert_eq!(resp.status, StatusCode::CREATED, "share failed: {}", resp.error());
    let data = resp.data();
    (
        data["id"].as_str().unwrap().to_string(),
        data["token"].as_str().unwrap().to_string(),
    )
}

#[tokio::test]
async fn test_create_share_validation() {
    let app = TestApp::start();
    let (_, token) = app.teacher("mchen", "20001").await;
    let (_, other) = app.teacher("jdoe", "20002").await;
    let id = app.upload(&token, "Handout", "handout.txt", b"read me").await;

    let too_far = (Utc::now() + Duration::days(40)).to_rfc3339();
    let resp = app
        .post(
            &format!("/api/v1/documents/{id}/shares"),
            &token,
            json!({ "expires_at": too_far }),
        )
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);

    let past = (Utc::now() - Duration::hours(1)).to_rfc3339();
    let resp = app
        .post(
            &format!("/api/v1/documents/{id}/shares"),
            &token,
            json!({ "expires_at": past }),
        )
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);

    let resp = app
        .post(
            &format!("/api/v1/documents/{id}/shares"),
            &token,
            json!({ "max_downloads": -1 }),
        )
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);

    // Only the author may share.
    let resp = app
        .post(&format!("/api/v1/documents/{id}/shares"), &other, json!({}))
        .await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);

    let resp = app
        .post(&format!("/api/v1/documents/{id}/shares"), &token, json!({}))
        .await;
    assert_eq!(resp.status, StatusCode::CREATED);
    let data = resp.data();
    let link = data["token"].as_str().unwrap();
    assert_eq!(link.len(), 43);
    assert_eq!(data["url"], format!("/s/{link}"));
    assert_eq!(data["requires_password"], false);
    assert_eq!(data["is_available"], true);
    assert!(data["remaining_downloads"].is_null());
    assert_eq!(data["document_title"], "Handout");
    assert!(data.get("password_hash").is_none());

    let resp = app.get("/api/v1/shares", &token).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.data().as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_public_view_and_download() {
    let app = TestApp::start();
    let (_, token) = app.teacher("mchen", "20001").await;
    let id = app.upload(&token, "Handout", "handout.txt", b"read me").await;
    let (_, link) = share(&app, &token, &id, json!({ "max_downloads": 2 })).await;

    let resp = app.request(Method::GET, &format!("/s/{link}"), None, None).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.data()["title"], "Handout");
    assert_eq!(resp.data()["requires_password"], false);
    assert_eq!(resp.data()["remaining_downloads"], 2);

    let resp = app
        .request(Method::GET, &format!("/s/{link}/download"), None, None)
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(&resp.body[..], b"read me");
    assert!(resp.header("content-disposition").contains("Handout.txt"));

    let resp = app
        .request(Method::GET, &format!("/s/{link}/download"), None, None)
        .await;
    assert_eq!(resp.status, StatusCode::OK);

    let resp = app
        .request(Method::GET, &format!("/s/{link}/download"), None, None)
        .await;
    assert_eq!(resp.status, StatusCode::GONE);
    assert_eq!(resp.error(), "Share link unavailable: download limit reached");

    let resp = app.request(Method::GET, &format!("/s/{link}"), None, None).await;
    assert_eq!(resp.status, StatusCode::GONE);

    let shared = app.store().get_share_by_token(&link).unwrap().unwrap();
    assert_eq!(shared.download_count, 2);

    // Share downloads are not counted against the document itself.
    let document = app.store().get_document(&id).unwrap().unwrap();
    assert_eq!(document.download_count, 0);

    let resp = app
        .request(Method::GET, "/s/no-such-token", None, None)
        .await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_password_protected_share() {
    let app = TestApp::start();
    let (_, token) = app.teacher("mchen", "20001").await;
    let id = app.upload(&token, "Answers", "answers.txt", b"42").await;
    let (_, link) = share(&app, &token, &id, json!({ "password": "open-sesame" })).await;

    let resp = app.request(Method::GET, &format!("/s/{link}"), None, None).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.data()["requires_password"], true);

    let resp = app
        .request(
            Method::POST,
            &format!("/s/{link}/access"),
            None,
            Some(json!({ "password": "guess" })),
        )
        .await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);

    let resp = app
        .request(
            Method::POST,
            &format!("/s/{link}/access"),
            None,
            Some(json!({ "password": "open-sesame" })),
        )
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.data()["access"], true);

    let resp = app
        .request(Method::GET, &format!("/s/{link}/download"), None, None)
        .await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);
    assert_eq!(resp.error(), "Invalid password");

    let request = Request::builder()
        .uri(format!("/s/{link}/download"))
        .header("x-share-password", "open-sesame")
        .body(Body::empty())
        .unwrap();
    let resp = app.send(request).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(&resp.body[..], b"42");

    let resp = app
        .request(
            Method::GET,
            &format!("/s/{link}/download?password=open-sesame"),
            None,
            None,
        )
        .await;
    assert_eq!(resp.status, StatusCode::OK);
}

#[tokio::test]
async fn test_manage_share_links() {
    let app = TestApp::start();
    let (_, token) = app.teacher("mchen", "20001").await;
    let (_, other) = app.teacher("jdoe", "20002").await;
    let id = app.upload(&token, "Handout", "handout.txt", b"read me").await;
    let (share_id, link) = share(&app, &token, &id, json!({})).await;

    let resp = app
        .request(
            Method::POST,
            &format!("/api/v1/shares/{share_id}/disable"),
            Some(&other),
            None,
        )
        .await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);

    let resp = app
        .request(
            Method::POST,
            &format!("/api/v1/shares/{share_id}/disable"),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.data()["is_available"], false);

    let resp = app
        .request(Method::GET, &format!("/s/{link}/download"), None, None)
        .await;
    assert_eq!(resp.status, StatusCode::GONE);
    assert_eq!(resp.error(), "Share link unavailable: disabled");

    let resp = app
        .request(
            Method::POST,
            &format!("/api/v1/shares/{share_id}/enable"),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(resp.status, StatusCode::OK);

    let resp = app.request(Method::GET, &format!("/s/{link}"), None, None).await;
    assert_eq!(resp.status, StatusCode::OK);

    let resp = app
        .request(
            Method::DELETE,
            &format!("/api/v1/shares/{share_id}"),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(resp.status, StatusCode::NO_CONTENT);

    let resp = app.request(Method::GET, &format!("/s/{link}"), None, None).await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_deleting_document_removes_links() {
    let app = TestApp::start();
    let (_, token) = app.teacher("mchen", "20001").await;
    let id = app.upload(&token, "Handout", "handout.txt", b"read me").await;
    let (_, link) = share(&app, &token, &id, json!({})).await;

    let resp = app
        .request(Method::DELETE, &format!("/api/v1/documents/{id}"), Some(&token), None)
        .await;
    assert_eq!(resp.status, StatusCode::NO_CONTENT);

    let resp = app.request(Method::GET, &format!("/s/{link}"), None, None).await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_missing_file_keeps_download_slot() {
    let app = TestApp::start();
    let (_, token) = app.teacher("mchen", "20001").await;
    let id = app.upload(&token, "Handout", "handout.txt", b"read me").await;
    let (_, link) = share(&app, &token, &id, json!({ "max_downloads": 1 })).await;

    std::fs::remove_file(app.state.files.current_path(&id)).unwrap();

    let resp = app
        .request(Method::GET, &format!("/s/{link}/download"), None, None)
        .await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);

    let shared = app.store().get_share_by_token(&link).unwrap().unwrap();
    assert_eq!(shared.download_count, 0);

    let resp = app.request(Method::GET, &format!("/s/{link}"), None, None).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.data()["remaining_downloads"], 1);
}
