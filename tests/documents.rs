mod common;

use axum::http::{Method, StatusCode};
use serde_json::json;

use common::{Part, TestApp};

#[tokio::test]
async fn test_upload_and_read_back() {
    let app = TestApp::start();
    let (teacher, token) = app.teacher("mchen", "20001").await;

    let resp = app
        .multipart(
            "/api/v1/documents",
            &token,
            &[
                Part::Text("title", "Algebra worksheet"),
                Part::Text("description", "Week 3 exercises"),
                Part::Text("is_public", "on"),
                Part::File("algebra.txt", b"x + 1 = 2"),
            ],
        )
        .await;
    assert_eq!(resp.status, StatusCode::CREATED);
    let data = resp.data();
    assert_eq!(data["file_type"], "txt");
    assert_eq!(data["file_size"], 9);
    assert_eq!(data["status"], "draft");
    assert_eq!(data["is_public"], true);
    assert!(data.get("duplicate_of").is_none());
    let id = data["id"].as_str().unwrap().to_string();

    let resp = app.get(&format!("/api/v1/documents/{id}"), &token).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.data()["title"], "Algebra worksheet");
    assert_eq!(resp.data()["author_name"], "mchenTest");
    // Authors do not count as viewers.
    assert_eq!(resp.data()["view_count"], 0);

    let resp = app.get("/api/v1/documents?mine=true", &token).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json()["total"], 1);

    let user = app.store().get_user(&teacher.id).unwrap().unwrap();
    assert_eq!(user.storage_used, 9);

    let versions = app.store().list_versions(&id).unwrap();
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0].version_number, "v1.0");
}

#[tokio::test]
async fn test_upload_rejects_bad_input() {
    let app = TestApp::start();
    let (_, token) = app.teacher("mchen", "20001").await;

    let resp = app
        .multipart(
            "/api/v1/documents",
            &token,
            &[Part::Text("title", "Installer"), Part::File("setup.exe", b"MZ")],
        )
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.error(), "File type 'exe' is not allowed");

    let resp = app
        .multipart(
            "/api/v1/documents",
            &token,
            &[Part::Text("title", "No file")],
        )
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);

    let resp = app
        .multipart(
            "/api/v1/documents",
            &token,
            &[
                Part::Text("title", "Graded"),
                Part::Text("status", "archived"),
                Part::File("notes.md", b"# notes"),
            ],
        )
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);

    // Nothing was stored and nothing is left in staging.
    let resp = app.get("/api/v1/documents?mine=true", &token).await;
    assert_eq!(resp.json()["total"], 0);
    let staging = app.data_dir().join("files").join(".tmp");
    if staging.exists() {
        assert_eq!(std::fs::read_dir(&staging).unwrap().count(), 0);
    }
}

#[tokio::test]
async fn test_quota_is_enforced() {
    let app = TestApp::start();
    let (teacher, token) = app.teacher("mchen", "20001").await;
    let admin = app.admin_token().await;

    let resp = app
        .request(
            Method::PATCH,
            &format!("/api/v1/admin/users/{}", teacher.id),
            Some(&admin),
            Some(json!({ "storage_quota_gb": 0 })),
        )
        .await;
    assert_eq!(resp.status, StatusCode::OK);

    let resp = app
        .multipart(
            "/api/v1/documents",
            &token,
            &[Part::Text("title", "Too big"), Part::File("big.txt", b"hello")],
        )
        .await;
    assert_eq!(resp.status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(resp.error(), "Storage quota exceeded");

    let user = app.store().get_user(&teacher.id).unwrap().unwrap();
    assert_eq!(user.storage_used, 0);
}

#[tokio::test]
async fn test_duplicate_content_is_reported() {
    let app = TestApp::start();
    let (_, token) = app.teacher("mchen", "20001").await;

    let first = app.upload(&token, "Original", "a.txt", b"same bytes").await;
    let resp = app
        .multipart(
            "/api/v1/documents",
            &token,
            &[Part::Text("title", "Copy"), Part::File("b.txt", b"same bytes")],
        )
        .await;
    assert_eq!(resp.status, StatusCode::CREATED);
    assert_eq!(resp.data()["duplicate_of"], first.as_str());
}

#[tokio::test]
async fn test_visibility_between_teachers() {
    let app = TestApp::start();
    let (_, author) = app.teacher("mchen", "20001").await;
    let (_, other) = app.teacher("jdoe", "20002").await;

    let private = app.upload(&author, "Private notes", "p.txt", b"secret").await;
    let public = app
        .multipart(
            "/api/v1/documents",
            &author,
            &[
                Part::Text("title", "Shared notes"),
                Part::Text("is_public", "true"),
                Part::File("s.txt", b"shared"),
            ],
        )
        .await
        .data()["id"]
        .as_str()
        .unwrap()
        .to_string();

    let resp = app.get(&format!("/api/v1/documents/{private}"), &other).await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);

    let resp = app.get(&format!("/api/v1/documents/{private}/info"), &other).await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);

    let resp = app.get(&format!("/api/v1/documents/{public}"), &other).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.data()["view_count"], 1);

    let resp = app.get(&format!("/api/v1/documents/{public}/info"), &other).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.data()["can_edit"], false);

    let resp = app
        .request(
            Method::PATCH,
            &format!("/api/v1/documents/{public}"),
            Some(&other),
            Some(json!({ "title": "Hijacked" })),
        )
        .await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);

    let resp = app.get("/api/v1/documents", &other).await;
    assert_eq!(resp.json()["total"], 1);
    assert_eq!(resp.json()["data"][0]["id"], public.as_str());
}

#[tokio::test]
async fn test_download_and_preview() {
    let app = TestApp::start();
    let (_, token) = app.teacher("mchen", "20001").await;

    let id = app.upload(&token, "Reading list", "list.txt", b"1. Dune\n").await;

    let resp = app.get(&format!("/api/v1/documents/{id}/download"), &token).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(&resp.body[..], b"1. Dune\n");
    assert!(resp.header("content-disposition").starts_with("attachment"));
    assert!(resp.header("content-disposition").contains("Reading list.txt"));
    assert_eq!(resp.header("x-content-type-options"), "nosniff");

    let document = app.store().get_document(&id).unwrap().unwrap();
    assert_eq!(document.download_count, 1);

    let resp = app.get(&format!("/api/v1/documents/{id}/preview"), &token).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert!(resp.header("content-type").starts_with("text/plain"));
    assert_eq!(&resp.body[..], b"1. Dune\n");

    let archive = app.upload(&token, "Bundle", "bundle.zip", b"PK\x03\x04").await;
    let resp = app
        .get(&format!("/api/v1/documents/{archive}/preview"), &token)
        .await;
    assert_eq!(resp.status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn test_versions_and_restore() {
    let app = TestApp::start();
    let (teacher, token) = app.teacher("mchen", "20001").await;
    let id = app.upload(&token, "Syllabus", "syllabus.txt", b"draft").await;

    let resp = app
        .multipart(
            &format!("/api/v1/documents/{id}/versions"),
            &token,
            &[Part::File("syllabus.txt", b"final version")],
        )
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.error(), "Change log is required");

    let resp = app
        .multipart(
            &format!("/api/v1/documents/{id}/versions"),
            &token,
            &[
                Part::Text("change_log", "Added grading"),
                Part::File("syllabus.txt", b"final version"),
            ],
        )
        .await;
    assert_eq!(resp.status, StatusCode::CREATED);
    assert_eq!(resp.data()["version_number"], "v2.0");

    let user = app.store().get_user(&teacher.id).unwrap().unwrap();
    assert_eq!(user.storage_used, 13);

    let resp = app.get(&format!("/api/v1/documents/{id}/versions"), &token).await;
    assert_eq!(resp.status, StatusCode::OK);
    let versions = resp.data();
    let first = versions
        .as_array()
        .unwrap()
        .iter()
        .find(|v| v["version_number"] == "v1.0")
        .unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();

    let resp = app
        .get(&format!("/api/v1/documents/{id}/versions/{first}/download"), &token)
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(&resp.body[..], b"draft");
    assert!(resp.header("content-disposition").contains("Syllabus_v1.0.txt"));

    let resp = app
        .request(
            Method::POST,
            &format!("/api/v1/documents/{id}/versions/{first}/restore"),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.data()["file_size"], 5);

    let resp = app.get(&format!("/api/v1/documents/{id}/download"), &token).await;
    assert_eq!(&resp.body[..], b"draft");

    let versions = app.store().list_versions(&id).unwrap();
    assert_eq!(versions.len(), 3);
    assert!(
        versions
            .iter()
            .any(|v| v.change_log == "Backup before restoring to v1.0" && v.version_number == "v3.0")
    );

    let user = app.store().get_user(&teacher.id).unwrap().unwrap();
    assert_eq!(user.storage_used, 5);
}

#[tokio::test]
async fn test_delete_frees_storage() {
    let app = TestApp::start();
    let (teacher, token) = app.teacher("mchen", "20001").await;
    let (_, other) = app.teacher("jdoe", "20002").await;

    let a = app.upload(&token, "A", "a.txt", b"aaaa").await;
    let b = app.upload(&token, "B", "b.txt", b"bbbbbb").await;
    let foreign = app.upload(&other, "C", "c.txt", b"c").await;

    let resp = app
        .post(
            "/api/v1/documents/batch-delete",
            &token,
            json!({ "ids": [a, a, b, foreign, "missing"] }),
        )
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.data()["deleted"], 2);
    assert_eq!(resp.data()["freed_bytes"], 10);

    let user = app.store().get_user(&teacher.id).unwrap().unwrap();
    assert_eq!(user.storage_used, 0);
    assert!(!app.data_dir().join("files").join(&a).exists());
    assert!(app.store().get_document(&foreign).unwrap().is_some());

    let resp = app
        .request(
            Method::DELETE,
            &format!("/api/v1/documents/{foreign}"),
            Some(&other),
            None,
        )
        .await;
    assert_eq!(resp.status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_star_and_history() {
    let app = TestApp::start();
    let (_, token) = app.teacher("mchen", "20001").await;
    let id = app.upload(&token, "Lab safety", "lab.md", b"# Goggles").await;

    let resp = app
        .request(Method::POST, &format!("/api/v1/documents/{id}/star"), Some(&token), None)
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.data()["is_starred"], true);

    let resp = app
        .request(Method::POST, &format!("/api/v1/documents/{id}/star"), Some(&token), None)
        .await;
    assert_eq!(resp.data()["is_starred"], false);

    let resp = app.get(&format!("/api/v1/documents/{id}/logs"), &token).await;
    assert_eq!(resp.status, StatusCode::OK);
    let operations: Vec<String> = resp.json()["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|l| l["operation"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(operations.iter().filter(|o| *o == "star").count(), 2);
    assert!(operations.iter().any(|o| o == "create"));
}

#[tokio::test]
async fn test_categories() {
    let app = TestApp::start();
    let (_, token) = app.teacher("mchen", "20001").await;
    let admin = app.admin_token().await;

    let resp = app
        .post("/api/v1/categories", &admin, json!({ "name": " Mathematics " }))
        .await;
    assert_eq!(resp.status, StatusCode::CREATED);
    assert_eq!(resp.data()["name"], "Mathematics");
    let maths = resp.data()["id"].as_str().unwrap().to_string();

    let resp = app
        .post("/api/v1/categories", &token, json!({ "name": "Mathematics" }))
        .await;
    assert_eq!(resp.status, StatusCode::CONFLICT);

    let resp = app
        .post(
            "/api/v1/categories",
            &token,
            json!({ "name": "Geometry", "parent_id": maths }),
        )
        .await;
    assert_eq!(resp.status, StatusCode::CREATED);
    let geometry = resp.data()["id"].as_str().unwrap().to_string();

    // Only one level of nesting.
    let resp = app
        .post(
            "/api/v1/categories",
            &token,
            json!({ "name": "Triangles", "parent_id": geometry }),
        )
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);

    let resp = app.get("/api/v1/categories", &token).await;
    assert_eq!(resp.status, StatusCode::OK);
    let paths: Vec<String> = resp
        .data()
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["full_path"].as_str().unwrap().to_string())
        .collect();
    assert!(paths.contains(&"Mathematics→Geometry".to_string()));

    // Teachers cannot edit categories they did not create.
    let resp = app
        .request(
            Method::PATCH,
            &format!("/api/v1/categories/{maths}"),
            Some(&token),
            Some(json!({ "name": "Maths" })),
        )
        .await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);

    let resp = app
        .multipart(
            "/api/v1/documents",
            &token,
            &[
                Part::Text("title", "Pythagoras"),
                Part::Text("category_id", &geometry),
                Part::File("pyth.txt", b"a2+b2=c2"),
            ],
        )
        .await;
    assert_eq!(resp.status, StatusCode::CREATED);

    let resp = app
        .get(&format!("/api/v1/categories/{maths}/documents"), &token)
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.data().as_array().unwrap().len(), 1);

    let resp = app
        .request(
            Method::DELETE,
            &format!("/api/v1/categories/{geometry}"),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(resp.status, StatusCode::NO_CONTENT);

    let resp = app.get("/api/v1/documents?mine=true", &token).await;
    assert!(resp.json()["data"][0].get("category_id").is_none());
}

#[tokio::test]
async fn test_review_workflow() {
    let app = TestApp::start();
    let (_, token) = app.teacher("mchen", "20001").await;
    let admin = app.admin_token().await;
    let id = app.upload(&token, "Exam paper", "exam.txt", b"Q1").await;

    let resp = app
        .request(
            Method::PATCH,
            &format!("/api/v1/documents/{id}"),
            Some(&token),
            Some(json!({ "status": "review" })),
        )
        .await;
    assert_eq!(resp.status, StatusCode::OK);

    let resp = app.get("/api/v1/admin/reviews", &admin).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json()["total"], 1);

    let resp = app
        .post(
            &format!("/api/v1/admin/reviews/{id}"),
            &admin,
            json!({ "action": "maybe" }),
        )
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);

    let resp = app
        .post(
            &format!("/api/v1/admin/reviews/{id}"),
            &admin,
            json!({ "action": "reject", "comment": "Missing answers" }),
        )
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.data()["status"], "rejected");

    // No longer in review.
    let resp = app
        .post(
            &format!("/api/v1/admin/reviews/{id}"),
            &admin,
            json!({ "action": "approve" }),
        )
        .await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);

    // Editing a rejected document resubmits it.
    let resp = app
        .request(
            Method::PATCH,
            &format!("/api/v1/documents/{id}"),
            Some(&token),
            Some(json!({ "description": "Answers added" })),
        )
        .await;
    assert_eq!(resp.data()["status"], "review");

    let resp = app
        .post(
            &format!("/api/v1/admin/reviews/{id}"),
            &admin,
            json!({ "action": "approve" }),
        )
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.data()["status"], "archived");
    assert!(resp.data()["archived_at"].is_string());
}

#[tokio::test]
async fn test_teacher_dashboard() {
    let app = TestApp::start();
    let (_, token) = app.teacher("mchen", "20001").await;
    app.upload(&token, "One", "one.txt", b"12345").await;

    let resp = app.get("/api/v1/dashboard", &token).await;
    assert_eq!(resp.status, StatusCode::OK);
    let data = resp.data();
    assert_eq!(data["documents"]["total"], 1);
    assert_eq!(data["storage"]["used"], 5);
    assert_eq!(data["recent_documents"].as_array().unwrap().len(), 1);
    assert_eq!(data["uploads_last_7_days"], 1);

    let trend = data["storage_trend"].as_array().unwrap();
    assert_eq!(trend.len(), 7);
    assert_eq!(trend[6]["value"], 5);
}

#[tokio::test]
async fn test_facets_follow_visibility() {
    let app = TestApp::start();
    let (_, author) = app.teacher("mchen", "20001").await;
    let (_, other) = app.teacher("jdoe", "20002").await;
    let admin = app.admin_token().await;

    app.upload(&author, "Notes", "notes.txt", b"notes").await;
    let resp = app
        .multipart(
            "/api/v1/documents",
            &other,
            &[
                Part::Text("title", "Slides"),
                Part::Text("is_public", "true"),
                Part::File("slides.pdf", b"%PDF-1.4"),
            ],
        )
        .await;
    assert_eq!(resp.status, StatusCode::CREATED);
    app.upload(&other, "Sheet", "marks.xlsx", b"cells").await;

    app.post("/api/v1/categories", &admin, json!({ "name": "Shared" }))
        .await;
    app.post("/api/v1/categories", &other, json!({ "name": "Mine only" }))
        .await;

    let resp = app.get("/api/v1/documents/facets", &author).await;
    assert_eq!(resp.status, StatusCode::OK);
    let data = resp.data();
    assert_eq!(data["file_types"], json!(["pdf", "txt"]));
    assert_eq!(
        data["statuses"],
        json!(["draft", "review", "published", "archived", "rejected"])
    );
    let names: Vec<&str> = data["categories"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Shared"]);

    let resp = app.get("/api/v1/documents/facets", &admin).await;
    assert_eq!(resp.data()["file_types"], json!(["pdf", "txt", "xlsx"]));
    assert_eq!(resp.data()["categories"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_failed_version_write_is_rolled_back() {
    let app = TestApp::start();
    let (teacher, token) = app.teacher("mchen", "20001").await;
    let id = app.upload(&token, "Syllabus", "syllabus.txt", b"draft").await;

    // A directory in place of the current file makes the final rename fail.
    let current = app.state.files.current_path(&id);
    std::fs::remove_file(&current).unwrap();
    std::fs::create_dir_all(current.join("blocker")).unwrap();

    let resp = app
        .multipart(
            &format!("/api/v1/documents/{id}/versions"),
            &token,
            &[
                Part::Text("change_log", "Added grading"),
                Part::File("syllabus.txt", b"final version"),
            ],
        )
        .await;
    assert_eq!(resp.status, StatusCode::INTERNAL_SERVER_ERROR);

    let document = app.store().get_document(&id).unwrap().unwrap();
    assert_eq!(document.file_size, 5);
    let user = app.store().get_user(&teacher.id).unwrap().unwrap();
    assert_eq!(user.storage_used, 5);
    let versions = app.store().list_versions(&id).unwrap();
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0].version_number, "v1.0");
}
