#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use axum::Router;
use axum::body::{Body, Bytes, to_bytes};
use axum::http::{HeaderMap, Method, Request, StatusCode, header};
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

use lectern::auth::SecretHasher;
use lectern::config::ServerConfig;
use lectern::server::{AppState, create_router};
use lectern::store::{SqliteStore, Store};
use lectern::system::{DEFAULT_SETTINGS, NewUser, create_account};
use lectern::types::{Role, User};

pub const ADMIN_USERNAME: &str = "admin";
pub const ADMIN_PASSWORD: &str = "headmaster-2024";
pub const TEACHER_PASSWORD: &str = "lesson-plan-42";

const BOUNDARY: &str = "lectern-test-boundary";

/// The full router over a fresh data directory, with one administrator.
pub struct TestApp {
    pub temp_dir: TempDir,
    pub state: Arc<AppState>,
    router: Router,
}

/// A response with its body already collected.
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap_or(Value::Null)
    }

    pub fn data(&self) -> Value {
        self.json()["data"].clone()
    }

    pub fn error(&self) -> String {
        self.json()["error"].as_str().unwrap_or_default().to_string()
    }

    pub fn header(&self, name: &str) -> String {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    }
}

/// A multipart form part.
pub enum Part<'a> {
    Text(&'a str, &'a str),
    File(&'a str, &'a [u8]),
}

pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                        .as_bytes(),
                );
            }
            Part::File(file_name, content) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(content);
                body.extend_from_slice(b"\r\n");
            }
        }
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

impl TestApp {
    pub fn start() -> Self {
        let temp_dir = TempDir::new().expect("create temp dir");
        let config = ServerConfig {
            data_dir: temp_dir.path().to_path_buf(),
            ..ServerConfig::default()
        };

        let store = SqliteStore::new(config.db_path()).expect("open store");
        store.initialize().expect("initialize store");
        store
            .insert_missing_config(DEFAULT_SETTINGS)
            .expect("seed settings");

        let state = Arc::new(AppState::new(Arc::new(store), config));
        let app = Self {
            router: create_router(Arc::clone(&state)),
            temp_dir,
            state,
        };
        app.create_user(ADMIN_USERNAME, ADMIN_USERNAME, Role::Admin);
        app
    }

    pub fn data_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn store(&self) -> &dyn Store {
        self.state.store.as_ref()
    }

    /// Inserts an account directly, bypassing the admin API.
    pub fn create_user(&self, username: &str, employee_id: &str, role: Role) -> User {
        let password = match role {
            Role::Admin => ADMIN_PASSWORD,
            Role::Teacher => TEACHER_PASSWORD,
        };
        create_account(
            self.store(),
            &SecretHasher::new(),
            NewUser {
                username: username.to_string(),
                employee_id: employee_id.to_string(),
                first_name: "Test".to_string(),
                last_name: username.to_string(),
                email: format!("{username}@school.test"),
                department: "Science".to_string(),
                role,
                password: password.to_string(),
                storage_quota: 10 * 1024 * 1024,
                must_change_password: false,
            },
        )
        .expect("create user")
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("build request");
        self.send(request).await
    }

    pub async fn get(&self, uri: &str, token: &str) -> TestResponse {
        self.request(Method::GET, uri, Some(token), None).await
    }

    pub async fn post(&self, uri: &str, token: &str, body: Value) -> TestResponse {
        self.request(Method::POST, uri, Some(token), Some(body)).await
    }

    pub async fn multipart(&self, uri: &str, token: &str, parts: &[Part<'_>]) -> TestResponse {
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(parts)))
            .expect("build request");
        self.send(request).await
    }

    pub async fn login(&self, account: &str, password: &str) -> String {
        let resp = self
            .request(
                Method::POST,
                "/api/v1/auth/login",
                None,
                Some(json!({ "account": account, "password": password })),
            )
            .await;
        assert_eq!(resp.status, StatusCode::OK, "login failed: {}", resp.error());
        resp.data()["token"]
            .as_str()
            .expect("token in login response")
            .to_string()
    }

    pub async fn admin_token(&self) -> String {
        self.login(ADMIN_USERNAME, ADMIN_PASSWORD).await
    }

    /// Creates a teacher and logs in with the employee ID.
    pub async fn teacher(&self, username: &str, employee_id: &str) -> (User, String) {
        let user = self.create_user(username, employee_id, Role::Teacher);
        let token = self.login(employee_id, TEACHER_PASSWORD).await;
        (user, token)
    }

    /// Uploads a document and returns its id.
    pub async fn upload(&self, token: &str, title: &str, file_name: &str, content: &[u8]) -> String {
        let resp = self
            .multipart(
                "/api/v1/documents",
                token,
                &[Part::Text("title", title), Part::File(file_name, content)],
            )
            .await;
        assert_eq!(resp.status, StatusCode::CREATED, "upload failed: {}", resp.error());
        resp.data()["id"].as_str().expect("document id").to_string()
    }
}
