use std::sync::Arc;
use std::time::Instant;

use axum::extract::{DefaultBodyLimit, Request};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::{Router, routing::get};

use super::account::account_router;
use super::admin::admin_router;
use super::documents::documents_router;
use super::public::public_router;
use crate::auth::{SecretHasher, TokenGenerator};
use crate::config::ServerConfig;
use crate::error::Result;
use crate::storage::FileStore;
use crate::store::Store;
use crate::system::RuntimeSettings;

pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: ServerConfig,
    pub files: FileStore,
    pub hasher: SecretHasher,
    pub tokens: TokenGenerator,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, config: ServerConfig) -> Self {
        Self {
            files: FileStore::new(config.files_dir()),
            store,
            config,
            hasher: SecretHasher::new(),
            tokens: TokenGenerator::new(),
        }
    }

    /// Current runtime settings, read fresh from the config table.
    pub fn settings(&self) -> Result<RuntimeSettings> {
        RuntimeSettings::load(self.store.as_ref())
    }
}

async fn health() -> &'static str {
    "OK"
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status();

    tracing::info!(
        "{} {} {} {}ms",
        method,
        uri.path(),
        status.as_u16(),
        latency.as_millis()
    );

    response
}

pub fn create_router(state: Arc<AppState>) -> Router {
    let body_limit = state.config.max_upload_bytes;

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1/admin", admin_router())
        .nest("/api/v1", account_router().merge(documents_router()))
        .nest("/s", public_router())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}
