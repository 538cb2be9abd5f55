//! Share link endpoints reachable without a session.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use serde_json::json;

use crate::documents::{ShareDenied, check_share_access, download_name, format_size};
use crate::server::AppState;
use crate::server::client::ClientInfo;
use crate::server::download::{Disposition, missing_file, stream_file};
use crate::server::dto::{PublicShareView, ShareAccessRequest, ShareDownloadParams};
use crate::server::response::{ApiError, ApiResponse, StoreOptionExt, StoreResultExt};
use crate::system::audit;
use crate::types::{Document, DocumentOperation, ShareLink, ShareUnavailable};

const PASSWORD_HEADER: &str = "x-share-password";

pub fn public_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/{token}", get(view_share))
        .route("/{token}/access", post(check_access))
        .route("/{token}/download", get(download_shared))
}

fn load_share(state: &AppState, token: &str) -> Result<(ShareLink, Document), ApiError> {
    let share = state
        .store
        .get_share_by_token(token)
        .api_err("Failed to get share link")?
        .or_not_found("Share link not found")?;

    let document = state
        .store
        .get_document(&share.document_id)
        .api_err("Failed to get document")?
        .or_not_found("Share link not found")?;

    Ok((share, document))
}

fn denied(reason: ShareDenied) -> ApiError {
    match reason {
        ShareDenied::Unavailable(reason) => {
            ApiError::gone(format!("Share link unavailable: {}", reason.message()))
        }
        ShareDenied::BadPassword => ApiError::forbidden("Invalid password"),
    }
}

async fn view_share(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> impl IntoResponse {
    let (share, document) = load_share(&state, &token)?;

    if let Some(reason) = share.unavailable_reason(Utc::now()) {
        return Err(denied(ShareDenied::Unavailable(reason)));
    }

    Ok::<_, ApiError>(Json(ApiResponse::success(PublicShareView {
        title: document.title,
        file_size: document.file_size,
        size_human: format_size(document.file_size),
        file_type: document.file_type,
        requires_password: share.requires_password(),
        expires_at: share.expires_at,
        remaining_downloads: share.remaining_downloads(),
    })))
}

async fn check_access(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    Json(req): Json<ShareAccessRequest>,
) -> impl IntoResponse {
    let (share, _) = load_share(&state, &token)?;

    let verdict = check_share_access(&share, req.password.as_deref(), &state.hasher, Utc::now())
        .api_err("Failed to check share link")?;
    if verdict.is_err() {
        return Err(ApiError::forbidden("Invalid password or link unavailable"));
    }

    Ok::<_, ApiError>(Json(ApiResponse::success(json!({ "access": true }))))
}

async fn download_shared(
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
    Path(token): Path<String>,
    Query(params): Query<ShareDownloadParams>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let (share, document) = load_share(&state, &token)?;
    let now = Utc::now();

    let password = headers
        .get(PASSWORD_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or(params.password);

    check_share_access(&share, password.as_deref(), &state.hasher, now)
        .api_err("Failed to check share link")?
        .map_err(denied)?;

    // A missing blob must not use up a download slot.
    let (reader, size) = state
        .files
        .open_current(&document.id)
        .await
        .map_err(missing_file)?;

    // Another download may have used the last slot since the check above.
    let consumed = state
        .store
        .consume_share_download(&share.id, now)
        .api_err("Failed to record download")?;
    if !consumed {
        return Err(denied(ShareDenied::Unavailable(ShareUnavailable::LimitReached)));
    }

    audit::document_event(
        state.store.as_ref(),
        &document.id,
        DocumentOperation::Download,
        client.anonymous(),
        Some(json!({ "share_id": share.id })),
    );

    let name = download_name(&document.title, None, &document.file_type);
    Ok(stream_file(reader, size, &name, Disposition::Attachment))
}
