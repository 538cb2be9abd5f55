use std::sync::Arc;

use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use super::access::load_owned;
use crate::auth::RequireAuth;
use crate::documents::{download_name, file_type_of, next_version_label};
use crate::error::Error;
use crate::server::AppState;
use crate::server::client::ClientInfo;
use crate::server::download::{Disposition, missing_file, stream_file};
use crate::server::dto::DocumentView;
use crate::server::response::{
    ApiError, ApiResponse, StoreOptionExt, StoreResultExt,
};
use crate::server::upload::read_upload;
use crate::storage::FileStoreError;
use crate::types::{Document, DocumentOperation, DocumentVersion};
use crate::system::audit;

fn file_error(e: FileStoreError) -> ApiError {
    match e {
        FileStoreError::NotFound => ApiError::not_found("Version file not found"),
        e => {
            tracing::error!("Version file operation failed: {e}");
            ApiError::internal("Failed to store file")
        }
    }
}

fn commit_error(e: Error) -> ApiError {
    match e {
        Error::AlreadyExists => {
            ApiError::conflict("A version with this label was just created, try again")
        }
        e => ApiError::from_store(e, "Failed to save version"),
    }
}

/// Puts the row and quota back after the new content could not be moved
/// into place.
async fn roll_back_content(
    state: &AppState,
    previous: &Document,
    version: &DocumentVersion,
    size_delta: i64,
) {
    if let Err(e) = state.store.revert_document_content(
        previous,
        std::slice::from_ref(&version.id),
        size_delta,
    ) {
        tracing::error!("Failed to roll back document {}: {e}", previous.id);
    }
    let _ = state.files.delete_version(&previous.id, &version.id).await;
}

fn next_label(state: &AppState, document_id: &str) -> Result<String, ApiError> {
    let versions = state
        .store
        .list_versions(document_id)
        .api_err("Failed to list versions")?;
    Ok(next_version_label(
        versions.iter().map(|v| v.version_number.as_str()),
    ))
}

fn load_version(state: &AppState, document: &Document, version_id: &str) -> Result<DocumentVersion, ApiError> {
    let version = state
        .store
        .get_version(version_id)
        .api_err("Failed to get version")?
        .filter(|v| v.document_id == document.id)
        .or_not_found("Version not found")?;
    Ok(version)
}

pub async fn list_versions(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let document = load_owned(&state, &auth.user, &id)?;
    let versions = state
        .store
        .list_versions(&document.id)
        .api_err("Failed to list versions")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(versions)))
}

pub async fn upload_version(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> impl IntoResponse {
    let mut document = load_owned(&state, &auth.user, &id)?;
    let settings = state.settings().api_err("Failed to load settings")?;

    let mut form = read_upload(&mut multipart, &state.files, &settings).await?;
    let change_log = form
        .text("change_log")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::bad_request("Change log is required"))?
        .to_string();
    let file = form.take_file()?;

    let label = next_label(&state, &document.id)?;
    let now = Utc::now();
    let version = DocumentVersion {
        id: Uuid::new_v4().to_string(),
        document_id: document.id.clone(),
        version_number: label.clone(),
        file_name: file.file_name.clone(),
        file_size: file.staged.size,
        file_hash: file.staged.sha256.clone(),
        change_log,
        created_by: Some(auth.user.id.clone()),
        created_at: now,
    };

    let previous = document.clone();
    let size_delta = file.staged.size - document.file_size;
    document.file_name = file.file_name.clone();
    document.file_size = file.staged.size;
    document.file_type = file.file_type.clone();
    document.file_hash = file.staged.sha256.clone();
    document.updated_at = now;

    state
        .files
        .save_version(&file.staged, &document.id, &version.id)
        .await
        .map_err(file_error)?;

    if let Err(e) = state
        .store
        .commit_document_content(&document, std::slice::from_ref(&version), size_delta)
    {
        let _ = state.files.delete_version(&document.id, &version.id).await;
        return Err(commit_error(e));
    }

    if let Err(e) = state.files.commit_current(file.staged, &document.id).await {
        tracing::error!("Failed to move new version into place: {e}");
        roll_back_content(&state, &previous, &version, size_delta).await;
        return Err(ApiError::internal("Failed to store file"));
    }

    audit::document_event(
        state.store.as_ref(),
        &document.id,
        DocumentOperation::Update,
        client.actor(&auth.user.id),
        Some(json!({ "version": label, "size_delta": size_delta })),
    );

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(version))))
}

pub async fn download_version(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path((id, version_id)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let document = load_owned(&state, &auth.user, &id)?;
    let version = load_version(&state, &document, &version_id)?;

    let (reader, size) = state
        .files
        .open_version(&document.id, &version.id)
        .await
        .map_err(missing_file)?;

    let name = download_name(
        &document.title,
        Some(version.version_number.as_str()),
        &file_type_of(&version.file_name),
    );
    Ok(stream_file(reader, size, &name, Disposition::Attachment))
}

/// Makes an older version current again, after saving the current content
/// as a new version.
pub async fn restore_version(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
    Path((id, version_id)): Path<(String, String)>,
) -> impl IntoResponse {
    let mut document = load_owned(&state, &auth.user, &id)?;
    let target = load_version(&state, &document, &version_id)?;

    let now = Utc::now();
    let backup = DocumentVersion {
        id: Uuid::new_v4().to_string(),
        document_id: document.id.clone(),
        version_number: next_label(&state, &document.id)?,
        file_name: document.file_name.clone(),
        file_size: document.file_size,
        file_hash: document.file_hash.clone(),
        change_log: format!("Backup before restoring to {}", target.version_number),
        created_by: Some(auth.user.id.clone()),
        created_at: now,
    };

    state
        .files
        .copy_current_to_version(&document.id, &backup.id)
        .await
        .map_err(file_error)?;

    let staged = match state.files.stage_version(&document.id, &target.id).await {
        Ok(staged) => staged,
        Err(e) => {
            let _ = state.files.delete_version(&document.id, &backup.id).await;
            return Err(file_error(e));
        }
    };

    let previous = document.clone();
    let size_delta = staged.size - document.file_size;
    document.file_name = target.file_name.clone();
    document.file_size = staged.size;
    document.file_type = file_type_of(&target.file_name);
    document.file_hash = staged.sha256.clone();
    document.updated_at = now;

    if let Err(e) = state
        .store
        .commit_document_content(&document, std::slice::from_ref(&backup), size_delta)
    {
        let _ = state.files.delete_version(&document.id, &backup.id).await;
        return Err(commit_error(e));
    }

    if let Err(e) = state.files.commit_current(staged, &document.id).await {
        tracing::error!("Failed to move restored version into place: {e}");
        roll_back_content(&state, &previous, &backup, size_delta).await;
        return Err(ApiError::internal("Failed to store file"));
    }

    audit::document_event(
        state.store.as_ref(),
        &document.id,
        DocumentOperation::Update,
        client.actor(&auth.user.id),
        Some(json!({
            "restored": target.version_number,
            "backup_version": backup.version_number,
        })),
    );

    Ok::<_, ApiError>(Json(ApiResponse::success(DocumentView::from(document))))
}
