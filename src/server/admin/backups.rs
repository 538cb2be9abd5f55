use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::auth::RequireAdmin;
use crate::server::AppState;
use crate::server::download::{Disposition, missing_file, stream_file};
use crate::server::dto::{CreateBackupRequest, PaginationParams};
use crate::server::response::{
    ApiError, ApiResponse, DEFAULT_PAGE_SIZE, PaginatedResponse, StoreOptionExt, StoreResultExt,
};
use crate::storage::open_file;
use crate::store::Page;
use crate::system::backup::{
    archive_path, create_pending_backup, delete_backup_archive, spawn_backup,
};
use crate::types::{Backup, BackupStatus};

fn load_backup(state: &AppState, id: &str) -> Result<Backup, ApiError> {
    state
        .store
        .get_backup(id)
        .api_err("Failed to get backup")?
        .or_not_found("Backup not found")
}

pub async fn create_backup(
    admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateBackupRequest>,
) -> impl IntoResponse {
    if req.name.trim().is_empty() {
        return Err(ApiError::bad_request("Backup name is required"));
    }

    let backup = create_pending_backup(
        state.store.as_ref(),
        &req.name,
        &req.description,
        Some(admin.user.id.as_str()),
    )
    .api_err("Failed to create backup")?;

    tracing::info!("Admin {} started backup {}", admin.user.username, backup.id);

    // The task outlives the request; its result is recorded on the row.
    drop(spawn_backup(
        Arc::clone(&state.store),
        state.config.clone(),
        backup.id.clone(),
    ));

    Ok::<_, ApiError>((StatusCode::ACCEPTED, Json(ApiResponse::success(backup))))
}

pub async fn list_backups(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
) -> impl IntoResponse {
    let page = Page::new(params.page, params.per_page, DEFAULT_PAGE_SIZE);
    let (backups, total) = state
        .store
        .list_backups(page)
        .api_err("Failed to list backups")?;

    Ok::<_, ApiError>(Json(PaginatedResponse::new(backups, page, total)))
}

pub async fn get_backup(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let backup = load_backup(&state, &id)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(backup)))
}

pub async fn download_backup(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let backup = load_backup(&state, &id)?;
    if backup.status != BackupStatus::Completed {
        return Err(ApiError::not_found("Backup has no archive"));
    }

    let path = archive_path(&state.config.backups_dir(), &backup)
        .ok_or_else(|| ApiError::not_found("Backup has no archive"))?;
    let (reader, size) = open_file(&path).await.map_err(missing_file)?;

    let name = backup.file_name.as_deref().unwrap_or("backup.zip");
    Ok(stream_file(reader, size, name, Disposition::Attachment))
}

pub async fn delete_backup(
    admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let backup = load_backup(&state, &id)?;
    if matches!(backup.status, BackupStatus::Pending | BackupStatus::Running) {
        return Err(ApiError::conflict("Backup is still in progress"));
    }

    delete_backup_archive(&state.config.backups_dir(), &backup)
        .api_err("Failed to delete backup archive")?;
    state
        .store
        .delete_backup(&backup.id)
        .api_err("Failed to delete backup")?;

    tracing::info!("Admin {} deleted backup {}", admin.user.username, backup.id);

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}
