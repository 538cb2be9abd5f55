use std::collections::HashSet;
use std::sync::Arc;

use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use super::access::{
    check_category_usable, display_names, load_document, load_owned, load_visible,
};
use super::categories::category_views;
use crate::auth::RequireAuth;
use crate::documents::format_size;
use crate::server::AppState;
use crate::server::client::ClientInfo;
use crate::server::dto::{
    BatchDeleteRequest, BatchDeleteResponse, DocumentInfo, DocumentListParams, DocumentView,
    FacetsResponse, PaginationParams, StarResponse, UpdateDocumentRequest, UploadResponse,
};
use crate::server::response::{
    ApiError, ApiResponse, DEFAULT_PAGE_SIZE, PaginatedResponse, StoreResultExt,
};
use crate::server::upload::read_upload;
use crate::server::validation::{non_blank, parse_date, parse_flag, validate_title};
use crate::store::{DocumentFilter, DocumentLogFilter, Page};
use crate::system::{Actor, audit};
use crate::types::{
    Document, DocumentOperation, DocumentStatus, DocumentVersion, LogLevel, User,
};

const INITIAL_VERSION: &str = "v1.0";

fn parse_teacher_status(value: &str) -> Result<DocumentStatus, ApiError> {
    let status: DocumentStatus = value.trim().parse().map_err(ApiError::bad_request)?;
    if !status.selectable_by_teacher() {
        return Err(ApiError::bad_request(format!(
            "Status '{status}' cannot be chosen directly"
        )));
    }
    Ok(status)
}

fn viewer_scope(user: &User) -> Option<String> {
    (!user.is_admin()).then(|| user.id.clone())
}

pub async fn list_documents(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Query(params): Query<DocumentListParams>,
) -> impl IntoResponse {
    let filter = DocumentFilter {
        visible_to: viewer_scope(&auth.user),
        author_id: params
            .mine
            .unwrap_or(false)
            .then(|| auth.user.id.clone()),
        category_id: non_blank(params.category),
        status: params
            .status
            .as_deref()
            .and_then(|s| s.trim().parse().ok()),
        file_type: non_blank(params.file_type),
        date_from: parse_date(params.date_from.as_deref()),
        date_to: parse_date(params.date_to.as_deref()),
        search: non_blank(params.search),
    };
    let page = Page::new(params.page, params.per_page, DEFAULT_PAGE_SIZE);

    let (rows, total) = state
        .store
        .list_documents(&filter, page)
        .api_err("Failed to list documents")?;
    let documents: Vec<DocumentView> = rows.into_iter().map(Into::into).collect();

    Ok::<_, ApiError>(Json(PaginatedResponse::new(documents, page, total)))
}

pub async fn get_facets(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let scope = viewer_scope(&auth.user);

    let categories = category_views(&state, scope.as_deref())?;
    let file_types = state
        .store
        .list_file_types(scope.as_deref())
        .api_err("Failed to list file types")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(FacetsResponse {
        categories,
        file_types,
        statuses: DocumentStatus::ALL.iter().map(|s| s.as_str()).collect(),
    })))
}

pub async fn upload_document(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
    mut multipart: Multipart,
) -> impl IntoResponse {
    let user = auth.user;
    let settings = state.settings().api_err("Failed to load settings")?;

    let mut form = read_upload(&mut multipart, &state.files, &settings).await?;
    let file = form.take_file()?;
    // The store re-checks this atomically when the row is written.
    if !user.can_upload(file.staged.size) {
        return Err(ApiError::quota_exceeded());
    }

    let title = validate_title(form.text("title").unwrap_or_default())?;
    let description = form.text("description").unwrap_or_default().trim().to_string();
    let is_public = form.text("is_public").is_some_and(parse_flag);
    let status = match form.text("status").map(str::trim).filter(|s| !s.is_empty()) {
        Some(value) => parse_teacher_status(value)?,
        None => DocumentStatus::Draft,
    };
    let category_id = match form.text("category_id").map(str::trim).filter(|s| !s.is_empty()) {
        Some(id) => Some(check_category_usable(&state, &user, id)?.id),
        None => None,
    };

    let duplicate_of = state
        .store
        .find_document_by_hash(&file.staged.sha256, "")
        .api_err("Failed to check for duplicates")?
        .map(|d| d.id);

    let now = Utc::now();
    let document = Document {
        id: Uuid::new_v4().to_string(),
        title,
        description,
        category_id,
        file_name: file.file_name.clone(),
        file_size: file.staged.size,
        file_type: file.file_type.clone(),
        file_hash: file.staged.sha256.clone(),
        author_id: user.id.clone(),
        status,
        is_public,
        is_starred: false,
        download_count: 0,
        view_count: 0,
        created_at: now,
        updated_at: now,
        archived_at: None,
    };
    let version = DocumentVersion {
        id: Uuid::new_v4().to_string(),
        document_id: document.id.clone(),
        version_number: INITIAL_VERSION.to_string(),
        file_name: file.file_name.clone(),
        file_size: file.staged.size,
        file_hash: file.staged.sha256.clone(),
        change_log: "Initial version".to_string(),
        created_by: Some(user.id.clone()),
        created_at: now,
    };

    state
        .files
        .save_version(&file.staged, &document.id, &version.id)
        .await
        .map_err(|e| {
            tracing::error!("Failed to store version file: {e}");
            ApiError::internal("Failed to store file")
        })?;

    if let Err(e) = state.store.create_document(&document, &version) {
        if let Err(cleanup) = state.files.delete_document(&document.id).await {
            tracing::warn!("Failed to clean up rejected upload: {cleanup}");
        }
        return Err(ApiError::from_store(e, "Failed to create document"));
    }

    if let Err(e) = state.files.commit_current(file.staged, &document.id).await {
        tracing::error!("Failed to move upload into place: {e}");
        if let Err(e) = state.store.delete_document(&document.id) {
            tracing::error!("Failed to roll back document {}: {e}", document.id);
        }
        let _ = state.files.delete_document(&document.id).await;
        return Err(ApiError::internal("Failed to store file"));
    }

    audit::document_event(
        state.store.as_ref(),
        &document.id,
        DocumentOperation::Create,
        client.actor(&user.id),
        Some(json!({ "file_name": document.file_name, "file_size": document.file_size })),
    );
    tracing::info!("User {} uploaded document {}", user.username, document.id);

    Ok::<_, ApiError>((
        StatusCode::CREATED,
        Json(ApiResponse::success(UploadResponse {
            document: DocumentView::from(document),
            duplicate_of,
        })),
    ))
}

pub async fn get_document(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let user = auth.user;
    let mut document = load_visible(&state, &user, &id)?;

    if !user.is_admin() {
        if document.author_id != user.id {
            state
                .store
                .increment_view_count(&document.id)
                .api_err("Failed to count view")?;
            document.view_count += 1;
        }
        audit::document_event(
            state.store.as_ref(),
            &document.id,
            DocumentOperation::View,
            client.actor(&user.id),
            None,
        );
    }

    let (author_name, category_name) = display_names(&state, &document)?;
    let mut view = DocumentView::from(document);
    view.author_name = Some(author_name);
    view.category_name = category_name;

    Ok::<_, ApiError>(Json(ApiResponse::success(view)))
}

pub async fn update_document(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
    Path(id): Path<String>,
    Json(req): Json<UpdateDocumentRequest>,
) -> impl IntoResponse {
    let user = auth.user;
    let mut document = load_owned(&state, &user, &id)?;
    let was_rejected = document.status == DocumentStatus::Rejected;
    let mut changed = Vec::new();

    if let Some(title) = req.title {
        document.title = validate_title(&title)?;
        changed.push("title");
    }
    if let Some(description) = req.description {
        document.description = description.trim().to_string();
        changed.push("description");
    }
    if let Some(category_id) = req.category_id {
        let category_id = category_id.trim();
        document.category_id = if category_id.is_empty() {
            None
        } else {
            Some(check_category_usable(&state, &user, category_id)?.id)
        };
        changed.push("category_id");
    }
    if let Some(is_public) = req.is_public {
        document.is_public = is_public;
        changed.push("is_public");
    }
    if let Some(status) = req.status {
        document.status = parse_teacher_status(&status)?;
        changed.push("status");
    }

    // Editing a rejected document resubmits it.
    if was_rejected {
        document.status = DocumentStatus::Review;
    }
    document.updated_at = Utc::now();

    state
        .store
        .update_document(&document)
        .api_err("Failed to update document")?;

    audit::document_event(
        state.store.as_ref(),
        &document.id,
        DocumentOperation::Update,
        client.actor(&user.id),
        Some(json!({ "changed": changed, "resubmitted": was_rejected })),
    );

    Ok::<_, ApiError>(Json(ApiResponse::success(DocumentView::from(document))))
}

/// Removes a document's rows and blobs. Returns the freed byte count.
async fn remove_document(
    state: &AppState,
    document: &Document,
    actor: Actor<'_>,
) -> Result<i64, ApiError> {
    let freed = state
        .store
        .delete_document(&document.id)
        .api_err("Failed to delete document")?
        .unwrap_or(0);

    if let Err(e) = state.files.delete_document(&document.id).await {
        tracing::warn!("Failed to remove files of document {}: {e}", document.id);
    }

    audit::system_event(
        state.store.as_ref(),
        LogLevel::Info,
        "documents",
        format!("Document '{}' deleted", document.title),
        actor,
        Some(json!({ "document_id": document.id, "freed_bytes": freed })),
    );

    Ok(freed)
}

pub async fn delete_document(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let document = load_owned(&state, &auth.user, &id)?;
    remove_document(&state, &document, client.actor(&auth.user.id)).await?;

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}

pub async fn batch_delete(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
    Json(req): Json<BatchDeleteRequest>,
) -> impl IntoResponse {
    let mut seen = HashSet::new();
    let mut deleted = 0;
    let mut freed_bytes = 0;

    for id in req.ids.iter().filter(|id| seen.insert((*id).clone())) {
        let Some(document) = state
            .store
            .get_document(id)
            .api_err("Failed to get document")?
        else {
            continue;
        };
        if document.author_id != auth.user.id {
            continue;
        }

        freed_bytes += remove_document(&state, &document, client.actor(&auth.user.id)).await?;
        deleted += 1;
    }

    Ok::<_, ApiError>(Json(ApiResponse::success(BatchDeleteResponse {
        deleted,
        freed_bytes,
        freed_human: format_size(freed_bytes),
    })))
}

pub async fn toggle_star(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let mut document = load_owned(&state, &auth.user, &id)?;
    document.is_starred = !document.is_starred;

    state
        .store
        .update_document(&document)
        .api_err("Failed to update document")?;

    audit::document_event(
        state.store.as_ref(),
        &document.id,
        DocumentOperation::Star,
        client.actor(&auth.user.id),
        Some(json!({ "starred": document.is_starred })),
    );

    Ok::<_, ApiError>(Json(ApiResponse::success(StarResponse {
        is_starred: document.is_starred,
    })))
}

pub async fn get_document_info(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let document = load_document(&state, &id)?;
    if !document.is_visible_to(&auth.user) {
        return Err(ApiError::forbidden("You do not have access to this document"));
    }

    let (author_name, category_name) = display_names(&state, &document)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(DocumentInfo {
        can_edit: document.author_id == auth.user.id,
        size_human: format_size(document.file_size),
        id: document.id,
        title: document.title,
        description: document.description,
        file_type: document.file_type,
        file_size: document.file_size,
        status: document.status,
        is_public: document.is_public,
        author_name,
        category_name,
        download_count: document.download_count,
        view_count: document.view_count,
        created_at: document.created_at,
        updated_at: document.updated_at,
    })))
}

pub async fn list_document_logs(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<PaginationParams>,
) -> impl IntoResponse {
    let document = load_owned(&state, &auth.user, &id)?;
    let filter = DocumentLogFilter {
        document_id: Some(document.id),
        ..DocumentLogFilter::default()
    };
    let page = Page::new(params.page, params.per_page, DEFAULT_PAGE_SIZE);

    let (logs, total) = state
        .store
        .list_document_logs(&filter, page)
        .api_err("Failed to list document logs")?;

    Ok::<_, ApiError>(Json(PaginatedResponse::new(logs, page, total)))
}
