use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use chrono::Utc;
use serde_json::json;

use crate::auth::RequireAdmin;
use crate::server::AppState;
use crate::server::client::ClientInfo;
use crate::server::dto::{DocumentView, PaginationParams, ReviewDecisionRequest};
use crate::server::response::{
    ApiError, ApiResponse, DEFAULT_PAGE_SIZE, PaginatedResponse, StoreResultExt,
};
use crate::store::{DocumentFilter, Page};
use crate::system::audit;
use crate::types::{DocumentOperation, DocumentStatus, LogLevel};

pub async fn list_reviews(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
) -> impl IntoResponse {
    let filter = DocumentFilter {
        status: Some(DocumentStatus::Review),
        ..DocumentFilter::default()
    };
    let page = Page::new(params.page, params.per_page, DEFAULT_PAGE_SIZE);

    let (rows, total) = state
        .store
        .list_documents(&filter, page)
        .api_err("Failed to list documents")?;
    let documents: Vec<DocumentView> = rows.into_iter().map(DocumentView::from).collect();

    Ok::<_, ApiError>(Json(PaginatedResponse::new(documents, page, total)))
}

pub async fn decide_review(
    admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
    Path(id): Path<String>,
    Json(req): Json<ReviewDecisionRequest>,
) -> impl IntoResponse {
    let mut document = state
        .store
        .get_document(&id)
        .api_err("Failed to get document")?
        .filter(|d| d.status == DocumentStatus::Review)
        .ok_or_else(|| ApiError::not_found("No document awaiting review with this id"))?;

    let now = Utc::now();
    let approved = match req.action.trim() {
        "approve" => {
            document.status = DocumentStatus::Archived;
            document.archived_at = Some(now);
            true
        }
        "reject" => {
            document.status = DocumentStatus::Rejected;
            false
        }
        other => {
            return Err(ApiError::bad_request(format!(
                "Unknown review action '{other}', expected 'approve' or 'reject'"
            )));
        }
    };
    document.updated_at = now;

    state
        .store
        .update_document(&document)
        .api_err("Failed to update document")?;

    let comment = req.comment.unwrap_or_default().trim().to_string();
    let verdict = if approved { "approved" } else { "rejected" };

    if approved {
        audit::document_event(
            state.store.as_ref(),
            &document.id,
            DocumentOperation::Archive,
            client.actor(&admin.user.id),
            Some(json!({ "comment": comment })),
        );
    }

    audit::system_event(
        state.store.as_ref(),
        LogLevel::Info,
        "documents",
        format!("Document '{}' {verdict} by {}", document.title, admin.user.username),
        client.actor(&admin.user.id),
        Some(json!({ "document_id": document.id, "comment": comment })),
    );

    Ok::<_, ApiError>(Json(ApiResponse::success(DocumentView::from(document))))
}
