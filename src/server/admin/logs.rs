use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
    response::IntoResponse,
};

use crate::auth::RequireAdmin;
use crate::server::AppState;
use crate::server::dto::{
    AdminLoginLogParams, DocumentLogParams, SystemLogParams, parse_login_status,
};
use crate::server::response::{ApiError, DEFAULT_PAGE_SIZE, PaginatedResponse, StoreResultExt};
use crate::server::validation::non_blank;
use crate::store::{DocumentLogFilter, LoginLogFilter, Page};

// Unknown enum values in filters are ignored rather than rejected.

pub async fn list_system_logs(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Query(params): Query<SystemLogParams>,
) -> impl IntoResponse {
    let level = params.level.as_deref().and_then(|l| l.trim().to_uppercase().parse().ok());
    let module = non_blank(params.module);
    let page = Page::new(params.page, params.per_page, DEFAULT_PAGE_SIZE);

    let (logs, total) = state
        .store
        .list_system_logs(level, module.as_deref(), page)
        .api_err("Failed to list system logs")?;

    Ok::<_, ApiError>(Json(PaginatedResponse::new(logs, page, total)))
}

pub async fn list_login_logs(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Query(params): Query<AdminLoginLogParams>,
) -> impl IntoResponse {
    let filter = LoginLogFilter {
        user_id: non_blank(params.user_id),
        successful: parse_login_status(params.status.as_deref()),
        ..LoginLogFilter::default()
    };
    let page = Page::new(params.page, params.per_page, DEFAULT_PAGE_SIZE);

    let (logs, total) = state
        .store
        .list_login_logs(&filter, page)
        .api_err("Failed to list login logs")?;

    Ok::<_, ApiError>(Json(PaginatedResponse::new(logs, page, total)))
}

pub async fn list_document_logs(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Query(params): Query<DocumentLogParams>,
) -> impl IntoResponse {
    let filter = DocumentLogFilter {
        document_id: non_blank(params.document_id),
        user_id: non_blank(params.user_id),
        operation: params.operation.as_deref().and_then(|o| o.trim().parse().ok()),
    };
    let page = Page::new(params.page, params.per_page, DEFAULT_PAGE_SIZE);

    let (logs, total) = state
        .store
        .list_document_logs(&filter, page)
        .api_err("Failed to list document logs")?;

    Ok::<_, ApiError>(Json(PaginatedResponse::new(logs, page, total)))
}
