use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
    response::IntoResponse,
};
use chrono::Utc;
use serde_json::json;

use crate::auth::{RequireAuth, RequireSession};
use crate::server::AppState;
use crate::server::client::ClientInfo;
use crate::server::dto::{
    LoginLogParams, StorageStats, UpdateProfileRequest, UserDetail, parse_login_status,
};
use crate::server::response::{
    ApiError, ApiResponse, DEFAULT_PAGE_SIZE, PaginatedResponse, StoreResultExt,
};
use crate::server::validation::{non_blank, parse_date};
use crate::store::{LoginLogFilter, Page};
use crate::system::{audit, ensure_unique_identity};
use crate::types::UserOperation;

/// GET /me - Reachable while a password change is pending.
pub async fn get_me(auth: RequireSession) -> impl IntoResponse {
    Json(ApiResponse::success(UserDetail::from(auth.user)))
}

pub async fn update_me(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
    Json(req): Json<UpdateProfileRequest>,
) -> impl IntoResponse {
    let mut user = auth.user;
    let mut changed = Vec::new();

    if let Some(first_name) = req.first_name {
        user.first_name = first_name.trim().to_string();
        changed.push("first_name");
    }
    if let Some(last_name) = req.last_name {
        user.last_name = last_name.trim().to_string();
        changed.push("last_name");
    }
    if let Some(department) = req.department {
        user.department = department.trim().to_string();
        changed.push("department");
    }
    if let Some(email) = req.email {
        let email = email.trim().to_string();
        if !email.is_empty() && !email.contains('@') {
            return Err(ApiError::bad_request("Invalid email address"));
        }
        user.email = email;
        changed.push("email");
    }

    ensure_unique_identity(
        state.store.as_ref(),
        &user.username,
        &user.employee_id,
        &user.email,
        Some(user.id.as_str()),
    )
    .api_err("Failed to check email")?;

    user.updated_at = Utc::now();
    state
        .store
        .update_user(&user)
        .api_err("Failed to update profile")?;

    if !changed.is_empty() {
        audit::user_event(
            state.store.as_ref(),
            &user.id,
            UserOperation::Update,
            client.actor(&user.id),
            Some(json!({ "changed": changed })),
        );
    }

    Ok::<_, ApiError>(Json(ApiResponse::success(UserDetail::from(user))))
}

pub async fn get_storage(auth: RequireAuth) -> impl IntoResponse {
    Json(ApiResponse::success(StorageStats::for_user(&auth.user)))
}

pub async fn list_login_logs(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Query(params): Query<LoginLogParams>,
) -> impl IntoResponse {
    let filter = LoginLogFilter {
        user_id: Some(auth.user.id),
        successful: parse_login_status(params.status.as_deref()),
        ip_address: non_blank(params.ip),
        date_from: parse_date(params.start_date.as_deref()),
        date_to: parse_date(params.end_date.as_deref()),
    };
    let page = Page::new(params.page, params.per_page, DEFAULT_PAGE_SIZE);

    let (logs, total) = state
        .store
        .list_login_logs(&filter, page)
        .api_err("Failed to list login logs")?;
    let logs: Vec<_> = logs.into_iter().map(|row| row.log).collect();

    Ok::<_, ApiError>(Json(PaginatedResponse::new(logs, page, total)))
}
