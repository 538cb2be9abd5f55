use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use serde_json::json;

use crate::auth::{RequireAdmin, validate_password_policy};
use crate::server::AppState;
use crate::server::client::ClientInfo;
use crate::server::dto::{
    CreateUserRequest, FreezeRequest, PaginationParams, ResetPasswordRequest, UpdateUserRequest,
    UserDetail, UserListParams,
};
use crate::server::response::{
    ApiError, ApiResponse, DEFAULT_PAGE_SIZE, PaginatedResponse, StoreOptionExt, StoreResultExt,
};
use crate::server::validation::non_blank;
use crate::store::{Page, UserFilter};
use crate::system::{Actor, NewUser, audit, create_account, ensure_unique_identity};
use crate::types::{LogLevel, Role, User, UserOperation};

const GIB: i64 = 1024 * 1024 * 1024;

fn quota_bytes(gb: i64) -> Result<i64, ApiError> {
    if gb < 0 {
        return Err(ApiError::bad_request("Storage quota cannot be negative"));
    }
    Ok(gb.saturating_mul(GIB))
}

fn parse_role(value: &str) -> Result<Role, ApiError> {
    value.trim().parse().map_err(ApiError::bad_request)
}

fn load_user(state: &AppState, id: &str) -> Result<User, ApiError> {
    state
        .store
        .get_user(id)
        .api_err("Failed to get user")?
        .or_not_found("User not found")
}

fn freeze(state: &AppState, user: &mut User, reason: String, actor: Actor<'_>) -> Result<(), ApiError> {
    user.is_frozen = true;
    user.frozen_reason = Some(reason.clone());
    user.frozen_at = Some(Utc::now());
    user.updated_at = Utc::now();
    state
        .store
        .update_user(user)
        .api_err("Failed to freeze user")?;

    let revoked = state
        .store
        .delete_user_sessions(&user.id)
        .api_err("Failed to revoke sessions")?;

    audit::user_event(
        state.store.as_ref(),
        &user.id,
        UserOperation::Freeze,
        actor,
        Some(json!({ "reason": reason, "sessions_revoked": revoked })),
    );
    Ok(())
}

fn unfreeze(state: &AppState, user: &mut User, actor: Actor<'_>) -> Result<(), ApiError> {
    user.is_frozen = false;
    user.frozen_reason = None;
    user.frozen_at = None;
    user.updated_at = Utc::now();
    state
        .store
        .update_user(user)
        .api_err("Failed to unfreeze user")?;

    audit::user_event(
        state.store.as_ref(),
        &user.id,
        UserOperation::Unfreeze,
        actor,
        None,
    );
    Ok(())
}

pub async fn list_users(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Query(params): Query<UserListParams>,
) -> impl IntoResponse {
    let filter = UserFilter {
        role: params.role.as_deref().and_then(|r| r.trim().parse().ok()),
        department: non_blank(params.department),
        frozen: match params.status.as_deref().map(str::trim) {
            Some("frozen") => Some(true),
            Some("active") => Some(false),
            _ => None,
        },
        search: non_blank(params.search),
    };
    let page = Page::new(params.page, params.per_page, DEFAULT_PAGE_SIZE);

    let (users, total) = state
        .store
        .list_users(&filter, page)
        .api_err("Failed to list users")?;
    let users: Vec<UserDetail> = users.into_iter().map(UserDetail::from).collect();

    Ok::<_, ApiError>(Json(PaginatedResponse::new(users, page, total)))
}

pub async fn list_departments(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let departments = state
        .store
        .list_departments()
        .api_err("Failed to list departments")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(departments)))
}

pub async fn create_user(
    admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
    Json(req): Json<CreateUserRequest>,
) -> impl IntoResponse {
    if req.password != req.confirm_password {
        return Err(ApiError::bad_request("Passwords do not match"));
    }

    let role = parse_role(&req.role)?;
    let storage_quota = match req.storage_quota_gb {
        Some(gb) => quota_bytes(gb)?,
        None => state
            .settings()
            .api_err("Failed to load settings")?
            .default_storage_quota_bytes(),
    };

    let user = create_account(
        state.store.as_ref(),
        &state.hasher,
        NewUser {
            username: req.username,
            employee_id: req.employee_id,
            first_name: req.first_name,
            last_name: req.last_name,
            email: req.email,
            department: req.department,
            role,
            password: req.password,
            storage_quota,
            must_change_password: true,
        },
    )
    .api_err("Failed to create user")?;

    audit::user_event(
        state.store.as_ref(),
        &user.id,
        UserOperation::Create,
        client.actor(&admin.user.id),
        Some(json!({ "username": user.username, "role": user.role.as_str() })),
    );

    tracing::info!("Admin {} created user {}", admin.user.username, user.username);

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(UserDetail::from(user)))))
}

pub async fn get_user(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let user = load_user(&state, &id)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(UserDetail::from(user))))
}

pub async fn update_user(
    admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
    Path(id): Path<String>,
    Json(req): Json<UpdateUserRequest>,
) -> impl IntoResponse {
    let mut user = load_user(&state, &id)?;
    let mut changed = Vec::new();

    if let Some(username) = req.username {
        let username = username.trim().to_string();
        if username.is_empty() || username.contains(char::is_whitespace) {
            return Err(ApiError::bad_request(
                "Username cannot be empty or contain whitespace",
            ));
        }
        user.username = username;
        changed.push("username");
    }
    if let Some(employee_id) = req.employee_id {
        let employee_id = employee_id.trim().to_string();
        if employee_id.is_empty() {
            return Err(ApiError::bad_request("Employee ID is required"));
        }
        user.employee_id = employee_id;
        changed.push("employee_id");
    }
    if let Some(first_name) = req.first_name {
        user.first_name = first_name.trim().to_string();
        changed.push("first_name");
    }
    if let Some(last_name) = req.last_name {
        user.last_name = last_name.trim().to_string();
        changed.push("last_name");
    }
    if let Some(email) = req.email {
        user.email = email.trim().to_string();
        changed.push("email");
    }
    if let Some(department) = req.department {
        user.department = department.trim().to_string();
        changed.push("department");
    }
    if let Some(role) = req.role {
        let role = parse_role(&role)?;
        if user.id == admin.user.id && role != Role::Admin {
            return Err(ApiError::bad_request("You cannot remove your own admin role"));
        }
        user.role = role;
        changed.push("role");
    }
    if let Some(gb) = req.storage_quota_gb {
        user.storage_quota = quota_bytes(gb)?;
        changed.push("storage_quota");
    }

    ensure_unique_identity(
        state.store.as_ref(),
        &user.username,
        &user.employee_id,
        &user.email,
        Some(user.id.as_str()),
    )
    .api_err("Failed to check user")?;

    if !changed.is_empty() {
        user.updated_at = Utc::now();
        state
            .store
            .update_user(&user)
            .api_err("Failed to update user")?;

        audit::user_event(
            state.store.as_ref(),
            &user.id,
            UserOperation::Update,
            client.actor(&admin.user.id),
            Some(json!({ "changed": changed })),
        );
    }

    match req.is_frozen {
        Some(true) if !user.is_frozen => {
            if user.id == admin.user.id {
                return Err(ApiError::bad_request("You cannot freeze your own account"));
            }
            let reason = req.frozen_reason.unwrap_or_default().trim().to_string();
            freeze(&state, &mut user, reason, client.actor(&admin.user.id))?;
        }
        Some(false) if user.is_frozen => {
            unfreeze(&state, &mut user, client.actor(&admin.user.id))?;
        }
        _ => {}
    }

    Ok::<_, ApiError>(Json(ApiResponse::success(UserDetail::from(user))))
}

pub async fn freeze_user(
    admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
    Path(id): Path<String>,
    Json(req): Json<FreezeRequest>,
) -> impl IntoResponse {
    if id == admin.user.id {
        return Err(ApiError::bad_request("You cannot freeze your own account"));
    }
    let mut user = load_user(&state, &id)?;
    freeze(
        &state,
        &mut user,
        req.reason.trim().to_string(),
        client.actor(&admin.user.id),
    )?;

    tracing::info!("Admin {} froze user {}", admin.user.username, user.username);

    Ok::<_, ApiError>(Json(ApiResponse::success(UserDetail::from(user))))
}

pub async fn unfreeze_user(
    admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let mut user = load_user(&state, &id)?;
    unfreeze(&state, &mut user, client.actor(&admin.user.id))?;

    Ok::<_, ApiError>(Json(ApiResponse::success(UserDetail::from(user))))
}

pub async fn reset_password(
    admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
    Path(id): Path<String>,
    Json(req): Json<ResetPasswordRequest>,
) -> impl IntoResponse {
    let mut user = load_user(&state, &id)?;
    validate_password_policy(&req.new_password).map_err(ApiError::bad_request)?;

    let now = Utc::now();
    user.password_hash = state
        .hasher
        .hash(&req.new_password)
        .map_err(|_| ApiError::internal("Failed to hash password"))?;
    user.must_change_password = true;
    user.password_changed_at = Some(now);
    user.updated_at = now;
    state
        .store
        .update_user(&user)
        .api_err("Failed to reset password")?;

    state
        .store
        .delete_user_sessions(&user.id)
        .api_err("Failed to revoke sessions")?;

    audit::user_event(
        state.store.as_ref(),
        &user.id,
        UserOperation::PasswordReset,
        client.actor(&admin.user.id),
        None,
    );

    Ok::<_, ApiError>(Json(ApiResponse::success(UserDetail::from(user))))
}

pub async fn delete_user(
    admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
    Path(id): Path<String>,
) -> impl IntoResponse {
    if id == admin.user.id {
        return Err(ApiError::bad_request("You cannot delete your own account"));
    }
    let user = load_user(&state, &id)?;

    let document_ids = state
        .store
        .list_author_document_ids(&user.id)
        .api_err("Failed to list documents")?;

    state
        .store
        .delete_user(&user.id)
        .api_err("Failed to delete user")?;

    for document_id in &document_ids {
        if let Err(e) = state.files.delete_document(document_id).await {
            tracing::warn!("Failed to remove files of document {document_id}: {e}");
        }
    }

    audit::system_event(
        state.store.as_ref(),
        LogLevel::Info,
        "users",
        format!("User '{}' deleted", user.username),
        client.actor(&admin.user.id),
        Some(json!({
            "user_id": user.id,
            "employee_id": user.employee_id,
            "documents_removed": document_ids.len(),
        })),
    );

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}

pub async fn list_user_logs(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<PaginationParams>,
) -> impl IntoResponse {
    let user = load_user(&state, &id)?;
    let page = Page::new(params.page, params.per_page, DEFAULT_PAGE_SIZE);

    let (logs, total) = state
        .store
        .list_user_logs(&user.id, page)
        .api_err("Failed to list user logs")?;

    Ok::<_, ApiError>(Json(PaginatedResponse::new(logs, page, total)))
}
