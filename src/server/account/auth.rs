use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::{Duration, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::auth::{RequireSession, validate_password_policy};
use crate::error::Error;
use crate::server::AppState;
use crate::server::client::ClientInfo;
use crate::server::dto::{ChangePasswordRequest, LoginRequest, LoginResponse, UserDetail};
use crate::server::response::{ApiError, ApiResponse, StoreResultExt};
use crate::system::audit;
use crate::types::{LoginLog, Role, Session, User, UserOperation};

const INVALID_CREDENTIALS: &str = "Invalid account or password";
const MAX_SESSION_ATTEMPTS: usize = 3;

fn record_login(state: &AppState, user: &User, client: &ClientInfo, failure: Option<&str>) {
    let log = LoginLog {
        id: 0,
        user_id: user.id.clone(),
        ip_address: client.ip_or_unknown(),
        user_agent: client.user_agent.clone(),
        login_time: Utc::now(),
        logout_time: None,
        is_successful: failure.is_none(),
        failure_reason: failure.unwrap_or_default().to_string(),
    };

    if let Err(e) = state.store.insert_login_log(&log) {
        tracing::warn!("Failed to write login log: {e}");
    }
}

/// Finds the account a login names. Teachers sign in with their numeric
/// employee ID, administrators with their username.
fn find_login_account(state: &AppState, account: &str) -> Result<Option<User>, ApiError> {
    if account.chars().all(|c| c.is_ascii_digit()) {
        let user = state
            .store
            .get_user_by_employee_id(account)
            .api_err("Failed to look up account")?;
        if user.as_ref().is_some_and(User::is_admin) {
            return Err(ApiError::unauthorized(
                "Employee ID login is only available to teachers",
            ));
        }
        Ok(user)
    } else {
        let user = state
            .store
            .get_user_by_username(account)
            .api_err("Failed to look up account")?;
        if user.as_ref().is_some_and(|u| u.role == Role::Teacher) {
            return Err(ApiError::unauthorized(
                "Teachers must sign in with their employee ID",
            ));
        }
        Ok(user)
    }
}

fn issue_session(state: &AppState, user_id: &str, remember_me: bool) -> Result<(String, Session), ApiError> {
    let now = Utc::now();
    let lifetime = if remember_me {
        Duration::days(state.config.remember_me_days)
    } else {
        Duration::hours(state.config.session_ttl_hours)
    };

    for _ in 0..MAX_SESSION_ATTEMPTS {
        let (raw_token, lookup, hash) = state
            .tokens
            .generate()
            .map_err(|_| ApiError::internal("Failed to generate session token"))?;

        let session = Session {
            id: Uuid::new_v4().to_string(),
            token_hash: hash,
            token_lookup: lookup,
            user_id: user_id.to_string(),
            created_at: now,
            expires_at: now + lifetime,
            last_used_at: None,
        };

        match state.store.create_session(&session) {
            Ok(()) => return Ok((raw_token, session)),
            Err(Error::TokenLookupCollision) => continue,
            Err(e) => {
                tracing::error!("Failed to create session: {e}");
                return Err(ApiError::internal("Failed to create session"));
            }
        }
    }

    Err(ApiError::internal("Failed to create session"))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
    Json(req): Json<LoginRequest>,
) -> impl IntoResponse {
    let account = req.account.trim();
    let password = req.password.trim();
    if account.is_empty() || password.is_empty() {
        return Err(ApiError::bad_request("Account and password are required"));
    }

    let mut user = find_login_account(&state, account)?
        .ok_or_else(|| ApiError::unauthorized(INVALID_CREDENTIALS))?;

    let valid = state
        .hasher
        .verify(password, &user.password_hash)
        .map_err(|_| ApiError::internal("Failed to verify password"))?;
    if !valid {
        record_login(&state, &user, &client, Some("invalid password"));
        return Err(ApiError::unauthorized(INVALID_CREDENTIALS));
    }

    if user.is_frozen {
        record_login(&state, &user, &client, Some("account frozen"));
        return Err(ApiError::forbidden("Account is frozen"));
    }

    let now = Utc::now();
    user.last_login_ip = client.ip.clone();
    user.last_login_at = Some(now);
    user.updated_at = now;
    state
        .store
        .update_user(&user)
        .api_err("Failed to update user")?;

    let (token, session) = issue_session(&state, &user.id, req.remember_me)?;

    record_login(&state, &user, &client, None);
    audit::user_event(
        state.store.as_ref(),
        &user.id,
        UserOperation::Login,
        client.actor(&user.id),
        None,
    );
    tracing::info!("User {} signed in", user.username);

    let redirect = if user.is_admin() {
        "admin_dashboard"
    } else {
        "documents"
    };

    Ok::<_, ApiError>(Json(ApiResponse::success(LoginResponse {
        token,
        expires_at: session.expires_at,
        user,
        redirect,
    })))
}

pub async fn logout(
    auth: RequireSession,
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
) -> impl IntoResponse {
    state
        .store
        .delete_session(&auth.session.id)
        .api_err("Failed to delete session")?;

    if let Err(e) = state.store.close_login_logs(&auth.user.id, Utc::now()) {
        tracing::warn!("Failed to stamp logout time: {e}");
    }

    audit::user_event(
        state.store.as_ref(),
        &auth.user.id,
        UserOperation::Logout,
        client.actor(&auth.user.id),
        None,
    );

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}

pub async fn change_password(
    auth: RequireSession,
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
    Json(req): Json<ChangePasswordRequest>,
) -> impl IntoResponse {
    let mut user = auth.user;

    let valid = state
        .hasher
        .verify(&req.old_password, &user.password_hash)
        .map_err(|_| ApiError::internal("Failed to verify password"))?;
    if !valid {
        return Err(ApiError::bad_request("Old password is incorrect"));
    }
    if req.new_password != req.confirm_password {
        return Err(ApiError::bad_request("New passwords do not match"));
    }
    validate_password_policy(&req.new_password).map_err(ApiError::bad_request)?;

    let now = Utc::now();
    user.password_hash = state
        .hasher
        .hash(&req.new_password)
        .map_err(|_| ApiError::internal("Failed to hash password"))?;
    user.must_change_password = false;
    user.password_changed_at = Some(now);
    user.updated_at = now;
    state
        .store
        .update_user(&user)
        .api_err("Failed to update password")?;

    audit::user_event(
        state.store.as_ref(),
        &user.id,
        UserOperation::Update,
        client.actor(&user.id),
        Some(json!({ "action": "password_change" })),
    );

    Ok::<_, ApiError>(Json(ApiResponse::success(UserDetail::from(user))))
}
