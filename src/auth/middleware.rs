use std::sync::Arc;

use axum::{
    Json,
    extract::FromRequestParts,
    http::{HeaderValue, StatusCode, header::AUTHORIZATION, request::Parts},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde_json::json;

use super::helpers::{SessionError, extract_bearer_token, validate_session};
use crate::server::AppState;
use crate::types::{Session, User};

/// A valid session whose user is not frozen. Does not enforce password
/// rotation, so it guards only change-password, logout and the profile read.
pub struct RequireSession {
    pub session: Session,
    pub user: User,
}

/// A valid session whose user is allowed to use the API.
pub struct RequireAuth {
    pub session: Session,
    pub user: User,
}

/// Like [`RequireAuth`] but only for administrators.
pub struct RequireAdmin {
    pub session: Session,
    pub user: User,
}

#[derive(Debug)]
pub enum AuthError {
    MissingAuth,
    InvalidScheme,
    InvalidToken,
    TokenExpired,
    Frozen,
    PasswordChangeRequired,
    NotAdmin,
    InternalError,
}

impl From<SessionError> for AuthError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::InvalidScheme => AuthError::InvalidScheme,
            SessionError::InvalidToken => AuthError::InvalidToken,
            SessionError::TokenExpired => AuthError::TokenExpired,
            SessionError::Frozen => AuthError::Frozen,
            SessionError::InternalError => AuthError::InternalError,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingAuth => (StatusCode::UNAUTHORIZED, "Authentication required"),
            AuthError::InvalidScheme => (StatusCode::UNAUTHORIZED, "Invalid authorization scheme"),
            AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "Invalid token"),
            AuthError::TokenExpired => (StatusCode::UNAUTHORIZED, "Session expired"),
            AuthError::Frozen => (StatusCode::FORBIDDEN, "Account is frozen"),
            AuthError::PasswordChangeRequired => {
                (StatusCode::FORBIDDEN, "Password change required")
            }
            AuthError::NotAdmin => (StatusCode::FORBIDDEN, "Admin access required"),
            AuthError::InternalError => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        let body = json!({ "data": null, "error": message });

        let mut response = (status, Json(body)).into_response();

        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                "WWW-Authenticate",
                HeaderValue::from_static("Bearer realm=\"lectern\""),
            );
        }

        response
    }
}

impl FromRequestParts<Arc<AppState>> for RequireSession {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let (session, user) = extract_and_validate_session(parts, state)?;
        Ok(RequireSession { session, user })
    }
}

impl FromRequestParts<Arc<AppState>> for RequireAuth {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let (session, user) = extract_and_validate_session(parts, state)?;
        enforce_password_rotation(state, &user)?;
        Ok(RequireAuth { session, user })
    }
}

impl FromRequestParts<Arc<AppState>> for RequireAdmin {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let (session, user) = extract_and_validate_session(parts, state)?;
        enforce_password_rotation(state, &user)?;

        if !user.is_admin() {
            return Err(AuthError::NotAdmin);
        }

        Ok(RequireAdmin { session, user })
    }
}

fn extract_and_validate_session(
    parts: &Parts,
    state: &Arc<AppState>,
) -> Result<(Session, User), AuthError> {
    let auth_header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let raw_token = extract_bearer_token(auth_header)?.ok_or(AuthError::MissingAuth)?;
    let validated = validate_session(state, &raw_token)?;

    Ok((validated.session, validated.user))
}

fn enforce_password_rotation(state: &Arc<AppState>, user: &User) -> Result<(), AuthError> {
    if user.must_change_password {
        return Err(AuthError::PasswordChangeRequired);
    }

    let settings = state.settings().map_err(|_| AuthError::InternalError)?;
    if user.password_expired(settings.password_expiry_days, Utc::now()) {
        return Err(AuthError::PasswordChangeRequired);
    }

    Ok(())
}
