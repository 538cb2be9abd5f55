use std::sync::Arc;

use chrono::Utc;

use super::parse_token;
use crate::server::AppState;
use crate::types::{Session, User};

#[derive(Debug)]
pub enum SessionError {
    InvalidScheme,
    InvalidToken,
    TokenExpired,
    Frozen,
    InternalError,
}

pub struct ValidatedSession {
    pub session: Session,
    pub user: User,
}

/// Extracts a bearer token from the Authorization header.
/// Returns Ok(None) if no header is present.
pub fn extract_bearer_token(auth_header: Option<&str>) -> Result<Option<String>, SessionError> {
    match auth_header {
        Some(header) => header
            .strip_prefix("Bearer ")
            .map(|token| Some(token.trim().to_string()))
            .ok_or(SessionError::InvalidScheme),
        None => Ok(None),
    }
}

/// Validates a raw session token against the store and loads its user.
/// Sessions of a frozen user are revoked on sight.
pub fn validate_session(
    state: &Arc<AppState>,
    raw_token: &str,
) -> Result<ValidatedSession, SessionError> {
    let (lookup, _secret) = parse_token(raw_token).map_err(|_| SessionError::InvalidToken)?;

    let session = state
        .store
        .get_session_by_lookup(&lookup)
        .map_err(|_| SessionError::InternalError)?
        .ok_or(SessionError::InvalidToken)?;

    if !state
        .tokens
        .verify(raw_token, &session.token_hash)
        .map_err(|_| SessionError::InternalError)?
    {
        return Err(SessionError::InvalidToken);
    }

    if session.expires_at < Utc::now() {
        if let Err(e) = state.store.delete_session(&session.id) {
            tracing::warn!("Failed to delete expired session: {e}");
        }
        return Err(SessionError::TokenExpired);
    }

    let user = state
        .store
        .get_user(&session.user_id)
        .map_err(|_| SessionError::InternalError)?
        .ok_or(SessionError::InvalidToken)?;

    if user.is_frozen {
        match state.store.delete_user_sessions(&user.id) {
            Ok(count) => tracing::info!("Revoked {count} session(s) of frozen user {}", user.username),
            Err(e) => tracing::warn!("Failed to revoke sessions of frozen user: {e}"),
        }
        return Err(SessionError::Frozen);
    }

    if let Err(e) = state.store.touch_session(&session.id) {
        tracing::warn!("Failed to update session last_used_at: {e}");
    }

    Ok(ValidatedSession { session, user })
}
