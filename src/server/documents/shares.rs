use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use uuid::Uuid;

use super::access::load_owned;
use crate::auth::{RequireAuth, generate_share_token};
use crate::documents::resolve_share_expiry;
use crate::server::AppState;
use crate::server::dto::{CreateShareRequest, ShareView};
use crate::server::response::{ApiError, ApiResponse, StoreOptionExt, StoreResultExt};
use crate::server::validation::non_blank;
use crate::types::{ShareLink, User};

fn load_own_share(state: &AppState, user: &User, id: &str) -> Result<ShareLink, ApiError> {
    let share = state
        .store
        .get_share(id)
        .api_err("Failed to get share link")?
        .or_not_found("Share link not found")?;

    if share.created_by != user.id {
        return Err(ApiError::forbidden("Only the creator can manage this link"));
    }
    Ok(share)
}

pub async fn create_share(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<CreateShareRequest>,
) -> impl IntoResponse {
    let document = load_owned(&state, &auth.user, &id)?;
    let settings = state.settings().api_err("Failed to load settings")?;

    let now = Utc::now();
    let expires_at = resolve_share_expiry(req.expires_at, settings.share_link_expiry_days, now)
        .map_err(ApiError::bad_request)?;

    let max_downloads = req.max_downloads.unwrap_or(0);
    if max_downloads < 0 {
        return Err(ApiError::bad_request("Download limit cannot be negative"));
    }

    let password_hash = match non_blank(req.password) {
        Some(password) => Some(
            state
                .hasher
                .hash(&password)
                .map_err(|_| ApiError::internal("Failed to hash password"))?,
        ),
        None => None,
    };

    let share = ShareLink {
        id: Uuid::new_v4().to_string(),
        document_id: document.id,
        token: generate_share_token(),
        password_hash,
        expires_at,
        max_downloads,
        download_count: 0,
        is_active: true,
        created_by: auth.user.id.clone(),
        created_at: now,
    };

    state
        .store
        .create_share(&share)
        .api_err("Failed to create share link")?;

    tracing::info!("User {} shared document {}", auth.user.username, share.document_id);

    Ok::<_, ApiError>((
        StatusCode::CREATED,
        Json(ApiResponse::success(ShareView::new(
            share,
            Some(document.title),
            now,
        ))),
    ))
}

pub async fn list_shares(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let now = Utc::now();
    let shares: Vec<ShareView> = state
        .store
        .list_user_shares(&auth.user.id)
        .api_err("Failed to list share links")?
        .into_iter()
        .map(|row| ShareView::from_row(row, now))
        .collect();

    Ok::<_, ApiError>(Json(ApiResponse::success(shares)))
}

pub async fn delete_share(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let share = load_own_share(&state, &auth.user, &id)?;
    state
        .store
        .delete_share(&share.id)
        .api_err("Failed to delete share link")?;

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}

async fn set_active(
    auth: RequireAuth,
    state: Arc<AppState>,
    id: String,
    active: bool,
) -> Result<Json<ApiResponse<ShareView>>, ApiError> {
    let mut share = load_own_share(&state, &auth.user, &id)?;
    state
        .store
        .set_share_active(&share.id, active)
        .api_err("Failed to update share link")?;
    share.is_active = active;

    Ok(Json(ApiResponse::success(ShareView::new(
        share,
        None,
        Utc::now(),
    ))))
}

pub async fn disable_share(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    set_active(auth, state, id, false).await
}

pub async fn enable_share(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    set_active(auth, state, id, true).await
}
