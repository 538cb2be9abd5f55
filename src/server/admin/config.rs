use std::sync::Arc;

use axum::{Json, extract::State, response::IntoResponse};
use serde_json::json;

use crate::auth::RequireAdmin;
use crate::server::AppState;
use crate::server::client::ClientInfo;
use crate::server::dto::UpdateConfigRequest;
use crate::server::response::{ApiError, ApiResponse, StoreResultExt};
use crate::system::settings::description_for;
use crate::system::{DEFAULT_SETTINGS, audit, normalize_setting};
use crate::types::LogLevel;

pub async fn get_config(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    state
        .store
        .insert_missing_config(DEFAULT_SETTINGS)
        .api_err("Failed to initialize configuration")?;

    let entries = state
        .store
        .list_config()
        .api_err("Failed to list configuration")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(entries)))
}

pub async fn update_config(
    admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
    Json(req): Json<UpdateConfigRequest>,
) -> impl IntoResponse {
    if req.entries.is_empty() {
        return Err(ApiError::bad_request("No configuration entries given"));
    }

    // Validate everything before writing anything. Cross-key rules see the
    // submitted values first.
    let mut normalized = Vec::with_capacity(req.entries.len());
    for (key, value) in &req.entries {
        let key = key.trim();
        let value = normalize_setting(key, value, |other| match req.entries.get(other) {
            Some(pending) => Some(pending.clone()),
            None => state.store.get_config_value(other).ok().flatten(),
        })
        .map_err(ApiError::bad_request)?;
        normalized.push((key.to_string(), value));
    }

    for (key, value) in &normalized {
        state
            .store
            .set_config_value(key, value, description_for(key))
            .api_err("Failed to save configuration")?;
    }

    let keys: Vec<&str> = normalized.iter().map(|(k, _)| k.as_str()).collect();
    audit::system_event(
        state.store.as_ref(),
        LogLevel::Info,
        "config",
        format!("Configuration updated: {}", keys.join(", ")),
        client.actor(&admin.user.id),
        Some(json!({ "entries": req.entries })),
    );

    let entries = state
        .store
        .list_config()
        .api_err("Failed to list configuration")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(entries)))
}
