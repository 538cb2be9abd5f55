use std::sync::Arc;

use axum::{Json, extract::State, response::IntoResponse};
use chrono::{Duration, Utc};

use crate::auth::RequireAdmin;
use crate::server::AppState;
use crate::server::dto::{AdminDashboard, RecentLogin, StorageStats, UserStorageRow};
use crate::server::response::{ApiError, ApiResponse, StoreResultExt};
use crate::store::{LoginLogFilter, Page};

const RECENT_USERS: i64 = 5;
const RECENT_LOGINS: i64 = 10;

pub async fn get_dashboard(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    let now = Utc::now();

    let users = store.count_users().api_err("Failed to count users")?;
    let documents = store
        .count_documents(None)
        .api_err("Failed to count documents")?;

    let by_storage = store
        .list_users_by_storage()
        .api_err("Failed to list storage usage")?;
    let (used, quota) = by_storage.iter().fold((0i64, 0i64), |(used, quota), u| {
        (
            used.saturating_add(u.storage_used),
            quota.saturating_add(u.storage_quota),
        )
    });
    let user_storage = by_storage
        .iter()
        .map(|u| UserStorageRow {
            id: u.id.clone(),
            username: u.username.clone(),
            full_name: u.full_name(),
            storage: StorageStats::for_user(u),
        })
        .collect();

    let recent_users = store
        .list_recent_users(RECENT_USERS)
        .api_err("Failed to list recent users")?;

    let successful = LoginLogFilter {
        successful: Some(true),
        ..LoginLogFilter::default()
    };
    let (logins, _) = store
        .list_login_logs(&successful, Page::new(Some(1), Some(RECENT_LOGINS), RECENT_LOGINS))
        .api_err("Failed to list recent logins")?;
    let recent_logins = logins
        .into_iter()
        .map(|row| RecentLogin {
            log: row.log,
            username: row.username,
        })
        .collect();

    let failed_logins_24h = store
        .count_failed_logins_since(now - Duration::hours(24))
        .api_err("Failed to count failed logins")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(AdminDashboard {
        users,
        pending_reviews: documents.in_review,
        total_downloads: documents.downloads,
        documents,
        storage: StorageStats::new(used, quota),
        user_storage,
        recent_users,
        recent_logins,
        failed_logins_24h,
    })))
}
