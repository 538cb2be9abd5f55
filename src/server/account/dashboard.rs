use std::sync::Arc;

use axum::{Json, extract::State, response::IntoResponse};
use chrono::{DateTime, Duration, NaiveTime, Utc};

use crate::auth::RequireAuth;
use crate::error::Result;
use crate::server::AppState;
use crate::server::dto::{DailyPoint, DocumentView, ShareCounts, StorageStats, TeacherDashboard};
use crate::server::response::{ApiError, ApiResponse, StoreResultExt};
use crate::store::Store;

const TOP_LIMIT: i64 = 5;
const RECENT_LIMIT: i64 = 5;
const TREND_DAYS: i64 = 7;

/// Cumulative size of the author's documents at the end of each of the
/// last seven days, oldest first.
fn storage_trend(store: &dyn Store, author_id: &str, now: DateTime<Utc>) -> Result<Vec<DailyPoint>> {
    let today = now.date_naive();
    (0..TREND_DAYS)
        .rev()
        .map(|offset| {
            let day = today - Duration::days(offset);
            let end_of_day =
                (day + Duration::days(1)).and_time(NaiveTime::MIN).and_utc() - Duration::microseconds(1);
            Ok(DailyPoint {
                label: day.format("%m-%d").to_string(),
                value: store.sum_document_sizes_until(author_id, end_of_day)?,
            })
        })
        .collect()
}

pub async fn get_dashboard(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    let user = &auth.user;
    let now = Utc::now();
    let week_ago = now - Duration::days(TREND_DAYS);

    let documents = store
        .count_documents(Some(user.id.as_str()))
        .api_err("Failed to count documents")?;
    let status_breakdown = store
        .count_documents_by_status(&user.id)
        .api_err("Failed to count documents")?;
    let top_categories = store
        .top_categories(&user.id, TOP_LIMIT)
        .api_err("Failed to load categories")?;
    let top_file_types = store
        .top_file_types(&user.id, TOP_LIMIT)
        .api_err("Failed to load file types")?;
    let recent_documents: Vec<DocumentView> = store
        .list_recent_documents(&user.id, RECENT_LIMIT)
        .api_err("Failed to load recent documents")?
        .into_iter()
        .map(Into::into)
        .collect();
    let (total_shares, active_shares) = store
        .count_user_shares(&user.id, now)
        .api_err("Failed to count share links")?;
    let uploads_last_7_days = store
        .count_documents_created_since(&user.id, week_ago)
        .api_err("Failed to count uploads")?;
    let operations_last_7_days = store
        .count_user_document_logs_since(&user.id, week_ago)
        .api_err("Failed to count operations")?;
    let storage_trend =
        storage_trend(store, &user.id, now).api_err("Failed to compute storage trend")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(TeacherDashboard {
        documents,
        status_breakdown,
        top_categories,
        top_file_types,
        storage: StorageStats::for_user(user),
        recent_documents,
        shares: ShareCounts {
            total: total_shares,
            active: active_shares,
        },
        uploads_last_7_days,
        operations_last_7_days,
        storage_trend,
    })))
}
