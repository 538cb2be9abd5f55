use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::documents::format_size;
use crate::store::{CategorySummary, DocumentCounts, DocumentRow, NamedCount, ShareRow, UserCounts};
use crate::types::{Document, LoginLog, ShareLink, User, usage_percentage};

#[derive(Debug, Default, Deserialize)]
pub struct PaginationParams {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

// Accounts

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub account: String,
    pub password: String,
    #[serde(default)]
    pub remember_me: bool,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: User,
    pub redirect: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateProfileRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub department: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StorageStats {
    pub quota: i64,
    pub used: i64,
    pub remaining: i64,
    pub percentage: f64,
    pub quota_human: String,
    pub used_human: String,
}

impl StorageStats {
    #[must_use]
    pub fn new(used: i64, quota: i64) -> Self {
        Self {
            quota,
            used,
            remaining: (quota - used).max(0),
            percentage: usage_percentage(used, quota),
            quota_human: format_size(quota),
            used_human: format_size(used),
        }
    }

    #[must_use]
    pub fn for_user(user: &User) -> Self {
        Self {
            percentage: user.storage_usage_percentage(),
            ..Self::new(user.storage_used, user.storage_quota)
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UserDetail {
    #[serde(flatten)]
    pub user: User,
    pub full_name: String,
    pub storage: StorageStats,
}

impl From<User> for UserDetail {
    fn from(user: User) -> Self {
        Self {
            full_name: user.full_name(),
            storage: StorageStats::for_user(&user),
            user,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginLogParams {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub ip: Option<String>,
    pub status: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// Maps `success` / `failed` to a filter value. Anything else is no filter.
#[must_use]
pub fn parse_login_status(status: Option<&str>) -> Option<bool> {
    match status.map(str::trim) {
        Some("success") => Some(true),
        Some("failed") => Some(false),
        _ => None,
    }
}

// Documents

#[derive(Debug, Default, Deserialize)]
pub struct DocumentListParams {
    pub category: Option<String>,
    pub status: Option<String>,
    pub file_type: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub search: Option<String>,
    pub mine: Option<bool>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct FacetsResponse {
    pub categories: Vec<CategoryView>,
    pub file_types: Vec<String>,
    pub statuses: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct DocumentView {
    #[serde(flatten)]
    pub document: Document,
    pub size_human: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_name: Option<String>,
}

impl From<Document> for DocumentView {
    fn from(document: Document) -> Self {
        Self {
            size_human: format_size(document.file_size),
            document,
            author_name: None,
            category_name: None,
        }
    }
}

impl From<DocumentRow> for DocumentView {
    fn from(row: DocumentRow) -> Self {
        Self {
            size_human: format_size(row.document.file_size),
            document: row.document,
            author_name: Some(row.author_name),
            category_name: row.category_name,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    #[serde(flatten)]
    pub document: DocumentView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplicate_of: Option<String>,
}

/// An empty `category_id` clears the category.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateDocumentRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category_id: Option<String>,
    pub is_public: Option<bool>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BatchDeleteRequest {
    pub ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct BatchDeleteResponse {
    pub deleted: usize,
    pub freed_bytes: i64,
    pub freed_human: String,
}

#[derive(Debug, Serialize)]
pub struct DocumentInfo {
    pub id: String,
    pub title: String,
    pub description: String,
    pub file_type: String,
    pub file_size: i64,
    pub size_human: String,
    pub status: crate::types::DocumentStatus,
    pub is_public: bool,
    pub author_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_name: Option<String>,
    pub download_count: i64,
    pub view_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub can_edit: bool,
}

#[derive(Debug, Serialize)]
pub struct StarResponse {
    pub is_starred: bool,
}

// Shares

#[derive(Debug, Default, Deserialize)]
pub struct CreateShareRequest {
    pub password: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub max_downloads: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ShareView {
    #[serde(flatten)]
    pub share: ShareLink,
    pub url: String,
    pub requires_password: bool,
    pub is_available: bool,
    pub remaining_downloads: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_title: Option<String>,
}

impl ShareView {
    #[must_use]
    pub fn new(share: ShareLink, document_title: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            url: format!("/s/{}", share.token),
            requires_password: share.requires_password(),
            is_available: share.is_available(now),
            remaining_downloads: share.remaining_downloads(),
            share,
            document_title,
        }
    }

    #[must_use]
    pub fn from_row(row: ShareRow, now: DateTime<Utc>) -> Self {
        Self::new(row.share, Some(row.document_title), now)
    }
}

#[derive(Debug, Serialize)]
pub struct PublicShareView {
    pub title: String,
    pub file_size: i64,
    pub size_human: String,
    pub file_type: String,
    pub requires_password: bool,
    pub expires_at: DateTime<Utc>,
    pub remaining_downloads: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ShareAccessRequest {
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ShareDownloadParams {
    pub password: Option<String>,
}

// Categories

#[derive(Debug, Serialize)]
pub struct CategoryView {
    #[serde(flatten)]
    pub summary: CategorySummary,
    pub full_path: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateCategoryRequest {
    pub name: String,
    pub parent_id: Option<String>,
    pub icon: Option<String>,
}

/// An empty `parent_id` makes the category top-level.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateCategoryRequest {
    pub name: Option<String>,
    pub parent_id: Option<String>,
    pub icon: Option<String>,
    pub is_active: Option<bool>,
}

// Review

#[derive(Debug, Deserialize)]
pub struct ReviewDecisionRequest {
    pub action: String,
    pub comment: Option<String>,
}

// Dashboards

#[derive(Debug, Serialize)]
pub struct DailyPoint {
    pub label: String,
    pub value: i64,
}

#[derive(Debug, Serialize)]
pub struct ShareCounts {
    pub total: i64,
    pub active: i64,
}

#[derive(Debug, Serialize)]
pub struct TeacherDashboard {
    pub documents: DocumentCounts,
    pub status_breakdown: Vec<NamedCount>,
    pub top_categories: Vec<NamedCount>,
    pub top_file_types: Vec<NamedCount>,
    pub storage: StorageStats,
    pub recent_documents: Vec<DocumentView>,
    pub shares: ShareCounts,
    pub uploads_last_7_days: i64,
    pub operations_last_7_days: i64,
    pub storage_trend: Vec<DailyPoint>,
}

#[derive(Debug, Serialize)]
pub struct UserStorageRow {
    pub id: String,
    pub username: String,
    pub full_name: String,
    pub storage: StorageStats,
}

#[derive(Debug, Serialize)]
pub struct RecentLogin {
    #[serde(flatten)]
    pub log: LoginLog,
    pub username: String,
}

#[derive(Debug, Serialize)]
pub struct AdminDashboard {
    pub users: UserCounts,
    pub documents: DocumentCounts,
    pub pending_reviews: i64,
    pub total_downloads: i64,
    pub storage: StorageStats,
    pub user_storage: Vec<UserStorageRow>,
    pub recent_users: Vec<User>,
    pub recent_logins: Vec<RecentLogin>,
    pub failed_logins_24h: i64,
}

// Administration

#[derive(Debug, Default, Deserialize)]
pub struct UserListParams {
    pub role: Option<String>,
    pub department: Option<String>,
    pub status: Option<String>,
    pub search: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub employee_id: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub department: String,
    pub role: String,
    pub password: String,
    pub confirm_password: String,
    pub storage_quota_gb: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub username: Option<String>,
    pub employee_id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub department: Option<String>,
    pub role: Option<String>,
    pub storage_quota_gb: Option<i64>,
    pub is_frozen: Option<bool>,
    pub frozen_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FreezeRequest {
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateConfigRequest {
    pub entries: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SystemLogParams {
    pub level: Option<String>,
    pub module: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AdminLoginLogParams {
    pub user_id: Option<String>,
    pub status: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DocumentLogParams {
    pub document_id: Option<String>,
    pub user_id: Option<String>,
    pub operation: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateBackupRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_stats() {
        let stats = StorageStats::new(1536, 1024 * 1024);
        assert_eq!(stats.remaining, 1024 * 1024 - 1536);
        assert_eq!(stats.used_human, "1.5 KB");
        assert_eq!(stats.quota_human, "1.0 MB");
        assert!((stats.percentage - 0.15).abs() < f64::EPSILON);

        let over = StorageStats::new(10, 5);
        assert_eq!(over.remaining, 0);
    }

    #[test]
    fn test_parse_login_status() {
        assert_eq!(parse_login_status(Some("success")), Some(true));
        assert_eq!(parse_login_status(Some("failed")), Some(false));
        assert_eq!(parse_login_status(Some("other")), None);
        assert_eq!(parse_login_status(None), None);
    }
}
