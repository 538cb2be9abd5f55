mod schema;
mod sqlite;

pub use sqlite::SqliteStore;

use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::types::*;

/// One page of a listing. Pages are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: i64,
    pub per_page: i64,
}

impl Page {
    pub const MAX_PER_PAGE: i64 = 100;

    #[must_use]
    pub fn new(page: Option<i64>, per_page: Option<i64>, default_per_page: i64) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            per_page: per_page
                .unwrap_or(default_per_page)
                .clamp(1, Self::MAX_PER_PAGE),
        }
    }

    #[must_use]
    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.per_page
    }
}

#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub role: Option<Role>,
    pub department: Option<String>,
    pub frozen: Option<bool>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct DocumentFilter {
    /// Restrict to documents this user may see (own plus public).
    /// None lists every document.
    pub visible_to: Option<String>,
    pub author_id: Option<String>,
    pub category_id: Option<String>,
    pub status: Option<DocumentStatus>,
    pub file_type: Option<String>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct LoginLogFilter {
    pub user_id: Option<String>,
    pub successful: Option<bool>,
    pub ip_address: Option<String>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default)]
pub struct DocumentLogFilter {
    pub document_id: Option<String>,
    pub user_id: Option<String>,
    pub operation: Option<DocumentOperation>,
}

/// A document joined with display names for listings.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentRow {
    #[serde(flatten)]
    pub document: Document,
    pub author_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategorySummary {
    #[serde(flatten)]
    pub category: Category,
    pub document_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShareRow {
    #[serde(flatten)]
    pub share: ShareLink,
    pub document_title: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginRow {
    #[serde(flatten)]
    pub log: LoginLog,
    pub username: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UserCounts {
    pub total: i64,
    pub teachers: i64,
    pub admins: i64,
    pub frozen: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DocumentCounts {
    pub total: i64,
    pub public: i64,
    pub private: i64,
    pub rejected: i64,
    pub in_review: i64,
    pub downloads: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct NamedCount {
    pub name: String,
    pub count: i64,
}

/// Store defines the database interface.
pub trait Store: Send + Sync {
    fn initialize(&self) -> Result<()>;

    // User operations
    fn create_user(&self, user: &User) -> Result<()>;
    fn get_user(&self, id: &str) -> Result<Option<User>>;
    fn get_user_by_username(&self, username: &str) -> Result<Option<User>>;
    fn get_user_by_employee_id(&self, employee_id: &str) -> Result<Option<User>>;
    fn get_user_by_email(&self, email: &str) -> Result<Option<User>>;
    fn list_users(&self, filter: &UserFilter, page: Page) -> Result<(Vec<User>, i64)>;
    fn list_departments(&self) -> Result<Vec<String>>;
    fn list_users_by_storage(&self) -> Result<Vec<User>>;
    fn list_recent_users(&self, limit: i64) -> Result<Vec<User>>;
    fn update_user(&self, user: &User) -> Result<()>;
    fn delete_user(&self, id: &str) -> Result<bool>;
    fn count_users(&self) -> Result<UserCounts>;
    fn has_admin(&self) -> Result<bool>;
    /// Adds `delta` bytes to the user's storage_used. A positive delta only
    /// applies if the result stays within the quota; returns false otherwise.
    /// A negative delta never takes usage below zero.
    fn adjust_storage_used(&self, user_id: &str, delta: i64) -> Result<bool>;

    // Session operations
    fn create_session(&self, session: &Session) -> Result<()>;
    fn get_session_by_lookup(&self, lookup: &str) -> Result<Option<Session>>;
    fn delete_session(&self, id: &str) -> Result<bool>;
    fn delete_user_sessions(&self, user_id: &str) -> Result<usize>;
    fn touch_session(&self, id: &str) -> Result<()>;
    fn delete_expired_sessions(&self, now: DateTime<Utc>) -> Result<usize>;

    // Category operations
    fn create_category(&self, category: &Category) -> Result<()>;
    fn get_category(&self, id: &str) -> Result<Option<Category>>;
    fn get_category_by_name(&self, name: &str) -> Result<Option<Category>>;
    /// Categories with document counts. With a user id, only categories
    /// created by an administrator or by that user are returned.
    fn list_categories(&self, visible_to: Option<&str>) -> Result<Vec<CategorySummary>>;
    fn list_child_categories(&self, parent_id: &str) -> Result<Vec<Category>>;
    fn update_category(&self, category: &Category) -> Result<()>;
    fn delete_category(&self, id: &str) -> Result<bool>;

    // Document operations
    /// Inserts a document with its first version, charging its size against
    /// the author's quota in the same transaction.
    fn create_document(&self, document: &Document, version: &DocumentVersion) -> Result<()>;
    fn get_document(&self, id: &str) -> Result<Option<Document>>;
    fn find_document_by_hash(&self, hash: &str, exclude_id: &str) -> Result<Option<Document>>;
    fn list_documents(&self, filter: &DocumentFilter, page: Page)
    -> Result<(Vec<DocumentRow>, i64)>;
    fn list_recent_documents(&self, author_id: &str, limit: i64) -> Result<Vec<DocumentRow>>;
    fn list_file_types(&self, visible_to: Option<&str>) -> Result<Vec<String>>;
    fn list_category_documents(&self, author_id: &str, category_ids: &[String])
    -> Result<Vec<DocumentRow>>;
    fn update_document(&self, document: &Document) -> Result<()>;
    /// Replaces the current content of a document: inserts `versions`, writes
    /// the file columns of `document` and applies `size_delta` to the
    /// author's quota, all in one transaction.
    fn commit_document_content(
        &self,
        document: &Document,
        versions: &[DocumentVersion],
        size_delta: i64,
    ) -> Result<()>;
    /// Undoes [`Store::commit_document_content`]: restores the file columns
    /// of `previous`, removes `version_ids` and gives back `size_delta`.
    fn revert_document_content(
        &self,
        previous: &Document,
        version_ids: &[String],
        size_delta: i64,
    ) -> Result<()>;
    fn increment_view_count(&self, id: &str) -> Result<()>;
    fn increment_download_count(&self, id: &str) -> Result<()>;
    /// Deletes the document and frees its size from the author's usage.
    /// Returns the freed byte count, or None if the document did not exist.
    fn delete_document(&self, id: &str) -> Result<Option<i64>>;
    fn count_documents(&self, author_id: Option<&str>) -> Result<DocumentCounts>;
    fn count_documents_by_status(&self, author_id: &str) -> Result<Vec<NamedCount>>;
    fn top_categories(&self, author_id: &str, limit: i64) -> Result<Vec<NamedCount>>;
    fn top_file_types(&self, author_id: &str, limit: i64) -> Result<Vec<NamedCount>>;
    fn count_documents_created_since(&self, author_id: &str, since: DateTime<Utc>) -> Result<i64>;
    fn sum_document_sizes_until(&self, author_id: &str, until: DateTime<Utc>) -> Result<i64>;
    fn list_author_document_ids(&self, author_id: &str) -> Result<Vec<String>>;

    // Version operations
    fn list_versions(&self, document_id: &str) -> Result<Vec<DocumentVersion>>;
    fn get_version(&self, id: &str) -> Result<Option<DocumentVersion>>;

    // Share link operations
    fn create_share(&self, share: &ShareLink) -> Result<()>;
    fn get_share(&self, id: &str) -> Result<Option<ShareLink>>;
    fn get_share_by_token(&self, token: &str) -> Result<Option<ShareLink>>;
    fn list_user_shares(&self, user_id: &str) -> Result<Vec<ShareRow>>;
    fn set_share_active(&self, id: &str, active: bool) -> Result<()>;
    fn delete_share(&self, id: &str) -> Result<bool>;
    /// Counts one download if the link is still available at `now`.
    fn consume_share_download(&self, id: &str, now: DateTime<Utc>) -> Result<bool>;
    fn deactivate_expired_shares(&self, now: DateTime<Utc>) -> Result<usize>;
    /// Returns (total, active and unexpired) links created by the user.
    fn count_user_shares(&self, user_id: &str, now: DateTime<Utc>) -> Result<(i64, i64)>;

    // System config operations
    fn get_config_value(&self, key: &str) -> Result<Option<String>>;
    fn set_config_value(&self, key: &str, value: &str, description: Option<&str>) -> Result<()>;
    fn insert_missing_config(&self, defaults: &[(&str, &str, &str)]) -> Result<usize>;
    fn list_config(&self) -> Result<Vec<ConfigEntry>>;

    // Audit log operations
    fn insert_system_log(&self, log: &SystemLog) -> Result<i64>;
    fn list_system_logs(
        &self,
        level: Option<LogLevel>,
        module: Option<&str>,
        page: Page,
    ) -> Result<(Vec<SystemLog>, i64)>;
    fn insert_login_log(&self, log: &LoginLog) -> Result<i64>;
    fn close_login_logs(&self, user_id: &str, now: DateTime<Utc>) -> Result<usize>;
    fn list_login_logs(&self, filter: &LoginLogFilter, page: Page) -> Result<(Vec<LoginRow>, i64)>;
    fn count_failed_logins_since(&self, since: DateTime<Utc>) -> Result<i64>;
    fn insert_user_log(&self, log: &UserOperationLog) -> Result<i64>;
    fn list_user_logs(&self, user_id: &str, page: Page) -> Result<(Vec<UserOperationLog>, i64)>;
    fn insert_document_log(&self, log: &DocumentOperationLog) -> Result<i64>;
    fn list_document_logs(
        &self,
        filter: &DocumentLogFilter,
        page: Page,
    ) -> Result<(Vec<DocumentOperationLog>, i64)>;
    fn count_user_document_logs_since(&self, user_id: &str, since: DateTime<Utc>) -> Result<i64>;

    // Backup operations
    fn create_backup(&self, backup: &Backup) -> Result<()>;
    fn get_backup(&self, id: &str) -> Result<Option<Backup>>;
    fn list_backups(&self, page: Page) -> Result<(Vec<Backup>, i64)>;
    fn update_backup(&self, backup: &Backup) -> Result<()>;
    fn delete_backup(&self, id: &str) -> Result<bool>;
    fn has_completed_backup_since(&self, since: DateTime<Utc>) -> Result<bool>;
    fn list_completed_backups_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Backup>>;
    /// Writes a consistent copy of the database to `path`.
    fn snapshot_to(&self, path: &Path) -> Result<()>;

    fn close(&self) -> Result<()>;
}
