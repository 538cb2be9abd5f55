use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::{BackupStatus, DocumentOperation, DocumentStatus, LogLevel, Role, UserOperation};

/// Percentage of `quota` consumed by `used`, rounded to two decimals.
/// Any nonzero usage reports at least 0.01 so it never reads as empty.
#[must_use]
pub fn usage_percentage(used: i64, quota: i64) -> f64 {
    if quota <= 0 || used <= 0 {
        return 0.0;
    }
    let percentage = used as f64 / quota as f64 * 100.0;
    if percentage < 0.01 {
        return 0.01;
    }
    (percentage * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub employee_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub department: String,
    pub role: Role,
    #[serde(skip)]
    pub password_hash: String,
    pub storage_quota: i64,
    pub storage_used: i64,
    pub is_frozen: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frozen_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frozen_at: Option<DateTime<Utc>>,
    pub must_change_password: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_changed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_login_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Family name first, no separator.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{}{}", self.last_name.trim(), self.first_name.trim())
    }

    /// Full name when known, otherwise the username.
    #[must_use]
    pub fn display_name(&self) -> String {
        let name = self.full_name();
        if name.is_empty() {
            self.username.clone()
        } else {
            name
        }
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    #[must_use]
    pub fn storage_remaining(&self) -> i64 {
        (self.storage_quota - self.storage_used).max(0)
    }

    #[must_use]
    pub fn can_upload(&self, size: i64) -> bool {
        self.storage_remaining() >= size
    }

    #[must_use]
    pub fn storage_usage_percentage(&self) -> f64 {
        usage_percentage(self.storage_used, self.storage_quota)
    }

    /// True when the password is older than `expiry_days`. Zero disables expiry.
    /// Accounts that never changed their password fall back to creation time.
    #[must_use]
    pub fn password_expired(&self, expiry_days: i64, now: DateTime<Utc>) -> bool {
        if expiry_days <= 0 {
            return false;
        }
        let since = self.password_changed_at.unwrap_or(self.created_at);
        now - since > Duration::days(expiry_days)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    #[serde(skip)]
    pub token_hash: String,
    #[serde(skip)]
    pub token_lookup: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub icon: String,
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    pub file_name: String,
    pub file_size: i64,
    pub file_type: String,
    pub file_hash: String,
    pub author_id: String,
    pub status: DocumentStatus,
    pub is_public: bool,
    pub is_starred: bool,
    pub download_count: i64,
    pub view_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<DateTime<Utc>>,
}

impl Document {
    #[must_use]
    pub fn is_visible_to(&self, user: &User) -> bool {
        self.author_id == user.id || self.is_public || user.is_admin()
    }

    /// File extension including the dot, or empty for `unknown`.
    #[must_use]
    pub fn extension(&self) -> String {
        if self.file_type == "unknown" {
            String::new()
        } else {
            format!(".{}", self.file_type)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentVersion {
    pub id: String,
    pub document_id: String,
    pub version_number: String,
    pub file_name: String,
    pub file_size: i64,
    pub file_hash: String,
    pub change_log: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Why a share link can no longer be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareUnavailable {
    Disabled,
    Expired,
    LimitReached,
}

impl ShareUnavailable {
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Expired => "expired",
            Self::LimitReached => "download limit reached",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareLink {
    pub id: String,
    pub document_id: String,
    pub token: String,
    #[serde(skip)]
    pub password_hash: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub max_downloads: i64,
    pub download_count: i64,
    pub is_active: bool,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl ShareLink {
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    #[must_use]
    pub fn limit_reached(&self) -> bool {
        self.max_downloads > 0 && self.download_count >= self.max_downloads
    }

    #[must_use]
    pub fn unavailable_reason(&self, now: DateTime<Utc>) -> Option<ShareUnavailable> {
        if !self.is_active {
            Some(ShareUnavailable::Disabled)
        } else if self.is_expired(now) {
            Some(ShareUnavailable::Expired)
        } else if self.limit_reached() {
            Some(ShareUnavailable::LimitReached)
        } else {
            None
        }
    }

    #[must_use]
    pub fn is_available(&self, now: DateTime<Utc>) -> bool {
        self.unavailable_reason(now).is_none()
    }

    #[must_use]
    pub fn requires_password(&self) -> bool {
        self.password_hash.is_some()
    }

    /// None means unlimited.
    #[must_use]
    pub fn remaining_downloads(&self) -> Option<i64> {
        (self.max_downloads > 0).then(|| (self.max_downloads - self.download_count).max(0))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub key: String,
    pub value: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemLog {
    pub id: i64,
    pub level: LogLevel,
    pub message: String,
    pub module: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginLog {
    pub id: i64,
    pub user_id: String,
    pub ip_address: String,
    pub user_agent: String,
    pub login_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logout_time: Option<DateTime<Utc>>,
    pub is_successful: bool,
    pub failure_reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserOperationLog {
    pub id: i64,
    pub user_id: String,
    pub operation: UserOperation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operated_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    pub user_agent: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentOperationLog {
    pub id: i64,
    pub document_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub operation: DocumentOperation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Backup {
    pub id: String,
    pub name: String,
    pub description: String,
    pub status: BackupStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    pub file_size: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(quota: i64, used: i64) -> User {
        let now = Utc::now();
        User {
            id: "u1".to_string(),
            username: "wang".to_string(),
            employee_id: "10001".to_string(),
            first_name: "Wei".to_string(),
            last_name: "Wang".to_string(),
            email: String::new(),
            department: String::new(),
            role: Role::Teacher,
            password_hash: String::new(),
            storage_quota: quota,
            storage_used: used,
            is_frozen: false,
            frozen_reason: None,
            frozen_at: None,
            must_change_password: false,
            password_changed_at: None,
            last_login_ip: None,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn share(max: i64, count: i64, active: bool, expires_in: Duration) -> ShareLink {
        let now = Utc::now();
        ShareLink {
            id: "s1".to_string(),
            document_id: "d1".to_string(),
            token: "tok".to_string(),
            password_hash: None,
            expires_at: now + expires_in,
            max_downloads: max,
            download_count: count,
            is_active: active,
            created_by: "u1".to_string(),
            created_at: now,
        }
    }

    #[test]
    fn test_usage_percentage_rules() {
        assert_eq!(usage_percentage(0, 100), 0.0);
        assert_eq!(usage_percentage(50, 0), 0.0);
        assert_eq!(usage_percentage(1, 1_000_000_000), 0.01);
        assert_eq!(usage_percentage(1, 3), 33.33);
        assert_eq!(usage_percentage(200, 100), 200.0);
    }

    #[test]
    fn test_storage_helpers() {
        let u = user(1000, 400);
        assert_eq!(u.storage_remaining(), 600);
        assert!(u.can_upload(600));
        assert!(!u.can_upload(601));

        let over = user(100, 150);
        assert_eq!(over.storage_remaining(), 0);
    }

    #[test]
    fn test_full_name_family_first() {
        let mut u = user(0, 0);
        assert_eq!(u.full_name(), "WangWei");
        u.first_name.clear();
        assert_eq!(u.full_name(), "Wang");
        u.last_name.clear();
        assert_eq!(u.full_name(), "");
        assert_eq!(u.display_name(), "wang");
    }

    #[test]
    fn test_password_expiry() {
        let mut u = user(0, 0);
        let now = Utc::now();
        u.password_changed_at = Some(now - Duration::days(91));
        assert!(u.password_expired(90, now));
        assert!(!u.password_expired(0, now));
        u.password_changed_at = Some(now - Duration::days(10));
        assert!(!u.password_expired(90, now));
    }

    #[test]
    fn test_share_availability() {
        let now = Utc::now();
        assert!(share(0, 100, true, Duration::days(1)).is_available(now));
        assert_eq!(
            share(3, 3, true, Duration::days(1)).unavailable_reason(now),
            Some(ShareUnavailable::LimitReached)
        );
        assert_eq!(
            share(0, 0, true, Duration::days(-1)).unavailable_reason(now),
            Some(ShareUnavailable::Expired)
        );
        assert_eq!(
            share(0, 0, false, Duration::days(-1)).unavailable_reason(now),
            Some(ShareUnavailable::Disabled)
        );
    }

    #[test]
    fn test_remaining_downloads() {
        assert_eq!(share(0, 5, true, Duration::days(1)).remaining_downloads(), None);
        assert_eq!(share(5, 2, true, Duration::days(1)).remaining_downloads(), Some(3));
        assert_eq!(share(5, 9, true, Duration::days(1)).remaining_downloads(), Some(0));
    }
}
