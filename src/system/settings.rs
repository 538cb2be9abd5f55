use crate::error::Result;
use crate::store::Store;

pub const MAX_FILE_SIZE: &str = "max_file_size";
pub const DEFAULT_STORAGE_QUOTA: &str = "default_storage_quota";
pub const PASSWORD_EXPIRY_DAYS: &str = "password_expiry_days";
pub const SHARE_LINK_EXPIRY_DAYS: &str = "share_link_expiry_days";
pub const BACKUP_RETENTION_DAYS: &str = "backup_retention_days";
pub const AUTO_BACKUP_ENABLED: &str = "auto_backup_enabled";
pub const ALLOWED_FILE_TYPES: &str = "allowed_file_types";

const MIN_RETENTION_FOR_AUTO_BACKUP: i64 = 7;

/// Built-in configuration entries: (key, value, description).
pub const DEFAULT_SETTINGS: &[(&str, &str, &str)] = &[
    (MAX_FILE_SIZE, "5120", "Maximum upload size in MB"),
    (DEFAULT_STORAGE_QUOTA, "10", "Default storage quota for new users in GB"),
    (PASSWORD_EXPIRY_DAYS, "90", "Days before a password must be changed (0 disables)"),
    (SHARE_LINK_EXPIRY_DAYS, "7", "Default lifetime of share links in days"),
    (BACKUP_RETENTION_DAYS, "7", "Days to keep completed backups"),
    (AUTO_BACKUP_ENABLED, "False", "Run a daily automatic backup"),
    (
        ALLOWED_FILE_TYPES,
        "pdf,doc,docx,ppt,pptx,xls,xlsx,txt,md,zip,rar,7z,jpg,jpeg,png,gif",
        "Comma-separated list of allowed upload extensions",
    ),
];

const NUMERIC_KEYS: &[&str] = &[
    MAX_FILE_SIZE,
    DEFAULT_STORAGE_QUOTA,
    PASSWORD_EXPIRY_DAYS,
    SHARE_LINK_EXPIRY_DAYS,
    BACKUP_RETENTION_DAYS,
];

fn default_value(key: &str) -> &'static str {
    DEFAULT_SETTINGS
        .iter()
        .find(|(k, _, _)| *k == key)
        .map_or("", |(_, v, _)| v)
}

#[must_use]
pub fn description_for(key: &str) -> Option<&'static str> {
    DEFAULT_SETTINGS
        .iter()
        .find(|(k, _, _)| *k == key)
        .map(|(_, _, d)| *d)
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

/// Typed view of the `system_config` table with built-in fallbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeSettings {
    pub max_file_size_mb: i64,
    pub default_storage_quota_gb: i64,
    pub password_expiry_days: i64,
    pub share_link_expiry_days: i64,
    pub backup_retention_days: i64,
    pub auto_backup_enabled: bool,
    pub allowed_file_types: Vec<String>,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl RuntimeSettings {
    pub fn load(store: &dyn Store) -> Result<Self> {
        let mut values = Vec::with_capacity(DEFAULT_SETTINGS.len());
        for (key, _, _) in DEFAULT_SETTINGS {
            values.push((*key, store.get_config_value(key)?));
        }

        Ok(Self::from_lookup(|key| {
            values
                .iter()
                .find(|(k, _)| *k == key)
                .and_then(|(_, v)| v.clone())
        }))
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let int = |key: &str| -> i64 {
            lookup(key)
                .and_then(|v| v.trim().parse::<i64>().ok())
                .filter(|v| *v >= 0)
                .or_else(|| default_value(key).parse().ok())
                .unwrap_or(0)
        };

        let allowed = lookup(ALLOWED_FILE_TYPES).unwrap_or_else(|| default_value(ALLOWED_FILE_TYPES).to_string());

        Self {
            max_file_size_mb: int(MAX_FILE_SIZE),
            default_storage_quota_gb: int(DEFAULT_STORAGE_QUOTA),
            password_expiry_days: int(PASSWORD_EXPIRY_DAYS),
            share_link_expiry_days: int(SHARE_LINK_EXPIRY_DAYS),
            backup_retention_days: int(BACKUP_RETENTION_DAYS),
            auto_backup_enabled: parse_bool(
                &lookup(AUTO_BACKUP_ENABLED).unwrap_or_else(|| default_value(AUTO_BACKUP_ENABLED).to_string()),
            ),
            allowed_file_types: allowed
                .split(',')
                .map(|t| t.trim().trim_start_matches('.').to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    #[must_use]
    pub fn max_file_size_bytes(&self) -> i64 {
        self.max_file_size_mb.saturating_mul(1024 * 1024)
    }

    #[must_use]
    pub fn default_storage_quota_bytes(&self) -> i64 {
        self.default_storage_quota_gb
            .saturating_mul(1024 * 1024 * 1024)
    }

    #[must_use]
    pub fn is_allowed_file_type(&self, file_type: &str) -> bool {
        self.allowed_file_types.iter().any(|t| t == file_type)
    }
}

/// Validates one entry of a configuration update and returns the value to
/// store. `current` looks up the value a key will have after the update.
pub fn normalize_setting(
    key: &str,
    value: &str,
    current: impl Fn(&str) -> Option<String>,
) -> std::result::Result<String, String> {
    if key.is_empty() {
        return Err("Configuration key cannot be empty".to_string());
    }
    if !key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(format!(
            "Configuration key '{key}' can only contain letters, digits, '_' and '-'"
        ));
    }

    let value = value.trim();

    if NUMERIC_KEYS.contains(&key) && value.parse::<u64>().is_err() {
        return Err(format!("'{key}' must be a non-negative integer"));
    }

    if key == BACKUP_RETENTION_DAYS
        && current(AUTO_BACKUP_ENABLED).is_some_and(|v| parse_bool(&v))
        && value.parse::<i64>().unwrap_or(0) < MIN_RETENTION_FOR_AUTO_BACKUP
    {
        return Err(format!(
            "'{BACKUP_RETENTION_DAYS}' must be at least {MIN_RETENTION_FOR_AUTO_BACKUP} days while automatic backups are enabled"
        ));
    }

    if key == AUTO_BACKUP_ENABLED {
        let enabled = parse_bool(value);
        if enabled {
            let retention = current(BACKUP_RETENTION_DAYS)
                .and_then(|v| v.trim().parse::<i64>().ok())
                .unwrap_or(0);
            if retention < MIN_RETENTION_FOR_AUTO_BACKUP {
                return Err(format!(
                    "Automatic backups require '{BACKUP_RETENTION_DAYS}' of at least {MIN_RETENTION_FOR_AUTO_BACKUP} days"
                ));
            }
        }
        return Ok(if enabled { "True" } else { "False" }.to_string());
    }

    Ok(value.to_string())
}
