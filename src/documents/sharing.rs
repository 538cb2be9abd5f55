use chrono::{DateTime, Duration, Utc};

use crate::auth::SecretHasher;
use crate::error::Result;
use crate::types::{ShareLink, ShareUnavailable};

/// Furthest a share link may expire from the time it is created.
pub const MAX_SHARE_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareDenied {
    Unavailable(ShareUnavailable),
    BadPassword,
}

/// Resolves the expiry of a new link: the requested time, or `default_days`
/// from now. Must be in the future and at most thirty days ahead. The default
/// is clamped into that window so a large configured value still works.
pub fn resolve_share_expiry(
    requested: Option<DateTime<Utc>>,
    default_days: i64,
    now: DateTime<Utc>,
) -> std::result::Result<DateTime<Utc>, String> {
    let expires_at = requested
        .unwrap_or_else(|| now + Duration::days(default_days.clamp(1, MAX_SHARE_DAYS)));

    if expires_at <= now {
        return Err("Expiry time must be in the future".to_string());
    }
    if expires_at > now + Duration::days(MAX_SHARE_DAYS) {
        return Err(format!(
            "Expiry time cannot be more than {MAX_SHARE_DAYS} days ahead"
        ));
    }
    Ok(expires_at)
}

/// Checks whether `password` opens the link at `now`.
pub fn check_share_access(
    share: &ShareLink,
    password: Option<&str>,
    hasher: &SecretHasher,
    now: DateTime<Utc>,
) -> Result<std::result::Result<(), ShareDenied>> {
    if let Some(reason) = share.unavailable_reason(now) {
        return Ok(Err(ShareDenied::Unavailable(reason)));
    }

    if let Some(hash) = &share.password_hash {
        let supplied = password.unwrap_or_default();
        if supplied.is_empty() || !hasher.verify(supplied, hash)? {
            return Ok(Err(ShareDenied::BadPassword));
        }
    }

    Ok(Ok(()))
}
