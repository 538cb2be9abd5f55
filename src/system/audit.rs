use chrono::Utc;
use serde_json::Value;

use crate::store::Store;
use crate::types::{
    DocumentOperation, DocumentOperationLog, LogLevel, SystemLog, UserOperation, UserOperationLog,
};

/// Who performed an audited action and from where.
#[derive(Debug, Clone, Copy, Default)]
pub struct Actor<'a> {
    pub user_id: Option<&'a str>,
    pub ip: Option<&'a str>,
    pub user_agent: &'a str,
}

impl<'a> Actor<'a> {
    #[must_use]
    pub const fn system() -> Self {
        Self {
            user_id: None,
            ip: None,
            user_agent: "",
        }
    }
}

/// Persists a system log entry and mirrors it to tracing.
/// Audit failures never fail the operation being audited.
pub fn system_event(
    store: &dyn Store,
    level: LogLevel,
    module: &str,
    message: impl Into<String>,
    actor: Actor<'_>,
    details: Option<Value>,
) {
    let message = message.into();

    match level {
        LogLevel::Debug => tracing::debug!(module, "{message}"),
        LogLevel::Info => tracing::info!(module, "{message}"),
        LogLevel::Warning => tracing::warn!(module, "{message}"),
        LogLevel::Error | LogLevel::Critical => tracing::error!(module, "{message}"),
    }

    let log = SystemLog {
        id: 0,
        level,
        message,
        module: module.to_string(),
        user_id: actor.user_id.map(str::to_string),
        ip_address: actor.ip.map(str::to_string),
        details,
        created_at: Utc::now(),
    };

    if let Err(e) = store.insert_system_log(&log) {
        tracing::warn!("Failed to write system log: {e}");
    }
}

/// Records an operation performed on a user account.
pub fn user_event(
    store: &dyn Store,
    user_id: &str,
    operation: UserOperation,
    actor: Actor<'_>,
    details: Option<Value>,
) {
    let log = UserOperationLog {
        id: 0,
        user_id: user_id.to_string(),
        operation,
        operated_by: actor.user_id.map(str::to_string),
        ip_address: actor.ip.map(str::to_string),
        user_agent: actor.user_agent.to_string(),
        details,
        created_at: Utc::now(),
    };

    if let Err(e) = store.insert_user_log(&log) {
        tracing::warn!("Failed to write user operation log: {e}");
    }
}

/// Records an operation performed on a document.
pub fn document_event(
    store: &dyn Store,
    document_id: &str,
    operation: DocumentOperation,
    actor: Actor<'_>,
    details: Option<Value>,
) {
    let log = DocumentOperationLog {
        id: 0,
        document_id: document_id.to_string(),
        user_id: actor.user_id.map(str::to_string),
        operation,
        ip_address: actor.ip.map(str::to_string),
        details,
        created_at: Utc::now(),
    };

    if let Err(e) = store.insert_document_log(&log) {
        tracing::warn!("Failed to write document operation log: {e}");
    }
}
