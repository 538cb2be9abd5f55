use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error};

use crate::config::ServerConfig;
use crate::error::Result;
use crate::store::Store;
use crate::types::LogLevel;

use super::audit::{self, Actor};
use super::backup;
use super::settings::RuntimeSettings;

const AUTO_BACKUP_NAME: &str = "auto";
const AUTO_BACKUP_EVERY_HOURS: i64 = 24;

/// Deactivates share links that expired before `now`.
pub fn cleanup_expired_shares(store: &dyn Store, now: DateTime<Utc>) -> Result<usize> {
    let count = store.deactivate_expired_shares(now)?;
    audit::system_event(
        store,
        LogLevel::Info,
        "share_cleanup",
        format!("Deactivated {count} expired share links"),
        Actor::system(),
        Some(json!({ "count": count })),
    );
    Ok(count)
}

/// What one maintenance pass did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub shares_deactivated: usize,
    pub sessions_pruned: usize,
    pub auto_backup: Option<String>,
    pub backups_pruned: usize,
}

/// Periodic housekeeping: share expiry, session pruning and backups.
pub struct Maintenance {
    store: Arc<dyn Store>,
    config: ServerConfig,
}

impl Maintenance {
    pub fn new(store: Arc<dyn Store>, config: ServerConfig) -> Self {
        Self { store, config }
    }

    /// Runs a single pass. Blocking.
    pub fn run_once(&self, now: DateTime<Utc>) -> Result<MaintenanceReport> {
        let store = self.store.as_ref();
        let settings = RuntimeSettings::load(store)?;
        let mut report = MaintenanceReport {
            shares_deactivated: cleanup_expired_shares(store, now)?,
            sessions_pruned: store.delete_expired_sessions(now)?,
            ..MaintenanceReport::default()
        };

        if settings.auto_backup_enabled
            && !store.has_completed_backup_since(now - Duration::hours(AUTO_BACKUP_EVERY_HOURS))?
        {
            let pending = backup::create_pending_backup(
                store,
                AUTO_BACKUP_NAME,
                "Automatic backup",
                None,
            )?;
            let finished = backup::run_backup(store, &self.config, &pending.id)?;
            report.auto_backup = Some(finished.id);
        }

        report.backups_pruned = backup::prune_backups(
            store,
            &self.config.backups_dir(),
            settings.backup_retention_days,
            now,
        )?;

        Ok(report)
    }

    /// Starts the background loop. The first pass runs immediately.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        let period = StdDuration::from_secs(self.config.maintenance_interval_secs.max(1));
        let this = Arc::new(self);

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let pass = Arc::clone(&this);
                match tokio::task::spawn_blocking(move || pass.run_once(Utc::now())).await {
                    Ok(Ok(report)) => debug!(?report, "Maintenance pass finished"),
                    Ok(Err(e)) => error!("Maintenance pass failed: {e}"),
                    Err(e) => error!("Maintenance task panicked: {e}"),
                }
            }
        })
    }
}
