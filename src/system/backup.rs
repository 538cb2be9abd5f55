use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tokio::task::JoinHandle;
use zip::CompressionMethod;
use zip::write::FileOptions;

use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::{Backup, BackupStatus, LogLevel};

use super::audit::{self, Actor};

const MAX_NAME_LEN: usize = 50;
const SNAPSHOT_ENTRY: &str = "database.sqlite3";
const INFO_ENTRY: &str = "database_info.json";
const STAGING_DIR: &str = ".tmp";

/// Reduces a backup name to characters that are safe in a file name.
#[must_use]
pub fn sanitize_backup_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_NAME_LEN)
        .collect();

    if cleaned.trim_matches('_').is_empty() {
        "backup".to_string()
    } else {
        cleaned
    }
}

#[must_use]
pub fn archive_file_name(name: &str, at: DateTime<Utc>) -> String {
    format!(
        "backup_{}_{}.zip",
        sanitize_backup_name(name),
        at.format("%Y%m%d_%H%M%S")
    )
}

/// Inserts a pending backup row.
pub fn create_pending_backup(
    store: &dyn Store,
    name: &str,
    description: &str,
    created_by: Option<&str>,
) -> Result<Backup> {
    let backup = Backup {
        id: uuid::Uuid::new_v4().to_string(),
        name: name.trim().to_string(),
        description: description.trim().to_string(),
        status: BackupStatus::Pending,
        file_name: None,
        file_size: 0,
        error_message: None,
        created_by: created_by.map(str::to_string),
        created_at: Utc::now(),
        completed_at: None,
    };
    store.create_backup(&backup)?;
    Ok(backup)
}

/// Runs a pending backup to completion. Archive failures mark the backup
/// failed and are not returned as errors; only store failures are.
pub fn run_backup(store: &dyn Store, config: &ServerConfig, backup_id: &str) -> Result<Backup> {
    let mut backup = store.get_backup(backup_id)?.ok_or(Error::NotFound)?;

    backup.status = BackupStatus::Running;
    store.update_backup(&backup)?;

    let started = Utc::now();
    match write_archive(store, config, &backup, started) {
        Ok((file_name, file_size)) => {
            backup.status = BackupStatus::Completed;
            backup.file_name = Some(file_name.clone());
            backup.file_size = file_size;
            backup.completed_at = Some(Utc::now());
            store.update_backup(&backup)?;

            audit::system_event(
                store,
                LogLevel::Info,
                "backup",
                format!("Backup '{}' completed: {file_name}", backup.name),
                Actor {
                    user_id: backup.created_by.as_deref(),
                    ..Actor::system()
                },
                Some(json!({ "backup_id": backup.id, "file_size": file_size })),
            );
        }
        Err(e) => {
            backup.status = BackupStatus::Failed;
            backup.error_message = Some(e.to_string());
            store.update_backup(&backup)?;

            audit::system_event(
                store,
                LogLevel::Error,
                "backup",
                format!("Backup '{}' failed: {e}", backup.name),
                Actor {
                    user_id: backup.created_by.as_deref(),
                    ..Actor::system()
                },
                Some(json!({ "backup_id": backup.id })),
            );
        }
    }

    Ok(backup)
}

/// Runs a backup on the blocking pool.
pub fn spawn_backup(
    store: Arc<dyn Store>,
    config: ServerConfig,
    backup_id: String,
) -> JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        if let Err(e) = run_backup(store.as_ref(), &config, &backup_id) {
            tracing::error!("Backup {backup_id} could not be recorded: {e}");
        }
    })
}

fn write_archive(
    store: &dyn Store,
    config: &ServerConfig,
    backup: &Backup,
    at: DateTime<Utc>,
) -> Result<(String, i64)> {
    let backups_dir = config.backups_dir();
    fs::create_dir_all(&backups_dir)?;

    let file_name = archive_file_name(&backup.name, at);
    let final_path = backups_dir.join(&file_name);
    let partial_path = backups_dir.join(format!(".{}.partial", backup.id));
    let snapshot_path = backups_dir.join(format!(".{}.sqlite3", backup.id));

    let result = build_zip(store, config, backup, at, &partial_path, &snapshot_path);
    let _ = fs::remove_file(&snapshot_path);

    if let Err(e) = result {
        let _ = fs::remove_file(&partial_path);
        return Err(e);
    }

    fs::rename(&partial_path, &final_path)?;
    let size = fs::metadata(&final_path)?.len() as i64;
    Ok((file_name, size))
}

fn build_zip(
    store: &dyn Store,
    config: &ServerConfig,
    backup: &Backup,
    at: DateTime<Utc>,
    output: &Path,
    snapshot_path: &Path,
) -> Result<()> {
    let db_file_name = config
        .db_path()
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut zip = zip::ZipWriter::new(File::create(output)?);
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o644);

    let info = json!({
        "backup_name": backup.name,
        "description": backup.description,
        "backup_time": at.to_rfc3339(),
        "database_file": db_file_name,
    });
    zip.start_file(INFO_ENTRY, options)?;
    zip.write_all(serde_json::to_string_pretty(&info)?.as_bytes())?;

    let _ = fs::remove_file(snapshot_path);
    store.snapshot_to(snapshot_path)?;
    zip.start_file(SNAPSHOT_ENTRY, options)?;
    io::copy(&mut File::open(snapshot_path)?, &mut zip)?;

    let files_dir = config.files_dir();
    if files_dir.is_dir() {
        let mut entries = Vec::new();
        collect_files(&files_dir, &files_dir, &mut entries)?;
        for (path, name) in entries {
            zip.start_file(format!("files/{name}"), options)?;
            io::copy(&mut File::open(&path)?, &mut zip)?;
        }
    }

    zip.finish()?.sync_all()?;
    Ok(())
}

/// Lists every regular file below `dir` with its `/`-separated path
/// relative to `root`, skipping the upload staging area.
fn collect_files(root: &Path, dir: &Path, out: &mut Vec<(PathBuf, String)>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            if dir == root && entry.file_name() == STAGING_DIR {
                continue;
            }
            collect_files(root, &path, out)?;
        } else if file_type.is_file() {
            let Ok(relative) = path.strip_prefix(root) else {
                continue;
            };
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            out.push((path, name));
        }
    }
    out.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(())
}

/// Removes a backup's archive, if it has one.
pub fn delete_backup_archive(backups_dir: &Path, backup: &Backup) -> Result<()> {
    let Some(file_name) = &backup.file_name else {
        return Ok(());
    };
    // Stored names never contain separators, but the row is not trusted.
    if file_name.contains(['/', '\\']) || file_name.starts_with('.') {
        return Err(Error::BadRequest(format!("invalid backup file name '{file_name}'")));
    }

    match fs::remove_file(backups_dir.join(file_name)) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Path of a completed backup's archive.
#[must_use]
pub fn archive_path(backups_dir: &Path, backup: &Backup) -> Option<PathBuf> {
    backup
        .file_name
        .as_deref()
        .filter(|n| !n.contains(['/', '\\']) && !n.starts_with('.'))
        .map(|n| backups_dir.join(n))
}

/// Deletes completed backups created more than `retention_days` ago.
pub fn prune_backups(
    store: &dyn Store,
    backups_dir: &Path,
    retention_days: i64,
    now: DateTime<Utc>,
) -> Result<usize> {
    let cutoff = now - Duration::days(retention_days.max(0));
    let mut removed = 0;

    for backup in store.list_completed_backups_before(cutoff)? {
        if let Err(e) = delete_backup_archive(backups_dir, &backup) {
            tracing::warn!("Failed to remove archive of backup {}: {e}", backup.id);
            continue;
        }
        if store.delete_backup(&backup.id)? {
            removed += 1;
        }
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use chrono::TimeZone;
    use std::io::Read;
    use tempfile::TempDir;

    fn setup() -> (TempDir, ServerConfig, SqliteStore) {
        let temp = TempDir::new().unwrap();
        let config = ServerConfig {
            data_dir: temp.path().to_path_buf(),
            ..ServerConfig::default()
        };
        let store = SqliteStore::new(config.db_path()).unwrap();
        store.initialize().unwrap();
        (temp, config, store)
    }

    #[test]
    fn test_sanitize_backup_name() {
        assert_eq!(sanitize_backup_name("nightly run"), "nightly_run");
        assert_eq!(sanitize_backup_name("../../etc"), "______etc");
        assert_eq!(sanitize_backup_name("   "), "backup");
        assert_eq!(sanitize_backup_name(&"x".repeat(80)).len(), MAX_NAME_LEN);
    }

    #[test]
    fn test_archive_file_name() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(archive_file_name("weekly", at), "backup_weekly_20240309_140507.zip");
    }

    #[test]
    fn test_run_backup_writes_archive() {
        let (_temp, config, store) = setup();

        let doc_dir = config.files_dir().join("doc-1");
        fs::create_dir_all(doc_dir.join("versions")).unwrap();
        fs::write(doc_dir.join("current"), b"current content").unwrap();
        fs::write(doc_dir.join("versions").join("v-1"), b"old content").unwrap();
        fs::create_dir_all(config.files_dir().join(STAGING_DIR)).unwrap();
        fs::write(config.files_dir().join(STAGING_DIR).join("partial"), b"x").unwrap();

        let admin = crate::system::accounts::create_account(
            &store,
            &crate::auth::SecretHasher::new(),
            crate::system::accounts::NewUser {
                username: "admin".to_string(),
                employee_id: "admin".to_string(),
                first_name: "Site".to_string(),
                last_name: "Admin".to_string(),
                email: String::new(),
                department: String::new(),
                role: crate::types::Role::Admin,
                password: "headmaster-2024".to_string(),
                storage_quota: 1024,
                must_change_password: false,
            },
        )
        .unwrap();

        let pending =
            create_pending_backup(&store, "nightly", "before term", Some(admin.id.as_str())).unwrap();
        assert_eq!(pending.status, BackupStatus::Pending);
        assert_eq!(pending.created_by.as_deref(), Some(admin.id.as_str()));

        let backup = run_backup(&store, &config, &pending.id).unwrap();
        assert_eq!(backup.status, BackupStatus::Completed);
        assert!(backup.completed_at.is_some());
        assert!(backup.file_size > 0);

        let path = archive_path(&config.backups_dir(), &backup).unwrap();
        let mut archive = zip::ZipArchive::new(File::open(&path).unwrap()).unwrap();
        let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "database.sqlite3",
                "database_info.json",
                "files/doc-1/current",
                "files/doc-1/versions/v-1",
            ]
        );

        let mut info = String::new();
        archive
            .by_name(INFO_ENTRY)
            .unwrap()
            .read_to_string(&mut info)
            .unwrap();
        let info: serde_json::Value = serde_json::from_str(&info).unwrap();
        assert_eq!(info["backup_name"], "nightly");
        assert_eq!(info["database_file"], "lectern.db");

        let stored = store.get_backup(&pending.id).unwrap().unwrap();
        assert_eq!(stored.status, BackupStatus::Completed);

        let (logs, _) = store
            .list_system_logs(None, Some("backup"), crate::store::Page::new(None, None, 20))
            .unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].level, LogLevel::Info);
    }

    #[test]
    fn test_delete_backup_archive_tolerates_missing_file() {
        let (_temp, config, store) = setup();
        let pending = create_pending_backup(&store, "gone", "", None).unwrap();
        let backup = run_backup(&store, &config, &pending.id).unwrap();
        let path = archive_path(&config.backups_dir(), &backup).unwrap();

        delete_backup_archive(&config.backups_dir(), &backup).unwrap();
        assert!(!path.exists());
        delete_backup_archive(&config.backups_dir(), &backup).unwrap();
    }

    #[test]
    fn test_prune_backups_respects_retention() {
        let (_temp, config, store) = setup();
        let pending = create_pending_backup(&store, "old", "", None).unwrap();
        let backup = run_backup(&store, &config, &pending.id).unwrap();
        let path = archive_path(&config.backups_dir(), &backup).unwrap();

        let removed = prune_backups(&store, &config.backups_dir(), 7, Utc::now()).unwrap();
        assert_eq!(removed, 0);
        assert!(path.exists());

        let later = Utc::now() + Duration::days(8);
        let removed = prune_backups(&store, &config.backups_dir(), 7, later).unwrap();
        assert_eq!(removed, 1);
        assert!(!path.exists());
        assert!(store.get_backup(&backup.id).unwrap().is_none());
    }
}
