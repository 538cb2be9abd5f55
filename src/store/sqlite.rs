use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, SecondsFormat, Utc};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};

use super::schema::SCHEMA;
use super::{
    CategorySummary, DocumentCounts, DocumentFilter, DocumentLogFilter, DocumentRow, LoginLogFilter,
    LoginRow, NamedCount, Page, ShareRow, Store, UserCounts, UserFilter,
};
use crate::error::{Error, Result};
use crate::types::*;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Handle SQLite's default datetime format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            tracing::error!("Invalid datetime in database: '{}' - {}", s, e);
            Utc::now()
        })
}

fn parse_opt_datetime(s: Option<String>) -> Option<DateTime<Utc>> {
    s.as_deref().map(parse_datetime)
}

/// Fixed-width UTC timestamps so that TEXT comparison orders correctly.
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn format_opt_datetime(dt: Option<&DateTime<Utc>>) -> Option<String> {
    dt.map(format_datetime)
}

fn day_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

fn day_end_exclusive(date: NaiveDate) -> DateTime<Utc> {
    day_start(date) + Duration::days(1)
}

fn parse_details(s: Option<String>) -> Option<serde_json::Value> {
    s.and_then(|s| serde_json::from_str(&s).ok())
}

fn format_details(details: Option<&serde_json::Value>) -> Option<String> {
    details.map(serde_json::Value::to_string)
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _) if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn map_unique(e: rusqlite::Error) -> Error {
    if is_constraint_violation(&e) {
        Error::AlreadyExists
    } else {
        Error::from(e)
    }
}

fn text(s: impl Into<String>) -> Value {
    Value::Text(s.into())
}

/// Accumulates `AND`-joined WHERE clauses with anonymous `?` parameters.
#[derive(Default)]
struct Conditions {
    clauses: Vec<String>,
    values: Vec<Value>,
}

impl Conditions {
    fn push(&mut self, clause: &str, values: impl IntoIterator<Item = Value>) {
        self.clauses.push(clause.to_string());
        self.values.extend(values);
    }

    fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }
}

fn query_page<T, F>(
    conn: &Connection,
    select: &str,
    from: &str,
    conditions: &Conditions,
    order: &str,
    page: Page,
    map: F,
) -> Result<(Vec<T>, i64)>
where
    F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
{
    let where_sql = conditions.where_sql();

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM {from}{where_sql}"),
        params_from_iter(conditions.values.iter()),
        |row| row.get(0),
    )?;

    let mut values = conditions.values.clone();
    values.push(Value::Integer(page.per_page));
    values.push(Value::Integer(page.offset()));

    let mut stmt = conn.prepare(&format!(
        "SELECT {select} FROM {from}{where_sql} ORDER BY {order} LIMIT ? OFFSET ?"
    ))?;
    let rows = stmt.query_map(params_from_iter(values.iter()), map)?;
    let items = rows.collect::<std::result::Result<Vec<_>, _>>()?;

    Ok((items, total))
}

/// Applies a storage delta under the quota rule shared by every writer.
fn apply_storage_delta(conn: &Connection, user_id: &str, delta: i64) -> rusqlite::Result<bool> {
    let rows = if delta >= 0 {
        conn.execute(
            "UPDATE users SET storage_used = storage_used + ?1
             WHERE id = ?2 AND storage_used + ?1 <= storage_quota",
            params![delta, user_id],
        )?
    } else {
        conn.execute(
            "UPDATE users SET storage_used = MAX(0, storage_used + ?1) WHERE id = ?2",
            params![delta, user_id],
        )?
    };
    Ok(rows > 0)
}

const USER_COLUMNS: &str = "id, username, employee_id, first_name, last_name, email, department, \
    role, password_hash, storage_quota, storage_used, is_frozen, frozen_reason, frozen_at, \
    must_change_password, password_changed_at, last_login_ip, last_login_at, created_at, updated_at";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        employee_id: row.get(2)?,
        first_name: row.get(3)?,
        last_name: row.get(4)?,
        email: row.get(5)?,
        department: row.get(6)?,
        role: row.get(7)?,
        password_hash: row.get(8)?,
        storage_quota: row.get(9)?,
        storage_used: row.get(10)?,
        is_frozen: row.get(11)?,
        frozen_reason: row.get(12)?,
        frozen_at: parse_opt_datetime(row.get(13)?),
        must_change_password: row.get(14)?,
        password_changed_at: parse_opt_datetime(row.get(15)?),
        last_login_ip: row.get(16)?,
        last_login_at: parse_opt_datetime(row.get(17)?),
        created_at: parse_datetime(&row.get::<_, String>(18)?),
        updated_at: parse_datetime(&row.get::<_, String>(19)?),
    })
}

const SESSION_COLUMNS: &str =
    "id, token_hash, token_lookup, user_id, created_at, expires_at, last_used_at";

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        id: row.get(0)?,
        token_hash: row.get(1)?,
        token_lookup: row.get(2)?,
        user_id: row.get(3)?,
        created_at: parse_datetime(&row.get::<_, String>(4)?),
        expires_at: parse_datetime(&row.get::<_, String>(5)?),
        last_used_at: parse_opt_datetime(row.get(6)?),
    })
}

const CATEGORY_COLUMNS: &str =
    "c.id, c.name, c.parent_id, c.icon, c.is_active, c.created_by, c.created_at";

fn category_from_row(row: &Row<'_>) -> rusqlite::Result<Category> {
    Ok(Category {
        id: row.get(0)?,
        name: row.get(1)?,
        parent_id: row.get(2)?,
        icon: row.get(3)?,
        is_active: row.get(4)?,
        created_by: row.get(5)?,
        created_at: parse_datetime(&row.get::<_, String>(6)?),
    })
}

const DOCUMENT_COLUMNS: &str = "d.id, d.title, d.description, d.category_id, d.file_name, \
    d.file_size, d.file_type, d.file_hash, d.author_id, d.status, d.is_public, d.is_starred, \
    d.download_count, d.view_count, d.created_at, d.updated_at, d.archived_at";

/// Columns appended after DOCUMENT_COLUMNS for listings.
const DOCUMENT_ROW_EXTRAS: &str = "CASE WHEN trim(u.last_name) || trim(u.first_name) = '' \
    THEN u.username ELSE trim(u.last_name) || trim(u.first_name) END, c.name";

const DOCUMENT_ROW_FROM: &str = "documents d JOIN users u ON u.id = d.author_id \
    LEFT JOIN categories c ON c.id = d.category_id";

fn document_from_row(row: &Row<'_>) -> rusqlite::Result<Document> {
    Ok(Document {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        category_id: row.get(3)?,
        file_name: row.get(4)?,
        file_size: row.get(5)?,
        file_type: row.get(6)?,
        file_hash: row.get(7)?,
        author_id: row.get(8)?,
        status: row.get(9)?,
        is_public: row.get(10)?,
        is_starred: row.get(11)?,
        download_count: row.get(12)?,
        view_count: row.get(13)?,
        created_at: parse_datetime(&row.get::<_, String>(14)?),
        updated_at: parse_datetime(&row.get::<_, String>(15)?),
        archived_at: parse_opt_datetime(row.get(16)?),
    })
}

fn document_row_from_row(row: &Row<'_>) -> rusqlite::Result<DocumentRow> {
    Ok(DocumentRow {
        document: document_from_row(row)?,
        author_name: row.get(17)?,
        category_name: row.get(18)?,
    })
}

const VERSION_COLUMNS: &str = "id, document_id, version_number, file_name, file_size, file_hash, \
    change_log, created_by, created_at";

fn version_from_row(row: &Row<'_>) -> rusqlite::Result<DocumentVersion> {
    Ok(DocumentVersion {
        id: row.get(0)?,
        document_id: row.get(1)?,
        version_number: row.get(2)?,
        file_name: row.get(3)?,
        file_size: row.get(4)?,
        file_hash: row.get(5)?,
        change_log: row.get(6)?,
        created_by: row.get(7)?,
        created_at: parse_datetime(&row.get::<_, String>(8)?),
    })
}

fn insert_version(conn: &Connection, version: &DocumentVersion) -> Result<()> {
    conn.execute(
        &format!("INSERT INTO document_versions ({VERSION_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"),
        params![
            version.id,
            version.document_id,
            version.version_number,
            version.file_name,
            version.file_size,
            version.file_hash,
            version.change_log,
            version.created_by,
            format_datetime(&version.created_at),
        ],
    )
    .map_err(map_unique)?;
    Ok(())
}

const SHARE_COLUMNS: &str = "s.id, s.document_id, s.token, s.password_hash, s.expires_at, \
    s.max_downloads, s.download_count, s.is_active, s.created_by, s.created_at";

fn share_from_row(row: &Row<'_>) -> rusqlite::Result<ShareLink> {
    Ok(ShareLink {
        id: row.get(0)?,
        document_id: row.get(1)?,
        token: row.get(2)?,
        password_hash: row.get(3)?,
        expires_at: parse_datetime(&row.get::<_, String>(4)?),
        max_downloads: row.get(5)?,
        download_count: row.get(6)?,
        is_active: row.get(7)?,
        created_by: row.get(8)?,
        created_at: parse_datetime(&row.get::<_, String>(9)?),
    })
}

const SYSTEM_LOG_COLUMNS: &str =
    "id, level, message, module, user_id, ip_address, details, created_at";

fn system_log_from_row(row: &Row<'_>) -> rusqlite::Result<SystemLog> {
    Ok(SystemLog {
        id: row.get(0)?,
        level: row.get(1)?,
        message: row.get(2)?,
        module: row.get(3)?,
        user_id: row.get(4)?,
        ip_address: row.get(5)?,
        details: parse_details(row.get(6)?),
        created_at: parse_datetime(&row.get::<_, String>(7)?),
    })
}

const LOGIN_LOG_COLUMNS: &str = "l.id, l.user_id, l.ip_address, l.user_agent, l.login_time, \
    l.logout_time, l.is_successful, l.failure_reason";

fn login_log_from_row(row: &Row<'_>) -> rusqlite::Result<LoginLog> {
    Ok(LoginLog {
        id: row.get(0)?,
        user_id: row.get(1)?,
        ip_address: row.get(2)?,
        user_agent: row.get(3)?,
        login_time: parse_datetime(&row.get::<_, String>(4)?),
        logout_time: parse_opt_datetime(row.get(5)?),
        is_successful: row.get(6)?,
        failure_reason: row.get(7)?,
    })
}

const USER_LOG_COLUMNS: &str =
    "id, user_id, operation, operated_by, ip_address, user_agent, details, created_at";

fn user_log_from_row(row: &Row<'_>) -> rusqlite::Result<UserOperationLog> {
    Ok(UserOperationLog {
        id: row.get(0)?,
        user_id: row.get(1)?,
        operation: row.get(2)?,
        operated_by: row.get(3)?,
        ip_address: row.get(4)?,
        user_agent: row.get(5)?,
        details: parse_details(row.get(6)?),
        created_at: parse_datetime(&row.get::<_, String>(7)?),
    })
}

const DOCUMENT_LOG_COLUMNS: &str =
    "id, document_id, user_id, operation, ip_address, details, created_at";

fn document_log_from_row(row: &Row<'_>) -> rusqlite::Result<DocumentOperationLog> {
    Ok(DocumentOperationLog {
        id: row.get(0)?,
        document_id: row.get(1)?,
        user_id: row.get(2)?,
        operation: row.get(3)?,
        ip_address: row.get(4)?,
        details: parse_details(row.get(5)?),
        created_at: parse_datetime(&row.get::<_, String>(6)?),
    })
}

const BACKUP_COLUMNS: &str = "id, name, description, status, file_name, file_size, \
    error_message, created_by, created_at, completed_at";

fn backup_from_row(row: &Row<'_>) -> rusqlite::Result<Backup> {
    Ok(Backup {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        status: row.get(3)?,
        file_name: row.get(4)?,
        file_size: row.get(5)?,
        error_message: row.get(6)?,
        created_by: row.get(7)?,
        created_at: parse_datetime(&row.get::<_, String>(8)?),
        completed_at: parse_opt_datetime(row.get(9)?),
    })
}

fn named_counts(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> Result<Vec<NamedCount>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, |row| {
        Ok(NamedCount {
            name: row.get(0)?,
            count: row.get(1)?,
        })
    })?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::from)
}

impl Store for SqliteStore {
    fn initialize(&self) -> Result<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    // User operations

    fn create_user(&self, user: &User) -> Result<()> {
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO users ({USER_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)"
                ),
                params![
                    user.id,
                    user.username,
                    user.employee_id,
                    user.first_name,
                    user.last_name,
                    user.email,
                    user.department,
                    user.role,
                    user.password_hash,
                    user.storage_quota,
                    user.storage_used,
                    user.is_frozen,
                    user.frozen_reason,
                    format_opt_datetime(user.frozen_at.as_ref()),
                    user.must_change_password,
                    format_opt_datetime(user.password_changed_at.as_ref()),
                    user.last_login_ip,
                    format_opt_datetime(user.last_login_at.as_ref()),
                    format_datetime(&user.created_at),
                    format_datetime(&user.updated_at),
                ],
            )
            .map_err(map_unique)?;
        Ok(())
    }

    fn get_user(&self, id: &str) -> Result<Option<User>> {
        self.conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id],
                user_from_row,
            )
            .optional()
            .map_err(Error::from)
    }

    fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        self.conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
                params![username],
                user_from_row,
            )
            .optional()
            .map_err(Error::from)
    }

    fn get_user_by_employee_id(&self, employee_id: &str) -> Result<Option<User>> {
        self.conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE employee_id = ?1"),
                params![employee_id],
                user_from_row,
            )
            .optional()
            .map_err(Error::from)
    }

    fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        if email.is_empty() {
            return Ok(None);
        }
        self.conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
                params![email],
                user_from_row,
            )
            .optional()
            .map_err(Error::from)
    }

    fn list_users(&self, filter: &UserFilter, page: Page) -> Result<(Vec<User>, i64)> {
        let mut conditions = Conditions::default();
        if let Some(role) = filter.role {
            conditions.push("role = ?", [text(role.as_str())]);
        }
        if let Some(department) = &filter.department {
            conditions.push("department = ?", [text(department.as_str())]);
        }
        if let Some(frozen) = filter.frozen {
            conditions.push("is_frozen = ?", [Value::Integer(i64::from(frozen))]);
        }
        if let Some(search) = &filter.search {
            conditions.push(
                "(instr(lower(username), lower(?)) > 0 OR instr(lower(employee_id), lower(?)) > 0
                  OR instr(lower(first_name), lower(?)) > 0 OR instr(lower(last_name), lower(?)) > 0
                  OR instr(lower(email), lower(?)) > 0)",
                std::iter::repeat_n(text(search.as_str()), 5),
            );
        }

        let conn = self.conn();
        query_page(
            &conn,
            USER_COLUMNS,
            "users",
            &conditions,
            "created_at DESC, id",
            page,
            user_from_row,
        )
    }

    fn list_departments(&self) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT DISTINCT department FROM users WHERE department != '' ORDER BY department",
        )?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn list_users_by_storage(&self) -> Result<Vec<User>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY storage_used DESC, username"
        ))?;
        let rows = stmt.query_map([], user_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn list_recent_users(&self, limit: i64) -> Result<Vec<User>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC LIMIT ?1"
        ))?;
        let rows = stmt.query_map(params![limit], user_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn update_user(&self, user: &User) -> Result<()> {
        let rows = self
            .conn()
            .execute(
                "UPDATE users SET username = ?1, employee_id = ?2, first_name = ?3, last_name = ?4,
                    email = ?5, department = ?6, role = ?7, password_hash = ?8, storage_quota = ?9,
                    is_frozen = ?10, frozen_reason = ?11, frozen_at = ?12,
                    must_change_password = ?13, password_changed_at = ?14,
                    last_login_ip = ?15, last_login_at = ?16, updated_at = ?17
                 WHERE id = ?18",
                params![
                    user.username,
                    user.employee_id,
                    user.first_name,
                    user.last_name,
                    user.email,
                    user.department,
                    user.role,
                    user.password_hash,
                    user.storage_quota,
                    user.is_frozen,
                    user.frozen_reason,
                    format_opt_datetime(user.frozen_at.as_ref()),
                    user.must_change_password,
                    format_opt_datetime(user.password_changed_at.as_ref()),
                    user.last_login_ip,
                    format_opt_datetime(user.last_login_at.as_ref()),
                    format_datetime(&user.updated_at),
                    user.id,
                ],
            )
            .map_err(map_unique)?;

        if rows == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    fn delete_user(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM users WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    fn count_users(&self) -> Result<UserCounts> {
        self.conn()
            .query_row(
                "SELECT COUNT(*),
                        COALESCE(SUM(role = 'teacher'), 0),
                        COALESCE(SUM(role = 'admin'), 0),
                        COALESCE(SUM(is_frozen), 0)
                 FROM users",
                [],
                |row| {
                    Ok(UserCounts {
                        total: row.get(0)?,
                        teachers: row.get(1)?,
                        admins: row.get(2)?,
                        frozen: row.get(3)?,
                    })
                },
            )
            .map_err(Error::from)
    }

    fn has_admin(&self) -> Result<bool> {
        self.conn()
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE role = 'admin')",
                [],
                |row| row.get(0),
            )
            .map_err(Error::from)
    }

    fn adjust_storage_used(&self, user_id: &str, delta: i64) -> Result<bool> {
        apply_storage_delta(&self.conn(), user_id, delta).map_err(Error::from)
    }

    // Session operations

    fn create_session(&self, session: &Session) -> Result<()> {
        let result = self.conn().execute(
            &format!("INSERT INTO sessions ({SESSION_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
            params![
                session.id,
                session.token_hash,
                session.token_lookup,
                session.user_id,
                format_datetime(&session.created_at),
                format_datetime(&session.expires_at),
                format_opt_datetime(session.last_used_at.as_ref()),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_constraint_violation(&e) => Err(Error::TokenLookupCollision),
            Err(e) => Err(Error::from(e)),
        }
    }

    fn get_session_by_lookup(&self, lookup: &str) -> Result<Option<Session>> {
        self.conn()
            .query_row(
                &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE token_lookup = ?1"),
                params![lookup],
                session_from_row,
            )
            .optional()
            .map_err(Error::from)
    }

    fn delete_session(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    fn delete_user_sessions(&self, user_id: &str) -> Result<usize> {
        let rows = self
            .conn()
            .execute("DELETE FROM sessions WHERE user_id = ?1", params![user_id])?;
        Ok(rows)
    }

    fn touch_session(&self, id: &str) -> Result<()> {
        self.conn().execute(
            "UPDATE sessions SET last_used_at = ?1 WHERE id = ?2",
            params![format_datetime(&Utc::now()), id],
        )?;
        Ok(())
    }

    fn delete_expired_sessions(&self, now: DateTime<Utc>) -> Result<usize> {
        let rows = self.conn().execute(
            "DELETE FROM sessions WHERE expires_at < ?1",
            params![format_datetime(&now)],
        )?;
        Ok(rows)
    }

    // Category operations

    fn create_category(&self, category: &Category) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO categories (id, name, parent_id, icon, is_active, created_by, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    category.id,
                    category.name,
                    category.parent_id,
                    category.icon,
                    category.is_active,
                    category.created_by,
                    format_datetime(&category.created_at),
                ],
            )
            .map_err(map_unique)?;
        Ok(())
    }

    fn get_category(&self, id: &str) -> Result<Option<Category>> {
        self.conn()
            .query_row(
                &format!("SELECT {CATEGORY_COLUMNS} FROM categories c WHERE c.id = ?1"),
                params![id],
                category_from_row,
            )
            .optional()
            .map_err(Error::from)
    }

    fn get_category_by_name(&self, name: &str) -> Result<Option<Category>> {
        self.conn()
            .query_row(
                &format!("SELECT {CATEGORY_COLUMNS} FROM categories c WHERE c.name = ?1"),
                params![name],
                category_from_row,
            )
            .optional()
            .map_err(Error::from)
    }

    fn list_categories(&self, visible_to: Option<&str>) -> Result<Vec<CategorySummary>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {CATEGORY_COLUMNS},
                    (SELECT COUNT(*) FROM documents d WHERE d.category_id = c.id)
             FROM categories c
             WHERE ?1 IS NULL
                OR c.created_by = ?1
                OR c.created_by IN (SELECT id FROM users WHERE role = 'admin')
             ORDER BY c.name"
        ))?;

        let rows = stmt.query_map(params![visible_to], |row| {
            Ok(CategorySummary {
                category: category_from_row(row)?,
                document_count: row.get(7)?,
            })
        })?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn list_child_categories(&self, parent_id: &str) -> Result<Vec<Category>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories c WHERE c.parent_id = ?1 ORDER BY c.name"
        ))?;
        let rows = stmt.query_map(params![parent_id], category_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn update_category(&self, category: &Category) -> Result<()> {
        let rows = self
            .conn()
            .execute(
                "UPDATE categories SET name = ?1, parent_id = ?2, icon = ?3, is_active = ?4
                 WHERE id = ?5",
                params![
                    category.name,
                    category.parent_id,
                    category.icon,
                    category.is_active,
                    category.id,
                ],
            )
            .map_err(map_unique)?;

        if rows == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    fn delete_category(&self, id: &str) -> Result<bool> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        tx.execute(
            "UPDATE documents SET category_id = NULL WHERE category_id = ?1",
            params![id],
        )?;
        tx.execute(
            "UPDATE categories SET parent_id = NULL WHERE parent_id = ?1",
            params![id],
        )?;
        let rows = tx.execute("DELETE FROM categories WHERE id = ?1", params![id])?;

        tx.commit()?;
        Ok(rows > 0)
    }

    // Document operations

    fn create_document(&self, document: &Document, version: &DocumentVersion) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        if !apply_storage_delta(&tx, &document.author_id, document.file_size)? {
            return Err(Error::QuotaExceeded);
        }

        tx.execute(
            &format!(
                "INSERT INTO documents ({})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
                DOCUMENT_COLUMNS.replace("d.", "")
            ),
            params![
                document.id,
                document.title,
                document.description,
                document.category_id,
                document.file_name,
                document.file_size,
                document.file_type,
                document.file_hash,
                document.author_id,
                document.status,
                document.is_public,
                document.is_starred,
                document.download_count,
                document.view_count,
                format_datetime(&document.created_at),
                format_datetime(&document.updated_at),
                format_opt_datetime(document.archived_at.as_ref()),
            ],
        )?;

        insert_version(&tx, version)?;

        tx.commit()?;
        Ok(())
    }

    fn get_document(&self, id: &str) -> Result<Option<Document>> {
        self.conn()
            .query_row(
                &format!("SELECT {DOCUMENT_COLUMNS} FROM documents d WHERE d.id = ?1"),
                params![id],
                document_from_row,
            )
            .optional()
            .map_err(Error::from)
    }

    fn find_document_by_hash(&self, hash: &str, exclude_id: &str) -> Result<Option<Document>> {
        self.conn()
            .query_row(
                &format!(
                    "SELECT {DOCUMENT_COLUMNS} FROM documents d
                     WHERE d.file_hash = ?1 AND d.id != ?2
                     ORDER BY d.created_at LIMIT 1"
                ),
                params![hash, exclude_id],
                document_from_row,
            )
            .optional()
            .map_err(Error::from)
    }

    fn list_documents(
        &self,
        filter: &DocumentFilter,
        page: Page,
    ) -> Result<(Vec<DocumentRow>, i64)> {
        let mut conditions = Conditions::default();
        if let Some(viewer) = &filter.visible_to {
            conditions.push("(d.author_id = ? OR d.is_public = 1)", [text(viewer.as_str())]);
        }
        if let Some(author_id) = &filter.author_id {
            conditions.push("d.author_id = ?", [text(author_id.as_str())]);
        }
        if let Some(category_id) = &filter.category_id {
            conditions.push("d.category_id = ?", [text(category_id.as_str())]);
        }
        if let Some(status) = filter.status {
            conditions.push("d.status = ?", [text(status.as_str())]);
        }
        if let Some(file_type) = &filter.file_type {
            conditions.push("d.file_type = ?", [text(file_type.to_lowercase())]);
        }
        if let Some(from) = filter.date_from {
            conditions.push("d.created_at >= ?", [text(format_datetime(&day_start(from)))]);
        }
        if let Some(to) = filter.date_to {
            conditions.push(
                "d.created_at < ?",
                [text(format_datetime(&day_end_exclusive(to)))],
            );
        }
        if let Some(search) = &filter.search {
            conditions.push(
                "(instr(lower(d.title), lower(?)) > 0 OR instr(lower(d.description), lower(?)) > 0
                  OR instr(lower(u.first_name), lower(?)) > 0 OR instr(lower(u.last_name), lower(?)) > 0)",
                std::iter::repeat_n(text(search.as_str()), 4),
            );
        }

        let conn = self.conn();
        query_page(
            &conn,
            &format!("{DOCUMENT_COLUMNS}, {DOCUMENT_ROW_EXTRAS}"),
            DOCUMENT_ROW_FROM,
            &conditions,
            "d.created_at DESC, d.id DESC",
            page,
            document_row_from_row,
        )
    }

    fn list_recent_documents(&self, author_id: &str, limit: i64) -> Result<Vec<DocumentRow>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {DOCUMENT_COLUMNS}, {DOCUMENT_ROW_EXTRAS} FROM {DOCUMENT_ROW_FROM}
             WHERE d.author_id = ?1 ORDER BY d.created_at DESC LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![author_id, limit], document_row_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn list_file_types(&self, visible_to: Option<&str>) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT DISTINCT file_type FROM documents
             WHERE ?1 IS NULL OR author_id = ?1 OR is_public = 1
             ORDER BY file_type",
        )?;
        let rows = stmt.query_map(params![visible_to], |row| row.get(0))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn list_category_documents(
        &self,
        author_id: &str,
        category_ids: &[String],
    ) -> Result<Vec<DocumentRow>> {
        if category_ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; category_ids.len()].join(", ");
        let mut values = vec![text(author_id)];
        values.extend(category_ids.iter().map(|id| text(id.as_str())));

        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {DOCUMENT_COLUMNS}, {DOCUMENT_ROW_EXTRAS} FROM {DOCUMENT_ROW_FROM}
             WHERE d.author_id = ? AND d.category_id IN ({placeholders})
             ORDER BY d.created_at DESC"
        ))?;
        let rows = stmt.query_map(params_from_iter(values.iter()), document_row_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn update_document(&self, document: &Document) -> Result<()> {
        let rows = self.conn().execute(
            "UPDATE documents SET title = ?1, description = ?2, category_id = ?3, status = ?4,
                is_public = ?5, is_starred = ?6, archived_at = ?7, updated_at = ?8
             WHERE id = ?9",
            params![
                document.title,
                document.description,
                document.category_id,
                document.status,
                document.is_public,
                document.is_starred,
                format_opt_datetime(document.archived_at.as_ref()),
                format_datetime(&document.updated_at),
                document.id,
            ],
        )?;

        if rows == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    fn commit_document_content(
        &self,
        document: &Document,
        versions: &[DocumentVersion],
        size_delta: i64,
    ) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        if size_delta != 0 && !apply_storage_delta(&tx, &document.author_id, size_delta)? {
            return Err(Error::QuotaExceeded);
        }

        for version in versions {
            insert_version(&tx, version)?;
        }

        let rows = tx.execute(
            "UPDATE documents SET file_name = ?1, file_size = ?2, file_type = ?3, file_hash = ?4,
                updated_at = ?5
             WHERE id = ?6",
            params![
                document.file_name,
                document.file_size,
                document.file_type,
                document.file_hash,
                format_datetime(&document.updated_at),
                document.id,
            ],
        )?;

        if rows == 0 {
            return Err(Error::NotFound);
        }

        tx.commit()?;
        Ok(())
    }

    fn revert_document_content(
        &self,
        previous: &Document,
        version_ids: &[String],
        size_delta: i64,
    ) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        // The bytes were accounted for before, so no quota check on the way back.
        tx.execute(
            "UPDATE users SET storage_used = MAX(0, storage_used - ?1) WHERE id = ?2",
            params![size_delta, previous.author_id],
        )?;

        for id in version_ids {
            tx.execute(
                "DELETE FROM document_versions WHERE id = ?1 AND document_id = ?2",
                params![id, previous.id],
            )?;
        }

        tx.execute(
            "UPDATE documents SET file_name = ?1, file_size = ?2, file_type = ?3, file_hash = ?4,
                updated_at = ?5
             WHERE id = ?6",
            params![
                previous.file_name,
                previous.file_size,
                previous.file_type,
                previous.file_hash,
                format_datetime(&previous.updated_at),
                previous.id,
            ],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn increment_view_count(&self, id: &str) -> Result<()> {
        self.conn().execute(
            "UPDATE documents SET view_count = view_count + 1 WHERE id = ?1",
            params![id],
        )?;
        Ok(())
    }

    fn increment_download_count(&self, id: &str) -> Result<()> {
        self.conn().execute(
            "UPDATE documents SET download_count = download_count + 1 WHERE id = ?1",
            params![id],
        )?;
        Ok(())
    }

    fn delete_document(&self, id: &str) -> Result<Option<i64>> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let existing: Option<(String, i64)> = tx
            .query_row(
                "SELECT author_id, file_size FROM documents WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((author_id, file_size)) = existing else {
            return Ok(None);
        };

        tx.execute("DELETE FROM documents WHERE id = ?1", params![id])?;
        apply_storage_delta(&tx, &author_id, -file_size)?;

        tx.commit()?;
        Ok(Some(file_size))
    }

    fn count_documents(&self, author_id: Option<&str>) -> Result<DocumentCounts> {
        self.conn()
            .query_row(
                "SELECT COUNT(*),
                        COALESCE(SUM(is_public = 1), 0),
                        COALESCE(SUM(is_public = 0), 0),
                        COALESCE(SUM(status = 'rejected'), 0),
                        COALESCE(SUM(status = 'review'), 0),
                        COALESCE(SUM(download_count), 0)
                 FROM documents WHERE ?1 IS NULL OR author_id = ?1",
                params![author_id],
                |row| {
                    Ok(DocumentCounts {
                        total: row.get(0)?,
                        public: row.get(1)?,
                        private: row.get(2)?,
                        rejected: row.get(3)?,
                        in_review: row.get(4)?,
                        downloads: row.get(5)?,
                    })
                },
            )
            .map_err(Error::from)
    }

    fn count_documents_by_status(&self, author_id: &str) -> Result<Vec<NamedCount>> {
        named_counts(
            &self.conn(),
            "SELECT status, COUNT(*) FROM documents WHERE author_id = ?1
             GROUP BY status ORDER BY status",
            params![author_id],
        )
    }

    fn top_categories(&self, author_id: &str, limit: i64) -> Result<Vec<NamedCount>> {
        named_counts(
            &self.conn(),
            "SELECT c.name, COUNT(*) FROM documents d JOIN categories c ON c.id = d.category_id
             WHERE d.author_id = ?1
             GROUP BY c.id ORDER BY COUNT(*) DESC, c.name LIMIT ?2",
            params![author_id, limit],
        )
    }

    fn top_file_types(&self, author_id: &str, limit: i64) -> Result<Vec<NamedCount>> {
        named_counts(
            &self.conn(),
            "SELECT file_type, COUNT(*) FROM documents WHERE author_id = ?1
             GROUP BY file_type ORDER BY COUNT(*) DESC, file_type LIMIT ?2",
            params![author_id, limit],
        )
    }

    fn count_documents_created_since(&self, author_id: &str, since: DateTime<Utc>) -> Result<i64> {
        self.conn()
            .query_row(
                "SELECT COUNT(*) FROM documents WHERE author_id = ?1 AND created_at >= ?2",
                params![author_id, format_datetime(&since)],
                |row| row.get(0),
            )
            .map_err(Error::from)
    }

    fn sum_document_sizes_until(&self, author_id: &str, until: DateTime<Utc>) -> Result<i64> {
        self.conn()
            .query_row(
                "SELECT COALESCE(SUM(file_size), 0) FROM documents
                 WHERE author_id = ?1 AND created_at <= ?2",
                params![author_id, format_datetime(&until)],
                |row| row.get(0),
            )
            .map_err(Error::from)
    }

    fn list_author_document_ids(&self, author_id: &str) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT id FROM documents WHERE author_id = ?1")?;
        let rows = stmt.query_map(params![author_id], |row| row.get(0))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    // Version operations

    fn list_versions(&self, document_id: &str) -> Result<Vec<DocumentVersion>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {VERSION_COLUMNS} FROM document_versions WHERE document_id = ?1
             ORDER BY created_at DESC, rowid DESC"
        ))?;
        let rows = stmt.query_map(params![document_id], version_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn get_version(&self, id: &str) -> Result<Option<DocumentVersion>> {
        self.conn()
            .query_row(
                &format!("SELECT {VERSION_COLUMNS} FROM document_versions WHERE id = ?1"),
                params![id],
                version_from_row,
            )
            .optional()
            .map_err(Error::from)
    }

    // Share link operations

    fn create_share(&self, share: &ShareLink) -> Result<()> {
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO share_links ({})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    SHARE_COLUMNS.replace("s.", "")
                ),
                params![
                    share.id,
                    share.document_id,
                    share.token,
                    share.password_hash,
                    format_datetime(&share.expires_at),
                    share.max_downloads,
                    share.download_count,
                    share.is_active,
                    share.created_by,
                    format_datetime(&share.created_at),
                ],
            )
            .map_err(map_unique)?;
        Ok(())
    }

    fn get_share(&self, id: &str) -> Result<Option<ShareLink>> {
        self.conn()
            .query_row(
                &format!("SELECT {SHARE_COLUMNS} FROM share_links s WHERE s.id = ?1"),
                params![id],
                share_from_row,
            )
            .optional()
            .map_err(Error::from)
    }

    fn get_share_by_token(&self, token: &str) -> Result<Option<ShareLink>> {
        self.conn()
            .query_row(
                &format!("SELECT {SHARE_COLUMNS} FROM share_links s WHERE s.token = ?1"),
                params![token],
                share_from_row,
            )
            .optional()
            .map_err(Error::from)
    }

    fn list_user_shares(&self, user_id: &str) -> Result<Vec<ShareRow>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SHARE_COLUMNS}, d.title FROM share_links s
             JOIN documents d ON d.id = s.document_id
             WHERE s.created_by = ?1
             ORDER BY s.created_at DESC"
        ))?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok(ShareRow {
                share: share_from_row(row)?,
                document_title: row.get(10)?,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn set_share_active(&self, id: &str, active: bool) -> Result<()> {
        let rows = self.conn().execute(
            "UPDATE share_links SET is_active = ?1 WHERE id = ?2",
            params![active, id],
        )?;

        if rows == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    fn delete_share(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM share_links WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    fn consume_share_download(&self, id: &str, now: DateTime<Utc>) -> Result<bool> {
        let rows = self.conn().execute(
            "UPDATE share_links SET download_count = download_count + 1
             WHERE id = ?1 AND is_active = 1 AND expires_at >= ?2
               AND (max_downloads = 0 OR download_count < max_downloads)",
            params![id, format_datetime(&now)],
        )?;
        Ok(rows > 0)
    }

    fn deactivate_expired_shares(&self, now: DateTime<Utc>) -> Result<usize> {
        let rows = self.conn().execute(
            "UPDATE share_links SET is_active = 0 WHERE is_active = 1 AND expires_at < ?1",
            params![format_datetime(&now)],
        )?;
        Ok(rows)
    }

    fn count_user_shares(&self, user_id: &str, now: DateTime<Utc>) -> Result<(i64, i64)> {
        self.conn()
            .query_row(
                "SELECT COUNT(*), COALESCE(SUM(is_active = 1 AND expires_at >= ?2), 0)
                 FROM share_links WHERE created_by = ?1",
                params![user_id, format_datetime(&now)],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(Error::from)
    }

    // System config operations

    fn get_config_value(&self, key: &str) -> Result<Option<String>> {
        self.conn()
            .query_row(
                "SELECT value FROM system_config WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(Error::from)
    }

    fn set_config_value(&self, key: &str, value: &str, description: Option<&str>) -> Result<()> {
        self.conn().execute(
            "INSERT INTO system_config (key, value, description, created_at, updated_at)
             VALUES (?1, ?2, COALESCE(?3, ''), ?4, ?4)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                description = COALESCE(?3, system_config.description),
                updated_at = excluded.updated_at",
            params![key, value, description, format_datetime(&Utc::now())],
        )?;
        Ok(())
    }

    fn insert_missing_config(&self, defaults: &[(&str, &str, &str)]) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let now = format_datetime(&Utc::now());

        let mut inserted = 0;
        for (key, value, description) in defaults {
            inserted += tx.execute(
                "INSERT OR IGNORE INTO system_config (key, value, description, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                params![key, value, description, now],
            )?;
        }

        tx.commit()?;
        Ok(inserted)
    }

    fn list_config(&self) -> Result<Vec<ConfigEntry>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT key, value, description, created_at, updated_at FROM system_config ORDER BY key",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(ConfigEntry {
                key: row.get(0)?,
                value: row.get(1)?,
                description: row.get(2)?,
                created_at: parse_datetime(&row.get::<_, String>(3)?),
                updated_at: parse_datetime(&row.get::<_, String>(4)?),
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    // Audit log operations

    fn insert_system_log(&self, log: &SystemLog) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO system_logs (level, message, module, user_id, ip_address, details, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                log.level,
                log.message,
                log.module,
                log.user_id,
                log.ip_address,
                format_details(log.details.as_ref()),
                format_datetime(&log.created_at),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn list_system_logs(
        &self,
        level: Option<LogLevel>,
        module: Option<&str>,
        page: Page,
    ) -> Result<(Vec<SystemLog>, i64)> {
        let mut conditions = Conditions::default();
        if let Some(level) = level {
            conditions.push("level = ?", [text(level.as_str())]);
        }
        if let Some(module) = module {
            conditions.push("module = ?", [text(module)]);
        }

        let conn = self.conn();
        query_page(
            &conn,
            SYSTEM_LOG_COLUMNS,
            "system_logs",
            &conditions,
            "id DESC",
            page,
            system_log_from_row,
        )
    }

    fn insert_login_log(&self, log: &LoginLog) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO login_logs (user_id, ip_address, user_agent, login_time, logout_time,
                is_successful, failure_reason)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                log.user_id,
                log.ip_address,
                log.user_agent,
                format_datetime(&log.login_time),
                format_opt_datetime(log.logout_time.as_ref()),
                log.is_successful,
                log.failure_reason,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn close_login_logs(&self, user_id: &str, now: DateTime<Utc>) -> Result<usize> {
        let rows = self.conn().execute(
            "UPDATE login_logs SET logout_time = ?1
             WHERE user_id = ?2 AND is_successful = 1 AND logout_time IS NULL",
            params![format_datetime(&now), user_id],
        )?;
        Ok(rows)
    }

    fn list_login_logs(
        &self,
        filter: &LoginLogFilter,
        page: Page,
    ) -> Result<(Vec<LoginRow>, i64)> {
        let mut conditions = Conditions::default();
        if let Some(user_id) = &filter.user_id {
            conditions.push("l.user_id = ?", [text(user_id.as_str())]);
        }
        if let Some(successful) = filter.successful {
            conditions.push("l.is_successful = ?", [Value::Integer(i64::from(successful))]);
        }
        if let Some(ip) = &filter.ip_address {
            conditions.push("instr(l.ip_address, ?) > 0", [text(ip.as_str())]);
        }
        if let Some(from) = filter.date_from {
            conditions.push("l.login_time >= ?", [text(format_datetime(&day_start(from)))]);
        }
        if let Some(to) = filter.date_to {
            conditions.push(
                "l.login_time < ?",
                [text(format_datetime(&day_end_exclusive(to)))],
            );
        }

        let conn = self.conn();
        query_page(
            &conn,
            &format!("{LOGIN_LOG_COLUMNS}, u.username"),
            "login_logs l JOIN users u ON u.id = l.user_id",
            &conditions,
            "l.login_time DESC, l.id DESC",
            page,
            |row| {
                Ok(LoginRow {
                    log: login_log_from_row(row)?,
                    username: row.get(8)?,
                })
            },
        )
    }

    fn count_failed_logins_since(&self, since: DateTime<Utc>) -> Result<i64> {
        self.conn()
            .query_row(
                "SELECT COUNT(*) FROM login_logs WHERE is_successful = 0 AND login_time >= ?1",
                params![format_datetime(&since)],
                |row| row.get(0),
            )
            .map_err(Error::from)
    }

    fn insert_user_log(&self, log: &UserOperationLog) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO user_operation_logs (user_id, operation, operated_by, ip_address,
                user_agent, details, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                log.user_id,
                log.operation,
                log.operated_by,
                log.ip_address,
                log.user_agent,
                format_details(log.details.as_ref()),
                format_datetime(&log.created_at),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn list_user_logs(&self, user_id: &str, page: Page) -> Result<(Vec<UserOperationLog>, i64)> {
        let mut conditions = Conditions::default();
        conditions.push("user_id = ?", [text(user_id)]);

        let conn = self.conn();
        query_page(
            &conn,
            USER_LOG_COLUMNS,
            "user_operation_logs",
            &conditions,
            "id DESC",
            page,
            user_log_from_row,
        )
    }

    fn insert_document_log(&self, log: &DocumentOperationLog) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO document_operation_logs (document_id, user_id, operation, ip_address,
                details, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                log.document_id,
                log.user_id,
                log.operation,
                log.ip_address,
                format_details(log.details.as_ref()),
                format_datetime(&log.created_at),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn list_document_logs(
        &self,
        filter: &DocumentLogFilter,
        page: Page,
    ) -> Result<(Vec<DocumentOperationLog>, i64)> {
        let mut conditions = Conditions::default();
        if let Some(document_id) = &filter.document_id {
            conditions.push("document_id = ?", [text(document_id.as_str())]);
        }
        if let Some(user_id) = &filter.user_id {
            conditions.push("user_id = ?", [text(user_id.as_str())]);
        }
        if let Some(operation) = filter.operation {
            conditions.push("operation = ?", [text(operation.as_str())]);
        }

        let conn = self.conn();
        query_page(
            &conn,
            DOCUMENT_LOG_COLUMNS,
            "document_operation_logs",
            &conditions,
            "id DESC",
            page,
            document_log_from_row,
        )
    }

    fn count_user_document_logs_since(&self, user_id: &str, since: DateTime<Utc>) -> Result<i64> {
        self.conn()
            .query_row(
                "SELECT COUNT(*) FROM document_operation_logs WHERE user_id = ?1 AND created_at >= ?2",
                params![user_id, format_datetime(&since)],
                |row| row.get(0),
            )
            .map_err(Error::from)
    }

    // Backup operations

    fn create_backup(&self, backup: &Backup) -> Result<()> {
        self.conn().execute(
            &format!(
                "INSERT INTO backups ({BACKUP_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
            ),
            params![
                backup.id,
                backup.name,
                backup.description,
                backup.status,
                backup.file_name,
                backup.file_size,
                backup.error_message,
                backup.created_by,
                format_datetime(&backup.created_at),
                format_opt_datetime(backup.completed_at.as_ref()),
            ],
        )?;
        Ok(())
    }

    fn get_backup(&self, id: &str) -> Result<Option<Backup>> {
        self.conn()
            .query_row(
                &format!("SELECT {BACKUP_COLUMNS} FROM backups WHERE id = ?1"),
                params![id],
                backup_from_row,
            )
            .optional()
            .map_err(Error::from)
    }

    fn list_backups(&self, page: Page) -> Result<(Vec<Backup>, i64)> {
        let conn = self.conn();
        query_page(
            &conn,
            BACKUP_COLUMNS,
            "backups",
            &Conditions::default(),
            "created_at DESC, id",
            page,
            backup_from_row,
        )
    }

    fn update_backup(&self, backup: &Backup) -> Result<()> {
        let rows = self.conn().execute(
            "UPDATE backups SET status = ?1, file_name = ?2, file_size = ?3, error_message = ?4,
                completed_at = ?5
             WHERE id = ?6",
            params![
                backup.status,
                backup.file_name,
                backup.file_size,
                backup.error_message,
                format_opt_datetime(backup.completed_at.as_ref()),
                backup.id,
            ],
        )?;

        if rows == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    fn delete_backup(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM backups WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    fn has_completed_backup_since(&self, since: DateTime<Utc>) -> Result<bool> {
        self.conn()
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM backups WHERE status = 'completed' AND completed_at >= ?1)",
                params![format_datetime(&since)],
                |row| row.get(0),
            )
            .map_err(Error::from)
    }

    fn list_completed_backups_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Backup>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {BACKUP_COLUMNS} FROM backups
             WHERE status = 'completed' AND created_at < ?1
             ORDER BY created_at"
        ))?;
        let rows = stmt.query_map(params![format_datetime(&cutoff)], backup_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn snapshot_to(&self, path: &Path) -> Result<()> {
        let target = path
            .to_str()
            .ok_or_else(|| Error::Config(format!("non UTF-8 path: {}", path.display())))?;
        self.conn().execute("VACUUM INTO ?1", params![target])?;
        Ok(())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_store() -> (TempDir, SqliteStore) {
        let temp = TempDir::new().unwrap();
        let store = SqliteStore::new(temp.path().join("test.db")).unwrap();
        store.initialize().unwrap();
        (temp, store)
    }

    fn make_user(id: &str, username: &str, employee_id: &str, role: Role) -> User {
        let now = Utc::now();
        User {
            id: id.to_string(),
            username: username.to_string(),
            employee_id: employee_id.to_string(),
            first_name: "Lin".to_string(),
            last_name: "Zhao".to_string(),
            email: format!("{username}@example.edu"),
            department: "Physics".to_string(),
            role,
            password_hash: "hash".to_string(),
            storage_quota: 1000,
            storage_used: 0,
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

    fn make_document(id: &str, author_id: &str, size: i64, is_public: bool) -> (Document, DocumentVersion) {
        let now = Utc::now();
        let document = Document {
            id: id.to_string(),
            title: format!("Syllabus {id}"),
            description: "Course outline".to_string(),
            category_id: None,
            file_name: "syllabus.pdf".to_string(),
            file_size: size,
            file_type: "pdf".to_string(),
            file_hash: format!("hash-{id}"),
            author_id: author_id.to_string(),
            status: DocumentStatus::Draft,
            is_public,
            is_starred: false,
            download_count: 0,
            view_count: 0,
            created_at: now,
            updated_at: now,
            archived_at: None,
        };
        let version = DocumentVersion {
            id: format!("{id}-v1"),
            document_id: id.to_string(),
            version_number: "v1.0".to_string(),
            file_name: document.file_name.clone(),
            file_size: size,
            file_hash: document.file_hash.clone(),
            change_log: "Initial version".to_string(),
            created_by: Some(author_id.to_string()),
            created_at: now,
        };
        (document, version)
    }

    #[test]
    fn test_initialize_creates_tables() {
        let (_temp, store) = open_store();

        let conn = store.conn();
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        for table in [
            "users",
            "sessions",
            "categories",
            "documents",
            "document_versions",
            "share_links",
            "system_config",
            "system_logs",
            "login_logs",
            "user_operation_logs",
            "document_operation_logs",
            "backups",
        ] {
            assert!(tables.contains(&table.to_string()), "missing table {table}");
        }
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let (_temp, store) = open_store();
        store.initialize().unwrap();
    }

    #[test]
    fn test_user_crud_and_uniqueness() {
        let (_temp, store) = open_store();
        let user = make_user("u1", "zhao", "20001", Role::Teacher);
        store.create_user(&user).unwrap();

        let fetched = store.get_user_by_employee_id("20001").unwrap().unwrap();
        assert_eq!(fetched.username, "zhao");
        assert_eq!(fetched.role, Role::Teacher);

        let dup = make_user("u2", "zhao", "20002", Role::Teacher);
        assert!(matches!(store.create_user(&dup), Err(Error::AlreadyExists)));

        let mut dup_email = make_user("u3", "qian", "20003", Role::Teacher);
        dup_email.email = user.email.clone();
        assert!(matches!(store.create_user(&dup_email), Err(Error::AlreadyExists)));

        let mut blank_a = make_user("u4", "sun", "20004", Role::Teacher);
        blank_a.email.clear();
        let mut blank_b = make_user("u5", "li", "20005", Role::Teacher);
        blank_b.email.clear();
        store.create_user(&blank_a).unwrap();
        store.create_user(&blank_b).unwrap();

        let mut updated = fetched.clone();
        updated.department = "Chemistry".to_string();
        store.update_user(&updated).unwrap();
        assert_eq!(
            store.get_user("u1").unwrap().unwrap().department,
            "Chemistry"
        );

        assert!(store.delete_user("u1").unwrap());
        assert!(store.get_user("u1").unwrap().is_none());
    }

    #[test]
    fn test_list_users_filters() {
        let (_temp, store) = open_store();
        store
            .create_user(&make_user("a1", "root", "admin-1", Role::Admin))
            .unwrap();
        let mut frozen = make_user("t1", "wu", "30001", Role::Teacher);
        frozen.is_frozen = true;
        store.create_user(&frozen).unwrap();
        store
            .create_user(&make_user("t2", "zheng", "30002", Role::Teacher))
            .unwrap();

        let page = Page::new(None, None, 20);
        let (teachers, total) = store
            .list_users(
                &UserFilter {
                    role: Some(Role::Teacher),
                    ..Default::default()
                },
                page,
            )
            .unwrap();
        assert_eq!(total, 2);
        assert_eq!(teachers.len(), 2);

        let (frozen_users, _) = store
            .list_users(
                &UserFilter {
                    frozen: Some(true),
                    ..Default::default()
                },
                page,
            )
            .unwrap();
        assert_eq!(frozen_users.len(), 1);
        assert_eq!(frozen_users[0].id, "t1");

        let (found, _) = store
            .list_users(
                &UserFilter {
                    search: Some("ZHENG".to_string()),
                    ..Default::default()
                },
                page,
            )
            .unwrap();
        assert_eq!(found.len(), 1);

        let counts = store.count_users().unwrap();
        assert_eq!(counts.total, 3);
        assert_eq!(counts.admins, 1);
        assert_eq!(counts.frozen, 1);
        assert_eq!(store.list_departments().unwrap(), vec!["Physics".to_string()]);
    }

    #[test]
    fn test_storage_delta_respects_quota() {
        let (_temp, store) = open_store();
        store
            .create_user(&make_user("u1", "zhao", "20001", Role::Teacher))
            .unwrap();

        assert!(store.adjust_storage_used("u1", 600).unwrap());
        assert!(!store.adjust_storage_used("u1", 500).unwrap());
        assert!(store.adjust_storage_used("u1", 400).unwrap());
        assert_eq!(store.get_user("u1").unwrap().unwrap().storage_used, 1000);

        assert!(store.adjust_storage_used("u1", -5000).unwrap());
        assert_eq!(store.get_user("u1").unwrap().unwrap().storage_used, 0);
    }

    #[test]
    fn test_create_document_charges_quota() {
        let (_temp, store) = open_store();
        store
            .create_user(&make_user("u1", "zhao", "20001", Role::Teacher))
            .unwrap();

        let (doc, version) = make_document("d1", "u1", 700, false);
        store.create_document(&doc, &version).unwrap();
        assert_eq!(store.get_user("u1").unwrap().unwrap().storage_used, 700);
        assert_eq!(store.list_versions("d1").unwrap().len(), 1);

        let (big, big_version) = make_document("d2", "u1", 400, false);
        assert!(matches!(
            store.create_document(&big, &big_version),
            Err(Error::QuotaExceeded)
        ));
        assert!(store.get_document("d2").unwrap().is_none());

        assert_eq!(store.delete_document("d1").unwrap(), Some(700));
        assert_eq!(store.get_user("u1").unwrap().unwrap().storage_used, 0);
        assert!(store.list_versions("d1").unwrap().is_empty());
        assert_eq!(store.delete_document("d1").unwrap(), None);
    }

    #[test]
    fn test_commit_document_content_applies_delta() {
        let (_temp, store) = open_store();
        store
            .create_user(&make_user("u1", "zhao", "20001", Role::Teacher))
            .unwrap();
        let (mut doc, version) = make_document("d1", "u1", 300, false);
        store.create_document(&doc, &version).unwrap();

        doc.file_size = 500;
        doc.file_hash = "hash-new".to_string();
        let next = DocumentVersion {
            id: "d1-v2".to_string(),
            version_number: "v2.0".to_string(),
            file_size: 500,
            file_hash: "hash-new".to_string(),
            change_log: "Revised".to_string(),
            ..version.clone()
        };
        store.commit_document_content(&doc, &[next], 200).unwrap();

        assert_eq!(store.get_user("u1").unwrap().unwrap().storage_used, 500);
        let stored = store.get_document("d1").unwrap().unwrap();
        assert_eq!(stored.file_size, 500);
        assert_eq!(store.list_versions("d1").unwrap()[0].version_number, "v2.0");

        let duplicate = DocumentVersion {
            id: "d1-v2b".to_string(),
            version_number: "v2.0".to_string(),
            ..version
        };
        assert!(matches!(
            store.commit_document_content(&doc, &[duplicate], 0),
            Err(Error::AlreadyExists)
        ));
    }

    #[test]
    fn test_revert_document_content() {
        let (_temp, store) = open_store();
        store
            .create_user(&make_user("u1", "zhao", "20001", Role::Teacher))
            .unwrap();
        let (doc, version) = make_document("d1", "u1", 300, false);
        store.create_document(&doc, &version).unwrap();

        let mut updated = doc.clone();
        updated.file_size = 800;
        updated.file_hash = "hash-new".to_string();
        let next = DocumentVersion {
            id: "d1-v2".to_string(),
            version_number: "v2.0".to_string(),
            file_size: 800,
            ..version
        };
        store.commit_document_content(&updated, &[next], 500).unwrap();
        assert_eq!(store.get_user("u1").unwrap().unwrap().storage_used, 800);

        store
            .revert_document_content(&doc, &["d1-v2".to_string()], 500)
            .unwrap();

        assert_eq!(store.get_user("u1").unwrap().unwrap().storage_used, 300);
        let stored = store.get_document("d1").unwrap().unwrap();
        assert_eq!(stored.file_size, 300);
        assert_eq!(stored.file_hash, "hash-d1");
        let versions = store.list_versions("d1").unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].version_number, "v1.0");
    }

    #[test]
    fn test_list_documents_visibility_and_search() {
        let (_temp, store) = open_store();
        store
            .create_user(&make_user("u1", "zhao", "20001", Role::Teacher))
            .unwrap();
        let mut other = make_user("u2", "qian", "20002", Role::Teacher);
        other.storage_quota = 10_000;
        other.first_name = "Mei".to_string();
        other.last_name = "Qian".to_string();
        store.create_user(&other).unwrap();

        let (own, v1) = make_document("d1", "u1", 10, false);
        let (public, v2) = make_document("d2", "u2", 10, true);
        let (private, v3) = make_document("d3", "u2", 10, false);
        store.create_document(&own, &v1).unwrap();
        store.create_document(&public, &v2).unwrap();
        store.create_document(&private, &v3).unwrap();

        let page = Page::new(None, None, 20);
        let (visible, total) = store
            .list_documents(
                &DocumentFilter {
                    visible_to: Some("u1".to_string()),
                    ..Default::default()
                },
                page,
            )
            .unwrap();
        assert_eq!(total, 2);
        let ids: Vec<_> = visible.iter().map(|r| r.document.id.as_str()).collect();
        assert!(ids.contains(&"d1"));
        assert!(ids.contains(&"d2"));

        let (by_author, _) = store
            .list_documents(
                &DocumentFilter {
                    visible_to: Some("u1".to_string()),
                    search: Some("qian".to_string()),
                    ..Default::default()
                },
                page,
            )
            .unwrap();
        assert_eq!(by_author.len(), 1);
        assert_eq!(by_author[0].document.id, "d2");
        assert_eq!(by_author[0].author_name, "QianMei");

        let today = Utc::now().date_naive();
        let (in_range, _) = store
            .list_documents(
                &DocumentFilter {
                    date_from: Some(today),
                    date_to: Some(today),
                    ..Default::default()
                },
                page,
            )
            .unwrap();
        assert_eq!(in_range.len(), 3);

        let (small_page, total) = store
            .list_documents(&DocumentFilter::default(), Page::new(Some(2), Some(2), 20))
            .unwrap();
        assert_eq!(total, 3);
        assert_eq!(small_page.len(), 1);
    }

    #[test]
    fn test_share_download_limit_is_atomic() {
        let (_temp, store) = open_store();
        store
            .create_user(&make_user("u1", "zhao", "20001", Role::Teacher))
            .unwrap();
        let (doc, version) = make_document("d1", "u1", 10, false);
        store.create_document(&doc, &version).unwrap();

        let now = Utc::now();
        let share = ShareLink {
            id: "s1".to_string(),
            document_id: "d1".to_string(),
            token: "tok".to_string(),
            password_hash: None,
            expires_at: now + Duration::days(1),
            max_downloads: 2,
            download_count: 0,
            is_active: true,
            created_by: "u1".to_string(),
            created_at: now,
        };
        store.create_share(&share).unwrap();

        assert!(store.consume_share_download("s1", now).unwrap());
        assert!(store.consume_share_download("s1", now).unwrap());
        assert!(!store.consume_share_download("s1", now).unwrap());
        assert_eq!(store.get_share("s1").unwrap().unwrap().download_count, 2);

        let (total, active) = store.count_user_shares("u1", now).unwrap();
        assert_eq!((total, active), (1, 1));

        let later = now + Duration::days(2);
        assert_eq!(store.deactivate_expired_shares(later).unwrap(), 1);
        assert!(!store.get_share_by_token("tok").unwrap().unwrap().is_active);
        assert_eq!(store.deactivate_expired_shares(later).unwrap(), 0);
    }

    #[test]
    fn test_category_visibility() {
        let (_temp, store) = open_store();
        store
            .create_user(&make_user("a1", "root", "admin-1", Role::Admin))
            .unwrap();
        store
            .create_user(&make_user("u1", "zhao", "20001", Role::Teacher))
            .unwrap();
        store
            .create_user(&make_user("u2", "qian", "20002", Role::Teacher))
            .unwrap();

        let now = Utc::now();
        for (id, name, owner) in [("c1", "Lectures", "a1"), ("c2", "Mine", "u1"), ("c3", "Theirs", "u2")] {
            store
                .create_category(&Category {
                    id: id.to_string(),
                    name: name.to_string(),
                    parent_id: None,
                    icon: String::new(),
                    is_active: true,
                    created_by: Some(owner.to_string()),
                    created_at: now,
                })
                .unwrap();
        }

        let visible: Vec<_> = store
            .list_categories(Some("u1"))
            .unwrap()
            .into_iter()
            .map(|c| c.category.name)
            .collect();
        assert_eq!(visible, vec!["Lectures".to_string(), "Mine".to_string()]);
        assert_eq!(store.list_categories(None).unwrap().len(), 3);

        assert!(store.delete_category("c1").unwrap());
        assert!(store.get_category("c1").unwrap().is_none());
    }

    #[test]
    fn test_config_upsert() {
        let (_temp, store) = open_store();

        let inserted = store
            .insert_missing_config(&[("a", "1", "first"), ("b", "2", "second")])
            .unwrap();
        assert_eq!(inserted, 2);
        assert_eq!(store.insert_missing_config(&[("a", "9", "x")]).unwrap(), 0);

        store.set_config_value("a", "5", None).unwrap();
        let entries = store.list_config().unwrap();
        assert_eq!(entries[0].key, "a");
        assert_eq!(entries[0].value, "5");
        assert_eq!(entries[0].description, "first");

        store.set_config_value("c", "3", Some("third")).unwrap();
        assert_eq!(store.get_config_value("c").unwrap().as_deref(), Some("3"));
    }

    #[test]
    fn test_login_logs_filtering() {
        let (_temp, store) = open_store();
        store
            .create_user(&make_user("u1", "zhao", "20001", Role::Teacher))
            .unwrap();

        let now = Utc::now();
        for (ip, ok) in [("10.0.0.1", true), ("10.0.0.2", false), ("192.168.1.5", true)] {
            store
                .insert_login_log(&LoginLog {
                    id: 0,
                    user_id: "u1".to_string(),
                    ip_address: ip.to_string(),
                    user_agent: "test".to_string(),
                    login_time: now,
                    logout_time: None,
                    is_successful: ok,
                    failure_reason: String::new(),
                })
                .unwrap();
        }

        let page = Page::new(None, None, 20);
        let (failed, _) = store
            .list_login_logs(
                &LoginLogFilter {
                    successful: Some(false),
                    ..Default::default()
                },
                page,
            )
            .unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].username, "zhao");

        let (subnet, _) = store
            .list_login_logs(
                &LoginLogFilter {
                    ip_address: Some("10.0.0".to_string()),
                    ..Default::default()
                },
                page,
            )
            .unwrap();
        assert_eq!(subnet.len(), 2);

        assert_eq!(store.close_login_logs("u1", now).unwrap(), 2);
        assert_eq!(
            store
                .count_failed_logins_since(now - Duration::hours(1))
                .unwrap(),
            1
        );
    }

    #[test]
    fn test_session_lookup_collision() {
        let (_temp, store) = open_store();
        store
            .create_user(&make_user("u1", "zhao", "20001", Role::Teacher))
            .unwrap();

        let now = Utc::now();
        let session = Session {
            id: "s1".to_string(),
            token_hash: "h".to_string(),
            token_lookup: "abcd1234".to_string(),
            user_id: "u1".to_string(),
            created_at: now,
            expires_at: now + Duration::hours(1),
            last_used_at: None,
        };
        store.create_session(&session).unwrap();

        let clash = Session {
            id: "s2".to_string(),
            ..session
        };
        assert!(matches!(
            store.create_session(&clash),
            Err(Error::TokenLookupCollision)
        ));

        assert_eq!(
            store
                .delete_expired_sessions(now + Duration::hours(2))
                .unwrap(),
            1
        );
    }

    #[test]
    fn test_snapshot_to_writes_database_copy() {
        let (temp, store) = open_store();
        store
            .create_user(&make_user("u1", "zhao", "20001", Role::Teacher))
            .unwrap();

        let target = temp.path().join("snapshot.sqlite3");
        store.snapshot_to(&target).unwrap();

        let copy = SqliteStore::new(&target).unwrap();
        assert!(copy.get_user("u1").unwrap().is_some());
    }
}
