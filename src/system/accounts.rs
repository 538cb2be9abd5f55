use chrono::Utc;
use rand::Rng;
use rand::distributions::Alphanumeric;

use crate::auth::{SecretHasher, validate_password_policy};
use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::{Role, User};

const GENERATED_PASSWORD_LEN: usize = 20;

/// Fields for a new account, before hashing.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub employee_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub department: String,
    pub role: Role,
    pub password: String,
    pub storage_quota: i64,
    pub must_change_password: bool,
}

/// Checks that username, employee ID and email are free, ignoring the
/// account `except_id`.
pub fn ensure_unique_identity(
    store: &dyn Store,
    username: &str,
    employee_id: &str,
    email: &str,
    except_id: Option<&str>,
) -> Result<()> {
    let taken = |found: Option<User>| found.is_some_and(|u| Some(u.id.as_str()) != except_id);

    if taken(store.get_user_by_username(username)?) {
        return Err(Error::Conflict(format!("Username '{username}' already exists")));
    }
    if taken(store.get_user_by_employee_id(employee_id)?) {
        return Err(Error::Conflict(format!(
            "Employee ID '{employee_id}' already exists"
        )));
    }
    if !email.is_empty() && taken(store.get_user_by_email(email)?) {
        return Err(Error::Conflict(format!("Email '{email}' is already in use")));
    }
    Ok(())
}

/// Validates and inserts a new account.
pub fn create_account(store: &dyn Store, hasher: &SecretHasher, new: NewUser) -> Result<User> {
    let username = new.username.trim().to_string();
    let employee_id = new.employee_id.trim().to_string();
    let email = new.email.trim().to_string();

    if username.is_empty() || username.contains(char::is_whitespace) {
        return Err(Error::BadRequest(
            "Username cannot be empty or contain whitespace".to_string(),
        ));
    }
    if employee_id.is_empty() {
        return Err(Error::BadRequest("Employee ID is required".to_string()));
    }
    if new.storage_quota < 0 {
        return Err(Error::BadRequest(
            "Storage quota cannot be negative".to_string(),
        ));
    }
    validate_password_policy(&new.password).map_err(Error::BadRequest)?;
    ensure_unique_identity(store, &username, &employee_id, &email, None)?;

    let now = Utc::now();
    let user = User {
        id: uuid::Uuid::new_v4().to_string(),
        username,
        employee_id,
        first_name: new.first_name.trim().to_string(),
        last_name: new.last_name.trim().to_string(),
        email,
        department: new.department.trim().to_string(),
        role: new.role,
        password_hash: hasher.hash(&new.password)?,
        storage_quota: new.storage_quota,
        storage_used: 0,
        is_frozen: false,
        frozen_reason: None,
        frozen_at: None,
        must_change_password: new.must_change_password,
        password_changed_at: Some(now),
        last_login_ip: None,
        last_login_at: None,
        created_at: now,
        updated_at: now,
    };

    store.create_user(&user)?;
    Ok(user)
}

/// A random password that satisfies the password policy.
#[must_use]
pub fn generate_password() -> String {
    let mut rng = rand::thread_rng();
    loop {
        let candidate: String = (&mut rng)
            .sample_iter(&Alphanumeric)
            .take(GENERATED_PASSWORD_LEN)
            .map(char::from)
            .collect();
        if validate_password_policy(&candidate).is_ok() {
            return candidate;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use tempfile::TempDir;

    fn open_store() -> (TempDir, SqliteStore) {
        let temp = TempDir::new().unwrap();
        let store = SqliteStore::new(temp.path().join("test.db")).unwrap();
        store.initialize().unwrap();
        (temp, store)
    }

    fn new_teacher(username: &str, employee_id: &str, email: &str) -> NewUser {
        NewUser {
            username: username.to_string(),
            employee_id: employee_id.to_string(),
            first_name: "Mei".to_string(),
            last_name: "Chen".to_string(),
            email: email.to_string(),
            department: "Maths".to_string(),
            role: Role::Teacher,
            password: "lesson-plan-42".to_string(),
            storage_quota: 1024,
            must_change_password: true,
        }
    }

    #[test]
    fn test_create_account() {
        let (_temp, store) = open_store();
        let hasher = SecretHasher::new();

        let user = create_account(&store, &hasher, new_teacher(" mchen ", "20231", "m@x.edu")).unwrap();
        assert_eq!(user.username, "mchen");
        assert!(user.must_change_password);
        assert!(hasher.verify("lesson-plan-42", &user.password_hash).unwrap());

        let stored = store.get_user_by_employee_id("20231").unwrap().unwrap();
        assert_eq!(stored.id, user.id);
    }

    #[test]
    fn test_create_account_rejects_duplicates() {
        let (_temp, store) = open_store();
        let hasher = SecretHasher::new();
        create_account(&store, &hasher, new_teacher("mchen", "20231", "m@x.edu")).unwrap();

        let err = create_account(&store, &hasher, new_teacher("mchen", "20232", "")).unwrap_err();
        assert!(matches!(err, Error::Conflict(msg) if msg.contains("Username")));

        let err = create_account(&store, &hasher, new_teacher("other", "20231", "")).unwrap_err();
        assert!(matches!(err, Error::Conflict(msg) if msg.contains("Employee ID")));

        let err = create_account(&store, &hasher, new_teacher("third", "20233", "m@x.edu")).unwrap_err();
        assert!(matches!(err, Error::Conflict(msg) if msg.contains("Email")));

        // Empty emails never collide.
        create_account(&store, &hasher, new_teacher("fourth", "20234", "")).unwrap();
        create_account(&store, &hasher, new_teacher("fifth", "20235", "")).unwrap();
    }

    #[test]
    fn test_create_account_enforces_policy() {
        let (_temp, store) = open_store();
        let hasher = SecretHasher::new();
        let mut weak = new_teacher("weak", "1", "");
        weak.password = "short1".to_string();
        assert!(matches!(
            create_account(&store, &hasher, weak).unwrap_err(),
            Error::BadRequest(_)
        ));
    }

    #[test]
    fn test_generate_password_meets_policy() {
        for _ in 0..20 {
            let password = generate_password();
            assert_eq!(password.len(), GENERATED_PASSWORD_LEN);
            assert!(validate_password_policy(&password).is_ok());
        }
    }
}
